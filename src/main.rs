use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand};

use conjunction::matcher::{MISSING, MatchParams, crossmatch};
use conjunction::pairing::reciprocal_best;

#[derive(Parser)]
#[command(
    name = "conjunction",
    about = "Parallel k-nearest-neighbor catalog cross-matcher"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cross-match two synthetic catalogs and report timings.
    Bench {
        /// Number of points in the first catalog.
        #[arg(long, default_value = "100000")]
        n1: usize,

        /// Number of points in the second catalog.
        #[arg(long, default_value = "100000")]
        n2: usize,

        /// Half-width of the square patch the catalogs cover, degrees.
        #[arg(long, default_value = "1.0")]
        radius: f64,

        /// Neighbors to keep per catalog-1 point.
        #[arg(long, default_value = "1")]
        nth: usize,

        /// Worker threads.
        #[arg(long, default_value = "1")]
        threads: usize,

        /// Use the quadratic kernel instead of the bucket grid.
        #[arg(long)]
        brute_force: bool,

        /// Seed for the synthetic catalogs.
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Suppress the progress bar.
        #[arg(long)]
        quiet: bool,
    },

    /// Compare the bucketed and brute-force kernels on the same input.
    Check {
        /// Points per catalog.
        #[arg(long, default_value = "2000")]
        n: usize,

        /// Neighbors to keep per catalog-1 point.
        #[arg(long, default_value = "3")]
        nth: usize,

        /// Worker threads for the bucketed run.
        #[arg(long, default_value = "4")]
        threads: usize,

        /// Seed for the synthetic catalogs.
        #[arg(long, default_value = "1")]
        seed: u64,
    },
}

/// Uniform random catalog on a square patch centered on (ra0, dec0).
fn synthetic_catalog(
    n: usize,
    ra0: f64,
    dec0: f64,
    radius_deg: f64,
    seed: u64,
) -> (Vec<f64>, Vec<f64>) {
    let mut state: u64 = seed.max(1);
    let mut rng = move || -> f64 {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state as f64) / (u64::MAX as f64)
    };

    let mut ra = Vec::with_capacity(n);
    let mut dec = Vec::with_capacity(n);
    for _ in 0..n {
        ra.push(ra0 + (rng() - 0.5) * 2.0 * radius_deg);
        dec.push(dec0 + (rng() - 0.5) * 2.0 * radius_deg);
    }
    (ra, dec)
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values[values.len() / 2]
}

#[allow(clippy::too_many_arguments)]
fn cmd_bench(
    n1: usize,
    n2: usize,
    radius: f64,
    nth: usize,
    threads: usize,
    brute_force: bool,
    seed: u64,
    quiet: bool,
) {
    let (ra1, dec1) = synthetic_catalog(n1, 180.0, 0.0, radius, seed);
    let (ra2, dec2) = synthetic_catalog(n2, 180.0, 0.0, radius, seed.wrapping_mul(31).wrapping_add(7));

    let params = MatchParams {
        threads,
        nth,
        self_match: false,
        brute_force,
        verbose: !quiet,
    };

    let start = Instant::now();
    let res = crossmatch(&ra1, &dec1, &ra2, &dec2, &params).unwrap_or_else(|e| {
        eprintln!("cross-match failed: {e}");
        process::exit(1);
    });
    let elapsed = start.elapsed();

    let kernel = if brute_force { "brute-force" } else { "bucketed" };
    println!(
        "{kernel} match of {n1} x {n2} points ({nth} neighbors, {threads} threads): {:.3} s",
        elapsed.as_secs_f64()
    );

    let mut seps: Vec<f64> = (0..n1)
        .filter(|&i| res.id[[0, i]] != MISSING)
        .map(|i| res.d[[0, i]])
        .collect();
    println!("median nearest separation: {:.3}\"", median(&mut seps));

    let pairs = reciprocal_best(&res);
    println!(
        "reciprocal-best pairs: {} ({} lost)",
        pairs.id1.len(),
        pairs.lost.len()
    );
}

fn cmd_check(n: usize, nth: usize, threads: usize, seed: u64) {
    let (ra1, dec1) = synthetic_catalog(n, 120.0, 0.0, 1.0, seed);
    let (ra2, dec2) = synthetic_catalog(n, 120.0, 0.0, 1.0, seed.wrapping_mul(31).wrapping_add(7));

    let bucketed_params = MatchParams {
        threads,
        nth,
        ..MatchParams::default()
    };
    let brute_params = MatchParams {
        threads: 1,
        nth,
        brute_force: true,
        ..MatchParams::default()
    };

    let run = |params: &MatchParams| {
        crossmatch(&ra1, &dec1, &ra2, &dec2, params).unwrap_or_else(|e| {
            eprintln!("cross-match failed: {e}");
            process::exit(1);
        })
    };

    let bucketed = run(&bucketed_params);
    let brute = run(&brute_params);

    let mut mismatches = 0;
    for i in 0..n {
        if bucketed.id[[0, i]] != brute.id[[0, i]] {
            mismatches += 1;
            if mismatches <= 5 {
                eprintln!(
                    "point {i}: bucketed nearest {} vs brute-force {}",
                    bucketed.id[[0, i]],
                    brute.id[[0, i]]
                );
            }
            continue;
        }
        for k in 0..bucketed.id.nrows() {
            let a = bucketed.d[[k, i]];
            let b = brute.d[[k, i]];
            if (a.is_finite() || b.is_finite()) && (a - b).abs() > 1e-9 {
                mismatches += 1;
                if mismatches <= 5 {
                    eprintln!("point {i} neighbor {k}: {a}\" vs {b}\"");
                }
            }
        }
    }

    if mismatches > 0 {
        eprintln!("{mismatches} mismatches between bucketed and brute-force kernels");
        process::exit(1);
    }
    println!("bucketed and brute-force kernels agree on {n} x {n} points ({nth} neighbors)");
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench {
            n1,
            n2,
            radius,
            nth,
            threads,
            brute_force,
            seed,
            quiet,
        } => {
            cmd_bench(n1, n2, radius, nth, threads, brute_force, seed, quiet);
        }
        Commands::Check {
            n,
            nth,
            threads,
            seed,
        } => {
            cmd_check(n, nth, threads, seed);
        }
    }
}
