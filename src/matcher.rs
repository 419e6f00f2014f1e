//! Catalog cross-matching: parameters, scheduling, and the public entry
//! points.
//!
//! The matcher takes two catalogs of equatorial coordinates in degrees and
//! returns, for every point of the first, its `nth` nearest points in the
//! second (`id`/`d`), and for every point of the second its single nearest
//! point in the first (`rid`/`rd`). Work is split into contiguous index
//! ranges over a fixed-size thread pool; each worker owns its result
//! buffers and its clone of the depth cache, so the only shared state is
//! read-only and the merge is deterministic.
//!
//! Catalogs straddling the 0°/360° RA seam are not handled; callers must
//! unwrap the coordinates beforehand.

use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use ndarray::{Array2, s};
use rayon::prelude::*;

use crate::depth::DepthCache;
use crate::grid::BucketGrid;
use crate::search::{self, MatchBuffers, MatchContext, PreparedCatalog};
use crate::sphere::arcsec_from_proxy;

/// Sentinel index marking an empty result slot.
pub const MISSING: usize = usize::MAX;

/// Options controlling a cross-match run.
#[derive(Debug, Clone)]
pub struct MatchParams {
    /// Number of parallel workers. Values `<= 1` run inline on the caller
    /// thread.
    pub threads: usize,
    /// Number of nearest neighbors to return per catalog-1 point.
    pub nth: usize,
    /// Match a catalog against itself: skip `i == j` pairs and derive the
    /// reverse map from the forward one. Both inputs must then be the same
    /// set of points.
    pub self_match: bool,
    /// Use the quadratic scan instead of the bucket grid.
    pub brute_force: bool,
    /// Draw a progress bar on standard output.
    pub verbose: bool,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            threads: 1,
            nth: 1,
            self_match: false,
            brute_force: false,
            verbose: false,
        }
    }
}

/// Failure modes of [`crossmatch`]. Soft conditions (more neighbors
/// requested than catalog-2 points, rows that cannot fill) are handled
/// internally and never error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// RA and Dec arrays of one catalog have different lengths.
    ShapeMismatch { ra: usize, dec: usize },
    /// One catalog is empty while the other is not.
    EmptyInput,
    /// Zero neighbors requested.
    InvalidK,
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::ShapeMismatch { ra, dec } => {
                write!(f, "RA and Dec lengths do not match ({ra} vs {dec})")
            }
            MatchError::EmptyInput => write!(f, "one catalog is empty"),
            MatchError::InvalidK => write!(f, "requested zero neighbors"),
        }
    }
}

impl std::error::Error for MatchError {}

/// Cross-match output. All distances are great-circle separations in
/// arcseconds.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// `id[[k, i]]` is the index into catalog 2 of the k-th nearest
    /// neighbor of catalog-1 point `i`, ascending in distance; [`MISSING`]
    /// where fewer neighbors exist.
    pub id: Array2<usize>,
    /// Separations matching `id`; `+∞` where `id` is [`MISSING`].
    pub d: Array2<f64>,
    /// Index into catalog 1 of the nearest point to each catalog-2 point.
    pub rid: Vec<usize>,
    /// Separations matching `rid`.
    pub rd: Vec<f64>,
}

/// Anything exposing RA/Dec arrays in degrees.
pub trait Catalog {
    fn ra(&self) -> &[f64];
    fn dec(&self) -> &[f64];
}

/// Cross-match two catalogs given as raw coordinate arrays in degrees.
pub fn crossmatch(
    ra1: &[f64],
    dec1: &[f64],
    ra2: &[f64],
    dec2: &[f64],
    params: &MatchParams,
) -> Result<MatchResult, MatchError> {
    if params.nth == 0 {
        return Err(MatchError::InvalidK);
    }

    let cat1 = PreparedCatalog::prepare(ra1, dec1)?;
    let cat2 = PreparedCatalog::prepare(ra2, dec2)?;
    let n1 = cat1.len();
    let n2 = cat2.len();
    if cat1.is_empty() != cat2.is_empty() {
        return Err(MatchError::EmptyInput);
    }

    // More neighbors than catalog-2 points: run with a lowered count so the
    // search loop can terminate. The result keeps the requested number of
    // rows; the surplus stays (MISSING, +inf).
    let nth = params.nth.min(n2);

    let ctx = MatchContext {
        cat1: &cat1,
        cat2: &cat2,
        nth,
        self_match: params.self_match,
    };

    let mut buf = if nth == 0 {
        // Both catalogs empty.
        MatchBuffers::new(params.nth, n1, n2)
    } else if params.brute_force {
        brute_match(&ctx, params)
    } else {
        let grid = BucketGrid::build(ra1, dec1, ra2, dec2, nth);
        bucket_match(&ctx, &grid, params)
    };

    // Under self-matching the reverse pass is skipped: the forward nearest
    // of a single catalog is its own reverse map.
    if params.self_match && nth > 0 {
        for j in 0..n2.min(n1) {
            buf.rid[j] = buf.id[[0, j]];
            buf.rd[j] = buf.d[[0, j]];
        }
    }

    // Proxy units to arcseconds, exactly once.
    buf.d.mapv_inplace(arcsec_from_proxy);
    for v in &mut buf.rd {
        *v = arcsec_from_proxy(*v);
    }

    Ok(MatchResult {
        id: buf.id,
        d: buf.d,
        rid: buf.rid,
        rd: buf.rd,
    })
}

/// Match a catalog against itself, excluding self-pairs.
pub fn crossmatch_self(
    ra: &[f64],
    dec: &[f64],
    params: &MatchParams,
) -> Result<MatchResult, MatchError> {
    let mut params = params.clone();
    params.self_match = true;
    crossmatch(ra, dec, ra, dec, &params)
}

/// Cross-match two objects exposing RA/Dec attributes.
pub fn crossmatch_catalogs<A: Catalog, B: Catalog>(
    cat1: &A,
    cat2: &B,
    params: &MatchParams,
) -> Result<MatchResult, MatchError> {
    crossmatch(cat1.ra(), cat1.dec(), cat2.ra(), cat2.dec(), params)
}

/// Match an object exposing RA/Dec attributes against itself.
pub fn crossmatch_catalog_self<C: Catalog>(
    cat: &C,
    params: &MatchParams,
) -> Result<MatchResult, MatchError> {
    crossmatch_self(cat.ra(), cat.dec(), params)
}

/// One worker's slice of the run: which index ranges it owns and its
/// private result buffers.
struct WorkerSlot {
    beg1: usize,
    end1: usize,
    beg2: usize,
    end2: usize,
    buf: MatchBuffers,
}

/// Evenly split `[0, n)` into `t` contiguous ranges, the last absorbing the
/// remainder.
fn partition(n: usize, t: usize) -> Vec<(usize, usize)> {
    let chunk = n / t;
    (0..t)
        .map(|k| {
            let beg = k * chunk;
            let end = if k + 1 == t { n } else { beg + chunk };
            (beg, end)
        })
        .collect()
}

fn bucket_match(ctx: &MatchContext<'_>, grid: &BucketGrid, params: &MatchParams) -> MatchBuffers {
    let n1 = ctx.cat1.len();
    let n2 = ctx.cat2.len();
    let total = n1 + if params.self_match { 0 } else { n2 };
    let pb = progress_bar(total as u64, params.verbose);
    let prototype = DepthCache::new(grid.cell_size);

    let merged = if params.threads <= 1 {
        let mut depths = prototype;
        let mut buf = MatchBuffers::new(params.nth, n1, n2);
        for i in 0..n1 {
            search::forward_search(ctx, grid, &mut depths, &mut buf, i);
            pb.inc(1);
        }
        if !params.self_match {
            for j in 0..n2 {
                search::reverse_search(ctx, grid, &mut depths, &mut buf, j);
                pb.inc(1);
            }
        }
        buf
    } else {
        let ranges1 = partition(n1, params.threads);
        let ranges2 = partition(n2, params.threads);
        let mut slots: Vec<WorkerSlot> = ranges1
            .iter()
            .zip(&ranges2)
            .map(|(&(beg1, end1), &(beg2, end2))| WorkerSlot {
                beg1,
                end1,
                beg2,
                end2,
                buf: MatchBuffers::new(params.nth, n1, n2),
            })
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.threads)
            .build()
            .expect("failed to build worker pool");

        let self_match = params.self_match;
        pool.install(|| {
            slots.par_iter_mut().for_each(|slot| {
                // Ring growth mutates the cache, so each worker takes a
                // private clone of the seeded prototype.
                let mut depths = prototype.clone();
                for i in slot.beg1..slot.end1 {
                    search::forward_search(ctx, grid, &mut depths, &mut slot.buf, i);
                    pb.inc(1);
                }
                if !self_match {
                    for j in slot.beg2..slot.end2 {
                        search::reverse_search(ctx, grid, &mut depths, &mut slot.buf, j);
                        pb.inc(1);
                    }
                }
            });
        });

        merge_sliced(params.nth, n1, n2, &slots, !self_match)
    };

    finish_bar(&pb, total);
    merged
}

fn brute_match(ctx: &MatchContext<'_>, params: &MatchParams) -> MatchBuffers {
    let n1 = ctx.cat1.len();
    let n2 = ctx.cat2.len();
    let pb = progress_bar(n1 as u64, params.verbose);

    let merged = if params.threads <= 1 {
        let mut buf = MatchBuffers::new(params.nth, n1, n2);
        for i in 0..n1 {
            for j in 0..n2 {
                if params.self_match && i == j {
                    continue;
                }
                search::brute_force_pair(ctx, &mut buf, i, j);
            }
            pb.inc(1);
        }
        buf
    } else {
        // Only catalog 1 is partitioned; every worker scans all of catalog
        // 2, so the reverse arrays overlap and are merged by minimum.
        let ranges1 = partition(n1, params.threads);
        let mut slots: Vec<WorkerSlot> = ranges1
            .iter()
            .map(|&(beg1, end1)| WorkerSlot {
                beg1,
                end1,
                beg2: 0,
                end2: 0,
                buf: MatchBuffers::new(params.nth, n1, n2),
            })
            .collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.threads)
            .build()
            .expect("failed to build worker pool");

        let self_match = params.self_match;
        pool.install(|| {
            slots.par_iter_mut().for_each(|slot| {
                for i in slot.beg1..slot.end1 {
                    for j in 0..n2 {
                        if self_match && i == j {
                            continue;
                        }
                        search::brute_force_pair(ctx, &mut slot.buf, i, j);
                    }
                    pb.inc(1);
                }
            });
        });

        let mut out = merge_sliced(params.nth, n1, n2, &slots, false);
        for slot in &slots {
            for j in 0..n2 {
                if slot.buf.rd[j] < out.rd[j] {
                    out.rd[j] = slot.buf.rd[j];
                    out.rid[j] = slot.buf.rid[j];
                }
            }
        }
        out
    };

    finish_bar(&pb, n1);
    merged
}

/// Gather the authoritative column ranges of each worker into one buffer.
fn merge_sliced(
    rows: usize,
    n1: usize,
    n2: usize,
    slots: &[WorkerSlot],
    merge_reverse: bool,
) -> MatchBuffers {
    let mut out = MatchBuffers::new(rows, n1, n2);
    for slot in slots {
        out.id
            .slice_mut(s![.., slot.beg1..slot.end1])
            .assign(&slot.buf.id.slice(s![.., slot.beg1..slot.end1]));
        out.d
            .slice_mut(s![.., slot.beg1..slot.end1])
            .assign(&slot.buf.d.slice(s![.., slot.beg1..slot.end1]));
        if merge_reverse {
            out.rid[slot.beg2..slot.end2].copy_from_slice(&slot.buf.rid[slot.beg2..slot.end2]);
            out.rd[slot.beg2..slot.end2].copy_from_slice(&slot.buf.rd[slot.beg2..slot.end2]);
        }
    }
    out
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold} [{bar:40.cyan/dim}] {pos}/{len} {per_sec} {eta} {wide_msg}",
    )
    .unwrap()
    .progress_chars("━╸─")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏✓")
}

fn progress_bar(total: u64, verbose: bool) -> ProgressBar {
    if !verbose {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stdout());
    pb.set_style(bar_style());
    pb.set_prefix("✦ Match");
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish_bar(pb: &ProgressBar, total: usize) {
    if pb.is_hidden() {
        return;
    }
    pb.set_style(ProgressStyle::with_template("{prefix:.bold.green} {wide_msg}").unwrap());
    pb.finish_with_message(format!("✓ {total} points matched"));
}
