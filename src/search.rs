//! Per-point search kernels and the buffers they write into.
//!
//! All three kernels (forward top-k, reverse best, brute-force pair) work
//! in proxy units; the caller converts to arcseconds once the whole run is
//! merged. The bucketed kernels expand the depth-cache rings around the
//! query's cell and stop as soon as the register's worst distance is
//! covered by the radius the scanned rings guarantee.

use ndarray::Array2;

use crate::depth::DepthCache;
use crate::grid::BucketGrid;
use crate::matcher::{MISSING, MatchError};
use crate::sphere::{angular_distance_arcsec, distance_proxy, proxy_from_arcsec};

/// A catalog readied for matching: the degree inputs plus the radian
/// coordinates and declination cosines the proxy needs.
#[derive(Debug)]
pub struct PreparedCatalog<'a> {
    pub ra_deg: &'a [f64],
    pub dec_deg: &'a [f64],
    pub ra: Vec<f64>,
    pub dec: Vec<f64>,
    pub cos_dec: Vec<f64>,
}

impl<'a> PreparedCatalog<'a> {
    pub fn prepare(ra_deg: &'a [f64], dec_deg: &'a [f64]) -> Result<Self, MatchError> {
        if ra_deg.len() != dec_deg.len() {
            return Err(MatchError::ShapeMismatch {
                ra: ra_deg.len(),
                dec: dec_deg.len(),
            });
        }

        let ra: Vec<f64> = ra_deg.iter().map(|v| v.to_radians()).collect();
        let dec: Vec<f64> = dec_deg.iter().map(|v| v.to_radians()).collect();
        let cos_dec: Vec<f64> = dec.iter().map(|v| v.cos()).collect();

        Ok(PreparedCatalog {
            ra_deg,
            dec_deg,
            ra,
            dec,
            cos_dec,
        })
    }

    pub fn len(&self) -> usize {
        self.ra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ra.is_empty()
    }
}

/// Read-only state shared by every worker of one match run.
pub struct MatchContext<'a> {
    pub cat1: &'a PreparedCatalog<'a>,
    pub cat2: &'a PreparedCatalog<'a>,
    /// Effective neighbor count (already clamped to the size of catalog 2).
    pub nth: usize,
    pub self_match: bool,
}

impl MatchContext<'_> {
    /// Proxy distance between catalog-1 point `i` and catalog-2 point `j`.
    #[inline]
    pub fn proxy(&self, i: usize, j: usize) -> f64 {
        distance_proxy(
            self.cat1.ra[i],
            self.cat1.dec[i],
            self.cat1.cos_dec[i],
            self.cat2.ra[j],
            self.cat2.dec[j],
            self.cat2.cos_dec[j],
        )
    }
}

/// One worker's result buffers, in proxy units until the final conversion.
///
/// `id`/`d` have one column per catalog-1 point and one row per requested
/// neighbor; rows past the effective neighbor count stay `(MISSING, +∞)`.
pub struct MatchBuffers {
    pub id: Array2<usize>,
    pub d: Array2<f64>,
    pub rid: Vec<usize>,
    pub rd: Vec<f64>,
}

impl MatchBuffers {
    pub fn new(rows: usize, n1: usize, n2: usize) -> Self {
        MatchBuffers {
            id: Array2::from_elem((rows, n1), MISSING),
            d: Array2::from_elem((rows, n1), f64::INFINITY),
            rid: vec![MISSING; n2],
            rd: vec![f64::INFINITY; n2],
        }
    }

    /// Offer candidate `j` at proxy distance `sd` to column `i`'s register.
    ///
    /// The column is kept sorted ascending over the first `nth` rows, so the
    /// entry at `nth - 1` is the current pruning radius and rejection is a
    /// single compare. On acceptance the worst entry is replaced and bubbled
    /// back into place.
    #[inline]
    pub fn push_neighbor(&mut self, nth: usize, i: usize, j: usize, sd: f64) {
        if sd < self.d[[nth - 1, i]] {
            self.d[[nth - 1, i]] = sd;
            self.id[[nth - 1, i]] = j;
            let mut k = nth - 1;
            while k > 0 && self.d[[k - 1, i]] > self.d[[k, i]] {
                self.d.swap([k - 1, i], [k, i]);
                self.id.swap([k - 1, i], [k, i]);
                k -= 1;
            }
        }
    }
}

/// Fill column `i` with the `nth` nearest catalog-2 points of catalog-1
/// point `i`.
///
/// Rings are scanned outward until the register's worst distance is within
/// the guaranteed-searched radius. `2·cell_dist` is the margin for the
/// query sitting anywhere inside its cell rather than at its center.
pub fn forward_search(
    ctx: &MatchContext<'_>,
    grid: &BucketGrid,
    depths: &mut DepthCache,
    out: &mut MatchBuffers,
    i: usize,
) {
    let (x0, y0) = grid.cells1[i];
    let (cra, cdec) = grid.cell_center(x0, y0);
    let cell_dist = angular_distance_arcsec(ctx.cat1.ra_deg[i], ctx.cat1.dec_deg[i], cra, cdec);

    let max_depth = grid.max_depth();
    let mut depth = 0;
    loop {
        let ring = depths.ring(depth);
        for b in 0..ring.dx.len() {
            let x = x0 as i64 + ring.dx[b];
            let y = y0 as i64 + ring.dy[b];
            if x < 0 || x as usize >= grid.nx || y < 0 || y as usize >= grid.ny {
                continue;
            }

            for &j in &grid.bucket(x as usize, y as usize).ids2 {
                if ctx.self_match && i == j {
                    continue;
                }
                let sd = ctx.proxy(i, j);
                out.push_neighbor(ctx.nth, i, j, sd);
            }
        }

        let reached = proxy_from_arcsec((ring.max_dist - 2.0 * cell_dist).max(0.0));
        if out.d[[ctx.nth - 1, i]] <= reached {
            break;
        }

        depth += 1;
        if depth > max_depth {
            // Every further ring lies outside the grid; whatever is still
            // missing does not exist.
            break;
        }
    }
}

/// Fill `rid[j]`/`rd[j]` with the single nearest catalog-1 point of
/// catalog-2 point `j`. Same ring expansion as the forward kernel, with a
/// one-entry register.
pub fn reverse_search(
    ctx: &MatchContext<'_>,
    grid: &BucketGrid,
    depths: &mut DepthCache,
    out: &mut MatchBuffers,
    j: usize,
) {
    let (x0, y0) = grid.cells2[j];
    let (cra, cdec) = grid.cell_center(x0, y0);
    let cell_dist = angular_distance_arcsec(ctx.cat2.ra_deg[j], ctx.cat2.dec_deg[j], cra, cdec);

    let max_depth = grid.max_depth();
    let mut depth = 0;
    loop {
        let ring = depths.ring(depth);
        for b in 0..ring.dx.len() {
            let x = x0 as i64 + ring.dx[b];
            let y = y0 as i64 + ring.dy[b];
            if x < 0 || x as usize >= grid.nx || y < 0 || y as usize >= grid.ny {
                continue;
            }

            for &i in &grid.bucket(x as usize, y as usize).ids1 {
                let sd = ctx.proxy(i, j);
                if sd < out.rd[j] {
                    out.rd[j] = sd;
                    out.rid[j] = i;
                }
            }
        }

        let reached = proxy_from_arcsec((ring.max_dist - 2.0 * cell_dist).max(0.0));
        if out.rd[j] <= reached {
            break;
        }

        depth += 1;
        if depth > max_depth {
            break;
        }
    }
}

/// One step of the brute-force scan: fold pair `(i, j)` into both the
/// forward register and the reverse best.
#[inline]
pub fn brute_force_pair(ctx: &MatchContext<'_>, out: &mut MatchBuffers, i: usize, j: usize) {
    let sd = ctx.proxy(i, j);

    out.push_neighbor(ctx.nth, i, j, sd);

    if sd < out.rd[j] {
        out.rd[j] = sd;
        out.rid[j] = i;
    }
}
