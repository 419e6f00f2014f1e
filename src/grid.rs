//! Rectangular (RA, Dec) bucket grid shared read-only by all workers.
//!
//! The grid covers the union of both catalogs' bounding boxes, padded
//! outward by one cell. Cell sizing targets roughly ten times more cells
//! than the per-query neighbor budget would fill, which keeps the inner
//! scan short without letting the grid explode; the RA step is scaled by
//! the cosine of the second catalog's mean declination to track the
//! shrinking of RA circles away from the equator.

/// One grid cell holding the indices of the points that fall in it.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    /// Indices into catalog 1.
    pub ids1: Vec<usize>,
    /// Indices into catalog 2.
    pub ids2: Vec<usize>,
}

/// Cell-count tuning factor: aim for about this many times more cells than
/// the neighbor budget alone would ask for. Empirical; larger values trade
/// memory for shorter per-cell scans.
const OVERGROWTH: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct BucketGrid {
    /// Number of cells along RA.
    pub nx: usize,
    /// Number of cells along Dec.
    pub ny: usize,
    /// Lower-left corner of the padded grid, degrees.
    pub ra0: f64,
    pub dec0: f64,
    /// Cell extents, degrees per axis.
    pub dra: f64,
    pub ddec: f64,
    /// Cell edge on the sky, arcseconds.
    pub cell_size: f64,
    /// Cell coordinates of every catalog-1 point.
    pub cells1: Vec<(usize, usize)>,
    /// Cell coordinates of every catalog-2 point.
    pub cells2: Vec<(usize, usize)>,
    buckets: Vec<Bucket>,
}

impl BucketGrid {
    /// Build the grid over both catalogs (coordinates in degrees).
    ///
    /// `nth` is the effective neighbor count of the run; it feeds the cell
    /// sizing so that a single cell tends to hold a worthwhile fraction of
    /// a query's candidates.
    pub fn build(ra1: &[f64], dec1: &[f64], ra2: &[f64], dec2: &[f64], nth: usize) -> BucketGrid {
        let rra1 = bounds(ra1);
        let rdec1 = bounds(dec1);
        let rra2 = bounds(ra2);
        let rdec2 = bounds(dec2);

        let mut rra = (rra1.0.min(rra2.0), rra1.1.max(rra2.1));
        let mut rdec = (rdec1.0.min(rdec2.0), rdec1.1.max(rdec2.1));

        // Cells along one axis; the bucket count scales with the second
        // catalog's size so average occupancy stays flat.
        let nc = (0.5 * (std::f64::consts::PI * ra2.len() as f64 / nth as f64 / OVERGROWTH).sqrt())
            .ceil()
            .max(1.0);

        // The convex hull of a bounding rectangle's corners is the
        // rectangle itself.
        let area2 = (rra2.1 - rra2.0) * (rdec2.1 - rdec2.0);
        let mut cell_size = 3600.0 * area2.sqrt() / nc;
        if !(cell_size > 0.0) {
            // Degenerate catalog-2 footprint (single point or collinear):
            // size cells from the union box instead.
            let span = (rra.1 - rra.0).max(rdec.1 - rdec.0);
            cell_size = if span > 0.0 { 3600.0 * span / nc } else { 1.0 };
        }

        // RA and Dec are spherical coordinates: compensate RA compression
        // at the second catalog's mean declination.
        let mean_dec2 = 0.5 * (rdec2.0 + rdec2.1);
        let mut dra = cell_size * mean_dec2.to_radians().cos().abs() / 3600.0;
        let ddec = cell_size / 3600.0;
        if !(dra > 0.0) {
            dra = ddec;
        }

        // Pad by one cell to keep boundary points off the grid edge.
        rra.0 -= dra;
        rra.1 += dra;
        rdec.0 -= ddec;
        rdec.1 += ddec;

        let nx = (((rra.1 - rra.0) / dra) as usize).max(1);
        let ny = (((rdec.1 - rdec.0) / ddec) as usize).max(1);

        let mut grid = BucketGrid {
            nx,
            ny,
            ra0: rra.0,
            dec0: rdec.0,
            dra,
            ddec,
            cell_size,
            cells1: Vec::with_capacity(ra1.len()),
            cells2: Vec::with_capacity(ra2.len()),
            buckets: vec![Bucket::default(); nx * ny],
        };

        for i in 0..ra1.len() {
            let (x, y) = grid.locate(ra1[i], dec1[i]);
            grid.buckets[x * ny + y].ids1.push(i);
            grid.cells1.push((x, y));
        }
        for j in 0..ra2.len() {
            let (x, y) = grid.locate(ra2[j], dec2[j]);
            grid.buckets[x * ny + y].ids2.push(j);
            grid.cells2.push((x, y));
        }

        grid
    }

    /// Cell coordinates of a point, floor-assigned and clamped in bounds.
    #[inline]
    pub fn locate(&self, ra: f64, dec: f64) -> (usize, usize) {
        let x = (((ra - self.ra0) / self.dra).floor().max(0.0) as usize).min(self.nx - 1);
        let y = (((dec - self.dec0) / self.ddec).floor().max(0.0) as usize).min(self.ny - 1);
        (x, y)
    }

    #[inline]
    pub fn bucket(&self, x: usize, y: usize) -> &Bucket {
        &self.buckets[x * self.ny + y]
    }

    /// Center of a cell, degrees.
    #[inline]
    pub fn cell_center(&self, x: usize, y: usize) -> (f64, f64) {
        (
            self.ra0 + (x as f64 + 0.5) * self.dra,
            self.dec0 + (y as f64 + 0.5) * self.ddec,
        )
    }

    /// Depth past which every ring offset lies outside the grid; scanning
    /// beyond it cannot reach anything new.
    pub fn max_depth(&self) -> usize {
        ((self.nx * self.nx + self.ny * self.ny) as f64).sqrt().ceil() as usize + 1
    }
}

fn bounds(v: &[f64]) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &x in v {
        if x < lo {
            lo = x;
        }
        if x > hi {
            hi = x;
        }
    }
    (lo, hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_catalog(n: usize, ra0: f64, dec0: f64, span: f64, seed: u64) -> (Vec<f64>, Vec<f64>) {
        let mut state: u64 = seed;
        let mut rng = move || -> f64 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state as f64) / (u64::MAX as f64)
        };
        let mut ra = Vec::with_capacity(n);
        let mut dec = Vec::with_capacity(n);
        for _ in 0..n {
            ra.push(ra0 + (rng() - 0.5) * span);
            dec.push(dec0 + (rng() - 0.5) * span);
        }
        (ra, dec)
    }

    #[test]
    fn every_point_lands_in_exactly_one_bucket() {
        let (ra1, dec1) = random_catalog(500, 30.0, -10.0, 2.0, 11111);
        let (ra2, dec2) = random_catalog(700, 30.0, -10.0, 2.0, 22222);
        let grid = BucketGrid::build(&ra1, &dec1, &ra2, &dec2, 1);

        let mut count1 = 0;
        let mut count2 = 0;
        for x in 0..grid.nx {
            for y in 0..grid.ny {
                count1 += grid.bucket(x, y).ids1.len();
                count2 += grid.bucket(x, y).ids2.len();
            }
        }
        assert_eq!(count1, 500);
        assert_eq!(count2, 700);

        for (i, &(x, y)) in grid.cells1.iter().enumerate() {
            assert!(x < grid.nx && y < grid.ny);
            assert!(grid.bucket(x, y).ids1.contains(&i));
        }
        for (j, &(x, y)) in grid.cells2.iter().enumerate() {
            assert!(grid.bucket(x, y).ids2.contains(&j));
        }
    }

    #[test]
    fn points_sit_inside_their_cell() {
        let (ra1, dec1) = random_catalog(200, 120.0, 45.0, 3.0, 777);
        let (ra2, dec2) = random_catalog(200, 120.0, 45.0, 3.0, 888);
        let grid = BucketGrid::build(&ra1, &dec1, &ra2, &dec2, 2);

        for (i, &(x, y)) in grid.cells1.iter().enumerate() {
            let (cra, cdec) = grid.cell_center(x, y);
            assert!((ra1[i] - cra).abs() <= 0.5 * grid.dra + 1e-9);
            assert!((dec1[i] - cdec).abs() <= 0.5 * grid.ddec + 1e-9);
        }
    }

    #[test]
    fn padding_keeps_extremes_in_bounds() {
        let ra = vec![0.0, 1.0, 2.0];
        let dec = vec![-1.0, 0.0, 1.0];
        let grid = BucketGrid::build(&ra, &dec, &ra, &dec, 1);

        // Raw floor indices must already be valid without the clamp in
        // `locate`.
        for i in 0..ra.len() {
            let rx = ((ra[i] - grid.ra0) / grid.dra).floor();
            let ry = ((dec[i] - grid.dec0) / grid.ddec).floor();
            assert!(rx >= 0.0 && (rx as usize) < grid.nx);
            assert!(ry >= 0.0 && (ry as usize) < grid.ny);
        }
    }

    #[test]
    fn degenerate_second_catalog() {
        let (ra1, dec1) = random_catalog(50, 10.0, 5.0, 2.0, 999);
        let ra2 = vec![10.0];
        let dec2 = vec![5.0];
        let grid = BucketGrid::build(&ra1, &dec1, &ra2, &dec2, 1);

        assert!(grid.cell_size > 0.0);
        assert!(grid.nx >= 1 && grid.ny >= 1);
        assert_eq!(grid.cells2.len(), 1);
    }

    #[test]
    fn two_single_points() {
        let grid = BucketGrid::build(&[0.0], &[0.0], &[0.0], &[0.0], 1);
        assert!((grid.cell_size - 1.0).abs() < 1e-12);
        assert!(grid.nx >= 1 && grid.ny >= 1);
        assert_eq!(grid.cells1[0], grid.cells2[0]);
    }

    #[test]
    fn collinear_second_catalog() {
        let ra2 = vec![0.0, 0.5, 1.0];
        let dec2 = vec![0.0, 0.0, 0.0];
        let grid = BucketGrid::build(&[0.5], &[0.2], &ra2, &dec2, 1);
        assert!(grid.cell_size > 0.0);
        assert!(grid.max_depth() > 0);
    }
}
