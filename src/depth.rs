//! Concentric rings of grid-cell offsets, ordered by the radius they
//! enclose.
//!
//! Ring `d` lists the cell offsets first reached when the search radius
//! grows to `C·(d + 0.5)` arcseconds, `C` being the grid cell edge. After
//! scanning rings `0..=d` every cell whose nearest corner lies within that
//! radius of the query cell's center has been visited, which is exactly
//! what the kernels' pruning bound relies on.

/// One ring of newly reached cell offsets and the radius it closes.
#[derive(Debug, Clone)]
pub struct Ring {
    pub dx: Vec<i64>,
    pub dy: Vec<i64>,
    /// Radius guaranteed covered once this ring is scanned, arcseconds.
    pub max_dist: f64,
}

/// Number of rings generated eagerly at construction. Queries rarely need
/// more; anything deeper is grown on demand.
const SEED_DEPTH: usize = 10;

/// Lazily grown catalog of offset rings.
///
/// Growth mutates the visited mask, so every worker takes a clone of the
/// seeded prototype instead of sharing one cache.
#[derive(Debug, Clone)]
pub struct DepthCache {
    cell_size: f64,
    rings: Vec<Ring>,
    /// Visited mask for the enumerated quadrant, `side × side`, indexed
    /// `x * side + y`.
    visited: Vec<bool>,
    side: usize,
}

impl DepthCache {
    /// Build a cache for grid cells of `cell_size` arcseconds, seeded
    /// through depth 10.
    pub fn new(cell_size: f64) -> Self {
        let side = SEED_DEPTH + 1;
        let mut cache = DepthCache {
            cell_size,
            rings: Vec::with_capacity(SEED_DEPTH + 1),
            visited: vec![false; side * side],
            side,
        };

        // The first ring is trivial: the query's own cell.
        cache.rings.push(Ring {
            dx: vec![0],
            dy: vec![0],
            max_dist: cell_size / 2.0,
        });
        cache.visited[0] = true;

        while cache.rings.len() <= SEED_DEPTH {
            cache.grow();
        }

        cache
    }

    /// Number of rings currently generated.
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Ring at `depth`, generating any missing rings first.
    pub fn ring(&mut self, depth: usize) -> &Ring {
        while depth >= self.rings.len() {
            self.grow();
        }
        &self.rings[depth]
    }

    fn grow(&mut self) {
        let d = self.rings.len();
        self.ensure_side(d + 1);

        let max_dist = self.cell_size * (d as f64 + 0.5);
        let limit_sq = max_dist * max_dist;
        let cs_sq = self.cell_size * self.cell_size;

        // Enumerate one quadrant; the other three follow by symmetry.
        let mut dx: Vec<i64> = Vec::new();
        let mut dy: Vec<i64> = Vec::new();
        for x in 1..=d {
            for y in 0..=d {
                if self.visited[x * self.side + y] {
                    continue;
                }

                let xf = x as f64;
                let yf = y as f64;
                // Distance from the query cell's center to the nearest of
                // the offset cell's four corners.
                let corners = [
                    (xf - 0.5) * (xf - 0.5) + (yf - 0.5) * (yf - 0.5),
                    (xf + 0.5) * (xf + 0.5) + (yf - 0.5) * (yf - 0.5),
                    (xf + 0.5) * (xf + 0.5) + (yf + 0.5) * (yf + 0.5),
                    (xf - 0.5) * (xf - 0.5) + (yf + 0.5) * (yf + 0.5),
                ];
                let dist_sq = cs_sq * corners.iter().fold(f64::INFINITY, |a, &b| a.min(b));

                if dist_sq <= limit_sq {
                    dx.push(x as i64);
                    dy.push(y as i64);
                    self.visited[x * self.side + y] = true;
                }
            }
        }

        // Quarter-turn images of the quadrant: (-y, x), (-x, -y), (y, -x).
        let n_new = dx.len();
        for b in 0..n_new {
            let (x, y) = (dx[b], dy[b]);
            dx.push(-y);
            dy.push(x);
            dx.push(-x);
            dy.push(-y);
            dx.push(y);
            dy.push(-x);
        }

        self.rings.push(Ring { dx, dy, max_dist });
    }

    fn ensure_side(&mut self, need: usize) {
        if need <= self.side {
            return;
        }
        let mut visited = vec![false; need * need];
        for x in 0..self.side {
            for y in 0..self.side {
                visited[x * need + y] = self.visited[x * self.side + y];
            }
        }
        self.visited = visited;
        self.side = need;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn first_ring_is_the_origin_cell() {
        let mut cache = DepthCache::new(10.0);
        let ring = cache.ring(0);
        assert_eq!(ring.dx, vec![0]);
        assert_eq!(ring.dy, vec![0]);
        assert!((ring.max_dist - 5.0).abs() < 1e-12);
    }

    #[test]
    fn second_ring_is_the_eight_surrounding_cells() {
        let mut cache = DepthCache::new(1.0);
        let ring = cache.ring(1);
        let offsets: HashSet<(i64, i64)> = ring.dx.iter().zip(&ring.dy).map(|(&x, &y)| (x, y)).collect();
        let expected: HashSet<(i64, i64)> = [
            (1, 0),
            (1, 1),
            (0, 1),
            (-1, 1),
            (-1, 0),
            (-1, -1),
            (0, -1),
            (1, -1),
        ]
        .into_iter()
        .collect();
        assert_eq!(offsets, expected);
        assert!((ring.max_dist - 1.5).abs() < 1e-12);
    }

    #[test]
    fn seeded_depth() {
        let cache = DepthCache::new(1.0);
        assert_eq!(cache.len(), SEED_DEPTH + 1);
        assert!(!cache.is_empty());
    }

    #[test]
    fn grows_on_demand() {
        let mut cache = DepthCache::new(1.0);
        let before = cache.len();
        cache.ring(before + 7);
        assert_eq!(cache.len(), before + 8);
    }

    #[test]
    fn max_dist_is_strictly_increasing() {
        let mut cache = DepthCache::new(2.5);
        let mut last = f64::NEG_INFINITY;
        for d in 0..30 {
            let m = cache.ring(d).max_dist;
            assert!(m > last, "max_dist not increasing at depth {d}");
            last = m;
        }
    }

    #[test]
    fn rings_are_disjoint_and_cover_the_plane() {
        let mut cache = DepthCache::new(1.0);
        let mut seen: HashSet<(i64, i64)> = HashSet::new();

        let deep = 25;
        for d in 0..=deep {
            let ring = cache.ring(d).clone();
            for (&x, &y) in ring.dx.iter().zip(&ring.dy) {
                assert!(
                    seen.insert((x, y)),
                    "offset ({x}, {y}) appears in more than one ring"
                );
            }
        }

        // Every offset within a comfortable Chebyshev radius must have been
        // assigned to exactly one of the scanned rings.
        let radius = (deep as f64 / std::f64::consts::SQRT_2).floor() as i64 - 1;
        for x in -radius..=radius {
            for y in -radius..=radius {
                assert!(seen.contains(&(x, y)), "offset ({x}, {y}) never reached");
            }
        }
    }

    #[test]
    fn offsets_respect_the_ring_radius() {
        let cell = 3.0;
        let mut cache = DepthCache::new(cell);
        for d in 1..20 {
            let ring = cache.ring(d).clone();
            for (&x, &y) in ring.dx.iter().zip(&ring.dy) {
                let xf = x.abs() as f64;
                let yf = y.abs() as f64;
                let nearest_sq = (xf - 0.5) * (xf - 0.5) + (yf - 0.5) * (yf - 0.5);
                assert!(
                    cell * cell * nearest_sq <= ring.max_dist * ring.max_dist + 1e-9,
                    "offset ({x}, {y}) lies beyond ring {d}"
                );
                assert!(x.unsigned_abs() as usize <= d && y.unsigned_abs() as usize <= d);
            }
        }
    }
}
