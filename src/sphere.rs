//! Angular primitives on the celestial sphere.
//!
//! Coordinates enter in degrees and are converted to radians once per
//! catalog. The matching kernels order candidates by a half-chord-squared
//! proxy that needs only sines and products; converting back to a true
//! angular separation happens once, on the final result arrays.

use std::f64::consts::FRAC_PI_2;

/// Arcseconds per radian.
pub const ARCSEC_PER_RAD: f64 = 3600.0 * 180.0 / std::f64::consts::PI;

/// Half-chord-squared distance proxy between two points in radians.
///
/// `P = sin²(Δdec/2) + sin²(Δra/2)·cos(dec_a)·cos(dec_b)` is strictly
/// monotone in the great-circle separation over `[0, π]`, so any ordering
/// or comparison computed with it matches the one computed with the true
/// distance. The declination cosines are taken precomputed.
#[inline]
pub fn distance_proxy(
    ra_a: f64,
    dec_a: f64,
    cdec_a: f64,
    ra_b: f64,
    dec_b: f64,
    cdec_b: f64,
) -> f64 {
    let sra = (0.5 * (ra_b - ra_a)).sin();
    let sde = (0.5 * (dec_b - dec_a)).sin();
    sde * sde + sra * sra * cdec_a * cdec_b
}

/// Great-circle separation between two points in degrees, in arcseconds
/// (haversine form).
pub fn angular_distance_arcsec(ra_a: f64, dec_a: f64, ra_b: f64, dec_b: f64) -> f64 {
    let da = dec_a.to_radians();
    let db = dec_b.to_radians();
    let p = distance_proxy(
        ra_a.to_radians(),
        da,
        da.cos(),
        ra_b.to_radians(),
        db,
        db.cos(),
    );
    arcsec_from_proxy(p)
}

/// Convert an angular separation in arcseconds to proxy units.
///
/// The half-angle is clamped to `π/2` so the proxy saturates at 1 instead
/// of wrapping for separations past the antipode; the pruning bound stays
/// monotone no matter how far the ring scan reaches.
#[inline]
pub fn proxy_from_arcsec(dist: f64) -> f64 {
    let half = (0.5 * dist / ARCSEC_PER_RAD).min(FRAC_PI_2);
    let s = half.sin();
    s * s
}

/// Convert a proxy value back to arcseconds. Infinite proxies (empty
/// result slots) stay infinite.
#[inline]
pub fn arcsec_from_proxy(p: f64) -> f64 {
    if p.is_finite() {
        2.0 * p.sqrt().min(1.0).asin() * ARCSEC_PER_RAD
    } else {
        f64::INFINITY
    }
}
