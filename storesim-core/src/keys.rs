//! Skewed key selection for reads and deletes.

use rand::Rng;

/// The skew exponent used by the workload engine.
pub const DEFAULT_SKEW: f64 = 2.5;

/// Picks keys with a strong bias towards low key values.
///
/// A uniform sample `u` in `[0, 1)` is raised to the power of `skew` and scaled to the key range.
/// With `skew > 1`, the result concentrates near zero, so older keys receive the majority of the
/// traffic. This is a cheap hot/cold model, not an exact Zipf distribution.
#[derive(Clone, Copy, Debug)]
pub struct SkewedKeySelector {
    skew: f64,
}

impl SkewedKeySelector {
    /// Creates a selector with the given skew exponent.
    pub fn new(skew: f64) -> Self {
        Self { skew }
    }

    /// Returns a key in `0..upper_bound`.
    ///
    /// Always returns `0` if `upper_bound <= 1`.
    pub fn next_key<R: Rng + ?Sized>(&self, rng: &mut R, upper_bound: u64) -> u64 {
        if upper_bound <= 1 {
            return 0;
        }

        let u: f64 = rng.random();
        let value = u.powf(self.skew);
        // The float-to-int cast saturates, the clamp covers rounding up to `upper_bound`.
        let key = (value * upper_bound as f64) as u64;
        key.min(upper_bound - 1)
    }
}

impl Default for SkewedKeySelector {
    fn default() -> Self {
        Self::new(DEFAULT_SKEW)
    }
}
