//! Random payloads for write operations.

use bytes::Bytes;
use rand::{Rng, RngCore};

/// The smallest payload in bytes.
pub const MIN_PAYLOAD_SIZE: usize = 200;
/// The largest payload in bytes (inclusive).
pub const MAX_PAYLOAD_SIZE: usize = 2000;

/// Generates a payload with a uniformly random length in
/// [`MIN_PAYLOAD_SIZE`]`..=`[`MAX_PAYLOAD_SIZE`].
///
/// About half of the payloads are *compressible*: every byte holds the same randomly chosen value
/// in `0..16`. The other half is filled with random bytes and does not compress.
///
/// The generator holds no state, so it can be called concurrently with a thread-local RNG.
pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Bytes {
    let size = rng.random_range(MIN_PAYLOAD_SIZE..=MAX_PAYLOAD_SIZE);

    if rng.random_bool(0.5) {
        let value = rng.random_range(0..16u8);
        return Bytes::from(vec![value; size]);
    }

    let mut payload = vec![0; size];
    rng.fill_bytes(&mut payload);
    Bytes::from(payload)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn sizes_within_bounds() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let payload = generate(&mut rng);
            assert!((MIN_PAYLOAD_SIZE..=MAX_PAYLOAD_SIZE).contains(&payload.len()));
        }
    }

    #[test]
    fn mixes_compressible_and_random() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut compressible = 0;

        for _ in 0..1000 {
            let payload = generate(&mut rng);
            let first = payload[0];
            if payload.iter().all(|&b| b == first) {
                assert!(first < 16);
                compressible += 1;
            }
        }

        // Random payloads of at least 200 bytes are practically never uniform.
        assert!((350..=650).contains(&compressible), "{compressible}");
    }
}
