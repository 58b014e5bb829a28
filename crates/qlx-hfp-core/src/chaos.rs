//! Chaos + harmonic generator (C2).
//!
//! Produces a deterministic, zero-mean/unit-variance real stream from a seed
//! phrase by blending a logistic-map chaos sequence with a φ-weighted
//! harmonic comb. Every step is specified to the bit: any drift here breaks
//! both the fingerprint and any independent verifier.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

const R: f64 = 3.99;
const BURN_IN: usize = 2048;
const PHI: f64 = 1.618_033_988_75;
const HARMONICS: [u32; 7] = [3, 6, 9, 27, 54, 111, 216];
const CARRIER_GAIN: f64 = 0.30;
const STD_EPS: f64 = 1e-12;
const WEIGHT_EPS: f64 = 1e-15;

/// The default stream length used across golden vectors and CLI defaults.
pub const DEFAULT_N: usize = 8192;

/// `SHA-256(seed)`, exposed separately because both the chaos x0 seed and the
/// KDF salt derive from different slices of the same digest.
pub fn seed_digest(seed: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.finalize().into()
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Iterate the logistic map `x_{i+1} = r * x_i * (1 - x_i)` for `n + burn`
/// steps starting from `x0`, discarding the first `burn` samples.
pub fn logistic_map(n: usize, r: f64, x0: f64, burn: usize) -> Vec<f64> {
    let mut x = x0;
    let mut out = Vec::with_capacity(n);
    for i in 0..(n + burn) {
        if i >= burn {
            out.push(x);
        }
        x = r * x * (1.0 - x);
    }
    out
}

/// Standardize `xs` to zero mean and unit population standard deviation
/// (ddof 0, denominator `len(xs)`), guarding the divisor against zero
/// variance with `eps`.
pub fn standardize(xs: &mut [f64], eps: f64) {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    let std = var.sqrt() + eps;
    for x in xs.iter_mut() {
        *x = (*x - mean) / std;
    }
}

/// The φ-weighted harmonic comb, phase-randomized from `phase_seed`.
///
/// The phase generator is pinned to `ChaCha20Rng` seeded from `phase_seed`
/// zero-extended into a 32-byte seed (see design notes §9): this is the
/// explicit, portable resolution of the spec's phase-RNG open question.
pub fn harmonic_comb(n: usize, freqs: &[u32], phase_seed: u32) -> Vec<f64> {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[..4].copy_from_slice(&phase_seed.to_le_bytes());
    let mut rng = ChaCha20Rng::from_seed(seed_bytes);

    let mut s = vec![0f64; n];
    let mut w_total = 0.0f64;
    for (idx, &f) in freqs.iter().enumerate() {
        let i = idx + 1;
        let w = PHI.powi(-(i as i32));
        w_total += w;
        let phase: f64 = rng.gen::<f64>() * std::f64::consts::TAU;
        for (t, sample) in s.iter_mut().enumerate() {
            *sample += w * (std::f64::consts::TAU * f as f64 * t as f64 + phase).sin();
        }
    }
    let denom = w_total + WEIGHT_EPS;
    for v in s.iter_mut() {
        *v /= denom;
    }
    s
}

/// Produce the blended, standardized stream for `seed` of length `n`.
pub fn stream(seed: &[u8], n: usize) -> Vec<f64> {
    let h = seed_digest(seed);
    let u = f64::from(be_u32(&h[0..4])) / 4_294_967_296.0_f64; // 2^32, exact in f64
    let x0 = 0.2 + 0.6 * u;

    let mut chaos = logistic_map(n, R, x0, BURN_IN);
    standardize(&mut chaos, STD_EPS);

    let phase_seed = be_u32(&h[4..8]);
    let carriers = harmonic_comb(n, &HARMONICS, phase_seed);

    let mut blend: Vec<f64> = chaos
        .iter()
        .zip(carriers.iter())
        .map(|(c, k)| c + CARRIER_GAIN * k)
        .collect();
    standardize(&mut blend, STD_EPS);
    blend
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logistic_map_has_expected_length() {
        let xs = logistic_map(100, R, 0.4, BURN_IN);
        assert_eq!(xs.len(), 100);
    }

    #[test]
    fn standardize_yields_zero_mean_unit_variance() {
        let mut xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        standardize(&mut xs, STD_EPS);
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        assert!(mean.abs() < 1e-9);
        let var = xs.iter().map(|x| x * x).sum::<f64>() / xs.len() as f64;
        assert!((var - 1.0).abs() < 1e-6);
    }

    #[test]
    fn stream_is_deterministic() {
        let a = stream(b"seed-a", 512);
        let b = stream(b"seed-a", 512);
        assert_eq!(a, b);
    }

    #[test]
    fn stream_is_seed_sensitive() {
        let a = stream(b"seed-a", 512);
        let b = stream(b"seed-ax", 512);
        assert_ne!(a, b);
    }

    #[test]
    fn stream_has_requested_length() {
        let s = stream(b"anything", DEFAULT_N);
        assert_eq!(s.len(), DEFAULT_N);
    }
}
