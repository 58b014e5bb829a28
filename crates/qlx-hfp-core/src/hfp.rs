//! HFP assembler (C4): combines the chaos/harmonic stream and the Haar band
//! statistics into the canonical core record, then fingerprints it.

use sha2::{Digest, Sha512};

use crate::chaos;
use crate::codec::{self, Value};
use crate::error::Result;
use crate::wavelet::{self, BandStats};

const VERSION: &str = "HFP-0.1";
const PHI: f64 = 1.618_033_988_75;
const CARRIER_GAIN: f64 = 0.30;
const CHAOS_R: f64 = 3.99;
const BURN_IN: i64 = 2048;
const SEED_HARMONICS: [u32; 7] = [3, 6, 9, 27, 54, 111, 216];

/// The fully assembled HFP: core fields plus the fields excluded from the
/// hashed form (`timestamp`, `fingerprint_hash`).
#[derive(Debug, Clone, PartialEq)]
pub struct Hfp {
    /// Wavelet decomposition depth.
    pub levels: usize,
    /// Per-band statistics, `levels + 1` entries, approximation first.
    pub band_stats: Vec<BandStats>,
    /// Wall-clock seconds since epoch at assembly time. Excluded from the hash.
    pub timestamp: f64,
    /// `SHA-512(canonical_bytes(core))` as lowercase hex.
    pub fingerprint_hash: String,
}

impl Hfp {
    /// The canonical core record (everything that is hashed).
    pub fn core_value(&self) -> Value {
        core_value(self.levels, &self.band_stats)
    }

    /// The full record (core fields plus `timestamp` and `fingerprint_hash`).
    pub fn full_value(&self) -> Result<Value> {
        let Value::Map(mut map) = self.core_value() else {
            unreachable!("core_value always returns a Map");
        };
        map.insert("timestamp".to_string(), Value::Float(self.timestamp));
        map.insert(
            "fingerprint_hash".to_string(),
            Value::Str(self.fingerprint_hash.clone()),
        );
        Ok(Value::Map(map))
    }
}

fn band_stats_value(stats: &[BandStats]) -> Value {
    Value::Array(
        stats
            .iter()
            .map(|s| {
                Value::map([
                    ("band", Value::Str(s.band.clone())),
                    ("mean", Value::Float(s.mean)),
                    ("std", Value::Float(s.std)),
                    ("entropy", Value::Float(s.entropy)),
                ])
            })
            .collect(),
    )
}

fn core_value(levels: usize, stats: &[BandStats]) -> Value {
    Value::map([
        ("version", Value::Str(VERSION.to_string())),
        ("wavelet_basis", Value::Str("haar".to_string())),
        ("levels", Value::Int(levels as i64)),
        (
            "seed_harmonics",
            Value::Array(SEED_HARMONICS.iter().map(|&f| Value::Int(i64::from(f))).collect()),
        ),
        ("phi", Value::Float(PHI)),
        (
            "chaos",
            Value::map([
                ("type", Value::Str("logistic".to_string())),
                ("params", Value::map([("r", Value::Float(CHAOS_R))])),
                ("burn_in", Value::Int(BURN_IN)),
            ]),
        ),
        (
            "mixer",
            Value::map([("carrier_gain", Value::Float(CARRIER_GAIN))]),
        ),
        ("band_stats", band_stats_value(stats)),
    ])
}

/// Assemble the HFP for `seed` at the given wavelet `levels`, using the
/// default stream length ([`chaos::DEFAULT_N`]).
pub fn assemble(seed: &[u8], levels: usize) -> Result<Hfp> {
    assemble_with_n(seed, levels, chaos::DEFAULT_N)
}

/// Assemble the HFP for `seed`, `levels`, and an explicit stream length `n`.
/// Exposed mainly so tests can use shorter streams; production callers
/// should use [`assemble`].
pub fn assemble_with_n(seed: &[u8], levels: usize, n: usize) -> Result<Hfp> {
    let blend = chaos::stream(seed, n);
    let bands = wavelet::dwt_haar(&blend, levels);
    let band_stats = wavelet::compute_band_stats(&bands, PHI);

    let core = core_value(levels, &band_stats);
    let core_bytes = codec::canonical_bytes(&core)?;
    let fingerprint_hash = hex::encode(Sha512::digest(&core_bytes));

    Ok(Hfp {
        levels,
        band_stats,
        timestamp: now_unix_seconds(),
        fingerprint_hash,
    })
}

fn now_unix_seconds() -> f64 {
    chrono::Utc::now().timestamp() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOLDEN_SEED: &[u8] = b"qlx-demo-seed-phi369";
    const GOLDEN_FINGERPRINT: &str = "ceea6a05abe34fea5110b9e896db16f7159383fb859d0e97fd4be7b8dff36de02ef081c520cbec370d9887a1271e34528927f3bc210bfeda7bccc22d5a60a97c";

    #[test]
    fn reproducible_fingerprint() {
        let a = assemble(GOLDEN_SEED, 5).unwrap();
        let b = assemble(GOLDEN_SEED, 5).unwrap();
        assert_eq!(a.fingerprint_hash, b.fingerprint_hash);
        assert_eq!(a.band_stats, b.band_stats);
    }

    #[test]
    fn fingerprint_matches_pinned_golden_value() {
        let hfp = assemble(GOLDEN_SEED, 5).unwrap();
        assert_eq!(hfp.fingerprint_hash, GOLDEN_FINGERPRINT);
    }

    #[test]
    fn seed_sensitivity() {
        let a = assemble(GOLDEN_SEED, 5).unwrap();
        let b = assemble(b"qlx-demo-seed-phi369x", 5).unwrap();
        assert_ne!(a.fingerprint_hash, b.fingerprint_hash);
    }

    #[test]
    fn core_hash_identity() {
        let hfp = assemble(GOLDEN_SEED, 5).unwrap();
        let core_bytes = codec::canonical_bytes(&hfp.core_value()).unwrap();
        let expect = hex::encode(Sha512::digest(&core_bytes));
        assert_eq!(expect, hfp.fingerprint_hash);
    }

    #[test]
    fn band_count_matches_levels_plus_one() {
        let hfp = assemble(GOLDEN_SEED, 5).unwrap();
        assert_eq!(hfp.band_stats.len(), 6);
    }

    #[test]
    fn fingerprint_is_128_hex_chars() {
        let hfp = assemble(GOLDEN_SEED, 5).unwrap();
        assert_eq!(hfp.fingerprint_hash.len(), 128);
        assert!(hfp.fingerprint_hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn full_value_excludes_timestamp_from_core() {
        let hfp = assemble(GOLDEN_SEED, 5).unwrap();
        let core = hfp.core_value();
        if let Value::Map(m) = &core {
            assert!(!m.contains_key("timestamp"));
            assert!(!m.contains_key("fingerprint_hash"));
        } else {
            panic!("expected Map");
        }
        let full = hfp.full_value().unwrap();
        if let Value::Map(m) = &full {
            assert!(m.contains_key("timestamp"));
            assert!(m.contains_key("fingerprint_hash"));
        } else {
            panic!("expected Map");
        }
    }
}
