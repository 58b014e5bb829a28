//! Controller-side envelope verification (§4.6 supplemental), independent of
//! signature checking: confirms every parameter array agrees with
//! `band_count` and lies strictly inside its open interval.

use ed25519_dalek::VerifyingKey;

use crate::photonic::{bounds_table, clip_open, epsilon, param_keys};
use crate::signing::{verify_auto, SignedEnvelope, VerifyOutcome};

/// The outcome of a full controller-side check: length agreement, range
/// agreement, and (if key material was supplied) signature validity.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationReport {
    /// Every parameter array's length equals `band_count`.
    pub lengths_ok: bool,
    /// Every parameter value is strictly inside its open interval.
    pub ranges_ok: bool,
    /// Signature verification outcome.
    pub sig: VerifyOutcome,
}

impl VerificationReport {
    /// Overall pass/fail: lengths and ranges must hold, and the signature
    /// must be either valid or unchecked (`Unknown`) — an explicit mismatch
    /// fails the envelope.
    pub fn ok(&self) -> bool {
        self.lengths_ok && self.ranges_ok && !matches!(self.sig, VerifyOutcome::Invalid)
    }
}

/// Verify a signed envelope's structural bounds and (optionally) its signature.
pub fn verify_envelope(
    signed: &SignedEnvelope,
    hmac_key: Option<&[u8]>,
    ed25519_key: Option<&VerifyingKey>,
) -> VerificationReport {
    let band_count = signed.envelope.band_count;
    let bits = signed.envelope.dac.width_bits;
    let bounds = bounds_table();

    let mut lengths_ok = true;
    let mut ranges_ok = true;
    for (key, values) in signed.envelope.params.as_pairs() {
        if values.len() != band_count {
            lengths_ok = false;
        }
        let b = bounds.iter().find(|(k, _)| *k == key).unwrap().1;
        let eps = epsilon(b, bits);
        if values.is_empty() {
            ranges_ok = false;
            continue;
        }
        for &v in values {
            let clipped = clip_open(v, b, eps);
            if (clipped - v).abs() > eps * 1e-6 {
                ranges_ok = false;
            }
        }
    }
    debug_assert!(
        param_keys().iter().all(|k| bounds.iter().any(|(bk, _)| bk == k)),
        "bounds_table is missing an entry for a declared parameter key"
    );

    let sig = verify_auto(signed, hmac_key, ed25519_key).unwrap_or_else(|e| VerifyOutcome::Unknown(e.to_string()));

    VerificationReport {
        lengths_ok,
        ranges_ok,
        sig,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hfp;
    use crate::photonic::{build_envelope, photonic_map, EnvelopeOptions};
    use crate::signing::sign_hmac;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn sample_signed() -> SignedEnvelope {
        let hfp = hfp::assemble(b"qlx-demo-seed-phi369", 5).unwrap();
        let raw = photonic_map(&hfp.band_stats);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let env = build_envelope(&hfp.fingerprint_hash, &raw, EnvelopeOptions::default(), &mut rng).unwrap();
        sign_hmac(&env, b"test-key", "ctrl-01").unwrap()
    }

    #[test]
    fn well_formed_envelope_passes() {
        let signed = sample_signed();
        let report = verify_envelope(&signed, Some(b"test-key"), None);
        assert!(report.ok());
        assert!(report.lengths_ok);
        assert!(report.ranges_ok);
        assert!(report.sig.is_valid());
    }

    #[test]
    fn out_of_range_value_fails_ranges_ok() {
        let mut signed = sample_signed();
        let bits = signed.envelope.dac.width_bits;
        let bounds = bounds_table();
        let b = bounds.iter().find(|(k, _)| *k == "I_bias_mA").unwrap().1;
        let eps = epsilon(b, bits);
        signed.envelope.params.i_bias_ma[0] = b.hi - eps / 2.0;
        let report = verify_envelope(&signed, Some(b"test-key"), None);
        assert!(!report.ranges_ok);
        assert!(!report.ok());
    }

    #[test]
    fn length_mismatch_fails_lengths_ok() {
        let mut signed = sample_signed();
        signed.envelope.params.alpha.pop();
        let report = verify_envelope(&signed, Some(b"test-key"), None);
        assert!(!report.lengths_ok);
        assert!(!report.ok());
    }
}
