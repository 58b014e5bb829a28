//! Signer/verifier (C6): HMAC-SHA256 and Ed25519 over canonical envelope bytes.
//!
//! Signing always computes over the envelope **without** a `signing` member;
//! the member is attached only once the signature is known. Verifying always
//! strips `signing` before recomputing. Getting this ordering backwards
//! silently produces self-consistent-but-wrong signatures, so it is enforced
//! structurally here rather than left to caller discipline.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::codec::{self, Value};
use crate::error::{Error, Result};
use crate::photonic::Envelope;

type HmacSha256 = Hmac<Sha256>;

/// The `signing` member attached to a finalized envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Signing {
    /// Signature algorithm identifier (`"HMAC-SHA256"` or `"Ed25519"`).
    pub alg: String,
    /// Caller-assigned key identifier.
    pub key_id: String,
    /// Reserved nonce field, always empty in this pipeline.
    pub nonce: String,
    /// ISO-8601 UTC timestamp of the signing operation.
    pub timestamp: String,
    /// Lowercase-hex signature bytes.
    pub sig: String,
}

/// A signed envelope: the unsigned envelope plus its `signing` member.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedEnvelope {
    /// The envelope that was signed.
    pub envelope: Envelope,
    /// The attached signature metadata.
    pub signing: Signing,
}

impl SignedEnvelope {
    /// The full canonical [`Value`], including `signing`.
    pub fn to_value(&self) -> Value {
        let Value::Map(mut map) = self.envelope.to_value() else {
            unreachable!("Envelope::to_value always returns a Map");
        };
        map.insert(
            "signing".to_string(),
            Value::map([
                ("alg", Value::Str(self.signing.alg.clone())),
                ("key_id", Value::Str(self.signing.key_id.clone())),
                ("nonce", Value::Str(self.signing.nonce.clone())),
                ("timestamp", Value::Str(self.signing.timestamp.clone())),
                ("sig", Value::Str(self.signing.sig.clone())),
            ]),
        );
        Value::Map(map)
    }
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Sign `envelope` with an HMAC-SHA256 key.
pub fn sign_hmac(envelope: &Envelope, key: &[u8], key_id: &str) -> Result<SignedEnvelope> {
    let msg = codec::canonical_bytes(&envelope.to_value())?;
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::signature(format!("bad HMAC key: {e}")))?;
    mac.update(&msg);
    let sig = hex::encode(mac.finalize().into_bytes());

    Ok(SignedEnvelope {
        envelope: envelope.clone(),
        signing: Signing {
            alg: "HMAC-SHA256".to_string(),
            key_id: key_id.to_string(),
            nonce: String::new(),
            timestamp: now_iso(),
            sig,
        },
    })
}

/// Sign `envelope` with an Ed25519 signing key.
pub fn sign_ed25519(envelope: &Envelope, signing_key: &SigningKey, key_id: &str) -> Result<SignedEnvelope> {
    let msg = codec::canonical_bytes(&envelope.to_value())?;
    let sig = signing_key.sign(&msg);

    Ok(SignedEnvelope {
        envelope: envelope.clone(),
        signing: Signing {
            alg: "Ed25519".to_string(),
            key_id: key_id.to_string(),
            nonce: String::new(),
            timestamp: now_iso(),
            sig: hex::encode(sig.to_bytes()),
        },
    })
}

/// The outcome of a signature verification. Distinguishes an outright
/// mismatch from an ambiguous case (missing or unrecognized algorithm), as
/// required by the design notes.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// The signature matches.
    Valid,
    /// The signature was checked and does not match.
    Invalid,
    /// The algorithm was absent or unrecognized; no check could be performed.
    Unknown(String),
}

impl VerifyOutcome {
    /// `true` only for [`VerifyOutcome::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Verify a signed envelope against an HMAC-SHA256 key.
pub fn verify_hmac(signed: &SignedEnvelope, key: &[u8]) -> Result<VerifyOutcome> {
    if signed.signing.alg != "HMAC-SHA256" {
        return Ok(VerifyOutcome::Unknown(format!(
            "not an HMAC-SHA256 signature: alg={}",
            signed.signing.alg
        )));
    }
    let msg = codec::canonical_bytes(&signed.envelope.to_value())?;
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| Error::signature(format!("bad HMAC key: {e}")))?;
    mac.update(&msg);
    let expected = hex::encode(mac.finalize().into_bytes());
    Ok(if expected == signed.signing.sig {
        VerifyOutcome::Valid
    } else {
        VerifyOutcome::Invalid
    })
}

/// Verify a signed envelope against an Ed25519 verifying key.
pub fn verify_ed25519(signed: &SignedEnvelope, verifying_key: &VerifyingKey) -> Result<VerifyOutcome> {
    if signed.signing.alg != "Ed25519" {
        return Ok(VerifyOutcome::Unknown(format!(
            "not an Ed25519 signature: alg={}",
            signed.signing.alg
        )));
    }
    let sig_bytes = hex::decode(&signed.signing.sig)?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| Error::signature("Ed25519 signature must be 64 bytes"))?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
    let msg = codec::canonical_bytes(&signed.envelope.to_value())?;
    Ok(match verifying_key.verify(&msg, &sig) {
        Ok(()) => VerifyOutcome::Valid,
        Err(_) => VerifyOutcome::Invalid,
    })
}

/// Verify using whichever algorithm `signed.signing.alg` names, given both
/// key material options; returns `Unknown` if neither key matches the
/// declared algorithm.
pub fn verify_auto(
    signed: &SignedEnvelope,
    hmac_key: Option<&[u8]>,
    ed25519_key: Option<&VerifyingKey>,
) -> Result<VerifyOutcome> {
    match signed.signing.alg.as_str() {
        "HMAC-SHA256" => match hmac_key {
            Some(k) => verify_hmac(signed, k),
            None => Ok(VerifyOutcome::Unknown("HMAC key not provided".to_string())),
        },
        "Ed25519" => match ed25519_key {
            Some(k) => verify_ed25519(signed, k),
            None => Ok(VerifyOutcome::Unknown("Ed25519 key not provided".to_string())),
        },
        other => Ok(VerifyOutcome::Unknown(format!("unrecognized alg: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hfp;
    use crate::photonic::{build_envelope, photonic_map, EnvelopeOptions};
    use ed25519_dalek::SigningKey;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn sample_envelope() -> Envelope {
        let hfp = hfp::assemble(b"qlx-demo-seed-phi369", 5).unwrap();
        let raw = photonic_map(&hfp.band_stats);
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        build_envelope(&hfp.fingerprint_hash, &raw, EnvelopeOptions::default(), &mut rng).unwrap()
    }

    #[test]
    fn hmac_round_trips() {
        let env = sample_envelope();
        let signed = sign_hmac(&env, b"test-key", "ctrl-01").unwrap();
        assert_eq!(signed.signing.alg, "HMAC-SHA256");
        assert_eq!(signed.signing.sig.len(), 64);
        assert!(verify_hmac(&signed, b"test-key").unwrap().is_valid());
    }

    #[test]
    fn hmac_rejects_tampered_params() {
        let env = sample_envelope();
        let mut signed = sign_hmac(&env, b"test-key", "ctrl-01").unwrap();
        signed.envelope.params.alpha[0] += 1e-6;
        assert_eq!(verify_hmac(&signed, b"test-key").unwrap(), VerifyOutcome::Invalid);
    }

    #[test]
    fn ed25519_round_trips() {
        let env = sample_envelope();
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let signing_key = SigningKey::generate(&mut rng);
        let signed = sign_ed25519(&env, &signing_key, "ctrl-ed25519").unwrap();
        assert_eq!(signed.signing.alg, "Ed25519");
        let verify_key = signing_key.verifying_key();
        assert!(verify_ed25519(&signed, &verify_key).unwrap().is_valid());
    }

    #[test]
    fn unknown_alg_is_distinct_from_invalid() {
        let env = sample_envelope();
        let mut signed = sign_hmac(&env, b"test-key", "ctrl-01").unwrap();
        signed.signing.alg = "ROT13".to_string();
        let outcome = verify_hmac(&signed, b"test-key").unwrap();
        assert!(matches!(outcome, VerifyOutcome::Unknown(_)));
        assert_ne!(outcome, VerifyOutcome::Invalid);
    }
}
