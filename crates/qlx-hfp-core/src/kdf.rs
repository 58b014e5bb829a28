//! KDF family (C7): HKDF-SHA512, scrypt, and Argon2id, all salted from the
//! HFP fingerprint.

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha512;

use crate::error::{Error, Result};

const HKDF_INFO: &[u8] = b"QLX-HFP-KDF";
const SCRYPT_FLOOR_LOG2_N: u8 = 12;

/// `salt = first 16 bytes of hex_decode(fingerprint_hash)`, shared by all three KDFs.
pub fn salt_from_fingerprint(fingerprint_hash: &str) -> Result<[u8; 16]> {
    if fingerprint_hash.len() < 32 {
        return Err(Error::input("fingerprint hash too short to derive a salt"));
    }
    let bytes = hex::decode(&fingerprint_hash[..32])?;
    bytes
        .try_into()
        .map_err(|_| Error::input("fingerprint hash prefix did not decode to 16 bytes"))
}

/// Derive `key_len` octets with HKDF-SHA512, `info = "QLX-HFP-KDF"`.
pub fn derive_hkdf(password: &[u8], fingerprint_hash: &str, key_len: usize) -> Result<Vec<u8>> {
    let salt = salt_from_fingerprint(fingerprint_hash)?;
    let hk = Hkdf::<Sha512>::new(Some(&salt), password);
    let mut okm = vec![0u8; key_len];
    hk.expand(HKDF_INFO, &mut okm)
        .map_err(|e| Error::input(format!("HKDF expand failed: {e}")))?;
    Ok(okm)
}

/// scrypt parameters. Defaults: `N = 2^14`, `r = 8`, `p = 1`.
#[derive(Debug, Clone, Copy)]
pub struct ScryptParams {
    /// CPU/memory cost exponent: actual cost factor is `2^log2_n`.
    pub log2_n: u8,
    /// Block size.
    pub r: u32,
    /// Parallelization factor.
    pub p: u32,
}

impl Default for ScryptParams {
    fn default() -> Self {
        Self { log2_n: 14, r: 8, p: 1 }
    }
}

/// Derive `key_len` octets with scrypt. On allocation failure, halves `N`
/// (decrements `log2_n`) down to `2^12` before surfacing a [`Error::ResourceLimit`].
pub fn derive_scrypt(password: &[u8], fingerprint_hash: &str, key_len: usize, params: ScryptParams) -> Result<Vec<u8>> {
    let salt = salt_from_fingerprint(fingerprint_hash)?;
    let mut log2_n = params.log2_n;
    loop {
        let scrypt_params = scrypt::Params::new(log2_n, params.r, params.p, key_len)
            .map_err(|e| Error::input(format!("invalid scrypt params: {e}")))?;
        let mut out = vec![0u8; key_len];
        match scrypt::scrypt(password, &salt, &scrypt_params, &mut out) {
            Ok(()) => return Ok(out),
            Err(_) if log2_n > SCRYPT_FLOOR_LOG2_N => {
                log2_n -= 1;
            }
            Err(e) => {
                return Err(Error::resource_limit(
                    format!("scrypt allocation failed: {e}"),
                    u64::from(params.log2_n),
                    u64::from(SCRYPT_FLOOR_LOG2_N),
                ))
            }
        }
    }
}

/// Argon2id parameters. Defaults: `time_cost = 2`, `memory = 64 MiB`, `parallelism = 1`.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    /// Number of iterations.
    pub time_cost: u32,
    /// Memory cost in KiB.
    pub memory_cost_kib: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            time_cost: 2,
            memory_cost_kib: 64 * 1024,
            parallelism: 1,
        }
    }
}

/// Derive `key_len` octets with Argon2id. Surfaces [`Error::ResourceLimit`]
/// directly on failure — unlike scrypt, there is no auto-degrade path.
pub fn derive_argon2id(
    password: &[u8],
    fingerprint_hash: &str,
    key_len: usize,
    params: Argon2Params,
) -> Result<Vec<u8>> {
    let salt = salt_from_fingerprint(fingerprint_hash)?;
    let argon2_params = Params::new(params.memory_cost_kib, params.time_cost, params.parallelism, Some(key_len))
        .map_err(|e| Error::resource_limit(format!("argon2id: {e}"), u64::from(params.memory_cost_kib), 0))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);
    let mut out = vec![0u8; key_len];
    argon2
        .hash_password_into(password, &salt, &mut out)
        .map_err(|e| Error::resource_limit(format!("argon2id: {e}"), u64::from(params.memory_cost_kib), 0))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hfp;

    fn fingerprint() -> String {
        hfp::assemble(b"seed-for-kdf", 5).unwrap().fingerprint_hash
    }

    #[test]
    fn hkdf_returns_requested_length() {
        let key = derive_hkdf(b"demo-password", &fingerprint(), 32).unwrap();
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn scrypt_returns_requested_length() {
        let key = derive_scrypt(b"demo-password", &fingerprint(), 32, ScryptParams::default()).unwrap();
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn argon2id_returns_requested_length() {
        let key = derive_argon2id(b"demo-password", &fingerprint(), 32, Argon2Params::default()).unwrap();
        assert_eq!(key.len(), 32);
    }

    #[test]
    fn kdfs_are_deterministic() {
        let fp = fingerprint();
        let a = derive_hkdf(b"demo-password", &fp, 32).unwrap();
        let b = derive_hkdf(b"demo-password", &fp, 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn kdfs_are_pairwise_distinct() {
        let fp = fingerprint();
        let hkdf_key = derive_hkdf(b"demo-password", &fp, 32).unwrap();
        let scrypt_key = derive_scrypt(b"demo-password", &fp, 32, ScryptParams::default()).unwrap();
        let argon2_key = derive_argon2id(b"demo-password", &fp, 32, Argon2Params::default()).unwrap();
        assert_ne!(hkdf_key, scrypt_key);
        assert_ne!(hkdf_key, argon2_key);
        assert_ne!(scrypt_key, argon2_key);
    }
}
