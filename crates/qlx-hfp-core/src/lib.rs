//! # qlx-hfp-core
//!
//! Deterministic harmonic-fingerprint generation, photonic envelope mapping,
//! and the supporting signature/KDF/statistical-test machinery for the QLX
//! pipeline.
//!
//! A seed phrase drives a chaos/harmonic signal generator ([`chaos`]), which
//! is decomposed into Haar wavelet bands and summarized into per-band
//! statistics ([`wavelet`]). Those statistics are assembled into a canonical,
//! hashable fingerprint record ([`hfp`]) and separately mapped onto six
//! bounded photonic control parameters ([`photonic`]). Envelopes are signed
//! and verified over a byte-stable canonical encoding ([`codec`], [`signing`],
//! [`verify`]); keys for downstream use are derived from the fingerprint with
//! a choice of KDF ([`kdf`]); and the underlying bit stream can be assessed
//! for statistical randomness with a small NIST-SP-800-22-style battery
//! ([`sts`]).
//!
//! Every operation in this crate is a pure function of its inputs: there is
//! no hidden clock, global RNG, or filesystem access beneath this API
//! surface (the two places wall-clock time does appear — [`Hfp::timestamp`][hfp::Hfp]
//! and the envelope's apply window — are explicit fields, not implicit
//! side-channels). That determinism is the whole point: two callers who agree
//! on a seed and parameters must derive bit-identical fingerprints and
//! envelopes independently.

pub mod chaos;
pub mod codec;
pub mod error;
pub mod hfp;
pub mod kdf;
pub mod photonic;
pub mod signing;
pub mod sts;
pub mod verify;
pub mod wavelet;

pub use error::{Error, Result};
