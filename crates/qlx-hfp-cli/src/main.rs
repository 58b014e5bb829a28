//! `qlx`: thin CLI shell over `qlx-hfp-core`.
//!
//! Every subcommand is a direct call into the core's pure functions; this
//! binary owns only argument parsing, logging, key-material I/O, and the
//! exit-code contract (`0` pass, `2` failure).

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use qlx_hfp_core::codec::{self, Value};
use qlx_hfp_core::kdf::{self, Argon2Params, ScryptParams};
use qlx_hfp_core::photonic::{self, EnvelopeOptions, QuantMode};
use qlx_hfp_core::signing::{self, SignedEnvelope};
use qlx_hfp_core::sts::{self, Whiten};
use qlx_hfp_core::verify;
use qlx_hfp_core::{hfp, Error};

#[derive(Parser)]
#[command(name = "qlx")]
#[command(about = "Harmonic-fingerprint / photonic-envelope pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the harmonic fingerprint for a seed.
    Hfp {
        /// Seed phrase. Defaults to `$QLX_SEED` if unset.
        #[arg(long, env = "QLX_SEED")]
        seed: String,
        /// Wavelet decomposition depth.
        #[arg(long, default_value_t = 5)]
        levels: usize,
        /// Print the full canonical record instead of just the hash.
        #[arg(long)]
        json_out: bool,
    },
    /// Derive a key from a seed's fingerprint.
    Key {
        /// Seed phrase.
        #[arg(long, env = "QLX_SEED")]
        seed: String,
        /// Password/secret input to the KDF.
        #[arg(long)]
        pw: String,
        /// `hkdf`, `scrypt`, or `argon2id`.
        #[arg(long)]
        kdf: String,
        /// Output key length in bytes.
        #[arg(long)]
        length: usize,
        /// Wavelet decomposition depth for the fingerprint salt.
        #[arg(long, default_value_t = 5)]
        levels: usize,
        /// Argon2id time cost (iterations).
        #[arg(long, env = "ARGON2_TIME_COST", default_value_t = 2)]
        argon2_time_cost: u32,
        /// Argon2id memory cost in KiB.
        #[arg(long, env = "ARGON2_MEMORY_KIB", default_value_t = 64 * 1024)]
        argon2_memory_kib: u32,
        /// Argon2id parallelism.
        #[arg(long, env = "ARGON2_PARALLELISM", default_value_t = 1)]
        argon2_parallelism: u32,
    },
    /// Assemble, map, and sign a photonic control envelope, writing the three
    /// canonical JSON artifacts to `--out`.
    Export {
        /// Seed phrase.
        #[arg(long, env = "QLX_SEED")]
        seed: String,
        /// Wavelet decomposition depth.
        #[arg(long, default_value_t = 5)]
        levels: usize,
        /// DAC resolution in bits.
        #[arg(long, default_value_t = photonic::DEFAULT_DAC_BITS)]
        dac_bits: u32,
        /// DAC sample rate in giga-samples per second.
        #[arg(long, default_value_t = photonic::DEFAULT_SAMPLE_RATE_GSA)]
        sample_gsa: u32,
        /// `nearest`, `floor`, or `stochastic`.
        #[arg(long, default_value = "nearest")]
        quant: String,
        /// `hmac` or `ed25519`.
        #[arg(long)]
        sig_alg: String,
        /// Hex-encoded HMAC key (required when `--sig-alg hmac`).
        #[arg(long)]
        hmac_key_hex: Option<String>,
        /// Hex-encoded Ed25519 signing-key seed (required when `--sig-alg ed25519`).
        #[arg(long)]
        ed25519_priv_hex: Option<String>,
        /// Caller-assigned key identifier attached to the signature.
        #[arg(long, default_value = "ctrl-01")]
        key_id: String,
        /// Output directory for the three JSON artifacts.
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the STS-min statistical test battery over the default stream.
    Sts {
        /// Seed phrase.
        #[arg(long, env = "QLX_SEED")]
        seed: String,
        /// Number of bits to test.
        #[arg(long, default_value_t = 200_000)]
        n_bits: usize,
        /// Significance threshold.
        #[arg(long, default_value_t = 0.01)]
        alpha: f64,
        /// Block-frequency block size.
        #[arg(long, default_value_t = 256)]
        block: usize,
        /// `none`, `vn`, or `sha512`.
        #[arg(long, default_value = "sha512")]
        whiten: String,
    },
    /// Controller-side verification of a signed envelope artifact.
    Verify {
        /// Path to a `photonic_env_signed.json`-style artifact.
        envelope_path: PathBuf,
        /// Hex-encoded HMAC key.
        #[arg(long)]
        hmac_key_hex: Option<String>,
        /// Hex-encoded Ed25519 public key.
        #[arg(long)]
        ed25519_pub_hex: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("qlx failed: {e:#}");
            std::process::exit(2);
        }
    }
}

fn run(command: Commands) -> Result<i32> {
    match command {
        Commands::Hfp { seed, levels, json_out } => run_hfp(&seed, levels, json_out),
        Commands::Key {
            seed,
            pw,
            kdf: kdf_name,
            length,
            levels,
            argon2_time_cost,
            argon2_memory_kib,
            argon2_parallelism,
        } => run_key(&seed, &pw, &kdf_name, length, levels, argon2_time_cost, argon2_memory_kib, argon2_parallelism),
        Commands::Export {
            seed,
            levels,
            dac_bits,
            sample_gsa,
            quant,
            sig_alg,
            hmac_key_hex,
            ed25519_priv_hex,
            key_id,
            out,
        } => run_export(
            &seed,
            levels,
            dac_bits,
            sample_gsa,
            &quant,
            &sig_alg,
            hmac_key_hex.as_deref(),
            ed25519_priv_hex.as_deref(),
            &key_id,
            &out,
        ),
        Commands::Sts { seed, n_bits, alpha, block, whiten } => run_sts(&seed, n_bits, alpha, block, &whiten),
        Commands::Verify { envelope_path, hmac_key_hex, ed25519_pub_hex } => {
            run_verify(&envelope_path, hmac_key_hex.as_deref(), ed25519_pub_hex.as_deref())
        }
    }
}

fn run_hfp(seed: &str, levels: usize, json_out: bool) -> Result<i32> {
    info!(levels, "assembling harmonic fingerprint");
    let record = hfp::assemble(seed.as_bytes(), levels).map_err(anyhow_err)?;
    if json_out {
        let bytes = codec::canonical_bytes(&record.full_value().map_err(anyhow_err)?).map_err(anyhow_err)?;
        println!("{}", String::from_utf8(bytes).expect("canonical bytes are UTF-8"));
    } else {
        println!("{}", record.fingerprint_hash);
    }
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
fn run_key(
    seed: &str,
    pw: &str,
    kdf_name: &str,
    length: usize,
    levels: usize,
    argon2_time_cost: u32,
    argon2_memory_kib: u32,
    argon2_parallelism: u32,
) -> Result<i32> {
    let record = hfp::assemble(seed.as_bytes(), levels).map_err(anyhow_err)?;
    info!(kdf = kdf_name, length, "deriving key");
    let key = match kdf_name {
        "hkdf" => kdf::derive_hkdf(pw.as_bytes(), &record.fingerprint_hash, length).map_err(anyhow_err)?,
        "scrypt" => {
            kdf::derive_scrypt(pw.as_bytes(), &record.fingerprint_hash, length, ScryptParams::default())
                .map_err(anyhow_err)?
        }
        "argon2id" => kdf::derive_argon2id(
            pw.as_bytes(),
            &record.fingerprint_hash,
            length,
            Argon2Params {
                time_cost: argon2_time_cost,
                memory_cost_kib: argon2_memory_kib,
                parallelism: argon2_parallelism,
            },
        )
        .map_err(anyhow_err)?,
        other => bail!("unknown kdf: {other}"),
    };
    println!("{}", hex::encode(key));
    Ok(0)
}

#[allow(clippy::too_many_arguments)]
fn run_export(
    seed: &str,
    levels: usize,
    dac_bits: u32,
    sample_gsa: u32,
    quant: &str,
    sig_alg: &str,
    hmac_key_hex: Option<&str>,
    ed25519_priv_hex: Option<&str>,
    key_id: &str,
    out: &PathBuf,
) -> Result<i32> {
    info!(seed_len = seed.len(), levels, dac_bits, "exporting envelope");
    let record = hfp::assemble(seed.as_bytes(), levels).map_err(anyhow_err)?;
    let raw = photonic::photonic_map(&record.band_stats);
    let opts = EnvelopeOptions {
        dac_bits,
        sample_rate_gsa: sample_gsa,
        quant_mode: QuantMode::parse(quant).map_err(anyhow_err)?,
        mode: "static",
    };
    let mut rng = OsRng;
    let envelope = photonic::build_envelope(&record.fingerprint_hash, &raw, opts, &mut rng).map_err(anyhow_err)?;

    let signed: SignedEnvelope = match sig_alg {
        "hmac" => {
            let key_hex = hmac_key_hex.context("--hmac-key-hex is required for --sig-alg hmac")?;
            let key = hex::decode(key_hex).context("invalid --hmac-key-hex")?;
            signing::sign_hmac(&envelope, &key, key_id).map_err(anyhow_err)?
        }
        "ed25519" => {
            let priv_hex = ed25519_priv_hex.context("--ed25519-priv-hex is required for --sig-alg ed25519")?;
            let seed_bytes = hex::decode(priv_hex).context("invalid --ed25519-priv-hex")?;
            let seed_array: [u8; 32] = seed_bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("ed25519 signing-key seed must be 32 bytes"))?;
            let signing_key = SigningKey::from_bytes(&seed_array);
            signing::sign_ed25519(&envelope, &signing_key, key_id).map_err(anyhow_err)?
        }
        other => bail!("unknown sig-alg: {other}"),
    };

    fs::create_dir_all(out).with_context(|| format!("creating output directory {}", out.display()))?;
    write_artifact(&out.join("hfp_core.json"), &record.core_value())?;
    write_artifact(&out.join("hfp_full.json"), &record.full_value().map_err(anyhow_err)?)?;
    write_artifact(&out.join("photonic_env_signed.json"), &signed.to_value())?;
    info!(dir = %out.display(), "wrote hfp_core.json, hfp_full.json, photonic_env_signed.json");
    Ok(0)
}

fn write_artifact(path: &PathBuf, value: &Value) -> Result<()> {
    let bytes = codec::canonical_bytes(value).map_err(anyhow_err)?;
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn run_sts(seed: &str, n_bits: usize, alpha: f64, block: usize, whiten: &str) -> Result<i32> {
    let whiten_mode = Whiten::parse(whiten).map_err(anyhow_err)?;
    info!(n_bits, alpha, whiten, "running STS-min battery");
    let bits = sts::default_bits(seed.as_bytes(), n_bits, whiten_mode);
    let report = sts::run_suite(&bits, alpha, block);

    let value = sts_report_value(&report, whiten);
    let bytes = codec::canonical_bytes(&value).map_err(anyhow_err)?;
    println!("{}", String::from_utf8(bytes).expect("canonical bytes are UTF-8"));

    if report.all_pass {
        Ok(0)
    } else {
        error!(failures = ?report.failures, "STS battery did not pass");
        Ok(2)
    }
}

fn sts_report_value(report: &sts::SuiteReport, whiten: &str) -> Value {
    let results = Value::map(report.results.as_pairs().into_iter().map(|(name, r)| {
        let mut fields = vec![("p", Value::Float(r.p)), ("stat", Value::Float(r.stat))];
        if let Some(note) = &r.note {
            fields.push(("notes", Value::Str(note.clone())));
        }
        (name, Value::map(fields))
    }));

    Value::map([
        ("suite", Value::Str("qlx-sts-min".to_string())),
        ("alpha", Value::Float(report.alpha)),
        ("n_bits", Value::Int(report.n_bits as i64)),
        ("block_M", Value::Int(report.block_m as i64)),
        ("whiten", Value::Str(whiten.to_string())),
        ("results", results),
        (
            "summary",
            Value::map([
                ("all_pass", Value::Bool(report.all_pass)),
                ("min_p", Value::Float(report.min_p)),
                (
                    "failures",
                    Value::Array(report.failures.iter().map(|f| Value::Str(f.clone())).collect()),
                ),
            ]),
        ),
    ])
}

fn run_verify(envelope_path: &PathBuf, hmac_key_hex: Option<&str>, ed25519_pub_hex: Option<&str>) -> Result<i32> {
    let bytes = fs::read(envelope_path).with_context(|| format!("reading {}", envelope_path.display()))?;
    let value = codec::parse(&bytes).map_err(anyhow_err)?;
    let signed = signed_envelope_from_value(&value).map_err(anyhow_err)?;

    let hmac_key = hmac_key_hex.map(hex::decode).transpose().context("invalid --hmac-key-hex")?;
    let ed25519_key = ed25519_pub_hex
        .map(|h| -> Result<VerifyingKey> {
            let bytes = hex::decode(h).context("invalid --ed25519-pub-hex")?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("ed25519 public key must be 32 bytes"))?;
            VerifyingKey::from_bytes(&arr).context("invalid ed25519 public key")
        })
        .transpose()?;

    info!(path = %envelope_path.display(), "verifying envelope");
    let report = verify::verify_envelope(&signed, hmac_key.as_deref(), ed25519_key.as_ref());

    let sig_str = match &report.sig {
        signing::VerifyOutcome::Valid => "valid".to_string(),
        signing::VerifyOutcome::Invalid => "invalid".to_string(),
        signing::VerifyOutcome::Unknown(reason) => format!("unknown: {reason}"),
    };
    let value = Value::map([
        ("lengths_ok", Value::Bool(report.lengths_ok)),
        ("ranges_ok", Value::Bool(report.ranges_ok)),
        ("signature", Value::Str(sig_str)),
        ("pass", Value::Bool(report.ok())),
    ]);
    let bytes = codec::canonical_bytes(&value).map_err(anyhow_err)?;
    println!("{}", String::from_utf8(bytes).expect("canonical bytes are UTF-8"));

    if report.ok() {
        Ok(0)
    } else {
        error!("envelope verification failed");
        Ok(2)
    }
}

/// Reconstruct enough of a [`SignedEnvelope`] from a parsed artifact to run
/// [`verify::verify_envelope`]. Only the fields the verifier inspects are
/// required; this is intentionally not a general envelope deserializer.
fn signed_envelope_from_value(value: &Value) -> qlx_hfp_core::Result<SignedEnvelope> {
    let Value::Map(map) = value else {
        return Err(Error::encoding("envelope artifact is not a map"));
    };
    let get = |k: &str| map.get(k).ok_or_else(|| Error::encoding(format!("missing member: {k}")));

    let session_id = as_str(get("session_id")?)?;
    let hfp_hash = as_str(get("hfp_hash")?)?;
    let band_count = as_int(get("band_count")?)? as usize;
    let mode = as_str(get("mode")?)?;

    let Value::Map(apply_map) = get("apply")? else {
        return Err(Error::encoding("apply must be a map"));
    };
    let apply = photonic::ApplyWindow {
        at: as_str(apply_map.get("at").ok_or_else(|| Error::encoding("apply.at missing"))?)?,
        ramp_ms: as_int(apply_map.get("ramp_ms").ok_or_else(|| Error::encoding("apply.ramp_ms missing"))?)? as u32,
        hold_ms: as_int(apply_map.get("hold_ms").ok_or_else(|| Error::encoding("apply.hold_ms missing"))?)? as u32,
        ttl_ms: as_int(apply_map.get("ttl_ms").ok_or_else(|| Error::encoding("apply.ttl_ms missing"))?)? as u32,
    };

    let Value::Map(params_map) = get("params")? else {
        return Err(Error::encoding("params must be a map"));
    };
    let mut values = std::collections::HashMap::new();
    for key in photonic::param_keys() {
        let arr = params_map
            .get(key)
            .ok_or_else(|| Error::encoding(format!("params.{key} missing")))?;
        let Value::Array(items) = arr else {
            return Err(Error::encoding(format!("params.{key} must be an array")));
        };
        let nums: qlx_hfp_core::Result<Vec<f64>> = items.iter().map(as_float).collect();
        values.insert(key, nums?);
    }
    let params = photonic::PhotonicParams {
        i_bias_ma: values.remove("I_bias_mA").unwrap(),
        phi_rad: values.remove("phi_rad").unwrap(),
        kappa: values.remove("kappa").unwrap(),
        tau_ps: values.remove("tau_ps").unwrap(),
        delta_f_ghz: values.remove("delta_f_GHz").unwrap(),
        alpha: values.remove("alpha").unwrap(),
    };

    let Value::Map(dac_map) = get("dac")? else {
        return Err(Error::encoding("dac must be a map"));
    };
    let dac = photonic::DacConfig {
        width_bits: as_int(dac_map.get("width_bits").ok_or_else(|| Error::encoding("dac.width_bits missing"))?)? as u32,
        sample_rate_gsa: as_int(
            dac_map
                .get("sample_rate_GSa")
                .ok_or_else(|| Error::encoding("dac.sample_rate_GSa missing"))?,
        )? as u32,
        quantization: QuantMode::parse(&as_str(
            dac_map.get("quantization").ok_or_else(|| Error::encoding("dac.quantization missing"))?,
        )?)?,
    };

    let envelope = photonic::Envelope {
        session_id,
        hfp_hash,
        band_count,
        mode,
        apply,
        params,
        dac,
    };

    let Value::Map(signing_map) = get("signing")? else {
        return Err(Error::encoding("signing must be a map"));
    };
    let signing = signing::Signing {
        alg: as_str(signing_map.get("alg").ok_or_else(|| Error::encoding("signing.alg missing"))?)?,
        key_id: as_str(signing_map.get("key_id").ok_or_else(|| Error::encoding("signing.key_id missing"))?)?,
        nonce: as_str(signing_map.get("nonce").ok_or_else(|| Error::encoding("signing.nonce missing"))?)?,
        timestamp: as_str(signing_map.get("timestamp").ok_or_else(|| Error::encoding("signing.timestamp missing"))?)?,
        sig: as_str(signing_map.get("sig").ok_or_else(|| Error::encoding("signing.sig missing"))?)?,
    };

    Ok(SignedEnvelope { envelope, signing })
}

fn as_str(v: &Value) -> qlx_hfp_core::Result<String> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        _ => Err(Error::encoding("expected string")),
    }
}

fn as_int(v: &Value) -> qlx_hfp_core::Result<i64> {
    match v {
        Value::Int(n) => Ok(*n),
        _ => Err(Error::encoding("expected integer")),
    }
}

fn as_float(v: &Value) -> qlx_hfp_core::Result<f64> {
    match v {
        Value::Float(f) => Ok(*f),
        Value::Int(n) => Ok(*n as f64),
        _ => Err(Error::encoding("expected number")),
    }
}

fn anyhow_err(e: Error) -> anyhow::Error {
    anyhow::anyhow!(e)
}
