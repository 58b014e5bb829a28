//! Photonic mapper and envelope (C5).
//!
//! Maps band statistics to six bounded parameter arrays, clips them to the
//! open interval one DAC LSB inside their physical bounds, quantizes them to
//! the DAC grid, and assembles the signable envelope structure. This module
//! implements only the open-interval-clipping code path; the legacy
//! closed-interval variant documented as a drift hazard in the design notes
//! is not carried forward (see `DESIGN.md`).

use rand_core::RngCore;

use crate::codec::Value;
use crate::error::{Error, Result};
use crate::wavelet::BandStats;

/// Default DAC resolution in bits.
pub const DEFAULT_DAC_BITS: u32 = 14;
/// Default DAC sample rate in giga-samples per second.
pub const DEFAULT_SAMPLE_RATE_GSA: u32 = 64;

const PARAM_KEYS: [&str; 6] = ["I_bias_mA", "phi_rad", "kappa", "tau_ps", "delta_f_GHz", "alpha"];

/// The open interval `(lo, hi)` a parameter's physical bound declares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    /// Lower physical bound (exclusive once epsilon-clipped).
    pub lo: f64,
    /// Upper physical bound (exclusive once epsilon-clipped).
    pub hi: f64,
}

/// Physical bounds for each of the six photonic parameters, in declaration order.
pub fn bounds_table() -> [(&'static str, Bounds); 6] {
    [
        ("I_bias_mA", Bounds { lo: 15.0, hi: 50.0 }),
        ("phi_rad", Bounds { lo: 0.0, hi: std::f64::consts::PI }),
        ("kappa", Bounds { lo: 0.05, hi: 0.90 }),
        ("tau_ps", Bounds { lo: 50.0, hi: 300.0 }),
        ("delta_f_GHz", Bounds { lo: -10.0, hi: 10.0 }),
        ("alpha", Bounds { lo: 2.0, hi: 6.0 }),
    ]
}

/// `ε = (hi - lo) / (2^bits - 1)`, the DAC LSB step used for open-interval clipping.
pub fn epsilon(bounds: Bounds, bits: u32) -> f64 {
    let levels = f64::from((1u32 << bits) - 1);
    (bounds.hi - bounds.lo) / levels
}

/// Clamp `v` into the open interval `[lo + eps, hi - eps]`.
pub fn clip_open(v: f64, bounds: Bounds, eps: f64) -> f64 {
    v.clamp(bounds.lo + eps, bounds.hi - eps)
}

/// Affine map taking `min(x) -> lo` and `max(x) -> hi`.
fn norm_to(lo: f64, hi: f64, x: &[f64]) -> Vec<f64> {
    let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let denom = max - min + 1e-15;
    x.iter().map(|&v| lo + (v - min) / denom * (hi - lo)).collect()
}

/// Cyclic right shift by `k` positions.
fn roll(x: &[f64], k: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let k = k % n;
    let mut out = Vec::with_capacity(n);
    out.extend_from_slice(&x[n - k..]);
    out.extend_from_slice(&x[..n - k]);
    out
}

/// The six photonic parameter arrays, each `band_count` long.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotonicParams {
    /// Bias current in mA, range (15, 50), sourced from band means.
    pub i_bias_ma: Vec<f64>,
    /// Phase in radians, range (0, π), sourced from band entropies.
    pub phi_rad: Vec<f64>,
    /// Coupling coefficient, range (0.05, 0.90), sourced from band stds.
    pub kappa: Vec<f64>,
    /// Delay in picoseconds, range (50, 300), sourced from entropies rolled by 1.
    pub tau_ps: Vec<f64>,
    /// Frequency detuning in GHz, range (-10, 10), sourced from means rolled by 1.
    pub delta_f_ghz: Vec<f64>,
    /// Loss parameter, range (2, 6), sourced from stds rolled by 2.
    pub alpha: Vec<f64>,
}

impl PhotonicParams {
    /// Iterate `(key, values)` pairs in the canonical declaration order.
    pub fn as_pairs(&self) -> [(&'static str, &Vec<f64>); 6] {
        [
            ("I_bias_mA", &self.i_bias_ma),
            ("phi_rad", &self.phi_rad),
            ("kappa", &self.kappa),
            ("tau_ps", &self.tau_ps),
            ("delta_f_GHz", &self.delta_f_ghz),
            ("alpha", &self.alpha),
        ]
    }

    fn from_map(mut m: std::collections::HashMap<&'static str, Vec<f64>>) -> Self {
        Self {
            i_bias_ma: m.remove("I_bias_mA").unwrap(),
            phi_rad: m.remove("phi_rad").unwrap(),
            kappa: m.remove("kappa").unwrap(),
            tau_ps: m.remove("tau_ps").unwrap(),
            delta_f_ghz: m.remove("delta_f_GHz").unwrap(),
            alpha: m.remove("alpha").unwrap(),
        }
    }
}

/// Map band statistics to the raw (unclipped, unquantized) photonic parameters.
pub fn photonic_map(stats: &[BandStats]) -> PhotonicParams {
    let means: Vec<f64> = stats.iter().map(|s| s.mean).collect();
    let stds: Vec<f64> = stats.iter().map(|s| s.std).collect();
    let ents: Vec<f64> = stats.iter().map(|s| s.entropy).collect();

    let bounds = bounds_table();
    let lookup = |name: &str| bounds.iter().find(|(k, _)| *k == name).unwrap().1;

    let b = lookup("I_bias_mA");
    let i_bias_ma = norm_to(b.lo, b.hi, &means);
    let b = lookup("phi_rad");
    let phi_rad = norm_to(b.lo, b.hi, &ents);
    let b = lookup("kappa");
    let kappa = norm_to(b.lo, b.hi, &stds);
    let b = lookup("tau_ps");
    let tau_ps = norm_to(b.lo, b.hi, &roll(&ents, 1));
    let b = lookup("delta_f_GHz");
    let delta_f_ghz = norm_to(b.lo, b.hi, &roll(&means, 1));
    let b = lookup("alpha");
    let alpha = norm_to(b.lo, b.hi, &roll(&stds, 2));

    PhotonicParams {
        i_bias_ma,
        phi_rad,
        kappa,
        tau_ps,
        delta_f_ghz,
        alpha,
    }
}

/// Clip every array in `params` to its open interval at `bits` resolution.
pub fn clip_params_open(params: &PhotonicParams, bits: u32) -> PhotonicParams {
    let bounds = bounds_table();
    let mut out = std::collections::HashMap::new();
    for (key, values) in params.as_pairs() {
        let b = bounds.iter().find(|(k, _)| *k == key).unwrap().1;
        let eps = epsilon(b, bits);
        out.insert(key, values.iter().map(|&v| clip_open(v, b, eps)).collect());
    }
    PhotonicParams::from_map(out)
}

/// Quantization rounding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantMode {
    /// Round half to even (banker's rounding) — the pinned default.
    Nearest,
    /// Truncate toward negative infinity.
    Floor,
    /// Randomized rounding: `floor(x) + 1` with probability `frac(x)`.
    Stochastic,
}

impl QuantMode {
    /// Parse the CLI/schema string form.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "nearest" => Ok(Self::Nearest),
            "floor" => Ok(Self::Floor),
            "stochastic" => Ok(Self::Stochastic),
            other => Err(Error::input(format!("unknown quantization mode: {other}"))),
        }
    }

    /// The canonical string form used in JSON artifacts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Floor => "floor",
            Self::Stochastic => "stochastic",
        }
    }
}

fn round_half_to_even(x: f64) -> f64 {
    let floor = x.floor();
    let frac = x - floor;
    if frac < 0.5 {
        floor
    } else if frac > 0.5 {
        floor + 1.0
    } else if (floor as i64) % 2 == 0 {
        floor
    } else {
        floor + 1.0
    }
}

/// Quantize `arr` (already within `[lo, hi]`) to a `bits`-wide DAC grid and
/// map the integer codes back to real values, per §4.5.
pub fn quantize(
    arr: &[f64],
    bounds: Bounds,
    bits: u32,
    mode: QuantMode,
    rng: &mut dyn RngCore,
) -> Vec<f64> {
    let levels = f64::from((1u32 << bits) - 1);
    arr.iter()
        .map(|&v| {
            let clamped = v.clamp(bounds.lo, bounds.hi);
            let q = (clamped - bounds.lo) / (bounds.hi - bounds.lo);
            let x = q * levels;
            let xi = match mode {
                QuantMode::Nearest => round_half_to_even(x),
                QuantMode::Floor => x.floor(),
                QuantMode::Stochastic => {
                    let floor = x.floor();
                    let frac = x - floor;
                    let draw = next_unit_f64(rng);
                    if draw < frac {
                        floor + 1.0
                    } else {
                        floor
                    }
                }
            };
            (xi / levels) * (bounds.hi - bounds.lo) + bounds.lo
        })
        .collect()
}

fn next_unit_f64(rng: &mut dyn RngCore) -> f64 {
    // 53 bits of mantissa precision, matching the common [0,1) RNG convention.
    let v = rng.next_u64() >> 11;
    v as f64 * (1.0 / (1u64 << 53) as f64)
}

/// Quantize every parameter array, re-clipping to the open interval afterward.
pub fn quantize_params(
    params: &PhotonicParams,
    bits: u32,
    mode: QuantMode,
    rng: &mut dyn RngCore,
) -> PhotonicParams {
    let bounds = bounds_table();
    let mut out = std::collections::HashMap::new();
    for (key, values) in params.as_pairs() {
        let b = bounds.iter().find(|(k, _)| *k == key).unwrap().1;
        let eps = epsilon(b, bits);
        let q = quantize(values, b, bits, mode, rng);
        let clipped: Vec<f64> = q.iter().map(|&v| clip_open(v, b, eps)).collect();
        out.insert(key, clipped);
    }
    PhotonicParams::from_map(out)
}

/// `apply` scheduling window.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyWindow {
    /// ISO-8601 UTC timestamp, second resolution.
    pub at: String,
    /// Ramp duration in milliseconds.
    pub ramp_ms: u32,
    /// Hold duration in milliseconds.
    pub hold_ms: u32,
    /// Time-to-live in milliseconds.
    pub ttl_ms: u32,
}

impl Default for ApplyWindow {
    fn default() -> Self {
        Self {
            at: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            ramp_ms: 10,
            hold_ms: 2000,
            ttl_ms: 10000,
        }
    }
}

/// DAC configuration attached to the envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct DacConfig {
    /// DAC resolution in bits.
    pub width_bits: u32,
    /// Sample rate in giga-samples per second.
    pub sample_rate_gsa: u32,
    /// Quantization mode used to produce `params`.
    pub quantization: QuantMode,
}

/// The unsigned photonic control envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Random UUIDv4 identifying this envelope instance.
    pub session_id: String,
    /// The HFP fingerprint this envelope is bound to.
    pub hfp_hash: String,
    /// Number of bands (`levels + 1`).
    pub band_count: usize,
    /// Control mode tag, e.g. `"static"`.
    pub mode: String,
    /// Scheduling window.
    pub apply: ApplyWindow,
    /// The six quantized, open-interval-clipped parameter arrays.
    pub params: PhotonicParams,
    /// DAC configuration.
    pub dac: DacConfig,
}

impl Envelope {
    /// Build the envelope's canonical [`Value`] form, without a `signing` member.
    pub fn to_value(&self) -> Value {
        Value::map([
            ("version", Value::Str("P-0.2".to_string())),
            ("session_id", Value::Str(self.session_id.clone())),
            ("hfp_hash", Value::Str(self.hfp_hash.clone())),
            ("band_count", Value::Int(self.band_count as i64)),
            ("mode", Value::Str(self.mode.clone())),
            (
                "apply",
                Value::map([
                    ("at", Value::Str(self.apply.at.clone())),
                    ("ramp_ms", Value::Int(i64::from(self.apply.ramp_ms))),
                    ("hold_ms", Value::Int(i64::from(self.apply.hold_ms))),
                    ("ttl_ms", Value::Int(i64::from(self.apply.ttl_ms))),
                ]),
            ),
            (
                "params",
                Value::map(
                    self.params
                        .as_pairs()
                        .into_iter()
                        .map(|(k, v)| (k, Value::Array(v.iter().map(|&f| Value::Float(f)).collect()))),
                ),
            ),
            (
                "dac",
                Value::map([
                    ("width_bits", Value::Int(i64::from(self.dac.width_bits))),
                    ("sample_rate_GSa", Value::Int(i64::from(self.dac.sample_rate_gsa))),
                    ("quantization", Value::Str(self.dac.quantization.as_str().to_string())),
                ]),
            ),
        ])
    }
}

/// Options controlling [`build_envelope`].
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeOptions {
    /// DAC resolution in bits.
    pub dac_bits: u32,
    /// Sample rate in giga-samples per second.
    pub sample_rate_gsa: u32,
    /// Quantization rounding mode.
    pub quant_mode: QuantMode,
    /// Control mode tag.
    pub mode: &'static str,
}

impl Default for EnvelopeOptions {
    fn default() -> Self {
        Self {
            dac_bits: DEFAULT_DAC_BITS,
            sample_rate_gsa: DEFAULT_SAMPLE_RATE_GSA,
            quant_mode: QuantMode::Nearest,
            mode: "static",
        }
    }
}

/// Build the unsigned envelope from raw photonic parameters and an HFP hash.
///
/// Rejects if the six arrays are not of equal length. Applies open-interval
/// clipping, then quantizes, then re-clips (per the design notes' resolution
/// of the two-drift-hazards note).
pub fn build_envelope(
    hfp_hash: &str,
    raw_params: &PhotonicParams,
    opts: EnvelopeOptions,
    rng: &mut dyn RngCore,
) -> Result<Envelope> {
    let lengths: Vec<usize> = raw_params.as_pairs().iter().map(|(_, v)| v.len()).collect();
    let band_count = lengths[0];
    if lengths.iter().any(|&l| l != band_count) {
        return Err(Error::input(format!(
            "photonic params must have equal length, got {lengths:?}"
        )));
    }

    let clipped = clip_params_open(raw_params, opts.dac_bits);
    let quantized = quantize_params(&clipped, opts.dac_bits, opts.quant_mode, rng);

    Ok(Envelope {
        session_id: uuid::Uuid::new_v4().to_string(),
        hfp_hash: hfp_hash.to_string(),
        band_count,
        mode: opts.mode.to_string(),
        apply: ApplyWindow::default(),
        params: quantized,
        dac: DacConfig {
            width_bits: opts.dac_bits,
            sample_rate_gsa: opts.sample_rate_gsa,
            quantization: opts.quant_mode,
        },
    })
}

/// The parameter key names, in declaration order — used by verifiers that
/// need to check every array independent of a concrete [`PhotonicParams`].
pub fn param_keys() -> [&'static str; 6] {
    PARAM_KEYS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hfp;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    fn sample_stats() -> Vec<BandStats> {
        hfp::assemble(b"qlx-demo-seed-phi369", 5).unwrap().band_stats
    }

    #[test]
    fn mapping_preserves_band_count() {
        let stats = sample_stats();
        let params = photonic_map(&stats);
        assert_eq!(params.i_bias_ma.len(), stats.len());
        assert_eq!(params.alpha.len(), stats.len());
    }

    #[test]
    fn roll_is_cyclic() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(roll(&x, 1), vec![4.0, 1.0, 2.0, 3.0]);
        assert_eq!(roll(&x, 2), vec![3.0, 4.0, 1.0, 2.0]);
    }

    #[test]
    fn envelope_bounds_hold_for_default_dac_bits() {
        let stats = sample_stats();
        let raw = photonic_map(&stats);
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let env = build_envelope(
            "deadbeef",
            &raw,
            EnvelopeOptions::default(),
            &mut rng,
        )
        .unwrap();
        let bounds = bounds_table();
        for (key, values) in env.params.as_pairs() {
            let b = bounds.iter().find(|(k, _)| *k == key).unwrap().1;
            let eps = epsilon(b, env.dac.width_bits);
            for &v in values {
                assert!(v > b.lo + eps - 1e-9, "{key} below open interval: {v}");
                assert!(v < b.hi - eps + 1e-9, "{key} above open interval: {v}");
            }
        }
        assert_eq!(env.band_count, 6);
    }

    #[test]
    fn rejects_unequal_length_arrays() {
        let mut raw = photonic_map(&sample_stats());
        raw.alpha.pop();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let err = build_envelope("deadbeef", &raw, EnvelopeOptions::default(), &mut rng);
        assert!(err.is_err());
    }

    #[test]
    fn quantization_is_idempotent_under_identical_params() {
        let stats = sample_stats();
        let raw = photonic_map(&stats);
        let clipped = clip_params_open(&raw, 14);
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let once = quantize_params(&clipped, 14, QuantMode::Nearest, &mut rng);
        let mut rng2 = ChaCha20Rng::seed_from_u64(7);
        let twice = quantize_params(&once, 14, QuantMode::Nearest, &mut rng2);
        for (a, b) in once.i_bias_ma.iter().zip(twice.i_bias_ma.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn round_half_to_even_matches_banker_rounding() {
        assert_eq!(round_half_to_even(0.5), 0.0);
        assert_eq!(round_half_to_even(1.5), 2.0);
        assert_eq!(round_half_to_even(2.5), 2.0);
        assert_eq!(round_half_to_even(2.4), 2.0);
        assert_eq!(round_half_to_even(2.6), 3.0);
    }
}
