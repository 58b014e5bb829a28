//! Haar DWT and per-band statistics (C3).

const HIST_BINS: usize = 64;
const ENTROPY_EPS: f64 = 1e-12;
const RANGE_EPS: f64 = 1e-15;
const STD_EPS: f64 = 1e-15;

/// One level of the Haar wavelet transform.
///
/// Odd-length inputs drop their final sample before splitting. Returns
/// `(approximation, detail)`, each of length `floor(len(a)/2)`.
fn haar_step(a: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let n = a.len() - (a.len() % 2);
    let h = std::f64::consts::FRAC_1_SQRT_2;
    let mut approx = Vec::with_capacity(n / 2);
    let mut detail = Vec::with_capacity(n / 2);
    for pair in a[..n].chunks_exact(2) {
        approx.push((pair[0] + pair[1]) * h);
        detail.push((pair[0] - pair[1]) * h);
    }
    (approx, detail)
}

/// Run an `levels`-level Haar DWT over `x`.
///
/// Returns `[approx_L, detail_L, detail_{L-1}, ..., detail_1]`, matching the
/// band ordering used throughout the fingerprint pipeline.
pub fn dwt_haar(x: &[f64], levels: usize) -> Vec<Vec<f64>> {
    let mut a = x.to_vec();
    let mut details = Vec::with_capacity(levels);
    for _ in 0..levels {
        let (next_a, d) = haar_step(&a);
        details.push(d);
        a = next_a;
    }
    let mut bands = Vec::with_capacity(levels + 1);
    bands.push(a);
    bands.extend(details.into_iter().rev());
    bands
}

/// The human-readable band name for position `idx` (0 = approximation) in a
/// `levels`-level decomposition, matching `dwt_haar`'s output order.
pub fn band_name(idx: usize, levels: usize) -> String {
    if idx == 0 {
        "A_L".to_string()
    } else {
        format!("D_{}", levels + 1 - idx)
    }
}

/// Per-band statistics: scaled population mean/std and normalized Shannon
/// entropy of a 64-bin histogram over the band re-mapped to `[0,1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BandStats {
    /// Band name (`A_L`, `D_L`, ..., `D_1`).
    pub band: String,
    /// Population mean of the φ-scaled coefficients.
    pub mean: f64,
    /// Population standard deviation of the φ-scaled coefficients (guarded).
    pub std: f64,
    /// Normalized Shannon entropy in `[0, 1]`.
    pub entropy: f64,
}

fn normalized_entropy(x: &[f64]) -> f64 {
    let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let denom = max - min + RANGE_EPS;

    let mut hist = [0usize; HIST_BINS];
    for &v in x {
        let u = (v - min) / denom;
        let mut bin = (u * HIST_BINS as f64) as usize;
        if bin >= HIST_BINS {
            bin = HIST_BINS - 1;
        }
        hist[bin] += 1;
    }
    // numpy's `density=True` histogram is count_i / (n * bin_width); dividing
    // that by its own sum (as the reference does) cancels the bin width, so
    // this reduces to the plain empirical probability count_i / n.
    let n = x.len() as f64;
    let probs: Vec<f64> = hist.iter().map(|&c| c as f64 / n + ENTROPY_EPS).collect();
    let h: f64 = -probs.iter().map(|p| p * p.log2()).sum::<f64>();
    h / (HIST_BINS as f64).log2()
}

/// Compute [`BandStats`] for every band, scaling coefficients by `phi` first.
pub fn compute_band_stats(bands: &[Vec<f64>], phi: f64) -> Vec<BandStats> {
    let levels = bands.len() - 1;
    bands
        .iter()
        .enumerate()
        .map(|(idx, band)| {
            let scaled: Vec<f64> = band.iter().map(|v| v * phi).collect();
            let n = scaled.len() as f64;
            let mean = scaled.iter().sum::<f64>() / n;
            let var = scaled.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
            let std = var.sqrt() + STD_EPS;
            BandStats {
                band: band_name(idx, levels),
                mean,
                std,
                entropy: normalized_entropy(&scaled),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_matches_hand_computation() {
        let x = [1.0, 3.0, 5.0, 7.0];
        let bands = dwt_haar(&x, 1);
        assert_eq!(bands.len(), 2);
        let h = std::f64::consts::FRAC_1_SQRT_2;
        assert!((bands[0][0] - (1.0 + 3.0) * h).abs() < 1e-12);
        assert!((bands[1][0] - (1.0 - 3.0) * h).abs() < 1e-12);
    }

    #[test]
    fn odd_length_drops_final_sample() {
        let x = [1.0, 2.0, 3.0];
        let bands = dwt_haar(&x, 1);
        assert_eq!(bands[0].len(), 1);
        assert_eq!(bands[1].len(), 1);
    }

    #[test]
    fn band_names_follow_spec_order() {
        assert_eq!(band_name(0, 3), "A_L");
        assert_eq!(band_name(1, 3), "D_3");
        assert_eq!(band_name(3, 3), "D_1");
    }

    #[test]
    fn entropy_is_bounded_in_unit_interval() {
        let x: Vec<f64> = (0..1000).map(|i| (i as f64).sin()).collect();
        let e = normalized_entropy(&x);
        assert!((0.0..=1.0).contains(&e));
    }

    #[test]
    fn constant_band_has_near_zero_entropy() {
        let x = vec![1.0; 500];
        let e = normalized_entropy(&x);
        assert!(e < 0.2);
    }

    #[test]
    fn band_stats_length_matches_levels_plus_one() {
        let x: Vec<f64> = (0..256).map(|i| i as f64).collect();
        let bands = dwt_haar(&x, 5);
        let stats = compute_band_stats(&bands, 1.618_033_988_75);
        assert_eq!(stats.len(), 6);
    }
}
