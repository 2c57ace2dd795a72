//! Custom slice-timing files for FSL `slicetimer --tcustom`.
//!
//! `slicetimer` wants per-slice shifts as fractions of the TR, relative to
//! the slice that will be treated as the reference. BIDS stores absolute
//! acquisition times in seconds, so the times are rescaled to the TR grid
//! and re-centred on the median slice. Equal slice spacing is assumed.

/// Shifts for each slice, or `None` when the timing has no positive step
/// (fewer than two distinct acquisition times).
pub fn slice_timing_offsets(timing: &[f64], reverse: bool) -> Option<Vec<f64>> {
    let mut times = timing.to_vec();
    if reverse {
        times.reverse();
    }

    let mut sorted = times.clone();
    sorted.sort_by(f64::total_cmp);
    let steps: Vec<f64> = sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > 0.0)
        .collect();
    if steps.is_empty() {
        return None;
    }
    let step = steps.iter().sum::<f64>() / steps.len() as f64;
    let max = *sorted.last()?;

    let scaled: Vec<f64> = times.iter().map(|t| t / (max + step)).collect();
    let median = median(&scaled);
    Some(scaled.iter().map(|t| -(t - median)).collect())
}

/// One `%f`-style value per line.
pub fn format_offsets(offsets: &[f64]) -> String {
    offsets.iter().map(|t| format!("{t:.6}\n")).collect()
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
