//! Adaptive downsampling of plot series.
//!
//! Long series are reduced to at most `max_points` samples before they are
//! sent to a browser. The first and last samples are always kept. With
//! `preserve_peaks`, each interior bucket keeps the sample that deviates
//! most from the bucket mean, so spikes survive the reduction.

/// Reduce `(x, y)` to at most `max_points` samples.
///
/// Series no longer than `max_points` are returned unchanged. `max_points`
/// below 2 is treated as 2. When `x` and `y` differ in length both are
/// truncated to the shorter one. The result is deterministic.
pub fn downsample(
    x: &[f64],
    y: &[f64],
    max_points: usize,
    preserve_peaks: bool,
) -> (Vec<f64>, Vec<f64>) {
    let n = x.len().min(y.len());
    let x = x.get(..n).unwrap_or_default();
    let y = y.get(..n).unwrap_or_default();
    let max_points = max_points.max(2);

    if n <= max_points {
        return (x.to_vec(), y.to_vec());
    }

    let indices = if preserve_peaks {
        peak_indices(y, max_points)
    } else {
        uniform_indices(n, max_points)
    };

    indices
        .into_iter()
        .filter_map(|i| Some((*x.get(i)?, *y.get(i)?)))
        .unzip()
}

/// Bucketed selection keeping the largest deviation from each bucket's
/// mean. Requires `y.len() > max_points >= 2`.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::arithmetic_side_effects
)]
fn peak_indices(y: &[f64], max_points: usize) -> Vec<usize> {
    let n = y.len();
    let last = n - 1;
    let bucket = n as f64 / max_points as f64;

    let mut indices = Vec::with_capacity(max_points);
    indices.push(0);

    for i in 0..max_points - 2 {
        let start = (i as f64 * bucket).floor() as usize + 1;
        let end = (((i + 1) as f64 * bucket).floor() as usize + 1).min(last);
        if start >= end {
            continue;
        }
        let Some(segment) = y.get(start..end) else {
            continue;
        };
        let mean = segment.iter().sum::<f64>() / segment.len() as f64;
        let mut best = 0;
        let mut best_dev = f64::NEG_INFINITY;
        for (offset, v) in segment.iter().enumerate() {
            let dev = (v - mean).abs();
            if dev > best_dev {
                best = offset;
                best_dev = dev;
            }
        }
        indices.push(start + best);
    }

    indices.push(last);
    indices
}

/// `max_points` evenly spaced indices from `0` to `n - 1`, inclusive.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::arithmetic_side_effects
)]
fn uniform_indices(n: usize, max_points: usize) -> Vec<usize> {
    let last = (n - 1) as f64;
    let steps = (max_points - 1) as f64;
    (0..max_points)
        .map(|k| ((k as f64 * last) / steps) as usize)
        .collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> (Vec<f64>, Vec<f64>) {
        let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let y = x.iter().map(|v| (v * 0.01).sin()).collect();
        (x, y)
    }

    #[test]
    fn short_series_unchanged() {
        let (x, y) = ramp(50);
        let (dx, dy) = downsample(&x, &y, 100, true);
        assert_eq!(dx, x);
        assert_eq!(dy, y);
    }

    #[test]
    fn long_series_reduced_keeping_endpoints() {
        let (x, y) = ramp(10_000);
        for preserve in [true, false] {
            let (dx, dy) = downsample(&x, &y, 1000, preserve);
            assert!(dx.len() <= 1000);
            assert_eq!(dx.len(), dy.len());
            assert_eq!(dx.first(), Some(&0.0));
            assert_eq!(dx.last(), Some(&9999.0));
            assert_eq!(dy.last(), y.last());
        }
    }

    #[test]
    fn hundred_thousand_points_reduce_to_max_points() {
        let (x, y) = ramp(100_000);
        for preserve in [true, false] {
            let (dx, dy) = downsample(&x, &y, 1000, preserve);
            assert!((999..=1001).contains(&dx.len()), "len {}", dx.len());
            assert_eq!(dx.len(), dy.len());
            assert_eq!(dx.first(), x.first());
            assert_eq!(dy.first(), y.first());
            assert_eq!(dx.last(), x.last());
            assert_eq!(dy.last(), y.last());
            assert!(dx.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn series_at_max_points_passes_through() {
        let (x, y) = ramp(1000);
        let (dx, dy) = downsample(&x, &y, 1000, true);
        assert_eq!(dx, x);
        assert_eq!(dy, y);
    }

    #[test]
    fn mismatched_long_series_uses_shorter_length() {
        let (x, _) = ramp(5000);
        let (_, y) = ramp(3000);
        let (dx, dy) = downsample(&x, &y, 100, false);
        assert_eq!(dx.len(), 100);
        assert_eq!(dy.len(), 100);
        assert_eq!(dx.last(), Some(&2999.0));
        assert_eq!(dy.last(), y.last());
    }

    #[test]
    fn uniform_mode_hits_exact_count() {
        let (x, y) = ramp(1001);
        let (dx, _) = downsample(&x, &y, 11, false);
        assert_eq!(dx, vec![0.0, 100.0, 200.0, 300.0, 400.0, 500.0, 600.0, 700.0, 800.0, 900.0, 1000.0]);
    }

    #[test]
    fn peaks_survive_reduction() {
        let x: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let mut y = vec![0.0; 1000];
        y[537] = 50.0;
        let (dx, dy) = downsample(&x, &y, 20, true);
        assert!(dy.contains(&50.0));
        assert!(dx.contains(&537.0));
    }

    #[test]
    fn output_is_deterministic() {
        let (x, y) = ramp(5000);
        assert_eq!(downsample(&x, &y, 300, true), downsample(&x, &y, 300, true));
    }

    #[test]
    fn tiny_max_points_keeps_endpoints_only() {
        let (x, y) = ramp(10);
        let (dx, _) = downsample(&x, &y, 0, true);
        assert_eq!(dx, vec![0.0, 9.0]);
    }

    #[test]
    fn mismatched_lengths_truncate() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![5.0, 6.0];
        let (dx, dy) = downsample(&x, &y, 10, true);
        assert_eq!(dx, vec![0.0, 1.0]);
        assert_eq!(dy, vec![5.0, 6.0]);
    }
}
