pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(ai, bi)| ai * bi).sum()
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let ez = z.exp();
        ez / (1.0 + ez)
    }
}

pub(crate) fn clip01(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// `value / max` clipped to [0, 1].
pub(crate) fn scaled(value: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    clip01(value / max)
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub(crate) fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Median/MAD z-score; 0 until enough history exists to be meaningful.
pub(crate) fn robust_z(value: f64, history: &[f64]) -> f64 {
    if history.len() < 10 {
        return 0.0;
    }

    let mut values = history.to_vec();
    values.sort_by(|a, b| a.total_cmp(b));
    let median = percentile_sorted(&values, 50.0);

    let mut abs_dev: Vec<f64> = values.iter().map(|x| (x - median).abs()).collect();
    abs_dev.sort_by(|a, b| a.total_cmp(b));
    let mad = percentile_sorted(&abs_dev, 50.0).max(1e-9);

    (value - median) / (1.4826 * mad)
}

fn percentile_sorted(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let rank = ((p / 100.0) * (values.len() - 1) as f64).round() as usize;
    values[rank.min(values.len() - 1)]
}

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in metres.
pub(crate) fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}
