pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Round to one decimal place, the resolution shown for temperatures.
pub fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
