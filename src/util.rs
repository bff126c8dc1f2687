pub fn mean(data: &[f64]) -> Option<f64> {
    let sum = data.iter().sum::<f64>();
    let count = data.len();

    match count {
        positive if positive > 0 => Some(sum / count as f64),
        _ => None,
    }
}

/// Render milliseconds as `m:ss.cc`, truncating to centiseconds
pub fn format_time(ms: f64) -> String {
    let ms = if ms.is_finite() { ms.max(0.0) } else { 0.0 };
    let total_ms = ms.floor() as u64;
    let total_secs = total_ms / 1000;
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    let centis = (total_ms % 1000) / 10;

    format!("{}:{:02}.{:02}", minutes, seconds, centis)
}

/// `format_time` for optional statistics, `-` when absent
pub fn format_opt(ms: Option<f64>) -> String {
    ms.map_or_else(|| "-".to_string(), format_time)
}
