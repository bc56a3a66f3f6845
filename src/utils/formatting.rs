pub fn format_duration(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        let mins = ms / 60_000;
        let secs = (ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

pub fn format_secs(secs: f64) -> String {
    format_duration((secs.max(0.0) * 1000.0).round() as u64)
}

pub fn format_percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}
