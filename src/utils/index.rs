/// Render an amount in minor units (e.g. satoshi) as a decimal string with `decimals` places.
pub fn format_token_amount(amount: i64, decimals: u32) -> String {
    format!(
        "{:.*}",
        decimals as usize,
        amount as f64 / 10f64.powi(decimals as i32)
    )
}

/// Render a unix timestamp as RFC 3339 in UTC, or the raw number when out of range.
pub fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}
