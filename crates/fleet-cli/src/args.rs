//! Shared argument parsers for the CLI binaries.

/// Parse a finite, strictly positive number.
pub fn positive_f64(value: &str) -> Result<f64, String> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    if parsed.is_finite() && parsed > 0.0 {
        Ok(parsed)
    } else {
        Err(format!("`{value}` must be a finite number greater than zero"))
    }
}
