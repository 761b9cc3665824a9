//! Floating point precision handling
//!
//! Decoded values are rounded to the parameter's declared number of
//! decimals so viewers never see values like 10.159000000000001.

/// Largest number of decimals kept for any parameter
pub const MAX_PRECISION: u8 = 6;

/// Round a value to the specified number of decimal places
///
/// Precision is clamped to [`MAX_PRECISION`]. Non-finite values pass through.
pub fn round_to_precision(value: f64, precision: u8) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let precision = precision.min(MAX_PRECISION);
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}

/// Format a decoded value for a data line
///
/// Non-finite values are written as the literal `NaN`.
pub fn format_value(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        "NaN".to_string()
    }
}
