use crate::telescope::{DomeState, TelescopeError};

/// Scans whitespace-delimited `key=value` tokens and returns the value of
/// the first token matching `key`.
pub fn find_value<'a>(key: &str, output: &'a str) -> Option<&'a str> {
    output
        .split_whitespace()
        .find_map(|token| token.strip_prefix(key)?.strip_prefix('='))
}

pub fn find_float(key: &str, output: &str) -> Option<f64> {
    find_value(key, output)?.parse().ok()
}

pub fn parse_slit_status(output: &str) -> Result<DomeState, TelescopeError> {
    match find_value("slit", output) {
        Some("open") => Ok(DomeState::Open),
        Some("closed") => Ok(DomeState::Closed),
        _ => Err(TelescopeError::UnexpectedOutput {
            query: "slit status",
            output: output.to_string(),
        }),
    }
}
