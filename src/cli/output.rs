//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::ApiError;

/// Map domain/service errors to a single line for stderr.
pub fn map_error(e: &ApiError) -> String {
    let message = match e {
        ApiError::Unauthorized(_) => format!(
            "{} (check api_key in your config file or ROBOTO_API_KEY)",
            e
        ),
        _ => e.to_string(),
    };
    message.lines().collect::<Vec<_>>().join(" ")
}
