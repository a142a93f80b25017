use thiserror::Error;

/// Why a single network probe did not produce a measurement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeFailure {
    #[error("deadline exceeded")]
    Timeout,

    #[error("server answered with HTTP {0}")]
    HttpStatus(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response stream unreadable: {0}")]
    Decode(String),

    #[error("test aborted")]
    Cancelled,
}

impl From<reqwest::Error> for ProbeFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeFailure::Timeout
        } else if let Some(status) = err.status() {
            ProbeFailure::HttpStatus(status.as_u16())
        } else if err.is_body() || err.is_decode() {
            ProbeFailure::Decode(err.to_string())
        } else {
            ProbeFailure::Transport(err.to_string())
        }
    }
}

/// Errors that escape component-level fallbacks.
///
/// The orchestrator never returns these to the caller; they select the
/// synthesized-result path instead.
#[derive(Debug, Error)]
pub enum SpeedTestError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("geolocation lookup failed: {0}")]
    Geolocation(String),

    #[error("measurement pipeline panicked: {0}")]
    Panicked(String),
}
