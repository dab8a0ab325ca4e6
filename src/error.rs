use thiserror::Error;

/// Errors that can occur while extracting a recipe
#[derive(Error, Debug)]
pub enum ParseError {
    /// The input URL could not be parsed at all
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The URL parsed but uses a scheme we will not fetch
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Input rejected before any work started (empty text, oversized text)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// DNS resolution failed for the host
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),

    /// No network connectivity
    #[error("No internet connection: {0}")]
    NoConnectivity(String),

    /// Navigation did not settle within the allowed window
    #[error("Navigation timeout after {0}s")]
    NavigationTimeout(u64),

    /// The browser devtools channel failed
    #[error("Browser protocol error: {0}")]
    BrowserProtocol(String),

    /// Navigation failed for a reason other than the classes above
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// The rendering engine could not be started
    #[error("Rendering engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Page rendered but no strategy produced a valid recipe
    #[error("Could not parse a recipe from this page")]
    ExtractionEmpty,

    /// The language-model collaborator failed or returned garbage
    #[error("AI extraction failed: {0}")]
    LlmError(String),

    /// HTTP transport failure (LLM client)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),
}

impl ParseError {
    /// Whether the retry loop may try again after this failure.
    ///
    /// Malformed input, DNS failures, dead connectivity, navigation
    /// timeouts, and devtools protocol faults will not improve on a second
    /// attempt and abort the loop immediately. Extraction-empty is
    /// retryable even though it is usually deterministic per page.
    pub fn is_retryable(&self) -> bool {
        match self {
            ParseError::InvalidUrl(_)
            | ParseError::UnsupportedScheme(_)
            | ParseError::Validation(_)
            | ParseError::DnsFailure(_)
            | ParseError::NoConnectivity(_)
            | ParseError::NavigationTimeout(_)
            | ParseError::BrowserProtocol(_)
            | ParseError::EngineUnavailable(_)
            | ParseError::ConfigError(_) => false,
            ParseError::Navigation(_) | ParseError::ExtractionEmpty => true,
            ParseError::LlmError(_) => true,
            ParseError::HttpError(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
        }
    }
}

/// Folds a raw navigation failure message into the error taxonomy.
///
/// Chromium reports network-level failures as net error strings inside the
/// protocol message, so classification is substring-based.
pub fn classify_navigation_failure(message: &str, timeout_secs: u64) -> ParseError {
    let lower = message.to_lowercase();
    if lower.contains("err_name_not_resolved") || lower.contains("dns") {
        ParseError::DnsFailure(message.to_string())
    } else if lower.contains("err_internet_disconnected") || lower.contains("err_network_changed") {
        ParseError::NoConnectivity(message.to_string())
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ParseError::NavigationTimeout(timeout_secs)
    } else if lower.contains("protocol error") || lower.contains("protocol violation") {
        ParseError::BrowserProtocol(message.to_string())
    } else {
        ParseError::Navigation(message.to_string())
    }
}
