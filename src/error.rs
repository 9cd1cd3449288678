use crate::status;

/// Failures that terminate request processing.
///
/// Each kind carries the message shown to the client as a Gopher error menu
/// entry, and maps to the numeric status recorded in the request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GopherError {
    /// Malformed, oversized or timed-out request line, or bad percent-encoding.
    #[error("Bad request.")]
    BadRequest,
    /// Permission denied, excluded extension, or a path escaping the root.
    #[error("Forbidden.")]
    Forbidden,
    /// The selector did not resolve to anything servable.
    #[error("File not found.")]
    FileNotFound,
    /// The CGI child could not be started.
    #[error("Internal server error.")]
    InternalServerError,
}

impl GopherError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest => status::BAD_REQUEST,
            Self::Forbidden => status::FORBIDDEN,
            Self::FileNotFound => status::FILE_NOT_FOUND,
            Self::InternalServerError => status::INTERNAL_SERVER_ERROR,
        }
    }
}
