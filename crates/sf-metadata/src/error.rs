//! Error types for sf-metadata.

pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Metadata API calls.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct Error {
    pub kind: ErrorKind,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub fn with_source(
        kind: ErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    /// Returns the SOAP fault code if the server rejected the call.
    pub fn fault_code(&self) -> Option<&str> {
        match &self.kind {
            ErrorKind::SoapFault { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    #[error("SOAP fault: {code} - {message}")]
    SoapFault { code: String, message: String },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("XML parse error: {0}")]
    Parse(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("{0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::with_source(ErrorKind::Io(err.to_string()), err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::with_source(ErrorKind::Http(err.to_string()), err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soap_fault_display_and_code() {
        let err = Error::new(ErrorKind::SoapFault {
            code: "sf:INVALID_SESSION_ID".to_string(),
            message: "Session expired or invalid".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "SOAP fault: sf:INVALID_SESSION_ID - Session expired or invalid"
        );
        assert_eq!(err.fault_code(), Some("sf:INVALID_SESSION_ID"));
    }

    #[test]
    fn test_io_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.zip");
        let err: Error = io.into();
        assert!(matches!(err.kind, ErrorKind::Io(_)));
        assert!(err.source.is_some());
        assert_eq!(err.fault_code(), None);
    }
}
