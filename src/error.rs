use thiserror::Error;

/// Cursor overrun reported by the wire codec
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    #[error("Buffer overrun: need {need} bytes, have {have} bytes")]
    Overrun { need: usize, have: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid label length: {0}")]
    InvalidLabelLength(u8),

    #[error("DNS name too long")]
    NameTooLong,

    #[error("DNS name is not terminated by the root label")]
    UnterminatedName,

    #[error("Compressed DNS name where an uncompressed one is required")]
    CompressedName,

    #[error("Invalid domain name: {0}")]
    InvalidName(String),

    #[error("Invalid DNS header")]
    InvalidHeader,

    #[error("Unsupported DNS feature: {0}")]
    Unsupported(String),
}

// Lengths come from untrusted bytes; an overrun is a malformed record.
impl From<WireError> for DnsError {
    fn from(err: WireError) -> Self {
        DnsError::MalformedRecord(err.to_string())
    }
}

impl From<std::io::Error> for DnsError {
    fn from(err: std::io::Error) -> Self {
        DnsError::MalformedRecord(err.to_string())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid UDP payload size: {0}")]
    InvalidPayloadSize(String),

    #[error("Invalid sync interval: {0}")]
    InvalidSyncInterval(String),

    #[error("Store backend '{0}' is not available")]
    UnavailableBackend(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DnsError>;
