use thiserror::Error;

use crate::error::DnsError;
use crate::rrset::RdataError;
use crate::store::StoreError;

/// Zone-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZoneError {
    /// Zone file parsing error
    #[error("Zone parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// The first record of a zone is not its SOA
    #[error("Zone does not start with an SOA record")]
    MissingSOA,

    /// More than one SOA record in one zone
    #[error("Zone contains duplicate SOA records")]
    DuplicateSOA,

    /// A record whose owner lies outside the zone
    #[error("Record {owner} is outside zone {zone}")]
    OutOfZone { owner: String, zone: String },

    /// Zone file too large
    #[error("Zone file exceeds maximum size")]
    FileTooLarge,

    #[error("IO error: {0}")]
    IoError(String),

    #[error(transparent)]
    Dns(#[from] DnsError),

    #[error(transparent)]
    Rdata(#[from] RdataError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<std::io::Error> for ZoneError {
    fn from(err: std::io::Error) -> Self {
        ZoneError::IoError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ZoneError>;
