use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported format for {}: {source}", path.display())]
    UnsupportedFormat {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    #[error("Malformed GPS tag: {0}")]
    MalformedGpsTag(String),

    #[error("Record store failure at {}: {source}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io { path: path.into(), source }
    }

    pub(crate) fn store(path: impl Into<PathBuf>, source: rusqlite::Error) -> Self {
        ExtractError::Store { path: path.into(), source }
    }
}

/// Why a file could not be treated as an image container with readable metadata
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("metadata block error: {0}")]
    Metadata(#[from] MetadataError),
}

/// Structural faults in the TIFF-layout metadata block
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MetadataError {
    #[error("metadata block too short ({0} bytes)")]
    TooShort(usize),

    #[error("invalid byte order mark {0:#06x}")]
    InvalidByteOrder(u16),

    #[error("invalid TIFF magic {0}")]
    InvalidMagic(u16),

    #[error("IFD at offset {0} lies outside the metadata block")]
    IfdOutOfBounds(u32),
}

pub type Result<T> = std::result::Result<T, ExtractError>;
