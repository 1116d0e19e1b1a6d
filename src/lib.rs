use thiserror::Error;

/// Soft failures of state chunk read/write operations.
///
/// These are ordinary data conditions (truncated input, malformed embedded
/// chunk), never caller defects: a `Load` override is free to ignore one and
/// fall back to a default field value. Violating the chunk's mode state
/// machine is a bug in the caller and panics instead.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("chunk data exhausted at dword {position} (requested {requested} bytes)")]
    BufferExhausted { position: u32, requested: u32 },

    #[error("string region is not valid UTF-8")]
    InvalidString(#[from] std::string::FromUtf8Error),

    #[error("embedded chunk is violating the expected layout, because: {reason}")]
    MalformedSubChunk { reason: &'static str },

    #[error("region data is violating the expected layout, because: {reason}")]
    InvalidRegion { reason: &'static str },
}

#[derive(Error, Debug)]
pub enum FileError {
    #[error("the file's magic value does not match \"Nemo Fi\"")]
    InvalidMagicValue,

    #[error("unsupported container file version {version}")]
    UnsupportedFileVersion { version: u32 },

    #[error("file checksum mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch { stored: u32, computed: u32 },

    #[error("the file is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    #[error("packed region did not inflate to its recorded size")]
    UnpackError,

    #[error("object {0} could not be created from its recorded class id")]
    UnknownClass(u32),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

/// Failures of the mesh transition (vertex welding) engine.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TransitionError {
    #[error("parse requires every prepare call to have been issued first")]
    NotPrepared,

    #[error("welded vertex count {0} exceeds the 16-bit index range of the mesh format")]
    VertexOverflow(usize),

    #[error("material slot count {0} exceeds the 16-bit index range of the mesh format")]
    MaterialSlotOverflow(usize),

    #[error("destination object is not a mesh")]
    NotAMesh,
}

pub mod bitmap;
pub mod chunk;
pub mod classes;
pub mod common;
pub mod context;
pub mod file;
pub mod object;
pub mod transition;
