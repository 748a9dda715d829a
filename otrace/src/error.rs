use thiserror::Error;

/// Failure of a flush's serialization or file handling. The emit path
/// never produces errors; callers of the public API only ever see these in
/// log output.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
