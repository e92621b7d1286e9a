use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("unsupported embedding dimension {0}: expected 2 or 3")]
    UnsupportedDimension(usize),
    #[error("distance kernel arity mismatch: left has {left} components, right has {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("engine not initialized: supply a neighbor table before stepping")]
    Uninitialized,
    #[error("invalid neighbor table: {0}")]
    InvalidNeighbors(String),
}

pub type EmbedResult<T> = Result<T, EmbedError>;
