use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid model input: {0}")]
    InvalidModelInput(String),

    #[error("track impossible: {0}")]
    TrackImpossible(String),

    #[error("frame {frame} out of bounds, source has {len} frames")]
    OutOfBoundsFrame { frame: usize, len: usize },

    #[error("numeric instability: {0}")]
    NumericInstability(String),
}
