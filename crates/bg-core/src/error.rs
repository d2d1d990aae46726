use thiserror::Error;

pub type BgResult<T> = Result<T, BgError>;

#[derive(Error, Debug)]
pub enum BgError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: String },

    #[error("Model error: {what}")]
    Model { what: String },
}
