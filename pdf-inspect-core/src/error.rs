use crate::parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Object not found: {0}")]
    ObjectNotFound(crate::parser::ObjectId),

    #[error("Object {0} is not a stream")]
    NotAStream(crate::parser::ObjectId),
}

pub type Result<T> = std::result::Result<T, InspectError>;
