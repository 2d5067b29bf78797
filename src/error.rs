//! Public error envelope.
//!
//! Only two failure kinds ever reach callers of the cache proper:
//! invalid input (bad hashes, bad URLs, unparseable scope strings) and
//! not-found (an absent post id where one is required). Collaborator
//! failures and parse skips are logged and degrade to a smaller cache;
//! they never cross the public boundary.

use thiserror::Error;

use crate::protocol::ProtocolError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("post not found: {0}")]
    PostNotFound(String),
}

impl From<ProtocolError> for CacheError {
    fn from(err: ProtocolError) -> Self {
        CacheError::InvalidInput(err.to_string())
    }
}
