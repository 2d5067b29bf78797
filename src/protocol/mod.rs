//! Pure value functions over reference strings, repository URLs, and
//! commit hashes.
//!
//! Everything in this module is side-effect free and total except where a
//! `Result` says otherwise. The rest of the crate builds on these
//! canonical forms: a post id is a canonical commit reference, an index
//! key is a canonical repository id, and every comparison between
//! identities goes through normalization first.

pub mod hash;
pub mod reference;
pub mod url;

use thiserror::Error;

/// Errors produced by the protocol value functions.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid commit hash `{0}`: expected hex characters")]
    InvalidHash(String),

    #[error("invalid repository url `{0}`")]
    InvalidUrl(String),

    #[error("invalid {kind} reference value `{value}`")]
    InvalidRefValue { kind: &'static str, value: String },
}
