//! Ingestion pipeline.
//!
//! Turns git state into the frozen post set the cache serves. The
//! pipeline has four stages, run in a fixed order so that the admission
//! rule is deterministic:
//!
//! 1. **Gather**: the collaborators read commits: the workspace branch
//!    first ([`git`]), then every mirrored repository a list follows
//!    ([`mirror`], [`lists`]), grouped per mirror in list order.
//! 2. **Transform**: each commit (and later each embedded reference)
//!    becomes a [`crate::models::Post`] ([`transformer`]).
//! 3. **Process**: identities are registered, duplicates dropped,
//!    embedded references expanded into virtual posts, and virtual stubs
//!    merged into the workspace posts they duplicate ([`processor`]).
//! 4. **Count**: interaction counters are recomputed from scratch over
//!    the unified set with canonical-pair deduplication
//!    ([`interactions`]).
//!
//! A failure in any single commit, reference, or collaborator call is
//! logged and skipped; ingestion always completes with whatever could be
//! read.

pub mod git;
pub mod interactions;
pub mod lists;
pub mod mirror;
pub mod processor;
pub mod transformer;
