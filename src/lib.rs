//! # artifact-finder
//!
//! Search a remote artifact repository by group id, artifact id and
//! contained class name, against a locally cached copy of the repository's
//! published search index.
//!
//! ## Architecture
//!
//! - **config**: Search configuration and local directory resolution
//! - **fetch**: Transfer clients for remote index resources (HTTP or a local mirror)
//! - **store**: LMDB-backed local index bound to one remote repository
//! - **sync**: Full and incremental synchronization against the remote descriptor
//! - **query**: Criteria compilation into a conjunctive query, flat execution
//! - **filter**: Substring post-filter over matched artifacts' class lists
//! - **session**: Build-once session management and the search operation
//! - **error**: The single error kind surfaced to callers

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod query;
pub mod session;
pub mod store;
pub mod sync;
