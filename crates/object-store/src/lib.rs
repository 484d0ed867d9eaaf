//! Swift-style object storage adapter.
//!
//! Implements `common::storage::StorageProvider` against an
//! OpenStack-Swift-compatible REST API: token login with
//! service-catalog discovery, one container per workspace, ACL
//! grants via the container permission headers, and server-side
//! chunk copies for subtree migration.

mod acl;
mod error;
mod swift;

pub use error::SwiftError;
pub use swift::{SwiftClient, SwiftConfig};
