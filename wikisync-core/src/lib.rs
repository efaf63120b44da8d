//! wikisync core library — domain types, path resolution, file enumeration
//! and the remote-service contract.
//!
//! - [`types`] — [`ContentUnit`], [`Credentials`], [`UnitError`]
//! - [`resolver`] — filesystem path → page identifier
//! - [`files`] — recursive, stable source-tree listing
//! - [`remote`] — [`RemoteService`] trait
//! - [`error`] — [`CoreError`], [`RemoteError`]

pub mod error;
pub mod files;
pub mod remote;
pub mod resolver;
pub mod types;

pub use error::{CoreError, RemoteError, MISSING_TITLE};
pub use remote::{EditRequest, PageRevision, RemoteService, Reviser, WriteReceipt};
pub use resolver::{resolve, NamespaceMap, ResolvedPath};
pub use types::{ContentUnit, Credentials, UnitError};
