//! # dollclub-shared
//!
//! Types shared across the Doll Club client crates: id newtypes, the error
//! taxonomy, the realtime co-host endpoint wire protocol, and the remote
//! document schemas pushed by the hosted backend.

pub mod constants;
pub mod documents;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::{EndpointError, MediaError, SyncError, ValidationError};
