//! # dollclub-store
//!
//! Local storage for the Doll Club client, backed by SQLite.
//!
//! Conversations and private messages are local-only in this design; the
//! database is their durable home.  The crate also defines the UI-facing
//! domain models (resolved publications, conversations, messages) handed to
//! the presentation layer.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod profiles;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
