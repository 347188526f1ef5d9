//! # Loregate Core
//!
//! Domain types, traits, and error definitions for the Loregate
//! character-card gateway. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.

pub mod error;
pub mod message;
pub mod settings;
pub mod upstream;

// Re-export key types at crate root for ergonomics
pub use error::{CardError, EntryError, Error, HistoryError, Result, StoreError, UpstreamError};
pub use message::{Message, Role};
pub use settings::CardSettings;
pub use upstream::CompletionClient;
