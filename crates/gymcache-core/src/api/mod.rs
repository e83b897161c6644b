//! Read-only client for the gym backend.
//!
//! The sync only needs three shapes from the backend: the nested routine
//! graph, the exercise catalog with images, and the latest membership row
//! of a user. `BackendSource` is that contract; `RestBackend` implements it
//! against a PostgREST-style REST endpoint using bearer token auth.

pub mod client;
pub mod error;
pub mod source;

pub use client::RestBackend;
pub use error::ApiError;
pub use source::BackendSource;
