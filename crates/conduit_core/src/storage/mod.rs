//! Storage backends speaking the storage API.
//!
//! The engine only depends on the request and response types of
//! [`crate::conduit::api::StorageRequest`]. The in-memory backend shipped
//! here serves tests, benches and the command line tool; persistent backends
//! live with the application embedding the engine.

pub mod memory;
