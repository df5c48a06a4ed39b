//! Key/value storage abstractions
//!
//! The extension persists everything through a browser-style key/value API
//! (get/set/watch). This module defines that seam and two backends.
//!
//! ## Available Backends
//!
//! - `memory`: DashMap-backed store (default, tests)
//! - `file`: a single JSON document on disk, rewritten atomically

mod file;
mod memory;
mod traits;

pub use file::JsonFileStore;
pub use memory::InMemoryKeyValueStore;
pub use traits::*;
