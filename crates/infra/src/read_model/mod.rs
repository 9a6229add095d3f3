//! Disposable key/value storage for read models and derived records.

pub mod store;

pub use store::{InMemoryStore, KeyValueStore};
