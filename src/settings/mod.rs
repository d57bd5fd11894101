//! Persisted session state: keyed JSON stores and the project record.

pub mod project;
pub mod store;
