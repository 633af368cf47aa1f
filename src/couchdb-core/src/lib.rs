//! couchdb-core
//!
//! Types shared by the CouchDB client crates:
//! - Client configuration
//! - Response models (view rows, changes feed, bulk results, sessions)
//! - Query parameter encoding
//! - Database name and document path helpers

pub mod config;
pub mod models;
pub mod naming;
pub mod params;

// Re-export commonly used types
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use models::*;
pub use naming::{doc_path, generate_uuid, is_valid_db_name};
pub use params::{encode_params, to_params, Params};
