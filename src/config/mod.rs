//! Application configuration: schema and file-backed store

mod schema;
mod store;

pub use schema::*;
pub use store::ConfigStore;
