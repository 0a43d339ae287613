pub mod handlers;
pub mod memory;
pub mod pg;
pub mod repo_types;
pub mod store;
