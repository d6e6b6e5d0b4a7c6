// Public API for integration tests and potential library usage

pub mod api;
pub mod auth;
pub mod cache;
pub mod catalog;
pub mod llm;
pub mod pool;
pub mod sanitize;
pub mod session;
pub mod state;
pub mod types;
