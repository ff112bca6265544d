pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod models;
pub mod openapi;
pub mod render;
pub mod repo;
pub mod routes;
pub mod slug;
pub mod storage;
pub mod summary;
pub mod tokens;

// Re-export commonly used items for tests / external users
pub use routes::AppState;
