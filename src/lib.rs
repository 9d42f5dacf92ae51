pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod listing;
pub mod models;
pub mod moderation;
pub mod notify;
pub mod openapi;
pub mod render;
pub mod repo;
pub mod routes;
pub mod security;

pub use routes::{config, AppState};
pub use security::SecurityHeaders;
