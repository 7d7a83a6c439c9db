// Frameworks layer: environment configuration and the axum/tokio bootstrap.

pub mod config;
pub mod server;
