pub mod auth;
pub mod config;
pub mod handlers;
pub mod server;
pub mod stream;

pub use auth::StaticAuthorizer;
pub use config::ServerConfig;
pub use server::{build_router, start, AppState, ServerHandle};
