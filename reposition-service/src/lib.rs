pub mod models;
pub mod service;

pub use models::*;
pub use service::{AppState, build_runner, create_app};
