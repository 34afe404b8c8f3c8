//! facematchd: HTTP face recognition service.
//!
//! The binary in `main.rs` wires these modules together; the CLI reuses
//! them to serve the same requests without a running daemon.

pub mod api;
pub mod config;
pub mod dto;
pub mod engine;
pub mod service;

pub use api::{create_router, AppState};
pub use config::{Config, ConfigError};
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use service::FaceService;
