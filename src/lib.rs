pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod engine;
pub mod error;
pub mod model;
pub mod routes;
pub mod store;
pub mod utils;

pub use engine::{AttendanceEngine, EngineSettings};
pub use error::EngineError;
