#[allow(clippy::module_inception)]
pub mod auth;
pub mod middleware;
