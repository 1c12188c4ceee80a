//! HTTP API handlers

pub mod authors;
pub mod health;
pub mod refresh;

pub use authors::author_routes;
pub use health::health_routes;
pub use refresh::refresh_routes;
