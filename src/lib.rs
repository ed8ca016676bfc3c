//! Customer feedback service with point-in-time backups and per-record
//! change streams.

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;
pub mod model;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod stream;

pub use app::build_router;
pub use error::{AppError, AppResult};
pub use state::{AppState, ServiceOptions};
