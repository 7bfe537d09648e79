pub mod args;
pub mod automation;
pub mod bridge;
pub mod config;
pub mod control_plane;
pub mod controller;
pub mod error;
pub mod heuristics;
pub mod logging;
pub mod page;
pub mod retry;
pub mod store;
pub mod tasks;

pub use config::Config;
pub use controller::Controller;
pub use error::{Error, Result};
