pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use error::TransferError;
pub use services::worker::{ControllerSettings, JobController, JobOutcome};
