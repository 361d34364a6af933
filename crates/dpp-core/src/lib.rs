pub mod aws;
pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod orchestrator;
pub mod probe;
pub mod spec;
pub mod types;
pub mod workflow;

pub use error::{DppError, Result};
