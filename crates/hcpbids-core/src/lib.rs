pub mod bids;
pub mod config;
pub mod error;
pub mod io;
pub mod nifti;
pub mod options;
pub mod params;
pub mod paths;
pub mod plan;
pub mod runner;
pub mod stages;
pub mod types;
pub mod workflow;

#[cfg(test)]
mod fixtures;

pub use error::{HcpError, Result};
