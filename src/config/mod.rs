//! Configuration module for Kage-Recon
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use kage_recon::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("kage.toml")).unwrap();
//! println!("Solver endpoint: {}", config.solver.endpoint);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlConfig, HarvestConfig, HttpConfig, OutputConfig, ProxyConfig, RetryConfig,
    SolverConfig, TaskConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
