//! CLI command implementations for node-stats-exporter.
//!
//! - `check`: verify kernel interfaces and helper tools are reachable
//! - `config`: configuration file generation
//! - `nft`: flatten a saved nftables ruleset offline

pub mod check;
pub mod config;
pub mod nft;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use nft::command_nft;
