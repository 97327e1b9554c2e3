//! Command-line interface helpers

pub mod commands;

pub use commands::{cmd_config, cmd_decode, cmd_encode, cmd_query, CliResult};
