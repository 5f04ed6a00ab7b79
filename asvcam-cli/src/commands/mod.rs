//! Subcommand implementations.

pub mod capture;
pub mod config;
pub mod init;
pub mod replay;
pub mod retrieve;
pub mod status;
