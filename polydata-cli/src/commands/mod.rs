//! CLI command implementations.

pub mod catalog;
pub mod common;
pub mod config;
pub mod download;
pub mod init;
