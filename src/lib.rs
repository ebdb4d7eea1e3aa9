// ABOUTME: Library root for templify - exposes the publish pipeline and its backends.
// ABOUTME: The main binary is in main.rs.

pub mod artifact;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod registry;
pub mod storage;
pub mod types;
pub mod ui;
