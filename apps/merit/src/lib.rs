//! # merit
//!
//! The async shell around `merit-core`: configuration, the budgeted
//! service facade, the axum HTTP API and the clap CLI.

pub mod api;
pub mod cli;
pub mod config;
pub mod service;
