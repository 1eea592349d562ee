//! Momos CLI
//!
//! Validate, compile and demultiplex scripts locally; generate and run them
//! through a Momos service.

pub mod client;
pub mod commands;
pub mod output;
