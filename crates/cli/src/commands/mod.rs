//! CLI Commands

pub mod run;
pub mod script;
pub mod trace;
