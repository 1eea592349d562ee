//! Momos Runner
//!
//! Turns action scripts into Playwright programs and replays them in a
//! sandboxed browser:
//!
//! - [`compiler`]: script to statement IR, one lowering per script version
//! - [`js`]: the only place JavaScript source text is produced
//! - [`assembler`]: full program around a compiled block
//! - [`gateway`]: sandbox lease, browser health check, write and exec
//! - [`demux`]: trace and spotlight payloads back out of stdout

pub mod assembler;
pub mod compiler;
pub mod demux;
pub mod gateway;
pub mod js;
pub mod runner;
pub mod sandbox;

pub use assembler::{assemble, Assembler, AssemblerOptions, Program, TelemetryOptions};
pub use compiler::{compile, CompiledBlock, Statement};
pub use demux::{demux, Demuxed};
pub use gateway::{BackoffPolicy, ExecutionGateway, GatewayConfig};
pub use runner::Runner;
pub use sandbox::{Sandbox, SandboxLease, SandboxPool, SandboxProvider};
