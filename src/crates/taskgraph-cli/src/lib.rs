//! # taskgraph-cli
//!
//! Library half of the `taskgraph` binary: simulated agent behaviors for the
//! reference topology, exposed so they can be tested without spawning the CLI.

pub mod demo;

pub use demo::{behaviors, AgentTask, Simulation};
