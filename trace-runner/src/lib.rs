//! # trace-runner - In-pod Tracer Execution Agent
//!
//! trace-runner is the process started inside a trace job's pod. It receives a
//! validated trace request, finds the process to trace, launches bpftrace or a
//! bcc tool as a supervised child, and optionally renders the captured stacks
//! as a flame graph.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Process    │──▶│    Tracer    │──▶│   Process    │──▶│    Output    │
//! │   Lookup     │   │   Dispatch   │   │  Supervisor  │   │   Pipeline   │
//! │ (/proc scan) │   │ (bpftrace,   │   │ (SIGINT x2)  │   │ (collapse →  │
//! │              │   │  bcc)        │   │              │   │  flamegraph) │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!   container only                                          flame graph only
//! ```
//!
//! ## Module Structure
//!
//! - [`process_lookup`]: map a pod UID and container name to a host PID via
//!   `/proc/<pid>/mountinfo`
//! - [`dispatch`]: build the tracer command line, rendering the container pid
//!   into bpftrace programs
//! - [`supervisor`]: run the tracer and drive the two-stage interrupt protocol
//! - [`output`]: turn captured stack samples into a flame graph artifact
//! - [`runner`]: compose the stages for one invocation
//! - [`preflight`]: host checks before anything is launched
//! - [`cli`]: command-line arguments and their conversion to a request
//! - [`domain`]: request types and per-stage errors
//!
//! ## Interrupt Protocol
//!
//! bpftrace prints its maps on the first SIGINT and keeps running. The first
//! Ctrl-C therefore only reaches the tracer (through the terminal's process
//! group); the second one makes the supervisor kill it.
//!
//! ## Typical Usage
//!
//! ```bash
//! # Trace one container of a pod
//! trace-runner --target container --poduid <UID> --container web --program /programs/p.bt
//!
//! # Record stacks and render a flame graph
//! trace-runner --flamegraph --output file --output-path /out/flamegraph.svg -f stacks.bt
//! ```

pub mod cli;
pub mod dispatch;
pub mod domain;
pub mod output;
pub mod preflight;
pub mod process_lookup;
pub mod runner;
pub mod supervisor;
