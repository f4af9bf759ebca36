//! # Cross-Server Chat Relay
//!
//! Relays chat between game servers that have no way of talking to each
//! other. Each server writes its console to a log file; the relay tails those
//! files, picks out chat lines and re-injects them into the other servers'
//! consoles with RCON `qsay` commands over UDP.
//!
//! ## Architecture
//!
//! Everything runs as tokio tasks on one runtime. Nothing blocks: file reads,
//! UDP sends and receives and the timers all suspend the task awaiting them.
//!
//! ### Per-endpoint tasks
//! Each configured server gets its own:
//! - **Status probe**: a single `getstatus` sent at startup. A reply marks the
//!   server active and supplies its display name. No reply within the timeout
//!   leaves it inactive for the lifetime of the process.
//! - **Log tailer**: polls the log file and forwards newly appended lines.
//! - **Outbound sender**: sends at most one queued message per tick, and only
//!   while the server is active.
//!
//! ### Dispatch loop
//! A single task receives lines from every tailer over an mpsc channel, runs
//! them through the installed handlers and pushes the results onto the
//! queues of the destination servers.
//!
//! ## Ordering
//! Lines from one log are handled in file order and every queue is strictly
//! FIFO. There is no ordering between different servers' queues.
//!
//! ## Module Organization
//!
//! - `config`: JSON configuration, validation and timing
//! - `endpoint`: the shared table of servers and their liveness
//! - `tailer`: incremental log reading and line assembly
//! - `prober`: the startup `getstatus` probe
//! - `handlers`: the handler trait, built-in handlers and their registry
//! - `dispatch`: routing handler output to destination queues
//! - `outbound`: per-server queues and rate-limited senders
//! - `coordinator`: spawns and owns all of the above
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use relay::config::RelayConfig;
//! use relay::coordinator::Relay;
//! use relay::handlers::HandlerRegistry;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::load(Path::new("config.json")).await?;
//!     let relay = Relay::from_config(config, &HandlerRegistry::builtin())?;
//!
//!     let handle = relay.start().await;
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod prober;
pub mod tailer;

pub use error::RelayError;
