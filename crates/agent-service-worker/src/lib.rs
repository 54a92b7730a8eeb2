//! # Agent Service Worker
//!
//! Drains the job queue one job at a time: runs each command through
//! `sh -c`, records the outcome and reports it to the Hub.
//!
//! ## Features
//!
//! - Streaming stdout/stderr capture with stream-tagged log lines
//! - Process-group timeout with SIGTERM grace before SIGKILL
//! - Best-effort Hub callback with classified failures
//! - Panic-safe job processing; no job is left `running`

pub mod error;
pub mod executor;
pub mod notifier;
pub mod worker;

pub use error::WorkerError;
pub use executor::{CommandExecutor, ExecutionResult};
pub use notifier::{HubNotifier, HubUpdate, NotifyFailure, NotifyOutcome};
pub use worker::Worker;
