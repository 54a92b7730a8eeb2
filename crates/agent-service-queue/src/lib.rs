//! # Agent Service Queue
//!
//! Job records and a FIFO of pending job ids, persisted in Redis with an
//! automatic fallback to process-local memory.
//!
//! ## Features
//!
//! - Job lifecycle state machine (`queued -> running -> completed | failed`)
//! - Pluggable storage through [`JobBackend`]
//! - Redis backend with bounded calls and liveness tracking
//! - Connect retry with exponential backoff, then permanent memory mode

pub mod backend;
pub mod error;
pub mod job;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use backend::{JobBackend, QueueMode};
pub use error::QueueError;
pub use job::{InvalidTransition, Job, JobStatus};
pub use memory::MemoryBackend;
pub use redis_store::RedisBackend;
pub use store::QueueStore;
