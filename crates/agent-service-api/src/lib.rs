//! # Agent Service API
//!
//! HTTP interface over the job queue.
//!
//! ```text
//! GET  /health          - Liveness plus queue health and mode
//! GET  /test            - Smoke test that never touches the queue
//! POST /run             - Submit { jobId, command }
//! GET  /status/{jobId}  - Job status, logs and timestamps
//! ```

pub mod error;
pub mod http;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use http::routes::create_router;
pub use server::ApiServer;
pub use state::AppState;
