//! iprbot common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the iprbot workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`BotError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup ([`logging`])
//! - **Run log**: the per-run structured log file every bot run writes ([`run_log`])
//!
//! # Example
//!
//! ```no_run
//! use iprbot_common::run_log::{BotMetadata, RunLog};
//!
//! fn open_log() -> iprbot_common::Result<RunLog> {
//!     let metadata = BotMetadata::new("InterproBot_Proteins", "20240101_12:00");
//!     RunLog::create("./logs", &metadata)
//! }
//! ```

pub mod error;
pub mod logging;
pub mod run_log;

// Re-export commonly used types
pub use error::{BotError, Result};
