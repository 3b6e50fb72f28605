//! Wikibase access for iprbot
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! # Overview
//!
//! - **Model**: identifiers ([`ids`]), statements, references and base filters ([`model`])
//! - **Client**: the [`KnowledgeBase`] trait and its MediaWiki/SPARQL implementation ([`http`])
//! - **Fast-run cache**: bulk-loaded statement snapshots keyed by filter ([`fastrun`])
//! - **Engine**: append/replace edit planning and logged writes ([`engine`])
//!
//! With the `memory` feature, [`memory::MemoryKnowledgeBase`] provides an
//! in-process store with the same semantics.
//!
//! # Example
//!
//! ```no_run
//! use iprbot_wikibase::{pid, BaseFilter, ClientConfig, FastRunStore, HttpKnowledgeBase, Qid};
//!
//! # async fn demo() -> iprbot_wikibase::Result<()> {
//! let kb = HttpKnowledgeBase::new(ClientConfig::default())?;
//! let filter = BaseFilter::new().with_property(pid!("P352"));
//! let mut store = FastRunStore::new();
//! let existing = store
//!     .container(&filter, true)
//!     .statements_for(&kb, &"Q100".parse::<Qid>()?, &[pid!("P361")])
//!     .await?;
//! # let _ = existing;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod engine;
pub mod entity;
pub mod error;
pub mod fastrun;
pub mod http;
pub mod ids;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod model;
pub mod sparql;

pub use client::{EditOutcome, ItemEdit, KnowledgeBase, ReferenceAddition};
pub use engine::{try_write, ItemEngine};
pub use error::{Result, WikibaseError};
pub use fastrun::{FastRunContainer, FastRunStore};
pub use http::{ClientConfig, HttpKnowledgeBase};
pub use ids::{PropertyId, Qid};
pub use model::{BaseFilter, Reference, Snak, Statement, Value};
