//! The knowledge-base seam
//!
//! Everything the bot needs from Wikibase goes through [`KnowledgeBase`]:
//! identifier lookups, filtered statement reads for the fast-run cache, and
//! edits. [`crate::http::HttpKnowledgeBase`] talks to a live MediaWiki
//! installation; the `memory` feature provides an in-process store.

use crate::error::Result;
use crate::ids::{PropertyId, Qid};
use crate::model::{BaseFilter, Reference, Statement};
use async_trait::async_trait;
use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, BTreeSet};

/// A reference to attach to a statement the item already has
///
/// Sent on its own against the statement GUID; the stored claim (rank,
/// qualifiers, other references) is never resent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceAddition {
    pub statement_id: String,
    pub reference: Reference,
}

/// Changes to apply to one item in a single edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemEdit {
    pub qid: Qid,
    /// New statements (no id) and updated existing ones (with id)
    pub upserts: Vec<Statement>,
    /// Existing statements to delete; only their ids are sent
    pub removals: Vec<Statement>,
    /// References added to existing statements
    pub references: Vec<ReferenceAddition>,
    pub summary: String,
}

impl ItemEdit {
    pub fn new(qid: Qid) -> Self {
        Self {
            qid,
            upserts: Vec::new(),
            removals: Vec::new(),
            references: Vec::new(),
            summary: String::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.changes_claims() && self.references.is_empty()
    }

    /// Whether a `wbeditentity` call is needed
    pub fn changes_claims(&self) -> bool {
        !self.upserts.is_empty() || !self.removals.is_empty()
    }

    /// `data` parameter for `wbeditentity`
    pub fn to_json(&self) -> Json {
        let mut claims: Vec<Json> = self.upserts.iter().map(Statement::to_json).collect();
        claims.extend(
            self.removals
                .iter()
                .filter_map(|s| s.id.as_ref())
                .map(|id| json!({ "id": id, "remove": "" })),
        );
        json!({ "claims": claims })
    }
}

/// Result of a successful edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub qid: Qid,
    pub revid: Option<u64>,
    /// Whether the edit created a new item
    pub created: bool,
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Map external identifier values of `property` to the items holding them,
    /// restricted to items matching `filter`. Identifiers found on more than
    /// one item, and items with more than one identifier, are left out.
    async fn id_mapper(
        &self,
        property: &PropertyId,
        filter: &BaseFilter,
    ) -> Result<BTreeMap<String, Qid>>;

    /// Items that have `property` pointing at `value`
    async fn items_with_claim(&self, property: &PropertyId, value: &Qid) -> Result<BTreeSet<Qid>>;

    /// Items matching `filter`
    async fn items_matching(&self, filter: &BaseFilter) -> Result<BTreeSet<Qid>>;

    /// Every `property` statement, with ids and references, on items matching `filter`
    async fn statements(
        &self,
        filter: &BaseFilter,
        property: &PropertyId,
    ) -> Result<Vec<(Qid, Statement)>>;

    /// Current statements of one item
    async fn item_statements(&self, qid: &Qid) -> Result<Vec<Statement>>;

    async fn edit(&self, edit: &ItemEdit) -> Result<EditOutcome>;
}
