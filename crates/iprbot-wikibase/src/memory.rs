//! In-process [`KnowledgeBase`]
//!
//! Holds items as plain statement lists and applies edits the way the live
//! API does: statements without an id get a fresh GUID, statements with an id
//! replace the stored one, removals drop by id, and reference additions are
//! appended to the statement with that GUID. Every applied edit is kept so
//! callers can assert on what was written.

use crate::client::{EditOutcome, ItemEdit, KnowledgeBase};
use crate::error::{Result, WikibaseError};
use crate::ids::{PropertyId, Qid};
use crate::model::{BaseFilter, Statement, Value};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct State {
    items: BTreeMap<Qid, Vec<Statement>>,
    edits: Vec<ItemEdit>,
    next_guid: u64,
    revid: u64,
}

impl State {
    fn assign_guid(&mut self, qid: &Qid) -> String {
        self.next_guid += 1;
        format!("{}$mem-{}", qid, self.next_guid)
    }
}

#[derive(Default)]
pub struct MemoryKnowledgeBase {
    state: Mutex<State>,
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Add (or replace) an item; statements without ids get one
    pub fn insert_item(&self, qid: Qid, statements: Vec<Statement>) {
        let mut state = self.lock();
        let mut stored = Vec::with_capacity(statements.len());
        for mut statement in statements {
            if statement.id.is_none() {
                statement.id = Some(state.assign_guid(&qid));
            }
            stored.push(statement);
        }
        state.items.insert(qid, stored);
    }

    pub fn item(&self, qid: &Qid) -> Option<Vec<Statement>> {
        self.lock().items.get(qid).cloned()
    }

    /// Statements of one property on one item
    pub fn statements_of(&self, qid: &Qid, property: &PropertyId) -> Vec<Statement> {
        self.lock()
            .items
            .get(qid)
            .map(|statements| {
                statements
                    .iter()
                    .filter(|s| s.property() == property)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn edits(&self) -> Vec<ItemEdit> {
        self.lock().edits.clone()
    }

    pub fn edit_count(&self) -> usize {
        self.lock().edits.len()
    }
}

#[async_trait]
impl KnowledgeBase for MemoryKnowledgeBase {
    async fn id_mapper(
        &self,
        property: &PropertyId,
        filter: &BaseFilter,
    ) -> Result<BTreeMap<String, Qid>> {
        let state = self.lock();
        let mut by_id: BTreeMap<String, Vec<Qid>> = BTreeMap::new();

        for (qid, statements) in &state.items {
            if !filter.matches(statements) {
                continue;
            }
            let ids: Vec<&String> = statements
                .iter()
                .filter(|s| s.property() == property)
                .filter_map(|s| match s.value() {
                    Value::String(id) => Some(id),
                    Value::Item(_) => None,
                })
                .collect();
            if let [id] = ids.as_slice() {
                by_id.entry((*id).clone()).or_default().push(qid.clone());
            }
        }

        Ok(by_id
            .into_iter()
            .filter_map(|(id, qids)| match qids.as_slice() {
                [qid] => Some((id, qid.clone())),
                _ => None,
            })
            .collect())
    }

    async fn items_with_claim(&self, property: &PropertyId, value: &Qid) -> Result<BTreeSet<Qid>> {
        let state = self.lock();
        Ok(state
            .items
            .iter()
            .filter(|(_, statements)| {
                statements
                    .iter()
                    .any(|s| s.property() == property && s.value().as_item() == Some(value))
            })
            .map(|(qid, _)| qid.clone())
            .collect())
    }

    async fn items_matching(&self, filter: &BaseFilter) -> Result<BTreeSet<Qid>> {
        let state = self.lock();
        Ok(state
            .items
            .iter()
            .filter(|(_, statements)| filter.matches(statements))
            .map(|(qid, _)| qid.clone())
            .collect())
    }

    async fn statements(
        &self,
        filter: &BaseFilter,
        property: &PropertyId,
    ) -> Result<Vec<(Qid, Statement)>> {
        let state = self.lock();
        let mut out = Vec::new();
        for (qid, statements) in &state.items {
            if !filter.matches(statements) {
                continue;
            }
            out.extend(
                statements
                    .iter()
                    .filter(|s| s.property() == property)
                    .map(|s| (qid.clone(), s.clone())),
            );
        }
        Ok(out)
    }

    async fn item_statements(&self, qid: &Qid) -> Result<Vec<Statement>> {
        self.item(qid)
            .ok_or_else(|| WikibaseError::EntityNotFound(qid.to_string()))
    }

    async fn edit(&self, edit: &ItemEdit) -> Result<EditOutcome> {
        let mut state = self.lock();
        if !state.items.contains_key(&edit.qid) {
            return Err(WikibaseError::api(
                "no-such-entity",
                format!("Could not find an entity with the ID \"{}\".", edit.qid),
            ));
        }

        let mut upserts = Vec::with_capacity(edit.upserts.len());
        for statement in &edit.upserts {
            let mut statement = statement.clone();
            if statement.id.is_none() {
                statement.id = Some(state.assign_guid(&edit.qid));
            }
            upserts.push(statement);
        }
        let removed: BTreeSet<&str> = edit
            .removals
            .iter()
            .filter_map(|s| s.id.as_deref())
            .collect();

        let statements = state.items.entry(edit.qid.clone()).or_default();
        if let Some(unknown) = edit.references.iter().find(|addition| {
            removed.contains(addition.statement_id.as_str())
                || !statements
                    .iter()
                    .any(|s| s.id.as_deref() == Some(addition.statement_id.as_str()))
        }) {
            return Err(WikibaseError::api(
                "no-such-claim",
                format!("Could not find the claim {}", unknown.statement_id),
            ));
        }

        statements.retain(|s| !s.id.as_deref().is_some_and(|id| removed.contains(id)));
        for statement in upserts {
            match statements.iter_mut().find(|s| s.id == statement.id) {
                Some(existing) => *existing = statement,
                None => statements.push(statement),
            }
        }
        for addition in &edit.references {
            if let Some(target) = statements
                .iter_mut()
                .find(|s| s.id.as_deref() == Some(addition.statement_id.as_str()))
            {
                target.references.push(addition.reference.clone());
            }
        }

        state.revid += 1;
        let revid = state.revid;
        state.edits.push(edit.clone());

        Ok(EditOutcome {
            qid: edit.qid.clone(),
            revid: Some(revid),
            created: false,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::Snak;
    use crate::pid;

    fn q(s: &str) -> Qid {
        s.parse().unwrap()
    }

    fn protein(accession: &str, taxon: &str) -> Vec<Statement> {
        vec![
            Statement::new(Snak::string(pid!("P352"), accession), vec![]),
            Statement::new(Snak::item(pid!("P703"), q(taxon)), vec![]),
        ]
    }

    #[tokio::test]
    async fn test_id_mapper_with_filter() {
        let kb = MemoryKnowledgeBase::new();
        kb.insert_item(q("Q1"), protein("P11111", "Q15978631"));
        kb.insert_item(q("Q2"), protein("P22222", "Q83310"));

        let all = kb.id_mapper(&pid!("P352"), &BaseFilter::new()).await.unwrap();
        assert_eq!(all.len(), 2);

        let human = BaseFilter::new().with_value(pid!("P703"), Value::Item(q("Q15978631")));
        let scoped = kb.id_mapper(&pid!("P352"), &human).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped["P11111"], q("Q1"));
    }

    #[tokio::test]
    async fn test_edit_assigns_ids_and_removes() {
        let kb = MemoryKnowledgeBase::new();
        kb.insert_item(q("Q1"), protein("P11111", "Q15978631"));

        let mut edit = ItemEdit::new(q("Q1"));
        edit.upserts
            .push(Statement::new(Snak::item(pid!("P361"), q("Q999")), vec![]));
        let outcome = kb.edit(&edit).await.unwrap();
        assert_eq!(outcome.revid, Some(1));

        let added = kb.statements_of(&q("Q1"), &pid!("P361"));
        assert_eq!(added.len(), 1);
        assert!(added[0].id.is_some());

        let mut removal = ItemEdit::new(q("Q1"));
        removal.removals.push(added[0].clone());
        kb.edit(&removal).await.unwrap();
        assert!(kb.statements_of(&q("Q1"), &pid!("P361")).is_empty());
        assert_eq!(kb.edit_count(), 2);
    }

    #[tokio::test]
    async fn test_reference_addition_keeps_statement() {
        use crate::client::ReferenceAddition;
        use crate::model::Reference;

        let kb = MemoryKnowledgeBase::new();
        let old_ref = Reference::new(vec![Snak::item(pid!("P248"), q("Q400"))]);
        kb.insert_item(
            q("Q1"),
            vec![Statement::new(Snak::item(pid!("P361"), q("Q999")), vec![old_ref.clone()])
                .with_id("Q1$keep")],
        );

        let new_ref = Reference::new(vec![Snak::item(pid!("P248"), q("Q500"))]);
        let mut edit = ItemEdit::new(q("Q1"));
        edit.references.push(ReferenceAddition {
            statement_id: "Q1$keep".to_string(),
            reference: new_ref.clone(),
        });
        kb.edit(&edit).await.unwrap();

        let stored = kb.statements_of(&q("Q1"), &pid!("P361"));
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id.as_deref(), Some("Q1$keep"));
        assert_eq!(stored[0].references, vec![old_ref, new_ref.clone()]);

        let mut dangling = ItemEdit::new(q("Q1"));
        dangling.references.push(ReferenceAddition {
            statement_id: "Q1$gone".to_string(),
            reference: new_ref,
        });
        let err = kb.edit(&dangling).await.unwrap_err();
        assert!(matches!(err, WikibaseError::Api { ref code, .. } if code == "no-such-claim"));
        assert_eq!(kb.edit_count(), 1);
    }

    #[tokio::test]
    async fn test_edit_unknown_item_fails() {
        let kb = MemoryKnowledgeBase::new();
        let err = kb.edit(&ItemEdit::new(q("Q404"))).await.unwrap_err();
        assert!(matches!(err, WikibaseError::Api { .. }));
    }
}
