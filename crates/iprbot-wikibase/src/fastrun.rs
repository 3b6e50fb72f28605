//! Fast-run cache
//!
//! A [`FastRunContainer`] answers "does this item need an edit?" from a bulk
//! snapshot instead of fetching every item. The snapshot is scoped by a
//! [`BaseFilter`]: the first lookup enumerates the matching items, and the
//! first lookup of each property loads that property's statements for all of
//! them in one query. Items outside the filter, and items edited since the
//! snapshot, are fetched individually.
//!
//! [`FastRunStore`] owns one container per filter and is cleared explicitly
//! between passes that must see fresh data.

use crate::client::{ItemEdit, KnowledgeBase};
use crate::engine::ItemEngine;
use crate::error::Result;
use crate::ids::{PropertyId, Qid};
use crate::model::{BaseFilter, Statement};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

type PropertyStatements = BTreeMap<PropertyId, Vec<Statement>>;

pub struct FastRunContainer {
    base_filter: BaseFilter,
    use_refs: bool,
    members: Option<BTreeSet<Qid>>,
    loaded: BTreeSet<PropertyId>,
    data: BTreeMap<Qid, PropertyStatements>,
    /// Items read one by one: outside the filter, or edited since loading
    individual: BTreeMap<Qid, Vec<Statement>>,
    stale: BTreeSet<Qid>,
}

impl FastRunContainer {
    pub fn new(base_filter: BaseFilter, use_refs: bool) -> Self {
        Self {
            base_filter,
            use_refs,
            members: None,
            loaded: BTreeSet::new(),
            data: BTreeMap::new(),
            individual: BTreeMap::new(),
            stale: BTreeSet::new(),
        }
    }

    pub fn base_filter(&self) -> &BaseFilter {
        &self.base_filter
    }

    pub fn use_refs(&self) -> bool {
        self.use_refs
    }

    async fn is_member(&mut self, kb: &dyn KnowledgeBase, qid: &Qid) -> Result<bool> {
        if self.members.is_none() {
            let members = if self.base_filter.is_empty() {
                BTreeSet::new()
            } else {
                kb.items_matching(&self.base_filter).await?
            };
            info!(filter = %self.base_filter, items = members.len(), "Fast-run scope loaded");
            self.members = Some(members);
        }
        Ok(self.members.as_ref().is_some_and(|m| m.contains(qid)))
    }

    async fn load_property(&mut self, kb: &dyn KnowledgeBase, property: &PropertyId) -> Result<()> {
        if self.loaded.contains(property) {
            return Ok(());
        }
        let rows = kb.statements(&self.base_filter, property).await?;
        debug!(
            filter = %self.base_filter,
            property = %property,
            statements = rows.len(),
            "Loaded property"
        );
        for (qid, statement) in rows {
            self.data
                .entry(qid)
                .or_default()
                .entry(property.clone())
                .or_default()
                .push(statement);
        }
        self.loaded.insert(property.clone());
        Ok(())
    }

    /// Current statements of `qid` for the given properties
    pub async fn statements_for(
        &mut self,
        kb: &dyn KnowledgeBase,
        qid: &Qid,
        properties: &[PropertyId],
    ) -> Result<Vec<Statement>> {
        if !self.individual.contains_key(qid)
            && (self.stale.contains(qid) || !self.is_member(kb, qid).await?)
        {
            let statements = kb.item_statements(qid).await?;
            self.individual.insert(qid.clone(), statements);
        }
        if let Some(all) = self.individual.get(qid) {
            return Ok(all
                .iter()
                .filter(|s| properties.contains(s.property()))
                .cloned()
                .collect());
        }

        let mut out = Vec::new();
        for property in properties {
            self.load_property(kb, property).await?;
            if let Some(statements) = self.data.get(qid).and_then(|by_prop| by_prop.get(property)) {
                out.extend(statements.iter().cloned());
            }
        }
        Ok(out)
    }

    /// Edit needed to bring `qid` in line with `new_statements`
    pub async fn plan(
        &mut self,
        kb: &dyn KnowledgeBase,
        qid: &Qid,
        new_statements: &[Statement],
        append_props: &[PropertyId],
    ) -> Result<ItemEdit> {
        let properties: Vec<PropertyId> = new_statements
            .iter()
            .map(|s| s.property().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let existing = self.statements_for(kb, qid, &properties).await?;
        Ok(ItemEngine::new(self.use_refs).plan(qid, new_statements, append_props, &existing))
    }

    pub async fn write_required(
        &mut self,
        kb: &dyn KnowledgeBase,
        qid: &Qid,
        new_statements: &[Statement],
        append_props: &[PropertyId],
    ) -> Result<bool> {
        let edit = self.plan(kb, qid, new_statements, append_props).await?;
        Ok(!edit.is_empty())
    }

    /// Forget the cached state of an item that was just written
    pub fn apply(&mut self, edit: &ItemEdit) {
        self.data.remove(&edit.qid);
        self.individual.remove(&edit.qid);
        self.stale.insert(edit.qid.clone());
    }

    pub fn clear(&mut self) {
        self.members = None;
        self.loaded.clear();
        self.data.clear();
        self.individual.clear();
        self.stale.clear();
    }
}

/// Containers keyed by base filter
#[derive(Default)]
pub struct FastRunStore {
    containers: BTreeMap<BaseFilter, FastRunContainer>,
}

impl FastRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container for `filter`, created on first use
    pub fn container(&mut self, filter: &BaseFilter, use_refs: bool) -> &mut FastRunContainer {
        self.containers
            .entry(filter.clone())
            .or_insert_with(|| FastRunContainer::new(filter.clone(), use_refs))
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn clear(&mut self) {
        for container in self.containers.values_mut() {
            container.clear();
        }
        info!(containers = self.containers.len(), "Fast-run store cleared");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::MemoryKnowledgeBase;
    use crate::model::{Reference, Snak, Value};
    use crate::pid;

    fn q(s: &str) -> Qid {
        s.parse().unwrap()
    }

    fn part_of(target: &str) -> Statement {
        Statement::new(
            Snak::item(pid!("P361"), q(target)),
            vec![Reference::new(vec![Snak::item(pid!("P248"), q("Q500"))])],
        )
    }

    fn setup() -> (MemoryKnowledgeBase, BaseFilter) {
        let kb = MemoryKnowledgeBase::new();
        kb.insert_item(
            q("Q100"),
            vec![
                Statement::new(Snak::string(pid!("P352"), "P12345"), vec![]),
                part_of("Q999"),
            ],
        );
        kb.insert_item(
            q("Q200"),
            vec![Statement::new(Snak::item(pid!("P31"), q("Q5")), vec![])],
        );
        (kb, BaseFilter::new().with_property(pid!("P352")))
    }

    #[tokio::test]
    async fn test_member_statements_come_from_bulk_load() {
        let (kb, filter) = setup();
        let mut container = FastRunContainer::new(filter, true);

        let statements = container
            .statements_for(&kb, &q("Q100"), &[pid!("P361")])
            .await
            .unwrap();
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].value(), &Value::Item(q("Q999")));

        assert!(!container
            .write_required(&kb, &q("Q100"), &[part_of("Q999")], &[])
            .await
            .unwrap());
        assert!(container
            .write_required(&kb, &q("Q100"), &[part_of("Q998")], &[])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_non_member_fetched_individually() {
        let (kb, filter) = setup();
        let mut container = FastRunContainer::new(filter, true);

        let statements = container
            .statements_for(&kb, &q("Q200"), &[pid!("P31")])
            .await
            .unwrap();
        assert_eq!(statements.len(), 1);
    }

    #[tokio::test]
    async fn test_apply_then_refetch_sees_write() {
        let (kb, filter) = setup();
        let mut container = FastRunContainer::new(filter, true);

        let edit = container
            .plan(&kb, &q("Q100"), &[part_of("Q999"), part_of("Q998")], &[])
            .await
            .unwrap();
        assert_eq!(edit.upserts.len(), 1);
        kb.edit(&edit).await.unwrap();
        container.apply(&edit);

        let again = container
            .plan(&kb, &q("Q100"), &[part_of("Q999"), part_of("Q998")], &[])
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_store_get_or_create_and_clear() {
        let (kb, filter) = setup();
        let mut store = FastRunStore::new();

        store
            .container(&filter, true)
            .statements_for(&kb, &q("Q100"), &[pid!("P361")])
            .await
            .unwrap();
        store.container(&filter, true);
        assert_eq!(store.len(), 1);

        // Write behind the cache's back; only a cleared store notices
        let mut edit = ItemEdit::new(q("Q100"));
        edit.upserts.push(part_of("Q998"));
        kb.edit(&edit).await.unwrap();

        let cached = store
            .container(&filter, true)
            .statements_for(&kb, &q("Q100"), &[pid!("P361")])
            .await
            .unwrap();
        assert_eq!(cached.len(), 1);

        store.clear();
        let fresh = store
            .container(&filter, true)
            .statements_for(&kb, &q("Q100"), &[pid!("P361")])
            .await
            .unwrap();
        assert_eq!(fresh.len(), 2);
    }
}
