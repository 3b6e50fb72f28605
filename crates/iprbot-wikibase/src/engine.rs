//! Item engine: turn desired statements into a minimal edit
//!
//! For every property present in the new data the engine compares values
//! against what the item already has. Properties listed as append-only keep
//! their existing statements; all other properties are replaced, so existing
//! values missing from the new data are removed. Values already on the item
//! only get the references they lack, attached by statement GUID; existing
//! claims are never rewritten.

use crate::client::{EditOutcome, ItemEdit, KnowledgeBase, ReferenceAddition};
use crate::error::Result;
use crate::ids::{PropertyId, Qid};
use crate::model::Statement;
use iprbot_common::run_log::{LogEntry, RunLog};
use std::collections::BTreeSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct ItemEngine {
    use_refs: bool,
}

impl Default for ItemEngine {
    fn default() -> Self {
        Self { use_refs: true }
    }
}

impl ItemEngine {
    /// With `use_refs` off, a matching value counts as up to date whatever its references
    pub fn new(use_refs: bool) -> Self {
        Self { use_refs }
    }

    pub fn plan(
        &self,
        qid: &Qid,
        new_statements: &[Statement],
        append_props: &[PropertyId],
        existing: &[Statement],
    ) -> ItemEdit {
        let mut edit = ItemEdit::new(qid.clone());
        let properties: BTreeSet<&PropertyId> =
            new_statements.iter().map(Statement::property).collect();

        for property in properties {
            let current: Vec<&Statement> = existing
                .iter()
                .filter(|s| s.property() == property)
                .collect();
            let wanted = merge_duplicates(new_statements.iter().filter(|s| s.property() == property));

            for statement in &wanted {
                match current.iter().find(|s| s.value() == statement.value()) {
                    Some(found) if self.use_refs => {
                        edit.references.extend(missing_references(qid, found, statement));
                    },
                    Some(_) => {},
                    None => {
                        let mut added = statement.clone();
                        added.id = None;
                        edit.upserts.push(added);
                    },
                }
            }

            if !append_props.contains(property) {
                edit.removals.extend(
                    current
                        .iter()
                        .filter(|s| !wanted.iter().any(|w| w.value() == s.value()))
                        .map(|s| (*s).clone()),
                );
            }
        }

        debug!(
            qid = %qid,
            upserts = edit.upserts.len(),
            removals = edit.removals.len(),
            references = edit.references.len(),
            "Planned edit"
        );
        edit
    }
}

/// Collapse statements with the same value, pooling their references
fn merge_duplicates<'a>(statements: impl Iterator<Item = &'a Statement>) -> Vec<Statement> {
    let mut merged: Vec<Statement> = Vec::new();
    for statement in statements {
        match merged.iter_mut().find(|m| m.value() == statement.value()) {
            Some(m) => {
                for reference in &statement.references {
                    if !m.has_equivalent_reference(reference) {
                        m.references.push(reference.clone());
                    }
                }
            },
            None => merged.push(statement.clone()),
        }
    }
    merged
}

/// References of `new` that `existing` lacks, addressed to its GUID
fn missing_references(qid: &Qid, existing: &Statement, new: &Statement) -> Vec<ReferenceAddition> {
    let missing = new
        .references
        .iter()
        .filter(|r| !existing.has_equivalent_reference(r));

    let Some(statement_id) = existing.id.as_ref() else {
        if missing.count() > 0 {
            warn!(qid = %qid, value = %existing.value(), "Existing statement has no id; references not added");
        }
        return Vec::new();
    };

    missing
        .map(|reference| ReferenceAddition {
            statement_id: statement_id.clone(),
            reference: reference.clone(),
        })
        .collect()
}

/// Perform `edit` unless it is empty or writes are disabled, recording the
/// outcome in the run log. Failures are logged and returned.
pub async fn try_write(
    kb: &dyn KnowledgeBase,
    edit: &ItemEdit,
    external_id: &str,
    external_prop: &PropertyId,
    write: bool,
    log: &RunLog,
) -> Result<Option<EditOutcome>> {
    if edit.is_empty() {
        debug!(qid = %edit.qid, external_id, "No changes");
        return Ok(None);
    }
    if !write {
        log.record(
            LogEntry::info(external_id, external_prop.as_str(), "SKIP (writes disabled)")
                .with_qid(edit.qid.as_str()),
        );
        return Ok(None);
    }

    match kb.edit(edit).await {
        Ok(outcome) => {
            let message = if outcome.created { "CREATE" } else { "UPDATE" };
            let mut entry = LogEntry::info(external_id, external_prop.as_str(), message)
                .with_qid(outcome.qid.as_str());
            if let Some(revid) = outcome.revid {
                entry = entry.with_revid(revid);
            }
            log.record(entry);
            Ok(Some(outcome))
        },
        Err(e) => {
            log.record(
                LogEntry::error(external_id, external_prop.as_str(), e.to_string())
                    .with_qid(edit.qid.as_str())
                    .with_kind(e.kind()),
            );
            Err(e)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{Reference, Snak};
    use crate::pid;

    fn q(s: &str) -> Qid {
        s.parse().unwrap()
    }

    fn reference(release: &str) -> Reference {
        Reference::new(vec![
            Snak::item(pid!("P248"), q(release)),
            Snak::string(pid!("P854"), "http://www.ebi.ac.uk/interpro/protein/P12345"),
        ])
    }

    fn part_of(target: &str, release: &str) -> Statement {
        Statement::new(Snak::item(pid!("P361"), q(target)), vec![reference(release)])
    }

    #[test]
    fn test_new_value_added() {
        let edit = ItemEngine::default().plan(&q("Q100"), &[part_of("Q999", "Q500")], &[], &[]);
        assert_eq!(edit.upserts.len(), 1);
        assert!(edit.upserts[0].id.is_none());
        assert!(edit.removals.is_empty());
    }

    #[test]
    fn test_identical_statement_is_noop() {
        let existing = vec![part_of("Q999", "Q500").with_id("Q100$1")];
        let edit =
            ItemEngine::default().plan(&q("Q100"), &[part_of("Q999", "Q500")], &[], &existing);
        assert!(edit.is_empty());
    }

    #[test]
    fn test_new_release_reference_merged() {
        let existing = vec![part_of("Q999", "Q400").with_id("Q100$1")];
        let edit =
            ItemEngine::default().plan(&q("Q100"), &[part_of("Q999", "Q500")], &[], &existing);

        assert!(edit.upserts.is_empty());
        assert_eq!(edit.references.len(), 1);
        assert_eq!(edit.references[0].statement_id, "Q100$1");
        assert_eq!(edit.references[0].reference, reference("Q500"));

        let ignore_refs =
            ItemEngine::new(false).plan(&q("Q100"), &[part_of("Q999", "Q500")], &[], &existing);
        assert!(ignore_refs.is_empty());
    }

    #[test]
    fn test_reference_added_without_rewriting_claim() {
        let entity = serde_json::json!({
            "id": "Q100",
            "claims": { "P361": [{
                "id": "Q100$1",
                "rank": "preferred",
                "mainsnak": {
                    "snaktype": "value",
                    "property": "P361",
                    "datavalue": { "type": "wikibase-entityid", "value": { "id": "Q999" } }
                },
                "qualifiers": { "P1810": [{
                    "snaktype": "value",
                    "property": "P1810",
                    "datavalue": { "type": "string", "value": "kinase domain" }
                }]},
                "references": [{
                    "snaks": {
                        "P248": [{ "snaktype": "value", "property": "P248", "datavalue": { "type": "wikibase-entityid", "value": { "id": "Q400" } } }],
                        "P813": [{ "snaktype": "value", "property": "P813", "datavalue": { "type": "time", "value": { "time": "+2020-01-01T00:00:00Z", "precision": 11 } } }]
                    },
                    "snaks-order": ["P248", "P813"]
                }]
            }]}
        });
        let existing = crate::entity::parse_entity_statements(&entity).unwrap();

        let edit = ItemEngine::default().plan(
            &q("Q100"),
            &[part_of("Q999", "Q500")],
            &[pid!("P361")],
            &existing,
        );

        assert!(edit.upserts.is_empty());
        assert!(edit.removals.is_empty());
        assert!(!edit.changes_claims());
        assert_eq!(edit.references.len(), 1);
        assert_eq!(edit.references[0].statement_id, "Q100$1");
        assert_eq!(edit.references[0].reference, reference("Q500"));
    }

    #[test]
    fn test_query_service_statement_not_resent() {
        use crate::sparql::{parse_statements, SparqlResponse};

        let statement = "http://www.wikidata.org/entity/statement/Q100-aaaa";
        let response: SparqlResponse = serde_json::from_value(serde_json::json!({
            "results": { "bindings": [
                {
                    "item": { "type": "uri", "value": "http://www.wikidata.org/entity/Q100" },
                    "statement": { "type": "uri", "value": statement },
                    "value": { "type": "uri", "value": "http://www.wikidata.org/entity/Q999" },
                    "ref": { "type": "uri", "value": "http://www.wikidata.org/reference/r1" },
                    "refProp": { "type": "uri", "value": "http://www.wikidata.org/entity/P248" },
                    "refValue": { "type": "uri", "value": "http://www.wikidata.org/entity/Q400" }
                },
                {
                    "item": { "type": "uri", "value": "http://www.wikidata.org/entity/Q100" },
                    "statement": { "type": "uri", "value": statement },
                    "value": { "type": "uri", "value": "http://www.wikidata.org/entity/Q999" },
                    "ref": { "type": "uri", "value": "http://www.wikidata.org/reference/r1" },
                    "refProp": { "type": "uri", "value": "http://www.wikidata.org/entity/P813" },
                    "refValue": { "type": "literal", "value": "2020-01-01T00:00:00Z" }
                }
            ]}
        }))
        .unwrap();
        let existing: Vec<Statement> = parse_statements(&response.results.bindings, &pid!("P361"))
            .unwrap()
            .into_iter()
            .map(|(_, s)| s)
            .collect();

        let edit = ItemEngine::default().plan(
            &q("Q100"),
            &[part_of("Q999", "Q500")],
            &[pid!("P361")],
            &existing,
        );

        assert!(!edit.changes_claims());
        assert_eq!(edit.references.len(), 1);
        assert_eq!(edit.references[0].statement_id, "Q100$aaaa");

        let sent = edit.references[0].reference.snaks_json().to_string();
        assert!(!sent.contains("P813"));
        assert!(!sent.contains("2020-01-01"));
    }

    #[test]
    fn test_replace_removes_stale_values() {
        let existing = vec![
            part_of("Q999", "Q500").with_id("Q100$1"),
            part_of("Q998", "Q500").with_id("Q100$2"),
        ];
        let new = [part_of("Q999", "Q500")];

        let replaced = ItemEngine::default().plan(&q("Q100"), &new, &[], &existing);
        assert!(replaced.upserts.is_empty());
        assert_eq!(replaced.removals.len(), 1);
        assert_eq!(replaced.removals[0].id.as_deref(), Some("Q100$2"));

        let appended = ItemEngine::default().plan(&q("Q100"), &new, &[pid!("P361")], &existing);
        assert!(appended.is_empty());
    }

    #[test]
    fn test_properties_absent_from_new_data_untouched() {
        let existing =
            vec![Statement::new(Snak::item(pid!("P527"), q("Q777")), vec![]).with_id("Q100$9")];
        let edit =
            ItemEngine::default().plan(&q("Q100"), &[part_of("Q999", "Q500")], &[], &existing);
        assert_eq!(edit.upserts.len(), 1);
        assert!(edit.removals.is_empty());
    }

    #[test]
    fn test_duplicate_new_values_collapse() {
        let new = [part_of("Q999", "Q500"), part_of("Q999", "Q500")];
        let edit = ItemEngine::default().plan(&q("Q100"), &new, &[], &[]);
        assert_eq!(edit.upserts.len(), 1);
        assert_eq!(edit.upserts[0].references.len(), 1);
    }

    #[tokio::test]
    async fn test_try_write_logs_outcomes() {
        use crate::memory::MemoryKnowledgeBase;
        use iprbot_common::run_log::{BotMetadata, EntryLevel};

        let dir = tempfile::tempdir().unwrap();
        let log = RunLog::create(dir.path(), &BotMetadata::new("test", "run")).unwrap();
        let kb = MemoryKnowledgeBase::new();
        kb.insert_item(q("Q100"), vec![]);

        let edit = ItemEngine::default().plan(&q("Q100"), &[part_of("Q999", "Q500")], &[], &[]);

        let dry = try_write(&kb, &edit, "P12345", &pid!("P352"), false, &log).await.unwrap();
        assert!(dry.is_none());
        assert_eq!(kb.edit_count(), 0);

        let outcome = try_write(&kb, &edit, "P12345", &pid!("P352"), true, &log)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.revid, Some(1));

        let mut missing = edit.clone();
        missing.qid = q("Q404");
        assert!(try_write(&kb, &missing, "P404", &pid!("P352"), true, &log).await.is_err());

        assert_eq!(log.count(EntryLevel::Info), 2);
        assert_eq!(log.count(EntryLevel::Error), 1);
    }
}
