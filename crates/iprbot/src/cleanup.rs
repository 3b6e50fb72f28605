//! Deprecated-statement cleanup
//!
//! Statements on the managed properties that were written for an earlier
//! InterPro release, and not confirmed by the current one, are removed.
//! Statements on other properties, and statements citing no InterPro
//! release at all, are never touched.

use crate::progress::create_progress_bar;
use crate::props;
use iprbot_common::run_log::{LogEntry, RunLog};
use iprbot_wikibase::{
    try_write, BaseFilter, FastRunContainer, ItemEdit, KnowledgeBase, PropertyId, Qid, Statement,
    WikibaseError,
};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Items that are an edition of InterPro
pub async fn known_releases(kb: &dyn KnowledgeBase) -> Result<BTreeSet<Qid>, WikibaseError> {
    let interpro = props::interpro_item()
        .ok_or_else(|| WikibaseError::InvalidId(props::INTERPRO_ITEM.to_string()))?;
    let releases = kb.items_with_claim(&props::edition_of(), &interpro).await?;
    info!(releases = releases.len(), "Known InterPro releases");
    Ok(releases)
}

/// Statements on `properties` citing an older release but not `current`
pub fn deprecated_statements(
    statements: &[Statement],
    properties: &[PropertyId],
    releases: &BTreeSet<Qid>,
    current: &Qid,
) -> Vec<Statement> {
    statements
        .iter()
        .filter(|s| properties.contains(s.property()))
        .filter(|s| !s.cites(current))
        .filter(|s| {
            releases
                .iter()
                .any(|release| release != current && s.cites(release))
        })
        .cloned()
        .collect()
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Items that had statements removed (or would have, with writes off)
    pub edited: Vec<Qid>,
    pub errors: Vec<(Qid, WikibaseError)>,
}

pub struct Cleanup<'a> {
    kb: &'a dyn KnowledgeBase,
    log: &'a RunLog,
    current: &'a Qid,
    properties: Vec<PropertyId>,
    write: bool,
}

impl<'a> Cleanup<'a> {
    pub fn new(kb: &'a dyn KnowledgeBase, log: &'a RunLog, current: &'a Qid) -> Self {
        Self {
            kb,
            log,
            current,
            properties: props::managed_properties(),
            write: true,
        }
    }

    pub fn with_properties(mut self, properties: Vec<PropertyId>) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Remove deprecated statements from one item; `Ok(false)` when there were none
    pub async fn remove_deprecated(
        &self,
        container: &mut FastRunContainer,
        releases: &BTreeSet<Qid>,
        accession: &str,
        qid: &Qid,
    ) -> Result<bool, WikibaseError> {
        let statements = container
            .statements_for(self.kb, qid, &self.properties)
            .await?;
        let deprecated = deprecated_statements(&statements, &self.properties, releases, self.current);
        if deprecated.is_empty() {
            return Ok(false);
        }

        debug!(qid = %qid, count = deprecated.len(), "Removing deprecated statements");
        let mut edit = ItemEdit::new(qid.clone()).with_summary(props::CLEANUP_SUMMARY);
        edit.removals = deprecated;

        let outcome = try_write(
            self.kb,
            &edit,
            accession,
            &props::uniprot_id(),
            self.write,
            self.log,
        )
        .await?;
        if outcome.is_some() {
            container.apply(&edit);
        }
        Ok(true)
    }

    /// Scan every `(accession, item)` pair with a fresh container scoped to `filter`
    pub async fn run(&self, filter: &BaseFilter, targets: &[(String, Qid)]) -> CleanupReport {
        let mut report = CleanupReport::default();

        let releases = match known_releases(self.kb).await {
            Ok(releases) => releases,
            Err(e) => {
                self.log.record(
                    LogEntry::error("", props::edition_of().as_str(), e.to_string())
                        .with_kind(e.kind()),
                );
                report.errors.push((self.current.clone(), e));
                return report;
            },
        };

        let mut container = FastRunContainer::new(filter.clone(), true);
        let pb = create_progress_bar(targets.len() as u64, "Removing deprecated statements");

        for (accession, qid) in targets {
            pb.inc(1);
            match self
                .remove_deprecated(&mut container, &releases, accession, qid)
                .await
            {
                Ok(true) => report.edited.push(qid.clone()),
                Ok(false) => {},
                Err(e) => report.errors.push((qid.clone(), e)),
            }
        }
        pb.finish_and_clear();

        info!(
            edited = report.edited.len(),
            errors = report.errors.len(),
            "Cleanup pass finished"
        );
        report
    }
}
