//! Per-protein reconciliation
//!
//! Each relationship record becomes "part of" and "has part" statements on
//! the protein's item, every one referenced by the InterPro release and the
//! protein's InterPro page. Both properties are append-only: values the item
//! already has are kept, and existing statements only gain references.

use crate::mapping::{RecordCollection, RelationshipRecord};
use crate::progress::create_progress_bar;
use crate::props;
use iprbot_common::run_log::{LogEntry, RunLog};
use iprbot_wikibase::{
    try_write, BaseFilter, FastRunStore, KnowledgeBase, PropertyId, Qid, Reference, Snak,
    Statement, WikibaseError,
};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("wdid_not_found")]
    EntityNotFound,

    #[error("no item for InterPro term {0}")]
    UnknownTerm(String),

    #[error(transparent)]
    Wikibase(#[from] WikibaseError),
}

impl RecordError {
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::EntityNotFound => "EntityNotFound",
            RecordError::UnknownTerm(_) => "UnknownTerm",
            RecordError::Wikibase(e) => e.kind(),
        }
    }
}

/// What happened to one record that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub qid: Qid,
    pub written: bool,
    pub created: bool,
}

/// Result of a batch pass
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Items modified or already up to date; created items are not listed
    pub touched: Vec<Qid>,
    pub errors: Vec<(String, RecordError)>,
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Everything the per-record step needs that is fixed for the run
pub struct Reconciler<'a> {
    kb: &'a dyn KnowledgeBase,
    log: &'a RunLog,
    release: &'a Qid,
    proteins: &'a BTreeMap<String, Qid>,
    terms: &'a BTreeMap<String, Qid>,
    base_filter: BaseFilter,
    write: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        kb: &'a dyn KnowledgeBase,
        log: &'a RunLog,
        release: &'a Qid,
        proteins: &'a BTreeMap<String, Qid>,
        terms: &'a BTreeMap<String, Qid>,
        base_filter: BaseFilter,
    ) -> Self {
        Self {
            kb,
            log,
            release,
            proteins,
            terms,
            base_filter,
            write: true,
        }
    }

    pub fn with_write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    fn reference(&self, accession: &str) -> Reference {
        Reference::new(vec![
            Snak::item(props::stated_in(), self.release.clone()),
            Snak::string(props::reference_url(), props::protein_url(accession)),
        ])
    }

    fn term_item(&self, term: &str) -> Result<Qid, RecordError> {
        self.terms
            .get(term)
            .cloned()
            .ok_or_else(|| RecordError::UnknownTerm(term.to_string()))
    }

    /// Statements for one record; fails if any term has no item
    pub fn build_statements(
        &self,
        record: &RelationshipRecord,
    ) -> Result<Vec<Statement>, RecordError> {
        let reference = self.reference(&record.id);
        let mut statements = Vec::with_capacity(record.part_of.len() + record.has_part.len());

        let groups: [(PropertyId, &[String]); 2] = [
            (props::part_of(), record.part_of.as_slice()),
            (props::has_part(), record.has_part.as_slice()),
        ];
        for (property, terms) in groups {
            for term in terms {
                statements.push(Statement::new(
                    Snak::item(property.clone(), self.term_item(term)?),
                    vec![reference.clone()],
                ));
            }
        }

        Ok(statements)
    }

    fn log_failure(&self, accession: &str, qid: Option<&Qid>, err: &RecordError) {
        let mut entry = LogEntry::error(accession, props::uniprot_id().as_str(), err.to_string())
            .with_kind(err.kind());
        if let Some(qid) = qid {
            entry = entry.with_qid(qid.as_str());
        }
        self.log.record(entry);
    }

    /// Bring one protein item in line with its record
    pub async fn reconcile_record(
        &self,
        store: &mut FastRunStore,
        accession: &str,
        record: &RelationshipRecord,
    ) -> Result<RecordOutcome, RecordError> {
        let Some(qid) = self.proteins.get(accession) else {
            let err = RecordError::EntityNotFound;
            self.log_failure(accession, None, &err);
            return Err(err);
        };

        let statements = match self.build_statements(record) {
            Ok(statements) => statements,
            Err(err) => {
                error!(
                    accession,
                    qid = %qid,
                    error = %error_chain(&err),
                    "Failed to build statements"
                );
                self.log_failure(accession, Some(qid), &err);
                return Err(err);
            },
        };

        let append = [props::has_part(), props::part_of()];
        let container = store.container(&self.base_filter, true);
        let edit = match container.plan(self.kb, qid, &statements, &append).await {
            Ok(edit) => edit.with_summary(props::MAIN_SUMMARY),
            Err(e) => {
                let err = RecordError::from(e);
                self.log_failure(accession, Some(qid), &err);
                return Err(err);
            },
        };

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
        Ok(RecordOutcome {
            qid: qid.clone(),
            written: outcome.is_some(),
            created: outcome.is_some_and(|o| o.created),
        })
    }

    /// Reconcile every mapped accession that has a record, in accession order
    pub async fn reconcile_batch(
        &self,
        store: &mut FastRunStore,
        collection: &RecordCollection,
        run_one: bool,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        let pb = create_progress_bar(self.proteins.len() as u64, "Reconciling proteins");

        for accession in self.proteins.keys() {
            pb.inc(1);
            let Some(record) = collection.get(accession) else {
                continue;
            };

            match self.reconcile_record(store, accession, record).await {
                Ok(outcome) if !outcome.created => report.touched.push(outcome.qid),
                Ok(_) => {},
                Err(err) => report.errors.push((accession.clone(), err)),
            }

            if run_one {
                break;
            }
        }
        pb.finish_and_clear();

        info!(
            touched = report.touched.len(),
            errors = report.errors.len(),
            "Batch pass finished"
        );
        report
    }
}
