//! Run orchestration
//!
//! One run: open the run log, map UniProt accessions and InterPro terms to
//! items, load (or build and persist) the relationship records for the
//! mapped accessions, reconcile them, clear the fast-run caches, wait for the
//! query service to catch up, then remove deprecated statements.

use crate::cleanup::{Cleanup, CleanupReport};
use crate::mapping::{load_or_build, taxon_cache_path, RecordCollection};
use crate::props;
use crate::reconcile::{BatchReport, Reconciler};
use anyhow::{Context, Result};
use chrono::Local;
use iprbot_common::run_log::{default_run_id, EntryLevel, LogEntry, RunLog};
use iprbot_wikibase::{BaseFilter, FastRunStore, KnowledgeBase, Qid, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Per-run settings
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Item of the InterPro release being loaded
    pub release: Qid,
    pub taxon: Option<Qid>,
    pub write: bool,
    /// Stop after the first record
    pub run_one: bool,
    pub skip_cleanup: bool,
    pub log_dir: PathBuf,
    pub run_id: Option<String>,
    pub source_path: PathBuf,
    pub cache_dir: PathBuf,
    pub chunk_size: usize,
    pub cleanup_delay: Duration,
}

impl RunOptions {
    pub fn new(release: Qid) -> Self {
        Self {
            release,
            taxon: None,
            write: true,
            run_one: false,
            skip_cleanup: false,
            log_dir: PathBuf::from("./logs"),
            run_id: None,
            source_path: PathBuf::from(crate::config::DEFAULT_SOURCE_PATH),
            cache_dir: PathBuf::from("."),
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            cleanup_delay: Duration::from_secs(crate::config::DEFAULT_CLEANUP_DELAY_SECS),
        }
    }
}

/// Filter the accession mapping is restricted by
pub fn taxon_filter(taxon: Option<&Qid>) -> BaseFilter {
    match taxon {
        Some(taxon) => {
            BaseFilter::new().with_value(props::found_in_taxon(), Value::Item(taxon.clone()))
        },
        None => BaseFilter::new(),
    }
}

/// Fast-run scope: items with a UniProt ID, in the taxon when one is given
pub fn base_filter(taxon: Option<&Qid>) -> BaseFilter {
    let filter = BaseFilter::new().with_property(props::uniprot_id());
    match taxon {
        Some(taxon) => filter.with_value(props::found_in_taxon(), Value::Item(taxon.clone())),
        None => filter,
    }
}

/// Outcome of a whole run
#[derive(Debug)]
pub struct RunReport {
    pub log_path: PathBuf,
    pub batch: BatchReport,
    pub cleanup: Option<CleanupReport>,
}

#[derive(Serialize)]
struct RunSummary {
    touched: usize,
    record_errors: usize,
    cleanup_edits: usize,
    cleanup_errors: usize,
}

impl RunReport {
    fn summary(&self) -> RunSummary {
        RunSummary {
            touched: self.batch.touched.len(),
            record_errors: self.batch.errors.len(),
            cleanup_edits: self.cleanup.as_ref().map_or(0, |c| c.edited.len()),
            cleanup_errors: self.cleanup.as_ref().map_or(0, |c| c.errors.len()),
        }
    }
}

/// Load the records for the mapped accessions off the async runtime
async fn load_records(
    cache_path: PathBuf,
    source_path: PathBuf,
    keep: BTreeSet<String>,
    chunk_size: usize,
) -> Result<RecordCollection> {
    let collection = tokio::task::spawn_blocking(move || {
        load_or_build(&cache_path, &source_path, &keep, chunk_size)
            .with_context(|| format!("Failed to load records for {}", cache_path.display()))
    })
    .await
    .context("Record loading task panicked")??;
    Ok(collection)
}

/// Materialise the per-taxon cache file without touching any item
pub async fn build_cache(
    kb: &dyn KnowledgeBase,
    taxon: Option<&Qid>,
    source_path: &Path,
    cache_dir: &Path,
    chunk_size: usize,
) -> Result<PathBuf> {
    let proteins = kb
        .id_mapper(&props::uniprot_id(), &taxon_filter(taxon))
        .await
        .context("Failed to map UniProt accessions")?;

    let cache_path = taxon_cache_path(cache_dir, taxon.map(Qid::as_str));
    let collection = load_records(
        cache_path.clone(),
        source_path.to_path_buf(),
        proteins.into_keys().collect(),
        chunk_size,
    )
    .await?;

    info!(path = %cache_path.display(), records = collection.len(), "Cache ready");
    Ok(cache_path)
}

/// Run the main pass and the cleanup pass
pub async fn run(kb: &dyn KnowledgeBase, options: &RunOptions) -> Result<RunReport> {
    let run_id = options
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(Local::now()));
    let metadata = props::bot_metadata(&run_id, &options.release);
    let log = RunLog::create(&options.log_dir, &metadata).context("Failed to create run log")?;

    let taxon = options.taxon.as_ref();
    let proteins: BTreeMap<String, Qid> = kb
        .id_mapper(&props::uniprot_id(), &taxon_filter(taxon))
        .await
        .context("Failed to map UniProt accessions")?;
    let terms: BTreeMap<String, Qid> = kb
        .id_mapper(&props::interpro_id(), &BaseFilter::new())
        .await
        .context("Failed to map InterPro terms")?;
    info!(proteins = proteins.len(), terms = terms.len(), "Identifier mappings loaded");

    let collection = load_records(
        taxon_cache_path(&options.cache_dir, taxon.map(Qid::as_str)),
        options.source_path.clone(),
        proteins.keys().cloned().collect(),
        options.chunk_size,
    )
    .await?;

    let filter = base_filter(taxon);
    let mut store = FastRunStore::new();
    let batch = Reconciler::new(kb, &log, &options.release, &proteins, &terms, filter.clone())
        .with_write(options.write)
        .reconcile_batch(&mut store, &collection, options.run_one)
        .await;
    store.clear();

    let cleanup = if options.skip_cleanup {
        None
    } else {
        if !options.cleanup_delay.is_zero() {
            info!(secs = options.cleanup_delay.as_secs(), "Waiting before cleanup");
            tokio::time::sleep(options.cleanup_delay).await;
        }

        let mut targets: Vec<(String, Qid)> = proteins
            .iter()
            .map(|(accession, qid)| (accession.clone(), qid.clone()))
            .collect();
        targets.sort_by(|a, b| a.1.cmp(&b.1));

        Some(
            Cleanup::new(kb, &log, &options.release)
                .with_write(options.write)
                .run(&filter, &targets)
                .await,
        )
    };

    let report = RunReport {
        log_path: log.path().to_path_buf(),
        batch,
        cleanup,
    };
    let summary = serde_json::to_string(&report.summary()).context("Failed to serialise summary")?;
    log.record(LogEntry::info(
        &run_id,
        "",
        format!("run finished: {}", summary),
    ));
    info!(
        log = %report.log_path.display(),
        errors = log.count(EntryLevel::Error),
        "Run finished"
    );

    Ok(report)
}
