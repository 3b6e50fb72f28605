//! Per-run structured bot log
//!
//! Every run writes `{log_dir}/{bot_name}-{run_id}.log`. The first line is the
//! JSON bot metadata header; each following line is one JSON [`LogEntry`]
//! describing what happened to one external record (written, skipped, failed).
//! Entries are mirrored to `tracing` so they also show up in the console.

use crate::error::{BotError, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{error, info, warn};

/// Release information recorded in the header, keyed by source name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub release: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    pub wdid: String,
    pub timestamp: Option<String>,
}

/// JSON header written at the top of every run log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotMetadata {
    pub name: String,
    pub maintainer: String,
    pub tags: Vec<String>,
    pub properties: Vec<String>,
    pub run_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub release: BTreeMap<String, ReleaseInfo>,
}

impl BotMetadata {
    pub fn new(name: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            maintainer: String::new(),
            tags: Vec::new(),
            properties: Vec::new(),
            run_id: run_id.into(),
            timestamp: Local::now().to_string(),
            release: BTreeMap::new(),
        }
    }

    /// Log file name for this run
    pub fn log_file_name(&self) -> String {
        format!("{}-{}.log", self.name, self.run_id)
    }
}

/// Default run id: local time, minute resolution
pub fn default_run_id(now: DateTime<Local>) -> String {
    now.format("%Y%m%d_%H:%M").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntryLevel {
    Info,
    Warning,
    Error,
}

/// One structured log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: EntryLevel,
    pub timestamp: String,
    /// External record id, e.g. a UniProt accession
    pub external_id: String,
    /// Property the external id lives under, e.g. P352
    pub external_id_prop: String,
    pub qid: Option<String>,
    pub message: String,
    /// Error kind, when the entry describes a failure
    pub kind: Option<String>,
    pub revid: Option<u64>,
}

impl LogEntry {
    pub fn new(
        level: EntryLevel,
        external_id: impl Into<String>,
        external_id_prop: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            level,
            timestamp: Local::now().to_rfc3339(),
            external_id: external_id.into(),
            external_id_prop: external_id_prop.into(),
            qid: None,
            message: message.into(),
            kind: None,
            revid: None,
        }
    }

    pub fn info(
        external_id: impl Into<String>,
        external_id_prop: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(EntryLevel::Info, external_id, external_id_prop, message)
    }

    pub fn error(
        external_id: impl Into<String>,
        external_id_prop: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(EntryLevel::Error, external_id, external_id_prop, message)
    }

    pub fn with_qid(mut self, qid: impl Into<String>) -> Self {
        self.qid = Some(qid.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_revid(mut self, revid: u64) -> Self {
        self.revid = Some(revid);
        self
    }
}

struct Sink {
    writer: BufWriter<File>,
    counts: BTreeMap<EntryLevel, usize>,
}

/// Append-only run log file
pub struct RunLog {
    path: PathBuf,
    sink: Mutex<Sink>,
}

impl RunLog {
    /// Create the log file (truncating any previous one) and write the header
    pub fn create(log_dir: impl AsRef<Path>, metadata: &BotMetadata) -> Result<Self> {
        let log_dir = log_dir.as_ref();
        std::fs::create_dir_all(log_dir)?;

        let path = log_dir.join(metadata.log_file_name());
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, metadata)?;
        writer.write_all(b"\n")?;
        writer.flush()?;

        info!(path = %path.display(), run_id = %metadata.run_id, "Run log created");

        Ok(Self {
            path,
            sink: Mutex::new(Sink {
                writer,
                counts: BTreeMap::new(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry. IO failures are reported through tracing only.
    pub fn record(&self, entry: LogEntry) {
        match entry.level {
            EntryLevel::Info => info!(
                external_id = %entry.external_id,
                qid = ?entry.qid,
                revid = ?entry.revid,
                "{}", entry.message
            ),
            EntryLevel::Warning => warn!(
                external_id = %entry.external_id,
                qid = ?entry.qid,
                "{}", entry.message
            ),
            EntryLevel::Error => error!(
                external_id = %entry.external_id,
                prop = %entry.external_id_prop,
                qid = ?entry.qid,
                kind = ?entry.kind,
                "{}", entry.message
            ),
        }

        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        *sink.counts.entry(entry.level).or_insert(0) += 1;

        if let Err(e) = write_line(&mut sink.writer, &entry) {
            error!(path = %self.path.display(), error = %e, "Failed to append to run log");
        }
    }

    /// Number of entries recorded at `level` so far
    pub fn count(&self, level: EntryLevel) -> usize {
        let sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        sink.counts.get(&level).copied().unwrap_or(0)
    }

    /// Parse a run log back into its header and entries
    pub fn read(path: impl AsRef<Path>) -> Result<(BotMetadata, Vec<LogEntry>)> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut lines = reader.lines();

        let header = lines
            .next()
            .ok_or_else(|| BotError::run_log("run log is empty"))??;
        let metadata: BotMetadata = serde_json::from_str(&header)?;

        let mut entries = Vec::new();
        for line in lines {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }

        Ok((metadata, entries))
    }
}

fn write_line(writer: &mut BufWriter<File>, entry: &LogEntry) -> Result<()> {
    serde_json::to_writer(&mut *writer, entry)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
