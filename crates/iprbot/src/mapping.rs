// Relationship mapping files
//
// Two formats are read here:
// 1. The source mapping, `protein2ipr.csv.gz`: semicolon separated, no header,
//    optionally gzip compressed (detected from the magic bytes).
//    Format: accession;part_of;has_part
//    Example: P12345;IPR000001,IPR000002;IPR000003
//    List cells are comma separated; an empty cell is an empty list.
//
// 2. The per-taxon cache, `{taxon}.csv`: comma separated with the header
//    `,part_of,has_part` and the same three columns.

use crate::progress::create_spinner;
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const CACHE_HEADER: [&str; 3] = ["", "part_of", "has_part"];

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid cache file {path} at line {line}: {message}")]
    InvalidCache {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("Chunk size must be greater than 0")]
    ZeroChunkSize,
}

impl LoadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn csv(path: &Path, source: csv::Error) -> Self {
        Self::Csv {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;

// ============================================================================
// Records
// ============================================================================

/// InterPro terms a protein is part of, and terms it has as parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub part_of: Vec<String>,
    pub has_part: Vec<String>,
}

impl RelationshipRecord {
    pub fn new(id: impl Into<String>, part_of: Vec<String>, has_part: Vec<String>) -> Self {
        Self {
            id: id.into(),
            part_of,
            has_part,
        }
    }

    fn from_cells(id: &str, part_of: &str, has_part: &str) -> Self {
        Self::new(id.trim(), split_list(part_of), split_list(has_part))
    }

    pub fn is_empty(&self) -> bool {
        self.part_of.is_empty() && self.has_part.is_empty()
    }
}

fn split_list(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(str::to_string)
        .collect()
}

/// Records keyed by accession
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordCollection {
    records: BTreeMap<String, RelationshipRecord>,
}

impl RecordCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: RelationshipRecord) {
        self.records.insert(record.id.clone(), record);
    }

    pub fn get(&self, accession: &str) -> Option<&RelationshipRecord> {
        self.records.get(accession)
    }

    pub fn contains(&self, accession: &str) -> bool {
        self.records.contains_key(accession)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelationshipRecord> {
        self.records.values()
    }
}

impl FromIterator<RelationshipRecord> for RecordCollection {
    fn from_iter<I: IntoIterator<Item = RelationshipRecord>>(iter: I) -> Self {
        let mut collection = Self::new();
        for record in iter {
            collection.insert(record);
        }
        collection
    }
}

// ============================================================================
// Source scan
// ============================================================================

/// Open a file, transparently decompressing gzip
fn open_maybe_gzip(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let is_gzip = reader
        .fill_buf()
        .map_err(|e| LoadError::io(path, e))?
        .starts_with(&GZIP_MAGIC);

    if is_gzip {
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Keep the rows of one chunk whose accession is wanted. Missing trailing
/// cells read as empty lists.
fn filter_chunk(
    chunk: &[csv::StringRecord],
    keep: &BTreeSet<String>,
    collection: &mut RecordCollection,
) {
    for row in chunk {
        if row.len() > 3 {
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            warn!(line, fields = row.len(), "Skipping row: more than 3 fields");
            continue;
        }
        let accession = row.get(0).unwrap_or_default().trim();
        if keep.contains(accession) {
            collection.insert(RelationshipRecord::from_cells(
                accession,
                row.get(1).unwrap_or_default(),
                row.get(2).unwrap_or_default(),
            ));
        }
    }
}

/// Stream the source mapping in chunks of `chunk_size` rows, keeping only
/// accessions in `keep`
pub fn scan_source(
    path: impl AsRef<Path>,
    keep: &BTreeSet<String>,
    chunk_size: usize,
) -> Result<RecordCollection> {
    let path = path.as_ref();
    if chunk_size == 0 {
        return Err(LoadError::ZeroChunkSize);
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(open_maybe_gzip(path)?);

    let pb = create_spinner("Rows scanned");
    let mut collection = RecordCollection::new();
    let mut chunk = Vec::with_capacity(chunk_size);
    let mut rows: u64 = 0;

    for row in reader.records() {
        chunk.push(row.map_err(|e| LoadError::csv(path, e))?);
        if chunk.len() == chunk_size {
            filter_chunk(&chunk, keep, &mut collection);
            rows += chunk.len() as u64;
            pb.set_position(rows);
            debug!(rows, kept = collection.len(), "Chunk scanned");
            chunk.clear();
        }
    }
    filter_chunk(&chunk, keep, &mut collection);
    rows += chunk.len() as u64;
    pb.finish_and_clear();

    info!(
        path = %path.display(),
        rows,
        kept = collection.len(),
        "Source mapping scanned"
    );
    Ok(collection)
}

// ============================================================================
// Per-taxon cache
// ============================================================================

/// Cache file for a taxon, or for the unscoped run
pub fn taxon_cache_path(cache_dir: impl AsRef<Path>, taxon: Option<&str>) -> PathBuf {
    cache_dir
        .as_ref()
        .join(format!("{}.csv", taxon.unwrap_or("all")))
}

pub fn write_taxon_cache(path: impl AsRef<Path>, collection: &RecordCollection) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LoadError::io(path, e))?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(|e| LoadError::csv(path, e))?;
    writer
        .write_record(CACHE_HEADER)
        .map_err(|e| LoadError::csv(path, e))?;
    for record in collection.iter() {
        writer
            .write_record([
                record.id.as_str(),
                record.part_of.join(",").as_str(),
                record.has_part.join(",").as_str(),
            ])
            .map_err(|e| LoadError::csv(path, e))?;
    }
    writer.flush().map_err(|e| LoadError::io(path, e))?;

    info!(path = %path.display(), records = collection.len(), "Taxon cache written");
    Ok(())
}

pub fn read_taxon_cache(path: impl AsRef<Path>) -> Result<RecordCollection> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| LoadError::csv(path, e))?;

    let mut collection = RecordCollection::new();
    for row in reader.records() {
        let row = row.map_err(|e| LoadError::csv(path, e))?;
        if row.len() != 3 {
            return Err(LoadError::InvalidCache {
                path: path.to_path_buf(),
                line: row.position().map(|p| p.line()).unwrap_or(0),
                message: format!("expected 3 fields, got {}", row.len()),
            });
        }
        collection.insert(RelationshipRecord::from_cells(&row[0], &row[1], &row[2]));
    }

    info!(path = %path.display(), records = collection.len(), "Taxon cache loaded");
    Ok(collection)
}

/// Reuse the cache file when it exists; otherwise scan the source and write it
pub fn load_or_build(
    cache_path: impl AsRef<Path>,
    source_path: impl AsRef<Path>,
    keep: &BTreeSet<String>,
    chunk_size: usize,
) -> Result<RecordCollection> {
    let cache_path = cache_path.as_ref();
    if cache_path.exists() {
        return read_taxon_cache(cache_path);
    }

    let collection = scan_source(source_path, keep, chunk_size)?;
    write_taxon_cache(cache_path, &collection)?;
    Ok(collection)
}
