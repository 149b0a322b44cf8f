//! On-disk segment generations.
//!
//! ```text
//! <root>/CURRENT            JSON pointer to the published generation
//! <root>/gen-00000003/      meta.json + vocabulary/postings/docs/norms/stats .bin
//! <root>/gen-00000004.tmp/  staging area of an in-progress write
//! ```
//!
//! A generation directory is complete before `CURRENT` names it, and `CURRENT`
//! is replaced by rename, so a reader sees either the old or the new segment.

use crate::config::IndexConfig;
use crate::document::Document;
use crate::error::{IndexError, Result};
use crate::segment::{Segment, SegmentParts};
use crate::stats::CorpusStatistics;
use crate::{Generation, PostingsKey, PostingsList, Revision, TermId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

const CURRENT_FILE: &str = "CURRENT";
const META_FILE: &str = "meta.json";
const VOCABULARY_FILE: &str = "vocabulary.bin";
const POSTINGS_FILE: &str = "postings.bin";
const DOCS_FILE: &str = "docs.bin";
const NORMS_FILE: &str = "norms.bin";
const STATS_FILE: &str = "stats.bin";
const GENERATION_PREFIX: &str = "gen-";
const STAGING_SUFFIX: &str = ".tmp";
const LOAD_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChecksum {
    pub name: String,
    pub len: u64,
    pub crc32: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub version: u32,
    pub generation: Generation,
    pub created_at: String,
    pub num_docs: u32,
    pub num_terms: usize,
    pub revision: Revision,
    #[serde(default)]
    pub segment_id: String,
    pub config: IndexConfig,
    pub fields: Vec<String>,
    pub files: Vec<FileChecksum>,
}

/// Contents of `CURRENT`: which generation is published.
///
/// `segment_id` is unique per write, so a root that was wiped and rebuilt
/// from generation 1 is still told apart from the segment it replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Published {
    pub generation: Generation,
    pub dir: String,
    #[serde(default)]
    pub segment_id: String,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    fn current(&self) -> PathBuf {
        self.root.join(CURRENT_FILE)
    }

    fn current_staging(&self) -> PathBuf {
        self.root.join(format!("{CURRENT_FILE}{STAGING_SUFFIX}"))
    }

    fn generation_name(generation: Generation) -> String {
        format!("{GENERATION_PREFIX}{generation:08}")
    }

    pub fn generation_dir(&self, generation: Generation) -> PathBuf {
        self.root.join(Self::generation_name(generation))
    }

    fn staging_dir(&self, generation: Generation) -> PathBuf {
        self.root.join(format!("{}{STAGING_SUFFIX}", Self::generation_name(generation)))
    }

    /// Highest generation number with a directory under root, finished or not.
    fn highest_generation(&self) -> io::Result<Generation> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut highest = 0;
        for entry in entries {
            let name = entry?.file_name();
            if let Some(generation) = parse_generation(&name.to_string_lossy()) {
                highest = highest.max(generation);
            }
        }
        Ok(highest)
    }
}

fn parse_generation(name: &str) -> Option<Generation> {
    let rest = name.strip_prefix(GENERATION_PREFIX)?;
    let digits = rest.strip_suffix(STAGING_SUFFIX).unwrap_or(rest);
    digits.parse().ok()
}

fn encode<T: Serialize>(value: &T) -> io::Result<Vec<u8>> {
    bincode::serialize(value).map_err(io::Error::other)
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        File::open(dir)?.sync_all()?;
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
    Ok(())
}

fn segment_id(generation: Generation, files: &[FileChecksum]) -> String {
    let mut hasher = crc32fast::Hasher::new();
    for file in files {
        hasher.update(&file.len.to_le_bytes());
        hasher.update(&file.crc32.to_le_bytes());
    }
    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    format!("{generation:08}-{nanos:x}-{:08x}", hasher.finalize())
}

fn load_current(paths: &IndexPaths) -> Result<Published> {
    let path = paths.current();
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IndexError::NotFound(format!("no published segment under {}", paths.root.display())))
        }
        Err(e) => return Err(IndexError::io(path, e)),
    };
    serde_json::from_slice(&bytes).map_err(|e| IndexError::corrupt(path, e))
}

pub fn load_meta(dir: &Path) -> Result<MetaFile> {
    let path = dir.join(META_FILE);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IndexError::NotFound(format!("segment metadata {}", path.display())))
        }
        Err(e) => return Err(IndexError::io(path, e)),
    };
    let meta: MetaFile = serde_json::from_slice(&bytes).map_err(|e| IndexError::corrupt(&path, e))?;
    if meta.version > FORMAT_VERSION {
        return Err(IndexError::corrupt(path, format!("unsupported format version {}", meta.version)));
    }
    Ok(meta)
}

/// Writes a segment as a new generation and publishes it.
#[derive(Debug)]
pub struct IndexWriter {
    paths: IndexPaths,
    #[cfg(test)]
    fail_on: Option<&'static str>,
}

impl IndexWriter {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            paths: IndexPaths::new(root),
            #[cfg(test)]
            fail_on: None,
        }
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Persist `segment` and make it the published generation.
    ///
    /// On error nothing visible changes: the previous generation (if any) stays
    /// published and the staging directory is removed.
    pub fn write(&self, segment: &Segment) -> Result<Generation> {
        self.write_published(segment).map(|published| published.generation)
    }

    /// Like [`IndexWriter::write`], returning the full `CURRENT` entry.
    pub fn write_published(&self, segment: &Segment) -> Result<Published> {
        fs::create_dir_all(&self.paths.root).map_err(|e| IndexError::write_failure(&self.paths.root, e))?;
        let generation = self
            .paths
            .highest_generation()
            .map_err(|e| IndexError::write_failure(&self.paths.root, e))?
            + 1;
        let staging = self.paths.staging_dir(generation);
        let target = self.paths.generation_dir(generation);

        let staged = self.write_staging(segment, generation, &staging).and_then(|segment_id| {
            fs::rename(&staging, &target).map_err(|e| IndexError::write_failure(&target, e))?;
            sync_dir(&self.paths.root).map_err(|e| IndexError::write_failure(&self.paths.root, e))?;
            Ok(segment_id)
        });
        let segment_id = match staged {
            Ok(segment_id) => segment_id,
            Err(e) => {
                discard(&staging);
                discard(&target);
                return Err(e);
            }
        };

        let published = Published { generation, dir: IndexPaths::generation_name(generation), segment_id };
        if let Err(e) = self.swap_current(&published) {
            discard(&target);
            return Err(e);
        }
        // CURRENT already names the new generation; from here on it must not be discarded
        if let Err(e) = self.sync_root() {
            tracing::warn!(generation, error = %e, "published segment but could not sync index root");
        }
        self.collect_garbage(generation);

        tracing::info!(generation, num_docs = segment.num_docs(), num_terms = segment.num_terms(), root = %self.paths.root.display(), "published segment");
        Ok(published)
    }

    fn write_staging(&self, segment: &Segment, generation: Generation, dir: &Path) -> Result<String> {
        // a leftover from an aborted run with the same number is never published
        discard(dir);
        fs::create_dir_all(dir).map_err(|e| IndexError::write_failure(dir, e))?;

        let files = vec![
            self.write_file(dir, VOCABULARY_FILE, &segment.vocabulary)?,
            self.write_file(dir, POSTINGS_FILE, &segment.postings)?,
            self.write_file(dir, DOCS_FILE, &segment.docs.documents())?,
            self.write_file(dir, NORMS_FILE, &segment.field_lengths)?,
            self.write_file(dir, STATS_FILE, &segment.stats)?,
        ];
        let segment_id = segment_id(generation, &files);

        let meta = MetaFile {
            version: FORMAT_VERSION,
            generation,
            created_at: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_default(),
            num_docs: segment.num_docs(),
            num_terms: segment.num_terms(),
            revision: segment.revision(),
            segment_id: segment_id.clone(),
            config: *segment.config(),
            fields: segment.fields().to_vec(),
            files,
        };
        let json = serde_json::to_vec_pretty(&meta).map_err(io::Error::other).map_err(|e| IndexError::write_failure(dir, e))?;
        self.write_bytes(dir, META_FILE, &json)?;
        sync_dir(dir).map_err(|e| IndexError::write_failure(dir, e))?;
        Ok(segment_id)
    }

    fn write_file<T: Serialize + ?Sized>(&self, dir: &Path, name: &str, value: &T) -> Result<FileChecksum> {
        let bytes = encode(&value).map_err(|e| IndexError::write_failure(dir.join(name), e))?;
        self.write_bytes(dir, name, &bytes)?;
        Ok(FileChecksum { name: name.to_string(), len: bytes.len() as u64, crc32: crc32fast::hash(&bytes) })
    }

    fn write_bytes(&self, dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
        let path = dir.join(name);
        #[cfg(test)]
        {
            if self.fail_on == Some(name) {
                return Err(IndexError::write_failure(path, io::Error::other("injected failure")));
            }
        }
        let write = || -> io::Result<()> {
            let mut f = File::create(&path)?;
            f.write_all(bytes)?;
            f.sync_all()
        };
        write().map_err(|e| IndexError::write_failure(&path, e))
    }

    /// Atomically replace `CURRENT`. An error means the old pointer is still in place.
    fn swap_current(&self, published: &Published) -> Result<()> {
        let staging = self.paths.current_staging();
        let json = serde_json::to_vec_pretty(published).map_err(io::Error::other).map_err(|e| IndexError::write_failure(&staging, e))?;
        let result = (|| -> io::Result<()> {
            let mut f = File::create(&staging)?;
            f.write_all(&json)?;
            f.sync_all()?;
            fs::rename(&staging, self.paths.current())
        })();
        result.map_err(|e| {
            let _ = fs::remove_file(&staging);
            IndexError::write_failure(self.paths.current(), e)
        })
    }

    fn sync_root(&self) -> io::Result<()> {
        #[cfg(test)]
        {
            if self.fail_on == Some(CURRENT_FILE) {
                return Err(io::Error::other("injected failure"));
            }
        }
        sync_dir(&self.paths.root)
    }

    /// Remove finished generations older than `keep - 1` and staging leftovers up to `keep`.
    ///
    /// The generation `CURRENT` just replaced stays on disk for readers that
    /// resolved the old pointer and are still loading it.
    fn collect_garbage(&self, keep: Generation) {
        let entries = match fs::read_dir(&self.paths.root) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "could not list index root for cleanup");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let Some(g) = parse_generation(&name) else { continue };
            let retained = if name.ends_with(STAGING_SUFFIX) { g > keep } else { g + 1 >= keep };
            if retained {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                tracing::warn!(dir = %name, error = %e, "failed to remove old generation");
            }
        }
    }
}

fn discard(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to discard partial segment");
        }
    }
}

/// Loads the published generation under an index root.
#[derive(Debug, Clone)]
pub struct SegmentReader {
    paths: IndexPaths,
}

impl SegmentReader {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { paths: IndexPaths::new(root) }
    }

    pub fn open<P: AsRef<Path>>(root: P) -> Result<Segment> {
        Self::new(root).load().map(|(_, segment)| segment)
    }

    pub fn published(&self) -> Result<Published> {
        load_current(&self.paths)
    }

    pub fn current_generation(&self) -> Result<Generation> {
        self.published().map(|p| p.generation)
    }

    pub fn meta(&self) -> Result<MetaFile> {
        let pointer = load_current(&self.paths)?;
        load_meta(&self.paths.root.join(&pointer.dir))
    }

    /// Load the published generation.
    ///
    /// A writer may publish and collect generations while this runs. When files
    /// vanish and `CURRENT` has moved on, the newer generation is loaded instead.
    pub fn load(&self) -> Result<(Published, Segment)> {
        let mut pointer = load_current(&self.paths)?;
        let mut attempt = 1;
        loop {
            match self.load_generation(&pointer) {
                Err(IndexError::NotFound(reason)) if attempt < LOAD_ATTEMPTS => {
                    let latest = load_current(&self.paths)?;
                    if latest == pointer {
                        return Err(IndexError::NotFound(reason));
                    }
                    tracing::debug!(from = pointer.generation, to = latest.generation, "generation replaced during load");
                    pointer = latest;
                    attempt += 1;
                }
                result => return result.map(|segment| (pointer, segment)),
            }
        }
    }

    fn load_generation(&self, pointer: &Published) -> Result<Segment> {
        let dir = self.paths.root.join(&pointer.dir);
        let meta = load_meta(&dir)?;
        if meta.generation != pointer.generation || meta.segment_id != pointer.segment_id {
            return Err(IndexError::corrupt(
                dir.join(META_FILE),
                format!("generation {} does not match CURRENT ({})", meta.generation, pointer.generation),
            ));
        }

        let vocabulary: BTreeMap<String, TermId> = read_file(&dir, &meta, VOCABULARY_FILE)?;
        let postings: BTreeMap<PostingsKey, PostingsList> = read_file(&dir, &meta, POSTINGS_FILE)?;
        let docs: Vec<Document> = read_file(&dir, &meta, DOCS_FILE)?;
        let field_lengths: Vec<Vec<u32>> = read_file(&dir, &meta, NORMS_FILE)?;
        let stats: CorpusStatistics = read_file(&dir, &meta, STATS_FILE)?;

        if docs.len() != meta.num_docs as usize || stats.num_docs != meta.num_docs {
            return Err(IndexError::corrupt(&dir, "document count disagrees with metadata"));
        }
        if let Some((key, _)) = postings.iter().find(|(_, list)| !list.is_well_ordered()) {
            return Err(IndexError::corrupt(dir.join(POSTINGS_FILE), format!("postings for {key:?} out of order")));
        }

        let segment = Segment::from_parts(SegmentParts {
            config: meta.config,
            fields: meta.fields,
            vocabulary,
            postings,
            field_lengths,
            docs,
            stats,
            revision: meta.revision,
        })?;
        tracing::info!(generation = pointer.generation, num_docs = segment.num_docs(), "loaded segment");
        Ok(segment)
    }
}

fn read_file<T: DeserializeOwned>(dir: &Path, meta: &MetaFile, name: &str) -> Result<T> {
    let path = dir.join(name);
    let expected = meta
        .files
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| IndexError::corrupt(dir.join(META_FILE), format!("no checksum for {name}")))?;
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(IndexError::NotFound(format!("segment file {}", path.display())))
        }
        Err(e) => return Err(IndexError::io(path, e)),
    };
    let crc = crc32fast::hash(&bytes);
    if bytes.len() as u64 != expected.len || crc != expected.crc32 {
        return Err(IndexError::corrupt(path, format!("checksum mismatch: expected {:#010x}, got {crc:#010x}", expected.crc32)));
    }
    bincode::deserialize(&bytes).map_err(|e| IndexError::corrupt(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::run::IndexingRun;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn segment(bodies: &[&str]) -> Segment {
        let mut run = IndexingRun::new(IndexConfig::default()).unwrap();
        for body in bodies {
            run.add_document(Document::new().with_field("body", *body)).unwrap();
        }
        run.finish().unwrap()
    }

    #[test]
    fn write_then_load() {
        let dir = tempdir().unwrap();
        let writer = IndexWriter::new(dir.path());
        let generation = writer.write(&segment(&["the cat sat", "the dog ran"])).unwrap();
        assert_eq!(generation, 1);

        let reader = SegmentReader::new(dir.path());
        let (published, seg) = reader.load().unwrap();
        assert_eq!(published.generation, 1);
        assert_eq!(reader.meta().unwrap().segment_id, published.segment_id);
        assert_eq!(seg.num_docs(), 2);
        assert_eq!(seg.get_document(1).unwrap().get("body"), Some("the dog ran"));
        assert!(seg.postings_for("body", "cat").is_some());
    }

    #[test]
    fn new_generation_replaces_old() {
        let dir = tempdir().unwrap();
        let writer = IndexWriter::new(dir.path());
        writer.write(&segment(&["first"])).unwrap();
        let second = writer.write(&segment(&["second", "third"])).unwrap();
        assert_eq!(second, 2);
        assert!(writer.paths().generation_dir(1).exists());
        assert_eq!(SegmentReader::open(dir.path()).unwrap().num_docs(), 2);

        writer.write(&segment(&["fourth"])).unwrap();
        assert!(!writer.paths().generation_dir(1).exists());
        assert!(writer.paths().generation_dir(2).exists());
        assert_eq!(SegmentReader::open(dir.path()).unwrap().num_docs(), 1);
    }

    #[test]
    fn loads_survive_concurrent_writes() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        IndexWriter::new(&root).write(&segment(&["seed"])).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let reader = {
            let root = root.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut loads = 0u32;
                loop {
                    if let Err(e) = SegmentReader::open(&root) {
                        return Err(e.to_string());
                    }
                    loads += 1;
                    if done.load(Ordering::SeqCst) {
                        return Ok(loads);
                    }
                }
            })
        };

        let writer = IndexWriter::new(&root);
        for i in 0..60 {
            let body = format!("round {i}");
            writer.write(&segment(&[body.as_str()])).unwrap();
        }
        done.store(true, Ordering::SeqCst);
        let loads = reader.join().unwrap().unwrap();
        assert!(loads > 0);
    }

    #[test]
    fn unsynced_root_keeps_new_generation() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path()).write(&segment(&["old words"])).unwrap();

        let mut writer = IndexWriter::new(dir.path());
        writer.fail_on = Some(CURRENT_FILE);
        assert_eq!(writer.write(&segment(&["new words"])).unwrap(), 2);

        assert!(writer.paths().generation_dir(2).exists());
        let seg = SegmentReader::open(dir.path()).unwrap();
        assert_eq!(seg.get_document(0).unwrap().get("body"), Some("new words"));
    }

    #[test]
    fn rebuilt_root_gets_a_new_segment_id() {
        let dir = tempdir().unwrap();
        let first = IndexWriter::new(dir.path()).write_published(&segment(&["apples"])).unwrap();
        fs::remove_dir_all(dir.path()).unwrap();
        let second = IndexWriter::new(dir.path()).write_published(&segment(&["oranges"])).unwrap();
        assert_eq!(first.generation, second.generation);
        assert_ne!(first, second);
    }

    #[test]
    fn failed_write_keeps_previous_generation() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path()).write(&segment(&["the cat sat"])).unwrap();
        let before = fs::read(dir.path().join(CURRENT_FILE)).unwrap();

        let mut writer = IndexWriter::new(dir.path());
        writer.fail_on = Some(DOCS_FILE);
        let err = writer.write(&segment(&["a mouse", "a horse"])).unwrap_err();
        assert!(matches!(err, IndexError::WriteFailure { .. }));

        assert_eq!(fs::read(dir.path().join(CURRENT_FILE)).unwrap(), before);
        assert!(!writer.paths().staging_dir(2).exists());
        assert!(!writer.paths().generation_dir(2).exists());
        let seg = SegmentReader::open(dir.path()).unwrap();
        assert_eq!(seg.num_docs(), 1);
        assert!(seg.postings_for("body", "cat").is_some());
    }

    #[test]
    fn missing_index_is_not_found() {
        let dir = tempdir().unwrap();
        let err = SegmentReader::open(dir.path()).unwrap_err();
        assert!(matches!(err, IndexError::NotFound(_)));
    }

    #[test]
    fn flipped_byte_is_detected() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path()).write(&segment(&["checksums catch rot"])).unwrap();
        let postings = dir.path().join("gen-00000001").join(POSTINGS_FILE);
        let mut bytes = fs::read(&postings).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        fs::write(&postings, bytes).unwrap();
        assert!(matches!(SegmentReader::open(dir.path()), Err(IndexError::Corrupt { .. })));
    }

    #[test]
    fn parses_generation_names() {
        assert_eq!(parse_generation("gen-00000012"), Some(12));
        assert_eq!(parse_generation("gen-00000012.tmp"), Some(12));
        assert_eq!(parse_generation("CURRENT"), None);
    }
}
