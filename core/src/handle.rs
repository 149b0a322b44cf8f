use crate::error::Result;
use crate::persist::{IndexWriter, Published, SegmentReader};
use crate::segment::Segment;
use crate::Generation;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The segment currently served from an index root.
///
/// Queries take an `Arc` snapshot and keep it for as long as they run, so a
/// publish or reload never disturbs a query in flight.
#[derive(Debug)]
pub struct IndexHandle {
    root: PathBuf,
    current: RwLock<Served>,
}

#[derive(Debug, Clone)]
struct Served {
    published: Published,
    segment: Arc<Segment>,
}

impl IndexHandle {
    /// Open the published generation under `root`.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let (published, segment) = SegmentReader::new(&root).load()?;
        Ok(Self { root, current: RwLock::new(Served { published, segment: Arc::new(segment) }) })
    }

    /// Serve `segment` without touching disk until the first publish.
    pub fn with_segment<P: AsRef<Path>>(root: P, segment: Segment) -> Self {
        Self { root: root.as_ref().to_path_buf(), current: RwLock::new(Served { published: Published::default(), segment: Arc::new(segment) }) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn segment(&self) -> Arc<Segment> {
        Arc::clone(&self.current.read().segment)
    }

    pub fn generation(&self) -> Generation {
        self.current.read().published.generation
    }

    /// Write `segment` as a new generation and start serving it.
    pub fn publish(&self, segment: Segment) -> Result<Generation> {
        let published = IndexWriter::new(&self.root).write_published(&segment)?;
        let generation = published.generation;
        *self.current.write() = Served { published, segment: Arc::new(segment) };
        Ok(generation)
    }

    /// Pick up a segment published by another process. Returns the generation now served.
    ///
    /// Freshness is decided by segment id, so a root rebuilt from generation 1
    /// is still picked up.
    pub fn reload(&self) -> Result<Generation> {
        let reader = SegmentReader::new(&self.root);
        let latest = reader.published()?;
        if latest == self.current.read().published {
            return Ok(latest.generation);
        }
        let (published, segment) = reader.load()?;
        let generation = published.generation;
        *self.current.write() = Served { published, segment: Arc::new(segment) };
        tracing::info!(generation, "reloaded segment");
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::document::Document;
    use crate::query::{QueryEngine, QueryOptions};
    use crate::run::IndexingRun;
    use tempfile::tempdir;

    fn segment(body: &str) -> Segment {
        let mut run = IndexingRun::new(IndexConfig::default()).unwrap();
        run.add_document(Document::new().with_field("body", body)).unwrap();
        run.finish().unwrap()
    }

    #[test]
    fn old_snapshot_survives_publish() {
        let dir = tempdir().unwrap();
        let handle = IndexHandle::with_segment(dir.path(), segment("apples"));
        handle.publish(segment("apples")).unwrap();
        let before = handle.segment();

        handle.publish(segment("oranges")).unwrap();
        let opts = QueryOptions::default();
        assert_eq!(QueryEngine::new(&before).search("apples", &opts).unwrap().len(), 1);
        assert_eq!(QueryEngine::new(&handle.segment()).search("apples", &opts).unwrap().len(), 0);
        assert_eq!(handle.generation(), 2);
    }

    #[test]
    fn reload_sees_external_publish() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path()).write(&segment("first")).unwrap();
        let handle = IndexHandle::open(dir.path()).unwrap();
        assert_eq!(handle.generation(), 1);

        IndexWriter::new(dir.path()).write(&segment("second")).unwrap();
        assert_eq!(handle.reload().unwrap(), 2);
        let seg = handle.segment();
        assert_eq!(seg.get_document(0).unwrap().get("body"), Some("second"));
    }

    #[test]
    fn reload_sees_rebuilt_root() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path()).write(&segment("apples")).unwrap();
        let handle = IndexHandle::open(dir.path()).unwrap();

        std::fs::remove_dir_all(dir.path()).unwrap();
        assert_eq!(IndexWriter::new(dir.path()).write(&segment("oranges")).unwrap(), 1);
        assert_eq!(handle.reload().unwrap(), 1);

        let opts = QueryOptions::default();
        let seg = handle.segment();
        assert_eq!(QueryEngine::new(&seg).search("oranges", &opts).unwrap().len(), 1);
        assert_eq!(QueryEngine::new(&seg).search("apples", &opts).unwrap().len(), 0);
    }

    #[test]
    fn reload_without_changes_keeps_snapshot() {
        let dir = tempdir().unwrap();
        IndexWriter::new(dir.path()).write(&segment("pears")).unwrap();
        let handle = IndexHandle::open(dir.path()).unwrap();
        let before = handle.segment();
        assert_eq!(handle.reload().unwrap(), 1);
        assert!(Arc::ptr_eq(&before, &handle.segment()));
    }
}
