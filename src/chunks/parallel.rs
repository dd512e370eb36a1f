use std::{fs, io, io::Cursor, ops::Range, path::Path, sync::Arc, thread};

use memmap2::Mmap;

use crate::{codec::CodecRegistry, error::ChunkError, Result};

use super::ChunkReader;

/// Trait for types that can process container records in parallel.
///
/// Each worker thread owns its own clone of the processor.
pub trait ChunkProcessor: Send + Clone {
    /// Process a single record
    fn process_record(&mut self, record: &[u8]) -> Result<()>;

    /// Called when a thread finishes processing a chunk
    /// Default implementation does nothing
    fn on_batch_complete(&mut self) -> Result<()> {
        Ok(())
    }

    /// Set the thread ID for this processor
    ///
    /// Each thread should call this method with its own unique ID.
    fn set_tid(&mut self, _tid: usize) {
        // Default implementation does nothing
    }

    /// Get the thread ID for this processor
    fn get_tid(&self) -> Option<usize> {
        None
    }
}

/// Shared handle on a memory-mapped file usable as a `Cursor` buffer
#[derive(Clone)]
struct SharedMmap(Arc<Mmap>);
impl AsRef<[u8]> for SharedMmap {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A memory-mapped container split between worker threads by byte range.
pub struct MmapChunkReader {
    inner: Arc<Mmap>,
    registry: CodecRegistry,
}
impl MmapChunkReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_registry(path, CodecRegistry::default())
    }

    pub fn with_registry<P: AsRef<Path>>(path: P, registry: CodecRegistry) -> Result<Self> {
        let file = fs::File::open(path)?;

        // Load the mmap
        let inner = unsafe { Mmap::map(&file) }?;

        Ok(Self {
            inner: Arc::new(inner),
            registry,
        })
    }

    #[must_use]
    pub fn num_bytes(&self) -> u64 {
        self.inner.len() as u64
    }

    /// A sequential reader over the whole container
    #[must_use]
    pub fn reader(&self) -> ChunkReader<&[u8]> {
        ChunkReader::with_registry(&self.inner[..], self.registry.clone())
    }

    /// Processes every record with `num_threads` workers (0 uses all cores)
    pub fn process_parallel<P: ChunkProcessor + 'static>(
        &self,
        processor: P,
        num_threads: usize,
    ) -> Result<()> {
        self.process_parallel_range(processor, num_threads, 0..self.num_bytes())
    }

    /// Processes the records of every chunk that starts within `range`.
    ///
    /// The byte range is divided evenly between the workers; each worker scans
    /// to the first chunk boundary of its slice.
    pub fn process_parallel_range<P: ChunkProcessor + 'static>(
        &self,
        processor: P,
        num_threads: usize,
        range: Range<u64>,
    ) -> Result<()> {
        if range.start > range.end {
            return Err(ChunkError::InvalidRange {
                start: range.start,
                end: range.end,
            }
            .into());
        }
        let num_threads = if num_threads == 0 {
            num_cpus::get()
        } else {
            num_threads.min(num_cpus::get())
        };

        let range = range.start.min(self.num_bytes())..range.end.min(self.num_bytes());
        if range.is_empty() {
            return Ok(()); // nothing to do
        }
        let bytes_per_thread = (range.end - range.start).div_ceil(num_threads as u64);

        let mut handles = Vec::new();
        for tid in 0..num_threads {
            let t_start = (range.start + tid as u64 * bytes_per_thread).min(range.end);
            let t_end = (t_start + bytes_per_thread).min(range.end);
            if t_start == t_end {
                break;
            }

            let shared = Cursor::new(SharedMmap(self.inner.clone()));
            let registry = self.registry.clone();
            let mut t_proc = processor.clone();
            t_proc.set_tid(tid);

            let thread_handle = thread::spawn(move || -> Result<()> {
                let mut reader = ChunkReader::with_range_and_registry(shared, t_start..t_end, registry)?;
                while reader.read_chunk()?.is_some() {
                    for record in reader.batch().iter() {
                        t_proc.process_record(record)?;
                    }
                    t_proc.on_batch_complete()?;
                }
                Ok(())
            });
            handles.push(thread_handle);
        }

        for handle in handles {
            match handle.join() {
                Ok(result) => result?,
                Err(_) => return Err(io::Error::other("chunk worker thread panicked").into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use std::{collections::BTreeSet, io::Write, sync::Arc};

    use parking_lot::Mutex;

    use super::*;
    use crate::{chunks::testing::build_container, codec::CodecKind};

    #[derive(Clone, Default)]
    struct CollectingProcessor {
        tid: Option<usize>,
        local: Vec<String>,
        records: Arc<Mutex<Vec<String>>>,
        batches: Arc<Mutex<usize>>,
    }
    impl ChunkProcessor for CollectingProcessor {
        fn process_record(&mut self, record: &[u8]) -> Result<()> {
            self.local.push(String::from_utf8_lossy(record).into_owned());
            Ok(())
        }

        fn on_batch_complete(&mut self) -> Result<()> {
            self.records.lock().append(&mut self.local);
            *self.batches.lock() += 1;
            Ok(())
        }

        fn set_tid(&mut self, tid: usize) {
            self.tid = Some(tid);
        }

        fn get_tid(&self) -> Option<usize> {
            self.tid
        }
    }

    fn container_file(kind: CodecKind, num_records: usize, per_chunk: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&build_container(kind, num_records, per_chunk))
            .unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parallel_processing() {
        let file = container_file(CodecKind::Gzip, 1000, 37);
        let reader = MmapChunkReader::new(file.path()).unwrap();
        for num_threads in [0, 1, 2, 4, 8] {
            let processor = CollectingProcessor::default();
            reader
                .process_parallel(processor.clone(), num_threads)
                .unwrap();
            let records = processor.records.lock();
            assert_eq!(records.len(), 1000);
            let unique = records.iter().collect::<BTreeSet<_>>();
            assert_eq!(unique.len(), 1000);
            assert_eq!(*processor.batches.lock(), 1000usize.div_ceil(37));
        }
    }

    #[test]
    fn test_parallel_processing_range() {
        let file = container_file(CodecKind::None, 100, 10);
        let reader = MmapChunkReader::new(file.path()).unwrap();
        let mut sequential = reader.reader();
        let first = sequential.read_chunk().unwrap().unwrap();

        // only the first chunk starts within this range
        let processor = CollectingProcessor::default();
        reader
            .process_parallel_range(processor.clone(), 2, 0..first.end())
            .unwrap();
        assert_eq!(processor.records.lock().len(), 10);
    }

    #[test]
    fn test_parallel_processing_empty_range() {
        let file = container_file(CodecKind::None, 10, 10);
        let reader = MmapChunkReader::new(file.path()).unwrap();
        let processor = CollectingProcessor::default();
        reader
            .process_parallel_range(processor.clone(), 2, 5..5)
            .unwrap();
        assert!(processor.records.lock().is_empty());

        let out_of_bounds = reader.num_bytes() + 10..reader.num_bytes() + 20;
        assert!(reader
            .process_parallel_range(processor.clone(), 2, out_of_bounds)
            .is_ok());
        assert!(processor.records.lock().is_empty());
    }

    #[test]
    fn test_missing_file() {
        assert!(MmapChunkReader::new("./does/not/exist.entries").is_err());
    }
}
