use std::{
    env, fs, io,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{bail, Result};
use goby::{
    aggregate::{PeakFinder, UnionReader},
    counts::{CountWriterHelper, CountsArchiveReader, CountsArchiveWriter},
    ChunkProcessor, ChunkWriterBuilder, CodecKind, MmapChunkReader,
};

#[derive(Clone, Default)]
struct RecordCounter {
    records: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
    local_records: usize,
    local_bytes: usize,
    tid: Option<usize>,
}
impl ChunkProcessor for RecordCounter {
    fn process_record(&mut self, record: &[u8]) -> goby::Result<()> {
        self.local_records += 1;
        self.local_bytes += record.len();
        Ok(())
    }

    fn on_batch_complete(&mut self) -> goby::Result<()> {
        self.records.fetch_add(self.local_records, Ordering::Relaxed);
        self.bytes.fetch_add(self.local_bytes, Ordering::Relaxed);
        self.local_records = 0;
        self.local_bytes = 0;
        Ok(())
    }

    fn set_tid(&mut self, tid: usize) {
        self.tid = Some(tid);
    }

    fn get_tid(&self) -> Option<usize> {
        self.tid
    }
}

fn write_container(path: &str, codec: CodecKind, num_records: usize) -> Result<()> {
    let handle = io::BufWriter::new(fs::File::create(path)?);
    let mut writer = ChunkWriterBuilder::default()
        .codec(codec)
        .entries_per_chunk(1000)
        .build(handle)?;
    for idx in 0..num_records {
        let record = format!("record-{idx:08}:{}", "ACGT".repeat(idx % 16));
        writer.push(record.as_bytes(), 1)?;
    }
    writer.finish()?;
    println!("{}", writer.stats());
    Ok(())
}

fn read_container(path: &str, num_threads: usize) -> Result<()> {
    let reader = MmapChunkReader::new(path)?;
    let counter = RecordCounter::default();
    reader.process_parallel(counter.clone(), num_threads)?;
    println!(
        "Read {} records ({} bytes) from {} container bytes",
        counter.records.load(Ordering::Relaxed),
        counter.bytes.load(Ordering::Relaxed),
        reader.num_bytes()
    );
    Ok(())
}

fn write_counts(path: &str) -> Result<()> {
    let mut archive = CountsArchiveWriter::new(io::BufWriter::new(fs::File::create(path)?))?;
    for (reference_index, identifier) in ["sample-a", "sample-b"].into_iter().enumerate() {
        let mut helper = CountWriterHelper::new(archive.new_counts_writer()?);
        let offset = reference_index as u64 * 3;
        for position in (offset..offset + 200).step_by(7) {
            let depth = ((position / 7) % 5) as i64;
            helper.append_count_at_position(depth, position)?;
        }
        let counts = helper.finish()?;
        archive.add_encoded(reference_index as u32, identifier, counts)?;
    }
    archive.finish()?;
    Ok(())
}

fn summarize_counts(path: &str) -> Result<()> {
    let archive = CountsArchiveReader::new(path)?;
    let readers = archive
        .identifiers()
        .map(|identifier| archive.counts_reader(identifier))
        .collect::<goby::Result<Vec<_>>>()?;
    let union = UnionReader::new(readers);
    for peak in PeakFinder::new(union, 2) {
        let peak = peak?;
        println!(
            "peak {}..{} total={} max={}",
            peak.start,
            peak.end(),
            peak.count,
            peak.max
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (prefix, codec) = match args.as_slice() {
        [] => ("goby-demo".to_string(), CodecKind::default()),
        [prefix] => (prefix.clone(), CodecKind::default()),
        [prefix, codec] => (prefix.clone(), codec.parse()?),
        _ => bail!("usage: goby [output-prefix] [codec]"),
    };

    let entries_path = format!("{prefix}.entries");
    let counts_path = format!("{prefix}.counts");
    write_container(&entries_path, codec, 25_000)?;
    read_container(&entries_path, 0)?;
    write_counts(&counts_path)?;
    summarize_counts(&counts_path)?;
    Ok(())
}
