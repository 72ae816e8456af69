// Tab-separated per-read report.
//
// Formatting happens on the calling thread; a dedicated writer thread drains
// a bounded channel so formatting and file (or gzip) output overlap.

use crossbeam_channel::bounded;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::thread;

use crate::index::SuffixIndex;
use crate::pipeline::AlignmentResults;
use crate::reads::record::{ReadRecord, Segment, NO_MISMATCH_COUNT};

const CHANNEL_DEPTH: usize = 1024;

/// Report row order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOrder {
    /// Physical load order, every read.
    LoadOrder,
    /// Aligned reads only, sorted by (chrom, start).
    ByLocus,
}

fn open_writer(out: Option<&Path>) -> io::Result<Box<dyn Write + Send>> {
    Ok(match out {
        None => Box::new(BufWriter::new(io::stdout())),
        Some(path) if path.extension().and_then(|s| s.to_str()) == Some("gz") => Box::new(
            BufWriter::new(GzEncoder::new(File::create(path)?, Compression::default())),
        ),
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
    })
}

fn segment_field(index: &SuffixIndex, seg: &Segment) -> String {
    format!(
        "{}:{}-{}{}",
        index.reference.name_of(seg.chrom),
        seg.start,
        seg.end(),
        seg.strand.symbol()
    )
}

fn format_record(index: &SuffixIndex, results: &AlignmentResults, rec: &ReadRecord) -> String {
    let desc = results.descriptor(rec.id);
    match &rec.hit {
        Some(hit) if rec.nar.is_aligned() => {
            let mut segments = segment_field(index, &hit.primary);
            if let (Some(second), Some(gap)) = (&hit.secondary, &hit.gap) {
                segments.push(';');
                segments.push_str(&segment_field(index, second));
                segments.push_str(&format!(";{:?}:{}", gap.kind, gap.len));
            }
            format!(
                "{}\t{}\t{}\t{}\t{}\n",
                rec.id,
                desc,
                rec.nar.as_str(),
                hit.total_mismatches(),
                segments
            )
        }
        _ => format!(
            "{}\t{}\t{}\t{}\t*\n",
            rec.id,
            desc,
            rec.nar.as_str(),
            if rec.low_mismatch == NO_MISMATCH_COUNT {
                "-".to_string()
            } else {
                rec.low_mismatch.to_string()
            }
        ),
    }
}

/// Write the report. Lines flow through a bounded channel to a writer
/// thread; gzip output is selected by the `.gz` extension.
pub fn write_report(
    index: &SuffixIndex,
    results: &AlignmentResults,
    out: Option<&Path>,
    order: ReportOrder,
) -> io::Result<()> {
    let writer = open_writer(out)?;
    let (tx, rx) = bounded::<String>(CHANNEL_DEPTH);

    let writer_thread = thread::spawn(move || -> io::Result<()> {
        let mut writer = writer;
        for line in rx {
            writer.write_all(line.as_bytes())?;
        }
        writer.flush()
    });

    let send = |line: String| {
        // a send error means the writer died; its join reports the cause
        let _ = tx.send(line);
    };

    match order {
        ReportOrder::LoadOrder => {
            for rec in results.iter() {
                send(format_record(index, results, rec));
            }
        }
        ReportOrder::ByLocus => {
            for (id, _) in results.sorted_hits() {
                send(format_record(index, results, results.store.get(id)));
            }
        }
    }
    drop(tx);

    writer_thread
        .join()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "report writer thread panicked"))?
}

