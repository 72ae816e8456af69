// Background read-loader task.
//
// Parses FASTQ input (gzip autodetected by extension), encodes bases and
// qualities into the packed arena representation, and appends to the shared
// ReadStore, publishing progress after every chunk so workers can start
// aligning while the bulk of the input is still on disk.

use bio::io::fastq;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::record::{pack_base, ReadId};
use super::store::ReadStore;
use crate::defaults::LOADER_CHUNK_READS;
use crate::error::AlignError;
use crate::index::reference::BASE_CODE;
use crate::pipeline::session::AlignmentSession;

/// FASTQ reader with automatic gzip detection.
pub struct FastqSource {
    records: fastq::Records<BufReader<Box<dyn Read + Send>>>,
}

impl FastqSource {
    pub fn open(path: &Path) -> io::Result<FastqSource> {
        let file = File::open(path)?;
        let reader: Box<dyn Read + Send> =
            if path.extension().and_then(|s| s.to_str()) == Some("gz") {
                Box::new(MultiGzDecoder::new(file))
            } else {
                Box::new(file)
            };
        Ok(FastqSource {
            records: fastq::Reader::new(reader).records(),
        })
    }

    fn next_record(&mut self) -> Option<io::Result<fastq::Record>> {
        self.records
            .next()
            .map(|r| r.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

/// Pack a FASTQ record: base code in the low bits, Phred quality above.
fn encode_read(seq: &[u8], qual: &[u8]) -> Vec<u8> {
    seq.iter()
        .zip(qual.iter().chain(std::iter::repeat(&b'!')))
        .map(|(&b, &q)| pack_base(BASE_CODE[b as usize], q.saturating_sub(b'!')))
        .collect()
}

/// Run the loader to completion. Errors are published into the session, not
/// returned; peers observe them at their next batch acquisition.
pub fn run(store: &ReadStore, session: &AlignmentSession, path: &Path, interleaved: bool) {
    let mut source = match FastqSource::open(path) {
        Ok(s) => s,
        Err(e) => {
            log::error!("Failed to open {}: {}", path.display(), e);
            session.set_fatal(AlignError::Io(e));
            session.finish_loading();
            return;
        }
    };

    let mut appender = store.appender();
    let mut total = 0usize;

    'outer: loop {
        if session.is_cancelled() || session.fatal().is_some() {
            log::debug!("Loader stopping early at {} reads", total);
            break;
        }

        let mut chunk = 0usize;
        while chunk < LOADER_CHUNK_READS {
            match source.next_record() {
                Some(Ok(record)) => {
                    let id = total as ReadId;
                    // Interleaved input pairs consecutive records; the bit
                    // marks the second mate.
                    let mate = if interleaved {
                        if id % 2 == 0 {
                            Some((id + 1, false))
                        } else {
                            Some((id - 1, true))
                        }
                    } else {
                        None
                    };
                    let packed = encode_read(record.seq(), record.qual());
                    appender.append(&packed, record.id().as_bytes(), mate);
                    total += 1;
                    chunk += 1;
                }
                Some(Err(e)) => {
                    log::error!("Read parse error after {} reads: {}", total, e);
                    session.set_fatal(AlignError::Io(e));
                    break 'outer;
                }
                None => {
                    // EOF: publish the tail before finishing.
                    session.publish_loaded(appender.publish());
                    break 'outer;
                }
            }
        }
        session.publish_loaded(appender.publish());
    }

    session.finish_loading();
    log::debug!("Loader finished: {} reads", total);
}
