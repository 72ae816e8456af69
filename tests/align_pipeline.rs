// End-to-end pipeline tests: index build, concurrent alignment, NAR
// classification, determinism, and the batch partition invariant.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use lodemap::index::{RefSeq, SuffixIndex};
use lodemap::opts::AlignOpt;
use lodemap::pipeline::align_reads;
use lodemap::reads::record::Nar;

/// Deterministic pseudo-random 4-letter sequence.
fn scramble(len: usize, seed: u64) -> String {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            b"ACGT"[(state >> 33) as usize % 4] as char
        })
        .collect()
}

fn build_index(dir: &Path, genome: &str) -> SuffixIndex {
    let fasta = dir.join("ref.fa");
    std::fs::write(&fasta, format!(">chr1\n{}\n", genome)).unwrap();
    SuffixIndex::build(RefSeq::from_fasta(&fasta).unwrap())
}

fn write_fastq(path: &Path, reads: &[(String, String)]) {
    let mut f = File::create(path).unwrap();
    for (name, seq) in reads {
        writeln!(f, "@{}\n{}\n+\n{}", name, seq, "I".repeat(seq.len())).unwrap();
    }
}

fn mutate(seq: &str, pos: usize) -> String {
    let mut bytes = seq.as_bytes().to_vec();
    bytes[pos] = match bytes[pos] {
        b'A' => b'C',
        b'C' => b'G',
        b'G' => b'T',
        _ => b'A',
    };
    String::from_utf8(bytes).unwrap()
}

#[test]
fn test_pipeline_classifies_reads() {
    let dir = tempfile::tempdir().unwrap();
    let genome = scramble(2000, 42);
    let index = build_index(dir.path(), &genome);

    let perfect = genome[300..400].to_string();
    let two_subs = mutate(&mutate(&genome[500..600], 10), 60);
    let mut too_many_ns = genome[700..800].to_string();
    too_many_ns.replace_range(0..5, "NNNNN");
    let alien = "G".repeat(100);
    let short = genome[900..905].to_string();

    let reads_path: PathBuf = dir.path().join("reads.fq");
    write_fastq(
        &reads_path,
        &[
            ("perfect".into(), perfect),
            ("two_subs".into(), two_subs),
            ("too_many_ns".into(), too_many_ns),
            ("alien".into(), alien),
            ("short".into(), short),
        ],
    );

    let opt = AlignOpt {
        n_threads: 3,
        ..AlignOpt::default()
    };
    let results = align_reads(&index, &reads_path, &opt).unwrap();

    assert_eq!(results.stats.total_reads, 5);
    let recs: Vec<_> = results.iter().collect();

    assert_eq!(recs[0].nar, Nar::Accepted);
    assert_eq!(recs[0].hit.unwrap().primary.start, 300);
    assert_eq!(recs[0].low_mismatch, 0);

    assert_eq!(recs[1].nar, Nar::Accepted);
    assert_eq!(recs[1].hit.unwrap().primary.start, 500);
    assert_eq!(recs[1].low_mismatch, 2);

    assert_eq!(recs[2].nar, Nar::Ns);
    assert_eq!(recs[3].nar, Nar::NoHit);
    assert_eq!(recs[4].nar, Nar::Trim);

    // classification counters agree with the records
    assert_eq!(results.stats.nar_counts[Nar::Accepted.index()], 2);
    assert_eq!(results.stats.nar_counts[Nar::Ns.index()], 1);
}

#[test]
fn test_alignment_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let genome = scramble(4000, 7);
    let index = build_index(dir.path(), &genome);

    let mut reads = Vec::new();
    for i in 0..200 {
        let start = (i * 19) % 3900;
        let seq = genome[start..start + 80].to_string();
        let seq = if i % 3 == 0 { mutate(&seq, 40) } else { seq };
        reads.push((format!("r{}", i), seq));
    }
    let reads_path = dir.path().join("reads.fq");
    write_fastq(&reads_path, &reads);

    let opt = AlignOpt {
        n_threads: 4,
        ..AlignOpt::default()
    };

    let outcome = |results: &lodemap::pipeline::AlignmentResults| -> Vec<_> {
        results
            .iter()
            .map(|r| (r.nar.as_str(), r.hit.map(|h| (h.primary.start, h.primary.strand)), r.low_mismatch))
            .collect()
    };

    let first = align_reads(&index, &reads_path, &opt).unwrap();
    let second = align_reads(&index, &reads_path, &opt).unwrap();
    assert_eq!(outcome(&first), outcome(&second));
}

#[test]
fn test_worker_batches_partition_reads() {
    let dir = tempfile::tempdir().unwrap();
    let genome = scramble(4000, 11);
    let index = build_index(dir.path(), &genome);

    let mut reads = Vec::new();
    for i in 0..3000 {
        let start = (i * 7) % 3960;
        reads.push((format!("r{}", i), genome[start..start + 36].to_string()));
    }
    let reads_path = dir.path().join("reads.fq");
    write_fastq(&reads_path, &reads);

    let opt = AlignOpt {
        n_threads: 4,
        ..AlignOpt::default()
    };
    let results = align_reads(&index, &reads_path, &opt).unwrap();

    // ranges across all workers are pairwise disjoint and cover every read
    let mut ranges: Vec<_> = results
        .stats
        .worker_ranges
        .iter()
        .flatten()
        .cloned()
        .collect();
    ranges.sort_by_key(|r| r.start);
    let mut covered = 0usize;
    for r in &ranges {
        assert_eq!(r.start, covered, "gap or overlap at read {}", covered);
        covered = r.end;
    }
    assert_eq!(covered, 3000);

    // and nothing was left unprocessed
    assert!(results.iter().all(|r| r.nar != Nar::Unprocessed));
}

#[test]
fn test_interleaved_pair_links() {
    let dir = tempfile::tempdir().unwrap();
    let genome = scramble(1000, 13);
    let index = build_index(dir.path(), &genome);

    let reads_path = dir.path().join("reads.fq");
    write_fastq(
        &reads_path,
        &[
            ("p/1".into(), genome[100..180].to_string()),
            ("p/2".into(), genome[300..380].to_string()),
        ],
    );

    let opt = AlignOpt {
        n_threads: 1,
        interleaved: true,
        ..AlignOpt::default()
    };
    let results = align_reads(&index, &reads_path, &opt).unwrap();
    assert_eq!(results.store.get(0).mate, Some((1, false)));
    assert_eq!(results.store.get(1).mate, Some((0, true)));
}

#[test]
fn test_missing_input_surfaces_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let genome = scramble(1000, 17);
    let index = build_index(dir.path(), &genome);

    let opt = AlignOpt {
        n_threads: 2,
        ..AlignOpt::default()
    };
    let err = align_reads(&index, Path::new("/nonexistent/reads.fq"), &opt);
    assert!(matches!(err, Err(lodemap::AlignError::Io(_))));
}

#[test]
fn test_sorted_hits_ordered_by_locus() {
    let dir = tempfile::tempdir().unwrap();
    let genome = scramble(3000, 23);
    let index = build_index(dir.path(), &genome);

    // load order deliberately scrambled relative to locus order
    let reads_path = dir.path().join("reads.fq");
    write_fastq(
        &reads_path,
        &[
            ("c".into(), genome[2000..2080].to_string()),
            ("a".into(), genome[100..180].to_string()),
            ("b".into(), genome[1000..1080].to_string()),
        ],
    );

    let opt = AlignOpt {
        n_threads: 2,
        ..AlignOpt::default()
    };
    let results = align_reads(&index, &reads_path, &opt).unwrap();

    let hits = results.sorted_hits();
    let starts: Vec<u64> = hits.iter().map(|(_, seg)| seg.start).collect();
    assert_eq!(starts, vec![100, 1000, 2000]);
    // load order preserved independently
    let load_starts: Vec<u64> = results
        .iter()
        .filter_map(|r| r.hit.map(|h| h.primary.start))
        .collect();
    assert_eq!(load_starts, vec![2000, 100, 1000]);
}
