use clap::{Parser, Subcommand};
use std::path::PathBuf;

use lodemap::index::{RefSeq, SuffixIndex};
use lodemap::io::report::{write_report, ReportOrder};
use lodemap::opts::{ResolvePolicy, Sensitivity};
use lodemap::pipeline::align_reads;
use lodemap::AlignOpt;

#[derive(Parser)]
#[command(name = "lodemap")]
#[command(about = "Suffix-array short-read aligner with bounded-substitution matching", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the suffix-array index for a reference genome
    Index {
        /// Input FASTA file (optionally gzipped)
        #[arg(value_name = "REF.FA")]
        fasta: PathBuf,

        /// Prefix for index files (default: same as FASTA)
        #[arg(short = 'p', long, value_name = "PREFIX")]
        prefix: Option<PathBuf>,
    },

    /// Align reads against a prebuilt index
    Align {
        /// Index prefix (built with 'index')
        #[arg(value_name = "INDEX")]
        index: PathBuf,

        /// Input FASTQ file (optionally gzipped)
        #[arg(value_name = "READS.FQ")]
        reads: PathBuf,

        // ===== Matching options =====
        /// Substitution budget per 100 bp of read length
        #[arg(short = 's', long, value_name = "PCT", default_value = "10")]
        max_subs_pct: u32,

        /// Required mismatch gap between best and second-best candidate
        #[arg(short = 'e', long, value_name = "INT", default_value = "1")]
        min_edit_dist: u16,

        /// Most candidate loci retained for an ambiguous read
        #[arg(short = 'm', long, value_name = "INT", default_value = "10")]
        max_multi_hits: usize,

        /// Clamp to the first --max-multi-hits loci instead of rejecting
        #[arg(long)]
        clamp_multi_hits: bool,

        /// Most indeterminate (N) bases tolerated per read
        #[arg(short = 'n', long, value_name = "INT", default_value = "4")]
        max_ns: usize,

        /// Seed-search sensitivity
        #[arg(long, value_enum, default_value = "default")]
        sensitivity: Sensitivity,

        /// Align the forward strand only
        #[arg(long)]
        forward_only: bool,

        /// Search for one short read- or reference-gap per read
        #[arg(long)]
        split_indels: bool,

        /// Longest indel gap searched
        #[arg(long, value_name = "INT", default_value = "8")]
        max_indel_len: u64,

        /// Search for long reference gaps (splices) via tail seeds
        #[arg(long)]
        split_splices: bool,

        /// Longest splice gap searched
        #[arg(long, value_name = "INT", default_value = "20000")]
        max_splice_len: u64,

        /// Multi-locus resolution policy
        #[arg(long, value_enum, default_value = "off")]
        resolve: ResolvePolicy,

        // ===== Input/output options =====
        /// Treat input as interleaved paired-end and record pair links
        #[arg(short = 'i', long)]
        interleaved: bool,

        /// Output report file (default: stdout; .gz compresses)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Emit aligned reads sorted by locus instead of load order
        #[arg(long)]
        by_locus: bool,

        // ===== Processing options =====
        /// Worker threads (default: all available cores)
        #[arg(short = 't', long, value_name = "INT")]
        threads: Option<usize>,

        /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
        #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
        verbosity: i32,
    },
}

fn init_logger(verbosity: i32) {
    let log_level = match verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Index { fasta, prefix } => {
            init_logger(3);
            let idx_prefix = prefix.unwrap_or_else(|| fasta.clone());
            log::info!("Building index for reference: {}", fasta.display());

            let reference = match RefSeq::from_fasta(&fasta) {
                Ok(r) => r,
                Err(e) => {
                    log::error!("Failed to read reference: {}", e);
                    std::process::exit(1);
                }
            };
            let index = SuffixIndex::build(reference);
            if let Err(e) = index.dump(&idx_prefix) {
                log::error!("Failed to write index: {}", e);
                std::process::exit(1);
            }
            log::info!("Index written to {}.*", idx_prefix.display());
        }

        Commands::Align {
            index,
            reads,
            max_subs_pct,
            min_edit_dist,
            max_multi_hits,
            clamp_multi_hits,
            max_ns,
            sensitivity,
            forward_only,
            split_indels,
            max_indel_len,
            split_splices,
            max_splice_len,
            resolve,
            interleaved,
            output,
            by_locus,
            threads,
            verbosity,
        } => {
            init_logger(verbosity);

            let mut opt = AlignOpt {
                max_subs_pct,
                min_edit_dist: min_edit_dist.max(1),
                max_multi_hits,
                clamp_multi_hits,
                max_ns,
                sensitivity,
                align_reverse: !forward_only,
                split_indels,
                max_indel_len,
                split_splices,
                max_splice_len,
                resolve,
                interleaved,
                ..AlignOpt::default()
            };
            opt.n_threads = threads.unwrap_or_else(num_cpus::get);
            log::info!("Using {} worker thread(s)", opt.effective_threads());

            let mut suffix_index = match SuffixIndex::open(&index) {
                Ok(i) => i,
                Err(e) => {
                    log::error!("Failed to load index {}: {}", index.display(), e);
                    std::process::exit(1);
                }
            };
            suffix_index.set_max_iter(opt.sensitivity.max_seed_occ());

            let results = match align_reads(&suffix_index, &reads, &opt) {
                Ok(r) => r,
                Err(e) => {
                    log::error!("Alignment failed: {}", e);
                    std::process::exit(1);
                }
            };

            let order = if by_locus {
                ReportOrder::ByLocus
            } else {
                ReportOrder::LoadOrder
            };
            if let Err(e) = write_report(&suffix_index, &results, output.as_deref(), order) {
                log::error!("Failed to write report: {}", e);
                std::process::exit(1);
            }
        }
    }
}
