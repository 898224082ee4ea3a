use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vecs_eval::benchmark::{
    diff_ground_truth, write_ground_truth, DatasetQueries, DiffConfig, EvaluatorConfig,
    FlatOracle, FlatOracleConfig, IgnoreMismatches, JsonMismatchDump, MismatchHandler,
    QuerySource, RecallEvaluator, TextQueries,
};
use vecs_eval::config;
use vecs_eval::distance::DistanceMetric;
use vecs_eval::persistence::export::{describe, export_text};
use vecs_eval::persistence::{
    ByteSource, FileSource, GroundTruth, MmapSource, PersistenceError, PersistenceResult,
    ReaderOptions, ScoreMatch, VecsReader,
};

type Dataset = VecsReader<Box<dyn ByteSource>>;

#[derive(Parser)]
#[command(name = "vecs-eval", about = "vecs2 datasets and recall@k evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure recall@k, or diff against a ground-truth file with --gt
    Recall(RecallArgs),
    /// Compute exact ground truth and write it to a file
    GroundTruth(GroundTruthArgs),
    /// Print dataset meta and export vectors as text segments
    Dump(DumpArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Read datasets with seek + read instead of mmap
    #[arg(long, default_value_t = false)]
    seek: bool,

    /// Disable the key cache
    #[arg(long, default_value_t = false)]
    no_key_cache: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Text query file, one comma-separated vector per line
    #[arg(long, conflicts_with = "query_dataset")]
    queries: Option<PathBuf>,

    /// Query vectors from a vecs2 file (defaults to the base dataset)
    #[arg(long)]
    query_dataset: Option<PathBuf>,
}

#[derive(Args)]
struct OracleArgs {
    /// Distance metric: l2, ip or cosine
    #[arg(long, default_value = "l2")]
    metric: DistanceMetric,

    /// Partitions of the flat oracle
    #[arg(long, default_value_t = 1)]
    lists: usize,

    /// Partitions scanned by approximate search
    #[arg(long, default_value_t = 1)]
    probe: usize,

    /// Search parameter reported in summary rows
    #[arg(long, default_value_t = config::DEFAULT_SEARCH_PARAM)]
    ef: u32,
}

impl OracleArgs {
    fn config(&self) -> FlatOracleConfig {
        FlatOracleConfig {
            metric: self.metric,
            n_lists: self.lists,
            n_probe: self.probe,
            search_param: self.ef,
        }
    }
}

#[derive(Args)]
struct RecallArgs {
    /// Base dataset searched by the oracle
    #[arg(long)]
    dataset: PathBuf,

    #[command(flatten)]
    queries: QueryArgs,

    /// Collection name, for the log only
    #[arg(long)]
    collection: Option<String>,

    /// Comma-separated k list
    #[arg(long, default_value = config::DEFAULT_TOPK)]
    topk: String,

    /// Number of queries to evaluate
    #[arg(long, default_value_t = 1)]
    counts: usize,

    /// Ground-truth file; selects diff mode
    #[arg(long)]
    gt: Option<PathBuf>,

    /// In diff mode, search exactly instead of approximately
    #[arg(long, default_value_t = false)]
    linear: bool,

    /// Dump mismatched results as JSON
    #[arg(long, default_value_t = false)]
    dump_mismatch: bool,

    /// Match scores within this relative tolerance
    #[arg(long)]
    tolerant: Option<f32>,

    /// Upper bound on workers per window
    #[arg(long)]
    max_workers: Option<usize>,

    #[command(flatten)]
    oracle: OracleArgs,

    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Args)]
struct GroundTruthArgs {
    /// Base dataset searched exhaustively
    #[arg(long)]
    dataset: PathBuf,

    #[command(flatten)]
    queries: QueryArgs,

    /// Entries per record (the largest k of a list is used)
    #[arg(long, default_value = config::DEFAULT_TOPK)]
    topk: String,

    /// Number of queries
    #[arg(long, default_value_t = 1)]
    counts: usize,

    /// Output ground-truth file
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    oracle: OracleArgs,

    #[command(flatten)]
    source: SourceArgs,
}

#[derive(Args)]
struct DumpArgs {
    /// vecs2 file
    #[arg(long)]
    vec: PathBuf,

    /// Print header and meta as JSON
    #[arg(long, default_value_t = false)]
    header: bool,

    /// Output directory for text segments
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Lines per segment
    #[arg(short, long, default_value_t = config::DEFAULT_SEGMENT_SIZE)]
    segment_size: u64,

    /// First vector to export
    #[arg(long, default_value_t = 0)]
    begin: u64,

    /// End of the exported range (exclusive), defaults to all vectors
    #[arg(long)]
    end: Option<u64>,

    #[command(flatten)]
    source: SourceArgs,
}

fn open_dataset(path: &Path, args: &SourceArgs) -> PersistenceResult<Dataset> {
    let source: Box<dyn ByteSource> = if args.seek {
        Box::new(FileSource::open(path)?)
    } else {
        Box::new(MmapSource::open(path)?)
    };
    let options = ReaderOptions {
        key_cache: !args.no_key_cache,
    };
    let mut reader = VecsReader::with_options(source, options);
    reader.load()?;
    if !reader.is_valid() {
        return Err(PersistenceError::InvalidState(format!(
            "{} is not a valid vecs2 dataset",
            path.display()
        )));
    }
    tracing::info!(
        path = %path.display(),
        vectors = reader.num_vectors(),
        dimension = reader.dimension(),
        "dataset opened"
    );
    Ok(reader)
}

/// Query vectors from a text file, a second dataset kept alive in
/// `query_reader`, or the base dataset itself.
fn open_queries<'a>(
    args: &QueryArgs,
    source: &SourceArgs,
    base: &'a Dataset,
    query_reader: &'a mut Option<Dataset>,
) -> PersistenceResult<Box<dyn QuerySource + 'a>> {
    Ok(match (&args.queries, &args.query_dataset) {
        (Some(path), _) => Box::new(TextQueries::load(path)?),
        (None, Some(path)) => {
            let reader: &'a Dataset = query_reader.insert(open_dataset(path, source)?);
            Box::new(DatasetQueries::new(reader)?)
        }
        (None, None) => Box::new(DatasetQueries::new(base)?),
    })
}

fn run_recall(args: RecallArgs) -> Result<(), Box<dyn Error>> {
    let base = open_dataset(&args.dataset, &args.source)?;
    let oracle = FlatOracle::from_reader(&base, args.oracle.config())?;
    if let Some(collection) = &args.collection {
        tracing::info!(collection = %collection, "evaluating collection");
    }

    let mut query_reader = None;
    let queries = open_queries(&args.queries, &args.source, &base, &mut query_reader)?;

    let score_match = args
        .tolerant
        .map_or(ScoreMatch::Exact, |rel_tol| ScoreMatch::Tolerant { rel_tol });
    let dump = JsonMismatchDump::new(io::stdout());
    let handler: &dyn MismatchHandler = if args.dump_mismatch {
        &dump
    } else {
        &IgnoreMismatches
    };
    let topk = EvaluatorConfig::parse_topk(&args.topk)?;
    let mut out = io::stdout();

    if let Some(gt_path) = &args.gt {
        let count = topk.last().copied().unwrap_or_default();
        let mut gt = GroundTruth::new(count, gt_path);
        gt.load()?;
        let config = DiffConfig {
            samples: args.counts,
            linear: args.linear,
            score_match,
        };
        diff_ground_truth(&oracle, &*queries, &gt, &config, handler, &mut out)?;
        return Ok(());
    }

    let mut config = EvaluatorConfig::new(topk, args.counts).with_score_match(score_match);
    if let Some(max_workers) = args.max_workers {
        config = config.with_max_workers(max_workers);
    }
    let report = RecallEvaluator::new(&oracle, &*queries, config)?
        .with_mismatch_handler(handler)
        .run(&mut out)?;
    if !report.completed {
        return Err(format!(
            "recall run stopped after {} of {} queries",
            report.samples(),
            args.counts.min(queries.count())
        )
        .into());
    }
    Ok(())
}

fn run_ground_truth(args: GroundTruthArgs) -> Result<(), Box<dyn Error>> {
    let base = open_dataset(&args.dataset, &args.source)?;
    let oracle = FlatOracle::from_reader(&base, args.oracle.config())?;

    let mut query_reader = None;
    let queries = open_queries(&args.queries, &args.source, &base, &mut query_reader)?;

    let count = EvaluatorConfig::parse_topk(&args.topk)?
        .last()
        .copied()
        .unwrap_or_default();
    let gt = write_ground_truth(&oracle, &*queries, count, args.counts, &args.output)?;
    println!(
        "{} records of {} entries written to {}",
        gt.len(),
        count,
        args.output.display()
    );
    Ok(())
}

fn run_dump(args: DumpArgs) -> Result<(), Box<dyn Error>> {
    let reader = open_dataset(&args.vec, &args.source)?;
    if args.header {
        println!("{}", describe(&reader)?);
    }
    if let Some(output) = &args.output {
        let end = args.end.unwrap_or(u64::MAX);
        let written = export_text(&reader, args.begin..end, output, args.segment_size)?;
        tracing::info!(written, output = %output.display(), "export finished");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vecs_eval=info")),
        )
        .init();

    match Cli::parse().command {
        Command::Recall(args) => run_recall(args),
        Command::GroundTruth(args) => run_ground_truth(args),
        Command::Dump(args) => run_dump(args),
    }
}
