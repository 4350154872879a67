use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arclus_core::{
    evaluate_ranking_method, method_by_name, method_names, short_digest, similarity_by_name,
    write_results_tsv, ClaimStore, ConfigValue, EvalOptions, EvaluationRun, GroundTruth, MethodConfig,
    PrecomputedScores, PremiseStore, RankingMethod, RunConfig, SimilarityConfig, ZeroIdcgPolicy,
    DEFAULT_CSLS_K, DEFAULT_KS, DEFAULT_LP_P, DEFAULT_OUTPUT_ROOT,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "arclus")]
#[command(about = "Baseline premise ranking for argument retrieval")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct MethodArgs {
    /// Ranking method, e.g. zero_shot_knn or learned_similarity_cluster_knn.
    #[arg(long, default_value = "zero_shot_knn")]
    method: String,

    /// Similarity for zero-shot methods: lp, l1, l2, cosine or csls.
    #[arg(long)]
    similarity: Option<String>,

    #[arg(long)]
    cluster_ratio: Option<f64>,

    #[arg(long, value_parser = ["closest-to-center", "closest-to-claim"])]
    cluster_representative: Option<String>,

    /// k-means seed for cluster-based methods.
    #[arg(long)]
    seed: Option<u64>,

    /// Pre-computed claim representations (.jsonl or .parquet).
    #[arg(long, env = "ARCLUS_CLAIMS")]
    claims: Option<PathBuf>,

    /// Pre-computed premise representations (.jsonl or .parquet).
    #[arg(long, env = "ARCLUS_PREMISES")]
    premises: Option<PathBuf>,

    /// Pairwise model scores (TSV: claim_id, premise_id, score).
    #[arg(long, env = "ARCLUS_SCORES")]
    scores: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_LP_P)]
    lp_p: f32,

    #[arg(long, default_value_t = DEFAULT_CSLS_K)]
    csls_k: usize,

    #[arg(long, default_value = "cosine")]
    csls_base: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ZeroIdcgArg {
    Exclude,
    Include,
}

impl From<ZeroIdcgArg> for ZeroIdcgPolicy {
    fn from(arg: ZeroIdcgArg) -> Self {
        match arg {
            ZeroIdcgArg::Exclude => ZeroIdcgPolicy::Exclude,
            ZeroIdcgArg::Include => ZeroIdcgPolicy::Include,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Evaluate a method on every claim and write a TSV of nDCG scores.
    Evaluate {
        #[command(flatten)]
        method: MethodArgs,

        /// Ground-truth assignments (.csv or .tsv).
        #[arg(long, env = "ARCLUS_ASSIGNMENTS")]
        assignments: PathBuf,

        #[arg(long, env = "ARCLUS_OUTPUT_ROOT", default_value = DEFAULT_OUTPUT_ROOT)]
        output_root: PathBuf,

        /// Cut-off; repeat for several.
        #[arg(long = "k", default_values_t = DEFAULT_KS)]
        ks: Vec<usize>,

        // Only the negative toggle is exposed; padding is on by default.
        #[arg(long = "no-pad", default_value_t = true, action = clap::ArgAction::SetFalse)]
        pad: bool,

        #[arg(long, value_enum, default_value_t = ZeroIdcgArg::Exclude)]
        zero_idcg: ZeroIdcgArg,
    },
    /// Rank a candidate pool for one claim.
    Rank {
        #[command(flatten)]
        method: MethodArgs,

        #[arg(long)]
        claim_id: i64,

        /// Candidate premise ID; repeat for the whole pool.
        #[arg(id = "premise_ids", long = "premise", required = true)]
        premises: Vec<String>,

        #[arg(long, default_value_t = 5)]
        k: usize,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

#[derive(Debug, serde::Serialize)]
struct RankOutput<'a> {
    claim_id: i64,
    method: &'a str,
    k: usize,
    premises: &'a [String],
}

fn load_arc<T>(
    path: Option<&Path>,
    load: impl Fn(&Path) -> arclus_core::Result<T>,
) -> Result<Option<Arc<T>>> {
    path.map(|p| {
        load(p)
            .map(Arc::new)
            .with_context(|| format!("load {}", p.display()))
    })
    .transpose()
}

fn make_method(args: &MethodArgs) -> Result<Box<dyn RankingMethod>> {
    let similarity_config = SimilarityConfig {
        p: args.lp_p,
        csls_k: args.csls_k,
        csls_base: args.csls_base.clone(),
    };
    let similarity = args
        .similarity
        .as_deref()
        .map(|name| similarity_by_name(name, &similarity_config))
        .transpose()?;

    let config = MethodConfig {
        similarity,
        claims: load_arc(args.claims.as_deref(), ClaimStore::load)?,
        premises: load_arc(args.premises.as_deref(), PremiseStore::load)?,
        scores: load_arc(args.scores.as_deref(), PrecomputedScores::load_tsv)?,
        cluster_ratio: args.cluster_ratio,
        cluster_representative: args.cluster_representative.clone(),
        seed: args.seed,
    };

    method_by_name(&args.method, config).with_context(|| {
        format!(
            "build method {} (known, ignoring case, `_` and `-`: {})",
            args.method,
            method_names().collect::<Vec<_>>().join(", ")
        )
    })
}

/// Hash of the scores file contents, so a moved file keeps its results but an
/// edited one does not.
fn scores_digest(path: Option<&Path>) -> Result<ConfigValue> {
    let Some(path) = path else {
        return Ok(ConfigValue::None);
    };
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(ConfigValue::Str(short_digest(&String::from_utf8_lossy(&bytes))))
}

/// Sorted, deduplicated cut-offs; 0 is rejected.
fn normalize_ks(ks: &[usize]) -> Result<Vec<usize>> {
    if ks.is_empty() || ks.contains(&0) {
        anyhow::bail!("--k values must be > 0");
    }
    let mut ks = ks.to_vec();
    ks.sort_unstable();
    ks.dedup();
    Ok(ks)
}

fn run_config(args: &MethodArgs, ks: &[usize], options: &EvalOptions) -> Result<RunConfig> {
    let mut config = RunConfig::new();
    if args.similarity.is_some() {
        config = config
            .with("lp_p", ConfigValue::Float(f64::from(args.lp_p)))
            .with("csls_k", ConfigValue::Int(args.csls_k as i64))
            .with("csls_base", ConfigValue::Str(args.csls_base.clone()));
    }
    Ok(config
        .with("scores", scores_digest(args.scores.as_deref())?)
        .with("method", ConfigValue::Str(args.method.clone()))
        .with("similarity", ConfigValue::from_opt_str(args.similarity.as_deref()))
        .with("cluster_ratio", ConfigValue::from_opt_float(args.cluster_ratio))
        .with(
            "cluster_representative",
            ConfigValue::from_opt_str(args.cluster_representative.as_deref()),
        )
        .with(
            "seed",
            args.seed.map_or(ConfigValue::None, |s| ConfigValue::Int(s as i64)),
        )
        .with("ks", ConfigValue::IntList(ks.iter().map(|k| *k as i64).collect()))
        .with("pad", ConfigValue::Bool(options.pad))
        .with("zero_idcg", ConfigValue::Str(options.zero_idcg.as_str().to_string())))
}

fn evaluate(
    args: &MethodArgs,
    assignments: &Path,
    output_root: &Path,
    ks: &[usize],
    options: EvalOptions,
) -> Result<()> {
    let ks = normalize_ks(ks)?;
    let config = run_config(args, &ks, &options)?;
    std::fs::create_dir_all(output_root)
        .with_context(|| format!("create {}", output_root.display()))?;
    let output_path = config.output_path(output_root);
    println!("output={}", output_path.display());
    if output_path.is_file() {
        info!(path = %output_path.display(), "results already exist, skipping");
        return Ok(());
    }

    let method = make_method(args)?;
    let ground_truth = GroundTruth::load(assignments)
        .with_context(|| format!("load assignments {}", assignments.display()))?;

    let mut run = EvaluationRun::start(&config);
    let manifest_path = config.manifest_path(output_root);
    let summary = match evaluate_ranking_method(method.as_ref(), &ground_truth, &ks, &options) {
        Ok(summary) => summary,
        Err(err) => {
            run.on_failed(err.to_string());
            run.save(&manifest_path)?;
            return Err(err).context("evaluate ranking method");
        }
    };
    run.on_completed(&summary);

    write_results_tsv(&output_path, &summary, &config)
        .with_context(|| format!("write {}", output_path.display()))?;
    run.save(&manifest_path)?;

    for s in &summary.summaries {
        println!(
            "method={} k={} ndcg={:.4} evaluated={} skipped={}",
            method.name(),
            s.k,
            s.mean_ndcg,
            s.evaluated,
            s.skipped
        );
    }
    Ok(())
}

fn rank(
    args: &MethodArgs,
    claim_id: i64,
    premises: &[String],
    k: usize,
    output: OutputFormat,
) -> Result<()> {
    let method = make_method(args)?;
    let ranking = method.rank(claim_id, premises, k)?;

    match output {
        OutputFormat::Text => {
            for (i, premise) in ranking.iter().enumerate() {
                println!("rank={} premise_id={}", i + 1, premise);
            }
        }
        OutputFormat::Json => {
            let out = RankOutput {
                claim_id,
                method: method.name(),
                k,
                premises: &ranking,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Evaluate {
            method,
            assignments,
            output_root,
            ks,
            pad,
            zero_idcg,
        } => evaluate(
            method,
            assignments,
            output_root,
            ks,
            EvalOptions {
                pad: *pad,
                zero_idcg: (*zero_idcg).into(),
            },
        ),
        Commands::Rank {
            method,
            claim_id,
            premises,
            k,
            output,
        } => rank(method, *claim_id, premises, *k, *output),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
