//! BlockBench CLI
//!
//! The `blockbench` command drives the block registry and the pipeline
//! runner against the configured SurrealDB store.
//!
//! ## Commands
//!
//! - `seed`: Register the built-in block catalog
//! - `blocks`: List blocks and versions, register blocks, create drafts
//! - `review`: Move versions through review and publication
//! - `candidates`: Manage paper-derived block proposals
//! - `lock` / `run` / `explain`: Work with pipeline spec files
//! - `runs`: Inspect recorded runs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use blockbench_core::domain::compute_block_digest;
use blockbench_core::runs::DEFAULT_LIST_LIMIT;
use blockbench_core::{
    init_tracing, BenchConfig, BlockBench, BlockCategory, Caller, CandidateStatus,
    ExecutionEngine, PipelineSpec, ReviewState, RunStatus, RunView, Stores, SurrealHandle,
    VersionDraft,
};
use blockbench_state::PaperRef;

#[derive(Parser)]
#[command(name = "blockbench")]
#[command(author = "BlockBench Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Versioned block registry and reproducible pipeline runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Credential presented for privileged commands
    #[arg(long, global = true, env = "BLOCKBENCH_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the built-in catalog (idempotent)
    Seed,

    /// Browse and extend the block registry
    Blocks {
        #[command(subcommand)]
        action: BlockAction,
    },

    /// Review, publish and deprecate block versions
    Review {
        #[command(subcommand)]
        action: ReviewAction,
    },

    /// Paper-derived block proposals
    Candidates {
        #[command(subcommand)]
        action: CandidateAction,
    },

    /// Verify a pipeline spec against the registry and print its manifest
    Lock {
        /// Pipeline spec file (JSON)
        spec: PathBuf,

        /// Print the pipeline with digests filled in from the registry instead
        #[arg(long)]
        pin: bool,
    },

    /// Submit a pipeline run
    Run {
        /// Pipeline spec file (JSON)
        spec: PathBuf,
    },

    /// Execute a pipeline and print the per-step trace
    Explain {
        /// Pipeline spec file (JSON)
        spec: PathBuf,
    },

    /// Inspect recorded runs
    Runs {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Compute the digest a version would receive
    Digest {
        /// Block slug
        slug: String,

        /// Semantic version
        version: String,

        /// Input schema file (JSON)
        #[arg(long)]
        input: PathBuf,

        /// Output schema file (JSON)
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum BlockAction {
    /// List blocks with their latest published version
    List,

    /// List every version of a block
    Versions {
        /// Block slug
        slug: String,
    },

    /// Register a block or refresh its display fields
    Register {
        /// Block slug (`category.name`)
        slug: String,

        /// Category wire name, e.g. `fusions`
        #[arg(short, long)]
        category: String,

        /// Display name
        #[arg(short, long)]
        name: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Create a draft version from a JSON file
    Draft {
        /// Block slug
        slug: String,

        /// Draft file with `version`, `inputSchema`, `outputSchema`, `changelog`
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ReviewAction {
    /// Submit a draft version for review
    Submit {
        /// Version id
        version_id: String,
    },

    /// Approve a pending review
    Approve {
        /// Review id
        review_id: String,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Reject a pending review
    Reject {
        /// Review id
        review_id: String,

        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Publish an approved version
    Publish {
        /// Version id
        version_id: String,
    },

    /// Deprecate a published version
    Deprecate {
        /// Version id
        version_id: String,
    },

    /// List reviews
    List {
        /// Filter by state (pending, approved, rejected)
        #[arg(short, long)]
        state: Option<String>,
    },
}

#[derive(Subcommand)]
enum CandidateAction {
    /// List candidates
    List {
        /// Filter by status (draft, pending_review, approved, rejected)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Record a candidate from a JSON file
    Propose {
        /// File with `paper`, `proposedBlocks` and optional `proposalText`
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Submit a draft candidate for review
    Submit { candidate_id: String },

    /// Approve a candidate
    Approve { candidate_id: String },

    /// Reject a candidate
    Reject { candidate_id: String },

    /// Turn an approved candidate into draft block versions
    Materialize { candidate_id: String },
}

#[derive(Subcommand)]
enum RunAction {
    /// List runs, newest first
    List {
        /// Filter by status (queued, running, succeeded, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum number of runs to show
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Show one run
    Show { run_id: String },
}

/// Draft version file for `blocks draft`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DraftFile {
    version: String,
    input_schema: Value,
    output_schema: Value,
    #[serde(default)]
    changelog: Option<String>,
}

/// Candidate file for `candidates propose`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposalFile {
    paper: PaperRef,
    proposed_blocks: Value,
    #[serde(default)]
    proposal_text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = BenchConfig::from_env();

    let level = if cli.verbose { Level::DEBUG } else { config.log_level };
    init_tracing(cli.json || config.log_json, level);

    let handle = SurrealHandle::setup_from_env()
        .await
        .context("Failed to connect to SurrealDB")?;
    let bench = BlockBench::new(Stores::surreal(handle), ExecutionEngine::default());
    let caller = Caller::from_key(cli.key.as_deref(), config.admin_key.as_deref());

    match cli.command {
        Commands::Seed => cmd_seed(&bench).await,
        Commands::Blocks { action } => match action {
            BlockAction::List => cmd_blocks_list(&bench).await,
            BlockAction::Versions { slug } => cmd_blocks_versions(&bench, &slug).await,
            BlockAction::Register {
                slug,
                category,
                name,
                description,
            } => cmd_blocks_register(&bench, &caller, &slug, &category, &name, &description).await,
            BlockAction::Draft { slug, file } => cmd_blocks_draft(&bench, &caller, &slug, &file).await,
        },
        Commands::Review { action } => cmd_review(&bench, &caller, action).await,
        Commands::Candidates { action } => cmd_candidates(&bench, &caller, action).await,
        Commands::Lock { spec, pin } => cmd_lock(&bench, &spec, pin).await,
        Commands::Run { spec } => cmd_run(&bench, &spec).await,
        Commands::Explain { spec } => cmd_explain(&bench, &spec).await,
        Commands::Runs { action } => match action {
            RunAction::List { status, limit } => cmd_runs_list(&bench, status.as_deref(), limit).await,
            RunAction::Show { run_id } => cmd_runs_show(&bench, &run_id).await,
        },
        Commands::Digest {
            slug,
            version,
            input,
            output,
        } => cmd_digest(&slug, &version, &input, &output),
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path).context(format!("Failed to read {:?}", path))?;
    serde_json::from_str(&raw).context(format!("Failed to parse {:?}", path))
}

/// Parse a snake_case status filter through its serde representation.
fn parse_filter<T: DeserializeOwned>(raw: Option<&str>, what: &str) -> Result<Option<T>> {
    match raw {
        None => Ok(None),
        Some(s) => serde_json::from_value(Value::String(s.to_string()))
            .map(Some)
            .map_err(|_| anyhow::anyhow!("Unknown {} '{}'", what, s)),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Seed the built-in catalog
async fn cmd_seed(bench: &BlockBench) -> Result<()> {
    let report = bench.seed().await?;
    info!(
        created = report.versions_created,
        existing = report.versions_existing,
        "catalog seeded"
    );
    println!("Blocks:            {}", report.blocks);
    println!("Versions created:  {}", report.versions_created);
    println!("Versions existing: {}", report.versions_existing);
    Ok(())
}

async fn cmd_blocks_list(bench: &BlockBench) -> Result<()> {
    let blocks = bench.registry.list_blocks().await?;
    if blocks.is_empty() {
        println!("No blocks registered. Run `blockbench seed` first.");
        return Ok(());
    }

    println!("{:<34} {:<20} {:<10} DIGEST", "BLOCK", "CATEGORY", "LATEST");
    for block in blocks {
        let (version, digest) = match &block.latest_published {
            Some(latest) => (latest.version.as_str(), latest.digest.as_str()),
            None => ("-", "-"),
        };
        println!(
            "{:<34} {:<20} {:<10} {}",
            block.block_id,
            block.category.as_str(),
            version,
            digest
        );
    }
    Ok(())
}

async fn cmd_blocks_versions(bench: &BlockBench, slug: &str) -> Result<()> {
    let block = bench.registry.get_block(slug).await?;
    println!("{} ({})", block.block_id, block.category);
    println!();
    for version in bench.registry.list_versions(slug).await? {
        println!(
            "  {:<10} {:<15} {}  {}",
            version.version, version.status, version.digest, version.version_id
        );
        if !version.changelog.is_empty() {
            println!("             {}", version.changelog);
        }
    }
    Ok(())
}

async fn cmd_blocks_register(
    bench: &BlockBench,
    caller: &Caller,
    slug: &str,
    category: &str,
    name: &str,
    description: &str,
) -> Result<()> {
    let Some(category) = BlockCategory::parse(category) else {
        let names: Vec<&str> = BlockCategory::ALL.iter().map(|c| c.as_str()).collect();
        bail!("Unknown category '{}' (expected one of {})", category, names.join(", "));
    };
    let block = bench
        .registry
        .register_or_update_block(caller, slug, category, name, description)
        .await?;
    println!("Registered {} ({})", block.block_id, block.category);
    Ok(())
}

async fn cmd_blocks_draft(bench: &BlockBench, caller: &Caller, slug: &str, file: &Path) -> Result<()> {
    let draft: DraftFile = read_json(file)?;
    let mut request = VersionDraft::new(&draft.version, draft.input_schema, draft.output_schema);
    if let Some(changelog) = &draft.changelog {
        request = request.with_changelog(changelog);
    }
    let version = bench.registry.create_draft_version(caller, slug, request).await?;
    println!("Created draft {}@{}", version.block_id, version.version);
    println!("  id:     {}", version.version_id);
    println!("  digest: {}", version.digest);
    Ok(())
}

async fn cmd_review(bench: &BlockBench, caller: &Caller, action: ReviewAction) -> Result<()> {
    match action {
        ReviewAction::Submit { version_id } => {
            let (review, version) = bench.reviews.submit_for_review(caller, &version_id).await?;
            println!("{}@{} is {}", version.block_id, version.version, version.status);
            println!("Review: {}", review.review_id);
        }
        ReviewAction::Approve { review_id, notes } => {
            let review = bench.reviews.approve(caller, &review_id, &notes).await?;
            println!("Review {} {}", review.review_id, review.state);
        }
        ReviewAction::Reject { review_id, notes } => {
            let review = bench.reviews.reject(caller, &review_id, &notes).await?;
            println!("Review {} {}", review.review_id, review.state);
        }
        ReviewAction::Publish { version_id } => {
            let version = bench.reviews.publish(caller, &version_id).await?;
            println!("{}@{} is {}", version.block_id, version.version, version.status);
        }
        ReviewAction::Deprecate { version_id } => {
            let version = bench.reviews.deprecate(caller, &version_id).await?;
            println!("{}@{} is {}", version.block_id, version.version, version.status);
        }
        ReviewAction::List { state } => {
            let state: Option<ReviewState> = parse_filter(state.as_deref(), "review state")?;
            for review in bench.reviews.list_reviews(state).await? {
                println!(
                    "{}  {:<9} {:?} {}",
                    review.review_id, review.state, review.target_type, review.target_id
                );
            }
        }
    }
    Ok(())
}

async fn cmd_candidates(bench: &BlockBench, caller: &Caller, action: CandidateAction) -> Result<()> {
    match action {
        CandidateAction::List { status } => {
            let status: Option<CandidateStatus> = parse_filter(status.as_deref(), "candidate status")?;
            for candidate in bench.candidates.list(status).await? {
                println!(
                    "{}  {:<15} {}:{}  {}",
                    candidate.candidate_id,
                    candidate.status,
                    candidate.paper.source,
                    candidate.paper.external_id,
                    candidate.paper.title
                );
            }
        }
        CandidateAction::Propose { file } => {
            let proposal: ProposalFile = read_json(&file)?;
            let candidate = bench
                .candidates
                .propose(
                    caller,
                    proposal.paper,
                    proposal.proposed_blocks,
                    &proposal.proposal_text,
                )
                .await?;
            println!("Candidate {} ({})", candidate.candidate_id, candidate.status);
        }
        CandidateAction::Submit { candidate_id } => {
            let review = bench
                .reviews
                .submit_candidate_for_review(caller, &candidate_id)
                .await?;
            println!("Review: {}", review.review_id);
        }
        CandidateAction::Approve { candidate_id } => {
            let candidate = bench.candidates.approve(caller, &candidate_id).await?;
            println!("Candidate {} {}", candidate.candidate_id, candidate.status);
        }
        CandidateAction::Reject { candidate_id } => {
            let candidate = bench.candidates.reject(caller, &candidate_id).await?;
            println!("Candidate {} {}", candidate.candidate_id, candidate.status);
        }
        CandidateAction::Materialize { candidate_id } => {
            let report = bench.candidates.materialize(caller, &candidate_id).await?;
            print_json(&report)?;
        }
    }
    Ok(())
}

async fn cmd_lock(bench: &BlockBench, path: &Path, pin: bool) -> Result<()> {
    let spec: PipelineSpec = read_json(path)?;
    if pin {
        let pinned = bench.locker.pin(&spec).await?;
        return print_json(&pinned);
    }
    let locked = bench.locker.lock(&spec).await?;
    print_json(&locked.manifest)
}

async fn cmd_run(bench: &BlockBench, path: &Path) -> Result<()> {
    let spec: PipelineSpec = read_json(path)?;
    let run = bench.runs.submit(&spec).await?;
    if run.status == RunStatus::Queued {
        println!("Run {} queued; a blockbenchd worker will pick it up.", run.run_id);
        return Ok(());
    }
    print_json(&RunView::from(run))
}

async fn cmd_explain(bench: &BlockBench, path: &Path) -> Result<()> {
    let spec: PipelineSpec = read_json(path)?;
    let trace = bench.explainer.explain(&spec).await?;
    print_json(&trace)
}

async fn cmd_runs_list(bench: &BlockBench, status: Option<&str>, limit: usize) -> Result<()> {
    let status: Option<RunStatus> = parse_filter(status, "run status")?;
    let runs = bench.runs.list_runs(status, limit).await?;
    if runs.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }
    for run in runs {
        println!(
            "{}  {:<9} {}  {}",
            run.run_id,
            run.status,
            run.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.error.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_runs_show(bench: &BlockBench, run_id: &str) -> Result<()> {
    let run = bench.runs.get_run(run_id).await?;
    print_json(&RunView::from(run))
}

fn cmd_digest(slug: &str, version: &str, input: &Path, output: &Path) -> Result<()> {
    let input: Value = read_json(input)?;
    let output: Value = read_json(output)?;
    let digest = compute_block_digest(slug, version, &input, &output)?;
    println!("{}", digest);
    Ok(())
}
