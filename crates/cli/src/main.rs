use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use codeweave_context::TaskType;
use codeweave_graph::TraceDirection;
use codeweave_service::{
    AppConfig, ClientRegistry, KnowledgeService, RetrievalOptions, ServiceError, DEFAULT_IMPACT_DEPTH,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

mod report;

/// Exit status when the requested entity does not exist
const EXIT_NOT_FOUND: i32 = 4;

#[derive(Parser)]
#[command(name = "codeweave")]
#[command(about = "Code knowledge graph and context retrieval", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./codeweave.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Knowledge store file (overrides paths.store)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Retrieval index directory (overrides paths.index_dir)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Print JSON on stdout (implies --quiet)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a project into a knowledge graph
    Analyze(AnalyzeArgs),

    /// Build the knowledge graph and the retrieval index
    Index(IndexArgs),

    /// Find entities by name
    Search(SearchArgs),

    /// Synthesize context for one entity
    Context(ContextArgs),

    /// Answer a free-form question with retrieved context
    Retrieve(RetrieveArgs),

    /// Entities that call the given one
    Callers(EntityArgs),

    /// Entities the given one calls
    Callees(EntityArgs),

    /// Walk the call graph from an entity
    Trace(TraceArgs),

    /// Show what breaks if an entity changes
    Impact(ImpactArgs),

    /// Knowledge store and index totals
    Stats,

    /// Keep the retrieval index current while files change
    Watch(WatchArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Project directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Where to write the knowledge store
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extra glob patterns to skip
    #[arg(long = "ignore")]
    ignores: Vec<String>,
}

#[derive(Args)]
struct IndexArgs {
    /// Project directory
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Extra glob patterns to skip
    #[arg(long = "ignore")]
    ignores: Vec<String>,
}

#[derive(Args)]
struct SearchArgs {
    /// Case-insensitive name fragment
    pattern: String,
}

#[derive(Args)]
struct ContextArgs {
    /// Entity id or name fragment
    target: String,

    /// Task type (explain, debug, extend, review, locate, general)
    #[arg(long, value_parser = parse_task)]
    task: Option<TaskType>,

    #[arg(long)]
    max_tokens: Option<usize>,
}

#[derive(Args)]
struct RetrieveArgs {
    /// Question about the code
    query: String,

    /// Skip classification and use this task type
    #[arg(long, value_parser = parse_task)]
    task: Option<TaskType>,

    #[arg(long)]
    max_tokens: Option<usize>,

    /// Maximum entities to synthesize context for
    #[arg(long, short = 'n')]
    limit: Option<usize>,

    /// Do not pull in dependency chunks
    #[arg(long)]
    no_deps: bool,
}

#[derive(Args)]
struct EntityArgs {
    /// Entity id
    id: String,
}

#[derive(Args)]
struct TraceArgs {
    /// Entity id
    id: String,

    #[arg(long, value_enum, default_value_t = Direction::Callees)]
    direction: Direction,

    /// Hops to follow (capped at 5)
    #[arg(long, default_value_t = 3)]
    depth: usize,
}

#[derive(Args)]
struct ImpactArgs {
    /// Entity id
    id: String,

    /// Dependent hops to follow (capped at 5)
    #[arg(long, default_value_t = DEFAULT_IMPACT_DEPTH)]
    depth: usize,
}

#[derive(Args)]
struct WatchArgs {
    /// Project directory
    #[arg(default_value = ".")]
    path: PathBuf,
}

#[derive(Copy, Clone, ValueEnum)]
enum Direction {
    Callers,
    Callees,
}

impl Direction {
    const fn as_domain(self) -> TraceDirection {
        match self {
            Direction::Callers => TraceDirection::Callers,
            Direction::Callees => TraceDirection::Callees,
        }
    }
}

fn parse_task(raw: &str) -> std::result::Result<TaskType, String> {
    raw.parse::<TaskType>().map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();
    // stdout is reserved for JSON
    if cli.json {
        cli.quiet = true;
    }
    init_logging(&cli);

    match run(cli).await {
        Ok(()) => Ok(()),
        Err(err) if is_not_found(&err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(EXIT_NOT_FOUND);
        }
        Err(err) => Err(err),
    }
}

fn init_logging(cli: &Cli) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ServiceError>()
        .is_some_and(ServiceError::is_not_found)
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(store) = &cli.store {
        config.paths.store = store.clone();
    }
    if let Some(index_dir) = &cli.index_dir {
        config.paths.index_dir = index_dir.clone();
    }
    Ok(config)
}

fn project_dir(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Invalid project path {}", path.display()))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let service = KnowledgeService::new(config, ClientRegistry::new())?;
    let json = cli.json;

    match cli.command {
        Commands::Analyze(args) => {
            let root = project_dir(&args.path)?;
            let out = service.analyze(&root, args.output.as_deref(), &args.ignores)?;
            emit(json, &out, report::analyze)?;
        }
        Commands::Index(args) => {
            let root = project_dir(&args.path)?;
            let out = service.index(&root, &args.ignores).await?;
            emit(json, &out, report::analyze)?;
        }
        Commands::Search(args) => {
            let out = service.search(&args.pattern)?;
            emit(json, &out, |e| report::entities(e, "No matching entities"))?;
        }
        Commands::Context(args) => {
            let out = service.get_context(&args.target, args.max_tokens, args.task)?;
            emit(json, &out, report::context)?;
        }
        Commands::Retrieve(args) => {
            let defaults = RetrievalOptions::from(&service.config().retrieval);
            let options = RetrievalOptions {
                max_tokens: args.max_tokens.unwrap_or(defaults.max_tokens),
                task: args.task,
                limit_entities: args.limit.unwrap_or(defaults.limit_entities),
                expand_deps: defaults.expand_deps && !args.no_deps,
            };
            let out = service.retrieve_context_for_query(&args.query, options).await;
            emit(json, &out, report::retrieval)?;
        }
        Commands::Callers(args) => {
            let out = service.get_callers(&args.id)?;
            emit(json, &out, |e| report::entities(e, "No callers"))?;
        }
        Commands::Callees(args) => {
            let out = service.get_callees(&args.id)?;
            emit(json, &out, |e| report::entities(e, "No callees"))?;
        }
        Commands::Trace(args) => {
            let out = service.trace_calls(&args.id, args.direction.as_domain(), args.depth)?;
            emit(json, &out, |t| report::trace(t))?;
        }
        Commands::Impact(args) => {
            let out = service.get_impact(&args.id, Some(args.depth))?;
            emit(json, &out, report::impact)?;
        }
        Commands::Stats => {
            // Pick up the saved index too when there is one.
            if let Err(err) = service.indexer().await {
                log::debug!("No retrieval index loaded: {err}");
            }
            let out = service.stats()?;
            emit(json, &out, report::stats)?;
        }
        Commands::Watch(args) => {
            let root = project_dir(&args.path)?;
            let session = service.watch(&root).await?;
            log::info!("Watching {} (Ctrl-C to stop)", root.display());
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            let out = session.stop().await?;
            emit(json, &out, report::worker)?;
        }
    }
    Ok(())
}

fn emit<T: Serialize>(json: bool, value: &T, render: impl Fn(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", render(value));
    }
    Ok(())
}
