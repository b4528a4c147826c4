//! starhouse CLI: provision the warehouse, then build and fill the star schema.

mod logging;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use starhouse_cloud::{IngressOutcome, MemoryCloud, PollPolicy, ProvisionOutcome, Provisioner};
use starhouse_core::prelude::{ClusterConfig, PipelineConfig, RawConfig, RunManifest};
use starhouse_exec::{PipelineRunner, SqlExecutor, SqliteExecutor};
use starhouse_io::{build_source_store, probe_source, JsonPaths, SourceStore, StoreOptions};
use starhouse_pipeline::{build_catalog, Catalog, CatalogSettings, Dialect, Phase};

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "starhouse")]
#[command(about = "Provision a Redshift warehouse and load a star schema from JSON logs", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the IAM role and cluster, wait for it, open the port
    Provision {
        /// Path to the configuration YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// Run against an in-memory cloud; nothing is created
        #[arg(long)]
        dry_run: bool,

        /// Give up waiting for the cluster after this many seconds (0 waits forever)
        #[arg(long)]
        max_wait: Option<u64>,

        /// Write the outcome as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Drop and recreate all seven tables
    CreateTables {
        #[command(flatten)]
        target: Target,
    },

    /// Load the staging tables, then fill the fact and dimension tables
    Etl {
        #[command(flatten)]
        target: Target,

        /// Write the run manifest as JSON to this file
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// create-tables followed by etl
    Run {
        #[command(flatten)]
        target: Target,

        /// Write the run manifest as JSON to this file
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Print every statement the pipeline would execute
    Explain {
        /// Path to the configuration YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// SQL dialect to render (redshift or sqlite)
        #[arg(long, default_value = "redshift")]
        dialect: Dialect,
    },

    /// Check the configuration and, optionally, the COPY sources
    Validate {
        /// Path to the configuration YAML file
        #[arg(short, long)]
        config: PathBuf,

        /// List the source prefixes and read the JSONPaths file
        #[arg(long)]
        probe: bool,
    },
}

/// Where the pipeline runs.
#[derive(clap::Args, Debug, Clone)]
struct Target {
    /// Path to the configuration YAML file
    #[arg(short, long)]
    config: PathBuf,

    /// Run against a local SQLite database instead of the cluster
    #[arg(long)]
    sqlite: Option<PathBuf>,

    /// IAM role ARN for COPY (overrides iam_role.arn)
    #[arg(long)]
    role_arn: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let result = match cli.command {
        Commands::Provision {
            config,
            dry_run,
            max_wait,
            output,
        } => provision_cluster(&config, dry_run, max_wait, output.as_deref()),
        Commands::CreateTables { target } => create_tables(&target),
        Commands::Etl { target, manifest } => etl(&target, manifest.as_deref()),
        Commands::Run { target, manifest } => run_all(&target, manifest.as_deref()),
        Commands::Explain { config, dialect } => explain(&config, dialect),
        Commands::Validate { config, probe } => match validate(&config, probe) {
            Ok(()) => {
                println!("✓ Configuration is valid");
                Ok(())
            }
            Err(e) => {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Read the document and apply environment overrides. Nothing is validated yet.
fn load_raw(path: &Path) -> CliResult<RawConfig> {
    let mut raw = RawConfig::from_path(path)?;
    raw.apply_env();
    Ok(raw)
}

fn cluster_config(path: &Path, max_wait: Option<u64>) -> CliResult<ClusterConfig> {
    let mut raw = load_raw(path)?;
    if let Some(secs) = max_wait {
        raw.provision.max_wait_secs = Some(secs.to_string());
    }
    Ok(raw.cluster_config()?)
}

fn pipeline_config(target: &Target) -> CliResult<PipelineConfig> {
    let mut raw = load_raw(&target.config)?;
    if let Some(arn) = &target.role_arn {
        raw.iam_role.arn = Some(arn.clone());
    }
    Ok(raw.pipeline_config()?)
}

// --- provision ---

fn provision_cluster(
    config_path: &Path,
    dry_run: bool,
    max_wait: Option<u64>,
    output: Option<&Path>,
) -> CliResult {
    let config = cluster_config(config_path, max_wait)?;
    if config.is_open_ingress() {
        warn!(
            cidr = %config.ingress_cidr,
            "warehouse port will be reachable from any address; set network.ingress_cidr to narrow it"
        );
    }

    let outcome = if dry_run {
        info!(cluster = %config.cluster_id, "dry run against an in-memory cloud");
        let cloud = MemoryCloud::new(config.region.clone());
        let policy = PollPolicy {
            interval: Duration::ZERO,
            ..PollPolicy::from(config.poll)
        };
        Provisioner::new(&cloud, &config)
            .with_poll_policy(policy)
            .run()?
    } else {
        provision_live(&config)?
    };

    print_outcome(&outcome);
    if let Some(path) = output {
        fs::write(path, serde_json::to_string_pretty(&outcome)?)?;
        println!("  Outcome written to {}", path.display());
    }
    Ok(())
}

#[cfg(feature = "aws")]
fn provision_live(config: &ClusterConfig) -> CliResult<ProvisionOutcome> {
    let cloud = starhouse_cloud::AwsCloud::new(config)?;
    Ok(starhouse_cloud::provision(&cloud, config)?)
}

#[cfg(not(feature = "aws"))]
fn provision_live(_config: &ClusterConfig) -> CliResult<ProvisionOutcome> {
    Err("starhouse was built without the `aws` feature; rebuild with `--features aws` or pass --dry-run".into())
}

fn print_outcome(outcome: &ProvisionOutcome) {
    println!("✓ Cluster {} is available", outcome.cluster_id);
    println!(
        "  Endpoint: {}:{}",
        outcome.endpoint.address, outcome.endpoint.port
    );
    println!("  Role ARN: {}", outcome.role_arn);
    println!("  Connection: {}", outcome.connection_url);
    match &outcome.ingress {
        IngressOutcome::Authorized { group } => println!("  Ingress: authorized on {}", group),
        IngressOutcome::AlreadyPresent { group } => {
            println!("  Ingress: already present on {}", group)
        }
        IngressOutcome::Skipped { reason } => println!("  Ingress: skipped ({})", reason),
    }
    for w in &outcome.warnings {
        println!("  Warning: {}", w);
    }
}

// --- table pipeline ---

fn open_executor(target: &Target, config: &PipelineConfig) -> CliResult<Box<dyn SqlExecutor>> {
    match &target.sqlite {
        Some(path) => {
            let options = StoreOptions {
                region: Some(config.region.clone()),
                credentials: config.credentials.clone(),
                ..Default::default()
            };
            info!(path = %path.display(), "using local sqlite database");
            Ok(Box::new(
                SqliteExecutor::open(path)?.with_store_options(options),
            ))
        }
        None => connect_cluster(config),
    }
}

#[cfg(feature = "redshift")]
fn connect_cluster(config: &PipelineConfig) -> CliResult<Box<dyn SqlExecutor>> {
    let host = config
        .database
        .host
        .as_deref()
        .ok_or_else(|| starhouse_core::Error::missing("cluster.host"))?;
    Ok(Box::new(starhouse_exec::PostgresExecutor::connect(
        &config.database,
        host,
    )?))
}

#[cfg(not(feature = "redshift"))]
fn connect_cluster(_config: &PipelineConfig) -> CliResult<Box<dyn SqlExecutor>> {
    Err("starhouse was built without the `redshift` feature; rebuild with `--features redshift` or pass --sqlite".into())
}

fn catalog_for(config: &PipelineConfig, dialect: Dialect) -> CliResult<Catalog> {
    Ok(build_catalog(&CatalogSettings::from_config(config, dialect))?)
}

fn create_tables(target: &Target) -> CliResult {
    let config = pipeline_config(target)?;
    let mut exec = open_executor(target, &config)?;
    let catalog = catalog_for(&config, exec.dialect())?;

    let mut runner = PipelineRunner::new(exec.as_mut(), &catalog)?;
    runner.create_tables()?;
    let manifest = runner.finish()?;

    println!("✓ Tables created");
    println!("  Tables: {}", catalog.tables(Phase::Create).join(", "));
    println!("  Duration: {}ms", manifest.elapsed_ms());
    Ok(())
}

fn etl(target: &Target, manifest_path: Option<&Path>) -> CliResult {
    let config = pipeline_config(target)?;
    let mut exec = open_executor(target, &config)?;
    let catalog = catalog_for(&config, exec.dialect())?;

    let mut runner = PipelineRunner::new(exec.as_mut(), &catalog)?;
    runner.etl()?;
    let manifest = runner.finish()?;

    println!("✓ ETL finished");
    report_manifest(&manifest, manifest_path)
}

fn run_all(target: &Target, manifest_path: Option<&Path>) -> CliResult {
    let config = pipeline_config(target)?;
    let mut exec = open_executor(target, &config)?;
    let catalog = catalog_for(&config, exec.dialect())?;

    let manifest = PipelineRunner::new(exec.as_mut(), &catalog)?.run_all()?;

    println!("✓ Pipeline executed successfully");
    report_manifest(&manifest, manifest_path)
}

fn report_manifest(manifest: &RunManifest, path: Option<&Path>) -> CliResult {
    println!("  Duration: {}ms", manifest.elapsed_ms());
    println!("  Catalog hash: {}", manifest.catalog_hash);
    for (table, rows) in &manifest.row_counts {
        println!("  {:<16} {} rows", table, rows);
    }
    if let Some(path) = path {
        fs::write(path, serde_json::to_string_pretty(manifest)?)?;
        println!("  Manifest written to {}", path.display());
    }
    Ok(())
}

// --- explain / validate ---

fn explain(config_path: &Path, dialect: Dialect) -> CliResult {
    let config = load_raw(config_path)?.pipeline_config()?;
    let catalog = catalog_for(&config, dialect)?;

    println!("Statement Catalog");
    println!("=================");
    println!();
    println!("Dialect: {}", catalog.dialect);
    println!("Hash: {}", catalog.hash());
    for phase in Phase::ALL {
        println!("{:<8} {}", format!("{}:", phase), catalog.tables(phase).join(" → "));
    }
    println!();
    println!("{}", catalog.render_script());
    Ok(())
}

fn validate(config_path: &Path, probe: bool) -> CliResult {
    let raw = load_raw(config_path)?;
    let cluster = raw.cluster_config()?;
    let pipeline = raw.pipeline_config()?;
    info!(cluster = %cluster.cluster_id, region = %cluster.region, "cluster record ok");
    info!(role = %pipeline.role_arn, "pipeline record ok");

    if probe {
        probe_sources(&pipeline)?;
    }
    Ok(())
}

fn probe_sources(config: &PipelineConfig) -> CliResult {
    let options = StoreOptions {
        region: Some(config.region.clone()),
        credentials: config.credentials.clone(),
        ..Default::default()
    };
    for uri in [&config.sources.log_data, &config.sources.song_data] {
        let store = build_source_store(uri, &options)?;
        let stats = probe_source(store.as_ref(), uri)?;
        if stats.is_empty() {
            return Err(format!("no objects under '{}'", uri).into());
        }
        println!("  {}: {} objects, {} bytes", uri, stats.objects, stats.bytes);
    }
    if let Some(path) = &config.sources.log_jsonpath {
        let store = build_source_store(path, &options)?;
        let paths = JsonPaths::parse(&store.read(path)?)?;
        println!("  {}: {} paths", path, paths.len());
    }
    Ok(())
}
