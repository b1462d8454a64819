use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;

use recopy::collections::{load_schemas, CollectionService, SqliteCollections};
use recopy::config::Config;
use recopy::engine::Processor;
use recopy::nodes::NodeRegistry;
use recopy::storage::JobStore;
use recopy::workflow::parse_flow_file;

#[derive(Parser)]
#[command(name = "recopy")]
#[command(about = "Run record-duplication flows against a SQLite collection store", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/recopy/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow from its first node
    Run {
        /// Path to flow YAML file
        file: PathBuf,
        /// JSON input data
        #[arg(short, long)]
        input: Option<String>,
        /// Input values (key=value)
        #[arg(short, long = "param", value_parser = parse_var)]
        params: Vec<(String, String)>,
    },
    /// Resume a stored job and continue the flow after it
    Resume {
        /// Path to flow YAML file
        file: PathBuf,
        /// Job ID
        #[arg(short, long)]
        job: String,
        /// JSON input for the remaining nodes
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Inspect stored jobs
    Jobs {
        #[command(subcommand)]
        action: JobActions,
    },
    /// Inspect configured collections
    Collections {
        #[command(subcommand)]
        action: CollectionActions,
    },
}

#[derive(Subcommand)]
enum JobActions {
    /// Show one job
    Show {
        /// Job ID
        id: String,
    },
    /// List jobs of an execution
    List {
        /// Execution ID
        execution_id: String,
    },
}

#[derive(Subcommand)]
enum CollectionActions {
    /// List collections and their fields
    List,
}

fn parse_var(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid variable format '{}'. Expected key=value", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    recopy::telemetry::init_logging(&config.logging);

    match cli.command {
        Commands::Run {
            file,
            input,
            params,
        } => cmd_run(&config, &file, input.as_deref(), &params).await?,
        Commands::Resume { file, job, input } => {
            cmd_resume(&config, &file, &job, input.as_deref()).await?
        }
        Commands::Jobs { action } => match action {
            JobActions::Show { id } => cmd_jobs_show(&config, &id).await?,
            JobActions::List { execution_id } => cmd_jobs_list(&config, &execution_id).await?,
        },
        Commands::Collections { action } => match action {
            CollectionActions::List => cmd_collections_list(&config)?,
        },
    }

    Ok(())
}

async fn cmd_run(
    config: &Config,
    file: &Path,
    input: Option<&str>,
    params: &[(String, String)],
) -> anyhow::Result<()> {
    let flow = parse_flow_file(file)?;
    let processor = get_processor(config)?;

    let mut input_value = parse_input(input)?;
    merge_params(&mut input_value, params)?;

    let run = processor.run_flow(&flow, input_value).await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

async fn cmd_resume(
    config: &Config,
    file: &Path,
    job_id: &str,
    input: Option<&str>,
) -> anyhow::Result<()> {
    let flow = parse_flow_file(file)?;
    let processor = get_processor(config)?;

    let run = processor
        .resume_flow(&flow, job_id, parse_input(input)?)
        .await?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    Ok(())
}

async fn cmd_jobs_show(config: &Config, id: &str) -> anyhow::Result<()> {
    let jobs = get_jobs(config)?;
    let job = jobs
        .get_job(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Job not found: {}", id))?;
    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

async fn cmd_jobs_list(config: &Config, execution_id: &str) -> anyhow::Result<()> {
    let jobs = get_jobs(config)?.list_jobs(execution_id).await?;
    if jobs.is_empty() {
        println!("No jobs for execution {}", execution_id);
        return Ok(());
    }

    println!("{:<38} {:<20} {:<18} {:<10}", "JOB", "NODE", "TYPE", "STATUS");
    for job in jobs {
        println!(
            "{:<38} {:<20} {:<18} {:<10}",
            job.id, job.node_id, job.node_type, job.status
        );
    }
    Ok(())
}

fn cmd_collections_list(config: &Config) -> anyhow::Result<()> {
    let schemas = load_schemas(&config.schema_path())?;
    if schemas.is_empty() {
        println!("No collections defined in {}", config.schema_path().display());
        return Ok(());
    }

    for schema in schemas {
        println!("{} (primary key: {})", schema.name, schema.primary_key);
        for field in &schema.fields {
            match &field.target {
                Some(target) => println!("  {:<24} {} -> {}", field.name, field.kind, target),
                None => println!("  {:<24} {}", field.name, field.kind),
            }
        }
    }
    Ok(())
}

fn parse_input(input: Option<&str>) -> anyhow::Result<Value> {
    match input {
        Some(s) => Ok(serde_json::from_str(s)?),
        None => Ok(serde_json::json!({})),
    }
}

/// Merge key=value pairs into the input object; values that parse as JSON
/// keep their type.
fn merge_params(input: &mut Value, params: &[(String, String)]) -> anyhow::Result<()> {
    if params.is_empty() {
        return Ok(());
    }
    let Value::Object(obj) = input else {
        anyhow::bail!("--param requires the JSON input to be an object");
    };
    for (key, raw) in params {
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()));
        obj.insert(key.clone(), value);
    }
    Ok(())
}

fn database_path(config: &Config) -> anyhow::Result<PathBuf> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(db_path)
}

fn get_jobs(config: &Config) -> anyhow::Result<JobStore> {
    Ok(JobStore::open(&database_path(config)?)?)
}

fn get_processor(config: &Config) -> anyhow::Result<Processor> {
    let db_path = database_path(config)?;
    let schemas = load_schemas(&config.schema_path())?;
    let collections: Arc<dyn CollectionService> =
        Arc::new(SqliteCollections::open(&db_path, schemas)?);

    let registry = NodeRegistry::with_collections(collections);
    Ok(Processor::new(registry, JobStore::open(&db_path)?))
}
