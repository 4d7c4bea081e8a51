mod completion;
mod config;
mod error;
mod http_client;
mod manifest;
mod shell;

use anyhow::{bail, Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use reqwest::Method;
use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{default_config_path, Config, DEFAULT_TIMEOUT_SECS};
use crate::error::ApplyError;
use crate::http_client::{encode_query, encode_segment, Auth, Client};
use crate::shell::Session;

const EXIT_GENERIC_FAILURE: i32 = 1;
const EXIT_VALIDATION_FAILURE: i32 = 2;
const EXIT_APPLY_FAILURE: i32 = 3;

#[derive(Parser, Debug)]
#[command(name = "esctl", version)]
#[command(about = "Elasticsearch cluster management CLI", long_about = None)]
struct Args {
    /// Cluster node URL (repeatable, or comma separated)
    #[arg(short = 'e', long = "elastic", env = "ESCTL_ELASTIC", value_delimiter = ',')]
    elastic: Vec<String>,

    /// Basic auth username
    #[arg(long, env = "ESCTL_USERNAME")]
    username: Option<String>,

    /// Basic auth password
    #[arg(long, env = "ESCTL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Encoded API key (Authorization: ApiKey ...)
    #[arg(long, env = "ESCTL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Load config from this path
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP timeout seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a declarative manifest ({"kind": ..., "body": ...})
    Apply {
        /// Manifest path, URL, or - for stdin
        #[arg(short = 'f', long = "file")]
        file: String,
        /// Decode and print the planned actions without calling the cluster
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Manage indices
    Index {
        #[command(subcommand)]
        cmd: IndexCmd,
    },

    /// Search documents
    Search {
        #[command(subcommand)]
        cmd: SearchCmd,
    },

    /// Manage aliases
    Alias {
        #[command(subcommand)]
        cmd: AliasCmd,
    },

    /// Compact cluster overviews
    Cat {
        #[command(subcommand)]
        cmd: CatCmd,
    },

    /// Start the interactive shell
    Shell,

    /// Generate a shell completion script to stdout
    #[command(long_about = "\
Generate a shell completion script for `esctl`.

Examples:
  source <(esctl completions bash)
  esctl completions zsh > ~/.zfunc/_esctl")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum IndexCmd {
    /// Create an index
    Create {
        name: String,
        /// Number of primary shards
        #[arg(long)]
        shards: Option<u32>,
        /// Number of replicas per shard
        #[arg(long)]
        replicas: Option<u32>,
    },
    /// Delete an index
    Delete { name: String },
    /// Show index mappings, settings and aliases
    Get { name: String },
    /// Show index settings
    Settings { name: String },
}

#[derive(Subcommand, Debug)]
enum SearchCmd {
    /// Fetch one document by ID
    ById { index: String, id: String },
    /// Run a query-string search
    ByQuery {
        index: String,
        query: String,
        /// Maximum number of hits
        #[arg(long, default_value_t = 10)]
        size: u32,
    },
}

#[derive(Subcommand, Debug)]
enum AliasCmd {
    /// Point an alias at an index
    Add { index: String, alias: String },
    /// Remove an alias from an index
    Remove { index: String, alias: String },
    /// List aliases
    List {
        /// Only aliases of this index
        #[arg(long)]
        index: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CatCmd {
    /// Indices with health, doc count and size
    Indices,
    /// Cluster nodes
    Nodes,
    /// Cluster health
    Health,
    /// Shard allocation
    Shards,
    /// Aliases
    Aliases,
}

impl CatCmd {
    fn endpoint(&self) -> &'static str {
        match self {
            CatCmd::Indices => "indices",
            CatCmd::Nodes => "nodes",
            CatCmd::Health => "health",
            CatCmd::Shards => "shards",
            CatCmd::Aliases => "aliases",
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => match e.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
            _ => {
                let _ = e.print();
                std::process::exit(EXIT_GENERIC_FAILURE);
            }
        },
    };

    // Completion scripts are sourced directly; keep stdout free of anything else.
    if let Some(Command::Completions { shell }) = args.cmd {
        let mut stdout = std::io::stdout().lock();
        return write_shell_completion(shell, &mut stdout);
    }

    // Logging
    let lvl = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(lvl)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cfg_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = Config::load(&cfg_path)?;

    // client -> command tree -> catalog -> shell
    let client = build_client(&args, &cfg)?;
    let session = Session::new(client, &Args::command());

    match args.cmd {
        None | Some(Command::Shell) => {
            let session = &session;
            shell::run(session, move |argv| execute_line(session, argv)).await
        }
        Some(cmd) => match execute(&session, cmd).await {
            Ok(()) => Ok(()),
            Err(err) => {
                eprintln!("{:#}", err);
                std::process::exit(exit_code(&err));
            }
        },
    }
}

fn build_client(args: &Args, cfg: &Config) -> Result<Client> {
    let api_key = args.api_key.clone().or_else(|| cfg.api_key.clone());
    let username = args.username.clone().or_else(|| cfg.username.clone());
    let auth = match (api_key, username) {
        (Some(key), _) => Some(Auth::ApiKey(key)),
        (None, Some(username)) => Some(Auth::Basic {
            username,
            password: args.password.clone().or_else(|| cfg.password.clone()),
        }),
        (None, None) => None,
    };
    let timeout = args
        .timeout_secs
        .or(cfg.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let client = Client::new(&cfg.nodes(&args.elastic), auth, Duration::from_secs(timeout))
        .context("Failed to create cluster client")?;
    debug!(nodes = ?client.nodes(), timeout_secs = timeout, "cluster client ready");
    Ok(client)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ApplyError>() {
        Some(e) if e.is_rejected_manifest() => EXIT_VALIDATION_FAILURE,
        Some(_) => EXIT_APPLY_FAILURE,
        None => EXIT_GENERIC_FAILURE,
    }
}

/// Runs one shell line through the same command tree as the one-shot CLI.
async fn execute_line(session: &Session, argv: Vec<String>) -> Result<()> {
    let args = Args::try_parse_from(argv)?;
    match args.cmd {
        Some(Command::Shell) => bail!("already inside the {} shell", shell::PROGRAM_NAME),
        Some(cmd) => execute(session, cmd).await,
        None => Ok(()),
    }
}

async fn execute(session: &Session, cmd: Command) -> Result<()> {
    let client = &session.client;
    match cmd {
        Command::Apply { file, dry_run } => run_apply(session, &file, dry_run).await,
        Command::Index { cmd } => run_index(client, cmd).await,
        Command::Search { cmd } => run_search(client, cmd).await,
        Command::Alias { cmd } => run_alias(client, cmd).await,
        Command::Cat { cmd } => run_cat(client, cmd).await,
        Command::Shell => bail!("the shell cannot be started from here"),
        Command::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            write_shell_completion(shell, &mut stdout)
        }
    }
}

fn write_shell_completion<W: Write>(shell: Shell, writer: &mut W) -> Result<()> {
    let mut cmd = Args::command();
    let bin_name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, bin_name, writer);
    writer.flush()?;
    Ok(())
}

async fn run_apply(session: &Session, source: &str, dry_run: bool) -> Result<()> {
    let bytes = read_manifest(source).await?;

    if dry_run {
        let plan = session.registry.plan(&bytes)?;
        println!("kind: {}", plan.kind);
        for action in &plan.actions {
            println!("  {}", action);
        }
        return Ok(());
    }

    session.registry.apply(&session.client, &bytes).await?;
    println!("applied {}", source);
    Ok(())
}

async fn run_index(client: &Client, cmd: IndexCmd) -> Result<()> {
    let v = match cmd {
        IndexCmd::Create {
            name,
            shards,
            replicas,
        } => {
            let mut settings = serde_json::Map::new();
            if let Some(n) = shards {
                settings.insert("number_of_shards".into(), n.into());
            }
            if let Some(n) = replicas {
                settings.insert("number_of_replicas".into(), n.into());
            }
            let body = (!settings.is_empty())
                .then(|| serde_json::json!({ "settings": { "index": settings } }));
            client
                .send_json(Method::PUT, &format!("/{}", encode_segment(&name)), body)
                .await?
        }
        IndexCmd::Delete { name } => {
            client
                .send_json(Method::DELETE, &format!("/{}", encode_segment(&name)), None)
                .await?
        }
        IndexCmd::Get { name } => {
            client
                .send_json(Method::GET, &format!("/{}", encode_segment(&name)), None)
                .await?
        }
        IndexCmd::Settings { name } => {
            client
                .send_json(
                    Method::GET,
                    &format!("/{}/_settings", encode_segment(&name)),
                    None,
                )
                .await?
        }
    };
    print_json_value(&v)
}

async fn run_search(client: &Client, cmd: SearchCmd) -> Result<()> {
    let v = match cmd {
        SearchCmd::ById { index, id } => {
            client
                .send_json(
                    Method::GET,
                    &format!("/{}/_doc/{}", encode_segment(&index), encode_segment(&id)),
                    None,
                )
                .await?
        }
        SearchCmd::ByQuery { index, query, size } => {
            client
                .send_json(
                    Method::GET,
                    &format!(
                        "/{}/_search?q={}&size={}",
                        encode_segment(&index),
                        encode_query(&query),
                        size
                    ),
                    None,
                )
                .await?
        }
    };
    print_json_value(&v)
}

async fn run_alias(client: &Client, cmd: AliasCmd) -> Result<()> {
    let v = match cmd {
        AliasCmd::Add { index, alias } => {
            let body = serde_json::json!({
                "actions": [{ "add": { "index": index, "alias": alias } }]
            });
            client
                .send_json(Method::POST, "/_aliases", Some(body))
                .await?
        }
        AliasCmd::Remove { index, alias } => {
            let body = serde_json::json!({
                "actions": [{ "remove": { "index": index, "alias": alias } }]
            });
            client
                .send_json(Method::POST, "/_aliases", Some(body))
                .await?
        }
        AliasCmd::List { index } => {
            let path = match index {
                Some(index) => format!("/{}/_alias", encode_segment(&index)),
                None => "/_alias".to_string(),
            };
            client.send_json(Method::GET, &path, None).await?
        }
    };
    print_json_value(&v)
}

async fn run_cat(client: &Client, cmd: CatCmd) -> Result<()> {
    let path = format!("/_cat/{}?v=true", cmd.endpoint());
    let text = client.send(Method::GET, &path, None).await?;
    print!("{}", text);
    Ok(())
}

async fn read_manifest(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read manifest from stdin")?;
        return Ok(buf);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        let bytes = reqwest::get(source)
            .await
            .with_context(|| format!("Failed to fetch URL source {}", source))?
            .error_for_status()
            .with_context(|| format!("HTTP error fetching {}", source))?
            .bytes()
            .await
            .with_context(|| format!("Failed to read URL response {}", source))?;
        return Ok(bytes.to_vec());
    }
    fs::read(source).with_context(|| format!("Failed to read manifest {}", source))
}

fn print_json_value(v: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}
