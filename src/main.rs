use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use weft_core::config::AppConfig;
use weft_core::types::{Execution, ExecutionFilter, ExecutionId, ExecutionStatus, OwnerId};
use weft_engine::{ExecutionEngine, GraphDefinition, HttpToolExecutor};
use weft_llm::{Capability, ModelGateway};

#[derive(Parser)]
#[command(name = "weft", version, about = "Workflow graphs over many model providers")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "weft.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow graph and wait for it to finish
    Run {
        /// Graph definition (JSON)
        graph: PathBuf,
        /// Owner the run is recorded under
        #[arg(long, default_value = "local")]
        owner: String,
        /// Input variable, repeatable (KEY=VALUE)
        #[arg(long = "var", value_name = "KEY=VALUE")]
        vars: Vec<String>,
    },
    /// Check a graph without running it
    Validate {
        graph: PathBuf,
    },
    /// Show a stored execution
    Show {
        id: String,
    },
    /// List stored executions
    List {
        #[arg(long, default_value = "local")]
        owner: String,
        /// pending, running, completed, failed or cancelled
        #[arg(long)]
        status: Option<ExecutionStatus>,
        #[arg(long)]
        graph: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Mark a stored, unfinished execution as cancelled
    Cancel {
        id: String,
    },
    /// List providers and their models
    Providers,
    /// Price a call without making it
    Cost {
        provider: String,
        model: String,
        input_tokens: u64,
        output_tokens: u64,
    },
    /// Approximate token count of some text
    Tokens {
        provider: String,
        #[arg(trailing_var_arg = true, required = true)]
        text: Vec<String>,
    },
    /// Suggest a model for a capability (fast, balanced, reasoning, coding, long-context, cheap)
    Recommend {
        capability: String,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("weft=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "weft", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;
    let gateway = Arc::new(weft_llm::gateway_from_config(&config));

    match cli.command {
        Commands::Run { graph, owner, vars } => {
            let graph = GraphDefinition::load(&graph)?;
            let variables = parse_vars(&vars)?;
            let engine = build_engine(&config, gateway)?;
            run_graph(&engine, &graph, OwnerId::new(owner), variables).await?;
        }
        Commands::Validate { graph } => {
            let graph = GraphDefinition::load(&graph)?;
            let engine = build_engine(&config, gateway)?;
            let compiled = engine.compile(&graph)?;
            let entry = compiled.node(compiled.entry());
            println!(
                "{}: {} nodes, {} edges, entry '{}' ({})",
                graph.id,
                compiled.nodes().len(),
                compiled.edge_count(),
                entry.id,
                entry.kind.name()
            );
        }
        Commands::Show { id } => {
            let engine = build_engine(&config, gateway)?;
            let execution = engine.get(&ExecutionId::from_string(&id)).await?;
            print_execution(&execution)?;
        }
        Commands::List {
            owner,
            status,
            graph,
            limit,
        } => {
            let engine = build_engine(&config, gateway)?;
            let filter = ExecutionFilter {
                status,
                graph_id: graph,
                limit: Some(limit),
            };
            let executions = engine.list(&OwnerId::new(owner), &filter).await?;
            if executions.is_empty() {
                println!("No executions found.");
            }
            for e in &executions {
                println!(
                    "{}  {:<10} {:<20} {}",
                    e.id,
                    e.status.as_str(),
                    truncate(&e.graph_id, 20),
                    e.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        Commands::Cancel { id } => {
            let engine = build_engine(&config, gateway)?;
            let execution = engine.cancel(&ExecutionId::from_string(&id)).await?;
            println!("{}: {}", execution.id, execution.status);
        }
        Commands::Providers => {
            for provider in gateway.providers() {
                let configured = match config.providers.get(&provider.id) {
                    Some(p) if p.api_key.is_some() => "configured",
                    _ => "no credentials",
                };
                println!("{} ({}) [{}]", provider.id, provider.display_name, configured);
                for model in &provider.models {
                    println!(
                        "  {:<34} ctx {:>8}  ${} / ${} per 1M tokens",
                        model.id,
                        model.context_window,
                        model.pricing.input_per_mtok(),
                        model.pricing.output_per_mtok()
                    );
                }
            }
        }
        Commands::Cost {
            provider,
            model,
            input_tokens,
            output_tokens,
        } => {
            let Some(adapter) = gateway.adapter(&provider) else {
                bail!("unknown provider '{}'", provider);
            };
            if !adapter.list_models().iter().any(|m| m.id == model) {
                warn!(provider = %provider, model = %model, "Model has no price entry, cost is 0");
            }
            let cost = gateway.estimate_cost(&provider, &model, input_tokens, output_tokens);
            println!("${}", cost);
        }
        Commands::Tokens { provider, text } => {
            let count = gateway.count_tokens(&provider, &text.join(" "));
            println!("~{} tokens (approximate)", count);
        }
        Commands::Recommend { capability } => match gateway.recommended_model(&capability) {
            Some(model) => println!("{}/{}", model.provider, model.model),
            None => {
                let known: Vec<&str> = Capability::all().iter().map(|c| c.as_str()).collect();
                bail!(
                    "unknown capability '{}' (expected one of: {})",
                    capability,
                    known.join(", ")
                );
            }
        },
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Completions { .. } => unreachable!("handled before config load"),
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }
    let home_config = dirs_home().map(|h| h.join(".weft").join("config.toml"));
    match home_config {
        Some(ref home) if home.exists() => {
            info!(path = %home.display(), "Loading config from home directory");
            Ok(AppConfig::load(home)?)
        }
        _ => {
            warn!(path = %path.display(), "No config file found, using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn build_engine(config: &AppConfig, gateway: Arc<ModelGateway>) -> anyhow::Result<ExecutionEngine> {
    let store = weft_store::open_store(&config.store)?;
    let credentials = Arc::new(config.providers.clone());
    let mut engine = ExecutionEngine::new(config.engine.clone(), gateway, store, credentials);
    if let Some(tools) = HttpToolExecutor::from_config(&config.tools)? {
        engine.set_tool_executor(Arc::new(tools));
    }
    Ok(engine)
}

async fn run_graph(
    engine: &ExecutionEngine,
    graph: &GraphDefinition,
    owner: OwnerId,
    variables: Map<String, Value>,
) -> anyhow::Result<()> {
    let started = engine.start(graph, owner, variables).await?;
    eprintln!("Started execution {}", started.id);

    let execution = tokio::select! {
        done = engine.wait(&started.id) => done?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling {}", started.id);
            engine.cancel(&started.id).await?;
            engine.wait(&started.id).await?
        }
    };

    print_execution(&execution)?;
    match execution.status {
        ExecutionStatus::Completed => Ok(()),
        status => bail!(
            "execution {} {}: {}",
            execution.id,
            status,
            execution.error.as_deref().unwrap_or("no error recorded")
        ),
    }
}

fn print_execution(execution: &Execution) -> anyhow::Result<()> {
    println!("Execution {}", execution.id);
    println!("  graph:   {}", execution.graph_id);
    println!("  owner:   {}", execution.owner);
    println!("  status:  {}", execution.status);
    if let Some(node) = &execution.current_node {
        println!("  node:    {}", node);
    }
    if let Some(err) = &execution.error {
        println!("  error:   {}", err);
    }
    let usage = &execution.usage;
    println!(
        "  usage:   {} calls, {} in / {} out tokens, ${}",
        usage.calls, usage.input_tokens, usage.output_tokens, usage.cost
    );

    let mut ids: Vec<&String> = execution.results.keys().collect();
    ids.sort();
    let ordered: Map<String, Value> = ids
        .into_iter()
        .map(|id| (id.clone(), execution.results[id].clone()))
        .collect();
    println!("{}", serde_json::to_string_pretty(&ordered)?);
    Ok(())
}

fn parse_vars(pairs: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut vars = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("invalid --var '{}', expected KEY=VALUE", pair))?;
        vars.insert(key.trim().to_string(), Value::String(value.to_string()));
    }
    Ok(vars)
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
