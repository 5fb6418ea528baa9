//! # rag-agent CLI (`ragent`)
//!
//! ## Usage
//!
//! ```bash
//! ragent --config ./config/ragent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragent index` | Load, chunk and embed the documents; print stats |
//! | `ragent ask "<question>"` | Answer a question from the documents |
//! | `ragent agent "<message>"` | Run one agent turn |
//! | `ragent chat` | Interactive agent session |
//! | `ragent extract <person\|ticket> "<text>"` | Structured extraction |
//! | `ragent tools` | List the available tools |
//! | `ragent serve` | Start the HTTP server |
//! | `ragent completions <shell>` | Print shell completions |

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand};
use rag_agent::config::{load_config, Config};
use rag_agent::embedding::create_provider;
use rag_agent::llm::OpenAiChatModel;
use rag_agent::runtime::{build_index, Runtime};
use rag_agent::server::run_server;
use rag_agent::structured::extract_named;
use rag_agent_core::memory::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Retrieval-augmented answers and a tool-calling agent over local documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragent.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "ragent", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragent.toml")]
    config: PathBuf,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk and embed the configured documents, then print stats.
    Index,

    /// Answer a question from the documents (one retrieval, one model call).
    Ask {
        question: String,
    },

    /// Run one agent turn.
    Agent {
        message: String,

        /// Conversation thread to continue.
        #[arg(long, default_value = "cli")]
        thread: String,
    },

    /// Interactive agent session. Type `reset` for a new thread, `quit` to exit.
    Chat {
        /// Conversation thread to start on. Defaults to a fresh id.
        #[arg(long)]
        thread: Option<String>,
    },

    /// Extract structured data from text.
    Extract {
        /// Schema name: `person` or `ticket`.
        schema: String,
        text: String,
    },

    /// List the tools available to the agent.
    Tools,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Print shell completions.
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ragent", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Index => run_index(&cfg).await?,
        Commands::Ask { question } => run_ask(cfg, &question).await?,
        Commands::Agent { message, thread } => {
            let runtime = Runtime::build(cfg).await?;
            let outcome = runtime.agent.run(&runtime.memory, &thread, &message).await?;
            for call in &outcome.invocations {
                eprintln!("  ↳ {}({}) -> {}", call.name, call.arguments, call.output);
            }
            println!("{}", outcome.answer);
        }
        Commands::Chat { thread } => run_chat(cfg, thread).await?,
        Commands::Extract { schema, text } => {
            let model = OpenAiChatModel::from_config(&cfg.llm)?;
            let value = extract_named(&model, &schema, &text).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Tools => {
            let runtime = Runtime::build(cfg).await?;
            for tool in runtime.agent.tools().tools() {
                println!("{:<18} {}", tool.name(), tool.description());
            }
        }
        Commands::Serve => {
            let runtime = Runtime::build(cfg).await?;
            run_server(Arc::new(runtime)).await?;
        }
        Commands::Completions { .. } => unreachable!(),
    }

    Ok(())
}

async fn run_index(cfg: &Config) -> Result<()> {
    if !cfg.embedding.is_enabled() {
        bail!("Embeddings are disabled. Set [embedding].provider in the config.");
    }
    let provider = create_provider(&cfg.embedding)?;
    let (_, stats) = build_index(cfg, provider.as_ref()).await?;
    println!("Documents: {}", stats.documents);
    println!("Chunks:    {}", stats.chunks);
    println!("Model:     {} ({} dims)", stats.model, stats.dims);
    Ok(())
}

async fn run_ask(cfg: Config, question: &str) -> Result<()> {
    let runtime = Runtime::build(cfg).await?;
    let Some(rag) = &runtime.rag else {
        bail!("Embeddings are disabled. Set [embedding].provider in the config.");
    };
    let answer = rag.answer(question).await?;
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for hit in &answer.sources {
            println!(
                "  {:.3}  {} (chunk {})",
                hit.score, hit.chunk.source, hit.chunk.position
            );
        }
    }
    Ok(())
}

async fn run_chat(cfg: Config, thread: Option<String>) -> Result<()> {
    let runtime = Runtime::build(cfg).await?;
    let memory: &MemoryStore = &runtime.memory;
    let mut thread_id = thread.unwrap_or_else(|| Uuid::new_v4().to_string());

    println!("Thread {}. Type `reset` for a new thread, `quit` to exit.", thread_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "quit" | "exit" => break,
            "reset" => {
                thread_id = Uuid::new_v4().to_string();
                println!("New thread {}", thread_id);
                continue;
            }
            _ => {}
        }

        match runtime.agent.run(memory, &thread_id, input).await {
            Ok(outcome) => {
                for call in &outcome.invocations {
                    println!("  ↳ {}({}) -> {}", call.name, call.arguments, call.output);
                }
                println!("{}", outcome.answer);
            }
            Err(e) => eprintln!("Error: {}", e),
        }
    }
    Ok(())
}
