mod app;
mod rpc;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::info;

use hearth_config::{config_dir, config_file_path, load_and_prepare};
use hearth_config::defaults::DEFAULT_LOG_LEVEL;
use hearth_logging::init_logger;
use hearth_security::expand_user;

use app::{ambient_context, Runtime};

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Hearth - a local-first assistant that plans, asks, acts and learns")]
#[command(version)]
struct Cli {
    /// Config file to load instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-RPC requests on stdin/stdout
    Serve,
    /// Run a single turn and print the reply
    Ask {
        message: String,
        /// Print tokens as they arrive
        #[arg(long)]
        stream: bool,
    },
    /// Print the ambient context as JSON
    Context,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli
        .config
        .unwrap_or_else(|| config_file_path(&config_dir()));
    let config = load_and_prepare(&path).await?;

    let logging = config.logging.clone().unwrap_or_default();
    let log_dir = logging.dir.as_deref().map(expand_user);
    let _guard = init_logger(
        log_dir.as_deref(),
        logging.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
        logging.json.unwrap_or(false),
    )?;
    info!(config = %path.display(), "Configuration loaded");

    match cli.command {
        Commands::Serve => {
            let runtime = Arc::new(Runtime::build(&config).await?);
            server::serve(runtime, tokio::io::stdin(), tokio::io::stdout()).await?;
            info!("Server stopped");
        }
        Commands::Ask { message, stream } => {
            let runtime = Runtime::build(&config).await?;
            let (_, state) = runtime.sessions.get_or_create(None).await;
            let mut state = state.lock().await;

            let result = if stream {
                let (tx, mut rx) = mpsc::unbounded_channel::<String>();
                let printer = tokio::spawn(async move {
                    let mut stdout = tokio::io::stdout();
                    let mut printed = false;
                    while let Some(token) = rx.recv().await {
                        printed = true;
                        if stdout.write_all(token.as_bytes()).await.is_err() {
                            break;
                        }
                        let _ = stdout.flush().await;
                    }
                    printed
                });
                let result = runtime
                    .pipeline
                    .process_message(&mut state, &message, Some(&tx))
                    .await;
                drop(tx);
                if printer.await.unwrap_or(false) {
                    println!();
                } else {
                    println!("{}", result.content);
                }
                result
            } else {
                let result = runtime.pipeline.process_message(&mut state, &message, None).await;
                println!("{}", result.content);
                result
            };

            if let Some(approval) = &result.pending_approval {
                println!();
                println!(
                    "(approval {} is pending; use `hearth serve` and respond_approval to continue)",
                    approval.id
                );
            }
        }
        Commands::Context => {
            println!("{}", serde_json::to_string_pretty(&ambient_context())?);
        }
    }

    Ok(())
}
