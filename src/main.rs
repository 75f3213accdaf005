use binja_bridge::binja::{self, Dispatcher};
use binja_bridge::{config, logging, serve};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "binja-bridge")]
#[command(about = "Query a running Binary Ninja HTTP server with normalized, cached results")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/binja-bridge/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Upstream base URL, overriding config and BINJA_URL
  #[arg(short, long)]
  url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run one operation and print its JSON result
  Call {
    /// Operation name or alias (see `operations`)
    operation: String,
    /// Operation arguments as a JSON object
    #[arg(short, long, default_value = "{}")]
    args: String,
  },
  /// Check that the upstream server is reachable
  Health,
  /// List available operations
  Operations,
  /// Read JSON requests from stdin, one per line, and answer on stdout
  Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Override upstream if specified on command line
  if let Some(url) = &args.url {
    config.apply_url(url);
    config.validate()?;
  }

  let guard = logging::init(&config.log)?;

  if let Command::Operations = args.command {
    for op in binja::OPERATIONS {
      let aliases = if op.aliases.is_empty() {
        String::new()
      } else {
        format!(" ({})", op.aliases.join(", "))
      };
      println!("{:<24}{}{}", op.name, op.description, aliases);
    }
    return Ok(());
  }

  let dispatcher = Dispatcher::from_config(&config)?;
  tracing::info!(upstream = %config.upstream.url, "bridge ready");

  match args.command {
    Command::Call { operation, args } => {
      let args: Value =
        serde_json::from_str(&args).map_err(|e| eyre!("Invalid --args JSON: {}", e))?;
      let result = dispatcher.dispatch(&operation, args).await;
      print_result(&result)?;
    }
    Command::Health => {
      let result = dispatcher.health().await.into_value();
      print_result(&result)?;
      if result.get("ok") != Some(&Value::Bool(true)) {
        drop(guard);
        std::process::exit(1);
      }
    }
    Command::Serve => {
      let stdin = tokio::io::BufReader::new(tokio::io::stdin());
      serve::run(&dispatcher, stdin, tokio::io::stdout()).await?;
    }
    Command::Operations => {}
  }

  drop(guard);
  Ok(())
}

fn print_result(result: &Value) -> Result<()> {
  let text =
    serde_json::to_string_pretty(result).map_err(|e| eyre!("Failed to encode result: {}", e))?;
  println!("{}", text);
  Ok(())
}
