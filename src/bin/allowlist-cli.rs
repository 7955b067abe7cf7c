use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use allowlist_proxy::allowlist::{compile, AllowlistCompiler, CompiledAllowlist};
use allowlist_proxy::Allowlist;

#[derive(Parser)]
#[command(name = "allowlist-cli")]
#[command(about = "Inspect allowlist feeds the way the proxy compiles them", long_about = None)]
struct Cli {
    /// Feed connect timeout in milliseconds.
    #[arg(long, default_value_t = 1000)]
    connect_timeout_ms: u64,

    /// Feed read timeout in milliseconds.
    #[arg(long, default_value_t = 6000)]
    read_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a feed (URL or local file) and list its entries
    Compile {
        source: String,
        /// Print entries as a JSON document
        #[arg(long)]
        json: bool,
    },
    /// Check whether an address would be allowed to write
    Check { source: String, address: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let timeouts = (
        Duration::from_millis(cli.connect_timeout_ms),
        Duration::from_millis(cli.read_timeout_ms),
    );

    match cli.command {
        Commands::Compile { source, json } => {
            let compiled = load(&source, timeouts).await?;
            let entries: Vec<String> = compiled.sorted().iter().map(ToString::to_string).collect();
            if json {
                let doc = serde_json::json!({
                    "source": source,
                    "count": entries.len(),
                    "skipped": compiled.skipped,
                    "entries": entries,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                for entry in &entries {
                    println!("{entry}");
                }
                eprintln!("{} entries ({} tokens skipped)", entries.len(), compiled.skipped);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { source, address } => {
            let compiled = load(&source, timeouts).await?;
            let allowlist = Allowlist::with_ranges(compiled.ranges);
            if allowlist.check_str(&address) {
                println!("{address}: allowed");
                Ok(ExitCode::SUCCESS)
            } else {
                println!("{address}: denied");
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

async fn load(
    source: &str,
    (connect_timeout, read_timeout): (Duration, Duration),
) -> Result<CompiledAllowlist, Box<dyn std::error::Error>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let compiler = AllowlistCompiler::with_url(source, connect_timeout, read_timeout)?;
        Ok(compiler.refresh().await?)
    } else {
        let text = std::fs::read_to_string(Path::new(source))?;
        Ok(compile(&text))
    }
}
