use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Status CLI for the RPC gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway liveness and group availability
    Status,
    /// List endpoint health per chain
    Endpoints {
        /// Only show this chain
        #[arg(long)]
        chain: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Status => {
            let res = client.get(format!("{}/health", cli.url)).send().await?;
            if let Some(json) = read_json(res).await? {
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
        }
        Commands::Endpoints { chain } => {
            let res = client.get(format!("{}/status", cli.url)).send().await?;
            if let Some(json) = read_json(res).await? {
                print_endpoints(&json, chain);
            }
        }
    }

    Ok(())
}

async fn read_json(res: reqwest::Response) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(None);
    }
    Ok(Some(res.json().await?))
}

fn print_endpoints(status: &Value, chain: Option<u64>) {
    let groups = status["groups"].as_array().cloned().unwrap_or_default();
    for group in groups {
        let chain_id = group["chain_id"].as_u64().unwrap_or_default();
        if chain.is_some_and(|c| c != chain_id) {
            continue;
        }
        let last_used = group["last_used"].as_str().unwrap_or("-");
        println!(
            "chain {} (sticky: {}, sessions: {}, last used: {})",
            chain_id, group["sticky"], group["sessions"], last_used
        );

        for endpoint in group["endpoints"].as_array().cloned().unwrap_or_default() {
            println!(
                "  {:<10} {:>8.2}  {:<12} {}",
                endpoint["state"].as_str().unwrap_or("?"),
                endpoint["score"].as_f64().unwrap_or_default(),
                endpoint["provider"].as_str().unwrap_or("?"),
                endpoint["url"].as_str().unwrap_or("?"),
            );
        }
    }
}
