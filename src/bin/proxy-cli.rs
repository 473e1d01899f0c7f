use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the transparent proxy dashboard API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8088")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the proxy is up
    Health,
    /// Request statistics for a time range
    Stats {
        /// Range start, Unix seconds (default: one hour ago)
        #[arg(long)]
        start: Option<f64>,
        /// Range end, Unix seconds (default: now)
        #[arg(long)]
        end: Option<f64>,
        /// Number of recent requests to include (0 = all)
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// List recent errors
    Errors {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Case-insensitive substring of the request path
        #[arg(long)]
        path: Option<String>,
    },
    /// Show the effective configuration
    Config,
    /// Replace the custom header overrides (NAME=VALUE, repeatable; none clears)
    SetHeaders {
        #[arg(value_name = "NAME=VALUE")]
        headers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client.get(format!("{}/api/admin/health", base)).send().await?;
            print_response(res).await?;
        }
        Commands::Stats { start, end, limit } => {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(start) = start {
                query.push(("start_time", start.to_string()));
            }
            if let Some(end) = end {
                query.push(("end_time", end.to_string()));
            }
            let res = client
                .get(format!("{}/api/admin/stats", base))
                .query(&query)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Errors { limit, offset, path } => {
            let mut query = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
            if let Some(path) = path {
                query.push(("path_filter", path));
            }
            let res = client
                .get(format!("{}/api/admin/errors", base))
                .query(&query)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Config => {
            let res = client.get(format!("{}/api/admin/config", base)).send().await?;
            print_response(res).await?;
        }
        Commands::SetHeaders { headers } => {
            let mut map = Map::new();
            for pair in headers {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", pair))?;
                map.insert(name.trim().to_string(), Value::String(value.to_string()));
            }
            let res = client
                .put(format!("{}/api/admin/config", base))
                .json(&json!({ "custom_headers": map }))
                .send()
                .await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
