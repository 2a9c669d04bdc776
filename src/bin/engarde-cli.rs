use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "engarde-cli")]
#[command(about = "Management CLI for an EnGarde domain", long_about = None)]
struct Cli {
    /// Base URL of the admin listener
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,

    #[arg(short, long, env = "ENGARDE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Domain status and hosted applications
    Status,
    /// List the compiled routes of an application
    Routes { app: String },
    /// Force an application to recompile its route table
    Rebuild { app: String },
    /// Recent security activity of an application
    Activity {
        app: String,
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Routes { app } => client.get(format!("{base}/admin/apps/{app}/routes")),
        Commands::Rebuild { app } => {
            client.post(format!("{base}/admin/apps/{app}/routes/rebuild"))
        }
        Commands::Activity { app, limit } => client
            .get(format!("{base}/admin/apps/{app}/activity"))
            .query(&[("limit", limit)]),
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
