use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use std::io::Write;

#[derive(Parser)]
#[command(name = "walrus-cli")]
#[command(about = "Client for the Walrus API server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token sent with every request.
    #[arg(short, long)]
    token: Option<String>,

    #[arg(long, default_value = "/v1")]
    base_path: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server liveness
    Livez,
    /// List registered routes
    Routes {
        /// Print the raw catalog JSON
        #[arg(long)]
        json: bool,
    },
    /// GET a path under the base path
    Get { path: String },
    /// Follow a watch stream under the base path
    Watch { path: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
    }
    let base = format!("{}{}", cli.url.trim_end_matches('/'), cli.base_path);

    match cli.command {
        Commands::Livez => {
            let res = client
                .get(format!("{}/livez", cli.url.trim_end_matches('/')))
                .headers(headers)
                .send()
                .await?;
            println!("{}", res.status());
        }
        Commands::Routes { json } => {
            let res = client
                .get(format!("{}/routes", base))
                .headers(headers)
                .send()
                .await?;
            let Some(catalog) = read_json(res).await? else {
                return Ok(());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&catalog)?);
            } else {
                print_routes(&catalog);
            }
        }
        Commands::Get { path } => {
            let res = client
                .get(format!("{}{}", base, path))
                .headers(headers)
                .send()
                .await?;
            if let Some(body) = read_json(res).await? {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
        }
        Commands::Watch { path } => {
            let res = client
                .get(format!("{}{}", base, path))
                .query(&[("watch", "true")])
                .headers(headers)
                .send()
                .await?;
            if !res.status().is_success() {
                report_failure(res).await;
                return Ok(());
            }
            let mut chunks = res.bytes_stream();
            let mut stdout = std::io::stdout();
            while let Some(chunk) = chunks.next().await {
                stdout.write_all(&chunk?)?;
                stdout.write_all(b"\n")?;
                stdout.flush()?;
            }
        }
    }

    Ok(())
}

async fn read_json(res: reqwest::Response) -> Result<Option<Value>, Box<dyn std::error::Error>> {
    if !res.status().is_success() {
        report_failure(res).await;
        return Ok(None);
    }
    Ok(Some(res.json().await?))
}

async fn report_failure(res: reqwest::Response) {
    eprintln!("Error: server returned status {}", res.status());
    if let Ok(text) = res.text().await {
        eprintln!("Response: {}", text);
    }
}

fn print_routes(catalog: &Value) {
    let Some(routes) = catalog.as_array() else {
        return;
    };
    for route in routes {
        let field = |name: &str| route.get(name).and_then(Value::as_str).unwrap_or("");
        println!("{:<7} {:<48} {}", field("method"), field("path"), field("summary"));
    }
}
