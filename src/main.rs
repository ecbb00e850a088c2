use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use podium::{api, db, judging};

#[derive(Parser)]
#[command(name = "podium")]
#[command(about = "Hackathon judging server: fair assignment and rank aggregation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Podium server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "podium=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(port: u16) -> anyhow::Result<()> {
    let db = db::Database::open_default()?;
    db.migrate()?;

    // Rebuild the pairwise comparison matrix from judging history; a
    // failure here is fatal since assignment depends on it.
    let comps = Arc::new(judging::Comparisons::load(&db)?);

    let app = api::create_router(db, comps);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Podium server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port }) => {
            tracing::info!("Starting Podium server on port {}", port);
            serve(port).await?;
        }
        None => {
            // Default: start server
            tracing::info!("Starting Podium server on port 3000");
            serve(3000).await?;
        }
    }

    Ok(())
}
