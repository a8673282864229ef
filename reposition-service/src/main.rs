use reposition_service::{build_runner, create_app};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "reposition_service=debug,reposition_flow=debug,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if std::env::var("OPENROUTER_API_KEY").is_err() {
        warn!("OPENROUTER_API_KEY not set; only dry_run analyses will succeed");
    }

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .unwrap_or(3000);

    let app = create_app(build_runner());
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let addr = listener.local_addr()?;

    info!("Drug Repositioning Analysis Service running on http://{addr}");
    info!("Start an analysis: POST http://{addr}/analyze");
    info!("Follow progress:   GET  http://{addr}/analysis/{{session_id}}/events");

    axum::serve(listener, app).await?;

    Ok(())
}
