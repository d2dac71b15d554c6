use waypost_server::{config::Config, run_server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waypost_server=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    run_server(config).await
}
