use dashboard::api::server;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Values in .env fill in anything not already set in the environment
    dotenv::dotenv().ok();

    // RUST_LOG=debug for per-read tracing, RUST_LOG=info for normal output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // BIND_ADDRESS=127.0.0.1:3001 for local-only access
    let addr = env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3001".to_string());

    log::info!("Starting Beaglegaze dashboard API on {}", addr);
    server::start_server(&addr).await?;
    Ok(())
}
