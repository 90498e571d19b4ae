/// Sonora - sound community moderation and API backend
///
/// Serves the public sound/user API, the support and moderation ticket
/// pages, and the front page data.

mod account;
mod api;
mod auth;
mod cache;
mod config;
mod context;
mod db;
mod error;
mod metrics;
mod pagination;
mod rate_limit;
mod server;
mod sounds;
mod tickets;
mod urls;
mod views;

use config::{LoggingConfig, ServerConfig};
use context::AppContext;
use error::SonoraResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> SonoraResult<()> {
    let config = ServerConfig::from_env()?;
    init_tracing(&config.logging);

    print_banner();

    let ctx = AppContext::new(config).await?;

    let removed = ctx.account_manager.cleanup_expired_sessions().await?;
    if removed > 0 {
        tracing::info!("Removed {} expired sessions", removed);
    }

    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_banner() {
    println!(
        r#"
   _____
  / ___/____  ____  ____  _________ _
  \__ \/ __ \/ __ \/ __ \/ ___/ __ `/
 ___/ / /_/ / / / / /_/ / /  / /_/ /
/____/\____/_/ /_/\____/_/   \__,_/

        Sound community backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
