#![cfg(not(tarpaulin_include))]

use formsheet::app;
use formsheet::config::Config;

/// Entry point for the form submission server.
///
/// Settings come from the environment (see [`Config`]); the first command
/// line argument, if any, overrides the bind address.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut config = Config::from_env()?;
    if let Some(addr) = std::env::args().nth(1) {
        config = config.with_addr(&addr)?;
    }

    app::run(config).await
}
