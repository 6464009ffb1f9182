use anyhow::{Context, Result};

use cloud_auth_transport::auth::TokenOptions;
use cloud_auth_transport::config::Config;
use cloud_auth_transport::AuthenticatedTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;

    // Logs go to stderr, stdout only carries the token or response body
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(
        token_url = %config.transport.token_url,
        identity = config.transport.identity.describe(),
        "Configuration loaded"
    );

    let transport = AuthenticatedTransport::connect(&config.transport)
        .context("Failed to create authenticated transport")?;

    let options = TokenOptions::new()
        .min_validity(config.min_validity)
        .timeout(config.timeout);
    let pair = transport
        .tokens()
        .tokens_with(options)
        .await
        .context("Failed to obtain tokens")?;

    match &config.get_url {
        Some(url) => {
            let url: reqwest::Url = url
                .parse()
                .with_context(|| format!("Invalid URL: {}", url))?;
            let response = transport.get(url).await?;
            let status = response.status();
            let body = response.text().await.context("Failed to read response")?;
            if !status.is_success() {
                tracing::error!(status = status.as_u16(), "Request failed");
            }
            println!("{}", body);
        }
        None if config.print_refresh => {
            if pair.refresh_token.is_empty() {
                anyhow::bail!("No refresh token available");
            }
            println!("{}", pair.refresh_token);
        }
        None => println!("{}", pair.access_token),
    }

    transport.close().await;
    Ok(())
}
