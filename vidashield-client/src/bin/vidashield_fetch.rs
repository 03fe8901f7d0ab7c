//! `vidashield-fetch --config <file> <path>[?query]`
//!
//! Performs one authenticated GET through the request cache and prints the
//! response as pretty JSON.

use std::process::ExitCode;
use std::sync::Arc;
use vidashield_cache::RequestOptions;
use vidashield_client::telemetry::{init_tracing, DEFAULT_FILTER};
use vidashield_client::{ClientConfig, ClientError, ResourceKey, RestClient, SessionStore};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vidashield-fetch: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ClientError> {
    let config = ClientConfig::load()?;
    init_tracing(DEFAULT_FILTER)?;

    let Some(target) = resource_arg() else {
        return Err(ClientError::Usage(
            "usage: vidashield-fetch --config <file> <path>[?query]".to_string(),
        ));
    };

    let session = match &config.auth.bearer_token {
        Some(token) => SessionStore::with_token(token.as_str()),
        None => SessionStore::new(),
    };
    let client = RestClient::new(&config, Arc::new(session))?;

    let key = ResourceKey::parse(&target);
    tracing::debug!(key = %key, "Fetching resource");
    let read = client
        .get_json::<serde_json::Value>(&key, RequestOptions::new())
        .await?;

    println!("{}", serde_json::to_string_pretty(read.value())?);
    Ok(())
}

/// First positional argument that is not the value of `--config`.
fn resource_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        if !arg.starts_with("--") {
            return Some(arg);
        }
    }
    None
}
