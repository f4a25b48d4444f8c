//! Subcommand execution
//!
//! Wiring order: state store, issuer provider, token manager, API client. Only
//! `StateStore::load` touches disk up front; the issuer is resolved on the
//! first refresh.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use hubstaff_api::ApiClient;
use hubstaff_auth::{OidcIssuerProvider, StateStore, TokenManager, TokenPair, TokenStatus};
use serde_json::{Map, Value, json};
use tracing::info;

use crate::cli::Command;
use crate::config::Config;
use crate::error::Error;

/// Path of the current user's profile
const ME_PATH: &str = "v2/users/me";

/// Everything a subcommand needs, built once per invocation.
pub struct App {
    pub manager: Arc<TokenManager>,
    pub api: ApiClient,
}

impl App {
    pub async fn build(config: &Config) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let store = StateStore::load(config.state.path.clone())
            .await
            .map_err(Error::LoadState)?;
        let store = Arc::new(store);

        let mut issuer = OidcIssuerProvider::new(http.clone())
            .with_ttl(Duration::from_secs(config.issuer.metadata_ttl_secs));
        if let Some(dir) = &config.issuer.cache_dir {
            issuer = issuer.with_cache_dir(dir.clone());
        }

        let api_base_url = store.api_base_url().await;
        info!(
            state = %store.path().display(),
            api_base_url = %api_base_url,
            "state loaded"
        );

        let manager = Arc::new(TokenManager::new(store, Arc::new(issuer)));
        let api = ApiClient::new(http, api_base_url, manager.clone());
        Ok(Self { manager, api })
    }
}

/// Run one subcommand, writing its JSON output to `out`.
pub async fn execute(app: &App, command: Command, out: &mut dyn Write) -> anyhow::Result<()> {
    match command {
        Command::Me => {
            let body = app.api.get(ME_PATH, &[]).await.map_err(Error::from)?;
            print_json(out, &body)
        }
        Command::Get { path, params } => {
            let body = app.api.get(&path, &params).await.map_err(Error::from)?;
            print_json(out, &body)
        }
        Command::Post { path, params, data } => {
            let body = post_body(&params, data.as_deref())?;
            let response = app.api.post(&path, &body).await.map_err(Error::from)?;
            print_json(out, &response)
        }
        Command::Paged {
            path,
            params,
            page_limit,
            max_requests,
        } => {
            let mut write_result = Ok(());
            app.api
                .get_paged(&path, &params, page_limit, max_requests, |page| {
                    if write_result.is_ok() {
                        write_result = print_json(out, &page);
                    }
                })
                .await
                .map_err(Error::from)?;
            write_result
        }
        Command::Status => {
            let status = app.manager.status().await;
            let record = app.manager.store().record().await;
            print_json(
                out,
                &json!({
                    "status": status.label(),
                    "expires_at": match &status {
                        TokenStatus::Valid { expires_at } => json!(expires_at),
                        _ => Value::Null,
                    },
                    "reason": match &status {
                        TokenStatus::RefreshFailed(reason) => json!(reason.label()),
                        _ => Value::Null,
                    },
                    "issuer_url": record.issuer_url,
                    "api_base_url": record.api_base_url,
                    "state_path": app.manager.store().path().display().to_string(),
                }),
            )
        }
        Command::Refresh => {
            app.manager.refresh().await.map_err(Error::from)?;
            let status = app.manager.status().await;
            print_json(out, &json!({ "status": status.label() }))
        }
        Command::SetToken {
            access_token,
            refresh_token,
        } => {
            app.manager
                .install_tokens(TokenPair::new(access_token, refresh_token))
                .await
                .map_err(Error::SaveState)?;
            let status = app.manager.status().await;
            print_json(out, &json!({ "status": status.label() }))
        }
    }
}

/// Build a POST body from `--data` or key=value fields.
fn post_body(params: &[(String, String)], data: Option<&str>) -> Result<Value, Error> {
    if let Some(raw) = data {
        return serde_json::from_str(raw)
            .map_err(|e| Error::Usage(format!("--data is not valid JSON: {e}")));
    }
    let fields: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Ok(Value::Object(fields))
}

fn print_json(out: &mut dyn Write, value: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("serializing response")?;
    writeln!(out, "{text}").context("writing to stdout")?;
    Ok(())
}
