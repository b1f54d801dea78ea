use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::{FundamentalsProvider, ProviderError, ProviderRecord, RawValue};
use crate::models::Config;

/// quoteSummary modules that together cover the canonical field set
const QUOTE_SUMMARY_MODULES: &str =
    "price,summaryDetail,defaultKeyStatistics,financialData,assetProfile";

/// Yahoo Finance quoteSummary client.
///
/// quoteSummary only answers requests that carry a session cookie and the
/// matching crumb. The client primes the cookie jar once, caches the crumb
/// and refreshes it when Yahoo answers 401.
pub struct YahooClient {
    client: Client,
    base_url: Url,
    session_url: Option<Url>,
    crumb: Mutex<Option<String>>,
}

impl YahooClient {
    /// Create a new Yahoo client
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent("stock-screener/0.1")
            .cookie_store(true)
            .build()?;

        let base_url = Url::parse(&config.provider_base_url)
            .map_err(|e| anyhow!("Invalid provider base URL {}: {}", config.provider_base_url, e))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Provider base URL cannot carry a path: {}", base_url));
        }

        let session_url = match config.provider_session_url.trim() {
            "" => None,
            raw => Some(
                Url::parse(raw).map_err(|e| anyhow!("Invalid provider session URL {}: {}", raw, e))?,
            ),
        };

        Ok(Self {
            client,
            base_url,
            session_url,
            crumb: Mutex::new(None),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn quote_summary_url(&self, symbol: &str, crumb: &str) -> Url {
        let mut url = self.endpoint(&["v10", "finance", "quoteSummary", symbol]);
        url.query_pairs_mut()
            .append_pair("modules", QUOTE_SUMMARY_MODULES)
            .append_pair("crumb", crumb);
        url
    }

    /// The cached crumb, or a fresh one from the cookie and crumb handshake.
    /// The lock is held across the handshake so concurrent workers share it.
    async fn crumb(&self) -> Result<String, ProviderError> {
        let mut cached = self.crumb.lock().await;
        if let Some(crumb) = cached.as_ref() {
            return Ok(crumb.clone());
        }

        if let Some(session_url) = &self.session_url {
            // Only the Set-Cookie header matters; the page itself is usually a 404
            debug!("GET {}", session_url);
            if let Err(e) = self.client.get(session_url.clone()).send().await {
                warn!("⚠️ Session cookie request failed: {}", e);
            }
        }

        let url = self.endpoint(&["v1", "test", "getcrumb"]);
        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Transient(format!("Crumb request failed: {}", e)))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited(format!(
                "HTTP {} while fetching crumb",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(ProviderError::Transient(format!(
                "HTTP {} while fetching crumb",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(format!("Unreadable crumb: {}", e)))?;
        let crumb = body.trim();
        if crumb.is_empty() || crumb.contains('<') {
            return Err(ProviderError::Transient("Provider returned no usable crumb".to_string()));
        }

        info!("🔑 Obtained provider session crumb");
        *cached = Some(crumb.to_string());
        Ok(crumb.to_string())
    }

    /// Drop the cached crumb unless another worker already replaced it
    async fn forget_crumb(&self, stale: &str) {
        let mut cached = self.crumb.lock().await;
        if cached.as_deref() == Some(stale) {
            *cached = None;
        }
    }
}

#[async_trait]
impl FundamentalsProvider for YahooClient {
    async fn fetch_snapshot(&self, symbol: &str) -> Result<ProviderRecord, ProviderError> {
        let mut refreshed = false;
        loop {
            let crumb = self.crumb().await?;
            let url = self.quote_summary_url(symbol, &crumb);
            debug!("GET {}", url);

            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?;

            if response.status() == StatusCode::UNAUTHORIZED && !refreshed {
                warn!("🔑 Crumb rejected while fetching {}, refreshing session", symbol);
                self.forget_crumb(&crumb).await;
                refreshed = true;
                continue;
            }

            return read_snapshot(symbol, response).await;
        }
    }
}

async fn read_snapshot(symbol: &str, response: Response) -> Result<ProviderRecord, ProviderError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited(format!("HTTP {}", status.as_u16())));
    }
    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(symbol.to_string()));
    }
    if status.is_server_error() {
        return Err(ProviderError::Transient(format!("HTTP {}", status.as_u16())));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            message: truncate(&message, 200),
        });
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| ProviderError::Transient(format!("Undecodable response body: {}", e)))?;

    parse_quote_summary(symbol, &body)
}

/// Flatten a quoteSummary payload into one record
pub fn parse_quote_summary(symbol: &str, body: &Value) -> Result<ProviderRecord, ProviderError> {
    let summary = body
        .get("quoteSummary")
        .ok_or_else(|| ProviderError::Transient("Missing quoteSummary envelope".to_string()))?;

    if let Some(error) = summary.get("error").filter(|e| !e.is_null()) {
        let code = error.get("code").and_then(Value::as_str).unwrap_or_default();
        let description = error
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or(code);
        if code.eq_ignore_ascii_case("Not Found") {
            return Err(ProviderError::NotFound(symbol.to_string()));
        }
        return Err(ProviderError::Rejected {
            status: 200,
            message: description.to_string(),
        });
    }

    let modules = summary
        .get("result")
        .and_then(Value::as_array)
        .and_then(|results| results.first())
        .and_then(Value::as_object)
        .ok_or_else(|| ProviderError::NotFound(symbol.to_string()))?;

    let mut record = ProviderRecord::new();
    for module in modules.values() {
        let Some(fields) = module.as_object() else {
            continue;
        };
        for (key, value) in fields {
            if let Some(raw) = raw_value(value) {
                record.insert(key.clone(), raw);
            }
        }
    }

    Ok(record)
}

/// Yahoo wraps most numbers as `{ "raw": .., "fmt": .. }`; keep the raw part.
fn raw_value(value: &Value) -> Option<RawValue> {
    match value {
        Value::Number(n) => n.as_f64().map(RawValue::Number),
        Value::String(s) => Some(RawValue::Text(s.clone())),
        Value::Object(map) => map.get("raw").and_then(raw_value),
        _ => None,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
