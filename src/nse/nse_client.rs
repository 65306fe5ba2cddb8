use super::models::{ChainBody, DerivativeQuote, EquityChain, FuturesContract, IndexChain, RawChainPayload};
use super::ChainSource;
use crate::config;
use crate::error::{EmptyDataError, FetchError, MalformedPayloadError, SourceError};
use crate::models::SymbolKind;
use async_trait::async_trait;
use rand::{seq::SliceRandom, thread_rng};
use reqwest::{header, Client};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use tracing::{debug, info, warn};

// -----------------------------------------------
// CLIENT WRAPPER WITH SESSION STATE
// -----------------------------------------------
pub struct NseClient {
    client: Client,
    base_url: String,
    fetch_futures: bool,
    // When the cookie handshake last succeeded
    session: Arc<RwLock<Option<Instant>>>,
}

impl NseClient {
    pub fn new(fetch_futures: bool) -> Result<Self, FetchError> {
        Self::with_base_url(config::NSE_BASE_URL, fetch_futures)
    }

    /// Client against another host (a proxy or a local test server)
    pub fn with_base_url(base_url: impl Into<String>, fetch_futures: bool) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            fetch_futures,
            session: Arc::new(RwLock::new(None)),
        })
    }

    /// Cookie handshake against the home page, repeated once the session goes stale
    async fn ensure_session(&self) -> Result<(), FetchError> {
        if let Some(at) = *self.session.read().await {
            if at.elapsed() < config::SESSION_TTL {
                return Ok(());
            }
        }

        let mut session = self.session.write().await;
        if let Some(at) = *session {
            if at.elapsed() < config::SESSION_TTL {
                return Ok(());
            }
        }

        let res = self
            .client
            .get(format!("{}/", self.base_url))
            .header(header::ACCEPT, config::HEADER_ACCEPT_HTML)
            .send()
            .await
            .map_err(|e| FetchError::Handshake(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Handshake(format!("home page returned HTTP {}", status.as_u16())));
        }

        tokio::time::sleep(Duration::from_millis(config::HANDSHAKE_DELAY_MS)).await;
        *session = Some(Instant::now());
        info!(base_url = %self.base_url, "NSE session established");
        Ok(())
    }

    async fn invalidate_session(&self) {
        *self.session.write().await = None;
    }

    /// Single GET returning the raw JSON text
    async fn get_json_once(&self, url: &str) -> Result<String, FetchError> {
        let res = self
            .client
            .get(url)
            .header(header::REFERER, format!("{}{}", self.base_url, config::HEADER_REFERER_PATH))
            .header("X-Requested-With", config::HEADER_X_REQUESTED_WITH)
            .send()
            .await?;

        let status = res.status();
        debug!(url, status = status.as_u16(), "NSE response");

        if status.is_success() {
            let text = res.text().await?;

            let trimmed = text.trim_start();
            if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
                let preview: String = text.chars().take(200).collect();
                return Err(FetchError::NonJson(preview));
            }

            Ok(text)
        } else {
            let body = res.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            Err(FetchError::Status { status: status.as_u16(), body: preview })
        }
    }

    /// GET with session handling; 429/5xx are retried with backoff, and a
    /// rejected session is re-established once
    async fn fetch_json(&self, url: &str) -> Result<String, FetchError> {
        self.ensure_session().await?;

        match self.get_with_retry(url).await {
            Err(e) if e.is_unauthorized() => {
                warn!(url, "NSE rejected session cookies, repeating handshake");
                self.invalidate_session().await;
                self.ensure_session().await?;
                self.get_with_retry(url).await
            }
            other => other,
        }
    }

    async fn get_with_retry(&self, url: &str) -> Result<String, FetchError> {
        let backoff = ExponentialBackoff::from_millis(config::RETRY_BASE_DELAY_MS)
            .factor(config::RETRY_FACTOR)
            .max_delay(Duration::from_secs(config::RETRY_MAX_DELAY_SECS))
            .take(config::RETRY_MAX_ATTEMPTS);

        RetryIf::spawn(
            backoff,
            || self.get_json_once(url),
            |e: &FetchError| {
                let retry = e.is_transient();
                if retry {
                    warn!(url, error = %e, "Transient NSE error, retrying");
                }
                retry
            },
        )
        .await
    }

    // -----------------------------------------------
    // OPTION CHAIN
    // -----------------------------------------------
    pub async fn fetch_chain(&self, symbol: &str, kind: SymbolKind) -> Result<RawChainPayload, SourceError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(FetchError::InvalidSymbol(symbol.to_string()).into());
        }

        let url = config::nse_option_chain_url(&self.base_url, kind, symbol);
        let text = self.fetch_json(&url).await?;
        let body = parse_chain(symbol, kind, &text)?;

        if body.strikes().is_empty() {
            return Err(EmptyDataError { symbol: symbol.to_string() }.into());
        }

        let futures = if self.fetch_futures {
            self.fetch_futures(symbol).await?
        } else {
            None
        };

        debug!(symbol, kind = kind.as_str(), strikes = body.strikes().len(), "Fetched option chain");

        Ok(RawChainPayload {
            symbol: symbol.to_string(),
            body,
            futures,
        })
    }

    // -----------------------------------------------
    // FUTURES OPEN INTEREST
    // -----------------------------------------------
    pub async fn fetch_futures(&self, symbol: &str) -> Result<Option<Vec<FuturesContract>>, SourceError> {
        let url = config::nse_quote_derivative_url(&self.base_url, symbol);
        let text = self.fetch_json(&url).await?;

        let quote: DerivativeQuote = serde_json::from_str(&text)
            .map_err(|e| MalformedPayloadError::new(symbol, format!("derivative quote: {}", e)))?;

        let contracts = quote.futures_contracts();
        if contracts.is_empty() {
            debug!(symbol, "Derivative quote has no futures contracts");
            return Ok(None);
        }
        Ok(Some(contracts))
    }
}

#[async_trait]
impl ChainSource for NseClient {
    async fn fetch(&self, symbol: &str, kind: SymbolKind) -> Result<RawChainPayload, SourceError> {
        self.fetch_chain(symbol, kind).await
    }
}

/// Deserialize a chain body into the shape matching `kind`
pub fn parse_chain(symbol: &str, kind: SymbolKind, text: &str) -> Result<ChainBody, MalformedPayloadError> {
    let parsed = match kind {
        SymbolKind::Index => serde_json::from_str::<IndexChain>(text).map(ChainBody::Index),
        SymbolKind::Equity => serde_json::from_str::<EquityChain>(text).map(ChainBody::Equity),
    };
    parsed.map_err(|e| MalformedPayloadError::new(symbol, format!("option chain: {}", e)))
}

// -----------------------------------------------
// HTTP CLIENT BUILDER
// -----------------------------------------------
fn build_client() -> Result<Client, FetchError> {
    let mut headers = header::HeaderMap::new();

    let lang = config::ACCEPT_LANGUAGES
        .choose(&mut thread_rng())
        .copied()
        .unwrap_or("en-US,en;q=0.9");
    headers.insert(header::ACCEPT_LANGUAGE, header::HeaderValue::from_static(lang));
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));

    Client::builder()
        .default_headers(headers)
        .cookie_store(true)
        .user_agent(config::USER_AGENT)
        .timeout(config::HTTP_TIMEOUT)
        .build()
        .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_by_kind() {
        let text = r#"{"records": {"underlyingValue": 24500.5, "data": [{"strikePrice": 24500}]}}"#;
        let body = parse_chain("NIFTY", SymbolKind::Index, text).unwrap();
        assert_eq!(body.kind(), SymbolKind::Index);
        assert_eq!(body.strikes().len(), 1);

        let body = parse_chain("RELIANCE", SymbolKind::Equity, text).unwrap();
        assert_eq!(body.kind(), SymbolKind::Equity);
    }

    #[test]
    fn test_parse_chain_rejects_non_numeric_oi() {
        let text = r#"{"records": {"data": [{"strikePrice": 100, "CE": {"openInterest": "-"}}]}}"#;
        let err = parse_chain("RELIANCE", SymbolKind::Equity, text).unwrap_err();
        assert_eq!(err.symbol, "RELIANCE");
    }
}
