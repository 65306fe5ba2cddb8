use anyhow::{bail, Result};
use std::time::Duration;

use crate::models::SymbolKind;

// -----------------------------------------------
// NSE API ENDPOINTS
// -----------------------------------------------
pub const NSE_BASE_URL: &str = "https://www.nseindia.com";

/// Option chain endpoint for the given symbol kind (indices and equities differ)
pub fn nse_option_chain_url(base_url: &str, kind: SymbolKind, symbol: &str) -> String {
    let path = match kind {
        SymbolKind::Index => "option-chain-indices",
        SymbolKind::Equity => "option-chain-equities",
    };
    format!(
        "{}/api/{}?symbol={}",
        base_url,
        path,
        urlencoding::encode(symbol)
    )
}

/// Derivative quote endpoint, used for the futures open interest
pub fn nse_quote_derivative_url(base_url: &str, symbol: &str) -> String {
    format!(
        "{}/api/quote-derivative?symbol={}",
        base_url,
        urlencoding::encode(symbol)
    )
}

// -----------------------------------------------
// INDICES (everything else is fetched as an equity)
// -----------------------------------------------
pub const NSE_INDICES: &[&str] = &["NIFTY", "BANKNIFTY", "FINNIFTY", "MIDCPNIFTY", "NIFTYNXT50"];

// -----------------------------------------------
// DEFAULT WATCH LIST
// -----------------------------------------------
pub const DEFAULT_SYMBOLS: &[&str] = &["NIFTY", "BANKNIFTY", "RELIANCE"];

// -----------------------------------------------
// HTTP CLIENT CONFIG
// -----------------------------------------------
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                               AppleWebKit/537.36 (KHTML, like Gecko) \
                               Chrome/131.0.0.0 Safari/537.36";

pub const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8",
    "en-IN,en;q=0.9",
];

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

// -----------------------------------------------
// SESSION HANDSHAKE
// -----------------------------------------------
pub const HANDSHAKE_DELAY_MS: u64 = 200;
// NSE cookies go stale after a few minutes
pub const SESSION_TTL: Duration = Duration::from_secs(240);

// -----------------------------------------------
// RETRY CONFIG (429 / 5xx only)
// -----------------------------------------------
pub const RETRY_BASE_DELAY_MS: u64 = 100;
pub const RETRY_FACTOR: u64 = 2;
pub const RETRY_MAX_DELAY_SECS: u64 = 3;
pub const RETRY_MAX_ATTEMPTS: usize = 3;

// -----------------------------------------------
// SCHEDULING / CONCURRENCY
// -----------------------------------------------
pub const DEFAULT_REFRESH_SECS: u64 = 60;
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

// -----------------------------------------------
// SUMMARY WINDOWS
// -----------------------------------------------
pub const SUMMARY_WINDOWS_MINUTES: &[i64] = &[3, 5, 15];
pub const SUMMARY_MATCH_TOLERANCE_SECS: i64 = 120;
pub const SUMMARY_HISTORY_DEPTH: usize = 20;

// -----------------------------------------------
// HTTP HEADERS
// -----------------------------------------------
pub const HEADER_REFERER_PATH: &str = "/market-data/option-chain";
pub const HEADER_X_REQUESTED_WITH: &str = "XMLHttpRequest";
pub const HEADER_ACCEPT_HTML: &str = "text/html";

// -----------------------------------------------
// STORAGE / SERVER DEFAULTS
// -----------------------------------------------
pub const DEFAULT_DATABASE_URL: &str = "sqlite://oi_data.db";
pub const DEFAULT_PORT: u16 = 3001;

// -----------------------------------------------
// RUNTIME CONFIGURATION
// -----------------------------------------------

/// How the binary drives the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// One cycle for every symbol, then exit
    Once,
    /// Cycle every refresh interval until Ctrl-C
    Watch,
    /// Watch in the background and serve the JSON API
    Server,
}

impl std::str::FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(Mode::Once),
            "watch" => Ok(Mode::Watch),
            "server" => Ok(Mode::Server),
            other => bail!("Invalid mode '{}'. Use 'once', 'watch' or 'server'", other),
        }
    }
}

/// Application configuration, read from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: Mode,
    pub symbols: Vec<String>,
    pub index_symbols: Vec<String>,
    pub database_url: String,
    pub refresh_interval: Duration,
    pub max_concurrent: usize,
    pub port: u16,
    pub fetch_futures: bool,
}

impl AppConfig {
    /// Build configuration from `OI_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mode = std::env::var("OI_MODE")
            .unwrap_or_else(|_| "watch".to_string())
            .parse()?;

        Ok(Self {
            mode,
            symbols: parse_symbol_list(std::env::var("OI_SYMBOLS").ok().as_deref(), DEFAULT_SYMBOLS),
            index_symbols: parse_symbol_list(std::env::var("OI_INDICES").ok().as_deref(), NSE_INDICES),
            database_url: std::env::var("OI_DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            refresh_interval: Duration::from_secs(
                env_parse("OI_REFRESH_SECS").unwrap_or(DEFAULT_REFRESH_SECS),
            ),
            max_concurrent: get_max_concurrent(),
            port: env_parse("OI_PORT").unwrap_or(DEFAULT_PORT),
            fetch_futures: env_flag("OI_FETCH_FUTURES").unwrap_or(true),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            bail!("OI_SYMBOLS resolved to an empty watch list");
        }
        if self.refresh_interval.is_zero() {
            bail!("OI_REFRESH_SECS must be greater than zero");
        }
        Ok(())
    }
}

/// Split a comma separated list into upper-case symbols, falling back to `default`
pub fn parse_symbol_list(raw: Option<&str>, default: &[&str]) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    if parsed.is_empty() {
        default.iter().map(|s| s.to_string()).collect()
    } else {
        parsed
    }
}

/// Get concurrency limit, overridable via `OI_MAX_CONCURRENT`
pub fn get_max_concurrent() -> usize {
    env_parse::<usize>("OI_MAX_CONCURRENT")
        .map(|n| n.clamp(1, 50))
        .unwrap_or(DEFAULT_MAX_CONCURRENT)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

fn env_flag(key: &str) -> Option<bool> {
    let val = std::env::var(key).ok()?;
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
