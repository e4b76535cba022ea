//! Market data tooling
//!
//! HTTP-backed fetch of daily price history from the Yahoo Finance chart
//! API, with a TTL cache and a deterministic mock fallback so the pipeline
//! stays usable without network access.

pub mod portfolio;

use crate::error::AgentError;
use crate::models::{MarketData, PricePoint, PriceSeries, Quote};
use crate::Result;
use chrono::{DateTime, Days, Utc};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Tool names as they appear in the tool-call log
pub const FETCH_TOOL_NAME: &str = "get_stock_data";
pub const ANALYZE_TOOL_NAME: &str = "analyze_indicators";

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
const USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const MAX_FETCH_ATTEMPTS: u32 = 3;
const MOCK_HISTORY_DAYS: usize = 252;

/// Requested span of daily history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPeriod {
    OneMonth,
    ThreeMonths,
    SixMonths,
    #[default]
    OneYear,
    TwoYears,
}

impl HistoryPeriod {
    fn seconds(self) -> i64 {
        let days = match self {
            HistoryPeriod::OneMonth => 30,
            HistoryPeriod::ThreeMonths => 90,
            HistoryPeriod::SixMonths => 180,
            HistoryPeriod::OneYear => 365,
            HistoryPeriod::TwoYears => 730,
        };
        days * 86_400
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HistoryPeriod::OneMonth => "1mo",
            HistoryPeriod::ThreeMonths => "3mo",
            HistoryPeriod::SixMonths => "6mo",
            HistoryPeriod::OneYear => "1y",
            HistoryPeriod::TwoYears => "2y",
        }
    }
}

struct CacheEntry {
    fetched_at: Instant,
    data: Arc<MarketData>,
}

/// Fetches and caches daily price history.
///
/// In offline mode every request is served from the deterministic mock
/// generator; otherwise the Yahoo API is tried with bounded backoff and the
/// mock is the fallback.
pub struct MarketDataTool {
    client: Client,
    cache: RwLock<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
    offline: bool,
    mock_fallback: bool,
}

impl MarketDataTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            cache: RwLock::new(HashMap::new()),
            cache_ttl: Duration::from_secs(300),
            offline: false,
            mock_fallback: true,
        }
    }

    /// Never touches the network; all data comes from the mock generator
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::new()
        }
    }

    /// Offline when `MARKET_DATA_USE_MOCK` is set to a truthy value
    pub fn from_env() -> Self {
        let mock = env::var("MARKET_DATA_USE_MOCK")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        if mock {
            Self::offline()
        } else {
            Self::new()
        }
    }

    /// Fetch daily history for a symbol, serving from cache when fresh
    pub async fn fetch(&self, symbol: &str, period: HistoryPeriod) -> Result<Arc<MarketData>> {
        let symbol = symbol.to_uppercase();

        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(&symbol) {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    info!(symbol = %symbol, "Using cached market data");
                    return Ok(entry.data.clone());
                }
            }
        }

        if self.offline {
            let data = Arc::new(mock_market_data(&symbol));
            self.store(&symbol, data.clone()).await;
            return Ok(data);
        }

        for attempt in 0..MAX_FETCH_ATTEMPTS {
            match self.fetch_from_yahoo(&symbol, period).await {
                Ok(data) => {
                    info!(symbol = %symbol, price = data.quote.price, "Fetched market data");
                    let data = Arc::new(data);
                    self.store(&symbol, data.clone()).await;
                    return Ok(data);
                }
                Err(FetchFailure::RateLimited) => {
                    let wait = Duration::from_secs(2u64 << attempt);
                    warn!(
                        symbol = %symbol,
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs(),
                        "Rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(FetchFailure::Other(reason)) => {
                    warn!(symbol = %symbol, reason = %reason, "Market data fetch failed");
                    break;
                }
            }
        }

        if self.mock_fallback {
            warn!(symbol = %symbol, "Falling back to mock market data");
            let data = Arc::new(mock_market_data(&symbol));
            self.store(&symbol, data.clone()).await;
            return Ok(data);
        }

        Err(AgentError::ToolError(format!(
            "Could not fetch market data for {}",
            symbol
        )))
    }

    async fn store(&self, symbol: &str, data: Arc<MarketData>) {
        let mut cache = self.cache.write().await;
        cache.insert(
            symbol.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                data,
            },
        );
    }

    async fn fetch_from_yahoo(
        &self,
        symbol: &str,
        period: HistoryPeriod,
    ) -> std::result::Result<MarketData, FetchFailure> {
        let end = Utc::now().timestamp();
        let start = end - period.seconds();
        let url = format!("{}/{}", YAHOO_CHART_URL, symbol);

        debug!(symbol = %symbol, period = period.as_str(), "Requesting chart data");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", start.to_string()),
                ("period2", end.to_string()),
                ("interval", "1d".to_string()),
            ])
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .header("Referer", "https://finance.yahoo.com/")
            .send()
            .await
            .map_err(|e| FetchFailure::Other(e.to_string()))?;

        if response.status().as_u16() == 429 {
            return Err(FetchFailure::RateLimited);
        }
        if !response.status().is_success() {
            return Err(FetchFailure::Other(format!(
                "HTTP {} from chart API",
                response.status()
            )));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| FetchFailure::Other(format!("Invalid JSON response: {}", e)))?;

        parse_chart(symbol, body).map_err(|e| FetchFailure::Other(e.to_string()))
    }
}

impl Default for MarketDataTool {
    fn default() -> Self {
        Self::new()
    }
}

enum FetchFailure {
    RateLimited,
    Other(String),
}

//
// ================= Chart API wire types =================
//

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

fn parse_chart(symbol: &str, body: ChartResponse) -> Result<MarketData> {
    let result = body
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or_else(|| AgentError::ToolError("Chart response has no result".to_string()))?;

    let timestamps = result
        .timestamp
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AgentError::ToolError("Chart response has no timestamps".to_string()))?;

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::ToolError("Chart response has no quote block".to_string()))?;

    let mut points = Vec::with_capacity(timestamps.len());
    let mut last_date = None;

    // rows with any null field are dropped, as are duplicate dates from
    // partial trading sessions
    for (i, ts) in timestamps.iter().enumerate() {
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            quote.open.get(i).copied().flatten(),
            quote.high.get(i).copied().flatten(),
            quote.low.get(i).copied().flatten(),
            quote.close.get(i).copied().flatten(),
            quote.volume.get(i).copied().flatten(),
        ) else {
            continue;
        };

        let date = DateTime::from_timestamp(*ts, 0)
            .ok_or_else(|| AgentError::ToolError(format!("Bad timestamp {}", ts)))?
            .date_naive();

        if last_date == Some(date) {
            continue;
        }
        last_date = Some(date);

        points.push(PricePoint {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    let series = PriceSeries::new(points)?;
    let quote = quote_from_series(symbol, &series);

    Ok(MarketData { quote, series })
}

fn quote_from_series(symbol: &str, series: &PriceSeries) -> Quote {
    let last = series.last();
    let prev_close = if series.len() > 1 {
        series.points()[series.len() - 2].close
    } else {
        last.close
    };

    Quote {
        symbol: symbol.to_uppercase(),
        price: last.close,
        open: last.open,
        high: last.high,
        low: last.low,
        volume: last.volume,
        date: last.date,
        change_percent: (last.close - prev_close) / prev_close * 100.0,
    }
}

//
// ================= Deterministic mock data =================
//

/// Rough per-symbol price anchors for the mock generator
fn base_price(symbol: &str) -> f64 {
    match symbol {
        "AAPL" => 273.0,
        "TSLA" => 280.0,
        "NVDA" => 920.0,
        "GOOGL" => 190.0,
        "MSFT" => 460.0,
        "AMZN" => 250.0,
        _ => 100.0,
    }
}

/// Small linear-congruential generator seeded from a SHA-256 digest of the
/// symbol, so the same symbol always produces the same series
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn for_symbol(symbol: &str) -> Self {
        let digest = Sha256::digest(symbol.as_bytes());
        let mut seed_bytes = [0u8; 8];
        seed_bytes.copy_from_slice(&digest[..8]);
        Self {
            state: u64::from_be_bytes(seed_bytes) | 1,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    /// Uniform in [0, 1)
    fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Uniform in [-1, 1)
    fn signed_unit(&mut self) -> f64 {
        self.unit() * 2.0 - 1.0
    }
}

/// Generate a full year of plausible daily data for a symbol.
///
/// Purely a function of the symbol (modulo the calendar anchor): prices,
/// volumes, and intraday ranges are all drawn from a symbol-seeded
/// generator.
pub fn mock_market_data(symbol: &str) -> MarketData {
    let symbol = symbol.to_uppercase();
    let base = base_price(&symbol);
    let mut rng = DeterministicRng::for_symbol(&symbol);
    let today = Utc::now().date_naive();

    let mut points = Vec::with_capacity(MOCK_HISTORY_DAYS);
    for offset in (0..MOCK_HISTORY_DAYS).rev() {
        let date = today - Days::new(offset as u64);
        let close = base * (1.0 + rng.signed_unit() * 0.02);
        let open = close * (1.0 + rng.signed_unit() * 0.005);
        let high = close.max(open) * (1.0 + rng.unit() * 0.01);
        let low = close.min(open) * (1.0 - rng.unit() * 0.01);
        let volume = 10_000_000 + rng.next_u64() % 90_000_000;

        points.push(PricePoint {
            date,
            open,
            high,
            low,
            close,
            volume,
        });
    }

    let series = PriceSeries::new(points).expect("mock series is always valid");
    let quote = quote_from_series(&symbol, &series);

    MarketData { quote, series }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{compute_indicators, IndicatorConfig};

    #[test]
    fn test_mock_data_is_deterministic_per_symbol() {
        let first = mock_market_data("AAPL");
        let second = mock_market_data("AAPL");
        assert_eq!(first.series, second.series);

        let other = mock_market_data("TSLA");
        assert_ne!(first.series.closes(), other.series.closes());
    }

    #[test]
    fn test_mock_data_supports_default_indicators() {
        let data = mock_market_data("MSFT");
        assert_eq!(data.series.len(), MOCK_HISTORY_DAYS);

        let snapshot =
            compute_indicators("MSFT", &data.series, &IndicatorConfig::default()).unwrap();
        assert!((0.0..=100.0).contains(&snapshot.rsi));
        assert!(snapshot.volatility >= 0.0);
        // a year of data supports both default moving averages
        assert_eq!(snapshot.moving_averages.len(), 2);
    }

    #[test]
    fn test_mock_quote_matches_series_tail() {
        let data = mock_market_data("GOOGL");
        assert_eq!(data.quote.price, data.series.last().close);
        assert_eq!(data.quote.symbol, "GOOGL");
    }

    #[tokio::test]
    async fn test_offline_fetch_is_cached() {
        let tool = MarketDataTool::offline();
        let first = tool.fetch("aapl", HistoryPeriod::OneYear).await.unwrap();
        let second = tool.fetch("AAPL", HistoryPeriod::OneYear).await.unwrap();
        // second call is served from cache: same allocation
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_parse_chart_drops_null_rows() {
        let body = ChartResponse {
            chart: Chart {
                result: Some(vec![ChartResult {
                    timestamp: Some(vec![1_700_000_000, 1_700_086_400, 1_700_172_800]),
                    indicators: ChartIndicators {
                        quote: vec![ChartQuote {
                            open: vec![Some(10.0), None, Some(10.4)],
                            high: vec![Some(10.5), Some(10.6), Some(10.9)],
                            low: vec![Some(9.8), Some(9.9), Some(10.1)],
                            close: vec![Some(10.2), Some(10.3), Some(10.6)],
                            volume: vec![Some(1_000), Some(1_100), Some(1_200)],
                        }],
                    },
                }]),
            },
        };

        let data = parse_chart("ibm", body).unwrap();
        assert_eq!(data.series.len(), 2);
        assert_eq!(data.quote.symbol, "IBM");
        assert_eq!(data.quote.price, 10.6);
    }

    #[test]
    fn test_parse_chart_empty_result_is_error() {
        let body = ChartResponse {
            chart: Chart { result: None },
        };
        assert!(parse_chart("IBM", body).is_err());
    }
}
