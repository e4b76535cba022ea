//! Core data models for the financial query agent

use crate::error::AgentError;
use crate::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Categorical trading signal derived from the indicator set
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalLabel {
    Bullish,
    Bearish,
    Neutral,
}

/// Kind of query extracted from the user's question
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Analysis,
    Comparison,
    Hedging,
    Allocation,
}

//
// ================= Price Data =================
//

/// One daily observation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Ordered daily price history.
///
/// Constructed once per fetch and never mutated. The constructor enforces
/// chronological order, unique dates, and positive closes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        if points.is_empty() {
            return Err(AgentError::InvalidSeries("empty series".to_string()));
        }

        for window in points.windows(2) {
            if window[1].date <= window[0].date {
                return Err(AgentError::InvalidSeries(format!(
                    "dates not strictly ascending at {}",
                    window[1].date
                )));
            }
        }

        if let Some(bad) = points.iter().find(|p| p.close <= 0.0) {
            return Err(AgentError::InvalidSeries(format!(
                "non-positive close {} on {}",
                bad.close, bad.date
            )));
        }

        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn last(&self) -> &PricePoint {
        // non-empty by construction
        self.points.last().expect("series is never empty")
    }
}

/// Latest-day summary for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub date: NaiveDate,
    pub change_percent: f64,
}

/// Output of a market data fetch: latest quote plus full history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub quote: Quote,
    pub series: PriceSeries,
}

//
// ================= Indicators =================
//

/// Strength is in [-1, 1]; sign agrees with the label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub label: SignalLabel,
    pub strength: f64,
}

/// Technical indicators computed for one symbol.
///
/// A pure function of the price series and the indicator configuration;
/// recomputing from the same series yields bit-identical values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    /// Relative Strength Index, [0, 100]
    pub rsi: f64,
    /// Sample standard deviation of daily returns, in percent
    pub volatility: f64,
    /// Percent price change over the momentum lookback
    pub momentum: f64,
    /// Arithmetic mean of closes per configured window; windows the series
    /// cannot support are absent rather than zeroed
    pub moving_averages: BTreeMap<u32, f64>,
    pub signal: Signal,
}

//
// ================= Guardrails =================
//

/// The five safety checks, in priority order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Overconfidence,
    Disclaimer,
    ConfidenceScore,
    Citation,
    Hallucination,
}

impl CheckKind {
    pub const ALL: [CheckKind; 5] = [
        CheckKind::Overconfidence,
        CheckKind::Disclaimer,
        CheckKind::ConfidenceScore,
        CheckKind::Citation,
        CheckKind::Hallucination,
    ];
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub passed: bool,
    pub detail: String,
}

/// Full diagnostic breakdown of a validated response.
///
/// Checks are independent and additive; the score is always a multiple of
/// one fifth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub checks: Vec<CheckOutcome>,
    pub score: f64,
}

impl GuardrailResult {
    pub fn from_checks(checks: Vec<CheckOutcome>) -> Self {
        let passed = checks.iter().filter(|c| c.passed).count();
        let score = passed as f64 / checks.len() as f64;
        Self { checks, score }
    }

    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn check(&self, kind: CheckKind) -> Option<&CheckOutcome> {
        self.checks.iter().find(|c| c.kind == kind)
    }
}

//
// ================= Conversation & Audit =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only log entry for one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: Uuid,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ToolCallRecord {
    pub fn new(
        tool_name: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            tool_name: tool_name.into(),
            input,
            output,
            timestamp: Utc::now(),
        }
    }
}

//
// ================= Portfolio =================
//

/// Optional per-query portfolio context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Portfolio {
    /// symbol → shares held
    pub holdings: BTreeMap<String, f64>,
    /// symbol → target percent allocation
    pub target_allocation: BTreeMap<String, f64>,
}

//
// ================= Final Report =================
//

/// Final pipeline output for one query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReport {
    pub session_id: Uuid,
    pub query: String,
    pub symbols: Vec<String>,
    pub response: String,
    pub guardrail: GuardrailResult,
    pub improvement_hints: Vec<String>,
    pub indicators: Vec<IndicatorSnapshot>,
    pub allocation: BTreeMap<String, f64>,
    pub rebalance_hints: Vec<String>,
    pub tool_call_count: usize,
    pub context_hash: String,
    pub elapsed_ms: u64,
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalLabel::Bullish => "bullish",
            SignalLabel::Bearish => "bearish",
            SignalLabel::Neutral => "neutral",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckKind::Overconfidence => "overconfidence",
            CheckKind::Disclaimer => "disclaimer",
            CheckKind::ConfidenceScore => "confidence_score",
            CheckKind::Citation => "citation",
            CheckKind::Hallucination => "hallucination",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;

    fn point(year: i32, month: u32, day: u32, close: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(year, month, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000,
        }
    }

    #[test]
    fn test_series_accepts_ordered_points() {
        let series = PriceSeries::new(vec![
            point(2026, 1, 5, 100.0),
            point(2026, 1, 6, 101.0),
            point(2026, 1, 7, 102.5),
        ])
        .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series.last().close, 102.5);
    }

    #[test]
    fn test_series_rejects_duplicate_dates() {
        let result = PriceSeries::new(vec![
            point(2026, 1, 5, 100.0),
            point(2026, 1, 5, 101.0),
        ]);
        assert!(matches!(result, Err(AgentError::InvalidSeries(_))));
    }

    #[test]
    fn test_series_rejects_unsorted_dates() {
        let result = PriceSeries::new(vec![
            point(2026, 1, 6, 100.0),
            point(2026, 1, 5, 101.0),
        ]);
        assert!(matches!(result, Err(AgentError::InvalidSeries(_))));
    }

    #[test]
    fn test_series_rejects_non_positive_close() {
        let result = PriceSeries::new(vec![
            point(2026, 1, 5, 100.0),
            point(2026, 1, 6, 0.0),
        ]);
        assert!(matches!(result, Err(AgentError::InvalidSeries(_))));

        let empty = PriceSeries::new(vec![]);
        assert!(matches!(empty, Err(AgentError::InvalidSeries(_))));
    }

    #[test]
    fn test_guardrail_score_is_fraction_of_checks() {
        let checks = CheckKind::ALL
            .iter()
            .enumerate()
            .map(|(i, kind)| CheckOutcome {
                kind: *kind,
                passed: i < 3,
                detail: String::new(),
            })
            .collect();

        let result = GuardrailResult::from_checks(checks);
        assert!((result.score - 0.6).abs() < f64::EPSILON);
        assert!(!result.all_passed());
        assert!(result.check(CheckKind::Citation).is_some());
    }
}
