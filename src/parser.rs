//! Query parsing
//!
//! Extracts ticker symbols from a natural-language financial question and
//! classifies what kind of answer is being asked for.

use crate::models::QueryKind;
use lazy_static::lazy_static;
use regex::Regex;

/// At most this many symbols are analyzed per query
pub const MAX_SYMBOLS: usize = 5;

/// Uppercase tokens that look like tickers but are ordinary words
const STOP_WORDS: &[&str] = &[
    "AND", "THE", "FOR", "NOT", "ARE", "BUT", "WITH", "FROM", "SHOULD", "IF",
    "IS", "TO", "IN", "OF", "ON", "MY", "BUY", "SELL", "HOLD", "RSI", "MA",
    "ETF", "USD", "VS",
];

/// Static keyword lists — zero allocation
const COMPARISON_KEYWORDS: &[&str] = &["compare", "versus", "vs", "better", "or"];
const HEDGING_KEYWORDS: &[&str] = &["hedge", "hedging", "option", "put", "protect", "downside"];
const ALLOCATION_KEYWORDS: &[&str] = &["allocate", "allocation", "rebalance", "portfolio", "weight", "diversify"];

lazy_static! {
    static ref SYMBOL_TOKEN: Regex =
        Regex::new(r"\b[A-Z]{2,5}\b").expect("symbol pattern compiles");
}

/// Extract candidate ticker symbols, order-preserving and deduplicated.
///
/// Mirrors the deterministic fallback path: uppercase 2-5 letter tokens
/// minus a stop-word list, capped at [`MAX_SYMBOLS`].
pub fn extract_symbols(query: &str) -> Vec<String> {
    let mut symbols = Vec::new();

    for token in SYMBOL_TOKEN.find_iter(query) {
        let candidate = token.as_str();
        if STOP_WORDS.contains(&candidate) {
            continue;
        }
        if !symbols.iter().any(|s| s == candidate) {
            symbols.push(candidate.to_string());
        }
        if symbols.len() == MAX_SYMBOLS {
            break;
        }
    }

    symbols
}

/// Classify the query by keyword tables, multi-symbol queries defaulting to
/// comparison
pub fn classify_query(query: &str, symbol_count: usize) -> QueryKind {
    let lower = query.to_lowercase();

    let hits = |keywords: &[&str]| keywords.iter().filter(|kw| lower.contains(**kw)).count();

    if hits(HEDGING_KEYWORDS) > 0 {
        QueryKind::Hedging
    } else if hits(ALLOCATION_KEYWORDS) > 0 {
        QueryKind::Allocation
    } else if hits(COMPARISON_KEYWORDS) > 0 || symbol_count > 1 {
        QueryKind::Comparison
    } else {
        QueryKind::Analysis
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_tickers_and_drops_stop_words() {
        let symbols = extract_symbols("Should I buy AAPL or TSLA for the long term?");
        assert_eq!(symbols, vec!["AAPL", "TSLA"]);
    }

    #[test]
    fn test_dedup_preserves_order() {
        let symbols = extract_symbols("NVDA against AMD, then NVDA again");
        assert_eq!(symbols, vec!["NVDA", "AMD"]);
    }

    #[test]
    fn test_single_letters_are_ignored() {
        let symbols = extract_symbols("Is F a buy? What about a P E ratio screen?");
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_symbol_cap() {
        let symbols =
            extract_symbols("Rank AAPL MSFT GOOG AMZN META NVDA TSLA by momentum");
        assert_eq!(symbols.len(), MAX_SYMBOLS);
    }

    #[test]
    fn test_query_kinds() {
        assert_eq!(
            classify_query("Analyze AAPL's recent performance", 1),
            QueryKind::Analysis
        );
        assert_eq!(
            classify_query("Compare TSLA and NVDA for allocation decision", 2),
            QueryKind::Allocation
        );
        assert_eq!(
            classify_query("Should I hedge AAPL with options?", 1),
            QueryKind::Hedging
        );
        assert_eq!(classify_query("TSLA and NVDA outlook", 2), QueryKind::Comparison);
    }
}
