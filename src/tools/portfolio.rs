//! Portfolio allocation analysis

use std::collections::BTreeMap;

/// Drift (in percentage points) beyond which a rebalance is suggested
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 5.0;

/// Total portfolio value for the holdings that have a known price
pub fn portfolio_value(
    holdings: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, f64>,
) -> f64 {
    holdings
        .iter()
        .filter_map(|(symbol, shares)| prices.get(symbol).map(|price| shares * price))
        .sum()
}

/// Percent allocation per position; empty when nothing is priced
pub fn allocation(
    holdings: &BTreeMap<String, f64>,
    prices: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    let total = portfolio_value(holdings, prices);
    if total == 0.0 {
        return BTreeMap::new();
    }

    holdings
        .iter()
        .filter_map(|(symbol, shares)| {
            prices
                .get(symbol)
                .map(|price| (symbol.clone(), shares * price / total * 100.0))
        })
        .collect()
}

/// Suggest adjustments for positions that drifted beyond the threshold
pub fn rebalance_suggestions(
    current: &BTreeMap<String, f64>,
    target: &BTreeMap<String, f64>,
    threshold: f64,
) -> Vec<String> {
    let mut symbols: Vec<&String> = current.keys().chain(target.keys()).collect();
    symbols.sort();
    symbols.dedup();

    let mut suggestions = Vec::new();
    for symbol in symbols {
        let now = current.get(symbol).copied().unwrap_or(0.0);
        let want = target.get(symbol).copied().unwrap_or(0.0);
        let drift = (now - want).abs();

        if drift > threshold {
            if now > want {
                suggestions.push(format!(
                    "Reduce {} by {:.1}% (drift from target)",
                    symbol, drift
                ));
            } else {
                suggestions.push(format!(
                    "Increase {} by {:.1}% (drift from target)",
                    symbol, drift
                ));
            }
        }
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn test_portfolio_value_skips_unpriced_positions() {
        let holdings = map(&[("AAPL", 10.0), ("TSLA", 5.0)]);
        let prices = map(&[("AAPL", 200.0)]);
        assert_eq!(portfolio_value(&holdings, &prices), 2_000.0);
    }

    #[test]
    fn test_allocation_sums_to_hundred() {
        let holdings = map(&[("AAPL", 10.0), ("MSFT", 5.0)]);
        let prices = map(&[("AAPL", 200.0), ("MSFT", 400.0)]);

        let alloc = allocation(&holdings, &prices);
        let total: f64 = alloc.values().sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert!((alloc["AAPL"] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_allocation_empty_when_unpriced() {
        let holdings = map(&[("AAPL", 10.0)]);
        assert!(allocation(&holdings, &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_rebalance_flags_only_drifted_positions() {
        let current = map(&[("AAPL", 70.0), ("MSFT", 30.0)]);
        let target = map(&[("AAPL", 60.0), ("MSFT", 33.0), ("BND", 7.0)]);

        let suggestions =
            rebalance_suggestions(&current, &target, DEFAULT_DRIFT_THRESHOLD);
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions[0].contains("Reduce AAPL by 10.0%"));
        assert!(suggestions[1].contains("Increase BND by 7.0%"));
    }
}
