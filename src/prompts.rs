//! Prompt templates for the reasoning step

use crate::models::QueryKind;
use crate::state::QueryState;

/// System prompt: sets the tone, role, and constraints for the agent
pub const SYSTEM_PROMPT: &str = r#"You are an expert financial analysis agent with deep knowledge of technical analysis, market dynamics, and risk management.

Guidelines:
- Always cite the data you used (prices, indicators, time periods)
- Provide a confidence score (0.0 to 1.0) for every recommendation
- Highlight risks and limitations (e.g. "if volatility > 30%, consider hedging")
- Avoid absolute statements like "you must" or "guaranteed"
- Use conditional language for significant recommendations: "if X, then consider Y"

Financial concepts:
- RSI: 0-100 scale. >70 = overbought, <30 = oversold
- Volatility: higher volatility = increased hedging risk. >30% is elevated
- Momentum: % change over the recent period. Positive = uptrend
- Moving averages: price crossing above a long MA often reads bullish

Always end with:
"DISCLAIMER: This analysis is for informational purposes only and should not be considered financial advice. Consult a licensed financial advisor before making investment decisions. Past performance does not guarantee future results.""#;

/// Assemble the reasoning context from everything the pipeline gathered
pub fn reasoning_context(state: &QueryState) -> String {
    let mut out = String::new();

    out.push_str(&format!("User query: {}\n", state.query));
    if let Some(kind) = state.kind {
        out.push_str(&format!("Query type: {}\n", kind_label(kind)));
    }

    out.push_str("\nKey metrics:\n");
    if state.indicators.is_empty() {
        out.push_str("- (no indicator data available)\n");
    }
    for snapshot in &state.indicators {
        let mut line = format!(
            "- {}: RSI {:.1}, volatility {:.1}%, momentum {:+.1}%, signal {} (strength {:+.2})",
            snapshot.symbol,
            snapshot.rsi,
            snapshot.volatility,
            snapshot.momentum,
            snapshot.signal.label,
            snapshot.signal.strength,
        );
        for (window, value) in &snapshot.moving_averages {
            line.push_str(&format!(", MA{} {:.2}", window, value));
        }
        line.push('\n');
        out.push_str(&line);
    }

    if !state.allocation.is_empty() {
        out.push_str("\nCurrent portfolio allocation:\n");
        for (symbol, percent) in &state.allocation {
            out.push_str(&format!("- {}: {:.1}%\n", symbol, percent));
        }
        for hint in &state.rebalance_hints {
            out.push_str(&format!("- {}\n", hint));
        }
    }

    out.push_str("\nRecent tool outputs:\n");
    let start = state.tool_calls.len().saturating_sub(5);
    for call in &state.tool_calls[start..] {
        out.push_str(&format!("Tool: {}, Output: {}\n", call.tool_name, call.output));
    }

    out.push_str("\nConversation history:\n");
    out.push_str(&state.conversation_history(5));

    out.push_str(
        "\n\nBased on this data, provide a financial analysis and recommendation. \
         Include a confidence score, cite the data, and include the disclaimer.",
    );

    out
}

fn kind_label(kind: QueryKind) -> &'static str {
    match kind {
        QueryKind::Analysis => "analysis",
        QueryKind::Comparison => "comparison",
        QueryKind::Hedging => "hedging",
        QueryKind::Allocation => "allocation",
    }
}
