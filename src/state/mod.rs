//! Per-query state accumulator
//!
//! One `QueryState` flows through the pipeline. It is never mutated in
//! place: each stage consumes the previous value and returns a new one with
//! its additions, so every stage boundary is an immutable snapshot.

use crate::models::{
    GuardrailResult, IndicatorSnapshot, MarketData, Message, Portfolio, QueryKind, Role,
    ToolCallRecord,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct QueryState {
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub query: String,

    // Parse stage
    pub kind: Option<QueryKind>,
    pub symbols: Vec<String>,

    // Fetch stage
    pub market_data: Vec<Arc<MarketData>>,
    pub allocation: BTreeMap<String, f64>,
    pub rebalance_hints: Vec<String>,

    // Analyze stage
    pub indicators: Vec<IndicatorSnapshot>,

    // Reason / validate stages
    pub response: String,
    pub guardrail: Option<GuardrailResult>,

    // Cross-cutting
    pub portfolio: Option<Portfolio>,
    pub messages: Vec<Message>,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl QueryState {
    pub fn new(query: impl Into<String>, portfolio: Option<Portfolio>) -> Self {
        let query = query.into();
        Self {
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: vec![Message::new(Role::User, query.clone())],
            query,
            kind: None,
            symbols: Vec::new(),
            market_data: Vec::new(),
            allocation: BTreeMap::new(),
            rebalance_hints: Vec::new(),
            indicators: Vec::new(),
            response: String::new(),
            guardrail: None,
            portfolio,
            tool_calls: Vec::new(),
        }
    }

    pub fn with_message(mut self, role: Role, content: impl Into<String>) -> Self {
        self.messages.push(Message::new(role, content));
        self
    }

    pub fn with_parse(mut self, kind: QueryKind, symbols: Vec<String>) -> Self {
        self.kind = Some(kind);
        self.symbols = symbols;
        self
    }

    pub fn with_market_data(mut self, data: Arc<MarketData>) -> Self {
        self.market_data.push(data);
        self
    }

    pub fn with_allocation(
        mut self,
        allocation: BTreeMap<String, f64>,
        rebalance_hints: Vec<String>,
    ) -> Self {
        self.allocation = allocation;
        self.rebalance_hints = rebalance_hints;
        self
    }

    pub fn with_snapshot(mut self, snapshot: IndicatorSnapshot) -> Self {
        self.indicators.push(snapshot);
        self
    }

    pub fn with_tool_call(mut self, record: ToolCallRecord) -> Self {
        self.tool_calls.push(record);
        self
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        let response = response.into();
        self.messages
            .push(Message::new(Role::Assistant, response.clone()));
        self.response = response;
        self
    }

    pub fn with_guardrail(mut self, result: GuardrailResult) -> Self {
        self.guardrail = Some(result);
        self
    }

    /// Latest close per fetched symbol, for portfolio valuation
    pub fn latest_prices(&self) -> BTreeMap<String, f64> {
        self.market_data
            .iter()
            .map(|data| (data.quote.symbol.clone(), data.quote.price))
            .collect()
    }

    /// Recent conversation formatted for LLM context
    pub fn conversation_history(&self, limit: usize) -> String {
        let start = self.messages.len().saturating_sub(limit);
        self.messages[start..]
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    Role::User => "USER",
                    Role::Assistant => "ASSISTANT",
                    Role::System => "SYSTEM",
                };
                format!("{}: {}", role, msg.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stages_accumulate_append_only() {
        let state = QueryState::new("Analyze AAPL", None);
        assert_eq!(state.messages.len(), 1);
        assert!(state.tool_calls.is_empty());

        let state = state
            .with_parse(QueryKind::Analysis, vec!["AAPL".to_string()])
            .with_tool_call(ToolCallRecord::new(
                "get_stock_data",
                json!({"symbol": "AAPL"}),
                json!({"price": 273.1}),
            ))
            .with_response("All quiet.");

        assert_eq!(state.symbols, vec!["AAPL"]);
        assert_eq!(state.tool_calls.len(), 1);
        // the response is also recorded on the transcript
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.response, "All quiet.");
    }

    #[test]
    fn test_history_keeps_most_recent() {
        let mut state = QueryState::new("first", None);
        for i in 0..10 {
            state = state.with_message(Role::System, format!("note {}", i));
        }

        let history = state.conversation_history(3);
        assert_eq!(history.lines().count(), 3);
        assert!(history.ends_with("note 9"));
        assert!(history.starts_with("SYSTEM: note 7"));
    }
}
