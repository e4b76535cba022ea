//! Financial Query Agent
//!
//! A small multi-step pipeline that:
//! - Extracts ticker symbols from a natural-language financial query
//! - Retrieves price history (with a deterministic mock-data fallback)
//! - Computes technical indicators (RSI, volatility, momentum, MAs, signal)
//! - Generates a recommendation via a language-model call
//! - Scores the recommendation against a fixed set of safety guardrails
//!
//! PIPELINE:
//! PARSE → FETCH → ANALYZE → REASON → VALIDATE
//!
//! The indicator engine and the guardrail evaluator are pure, deterministic,
//! and independently callable; the pipeline composes them around the
//! external collaborators (market data API, LLM).

pub mod audit;
pub mod error;
pub mod gemini;
pub mod guardrails;
pub mod indicators;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod prompts;
pub mod state;
pub mod tools;

pub use error::{AgentError, Result};

// Re-export common types
pub use guardrails::{GroundingContext, GuardrailValidator};
pub use indicators::{compute_indicators, IndicatorConfig};
pub use models::*;
pub use pipeline::Pipeline;
pub use state::QueryState;
