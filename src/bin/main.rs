use financial_query_agent::{
    gemini::{GeminiClient, LanguageModel, ScriptedModel},
    pipeline::Pipeline,
    tools::MarketDataTool,
};
use std::env;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!("Financial Query Agent starting");

    // Use the real LLM when a key is configured, the scripted model otherwise
    let llm: Arc<dyn LanguageModel> = match env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => Arc::new(GeminiClient::new(key)),
        _ => {
            info!("GEMINI_API_KEY not set, using scripted model");
            Arc::new(ScriptedModel)
        }
    };

    let pipeline = Pipeline::new(MarketDataTool::from_env(), llm);

    let query = env::args()
        .nth(1)
        .unwrap_or_else(|| {
            "Analyze AAPL's recent performance and suggest if I should hedge \
             with options if volatility > 30%"
                .to_string()
        });

    let report = pipeline.run(&query, None).await?;

    println!("\n=== FINAL RESPONSE ===");
    println!("{}", report.response);

    println!("\n=== ANALYSIS METADATA ===");
    println!("Session: {}", report.session_id);
    println!("Symbols analyzed: {}", report.symbols.join(", "));
    for snapshot in &report.indicators {
        println!(
            "  {}: RSI {:.1}, volatility {:.1}%, momentum {:+.1}%, signal {}",
            snapshot.symbol,
            snapshot.rsi,
            snapshot.volatility,
            snapshot.momentum,
            snapshot.signal.label
        );
    }
    println!("Tool calls: {}", report.tool_call_count);
    println!("Guardrail score: {:.2}/1.0", report.guardrail.score);
    for check in &report.guardrail.checks {
        let status = if check.passed { "✓" } else { "✗" };
        println!("  {} {}: {}", status, check.kind, check.detail);
    }
    for hint in &report.improvement_hints {
        println!("  suggestion: {}", hint);
    }
    println!("Context hash: {}", report.context_hash);
    println!("Elapsed: {} ms", report.elapsed_ms);

    Ok(())
}
