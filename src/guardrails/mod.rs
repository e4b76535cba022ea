//! Guardrail validation for generated recommendations
//!
//! Rule-based checks that keep financial advice appropriately cautious:
//! overconfidence, missing disclaimers, missing confidence scores,
//! ungrounded reasoning, and unhedged predictions.
//!
//! Checks are independent and additive rather than short-circuiting, so a
//! caller always receives the full diagnostic breakdown. The evaluator is
//! total over string input: an empty or garbage response is a failed safety
//! finding, never an error.

use crate::models::{
    CheckKind, CheckOutcome, GuardrailResult, IndicatorSnapshot, ToolCallRecord,
};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

/// Absolute/certainty language that fails the overconfidence check
const OVERCONFIDENT_PATTERNS: &[&str] = &[
    r"\byou must\b",
    r"\byou should definitely\b",
    r"\byou need to\b",
    r"\bguaranteed\b",
    r"\bcertain to\b",
    r"\bwill definitely\b",
    r"\balways buy\b",
    r"\bnever sell\b",
    r"\b100\s*%\s*certain\b",
    r"\brisk[- ]free\b",
    r"\bcan(?:no|')t lose\b",
];

/// Phrases that satisfy the disclaimer check. Deliberately broader than a
/// single literal so reasonable phrasings are not rejected; the list is
/// tunable via [`GuardrailConfig`].
const DISCLAIMER_PATTERNS: &[&str] = &[
    r"not\s+financial\s+advice",
    r"for\s+informational\s+purposes",
    r"consult\W+(?:\w+\W+){0,3}advis[eo]r",
    r"\bdisclaimer\b",
    r"past\s+performance\s+(?:is\s+no|does\s+not\s+guarantee)",
];

/// Forward-looking price-direction claims
const PREDICTIVE_PATTERNS: &[&str] = &[
    r"\bwill\s+(?:rise|fall|climb|drop|soar|crash|rally|rebound|double|increase|decrease|go\s+(?:up|down))\b",
    r"\b(?:is|are)\s+going\s+to\s+(?:rise|fall|climb|drop|soar|crash|rally|rebound)\b",
];

/// Hedging language that turns a prediction into a conditional
const HEDGE_PATTERNS: &[&str] = &[
    r"\bmay\b",
    r"\bmight\b",
    r"\bcould\b",
    r"\bconsider\b",
    r"\blikely\b",
    r"\bpossibly\b",
    r"\bpotential(?:ly)?\b",
    r"\bif\b",
];

lazy_static! {
    static ref DEFAULT_CONFIG: GuardrailConfig = GuardrailConfig::new(
        OVERCONFIDENT_PATTERNS,
        DISCLAIMER_PATTERNS,
        PREDICTIVE_PATTERNS,
        HEDGE_PATTERNS,
    )
    .expect("default guardrail patterns compile");

    // "confidence: 0.65", "confidence score of 72%"
    static ref CONFIDENCE_BEFORE: Regex = case_insensitive(
        r"(?:confidence|confident|conviction|certainty|score)\b[^\d]{0,24}(\d+(?:\.\d+)?)\s*(%)?"
    );
    // "0.65 confidence", "85% confident"
    static ref CONFIDENCE_AFTER: Regex = case_insensitive(
        r"(\d+(?:\.\d+)?)\s*(%)?\s*(?:\w+\s+){0,2}(?:confidence|confident|conviction|certainty)\b"
    );
    // "0.7 / 1.0"
    static ref CONFIDENCE_RATIO: Regex =
        case_insensitive(r"(\d+(?:\.\d+)?)\s*/\s*1\.0");

    static ref SENTENCE_SPLIT: Regex = Regex::new(r"[.!?;]\s+|\n+")
        .expect("sentence split pattern compiles");

    static ref ANY_DIGIT: Regex = Regex::new(r"\d").expect("digit pattern compiles");
}

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("guardrail pattern compiles")
}

/// Compiled pattern tables driving the evaluator.
///
/// The rule set is configuration, not control flow: swapping a table never
/// touches the check logic.
#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    overconfidence: Vec<Regex>,
    disclaimers: Vec<Regex>,
    predictive: Vec<Regex>,
    hedges: Vec<Regex>,
}

impl GuardrailConfig {
    /// Compile custom pattern tables (all matched case-insensitively)
    pub fn new(
        overconfidence: &[&str],
        disclaimers: &[&str],
        predictive: &[&str],
        hedges: &[&str],
    ) -> std::result::Result<Self, regex::Error> {
        let compile = |patterns: &[&str]| {
            patterns
                .iter()
                .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
                .collect::<std::result::Result<Vec<_>, _>>()
        };

        Ok(Self {
            overconfidence: compile(overconfidence)?,
            disclaimers: compile(disclaimers)?,
            predictive: compile(predictive)?,
            hedges: compile(hedges)?,
        })
    }
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.clone()
    }
}

/// Read-only context the response is checked against
#[derive(Debug, Clone, Copy)]
pub struct GroundingContext<'a> {
    pub indicators: &'a [IndicatorSnapshot],
    pub tool_calls: &'a [ToolCallRecord],
}

impl GroundingContext<'static> {
    pub fn empty() -> Self {
        Self {
            indicators: &[],
            tool_calls: &[],
        }
    }
}

/// Rule-based validator for recommendation text
#[derive(Debug, Clone, Default)]
pub struct GuardrailValidator {
    config: GuardrailConfig,
}

impl GuardrailValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: GuardrailConfig) -> Self {
        Self { config }
    }

    /// Run the full validation suite.
    ///
    /// Never fails. An empty response fails every check: absence of
    /// overconfident language in zero text is not evidence of caution.
    pub fn validate(&self, response: &str, context: &GroundingContext<'_>) -> GuardrailResult {
        if response.trim().is_empty() {
            let checks = CheckKind::ALL
                .iter()
                .map(|kind| CheckOutcome {
                    kind: *kind,
                    passed: false,
                    detail: "Empty response".to_string(),
                })
                .collect();
            return GuardrailResult::from_checks(checks);
        }

        let checks = vec![
            self.check_overconfidence(response),
            self.check_disclaimer(response),
            self.check_confidence_score(response),
            self.check_citation(response, context),
            self.check_hallucination(response, context),
        ];

        GuardrailResult::from_checks(checks)
    }

    /// Check 1: no absolute/certainty language.
    /// Several matches still count as a single failure.
    fn check_overconfidence(&self, text: &str) -> CheckOutcome {
        let flagged: Vec<&str> = self
            .config
            .overconfidence
            .iter()
            .filter_map(|re| re.find(text).map(|m| m.as_str()))
            .collect();

        CheckOutcome {
            kind: CheckKind::Overconfidence,
            passed: flagged.is_empty(),
            detail: if flagged.is_empty() {
                "No overconfident language detected".to_string()
            } else {
                format!("Flagged: {}", flagged[..flagged.len().min(3)].join(", "))
            },
        }
    }

    /// Check 2: at least one disclaimer phrase
    fn check_disclaimer(&self, text: &str) -> CheckOutcome {
        let found = self.config.disclaimers.iter().any(|re| re.is_match(text));

        CheckOutcome {
            kind: CheckKind::Disclaimer,
            passed: found,
            detail: if found {
                "Disclaimer found".to_string()
            } else {
                "Missing financial advice disclaimer".to_string()
            },
        }
    }

    /// Check 3: an explicit numeric confidence indicator — a decimal in
    /// [0, 1] or a percentage — near the word "confidence" (or equivalent)
    fn check_confidence_score(&self, text: &str) -> CheckOutcome {
        let passed = extract_confidence(text).is_some();

        CheckOutcome {
            kind: CheckKind::ConfidenceScore,
            passed,
            detail: if passed {
                "Confidence score found".to_string()
            } else {
                "No explicit confidence score".to_string()
            },
        }
    }

    /// Check 4: the text references at least one indicator it was given —
    /// by name or by its rendered numeric value
    fn check_citation(&self, text: &str, context: &GroundingContext<'_>) -> CheckOutcome {
        if context.indicators.is_empty() {
            return CheckOutcome {
                kind: CheckKind::Citation,
                passed: false,
                detail: "No indicator context supplied".to_string(),
            };
        }

        let lower = text.to_lowercase();
        let mut cited = Vec::new();

        for snapshot in context.indicators {
            for (name, value) in indicator_terms(snapshot) {
                let by_name = lower.contains(&name.to_lowercase());
                let by_value = value.map_or(false, |v| {
                    let rounded = format!("{}", v.round() as i64);
                    // single-digit integers match too loosely to count
                    lower.contains(&format!("{:.1}", v))
                        || (rounded.len() >= 2 && lower.contains(&rounded))
                });
                if (by_name || by_value) && !cited.contains(&name) {
                    cited.push(name);
                }
            }
        }

        CheckOutcome {
            kind: CheckKind::Citation,
            passed: !cited.is_empty(),
            detail: if cited.is_empty() {
                "Response does not reference any supplied indicator".to_string()
            } else {
                format!("References: {}", cited[..cited.len().min(3)].join(", "))
            },
        }
    }

    /// Check 5: no unhedged forward-looking price claims, and no numeric
    /// claims when the grounding context is completely empty.
    /// Independent of checks 1 and 4 so callers see which dimension failed.
    fn check_hallucination(&self, text: &str, context: &GroundingContext<'_>) -> CheckOutcome {
        let mut suspicious = Vec::new();

        for sentence in SENTENCE_SPLIT.split(text) {
            let hedged = self.config.hedges.iter().any(|re| re.is_match(sentence));
            if hedged {
                continue;
            }
            for re in &self.config.predictive {
                if let Some(m) = re.find(sentence) {
                    suspicious.push(format!("Unhedged prediction: '{}'", m.as_str()));
                    break;
                }
            }
        }

        if context.indicators.is_empty()
            && context.tool_calls.is_empty()
            && ANY_DIGIT.is_match(text)
        {
            suspicious.push("Numeric claims with no supporting tool output".to_string());
        }

        CheckOutcome {
            kind: CheckKind::Hallucination,
            passed: suspicious.is_empty(),
            detail: if suspicious.is_empty() {
                "No suspicious claims".to_string()
            } else {
                format!("Flagged: {}", suspicious[..suspicious.len().min(2)].join("; "))
            },
        }
    }

    /// One remediation hint per failed check, in check-priority order
    pub fn suggest_improvements(&self, result: &GuardrailResult) -> Vec<String> {
        result
            .checks
            .iter()
            .filter(|check| !check.passed)
            .map(|check| match check.kind {
                CheckKind::Overconfidence => {
                    "Use conditional language: 'if X, then consider Y' instead of absolute statements"
                }
                CheckKind::Disclaimer => {
                    "Add a disclaimer, e.g. 'This is not financial advice. Consult a licensed advisor before investing.'"
                }
                CheckKind::ConfidenceScore => {
                    "Include an explicit confidence score (0.0 to 1.0) based on data quality"
                }
                CheckKind::Citation => {
                    "Cite the specific indicators (RSI, volatility, momentum) and their values"
                }
                CheckKind::Hallucination => {
                    "Only claim what is in the data: avoid unconditional predictions and cite sources"
                }
            })
            .map(str::to_string)
            .collect()
    }
}

/// Names and values the citation check can match against
fn indicator_terms(snapshot: &IndicatorSnapshot) -> Vec<(String, Option<f64>)> {
    let mut terms = vec![
        ("RSI".to_string(), Some(snapshot.rsi)),
        ("volatility".to_string(), Some(snapshot.volatility)),
        ("momentum".to_string(), Some(snapshot.momentum)),
        ("signal".to_string(), None),
        (snapshot.signal.label.to_string(), None),
    ];
    for (window, value) in &snapshot.moving_averages {
        terms.push((format!("{}-day moving average", window), Some(*value)));
        terms.push(("moving average".to_string(), Some(*value)));
    }
    terms
}

/// Find a numeric confidence indicator: decimal in [0, 1] or percentage in
/// [0, 100], associated with a confidence word within a bounded window
fn extract_confidence(text: &str) -> Option<f64> {
    for re in [&*CONFIDENCE_BEFORE, &*CONFIDENCE_AFTER] {
        for caps in re.captures_iter(text) {
            let Some(raw) = caps.get(1) else { continue };
            let Ok(value) = raw.as_str().parse::<f64>() else { continue };
            let is_percent = caps.get(2).is_some();
            if is_percent && (0.0..=100.0).contains(&value) {
                return Some(value / 100.0);
            }
            if !is_percent && (0.0..=1.0).contains(&value) {
                return Some(value);
            }
        }
    }

    if let Some(caps) = CONFIDENCE_RATIO.captures(text) {
        let Some(raw) = caps.get(1) else { return None };
        let Ok(value) = raw.as_str().parse::<f64>() else { return None };
        if (0.0..=1.0).contains(&value) {
            return Some(value);
        }
    }

    None
}

//
// ================= Tests =================
//
