//! Scoring — trait-based scorer that turns resume text + job type into a validated `ScoreCard`.
//!
//! Default: `GeminiScorer`, which delegates the judgement to the Gemini API.
//! The model reply is untrusted input: it is parsed into a `ScoreCard` or rejected
//! with a `ScoringError`, never defaulted.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::analysis::prompts::{build_ats_prompt, ATS_SYSTEM};
use crate::llm_client::{strip_json_fences, LlmClient, LlmError};

const MAX_SCORE: i64 = 100;

const NO_SUGGESTIONS: &str = "No specific suggestions were provided, but ensure your resume \
    closely matches the job description keywords.";

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("upstream call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("model reply contained no ATS score")]
    MissingScore,

    #[error("model reply score {0} is outside 0..=100")]
    ScoreOutOfRange(i64),
}

/// A validated ATS score (0–100) with its ordered improvement suggestions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreCard {
    score: u8,
    suggestions: Vec<String>,
}

impl ScoreCard {
    /// Validates the score range and normalises suggestions.
    /// Blank suggestions are dropped; an empty list gets one generic suggestion.
    pub fn new(score: i64, suggestions: Vec<String>) -> Result<Self, ScoringError> {
        if !(0..=MAX_SCORE).contains(&score) {
            return Err(ScoringError::ScoreOutOfRange(score));
        }

        let mut suggestions: Vec<String> = suggestions
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if suggestions.is_empty() {
            suggestions.push(NO_SUGGESTIONS.to_string());
        }

        Ok(Self {
            score: score as u8,
            suggestions,
        })
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn into_suggestions(self) -> Vec<String> {
        self.suggestions
    }
}

/// The scorer trait. Carried in `AppState` as `Arc<dyn Scorer>`.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, resume_text: &str, job_type: &str) -> Result<ScoreCard, ScoringError>;
}

/// Scores resumes with a single Gemini call per request.
pub struct GeminiScorer {
    llm: LlmClient,
}

impl GeminiScorer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Scorer for GeminiScorer {
    async fn score(&self, resume_text: &str, job_type: &str) -> Result<ScoreCard, ScoringError> {
        let prompt = build_ats_prompt(resume_text, job_type);
        let reply = self.llm.call_text(&prompt, ATS_SYSTEM).await?;
        parse_score_reply(&reply).inspect_err(|e| {
            warn!(error = %e, reply_len = reply.len(), "Unusable scoring reply from model");
        })
    }
}

/// Parses a model reply into a `ScoreCard`.
///
/// Accepts the JSON object the prompt asks for (optionally fenced), and falls
/// back to the plain-text layout models drift into:
///
/// ```text
/// ATS Score: 75/100
/// Suggestions:
/// - Suggestion 1
/// ```
pub fn parse_score_reply(reply: &str) -> Result<ScoreCard, ScoringError> {
    let (score, suggestions) = match serde_json::from_str::<Value>(strip_json_fences(reply)) {
        Ok(Value::Object(map)) => {
            let score = ["score", "ats_score", "atsScore"]
                .iter()
                .find_map(|key| map.get(*key))
                .and_then(json_score);
            let suggestions = map.get("suggestions").map(json_suggestions).unwrap_or_default();
            (score, suggestions)
        }
        _ => parse_text_reply(reply),
    };

    let score = score.ok_or(ScoringError::MissingScore)?;
    ScoreCard::new(score, suggestions)
}

fn json_score(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => leading_integer(s.trim()),
        _ => None,
    }
}

fn json_suggestions(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
        Value::String(s) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn parse_text_reply(reply: &str) -> (Option<i64>, Vec<String>) {
    let mut score = None;
    let mut suggestions = Vec::new();

    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(found) = score_line(line) {
            if score.is_none() {
                score = found;
            }
            continue;
        }
        if is_suggestions_heading(line) {
            continue;
        }
        if let Some(bullet) = strip_bullet(line) {
            suggestions.push(bullet.to_string());
        } else if suggestions.is_empty() {
            // free text before the first bullet
            suggestions.push(line.to_string());
        }
    }

    (score, suggestions)
}

/// `Some(_)` when the line is an `ATS Score:` line; the inner value is the parsed score, if any.
/// The label must open the line, after any bullet marker and markdown emphasis.
fn score_line(line: &str) -> Option<Option<i64>> {
    const LABEL: &str = "ats score";
    let is_markup = |c: char| c == '*' || c == '#' || c.is_whitespace();

    let body = strip_bullet(line).unwrap_or(line).trim_start_matches(is_markup);
    let label = body.get(..LABEL.len())?;
    if !label.eq_ignore_ascii_case(LABEL) {
        return None;
    }
    let rest = body[LABEL.len()..]
        .trim_start_matches(is_markup)
        .strip_prefix(':')?
        .trim_start_matches(is_markup);
    Some(leading_integer(rest))
}

fn leading_integer(s: &str) -> Option<i64> {
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    // Overlong digit runs are out of range either way.
    Some(digits.parse::<i64>().unwrap_or(i64::MAX))
}

fn is_suggestions_heading(line: &str) -> bool {
    line.trim_matches(|c: char| c == '*' || c == '#' || c.is_whitespace())
        .to_ascii_lowercase()
        .starts_with("suggestions")
}

fn strip_bullet(line: &str) -> Option<&str> {
    ["- ", "* ", "• ", "-", "•"]
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
