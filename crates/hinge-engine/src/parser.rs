//! Strict JSON parsing of model replies, with a model-assisted repair pass
//! when the strict parse fails.

use hinge_contracts::analysis::{
    AnalysisFailure, AnalysisResult, Decision, QuickAnalysisResult, DEFAULT_RATING, MAX_RATING,
    MIN_RATING, UNRATED,
};
use hinge_contracts::prompts;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::gateway::{truncate_text, GatewayError, GenerateRequest, ModelGateway};

pub const REPAIR_TEMPERATURE: f64 = 0.1;

#[derive(Debug, Error)]
pub enum ResponseParseError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("repair request failed: {0}")]
    RepairUnavailable(#[source] GatewayError),
}

pub fn parse_full_json(raw: &str) -> Result<AnalysisResult, ResponseParseError> {
    let object = parse_object(raw)?;
    let (rating, invalid_note) = read_rating(&object, MIN_RATING);
    let decision = object
        .get("decision")
        .and_then(Value::as_str)
        .and_then(Decision::parse)
        .unwrap_or(Decision::NextProfile);
    let comment = object
        .get("comment")
        .and_then(Value::as_str)
        .map(str::to_string);
    let reason = invalid_note.unwrap_or_else(|| read_reason(&object));
    Ok(AnalysisResult::parsed(rating, decision, comment, reason))
}

/// Quick replies use the same schema; a rating of 0 is allowed here.
pub fn parse_quick_json(raw: &str) -> Result<QuickAnalysisResult, ResponseParseError> {
    let object = parse_object(raw)?;
    let (rating, invalid_note) = read_rating(&object, UNRATED);
    let reason = invalid_note.unwrap_or_else(|| read_reason(&object));
    Ok(QuickAnalysisResult::new(rating, reason))
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, ResponseParseError> {
    match serde_json::from_str::<Value>(raw.trim())? {
        Value::Object(object) => Ok(object),
        _ => Err(ResponseParseError::NotAnObject),
    }
}

fn read_rating(object: &Map<String, Value>, min: u8) -> (u8, Option<String>) {
    let value = object.get("rating").cloned().unwrap_or(Value::Null);
    match value.as_i64() {
        Some(rating) if rating >= i64::from(min) && rating <= i64::from(MAX_RATING) => {
            (rating as u8, None)
        }
        _ => (
            DEFAULT_RATING,
            Some(format!("Invalid rating value: {value}, using default")),
        ),
    }
}

fn read_reason(object: &Map<String, Value>) -> String {
    object
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Removes a surrounding ``` fence (optionally tagged `json`) and any text
/// outside it.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    let body_start = after_open.find('\n').map(|idx| idx + 1).unwrap_or(0);
    let tag = after_open[..body_start].trim();
    let body = if tag.is_empty() || tag.eq_ignore_ascii_case("json") {
        &after_open[body_start..]
    } else {
        after_open
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

pub struct ResponseParser<'a> {
    gateway: &'a ModelGateway,
    repair_attempts: usize,
}

impl<'a> ResponseParser<'a> {
    pub fn new(gateway: &'a ModelGateway, repair_attempts: usize) -> Self {
        Self {
            gateway,
            repair_attempts,
        }
    }

    pub fn parse_full(&self, raw: &str) -> AnalysisResult {
        match parse_full_json(raw) {
            Ok(result) => result,
            Err(first) => match self.repair(raw, first, parse_full_json) {
                Ok(result) => result,
                Err(err @ ResponseParseError::RepairUnavailable(_)) => {
                    log::error!("full analysis reply left unrepaired: {err}");
                    AnalysisResult::degraded(
                        AnalysisFailure::Generation,
                        UNRATED,
                        format!("Analysis failed: {err}"),
                    )
                }
                Err(err) => {
                    log::error!("giving up on full analysis reply: {err}");
                    AnalysisResult::degraded(
                        AnalysisFailure::Parse,
                        DEFAULT_RATING,
                        format!("Failed to parse response: {err}"),
                    )
                }
            },
        }
    }

    pub fn parse_quick(&self, raw: &str) -> QuickAnalysisResult {
        match parse_quick_json(raw) {
            Ok(result) => result,
            Err(first) => match self.repair(raw, first, parse_quick_json) {
                Ok(result) => result,
                Err(err @ ResponseParseError::RepairUnavailable(_)) => {
                    log::error!("quick analysis reply left unrepaired: {err}");
                    QuickAnalysisResult::new(UNRATED, format!("quick analysis failed: {err}"))
                }
                Err(err) => {
                    log::error!("giving up on quick analysis reply: {err}");
                    QuickAnalysisResult::new(
                        DEFAULT_RATING,
                        format!("Failed to parse response: {err}"),
                    )
                }
            },
        }
    }

    fn repair<T>(
        &self,
        raw: &str,
        first: ResponseParseError,
        parse: fn(&str) -> Result<T, ResponseParseError>,
    ) -> Result<T, ResponseParseError> {
        log::warn!(
            "strict parse failed ({first}); raw reply: {}",
            truncate_text(raw, 200)
        );
        let mut last = first;
        for attempt in 1..=self.repair_attempts {
            let request = GenerateRequest::new(prompts::repair_prompt(raw))
                .with_system(prompts::system_prompt())
                .with_option("temperature", REPAIR_TEMPERATURE);
            let repaired = match self.gateway.generate(request) {
                Ok(text) => text,
                Err(err) => {
                    log::warn!("repair attempt {attempt} could not reach the model: {err}");
                    return Err(ResponseParseError::RepairUnavailable(err));
                }
            };
            match parse(strip_code_fences(&repaired)) {
                Ok(value) => {
                    log::info!("reply repaired on attempt {attempt}");
                    return Ok(value);
                }
                Err(err) => {
                    log::warn!(
                        "repair attempt {attempt}/{} still unparseable ({err}): {}",
                        self.repair_attempts,
                        truncate_text(&repaired, 200)
                    );
                    last = err;
                }
            }
        }
        Err(last)
    }
}
