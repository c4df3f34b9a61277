use serde::{Deserialize, Serialize, Serializer};

use crate::preferences::RedFlagMatch;

/// Wire value the model uses for "no comment".
pub const COMMENT_SENTINEL: &str = "N/A";
pub const MAX_COMMENT_CHARS: usize = 150;
pub const COMMENT_ELLIPSIS: &str = "...";
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 10;
pub const DEFAULT_RATING: u8 = 5;
pub const UNRATED: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Engage,
    NextProfile,
}

impl Decision {
    /// Case-insensitive; anything other than the two wire names is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ENGAGE" => Some(Self::Engage),
            "NEXT_PROFILE" => Some(Self::NextProfile),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engage => "ENGAGE",
            Self::NextProfile => "NEXT_PROFILE",
        }
    }
}

/// Why an analysis result is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisFailure {
    NoScreenshots,
    Generation,
    Parse,
}

/// Outcome of a full multi-image analysis.
///
/// Fields are private so the comment/decision invariant holds: a comment is
/// only ever present alongside [`Decision::Engage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    rating: u8,
    decision: Decision,
    #[serde(serialize_with = "serialize_comment")]
    comment: Option<String>,
    reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<AnalysisFailure>,
}

impl AnalysisResult {
    /// Builds a successfully parsed result. The rating is clamped to 1..=10,
    /// the comment is normalized (sentinel and blank become `None`, long text
    /// is truncated) and dropped entirely unless the decision is `Engage`.
    pub fn parsed(
        rating: u8,
        decision: Decision,
        comment: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        let comment = match decision {
            Decision::Engage => comment.and_then(normalize_comment),
            Decision::NextProfile => None,
        };
        Self {
            rating: rating.clamp(MIN_RATING, MAX_RATING),
            decision,
            comment,
            reason: reason.into(),
            failure: None,
        }
    }

    pub fn degraded(failure: AnalysisFailure, rating: u8, reason: impl Into<String>) -> Self {
        Self {
            rating: rating.min(MAX_RATING),
            decision: Decision::NextProfile,
            comment: None,
            reason: reason.into(),
            failure: Some(failure),
        }
    }

    pub fn no_screenshots() -> Self {
        Self::degraded(AnalysisFailure::NoScreenshots, UNRATED, "no screenshots")
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn failure(&self) -> Option<AnalysisFailure> {
        self.failure
    }

    pub fn is_degraded(&self) -> bool {
        self.failure.is_some()
    }
}

/// Outcome of the single-image triage pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickAnalysisResult {
    pub rating: u8,
    pub has_red_flags: bool,
    pub red_flag_details: Option<RedFlagMatch>,
    pub reason: String,
}

impl QuickAnalysisResult {
    pub fn new(rating: u8, reason: impl Into<String>) -> Self {
        Self {
            rating: rating.min(MAX_RATING),
            has_red_flags: false,
            red_flag_details: None,
            reason: reason.into(),
        }
    }

    pub fn with_red_flag(mut self, details: Option<RedFlagMatch>) -> Self {
        self.has_red_flags = details.is_some();
        self.red_flag_details = details;
        self
    }
}

/// Truncates to `MAX_COMMENT_CHARS`, keeping room for the ellipsis marker.
pub fn truncate_comment(comment: &str) -> String {
    if comment.chars().count() <= MAX_COMMENT_CHARS {
        return comment.to_string();
    }
    let keep = MAX_COMMENT_CHARS - COMMENT_ELLIPSIS.chars().count();
    comment.chars().take(keep).collect::<String>() + COMMENT_ELLIPSIS
}

fn normalize_comment(comment: String) -> Option<String> {
    let trimmed = comment.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(COMMENT_SENTINEL) {
        return None;
    }
    Some(truncate_comment(trimmed))
}

fn serialize_comment<S: Serializer>(comment: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(comment.as_deref().unwrap_or(COMMENT_SENTINEL))
}
