//! Known interstitial screens, recognized from OCR text.

use serde::{Deserialize, Serialize};

pub const DAILY_LIMIT_MESSAGE: &str = "Limit of daily profiles reached";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenKind {
    SendRoseInstead,
    DailyLimitReached,
    ProfileNotAvailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenTextStrings {
    pub send_rose_instead: String,
    pub send_like_anyway: String,
    pub daily_limit_reached: Vec<String>,
    pub profile_not_available: String,
}

impl Default for ScreenTextStrings {
    fn default() -> Self {
        Self {
            send_rose_instead: "send a rose instead".to_string(),
            send_like_anyway: "send like anyway".to_string(),
            daily_limit_reached: vec![
                "daily limit reached".to_string(),
                DAILY_LIMIT_MESSAGE.to_string(),
            ],
            profile_not_available: "profile not available".to_string(),
        }
    }
}

impl ScreenTextStrings {
    /// Classifies recognized text. Daily limit is checked first because it
    /// ends the run regardless of what else is on screen.
    pub fn classify(&self, recognized: &str) -> Option<ScreenKind> {
        let haystack = normalize(recognized);
        let contains = |needle: &str| {
            let needle = normalize(needle);
            !needle.is_empty() && haystack.contains(&needle)
        };

        if self.daily_limit_reached.iter().any(|item| contains(item)) {
            return Some(ScreenKind::DailyLimitReached);
        }
        if contains(&self.send_rose_instead) {
            return Some(ScreenKind::SendRoseInstead);
        }
        if contains(&self.profile_not_available) {
            return Some(ScreenKind::ProfileNotAvailable);
        }
        None
    }
}

/// Lowercases and collapses whitespace; OCR output breaks lines mid-phrase.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
