use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::layout::UiLayout;
use crate::preferences::{GreenFlags, PreferenceRules, RedFlagRules, DEFAULT_QUICK_RATING_THRESHOLD};
use crate::screen_text::ScreenTextStrings;

pub const CONFIG_PATH_ENV: &str = "HINGE_CONFIG";
pub const DEFAULT_AI_SUFFIX: &str = "-AI gen";
/// Upper bound for every `*_s` wait or timeout setting.
pub const MAX_WAIT_S: f64 = 3600.0;

/// Whole-run configuration. Every section defaults independently, so a JSON
/// file only needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HingeConfig {
    pub timeouts: TimeoutConfig,
    pub ratings: RatingConfig,
    pub scroll: ScrollConfig,
    pub comparison: ComparisonConfig,
    pub ollama: OllamaConfig,
    pub layout: UiLayout,
    pub comment: CommentConfig,
    pub parser: ParserConfig,
    pub screen_text: ScreenTextStrings,
    pub preferences: PreferencesConfig,
}

impl HingeConfig {
    /// Loads `path` (or `$HINGE_CONFIG`) over the defaults, then applies
    /// environment overrides. No file at all is not an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = non_empty_env(CONFIG_PATH_ENV);
        let path = path.map(Path::to_path_buf).or_else(|| from_env.map(Into::into));
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed reading config {}", path.display()))?;
                Self::from_json_str(&raw)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(raw)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Rejects waits that are negative or longer than [`MAX_WAIT_S`].
    pub fn validate(&self) -> Result<()> {
        let waits = [
            ("timeouts.profile_load_s", self.timeouts.profile_load_s),
            ("timeouts.scroll_wait_s", self.timeouts.scroll_wait_s),
            ("timeouts.interaction_delay_s", self.timeouts.interaction_delay_s),
            ("timeouts.settle_s", self.timeouts.settle_s),
            ("ollama.timeout_s", self.ollama.timeout_s),
            ("ollama.backoff_step_s", self.ollama.backoff_step_s),
            ("ollama.backoff_cap_s", self.ollama.backoff_cap_s),
        ];
        for (name, value) in waits {
            if !(0.0..=MAX_WAIT_S).contains(&value) {
                bail!("{name} must be between 0 and {MAX_WAIT_S} seconds, got {value}");
            }
        }
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(host) = non_empty_env("OLLAMA_HOST") {
            self.ollama.host = normalize_host(&host);
        }
        if let Some(model) = non_empty_env("HINGE_OLLAMA_MODEL") {
            self.ollama.model = model;
        }
    }

    pub fn preference_rules(&self) -> PreferenceRules {
        PreferenceRules::new(
            self.preferences.red_flags.clone().unwrap_or_default(),
            self.preferences.green_flags.clone(),
            self.ratings.quick_threshold,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub profile_load_s: f64,
    pub scroll_wait_s: f64,
    pub interaction_delay_s: f64,
    pub settle_s: f64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            profile_load_s: 10.0,
            scroll_wait_s: 2.0,
            interaction_delay_s: 1.0,
            settle_s: 0.5,
        }
    }
}

impl TimeoutConfig {
    pub fn profile_load(&self) -> Duration {
        seconds(self.profile_load_s)
    }

    pub fn scroll_wait(&self) -> Duration {
        seconds(self.scroll_wait_s)
    }

    pub fn interaction_delay(&self) -> Duration {
        seconds(self.interaction_delay_s)
    }

    pub fn settle(&self) -> Duration {
        seconds(self.settle_s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    pub engagement_threshold: u8,
    pub quick_threshold: u8,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            engagement_threshold: 6,
            quick_threshold: DEFAULT_QUICK_RATING_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub max_scrolls: usize,
    pub identical_threshold: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            max_scrolls: 10,
            identical_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareStrategy {
    PerceptualHash,
    SampledPixels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    pub strategy: CompareStrategy,
    pub hash_distance_threshold: u32,
    pub sample_stride: u32,
    pub sample_diff_ratio: f64,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            strategy: CompareStrategy::PerceptualHash,
            hash_distance_threshold: 5,
            sample_stride: 50,
            sample_diff_ratio: 0.02,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
    pub host: String,
    pub options: Map<String, Value>,
    pub timeout_s: f64,
    pub max_retries: usize,
    pub backoff_step_s: f64,
    pub backoff_cap_s: f64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "gemma3:4b".to_string(),
            host: "http://localhost:11434".to_string(),
            options: json!({ "temperature": 0.7, "num_predict": 256 })
                .as_object()
                .cloned()
                .unwrap_or_default(),
            timeout_s: 30.0,
            max_retries: 2,
            backoff_step_s: 1.5,
            backoff_cap_s: 5.0,
        }
    }
}

impl OllamaConfig {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_s)
    }

    pub fn backoff_step(&self) -> Duration {
        seconds(self.backoff_step_s)
    }

    pub fn backoff_cap(&self) -> Duration {
        seconds(self.backoff_cap_s)
    }

    /// Same settings against a different host; nothing global changes.
    pub fn with_host(&self, host: &str) -> Self {
        Self {
            host: normalize_host(host),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentConfig {
    pub ai_suffix: Option<String>,
}

impl Default for CommentConfig {
    fn default() -> Self {
        Self {
            ai_suffix: Some(DEFAULT_AI_SUFFIX.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub repair_attempts: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { repair_attempts: 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Replaces the built-in red-flag table when present.
    pub red_flags: Option<RedFlagRules>,
    pub green_flags: GreenFlags,
}

/// Seconds to a `Duration`, clamped to `0..=MAX_WAIT_S`; NaN is zero.
pub fn seconds(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value.clamp(0.0, MAX_WAIT_S)).unwrap_or(Duration::ZERO)
}

fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{seconds, CompareStrategy, HingeConfig, MAX_WAIT_S};
    use crate::layout::Point;

    #[test]
    fn defaults_match_documented_values() {
        let config = HingeConfig::default();
        assert_eq!(config.ratings.engagement_threshold, 6);
        assert_eq!(config.ratings.quick_threshold, 4);
        assert_eq!(config.scroll.max_scrolls, 10);
        assert_eq!(config.scroll.identical_threshold, 2);
        assert_eq!(config.timeouts.profile_load(), Duration::from_secs(10));
        assert_eq!(config.ollama.model, "gemma3:4b");
        assert_eq!(config.ollama.options["num_predict"], json!(256));
        assert_eq!(config.parser.repair_attempts, 2);
        assert_eq!(config.comparison.strategy, CompareStrategy::PerceptualHash);
    }

    #[test]
    fn partial_json_overrides_only_named_keys() -> anyhow::Result<()> {
        let config = HingeConfig::from_json_str(
            r#"{
                "ratings": { "engagement_threshold": 8 },
                "layout": { "comment_box": { "x": 540, "y": 1500 } },
                "comparison": { "strategy": "sampled_pixels" }
            }"#,
        )?;
        assert_eq!(config.ratings.engagement_threshold, 8);
        assert_eq!(config.ratings.quick_threshold, 4);
        assert_eq!(config.layout.comment_box, Some(Point::new(540, 1500)));
        assert_eq!(config.layout.heart, Point::new(1107, 779));
        assert_eq!(config.comparison.strategy, CompareStrategy::SampledPixels);
        assert_eq!(config.comparison.sample_stride, 50);
        Ok(())
    }

    #[test]
    fn oversized_wait_is_rejected() {
        let err = HingeConfig::from_json_str(r#"{ "timeouts": { "profile_load_s": 1e20 } }"#)
            .err()
            .map(|err| err.to_string())
            .unwrap_or_default();
        assert!(err.contains("timeouts.profile_load_s"), "{err}");
        assert!(HingeConfig::from_json_str(r#"{ "ollama": { "backoff_step_s": -1 } }"#).is_err());
    }

    #[test]
    fn hand_built_waits_are_clamped() {
        let mut config = HingeConfig::default();
        config.timeouts.profile_load_s = 1e20;
        config.timeouts.settle_s = -3.0;
        config.ollama.timeout_s = f64::NAN;
        assert_eq!(
            config.timeouts.profile_load(),
            Duration::from_secs_f64(MAX_WAIT_S)
        );
        assert_eq!(config.timeouts.settle(), Duration::ZERO);
        assert_eq!(config.ollama.timeout(), Duration::ZERO);
        assert_eq!(seconds(0.25), Duration::from_millis(250));
    }

    #[test]
    fn load_reads_file_from_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("hinge.json");
        std::fs::write(&path, r#"{ "scroll": { "max_scrolls": 3 } }"#)?;
        let config = HingeConfig::load(Some(&path))?;
        assert_eq!(config.scroll.max_scrolls, 3);
        Ok(())
    }

    #[test]
    fn load_reports_missing_file() {
        let err = HingeConfig::load(Some(std::path::Path::new("/nonexistent/hinge.json")))
            .err()
            .map(|err| format!("{err:#}"))
            .unwrap_or_default();
        assert!(err.contains("failed reading config"));
    }

    #[test]
    fn alternate_host_is_a_new_value() {
        let config = HingeConfig::default();
        let alt = config.ollama.with_host("10.0.0.5:11434/");
        assert_eq!(alt.host, "http://10.0.0.5:11434");
        assert_eq!(config.ollama.host, "http://localhost:11434");
        assert_eq!(alt.model, config.ollama.model);
    }

    #[test]
    fn custom_red_flags_replace_defaults() -> anyhow::Result<()> {
        let config = HingeConfig::from_json_str(
            r#"{
                "preferences": {
                    "red_flags": {
                        "cats": { "keywords": ["cat lady"], "severity": "low", "reason": "allergies" }
                    }
                },
                "ratings": { "quick_threshold": 5 }
            }"#,
        )?;
        let rules = config.preference_rules();
        assert_eq!(rules.quick_rating_threshold(), 5);
        assert_eq!(rules.red_flags().names().count(), 1);
        assert!(rules.has_red_flag("proud CAT LADY").0);
        assert!(!rules.has_red_flag("smoker").0);
        Ok(())
    }
}
