use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUICK_RATING_THRESHOLD: u8 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlagRule {
    pub keywords: Vec<String>,
    pub severity: Severity,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlagMatch {
    pub flag_name: String,
    pub keyword_found: String,
    pub severity: Severity,
    pub reason: String,
}

/// Red-flag table keyed by flag name, kept in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RedFlagRules {
    rules: IndexMap<String, RedFlagRule>,
}

impl RedFlagRules {
    pub fn new(rules: Option<IndexMap<String, RedFlagRule>>) -> Self {
        Self {
            rules: rules.unwrap_or_else(default_red_flags),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// First keyword (rule order, then keyword order) found anywhere in `text`,
    /// compared case-insensitively. No scoring across multiple matches.
    pub fn first_match(&self, text: &str) -> Option<RedFlagMatch> {
        let haystack = text.to_lowercase();
        for (flag_name, rule) in &self.rules {
            for keyword in &rule.keywords {
                if keyword.is_empty() {
                    continue;
                }
                if haystack.contains(&keyword.to_lowercase()) {
                    return Some(RedFlagMatch {
                        flag_name: flag_name.clone(),
                        keyword_found: keyword.clone(),
                        severity: rule.severity,
                        reason: rule.reason.clone(),
                    });
                }
            }
        }
        None
    }
}

impl Default for RedFlagRules {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Positive traits the full-analysis prompt asks the model to weigh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenFlags {
    pub min_age: u8,
    pub max_age: u8,
    pub education: Vec<String>,
    pub exercise_habits: Vec<String>,
    pub interests: Vec<String>,
}

impl Default for GreenFlags {
    fn default() -> Self {
        Self {
            min_age: 22,
            max_age: 35,
            education: vec!["Bachelor's".to_string()],
            exercise_habits: strings(&["Regular exercise", "Active lifestyle", "Gym", "Sports"]),
            interests: strings(&["Travel", "Reading", "Music", "Art", "Sports", "Cooking"]),
        }
    }
}

/// Static rule set consulted before spending a multi-image model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceRules {
    red_flags: RedFlagRules,
    green_flags: GreenFlags,
    quick_rating_threshold: u8,
}

impl PreferenceRules {
    pub fn new(red_flags: RedFlagRules, green_flags: GreenFlags, quick_rating_threshold: u8) -> Self {
        Self {
            red_flags,
            green_flags,
            quick_rating_threshold,
        }
    }

    pub fn has_red_flag(&self, text: &str) -> (bool, Option<RedFlagMatch>) {
        let details = self.red_flags.first_match(text);
        (details.is_some(), details)
    }

    pub fn quick_rating_threshold(&self) -> u8 {
        self.quick_rating_threshold
    }

    pub fn red_flags(&self) -> &RedFlagRules {
        &self.red_flags
    }

    pub fn green_flags(&self) -> &GreenFlags {
        &self.green_flags
    }
}

impl Default for PreferenceRules {
    fn default() -> Self {
        Self::new(
            RedFlagRules::default(),
            GreenFlags::default(),
            DEFAULT_QUICK_RATING_THRESHOLD,
        )
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| (*item).to_string()).collect()
}

fn default_red_flags() -> IndexMap<String, RedFlagRule> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, keywords: &[&str], severity: Severity, reason: &str| {
        map.insert(
            name.to_string(),
            RedFlagRule {
                keywords: strings(keywords),
                severity,
                reason: reason.to_string(),
            },
        );
    };

    insert(
        "smoking",
        &["smoker", "smoking", "cigarettes", "vape", "tobacco"],
        Severity::High,
        "Smoking is associated with lower relationship satisfaction and health issues",
    );
    insert(
        "heavy_drinking",
        &["heavy drinker", "party every night", "blackout", "alcoholism"],
        Severity::High,
        "Heavy drinking correlates with relationship conflict and dissatisfaction",
    );
    insert(
        "political_extremism",
        &["far right", "far left", "extremist", "radical", "political zealot"],
        Severity::Medium,
        "Political extremism is linked to higher relationship conflict",
    );
    insert(
        "kids_dealbreaker",
        &["no kids ever", "anti-children", "hate kids", "never want children"],
        Severity::High,
        "Child preferences are fundamental compatibility factors",
    );
    insert(
        "religious_fundamentalism",
        &["fundamentalist", "extremely religious", "bible thumper", "jihad"],
        Severity::Medium,
        "Religious extremism correlates with relationship difficulties",
    );
    insert(
        "criminal_history",
        &["felon", "prison", "arrested", "criminal record", "jail time"],
        Severity::High,
        "Criminal history significantly impacts relationship viability",
    );
    insert(
        "severe_mental_health",
        &["bipolar disorder", "schizophrenia", "borderline personality", "psychosis"],
        Severity::High,
        "Severe mental health conditions require careful consideration",
    );

    map
}
