use hinge_contracts::analysis::{
    AnalysisFailure, AnalysisResult, Decision, QuickAnalysisResult, UNRATED,
};
use hinge_contracts::config::HingeConfig;
use hinge_contracts::preferences::PreferenceRules;
use hinge_contracts::prompts;

use crate::gateway::{GenerateRequest, ModelGateway};
use crate::parser::ResponseParser;
use crate::screenshot::ScreenshotRef;

const QUICK_TEMPERATURE: f64 = 0.3;
const QUICK_NUM_PREDICT: u64 = 128;
const FULL_TEMPERATURE: f64 = 0.7;
const FULL_NUM_PREDICT: u64 = 512;

/// Turns screenshots into ratings and decisions. Never fails: every error is
/// folded into a degraded result.
pub struct ProfileAnalyzer {
    gateway: ModelGateway,
    rules: PreferenceRules,
    engagement_threshold: u8,
    repair_attempts: usize,
}

impl ProfileAnalyzer {
    pub fn new(
        gateway: ModelGateway,
        rules: PreferenceRules,
        engagement_threshold: u8,
        repair_attempts: usize,
    ) -> Self {
        Self {
            gateway,
            rules,
            engagement_threshold,
            repair_attempts,
        }
    }

    pub fn from_config(gateway: ModelGateway, config: &HingeConfig) -> Self {
        Self::new(
            gateway,
            config.preference_rules(),
            config.ratings.engagement_threshold,
            config.parser.repair_attempts,
        )
    }

    fn parser(&self) -> ResponseParser<'_> {
        ResponseParser::new(&self.gateway, self.repair_attempts)
    }

    pub fn quick_analyze(&self, screenshot: &ScreenshotRef) -> QuickAnalysisResult {
        let request = GenerateRequest::new(prompts::quick_analysis_prompt())
            .with_system(prompts::system_prompt())
            .with_option("temperature", QUICK_TEMPERATURE)
            .with_option("num_predict", QUICK_NUM_PREDICT)
            .with_images([screenshot.clone()]);

        let raw = match self.gateway.generate(request) {
            Ok(raw) => raw,
            Err(err) => {
                log::error!("quick analysis of {} failed: {err:#}", screenshot.label());
                return QuickAnalysisResult::new(UNRATED, format!("quick analysis failed: {err}"));
            }
        };

        let (_, red_flag) = self.rules.has_red_flag(&raw);
        let quick = self.parser().parse_quick(&raw).with_red_flag(red_flag);
        match &quick.red_flag_details {
            Some(found) => log::info!(
                "quick analysis: rating {} with red flag {} ({:?}, keyword {:?})",
                quick.rating,
                found.flag_name,
                found.severity,
                found.keyword_found
            ),
            None => log::info!("quick analysis: rating {} ({})", quick.rating, quick.reason),
        }
        quick
    }

    /// Red flags reject regardless of rating.
    pub fn should_continue_full_analysis(&self, quick: &QuickAnalysisResult) -> bool {
        if quick.has_red_flags {
            return false;
        }
        quick.rating >= self.rules.quick_rating_threshold()
    }

    pub fn analyze(&self, screenshots: &[ScreenshotRef]) -> AnalysisResult {
        if screenshots.is_empty() {
            log::warn!("full analysis requested with no screenshots");
            return AnalysisResult::no_screenshots();
        }

        let request = GenerateRequest::new(prompts::full_analysis_prompt(
            self.rules.green_flags(),
            screenshots.len(),
        ))
        .with_system(prompts::system_prompt())
        .with_option("temperature", FULL_TEMPERATURE)
        .with_option("num_predict", FULL_NUM_PREDICT)
        .with_images(screenshots.iter().cloned());

        match self.gateway.generate(request) {
            Ok(raw) => {
                let result = self.parser().parse_full(&raw);
                log::info!(
                    "full analysis over {} screenshots: rating {} decision {} ({})",
                    screenshots.len(),
                    result.rating(),
                    result.decision().as_str(),
                    result.reason()
                );
                result
            }
            Err(err) => {
                log::error!("full analysis failed: {err:#}");
                AnalysisResult::degraded(
                    AnalysisFailure::Generation,
                    UNRATED,
                    format!("Analysis failed: {err}"),
                )
            }
        }
    }

    /// The model's own decision still has to clear the numeric floor.
    pub fn should_engage(&self, result: &AnalysisResult) -> bool {
        result.decision() == Decision::Engage
            && result.rating() >= self.engagement_threshold
            && result.comment().is_some()
    }
}
