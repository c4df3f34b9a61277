use std::fs;
use std::path::PathBuf;

use hinge_contracts::analysis::{AnalysisResult, QuickAnalysisResult};
use hinge_contracts::config::{HingeConfig, ScrollConfig, TimeoutConfig};
use hinge_contracts::events::{self, EventPayload, EventWriter};
use hinge_contracts::layout::{scroll_swipe, WindowBounds};
use hinge_contracts::screen_text::{ScreenKind, ScreenTextStrings};
use serde::Serialize;
use serde_json::{json, Value};

use crate::analyzer::ProfileAnalyzer;
use crate::compare::ImageComparator;
use crate::driver::{EngagementDriver, EngagementReport};
use crate::ports::Device;
use crate::screenshot::{ProfileScreenshotSequence, ScreenshotRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProfileOutcome {
    CaptureFailed,
    DailyLimitReached,
    ProfileUnavailable {
        skipped: bool,
    },
    QuickFiltered {
        quick: QuickAnalysisResult,
        skipped: bool,
    },
    Skipped {
        analysis: AnalysisResult,
        skipped: bool,
    },
    Engaged {
        analysis: AnalysisResult,
        report: EngagementReport,
    },
}

/// Runs one profile end to end: load, triage, scroll, analyze, act.
pub struct PipelineOrchestrator {
    bounds: WindowBounds,
    timeouts: TimeoutConfig,
    scroll: ScrollConfig,
    screen_text: ScreenTextStrings,
    comparator: ImageComparator,
    device: Device,
    analyzer: ProfileAnalyzer,
    driver: EngagementDriver,
    events: Option<EventWriter>,
    screenshot_dir: Option<PathBuf>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: &HingeConfig,
        bounds: WindowBounds,
        device: Device,
        analyzer: ProfileAnalyzer,
    ) -> Self {
        Self {
            bounds,
            timeouts: config.timeouts.clone(),
            scroll: config.scroll.clone(),
            screen_text: config.screen_text.clone(),
            comparator: ImageComparator::new(config.comparison.clone()),
            device,
            analyzer,
            driver: EngagementDriver::new(config, bounds),
            events: None,
            screenshot_dir: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    /// Keeps a copy of every retained profile screenshot in `dir`.
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    pub fn process_profile(&mut self) -> ProfileOutcome {
        self.emit(events::PROFILE_STARTED, json!({ "bounds": self.bounds }));
        self.device.pause.pause(self.timeouts.profile_load());

        let mut sequence = ProfileScreenshotSequence::new();
        let first = match self.capture(&sequence.next_label()) {
            Some(shot) => shot,
            None => {
                log::error!("first capture failed; nothing to analyze");
                return self.finish(ProfileOutcome::CaptureFailed);
            }
        };
        self.retain(&mut sequence, first.clone());

        if let Some(text) = self.device.recognize(&first) {
            match self.screen_text.classify(&text) {
                Some(ScreenKind::DailyLimitReached) => {
                    log::warn!("daily profile limit reached; stopping");
                    return self.finish(ProfileOutcome::DailyLimitReached);
                }
                Some(ScreenKind::ProfileNotAvailable) => {
                    log::info!("profile not available; moving on");
                    let skipped = self.skip_and_wait();
                    return self.finish(ProfileOutcome::ProfileUnavailable { skipped });
                }
                _ => {}
            }
        }

        let quick = self.analyzer.quick_analyze(&first);
        self.emit(events::QUICK_ANALYSIS, json!(quick));
        if !self.analyzer.should_continue_full_analysis(&quick) {
            log::info!(
                "quick filter rejected profile (rating {}, red flags {})",
                quick.rating,
                quick.has_red_flags
            );
            let skipped = self.skip_and_wait();
            return self.finish(ProfileOutcome::QuickFiltered { quick, skipped });
        }

        self.scroll_profile(&mut sequence);
        if let Some(dropped) = sequence.trim_trailing_duplicate(&self.comparator) {
            log::debug!("dropped trailing duplicate {}", dropped.label());
            self.forget(&dropped);
        }
        self.emit(
            events::SCROLL_COMPLETE,
            json!({ "screenshots": sequence.len(), "labels": sequence.labels() }),
        );

        let analysis = self.analyzer.analyze(sequence.as_slice());
        if analysis.is_degraded() {
            log::warn!("analysis degraded ({:?}): {}", analysis.failure(), analysis.reason());
        }
        self.emit(events::ANALYSIS_RESULT, json!(analysis));

        let comment = analysis
            .comment()
            .filter(|_| self.analyzer.should_engage(&analysis))
            .map(str::to_string);
        let Some(comment) = comment else {
            let skipped = self.skip_and_wait();
            return self.finish(ProfileOutcome::Skipped { analysis, skipped });
        };

        let report = self.driver.like_and_comment(&mut self.device, &comment);
        if !report.is_sent() {
            log::error!(
                "comment not posted (stopped after {:?}); not retrying",
                report.failed_step
            );
        }
        self.emit(events::ENGAGEMENT, json!(report));
        self.device.pause.pause(self.timeouts.profile_load());
        self.finish(ProfileOutcome::Engaged { analysis, report })
    }

    /// Swipes through the profile until the screen stops changing or the
    /// scroll cap is hit. A single unchanged frame is kept since it may be a
    /// transient state; reaching the identical threshold discards the frame.
    fn scroll_profile(&mut self, sequence: &mut ProfileScreenshotSequence) {
        let swipe = scroll_swipe(&self.bounds);
        let mut identical = 0usize;

        for iteration in 0..self.scroll.max_scrolls {
            if !self
                .device
                .input
                .swipe(swipe.from.x, swipe.from.y, swipe.to.x, swipe.to.y)
            {
                log::warn!("swipe {} failed; ending scroll", iteration + 1);
                break;
            }
            self.device.pause.pause(self.timeouts.scroll_wait());

            let Some(shot) = self.capture(&sequence.next_label()) else {
                log::warn!("capture after swipe {} failed; ending scroll", iteration + 1);
                break;
            };

            let similar = sequence
                .last()
                .map(|last| self.comparator.are_similar(last, &shot))
                .unwrap_or(false);
            if similar {
                identical += 1;
                if identical >= self.scroll.identical_threshold {
                    log::info!(
                        "end of profile after {} swipes ({} identical frames)",
                        iteration + 1,
                        identical
                    );
                    break;
                }
            } else {
                identical = 0;
            }
            self.retain(sequence, shot);
        }
    }

    fn skip_and_wait(&mut self) -> bool {
        let skipped = self.driver.skip(&mut self.device);
        self.device.pause.pause(self.timeouts.profile_load());
        skipped
    }

    fn capture(&mut self, label: &str) -> Option<ScreenshotRef> {
        match self.device.capture.capture(Some(&self.bounds), label) {
            Ok(shot) => {
                log::debug!("captured {} ({})", shot.label(), shot.id());
                Some(shot)
            }
            Err(err) => {
                log::warn!("capture {label} failed: {err:#}");
                None
            }
        }
    }

    fn retain(&self, sequence: &mut ProfileScreenshotSequence, shot: ScreenshotRef) {
        if let Some(dir) = &self.screenshot_dir {
            if let Err(err) = shot.save_in(dir) {
                log::warn!("could not keep {}: {err:#}", shot.label());
            }
        }
        sequence.push(shot);
    }

    /// Removes the kept copy of a screenshot that left the sequence.
    fn forget(&self, shot: &ScreenshotRef) {
        let Some(dir) = &self.screenshot_dir else {
            return;
        };
        let path = dir.join(shot.label());
        if let Err(err) = fs::remove_file(&path) {
            log::warn!("could not remove {}: {err}", path.display());
        }
    }

    fn finish(&self, outcome: ProfileOutcome) -> ProfileOutcome {
        self.emit(events::PROFILE_FINISHED, json!(outcome));
        outcome
    }

    fn emit(&self, event_type: &str, payload: Value) {
        let Some(writer) = &self.events else {
            return;
        };
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = EventPayload::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        if let Err(err) = writer.emit(event_type, payload) {
            log::warn!("failed writing {event_type} event: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use hinge_contracts::config::HingeConfig;
    use hinge_contracts::events::EventWriter;
    use serde_json::Value;

    use super::{PipelineOrchestrator, ProfileOutcome};
    use crate::analyzer::ProfileAnalyzer;
    use crate::ports::Device;
    use crate::testing::{
        fake_device, scripted_gateway, test_bounds, Action, FakeInputBehavior, FakeRecognizer,
        Journal,
    };

    const QUICK_OK: &str =
        r#"{"rating": 7, "decision": "NEXT_PROFILE", "comment": "N/A", "reason": "friendly smile"}"#;
    const QUICK_LOW: &str =
        r#"{"rating": 3, "decision": "NEXT_PROFILE", "comment": "N/A", "reason": "not my type"}"#;
    const FULL_ENGAGE: &str = r#"{"rating": 8, "decision": "ENGAGE", "comment": "Love the hiking pics!", "reason": "great vibe"}"#;
    const FULL_PASS: &str =
        r#"{"rating": 5, "decision": "NEXT_PROFILE", "comment": "N/A", "reason": "little in common"}"#;

    fn orchestrator(
        journal: &Journal,
        device: Device,
        replies: Vec<Result<&str, &str>>,
    ) -> PipelineOrchestrator {
        let config = HingeConfig::default();
        let analyzer = ProfileAnalyzer::from_config(scripted_gateway(journal, replies), &config);
        PipelineOrchestrator::new(&config, test_bounds(), device, analyzer)
    }

    fn seeds(range: std::ops::RangeInclusive<u64>) -> Vec<Option<u64>> {
        range.map(Some).collect()
    }

    #[test]
    fn low_quick_rating_skips_once_without_full_analysis() {
        let journal = Journal::default();
        let device = fake_device(&journal, &seeds(1..=3), FakeInputBehavior::default());
        let outcome = orchestrator(&journal, device, vec![Ok(QUICK_LOW)]).process_profile();

        let ProfileOutcome::QuickFiltered { quick, skipped } = outcome else {
            panic!("expected quick filter, got {outcome:?}");
        };
        assert_eq!(quick.rating, 3);
        assert!(skipped);
        assert_eq!(journal.clicks(), vec![(810, 854)]);
        assert_eq!(journal.swipes(), 0);
        assert_eq!(journal.generations().len(), 1);

        let actions = journal.actions();
        assert_eq!(actions.first(), Some(&Action::Pause(Duration::from_secs(10))));
        assert_eq!(actions.last(), Some(&Action::Pause(Duration::from_secs(10))));
    }

    #[test]
    fn engaging_profile_scrolls_then_likes_and_comments() {
        let journal = Journal::default();
        let device = fake_device(&journal, &seeds(1..=3), FakeInputBehavior::default());
        let outcome =
            orchestrator(&journal, device, vec![Ok(QUICK_OK), Ok(FULL_ENGAGE)]).process_profile();

        let ProfileOutcome::Engaged { analysis, report } = outcome else {
            panic!("expected engagement, got {outcome:?}");
        };
        assert_eq!(analysis.rating(), 8);
        assert!(report.is_sent());

        let generations = journal.generations();
        assert_eq!(generations.len(), 2);
        assert_eq!(generations[0].1, 1);
        // Frames 1, 2, 3 and one repeat of 3 are kept; the trailing repeat is trimmed.
        assert_eq!(generations[1].1, 3);

        let ui: Vec<Action> = journal
            .ui_actions()
            .into_iter()
            .filter(|action| !matches!(action, Action::Swipe(..)))
            .collect();
        assert_eq!(
            ui,
            vec![
                Action::Click(1107, 779),
                Action::Click(540, 1536),
                Action::Type("Love the hiking pics! -AI gen".to_string()),
                Action::Click(1047, 552),
            ]
        );
        assert_eq!(journal.swipes(), 4);
        assert_eq!(
            journal.actions().first(),
            Some(&Action::Pause(Duration::from_secs(10)))
        );
        assert_eq!(
            journal.actions().last(),
            Some(&Action::Pause(Duration::from_secs(10)))
        );
    }

    #[test]
    fn fenced_full_reply_is_repaired_before_engaging() {
        let journal = Journal::default();
        let fenced = "```json\n{\"rating\": 8, \"decision\": \"ENGAGE\", \"comment\": \"Cute pup!\", \"reason\": \"dog person\"}\n```";
        let device = fake_device(&journal, &seeds(1..=2), FakeInputBehavior::default());
        let outcome = orchestrator(&journal, device, vec![Ok(QUICK_OK), Ok(fenced), Ok(fenced)])
            .process_profile();

        let ProfileOutcome::Engaged { analysis, report } = outcome else {
            panic!("expected engagement, got {outcome:?}");
        };
        assert_eq!(analysis.comment(), Some("Cute pup!"));
        assert!(report.is_sent());
        let generations = journal.generations();
        assert_eq!(generations.len(), 3);
        assert!(generations[2].0.contains("could not be parsed"));
    }

    #[test]
    fn scroll_cap_keeps_eleven_distinct_frames() {
        let journal = Journal::default();
        let device = fake_device(&journal, &seeds(1..=11), FakeInputBehavior::default());
        let outcome =
            orchestrator(&journal, device, vec![Ok(QUICK_OK), Ok(FULL_PASS)]).process_profile();

        assert!(matches!(outcome, ProfileOutcome::Skipped { skipped: true, .. }));
        assert_eq!(journal.swipes(), 10);
        assert_eq!(journal.generations()[1].1, 11);
    }

    #[test]
    fn identical_frames_end_the_scroll_loop() {
        let journal = Journal::default();
        // Screen never changes after the first frame.
        let device = fake_device(&journal, &seeds(1..=1), FakeInputBehavior::default());
        let outcome =
            orchestrator(&journal, device, vec![Ok(QUICK_OK), Ok(FULL_PASS)]).process_profile();

        assert!(matches!(outcome, ProfileOutcome::Skipped { .. }));
        assert_eq!(journal.swipes(), 2);
        assert_eq!(journal.generations()[1].1, 1);
    }

    #[test]
    fn failed_swipe_analyzes_what_was_captured() {
        let journal = Journal::default();
        let device = fake_device(
            &journal,
            &seeds(1..=3),
            FakeInputBehavior {
                fail_swipe: true,
                ..FakeInputBehavior::default()
            },
        );
        orchestrator(&journal, device, vec![Ok(QUICK_OK), Ok(FULL_PASS)]).process_profile();
        assert_eq!(journal.swipes(), 1);
        assert_eq!(journal.generations()[1].1, 1);
    }

    #[test]
    fn first_capture_failure_aborts_quietly() {
        let journal = Journal::default();
        let device = fake_device(&journal, &[None], FakeInputBehavior::default());
        let outcome = orchestrator(&journal, device, Vec::new()).process_profile();
        assert_eq!(outcome, ProfileOutcome::CaptureFailed);
        assert!(journal.generations().is_empty());
        assert!(journal.clicks().is_empty());
    }

    #[test]
    fn daily_limit_screen_stops_before_any_model_call() {
        let journal = Journal::default();
        let device = fake_device(&journal, &seeds(1..=2), FakeInputBehavior::default())
            .with_recognizer(Box::new(FakeRecognizer::new(
                journal.clone(),
                "Limit of daily\nprofiles reached",
            )));
        let outcome = orchestrator(&journal, device, vec![Ok(QUICK_OK)]).process_profile();
        assert_eq!(outcome, ProfileOutcome::DailyLimitReached);
        assert!(journal.generations().is_empty());
        assert!(journal.clicks().is_empty());
    }

    #[test]
    fn unavailable_profile_is_skipped_without_analysis() {
        let journal = Journal::default();
        let device = fake_device(&journal, &seeds(1..=2), FakeInputBehavior::default())
            .with_recognizer(Box::new(FakeRecognizer::new(
                journal.clone(),
                "This profile\nnot available",
            )));
        let outcome = orchestrator(&journal, device, vec![Ok(QUICK_OK)]).process_profile();
        assert_eq!(outcome, ProfileOutcome::ProfileUnavailable { skipped: true });
        assert!(journal.generations().is_empty());
        assert_eq!(journal.clicks(), vec![(810, 854)]);
        assert_eq!(
            journal.actions().last(),
            Some(&Action::Pause(Duration::from_secs(10)))
        );
    }

    #[test]
    fn saved_screenshots_match_the_analyzed_frames() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let shots_dir = temp.path().join("shots");
        let journal = Journal::default();
        let device = fake_device(&journal, &seeds(1..=3), FakeInputBehavior::default());
        orchestrator(&journal, device, vec![Ok(QUICK_OK), Ok(FULL_PASS)])
            .with_screenshot_dir(&shots_dir)
            .process_profile();

        let analyzed = journal.generations()[1].1;
        let mut on_disk: Vec<String> = fs::read_dir(&shots_dir)?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<Result<_, _>>()?;
        on_disk.sort();
        assert_eq!(analyzed, 3);
        assert_eq!(
            on_disk,
            vec!["profile_001.png", "profile_002.png", "profile_003.png"]
        );
        Ok(())
    }

    #[test]
    fn failed_analysis_skips_and_records_events() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let shots_dir = temp.path().join("shots");
        let journal = Journal::default();
        let device = fake_device(&journal, &seeds(1..=2), FakeInputBehavior::default());
        let outcome = orchestrator(
            &journal,
            device,
            vec![Ok(QUICK_OK), Err("timeout"), Err("timeout"), Err("timeout")],
        )
        .with_events(EventWriter::new(&events_path, "run-test"))
        .with_screenshot_dir(&shots_dir)
        .process_profile();

        let ProfileOutcome::Skipped { analysis, skipped } = outcome else {
            panic!("expected skip, got {outcome:?}");
        };
        assert_eq!(analysis.rating(), 0);
        assert!(skipped);

        let types: Vec<String> = fs::read_to_string(&events_path)?
            .lines()
            .map(|line| serde_json::from_str::<Value>(line))
            .collect::<Result<Vec<_>, _>>()?
            .iter()
            .map(|event| event["type"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            types,
            vec![
                "profile_started",
                "quick_analysis",
                "scroll_complete",
                "analysis_result",
                "profile_finished",
            ]
        );
        assert!(shots_dir.join("profile_001.png").exists());
        assert!(shots_dir.join("profile_002.png").exists());
        Ok(())
    }
}
