use hinge_contracts::config::{HingeConfig, TimeoutConfig};
use hinge_contracts::layout::{Point, UiLayout, WindowBounds};
use hinge_contracts::screen_text::{ScreenKind, ScreenTextStrings};
use serde::Serialize;

use crate::compare::ImageComparator;
use crate::ports::Device;
use crate::screenshot::ScreenshotRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementState {
    Idle,
    PhotoOpened,
    CommentBoxFocused,
    CommentTyped,
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngagementReport {
    pub state: EngagementState,
    /// Last state reached before the failing step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<EngagementState>,
    /// Whether the heart click visibly changed the screen; `None` when either
    /// capture failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heart_changed_screen: Option<bool>,
}

impl EngagementReport {
    fn failed(at: EngagementState, heart_changed_screen: Option<bool>) -> Self {
        Self {
            state: EngagementState::Failed,
            failed_step: Some(at),
            heart_changed_screen,
        }
    }

    pub fn is_sent(&self) -> bool {
        self.state == EngagementState::Sent
    }
}

/// Click sequences for liking, commenting and skipping.
pub struct EngagementDriver {
    layout: UiLayout,
    bounds: WindowBounds,
    comparator: ImageComparator,
    timeouts: TimeoutConfig,
    ai_suffix: Option<String>,
    screen_text: ScreenTextStrings,
}

impl EngagementDriver {
    pub fn new(config: &HingeConfig, bounds: WindowBounds) -> Self {
        Self {
            layout: config.layout.clone(),
            bounds,
            comparator: ImageComparator::new(config.comparison.clone()),
            timeouts: config.timeouts.clone(),
            ai_suffix: config
                .comment
                .ai_suffix
                .clone()
                .filter(|suffix| !suffix.trim().is_empty()),
            screen_text: config.screen_text.clone(),
        }
    }

    pub fn compose_comment(&self, comment: &str) -> String {
        match &self.ai_suffix {
            Some(suffix) => format!("{} {}", comment.trim(), suffix.trim()),
            None => comment.trim().to_string(),
        }
    }

    /// Heart, comment box, type, send. Stops at the first failed action; the
    /// caller must not retry a failed post.
    pub fn like_and_comment(&self, device: &mut Device, comment: &str) -> EngagementReport {
        if comment.trim().is_empty() {
            log::warn!("refusing to engage without a comment");
            return EngagementReport::failed(EngagementState::Idle, None);
        }

        let heart = self.layout.heart;
        let Some((after, changed)) = self.click_with_diff(device, heart, "heart") else {
            log::error!("heart click at ({}, {}) failed", heart.x, heart.y);
            return EngagementReport::failed(EngagementState::Idle, None);
        };
        log::info!("state -> {:?}", EngagementState::PhotoOpened);

        if let Some(after) = after {
            self.handle_rose_prompt(device, &after);
        }

        let comment_box = self.layout.comment_box_for(&self.bounds);
        if !device.input.click(comment_box.x, comment_box.y) {
            log::error!("comment box click at ({}, {}) failed", comment_box.x, comment_box.y);
            return EngagementReport::failed(EngagementState::PhotoOpened, changed);
        }
        device.pause.pause(self.timeouts.settle());
        log::info!("state -> {:?}", EngagementState::CommentBoxFocused);

        let text = self.compose_comment(comment);
        if !device.input.type_text(&text) {
            log::error!("typing comment failed");
            return EngagementReport::failed(EngagementState::CommentBoxFocused, changed);
        }
        device.pause.pause(self.timeouts.settle());
        log::info!("state -> {:?}", EngagementState::CommentTyped);

        let send = self.layout.send;
        if !device.input.click(send.x, send.y) {
            log::error!("send click at ({}, {}) failed", send.x, send.y);
            return EngagementReport::failed(EngagementState::CommentTyped, changed);
        }
        device.pause.pause(self.timeouts.interaction_delay());
        log::info!("state -> {:?}: {text}", EngagementState::Sent);

        EngagementReport {
            state: EngagementState::Sent,
            failed_step: None,
            heart_changed_screen: changed,
        }
    }

    /// Dismisses the current profile. Returns whether the click landed.
    pub fn skip(&self, device: &mut Device) -> bool {
        let cross = self.layout.cross;
        match self.click_with_diff(device, cross, "skip") {
            Some(_) => {
                log::info!("skipped profile");
                true
            }
            None => {
                log::error!("skip click at ({}, {}) failed", cross.x, cross.y);
                false
            }
        }
    }

    /// Clicks `point` between two captures. `None` when the click itself
    /// failed; otherwise the after-capture and whether the screen changed.
    fn click_with_diff(
        &self,
        device: &mut Device,
        point: Point,
        name: &str,
    ) -> Option<(Option<ScreenshotRef>, Option<bool>)> {
        let before = self.capture(device, &format!("{name}_before.png"));
        if !device.input.click(point.x, point.y) {
            return None;
        }
        device.pause.pause(self.timeouts.interaction_delay());
        let after = self.capture(device, &format!("{name}_after.png"));

        let changed = match (&before, &after) {
            (Some(before), Some(after)) => {
                let similar = self.comparator.are_similar(before, after);
                if similar {
                    log::warn!(
                        "{name} click at ({}, {}) left the screen unchanged; continuing",
                        point.x,
                        point.y
                    );
                }
                Some(!similar)
            }
            _ => None,
        };
        Some((after, changed))
    }

    fn capture(&self, device: &mut Device, label: &str) -> Option<ScreenshotRef> {
        match device.capture.capture(Some(&self.bounds), label) {
            Ok(shot) => Some(shot),
            Err(err) => {
                log::warn!("capture {label} failed: {err:#}");
                None
            }
        }
    }

    fn handle_rose_prompt(&self, device: &mut Device, after_heart: &ScreenshotRef) {
        let Some(text) = device.recognize(after_heart) else {
            return;
        };
        if self.screen_text.classify(&text) != Some(ScreenKind::SendRoseInstead) {
            return;
        }
        match self.layout.send_like_anyway {
            Some(point) => {
                log::info!("rose prompt shown; choosing \"{}\"", self.screen_text.send_like_anyway);
                if device.input.click(point.x, point.y) {
                    device.pause.pause(self.timeouts.interaction_delay());
                } else {
                    log::warn!("send-like-anyway click at ({}, {}) failed", point.x, point.y);
                }
            }
            None => log::warn!("rose prompt shown but no send_like_anyway position is configured"),
        }
    }
}
