//! Seams to the collaborators the pipeline drives but does not implement:
//! screen capture, input injection, OCR, and wall-clock waiting.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use hinge_contracts::layout::WindowBounds;

use crate::screenshot::ScreenshotRef;

pub trait ScreenCapture {
    /// Captures `region` (whole device screen when `None`). The same region
    /// must map to the same pixels across calls while bounds are unchanged.
    fn capture(&mut self, region: Option<&WindowBounds>, label: &str) -> Result<ScreenshotRef>;
}

/// Raw input injection. Only success/failure is reported back.
pub trait InputDevice {
    fn click(&mut self, x: i32, y: i32) -> bool;
    fn type_text(&mut self, text: &str) -> bool;
    fn swipe(&mut self, from_x: i32, from_y: i32, to_x: i32, to_y: i32) -> bool;
}

pub trait TextRecognizer {
    fn recognize(&mut self, screenshot: &ScreenshotRef) -> Result<String>;
}

/// Blocking wait used for every settle/load delay.
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// Everything the pipeline needs from the mirrored phone.
pub struct Device {
    pub capture: Box<dyn ScreenCapture>,
    pub input: Box<dyn InputDevice>,
    pub recognizer: Option<Box<dyn TextRecognizer>>,
    pub pause: Arc<dyn Pause>,
}

impl Device {
    pub fn new(
        capture: Box<dyn ScreenCapture>,
        input: Box<dyn InputDevice>,
        pause: Arc<dyn Pause>,
    ) -> Self {
        Self {
            capture,
            input,
            recognizer: None,
            pause,
        }
    }

    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// OCR text of `screenshot`, or `None` when no recognizer is attached or
    /// recognition fails.
    pub fn recognize(&mut self, screenshot: &ScreenshotRef) -> Option<String> {
        let recognizer = self.recognizer.as_mut()?;
        match recognizer.recognize(screenshot) {
            Ok(text) => Some(text),
            Err(err) => {
                log::warn!("OCR failed for {}: {err:#}", screenshot.label());
                None
            }
        }
    }
}
