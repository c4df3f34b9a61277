//! Fakes and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use hinge_contracts::layout::WindowBounds;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::gateway::{ModelGateway, ProviderRequest, RetryPolicy, TextModelProvider};
use crate::ports::{Device, InputDevice, Pause, ScreenCapture, TextRecognizer};
use crate::screenshot::ScreenshotRef;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Capture(String),
    Click(i32, i32),
    Type(String),
    Swipe(i32, i32, i32, i32),
    Pause(Duration),
    Generate { prompt: String, images: usize },
    Recognize(String),
}

#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<Action>>>,
}

impl Journal {
    pub fn record(&self, action: Action) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(action);
        }
    }

    pub fn actions(&self) -> Vec<Action> {
        self.entries.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::Click(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    pub fn swipes(&self) -> usize {
        self.actions()
            .iter()
            .filter(|action| matches!(action, Action::Swipe(..)))
            .count()
    }

    pub fn typed(&self) -> Vec<String> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::Type(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn generations(&self) -> Vec<(String, usize)> {
        self.actions()
            .into_iter()
            .filter_map(|action| match action {
                Action::Generate { prompt, images } => Some((prompt, images)),
                _ => None,
            })
            .collect()
    }

    /// Clicks, typing and swipes only, in order.
    pub fn ui_actions(&self) -> Vec<Action> {
        self.actions()
            .into_iter()
            .filter(|action| {
                matches!(
                    action,
                    Action::Click(..) | Action::Type(_) | Action::Swipe(..)
                )
            })
            .collect()
    }
}

/// Grayscale 9x8 grid of blocks with seed-dependent brightness, so the
/// gradient hash of two different seeds differs in many bits.
pub fn pattern_image(width: u32, height: u32, seed: u64) -> DynamicImage {
    let block_w = (width / 9).max(1);
    let block_h = (height / 8).max(1);
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let bx = (x / block_w) as u64;
        let by = (y / block_h) as u64;
        let mut state = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(bx.wrapping_mul(1442695040888963407))
            .wrapping_add(by.wrapping_mul(2862933555777941757));
        state ^= state >> 33;
        state = state.wrapping_mul(0xff51afd7ed558ccd);
        state ^= state >> 33;
        let luma = (state & 0xff) as u8;
        Rgba([luma, luma, luma, 255])
    });
    DynamicImage::ImageRgba8(img)
}

pub fn encode_png(img: &DynamicImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("png encode");
    out.into_inner()
}

pub fn pattern_png(label: &str, seed: u64) -> ScreenshotRef {
    ScreenshotRef::from_bytes(label, encode_png(&pattern_image(90, 80, seed)))
}

pub fn test_bounds() -> WindowBounds {
    WindowBounds::new(0, 0, 1080, 1920)
}

/// Returns queued frames in order; once drained, keeps returning the last
/// one (a static screen). Seeds of `None` simulate capture failures.
pub struct FakeCapture {
    journal: Journal,
    frames: VecDeque<Option<u64>>,
    last: Option<u64>,
}

impl FakeCapture {
    pub fn new(journal: Journal, frames: &[Option<u64>]) -> Self {
        Self {
            journal,
            frames: frames.iter().copied().collect(),
            last: None,
        }
    }
}

impl ScreenCapture for FakeCapture {
    fn capture(&mut self, _region: Option<&WindowBounds>, label: &str) -> Result<ScreenshotRef> {
        self.journal.record(Action::Capture(label.to_string()));
        let next = match self.frames.pop_front() {
            Some(frame) => frame,
            None => self.last,
        };
        let Some(seed) = next else {
            bail!("capture failed");
        };
        self.last = Some(seed);
        Ok(pattern_png(label, seed))
    }
}

#[derive(Default)]
pub struct FakeInputBehavior {
    pub fail_clicks_at: Vec<(i32, i32)>,
    pub fail_type: bool,
    pub fail_swipe: bool,
}

pub struct FakeInput {
    journal: Journal,
    behavior: FakeInputBehavior,
}

impl FakeInput {
    pub fn new(journal: Journal, behavior: FakeInputBehavior) -> Self {
        Self { journal, behavior }
    }
}

impl InputDevice for FakeInput {
    fn click(&mut self, x: i32, y: i32) -> bool {
        self.journal.record(Action::Click(x, y));
        !self.behavior.fail_clicks_at.contains(&(x, y))
    }

    fn type_text(&mut self, text: &str) -> bool {
        self.journal.record(Action::Type(text.to_string()));
        !self.behavior.fail_type
    }

    fn swipe(&mut self, from_x: i32, from_y: i32, to_x: i32, to_y: i32) -> bool {
        self.journal
            .record(Action::Swipe(from_x, from_y, to_x, to_y));
        !self.behavior.fail_swipe
    }
}

/// Returns the same OCR text for every screenshot.
pub struct FakeRecognizer {
    journal: Journal,
    text: String,
}

impl FakeRecognizer {
    pub fn new(journal: Journal, text: &str) -> Self {
        Self {
            journal,
            text: text.to_string(),
        }
    }
}

impl TextRecognizer for FakeRecognizer {
    fn recognize(&mut self, screenshot: &ScreenshotRef) -> Result<String> {
        self.journal
            .record(Action::Recognize(screenshot.label().to_string()));
        Ok(self.text.clone())
    }
}

pub struct RecordingPause {
    journal: Journal,
}

impl RecordingPause {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl Pause for RecordingPause {
    fn pause(&self, duration: Duration) {
        self.journal.record(Action::Pause(duration));
    }
}

/// Replies with queued responses; `Err` entries simulate provider failures.
pub struct ScriptedProvider {
    journal: Journal,
    replies: Mutex<VecDeque<Result<String, String>>>,
}

impl ScriptedProvider {
    pub fn new(journal: Journal, replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            journal,
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
        }
    }
}

impl TextModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate(&self, request: &ProviderRequest) -> Result<String> {
        self.journal.record(Action::Generate {
            prompt: request.prompt.clone(),
            images: request.images.len(),
        });
        let next = self
            .replies
            .lock()
            .map_err(|_| anyhow!("scripted provider lock poisoned"))?
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}

pub fn scripted_gateway(journal: &Journal, replies: Vec<Result<&str, &str>>) -> ModelGateway {
    ModelGateway::new(
        Box::new(ScriptedProvider::new(journal.clone(), replies)),
        serde_json::Map::new(),
        RetryPolicy::default(),
        Arc::new(RecordingPause::new(journal.clone())),
    )
}

pub fn fake_device(journal: &Journal, frames: &[Option<u64>], behavior: FakeInputBehavior) -> Device {
    Device::new(
        Box::new(FakeCapture::new(journal.clone(), frames)),
        Box::new(FakeInput::new(journal.clone(), behavior)),
        Arc::new(RecordingPause::new(journal.clone())),
    )
}
