//! Android device access over `adb`: screencap for capture, `input` for taps,
//! text and swipes.

use std::io::Cursor;
use std::process::Command as ProcessCommand;

use anyhow::{bail, Context, Result};
use hinge_contracts::layout::WindowBounds;
use hinge_engine::{InputDevice, ScreenCapture, ScreenshotRef};
use image::ImageFormat;

const SWIPE_DURATION_MS: u32 = 300;

#[derive(Debug, Clone)]
pub struct AdbDevice {
    program: String,
    base_args: Vec<String>,
}

impl AdbDevice {
    /// `command` may carry extra arguments (`"adb -H 10.0.0.2"`); it is
    /// split with shell quoting rules.
    pub fn new(command: &str, serial: Option<&str>) -> Result<Self> {
        let mut parts = shell_words::split(command)
            .with_context(|| format!("invalid adb command: {command}"))?;
        if parts.is_empty() {
            bail!("adb command is empty");
        }
        let program = parts.remove(0);
        if let Some(serial) = serial.map(str::trim).filter(|value| !value.is_empty()) {
            parts.push("-s".to_string());
            parts.push(serial.to_string());
        }
        Ok(Self {
            program,
            base_args: parts,
        })
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = ProcessCommand::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .output()
            .with_context(|| format!("failed to launch {}", self.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "{} {} exited with {}: {}",
                self.program,
                args.join(" "),
                output.status,
                stderr.trim()
            );
        }
        Ok(output.stdout)
    }

    fn shell(&self, args: &[&str]) -> bool {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        match self.run(&full) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("adb shell {} failed: {err:#}", args.join(" "));
                false
            }
        }
    }

    /// Display size reported by `wm size`; an override size wins over the
    /// physical one.
    pub fn window_bounds(&self) -> Result<WindowBounds> {
        let stdout = self.run(&["shell", "wm", "size"])?;
        let text = String::from_utf8_lossy(&stdout);
        let (width, height) = parse_wm_size(&text)
            .with_context(|| format!("unrecognized `wm size` output: {}", text.trim()))?;
        Ok(WindowBounds::new(0, 0, width, height))
    }
}

impl ScreenCapture for AdbDevice {
    fn capture(&mut self, region: Option<&WindowBounds>, label: &str) -> Result<ScreenshotRef> {
        let png = self
            .run(&["exec-out", "screencap", "-p"])
            .context("screencap failed")?;
        if png.is_empty() {
            bail!("screencap returned no data");
        }
        let bytes = match region {
            Some(bounds) => crop_png(png, bounds)?,
            None => png,
        };
        Ok(ScreenshotRef::from_bytes(label, bytes))
    }
}

impl InputDevice for AdbDevice {
    fn click(&mut self, x: i32, y: i32) -> bool {
        log::debug!("tap ({x}, {y})");
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])
    }

    fn type_text(&mut self, text: &str) -> bool {
        let encoded = encode_input_text(text);
        if encoded.is_empty() {
            return false;
        }
        self.shell(&["input", "text", &encoded])
    }

    fn swipe(&mut self, from_x: i32, from_y: i32, to_x: i32, to_y: i32) -> bool {
        log::debug!("swipe ({from_x}, {from_y}) -> ({to_x}, {to_y})");
        self.shell(&[
            "input",
            "swipe",
            &from_x.to_string(),
            &from_y.to_string(),
            &to_x.to_string(),
            &to_y.to_string(),
            &SWIPE_DURATION_MS.to_string(),
        ])
    }
}

pub fn parse_wm_size(output: &str) -> Option<(u32, u32)> {
    let mut physical = None;
    let mut overridden = None;
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let Some((width, height)) = value.trim().split_once('x') else {
            continue;
        };
        let (Ok(width), Ok(height)) = (width.trim().parse(), height.trim().parse()) else {
            continue;
        };
        if key.trim().eq_ignore_ascii_case("override size") {
            overridden = Some((width, height));
        } else {
            physical = Some((width, height));
        }
    }
    overridden.or(physical)
}

/// `input text` takes one shell word with spaces written as `%s`.
pub fn encode_input_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join("%s");
    if collapsed.is_empty() {
        return collapsed;
    }
    shell_words::quote(&collapsed).into_owned()
}

/// Crops to `bounds` unless they already cover the whole frame.
fn crop_png(png: Vec<u8>, bounds: &WindowBounds) -> Result<Vec<u8>> {
    let img = image::load_from_memory(&png).context("screencap returned an unreadable image")?;
    let full = WindowBounds::new(0, 0, img.width(), img.height());
    if *bounds == full {
        return Ok(png);
    }
    let left = bounds.left.max(0) as u32;
    let top = bounds.top.max(0) as u32;
    if left >= img.width() || top >= img.height() {
        bail!(
            "window bounds {bounds:?} fall outside the {}x{} screen",
            img.width(),
            img.height()
        );
    }
    let width = bounds.width.min(img.width() - left);
    let height = bounds.height.min(img.height() - top);
    let cropped = img.crop_imm(left, top, width, height);
    let mut out = Cursor::new(Vec::new());
    cropped
        .write_to(&mut out, ImageFormat::Png)
        .context("failed encoding cropped screenshot")?;
    Ok(out.into_inner())
}
