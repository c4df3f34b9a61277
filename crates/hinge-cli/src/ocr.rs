use std::io::Write;
use std::process::{Child, Command as ProcessCommand, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use hinge_engine::{ScreenshotRef, TextRecognizer};

/// Runs the `tesseract` binary with the screenshot on stdin.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    program: String,
    lang: String,
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            lang: lang.into(),
        }
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&mut self, screenshot: &ScreenshotRef) -> Result<String> {
        let mut child = ProcessCommand::new(&self.program)
            .args(["stdin", "stdout", "-l", self.lang.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to launch {}", self.program))?;

        feed_stdin(&mut child, screenshot.bytes())?;
        let output = child
            .wait_with_output()
            .context("tesseract did not finish")?;
        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        log::debug!("OCR {}: {}", screenshot.label(), text.trim());
        Ok(text)
    }
}

/// Writes `bytes` to the child's stdin and closes it. On failure the child is
/// killed and reaped before the error is returned.
fn feed_stdin(child: &mut Child, bytes: &[u8]) -> Result<()> {
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin
            .write_all(bytes)
            .context("failed piping screenshot to tesseract"),
        None => Err(anyhow!("tesseract stdin unavailable")),
    };
    if written.is_err() {
        let _ = child.kill();
        let _ = child.wait();
    }
    written
}
