use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use crate::compare::ImageComparator;

/// Encoded screenshot bytes plus a short content id for log context.
/// Clones share the buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ScreenshotRef {
    label: String,
    id: String,
    bytes: Arc<[u8]>,
}

impl ScreenshotRef {
    pub fn from_bytes(label: impl Into<String>, bytes: Vec<u8>) -> Self {
        let id = content_id(&bytes);
        Self {
            label: label.into(),
            id,
            bytes: bytes.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let label = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("screenshot.png")
            .to_string();
        Ok(Self::from_bytes(label, bytes))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn save_in(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("failed creating {}", dir.display()))?;
        let path = dir.join(&self.label);
        fs::write(&path, self.bytes())
            .with_context(|| format!("failed writing {}", path.display()))?;
        Ok(path)
    }
}

impl fmt::Debug for ScreenshotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenshotRef")
            .field("label", &self.label)
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn content_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..4])
}

/// Ordered screenshots of the profile currently on screen.
#[derive(Debug, Clone, Default)]
pub struct ProfileScreenshotSequence {
    shots: Vec<ScreenshotRef>,
}

impl ProfileScreenshotSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, shot: ScreenshotRef) {
        self.shots.push(shot);
    }

    pub fn last(&self) -> Option<&ScreenshotRef> {
        self.shots.last()
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    /// Label for the next capture: `profile_001.png`, `profile_002.png`, ...
    pub fn next_label(&self) -> String {
        format!("profile_{:03}.png", self.shots.len() + 1)
    }

    /// Drops the final screenshot when it shows the same content as the one
    /// before it.
    pub fn trim_trailing_duplicate(&mut self, comparator: &ImageComparator) -> Option<ScreenshotRef> {
        let len = self.shots.len();
        if len < 2 {
            return None;
        }
        if comparator.are_similar(&self.shots[len - 2], &self.shots[len - 1]) {
            return self.shots.pop();
        }
        None
    }

    pub fn as_slice(&self) -> &[ScreenshotRef] {
        &self.shots
    }

    pub fn labels(&self) -> Vec<String> {
        self.shots.iter().map(|shot| shot.label().to_string()).collect()
    }
}
