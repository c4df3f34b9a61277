//! Screenshot similarity, tolerant to anti-aliasing and compression noise.

use hinge_contracts::config::{CompareStrategy, ComparisonConfig};
use image::{DynamicImage, GenericImageView};
use image_hasher::{HashAlg, HasherConfig};

use crate::screenshot::ScreenshotRef;

#[derive(Debug, Clone, Default)]
pub struct ImageComparator {
    config: ComparisonConfig,
}

impl ImageComparator {
    pub fn new(config: ComparisonConfig) -> Self {
        Self { config }
    }

    /// True when `a` and `b` show the same content. Undecodable input and
    /// mismatched dimensions are never similar.
    pub fn are_similar(&self, a: &ScreenshotRef, b: &ScreenshotRef) -> bool {
        let (Some(left), Some(right)) = (decode(a), decode(b)) else {
            return false;
        };
        if left.dimensions() != right.dimensions() {
            log::debug!(
                "{} and {} differ in size ({:?} vs {:?})",
                a.label(),
                b.label(),
                left.dimensions(),
                right.dimensions()
            );
            return false;
        }

        match self.config.strategy {
            CompareStrategy::PerceptualHash => {
                let distance = hash_distance(&left, &right);
                log::debug!("hash distance {} -> {}: {distance}", a.label(), b.label());
                distance < self.config.hash_distance_threshold
            }
            CompareStrategy::SampledPixels => {
                let ratio = sampled_diff_ratio(&left, &right, self.config.sample_stride);
                log::debug!("sampled diff {} -> {}: {ratio:.4}", a.label(), b.label());
                ratio < self.config.sample_diff_ratio
            }
        }
    }
}

fn decode(shot: &ScreenshotRef) -> Option<DynamicImage> {
    match image::load_from_memory(shot.bytes()) {
        Ok(img) => Some(img),
        Err(err) => {
            log::warn!("could not decode {} ({}): {err}", shot.label(), shot.id());
            None
        }
    }
}

/// Hamming distance between 8x8 gradient hashes.
pub fn hash_distance(left: &DynamicImage, right: &DynamicImage) -> u32 {
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::Gradient)
        .hash_size(8, 8)
        .to_hasher();
    hasher.hash_image(left).dist(&hasher.hash_image(right))
}

/// Fraction of pixels on a `stride` grid whose RGBA value differs.
/// Both images must have the same dimensions.
pub fn sampled_diff_ratio(left: &DynamicImage, right: &DynamicImage, stride: u32) -> f64 {
    let stride = stride.max(1) as usize;
    let left = left.to_rgba8();
    let right = right.to_rgba8();
    let (width, height) = left.dimensions();

    let mut sampled = 0u64;
    let mut differing = 0u64;
    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            sampled += 1;
            if left.get_pixel(x, y) != right.get_pixel(x, y) {
                differing += 1;
            }
        }
    }
    if sampled == 0 {
        return 0.0;
    }
    differing as f64 / sampled as f64
}
