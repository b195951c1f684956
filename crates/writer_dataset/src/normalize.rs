//! Aspect-preserving resize onto a fixed canvas with polarity inversion.

use crate::types::Placement;
use image::imageops::FilterType;
use image::GrayImage;
use rand::Rng;

/// Canvas size as `(height, width)`, matching tensor layout.
pub type ScaleSize = (u32, u32);

pub const DEFAULT_SCALE_SIZE: ScaleSize = (64, 128);

/// Smallest canvas side; the network halves each side three times.
pub const MIN_SCALE_SIDE: u32 = 8;

/// Sub-rectangle of the canvas holding resized content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// Inverted grayscale canvas of exactly the requested scale size.
    pub canvas: GrayImage,
    pub content: ContentRect,
    /// `ratio_h < ratio_w`: the height reached the canvas first.
    pub height_limited: bool,
}

impl NormalizedImage {
    /// Row-major pixels rescaled to [0, 1].
    pub fn to_unit_f32(&self) -> Vec<f32> {
        self.canvas
            .as_raw()
            .iter()
            .map(|&v| v as f32 / 255.0)
            .collect()
    }
}

/// Dimensions `(width, height)` after fitting `(w, h)` inside `scale`.
pub fn fitted_dims(w: u32, h: u32, scale: ScaleSize) -> ((u32, u32), bool) {
    let (scale_h, scale_w) = scale;
    let ratio_h = scale_h as f64 / h as f64;
    let ratio_w = scale_w as f64 / w as f64;
    let ratio = ratio_h.min(ratio_w);
    let new_w = ((w as f64 * ratio).round() as u32).clamp(1, scale_w);
    let new_h = ((h as f64 * ratio).round() as u32).clamp(1, scale_h);
    ((new_w, new_h), ratio_h < ratio_w)
}

/// Top-left offset for content of `(w, h)` on a `scale` canvas.
pub fn placement_offset(
    w: u32,
    h: u32,
    scale: ScaleSize,
    placement: Placement,
    rng: &mut dyn rand::RngCore,
) -> (u32, u32) {
    let slack_h = scale.0 - h;
    let slack_w = scale.1 - w;
    match placement {
        Placement::Random => {
            let dy = rng.random_range(0..=slack_h);
            let dx = rng.random_range(0..=slack_w);
            (dx, dy)
        }
        Placement::Center => (slack_w / 2, slack_h / 2),
    }
}

/// Resize `img` to fit `scale`, invert it and place it on a zero canvas.
///
/// Callers must reject zero-sized images and canvases first; see
/// [`crate::WriterDataset::get`] and [`crate::DatasetConfig::validate`].
pub fn normalize(
    img: &GrayImage,
    scale: ScaleSize,
    placement: Placement,
    rng: &mut dyn rand::RngCore,
) -> NormalizedImage {
    let (w, h) = img.dimensions();
    debug_assert!(w > 0 && h > 0, "zero-sized image reached normalize");
    debug_assert!(scale.0 > 0 && scale.1 > 0, "zero-sized canvas reached normalize");
    let ((new_w, new_h), height_limited) = fitted_dims(w, h, scale);
    let mut resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);
    image::imageops::invert(&mut resized);

    let (dx, dy) = placement_offset(new_w, new_h, scale, placement, rng);
    let mut canvas = GrayImage::new(scale.1, scale.0);
    image::imageops::replace(&mut canvas, &resized, dx.into(), dy.into());

    NormalizedImage {
        canvas,
        content: ContentRect {
            x: dx,
            y: dy,
            width: new_w,
            height: new_h,
        },
        height_limited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn white_page(w: u32, h: u32) -> GrayImage {
        GrayImage::from_pixel(w, h, Luma([255]))
    }

    #[test]
    fn output_is_always_scale_size() {
        let mut rng = StdRng::seed_from_u64(7);
        for (w, h) in [(10, 10), (300, 40), (40, 300), (128, 64), (1, 1), (1000, 1000)] {
            let out = normalize(&white_page(w, h), (64, 128), Placement::Random, &mut rng);
            assert_eq!(out.canvas.dimensions(), (128, 64), "input {w}x{h}");
            assert!(out.content.x + out.content.width <= 128);
            assert!(out.content.y + out.content.height <= 64);
        }
    }

    #[test]
    fn aspect_ratio_is_preserved() {
        for (w, h) in [(300, 40), (40, 300), (500, 250), (77, 13), (20, 10)] {
            let ((nw, nh), _) = fitted_dims(w, h, (64, 128));
            // Each side is within half a pixel of the exact scaled size.
            let skew = (nw as f64 * h as f64 - nh as f64 * w as f64).abs();
            assert!(skew <= 0.5 * (w + h) as f64, "{w}x{h} -> {nw}x{nh}");
        }
    }

    #[test]
    fn large_images_are_downscaled_to_the_binding_side() {
        let ((nw, nh), height_limited) = fitted_dims(256, 256, (64, 128));
        assert_eq!((nw, nh), (64, 64));
        assert!(height_limited);

        let ((nw, nh), height_limited) = fitted_dims(1280, 100, (64, 128));
        assert_eq!((nw, nh), (128, 10));
        assert!(!height_limited);
    }

    #[test]
    fn center_placement_is_floor_of_half_slack() {
        let mut rng = StdRng::seed_from_u64(0);
        let img = white_page(33, 21);
        let a = normalize(&img, (64, 128), Placement::Center, &mut rng);
        let b = normalize(&img, (64, 128), Placement::Center, &mut rng);
        let ((nw, nh), _) = fitted_dims(33, 21, (64, 128));
        assert_eq!(a.content.x, (128 - nw) / 2);
        assert_eq!(a.content.y, (64 - nh) / 2);
        assert_eq!(a.content, b.content);
        assert_eq!(a.canvas.as_raw(), b.canvas.as_raw());
    }

    #[test]
    fn inversion_makes_paper_background_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut img = white_page(64, 32);
        img.put_pixel(10, 10, Luma([0]));
        let out = normalize(&img, (64, 128), Placement::Center, &mut rng);
        // Scales by 2 exactly; paper becomes 0 and ink stays bright.
        assert_eq!(out.content.width, 128);
        assert_eq!(out.content.height, 64);
        let max = *out.canvas.as_raw().iter().max().unwrap();
        assert!(max > 0);
        assert_eq!(out.canvas.get_pixel(0, 0)[0], 0);
        let unit = out.to_unit_f32();
        assert!(unit.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn background_outside_content_is_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        let img = GrayImage::from_pixel(20, 20, Luma([0]));
        let out = normalize(&img, (64, 128), Placement::Random, &mut rng);
        let r = out.content;
        for (x, y, p) in out.canvas.enumerate_pixels() {
            let inside = x >= r.x && x < r.x + r.width && y >= r.y && y < r.y + r.height;
            if inside {
                assert_eq!(p[0], 255);
            } else {
                assert_eq!(p[0], 0);
            }
        }
    }

    /// Pearson chi-square statistic against a uniform expectation.
    fn chi_square(counts: &[usize]) -> f64 {
        let trials: usize = counts.iter().sum();
        let expected = trials as f64 / counts.len() as f64;
        counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum()
    }

    #[test]
    fn random_offsets_cover_range_uniformly() {
        // Content 128x32 leaves only vertical slack of 32 -> 33 offsets.
        let mut rng = StdRng::seed_from_u64(1234);
        let mut counts = vec![0usize; 33];
        for _ in 0..33 * 300 {
            let (dx, dy) = placement_offset(128, 32, (64, 128), Placement::Random, &mut rng);
            assert_eq!(dx, 0);
            assert!(dy <= 32);
            counts[dy as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c > 0));
        // 32 degrees of freedom; 99.9% critical value ~ 62.5.
        let chi2 = chi_square(&counts);
        assert!(chi2 < 62.5, "chi2 {chi2} counts {counts:?}");
    }

    #[test]
    fn random_horizontal_offsets_cover_range_uniformly() {
        // Content 64x64 leaves only horizontal slack of 64 -> 65 offsets.
        let mut rng = StdRng::seed_from_u64(99);
        let mut counts = vec![0usize; 65];
        for _ in 0..65 * 300 {
            let (dx, dy) = placement_offset(64, 64, (64, 128), Placement::Random, &mut rng);
            assert_eq!(dy, 0);
            assert!(dx <= 64);
            counts[dx as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c > 0));
        // 64 degrees of freedom; 99.9% critical value ~ 107.6.
        let chi2 = chi_square(&counts);
        assert!(chi2 < 107.6, "chi2 {chi2} counts {counts:?}");
    }
}
