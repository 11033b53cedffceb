use std::f32::consts::PI;

use rand::Rng;

/// Random training-time augmentation, redrawn for every image of every batch.
///
/// - flips: each axis independently with probability 0.5
/// - `rotation`: angle drawn from ±`rotation`·2π
/// - `zoom`: scale drawn from [1 - `zoom`, 1 + `zoom`]; values above 1 zoom out
/// - `contrast`: factor drawn from [1 - `contrast`, 1 + `contrast`], applied
///   around each channel's mean and clipped to [0, 1]
///
/// Pixels sampled from outside the image are reflected back in; geometry is
/// resampled bilinearly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentationConfig {
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    pub rotation: f32,
    pub zoom: f32,
    pub contrast: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        AugmentationConfig {
            horizontal_flip: true,
            vertical_flip: true,
            rotation: 0.2,
            zoom: 0.2,
            contrast: 0.2,
        }
    }
}

impl AugmentationConfig {
    /// No augmentation at all.
    pub fn none() -> AugmentationConfig {
        AugmentationConfig { horizontal_flip: false, vertical_flip: false, rotation: 0.0, zoom: 0.0, contrast: 0.0 }
    }

    pub fn is_identity(&self) -> bool {
        *self == AugmentationConfig::none()
    }

    /// Augments one interleaved `height × width × 3` image in place.
    pub fn apply<R: Rng + ?Sized>(&self, image: &mut Vec<f32>, height: usize, width: usize, rng: &mut R) {
        let flip_x = self.horizontal_flip && rng.gen_bool(0.5);
        let flip_y = self.vertical_flip && rng.gen_bool(0.5);
        let angle = if self.rotation > 0.0 {
            rng.gen_range(-self.rotation..=self.rotation) * 2.0 * PI
        } else {
            0.0
        };
        let zoom = if self.zoom > 0.0 {
            1.0 + rng.gen_range(-self.zoom..=self.zoom)
        } else {
            1.0
        };
        if flip_x || flip_y || angle != 0.0 || zoom != 1.0 {
            *image = transform(image, height, width, flip_x, flip_y, angle, zoom);
        }
        if self.contrast > 0.0 {
            let factor = 1.0 + rng.gen_range(-self.contrast..=self.contrast);
            adjust_contrast(image, factor);
        }
    }
}

/// Maps an index that may fall outside `[0, n)` back inside by mirroring at
/// the edges (`d c b a | a b c d | d c b a`).
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m >= n { period - 1 - m } else { m }) as usize
}

/// Inverse-maps every output pixel through zoom, rotation and flips about
/// the image centre, then samples the source bilinearly.
fn transform(src: &[f32], height: usize, width: usize, flip_x: bool, flip_y: bool, angle: f32, zoom: f32) -> Vec<f32> {
    let (cy, cx) = ((height as f32 - 1.0) / 2.0, (width as f32 - 1.0) / 2.0);
    let (sin, cos) = angle.sin_cos();
    let mut out = vec![0.0; src.len()];
    for y in 0..height {
        for x in 0..width {
            let (u, v) = ((x as f32 - cx) * zoom, (y as f32 - cy) * zoom);
            let (mut su, mut sv) = (cos * u + sin * v, -sin * u + cos * v);
            if flip_x {
                su = -su;
            }
            if flip_y {
                sv = -sv;
            }
            let (sx, sy) = (su + cx, sv + cy);
            let (x0, y0) = (sx.floor(), sy.floor());
            let (fx, fy) = (sx - x0, sy - y0);
            let (x0, y0) = (x0 as isize, y0 as isize);
            let (xa, xb) = (reflect(x0, width), reflect(x0 + 1, width));
            let (ya, yb) = (reflect(y0, height), reflect(y0 + 1, height));
            let dst = &mut out[(y * width + x) * 3..(y * width + x) * 3 + 3];
            for (c, d) in dst.iter_mut().enumerate() {
                let p = |yy: usize, xx: usize| src[(yy * width + xx) * 3 + c];
                let top = p(ya, xa) * (1.0 - fx) + p(ya, xb) * fx;
                let bottom = p(yb, xa) * (1.0 - fx) + p(yb, xb) * fx;
                *d = top * (1.0 - fy) + bottom * fy;
            }
        }
    }
    out
}

/// Scales each channel's deviation from its own mean by `factor`, clipped to [0, 1].
fn adjust_contrast(image: &mut [f32], factor: f32) {
    let pixels = (image.len() / 3).max(1) as f32;
    let mut means = [0.0f32; 3];
    for px in image.chunks_exact(3) {
        for c in 0..3 {
            means[c] += px[c];
        }
    }
    means.iter_mut().for_each(|m| *m /= pixels);
    for px in image.chunks_exact_mut(3) {
        for c in 0..3 {
            px[c] = ((px[c] - means[c]) * factor + means[c]).clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn gradient(h: usize, w: usize) -> Vec<f32> {
        (0..h * w).flat_map(|i| {
            let v = (i % w) as f32 / w as f32;
            [v, 1.0 - v, 0.5]
        }).collect()
    }

    #[test]
    fn reflect_mirrors_including_the_edge_pixel() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(2, 4), 2);
    }

    #[test]
    fn horizontal_flip_alone_mirrors_rows() {
        let img = gradient(2, 4);
        let out = transform(&img, 2, 4, true, false, 0.0, 1.0);
        for x in 0..4 {
            let a = &img[x * 3..x * 3 + 3];
            let b = &out[(3 - x) * 3..(3 - x) * 3 + 3];
            for (p, q) in a.iter().zip(b) {
                assert!((p - q).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn identity_config_leaves_pixels_untouched() {
        let mut rng = StdRng::seed_from_u64(0);
        let original = gradient(6, 6);
        let mut img = original.clone();
        AugmentationConfig::none().apply(&mut img, 6, 6, &mut rng);
        assert_eq!(img, original);
    }

    #[test]
    fn default_augmentation_keeps_shape_and_range() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..20 {
            let mut img = gradient(16, 16);
            AugmentationConfig::default().apply(&mut img, 16, 16, &mut rng);
            assert_eq!(img.len(), 16 * 16 * 3);
            assert!(img.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn contrast_scales_around_channel_mean() {
        let mut img = vec![0.4, 0.0, 1.0, 0.6, 0.0, 1.0];
        adjust_contrast(&mut img, 2.0);
        assert!((img[0] - 0.3).abs() < 1e-6);
        assert!((img[3] - 0.7).abs() < 1e-6);
        assert_eq!(img[2], 1.0);
    }
}
