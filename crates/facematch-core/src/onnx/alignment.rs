//! Face alignment via 4-DOF similarity transform.
//!
//! Warps a detected face onto the canonical 112×112 ArcFace layout using the
//! five InsightFace reference landmarks. The transform is the closed-form
//! least-squares similarity between the detected and reference points.

use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// `dst = [[a, -b], [b, a]] * src + [tx, ty]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Similarity {
    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Inverse mapping, or `None` for a degenerate (zero-scale) transform.
    pub fn inverse(&self) -> Option<Similarity> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (ia, ib) = (self.a / det, -self.b / det);
        Some(Similarity {
            a: ia,
            b: ib,
            tx: -(ia * self.tx - ib * self.ty),
            ty: -(ib * self.tx + ia * self.ty),
        })
    }
}

/// Least-squares similarity from `src` to `dst`.
///
/// Returns `None` when the source points are coincident.
pub fn estimate_similarity(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Similarity> {
    let n = src.len() as f32;
    let centroid = |pts: &[(f32, f32); 5]| {
        let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    };
    let (scx, scy) = centroid(src);
    let (dcx, dcy) = centroid(dst);

    let mut denom = 0.0f32;
    let mut num_a = 0.0f32;
    let mut num_b = 0.0f32;
    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        let (sx, sy) = (sx - scx, sy - scy);
        let (dx, dy) = (dx - dcx, dy - dcy);
        denom += sx * sx + sy * sy;
        num_a += sx * dx + sy * dy;
        num_b += sx * dy - sy * dx;
    }

    if denom < 1e-12 {
        return None;
    }

    let a = num_a / denom;
    let b = num_b / denom;
    Some(Similarity {
        a,
        b,
        tx: dcx - (a * scx - b * scy),
        ty: dcy - (b * scx + a * scy),
    })
}

/// Warp `image` through `transform` into a square `out_size` image.
///
/// Bilinear sampling; pixels that map outside the source are black.
fn warp_similarity(image: &RgbImage, transform: &Similarity, out_size: u32) -> RgbImage {
    let mut output = RgbImage::new(out_size, out_size);
    let Some(inverse) = transform.inverse() else {
        return output;
    };
    let (width, height) = (image.width() as i64, image.height() as i64);

    let sample = |x: i64, y: i64| -> [f32; 3] {
        if x >= 0 && x < width && y >= 0 && y < height {
            let Rgb(p) = *image.get_pixel(x as u32, y as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    for (ox, oy, pixel) in output.enumerate_pixels_mut() {
        let (sx, sy) = inverse.apply((ox as f32, oy as f32));
        let x0 = sx.floor() as i64;
        let y0 = sy.floor() as i64;
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let tl = sample(x0, y0);
        let tr = sample(x0 + 1, y0);
        let bl = sample(x0, y0 + 1);
        let br = sample(x0 + 1, y0 + 1);

        let mut rgb = [0u8; 3];
        for c in 0..3 {
            let v = tl[c] * (1.0 - fx) * (1.0 - fy)
                + tr[c] * fx * (1.0 - fy)
                + bl[c] * (1.0 - fx) * fy
                + br[c] * fx * fy;
            rgb[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        *pixel = Rgb(rgb);
    }

    output
}

/// Align a detected face to a canonical 112×112 crop.
///
/// Falls back to [`crop_and_resize`] over `region` if the landmarks are degenerate.
pub fn align_face(image: &RgbImage, region: &FaceRegion, landmarks: &[(f32, f32); 5]) -> RgbImage {
    match estimate_similarity(landmarks, &REFERENCE_LANDMARKS_112) {
        Some(transform) => warp_similarity(image, &transform, ALIGNED_SIZE),
        None => {
            tracing::debug!("degenerate landmarks, using plain crop");
            crop_and_resize(image, region)
        }
    }
}

/// Crop `region` and resize it to 112×112 without alignment.
pub fn crop_and_resize(image: &RgbImage, region: &FaceRegion) -> RgbImage {
    let clamped = region.clamp_to(image.width(), image.height());
    let x = clamped.left.floor() as u32;
    let y = clamped.top.floor() as u32;
    let w = (clamped.width().ceil() as u32).max(1).min(image.width().saturating_sub(x).max(1));
    let h = (clamped.height().ceil() as u32).max(1).min(image.height().saturating_sub(y).max(1));

    if image.width() == 0 || image.height() == 0 {
        return RgbImage::new(ALIGNED_SIZE, ALIGNED_SIZE);
    }

    let crop = imageops::crop_imm(image, x.min(image.width() - 1), y.min(image.height() - 1), w, h).to_image();
    imageops::resize(&crop, ALIGNED_SIZE, ALIGNED_SIZE, FilterType::Triangle)
}
