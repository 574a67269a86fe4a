use image::imageops::{self, FilterType};
use image::RgbImage;
use log::{debug, warn};
use nalgebra as na;
use ndarray::prelude::*;

use crate::annotation::BBox;
use crate::error::{Error, Result};
use crate::features::{self, FrameFeatures, HOG_CHANNELS};
use crate::frame::FrameSource;
use crate::params::Params;
use crate::svm::LinearSvm;

// background windows overlapping an anchor above this ratio are not negatives
const NEGATIVE_OVERLAP: f32 = 0.3;

/// Linear appearance model over gradient and color cells, tied to a fixed
/// template size in pixels.
pub struct AppearanceModel {
    pub hog_weights: Array3<f32>,
    pub color_weights: Array3<f32>,
    pub bias: f32,
    pub width: u32,
    pub height: u32,
    pub hogbin: usize,
    pub rgbbin: usize,
}

impl AppearanceModel {
    /// Trains a detector from the labeled anchors: the image under each
    /// anchor is a positive, windows sampled away from the anchors are
    /// negatives. Lost anchors are skipped.
    pub fn train<F>(anchors: &[BBox], frames: &F, params: &Params) -> Result<Self>
    where
        F: FrameSource + ?Sized,
    {
        let mut usable: Vec<&BBox> = anchors.iter().filter(|b| !b.lost).collect();
        usable.sort_by_key(|b| b.frame);

        let first = *usable
            .first()
            .ok_or_else(|| Error::InvalidModelInput("no usable anchors to train from".into()))?;

        if first.width() <= 0 || first.height() <= 0 {
            return Err(Error::InvalidModelInput(format!(
                "anchor at frame {} has no area",
                first.frame
            )));
        }

        let width = first.width() as u32;
        let height = first.height() as u32;
        let hogbin = params.hogbin.max(1);
        let rgbbin = params.rgbbin.max(1);

        let (ty, tx) = features::hog_grid(width, height, hogbin);
        let (ry, rx) = features::color_grid(width, height, rgbbin);
        if ty == 0 || tx == 0 || ry == 0 || rx == 0 {
            return Err(Error::InvalidModelInput(format!(
                "template {}x{} is too small for cell sizes {}/{}",
                width, height, hogbin, rgbbin
            )));
        }

        let mut positives = Vec::with_capacity(usable.len());
        let mut negative_sets = Vec::with_capacity(usable.len());

        for anchor in &usable {
            let image = frames.frame(anchor.frame)?;

            match positive_features(&image, anchor, width, height, hogbin, rgbbin) {
                Some(x) => positives.push(x),
                None => {
                    warn!("anchor at frame {} lies outside the image", anchor.frame);
                    continue;
                }
            }

            let map = FrameFeatures::extract(&image, hogbin, rgbbin);
            negative_sets.push(negative_windows(
                &map,
                anchor,
                (width, height),
                (ty, tx),
                (ry, rx),
                params.bgskip,
            ));
        }

        // take windows from each frame in turn so no single frame dominates
        let mut negatives = Vec::new();
        let mut sets: Vec<_> = negative_sets.into_iter().map(|s| s.into_iter()).collect();
        'cap: loop {
            let mut advanced = false;
            for set in sets.iter_mut() {
                if let Some(x) = set.next() {
                    negatives.push(x);
                    advanced = true;
                    if negatives.len() >= params.bgsize {
                        break 'cap;
                    }
                }
            }
            if !advanced {
                break;
            }
        }

        debug!(
            "training appearance model: {} positives, {} negatives, template {}x{}",
            positives.len(),
            negatives.len(),
            width,
            height
        );

        let svm = LinearSvm::train(&positives, &negatives, params.c)?;

        let hog_len = ty * tx * HOG_CHANNELS;
        let flat = svm.weights.as_slice();
        let hog_weights =
            Array3::from_shape_vec((ty, tx, HOG_CHANNELS), flat[..hog_len].to_vec()).unwrap();
        let color_weights =
            Array3::from_shape_vec((ry, rx, 3), flat[hog_len..].to_vec()).unwrap();

        Ok(Self {
            hog_weights,
            color_weights,
            bias: svm.bias,
            width,
            height,
            hogbin,
            rgbbin,
        })
    }
}

fn flatten(hog: ArrayView3<f32>, color: ArrayView3<f32>) -> na::DVector<f32> {
    let mut v = Vec::with_capacity(hog.len() + color.len());
    v.extend(hog.iter().copied());
    v.extend(color.iter().copied());
    na::DVector::from_vec(v)
}

/// Features of the anchor region, warped to the template size.
fn positive_features(
    image: &RgbImage,
    anchor: &BBox,
    width: u32,
    height: u32,
    hogbin: usize,
    rgbbin: usize,
) -> Option<na::DVector<f32>> {
    let (iw, ih) = image.dimensions();
    let x0 = anchor.xtl.clamp(0, iw as i32);
    let y0 = anchor.ytl.clamp(0, ih as i32);
    let x1 = anchor.xbr.clamp(0, iw as i32);
    let y1 = anchor.ybr.clamp(0, ih as i32);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let crop = imageops::crop_imm(
        image,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    )
    .to_image();

    let patch = if crop.dimensions() == (width, height) {
        crop
    } else {
        imageops::resize(&crop, width, height, FilterType::Triangle)
    };

    Some(flatten(
        features::hog(&patch, hogbin).view(),
        features::color_stats(&patch, rgbbin).view(),
    ))
}

/// Template-shaped windows sliced out of the dense frame maps, skipping
/// placements that overlap the anchor.
fn negative_windows(
    map: &FrameFeatures,
    anchor: &BBox,
    (width, height): (u32, u32),
    (ty, tx): (usize, usize),
    (ry, rx): (usize, usize),
    bgskip: usize,
) -> Vec<na::DVector<f32>> {
    let (hog_rows, hog_cols, _) = map.hog.dim();
    let (color_rows, color_cols, _) = map.color.dim();
    let stride = (bgskip / map.hogbin).max(1);

    let mut out = Vec::new();
    let mut cy = 0;
    while cy + ty <= hog_rows {
        let py = cy * map.hogbin;
        let mut cx = 0;
        while cx + tx <= hog_cols {
            let px = cx * map.hogbin;

            let gy = py / map.rgbbin;
            let gx = px / map.rgbbin;
            let fits = (px as u32 + width) <= map.width
                && (py as u32 + height) <= map.height
                && gy + ry <= color_rows
                && gx + rx <= color_cols;

            if fits {
                let window = BBox::new(
                    px as i32,
                    py as i32,
                    px as i32 + width as i32,
                    py as i32 + height as i32,
                    anchor.frame,
                );
                if window.percent_overlap(anchor) <= NEGATIVE_OVERLAP {
                    out.push(flatten(
                        map.hog.slice(s![cy..cy + ty, cx..cx + tx, ..]),
                        map.color.slice(s![gy..gy + ry, gx..gx + rx, ..]),
                    ));
                }
            }

            cx += stride;
        }
        cy += stride;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;
    use image::Rgb;

    fn scene(n: usize, w: u32, h: u32, at: (i32, i32), size: u32) -> Vec<RgbImage> {
        (0..n)
            .map(|_| {
                let mut img = RgbImage::from_pixel(w, h, Rgb([40, 40, 40]));
                for y in at.1..at.1 + size as i32 {
                    for x in at.0..at.0 + size as i32 {
                        img.put_pixel(x as u32, y as u32, Rgb([220, 30, 30]));
                    }
                }
                img
            })
            .collect()
    }

    fn anchor(at: (i32, i32), size: i32, frame: usize) -> BBox {
        BBox::new(at.0, at.1, at.0 + size, at.1 + size, frame)
    }

    #[test]
    fn trains_with_template_from_first_anchor() {
        let frames = scene(2, 120, 90, (40, 30), 24);
        let anchors = vec![anchor((40, 30), 24, 0), anchor((40, 30), 24, 1)];
        let params = Params::default();

        let model = AppearanceModel::train(&anchors, frames.as_slice(), &params).unwrap();

        assert_eq!((model.width, model.height), (24, 24));
        let (hy, hx) = features::hog_grid(24, 24, params.hogbin);
        assert_eq!(model.hog_weights.dim(), (hy, hx, HOG_CHANNELS));
        assert_eq!(model.color_weights.dim(), (3, 3, 3));
        assert!(model.bias.is_finite());
    }

    #[test]
    fn rejects_degenerate_anchor() {
        let frames = scene(1, 120, 90, (40, 30), 24);
        let anchors = vec![BBox::new(40, 30, 40, 30, 0)];

        assert!(matches!(
            AppearanceModel::train(&anchors, frames.as_slice(), &Params::default()),
            Err(Error::InvalidModelInput(_))
        ));
    }

    #[test]
    fn rejects_lost_only_anchors() {
        let frames = scene(1, 120, 90, (40, 30), 24);
        let mut a = anchor((40, 30), 24, 0);
        a.lost = true;

        assert!(matches!(
            AppearanceModel::train(&[a], frames.as_slice(), &Params::default()),
            Err(Error::InvalidModelInput(_))
        ));
    }

    #[test]
    fn training_is_deterministic() {
        let frames = scene(2, 120, 90, (40, 30), 24);
        let anchors = vec![anchor((40, 30), 24, 0), anchor((40, 30), 24, 1)];
        let params = Params::default();

        let a = AppearanceModel::train(&anchors, frames.as_slice(), &params).unwrap();
        let b = AppearanceModel::train(&anchors, frames.as_slice(), &params).unwrap();

        assert_eq!(a.hog_weights, b.hog_weights);
        assert_eq!(a.color_weights, b.color_weights);
        assert_eq!(a.bias, b.bias);
    }

    #[test]
    fn negative_windows_avoid_the_anchor() {
        let frames = scene(1, 120, 90, (40, 32), 24);
        let a = anchor((40, 32), 24, 0);
        let map = FrameFeatures::extract(&frames[0], 8, 8);

        let windows = negative_windows(&map, &a, (24, 24), (1, 1), (3, 3), 4);

        // 9x13 placements fit; the anchor cell and its four direct
        // neighbors overlap too much and are dropped
        assert_eq!(windows.len(), 9 * 13 - 5);
        assert!(windows.iter().all(|w| w.len() == 31 + 27));
    }
}
