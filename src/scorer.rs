use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::prelude::*;

use crate::features::FrameFeatures;
use crate::model::AppearanceModel;
use crate::params::Scales;

/// Appearance mismatch for every placement of the template's top-left
/// corner, one cell per pixel position. Lower is better. The dimensions
/// guarantee the template fits entirely inside the frame; an empty map
/// means it fits nowhere.
#[derive(Debug, Clone)]
pub struct CostMap {
    pub costs: Array2<f32>,
    /// Resize factor the frame was scored at.
    pub scale: f32,
}

impl CostMap {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.costs.is_empty()
    }

    /// Cheapest placement as (x, y, cost). Ties go to the first cell in
    /// row-major order.
    pub fn argmin(&self) -> Option<(usize, usize, f32)> {
        let mut best: Option<(usize, usize, f32)> = None;
        for ((y, x), &v) in self.costs.indexed_iter() {
            match best {
                Some((_, _, b)) if b <= v => {}
                _ => best = Some((x, y, v)),
            }
        }
        best
    }
}

/// Scores every placement of the model inside already extracted frame
/// features. Correlation runs at cell resolution and is expanded to pixel
/// resolution, so nearby placements share a score.
pub fn score_frame(features: &FrameFeatures, model: &AppearanceModel) -> CostMap {
    let empty = CostMap {
        costs: Array2::zeros((0, 0)),
        scale: 1.0,
    };

    if features.width < model.width || features.height < model.height {
        return empty;
    }

    let (ty, tx, _) = model.hog_weights.dim();
    let (ry, rx, _) = model.color_weights.dim();
    let (hy, hx, _) = features.hog.dim();
    let (cy, cx, _) = features.color.dim();
    if hy < ty || hx < tx || cy < ry || cx < rx {
        return empty;
    }

    let hog_corr = correlate(&features.hog, &model.hog_weights);
    let color_corr = correlate(&features.color, &model.color_weights);

    let out_h = (features.height - model.height + 1) as usize;
    let out_w = (features.width - model.width + 1) as usize;
    let mut costs = Array2::zeros((out_h, out_w));

    let (hrows, hcols) = hog_corr.dim();
    let (crows, ccols) = color_corr.dim();

    for py in 0..out_h {
        let hr = (py / features.hogbin).min(hrows - 1);
        let cr = (py / features.rgbbin).min(crows - 1);
        for px in 0..out_w {
            let hc = (px / features.hogbin).min(hcols - 1);
            let cc = (px / features.rgbbin).min(ccols - 1);
            costs[(py, px)] = -(hog_corr[(hr, hc)] + color_corr[(cr, cc)] + model.bias);
        }
    }

    CostMap { costs, scale: 1.0 }
}

/// Scores the frame at every candidate scale. Each map is in the resized
/// frame's pixel coordinates; maps where the template no longer fits come
/// back empty.
pub fn score_frame_scales(
    image: &RgbImage,
    model: &AppearanceModel,
    scales: &Scales,
) -> Vec<CostMap> {
    scales
        .factors()
        .into_iter()
        .map(|s| {
            if (s - 1.0).abs() < f32::EPSILON {
                let f = FrameFeatures::extract(image, model.hogbin, model.rgbbin);
                score_frame(&f, model)
            } else {
                let (w, h) = image.dimensions();
                let rw = ((w as f32 * s).round() as u32).max(1);
                let rh = ((h as f32 * s).round() as u32).max(1);
                let resized = imageops::resize(image, rw, rh, FilterType::Triangle);
                let f = FrameFeatures::extract(&resized, model.hogbin, model.rgbbin);

                let mut map = score_frame(&f, model);
                map.scale = s;
                map
            }
        })
        .collect()
}

fn correlate(map: &Array3<f32>, kernel: &Array3<f32>) -> Array2<f32> {
    let (my, mx, _) = map.dim();
    let (ky, kx, _) = kernel.dim();
    let oy = my - ky + 1;
    let ox = mx - kx + 1;

    let mut out = Array2::zeros((oy, ox));
    for y in 0..oy {
        for x in 0..ox {
            let window = map.slice(s![y..y + ky, x..x + kx, ..]);
            let mut acc = 0.0;
            ndarray::Zip::from(&window)
                .and(kernel)
                .for_each(|&a, &b| acc += a * b);
            out[(y, x)] = acc;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn red_model() -> AppearanceModel {
        // responds to red color cells only
        let mut color = Array3::zeros((3, 3, 3));
        color.slice_mut(s![.., .., 0]).fill(1.0);

        AppearanceModel {
            hog_weights: Array3::zeros((1, 1, crate::features::HOG_CHANNELS)),
            color_weights: color,
            bias: 0.0,
            width: 24,
            height: 24,
            hogbin: 8,
            rgbbin: 8,
        }
    }

    #[test]
    fn uniform_frame_scores_flat() {
        let img = RgbImage::from_pixel(32, 32, Rgb([255, 0, 0]));
        let f = FrameFeatures::extract(&img, 8, 8);

        let map = score_frame(&f, &red_model());

        assert_eq!(map.costs.dim(), (9, 9));
        // nine fully red cells correlate to 9.0, negated
        assert!(map.costs.iter().all(|&v| (v + 9.0).abs() < 1e-4));
    }

    #[test]
    fn scoring_is_bit_identical() {
        let mut img = RgbImage::from_pixel(64, 48, Rgb([30, 30, 30]));
        for y in 10..34 {
            for x in 20..44 {
                img.put_pixel(x, y, Rgb([220, 40, 40]));
            }
        }

        let model = red_model();
        let a = score_frame(&FrameFeatures::extract(&img, 8, 8), &model);
        let b = score_frame(&FrameFeatures::extract(&img, 8, 8), &model);

        assert_eq!(a.costs, b.costs);
    }

    #[test]
    fn oversized_template_yields_empty_map() {
        let img = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
        let f = FrameFeatures::extract(&img, 8, 8);

        let map = score_frame(&f, &red_model());
        assert!(map.is_empty());
    }

    #[test]
    fn bright_region_outscores_background() {
        let mut img = RgbImage::from_pixel(80, 64, Rgb([20, 20, 20]));
        for y in 16..40 {
            for x in 40..64 {
                img.put_pixel(x, y, Rgb([250, 10, 10]));
            }
        }

        let map = score_frame(&FrameFeatures::extract(&img, 8, 8), &red_model());
        let (x, y, cost) = map.argmin().unwrap();

        assert!(cost < map.costs[(0, 0)]);
        assert!((x as i32 - 40).abs() <= 8, "x = {}", x);
        assert!((y as i32 - 16).abs() <= 8, "y = {}", y);
    }

    #[test]
    fn downscaled_frame_keeps_scale_tag() {
        let img = RgbImage::from_pixel(64, 64, Rgb([120, 0, 0]));
        let scales = Scales::Range {
            start: 0.8,
            stop: 1.1,
            step: 0.2,
        };

        let maps = score_frame_scales(&img, &red_model(), &scales);

        assert_eq!(maps.len(), 2);
        assert!((maps[0].scale - 0.8).abs() < 1e-6);
        assert!((maps[1].scale - 1.0).abs() < 1e-6);
        assert!(!maps[1].is_empty());
    }
}
