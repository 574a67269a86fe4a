use image::RgbImage;
use ndarray::prelude::*;

/// Channels per gradient histogram cell: 18 contrast sensitive orientation
/// bins, 9 contrast insensitive bins, 4 normalization energy bins.
pub const HOG_CHANNELS: usize = 31;

const EPS: f32 = 0.0001;
const CLIP: f32 = 0.2;

// unit vectors for snapping gradients to 18 orientations
const UU: [f32; 9] = [
    1.0000, 0.9397, 0.7660, 0.5000, 0.1736, -0.1736, -0.5000, -0.7660, -0.9397,
];
const VV: [f32; 9] = [
    0.0000, 0.3420, 0.6428, 0.8660, 0.9848, 0.9848, 0.8660, 0.6428, 0.3420,
];

/// Cell grid produced by `hog` for an image of the given size.
#[inline]
pub fn hog_grid(width: u32, height: u32, binsize: usize) -> (usize, usize) {
    let bin = binsize.max(1) as f32;
    let by = ((height as f32 / bin).round() as usize).max(1);
    let bx = ((width as f32 / bin).round() as usize).max(1);
    (by.saturating_sub(2), bx.saturating_sub(2))
}

/// Cell grid produced by `color_stats` for an image of the given size.
#[inline]
pub fn color_grid(width: u32, height: u32, binsize: usize) -> (usize, usize) {
    let bin = binsize.max(1);
    (height as usize / bin, width as usize / bin)
}

/// Block-normalized gradient orientation histograms over square cells of
/// `binsize` px, shape (cells_y, cells_x, HOG_CHANNELS). Flat regions
/// produce zero histograms. One border cell is cropped on every side by
/// the normalization.
pub fn hog(image: &RgbImage, binsize: usize) -> Array3<f32> {
    let (w, h) = image.dimensions();
    let (w, h) = (w as usize, h as usize);
    let bin = binsize.max(1);

    let blocks_y = ((h as f32 / bin as f32).round() as usize).max(1);
    let blocks_x = ((w as f32 / bin as f32).round() as usize).max(1);
    let out_y = blocks_y.saturating_sub(2);
    let out_x = blocks_x.saturating_sub(2);

    let mut feat = Array3::<f32>::zeros((out_y, out_x, HOG_CHANNELS));
    if out_y == 0 || out_x == 0 {
        return feat;
    }

    let mut hist = Array3::<f32>::zeros((blocks_y, blocks_x, 18));
    let mut norm = Array2::<f32>::zeros((blocks_y, blocks_x));

    let visible_y = blocks_y * bin;
    let visible_x = blocks_x * bin;

    let px = |x: usize, y: usize, c: usize| image.get_pixel(x as u32, y as u32).0[c] as f32;

    for y in 1..visible_y - 1 {
        let yy = y.min(h - 2);
        for x in 1..visible_x - 1 {
            let xx = x.min(w - 2);

            // strongest gradient across the color channels
            let mut dx = 0.0;
            let mut dy = 0.0;
            let mut v = -1.0;
            for c in 0..3 {
                let cdx = px(xx + 1, yy, c) - px(xx - 1, yy, c);
                let cdy = px(xx, yy + 1, c) - px(xx, yy - 1, c);
                let cv = cdx * cdx + cdy * cdy;
                if cv > v {
                    v = cv;
                    dx = cdx;
                    dy = cdy;
                }
            }

            // snap to one of 18 orientations
            let mut best = 0.0;
            let mut o = 0;
            for i in 0..9 {
                let dot = UU[i] * dx + VV[i] * dy;
                if dot > best {
                    best = dot;
                    o = i;
                } else if -dot > best {
                    best = -dot;
                    o = i + 9;
                }
            }

            // soft-bin the magnitude into the four nearest cells
            let v = v.max(0.0).sqrt();
            let xp = (x as f32 + 0.5) / bin as f32 - 0.5;
            let yp = (y as f32 + 0.5) / bin as f32 - 0.5;
            let ixp = xp.floor() as isize;
            let iyp = yp.floor() as isize;
            let vx0 = xp - ixp as f32;
            let vy0 = yp - iyp as f32;
            let vx1 = 1.0 - vx0;
            let vy1 = 1.0 - vy0;

            if ixp >= 0 && iyp >= 0 {
                hist[(iyp as usize, ixp as usize, o)] += vy1 * vx1 * v;
            }
            if ixp + 1 < blocks_x as isize && iyp >= 0 {
                hist[(iyp as usize, (ixp + 1) as usize, o)] += vy1 * vx0 * v;
            }
            if ixp >= 0 && iyp + 1 < blocks_y as isize {
                hist[((iyp + 1) as usize, ixp as usize, o)] += vy0 * vx1 * v;
            }
            if ixp + 1 < blocks_x as isize && iyp + 1 < blocks_y as isize {
                hist[((iyp + 1) as usize, (ixp + 1) as usize, o)] += vy0 * vx0 * v;
            }
        }
    }

    // cell energy over opposing orientation pairs
    for y in 0..blocks_y {
        for x in 0..blocks_x {
            let mut e = 0.0;
            for o in 0..9 {
                let t = hist[(y, x, o)] + hist[(y, x, o + 9)];
                e += t * t;
            }
            norm[(y, x)] = e;
        }
    }

    for y in 0..out_y {
        for x in 0..out_x {
            // the four 2x2 block energies around cell (y+1, x+1)
            let n1 = (norm[(y + 1, x + 1)]
                + norm[(y + 1, x + 2)]
                + norm[(y + 2, x + 1)]
                + norm[(y + 2, x + 2)]
                + EPS)
                .sqrt()
                .recip();
            let n2 = (norm[(y, x + 1)]
                + norm[(y, x + 2)]
                + norm[(y + 1, x + 1)]
                + norm[(y + 1, x + 2)]
                + EPS)
                .sqrt()
                .recip();
            let n3 = (norm[(y + 1, x)]
                + norm[(y + 1, x + 1)]
                + norm[(y + 2, x)]
                + norm[(y + 2, x + 1)]
                + EPS)
                .sqrt()
                .recip();
            let n4 = (norm[(y, x)]
                + norm[(y, x + 1)]
                + norm[(y + 1, x)]
                + norm[(y + 1, x + 1)]
                + EPS)
                .sqrt()
                .recip();

            let mut t1 = 0.0;
            let mut t2 = 0.0;
            let mut t3 = 0.0;
            let mut t4 = 0.0;

            for o in 0..18 {
                let hv = hist[(y + 1, x + 1, o)];
                let h1 = (hv * n1).min(CLIP);
                let h2 = (hv * n2).min(CLIP);
                let h3 = (hv * n3).min(CLIP);
                let h4 = (hv * n4).min(CLIP);
                feat[(y, x, o)] = 0.5 * (h1 + h2 + h3 + h4);
                t1 += h1;
                t2 += h2;
                t3 += h3;
                t4 += h4;
            }

            for o in 0..9 {
                let s = hist[(y + 1, x + 1, o)] + hist[(y + 1, x + 1, o + 9)];
                feat[(y, x, 18 + o)] = 0.5
                    * ((s * n1).min(CLIP)
                        + (s * n2).min(CLIP)
                        + (s * n3).min(CLIP)
                        + (s * n4).min(CLIP));
            }

            feat[(y, x, 27)] = 0.2357 * t1;
            feat[(y, x, 28)] = 0.2357 * t2;
            feat[(y, x, 29)] = 0.2357 * t3;
            feat[(y, x, 30)] = 0.2357 * t4;
        }
    }

    feat
}

/// Mean RGB in [0, 1] over square cells of `binsize` px, shape
/// (cells_y, cells_x, 3).
pub fn color_stats(image: &RgbImage, binsize: usize) -> Array3<f32> {
    let (w, h) = image.dimensions();
    let bin = binsize.max(1);
    let (cells_y, cells_x) = color_grid(w, h, bin);

    let mut out = Array3::<f32>::zeros((cells_y, cells_x, 3));
    let scale = 1.0 / (bin * bin) as f32 / 255.0;

    for cy in 0..cells_y {
        for cx in 0..cells_x {
            let mut acc = [0.0f32; 3];
            for y in cy * bin..(cy + 1) * bin {
                for x in cx * bin..(cx + 1) * bin {
                    let p = image.get_pixel(x as u32, y as u32).0;
                    acc[0] += p[0] as f32;
                    acc[1] += p[1] as f32;
                    acc[2] += p[2] as f32;
                }
            }
            for (c, &a) in acc.iter().enumerate() {
                out[(cy, cx, c)] = a * scale;
            }
        }
    }

    out
}

/// Both dense per-frame maps plus the geometry needed to index them.
pub struct FrameFeatures {
    pub hog: Array3<f32>,
    pub color: Array3<f32>,
    pub hogbin: usize,
    pub rgbbin: usize,
    pub width: u32,
    pub height: u32,
}

impl FrameFeatures {
    pub fn extract(image: &RgbImage, hogbin: usize, rgbbin: usize) -> Self {
        let (width, height) = image.dimensions();

        Self {
            hog: hog(image, hogbin),
            color: color_stats(image, rgbbin),
            hogbin: hogbin.max(1),
            rgbbin: rgbbin.max(1),
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(rgb))
    }

    #[test]
    fn flat_image_has_zero_histograms() {
        let f = hog(&uniform(64, 48, [120, 120, 120]), 8);
        assert_eq!(f.dim(), (4, 6, HOG_CHANNELS));
        assert!(f.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn edges_produce_finite_energy() {
        let mut img = uniform(64, 64, [0, 0, 0]);
        for y in 0..64 {
            for x in 32..64 {
                img.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }

        let f = hog(&img, 8);
        assert!(f.iter().all(|v| v.is_finite()));
        assert!(f.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn tiny_image_yields_empty_grid() {
        let f = hog(&uniform(6, 6, [0, 0, 0]), 8);
        assert_eq!(f.dim().0, 0);
    }

    #[test]
    fn color_cells_average_exactly() {
        let f = color_stats(&uniform(16, 8, [255, 0, 51]), 8);
        assert_eq!(f.dim(), (1, 2, 3));
        assert!((f[(0, 0, 0)] - 1.0).abs() < 1e-6);
        assert_eq!(f[(0, 0, 1)], 0.0);
        assert!((f[(0, 1, 2)] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn grids_match_extractor_output() {
        let img = uniform(100, 70, [10, 20, 30]);
        let f = FrameFeatures::extract(&img, 8, 8);

        let (hy, hx) = hog_grid(100, 70, 8);
        let (cy, cx) = color_grid(100, 70, 8);
        assert_eq!(f.hog.dim(), (hy, hx, HOG_CHANNELS));
        assert_eq!(f.color.dim(), (cy, cx, 3));
    }
}
