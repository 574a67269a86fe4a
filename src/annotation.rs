use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Axis-aligned box on a single frame, corners in pixel coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BBox {
    pub xtl: i32,
    pub ytl: i32,
    pub xbr: i32,
    pub ybr: i32,
    pub frame: usize,
    #[serde(default)]
    pub lost: bool,
    #[serde(default)]
    pub occluded: bool,
    /// Produced by the solver or by interpolation rather than by a human.
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
}

impl BBox {
    pub fn new(xtl: i32, ytl: i32, xbr: i32, ybr: i32, frame: usize) -> Self {
        Self {
            xtl,
            ytl,
            xbr,
            ybr,
            frame,
            lost: false,
            occluded: false,
            generated: false,
            score: None,
            label: None,
            attributes: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_attributes(mut self, attributes: Vec<String>) -> Self {
        self.attributes = attributes;
        self
    }

    #[inline(always)]
    pub fn width(&self) -> i32 {
        self.xbr - self.xtl
    }

    #[inline(always)]
    pub fn height(&self) -> i32 {
        self.ybr - self.ytl
    }

    #[inline(always)]
    pub fn area(&self) -> i64 {
        self.width() as i64 * self.height() as i64
    }

    #[inline(always)]
    pub fn center(&self) -> (f32, f32) {
        (
            (self.xtl + self.xbr) as f32 / 2.0,
            (self.ytl + self.ybr) as f32 / 2.0,
        )
    }

    #[inline]
    pub fn intersects(&self, other: &BBox) -> bool {
        self.xtl < other.xbr && other.xtl < self.xbr && self.ytl < other.ybr && other.ytl < self.ybr
    }

    /// Intersection over union of the two boxes, ignoring frame numbers.
    pub fn percent_overlap(&self, other: &BBox) -> f32 {
        let xdiff = (self.xbr.min(other.xbr) - self.xtl.max(other.xtl)) as f32;
        let ydiff = (self.ybr.min(other.ybr) - self.ytl.max(other.ytl)) as f32;

        if xdiff <= 0.0 || ydiff <= 0.0 {
            return 0.0;
        }

        let inter = xdiff * ydiff;
        let union = self.area() as f32 + other.area() as f32 - inter;

        inter / union
    }

    /// Scales the corners, keeping everything else.
    pub fn transform(&self, xratio: f32, yratio: f32) -> BBox {
        BBox {
            xtl: (self.xtl as f32 * xratio).round() as i32,
            ytl: (self.ytl as f32 * yratio).round() as i32,
            xbr: (self.xbr as f32 * xratio).round() as i32,
            ybr: (self.ybr as f32 * yratio).round() as i32,
            ..self.clone()
        }
    }

    /// Same geometry placed on another frame.
    pub fn shift(&self, frame: usize) -> BBox {
        BBox {
            frame,
            ..self.clone()
        }
    }
}

/// Frame-sorted trajectory of one object.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Track {
    boxes: Vec<BBox>,
}

impl Track {
    /// Sorts the boxes by frame; duplicate frames are rejected.
    pub fn new(mut boxes: Vec<BBox>) -> Result<Self> {
        boxes.sort_by_key(|b| b.frame);

        for pair in boxes.windows(2) {
            if pair[0].frame == pair[1].frame {
                return Err(Error::TrackImpossible(format!(
                    "duplicate box at frame {}",
                    pair[0].frame
                )));
            }
        }

        Ok(Self { boxes })
    }

    // Use when the boxes are already frame-sorted and unique
    #[inline]
    pub fn from_sorted(boxes: Vec<BBox>) -> Self {
        Self { boxes }
    }

    #[inline]
    pub fn boxes(&self) -> &[BBox] {
        &self.boxes
    }

    #[inline]
    pub fn first(&self) -> Option<&BBox> {
        self.boxes.first()
    }

    #[inline]
    pub fn last(&self) -> Option<&BBox> {
        self.boxes.last()
    }

    pub fn get(&self, frame: usize) -> Option<&BBox> {
        self.boxes
            .binary_search_by_key(&frame, |b| b.frame)
            .ok()
            .map(|i| &self.boxes[i])
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &BBox> {
        self.boxes.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// First and last frames where the object is visible.
    pub fn bounds(&self) -> Option<(usize, usize)> {
        let first = self.boxes.iter().find(|b| !b.lost)?.frame;
        let last = self.boxes.iter().rev().find(|b| !b.lost)?.frame;
        Some((first, last))
    }
}

impl IntoIterator for Track {
    type Item = BBox;
    type IntoIter = std::vec::IntoIter<BBox>;

    fn into_iter(self) -> Self::IntoIter {
        self.boxes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_of_identical_boxes_is_one() {
        let a = BBox::new(10, 10, 50, 50, 0);
        assert!((a.percent_overlap(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn overlap_of_disjoint_boxes_is_zero() {
        let a = BBox::new(0, 0, 10, 10, 0);
        let b = BBox::new(20, 20, 30, 30, 0);
        assert_eq!(a.percent_overlap(&b), 0.0);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn overlap_of_half_shifted_box() {
        let a = BBox::new(0, 0, 10, 10, 0);
        let b = BBox::new(5, 0, 15, 10, 0);
        // intersection 50, union 150
        assert!((a.percent_overlap(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn track_sorts_by_frame() {
        let t = Track::new(vec![
            BBox::new(0, 0, 5, 5, 7),
            BBox::new(0, 0, 5, 5, 2),
            BBox::new(0, 0, 5, 5, 4),
        ])
        .unwrap();

        let frames: Vec<_> = t.iter().map(|b| b.frame).collect();
        assert_eq!(frames, vec![2, 4, 7]);
        assert_eq!(t.get(4).unwrap().frame, 4);
        assert!(t.get(3).is_none());
    }

    #[test]
    fn track_rejects_duplicate_frames() {
        let r = Track::new(vec![BBox::new(0, 0, 5, 5, 2), BBox::new(1, 1, 6, 6, 2)]);
        assert!(matches!(r, Err(Error::TrackImpossible(_))));
    }

    #[test]
    fn bounds_skip_lost_boxes() {
        let mut head = BBox::new(0, 0, 5, 5, 0);
        head.lost = true;
        let t = Track::new(vec![head, BBox::new(0, 0, 5, 5, 1), BBox::new(0, 0, 5, 5, 2)]).unwrap();
        assert_eq!(t.bounds(), Some((1, 2)));
    }

    #[test]
    fn transform_scales_corners() {
        let b = BBox::new(10, 20, 30, 40, 3).transform(2.0, 0.5);
        assert_eq!((b.xtl, b.ytl, b.xbr, b.ybr), (20, 10, 60, 20));
        assert_eq!(b.frame, 3);
    }
}
