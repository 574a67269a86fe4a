use crate::annotation::BBox;
use crate::error::{Error, Result};

/// Linearly interpolates between two boxes, inclusive of both endpoints.
/// The endpoints are returned untouched; every box in between is rounded
/// to the nearest pixel and marked generated.
pub fn linear(source: &BBox, target: &BBox) -> Result<Vec<BBox>> {
    if target.frame <= source.frame {
        return Err(Error::TrackImpossible(format!(
            "interpolation endpoints out of order: {} to {}",
            source.frame, target.frame
        )));
    }

    let gap = (target.frame - source.frame) as f32;
    let mut out = Vec::with_capacity(target.frame - source.frame + 1);
    out.push(source.clone());

    for frame in source.frame + 1..target.frame {
        let fac = (frame - source.frame) as f32 / gap;
        let lerp = |a: i32, b: i32| (a as f32 + fac * (b - a) as f32).round() as i32;

        let mut b = BBox::new(
            lerp(source.xtl, target.xtl),
            lerp(source.ytl, target.ytl),
            lerp(source.xbr, target.xbr),
            lerp(source.ybr, target.ybr),
            frame,
        );
        b.lost = source.lost || target.lost;
        b.occluded = source.occluded;
        b.generated = true;
        b.label = source.label.clone();
        b.attributes = source.attributes.clone();
        out.push(b);
    }

    out.push(target.clone());
    Ok(out)
}

/// Densifies a sparse, frame-sorted path so every frame between the first
/// and last box is covered.
pub fn linear_fill(path: &[BBox]) -> Result<Vec<BBox>> {
    match path {
        [] => Err(Error::TrackImpossible("nothing to interpolate".into())),
        [only] => Ok(vec![only.clone()]),
        _ => {
            let mut out: Vec<BBox> = Vec::new();
            for pair in path.windows(2) {
                let seg = linear(&pair[0], &pair[1])?;
                if out.is_empty() {
                    out.extend(seg);
                } else {
                    out.extend(seg.into_iter().skip(1));
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_come_back_verbatim() {
        let a = BBox::new(10, 10, 30, 40, 2).with_label("car");
        let b = BBox::new(50, 18, 70, 48, 6);

        let seg = linear(&a, &b).unwrap();

        assert_eq!(seg.len(), 5);
        assert_eq!(seg[0], a);
        assert_eq!(seg[4], b);
        assert!(!seg[0].generated);
    }

    #[test]
    fn midpoint_lands_halfway() {
        let a = BBox::new(0, 0, 10, 10, 0);
        let b = BBox::new(20, 40, 30, 50, 4);

        let seg = linear(&a, &b).unwrap();
        let mid = &seg[2];

        assert_eq!((mid.xtl, mid.ytl, mid.xbr, mid.ybr), (10, 20, 20, 30));
        assert_eq!(mid.frame, 2);
        assert!(mid.generated);
    }

    #[test]
    fn interior_inherits_the_source_label() {
        let a = BBox::new(0, 0, 10, 10, 0).with_label("bus");
        let b = BBox::new(8, 0, 18, 10, 3);

        let seg = linear(&a, &b).unwrap();
        assert_eq!(seg[1].label.as_deref(), Some("bus"));
        assert_eq!(seg[2].label.as_deref(), Some("bus"));
    }

    #[test]
    fn rejects_reversed_endpoints() {
        let a = BBox::new(0, 0, 10, 10, 5);
        let b = BBox::new(0, 0, 10, 10, 5);
        assert!(linear(&a, &b).is_err());
    }

    #[test]
    fn fill_covers_every_frame_once() {
        let path = vec![
            BBox::new(0, 0, 10, 10, 0),
            BBox::new(12, 0, 22, 10, 3),
            BBox::new(12, 20, 22, 30, 5),
        ];

        let dense = linear_fill(&path).unwrap();

        let frames: Vec<usize> = dense.iter().map(|b| b.frame).collect();
        assert_eq!(frames, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(dense[3], path[1]);
    }
}
