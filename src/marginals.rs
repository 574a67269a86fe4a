use log::debug;
use ndarray::Array2;

use crate::annotation::{BBox, Track};
use crate::error::{Error, Result};
use crate::frame::FrameSource;
use crate::model::AppearanceModel;
use crate::params::Params;
use crate::pool::WorkerPool;
use crate::solver::{self, FramePrior, Span, SpanBounds};
use crate::trellis::{PathNode, Trellis};

/// Outcome of a query round: the frame whose annotation is expected to
/// correct the most error, along with the per-frame scores and the
/// current best trajectory.
#[derive(Debug)]
pub struct Selection {
    pub frame: usize,
    pub score: f32,
    pub path: Track,
    pub marginals: Vec<(usize, f32)>,
}

/// Chooses the evaluated frame, never an anchor, where the marginal
/// placement distribution disagrees most with the best path. Scores are
/// expected disagreement mass, so they are comparable across frames.
pub fn pick<F, P>(
    anchors: &[BBox],
    frames: &F,
    pool: &P,
    params: &Params,
    bounds: &SpanBounds,
    prior: &FramePrior,
) -> Result<Selection>
where
    F: FrameSource + ?Sized,
    P: WorkerPool,
{
    let anchors = solver::prepare_anchors(anchors, frames)?;
    let spans = solver::plan_spans(&anchors, bounds, frames.len())?;
    if spans.is_empty() {
        return Err(Error::TrackImpossible("no frames left to query".into()));
    }

    let model = AppearanceModel::train(&anchors, frames, params)?;

    let mut boxes: Vec<BBox> = Vec::new();
    let mut scored: Vec<(usize, f32)> = Vec::new();

    for span in &spans {
        let dense = match solver::span_trellis(span, &model, frames, pool, params, prior)? {
            None => match span {
                Span::Bridge { head, tail } => vec![head.clone(), tail.clone()],
                _ => continue,
            },
            Some(trellis) => {
                let (nodes, _) = trellis.best_path()?;
                scored.extend(span_scores(&trellis, &nodes, pool, params)?);
                solver::dense_span(span, &nodes, trellis.template())?
            }
        };

        if let (Some(prev), Some(next)) = (boxes.last(), dense.first()) {
            if prev.frame == next.frame {
                boxes.pop();
            }
        }
        boxes.extend(dense);
    }

    if scored.is_empty() {
        return Err(Error::TrackImpossible("no frames left to query".into()));
    }

    scored.sort_by_key(|&(f, _)| f);
    let mut best = scored[0];
    for &(f, s) in &scored[1..] {
        if s > best.1 {
            best = (f, s);
        }
    }

    debug!("picked frame {} scoring {:.4}", best.0, best.1);

    Ok(Selection {
        frame: best.0,
        score: best.1,
        path: Track::from_sorted(boxes),
        marginals: scored,
    })
}

/// Scores every unpinned frame of one span.
fn span_scores<P>(
    trellis: &Trellis,
    best: &[PathNode],
    pool: &P,
    params: &Params,
) -> Result<Vec<(usize, f32)>>
where
    P: WorkerPool,
{
    let candidates: Vec<usize> = (0..trellis.len()).filter(|&i| !trellis.pinned(i)).collect();
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let fwd = trellis.forward_maps()?;
    let bwd = trellis.backward_maps()?;

    let results = pool.run(candidates, |i| -> Result<(usize, f32)> {
        let marginal = &fwd[i] + &bwd[i] - trellis.unary(i);
        let score = expected_error(trellis, i, &marginal, &best[i], params)?;
        Ok((trellis.frames()[i], score))
    });

    results.into_iter().collect()
}

/// Probability mass of placements that disagree with the best path at
/// this frame, under a softmin over total path costs.
fn expected_error(
    trellis: &Trellis,
    i: usize,
    marginal: &Array2<f32>,
    best: &PathNode,
    params: &Params,
) -> Result<f32> {
    let frame = trellis.frames()[i];
    if !marginal.iter().all(|v| v.is_finite()) {
        return Err(Error::NumericInstability(format!(
            "non-finite marginal at frame {}",
            frame
        )));
    }

    let mut min = f32::INFINITY;
    for &v in marginal.iter() {
        if v < min {
            min = v;
        }
    }

    let sigma = params.sigma.max(f32::EPSILON);
    let template = trellis.template();
    let scales = trellis.scale_map(i);
    let target = solver::node_box(best, template);

    let mut z = 0.0f64;
    let mut err = 0.0f64;

    for ((y, x), &v) in marginal.indexed_iter() {
        let p = (-((v - min) / sigma)).exp() as f64;
        if p == 0.0 {
            continue;
        }
        z += p;

        let node = PathNode {
            frame,
            x,
            y,
            scale: scales[(y, x)],
        };
        if solver::node_box(&node, template).percent_overlap(&target) < params.erroroverlap {
            err += p;
        }
    }

    Ok((err / z) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Serial;
    use ndarray::Array2;

    // lattice over frames 2..=10 with anchors at both ends pinned to
    // (2, 2) and an equally attractive detour at (10, 10) on the middle
    // frame: the well repays exactly the 5.4 units of motion the round
    // trip costs, so both modes carry the same total
    fn two_mode_lattice() -> Trellis {
        let n = 5;
        let mut unary = vec![Array2::<f32>::zeros((16, 16)); n];
        unary[2][(10, 10)] = -5.4;

        Trellis {
            frames: vec![2, 4, 6, 8, 10],
            unary,
            scale: vec![Array2::from_elem((16, 16), 1.0); n],
            weights: vec![0.05; n],
            head: Some((2, 2)),
            tail: Some((2, 2)),
            template: (20, 20),
        }
    }

    fn query_params() -> Params {
        Params {
            pairwisecost: 0.1,
            sigma: 0.05,
            erroroverlap: 0.25,
            ..Params::default()
        }
    }

    #[test]
    fn ambiguous_midpoint_scores_highest() {
        let trellis = two_mode_lattice();
        let params = query_params();
        let (nodes, _) = trellis.best_path().unwrap();

        let scores = span_scores(&trellis, &nodes, &Serial, &params).unwrap();

        assert_eq!(scores.len(), 4);
        let best = scores
            .iter()
            .fold(scores[0], |a, &b| if b.1 > a.1 { b } else { a });
        assert_eq!(best.0, 6);
        assert!(best.1 > 0.2, "midpoint score {}", best.1);
    }

    #[test]
    fn unambiguous_frames_score_low() {
        let trellis = two_mode_lattice();
        let params = query_params();
        let (nodes, _) = trellis.best_path().unwrap();

        let scores = span_scores(&trellis, &nodes, &Serial, &params).unwrap();

        for &(frame, score) in &scores {
            if frame != 6 {
                assert!(score < 0.05, "frame {} scored {}", frame, score);
            }
        }
    }

    #[test]
    fn pinned_frames_are_never_candidates() {
        let trellis = two_mode_lattice();
        let params = query_params();
        let (nodes, _) = trellis.best_path().unwrap();

        let scores = span_scores(&trellis, &nodes, &Serial, &params).unwrap();
        assert!(scores.iter().all(|&(f, _)| f != 10));
    }
}
