use std::collections::BTreeMap;

use log::{debug, warn};
use ndarray::Array2;

use crate::annotation::{BBox, Track};
use crate::error::{Error, Result};
use crate::frame::FrameSource;
use crate::interpolation;
use crate::model::AppearanceModel;
use crate::params::Params;
use crate::pool::WorkerPool;
use crate::trellis::{PathNode, Trellis};

/// Extends a solve beyond the outermost anchors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanBounds {
    /// Track backward to this frame before the first anchor.
    pub first: Option<usize>,
    /// Track forward to this frame after the last anchor.
    pub last: Option<usize>,
}

/// Optional per-frame cost surfaces added into the appearance term,
/// aligned to the top-left of the placement grid.
#[derive(Debug, Clone)]
pub enum FramePrior {
    None,
    Surfaces(BTreeMap<usize, Array2<f32>>),
}

impl Default for FramePrior {
    fn default() -> Self {
        FramePrior::None
    }
}

impl FramePrior {
    pub fn get(&self, frame: usize) -> Option<&Array2<f32>> {
        match self {
            FramePrior::None => None,
            FramePrior::Surfaces(map) => map.get(&frame),
        }
    }
}

/// One stretch of frames to solve, delimited by anchors or open bounds.
#[derive(Debug, Clone)]
pub(crate) enum Span {
    /// Open start ending at the first anchor.
    Lead { first: usize, tail: BBox },
    /// Between two consecutive anchors.
    Bridge { head: BBox, tail: BBox },
    /// From the last anchor to an open end.
    Trail { head: BBox, last: usize },
}

impl Span {
    pub(crate) fn range(&self) -> (usize, usize) {
        match self {
            Span::Lead { first, tail } => (*first, tail.frame),
            Span::Bridge { head, tail } => (head.frame, tail.frame),
            Span::Trail { head, last } => (head.frame, *last),
        }
    }

    /// Frames the solver scores inside this span, ascending. Anchored
    /// interiors are subsampled every `skip` frames; forced endpoints are
    /// always present.
    pub(crate) fn eval_frames(&self, skip: usize) -> Vec<usize> {
        let skip = skip.max(1);
        match self {
            Span::Bridge { head, tail } => {
                let mut out = Vec::new();
                let mut f = head.frame + skip;
                while f < tail.frame {
                    out.push(f);
                    f += skip;
                }
                out.push(tail.frame);
                out
            }
            Span::Trail { head, last } => {
                let mut out = Vec::new();
                let mut f = head.frame + skip;
                while f < *last {
                    out.push(f);
                    f += skip;
                }
                out.push(*last);
                out
            }
            Span::Lead { first, tail } => {
                let mut out = Vec::new();
                let mut f = tail.frame as isize - skip as isize;
                while f > *first as isize {
                    out.push(f as usize);
                    f -= skip as isize;
                }
                out.push(*first);
                out.reverse();
                out.push(tail.frame);
                out
            }
        }
    }
}

/// Drops lost anchors, sorts by frame and validates against the source.
pub(crate) fn prepare_anchors<F>(anchors: &[BBox], frames: &F) -> Result<Vec<BBox>>
where
    F: FrameSource + ?Sized,
{
    let len = frames.len();
    let mut usable: Vec<BBox> = Vec::with_capacity(anchors.len());

    for b in anchors {
        if b.lost {
            warn!("dropping lost anchor at frame {}", b.frame);
            continue;
        }
        usable.push(b.clone());
    }

    if usable.is_empty() {
        return Err(Error::TrackImpossible("no usable anchors".into()));
    }

    usable.sort_by_key(|b| b.frame);
    for pair in usable.windows(2) {
        if pair[0].frame == pair[1].frame {
            return Err(Error::TrackImpossible(format!(
                "two anchors on frame {}",
                pair[0].frame
            )));
        }
    }

    for b in &usable {
        if b.frame >= len {
            return Err(Error::OutOfBoundsFrame { frame: b.frame, len });
        }
    }

    Ok(usable)
}

pub(crate) fn plan_spans(anchors: &[BBox], bounds: &SpanBounds, len: usize) -> Result<Vec<Span>> {
    let mut spans = Vec::new();

    if let Some(first) = bounds.first {
        if first >= len {
            return Err(Error::OutOfBoundsFrame { frame: first, len });
        }
        let start = anchors[0].frame;
        if first < start {
            spans.push(Span::Lead {
                first,
                tail: anchors[0].clone(),
            });
        } else if first > start {
            warn!(
                "ignoring backward bound {} behind the first anchor at {}",
                first, start
            );
        }
    }

    for pair in anchors.windows(2) {
        spans.push(Span::Bridge {
            head: pair[0].clone(),
            tail: pair[1].clone(),
        });
    }

    if let Some(last) = bounds.last {
        if last >= len {
            return Err(Error::OutOfBoundsFrame { frame: last, len });
        }
        let end = anchors[anchors.len() - 1].frame;
        if last > end {
            spans.push(Span::Trail {
                head: anchors[anchors.len() - 1].clone(),
                last,
            });
        } else if last < end {
            warn!(
                "ignoring forward bound {} before the last anchor at {}",
                last, end
            );
        }
    }

    Ok(spans)
}

/// Builds the span's cost lattice, or nothing when two anchors sit on
/// adjacent frames and there is no interior to solve.
pub(crate) fn span_trellis<F, P>(
    span: &Span,
    model: &AppearanceModel,
    frames: &F,
    pool: &P,
    params: &Params,
    prior: &FramePrior,
) -> Result<Option<Trellis>>
where
    F: FrameSource + ?Sized,
    P: WorkerPool,
{
    if let Span::Bridge { head, tail } = span {
        if tail.frame == head.frame + 1 {
            return Ok(None);
        }
    }

    let eval = span.eval_frames(params.skip);
    let (head, tail) = match span {
        Span::Bridge { head, tail } => (Some(head), Some(tail)),
        Span::Trail { head, .. } => (Some(head), None),
        Span::Lead { tail, .. } => (None, Some(tail)),
    };

    Trellis::build(eval, head, tail, model, frames, pool, params, prior).map(Some)
}

/// Box for a solved placement, sized by the winning scale.
pub(crate) fn node_box(node: &PathNode, (width, height): (u32, u32)) -> BBox {
    let w = ((width as f32 / node.scale).round() as i32).max(1);
    let h = ((height as f32 / node.scale).round() as i32).max(1);

    let mut b = BBox::new(
        node.x as i32,
        node.y as i32,
        node.x as i32 + w,
        node.y as i32 + h,
        node.frame,
    );
    b.generated = true;
    b
}

/// Turns the solved placements of one span into boxes on every frame.
/// Anchor boxes come back verbatim; skipped frames are interpolated.
pub(crate) fn dense_span(
    span: &Span,
    nodes: &[PathNode],
    template: (u32, u32),
) -> Result<Vec<BBox>> {
    let mut sparse: Vec<BBox> = Vec::with_capacity(nodes.len() + 1);

    match span {
        Span::Bridge { head, .. } | Span::Trail { head, .. } => sparse.push(head.clone()),
        Span::Lead { .. } => {}
    }

    let anchored_tail = match span {
        Span::Bridge { tail, .. } | Span::Lead { tail, .. } => Some(tail),
        Span::Trail { .. } => None,
    };

    for node in nodes {
        match anchored_tail {
            Some(t) if t.frame == node.frame => sparse.push(t.clone()),
            _ => sparse.push(node_box(node, template)),
        }
    }

    interpolation::linear_fill(&sparse)
}

/// Infers the full trajectory through the given anchors. Every frame from
/// the first covered frame to the last gets exactly one box; the anchors
/// themselves come back untouched.
pub fn fill<F, P>(
    anchors: &[BBox],
    frames: &F,
    pool: &P,
    params: &Params,
    bounds: &SpanBounds,
    prior: &FramePrior,
) -> Result<Track>
where
    F: FrameSource + ?Sized,
    P: WorkerPool,
{
    let anchors = prepare_anchors(anchors, frames)?;
    let spans = plan_spans(&anchors, bounds, frames.len())?;
    if spans.is_empty() {
        return Ok(Track::from_sorted(anchors));
    }

    let model = AppearanceModel::train(&anchors, frames, params)?;
    debug!("solving {} spans through {} anchors", spans.len(), anchors.len());

    let mut boxes: Vec<BBox> = Vec::new();
    for span in &spans {
        let (lo, hi) = span.range();
        let dense = match span_trellis(span, &model, frames, pool, params, prior)? {
            None => match span {
                Span::Bridge { head, tail } => vec![head.clone(), tail.clone()],
                _ => continue,
            },
            Some(trellis) => {
                let (nodes, cost) = trellis.best_path()?;
                debug!("span {}..{}: cost {:.3} over {} frames", lo, hi, cost, nodes.len());
                dense_span(span, &nodes, trellis.template())?
            }
        };

        if let (Some(prev), Some(next)) = (boxes.last(), dense.first()) {
            if prev.frame == next.frame {
                boxes.pop();
            }
        }
        boxes.extend(dense);
    }

    Ok(Track::from_sorted(boxes))
}
