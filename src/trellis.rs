use log::trace;
use ndarray::prelude::*;

use crate::annotation::BBox;
use crate::dtrans;
use crate::error::{Error, Result};
use crate::frame::FrameSource;
use crate::model::AppearanceModel;
use crate::params::Params;
use crate::pool::WorkerPool;
use crate::scorer::{self, CostMap};
use crate::solver::FramePrior;

/// Placement chosen at one evaluated frame.
#[derive(Debug, Clone, Copy)]
pub struct PathNode {
    pub frame: usize,
    pub x: usize,
    pub y: usize,
    pub scale: f32,
}

/// Cost lattice over the evaluated frames of one span. Motion between
/// neighboring frames is charged quadratically in the displacement,
/// divided by the frame gap. Endpoints known from anchors enter as pins;
/// an unpinned end is read out at its cheapest placement.
pub struct Trellis {
    pub(crate) frames: Vec<usize>,
    pub(crate) unary: Vec<Array2<f32>>,
    pub(crate) scale: Vec<Array2<f32>>,
    /// weights[i] weighs the hop into frames[i]; weights[0] is only used
    /// when a head pin exists.
    pub(crate) weights: Vec<f32>,
    pub(crate) head: Option<(usize, usize)>,
    pub(crate) tail: Option<(usize, usize)>,
    pub(crate) template: (u32, u32),
}

impl Trellis {
    /// Scores every listed frame and assembles the lattice. `head` is an
    /// anchor strictly before the first listed frame; `tail` is an anchor
    /// at exactly the last listed frame.
    pub fn build<F, P>(
        eval: Vec<usize>,
        head: Option<&BBox>,
        tail: Option<&BBox>,
        model: &AppearanceModel,
        source: &F,
        pool: &P,
        params: &Params,
        prior: &FramePrior,
    ) -> Result<Self>
    where
        F: FrameSource + ?Sized,
        P: WorkerPool,
    {
        let results = pool.run(eval.clone(), |f| -> Result<(Array2<f32>, Array2<f32>)> {
            let image = source.frame(f)?;
            let maps = scorer::score_frame_scales(&image, model, &params.scales);
            let combined = combine_scales(maps);
            trace!(
                "frame {}: {}x{} placements",
                f,
                combined.0.dim().0,
                combined.0.dim().1
            );
            Ok(combined)
        });

        let mut unary = Vec::with_capacity(eval.len());
        let mut scale = Vec::with_capacity(eval.len());
        let mut dims: Option<(usize, usize)> = None;

        for (f, r) in eval.iter().zip(results) {
            let (mut costs, s) = r?;

            if costs.is_empty() {
                return Err(Error::TrackImpossible(format!(
                    "template does not fit anywhere in frame {}",
                    f
                )));
            }
            match dims {
                None => dims = Some(costs.dim()),
                Some(d) if d != costs.dim() => {
                    return Err(Error::TrackImpossible(format!(
                        "placement grid changed size at frame {}",
                        f
                    )));
                }
                _ => {}
            }

            costs.mapv_inplace(|v| v.min(params.upperthreshold));
            if let Some(p) = prior.get(*f) {
                add_prior(&mut costs, p);
            }
            if !costs.iter().all(|v| v.is_finite()) {
                return Err(Error::NumericInstability(format!(
                    "non-finite appearance cost at frame {}",
                    f
                )));
            }

            unary.push(costs);
            scale.push(s);
        }

        let (rows, cols) = match dims {
            Some(d) => d,
            None => {
                return Err(Error::TrackImpossible("no frames to evaluate".into()));
            }
        };

        let mut weights = Vec::with_capacity(eval.len());
        for (i, &f) in eval.iter().enumerate() {
            let prev = match i {
                0 => head.map(|b| b.frame).unwrap_or(f),
                _ => eval[i - 1],
            };
            let gap = f.saturating_sub(prev).max(1);
            weights.push(params.pairwisecost / gap as f32);
        }

        let pin = |b: &BBox| -> (usize, usize) {
            (
                b.xtl.clamp(0, cols as i32 - 1) as usize,
                b.ytl.clamp(0, rows as i32 - 1) as usize,
            )
        };

        Ok(Self {
            frames: eval,
            unary,
            scale,
            weights,
            head: head.map(pin),
            tail: tail.map(pin),
            template: (model.width, model.height),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn frames(&self) -> &[usize] {
        &self.frames
    }

    #[inline]
    pub fn unary(&self, i: usize) -> &Array2<f32> {
        &self.unary[i]
    }

    #[inline]
    pub fn scale_map(&self, i: usize) -> &Array2<f32> {
        &self.scale[i]
    }

    #[inline]
    pub fn template(&self) -> (u32, u32) {
        self.template
    }

    /// Whether the frame at index `i` is fixed by an anchor.
    #[inline]
    pub fn pinned(&self, i: usize) -> bool {
        self.tail.is_some() && i + 1 == self.frames.len()
    }

    /// Cheapest total path and its cost, head to tail.
    pub fn best_path(&self) -> Result<(Vec<PathNode>, f32)> {
        let (maps, args) = self.forward_pass()?;
        let last = maps.len() - 1;

        let (mut x, mut y) = match self.tail {
            Some(pin) => pin,
            None => {
                let mut at = (0, 0);
                let mut best = f32::INFINITY;
                for ((yy, xx), &v) in maps[last].indexed_iter() {
                    if v < best {
                        best = v;
                        at = (xx, yy);
                    }
                }
                at
            }
        };

        let total = maps[last][(y, x)];
        let mut nodes = Vec::with_capacity(maps.len());

        for i in (0..maps.len()).rev() {
            nodes.push(PathNode {
                frame: self.frames[i],
                x,
                y,
                scale: self.scale[i][(y, x)],
            });
            if i > 0 {
                let (ax, ay) = &args[i - 1];
                let (nx, ny) = (ax[(y, x)], ay[(y, x)]);
                x = nx;
                y = ny;
            }
        }
        nodes.reverse();

        Ok((nodes, total))
    }

    /// Cheapest cost of reaching each placement from the head side.
    pub fn forward_maps(&self) -> Result<Vec<Array2<f32>>> {
        self.forward_pass().map(|(maps, _)| maps)
    }

    /// Cheapest cost of finishing the span from each placement. At a
    /// pinned tail every other placement is infeasible.
    pub fn backward_maps(&self) -> Result<Vec<Array2<f32>>> {
        self.backward_pass()
    }

    fn forward_pass(&self) -> Result<(Vec<Array2<f32>>, Vec<(Array2<usize>, Array2<usize>)>)> {
        let n = self.unary.len();
        let mut maps = Vec::with_capacity(n);
        let mut args = Vec::with_capacity(n.saturating_sub(1));

        let first = match self.head {
            Some(pin) => pinned_step(&self.unary[0], self.weights[0], pin, 0.0),
            None => self.unary[0].clone(),
        };
        check_finite(&first, self.frames[0])?;
        maps.push(first);

        for i in 1..n {
            let t = dtrans::quadratic_2d(maps[i - 1].view(), self.weights[i]);
            let acc = t.values + &self.unary[i];
            check_finite(&acc, self.frames[i])?;
            maps.push(acc);
            args.push((t.argmin_x, t.argmin_y));
        }

        Ok((maps, args))
    }

    fn backward_pass(&self) -> Result<Vec<Array2<f32>>> {
        let n = self.unary.len();
        let mut rev = Vec::with_capacity(n);

        match self.tail {
            Some((px, py)) => {
                let pinned = self.unary[n - 1][(py, px)];
                let mut last = Array2::from_elem(self.unary[n - 1].raw_dim(), f32::INFINITY);
                last[(py, px)] = pinned;
                rev.push(last);

                if n >= 2 {
                    let step =
                        pinned_step(&self.unary[n - 2], self.weights[n - 1], (px, py), pinned);
                    check_finite(&step, self.frames[n - 2])?;
                    rev.push(step);
                }
            }
            None => {
                rev.push(self.unary[n - 1].clone());
            }
        }

        while rev.len() < n {
            let i = n - 1 - rev.len();
            let t = dtrans::quadratic_2d(rev[rev.len() - 1].view(), self.weights[i + 1]);
            let acc = t.values + &self.unary[i];
            check_finite(&acc, self.frames[i])?;
            rev.push(acc);
        }

        rev.reverse();
        Ok(rev)
    }
}

fn pinned_step(unary: &Array2<f32>, w: f32, (px, py): (usize, usize), offset: f32) -> Array2<f32> {
    Array2::from_shape_fn(unary.raw_dim(), |(y, x)| {
        let dx = x as f32 - px as f32;
        let dy = y as f32 - py as f32;
        unary[(y, x)] + w * (dx * dx + dy * dy) + offset
    })
}

fn check_finite(map: &Array2<f32>, frame: usize) -> Result<()> {
    if map.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::NumericInstability(format!(
            "non-finite accumulated cost at frame {}",
            frame
        )))
    }
}

fn add_prior(costs: &mut Array2<f32>, prior: &Array2<f32>) {
    let rows = costs.dim().0.min(prior.dim().0);
    let cols = costs.dim().1.min(prior.dim().1);
    let mut window = costs.slice_mut(s![..rows, ..cols]);
    window += &prior.slice(s![..rows, ..cols]);
}

/// Folds the per-scale maps into one grid over original frame coordinates,
/// keeping the cheapest scale per cell. Scales where the template no
/// longer fits contribute nothing.
fn combine_scales(maps: Vec<CostMap>) -> (Array2<f32>, Array2<f32>) {
    let mut usable: Vec<CostMap> = maps
        .into_iter()
        .filter(|m| !m.is_empty() && m.scale > 0.0)
        .collect();

    if usable.is_empty() {
        return (Array2::zeros((0, 0)), Array2::zeros((0, 0)));
    }
    if usable.len() == 1 && (usable[0].scale - 1.0).abs() < f32::EPSILON {
        let m = usable.swap_remove(0);
        let dim = m.costs.raw_dim();
        return (m.costs, Array2::from_elem(dim, 1.0));
    }

    let mut rows = usize::MAX;
    let mut cols = usize::MAX;
    for m in &usable {
        rows = rows.min(mapped_extent(m.costs.dim().0, m.scale));
        cols = cols.min(mapped_extent(m.costs.dim().1, m.scale));
    }
    if rows == 0 || cols == 0 {
        return (Array2::zeros((0, 0)), Array2::zeros((0, 0)));
    }

    let mut costs = Array2::from_elem((rows, cols), f32::INFINITY);
    let mut scale = Array2::from_elem((rows, cols), 1.0f32);

    for m in &usable {
        for oy in 0..rows {
            let sy = (oy as f32 * m.scale).round() as usize;
            for ox in 0..cols {
                let sx = (ox as f32 * m.scale).round() as usize;
                let v = m.costs[(sy, sx)];
                if v < costs[(oy, ox)] {
                    costs[(oy, ox)] = v;
                    scale[(oy, ox)] = m.scale;
                }
            }
        }
    }

    (costs, scale)
}

fn mapped_extent(n: usize, s: f32) -> usize {
    let mut e = 0;
    while ((e as f32 * s).round() as usize) < n {
        e += 1;
    }
    e
}
