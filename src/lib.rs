pub mod annotation;
pub mod dtrans;
pub mod error;
pub mod features;
pub mod frame;
pub mod interpolation;
pub mod marginals;
pub mod model;
pub mod params;
pub mod pool;
pub mod scorer;
pub mod solver;
pub mod svm;

mod trellis;

pub use annotation::{BBox, Track};
pub use error::{Error, Result};
pub use frame::FrameSource;
pub use marginals::{pick, Selection};
pub use model::AppearanceModel;
pub use params::{Params, Scales};
pub use pool::{Serial, Threaded, WorkerPool};
pub use scorer::{score_frame, score_frame_scales, CostMap};
pub use solver::{fill, FramePrior, SpanBounds};

/// Convenience facade binding a frame source, a worker pool and tunables
/// together for repeated solve and query rounds over one video.
pub struct Tracker<F, P> {
    frames: F,
    pool: P,
    params: Params,
}

impl<F, P> Tracker<F, P>
where
    F: FrameSource,
    P: WorkerPool,
{
    pub fn new(frames: F, pool: P, params: Params) -> Self {
        Self {
            frames,
            pool,
            params,
        }
    }

    #[inline]
    pub fn params(&self) -> &Params {
        &self.params
    }

    #[inline]
    pub fn frames(&self) -> &F {
        &self.frames
    }

    /// Solves the trajectory through the given anchors.
    pub fn fill(&self, anchors: &[BBox], bounds: &SpanBounds, prior: &FramePrior) -> Result<Track> {
        solver::fill(
            anchors,
            &self.frames,
            &self.pool,
            &self.params,
            bounds,
            prior,
        )
    }

    /// Proposes the next frame a human should annotate.
    pub fn pick(
        &self,
        anchors: &[BBox],
        bounds: &SpanBounds,
        prior: &FramePrior,
    ) -> Result<Selection> {
        marginals::pick(
            anchors,
            &self.frames,
            &self.pool,
            &self.params,
            bounds,
            prior,
        )
    }
}
