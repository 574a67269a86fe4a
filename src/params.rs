use serde_derive::{Deserialize, Serialize};

/// Candidate object scales searched by the frame scorer.
///
/// A factor s rescales the frame by s before correlation, so the template
/// matches objects of size template/s in the original image.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub enum Scales {
    /// Score at the native scale only.
    Single,
    /// Score at every factor in `start, start + step, ...` below `stop`.
    Range { start: f32, stop: f32, step: f32 },
}

impl Scales {
    pub fn factors(&self) -> Vec<f32> {
        match *self {
            Scales::Single => vec![1.0],
            Scales::Range { start, stop, step } => {
                if step <= 0.0 || stop <= start {
                    return vec![start];
                }

                let mut out = Vec::new();
                let mut s = start;
                while s < stop {
                    out.push(s);
                    s += step;
                }
                out
            }
        }
    }
}

impl Default for Scales {
    fn default() -> Self {
        Scales::Single
    }
}

/// Engine tunables with their reference defaults.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Params {
    /// Quadratic penalty weight on displacement between adjacent frames.
    pub pairwisecost: f32,
    /// Appearance model regularization strength.
    pub c: f32,
    /// Softmin temperature for the marginal estimator.
    pub sigma: f32,
    /// Gradient histogram cell size, px.
    pub hogbin: usize,
    /// Color statistic cell size, px.
    pub rgbbin: usize,
    /// Ceiling on the per-placement appearance cost.
    pub upperthreshold: f32,
    /// Overlap below which a placement counts as a label change.
    pub erroroverlap: f32,
    /// Frame subsampling stride for cost evaluation; skipped frames are
    /// interpolated in the returned trajectory.
    pub skip: usize,
    /// Background window sampling stride, px.
    pub bgskip: usize,
    /// Cap on the number of background training windows.
    pub bgsize: usize,
    /// Scale search policy.
    pub scales: Scales,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            pairwisecost: 0.001,
            c: 1.0,
            sigma: 0.1,
            hogbin: 8,
            rgbbin: 8,
            upperthreshold: 10.0,
            erroroverlap: 0.5,
            skip: 3,
            bgskip: 4,
            bgsize: 50_000,
            scales: Scales::Single,
        }
    }
}
