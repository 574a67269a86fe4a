use nalgebra as na;

use log::debug;

use crate::error::{Error, Result};

const MAX_EPOCHS: usize = 1000;
const TOLERANCE: f32 = 0.1;

/// L2-regularized hinge-loss linear classifier, fit in the dual by
/// coordinate descent. The sweep order is fixed, so identical inputs
/// always produce identical weights.
pub struct LinearSvm {
    pub weights: na::DVector<f32>,
    pub bias: f32,
}

impl LinearSvm {
    pub fn train(
        positives: &[na::DVector<f32>],
        negatives: &[na::DVector<f32>],
        c: f32,
    ) -> Result<Self> {
        if positives.is_empty() || negatives.is_empty() {
            return Err(Error::InvalidModelInput(
                "training requires both positive and negative examples".into(),
            ));
        }

        if !(c > 0.0) {
            return Err(Error::InvalidModelInput(format!(
                "regularization constant must be positive, got {}",
                c
            )));
        }

        let dim = positives[0].len();
        if dim == 0 {
            return Err(Error::InvalidModelInput("empty feature vectors".into()));
        }
        for x in positives.iter().chain(negatives.iter()) {
            if x.len() != dim {
                return Err(Error::InvalidModelInput(format!(
                    "feature length mismatch: {} vs {}",
                    x.len(),
                    dim
                )));
            }
            if !x.iter().all(|v| v.is_finite()) {
                return Err(Error::InvalidModelInput(
                    "non-finite value in training features".into(),
                ));
            }
        }

        let n = positives.len() + negatives.len();
        let example = |i: usize| -> (&na::DVector<f32>, f32) {
            if i < positives.len() {
                (&positives[i], 1.0)
            } else {
                (&negatives[i - positives.len()], -1.0)
            }
        };

        // the bias is learned through an appended constant feature
        let diag: Vec<f32> = (0..n).map(|i| example(i).0.norm_squared() + 1.0).collect();

        let mut w = na::DVector::<f32>::zeros(dim);
        let mut b = 0.0f32;
        let mut alpha = vec![0.0f32; n];
        let mut epochs = 0;

        for epoch in 0..MAX_EPOCHS {
            epochs = epoch + 1;
            let mut violation = 0.0f32;

            for i in 0..n {
                let (x, y) = example(i);
                let g = y * (w.dot(x) + b) - 1.0;

                let pg = if alpha[i] <= 0.0 {
                    g.min(0.0)
                } else if alpha[i] >= c {
                    g.max(0.0)
                } else {
                    g
                };
                violation = violation.max(pg.abs());

                if pg != 0.0 {
                    let old = alpha[i];
                    alpha[i] = (old - g / diag[i]).clamp(0.0, c);
                    let step = (alpha[i] - old) * y;

                    if step != 0.0 {
                        w.axpy(step, x, 1.0);
                        b += step;
                    }
                }
            }

            if violation < TOLERANCE {
                break;
            }
        }

        debug!(
            "svm converged after {} epochs over {} examples ({} positive)",
            epochs,
            n,
            positives.len()
        );

        Ok(Self { weights: w, bias: b })
    }

    /// Decision value for one feature vector.
    #[inline]
    pub fn decision(&self, x: &na::DVector<f32>) -> f32 {
        self.weights.dot(x) + self.bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vecs(rows: &[[f32; 2]]) -> Vec<na::DVector<f32>> {
        rows.iter()
            .map(|r| na::DVector::from_row_slice(r))
            .collect()
    }

    #[test]
    fn separates_disjoint_clusters() {
        let pos = vecs(&[[2.0, 2.0], [2.5, 1.8], [3.0, 2.2], [2.2, 2.6]]);
        let neg = vecs(&[[-2.0, -2.0], [-2.5, -1.7], [-3.0, -2.1], [-1.8, -2.4]]);

        let svm = LinearSvm::train(&pos, &neg, 1.0).unwrap();

        for x in &pos {
            assert!(svm.decision(x) > 0.0);
        }
        for x in &neg {
            assert!(svm.decision(x) < 0.0);
        }
    }

    #[test]
    fn training_is_deterministic() {
        let pos = vecs(&[[1.0, 0.3], [0.8, 0.5], [1.2, 0.1]]);
        let neg = vecs(&[[-0.5, -0.2], [-0.9, 0.0], [-1.1, -0.4]]);

        let a = LinearSvm::train(&pos, &neg, 0.7).unwrap();
        let b = LinearSvm::train(&pos, &neg, 0.7).unwrap();

        assert_eq!(a.bias, b.bias);
        assert_eq!(a.weights, b.weights);
    }

    #[test]
    fn rejects_empty_sides() {
        let pos = vecs(&[[1.0, 1.0]]);
        assert!(matches!(
            LinearSvm::train(&pos, &[], 1.0),
            Err(Error::InvalidModelInput(_))
        ));
        assert!(matches!(
            LinearSvm::train(&[], &pos, 1.0),
            Err(Error::InvalidModelInput(_))
        ));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let pos = vecs(&[[1.0, 1.0]]);
        let neg = vec![na::DVector::from_row_slice(&[0.0, 0.0, 0.0])];
        assert!(LinearSvm::train(&pos, &neg, 1.0).is_err());
    }
}
