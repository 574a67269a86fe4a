//! Generalized distance transforms under a quadratic penalty.
//!
//! For a cost array `f` and weight `a`, computes `g[i] = min_j f[j] + a (i - j)^2`
//! for every `i` in linear time by maintaining the lower envelope of the
//! parabolas rooted at each `j`. The 2-D form applies the 1-D transform
//! along rows and then columns, which is exact because the penalty is
//! separable in x and y.

use ndarray::prelude::*;

/// Result of the 2-D transform: minimum values plus, for every cell, the
/// source cell that attains the minimum.
#[derive(Debug, Clone)]
pub struct Transform2d {
    pub values: Array2<f32>,
    pub argmin_x: Array2<usize>,
    pub argmin_y: Array2<usize>,
}

/// 1-D transform with argmins. Inputs must be finite.
pub fn quadratic_1d(f: &[f32], a: f32) -> (Vec<f32>, Vec<usize>) {
    let n = f.len();
    let mut d = vec![0.0f32; n];
    let mut arg = vec![0usize; n];

    if n == 0 {
        return (d, arg);
    }

    envelope(f, a, &mut d, &mut arg, &mut vec![0; n], &mut vec![0.0; n + 1]);

    (d, arg)
}

fn envelope(f: &[f32], a: f32, d: &mut [f32], arg: &mut [usize], v: &mut [usize], z: &mut [f32]) {
    let n = f.len();

    if a <= 0.0 {
        // zero weight degenerates to the plain minimum
        let mut best = 0;
        for j in 1..n {
            if f[j] < f[best] {
                best = j;
            }
        }
        d.fill(f[best]);
        arg.fill(best);
        return;
    }

    // build the lower envelope of parabolas rooted at each index
    let mut k = 0usize;
    v[0] = 0;
    z[0] = f32::NEG_INFINITY;
    z[1] = f32::INFINITY;

    for q in 1..n {
        let fq = f[q] + a * (q * q) as f32;
        loop {
            let p = v[k];
            let fp = f[p] + a * (p * p) as f32;
            // intersection of the parabolas rooted at p and q
            let s = (fq - fp) / (2.0 * a * (q - p) as f32);

            if s <= z[k] {
                k -= 1;
            } else {
                k += 1;
                v[k] = q;
                z[k] = s;
                z[k + 1] = f32::INFINITY;
                break;
            }
        }
    }

    // read the envelope back out
    let mut k = 0usize;
    for (q, (dq, aq)) in d.iter_mut().zip(arg.iter_mut()).enumerate() {
        let qf = q as f32;
        while z[k + 1] < qf {
            k += 1;
        }

        let p = v[k];
        let diff = qf - p as f32;
        *dq = f[p] + a * diff * diff;
        *aq = p;
    }
}

/// 2-D transform: `values[(y, x)] = min over (py, px) of
/// f[(py, px)] + a ((x - px)^2 + (y - py)^2)`.
pub fn quadratic_2d(f: ArrayView2<'_, f32>, a: f32) -> Transform2d {
    let (rows, cols) = f.dim();
    let mut values = Array2::<f32>::zeros((rows, cols));
    let mut argmin_x = Array2::<usize>::zeros((rows, cols));
    let mut argmin_y = Array2::<usize>::zeros((rows, cols));

    if rows == 0 || cols == 0 {
        return Transform2d {
            values,
            argmin_x,
            argmin_y,
        };
    }

    let n = rows.max(cols);
    let mut buf = vec![0.0f32; n];
    let mut d = vec![0.0f32; n];
    let mut arg = vec![0usize; n];
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f32; n + 1];

    // rows first: minimum over x within each row
    let mut row_arg = Array2::<usize>::zeros((rows, cols));
    for y in 0..rows {
        for x in 0..cols {
            buf[x] = f[(y, x)];
        }
        envelope(&buf[..cols], a, &mut d[..cols], &mut arg[..cols], &mut v, &mut z);
        for x in 0..cols {
            values[(y, x)] = d[x];
            row_arg[(y, x)] = arg[x];
        }
    }

    // then columns: minimum over y of the row results
    for x in 0..cols {
        for y in 0..rows {
            buf[y] = values[(y, x)];
        }
        envelope(&buf[..rows], a, &mut d[..rows], &mut arg[..rows], &mut v, &mut z);
        for y in 0..rows {
            let py = arg[y];
            values[(y, x)] = d[y];
            argmin_y[(y, x)] = py;
            argmin_x[(y, x)] = row_arg[(py, x)];
        }
    }

    Transform2d {
        values,
        argmin_x,
        argmin_y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn brute_1d(f: &[f32], a: f32) -> Vec<f32> {
        (0..f.len())
            .map(|i| {
                (0..f.len())
                    .map(|j| {
                        let d = i as f32 - j as f32;
                        f[j] + a * d * d
                    })
                    .fold(f32::INFINITY, f32::min)
            })
            .collect()
    }

    fn brute_2d(f: &Array2<f32>, a: f32) -> Array2<f32> {
        let (rows, cols) = f.dim();
        Array2::from_shape_fn((rows, cols), |(y, x)| {
            let mut best = f32::INFINITY;
            for py in 0..rows {
                for px in 0..cols {
                    let dx = x as f32 - px as f32;
                    let dy = y as f32 - py as f32;
                    best = best.min(f[(py, px)] + a * (dx * dx + dy * dy));
                }
            }
            best
        })
    }

    #[test]
    fn matches_brute_force_1d() {
        let f = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 5.0, 3.5];

        for a in [0.001f32, 0.1, 1.0, 10.0] {
            let (d, arg) = quadratic_1d(&f, a);
            let expected = brute_1d(&f, a);

            for i in 0..f.len() {
                assert_relative_eq!(d[i], expected[i], max_relative = 1e-5);
                // argmins must reproduce the reported minimum
                let diff = i as f32 - arg[i] as f32;
                assert_relative_eq!(d[i], f[arg[i]] + a * diff * diff, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn matches_brute_force_1d_random() {
        let mut rng = StdRng::seed_from_u64(17);

        for _ in 0..20 {
            let n = rng.gen_range(1..60);
            let f: Vec<f32> = (0..n).map(|_| rng.gen_range(-5.0..20.0)).collect();
            let a = rng.gen_range(0.0005..4.0);

            let (d, _) = quadratic_1d(&f, a);
            let expected = brute_1d(&f, a);

            for i in 0..n {
                assert_relative_eq!(d[i], expected[i], max_relative = 1e-4, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn zero_weight_is_global_minimum() {
        let f = [5.0, 2.0, 7.0, 2.0, 8.0];
        let (d, arg) = quadratic_1d(&f, 0.0);

        assert!(d.iter().all(|&v| v == 2.0));
        assert!(arg.iter().all(|&j| j == 1));
    }

    #[test]
    fn single_element() {
        let (d, arg) = quadratic_1d(&[4.2], 1.0);
        assert_eq!(d, vec![4.2]);
        assert_eq!(arg, vec![0]);
    }

    #[test]
    fn matches_brute_force_2d() {
        let mut rng = StdRng::seed_from_u64(99);

        for &(rows, cols) in &[(1usize, 7usize), (6, 1), (5, 8), (11, 9)] {
            let f = Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-2.0..15.0f32));

            for a in [0.01f32, 0.5, 2.0] {
                let t = quadratic_2d(f.view(), a);
                let expected = brute_2d(&f, a);

                for y in 0..rows {
                    for x in 0..cols {
                        assert_relative_eq!(
                            t.values[(y, x)],
                            expected[(y, x)],
                            max_relative = 1e-4,
                            epsilon = 1e-4
                        );

                        let px = t.argmin_x[(y, x)];
                        let py = t.argmin_y[(y, x)];
                        let dx = x as f32 - px as f32;
                        let dy = y as f32 - py as f32;
                        assert_relative_eq!(
                            t.values[(y, x)],
                            f[(py, px)] + a * (dx * dx + dy * dy),
                            max_relative = 1e-4,
                            epsilon = 1e-4
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn deep_minimum_dominates_neighborhood() {
        let mut f = Array2::from_elem((9, 9), 10.0f32);
        f[(4, 4)] = -50.0;

        let t = quadratic_2d(f.view(), 1.0);

        // every cell within the well's reach points back at it
        assert_eq!(t.argmin_x[(0, 0)], 4);
        assert_eq!(t.argmin_y[(0, 0)], 4);
        assert_relative_eq!(t.values[(0, 0)], -50.0 + 32.0, max_relative = 1e-5);
    }
}
