//! Randomized splitting-hyperplane estimation.
//!
//! The tree builder splits each candidate set with a hyperplane derived
//! from a fast two-means heuristic: pick two random seed vectors, then run
//! a fixed number of weighted running-average refinement steps. This is an
//! approximation that only has to pick a reasonable split, not converge to
//! a true 2-clustering.

use rand::Rng;

use crate::distance::{dot, normalize, squared_l2};

/// A splitting hyperplane: unit normal plus signed offset.
#[derive(Debug, Clone)]
pub struct Hyperplane {
    /// Unit normal of the plane.
    pub normal: Vec<f32>,
    /// Signed offset term; the plane is `dot(normal, x) + alpha == 0`.
    pub alpha: f32,
}

impl Hyperplane {
    /// Derive a hyperplane from a candidate set via the two-means heuristic.
    ///
    /// The candidate set must contain at least two vectors.
    pub fn from_candidates<R: Rng>(
        candidates: &[&[f32]],
        iterations: usize,
        rng: &mut R,
    ) -> Self {
        let (p, q) = two_means(candidates, iterations, rng);
        Self::from_means(&p, &q)
    }

    /// Build the perpendicular bisector of two mean vectors.
    pub fn from_means(p: &[f32], q: &[f32]) -> Self {
        debug_assert_eq!(p.len(), q.len());
        let mut normal: Vec<f32> = p.iter().zip(q.iter()).map(|(&a, &b)| a - b).collect();
        normalize(&mut normal);

        let mut alpha = 0.0f32;
        for z in 0..normal.len() {
            alpha += -normal[z] * (p[z] + q[z]) / 2.0;
        }

        Self { normal, alpha }
    }

    /// Signed distance of a vector from the plane.
    #[inline]
    pub fn margin(&self, v: &[f32]) -> f32 {
        self.alpha + dot(&self.normal, v)
    }

    /// Which side of the plane a vector falls on.
    ///
    /// `false` is the left side (margin of exactly zero routes left), `true`
    /// the right. Search descent must use the identical tie-break.
    #[inline]
    pub fn side(&self, v: &[f32]) -> bool {
        self.margin(v) > 0.0
    }
}

/// Two-means heuristic: estimate two cluster means from a candidate set.
///
/// Seeds `p` and `q` from two distinct uniformly random candidates, then
/// for `iterations` steps draws a random candidate and folds it into the
/// strictly closer running mean, weighting each distance by the number of
/// candidates already assigned to that mean. Exact ties update neither
/// mean. Deterministic given the RNG state.
pub fn two_means<R: Rng>(
    candidates: &[&[f32]],
    iterations: usize,
    rng: &mut R,
) -> (Vec<f32>, Vec<f32>) {
    let count = candidates.len();
    debug_assert!(count >= 2, "two_means needs at least two candidates");
    let f = candidates[0].len();

    let i = rng.gen_range(0..count);
    let mut j = rng.gen_range(0..count - 1);
    if j >= i {
        // ensure i != j
        j += 1;
    }

    let mut p = candidates[i].to_vec();
    let mut q = candidates[j].to_vec();

    let mut ic = 1usize;
    let mut jc = 1usize;
    for _ in 0..iterations {
        let k = rng.gen_range(0..count);
        let di = ic as f32 * squared_l2(&p, candidates[k]);
        let dj = jc as f32 * squared_l2(&q, candidates[k]);
        if di < dj {
            for z in 0..f {
                p[z] = (p[z] * ic as f32 + candidates[k][z]) / (ic as f32 + 1.0);
            }
            ic += 1;
        } else if dj < di {
            for z in 0..f {
                q[z] = (q[z] * jc as f32 + candidates[k][z]) / (jc as f32 + 1.0);
            }
            jc += 1;
        }
    }

    (p, q)
}
