//! Distance kernels used by the hyperplane math.
//!
//! Plain `O(f)` floating-point reductions with an 8-lane batched path via
//! the `wide` crate. The batched results differ from the scalar ones only
//! by floating-point reassociation.

#[cfg(feature = "simd")]
use wide::f32x8;

/// Dot product of two equal-length vectors.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(feature = "simd")]
    {
        dot_simd(a, b)
    }

    #[cfg(not(feature = "simd"))]
    {
        a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum()
    }
}

#[cfg(feature = "simd")]
#[inline]
fn dot_simd(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let chunks = len / 8;

    let mut acc = f32x8::ZERO;
    for i in 0..chunks {
        let offset = i * 8;
        let va = f32x8::new([
            a[offset],
            a[offset + 1],
            a[offset + 2],
            a[offset + 3],
            a[offset + 4],
            a[offset + 5],
            a[offset + 6],
            a[offset + 7],
        ]);
        let vb = f32x8::new([
            b[offset],
            b[offset + 1],
            b[offset + 2],
            b[offset + 3],
            b[offset + 4],
            b[offset + 5],
            b[offset + 6],
            b[offset + 7],
        ]);
        acc += va * vb;
    }

    let mut sum = acc.reduce_add();
    for i in chunks * 8..len {
        sum += a[i] * b[i];
    }
    sum
}

/// Squared Euclidean distance between two equal-length vectors.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    #[cfg(feature = "simd")]
    {
        squared_l2_simd(a, b)
    }

    #[cfg(not(feature = "simd"))]
    {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}

#[cfg(feature = "simd")]
#[inline]
fn squared_l2_simd(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len();
    let chunks = len / 8;

    let mut acc = f32x8::ZERO;
    for i in 0..chunks {
        let offset = i * 8;
        let va = f32x8::new([
            a[offset],
            a[offset + 1],
            a[offset + 2],
            a[offset + 3],
            a[offset + 4],
            a[offset + 5],
            a[offset + 6],
            a[offset + 7],
        ]);
        let vb = f32x8::new([
            b[offset],
            b[offset + 1],
            b[offset + 2],
            b[offset + 3],
            b[offset + 4],
            b[offset + 5],
            b[offset + 6],
            b[offset + 7],
        ]);
        let d = va - vb;
        acc += d * d;
    }

    let mut sum = acc.reduce_add();
    for i in chunks * 8..len {
        let d = a[i] - b[i];
        sum += d * d;
    }
    sum
}

/// L2 norm of a vector.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Normalize a vector in place. Zero vectors are left unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [4.0f32, 5.0, 6.0];
        assert!((dot(&a, &b) - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_squared_l2() {
        let a = [0.0f32, 0.0];
        let b = [3.0f32, 4.0];
        assert!((squared_l2(&a, &b) - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_norm() {
        let v = [3.0f32, 4.0];
        assert!((l2_norm(&v) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0f32, 4.0];
        normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let mut v = vec![0.0f32; 4];
        normalize(&mut v);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_kernels_with_remainder_lanes() {
        // 37 is not a multiple of 8, so both the batched body and the
        // scalar tail are exercised.
        let a: Vec<f32> = (0..37).map(|i| i as f32 * 0.5).collect();
        let b: Vec<f32> = (0..37).map(|i| (37 - i) as f32 * 0.25).collect();

        let scalar_dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
        let scalar_l2: f32 = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x - y) * (x - y))
            .sum();

        assert!((dot(&a, &b) - scalar_dot).abs() < 1e-2);
        assert!((squared_l2(&a, &b) - scalar_l2).abs() < 1e-2);
    }
}
