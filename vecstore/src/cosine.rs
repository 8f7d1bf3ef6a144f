/// Compute the inner product of two equal-length vectors.
///
/// Uses f64 intermediate precision. For unit vectors the result is the
/// cosine similarity in `[-1, 1]`.
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    let mut dot: f64 = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
    }
    dot as f32
}

/// Return the L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt()
}

/// Return a unit-length copy of `v`, or `None` when the norm is zero or not
/// finite (the vector cannot be scaled to unit length).
pub fn normalized(v: &[f32]) -> Option<Vec<f32>> {
    let norm = l2_norm(v);
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    let s = 1.0 / norm;
    Some(v.iter().map(|&x| ((x as f64) * s) as f32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_unit_length() {
        let v = normalized(&[3.0, 4.0]).unwrap();
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_zero() {
        assert!(normalized(&[0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_normalized_nan() {
        assert!(normalized(&[f32::NAN, 1.0]).is_none());
    }

    #[test]
    fn test_inner_product_orthogonal() {
        assert_eq!(inner_product(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }
}
