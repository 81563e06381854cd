//! Vector math for message embeddings
//!
//! Cosine similarity/distance, L2 normalization, and centroid computation.
//! The clustering engine works on unit-length vectors so cosine distance
//! behaves as a proper merge criterion.

/// Cosine similarity between two embedding vectors
/// Returns a value between -1.0 and 1.0 (1.0 = identical, 0.0 = orthogonal)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

/// Cosine distance (1 - similarity); 0.0 = identical, 2.0 = opposite.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Scale a vector to unit L2 length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 1e-10 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Compute the centroid (average) of multiple embeddings
/// Returns a normalized centroid vector
pub fn compute_centroid(embeddings: &[&[f32]]) -> Option<Vec<f32>> {
    if embeddings.is_empty() {
        return None;
    }

    let dim = embeddings[0].len();
    if dim == 0 {
        return None;
    }

    let mut centroid = vec![0.0f32; dim];
    for emb in embeddings {
        if emb.len() != dim {
            continue; // Skip mismatched dimensions
        }
        for (i, &val) in emb.iter().enumerate() {
            centroid[i] += val;
        }
    }

    let n = embeddings.len() as f32;
    for val in &mut centroid {
        *val /= n;
    }

    Some(normalize(&centroid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 0.0001);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-1.0, -2.0, -3.0];
        let dist = cosine_distance(&a, &b);
        assert!((dist - 2.0).abs() < 0.0001);
    }

    #[test]
    fn test_normalize_unit_length() {
        let v = vec![3.0, 4.0];
        let n = normalize(&v);
        let len: f32 = n.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((len - 1.0).abs() < 0.0001);
        assert!((n[0] - 0.6).abs() < 0.0001);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let v = vec![0.0, 0.0, 0.0];
        assert_eq!(normalize(&v), v);
    }

    #[test]
    fn test_compute_centroid() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let centroid = compute_centroid(&[&a, &b]).unwrap();
        // Average is (0.5, 0.5), normalized to (1/sqrt(2), 1/sqrt(2))
        let expected = 1.0 / 2.0_f32.sqrt();
        assert!((centroid[0] - expected).abs() < 0.0001);
        assert!((centroid[1] - expected).abs() < 0.0001);
    }

    #[test]
    fn test_compute_centroid_empty() {
        assert!(compute_centroid(&[]).is_none());
    }
}
