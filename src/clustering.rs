//! Two-pass adaptive clustering over message embeddings
//!
//! Pass 1: agglomerative grouping (average linkage, cosine distance) with no
//! fixed cluster count - merging stops at a threshold chosen from corpus size.
//! Pass 2: any pass-1 group larger than the unsplit limit is re-partitioned
//! into k = clamp(round(ln(size)+1), 2, 6) sub-groups with seeded k-means.
//!
//! A single global k-means is brittle (one wrong global k ruins unrelated
//! topics) and a single agglomerative pass at one threshold over- or
//! under-splits depending on inbox size; the coarse pass separates topics
//! without guessing a total count, and only large groups pay for sub-k
//! selection.
//!
//! Output ids are sequential integers assigned in finalization order. They
//! are NOT stable across runs - durable identity lives in
//! [`crate::identity::ClusterSignature`].

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::local_embeddings::TextEmbedder;
use crate::similarity::{compute_centroid, cosine_distance, normalize};

/// Pass-1 groups at or below this size are never subdivided
pub const DEFAULT_MAX_UNSPLIT_SIZE: usize = 8;
/// Fixed seed so refinement is reproducible across runs
pub const DEFAULT_KMEANS_SEED: u64 = 42;

/// Tunables for the two-pass pipeline. The defaults are heuristic tuning
/// values, not invariants; settings may override the pass-1 threshold.
#[derive(Debug, Clone)]
pub struct ClusterParams {
    /// Manual pass-1 distance threshold (None = adaptive from corpus size)
    pub threshold_override: Option<f32>,
    pub max_unsplit_size: usize,
    pub kmeans_seed: u64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            threshold_override: None,
            max_unsplit_size: DEFAULT_MAX_UNSPLIT_SIZE,
            kmeans_seed: DEFAULT_KMEANS_SEED,
        }
    }
}

/// Pick the pass-1 merge threshold from corpus size. Small corpora get a
/// looser threshold to avoid shattering into singletons; large ones get a
/// tighter threshold to avoid one giant group.
pub fn adaptive_threshold(text_count: usize) -> f32 {
    match text_count {
        0..=199 => 0.60,
        200..=499 => 0.40,
        500..=999 => 0.36,
        _ => 0.33,
    }
}

/// Target sub-group count for refining an oversized pass-1 group.
/// Grows with ln(size), clamped to [2, 6].
pub fn refinement_k(size: usize) -> usize {
    let k = ((size as f64).ln() + 1.0).round() as i64;
    k.clamp(2, 6) as usize
}

/// Grouping with no fixed group count: merging stops once the nearest pair
/// of groups is at least `threshold` apart.
pub trait ThresholdGrouper {
    fn group(&self, vectors: &[Vec<f32>], threshold: f32) -> Vec<Vec<usize>>;
}

/// Partitioning into a fixed number of groups.
pub trait FixedKPartitioner {
    fn partition(&self, vectors: &[Vec<f32>], k: usize) -> Vec<Vec<usize>>;
}

// ==================== Pass 1: average-linkage agglomerative ====================

/// Bottom-up merging by average pairwise cosine distance (UPGMA).
// TODO: scanning all cluster pairs each iteration is O(n^3); a merge
// candidate heap would bring this to O(n^2 log n) for large scans.
pub struct AverageLinkage;

impl ThresholdGrouper for AverageLinkage {
    fn group(&self, vectors: &[Vec<f32>], threshold: f32) -> Vec<Vec<usize>> {
        let n = vectors.len();
        if n == 0 {
            return vec![];
        }

        // Each point starts in its own cluster
        let mut labels: Vec<i32> = (0..n as i32).collect();

        // Precompute pairwise distances
        let mut distances = vec![vec![0.0f32; n]; n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = cosine_distance(&vectors[i], &vectors[j]);
                distances[i][j] = d;
                distances[j][i] = d;
            }
        }

        loop {
            let mut best_merge: Option<(i32, i32, f32)> = None;

            for i in 0..n {
                for j in (i + 1)..n {
                    if labels[i] == labels[j] {
                        continue;
                    }
                    let members_i: Vec<usize> = (0..n).filter(|&x| labels[x] == labels[i]).collect();
                    let members_j: Vec<usize> = (0..n).filter(|&x| labels[x] == labels[j]).collect();

                    let mut total = 0.0;
                    for &a in &members_i {
                        for &b in &members_j {
                            total += distances[a][b];
                        }
                    }
                    let avg = total / (members_i.len() * members_j.len()) as f32;

                    if avg < threshold {
                        match &best_merge {
                            None => best_merge = Some((labels[i], labels[j], avg)),
                            Some((_, _, best)) if avg < *best => {
                                best_merge = Some((labels[i], labels[j], avg));
                            }
                            _ => {}
                        }
                    }
                }
            }

            match best_merge {
                Some((keep, absorb, _)) => {
                    for label in labels.iter_mut() {
                        if *label == absorb {
                            *label = keep;
                        }
                    }
                }
                None => break,
            }
        }

        group_by_label(&labels)
    }
}

// ==================== Pass 2: seeded k-means ====================

/// Centroid partitioning with a fixed RNG seed so identical input always
/// yields identical sub-groups.
pub struct SeededKMeans {
    pub seed: u64,
    pub max_iterations: usize,
}

impl SeededKMeans {
    pub fn new(seed: u64) -> Self {
        Self { seed, max_iterations: 100 }
    }
}

impl FixedKPartitioner for SeededKMeans {
    fn partition(&self, vectors: &[Vec<f32>], k: usize) -> Vec<Vec<usize>> {
        let n = vectors.len();
        if n == 0 || k == 0 {
            return vec![];
        }
        if k >= n {
            return (0..n).map(|i| vec![i]).collect();
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids: Vec<Vec<f32>> = rand::seq::index::sample(&mut rng, n, k)
            .into_iter()
            .map(|i| vectors[i].clone())
            .collect();

        let mut assignments = vec![0usize; n];

        for _ in 0..self.max_iterations {
            // Assign each point to its nearest centroid
            let mut changed = false;
            for (i, v) in vectors.iter().enumerate() {
                let mut best = 0;
                let mut best_dist = f32::MAX;
                for (c, centroid) in centroids.iter().enumerate() {
                    let d = cosine_distance(v, centroid);
                    if d < best_dist {
                        best_dist = d;
                        best = c;
                    }
                }
                if assignments[i] != best {
                    assignments[i] = best;
                    changed = true;
                }
            }

            if !changed {
                break;
            }

            // Recompute centroids; an emptied centroid steals the point
            // farthest from its own centroid so k groups survive
            for c in 0..k {
                let members: Vec<&[f32]> = assignments
                    .iter()
                    .enumerate()
                    .filter(|(_, &a)| a == c)
                    .map(|(i, _)| vectors[i].as_slice())
                    .collect();

                if let Some(centroid) = compute_centroid(&members) {
                    centroids[c] = centroid;
                } else if let Some(stray) = farthest_from_centroid(vectors, &assignments, &centroids) {
                    assignments[stray] = c;
                    centroids[c] = vectors[stray].clone();
                }
            }
        }

        let mut groups: Vec<Vec<usize>> = vec![vec![]; k];
        for (i, &a) in assignments.iter().enumerate() {
            groups[a].push(i);
        }
        groups.retain(|g| !g.is_empty());
        groups
    }
}

/// Index of the point with the greatest distance to its assigned centroid
fn farthest_from_centroid(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    centroids: &[Vec<f32>],
) -> Option<usize> {
    vectors
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_distance(v, &centroids[assignments[i]])))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
}

/// Group indices by label, ordered by first appearance, members ascending
fn group_by_label(labels: &[i32]) -> Vec<Vec<usize>> {
    let mut order: HashMap<i32, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        let slot = *order.entry(label).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}

// ==================== The two-pass pipeline ====================

/// Cluster pre-computed vectors: coarse pass, then size-adaptive refinement.
/// Returns cluster_id -> ordered original indices, ids sequential from 0.
pub fn cluster_vectors(
    vectors: &[Vec<f32>],
    params: &ClusterParams,
    grouper: &dyn ThresholdGrouper,
    partitioner: &dyn FixedKPartitioner,
) -> HashMap<i32, Vec<usize>> {
    let mut clusters: HashMap<i32, Vec<usize>> = HashMap::new();
    if vectors.is_empty() {
        return clusters;
    }

    let threshold = params
        .threshold_override
        .unwrap_or_else(|| adaptive_threshold(vectors.len()));

    let coarse = grouper.group(vectors, threshold);
    println!(
        "[Clustering] Pass 1: {} texts -> {} groups (threshold {})",
        vectors.len(),
        coarse.len(),
        threshold
    );

    for group in coarse {
        if group.len() <= params.max_unsplit_size {
            // Small groups are assumed coherent; refining would just fragment
            let id = clusters.len() as i32;
            clusters.insert(id, group);
            continue;
        }

        let k = refinement_k(group.len());
        let member_vectors: Vec<Vec<f32>> = group.iter().map(|&i| vectors[i].clone()).collect();
        let sub_groups = partitioner.partition(&member_vectors, k);
        println!(
            "[Clustering] Pass 2: group of {} refined into {} sub-groups (k={})",
            group.len(),
            sub_groups.len(),
            k
        );

        for sub in sub_groups {
            let members: Vec<usize> = sub.into_iter().map(|local| group[local]).collect();
            let id = clusters.len() as i32;
            clusters.insert(id, members);
        }
    }

    clusters
}

/// Embed texts and run the two-pass pipeline with the shipped strategies.
/// Empty input yields an empty partition without touching the model.
pub fn cluster_texts(
    embedder: &dyn TextEmbedder,
    texts: &[String],
    params: &ClusterParams,
) -> Result<HashMap<i32, Vec<usize>>, String> {
    if texts.is_empty() {
        return Ok(HashMap::new());
    }

    let raw = embedder.embed(texts)?;
    // The local model emits unit vectors already; other embedders may not
    let vectors: Vec<Vec<f32>> = raw.iter().map(|v| normalize(v)).collect();

    Ok(cluster_vectors(
        &vectors,
        params,
        &AverageLinkage,
        &SeededKMeans::new(params.kmeans_seed),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEmbedder(Vec<Vec<f32>>);

    impl TextEmbedder for StubEmbedder {
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
            assert_eq!(texts.len(), self.0.len());
            Ok(self.0.clone())
        }
    }

    fn assert_partition(clusters: &HashMap<i32, Vec<usize>>, n: usize) {
        let mut seen = vec![false; n];
        for members in clusters.values() {
            for &i in members {
                assert!(!seen[i], "index {} appears in more than one cluster", i);
                seen[i] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "not every index was assigned");
    }

    #[test]
    fn test_adaptive_threshold_breakpoints() {
        assert_eq!(adaptive_threshold(50), 0.60);
        assert_eq!(adaptive_threshold(300), 0.40);
        assert_eq!(adaptive_threshold(700), 0.36);
        assert_eq!(adaptive_threshold(5000), 0.33);
        // Boundary values
        assert_eq!(adaptive_threshold(199), 0.60);
        assert_eq!(adaptive_threshold(200), 0.40);
        assert_eq!(adaptive_threshold(500), 0.36);
        assert_eq!(adaptive_threshold(1000), 0.33);
    }

    #[test]
    fn test_refinement_k_growth() {
        assert_eq!(refinement_k(20), 4); // round(ln(20)+1) = 4
        assert_eq!(refinement_k(9), 3); // round(ln(9)+1) = 3
        assert_eq!(refinement_k(1000), 6); // clamped at 6
        assert_eq!(refinement_k(2), 2); // clamped at 2
    }

    #[test]
    fn test_empty_input_empty_output() {
        let embedder = StubEmbedder(vec![]);
        let clusters = cluster_texts(&embedder, &[], &ClusterParams::default()).unwrap();
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_single_text_single_cluster() {
        let embedder = StubEmbedder(vec![vec![1.0, 0.0]]);
        let clusters =
            cluster_texts(&embedder, &["only".to_string()], &ClusterParams::default()).unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[&0], vec![0]);
    }

    #[test]
    fn test_invoice_lunch_scenario() {
        // Two near-identical "invoice" vectors and one orthogonal "lunch"
        // vector: loose threshold groups the invoices, lunch stays alone
        let embedder = StubEmbedder(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.99, 0.14, 0.0],
            vec![0.0, 1.0, 0.0],
        ]);
        let texts = vec![
            "Subject: Invoice #1\nPayment due".to_string(),
            "Subject: Invoice #2\nPayment due".to_string(),
            "Subject: Team lunch\nFriday noon".to_string(),
        ];
        let clusters = cluster_texts(&embedder, &texts, &ClusterParams::default()).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_partition(&clusters, 3);
        let invoice_group = clusters.values().find(|m| m.len() == 2).unwrap();
        assert_eq!(*invoice_group, vec![0, 1]);
        let lunch_group = clusters.values().find(|m| m.len() == 1).unwrap();
        assert_eq!(*lunch_group, vec![2]);
    }

    #[test]
    fn test_small_group_never_subdivided() {
        // 8 identical vectors form one pass-1 group of exactly the unsplit
        // limit; pass 2 must leave it whole
        let vectors: Vec<Vec<f32>> = (0..8).map(|_| vec![1.0, 0.0]).collect();
        let clusters = cluster_vectors(
            &vectors,
            &ClusterParams::default(),
            &AverageLinkage,
            &SeededKMeans::new(DEFAULT_KMEANS_SEED),
        );
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[&0].len(), 8);
    }

    #[test]
    fn test_oversized_group_refined() {
        // 20 unit vectors spread over four directions within 60 degrees of
        // each other: pass 1 merges everything (all pairwise distances are
        // below the loose 0.6 threshold), pass 2 splits into k=4
        let mut vectors = Vec::new();
        for bunch in 0..4 {
            let angle = (bunch as f32) * 0.35; // radians; max spread ~1.05 rad
            for jitter in 0..5 {
                let a = angle + jitter as f32 * 0.01;
                vectors.push(vec![a.cos(), a.sin()]);
            }
        }
        let clusters = cluster_vectors(
            &vectors,
            &ClusterParams::default(),
            &AverageLinkage,
            &SeededKMeans::new(DEFAULT_KMEANS_SEED),
        );
        assert_partition(&clusters, 20);
        assert_eq!(clusters.len(), 4);
        assert!(clusters.values().all(|m| !m.is_empty()));
    }

    #[test]
    fn test_refinement_deterministic() {
        let mut vectors = Vec::new();
        for i in 0..12 {
            let a = i as f32 * 0.09;
            vectors.push(vec![a.cos(), a.sin()]);
        }
        let params = ClusterParams::default();
        let run = |_: ()| {
            cluster_vectors(
                &vectors,
                &params,
                &AverageLinkage,
                &SeededKMeans::new(params.kmeans_seed),
            )
        };
        assert_eq!(run(()), run(()));
    }

    #[test]
    fn test_ids_sequential_from_zero() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
        ];
        let clusters = cluster_vectors(
            &vectors,
            &ClusterParams::default(),
            &AverageLinkage,
            &SeededKMeans::new(DEFAULT_KMEANS_SEED),
        );
        let mut ids: Vec<i32> = clusters.keys().copied().collect();
        ids.sort();
        assert_eq!(ids, (0..clusters.len() as i32).collect::<Vec<_>>());
    }

    #[test]
    fn test_kmeans_exact_k_for_separated_data() {
        let mut vectors = Vec::new();
        for i in 0..10 {
            vectors.push(vec![1.0, i as f32 * 0.001]);
        }
        for i in 0..10 {
            vectors.push(vec![i as f32 * 0.001, 1.0]);
        }
        let groups = SeededKMeans::new(7).partition(&vectors, 2);
        assert_eq!(groups.len(), 2);
        let sizes: Vec<usize> = groups.iter().map(|g| g.len()).collect();
        assert!(sizes.contains(&10));
    }

    #[test]
    fn test_kmeans_k_larger_than_input() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let groups = SeededKMeans::new(1).partition(&vectors, 5);
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn test_average_linkage_tight_threshold_all_singletons() {
        let vectors = vec![
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![-1.0, 0.0],
        ];
        let groups = AverageLinkage.group(&vectors, 0.05);
        assert_eq!(groups.len(), 3);
    }
}
