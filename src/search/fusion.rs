//! Fusion policies for combining a BM25 hit list with a vector hit
//! list into one ranked list. `rrf` implements plain reciprocal-rank
//! fusion — no rank bonuses beyond `1/(rank_constant + rank)`.

use std::collections::HashMap;

pub const RRF_RANK_CONSTANT: f32 = 60.0;

/// `(id, score)` pairs in descending rank order.
pub type HitList = Vec<(String, f32)>;

#[derive(Debug, Clone)]
pub struct FusedHit {
    pub id: String,
    pub fused_score: f32,
    pub raw_bm25_score: Option<f32>,
    pub raw_vector_score: Option<f32>,
}

/// Normalize scores within one branch's returned hits to `[0,1]` by
/// dividing by the branch's own maximum score. Unlike min-max
/// normalization this preserves a hit's fraction of the top score
/// rather than stretching the weakest hit in a branch down to 0. A
/// branch with a single hit, or a max of `0.0`, normalizes every hit
/// to `1.0`.
fn max_normalize(hits: &HitList) -> HashMap<String, f32> {
    if hits.is_empty() {
        return HashMap::new();
    }
    let max = hits.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    hits.iter()
        .map(|(id, s)| {
            let normalized = if max > 0.0 { s / max } else { 1.0 };
            (id.clone(), normalized)
        })
        .collect()
}

/// Weighted-sum fusion: `fused = bm25_weight*bm25_norm + vector_weight*vector_norm`.
/// Documents missing from a branch contribute 0 for that branch.
pub fn weighted_sum(
    bm25_hits: &HitList,
    vector_hits: &HitList,
    bm25_weight: f32,
    vector_weight: f32,
) -> Vec<FusedHit> {
    let bm25_norm = max_normalize(bm25_hits);
    let vector_norm = max_normalize(vector_hits);

    // Preserve first-appearance order: BM25 list first, then any
    // vector-only ids, to satisfy the tie-break invariant.
    let mut order: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (id, _) in bm25_hits.iter().chain(vector_hits.iter()) {
        if seen.insert(id.clone()) {
            order.push(id.clone());
        }
    }

    let bm25_raw: HashMap<&str, f32> = bm25_hits.iter().map(|(id, s)| (id.as_str(), *s)).collect();
    let vector_raw: HashMap<&str, f32> = vector_hits.iter().map(|(id, s)| (id.as_str(), *s)).collect();

    let mut fused: Vec<FusedHit> = order
        .into_iter()
        .map(|id| {
            let bn = bm25_norm.get(&id).copied().unwrap_or(0.0);
            let vn = vector_norm.get(&id).copied().unwrap_or(0.0);
            FusedHit {
                fused_score: bm25_weight * bn + vector_weight * vn,
                raw_bm25_score: bm25_raw.get(id.as_str()).copied(),
                raw_vector_score: vector_raw.get(id.as_str()).copied(),
                id,
            }
        })
        .collect();

    fused.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

/// Reciprocal rank fusion: `fused = sum(1 / (rank_constant + rank))`
/// over every branch a document appears in, with `rank` 0-indexed.
pub fn reciprocal_rank_fusion(bm25_hits: &HitList, vector_hits: &HitList) -> Vec<FusedHit> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    let mut bm25_raw: HashMap<String, f32> = HashMap::new();
    let mut vector_raw: HashMap<String, f32> = HashMap::new();

    for (rank, (id, score)) in bm25_hits.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_RANK_CONSTANT + rank as f32);
        bm25_raw.insert(id.clone(), *score);
        order.push(id.clone());
    }
    for (rank, (id, score)) in vector_hits.iter().enumerate() {
        *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (RRF_RANK_CONSTANT + rank as f32);
        vector_raw.insert(id.clone(), *score);
        if !order.contains(id) {
            order.push(id.clone());
        }
    }

    let mut fused: Vec<FusedHit> = order
        .into_iter()
        .map(|id| {
            let fused_score = *scores.get(&id).unwrap_or(&0.0);
            FusedHit {
                raw_bm25_score: bm25_raw.get(&id).copied(),
                raw_vector_score: vector_raw.get(&id).copied(),
                fused_score,
                id,
            }
        })
        .collect();

    fused.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    /// BM25 [(A,10),(B,5)], vector [(B,0.9),(C,0.1)], weights 0.5/0.5.
    /// Divide-by-max per branch: A=10/10=1.0, B(bm25)=5/10=0.5,
    /// B(vector)=0.9/0.9=1.0, C=0.1/0.9=0.1111 -> A=0.5, B=0.75,
    /// C=0.0556, order [B,A,C].
    #[test]
    fn weighted_sum_matches_worked_example() {
        let bm25 = vec![("A".to_string(), 10.0), ("B".to_string(), 5.0)];
        let vector = vec![("B".to_string(), 0.9), ("C".to_string(), 0.1)];
        let fused = weighted_sum(&bm25, &vector, 0.5, 0.5);
        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert!((fused[0].fused_score - 0.75).abs() < 1e-6);
        assert!((fused[1].fused_score - 0.5).abs() < 1e-6);
        assert!((fused[2].fused_score - (0.5 * 0.1 / 0.9)).abs() < 1e-6);
    }

    /// Same inputs, rank_constant 60 -> A=1/61, B=1/61+1/61, C=1/62,
    /// order [B,A,C].
    #[test]
    fn rrf_matches_worked_example() {
        let bm25 = vec![("A".to_string(), 10.0), ("B".to_string(), 5.0)];
        let vector = vec![("B".to_string(), 0.9), ("C".to_string(), 0.1)];
        let fused = reciprocal_rank_fusion(&bm25, &vector);
        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
        assert!((fused[0].fused_score - (1.0 / 61.0 + 1.0 / 61.0)).abs() < 1e-6);
        assert!((fused[1].fused_score - (1.0 / 61.0)).abs() < 1e-6);
        assert!((fused[2].fused_score - (1.0 / 62.0)).abs() < 1e-6);
    }

    #[test]
    fn empty_branches_produce_empty_fusion() {
        let empty: HitList = vec![];
        assert!(weighted_sum(&empty, &empty, 0.5, 0.5).is_empty());
        assert!(reciprocal_rank_fusion(&empty, &empty).is_empty());
    }

    #[test]
    fn single_hit_branch_normalizes_to_one() {
        let bm25 = vec![("A".to_string(), 3.0)];
        let empty: HitList = vec![];
        let fused = weighted_sum(&bm25, &empty, 1.0, 0.0);
        assert_eq!(fused[0].fused_score, 1.0);
    }
}
