//! Reciprocal Rank Fusion (RRF) for combining rankings.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tabrag_core::Candidate;

/// A row id at a 1-based rank within one ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ranked {
    pub id: i64,
    pub rank: u32,
}

impl Ranked {
    pub fn new(id: i64, rank: u32) -> Self {
        Self { id, rank }
    }
}

/// Contribution of one ranking position: `1 / (k + rank)`.
pub fn rrf_contribution(k: u32, rank: u32) -> f64 {
    1.0 / (f64::from(k) + f64::from(rank))
}

/// Fuse a semantic and a keyword ranking using Reciprocal Rank Fusion.
///
/// RRF score = 1/(k + rank_semantic) + 1/(k + rank_keyword)
///
/// A row missing from one ranking contributes 0 from that side. Candidates
/// are sorted by score descending, ties by id ascending, and truncated to
/// `limit`.
pub fn reciprocal_rank_fusion(
    semantic: &[Ranked],
    keyword: &[Ranked],
    k: u32,
    limit: usize,
) -> Vec<Candidate> {
    let mut ranks: BTreeMap<i64, (Option<u32>, Option<u32>)> = BTreeMap::new();

    for r in semantic {
        ranks.entry(r.id).or_default().0 = Some(r.rank);
    }
    for r in keyword {
        ranks.entry(r.id).or_default().1 = Some(r.rank);
    }

    let mut fused: Vec<Candidate> = ranks
        .into_iter()
        .map(|(id, (semantic_rank, keyword_rank))| {
            // Same summation order as the SQL statement: semantic, then keyword.
            let score = semantic_rank.map_or(0.0, |r| rrf_contribution(k, r))
                + keyword_rank.map_or(0.0, |r| rrf_contribution(k, r));
            Candidate {
                id,
                score,
                semantic_rank,
                keyword_rank,
            }
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    fused.truncate(limit);

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: u32 = 60;

    #[test]
    fn test_rrf_single_ranking() {
        let fused = reciprocal_rank_fusion(&[Ranked::new(7, 1)], &[], K, 20);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].score, 1.0 / 61.0);
        assert_eq!(fused[0].semantic_rank, Some(1));
        assert_eq!(fused[0].keyword_rank, None);
    }

    #[test]
    fn test_rrf_first_in_both() {
        let fused = reciprocal_rank_fusion(&[Ranked::new(7, 1)], &[Ranked::new(7, 1)], K, 20);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].score - 2.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_partial_presence_still_qualifies() {
        // A: semantic rank 1, keyword rank 3. B: keyword rank 1 only.
        let a = 1;
        let b = 2;
        let semantic = [Ranked::new(a, 1)];
        let keyword = [Ranked::new(b, 1), Ranked::new(99, 2), Ranked::new(a, 3)];

        let fused = reciprocal_rank_fusion(&semantic, &keyword, K, 20);

        assert_eq!(fused[0].id, a);
        assert!((fused[0].score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-12);
        assert_eq!(fused[1].id, b);
        assert_eq!(fused[1].score, 1.0 / 61.0);
    }

    #[test]
    fn test_rrf_ties_break_by_id() {
        let semantic = [Ranked::new(9, 1)];
        let keyword = [Ranked::new(4, 1)];

        let fused = reciprocal_rank_fusion(&semantic, &keyword, K, 20);
        let ids: Vec<i64> = fused.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![4, 9]);
    }

    #[test]
    fn test_rrf_symmetric_in_sides() {
        let x = [Ranked::new(1, 1), Ranked::new(2, 2)];
        let y = [Ranked::new(2, 1), Ranked::new(3, 2)];

        let xy = reciprocal_rank_fusion(&x, &y, K, 20);
        let yx = reciprocal_rank_fusion(&y, &x, K, 20);

        let ids = |c: &[Candidate]| c.iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids(&xy), ids(&yx));
    }

    #[test]
    fn test_rrf_truncation() {
        let semantic: Vec<Ranked> = (1..=30).map(|i| Ranked::new(i, i as u32)).collect();

        let fused = reciprocal_rank_fusion(&semantic, &[], K, 20);

        assert_eq!(fused.len(), 20);
        assert_eq!(fused[19].id, 20);
    }

    #[test]
    fn test_rrf_empty() {
        assert!(reciprocal_rank_fusion(&[], &[], K, 20).is_empty());
    }
}
