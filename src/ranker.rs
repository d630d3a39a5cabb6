//! Candidate ranking
//!
//! Orders scored candidates by composite score, highest first. The sort is
//! stable: equal scores keep their input order, so the top candidate is
//! reproducible across identical batches.

use crate::scoring::ScoredCandidate;

/// Ranked view of one cycle's candidates
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    candidates: Vec<ScoredCandidate>,
}

/// Rank candidates by score descending
pub fn rank(mut candidates: Vec<ScoredCandidate>) -> Ranking {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ranking { candidates }
}

impl Ranking {
    /// Entry target, if any
    pub fn top(&self) -> Option<&ScoredCandidate> {
        self.candidates.first()
    }

    /// First `n` candidates (fewer if the batch is smaller)
    pub fn top_n(&self, n: usize) -> &[ScoredCandidate] {
        &self.candidates[..n.min(self.candidates.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// One formatted line per top candidate: raw value with the normalized value in parentheses
    pub fn report(&self, n: usize) -> Vec<String> {
        self.top_n(n)
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let s = &c.snapshot;
                let n = &c.components;
                format!(
                    "{:2}. {:<10} | Score: {:.4} [m5:{:.2}({:.2}) h1:{:.2}({:.2}) vol:{:.0}({:.2}) b/s:{:.2}({:.2}) liq:{:.0}({:.2})] | Pair: {}",
                    i + 1,
                    s.base.symbol,
                    c.score,
                    s.price_change.m5,
                    n.m5_change,
                    s.price_change.h1,
                    n.h1_change,
                    s.volume.m5,
                    n.m5_volume,
                    c.buy_sell_ratio,
                    n.m5_buy_sell_ratio,
                    s.liquidity_usd,
                    n.liquidity,
                    s.pair_address,
                )
            })
            .collect()
    }
}

impl IntoIterator for Ranking {
    type Item = ScoredCandidate;
    type IntoIter = std::vec::IntoIter<ScoredCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}
