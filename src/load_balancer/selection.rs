//! Endpoint selection strategies.

use rand::Rng;

/// A healthy endpoint eligible for selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Index of the endpoint in its router.
    pub slot: usize,
    pub precedence: u32,
    pub weight: f64,
}

/// Picks one candidate from a precedence-ordered healthy list.
pub trait SelectionStrategy: Send + Sync + std::fmt::Debug {
    /// `weight_sum` is the total weight of `healthy`.
    fn select(&self, healthy: &[Candidate], weight_sum: f64) -> Option<usize>;
}

/// Always the most preferred healthy endpoint.
#[derive(Debug, Default)]
pub struct PrecedenceFirst;

impl SelectionStrategy for PrecedenceFirst {
    fn select(&self, healthy: &[Candidate], _weight_sum: f64) -> Option<usize> {
        healthy.first().map(|c| c.slot)
    }
}

/// Random pick proportional to configured weights.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl SelectionStrategy for WeightedRandom {
    fn select(&self, healthy: &[Candidate], weight_sum: f64) -> Option<usize> {
        if healthy.is_empty() {
            return None;
        }
        if weight_sum <= 0.0 {
            return healthy.first().map(|c| c.slot);
        }
        let draw = rand::thread_rng().gen_range(0.0..weight_sum);
        pick_by_draw(healthy, draw)
    }
}

/// First candidate whose cumulative weight reaches `draw`.
pub fn pick_by_draw(healthy: &[Candidate], draw: f64) -> Option<usize> {
    let mut accumulated = 0.0;
    for candidate in healthy {
        accumulated += candidate.weight;
        if accumulated >= draw {
            return Some(candidate.slot);
        }
    }
    // Rounding can leave the draw just past the last cumulative weight.
    healthy.last().map(|c| c.slot)
}

/// Stable sort by precedence; equal ranks keep configuration order.
pub fn sort_by_precedence(candidates: &mut [Candidate]) {
    candidates.sort_by_key(|c| c.precedence);
}

pub fn total_weight(candidates: &[Candidate]) -> f64 {
    candidates.iter().map(|c| c.weight).sum()
}
