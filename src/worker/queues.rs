use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::MAX_QUEUE_WEIGHT;

/// Weighted set of queues polled by the worker slots.
///
/// Every fetch asks for a fresh order. A queue with weight `w` is placed in the
/// draw `w` times, so heavier queues tend to come first while lighter ones are
/// still polled.
#[derive(Debug, Clone)]
pub struct WeightedQueues {
    expanded: Vec<String>,
    unique: usize,
}

impl WeightedQueues {
    pub fn new(weights: &BTreeMap<String, u32>) -> Self {
        let expanded = weights
            .iter()
            .flat_map(|(name, weight)| {
                std::iter::repeat(name.clone()).take((*weight).min(MAX_QUEUE_WEIGHT) as usize)
            })
            .collect();
        Self {
            expanded,
            unique: weights.values().filter(|w| **w > 0).count(),
        }
    }

    /// Queue names in the order to try on the next fetch. Each queue appears once.
    pub fn poll_order<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<String> {
        let mut draw: Vec<&String> = self.expanded.iter().collect();
        draw.shuffle(rng);

        let mut order: Vec<String> = Vec::with_capacity(self.unique);
        for name in draw {
            if !order.contains(name) {
                order.push(name.clone());
                if order.len() == self.unique {
                    break;
                }
            }
        }
        order
    }

    pub fn len(&self) -> usize {
        self.unique
    }

    pub fn is_empty(&self) -> bool {
        self.unique == 0
    }
}
