// src/pools/ranking.rs

use super::pool::Pool;
use crate::types::PoolId;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// The attributes a pool is ranked by, frozen at insertion time.
///
/// Orders from most to least desirable: desirability, then potential profit, then stake (all
/// descending), and finally id ascending so the older pool wins a complete tie.
#[derive(Debug, Clone, Copy)]
pub struct RankKey {
    pub desirability: f64,
    pub potential_profit: f64,
    pub stake: f64,
    pub id: PoolId,
}

impl RankKey {
    pub fn of(pool: &Pool) -> Self {
        Self {
            desirability: pool.desirability(),
            potential_profit: pool.potential_profit(),
            stake: pool.stake(),
            id: pool.id(),
        }
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .desirability
            .total_cmp(&self.desirability)
            .then_with(|| other.potential_profit.total_cmp(&self.potential_profit))
            .then_with(|| other.stake.total_cmp(&self.stake))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RankKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankKey {}

/// Ordered index over the live pools.
///
/// The index remembers the key each pool was inserted with, so `remove` never has to look at
/// the pool itself (which the caller may be about to mutate). Both operations are O(log n).
#[derive(Debug, Default, Clone)]
pub struct PoolRanking {
    order: BTreeSet<RankKey>,
    keys: HashMap<PoolId, RankKey>,
}

impl PoolRanking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `pool` under its current attributes. A pool that is already indexed is
    /// re-keyed.
    pub fn insert(&mut self, pool: &Pool) {
        let key = RankKey::of(pool);
        debug_assert!(
            !self.keys.contains_key(&pool.id()),
            "{} inserted twice without removal",
            pool.id()
        );
        if let Some(stale) = self.keys.insert(pool.id(), key) {
            self.order.remove(&stale);
        }
        self.order.insert(key);
    }

    /// Drops `id` from the index. Returns false if it was not indexed.
    pub fn remove(&mut self, id: PoolId) -> bool {
        match self.keys.remove(&id) {
            Some(key) => self.order.remove(&key),
            None => false,
        }
    }

    pub fn contains(&self, id: PoolId) -> bool {
        self.keys.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Pool ids from most to least desirable. Reverse it to scan from the bottom.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = PoolId> + '_ {
        self.order.iter().map(|key| key.id)
    }

    /// The keys themselves, in rank order.
    pub fn keys(&self) -> impl DoubleEndedIterator<Item = &RankKey> + '_ {
        self.order.iter()
    }

    /// Zero-based position `key` would take, i.e. how many indexed pools strictly beat it.
    pub fn rank_of(&self, key: &RankKey) -> usize {
        self.order.range(..*key).count()
    }

    /// True when every indexed key matches its pool's current attributes and membership
    /// agrees with `pools`.
    pub fn is_fresh<'a>(&self, pools: impl IntoIterator<Item = &'a Pool>) -> bool {
        let mut seen = 0;
        for pool in pools {
            seen += 1;
            match self.keys.get(&pool.id()) {
                Some(key) if key.cmp(&RankKey::of(pool)) == Ordering::Equal => {}
                _ => return false,
            }
        }
        seen == self.keys.len() && seen == self.order.len()
    }
}
