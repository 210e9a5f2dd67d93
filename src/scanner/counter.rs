use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Relative weight of usages and reactions in a score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub usages: f64,
    pub reactions: f64,
}

impl Weights {
    pub const USAGES_ONLY: Weights = Weights {
        usages: 1.0,
        reactions: 0.0,
    };

    pub const REACTIONS_ONLY: Weights = Weights {
        usages: 0.0,
        reactions: 1.0,
    };
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            usages: 1.0,
            reactions: 1.0,
        }
    }
}

/// Running tally of one ranked key (a user, a channel, a mention...).
///
/// `usages` is split by a sub-dimension item, e.g. the channel a user wrote in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counter {
    usages: BTreeMap<u64, u64>,
    reactions: u64,
    last_used: Option<DateTime<Utc>>,
}

impl Counter {
    pub fn update_use(&mut self, count: u64, date: DateTime<Utc>, item: u64) {
        *self.usages.entry(item).or_default() += count;
        self.touch(date);
    }

    pub fn add_reactions(&mut self, count: u64, date: DateTime<Utc>) {
        self.reactions += count;
        self.touch(date);
    }

    /// Adds the tallies of `other` to this counter.
    pub fn merge(&mut self, other: &Counter) {
        for (item, count) in &other.usages {
            *self.usages.entry(*item).or_default() += count;
        }
        self.reactions += other.reactions;
        if let Some(last) = other.last_used {
            self.touch(last);
        }
    }

    fn touch(&mut self, date: DateTime<Utc>) {
        if self.last_used.map_or(true, |last| date > last) {
            self.last_used = Some(date);
        }
    }

    pub fn all_usages(&self) -> u64 {
        self.usages.values().sum()
    }

    pub fn reactions(&self) -> u64 {
        self.reactions
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    pub fn usages(&self) -> &BTreeMap<u64, u64> {
        &self.usages
    }

    /// Sub-dimension item with the most usages; the smallest id wins ties.
    pub fn top_item(&self) -> Option<(u64, u64)> {
        self.usages
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(item, count)| (*item, *count))
    }

    pub fn score(&self, now: DateTime<Utc>) -> f64 {
        self.weighted_score(Weights::default(), now)
    }

    /// Weighted usages plus a fraction below 1e-5 that shrinks with the days
    /// since last use, so equal tallies rank the most recent first.
    pub fn weighted_score(&self, weights: Weights, now: DateTime<Utc>) -> f64 {
        let magnitude =
            weights.usages * self.all_usages() as f64 + weights.reactions * self.reactions as f64;
        let recency = match self.last_used {
            Some(last) => {
                let days = (now - last).num_days().max(0) as f64;
                1.0 / (100_000.0 * (days + 1.0))
            }
            None => 0.0,
        };
        magnitude + recency
    }
}

/// Counters keyed by a ranked dimension. The first touch of a key creates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterMap<K> {
    counters: BTreeMap<K, Counter>,
}

impl<K> Default for CounterMap<K> {
    fn default() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }
}

impl<K: Ord> CounterMap<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert(&mut self, key: K) -> &mut Counter {
        self.counters.entry(key).or_default()
    }

    pub fn get(&self, key: &K) -> Option<&Counter> {
        self.counters.get(key)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Counter)> {
        self.counters.iter()
    }

    pub fn total_usages(&self) -> u64 {
        self.counters.values().map(Counter::all_usages).sum()
    }

    pub fn total_reactions(&self) -> u64 {
        self.counters.values().map(Counter::reactions).sum()
    }

    pub fn ranked(&self, top: usize, now: DateTime<Utc>) -> Vec<(&K, &Counter)> {
        self.ranked_weighted(top, Weights::default(), now)
    }

    /// Top `top` counters by descending score. Equal scores keep key order,
    /// so the ranking never depends on the order usages were recorded in.
    pub fn ranked_weighted(
        &self,
        top: usize,
        weights: Weights,
        now: DateTime<Utc>,
    ) -> Vec<(&K, &Counter)> {
        let mut scored: Vec<(f64, &K, &Counter)> = self
            .counters
            .iter()
            .map(|(key, counter)| (counter.weighted_score(weights, now), key, counter))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(top)
            .map(|(_, key, counter)| (key, counter))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_recent_use_breaks_ties() {
        let now = Utc::now();
        let mut counters = CounterMap::new();
        counters.get_or_insert("b").update_use(5, now - Duration::days(1), 0);
        counters.get_or_insert("a").update_use(5, now, 0);

        let ranked = counters.ranked(10, now);
        assert_eq!(*ranked[0].0, "a");
        assert_eq!(*ranked[1].0, "b");
        assert!(counters.get(&"a").unwrap().score(now) > counters.get(&"b").unwrap().score(now));
    }

    #[test]
    fn test_recency_never_outweighs_one_usage() {
        let now = Utc::now();
        let mut old = Counter::default();
        old.update_use(2, now - Duration::days(4000), 0);
        let mut fresh = Counter::default();
        fresh.update_use(1, now, 0);
        assert!(old.score(now) > fresh.score(now));
    }

    #[test]
    fn test_update_use_keeps_latest_date() {
        let now = Utc::now();
        let mut counter = Counter::default();
        counter.update_use(1, now, 7);
        counter.update_use(2, now - Duration::days(3), 8);
        counter.update_use(4, now - Duration::days(1), 8);

        assert_eq!(counter.last_used(), Some(now));
        assert_eq!(counter.all_usages(), 7);
        assert_eq!(counter.top_item(), Some((8, 6)));
    }

    #[test]
    fn test_weights_and_reactions() {
        let now = Utc::now();
        let mut counter = Counter::default();
        counter.update_use(3, now, 0);
        counter.add_reactions(10, now);

        assert!(counter.score(now) > 13.0);
        assert!(counter.weighted_score(Weights::USAGES_ONLY, now) < 4.0);
    }

    #[test]
    fn test_ranked_truncates_and_orders_ties_by_key() {
        let now = Utc::now();
        let mut counters = CounterMap::new();
        for key in [3u64, 1, 2] {
            counters.get_or_insert(key).update_use(1, now, 0);
        }
        let keys: Vec<u64> = counters.ranked(2, now).into_iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 2]);
        assert_eq!(counters.total_usages(), 3);
    }

    #[test]
    fn test_merge_adds_tallies() {
        let now = Utc::now();
        let mut cat = Counter::default();
        cat.update_use(2, now - Duration::days(2), 1);
        let mut cats = Counter::default();
        cats.update_use(1, now, 1);
        cats.update_use(1, now, 2);
        cats.add_reactions(3, now);

        cat.merge(&cats);
        assert_eq!(cat.all_usages(), 4);
        assert_eq!(cat.top_item(), Some((1, 3)));
        assert_eq!(cat.reactions(), 3);
        assert_eq!(cat.last_used(), Some(now));
        assert_eq!(
            cat.weighted_score(Weights::REACTIONS_ONLY, now).floor(),
            3.0
        );
    }
}
