//! Named event tallies (entities spawned, mutations applied, ...)

use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct EventCounter {
    counts: BTreeMap<String, u64>,
}

impl EventCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, amount: u64) {
        if let Some(count) = self.counts.get_mut(name) {
            *count += amount;
        } else {
            self.counts.insert(name.to_owned(), amount);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }

    /// Counts in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(name, &count)| (name.as_str(), count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_per_name() {
        let mut counter = EventCounter::new();
        counter.add("spawned", 3);
        counter.add("destroyed", 1);
        counter.add("spawned", 2);

        assert_eq!(counter.get("spawned"), 5);
        assert_eq!(counter.get("missing"), 0);
        let names: Vec<_> = counter.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["destroyed", "spawned"]);

        counter.reset();
        assert_eq!(counter.get("spawned"), 0);
    }
}
