//! Pre-authored fallback texts shown while no live message is active.

use rand::Rng;

const PHILOSOPHIES: [[&str; 6]; 6] = [
    [
        "Life is   ",
        "mostly fog",
        "and echoes",
        "of old tea",
        "cooling so",
        "again hmm.",
    ],
    [
        "Truth: meh",
        "we nod now",
        "meaning is",
        "soft so so",
        "for a bit.",
        "then naps.",
    ],
    [
        "Time hums.",
        "like a fan",
        "in a small",
        "we call it",
        "and stays.",
        "same as me",
    ],
    [
        "Hope shows",
        "then hides",
        "we shrug a",
        "little bit",
        "and sip we",
        "again sure",
    ],
    [
        "Meaning is",
        "just a map",
        "of places ",
        "we drew on",
        "in the fog",
        "last night",
    ],
    [
        "Mind drift",
        "over pools",
        "of bright ",
        "dot we map",
        "then we nap",
        "by morning",
    ],
];

/// Rotating set of canned texts.
#[derive(Debug, Clone)]
pub struct CannedCatalog {
    entries: Vec<String>,
    current: usize,
}

impl CannedCatalog {
    /// The six built-in philosophies, each joined into one line.
    pub fn builtin() -> Self {
        let entries = PHILOSOPHIES.iter().map(|lines| lines.join(" ")).collect();
        Self {
            entries,
            current: 0,
        }
    }

    /// A catalog over `entries`; `None` when empty.
    pub fn from_entries(entries: Vec<String>) -> Option<Self> {
        if entries.is_empty() {
            return None;
        }
        Some(Self {
            entries,
            current: 0,
        })
    }

    /// Starts at a random entry.
    pub fn with_random_start<R: Rng>(mut self, rng: &mut R) -> Self {
        self.current = rng.gen_range(0..self.entries.len());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &str {
        self.entries
            .get(self.current)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Moves to a random entry other than the current one. A single-entry
    /// catalog stays where it is.
    pub fn pick_next<R: Rng>(&mut self, rng: &mut R) -> &str {
        if self.entries.len() > 1 {
            let previous = self.current;
            while self.current == previous {
                self.current = rng.gen_range(0..self.entries.len());
            }
        }
        self.current()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn builtin_entries_are_joined_lines() {
        let catalog = CannedCatalog::builtin();
        assert_eq!(catalog.len(), 6);
        assert_eq!(
            catalog.entries[2],
            "Time hums. like a fan in a small we call it and stays. same as me"
        );
    }

    #[test]
    fn pick_next_never_repeats() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut catalog = CannedCatalog::builtin().with_random_start(&mut rng);
        for _ in 0..100 {
            let before = catalog.current_index();
            catalog.pick_next(&mut rng);
            assert_ne!(catalog.current_index(), before);
        }
    }

    #[test]
    fn single_entry_catalog_does_not_spin() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut catalog = CannedCatalog::from_entries(vec!["only one.".to_owned()]).unwrap();
        assert_eq!(catalog.pick_next(&mut rng), "only one.");
        assert_eq!(catalog.current_index(), 0);
    }

    #[test]
    fn empty_catalog_is_rejected() {
        assert!(CannedCatalog::from_entries(Vec::new()).is_none());
    }
}
