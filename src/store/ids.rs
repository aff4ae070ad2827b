//! Instance and collection id generation.

use ulid::Ulid;

/// Attempts made to find an id that is not already taken
pub const MAX_ID_ATTEMPTS: usize = 16;

/// Source of fresh ids. Uniqueness against existing ids is checked by the
/// store; a source only has to make collisions unlikely.
pub trait IdSource: Send {
    fn next_id(&mut self) -> String;
}

/// Lowercase ULIDs: sortable by creation time, 128 bits of entropy
#[derive(Debug, Default, Clone, Copy)]
pub struct UlidSource;

impl IdSource for UlidSource {
    fn next_id(&mut self) -> String {
        Ulid::new().to_string().to_lowercase()
    }
}

/// Draw ids from `source` until one passes `is_free`.
pub fn fresh_id<F>(source: &mut dyn IdSource, is_free: F) -> Option<String>
where
    F: Fn(&str) -> bool,
{
    (0..MAX_ID_ATTEMPTS)
        .map(|_| source.next_id())
        .find(|id| is_free(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Cycle(Vec<&'static str>, usize);

    impl IdSource for Cycle {
        fn next_id(&mut self) -> String {
            let id = self.0[self.1 % self.0.len()];
            self.1 += 1;
            id.to_string()
        }
    }

    #[test]
    fn test_ulid_ids_distinct() {
        let mut source = UlidSource;
        let ids: HashSet<String> = (0..500).map(|_| source.next_id()).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_fresh_id_skips_taken() {
        let mut source = Cycle(vec!["a", "b", "c"], 0);
        let id = fresh_id(&mut source, |id| id != "a" && id != "b");
        assert_eq!(id.as_deref(), Some("c"));
    }

    #[test]
    fn test_fresh_id_gives_up() {
        let mut source = Cycle(vec!["a"], 0);
        assert_eq!(fresh_id(&mut source, |id| id != "a"), None);
        assert_eq!(source.1, MAX_ID_ATTEMPTS);
    }
}
