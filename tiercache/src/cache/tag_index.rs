use std::collections::{BTreeSet, HashMap};

/// Secondary index from tag to the keys carrying it.
///
/// A tag is dropped as soon as its last key is removed, so every indexed tag
/// always points at at least one key.
#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    by_tag: HashMap<String, BTreeSet<String>>,
    by_key: HashMap<String, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every tag association of `key` with `tags`
    pub fn set_tags<'a, I>(&mut self, key: &str, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.remove_key(key);

        let tags: BTreeSet<String> = tags.into_iter().cloned().collect();
        if tags.is_empty() {
            return;
        }
        for tag in &tags {
            self.by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.by_key.insert(key.to_string(), tags);
    }

    /// Drop `key` from every tag it carries
    pub fn remove_key(&mut self, key: &str) {
        let Some(tags) = self.by_key.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.by_tag.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(&tag);
                }
            }
        }
    }

    /// Keys under `tag`, sorted
    pub fn keys_for(&self, tag: &str) -> Vec<String> {
        self.by_tag
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn tags_for(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.by_key.get(key)
    }

    pub fn contains_tag(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    pub fn tag_count(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    /// Remove keys for which `exists` is false. Returns the number of keys
    /// dropped from the index.
    pub fn prune<F>(&mut self, exists: F) -> usize
    where
        F: Fn(&str) -> bool,
    {
        let dead: Vec<String> = self
            .by_key
            .keys()
            .filter(|key| !exists(key))
            .cloned()
            .collect();
        for key in &dead {
            self.remove_key(key);
        }
        dead.len()
    }

    pub fn clear(&mut self) {
        self.by_tag.clear();
        self.by_key.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_and_lookup() {
        let mut index = TagIndex::new();
        index.set_tags("a", &tags(&["x", "y"]));
        index.set_tags("b", &tags(&["x"]));

        assert_eq!(index.keys_for("x"), vec!["a", "b"]);
        assert_eq!(index.keys_for("y"), vec!["a"]);
        assert!(index.keys_for("z").is_empty());
    }

    #[test]
    fn test_retagging_replaces_previous_tags() {
        let mut index = TagIndex::new();
        index.set_tags("a", &tags(&["x", "y"]));
        index.set_tags("a", &tags(&["z"]));

        assert!(!index.contains_tag("x"));
        assert!(!index.contains_tag("y"));
        assert_eq!(index.keys_for("z"), vec!["a"]);
    }

    #[test]
    fn test_empty_tags_leave_no_trace() {
        let mut index = TagIndex::new();
        index.set_tags("a", &tags(&["x"]));
        index.set_tags("a", &tags(&[]));

        assert!(index.is_empty());
        assert!(index.tags_for("a").is_none());
    }

    #[test]
    fn test_removing_last_key_drops_tag() {
        let mut index = TagIndex::new();
        index.set_tags("a", &tags(&["x"]));
        index.set_tags("b", &tags(&["x"]));

        index.remove_key("a");
        assert!(index.contains_tag("x"));

        index.remove_key("b");
        assert!(!index.contains_tag("x"));
        assert_eq!(index.tag_count(), 0);
    }

    #[test]
    fn test_prune_removes_missing_keys() {
        let mut index = TagIndex::new();
        index.set_tags("live", &tags(&["x"]));
        index.set_tags("gone", &tags(&["x", "y"]));

        let pruned = index.prune(|key| key == "live");

        assert_eq!(pruned, 1);
        assert_eq!(index.keys_for("x"), vec!["live"]);
        assert!(!index.contains_tag("y"));
    }
}
