//! A bounded cache of pass outcomes.
//!
//! A pass's behavior depends only on its pre-image bytes and its fixed
//! argument, so running the same pass twice over identical input is wasted
//! work. Before driving a pass over a test case the engine fingerprints the
//! file's bytes and asks the cache; on a hit, the stored post-image is
//! copied over the test case and the pass is skipped entirely.

use blake2::{Blake2b, Digest};
use lru_cache::LruCache;
use std::collections::HashMap;
use std::fmt;

/// How many post-images to retain per pass identity.
const MAX_ITEMS_PER_PASS: usize = 5;

/// A content fingerprint: the BLAKE2b digest of a pre-image.
pub type Fingerprint = Vec<u8>;

/// Compute the fingerprint of the given bytes.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Blake2b::default();
    hasher.input(bytes);
    hasher.result().as_slice().to_vec()
}

/// Maps `(pass identity, pre-image fingerprint)` to the bytes the pass left
/// behind last time, bounded to a handful of entries per pass.
pub struct Cache {
    per_pass: HashMap<String, LruCache<Fingerprint, Vec<u8>>>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Cache")
            .field("passes", &self.per_pass.len())
            .finish()
    }
}

impl Cache {
    /// Construct an empty cache.
    pub fn new() -> Cache {
        Cache {
            per_pass: HashMap::new(),
        }
    }

    /// Look up the post-image a pass produced for the given pre-image, if we
    /// still have it.
    pub fn lookup(&mut self, pass_key: &str, pre_image: &Fingerprint) -> Option<Vec<u8>> {
        self.per_pass
            .get_mut(pass_key)
            .and_then(|entries| entries.get_mut(pre_image).map(|post| post.clone()))
    }

    /// Record the post-image a pass left behind for the given pre-image.
    pub fn insert(&mut self, pass_key: &str, pre_image: Fingerprint, post_image: Vec<u8>) {
        self.per_pass
            .entry(pass_key.to_string())
            .or_insert_with(|| LruCache::new(MAX_ITEMS_PER_PASS))
            .insert(pre_image, post_image);
    }
}

impl Default for Cache {
    fn default() -> Cache {
        Cache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_what_was_inserted() {
        let mut cache = Cache::new();
        let pre = fingerprint(b"int main() { return 0; }");
        cache.insert("LinesPass", pre.clone(), b"int main() {}".to_vec());

        assert_eq!(
            cache.lookup("LinesPass", &pre),
            Some(b"int main() {}".to_vec())
        );
    }

    #[test]
    fn lookup_is_per_pass() {
        let mut cache = Cache::new();
        let pre = fingerprint(b"aaaa");
        cache.insert("LinesPass", pre.clone(), b"a".to_vec());

        assert!(cache.lookup("BlankPass", &pre).is_none());
    }

    #[test]
    fn eviction_is_bounded_per_pass() {
        let mut cache = Cache::new();
        let oldest = fingerprint(b"input 0");
        cache.insert("LinesPass", oldest.clone(), vec![0]);
        for i in 1..(MAX_ITEMS_PER_PASS + 1) {
            let pre = fingerprint(format!("input {}", i).as_bytes());
            cache.insert("LinesPass", pre, vec![i as u8]);
        }

        assert!(
            cache.lookup("LinesPass", &oldest).is_none(),
            "the oldest entry should have been evicted"
        );

        let newest = fingerprint(format!("input {}", MAX_ITEMS_PER_PASS).as_bytes());
        assert!(cache.lookup("LinesPass", &newest).is_some());
    }

    #[test]
    fn identical_inputs_fingerprint_identically() {
        assert_eq!(fingerprint(b"abc"), fingerprint(b"abc"));
        assert!(fingerprint(b"abc") != fingerprint(b"abd"));
    }
}
