use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::warn;

lazy_static::lazy_static! {
    static ref PATTERN_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(128).unwrap_or(NonZeroUsize::MIN)));
}

/// Compile a field pattern, reusing earlier compilations.
///
/// An uncompilable pattern is logged and reported as `None`; callers treat
/// that as "value does not match".
pub fn compiled(pattern: &str) -> Option<Arc<Regex>> {
    {
        let mut cache = PATTERN_CACHE.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(regex) = cache.get(pattern) {
            return Some(Arc::clone(regex));
        }
    }

    let regex = match Regex::new(pattern) {
        Ok(regex) => Arc::new(regex),
        Err(e) => {
            warn!(pattern, error = %e, "field pattern does not compile");
            return None;
        }
    };

    let mut cache = PATTERN_CACHE.lock().unwrap_or_else(|e| e.into_inner());
    cache.put(pattern.to_string(), Arc::clone(&regex));
    Some(regex)
}

pub fn is_match(pattern: &str, text: &str) -> bool {
    compiled(pattern).is_some_and(|regex| regex.is_match(text))
}
