use crate::core::{Result, StoreError};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock, Mutex};

const REGEX_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(200).unwrap();

static REGEX_LRU_CACHE: LazyLock<Mutex<LruCache<(String, bool), Arc<Regex>>>> =
    LazyLock::new(|| Mutex::new(LruCache::new(REGEX_CACHE_CAPACITY)));

/// Translate a LIKE pattern (`%` any run, `_` one char, `\` escapes) into an anchored regex
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(&regex::escape("\\")),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Patterns without wildcards or escapes never need a regex
fn fast_path_like(text: &str, pattern: &str, case_insensitive: bool) -> Option<bool> {
    // Unicode case folding is left to the regex
    if case_insensitive && !(pattern.is_ascii() && text.is_ascii()) {
        return None;
    }
    if pattern.contains(['%', '_', '\\']) {
        // "prefix%" is still cheap
        let prefix = pattern.strip_suffix('%')?;
        if prefix.contains(['%', '_', '\\']) {
            return None;
        }
        return Some(if case_insensitive {
            text.len() >= prefix.len()
                && text.is_char_boundary(prefix.len())
                && text[..prefix.len()].eq_ignore_ascii_case(prefix)
        } else {
            text.starts_with(prefix)
        });
    }

    Some(if case_insensitive {
        text.eq_ignore_ascii_case(pattern)
    } else {
        text == pattern
    })
}

fn compiled(pattern: &str, case_insensitive: bool) -> Result<Arc<Regex>> {
    let key = (pattern.to_string(), case_insensitive);
    let mut cache = REGEX_LRU_CACHE.lock()?;
    if let Some(regex) = cache.get(&key) {
        return Ok(regex.clone());
    }

    let regex = RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(case_insensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| StoreError::InvalidPredicate(format!("Bad LIKE pattern '{}': {}", pattern, e)))?;
    let regex = Arc::new(regex);
    cache.put(key, regex.clone());
    Ok(regex)
}

pub fn like_match(text: &str, pattern: &str, case_insensitive: bool) -> Result<bool> {
    if let Some(matched) = fast_path_like(text, pattern, case_insensitive) {
        return Ok(matched);
    }
    Ok(compiled(pattern, case_insensitive)?.is_match(text))
}
