//! SQL `LIKE` matching with MySQL semantics: `%` any run, `_` one
//! character, backslash escapes the next character.

use crate::core::{Result, ViewError};
use lru::LruCache;
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const REGEX_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(200) {
    Some(size) => size,
    None => panic!("cache size must be non-zero"),
};

lazy_static::lazy_static! {
    static ref REGEX_LRU_CACHE: Arc<Mutex<LruCache<String, Arc<Regex>>>> =
        Arc::new(Mutex::new(LruCache::new(REGEX_CACHE_SIZE)));
}

#[inline]
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
                // trailing backslash matches itself
                None => regex.push_str("\\\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Patterns without wildcards or escapes, plus `prefix%`.
#[inline]
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if pattern.contains('\\') || pattern.contains('_') {
        return None;
    }

    if !pattern.contains('%') {
        return Some(if case_sensitive {
            text == pattern
        } else {
            text.eq_ignore_ascii_case(pattern)
        });
    }

    let prefix = pattern.strip_suffix('%')?;
    if prefix.contains('%') {
        return None;
    }
    Some(if case_sensitive {
        text.starts_with(prefix)
    } else {
        text.to_lowercase().starts_with(&prefix.to_lowercase())
    })
}

fn get_or_compile_regex(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = if case_sensitive {
        format!("s:{}", pattern)
    } else {
        format!("i:{}", pattern)
    };

    if let Some(regex) = REGEX_LRU_CACHE.lock()?.get(&cache_key) {
        return Ok(Arc::clone(regex));
    }

    let compiled = regex::RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(!case_sensitive)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| ViewError::Parse(format!("Invalid LIKE pattern: {}", e)))?;
    let compiled = Arc::new(compiled);

    REGEX_LRU_CACHE.lock()?.put(cache_key, Arc::clone(&compiled));
    Ok(compiled)
}

pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }

    let regex = get_or_compile_regex(pattern, case_sensitive)?;
    Ok(regex.is_match(text))
}
