use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;

/// Prefix the host puts in front of chunk names that were loaded from a file.
const CHUNK_MARKER: char = '@';

/// Turns host source identifiers into stable breakpoint keys.
///
/// A file that can be opened is keyed by its canonical path, so `main.lua`,
/// `./main.lua` and `/work/main.lua` collapse to one key. Anything else is
/// keyed by its basename, which can make a breakpoint match a same-named
/// file in another directory.
#[derive(Debug, Default)]
pub struct PathNormalizer {
    cache: HashMap<String, String>,
}

impl PathNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key for `raw`, or `None` when there is nothing usable.
    pub fn normalize(&mut self, raw: &str) -> Option<String> {
        if let Some(hit) = self.cache.get(raw) {
            return Some(hit.clone());
        }
        let key = normalize_uncached(raw)?;
        self.cache.insert(raw.to_string(), key.clone());
        Some(key)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

fn normalize_uncached(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let spelled = trimmed.strip_prefix(CHUNK_MARKER).unwrap_or(trimmed);
    let spelled = spelled.replace('\\', "/");
    if spelled.is_empty() {
        return None;
    }

    if File::open(&spelled).is_ok() {
        if let Ok(canonical) = fs::canonicalize(&spelled) {
            let text = canonical.to_string_lossy().replace('\\', "/");
            let text = text.strip_prefix("//?/").unwrap_or(&text);
            return Some(text.to_string());
        }
        return Some(spelled);
    }

    let base = basename(&spelled);
    if base.is_empty() {
        None
    } else {
        Some(base.to_string())
    }
}

/// Final path component of a forward-slash path.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// True when `key` holds just a file name, i.e. the file could not be opened.
pub fn is_basename_key(key: &str) -> bool {
    !key.contains('/') && !Path::new(key).is_absolute()
}
