//! Hash-keyed reuse of parsed ASTs across compilations.
//!
//! Parsing is the most expensive part of recompiling an unchanged file, and
//! watch-style callers recompile the same sources over and over.  The cache
//! keys on a hash of the source text plus the filename (nodes carry their
//! file info, so identical text from different files must not share a tree).
//!
//! Evaluation is non-destructive and the import pass rewrites its slots on
//! every run, so a cached root can be fed through the pipeline repeatedly.
//! The tree type is single-threaded; each worker thread owns its own cache
//! instance, guarded by a readers-writer lock.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::RwLock;

use crate::error::LessError;
use crate::node::FileInfo;
use crate::session::Session;
use crate::tree::ruleset::Ruleset;

pub struct ParseCache {
    entries: RwLock<HashMap<u64, Rc<Ruleset>>>,
}

thread_local! {
    static PARSE_CACHE: RefCell<ParseCache> = RefCell::new(ParseCache::new());
}

impl ParseCache {
    pub fn new() -> ParseCache {
        ParseCache {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Runs `f` with this thread's cache.
    pub fn with<T>(f: impl FnOnce(&ParseCache) -> T) -> T {
        PARSE_CACHE.with(|cache| f(&cache.borrow()))
    }

    fn key(source: &str, filename: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        source.hash(&mut hasher);
        filename.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the cached root for this source, parsing on a miss.
    pub fn get_or_parse(
        &self,
        source: &str,
        file_info: Rc<FileInfo>,
        session: &Session,
    ) -> Result<Rc<Ruleset>, LessError> {
        let key = Self::key(source, &file_info.filename);

        if let Some(root) = self
            .entries
            .read()
            .ok()
            .and_then(|map| map.get(&key).cloned())
        {
            return Ok(root);
        }

        let root = crate::parser::parse(source, file_info, session)?;

        if let Ok(mut map) = self.entries.write() {
            map.insert(key, root.clone());
        }

        Ok(root)
    }

    pub fn clear(&self) {
        if let Ok(mut map) = self.entries.write() {
            map.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        ParseCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_source_reuses_the_tree() {
        let cache = ParseCache::new();
        let session = Session::new_for_test_suite();
        let fi = Rc::new(FileInfo::for_entry("a.less"));

        let first = cache
            .get_or_parse(".a { color: red; }", fi.clone(), &session)
            .unwrap();
        let second = cache
            .get_or_parse(".a { color: red; }", fi, &session)
            .unwrap();

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn different_filenames_do_not_share() {
        let cache = ParseCache::new();
        let session = Session::new_for_test_suite();

        let a = cache
            .get_or_parse(
                ".a { color: red; }",
                Rc::new(FileInfo::for_entry("a.less")),
                &session,
            )
            .unwrap();
        let b = cache
            .get_or_parse(
                ".a { color: red; }",
                Rc::new(FileInfo::for_entry("b.less")),
                &session,
            )
            .unwrap();

        assert!(!Rc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }
}
