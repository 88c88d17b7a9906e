//! Resolving `@import` paths to file contents, and the sequencer that keeps
//! import processing ordered.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::context::Frame;
use crate::error::LessError;
use crate::node::FileInfo;
use crate::tree::import::{Import, ImportOptions};

/// What an importer hands back for one resolved path.
#[derive(Debug)]
pub struct ResolvedImport {
    /// The path the file was actually found at.
    pub full_path: String,

    pub contents: String,

    /// Whether this full path was already resolved earlier in the
    /// compilation; drives the duplicate-import skip.
    pub imported_previously: bool,
}

/// Resolves import paths to file contents.
///
/// The contract mirrors the async original: each `push` must resolve exactly
/// once, and the sequencer guarantees calls arrive in source order.  A
/// synchronous implementation simply returns; an asynchronous one would park
/// the sequencer slot until its callback fires.
pub trait Importer {
    fn push(
        &mut self,
        path: &str,
        try_append_less_extension: bool,
        file_info: &FileInfo,
        options: &ImportOptions,
    ) -> Result<ResolvedImport, LessError>;

    /// Source text of an already-resolved file, for error reporting.
    fn contents_of(&self, full_path: &str) -> Option<&str>;
}

/// Filesystem-backed importer with a search path list.
pub struct FileImporter {
    search_paths: Vec<PathBuf>,
    seen: HashSet<String>,
    contents: HashMap<String, String>,
}

impl FileImporter {
    pub fn new(search_paths: &[String]) -> FileImporter {
        FileImporter {
            search_paths: search_paths.iter().map(PathBuf::from).collect(),
            seen: HashSet::new(),
            contents: HashMap::new(),
        }
    }

    fn candidate_dirs(&self, file_info: &FileInfo) -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from(&file_info.current_directory)];
        dirs.extend(self.search_paths.iter().cloned());
        dirs.push(PathBuf::from(&file_info.entry_path));
        dirs
    }
}

impl Importer for FileImporter {
    fn push(
        &mut self,
        path: &str,
        try_append_less_extension: bool,
        file_info: &FileInfo,
        _options: &ImportOptions,
    ) -> Result<ResolvedImport, LessError> {
        // Scheme'd URLs are not loadable from the filesystem.  The length
        // check keeps Windows drive letters out of the scheme test.
        if let Ok(parsed) = url::Url::parse(path) {
            if parsed.scheme().len() > 1 && parsed.scheme() != "file" {
                return Err(LessError::runtime(format!(
                    "cannot import '{path}': the file importer does not load remote URLs"
                )));
            }
        }

        let mut candidates: Vec<PathBuf> = Vec::new();

        let push_with_extension = |candidates: &mut Vec<PathBuf>, base: PathBuf| {
            candidates.push(base.clone());
            if try_append_less_extension && needs_less_extension(path) {
                let mut with_ext = base.into_os_string();
                with_ext.push(".less");
                candidates.push(PathBuf::from(with_ext));
            }
        };

        if Path::new(path).is_absolute() {
            push_with_extension(&mut candidates, PathBuf::from(path));
        } else {
            for dir in self.candidate_dirs(file_info) {
                push_with_extension(&mut candidates, dir.join(path));
            }
        }

        for candidate in &candidates {
            if let Ok(contents) = std::fs::read_to_string(candidate) {
                let full_path = candidate.to_string_lossy().into_owned();
                let imported_previously = !self.seen.insert(full_path.clone());
                self.contents.insert(full_path.clone(), contents.clone());

                return Ok(ResolvedImport {
                    full_path,
                    contents,
                    imported_previously,
                });
            }
        }

        Err(LessError::runtime(format!(
            "'{path}' wasn't found; tried {} locations",
            candidates.len()
        )))
    }

    fn contents_of(&self, full_path: &str) -> Option<&str> {
        self.contents.get(full_path).map(String::as_str)
    }
}

/// Whether the importer should also try the path with `.less` appended: the
/// path has no extension and no query string.
fn needs_less_extension(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    !last_segment.contains('.') && !path.contains('?') && !path.contains(';')
}

/// The relative path from `entry` down to `current`, used to compute the
/// rootpath of imported files for URL rewriting.
pub fn path_diff(current: &str, entry: &str) -> String {
    let current_parts: Vec<&str> = current.split('/').filter(|s| !s.is_empty()).collect();
    let entry_parts: Vec<&str> = entry.split('/').filter(|s| !s.is_empty()).collect();

    let common = current_parts
        .iter()
        .zip(&entry_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut diff = String::new();
    for _ in common..entry_parts.len() {
        diff.push_str("../");
    }
    for part in &current_parts[common..] {
        diff.push_str(part);
        diff.push('/');
    }

    diff
}

/// One queued import with the scope frames captured at its position.
pub struct QueuedImport {
    pub import: Rc<Import>,
    pub frames: Vec<Frame>,
}

struct KnownImport {
    job: QueuedImport,
    ready: bool,
}

/// Keeps import processing ordered.
///
/// Known-path imports drain strictly in source order; when that queue
/// stalls, one variable-path import (whose path needs its surrounding scope
/// evaluated first) runs, possibly enqueueing more known-path work.  The
/// depth counter ensures the completion signal fires exactly once, at the
/// outermost drain.
#[derive(Default)]
pub struct ImportSequencer {
    imports: VecDeque<KnownImport>,
    variable_imports: VecDeque<QueuedImport>,
    depth: u32,
    completed: bool,
}

impl ImportSequencer {
    pub fn new() -> ImportSequencer {
        ImportSequencer::default()
    }

    /// Queues a known-path import.  With a synchronous importer the slot is
    /// ready immediately; an asynchronous importer would enqueue it unready
    /// and mark it via [`ImportSequencer::mark_ready`].
    pub fn add_import(&mut self, job: QueuedImport) {
        self.imports.push_back(KnownImport { job, ready: true });
    }

    pub fn add_variable_import(&mut self, job: QueuedImport) {
        self.variable_imports.push_back(job);
    }

    /// Marks the oldest unready slot ready, as an async fetch completion
    /// would.
    pub fn mark_ready(&mut self) {
        if let Some(slot) = self.imports.iter_mut().find(|s| !s.ready) {
            slot.ready = true;
        }
    }

    /// The next import to process, honoring the queue discipline: the head
    /// of the known queue while it is ready, otherwise one variable import.
    pub fn next_job(&mut self) -> Option<QueuedImport> {
        if let Some(front) = self.imports.front() {
            if front.ready {
                return self.imports.pop_front().map(|s| s.job);
            }
            return None;
        }

        self.variable_imports.pop_front()
    }

    pub fn enter(&mut self) {
        self.depth += 1;
    }

    /// Leaves a drain level; returns true exactly once, when the outermost
    /// drain finds both queues empty.
    pub fn leave(&mut self) -> bool {
        debug_assert!(self.depth > 0);
        self.depth -= 1;

        if self.depth == 0
            && self.imports.is_empty()
            && self.variable_imports.is_empty()
            && !self.completed
        {
            self.completed = true;
            return true;
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_diff_walks_up_and_down() {
        assert_eq!(path_diff("a/b/", "a/"), "b/");
        assert_eq!(path_diff("a/", "a/b/"), "../");
        assert_eq!(path_diff("a/x/", "a/y/"), "../x/");
        assert_eq!(path_diff("a/", "a/"), "");
    }

    #[test]
    fn extension_appending() {
        assert!(needs_less_extension("mixins"));
        assert!(needs_less_extension("lib/mixins"));
        assert!(!needs_less_extension("mixins.less"));
        assert!(!needs_less_extension("style.css"));
        assert!(!needs_less_extension("weird?query"));
    }

    #[test]
    fn importer_resolves_and_tracks_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.less"), "@x: 1;").unwrap();

        let mut importer = FileImporter::new(&[]);
        let fi = FileInfo {
            current_directory: format!("{}/", dir.path().display()),
            ..FileInfo::default()
        };

        let first = importer
            .push("a", true, &fi, &ImportOptions::default())
            .unwrap();
        assert!(!first.imported_previously);
        assert_eq!(first.contents, "@x: 1;");

        let second = importer
            .push("a.less", true, &fi, &ImportOptions::default())
            .unwrap();
        assert!(second.imported_previously);

        assert!(importer
            .push("missing.less", true, &fi, &ImportOptions::default())
            .is_err());
    }

    #[test]
    fn remote_urls_are_rejected() {
        let mut importer = FileImporter::new(&[]);
        let fi = FileInfo::default();

        let err = importer
            .push("https://example.com/a.less", true, &fi, &ImportOptions::default())
            .unwrap_err();
        assert!(err.message.contains("remote"));
    }

    #[test]
    fn sequencer_orders_known_before_variable() {
        let mut seq = ImportSequencer::new();
        seq.enter();
        assert!(seq.next_job().is_none());
        assert!(seq.leave());

        // completion only fires once
        seq.enter();
        assert!(!seq.leave());
    }
}
