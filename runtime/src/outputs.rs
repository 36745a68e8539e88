use crate::fsutil::relative_slash;
use crate::{Result, ShepherdError};
use job_spec::FilterChain;
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// Walks `workdir` and returns the relative paths (with `/` separators, in
/// lexical traversal order) of files selected by `filters` that were not
/// staged as inputs.
///
/// Directories the chain excludes are pruned with their whole subtree; the
/// working directory itself is always entered. Symbolic links are not
/// followed and are judged like files.
pub fn find_new_files<F>(workdir: &Path, filters: &FilterChain, was_localized: F) -> Result<Vec<String>>
where
    F: Fn(&str) -> bool,
{
    let walker = WalkDir::new(workdir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            match relative_slash(workdir, entry.path()) {
                Some(rel) => {
                    let keep = filters.includes(&rel);
                    if !keep {
                        debug!(directory = %rel, "pruning excluded directory");
                    }
                    keep
                }
                None => false,
            }
        });

    let mut selected = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let message = match e.path() {
                Some(path) => format!("failed to walk {}", path.display()),
                None => format!("failed to walk {}", workdir.display()),
            };
            ShepherdError::io(message, e.into())
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let Some(rel) = relative_slash(workdir, entry.path()) else {
            continue;
        };
        if was_localized(&rel) {
            debug!(path = %rel, "skipping staged input");
            continue;
        }
        if filters.includes(&rel) {
            selected.push(rel);
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use job_spec::Filter;
    use std::fs;

    fn tree(paths: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for path in paths {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, path.as_bytes()).unwrap();
        }
        dir
    }

    fn chain(filters: &[Filter]) -> FilterChain {
        FilterChain::compile(filters).unwrap()
    }

    #[test]
    fn star_selects_every_file_once() {
        let dir = tree(&["1", "subdir/2", "subdir/hello.txt"]);
        let found = find_new_files(dir.path(), &chain(&[Filter::include("*")]), |_| false).unwrap();
        assert_eq!(found, vec!["1", "subdir/2", "subdir/hello.txt"]);
    }

    #[test]
    fn excluded_directories_are_pruned() {
        let dir = tree(&["keep/a.txt", "cache/a.txt", "cache/deep/b.txt"]);
        let filters = chain(&[
            Filter::include("*"),
            Filter::exclude("cache"),
            Filter::include("*.txt"),
        ]);
        let found = find_new_files(dir.path(), &filters, |_| false).unwrap();
        // "cache" itself matches only the exclude; its files never surface even
        // though they would match the later include.
        assert_eq!(found, vec!["keep/a.txt"]);
    }

    #[test]
    fn staged_inputs_are_skipped() {
        let dir = tree(&["1", "2"]);
        let found =
            find_new_files(dir.path(), &chain(&[Filter::include("*")]), |p| p == "1").unwrap();
        assert_eq!(found, vec!["2"]);
    }

    #[test]
    fn empty_chain_selects_nothing() {
        let dir = tree(&["a", "b/c"]);
        let found = find_new_files(dir.path(), &chain(&[]), |_| false).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn path_patterns_stay_within_their_directory() {
        let dir = tree(&["logs/run.log", "logs/old/run.log", "run.log"]);
        let filters = chain(&[Filter::include("logs"), Filter::include("logs/*")]);
        let found = find_new_files(dir.path(), &filters, |_| false).unwrap();
        assert_eq!(found, vec!["logs/run.log"]);
    }
}
