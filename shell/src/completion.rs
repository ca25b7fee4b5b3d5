//! Tab completion of command names.
//!
//! [`CandidateSet`] is built once at startup from the built-in names and the
//! executables on `PATH`. [`CompletionEngine`] answers completion requests
//! against it and remembers how many times in a row a request could not
//! make progress, which decides between ringing the bell and listing matches.

use crate::builtin::BUILTIN_NAMES;
use crate::external::find_command_path;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};

/// Every command name the shell can complete, sorted and de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    names: BTreeSet<String>,
}

impl CandidateSet {
    /// A set made of exactly the given names.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CandidateSet {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// The built-in names plus every executable reachable through `search_paths`.
    ///
    /// Unreadable `PATH` entries are skipped. A file only counts when looking
    /// its name up on `PATH` finds an executable, so plain files are left out.
    pub fn discover(search_paths: &OsStr) -> Self {
        let mut set = Self::from_names(BUILTIN_NAMES);

        for dir in std::env::split_paths(search_paths) {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    log::debug!("completion: skipping {}: {e}", dir.display());
                    continue;
                }
            };
            for entry in entries.flatten() {
                if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                    continue;
                }
                let Ok(name) = entry.file_name().into_string() else {
                    continue;
                };
                if set.names.contains(&name) {
                    continue;
                }
                if find_command_path(search_paths, Path::new(&name)).is_some() {
                    set.names.insert(name);
                }
            }
        }

        log::info!("completion: {} command names available", set.len());
        set
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Names starting with `prefix`, in sorted order.
    pub fn matching<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.names
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |name| name.starts_with(prefix))
            .map(String::as_str)
    }
}

/// Outcome of a single completion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Nothing to do; ring the terminal bell.
    Bell,
    /// Replace the word starting at byte offset `start` (up to the cursor)
    /// with `replacement`.
    Replace { start: usize, replacement: String },
    /// Show these candidates under the prompt, then redraw the line.
    List(Vec<String>),
}

/// Serves completion requests; safe to share with the line editor's key
/// handlers, which only hold it behind a shared reference.
#[derive(Debug)]
pub struct CompletionEngine {
    candidates: CandidateSet,
    stalled_requests: AtomicU8,
}

impl CompletionEngine {
    pub fn new(candidates: CandidateSet) -> Self {
        CompletionEngine {
            candidates,
            stalled_requests: AtomicU8::new(0),
        }
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    /// Forget earlier requests; called for any key other than the trigger.
    pub fn reset(&self) {
        self.stalled_requests.store(0, Ordering::Relaxed);
    }

    /// Complete the word that ends at byte offset `pos` of `line`.
    pub fn complete(&self, line: &str, pos: usize) -> Completion {
        let pos = floor_char_boundary(line, pos);
        let start = current_word_start(line, pos);
        let word = &line[start..pos];
        let matches: Vec<&str> = self.candidates.matching(word).collect();

        match matches.as_slice() {
            [] => {
                self.reset();
                Completion::Bell
            }
            [only] => {
                self.reset();
                Completion::Replace {
                    start,
                    replacement: only.to_string(),
                }
            }
            many => {
                let prefix = longest_common_prefix(many);
                if prefix.len() > word.len() {
                    self.reset();
                    return Completion::Replace {
                        start,
                        replacement: prefix.to_string(),
                    };
                }
                if self.stalled_requests.fetch_add(1, Ordering::Relaxed) == 0 {
                    Completion::Bell
                } else {
                    self.reset();
                    Completion::List(many.iter().map(|s| s.to_string()).collect())
                }
            }
        }
    }
}

/// Byte offset where the word under the cursor begins.
fn current_word_start(line: &str, pos: usize) -> usize {
    line[..pos]
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0)
}

fn floor_char_boundary(line: &str, pos: usize) -> usize {
    let mut pos = pos.min(line.len());
    while !line.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// The longest prefix shared by every name, compared char by char.
pub fn longest_common_prefix<'a>(names: &[&'a str]) -> &'a str {
    let Some((first, rest)) = names.split_first() else {
        return "";
    };
    let mut end = first.len();
    for name in rest {
        end = first
            .char_indices()
            .zip(name.chars())
            .take_while(|((i, a), b)| *i < end && a == b)
            .last()
            .map(|((i, a), _)| i + a.len_utf8())
            .unwrap_or(0);
    }
    &first[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn engine(names: &[&str]) -> CompletionEngine {
        CompletionEngine::new(CandidateSet::from_names(names.iter().copied()))
    }

    fn make_unique_temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let p = std::env::temp_dir().join(format!("linesh_completion_{}_{}_{}", tag, std::process::id(), nanos));
        fs::create_dir_all(&p).unwrap();
        p
    }

    #[cfg(unix)]
    fn touch_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        File::create(path).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_lcp() {
        assert_eq!(longest_common_prefix(&["echo", "exit"]), "e");
        assert_eq!(longest_common_prefix(&["xyz_foo", "xyz_foo_bar", "xyz_foo_bar_baz"]), "xyz_foo");
        assert_eq!(longest_common_prefix(&["abc", "xyz"]), "");
        assert_eq!(longest_common_prefix(&["same"]), "same");
        assert_eq!(longest_common_prefix(&[]), "");
        assert_eq!(longest_common_prefix(&["ünï", "ünö"]), "ün");
    }

    #[test]
    fn test_matching_is_sorted_prefix_scan() {
        let set = CandidateSet::from_names(["exit", "echo", "env", "cd", "e"]);
        assert_eq!(set.matching("e").collect::<Vec<_>>(), vec!["e", "echo", "env", "exit"]);
        assert_eq!(set.matching("ex").collect::<Vec<_>>(), vec!["exit"]);
        assert_eq!(set.matching("z").count(), 0);
        assert_eq!(set.matching("").count(), 5);
    }

    #[test]
    fn test_no_match_rings_bell() {
        let e = engine(&["echo", "exit"]);
        assert_eq!(e.complete("zzz", 3), Completion::Bell);
    }

    #[test]
    fn test_single_match_replaces_word() {
        let e = engine(&["echo", "exit"]);
        assert_eq!(
            e.complete("ech", 3),
            Completion::Replace {
                start: 0,
                replacement: "echo".to_string()
            }
        );
    }

    #[test]
    fn test_word_is_taken_after_last_whitespace() {
        let e = engine(&["echo", "exit"]);
        assert_eq!(
            e.complete("foo  ex", 7),
            Completion::Replace {
                start: 5,
                replacement: "exit".to_string()
            }
        );
    }

    #[test]
    fn test_multiple_matches_extend_to_common_prefix() {
        let e = engine(&["xyz_foo", "xyz_foo_bar", "xyz_foo_bar_baz"]);
        assert_eq!(
            e.complete("xyz_", 4),
            Completion::Replace {
                start: 0,
                replacement: "xyz_foo".to_string()
            }
        );
    }

    #[test]
    fn test_ambiguous_bell_then_list() {
        let e = engine(&["echo", "exit", "cd"]);
        assert_eq!(e.complete("e", 1), Completion::Bell);
        assert_eq!(
            e.complete("e", 1),
            Completion::List(vec!["echo".to_string(), "exit".to_string()])
        );
        // counter was reset by the listing
        assert_eq!(e.complete("e", 1), Completion::Bell);
    }

    #[test]
    fn test_other_key_resets_repeat_counter() {
        let e = engine(&["echo", "exit"]);
        assert_eq!(e.complete("e", 1), Completion::Bell);
        e.reset();
        assert_eq!(e.complete("e", 1), Completion::Bell);
    }

    #[test]
    fn test_progress_resets_repeat_counter() {
        let e = engine(&["echo", "exit", "xa1", "xa2"]);
        assert_eq!(e.complete("e", 1), Completion::Bell);
        assert!(matches!(e.complete("x", 1), Completion::Replace { .. }));
        assert_eq!(e.complete("e", 1), Completion::Bell);
    }

    #[test]
    #[cfg(unix)]
    fn test_discover_scans_path() {
        let first = make_unique_temp_dir("first");
        let second = make_unique_temp_dir("second");
        touch_executable(&first.join("mytool_alpha"));
        touch_executable(&second.join("mytool_alpha"));
        touch_executable(&second.join("mytool_beta"));
        File::create(second.join("mytool_plain")).unwrap();
        fs::create_dir_all(second.join("mytool_dir")).unwrap();

        let search = std::env::join_paths([&first, &second, &PathBuf::from("/nonexistent_linesh")]).unwrap();
        let set = CandidateSet::discover(&search);

        assert!(set.contains("mytool_alpha"));
        assert!(set.contains("mytool_beta"));
        assert!(!set.contains("mytool_plain"));
        assert!(!set.contains("mytool_dir"));
        for name in BUILTIN_NAMES {
            assert!(set.contains(name));
        }
        assert_eq!(set.matching("mytool_").count(), 2);

        let _ = fs::remove_dir_all(first);
        let _ = fs::remove_dir_all(second);
    }
}
