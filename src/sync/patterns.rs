//! Recognisers for the free-text markers rclone prints
//!
//! Every function returns `None` when its marker is absent. Callers never see
//! an empty string standing in for "not found".

use once_cell::sync::Lazy;
use regex::Regex;

/// `rclone deletefile <path>` as suggested after a stale bisync lock
static LOCK_CLEANUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"rclone\s+deletefile\s+(?:"[^"\n]*"|'[^'\n]*'|[^\s"'`]+)"#).unwrap()
});

static CONFLICT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"New or changed in both paths|Renaming Path[12] copy").unwrap()
});

static RENAMED_PATH1: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)Renaming Path1 copy\s+-\s+(.+?)\s*$").unwrap());

static QUEUED_TO_PATH1: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)Queue copy to Path1\s+-\s+(.+?)\s*$").unwrap());

/// Suffixes bisync appends to the copies it keeps: `.conflict1` in current
/// releases, `..path1` in older ones
static CONFLICT_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)(?:\.conflict\d+|\.\.path[12])$").unwrap());

/// The exact cleanup command embedded in a lock failure message
pub fn find_lock_cleanup_command(text: &str) -> Option<String> {
    LOCK_CLEANUP.find(text).map(|m| m.as_str().to_string())
}

pub fn has_conflict_marker(text: &str) -> bool {
    CONFLICT_MARKER.is_match(text)
}

/// First path matched by `re` at or after `from`, and where that match ends
fn find_path_from(re: &Regex, text: &str, from: usize) -> Option<(String, usize)> {
    let tail = text.get(from..)?;
    let caps = re.captures(tail)?;
    let path = caps.get(1)?;
    non_empty(path.as_str()).map(|p| (p, from + path.end()))
}

/// Both sides of the first conflict, or `None` unless both were found
pub fn extract_conflict_pair(text: &str) -> Option<(String, String)> {
    extract_conflict_pairs(text).into_iter().next()
}

/// Every rename/queue pair in order of appearance
///
/// Each pair takes the first queued path after its rename; the next pair
/// is searched for after that.
pub fn extract_conflict_pairs(text: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut from = 0;
    while let Some((path_a, after_rename)) = find_path_from(&RENAMED_PATH1, text, from) {
        match find_path_from(&QUEUED_TO_PATH1, text, after_rename) {
            Some((path_b, after_queue)) => {
                pairs.push((path_a, path_b));
                from = after_queue;
            }
            None => break,
        }
    }
    pairs
}

/// `note.md.conflict1` → `note.md`; `None` if there is no suffix to strip
pub fn strip_conflict_suffix(path: &str) -> Option<String> {
    CONFLICT_SUFFIX
        .captures(path)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Split a command line into arguments, honouring single and double quotes
pub fn split_command(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_arg = false;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
