//! Hunk application and content reconstruction.
//!
//! Hunks must match the target text exactly (context and removed lines). A
//! hunk is first tried at its recorded position, then anywhere after the
//! previous hunk, so patches survive unrelated edits above them.

use super::{FilePatch, Hunk, PatchLine};
use crate::error::{Result, ShelfError};

/// A line together with whether it is terminated by `\n`.
type Line<'a> = (&'a str, bool);

pub(crate) fn split_lines(text: &str) -> Vec<Line<'_>> {
    text.split_inclusive('\n')
        .map(|l| match l.strip_suffix('\n') {
            Some(body) => (body, true),
            None => (l, false),
        })
        .collect()
}

fn join_lines<'a>(lines: impl IntoIterator<Item = Line<'a>>) -> String {
    let mut out = String::new();
    for (text, newline) in lines {
        out.push_str(text);
        if newline {
            out.push('\n');
        }
    }
    out
}

fn as_line(line: &PatchLine) -> Line<'_> {
    (line.text.as_str(), !line.no_newline)
}

fn matches_at(lines: &[Line<'_>], pos: usize, expected: &[Line<'_>]) -> bool {
    pos + expected.len() <= lines.len()
        && lines[pos..pos + expected.len()]
            .iter()
            .zip(expected)
            .all(|(have, want)| have.0 == want.0)
}

fn locate(lines: &[Line<'_>], cursor: usize, hunk: &Hunk, expected: &[Line<'_>]) -> Option<usize> {
    let preferred = if hunk.old_len == 0 {
        hunk.old_start
    } else {
        hunk.old_start.saturating_sub(1)
    };
    if preferred >= cursor && matches_at(lines, preferred, expected) {
        return Some(preferred);
    }
    (cursor..=lines.len()).find(|pos| matches_at(lines, *pos, expected))
}

/// Applies `hunks` to `original`. Returns a description of the first hunk
/// that does not match.
pub fn apply_hunks(original: &str, hunks: &[Hunk]) -> std::result::Result<String, String> {
    let lines = split_lines(original);
    let mut out: Vec<Line<'_>> = Vec::with_capacity(lines.len());
    let mut cursor = 0;

    for (n, hunk) in hunks.iter().enumerate() {
        let expected: Vec<Line<'_>> = hunk.old_lines().map(as_line).collect();
        let pos = locate(&lines, cursor, hunk, &expected).ok_or_else(|| {
            format!(
                "hunk #{} (@@ -{},{} +{},{} @@) does not match",
                n + 1,
                hunk.old_start,
                hunk.old_len,
                hunk.new_start,
                hunk.new_len
            )
        })?;
        out.extend_from_slice(&lines[cursor..pos]);
        out.extend(hunk.new_lines().map(as_line));
        cursor = pos + expected.len();
    }
    out.extend_from_slice(&lines[cursor..]);

    // A line that used to be last may now be followed by more lines.
    let last = out.len().saturating_sub(1);
    for line in out.iter_mut().take(last) {
        line.1 = true;
    }
    Ok(join_lines(out))
}

/// Before/after text of one shelved file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextContents {
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Reconstructs the old and proposed text of a patch.
///
/// The hunks are applied to the stored base revision when there is one,
/// otherwise to the current working-copy text.
pub fn reconstruct(
    patch: &FilePatch,
    current: Option<&str>,
    base: Option<&str>,
) -> Result<TextContents> {
    let source = base.or(current).unwrap_or_default();
    let after = match patch.after_path {
        Some(_) => Some(apply_hunks(source, &patch.hunks).map_err(|message| {
            ShelfError::Conflict {
                path: patch.key_path().to_string(),
                message,
            }
        })?),
        None => None,
    };
    let before = patch.before_path.as_ref().map(|_| source.to_string());
    Ok(TextContents { before, after })
}
