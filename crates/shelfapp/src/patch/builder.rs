//! Default patch generation.
//!
//! Produces one hunk per file covering the span between the common prefix
//! and common suffix of the two texts, padded with up to three context
//! lines. This is not a minimal diff, but it is exact and applies cleanly
//! to the text it was built from.

use super::apply::split_lines;
use super::{FilePatch, Hunk, LineKind, PatchBuilder, PatchLine};
use crate::change::Change;
use crate::error::{Result, ShelfError};

const CONTEXT_LINES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct ContextDiffBuilder {
    context: usize,
}

impl Default for ContextDiffBuilder {
    fn default() -> Self {
        Self {
            context: CONTEXT_LINES,
        }
    }
}

impl ContextDiffBuilder {
    pub fn with_context(context: usize) -> Self {
        Self { context }
    }

    /// Builds the patch turning `before` into `after`.
    pub fn diff(
        &self,
        before_path: Option<&str>,
        before: &str,
        after_path: Option<&str>,
        after: &str,
    ) -> FilePatch {
        let before = before.replace("\r\n", "\n");
        let after = after.replace("\r\n", "\n");
        let old = split_lines(&before);
        let new = split_lines(&after);

        let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
        let suffix = old[prefix..]
            .iter()
            .rev()
            .zip(new[prefix..].iter().rev())
            .take_while(|(a, b)| a == b)
            .count();

        let mut hunks = Vec::new();
        if prefix != old.len() || prefix != new.len() {
            let lead = prefix.min(self.context);
            let trail = suffix.min(self.context);
            let old_end = old.len() - suffix;
            let new_end = new.len() - suffix;

            let line = |kind, l: &(&str, bool)| PatchLine {
                kind,
                text: l.0.to_string(),
                no_newline: !l.1,
            };
            let mut lines: Vec<PatchLine> = old[prefix - lead..prefix]
                .iter()
                .map(|l| line(LineKind::Context, l))
                .collect();
            lines.extend(old[prefix..old_end].iter().map(|l| line(LineKind::Removed, l)));
            lines.extend(new[prefix..new_end].iter().map(|l| line(LineKind::Added, l)));
            lines.extend(
                old[old_end..old_end + trail]
                    .iter()
                    .map(|l| line(LineKind::Context, l)),
            );

            let old_len = lead + (old_end - prefix) + trail;
            let new_len = lead + (new_end - prefix) + trail;
            let start = |len: usize| {
                if len == 0 {
                    prefix - lead
                } else {
                    prefix - lead + 1
                }
            };
            hunks.push(Hunk {
                old_start: start(old_len),
                old_len,
                new_start: start(new_len),
                new_len,
                lines,
            });
        }

        FilePatch {
            before_path: before_path.map(str::to_string),
            after_path: after_path.map(str::to_string),
            hunks,
        }
    }
}

fn text_of(revision: Option<&crate::change::Revision>) -> Result<&str> {
    match revision {
        None => Ok(""),
        Some(r) => r.content.as_text().ok_or_else(|| {
            ShelfError::Store(format!("'{}' is not a text revision", r.path))
        }),
    }
}

impl PatchBuilder for ContextDiffBuilder {
    fn build(&self, changes: &[Change]) -> Result<Vec<FilePatch>> {
        changes
            .iter()
            .map(|change| {
                let before = change.before.as_ref();
                let after = change.after.as_ref();
                Ok(self.diff(
                    before.map(|r| r.path.as_str()),
                    text_of(before)?,
                    after.map(|r| r.path.as_str()),
                    text_of(after)?,
                ))
            })
            .collect()
    }
}
