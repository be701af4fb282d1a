//! # Unified Diff Codec
//!
//! Reads and writes the patch files backing shelf entries.
//!
//! ```text
//! #@ext base-revision {"a.txt":"old text\n"}   <- extension block (optional)
//! --- a/a.txt                                    <- /dev/null for additions
//! +++ b/a.txt                                    <- /dev/null for deletions
//! @@ -1,2 +1,2 @@
//!  context
//! -removed
//! +added
//! \ No newline at end of file
//! ```
//!
//! Extension lines must precede the first file header. Each payload is a
//! single-line JSON document handed to the [`PatchExtension`] registered under
//! that name; payloads without a registered extension are preserved verbatim.
//!
//! Reading is lenient about noise between files (`diff --git`, `Index:`,
//! `===` lines are skipped), accepts paths with or without `a/`/`b/`
//! prefixes, and normalizes CRLF to LF.

use std::fmt::Write as _;
use std::sync::Arc;

use super::{
    FilePatch, Hunk, LineKind, ParsedPatch, PatchCodec, PatchContext, PatchExtension, PatchLine,
    PatchParseError,
};

const DEV_NULL: &str = "/dev/null";
const EXT_PREFIX: &str = "#@ext ";
const NO_NEWLINE: &str = "\\ No newline at end of file";

#[derive(Clone, Default)]
pub struct UnifiedDiffCodec {
    extensions: Vec<Arc<dyn PatchExtension>>,
}

impl UnifiedDiffCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec with the extensions this crate ships.
    pub fn with_default_extensions() -> Self {
        Self::new().with_extension(Arc::new(super::base_revision::BaseRevisionExtension))
    }

    /// Registers an extension. Extensions are encoded in registration order.
    pub fn with_extension(mut self, extension: Arc<dyn PatchExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    fn extension(&self, name: &str) -> Option<&Arc<dyn PatchExtension>> {
        self.extensions.iter().find(|e| e.name() == name)
    }
}

impl std::fmt::Debug for UnifiedDiffCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.extensions.iter().map(|e| e.name()).collect();
        f.debug_struct("UnifiedDiffCodec")
            .field("extensions", &names)
            .finish()
    }
}

fn header_path(prefix: &str, path: Option<&str>) -> String {
    match path {
        Some(p) => format!("{}{}", prefix, p),
        None => DEV_NULL.to_string(),
    }
}

fn write_hunk(out: &mut String, hunk: &Hunk) {
    let _ = writeln!(
        out,
        "@@ -{},{} +{},{} @@",
        hunk.old_start, hunk.old_len, hunk.new_start, hunk.new_len
    );
    for line in &hunk.lines {
        out.push(line.kind.prefix());
        out.push_str(&line.text);
        out.push('\n');
        if line.no_newline {
            out.push_str(NO_NEWLINE);
            out.push('\n');
        }
    }
}

impl PatchCodec for UnifiedDiffCodec {
    fn encode(&self, patches: &[FilePatch], ctx: &PatchContext) -> String {
        let mut out = String::new();

        for ext in &self.extensions {
            if let Some(payload) = ext.encode(ctx) {
                let _ = writeln!(out, "{}{} {}", EXT_PREFIX, ext.name(), payload);
            }
        }
        for (name, payload) in &ctx.unknown {
            if self.extension(name).is_none() {
                let _ = writeln!(out, "{}{} {}", EXT_PREFIX, name, payload);
            }
        }

        for patch in patches {
            let _ = writeln!(out, "--- {}", header_path("a/", patch.before_path.as_deref()));
            let _ = writeln!(out, "+++ {}", header_path("b/", patch.after_path.as_deref()));
            for hunk in &patch.hunks {
                write_hunk(&mut out, hunk);
            }
        }
        out
    }

    fn decode(&self, text: &str) -> Result<ParsedPatch, PatchParseError> {
        let normalized = text.replace("\r\n", "\n");
        let mut parser = Parser {
            lines: normalized.lines().collect(),
            pos: 0,
        };
        let mut parsed = ParsedPatch::default();

        while let Some(line) = parser.peek() {
            if let Some(rest) = line.strip_prefix(EXT_PREFIX) {
                if !parsed.patches.is_empty() {
                    return Err(parser.error("extension line after file headers"));
                }
                self.decode_extension(&parser, rest, &mut parsed.context)?;
                parser.pos += 1;
            } else if line.starts_with("--- ") {
                parsed.patches.push(parser.file_patch()?);
            } else if line.starts_with("@@") {
                return Err(parser.error("hunk without file header"));
            } else {
                parser.pos += 1;
            }
        }
        Ok(parsed)
    }
}

impl UnifiedDiffCodec {
    fn decode_extension(
        &self,
        parser: &Parser<'_>,
        rest: &str,
        ctx: &mut PatchContext,
    ) -> Result<(), PatchParseError> {
        let (name, payload) = rest
            .split_once(' ')
            .ok_or_else(|| parser.error("extension line without payload"))?;
        let value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| parser.error(format!("bad payload for extension '{}': {}", name, e)))?;
        match self.extension(name) {
            Some(ext) => ext
                .decode(value, ctx)
                .map_err(|e| parser.error(format!("extension '{}': {}", name, e))),
            None => {
                ctx.unknown.insert(name.to_string(), value);
                Ok(())
            }
        }
    }
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn error(&self, message: impl Into<String>) -> PatchParseError {
        PatchParseError {
            line: self.pos + 1,
            message: message.into(),
        }
    }

    fn parse_path(raw: &str, prefix: &str) -> Option<String> {
        let raw = raw.split('\t').next().unwrap_or(raw).trim_end();
        if raw == DEV_NULL {
            return None;
        }
        Some(raw.strip_prefix(prefix).unwrap_or(raw).to_string())
    }

    fn file_patch(&mut self) -> Result<FilePatch, PatchParseError> {
        let before = self
            .peek()
            .and_then(|l| l.strip_prefix("--- "))
            .ok_or_else(|| self.error("expected '---' header"))?;
        self.pos += 1;
        let after = self
            .peek()
            .and_then(|l| l.strip_prefix("+++ "))
            .ok_or_else(|| self.error("expected '+++' header"))?;
        self.pos += 1;

        let patch_before = Self::parse_path(before, "a/");
        let patch_after = Self::parse_path(after, "b/");
        if patch_before.is_none() && patch_after.is_none() {
            return Err(self.error("both sides of the patch are /dev/null"));
        }

        let mut hunks = Vec::new();
        while self.peek().is_some_and(|l| l.starts_with("@@")) {
            hunks.push(self.hunk()?);
        }
        Ok(FilePatch {
            before_path: patch_before,
            after_path: patch_after,
            hunks,
        })
    }

    fn range(&self, part: &str, sign: char) -> Result<(usize, usize), PatchParseError> {
        let body = part
            .strip_prefix(sign)
            .ok_or_else(|| self.error(format!("bad hunk range '{}'", part)))?;
        let (start, len) = match body.split_once(',') {
            Some((s, l)) => (s, l),
            None => (body, "1"),
        };
        let parse = |s: &str| {
            s.parse::<usize>()
                .map_err(|_| self.error(format!("bad hunk range '{}'", part)))
        };
        Ok((parse(start)?, parse(len)?))
    }

    fn hunk(&mut self) -> Result<Hunk, PatchParseError> {
        let header = self.peek().unwrap_or_default();
        let mut parts = header.split_whitespace();
        let (old, new) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("@@"), Some(old), Some(new), Some("@@")) => (old, new),
            _ => return Err(self.error(format!("bad hunk header '{}'", header))),
        };
        let (old_start, old_len) = self.range(old, '-')?;
        let (new_start, new_len) = self.range(new, '+')?;
        self.pos += 1;

        let mut lines: Vec<PatchLine> = Vec::new();
        let (mut old_seen, mut new_seen) = (0, 0);
        while old_seen < old_len || new_seen < new_len {
            let raw = self
                .peek()
                .ok_or_else(|| self.error("unexpected end of hunk"))?;
            if raw.starts_with('\\') {
                self.mark_no_newline(&mut lines)?;
                continue;
            }
            let (kind, text) = match raw.chars().next() {
                Some(' ') => (LineKind::Context, &raw[1..]),
                Some('-') => (LineKind::Removed, &raw[1..]),
                Some('+') => (LineKind::Added, &raw[1..]),
                // Blank context lines are often stripped of their leading space.
                None => (LineKind::Context, ""),
                Some(_) => return Err(self.error(format!("bad hunk line '{}'", raw))),
            };
            let line = PatchLine::new(kind, text);
            old_seen += usize::from(line.in_old());
            new_seen += usize::from(line.in_new());
            if old_seen > old_len || new_seen > new_len {
                return Err(self.error("hunk longer than its header"));
            }
            lines.push(line);
            self.pos += 1;
        }
        if self.peek().is_some_and(|l| l.starts_with('\\')) {
            self.mark_no_newline(&mut lines)?;
        }

        Ok(Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
            lines,
        })
    }

    fn mark_no_newline(&mut self, lines: &mut [PatchLine]) -> Result<(), PatchParseError> {
        let last = lines
            .last_mut()
            .ok_or_else(|| self.error("no-newline marker before any line"))?;
        last.no_newline = true;
        self.pos += 1;
        Ok(())
    }
}
