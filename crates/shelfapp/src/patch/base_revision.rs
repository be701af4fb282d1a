//! Base revision side-channel.
//!
//! When shelving in repositories where the base content is cheap to capture,
//! the pre-change text of every modified file is written into the patch file.
//! Conflicts can then be displayed against the exact base without touching
//! the working copy again.

use std::collections::BTreeMap;

use super::{PatchContext, PatchExtension};

#[derive(Debug, Clone, Copy, Default)]
pub struct BaseRevisionExtension;

impl PatchExtension for BaseRevisionExtension {
    fn name(&self) -> &'static str {
        "base-revision"
    }

    fn encode(&self, ctx: &PatchContext) -> Option<serde_json::Value> {
        if ctx.base_revisions().is_empty() {
            return None;
        }
        serde_json::to_value(ctx.base_revisions()).ok()
    }

    fn decode(&self, payload: serde_json::Value, ctx: &mut PatchContext) -> Result<(), String> {
        let revisions: BTreeMap<String, String> =
            serde_json::from_value(payload).map_err(|e| e.to_string())?;
        for (path, text) in revisions {
            ctx.set_base_revision(path, text);
        }
        Ok(())
    }
}
