//! Bootstrap context loader — optional persona/memory markdown.
//!
//! Hosts can drop `PERSONA.md` and `MEMORY.md` into the workspace root;
//! their contents are injected into every prompt under the workspace
//! bootstrap section. Absent or empty files contribute nothing.

use std::path::{Path, PathBuf};

/// Files read from the workspace root, in injection order.
const BOOTSTRAP_FILES: &[&str] = &["PERSONA.md", "MEMORY.md"];

/// Reads optional bootstrap markdown from a workspace.
#[derive(Clone, Debug)]
pub struct BootstrapContextLoader {
    workspace: PathBuf,
}

impl BootstrapContextLoader {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        BootstrapContextLoader {
            workspace: workspace.as_ref().to_path_buf(),
        }
    }

    /// Concatenated bootstrap context, or an empty string when no file has
    /// content.
    pub fn load(&self) -> String {
        let parts: Vec<String> = BOOTSTRAP_FILES
            .iter()
            .filter_map(|name| {
                let content = std::fs::read_to_string(self.workspace.join(name)).ok()?;
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect();

        parts.join("\n\n")
    }
}
