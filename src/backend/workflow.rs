//! Loading workflow graphs from disk.

use std::path::Path;

use super::types::Workflow;
use crate::error::BackendError;

/// Read a workflow graph from a JSON file.
///
/// The top level must be a JSON object. Syntax errors report the line and
/// column where parsing stopped.
pub fn load_workflow(path: impl AsRef<Path>) -> Result<Workflow, BackendError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| BackendError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        let message = if e.is_syntax() || e.is_eof() {
            format!(
                "syntax error at line {}, column {}: {}",
                e.line(),
                e.column(),
                e
            )
        } else {
            e.to_string()
        };
        BackendError::InvalidWorkflow {
            path: path.to_path_buf(),
            message,
        }
    })
}
