//! Loading script files for evaluation.

use crate::error::InitializationError;
use std::path::Path;

/// Convert `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Read a UTF-8 script and normalize its line endings.
pub async fn load_script(path: &Path) -> Result<String, InitializationError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InitializationError::ScriptRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(normalize_line_endings(text.strip_prefix('\u{feff}').unwrap_or(&text)))
}
