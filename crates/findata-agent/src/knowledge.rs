//! Knowledge provider: textual schema context for the generation prompt
//!
//! Static lookup, no computation. The data-source schema and tool docs are
//! exposed to the code generator only through this context string, never
//! hard-coded into the orchestrator.

use std::path::Path;
use tracing::debug;

const KNOWLEDGE_FILES: &[&str] = &["tushare_schema.json", "tool_docs.json"];

/// Load the knowledge-base documents under `dir` into one context string
///
/// Each present document is pretty-printed under a `--- filename ---`
/// header; missing or malformed files are skipped. An empty string is a
/// valid (if unhelpful) context.
pub fn load_context(dir: &Path) -> String {
    let mut sections = Vec::new();

    for name in KNOWLEDGE_FILES {
        let path = dir.join(name);
        let Ok(text) = std::fs::read_to_string(&path) else {
            debug!(path = %path.display(), "Knowledge document not found, skipping");
            continue;
        };

        // Re-serialize for stable formatting; fall back to the raw text for
        // documents that are not valid JSON.
        let body = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => serde_json::to_string_pretty(&value).unwrap_or(text),
            Err(_) => text,
        };

        sections.push(format!("--- {name} ---\n{body}"));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loads_and_labels_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tushare_schema.json"),
            r#"{"daily": {"fields": ["trade_date", "close"]}}"#,
        )
        .unwrap();

        let context = load_context(dir.path());
        assert!(context.contains("--- tushare_schema.json ---"));
        assert!(context.contains("trade_date"));
    }

    #[test]
    fn test_missing_dir_yields_empty_context() {
        let context = load_context(Path::new("/nonexistent/knowledge"));
        assert!(context.is_empty());
    }

    #[test]
    fn test_malformed_json_kept_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tool_docs.json"), "plain text notes").unwrap();

        let context = load_context(dir.path());
        assert!(context.contains("plain text notes"));
    }
}
