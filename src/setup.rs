use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Value};

const SERVER_NAME: &str = "codex-index";
const DOC_BEGIN: &str = "<!-- codex-index:begin -->";
const DOC_END: &str = "<!-- codex-index:end -->";

/// Register the MCP server in the project's `.mcp.json`, preserving any
/// other configured servers.
pub fn install(root: &Path) -> Result<()> {
    let path = root.join(".mcp.json");
    let doc: Value = match fs::read_to_string(&path) {
        Ok(text) => serde_json::from_str(&text)
            .with_context(|| format!("{} is not valid JSON", path.display()))?,
        Err(_) => json!({}),
    };

    let exe = std::env::current_exe().context("failed to locate current executable")?;
    let entry = json!({
        "command": exe.to_string_lossy(),
        "args": ["mcp"],
        "env": { crate::ROOT_ENV: root.to_string_lossy() }
    });

    let mut map = match doc {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    let servers = map.entry("mcpServers").or_insert_with(|| json!({}));
    if let Some(servers) = servers.as_object_mut() {
        servers.insert(SERVER_NAME.to_string(), entry);
    }
    let doc = Value::Object(map);

    fs::write(&path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Remove this server's registration and the generated doc section.
pub fn uninstall(root: &Path) -> Result<()> {
    let path = root.join(".mcp.json");
    if let Ok(text) = fs::read_to_string(&path) {
        if let Ok(mut doc) = serde_json::from_str::<Value>(&text) {
            if let Some(servers) = doc.get_mut("mcpServers").and_then(|v| v.as_object_mut()) {
                servers.remove(SERVER_NAME);
            }
            fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
        }
    }

    let doc_path = root.join("CLAUDE.md");
    if let Ok(text) = fs::read_to_string(&doc_path) {
        if let Some(stripped) = strip_section(&text) {
            if stripped.trim().is_empty() {
                fs::remove_file(&doc_path)?;
            } else {
                fs::write(&doc_path, stripped)?;
            }
        }
    }
    Ok(())
}

/// Write (or rewrite) the generated section of `CLAUDE.md` from the current
/// index brief. Content outside the markers is left alone.
pub fn write_docs(root: &Path, brief: &str) -> Result<()> {
    let path = root.join("CLAUDE.md");
    let section = format!(
        "{DOC_BEGIN}\n## Code index\n\n\
         This project carries a local code index under `.codex/`. Query it instead of\n\
         grepping: `codex-index search <q>`, `codex-index context <symbol>`,\n\
         `codex-index impact <file>`, `codex-index brief`. After editing a file, run\n\
         `codex-index reindex-file <path>`; run `codex-index reindex` for a full refresh.\n\n\
         ```\n{brief}```\n{DOC_END}\n"
    );

    let existing = fs::read_to_string(&path).unwrap_or_default();
    let updated = match strip_section(&existing) {
        Some(rest) if !rest.trim().is_empty() => format!("{}\n\n{section}", rest.trim_end()),
        Some(_) => section,
        None if existing.trim().is_empty() => section,
        None => format!("{}\n\n{section}", existing.trim_end()),
    };
    fs::write(&path, updated).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Remove the marker-delimited section. None when no section is present.
fn strip_section(text: &str) -> Option<String> {
    let begin = text.find(DOC_BEGIN)?;
    let end = text.find(DOC_END)? + DOC_END.len();
    let mut out = String::new();
    out.push_str(&text[..begin]);
    let rest = text[end..].trim_start_matches('\n');
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn install_preserves_other_servers() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(".mcp.json"),
            r#"{"mcpServers": {"other": {"command": "x"}}}"#,
        )
        .unwrap();

        install(tmp.path()).unwrap();

        let doc: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join(".mcp.json")).unwrap())
                .unwrap();
        assert!(doc["mcpServers"]["other"].is_object());
        assert!(doc["mcpServers"][SERVER_NAME].is_object());
        assert_eq!(doc["mcpServers"][SERVER_NAME]["args"][0], "mcp");
    }

    #[test]
    fn docs_section_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("CLAUDE.md"), "# My project\n\nNotes.\n").unwrap();

        write_docs(tmp.path(), "Index: 1 files\n").unwrap();
        write_docs(tmp.path(), "Index: 2 files\n").unwrap();

        let text = fs::read_to_string(tmp.path().join("CLAUDE.md")).unwrap();
        assert_eq!(text.matches(DOC_BEGIN).count(), 1);
        assert!(text.contains("# My project"));
        assert!(text.contains("Index: 2 files"));
        assert!(!text.contains("Index: 1 files"));
    }

    #[test]
    fn uninstall_reverses_install_and_docs() {
        let tmp = TempDir::new().unwrap();
        install(tmp.path()).unwrap();
        write_docs(tmp.path(), "Index: 0 files\n").unwrap();

        uninstall(tmp.path()).unwrap();

        let doc: Value =
            serde_json::from_str(&fs::read_to_string(tmp.path().join(".mcp.json")).unwrap())
                .unwrap();
        assert!(doc["mcpServers"].get(SERVER_NAME).is_none());
        // docs file held only our section, so it is gone
        assert!(!tmp.path().join("CLAUDE.md").exists());
    }
}
