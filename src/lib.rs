//! codex-index: local code intelligence for AI assistants.
//!
//! Indexes a source tree into a symbol-level dependency graph backed by
//! SQLite, ranks symbols with PageRank, and serves structured queries over
//! an MCP stdio server and a JSON-emitting CLI.
//!
//! Pipeline: collector walks the tree, the tree-sitter parser extracts
//! symbols/imports/calls per file, the indexer stores the graph and resolves
//! cross-file references, then PageRank scores every symbol. The watcher
//! drives the same single-file re-index path on filesystem events.

pub mod collector;
pub mod daemon;
pub mod db;
pub mod indexer;
pub mod mcp;
pub mod parser;
pub mod query;
pub mod rank;
pub mod resolver;
pub mod setup;
pub mod watcher;

use std::path::{Path, PathBuf};

/// Directory under the project root holding the index and daemon state.
pub const CODEX_DIR: &str = ".codex";

/// Environment variable overriding project-root discovery.
pub const ROOT_ENV: &str = "CODEX_ROOT";

/// Path of the index database for a project root.
pub fn index_db_path(root: &Path) -> PathBuf {
    root.join(CODEX_DIR).join("index.db")
}

/// Discover the project root: `CODEX_ROOT` if set, else the nearest ancestor
/// of the current directory containing `.codex/index.db`, else the current
/// directory itself.
pub fn discover_root() -> PathBuf {
    if let Ok(root) = std::env::var(ROOT_ENV) {
        return PathBuf::from(root);
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut dir = cwd.as_path();
    loop {
        if index_db_path(dir).exists() {
            return dir.to_path_buf();
        }
        match dir.parent() {
            Some(parent) => dir = parent,
            None => return cwd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_db_path_is_under_codex_dir() {
        let p = index_db_path(Path::new("/tmp/proj"));
        assert_eq!(p, PathBuf::from("/tmp/proj/.codex/index.db"));
    }
}
