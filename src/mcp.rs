use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::Parameters;
use rmcp::model::{ServerCapabilities, ServerInfo};
use rmcp::schemars::JsonSchema;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde::Deserialize;
use tracing::info;

use crate::db::Database;
use crate::indexer::Indexer;
use crate::query::QueryEngine;

// ---------------------------------------------------------------------------
// Parameter structs; doc comments surface as descriptions in the tool schema
// ---------------------------------------------------------------------------

#[derive(Deserialize, JsonSchema)]
pub struct SearchCodeParams {
    /// Search query; tokens match symbol names, signatures, docs and bodies
    pub query: String,
    /// Maximum results to return (default 15)
    pub limit: Option<i64>,
}

#[derive(Deserialize, JsonSchema)]
pub struct SymbolParams {
    /// Symbol name, or qualified name like `Class.method`
    pub name: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ReindexFileParams {
    /// Root-relative path of the file to re-index
    pub path: String,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CodexServer {
    db: Arc<Mutex<Database>>,
    root: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl CodexServer {
    pub fn new(db: Arc<Mutex<Database>>, root: PathBuf) -> Self {
        Self {
            db,
            root,
            tool_router: Self::tool_router(),
        }
    }

    fn log_done(tool: &str, started: Instant) {
        info!("{tool} completed in {}ms", started.elapsed().as_millis());
    }
}

#[tool_router]
impl CodexServer {
    #[tool(description = "Ranked full-text search over indexed symbols. Returns matches ordered by structural importance (PageRank), each with a highlighted snippet.")]
    fn search_code(
        &self,
        Parameters(params): Parameters<SearchCodeParams>,
    ) -> Result<String, String> {
        let started = Instant::now();
        let out = {
            let db = self.db.lock().map_err(|e| format!("lock error: {e}"))?;
            let hits = QueryEngine::new(&db)
                .search(&params.query, params.limit.unwrap_or(15))
                .map_err(|e| format!("search error: {e}"))?;
            serde_json::to_string_pretty(&hits).map_err(|e| format!("json error: {e}"))?
        };
        Self::log_done("search_code", started);
        Ok(out)
    }

    #[tool(description = "Full detail for one symbol: metadata, body, dependencies, dependents, and same-file siblings. Prefers exported and highly-ranked matches for ambiguous names.")]
    fn get_symbol(&self, Parameters(params): Parameters<SymbolParams>) -> Result<String, String> {
        let started = Instant::now();
        let out = {
            let db = self.db.lock().map_err(|e| format!("lock error: {e}"))?;
            let view = QueryEngine::new(&db)
                .context(&params.name)
                .map_err(|e| format!("query error: {e}"))?;
            match view {
                Some(view) => {
                    serde_json::to_string_pretty(&view).map_err(|e| format!("json error: {e}"))?
                }
                None => format!(
                    "No symbol named '{}' in the index. Try search_code for fuzzy matching.",
                    params.name
                ),
            }
        };
        Self::log_done("get_symbol", started);
        Ok(out)
    }

    #[tool(description = "Symbols that call or reference the named symbol, ordered by the caller's structural importance.")]
    fn get_callers(&self, Parameters(params): Parameters<SymbolParams>) -> Result<String, String> {
        let started = Instant::now();
        let out = {
            let db = self.db.lock().map_err(|e| format!("lock error: {e}"))?;
            let callers = QueryEngine::new(&db)
                .callers(&params.name)
                .map_err(|e| format!("query error: {e}"))?;
            serde_json::to_string_pretty(&callers).map_err(|e| format!("json error: {e}"))?
        };
        Self::log_done("get_callers", started);
        Ok(out)
    }

    #[tool(description = "Symbols that depend on the named symbol through any incoming edge. Includes every symbol in files importing it.")]
    fn get_dependents(
        &self,
        Parameters(params): Parameters<SymbolParams>,
    ) -> Result<String, String> {
        let started = Instant::now();
        let out = {
            let db = self.db.lock().map_err(|e| format!("lock error: {e}"))?;
            let dependents = QueryEngine::new(&db)
                .callers(&params.name)
                .map_err(|e| format!("query error: {e}"))?;
            serde_json::to_string_pretty(&dependents).map_err(|e| format!("json error: {e}"))?
        };
        Self::log_done("get_dependents", started);
        Ok(out)
    }

    #[tool(description = "Symbols the named symbol depends on (outgoing edges), ordered by the target's structural importance.")]
    fn get_dependencies(
        &self,
        Parameters(params): Parameters<SymbolParams>,
    ) -> Result<String, String> {
        let started = Instant::now();
        let out = {
            let db = self.db.lock().map_err(|e| format!("lock error: {e}"))?;
            let deps = QueryEngine::new(&db)
                .dependencies(&params.name)
                .map_err(|e| format!("query error: {e}"))?;
            serde_json::to_string_pretty(&deps).map_err(|e| format!("json error: {e}"))?
        };
        Self::log_done("get_dependencies", started);
        Ok(out)
    }

    #[tool(description = "Project structure overview: index statistics plus module partitions with sizes and cross-module dependencies.")]
    fn get_architecture(&self) -> Result<String, String> {
        let started = Instant::now();
        let out = {
            let db = self.db.lock().map_err(|e| format!("lock error: {e}"))?;
            let engine = QueryEngine::new(&db);
            let stats = engine.stats().map_err(|e| format!("query error: {e}"))?;
            let modules = engine.modules().map_err(|e| format!("query error: {e}"))?;
            let body = serde_json::json!({ "stats": stats, "modules": modules });
            serde_json::to_string_pretty(&body).map_err(|e| format!("json error: {e}"))?
        };
        Self::log_done("get_architecture", started);
        Ok(out)
    }

    #[tool(description = "Re-index a single file after editing it. Removes the file from the index if it no longer exists on disk.")]
    fn reindex_file(
        &self,
        Parameters(params): Parameters<ReindexFileParams>,
    ) -> Result<String, String> {
        let started = Instant::now();
        let out = {
            let db = self.db.lock().map_err(|e| format!("lock error: {e}"))?;
            let mut indexer = Indexer::new(&db);
            let changed = indexer
                .reindex_file(&self.root, &params.path)
                .map_err(|e| format!("re-index error: {e}"))?;
            serde_json::json!({ "path": params.path, "changed": changed }).to_string()
        };
        Self::log_done("reindex_file", started);
        Ok(out)
    }
}

#[tool_handler]
impl ServerHandler for CodexServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "codex-index serves a symbol-level map of this codebase. Use search_code to \
                 locate symbols, get_symbol for full context on one of them, get_callers / \
                 get_dependents / get_dependencies to walk the graph, get_architecture for \
                 the module layout, and reindex_file after editing a file."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
