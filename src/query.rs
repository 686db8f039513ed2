use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use crate::db::{Database, SymbolRow};

// ---------------------------------------------------------------------------
// Result records: plain data, no references into the store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolHit {
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: String,
    pub file: String,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: Option<String>,
    pub exported: bool,
    pub rank: f64,
}

impl From<SymbolRow> for SymbolHit {
    fn from(row: SymbolRow) -> Self {
        Self {
            name: row.name,
            qualified_name: row.qualified_name,
            kind: row.kind,
            file: row.file,
            start_line: row.start_line,
            end_line: row.end_line,
            signature: row.signature,
            exported: row.exported,
            rank: row.rank,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(flatten)]
    pub symbol: SymbolHit,
    pub snippet: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextView {
    #[serde(flatten)]
    pub symbol: SymbolHit,
    pub docstring: Option<String>,
    pub body: Option<String>,
    pub dependencies: Vec<SymbolHit>,
    pub dependents: Vec<SymbolHit>,
    pub siblings: Vec<SymbolHit>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankEntry {
    #[serde(flatten)]
    pub symbol: SymbolHit,
    pub in_degree: i64,
    pub out_degree: i64,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactEntry {
    pub file: String,
    pub depth: usize,
    pub symbol_count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub name: String,
    pub file_count: usize,
    pub symbol_count: i64,
    pub depends_on: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsView {
    pub files: i64,
    pub symbols: i64,
    pub edges: i64,
    pub file_deps: i64,
}

// ---------------------------------------------------------------------------
// Query engine
// ---------------------------------------------------------------------------

pub struct QueryEngine<'a> {
    db: &'a Database,
}

impl<'a> QueryEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Ranked full-text search over the symbol projection. Tokens are quoted
    /// and OR-joined so FTS operators in user input stay inert.
    pub fn search(&self, q: &str, limit: i64) -> Result<Vec<SearchHit>> {
        let Some(fts_query) = fts_query(q) else {
            return Ok(Vec::new());
        };
        let rows = self.db.search_symbols(&fts_query, limit)?;
        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                symbol: row.symbol.into(),
                snippet: row.snippet,
            })
            .collect())
    }

    /// Symbols with a `calls` or `references` edge into `name`, distinct by
    /// source, best-ranked first.
    pub fn callers(&self, name: &str) -> Result<Vec<SymbolHit>> {
        Ok(self.db.callers_of(name)?.into_iter().map(Into::into).collect())
    }

    /// Symbols reachable by any edge from symbols matching `name`.
    pub fn dependencies(&self, name: &str) -> Result<Vec<SymbolHit>> {
        Ok(self
            .db
            .dependencies_of(name)?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    /// Full picture of one symbol: metadata, body, neighbors in both
    /// directions, and its same-file siblings in source order.
    pub fn context(&self, name: &str) -> Result<Option<ContextView>> {
        let Some((row, docstring, body)) = self.db.find_symbol(name)? else {
            return Ok(None);
        };
        let dependencies = self.db.edge_targets(row.id)?;
        let dependents = self.db.edge_sources(row.id)?;
        let siblings = self.db.siblings_of(row.id)?;
        Ok(Some(ContextView {
            symbol: row.into(),
            docstring,
            body,
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            dependents: dependents.into_iter().map(Into::into).collect(),
            siblings: siblings.into_iter().map(Into::into).collect(),
        }))
    }

    /// Reverse breadth-first traversal of the file-dependency graph: which
    /// files are affected, directly or transitively, by editing `file`.
    pub fn impact(&self, file: &str, max_depth: usize) -> Result<Vec<ImpactEntry>> {
        let Some(start) = self.db.file_id(file)? else {
            return Ok(Vec::new());
        };
        let symbol_counts = self.db.symbol_count_by_file()?;

        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(start);
        let mut queue: VecDeque<(i64, usize)> = VecDeque::new();
        queue.push_back((start, 0));
        let mut entries: Vec<ImpactEntry> = Vec::new();

        while let Some((file_id, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for (dep_id, dep_path) in self.db.dependent_files(file_id)? {
                if visited.insert(dep_id) {
                    entries.push(ImpactEntry {
                        file: dep_path,
                        depth: depth + 1,
                        symbol_count: symbol_counts.get(&dep_id).copied().unwrap_or(0),
                    });
                    queue.push_back((dep_id, depth + 1));
                }
            }
        }

        entries.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then(b.symbol_count.cmp(&a.symbol_count))
                .then(a.file.cmp(&b.file))
        });
        Ok(entries)
    }

    /// Top structural symbols by PageRank.
    pub fn rank(&self, top: i64) -> Result<Vec<RankEntry>> {
        Ok(self
            .db
            .top_ranked(top)?
            .into_iter()
            .map(|(row, in_degree, out_degree)| RankEntry {
                symbol: row.into(),
                in_degree,
                out_degree,
            })
            .collect())
    }

    /// Partition files by their first path segment and report per-module
    /// size and cross-module import targets.
    pub fn modules(&self) -> Result<Vec<ModuleInfo>> {
        let files = self.db.file_listing()?;
        let symbol_counts = self.db.symbol_count_by_file()?;

        let mut module_of: HashMap<i64, String> = HashMap::new();
        let mut aggregates: HashMap<String, (usize, i64)> = HashMap::new();
        for (file_id, path) in &files {
            let module = top_segment(path);
            module_of.insert(*file_id, module.clone());
            let entry = aggregates.entry(module).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += symbol_counts.get(file_id).copied().unwrap_or(0);
        }

        let mut deps: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (from_file, to_file) in self.db.all_file_deps()? {
            let (Some(from), Some(to)) = (module_of.get(&from_file), module_of.get(&to_file))
            else {
                continue;
            };
            if from != to {
                deps.entry(from.clone()).or_default().insert(to.clone());
            }
        }

        let mut modules: Vec<ModuleInfo> = aggregates
            .into_iter()
            .map(|(name, (file_count, symbol_count))| ModuleInfo {
                depends_on: deps
                    .get(&name)
                    .map(|s| s.iter().cloned().collect())
                    .unwrap_or_default(),
                name,
                file_count,
                symbol_count,
            })
            .collect();
        modules.sort_by(|a, b| {
            b.symbol_count
                .cmp(&a.symbol_count)
                .then(a.name.cmp(&b.name))
        });
        Ok(modules)
    }

    pub fn stats(&self) -> Result<StatsView> {
        let (files, symbols, edges, file_deps) = self.db.counts()?;
        Ok(StatsView {
            files,
            symbols,
            edges,
            file_deps,
        })
    }

    /// Human-readable project summary.
    pub fn brief(&self) -> Result<String> {
        let stats = self.stats()?;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Index: {} files, {} symbols, {} edges, {} file dependencies",
            stats.files, stats.symbols, stats.edges, stats.file_deps
        );

        let languages = self.db.language_histogram()?;
        if !languages.is_empty() {
            let listing = languages
                .iter()
                .map(|(lang, count)| format!("{lang} ({count})"))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "Languages: {listing}");
        }

        let modules = self.modules()?;
        if !modules.is_empty() {
            let _ = writeln!(out, "\nTop modules:");
            for module in modules.iter().take(8) {
                let _ = writeln!(
                    out,
                    "  {}: {} files, {} symbols",
                    module.name, module.file_count, module.symbol_count
                );
            }
        }

        let ranked = self.rank(10)?;
        if !ranked.is_empty() {
            let _ = writeln!(out, "\nTop symbols:");
            for (i, entry) in ranked.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  {}. {} ({}) {}:{}  rank {:.4}",
                    i + 1,
                    entry.symbol.name,
                    entry.symbol.kind,
                    entry.symbol.file,
                    entry.symbol.start_line,
                    entry.symbol.rank
                );
            }
        }

        Ok(out)
    }

    /// Human-readable pre-edit briefing for a file: what it exports, who
    /// depends on it, and what it imports.
    pub fn pre_edit(&self, file: &str) -> Result<String> {
        let Some(file_id) = self.db.file_id(file)? else {
            return Ok(format!("{file} is not in the index.\n"));
        };

        let mut out = String::new();
        let _ = writeln!(out, "File: {file}");

        let exported = self.db.exported_symbols_of_file(file_id)?;
        if exported.is_empty() {
            let _ = writeln!(out, "Exported symbols: none");
        } else {
            let _ = writeln!(out, "Exported symbols:");
            for sym in &exported {
                let _ = writeln!(
                    out,
                    "  - {} ({}) lines {}-{}",
                    sym.name, sym.kind, sym.start_line, sym.end_line
                );
            }
        }

        let dependents = self.db.dependent_files(file_id)?;
        if dependents.is_empty() {
            let _ = writeln!(out, "No files depend on it.");
        } else {
            let _ = writeln!(out, "Depended on by {} file(s):", dependents.len());
            for (_, path) in dependents.iter().take(15) {
                let _ = writeln!(out, "  - {path}");
            }
            if dependents.len() > 15 {
                let _ = writeln!(out, "  ... and {} more", dependents.len() - 15);
            }
        }

        let imports = self.db.imports_of(file_id)?;
        if imports.is_empty() {
            let _ = writeln!(out, "Imports: none");
        } else {
            let _ = writeln!(out, "Imports:");
            for (path, names) in &imports {
                let _ = writeln!(out, "  - {names} from {path}");
            }
        }

        Ok(out)
    }
}

/// Build an FTS5 match expression: non-word characters become spaces, each
/// token is quoted, and tokens are OR-joined. None for an effectively empty
/// query.
fn fts_query(q: &str) -> Option<String> {
    let cleaned: String = q
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    let tokens: Vec<String> = cleaned
        .split_whitespace()
        .map(|t| format!("\"{t}\""))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" OR "))
    }
}

fn top_segment(path: &str) -> String {
    match path.split_once('/') {
        Some((head, _)) => head.to_string(),
        None => ".".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fts_query_quotes_and_joins_tokens() {
        assert_eq!(fts_query("hello world"), Some("\"hello\" OR \"world\"".to_string()));
        assert_eq!(fts_query("foo.bar(baz)"), Some("\"foo\" OR \"bar\" OR \"baz\"".to_string()));
        assert_eq!(fts_query(""), None);
        assert_eq!(fts_query("!!!"), None);
    }

    #[test]
    fn top_segment_buckets_root_files_together() {
        assert_eq!(top_segment("src/a.ts"), "src");
        assert_eq!(top_segment("src/deep/b.ts"), "src");
        assert_eq!(top_segment("main.ts"), ".");
    }

    #[test]
    fn empty_store_yields_empty_results_everywhere() {
        let db = Database::open_in_memory().unwrap();
        let q = QueryEngine::new(&db);
        assert!(q.search("anything", 15).unwrap().is_empty());
        assert!(q.callers("foo").unwrap().is_empty());
        assert!(q.dependencies("foo").unwrap().is_empty());
        assert!(q.context("foo").unwrap().is_none());
        assert!(q.impact("a.ts", 10).unwrap().is_empty());
        assert!(q.rank(20).unwrap().is_empty());
        assert!(q.modules().unwrap().is_empty());
        let stats = q.stats().unwrap();
        assert_eq!(stats.files, 0);
    }

    #[test]
    fn impact_orders_by_depth_then_symbol_count() {
        let db = Database::open_in_memory().unwrap();
        let (core, _) = db.upsert_file("core.ts", Some("typescript"), "aaaa0000aaaa0000", 1).unwrap();
        let (big, _) = db.upsert_file("big.ts", Some("typescript"), "bbbb0000bbbb0000", 1).unwrap();
        let (small, _) = db.upsert_file("small.ts", Some("typescript"), "cccc0000cccc0000", 1).unwrap();
        let (far, _) = db.upsert_file("far.ts", Some("typescript"), "dddd0000dddd0000", 1).unwrap();

        for i in 0..3 {
            db.insert_symbol(big, &format!("b{i}"), None, "function", 1, 1, None, None, None, true)
                .unwrap();
        }
        db.insert_symbol(small, "s0", None, "function", 1, 1, None, None, None, true)
            .unwrap();

        db.insert_file_dep(big, core, "import", "x").unwrap();
        db.insert_file_dep(small, core, "import", "x").unwrap();
        db.insert_file_dep(far, big, "import", "x").unwrap();

        let q = QueryEngine::new(&db);
        let entries = q.impact("core.ts", 10).unwrap();
        assert_eq!(
            entries,
            vec![
                ImpactEntry { file: "big.ts".into(), depth: 1, symbol_count: 3 },
                ImpactEntry { file: "small.ts".into(), depth: 1, symbol_count: 1 },
                ImpactEntry { file: "far.ts".into(), depth: 2, symbol_count: 0 },
            ]
        );
    }

    #[test]
    fn impact_respects_max_depth() {
        let db = Database::open_in_memory().unwrap();
        let (a, _) = db.upsert_file("a.ts", Some("typescript"), "aaaa0000aaaa0000", 1).unwrap();
        let (b, _) = db.upsert_file("b.ts", Some("typescript"), "bbbb0000bbbb0000", 1).unwrap();
        let (c, _) = db.upsert_file("c.ts", Some("typescript"), "cccc0000cccc0000", 1).unwrap();
        db.insert_file_dep(b, a, "import", "x").unwrap();
        db.insert_file_dep(c, b, "import", "x").unwrap();

        let q = QueryEngine::new(&db);
        assert_eq!(q.impact("a.ts", 1).unwrap().len(), 1);
        assert_eq!(q.impact("a.ts", 2).unwrap().len(), 2);
    }

    #[test]
    fn modules_partition_and_cross_links() {
        let db = Database::open_in_memory().unwrap();
        let (app, _) = db.upsert_file("app/main.ts", Some("typescript"), "aaaa0000aaaa0000", 1).unwrap();
        let (lib, _) = db.upsert_file("lib/util.ts", Some("typescript"), "bbbb0000bbbb0000", 1).unwrap();
        let (root, _) = db.upsert_file("index.ts", Some("typescript"), "cccc0000cccc0000", 1).unwrap();
        db.insert_symbol(app, "main", None, "function", 1, 1, None, None, None, true).unwrap();
        db.insert_symbol(lib, "util", None, "function", 1, 1, None, None, None, true).unwrap();
        db.insert_symbol(lib, "util2", None, "function", 3, 3, None, None, None, true).unwrap();
        let _ = root;
        db.insert_file_dep(app, lib, "import", "util").unwrap();

        let q = QueryEngine::new(&db);
        let modules = q.modules().unwrap();
        assert_eq!(modules.len(), 3);
        assert_eq!(modules[0].name, "lib");
        assert_eq!(modules[0].symbol_count, 2);
        let app_mod = modules.iter().find(|m| m.name == "app").unwrap();
        assert_eq!(app_mod.depends_on, vec!["lib".to_string()]);
        assert!(modules.iter().any(|m| m.name == "."));
    }

    #[test]
    fn search_with_no_matching_tokens_is_empty() {
        let db = Database::open_in_memory().unwrap();
        let (f, _) = db.upsert_file("a.ts", Some("typescript"), "aaaa0000aaaa0000", 1).unwrap();
        db.insert_symbol(f, "alpha", None, "function", 1, 1, None, None, Some("function alpha() {}"), true)
            .unwrap();
        let q = QueryEngine::new(&db);
        assert!(q.search("hello world", 15).unwrap().is_empty());
        assert!(q.search("", 15).unwrap().is_empty());
        assert_eq!(q.search("alpha", 15).unwrap().len(), 1);
    }
}
