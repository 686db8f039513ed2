use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::collector;
use crate::db::Database;
use crate::parser::{Lang, ParsedFile, Parser};
use crate::rank;
use crate::resolver;

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub symbols: usize,
    pub edges: usize,
    pub file_deps: usize,
}

/// In-memory symbol table for one file, built during the first pass.
/// `by_name` keys both plain and qualified names; `exported` is the view the
/// cross-file pass resolves imported names against.
#[derive(Default)]
struct SymbolTable {
    ids: Vec<i64>,
    by_name: HashMap<String, i64>,
    exported: HashMap<String, i64>,
}

impl SymbolTable {
    fn record(&mut self, name: &str, qualified: Option<&str>, id: i64, exported: bool) {
        self.by_name.entry(name.to_string()).or_insert(id);
        if let Some(q) = qualified {
            self.by_name.entry(q.to_string()).or_insert(id);
        }
        if exported {
            self.exported.entry(name.to_string()).or_insert(id);
            if let Some(q) = qualified {
                self.exported.entry(q.to_string()).or_insert(id);
            }
        }
    }
}

/// A re-parsed file whose imports and calls still need edge creation.
struct PendingFile {
    file_id: i64,
    rel: String,
    parsed: ParsedFile,
}

pub struct Indexer<'a> {
    db: &'a Database,
    parser: Parser,
}

impl<'a> Indexer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            parser: Parser::new(),
        }
    }

    /// Full project index. Collecting, parsing changed files, rebuilding
    /// edges and file-deps, pruning stale files and resolving cross-file
    /// references all happen in one transaction; PageRank runs in a second.
    pub fn index_project(&mut self, root: &Path) -> Result<IndexStats> {
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {}", root.display()))?;
        let paths = collector::collect(&root)?;
        let live: HashSet<String> = paths.iter().cloned().collect();

        let db = self.db;
        let parser = &mut self.parser;
        let stats = db.with_transaction(|| {
            let mut stats = IndexStats::default();
            let mut tables: HashMap<i64, SymbolTable> = HashMap::new();
            let mut pending: Vec<PendingFile> = Vec::new();

            for rel in &paths {
                let bytes = match std::fs::read(root.join(rel)) {
                    Ok(b) => b,
                    Err(err) => {
                        debug!(path = %rel, error = %err, "skipping unreadable file");
                        stats.files_skipped += 1;
                        continue;
                    }
                };
                let hash = digest16(&bytes);
                let text = String::from_utf8_lossy(&bytes);
                let line_count = text.lines().count() as i64;
                let lang = Lang::from_path(rel);

                let (file_id, changed) =
                    db.upsert_file(rel, lang.map(|l| l.as_str()), &hash, line_count)?;

                if !changed {
                    // Unchanged files keep their stored symbols; only the
                    // exported view is needed for cross-file resolution.
                    let mut table = SymbolTable::default();
                    for (name, qualified, id, exported) in db.symbol_names_by_file(file_id)? {
                        if exported {
                            table.record(&name, qualified.as_deref(), id, true);
                        }
                    }
                    tables.insert(file_id, table);
                    stats.files_skipped += 1;
                    continue;
                }

                db.clear_file_data(file_id)?;
                let (parsed, _) = parser.parse(rel, &text);

                let mut table = SymbolTable::default();
                for sym in &parsed.symbols {
                    let id = db.insert_symbol(
                        file_id,
                        &sym.name,
                        sym.qualified_name.as_deref(),
                        sym.kind.as_str(),
                        sym.start_line as i64,
                        sym.end_line as i64,
                        sym.signature.as_deref(),
                        sym.docstring.as_deref(),
                        sym.body.as_deref(),
                        sym.exported,
                    )?;
                    table.ids.push(id);
                    table.record(&sym.name, sym.qualified_name.as_deref(), id, sym.exported);
                    stats.symbols += 1;
                }
                tables.insert(file_id, table);
                pending.push(PendingFile {
                    file_id,
                    rel: rel.clone(),
                    parsed,
                });
                stats.files_indexed += 1;
            }

            // File-deps and intra-file call edges for every re-parsed file.
            // Imports resolved here are remembered for the cross-file pass.
            let mut resolved: Vec<(i64, i64, Vec<String>)> = Vec::new();
            for pf in &pending {
                let table = &tables[&pf.file_id];
                for import in &pf.parsed.imports {
                    let Some(target_rel) = resolver::resolve(&root, &pf.rel, &import.source)
                    else {
                        continue;
                    };
                    let Some(to_file) = db.file_id(&target_rel)? else {
                        continue;
                    };
                    let dep_name = if import.names.is_empty() {
                        "*".to_string()
                    } else {
                        import.names.join(",")
                    };
                    db.insert_file_dep(pf.file_id, to_file, "import", &dep_name)?;
                    stats.file_deps += 1;
                    resolved.push((pf.file_id, to_file, import.names.clone()));
                }
                for call in &pf.parsed.calls {
                    let (Some(&from), Some(&to)) =
                        (table.by_name.get(&call.caller), table.by_name.get(&call.callee))
                    else {
                        continue;
                    };
                    if from != to {
                        db.insert_edge(from, to, "calls")?;
                        stats.edges += 1;
                    }
                }
            }

            stats.files_removed = db.remove_stale(&live)?;

            // Cross-file pass: each imported name that resolves to an
            // exported symbol gets a `references` edge from every symbol in
            // the importing file. Deliberately coarse: it encodes "this
            // file uses X", and the edge uniqueness constraint absorbs the
            // duplicates.
            for (from_file, to_file, names) in &resolved {
                let Some(target_table) = tables.get(to_file) else {
                    continue;
                };
                let Some(source_table) = tables.get(from_file) else {
                    continue;
                };
                for name in names {
                    let Some(&target_id) = target_table.exported.get(name) else {
                        continue;
                    };
                    for &sym_id in &source_table.ids {
                        if sym_id != target_id {
                            db.insert_edge(sym_id, target_id, "references")?;
                            stats.edges += 1;
                        }
                    }
                }
            }

            Ok(stats)
        })?;

        rank::recompute(db)?;
        Ok(stats)
    }

    /// Incremental path for a single file. A missing file is removed from
    /// the index; an unchanged digest is a no-op. Cross-file resolution and
    /// PageRank are deferred to the next full `index_project`.
    /// Returns true when the index was modified.
    pub fn reindex_file(&mut self, root: &Path, rel: &str) -> Result<bool> {
        if !collector::has_supported_extension(Path::new(rel)) {
            return Ok(false);
        }
        let root = root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {}", root.display()))?;
        let abs = root.join(rel);

        if !abs.exists() {
            return self.db.with_transaction(|| self.db.remove_file(rel));
        }

        let bytes = std::fs::read(&abs).with_context(|| format!("failed to read {rel}"))?;
        let hash = digest16(&bytes);
        if let Some(existing) = self.db.get_file(rel)? {
            if existing.hash == hash {
                return Ok(false);
            }
        }

        let text = String::from_utf8_lossy(&bytes);
        let line_count = text.lines().count() as i64;
        let lang = Lang::from_path(rel);
        // Parsing is pure computation; keep it outside the transaction.
        let (parsed, _) = self.parser.parse(rel, &text);

        let db = self.db;
        db.with_transaction(|| {
            let (file_id, changed) =
                db.upsert_file(rel, lang.map(|l| l.as_str()), &hash, line_count)?;
            if !changed {
                return Ok(false);
            }
            db.clear_file_data(file_id)?;

            let mut table = SymbolTable::default();
            for sym in &parsed.symbols {
                let id = db.insert_symbol(
                    file_id,
                    &sym.name,
                    sym.qualified_name.as_deref(),
                    sym.kind.as_str(),
                    sym.start_line as i64,
                    sym.end_line as i64,
                    sym.signature.as_deref(),
                    sym.docstring.as_deref(),
                    sym.body.as_deref(),
                    sym.exported,
                )?;
                table.ids.push(id);
                table.record(&sym.name, sym.qualified_name.as_deref(), id, sym.exported);
            }

            for import in &parsed.imports {
                let Some(target_rel) = resolver::resolve(&root, rel, &import.source) else {
                    continue;
                };
                let Some(to_file) = db.file_id(&target_rel)? else {
                    continue;
                };
                let dep_name = if import.names.is_empty() {
                    "*".to_string()
                } else {
                    import.names.join(",")
                };
                db.insert_file_dep(file_id, to_file, "import", &dep_name)?;
            }

            for call in &parsed.calls {
                let (Some(&from), Some(&to)) =
                    (table.by_name.get(&call.caller), table.by_name.get(&call.callee))
                else {
                    continue;
                };
                if from != to {
                    db.insert_edge(from, to, "calls")?;
                }
            }

            Ok(true)
        })
    }
}

/// 16-hex-character prefix of the SHA-256 of the file bytes.
fn digest16(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn digest_is_sixteen_hex_chars() {
        let d = digest16(b"hello");
        assert_eq!(d.len(), 16);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(d, digest16(b"hello"));
        assert_ne!(d, digest16(b"hello!"));
    }

    #[test]
    fn second_run_over_unchanged_tree_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.ts", "export function foo() {}\n");
        write(tmp.path(), "b.ts", "export function bar() {}\n");

        let db = Database::open(tmp.path()).unwrap();
        let mut indexer = Indexer::new(&db);

        let first = indexer.index_project(tmp.path()).unwrap();
        assert_eq!(first.files_indexed, 2);
        assert_eq!(first.symbols, 2);

        let second = indexer.index_project(tmp.path()).unwrap();
        assert_eq!(second.files_indexed, 0);
        assert_eq!(second.files_skipped, 2);

        // symbols survived the no-op run
        let (_, symbols, _, _) = db.counts().unwrap();
        assert_eq!(symbols, 2);
    }

    #[test]
    fn reindex_file_removes_missing_files() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.ts", "export function foo() {}\n");

        let db = Database::open(tmp.path()).unwrap();
        let mut indexer = Indexer::new(&db);
        indexer.index_project(tmp.path()).unwrap();

        fs::remove_file(tmp.path().join("a.ts")).unwrap();
        assert!(indexer.reindex_file(tmp.path(), "a.ts").unwrap());

        let (files, symbols, _, _) = db.counts().unwrap();
        assert_eq!((files, symbols), (0, 0));
    }

    #[test]
    fn reindex_file_is_a_noop_for_unchanged_content() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.ts", "export function foo() {}\n");

        let db = Database::open(tmp.path()).unwrap();
        let mut indexer = Indexer::new(&db);
        indexer.index_project(tmp.path()).unwrap();

        assert!(!indexer.reindex_file(tmp.path(), "a.ts").unwrap());

        write(tmp.path(), "a.ts", "export function foo() {}\nexport function extra() {}\n");
        assert!(indexer.reindex_file(tmp.path(), "a.ts").unwrap());
        let (_, symbols, _, _) = db.counts().unwrap();
        assert_eq!(symbols, 2);
    }

    #[test]
    fn zero_symbol_files_still_join_the_file_graph() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "config.json", "{\"a\": 1}\n");
        write(tmp.path(), "a.ts", "import cfg from './config.json';\nexport function f() {}\n");

        let db = Database::open(tmp.path()).unwrap();
        let mut indexer = Indexer::new(&db);
        indexer.index_project(tmp.path()).unwrap();

        let (files, _, _, deps) = db.counts().unwrap();
        assert_eq!(files, 2);
        assert_eq!(deps, 1);
    }
}
