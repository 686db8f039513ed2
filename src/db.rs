use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

// ---------------------------------------------------------------------------
// Data structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FileRecord {
    pub id: i64,
    pub path: String,
    pub language: Option<String>,
    pub hash: String,
    pub line_count: i64,
    pub indexed_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: String,
    pub start_line: i64,
    pub end_line: i64,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub content: Option<String>,
    pub exported: bool,
}

/// A symbol row joined with its file path and PageRank score. The shape most
/// read operators hand back to the query engine.
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub id: i64,
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

/// One FTS hit: a [`SymbolRow`] plus the highlighted snippet of its content.
#[derive(Debug, Clone)]
pub struct SearchRow {
    pub symbol: SymbolRow,
    pub snippet: String,
}

#[derive(Debug, Clone)]
pub struct RankingRow {
    pub symbol_id: i64,
    pub rank: f64,
    pub in_degree: i64,
    pub out_degree: i64,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the index database under `<root>/.codex/index.db`.
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join(crate::CODEX_DIR);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join("index.db");
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -65536;
             PRAGMA temp_store = MEMORY;
             PRAGMA mmap_size = 268435456;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Execute `f` inside an IMMEDIATE transaction. Commits on Ok, rolls back on Err.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f() {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS files (
                id         INTEGER PRIMARY KEY,
                path       TEXT NOT NULL UNIQUE,
                language   TEXT,
                hash       TEXT NOT NULL,
                line_count INTEGER NOT NULL DEFAULT 0,
                indexed_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS symbols (
                id             INTEGER PRIMARY KEY,
                file_id        INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                name           TEXT NOT NULL,
                qualified_name TEXT,
                kind           TEXT NOT NULL,
                start_line     INTEGER NOT NULL,
                end_line       INTEGER NOT NULL,
                signature      TEXT,
                docstring      TEXT,
                content        TEXT,
                exported       INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS edges (
                id      INTEGER PRIMARY KEY,
                from_id INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                to_id   INTEGER NOT NULL REFERENCES symbols(id) ON DELETE CASCADE,
                kind    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS file_deps (
                id        INTEGER PRIMARY KEY,
                from_file INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                to_file   INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
                kind      TEXT NOT NULL,
                name      TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rankings (
                symbol_id  INTEGER PRIMARY KEY REFERENCES symbols(id) ON DELETE CASCADE,
                rank       REAL NOT NULL,
                in_degree  INTEGER NOT NULL,
                out_degree INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_symbols_file  ON symbols(file_id);
            CREATE INDEX IF NOT EXISTS idx_symbols_name  ON symbols(name);
            CREATE INDEX IF NOT EXISTS idx_symbols_qname ON symbols(qualified_name);
            CREATE INDEX IF NOT EXISTS idx_edges_from    ON edges(from_id);
            CREATE INDEX IF NOT EXISTS idx_edges_to      ON edges(to_id);
            CREATE INDEX IF NOT EXISTS idx_deps_from     ON file_deps(from_file);
            CREATE INDEX IF NOT EXISTS idx_deps_to       ON file_deps(to_file);

            CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_unique
                ON edges(from_id, to_id, kind);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_deps_unique
                ON file_deps(from_file, to_file, kind, name);
            ",
        )?;

        self.conn.execute_batch(
            "CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
                 name, qualified_name, signature, docstring, content,
                 content=symbols, content_rowid=id,
                 tokenize='porter unicode61'
             );",
        )?;

        // Keep the FTS projection in lockstep with the symbols table.
        self.conn.execute_batch(
            "
            CREATE TRIGGER IF NOT EXISTS symbols_fts_ai AFTER INSERT ON symbols BEGIN
                INSERT INTO symbols_fts(rowid, name, qualified_name, signature, docstring, content)
                VALUES (new.id, new.name, new.qualified_name, new.signature, new.docstring, new.content);
            END;

            CREATE TRIGGER IF NOT EXISTS symbols_fts_ad AFTER DELETE ON symbols BEGIN
                INSERT INTO symbols_fts(symbols_fts, rowid, name, qualified_name, signature, docstring, content)
                VALUES ('delete', old.id, old.name, old.qualified_name, old.signature, old.docstring, old.content);
            END;

            CREATE TRIGGER IF NOT EXISTS symbols_fts_au AFTER UPDATE ON symbols BEGIN
                INSERT INTO symbols_fts(symbols_fts, rowid, name, qualified_name, signature, docstring, content)
                VALUES ('delete', old.id, old.name, old.qualified_name, old.signature, old.docstring, old.content);
                INSERT INTO symbols_fts(rowid, name, qualified_name, signature, docstring, content)
                VALUES (new.id, new.name, new.qualified_name, new.signature, new.docstring, new.content);
            END;
            ",
        )?;

        Ok(())
    }

    // -----------------------------------------------------------------------
    // File operations
    // -----------------------------------------------------------------------

    /// Insert or update a file record. Returns `(file_id, changed)` where
    /// `changed` is true for new files and files whose digest differs from
    /// the stored one. Unchanged files are left untouched.
    pub fn upsert_file(
        &self,
        path: &str,
        language: Option<&str>,
        hash: &str,
        line_count: i64,
    ) -> Result<(i64, bool)> {
        let existing: Option<(i64, String)> = self
            .conn
            .query_row(
                "SELECT id, hash FROM files WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match existing {
            Some((id, old_hash)) if old_hash == hash => Ok((id, false)),
            Some((id, _)) => {
                self.conn.execute(
                    "UPDATE files SET language = ?1, hash = ?2, line_count = ?3,
                                      indexed_at = datetime('now')
                     WHERE id = ?4",
                    params![language, hash, line_count, id],
                )?;
                Ok((id, true))
            }
            None => {
                self.conn.execute(
                    "INSERT INTO files (path, language, hash, line_count)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![path, language, hash, line_count],
                )?;
                Ok((self.conn.last_insert_rowid(), true))
            }
        }
    }

    pub fn get_file(&self, path: &str) -> Result<Option<FileRecord>> {
        let r = self
            .conn
            .query_row(
                "SELECT id, path, language, hash, line_count, indexed_at
                 FROM files WHERE path = ?1",
                params![path],
                |row| {
                    Ok(FileRecord {
                        id: row.get(0)?,
                        path: row.get(1)?,
                        language: row.get(2)?,
                        hash: row.get(3)?,
                        line_count: row.get(4)?,
                        indexed_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(r)
    }

    pub fn file_id(&self, path: &str) -> Result<Option<i64>> {
        let r = self
            .conn
            .query_row("SELECT id FROM files WHERE path = ?1", params![path], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(r)
    }

    /// Delete a file's derived data: rankings of its symbols, edges touching
    /// its symbols from either end, the symbols themselves (the FTS delete
    /// trigger keeps the projection consistent), and its outgoing file-deps.
    /// Incoming file-deps stay until the other endpoint is removed or
    /// reinserted.
    pub fn clear_file_data(&self, file_id: i64) -> Result<()> {
        self.conn.execute(
            "DELETE FROM rankings WHERE symbol_id IN (SELECT id FROM symbols WHERE file_id = ?1)",
            params![file_id],
        )?;
        self.conn.execute(
            "DELETE FROM edges WHERE from_id IN (SELECT id FROM symbols WHERE file_id = ?1)",
            params![file_id],
        )?;
        self.conn.execute(
            "DELETE FROM edges WHERE to_id IN (SELECT id FROM symbols WHERE file_id = ?1)",
            params![file_id],
        )?;
        self.conn
            .execute("DELETE FROM symbols WHERE file_id = ?1", params![file_id])?;
        self.conn
            .execute("DELETE FROM file_deps WHERE from_file = ?1", params![file_id])?;
        Ok(())
    }

    /// Remove a file and everything rooted at it.
    /// Returns true if a file record was actually deleted.
    pub fn remove_file(&self, path: &str) -> Result<bool> {
        let file_id = match self.file_id(path)? {
            Some(id) => id,
            None => return Ok(false),
        };
        self.clear_file_data(file_id)?;
        // Incoming file-deps go with the row via the cascading foreign key.
        self.conn
            .execute("DELETE FROM files WHERE id = ?1", params![file_id])?;
        Ok(true)
    }

    /// Delete every file whose path is not in `live`, cascading symbols,
    /// edges, file-deps and rankings. Returns the number of files removed.
    pub fn remove_stale(&self, live: &HashSet<String>) -> Result<usize> {
        let all: Vec<(i64, String)> = {
            let mut stmt = self.conn.prepare_cached("SELECT id, path FROM files")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };
        let mut removed = 0;
        for (id, path) in all {
            if !live.contains(&path) {
                self.clear_file_data(id)?;
                self.conn
                    .execute("DELETE FROM files WHERE id = ?1", params![id])?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Symbol operations
    // -----------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_symbol(
        &self,
        file_id: i64,
        name: &str,
        qualified_name: Option<&str>,
        kind: &str,
        start_line: i64,
        end_line: i64,
        signature: Option<&str>,
        docstring: Option<&str>,
        content: Option<&str>,
        exported: bool,
    ) -> Result<i64> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO symbols (file_id, name, qualified_name, kind, start_line, end_line,
                                  signature, docstring, content, exported)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        stmt.execute(params![
            file_id,
            name,
            qualified_name,
            kind,
            start_line,
            end_line,
            signature,
            docstring,
            content,
            exported
        ])?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Symbols of a file ordered by starting line.
    pub fn symbols_by_file(&self, file_id: i64) -> Result<Vec<Symbol>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, file_id, name, qualified_name, kind, start_line, end_line,
                    signature, docstring, content, exported
             FROM symbols WHERE file_id = ?1 ORDER BY start_line",
        )?;
        let rows = stmt.query_map(params![file_id], Self::row_to_symbol)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// `(name, qualified_name, id, exported)` tuples for a file's symbols.
    /// Used to rebuild in-memory symbol tables without hauling bodies around.
    pub fn symbol_names_by_file(
        &self,
        file_id: i64,
    ) -> Result<Vec<(String, Option<String>, i64, bool)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT name, qualified_name, id, exported FROM symbols WHERE file_id = ?1",
        )?;
        let rows = stmt.query_map(params![file_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn row_to_symbol(row: &rusqlite::Row) -> rusqlite::Result<Symbol> {
        Ok(Symbol {
            id: row.get(0)?,
            file_id: row.get(1)?,
            name: row.get(2)?,
            qualified_name: row.get(3)?,
            kind: row.get(4)?,
            start_line: row.get(5)?,
            end_line: row.get(6)?,
            signature: row.get(7)?,
            docstring: row.get(8)?,
            content: row.get(9)?,
            exported: row.get(10)?,
        })
    }

    fn row_to_symbol_row(row: &rusqlite::Row) -> rusqlite::Result<SymbolRow> {
        Ok(SymbolRow {
            id: row.get(0)?,
            name: row.get(1)?,
            qualified_name: row.get(2)?,
            kind: row.get(3)?,
            file: row.get(4)?,
            start_line: row.get(5)?,
            end_line: row.get(6)?,
            signature: row.get(7)?,
            exported: row.get(8)?,
            rank: row.get(9)?,
        })
    }

    /// Best match for a name: prefers exported symbols, then PageRank.
    /// Matches either the plain or the qualified name. Also returns the
    /// docstring and body for the context operator.
    pub fn find_symbol(
        &self,
        name: &str,
    ) -> Result<Option<(SymbolRow, Option<String>, Option<String>)>> {
        let r = self
            .conn
            .query_row(
                "SELECT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line, s.end_line,
                        s.signature, s.exported, COALESCE(r.rank, 0.0), s.docstring, s.content
                 FROM symbols s
                 JOIN files f ON f.id = s.file_id
                 LEFT JOIN rankings r ON r.symbol_id = s.id
                 WHERE s.name = ?1 OR s.qualified_name = ?1
                 ORDER BY s.exported DESC, COALESCE(r.rank, 0.0) DESC
                 LIMIT 1",
                params![name],
                |row| Ok((Self::row_to_symbol_row(row)?, row.get(10)?, row.get(11)?)),
            )
            .optional()?;
        Ok(r)
    }

    /// Exported symbols of a file ordered by starting line.
    pub fn exported_symbols_of_file(&self, file_id: i64) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line, s.end_line,
                    s.signature, s.exported, COALESCE(r.rank, 0.0)
             FROM symbols s
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE s.file_id = ?1 AND s.exported = 1
             ORDER BY s.start_line",
        )?;
        let rows = stmt.query_map(params![file_id], Self::row_to_symbol_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Edge & file-dep operations
    // -----------------------------------------------------------------------

    /// Insert an edge, ignoring duplicates of the (from, to, kind) triple.
    pub fn insert_edge(&self, from_id: i64, to_id: i64, kind: &str) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO edges (from_id, to_id, kind) VALUES (?1, ?2, ?3)",
        )?;
        stmt.execute(params![from_id, to_id, kind])?;
        Ok(())
    }

    /// Insert a file dependency, ignoring duplicates of the full quadruple.
    pub fn insert_file_dep(
        &self,
        from_file: i64,
        to_file: i64,
        kind: &str,
        name: &str,
    ) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO file_deps (from_file, to_file, kind, name)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        stmt.execute(params![from_file, to_file, kind, name])?;
        Ok(())
    }

    /// Sources of `calls`/`references` edges into any symbol matching `name`,
    /// distinct by source symbol, ordered by source PageRank.
    pub fn callers_of(&self, name: &str) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line,
                             s.end_line, s.signature, s.exported, COALESCE(r.rank, 0.0) AS pagerank
             FROM edges e
             JOIN symbols t ON t.id = e.to_id
             JOIN symbols s ON s.id = e.from_id
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE e.kind IN ('calls', 'references')
               AND (t.name = ?1 OR t.qualified_name = ?1)
             ORDER BY pagerank DESC",
        )?;
        let rows = stmt.query_map(params![name], Self::row_to_symbol_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Targets of any edge out of any symbol matching `name`, distinct,
    /// ordered by target PageRank.
    pub fn dependencies_of(&self, name: &str) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT t.id, t.name, t.qualified_name, t.kind, f.path, t.start_line,
                             t.end_line, t.signature, t.exported, COALESCE(r.rank, 0.0) AS pagerank
             FROM edges e
             JOIN symbols s ON s.id = e.from_id
             JOIN symbols t ON t.id = e.to_id
             JOIN files f ON f.id = t.file_id
             LEFT JOIN rankings r ON r.symbol_id = t.id
             WHERE s.name = ?1 OR s.qualified_name = ?1
             ORDER BY pagerank DESC",
        )?;
        let rows = stmt.query_map(params![name], Self::row_to_symbol_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Outgoing edge targets of a symbol id, highest-ranked first.
    pub fn edge_targets(&self, symbol_id: i64) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line, s.end_line,
                    s.signature, s.exported, COALESCE(r.rank, 0.0) AS pagerank
             FROM edges e
             JOIN symbols s ON s.id = e.to_id
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE e.from_id = ?1
             ORDER BY pagerank DESC",
        )?;
        let rows = stmt.query_map(params![symbol_id], Self::row_to_symbol_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Incoming edge sources of a symbol id, highest-ranked first.
    pub fn edge_sources(&self, symbol_id: i64) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line, s.end_line,
                    s.signature, s.exported, COALESCE(r.rank, 0.0) AS pagerank
             FROM edges e
             JOIN symbols s ON s.id = e.from_id
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE e.to_id = ?1
             ORDER BY pagerank DESC",
        )?;
        let rows = stmt.query_map(params![symbol_id], Self::row_to_symbol_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Same-file siblings of a symbol, ordered by starting line.
    pub fn siblings_of(&self, symbol_id: i64) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line, s.end_line,
                    s.signature, s.exported, COALESCE(r.rank, 0.0)
             FROM symbols s
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE s.file_id = (SELECT file_id FROM symbols WHERE id = ?1)
               AND s.id != ?1
             ORDER BY s.start_line",
        )?;
        let rows = stmt.query_map(params![symbol_id], Self::row_to_symbol_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Files with a file-dep into `file_id`: `(file_id, path)` pairs.
    pub fn dependent_files(&self, file_id: i64) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT DISTINCT f.id, f.path
             FROM file_deps d
             JOIN files f ON f.id = d.from_file
             WHERE d.to_file = ?1
             ORDER BY f.path",
        )?;
        let rows = stmt.query_map(params![file_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Outgoing file-deps of `file_id`: `(target path, import name)` pairs.
    pub fn imports_of(&self, file_id: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT f.path, d.name
             FROM file_deps d
             JOIN files f ON f.id = d.to_file
             WHERE d.from_file = ?1
             ORDER BY f.path",
        )?;
        let rows = stmt.query_map(params![file_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// All file-deps as `(from_file, to_file)` id pairs.
    pub fn all_file_deps(&self) -> Result<Vec<(i64, i64)>> {
        let mut stmt = self.conn.prepare_cached("SELECT from_file, to_file FROM file_deps")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn symbol_count_by_file(&self) -> Result<HashMap<i64, i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT file_id, COUNT(*) FROM symbols GROUP BY file_id")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut map = HashMap::new();
        for r in rows {
            let (file_id, count) = r?;
            map.insert(file_id, count);
        }
        Ok(map)
    }

    /// `(file_id, path)` for every indexed file.
    pub fn file_listing(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare_cached("SELECT id, path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Rankings & graph export
    // -----------------------------------------------------------------------

    pub fn all_symbol_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare_cached("SELECT id FROM symbols")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// All edges as `(from_id, to_id)` pairs, every kind.
    pub fn all_edges(&self) -> Result<Vec<(i64, i64)>> {
        let mut stmt = self.conn.prepare_cached("SELECT from_id, to_id FROM edges")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Replace the entire rankings table with a fresh generation.
    pub fn replace_rankings(&self, rows: &[RankingRow]) -> Result<()> {
        self.conn.execute("DELETE FROM rankings", [])?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO rankings (symbol_id, rank, in_degree, out_degree)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for row in rows {
            stmt.execute(params![row.symbol_id, row.rank, row.in_degree, row.out_degree])?;
        }
        Ok(())
    }

    pub fn ranking_sum(&self) -> Result<f64> {
        let sum: f64 = self
            .conn
            .query_row("SELECT COALESCE(SUM(rank), 0.0) FROM rankings", [], |row| {
                row.get(0)
            })?;
        Ok(sum)
    }

    /// Top symbols by PageRank restricted to the structural kinds, with
    /// their in/out degrees.
    pub fn top_ranked(&self, top: i64) -> Result<Vec<(SymbolRow, i64, i64)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line, s.end_line,
                    s.signature, s.exported, r.rank, r.in_degree, r.out_degree
             FROM rankings r
             JOIN symbols s ON s.id = r.symbol_id
             JOIN files f ON f.id = s.file_id
             WHERE s.kind IN ('function', 'class', 'method', 'interface', 'type')
             ORDER BY r.rank DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![top], |row| {
            Ok((Self::row_to_symbol_row(row)?, row.get(10)?, row.get(11)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // FTS search
    // -----------------------------------------------------------------------

    /// Execute a prepared FTS5 match expression over the symbol projection.
    /// Ordered by PageRank descending, then FTS relevance (bm25 ascending).
    /// The snippet highlights the `content` column with `>>>`/`<<<` markers.
    pub fn search_symbols(&self, fts_query: &str, limit: i64) -> Result<Vec<SearchRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.name, s.qualified_name, s.kind, f.path, s.start_line, s.end_line,
                    s.signature, s.exported, COALESCE(r.rank, 0.0) AS pagerank,
                    snippet(symbols_fts, 4, '>>>', '<<<', '...', 30)
             FROM symbols_fts
             JOIN symbols s ON s.id = symbols_fts.rowid
             JOIN files f ON f.id = s.file_id
             LEFT JOIN rankings r ON r.symbol_id = s.id
             WHERE symbols_fts MATCH ?1
             ORDER BY pagerank DESC, symbols_fts.rank ASC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![fts_query, limit], |row| {
            Ok(SearchRow {
                symbol: Self::row_to_symbol_row(row)?,
                snippet: row.get(10)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Statistics
    // -----------------------------------------------------------------------

    pub fn counts(&self) -> Result<(i64, i64, i64, i64)> {
        let files: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        let symbols: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM symbols", [], |row| row.get(0))?;
        let edges: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        let file_deps: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM file_deps", [], |row| row.get(0))?;
        Ok((files, symbols, edges, file_deps))
    }

    pub fn language_histogram(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT language, COUNT(*) FROM files
             WHERE language IS NOT NULL
             GROUP BY language ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Flush the WAL into the main database file. Called on server shutdown.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_file(db: &Database, path: &str) -> i64 {
        let (id, changed) = db
            .upsert_file(path, Some("typescript"), "aaaa111122223333", 10)
            .unwrap();
        assert!(changed);
        id
    }

    fn seed_symbol(db: &Database, file_id: i64, name: &str, exported: bool) -> i64 {
        db.insert_symbol(
            file_id,
            name,
            None,
            "function",
            1,
            3,
            Some(&format!("function {name}()")),
            None,
            Some(&format!("function {name}() {{}}")),
            exported,
        )
        .unwrap()
    }

    #[test]
    fn upsert_file_reports_change_only_on_new_digest() {
        let db = Database::open_in_memory().unwrap();
        let (id1, changed1) = db
            .upsert_file("a.ts", Some("typescript"), "0123456789abcdef", 5)
            .unwrap();
        assert!(changed1);
        let (id2, changed2) = db
            .upsert_file("a.ts", Some("typescript"), "0123456789abcdef", 5)
            .unwrap();
        assert_eq!(id1, id2);
        assert!(!changed2);
        let (id3, changed3) = db
            .upsert_file("a.ts", Some("typescript"), "fedcba9876543210", 6)
            .unwrap();
        assert_eq!(id1, id3);
        assert!(changed3);
    }

    #[test]
    fn clear_file_data_removes_symbols_edges_and_outgoing_deps() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        let fb = seed_file(&db, "b.ts");
        let sa = seed_symbol(&db, fa, "foo", true);
        let sb = seed_symbol(&db, fb, "bar", true);
        db.insert_edge(sa, sb, "references").unwrap();
        db.insert_file_dep(fa, fb, "import", "bar").unwrap();
        db.insert_file_dep(fb, fa, "import", "foo").unwrap();

        db.clear_file_data(fa).unwrap();

        let (files, symbols, edges, deps) = db.counts().unwrap();
        assert_eq!(files, 2);
        assert_eq!(symbols, 1);
        assert_eq!(edges, 0);
        // a.ts's outgoing dep is gone; b.ts -> a.ts survives until either
        // endpoint is removed
        assert_eq!(deps, 1);
    }

    #[test]
    fn remove_file_cascades_incoming_deps_and_edges() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        let fb = seed_file(&db, "b.ts");
        let sa = seed_symbol(&db, fa, "foo", true);
        let sb = seed_symbol(&db, fb, "bar", true);
        db.insert_edge(sa, sb, "references").unwrap();
        db.insert_file_dep(fa, fb, "import", "bar").unwrap();

        assert!(db.remove_file("b.ts").unwrap());

        let (files, symbols, edges, deps) = db.counts().unwrap();
        assert_eq!(files, 1);
        assert_eq!(symbols, 1);
        assert_eq!(edges, 0);
        assert_eq!(deps, 0);
    }

    #[test]
    fn remove_stale_with_empty_set_empties_the_store() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        seed_symbol(&db, fa, "foo", true);
        let removed = db.remove_stale(&HashSet::new()).unwrap();
        assert_eq!(removed, 1);
        let counts = db.counts().unwrap();
        assert_eq!(counts, (0, 0, 0, 0));
    }

    #[test]
    fn edge_uniqueness_is_enforced() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        let s1 = seed_symbol(&db, fa, "f", true);
        let s2 = seed_symbol(&db, fa, "g", true);
        db.insert_edge(s1, s2, "calls").unwrap();
        db.insert_edge(s1, s2, "calls").unwrap();
        let (_, _, edges, _) = db.counts().unwrap();
        assert_eq!(edges, 1);
    }

    #[test]
    fn fts_projection_tracks_symbol_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        seed_symbol(&db, fa, "computeTotals", true);

        let hits = db.search_symbols("\"computeTotals\"", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].symbol.name, "computeTotals");

        db.clear_file_data(fa).unwrap();
        let hits = db.search_symbols("\"computeTotals\"", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn find_symbol_prefers_exported_then_rank() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        let hidden = seed_symbol(&db, fa, "dup", false);
        let public = seed_symbol(&db, fa, "dup", true);
        db.replace_rankings(&[
            RankingRow { symbol_id: hidden, rank: 0.9, in_degree: 1, out_degree: 0 },
            RankingRow { symbol_id: public, rank: 0.1, in_degree: 0, out_degree: 0 },
        ])
        .unwrap();
        let (row, _, _) = db.find_symbol("dup").unwrap().unwrap();
        assert_eq!(row.id, public);
    }

    #[test]
    fn callers_cover_calls_and_references() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        let fb = seed_file(&db, "b.ts");
        let foo = seed_symbol(&db, fa, "foo", true);
        let baz = seed_symbol(&db, fa, "baz", true);
        let bar = seed_symbol(&db, fb, "bar", true);
        db.insert_edge(foo, bar, "references").unwrap();
        db.insert_edge(baz, bar, "calls").unwrap();

        let callers = db.callers_of("bar").unwrap();
        let names: Vec<_> = callers.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(callers.len(), 2);
        assert!(names.contains(&"foo") && names.contains(&"baz"));
    }

    #[test]
    fn qualified_name_matches_in_lookups() {
        let db = Database::open_in_memory().unwrap();
        let fa = seed_file(&db, "a.ts");
        db.insert_symbol(
            fa,
            "render",
            Some("Widget.render"),
            "method",
            5,
            9,
            Some("render()"),
            None,
            None,
            false,
        )
        .unwrap();
        let (row, _, _) = db.find_symbol("Widget.render").unwrap().unwrap();
        assert_eq!(row.name, "render");
        assert_eq!(row.qualified_name.as_deref(), Some("Widget.render"));
    }
}
