//! End-to-end indexing scenarios over real temp directories.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use codex_index::db::Database;
use codex_index::indexer::Indexer;
use codex_index::query::QueryEngine;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn index(root: &Path, db: &Database) {
    Indexer::new(db).index_project(root).unwrap();
}

#[test]
fn two_files_without_imports_share_no_edges() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.ts", "export function foo(){ bar(); }\n");
    write(tmp.path(), "b.ts", "export function bar(){}\n");

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    let q = QueryEngine::new(&db);
    let stats = q.stats().unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.symbols, 2);
    // bar is not in a.ts's symbol table and nothing is imported, so the
    // call inside foo resolves to nothing
    assert_eq!(stats.edges, 0);

    // foo's body mentions bar too, so bar must win on relevance
    let hits = q.search("bar", 15).unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].symbol.name, "bar");
    assert!(hits[0].symbol.exported);

    let foo = q.context("foo").unwrap().unwrap();
    assert!(foo.symbol.exported);
    assert_eq!(foo.symbol.file, "a.ts");
    assert_eq!(foo.symbol.start_line, 1);
}

#[test]
fn importing_a_symbol_creates_dep_and_reference_edge() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.ts", "export function foo(){ bar(); }\n");
    write(tmp.path(), "b.ts", "export function bar(){}\n");

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    // a.ts now imports bar; b.ts is untouched and will be digest-skipped
    write(
        tmp.path(),
        "a.ts",
        "import { bar } from './b';\nexport function foo(){ bar(); }\n",
    );
    index(tmp.path(), &db);

    let q = QueryEngine::new(&db);
    let stats = q.stats().unwrap();
    assert_eq!(stats.file_deps, 1);
    assert_eq!(stats.edges, 1);

    let fa = db.file_id("a.ts").unwrap().unwrap();
    let imports = db.imports_of(fa).unwrap();
    assert_eq!(imports, vec![("b.ts".to_string(), "bar".to_string())]);

    let callers = q.callers("bar").unwrap();
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].name, "foo");
}

#[test]
fn same_file_calls_become_call_edges() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "a.ts",
        "export function f(){ g(); }\nexport function g(){}\n",
    );

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    let q = QueryEngine::new(&db);
    assert_eq!(q.stats().unwrap().edges, 1);

    let deps = q.dependencies("f").unwrap();
    assert_eq!(deps.len(), 1);
    assert_eq!(deps[0].name, "g");

    let callers = q.callers("g").unwrap();
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].name, "f");
}

#[test]
fn deleting_a_file_cascades_through_the_graph() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "a.ts",
        "import { bar } from './b';\nexport function foo(){ bar(); }\n",
    );
    write(tmp.path(), "b.ts", "export function bar(){}\n");

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);
    assert_eq!(QueryEngine::new(&db).stats().unwrap().edges, 1);

    fs::remove_file(tmp.path().join("b.ts")).unwrap();
    index(tmp.path(), &db);

    let q = QueryEngine::new(&db);
    let stats = q.stats().unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.symbols, 1);
    assert_eq!(stats.edges, 0);
    assert_eq!(stats.file_deps, 0);
    assert!(db.file_id("b.ts").unwrap().is_none());
    assert!(q.callers("bar").unwrap().is_empty());
}

#[test]
fn rankings_cover_all_symbols_and_conserve_mass() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "a.ts",
        "export function f(){ g(); }\nexport function g(){ h(); }\nexport function h(){}\n",
    );
    write(tmp.path(), "util.ts", "export function lonely(){}\n");

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    let (_, symbols, _, _) = db.counts().unwrap();
    let ranked = db.top_ranked(100).unwrap();
    assert_eq!(ranked.len() as i64, symbols);

    let sum = db.ranking_sum().unwrap();
    assert!((sum - 1.0).abs() < 1e-6, "rank sum was {sum}");
}

#[test]
fn rename_moves_the_file_identity() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "old.ts", "export function stable(){}\n");

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);
    assert!(db.file_id("old.ts").unwrap().is_some());

    // delete+create with identical content
    fs::remove_file(tmp.path().join("old.ts")).unwrap();
    write(tmp.path(), "new.ts", "export function stable(){}\n");
    index(tmp.path(), &db);

    assert!(db.file_id("old.ts").unwrap().is_none());
    assert!(db.file_id("new.ts").unwrap().is_some());

    let q = QueryEngine::new(&db);
    let hits = q.search("stable", 15).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].symbol.file, "new.ts");
}

#[test]
fn empty_repository_succeeds_everywhere() {
    let tmp = TempDir::new().unwrap();

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    let q = QueryEngine::new(&db);
    let stats = q.stats().unwrap();
    assert_eq!(stats.files, 0);
    assert!(q.search("anything", 15).unwrap().is_empty());
    assert!(q.rank(20).unwrap().is_empty());
    assert!(q.modules().unwrap().is_empty());
    assert!(q.brief().unwrap().contains("0 files"));
}

#[test]
fn search_misses_and_blank_queries_return_empty() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.ts", "export function alpha(){}\n");

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    let q = QueryEngine::new(&db);
    assert!(q.search("hello world", 15).unwrap().is_empty());
    assert!(q.search("", 15).unwrap().is_empty());
}

#[test]
fn unresolvable_imports_are_silent() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "a.ts",
        "import { gone } from './missing';\nimport fs from 'fs';\nexport function f(){}\n",
    );

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    let stats = QueryEngine::new(&db).stats().unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.file_deps, 0);
}

#[test]
fn cross_file_references_fan_out_from_every_importer_symbol() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "a.ts",
        "import { shared } from './lib';\nexport function one(){}\nexport function two(){}\n",
    );
    write(tmp.path(), "lib.ts", "export function shared(){}\n");

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    // both symbols of the importing file reference the imported one
    let q = QueryEngine::new(&db);
    let callers = q.callers("shared").unwrap();
    let names: Vec<_> = callers.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(callers.len(), 2);
    assert!(names.contains(&"one") && names.contains(&"two"));
}

#[test]
fn pre_edit_brief_lists_exports_dependents_and_imports() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "core.ts", "export function api(){}\n");
    write(
        tmp.path(),
        "app.ts",
        "import { api } from './core';\nexport function main(){ api(); }\n",
    );

    let db = Database::open(tmp.path()).unwrap();
    index(tmp.path(), &db);

    let q = QueryEngine::new(&db);
    let text = q.pre_edit("core.ts").unwrap();
    assert!(text.contains("api (function)"));
    assert!(text.contains("app.ts"));

    let text = q.pre_edit("app.ts").unwrap();
    assert!(text.contains("api from core.ts"));
}
