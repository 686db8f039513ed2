use std::collections::HashSet;
use std::path::Path;

use anyhow::Result;
use walkdir::WalkDir;

/// Directories never descended into, regardless of project configuration.
const BLOCKED_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".hg",
    ".svn",
    "dist",
    "build",
    "out",
    ".next",
    ".nuxt",
    "__pycache__",
    ".pytest_cache",
    "target",
    "vendor",
    ".codex",
    ".claude",
    "coverage",
    ".vscode",
    ".idea",
    "venv",
    ".venv",
    ".env",
    ".tox",
    "bower_components",
    ".cache",
    ".parcel-cache",
    "tmp",
    "temp",
    ".turbo",
    ".vercel",
    ".netlify",
];

/// Extensions admitted into the index. Everything else is invisible.
const SUPPORTED_EXTENSIONS: &[&str] = &[
    ".ts", ".tsx", ".js", ".jsx", ".mjs", ".py", ".rs", ".go", ".sh", ".bash", ".c", ".h",
    ".cpp", ".cc", ".hpp", ".json", ".css", ".html", ".htm",
];

const MAX_FILE_SIZE: u64 = 524_288;

/// Walk `root` and return the relative paths of every indexable file,
/// forward-slash separated and lexicographically sorted.
pub fn collect(root: &Path) -> Result<Vec<String>> {
    let ignored = gitignore_names(root);

    let mut paths = Vec::new();
    for entry in WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| !(e.file_type().is_dir() && is_pruned_dir(e.path(), root, &ignored)))
    {
        let entry = match entry {
            Ok(e) => e,
            // Unreadable entries are skipped silently.
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !has_supported_extension(path) {
            continue;
        }
        match entry.metadata() {
            Ok(m) if m.len() <= MAX_FILE_SIZE => {}
            _ => continue,
        }
        let rel = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        paths.push(rel);
    }

    paths.sort();
    Ok(paths)
}

/// True when any directory component of the relative path would have been
/// pruned during collection. Lets the watcher drop events from build output
/// and dot directories without a full walk.
pub fn in_pruned_dir(rel: &Path) -> bool {
    let components: Vec<_> = rel.components().collect();
    if components.len() < 2 {
        return false;
    }
    components[..components.len() - 1].iter().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        name.starts_with('.') || BLOCKED_DIRS.contains(&name.as_ref())
    })
}

pub fn has_supported_extension(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };
    SUPPORTED_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

fn is_pruned_dir(path: &Path, root: &Path, ignored: &HashSet<String>) -> bool {
    if path == root {
        return false;
    }
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return true,
    };
    name.starts_with('.') || BLOCKED_DIRS.contains(&name) || ignored.contains(name)
}

/// Plain directory names from the root `.gitignore`. Entries carrying glob
/// or path syntax are outside this collector's contract and dropped.
fn gitignore_names(root: &Path) -> HashSet<String> {
    let mut names = HashSet::new();
    let Ok(text) = std::fs::read_to_string(root.join(".gitignore")) else {
        return names;
    };
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = line.trim_start_matches('/').trim_end_matches('/');
        if entry.is_empty() || entry.contains('/') || entry.contains('*') {
            continue;
        }
        names.insert(entry.to_string());
    }
    names
}
