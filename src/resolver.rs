use std::path::{Component, Path, PathBuf};

/// Extension probes, in order. The empty string is the literal match.
const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".py", ".rs", ".go", ""];

/// Directory-index probes tried after the extension ladder.
const INDEX_FILES: &[&str] = &["/index.ts", "/index.tsx", "/index.js", "/index.jsx"];

/// Resolve a raw import specifier from `from_rel` (root-relative path of the
/// importing file) to the root-relative path of the target file. Package
/// imports (anything not starting with `.` or `/`) are not in-tree and
/// resolve to None, as do specifiers escaping the root.
pub fn resolve(root: &Path, from_rel: &str, specifier: &str) -> Option<String> {
    if !specifier.starts_with('.') && !specifier.starts_with('/') {
        return None;
    }

    let joined = if let Some(stripped) = specifier.strip_prefix('/') {
        PathBuf::from(stripped)
    } else {
        let from_dir = Path::new(from_rel).parent().unwrap_or_else(|| Path::new(""));
        from_dir.join(specifier)
    };
    let candidate = normalize(&joined)?;

    for ext in EXTENSIONS {
        let probe = format!("{candidate}{ext}");
        if root.join(&probe).is_file() {
            return Some(probe);
        }
    }
    for index in INDEX_FILES {
        let probe = format!("{candidate}{index}");
        if root.join(&probe).is_file() {
            return Some(probe);
        }
    }
    None
}

/// Lexically resolve `.` and `..` components into a forward-slash relative
/// path. None when the path climbs above the root.
fn normalize(path: &Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(p) => parts.push(p.to_string_lossy().into_owned()),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
