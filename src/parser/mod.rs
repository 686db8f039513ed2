mod extract;
mod registry;

use std::path::Path;

pub use registry::GrammarRegistry;

// ---------------------------------------------------------------------------
// Language tags
// ---------------------------------------------------------------------------

/// Language tag detected from a file extension. `Json`, `Css` and `Html` are
/// tracked languages with no grammar: their files participate in hashing and
/// membership but always produce an empty parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Rust,
    Go,
    Shell,
    C,
    Cpp,
    Json,
    Css,
    Html,
}

impl Lang {
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?;
        Self::from_extension(ext)
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" => Some(Lang::TypeScript),
            "tsx" => Some(Lang::Tsx),
            "js" | "jsx" | "mjs" => Some(Lang::JavaScript),
            "py" => Some(Lang::Python),
            "rs" => Some(Lang::Rust),
            "go" => Some(Lang::Go),
            "sh" | "bash" => Some(Lang::Shell),
            "c" | "h" => Some(Lang::C),
            "cpp" | "cc" | "hpp" => Some(Lang::Cpp),
            "json" => Some(Lang::Json),
            "css" => Some(Lang::Css),
            "html" | "htm" => Some(Lang::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lang::TypeScript => "typescript",
            Lang::Tsx => "tsx",
            Lang::JavaScript => "javascript",
            Lang::Python => "python",
            Lang::Rust => "rust",
            Lang::Go => "go",
            Lang::Shell => "shell",
            Lang::C => "c",
            Lang::Cpp => "cpp",
            Lang::Json => "json",
            Lang::Css => "css",
            Lang::Html => "html",
        }
    }
}

// ---------------------------------------------------------------------------
// Parse contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Enum,
    Variable,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
            SymbolKind::Enum => "enum",
            SymbolKind::Variable => "variable",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedSymbol {
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: SymbolKind,
    /// 1-based, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub body: Option<String>,
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub struct ParsedImport {
    /// Raw specifier with quotes stripped (e.g. `./util` or `react`).
    pub source: String,
    pub names: Vec<String>,
    /// True when the import carries no named bindings.
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct ParsedCall {
    /// Name of the enclosing symbol making the call.
    pub caller: String,
    pub callee: String,
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub symbols: Vec<ParsedSymbol>,
    pub imports: Vec<ParsedImport>,
    pub calls: Vec<ParsedCall>,
}

// ---------------------------------------------------------------------------
// Parser facade
// ---------------------------------------------------------------------------

/// Maps a file to its symbols, imports and intra-file calls by walking the
/// concrete syntax tree. Grammars are loaded on first demand; a missing or
/// failing grammar yields an empty result, never an error.
pub struct Parser {
    registry: GrammarRegistry,
    inner: tree_sitter::Parser,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            registry: GrammarRegistry::new(),
            inner: tree_sitter::Parser::new(),
        }
    }

    /// Parse a file's content. Returns the structured result and the
    /// detected language tag (None for unsupported extensions).
    pub fn parse(&mut self, rel_path: &str, content: &str) -> (ParsedFile, Option<Lang>) {
        let Some(lang) = Lang::from_path(rel_path) else {
            return (ParsedFile::default(), None);
        };
        let Some(grammar) = self.registry.get(lang) else {
            return (ParsedFile::default(), Some(lang));
        };
        if self.inner.set_language(grammar).is_err() {
            return (ParsedFile::default(), Some(lang));
        }
        match self.inner.parse(content, None) {
            Some(tree) => (extract::extract(lang, content, &tree), Some(lang)),
            None => (ParsedFile::default(), Some(lang)),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
