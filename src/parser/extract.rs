use tree_sitter::{Node, Tree};

use super::{Lang, ParsedCall, ParsedFile, ParsedImport, ParsedSymbol, SymbolKind};

const SIGNATURE_MAX: usize = 200;
const DOCSTRING_MAX: usize = 500;
const BODY_MAX: usize = 2048;
/// Classes and interfaces get a wider body window.
const BODY_MAX_WIDE: usize = 3072;
const CALLEE_MAX: usize = 100;

/// Callees that carry no graph signal.
const SKIPPED_CALLEES: &[&str] = &[
    "console.log",
    "console.error",
    "console.warn",
    "console.info",
    "console.debug",
    "print",
    "require",
];

pub fn extract(lang: Lang, source: &str, tree: &Tree) -> ParsedFile {
    let mut walker = Walker {
        lang,
        source,
        out: ParsedFile::default(),
    };
    walker.walk(tree.root_node(), None);
    walker.out
}

struct Walker<'a> {
    lang: Lang,
    source: &'a str,
    out: ParsedFile,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node: Node, class_ctx: Option<&str>) {
        match node.kind() {
            "function_declaration" | "function_definition" => {
                if let Some(name) = self.name_of(node) {
                    let qualified = class_ctx.map(|c| format!("{c}.{name}"));
                    self.push_symbol(node, SymbolKind::Function, name, qualified, None);
                }
            }
            "method_definition" => {
                if let Some(name) = self.name_of(node) {
                    let qualified = class_ctx.map(|c| format!("{c}.{name}"));
                    self.push_symbol(node, SymbolKind::Method, name, qualified, None);
                }
            }
            "class_declaration" | "class_definition" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(node, SymbolKind::Class, name.clone(), None, None);
                    // Children are walked once with this class as context so
                    // members pick up `Class.name` qualified names.
                    let mut cursor = node.walk();
                    let children: Vec<Node> = node.children(&mut cursor).collect();
                    for child in children {
                        self.walk(child, Some(&name));
                    }
                    return;
                }
            }
            "interface_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(node, SymbolKind::Interface, name, None, None);
                }
            }
            "type_alias_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(node, SymbolKind::Type, name, None, None);
                }
            }
            "enum_declaration" => {
                if let Some(name) = self.name_of(node) {
                    self.push_symbol(node, SymbolKind::Enum, name, None, None);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                self.visit_declaration(node);
            }
            "import_statement" | "import_declaration" => {
                self.visit_import(node);
                return;
            }
            "call_expression" | "call" => {
                self.visit_call(node);
            }
            _ => {}
        }

        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        for child in children {
            self.walk(child, class_ctx);
        }
    }

    // -----------------------------------------------------------------------
    // Symbols
    // -----------------------------------------------------------------------

    fn push_symbol(
        &mut self,
        node: Node,
        kind: SymbolKind,
        name: String,
        qualified_name: Option<String>,
        exported: Option<bool>,
    ) {
        let text = self.text(node);
        let body_max = match kind {
            SymbolKind::Class | SymbolKind::Interface => BODY_MAX_WIDE,
            _ => BODY_MAX,
        };
        let signature = text.lines().next().map(|l| cap(l.trim(), SIGNATURE_MAX));
        let exported = exported.unwrap_or_else(|| self.is_exported(node, &name));

        self.out.symbols.push(ParsedSymbol {
            qualified_name,
            kind,
            start_line: node.start_position().row + 1,
            end_line: node.end_position().row + 1,
            signature,
            docstring: self.docstring_of(node),
            body: Some(cap(text, body_max)),
            exported,
            name,
        });
    }

    fn name_of(&self, node: Node) -> Option<String> {
        let name_node = node.child_by_field_name("name")?;
        let name = self.text(name_node);
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }

    /// Leading adjacent comment, if any.
    fn docstring_of(&self, node: Node) -> Option<String> {
        let prev = node.prev_sibling()?;
        if prev.kind().contains("comment") {
            Some(cap(self.text(prev), DOCSTRING_MAX))
        } else {
            None
        }
    }

    fn is_exported(&self, node: Node, name: &str) -> bool {
        let Some(parent) = node.parent() else {
            return false;
        };
        match parent.kind() {
            "export_statement" | "export_declaration" => true,
            "decorated_definition" => parent
                .parent()
                .map(|gp| matches!(gp.kind(), "export_statement" | "export_declaration"))
                .unwrap_or(false),
            // Python: module-level definitions are public unless underscored.
            "module" if self.lang == Lang::Python => !name.starts_with('_'),
            _ => false,
        }
    }

    /// Exported `const`/`let`/`var` declarations: arrow-function initializers
    /// become functions, everything else a variable. Non-exported
    /// declarations emit nothing.
    fn visit_declaration(&mut self, node: Node) {
        let exported = matches!(
            node.parent().map(|p| p.kind()),
            Some("export_statement") | Some("export_declaration")
        );
        if !exported {
            return;
        }
        let mut cursor = node.walk();
        let declarators: Vec<Node> = node
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "variable_declarator")
            .collect();
        for declarator in declarators {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            let name = self.text(name_node).to_string();
            if name.is_empty() {
                continue;
            }
            let is_arrow = declarator
                .child_by_field_name("value")
                .map(|v| v.kind() == "arrow_function")
                .unwrap_or(false);
            let kind = if is_arrow {
                SymbolKind::Function
            } else {
                SymbolKind::Variable
            };
            self.push_symbol(node, kind, name, None, Some(true));
        }
    }

    // -----------------------------------------------------------------------
    // Imports
    // -----------------------------------------------------------------------

    fn visit_import(&mut self, node: Node) {
        let source_node = node.child_by_field_name("source").or_else(|| {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.named_children(&mut cursor).collect();
            children
                .into_iter()
                .find(|c| matches!(c.kind(), "string" | "string_literal"))
        });

        if let Some(source_node) = source_node {
            let source = self
                .text(source_node)
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .to_string();
            let mut names = Vec::new();
            self.collect_import_names(node, &mut names);
            let is_default = names.is_empty();
            self.out.imports.push(ParsedImport { source, names, is_default });
            return;
        }

        // Python-style bare `import X`: the module node stands in for the
        // source string.
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        if let Some(module) = children
            .into_iter()
            .find(|c| matches!(c.kind(), "dotted_name" | "aliased_import"))
        {
            self.out.imports.push(ParsedImport {
                source: self.text(module).to_string(),
                names: Vec::new(),
                is_default: true,
            });
        }
    }

    fn collect_import_names(&self, node: Node, names: &mut Vec<String>) {
        let mut cursor = node.walk();
        let children: Vec<Node> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_clause" => {
                    // A leading plain identifier is a default import.
                    if let Some(first) = child.named_child(0) {
                        if first.kind() == "identifier" {
                            names.push(self.text(first).to_string());
                        }
                    }
                    self.collect_import_names(child, names);
                }
                "named_imports" => self.collect_import_names(child, names),
                "import_specifier" => {
                    if let Some(name) = child.child_by_field_name("name") {
                        names.push(self.text(name).to_string());
                    }
                }
                _ => {}
            }
        }
    }

    // -----------------------------------------------------------------------
    // Calls
    // -----------------------------------------------------------------------

    fn visit_call(&mut self, node: Node) {
        let Some(func) = node.child_by_field_name("function") else {
            return;
        };
        let raw = self.text(func);
        let callee = if raw.contains('.') {
            let parts: Vec<&str> = raw.split('.').collect();
            parts[parts.len().saturating_sub(2)..].join(".")
        } else {
            raw.to_string()
        };
        if SKIPPED_CALLEES.contains(&callee.as_str()) || callee.chars().count() >= CALLEE_MAX {
            return;
        }
        let Some(caller) = self.enclosing_symbol(node) else {
            return;
        };
        self.out.calls.push(ParsedCall {
            caller,
            callee,
            line: node.start_position().row + 1,
        });
    }

    /// Climb to the nearest named definition or declarator the call sits in.
    fn enclosing_symbol(&self, node: Node) -> Option<String> {
        let mut current = node.parent();
        while let Some(n) = current {
            match n.kind() {
                "function_declaration" | "function_definition" | "method_definition"
                | "class_declaration" | "class_definition" => {
                    if let Some(name) = n.child_by_field_name("name") {
                        return Some(self.text(name).to_string());
                    }
                }
                "variable_declarator" => {
                    if let Some(name) = n.child_by_field_name("name") {
                        return Some(self.text(name).to_string());
                    }
                }
                "lexical_declaration" => {
                    let mut cursor = n.walk();
                    let children: Vec<Node> = n.named_children(&mut cursor).collect();
                    if let Some(declarator) = children
                        .into_iter()
                        .find(|c| c.kind() == "variable_declarator")
                    {
                        if let Some(name) = declarator.child_by_field_name("name") {
                            return Some(self.text(name).to_string());
                        }
                    }
                }
                _ => {}
            }
            current = n.parent();
        }
        None
    }

    fn text(&self, node: Node) -> &'a str {
        node.utf8_text(self.source.as_bytes()).unwrap_or("")
    }
}

fn cap(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
