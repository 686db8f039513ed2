use std::collections::HashMap;

use tree_sitter::Language;

use super::Lang;

/// Outcome of a grammar load attempt. `Absent` is cached so languages
/// without a grammar are not retried on every file.
enum GrammarSlot {
    Loaded(Language),
    Absent,
}

/// Lazily-populated grammar table keyed by language tag.
pub struct GrammarRegistry {
    slots: HashMap<Lang, GrammarSlot>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        Self { slots: HashMap::new() }
    }

    /// The grammar for `lang`, loading it on first demand.
    pub fn get(&mut self, lang: Lang) -> Option<&Language> {
        let slot = self.slots.entry(lang).or_insert_with(|| match load(lang) {
            Some(g) => GrammarSlot::Loaded(g),
            None => GrammarSlot::Absent,
        });
        match slot {
            GrammarSlot::Loaded(g) => Some(g),
            GrammarSlot::Absent => None,
        }
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn load(lang: Lang) -> Option<Language> {
    match lang {
        Lang::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        Lang::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
        Lang::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
        Lang::Python => Some(tree_sitter_python::LANGUAGE.into()),
        Lang::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
        Lang::Go => Some(tree_sitter_go::LANGUAGE.into()),
        Lang::Shell => Some(tree_sitter_bash::LANGUAGE.into()),
        Lang::C => Some(tree_sitter_c::LANGUAGE.into()),
        Lang::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
        // Tracked formats with no structural grammar.
        Lang::Json | Lang::Css | Lang::Html => None,
    }
}
