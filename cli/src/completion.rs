//! Shell completion: a catalog of every command path's children, and the
//! engine that picks candidates for the text before the cursor.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub text: String,
    pub description: String,
}

impl Suggestion {
    pub fn new(text: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            description: description.into(),
        }
    }
}

/// Children of every reachable command, keyed by full command path.
///
/// The root entry lists top-level subcommands only. Nested entries list
/// subcommands first, then long flags. Built once, read-only afterwards.
#[derive(Debug, Default)]
pub struct Catalog {
    entries: HashMap<Vec<String>, Vec<Suggestion>>,
}

impl Catalog {
    pub fn from_command(root: &clap::Command) -> Self {
        let mut catalog = Self::default();
        let mut path = Vec::new();
        catalog.collect(&mut path, root);
        catalog
    }

    fn collect(&mut self, path: &mut Vec<String>, cmd: &clap::Command) {
        let subcommands: Vec<&clap::Command> =
            cmd.get_subcommands().filter(|c| !c.is_hide_set()).collect();

        let mut suggestions: Vec<Suggestion> = subcommands
            .iter()
            .map(|c| {
                let about = c.get_about().map(|s| s.to_string()).unwrap_or_default();
                Suggestion::new(c.get_name(), about)
            })
            .collect();
        if !path.is_empty() {
            for arg in cmd.get_arguments().filter(|a| !a.is_hide_set()) {
                if let Some(long) = arg.get_long() {
                    suggestions.push(Suggestion::new(
                        format!("--{}", long),
                        arg.get_help().map(|s| s.to_string()).unwrap_or_default(),
                    ));
                }
            }
        }
        self.entries.insert(path.clone(), suggestions);

        for sub in subcommands {
            path.push(sub.get_name().to_string());
            self.collect(path, sub);
            path.pop();
        }
    }

    pub fn top_level(&self) -> &[Suggestion] {
        self.children(&[])
    }

    pub fn children(&self, path: &[String]) -> &[Suggestion] {
        self.entries.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, path: &[String]) -> bool {
        self.entries.contains_key(path)
    }

    /// Number of command paths recorded, the root included.
    pub fn paths(&self) -> usize {
        self.entries.len()
    }
}

/// Walks the tokens typed so far and tracks the deepest command path they name.
#[derive(Debug)]
struct PathWalk<'a> {
    catalog: &'a Catalog,
    path: Vec<String>,
    matched: bool,
    open_quote: Option<char>,
}

impl<'a> PathWalk<'a> {
    fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            path: Vec::new(),
            matched: false,
            open_quote: None,
        }
    }

    fn step(&mut self, token: &str) {
        if let Some(q) = self.open_quote {
            if token.ends_with(q) {
                self.open_quote = None;
            }
            return;
        }
        if token.is_empty() || token.starts_with('-') {
            return;
        }
        if let Some(q) = token.chars().next().filter(|c| *c == '\'' || *c == '"') {
            if token.len() == 1 || !token.ends_with(q) {
                self.open_quote = Some(q);
            }
            return;
        }

        self.path.push(token.to_string());
        if self.catalog.contains(&self.path) {
            self.matched = true;
        } else {
            self.path.pop();
        }
    }

    fn candidates(&self) -> &'a [Suggestion] {
        if !self.matched {
            return &[];
        }
        self.catalog.children(&self.path)
    }
}

#[derive(Debug)]
pub struct CompletionEngine<'a> {
    catalog: &'a Catalog,
}

impl<'a> CompletionEngine<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Suggestions whose text starts with `word`, in catalog order.
    ///
    /// `text_before_cursor` ends with `word`; the tokens before it select the
    /// candidate set.
    pub fn complete(&self, text_before_cursor: &str, word: &str) -> Vec<Suggestion> {
        if text_before_cursor.is_empty() {
            return Vec::new();
        }

        let tokens: Vec<&str> = text_before_cursor.split(' ').collect();
        let candidates = if tokens.len() < 2 {
            self.catalog.top_level()
        } else {
            let mut walk = PathWalk::new(self.catalog);
            for token in &tokens[..tokens.len() - 1] {
                walk.step(token);
            }
            walk.candidates()
        };

        filter_has_prefix(candidates, word)
    }
}

pub fn filter_has_prefix(suggestions: &[Suggestion], prefix: &str) -> Vec<Suggestion> {
    suggestions
        .iter()
        .filter(|s| s.text.starts_with(prefix))
        .cloned()
        .collect()
}

/// Word under the cursor: everything after the last space.
pub fn word_before_cursor(text_before_cursor: &str) -> &str {
    text_before_cursor
        .rsplit(' ')
        .next()
        .unwrap_or(text_before_cursor)
}
