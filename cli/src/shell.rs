//! Interactive shell: a blocking line loop with context-sensitive completion.

use anyhow::{anyhow, Result};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};
use std::future::Future;
use tracing::debug;

use crate::completion::{word_before_cursor, Catalog, CompletionEngine, Suggestion};
use crate::http_client::Client;
use crate::manifest::Registry;

pub const PROGRAM_NAME: &str = "esctl";
pub const EXIT_TOKEN: &str = "exit";
const PROMPT: &str = ">>> ";
const FAREWELL: &str = "Exiting REPL...";

/// Process-wide state shared by every command run in one process.
pub struct Session {
    pub client: Client,
    pub registry: Registry,
    pub catalog: Catalog,
}

impl Session {
    pub fn new(client: Client, command: &clap::Command) -> Self {
        let registry = Registry::default();
        debug!(kinds = ?registry.kinds(), "manifest kinds registered");
        let catalog = Catalog::from_command(command);
        debug!(paths = catalog.paths(), "command catalog built");
        Self {
            client,
            registry,
            catalog,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Exit,
    Empty,
    Command(Vec<String>),
}

/// Classifies one input line. Commands come back in process-argument form,
/// program name first.
pub fn parse_line(line: &str) -> Result<Line> {
    if line == EXIT_TOKEN {
        return Ok(Line::Exit);
    }
    let words = shlex::split(line).ok_or_else(|| anyhow!("unbalanced quotes in: {}", line))?;
    if words.is_empty() {
        return Ok(Line::Empty);
    }
    let mut argv = Vec::with_capacity(words.len() + 1);
    argv.push(PROGRAM_NAME.to_string());
    argv.extend(words);
    Ok(Line::Command(argv))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Runs one line. Errors are printed and never end the shell.
pub async fn handle_line<F, Fut>(line: &str, execute: &mut F) -> Flow
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    match parse_line(line) {
        Ok(Line::Exit) => {
            println!("{}", FAREWELL);
            Flow::Exit
        }
        Ok(Line::Empty) => Flow::Continue,
        Ok(Line::Command(argv)) => {
            if let Err(e) = execute(argv).await {
                println!("{:#}", e);
            }
            Flow::Continue
        }
        Err(e) => {
            println!("{:#}", e);
            Flow::Continue
        }
    }
}

pub async fn run<F, Fut>(session: &Session, mut execute: F) -> Result<()>
where
    F: FnMut(Vec<String>) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut editor: Editor<ShellHelper<'_>, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(ShellHelper {
        catalog: &session.catalog,
    }));

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    editor.add_history_entry(line.as_str())?;
                }
                if handle_line(&line, &mut execute).await == Flow::Exit {
                    return Ok(());
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!("{}", FAREWELL);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }
}

struct ShellHelper<'a> {
    catalog: &'a Catalog,
}

fn render(s: &Suggestion) -> String {
    if s.description.is_empty() {
        s.text.clone()
    } else {
        format!("{:<20} {}", s.text, s.description)
    }
}

impl Completer for ShellHelper<'_> {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let before = &line[..pos];
        let word = word_before_cursor(before);
        let pairs = CompletionEngine::new(self.catalog)
            .complete(before, word)
            .into_iter()
            .map(|s| Pair {
                display: render(&s),
                replacement: s.text,
            })
            .collect();
        Ok((pos - word.len(), pairs))
    }
}

impl Hinter for ShellHelper<'_> {
    type Hint = String;
}

impl Highlighter for ShellHelper<'_> {}

impl Validator for ShellHelper<'_> {}

impl Helper for ShellHelper<'_> {}
