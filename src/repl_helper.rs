use rustyline::completion::Completer;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper as RlHelper, Result};

use std::borrow::Cow;

/// Line-editing helper for the toplevel: matching-bracket highlighting
/// and completion over the predicate names seen so far.
pub struct Helper {
    highlighter: MatchingBracketHighlighter,
    pub atoms: Vec<String>,
}

impl Helper {
    pub fn new() -> Self {
        Self {
            highlighter: MatchingBracketHighlighter::new(),
            atoms: vec![],
        }
    }
}

impl Default for Helper {
    fn default() -> Self {
        Helper::new()
    }
}

impl RlHelper for Helper {}

fn atom_prefix_start(line: &str, pos: usize) -> Option<usize> {
    let mut start = None;

    for (i, c) in line.char_indices() {
        if i >= pos {
            break;
        }

        match start {
            None if c.is_alphabetic() && c.is_lowercase() => start = Some(i),
            Some(_) if c.is_alphanumeric() || c == '_' => {}
            _ => start = None,
        }
    }

    start.or(Some(pos))
}

impl Completer for Helper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Self::Candidate>)> {
        match atom_prefix_start(line, pos) {
            Some(start) => {
                let prefix = &line[start..pos];
                let matching = self
                    .atoms
                    .iter()
                    .filter(|a| a.starts_with(prefix))
                    .cloned()
                    .collect();

                Ok((start, matching))
            }
            None => Ok((0, vec![])),
        }
    }
}

impl Highlighter for Helper {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_char(&self, line: &str, pos: usize, forced: bool) -> bool {
        self.highlighter.highlight_char(line, pos, forced)
    }
}

impl Validator for Helper {}

impl Hinter for Helper {
    type Hint = String;
}
