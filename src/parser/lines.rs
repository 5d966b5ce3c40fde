//! Logical statement lines.
//!
//! A [`LineReader`] turns the physical lines of a netlist into logical
//! statements:
//!
//! - a trailing `\` joins the next line,
//! - a line starting with `+` continues the previous one,
//! - `//` starts a comment outside quoted strings,
//! - a line starting with `*` is a comment,
//! - `\r` is dropped and blank lines are skipped.
//!
//! Lines can be pushed back, which is how inline blocks are split into a body
//! and the text following their closing brace.

use std::collections::VecDeque;
use std::io::{self, BufRead, Cursor};

/// One statement, continuation lines joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub text: String,
    /// Physical line the statement starts on.
    pub line: usize,
}

impl LogicalLine {
    pub fn new(text: impl Into<String>, line: usize) -> Self {
        Self {
            text: text.into(),
            line,
        }
    }
}

pub struct LineReader {
    lines: io::Lines<Box<dyn BufRead>>,
    line_number: usize,
    /// Physical line read ahead to look for a `+` continuation.
    lookahead: Option<(String, usize)>,
    pushed: VecDeque<LogicalLine>,
}

impl LineReader {
    pub fn new(reader: Box<dyn BufRead>) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            lookahead: None,
            pushed: VecDeque::new(),
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(Box::new(Cursor::new(text.to_string())))
    }

    /// Return a statement to the reader; it is the next one read.
    pub fn push_back(&mut self, line: LogicalLine) {
        self.pushed.push_front(line);
    }

    /// Next logical statement, `None` at end of input.
    pub fn next_statement(&mut self) -> io::Result<Option<LogicalLine>> {
        if let Some(line) = self.pushed.pop_front() {
            return Ok(Some(line));
        }

        loop {
            let Some((mut text, line)) = self.physical()? else {
                return Ok(None);
            };
            loop {
                let trimmed = text.trim_end();
                if let Some(stripped) = trimmed.strip_suffix('\\') {
                    text = stripped.to_string();
                    match self.physical()? {
                        Some((next, _)) => append(&mut text, &next),
                        None => break,
                    }
                } else if self.peek_continuation()? {
                    if let Some((next, _)) = self.lookahead.take() {
                        let next = next.trim_start();
                        append(&mut text, &next[1..]);
                    }
                } else {
                    break;
                }
            }

            let text = text.trim();
            if !text.is_empty() {
                return Ok(Some(LogicalLine::new(text, line)));
            }
        }
    }

    fn peek_continuation(&mut self) -> io::Result<bool> {
        if self.lookahead.is_none() {
            self.lookahead = self.read_physical()?;
        }
        Ok(self
            .lookahead
            .as_ref()
            .is_some_and(|(text, _)| text.trim_start().starts_with('+')))
    }

    fn physical(&mut self) -> io::Result<Option<(String, usize)>> {
        match self.lookahead.take() {
            Some(line) => Ok(Some(line)),
            None => self.read_physical(),
        }
    }

    fn read_physical(&mut self) -> io::Result<Option<(String, usize)>> {
        let Some(line) = self.lines.next().transpose()? else {
            return Ok(None);
        };
        self.line_number += 1;
        Ok(Some((strip_comment(&line), self.line_number)))
    }
}

fn append(text: &mut String, next: &str) {
    let next = next.trim();
    if next.is_empty() {
        return;
    }
    if !text.trim_end().is_empty() {
        text.truncate(text.trim_end().len());
        text.push(' ');
    }
    text.push_str(next);
}

/// Drop `\r`, `*` comment lines and `//` comments outside quotes.
pub fn strip_comment(line: &str) -> String {
    let line = line.replace('\r', "");
    if line.trim_start().starts_with('*') {
        return String::new();
    }
    let mut quoted = false;
    let mut previous = '\0';
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '/' if !quoted && previous == '/' => return line[..i - 1].to_string(),
            _ => {}
        }
        previous = c;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statements(text: &str) -> Vec<(String, usize)> {
        let mut reader = LineReader::from_text(text);
        let mut out = Vec::new();
        while let Some(line) = reader.next_statement().unwrap() {
            out.push((line.text, line.line));
        }
        out
    }

    #[test]
    fn continuation_markers_join_lines() {
        let split = statements("r1 (a b) \\\n  resistor\n+ r=1k\nr2 (b 0) resistor r=2k\n");
        let single = statements("r1 (a b) resistor r=1k\nr2 (b 0) resistor r=2k\n");
        assert_eq!(split[0].0, single[0].0);
        assert_eq!(split[0].1, 1);
        assert_eq!(split[1], ("r2 (b 0) resistor r=2k".to_string(), 4));
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let lines = statements(
            "* title line\n\n// full comment\nr1 (a b) resistor r=1k // trailing\r\nsave \"a//b\"\n",
        );
        assert_eq!(
            lines,
            vec![
                ("r1 (a b) resistor r=1k".to_string(), 4),
                ("save \"a//b\"".to_string(), 5),
            ]
        );
    }

    #[test]
    fn pushed_back_lines_come_first() {
        let mut reader = LineReader::from_text("c\n");
        reader.push_back(LogicalLine::new("b", 1));
        reader.push_back(LogicalLine::new("a", 1));
        let mut texts = Vec::new();
        while let Some(line) = reader.next_statement().unwrap() {
            texts.push(line.text);
        }
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn plus_after_backslash_keeps_joining() {
        let lines = statements("m1 d g \\\ns b\n+ nch w=1u\n");
        assert_eq!(lines, vec![("m1 d g s b nch w=1u".to_string(), 1)]);
    }
}
