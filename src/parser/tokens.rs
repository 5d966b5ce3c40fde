//! Whitespace tokenisation aware of quotes and brackets.

use crate::error::{Error, Result};
use crate::netlist::Parameter;

/// Split a statement into tokens.
///
/// Quoted strings and `()`, `[]`, `{}` groups stay in one token, and
/// `name = value` is normalised to `name=value`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut raw = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quoted = false;

    for c in text.chars() {
        match c {
            '"' => quoted = !quoted,
            '(' | '[' | '{' if !quoted => depth += 1,
            ')' | ']' | '}' if !quoted => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && !quoted && depth == 0 => {
                if !current.is_empty() {
                    raw.push(std::mem::take(&mut current));
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.is_empty() {
        raw.push(current);
    }

    let mut tokens: Vec<String> = Vec::with_capacity(raw.len());
    for token in raw {
        match tokens.last_mut() {
            Some(last) if last.ends_with('=') || token.starts_with('=') => last.push_str(&token),
            _ => tokens.push(token),
        }
    }
    tokens
}

/// `name=value` outside any group.
pub fn is_parameter(token: &str) -> bool {
    !token.starts_with(['(', '[', '{', '"']) && token.contains('=')
}

pub fn parameter(token: &str) -> Parameter {
    match token.split_once('=') {
        Some((name, value)) => Parameter::new(name, Some(value)),
        None => Parameter::new(token, None),
    }
}

/// Node names of a `(a b c)` group.
pub fn group_items(token: &str) -> Vec<String> {
    unquote_group(token)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Text between the outer brackets of a group token.
pub fn unquote_group(token: &str) -> &str {
    let token = token.trim();
    let inner = token
        .strip_prefix(['(', '[', '{'])
        .unwrap_or(token);
    inner.strip_suffix([')', ']', '}']).unwrap_or(inner)
}

pub fn unquote(token: &str) -> &str {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(token)
}

/// `name [(nodes) | nodes] master [params]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    pub name: String,
    pub nodes: Vec<String>,
    pub bracketed: bool,
    pub master: String,
    pub parameters: Vec<Parameter>,
}

/// Split an instance-shaped statement.
///
/// With a bare node list the master is the last token before the first
/// parameter.
pub fn instance_shape(tokens: &[String], line: usize) -> Result<Shape> {
    let Some(name) = tokens.first() else {
        return Err(Error::parse(line, "empty statement"));
    };
    if is_parameter(name) || name.starts_with('(') {
        return Err(Error::parse(line, format!("`{}` is not a statement name", name)));
    }

    let (nodes, bracketed, master_at) = match tokens.get(1) {
        Some(group) if group.starts_with('(') => (group_items(group), true, 2),
        _ => {
            let end = tokens
                .iter()
                .skip(1)
                .position(|t| is_parameter(t))
                .map(|p| p + 1)
                .unwrap_or(tokens.len());
            if end < 2 {
                return Err(Error::parse(line, format!("`{}` has no master name", name)));
            }
            (tokens[1..end - 1].to_vec(), false, end - 1)
        }
    };

    let Some(master) = tokens.get(master_at) else {
        return Err(Error::parse(line, format!("`{}` has no master name", name)));
    };
    if is_parameter(master) || master.starts_with('(') {
        return Err(Error::parse(line, format!("`{}` has no master name", name)));
    }
    let rest = &tokens[master_at + 1..];
    if let Some(stray) = rest.iter().find(|t| !is_parameter(t)) {
        return Err(Error::parse(
            line,
            format!("unexpected `{}` after master `{}`", stray, master),
        ));
    }

    Ok(Shape {
        name: name.clone(),
        nodes,
        bracketed,
        master: master.clone(),
        parameters: rest.iter().map(|t| parameter(t)).collect(),
    })
}

/// Byte offset of the first `{` outside quotes and other groups.
pub fn block_opener(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' | '[' if !quoted => depth += 1,
            ')' | ']' if !quoted => depth = depth.saturating_sub(1),
            '{' if !quoted && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Byte offset of the first `}` that closes more braces than the text opened.
pub fn unmatched_close(text: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '{' if !quoted => depth += 1,
            '}' if !quoted => {
                depth -= 1;
                if depth < 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Leading parenthesised group, and the text after it.
pub fn leading_group(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if !text.starts_with('(') {
        return None;
    }
    let mut depth = 0usize;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                depth -= 1;
                if depth == 0 {
                    return Some((&text[1..i], &text[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}
