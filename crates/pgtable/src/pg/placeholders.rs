//! Rewrites `?` / `:name` placeholders to Postgres `$n` parameters.
//!
//! String literals, quoted identifiers, dollar-quoted bodies, comments and `::` casts
//! are copied through untouched.

use crate::bind::normalize_name;
use std::collections::HashMap;

/// What a `$n` parameter is bound from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    /// 1-based position.
    Position(usize),
    /// Normalized name (with leading colon).
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rewritten {
    pub(crate) sql: String,
    pub(crate) slots: Vec<Slot>,
}

pub(crate) fn rewrite(sql: &str) -> Result<Rewritten, String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut slots: Vec<Slot> = Vec::new();
    let mut names: HashMap<String, usize> = HashMap::new();
    let mut positional = false;
    let mut named = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\'' => {
                let backslash = i > 0
                    && matches!(chars[i - 1], 'E' | 'e')
                    && (i < 2 || !is_ident_char(chars[i - 2]));
                let end = scan_quoted(&chars, i, '\'', backslash);
                out.extend(&chars[i..end]);
                i = end;
            }
            '"' => {
                let end = scan_quoted(&chars, i, '"', false);
                out.extend(&chars[i..end]);
                i = end;
            }
            '-' if next == Some('-') => {
                let end = chars[i..]
                    .iter()
                    .position(|&ch| ch == '\n')
                    .map_or(chars.len(), |p| i + p + 1);
                out.extend(&chars[i..end]);
                i = end;
            }
            '/' if next == Some('*') => {
                let end = scan_block_comment(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '$' => match dollar_tag(&chars, i) {
                Some(tag_end) => {
                    let tag: Vec<char> = chars[i..=tag_end].to_vec();
                    let end = find_subslice(&chars, tag_end + 1, &tag)
                        .map_or(chars.len(), |p| p + tag.len());
                    out.extend(&chars[i..end]);
                    i = end;
                }
                None => {
                    out.push('$');
                    i += 1;
                }
            },
            ':' if next == Some(':') => {
                out.push_str("::");
                i += 2;
            }
            // `arr[lo:hi]` is a slice, not a parameter
            ':' if next.is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_')
                && (i == 0 || !(is_ident_char(chars[i - 1]) || chars[i - 1] == ']')) =>
            {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_ident_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let name = normalize_name(&name);
                let index = match names.get(&name) {
                    Some(p) => *p,
                    None => {
                        slots.push(Slot::Name(name.clone()));
                        names.insert(name, slots.len());
                        slots.len()
                    }
                };
                named = true;
                out.push('$');
                out.push_str(&index.to_string());
                i = end;
            }
            '?' => {
                positional = true;
                slots.push(Slot::Position(slots.len() + 1));
                out.push('$');
                out.push_str(&slots.len().to_string());
                i += 1;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }

        if positional && named {
            return Err("statement mixes ? and :name placeholders".to_string());
        }
    }

    Ok(Rewritten { sql: out, slots })
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// End (exclusive) of a quoted run starting at `start`. A doubled quote is an escape.
fn scan_quoted(chars: &[char], start: usize, quote: char, backslash: bool) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if backslash && c == '\\' {
            i += 2;
            continue;
        }
        if c == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    chars.len()
}

fn scan_block_comment(chars: &[char], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < chars.len() {
        match (chars[i], chars[i + 1]) {
            ('/', '*') => {
                depth += 1;
                i += 2;
            }
            ('*', '/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    chars.len()
}

/// Index of the closing `$` of a dollar-quote tag opening at `start`, if any.
fn dollar_tag(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    if chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        return None;
    }
    while let Some(&c) = chars.get(i) {
        if c == '$' {
            return Some(i);
        }
        if !is_ident_char(c) {
            return None;
        }
        i += 1;
    }
    None
}

fn find_subslice(chars: &[char], from: usize, needle: &[char]) -> Option<usize> {
    if from > chars.len() {
        return None;
    }
    chars[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}
