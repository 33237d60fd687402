//! slothy_asm: assembly source handling.
//!
//! Line reduction (comments, directives, labels), `.req`/`.unreq` register
//! aliases, `.macro` expansion, and extraction of optimization regions and
//! loops from a surrounding source file. Everything here works on plain
//! text; instruction semantics live behind the architecture model.

use thiserror::Error;

pub mod alias;
pub mod macros;
pub mod region;

#[cfg(test)]
mod tests;

/// Errors from source handling. All are malformed-input errors.
#[derive(Debug, Clone, Error)]
pub enum AsmError {
    #[error("couldn't find label `{0}`")]
    LabelNotFound(String),
    #[error("failed to identify region {0}-{1}")]
    RegionNotFound(String, String),
    #[error("couldn't identify loop `{0}`")]
    LoopNotFound(String),
    #[error("double definition of alias `{0}`")]
    DoubleAlias(String),
    #[error(".unreq of `{0}` without earlier .req")]
    UnreqWithoutReq(String),
}

/// One line of assembly with its 1-based source line number. Semicolon-split
/// statements share the number of the line they came from.
#[derive(Debug, Clone)]
pub struct SourceLine {
    pub text: String,
    pub number: usize,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, number: usize) -> Self {
        Self {
            text: text.into(),
            number,
        }
    }
}

/// Split source text into lines, further splitting statements joined by
/// semicolons.
pub fn source_lines(src: &str) -> Vec<SourceLine> {
    let mut out = Vec::new();
    for (i, line) in src.lines().enumerate() {
        for stmt in line.split(';') {
            out.push(SourceLine::new(stmt, i + 1));
        }
    }
    out
}

/// Strip `//`, `/* ... */` and whole-line `#` comments. `#` elsewhere is an
/// immediate prefix and left alone.
pub fn strip_comment(line: &str) -> String {
    let mut s = match line.find("//") {
        Some(pos) => &line[..pos],
        None => line,
    }
    .to_string();
    while let (Some(start), Some(end)) = (s.find("/*"), s.find("*/")) {
        if end < start {
            break;
        }
        s.replace_range(start..end + 2, "");
    }
    if s.trim_start().starts_with('#') {
        return String::new();
    }
    s.trim().to_string()
}

/// If the line is just a label (`name:`), return the label name.
pub fn parse_label(line: &str) -> Option<&str> {
    let line = line.trim();
    let name = line.strip_suffix(':')?;
    let name = name.trim();
    if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        Some(name)
    } else {
        None
    }
}

/// Directives the optimizer ignores in code: alignment and register aliases
/// (aliases are unfolded beforehand by [`alias::Aliases`]).
pub fn is_ignored_directive(line: &str) -> bool {
    let line = line.trim();
    line.starts_with(".align")
        || line.starts_with(".p2align")
        || alias::parse_req(line).is_some()
        || alias::parse_unreq(line).is_some()
}

/// Reduce one line: strip comments, drop empties, directives, and labels.
pub fn reduce_line(line: &str) -> Option<String> {
    let line = strip_comment(line);
    if line.is_empty() || is_ignored_directive(&line) || parse_label(&line).is_some() {
        return None;
    }
    Some(line)
}

/// Reduce a snippet to bare instruction lines.
pub fn reduce_source(lines: &[SourceLine], allow_nops: bool) -> Vec<SourceLine> {
    lines
        .iter()
        .filter_map(|l| {
            let text = reduce_line(&l.text)?;
            if !allow_nops && text == "nop" {
                return None;
            }
            Some(SourceLine::new(text, l.number))
        })
        .collect()
}

/// Attempt to find the prevailing indentation of a snippet: the common
/// indentation of the top quarter of lines, if they agree.
pub fn find_indentation<'a>(lines: impl Iterator<Item = &'a str>) -> Option<usize> {
    let mut indents: Vec<usize> = lines
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .collect();
    if indents.is_empty() {
        return None;
    }
    indents.sort_unstable();
    let top = indents.split_off((3 * indents.len()) / 4);
    if top.first() == top.last() {
        top.first().copied()
    } else {
        None
    }
}

/// Re-apply a consistent indentation.
pub fn apply_indentation(lines: impl IntoIterator<Item = String>, indent: Option<usize>) -> Vec<String> {
    let Some(indent) = indent else {
        return lines.into_iter().collect();
    };
    let pad = " ".repeat(indent);
    lines
        .into_iter()
        .map(|l| {
            if l.trim().is_empty() {
                l
            } else {
                format!("{pad}{}", l.trim_start())
            }
        })
        .collect()
}

/// Replace whole-word occurrences of `from` with `to`. Words are maximal
/// runs of `[A-Za-z0-9_]`.
pub fn replace_word(line: &str, from: &str, to: &str) -> String {
    let bytes = line.as_bytes();
    let mut out = String::with_capacity(line.len());
    let mut i = 0;
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    while i < bytes.len() {
        if is_word(bytes[i]) {
            let start = i;
            while i < bytes.len() && is_word(bytes[i]) {
                i += 1;
            }
            let word = &line[start..i];
            out.push_str(if word == from { to } else { word });
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    out
}
