//! Extraction of optimization regions and loops from surrounding source.

use crate::{reduce_source, source_lines, AsmError, SourceLine};

/// A source file split around an optimization window. `pre` and `post` keep
/// their original text; `body` is reduced to bare instruction lines, with
/// the prevailing indentation of the raw window preserved separately so
/// emitted code can match it.
#[derive(Debug, Clone)]
pub struct Region {
    pub pre: Vec<SourceLine>,
    pub body: Vec<SourceLine>,
    pub post: Vec<SourceLine>,
    pub indentation: Option<usize>,
}

/// Extract the code between `start` and `end` labels. A missing start label
/// means "from the top"; a missing end label means "to the bottom".
pub fn extract(source: &str, start: Option<&str>, end: Option<&str>) -> Result<Region, AsmError> {
    let lines = source_lines(source);
    let (pre, body, post) = split_at_labels(&lines, start, end)?;
    let indentation = crate::find_indentation(body.iter().map(|l| l.text.as_str()));
    Ok(Region {
        pre,
        body: reduce_source(&body, false),
        post,
        indentation,
    })
}

/// Label-on-its-own-line or `label: remainder`; returns the remainder.
fn match_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let trimmed = line.trim();
    let (head, rest) = trimmed.split_once(':')?;
    if head.trim() == label {
        Some(rest)
    } else {
        None
    }
}

fn split_at_labels(
    lines: &[SourceLine],
    start: Option<&str>,
    end: Option<&str>,
) -> Result<(Vec<SourceLine>, Vec<SourceLine>, Vec<SourceLine>), AsmError> {
    if start.is_none() && end.is_none() {
        return Ok((vec![], lines.to_vec(), vec![]));
    }

    let mut pre = Vec::new();
    let mut body = Vec::new();
    let mut post = Vec::new();
    let start_label = start.unwrap_or("");
    // 0: before start label, 1: inside region, 2: after end label.
    let mut state = if start.is_none() { 1 } else { 0 };

    for line in lines {
        match state {
            0 => {
                if let Some(rest) = match_label(&line.text, start_label) {
                    state = 1;
                    if !rest.trim().is_empty() {
                        body.push(SourceLine::new(rest, line.number));
                    }
                } else {
                    pre.push(line.clone());
                }
            }
            1 => {
                if let Some(lbl) = end {
                    if let Some(rest) = match_label(&line.text, lbl) {
                        state = 2;
                        if !rest.trim().is_empty() {
                            post.push(SourceLine::new(rest, line.number));
                        }
                        continue;
                    }
                }
                body.push(line.clone());
            }
            _ => post.push(line.clone()),
        }
    }

    match (state, start, end) {
        (0, Some(s), _) => Err(AsmError::LabelNotFound(s.to_string())),
        (1, Some(s), Some(e)) => Err(AsmError::RegionNotFound(s.to_string(), e.to_string())),
        (1, None, Some(e)) => Err(AsmError::LabelNotFound(e.to_string())),
        _ => Ok((pre, body, post)),
    }
}

/// The loop counter triple `(dst, src, imm)` of the closing
/// `sub[s] dst, src, #imm` instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopCounter {
    pub dst: String,
    pub src: String,
    pub imm: String,
}

/// A recognized loop: `label: body... ; sub[s] cnt, cnt, #1 ; cbnz cnt, label`.
#[derive(Debug, Clone)]
pub struct LoopRegion {
    pub pre: Vec<SourceLine>,
    pub body: Vec<SourceLine>,
    pub post: Vec<SourceLine>,
    pub label: String,
    pub counter: LoopCounter,
    pub indentation: Option<usize>,
}

/// Parse `sub[s] dst, src, #1`.
fn parse_counter_decrement(line: &str) -> Option<LoopCounter> {
    let line = line.trim();
    let rest = line
        .strip_prefix("subs")
        .or_else(|| line.strip_prefix("sub"))?;
    let args: Vec<&str> = rest.split(',').map(str::trim).collect();
    if args.len() != 3 || args[2] != "#1" {
        return None;
    }
    Some(LoopCounter {
        dst: args[0].to_string(),
        src: args[1].to_string(),
        imm: args[2].to_string(),
    })
}

/// Parse `cbnz|cbz|bne reg, label` (or `bne label`), returning the target.
fn parse_backwards_branch(line: &str) -> Option<&str> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let mnemonic = words.next()?;
    if !matches!(mnemonic, "cbnz" | "cbz" | "bne") {
        return None;
    }
    let rest: Vec<&str> = line[mnemonic.len()..].split(',').map(str::trim).collect();
    rest.last().copied()
}

/// Locate a decrement-and-branch loop with start label `label`.
pub fn extract_loop(source: &str, label: &str) -> Result<LoopRegion, AsmError> {
    let lines = source_lines(source);
    let mut pre = Vec::new();
    let mut body = Vec::new();
    let mut post = Vec::new();
    let mut counter = None;
    // 0: before label, 1: in body, 2: saw the decrement, 3: after branch.
    let mut state = 0;

    for line in &lines {
        let text = crate::strip_comment(&line.text);
        match state {
            0 => {
                if let Some(rest) = match_label(&line.text, label) {
                    state = 1;
                    if !rest.trim().is_empty() {
                        body.push(SourceLine::new(rest, line.number));
                    }
                } else {
                    pre.push(line.clone());
                }
            }
            1 => {
                if let Some(c) = parse_counter_decrement(&text) {
                    counter = Some(c);
                    state = 2;
                } else {
                    body.push(line.clone());
                }
            }
            2 => {
                if parse_backwards_branch(&text) == Some(label) {
                    state = 3;
                } else {
                    body.push(line.clone());
                }
            }
            _ => post.push(line.clone()),
        }
    }

    if state < 3 {
        return Err(AsmError::LoopNotFound(label.to_string()));
    }
    let indentation = crate::find_indentation(body.iter().map(|l| l.text.as_str()));
    Ok(LoopRegion {
        pre,
        body: reduce_source(&body, false),
        post,
        label: label.to_string(),
        counter: counter.unwrap_or(LoopCounter {
            dst: String::new(),
            src: String::new(),
            imm: String::new(),
        }),
        indentation,
    })
}

/// Counter adjustment for an unrolled loop: `unroll` iterations per pass
/// shift the trip count right by log2(unroll).
pub fn loop_counter_adjust(counter: &str, unroll: usize, indent: usize) -> Option<String> {
    if unroll <= 1 {
        return None;
    }
    debug_assert!(unroll.is_power_of_two());
    let pad = " ".repeat(indent);
    Some(format!(
        "{pad}lsr {counter}, {counter}, #{}",
        unroll.trailing_zeros()
    ))
}

/// Emit the decrement-and-branch pair closing a loop.
pub fn loop_end(counter: &LoopCounter, label: &str, indent: usize) -> Vec<String> {
    let pad = " ".repeat(indent);
    vec![
        format!("{pad}subs {}, {}, {}", counter.dst, counter.src, counter.imm),
        format!("{pad}cbnz {}, {label}", counter.dst),
    ]
}
