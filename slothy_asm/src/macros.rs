//! Assembly macro extraction and unfolding.
//!
//! Supports the `.macro name arg, arg ... .endm` form with `\arg`
//! substitution in the body. Unfolding iterates to a fixed point so macros
//! may invoke other macros.

use std::collections::HashMap;

use crate::{strip_comment, SourceLine};

/// A parsed macro definition.
#[derive(Debug, Clone)]
pub struct AsmMacro {
    pub name: String,
    pub args: Vec<String>,
    pub body: Vec<String>,
}

impl AsmMacro {
    /// Parse all `.macro` definitions in a source file. Macros annotated
    /// `// slothy:no-unfold` on the `.macro` line are skipped.
    pub fn extract(src: &[SourceLine]) -> HashMap<String, AsmMacro> {
        let mut macros = HashMap::new();
        let mut current: Option<AsmMacro> = None;

        for line in src {
            let text = line.text.trim();
            if current.is_none() {
                let Some(rest) = text.strip_prefix(".macro") else {
                    continue;
                };
                if text.contains("slothy:no-unfold") {
                    continue;
                }
                let rest = strip_comment(rest);
                let mut words = rest.split_whitespace();
                let Some(name) = words.next() else { continue };
                let args: Vec<String> = words
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split(',')
                    .map(|a| a.trim().to_string())
                    .filter(|a| !a.is_empty())
                    .collect();
                current = Some(AsmMacro {
                    name: name.to_string(),
                    args,
                    body: Vec::new(),
                });
            } else if text.starts_with(".endm") {
                if let Some(m) = current.take() {
                    macros.insert(m.name.clone(), m);
                }
            } else if let Some(m) = current.as_mut() {
                m.body.push(line.text.clone());
            }
        }
        macros
    }

    /// Instantiate the body with concrete arguments.
    pub fn expand(&self, bindings: &HashMap<&str, &str>) -> Vec<String> {
        self.body
            .iter()
            .map(|l| {
                let mut out = l.clone();
                for arg in &self.args {
                    if let Some(value) = bindings.get(arg.as_str()) {
                        out = substitute_arg(&out, arg, value);
                    }
                }
                out.replace("\\()", "")
            })
            .collect()
    }

    /// Try to parse `line` as an invocation of this macro; on success return
    /// the expansion, indented like the invocation.
    fn try_invoke(&self, line: &str) -> Option<Vec<String>> {
        let reduced = crate::reduce_line(line)?;
        let mut words = reduced.splitn(2, char::is_whitespace);
        if words.next()? != self.name {
            return None;
        }
        let rest = words.next().unwrap_or("");
        let given: Vec<&str> = rest
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect();
        if given.len() != self.args.len() {
            return None;
        }
        let bindings: HashMap<&str, &str> = self
            .args
            .iter()
            .map(String::as_str)
            .zip(given)
            .collect();
        let indent = " ".repeat(line.len() - line.trim_start().len());
        Some(
            self.expand(&bindings)
                .into_iter()
                .map(|l| format!("{indent}{}", l.trim_start()))
                .collect(),
        )
    }

    /// Unfold all invocations of this macro in a snippet. Returns the new
    /// snippet and whether anything changed.
    pub fn unfold_in(&self, src: Vec<SourceLine>) -> (Vec<SourceLine>, bool) {
        let mut out = Vec::with_capacity(src.len());
        let mut changed = false;
        for line in src {
            match self.try_invoke(&line.text) {
                Some(expansion) => {
                    changed = true;
                    out.extend(
                        expansion
                            .into_iter()
                            .map(|text| SourceLine::new(text, line.number)),
                    );
                }
                None => out.push(line),
            }
        }
        (out, changed)
    }

    /// Unfold a set of macros to a fixed point.
    pub fn unfold_all(macros: &HashMap<String, AsmMacro>, src: Vec<SourceLine>) -> Vec<SourceLine> {
        let mut src = src;
        loop {
            let mut changed = false;
            // Deterministic order regardless of map iteration.
            let mut names: Vec<&String> = macros.keys().collect();
            names.sort();
            for name in names {
                let (next, c) = macros[name].unfold_in(src);
                src = next;
                changed |= c;
            }
            if !changed {
                return src;
            }
        }
    }
}

/// Replace `\arg` when followed by a non-word character or end of line.
fn substitute_arg(line: &str, arg: &str, value: &str) -> String {
    let needle = format!("\\{arg}");
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(pos) = rest.find(&needle) {
        let after = &rest[pos + needle.len()..];
        let boundary = after
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric() && c != '_');
        out.push_str(&rest[..pos]);
        if boundary {
            out.push_str(value);
            rest = after;
        } else {
            out.push_str(&needle);
            rest = after;
        }
    }
    out.push_str(rest);
    out
}
