//! Register alias tracking via `.req` / `.unreq` directives.

use std::collections::HashMap;

use crate::{replace_word, AsmError, SourceLine};

/// Parse `alias .req reg`, returning `(alias, reg)`.
pub fn parse_req(line: &str) -> Option<(&str, &str)> {
    let mut words = line.split_whitespace();
    let alias = words.next()?;
    if words.next()? != ".req" {
        return None;
    }
    let reg = words.next()?;
    if words.next().is_some() {
        return None;
    }
    Some((alias, reg))
}

/// Parse `.unreq alias`, returning the alias.
pub fn parse_unreq(line: &str) -> Option<&str> {
    let mut words = line.split_whitespace();
    if words.next()? != ".unreq" {
        return None;
    }
    let alias = words.next()?;
    if words.next().is_some() {
        return None;
    }
    Some(alias)
}

/// Alias dictionary built from a source snippet. Aliases of aliases resolve
/// to the final register name at definition time.
#[derive(Debug, Clone, Default)]
pub struct Aliases {
    map: HashMap<String, String>,
}

impl Aliases {
    /// Scan a snippet for `.req`/`.unreq` directives.
    pub fn parse(src: &[SourceLine]) -> Result<Self, AsmError> {
        let mut aliases = Self::default();
        for line in src {
            aliases.parse_line(&line.text)?;
        }
        Ok(aliases)
    }

    fn parse_line(&mut self, line: &str) -> Result<(), AsmError> {
        let line = crate::strip_comment(line);
        if let Some((alias, reg)) = parse_req(&line) {
            if self.map.contains_key(alias) {
                return Err(AsmError::DoubleAlias(alias.to_string()));
            }
            // Chase one level so aliases of aliases land on the register.
            let target = self.map.get(reg).cloned().unwrap_or_else(|| reg.to_string());
            self.map.insert(alias.to_string(), target);
        } else if let Some(alias) = parse_unreq(&line) {
            if self.map.remove(alias).is_none() {
                return Err(AsmError::UnreqWithoutReq(alias.to_string()));
            }
        }
        Ok(())
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.map.get(alias).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Unfold every alias in one line.
    pub fn unfold_line(&self, line: &str) -> String {
        let mut out = line.to_string();
        for (alias, reg) in &self.map {
            out = replace_word(&out, alias, reg);
        }
        out
    }

    /// Unfold every alias across a snippet.
    pub fn unfold(&self, src: &[SourceLine]) -> Vec<SourceLine> {
        src.iter()
            .map(|l| SourceLine::new(self.unfold_line(&l.text), l.number))
            .collect()
    }
}
