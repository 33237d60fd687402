//! Tokenizer and matcher for instruction patterns.
//!
//! A pattern is assembly text with typed placeholders: `ldr <Rd>, [<Ra>, <imm>]`.
//! The first letter of a register placeholder selects its class (R = GPR,
//! S = FPR, Q = vector). `<imm>` matches a `#`-prefixed immediate.
//! Matching is token-based so whitespace is irrelevant; matched operand
//! spans are recorded so classification can rebuild a render template from
//! the original line.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// Word with its byte span in the source text.
    Word {
        text: String,
        start: usize,
        end: usize,
    },
    /// Placeholder `<name>`; only produced for pattern text.
    Placeholder(String),
    Punct(char),
}

pub(crate) fn tokenize(text: &str) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_' || b == b'.';
    // Immediates may carry simple expressions: #-4, #(3*4), #2/2.
    let is_imm = |b: u8| {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'+' | b'-' | b'*' | b'/' | b'(' | b')' | b'=')
    };

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
        } else if b == b'<' {
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && bytes[j] != b'>' {
                j += 1;
            }
            tokens.push(Token::Placeholder(text[start..j].to_string()));
            i = (j + 1).min(bytes.len());
        } else if b == b'#' {
            tokens.push(Token::Punct('#'));
            let start = i + 1;
            let mut j = start;
            while j < bytes.len() && is_imm(bytes[j]) {
                j += 1;
            }
            tokens.push(Token::Word {
                text: text[start..j].to_string(),
                start,
                end: j,
            });
            i = j;
        } else if is_word(b) {
            let start = i;
            let mut j = i;
            while j < bytes.len() && is_word(bytes[j]) {
                j += 1;
            }
            tokens.push(Token::Word {
                text: text[start..j].to_string(),
                start,
                end: j,
            });
            i = j;
        } else {
            tokens.push(Token::Punct(b as char));
            i += 1;
        }
    }
    tokens
}

/// One placeholder binding: the placeholder name, the matched text, and the
/// byte span the binding covers in the source line (immediates include the
/// leading `#`).
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub name: String,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Mnemonic without width/datatype suffixes: `vldrw.u32` -> `vldrw`.
pub(crate) fn mnemonic_base(word: &str) -> &str {
    word.split('.').next().unwrap_or(word)
}

/// Match `line` against `pattern`. On success returns the placeholder
/// bindings in pattern order.
pub(crate) fn match_pattern(pattern: &str, line: &str) -> Option<Vec<Binding>> {
    let pat = tokenize(pattern);
    let src = tokenize(line);

    // The mnemonic word must agree modulo suffixes.
    let (Some(Token::Word { text: pm, .. }), Some(Token::Word { text: sm, .. })) =
        (pat.first(), src.first())
    else {
        return None;
    };
    if mnemonic_base(pm) != mnemonic_base(sm) {
        return None;
    }

    let mut bindings = Vec::new();
    let mut si = 1;
    for pt in &pat[1..] {
        match pt {
            Token::Placeholder(name) if name == "imm" => {
                // `#` followed by the immediate text.
                let Some(Token::Punct('#')) = src.get(si) else {
                    return None;
                };
                let Some(Token::Word { text, start, end }) = src.get(si + 1) else {
                    return None;
                };
                bindings.push(Binding {
                    name: name.clone(),
                    text: format!("#{text}"),
                    start: start - 1,
                    end: *end,
                });
                si += 2;
            }
            Token::Placeholder(name) => {
                let Some(Token::Word { text, start, end }) = src.get(si) else {
                    return None;
                };
                bindings.push(Binding {
                    name: name.clone(),
                    text: text.clone(),
                    start: *start,
                    end: *end,
                });
                si += 1;
            }
            Token::Word { text: pw, .. } => {
                let Some(Token::Word { text: sw, .. }) = src.get(si) else {
                    return None;
                };
                if pw != sw {
                    return None;
                }
                si += 1;
            }
            Token::Punct(pc) => {
                let Some(Token::Punct(sc)) = src.get(si) else {
                    return None;
                };
                if pc != sc {
                    return None;
                }
                si += 1;
            }
        }
    }

    // The whole line must be consumed.
    if si != src.len() {
        return None;
    }
    Some(bindings)
}
