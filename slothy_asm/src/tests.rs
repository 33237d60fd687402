//! Unit tests for source handling.

use std::collections::HashMap;

use crate::alias::Aliases;
use crate::macros::AsmMacro;
use crate::region::{extract, extract_loop, loop_counter_adjust, loop_end, LoopCounter};
use crate::{
    apply_indentation, find_indentation, parse_label, reduce_line, replace_word, source_lines,
    strip_comment, AsmError,
};

#[test]
fn comments_are_stripped() {
    assert_eq!(strip_comment("add r0, r1, r2 // comment"), "add r0, r1, r2");
    assert_eq!(strip_comment("add r0, /* mid */ r1, r2"), "add r0,  r1, r2");
    assert_eq!(strip_comment("# a cpp-style line"), "");
    // `#` inside a line is an immediate, not a comment.
    assert_eq!(strip_comment("mov r0, #1"), "mov r0, #1");
}

#[test]
fn labels_and_directives_reduce_away() {
    assert_eq!(reduce_line("start:"), None);
    assert_eq!(reduce_line(".p2align 2"), None);
    assert_eq!(reduce_line("count .req r4"), None);
    assert_eq!(reduce_line("  "), None);
    assert_eq!(reduce_line(" mov r0, #1 "), Some("mov r0, #1".to_string()));
}

#[test]
fn label_parsing() {
    assert_eq!(parse_label("loop_start:"), Some("loop_start"));
    assert_eq!(parse_label("  2:  "), Some("2"));
    assert_eq!(parse_label("mov r0, r1"), None);
}

#[test]
fn semicolons_split_statements() {
    let lines = source_lines("mov r0, #1; mov r1, #2\nadd r2, r0, r1");
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].number, 1);
    assert_eq!(lines[1].number, 1);
    assert_eq!(lines[2].number, 2);
}

#[test]
fn word_replacement_respects_boundaries() {
    assert_eq!(replace_word("add acc, acc2, acc", "acc", "r4"), "add r4, acc2, r4");
}

#[test]
fn aliases_parse_and_unfold() {
    let src = source_lines("count .req r4\nother .req count\nadd count, other, #1");
    let aliases = Aliases::parse(&src).unwrap();
    assert_eq!(aliases.get("count"), Some("r4"));
    // Alias of an alias chases to the register.
    assert_eq!(aliases.get("other"), Some("r4"));
    assert_eq!(aliases.unfold_line("add count, other, #1"), "add r4, r4, #1");
}

#[test]
fn alias_double_definition_is_an_error() {
    let src = source_lines("x .req r0\nx .req r1");
    assert!(matches!(Aliases::parse(&src), Err(AsmError::DoubleAlias(_))));
}

#[test]
fn unreq_without_req_is_an_error() {
    let src = source_lines(".unreq ghost");
    assert!(matches!(
        Aliases::parse(&src),
        Err(AsmError::UnreqWithoutReq(_))
    ));
}

#[test]
fn unreq_removes_alias() {
    let src = source_lines("x .req r0\n.unreq x");
    let aliases = Aliases::parse(&src).unwrap();
    assert!(aliases.is_empty());
}

#[test]
fn macros_extract_and_unfold() {
    let src = source_lines(
        ".macro addsub d, a, b\n    add \\d, \\a, \\b\n    sub \\d, \\d, \\b\n.endm\n\
         start:\n    addsub r0, r1, r2\n",
    );
    let macros = AsmMacro::extract(&src);
    assert_eq!(macros.len(), 1);
    let out = AsmMacro::unfold_all(&macros, src);
    let texts: Vec<&str> = out.iter().map(|l| l.text.as_str()).collect();
    assert!(texts.contains(&"    add r0, r1, r2"));
    assert!(texts.contains(&"    sub r0, r0, r2"));
}

#[test]
fn macro_expansion_substitutes_on_word_boundaries() {
    let m = AsmMacro {
        name: "m".to_string(),
        args: vec!["a".to_string()],
        body: vec!["add \\a, \\a2, \\a".to_string()],
    };
    let bindings: HashMap<&str, &str> = [("a", "r7")].into_iter().collect();
    // `\a2` is a different parameter and must survive.
    assert_eq!(m.expand(&bindings), vec!["add r7, \\a2, r7"]);
}

#[test]
fn region_extraction_between_labels() {
    let src = "prologue:\n  mov r0, #0\nstart:\n  add r0, r0, #1\n  sub r1, r1, #2\nend:\n  bx lr\n";
    let region = extract(src, Some("start"), Some("end")).unwrap();
    assert_eq!(region.body.len(), 2);
    assert_eq!(region.body[0].text, "add r0, r0, #1");
    assert!(region.pre.iter().any(|l| l.text.contains("prologue")));
    assert!(region.post.iter().any(|l| l.text.contains("bx lr")));
}

#[test]
fn region_missing_label_is_an_error() {
    let err = extract("mov r0, #0", Some("nowhere"), None).unwrap_err();
    assert!(matches!(err, AsmError::LabelNotFound(_)));
}

#[test]
fn loop_extraction_recognizes_decrement_and_branch() {
    let src = "\
        mov r14, #16\n\
        mytestloop:\n\
        vldrw q0, [r0], #16\n\
        vstrw q0, [r1], #16\n\
        subs r14, r14, #1\n\
        cbnz r14, mytestloop\n\
        bx lr\n";
    let lp = extract_loop(src, "mytestloop").unwrap();
    assert_eq!(lp.body.len(), 2);
    assert_eq!(
        lp.counter,
        LoopCounter {
            dst: "r14".to_string(),
            src: "r14".to_string(),
            imm: "#1".to_string()
        }
    );
    assert!(lp.post.iter().any(|l| l.text.contains("bx lr")));
}

#[test]
fn loop_emission_round_trips() {
    let counter = LoopCounter {
        dst: "r14".to_string(),
        src: "r14".to_string(),
        imm: "#1".to_string(),
    };
    let adjust = loop_counter_adjust("r14", 4, 8).unwrap();
    assert_eq!(adjust.trim(), "lsr r14, r14, #2");
    // No adjustment without unrolling.
    assert_eq!(loop_counter_adjust("r14", 1, 8), None);
    let end = loop_end(&counter, "kernel", 8);
    assert_eq!(end[0].trim(), "subs r14, r14, #1");
    assert_eq!(end[1].trim(), "cbnz r14, kernel");
}

#[test]
fn indentation_detection() {
    let lines = ["    add r0, r0, r1", "    sub r2, r2, r3", "lbl:"];
    assert_eq!(find_indentation(lines.iter().copied()), Some(4));
    let out = apply_indentation(vec!["mov r0, #1".to_string()], Some(2));
    assert_eq!(out[0], "  mov r0, #1");
}
