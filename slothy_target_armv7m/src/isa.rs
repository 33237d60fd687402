//! The instruction table and the [`Arch`] implementation.

use slothy_ir::inst::{AddrExpr, Instruction, MemEffect, Operand, OperandRole};
use slothy_ir::reg::RegisterClass;
use slothy_target::arch::{Arch, ClassifyError};

use crate::pattern::{match_pattern, Binding};
use crate::reg;

/// One instruction table entry. Placeholder names appear in exactly one of
/// `inputs` / `outputs` / `in_outs`; their first letter fixes the register
/// class (R = GPR, S = FPR, Q = vector).
struct InstDesc {
    pattern: &'static str,
    inputs: &'static [&'static str],
    outputs: &'static [&'static str],
    in_outs: &'static [&'static str],
    modifies_flags: bool,
    depends_on_flags: bool,
    mem: MemEffect,
    /// Placeholder naming the address base register, for memory ops.
    addr_base: Option<&'static str>,
    /// Whether the pattern's `<imm>` is the access offset (`[rN, #off]`
    /// form) as opposed to a post-increment amount (`[rN], #inc`).
    imm_is_offset: bool,
}

const D: InstDesc = InstDesc {
    pattern: "",
    inputs: &[],
    outputs: &[],
    in_outs: &[],
    modifies_flags: false,
    depends_on_flags: false,
    mem: MemEffect::None,
    addr_base: None,
    imm_is_offset: false,
};

/// The Armv7-M + MVE instruction table. Order matters: the first matching
/// pattern wins, so more specific forms come first.
const TABLE: &[InstDesc] = &[
    // -- Scalar arithmetic --
    InstDesc { pattern: "add <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "add <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "adds <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], modifies_flags: true, ..D },
    InstDesc { pattern: "sub <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "sub <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "subs <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], modifies_flags: true, ..D },
    InstDesc { pattern: "subs <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], modifies_flags: true, ..D },
    InstDesc { pattern: "rsb <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "mul <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "mla <Rd>, <Ra>, <Rb>, <Rc>", inputs: &["Ra", "Rb", "Rc"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "mov <Rd>, <Ra>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "mov <Rd>, <imm>", outputs: &["Rd"], ..D },
    InstDesc { pattern: "movw <Rd>, <imm>", outputs: &["Rd"], ..D },
    InstDesc { pattern: "movt <Rd>, <imm>", in_outs: &["Rd"], ..D },
    // -- Logical and shifts --
    InstDesc { pattern: "and <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "and <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "orr <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "eor <Rd>, <Ra>, <Rb>", inputs: &["Ra", "Rb"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "lsl <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "lsr <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "asr <Rd>, <Ra>, <imm>", inputs: &["Ra"], outputs: &["Rd"], ..D },
    // -- Compare --
    InstDesc { pattern: "cmp <Ra>, <Rb>", inputs: &["Ra", "Rb"], modifies_flags: true, ..D },
    InstDesc { pattern: "cmp <Ra>, <imm>", inputs: &["Ra"], modifies_flags: true, ..D },
    // -- Scalar memory --
    InstDesc { pattern: "ldr <Rd>, [<Ra>, <imm>]", inputs: &["Ra"], outputs: &["Rd"], mem: MemEffect::Load, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    InstDesc { pattern: "ldr <Rd>, [<Ra>], <imm>", outputs: &["Rd"], in_outs: &["Ra"], mem: MemEffect::Load, addr_base: Some("Ra"), ..D },
    InstDesc { pattern: "ldr <Rd>, [<Ra>]", inputs: &["Ra"], outputs: &["Rd"], mem: MemEffect::Load, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    InstDesc { pattern: "str <Rs>, [<Ra>, <imm>]", inputs: &["Rs", "Ra"], mem: MemEffect::Store, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    InstDesc { pattern: "str <Rs>, [<Ra>], <imm>", inputs: &["Rs"], in_outs: &["Ra"], mem: MemEffect::Store, addr_base: Some("Ra"), ..D },
    InstDesc { pattern: "str <Rs>, [<Ra>]", inputs: &["Rs", "Ra"], mem: MemEffect::Store, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    // -- FP moves --
    InstDesc { pattern: "vmov <Rd>, <Sa>", inputs: &["Sa"], outputs: &["Rd"], ..D },
    InstDesc { pattern: "vmov <Sd>, <Ra>", inputs: &["Ra"], outputs: &["Sd"], ..D },
    // -- MVE vector --
    InstDesc { pattern: "vldrw <Qd>, [<Ra>, <imm>]", inputs: &["Ra"], outputs: &["Qd"], mem: MemEffect::Load, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    InstDesc { pattern: "vldrw <Qd>, [<Ra>], <imm>", outputs: &["Qd"], in_outs: &["Ra"], mem: MemEffect::Load, addr_base: Some("Ra"), ..D },
    InstDesc { pattern: "vldrw <Qd>, [<Ra>]", inputs: &["Ra"], outputs: &["Qd"], mem: MemEffect::Load, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    InstDesc { pattern: "vstrw <Qs>, [<Ra>, <imm>]", inputs: &["Qs", "Ra"], mem: MemEffect::Store, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    InstDesc { pattern: "vstrw <Qs>, [<Ra>], <imm>", inputs: &["Qs"], in_outs: &["Ra"], mem: MemEffect::Store, addr_base: Some("Ra"), ..D },
    InstDesc { pattern: "vstrw <Qs>, [<Ra>]", inputs: &["Qs", "Ra"], mem: MemEffect::Store, addr_base: Some("Ra"), imm_is_offset: true, ..D },
    InstDesc { pattern: "vmla <Qda>, <Qn>, <Ra>", inputs: &["Qn", "Ra"], in_outs: &["Qda"], ..D },
    InstDesc { pattern: "vmul <Qd>, <Qn>, <Ra>", inputs: &["Qn", "Ra"], outputs: &["Qd"], ..D },
    InstDesc { pattern: "vmul <Qd>, <Qn>, <Qm>", inputs: &["Qn", "Qm"], outputs: &["Qd"], ..D },
    InstDesc { pattern: "vadd <Qd>, <Qn>, <Qm>", inputs: &["Qn", "Qm"], outputs: &["Qd"], ..D },
    InstDesc { pattern: "vsub <Qd>, <Qn>, <Qm>", inputs: &["Qn", "Qm"], outputs: &["Qd"], ..D },
    InstDesc { pattern: "vand <Qd>, <Qn>, <Qm>", inputs: &["Qn", "Qm"], outputs: &["Qd"], ..D },
    InstDesc { pattern: "vdup <Qd>, <Ra>", inputs: &["Ra"], outputs: &["Qd"], ..D },
    InstDesc { pattern: "vmov <Qd>, <Qm>", inputs: &["Qm"], outputs: &["Qd"], ..D },
];

/// Register class from a placeholder's first letter.
fn placeholder_class(name: &str) -> RegisterClass {
    match name.as_bytes().first() {
        Some(b'R') => RegisterClass::Gpr,
        Some(b'S') => RegisterClass::Fpr,
        Some(b'Q') => RegisterClass::Vector,
        _ => RegisterClass::Gpr,
    }
}

fn role_of(desc: &InstDesc, name: &str) -> Option<OperandRole> {
    if desc.outputs.contains(&name) {
        Some(OperandRole::Write)
    } else if desc.in_outs.contains(&name) {
        Some(OperandRole::ReadWrite)
    } else if desc.inputs.contains(&name) {
        Some(OperandRole::Read)
    } else {
        None
    }
}

/// Build the render template: the line with each bound operand span
/// replaced by `{i}`.
fn build_template(line: &str, bindings: &[Binding]) -> String {
    let mut template = line.to_string();
    let mut spans: Vec<(usize, usize, usize)> = bindings
        .iter()
        .enumerate()
        .map(|(i, b)| (b.start, b.end, i))
        .collect();
    spans.sort_by_key(|&(start, _, _)| std::cmp::Reverse(start));
    for (start, end, i) in spans {
        template.replace_range(start..end, &format!("{{{i}}}"));
    }
    template
}

fn build_instruction(desc: &InstDesc, line: &str, bindings: Vec<Binding>) -> Instruction {
    let mnemonic = line.split_whitespace().next().unwrap_or("").to_string();
    let template = build_template(line, &bindings);

    let mut operands = Vec::with_capacity(bindings.len() + 1);
    let mut immediate = None;
    let mut base: Option<String> = None;
    let mut offset: Option<i64> = None;

    for b in &bindings {
        if b.name == "imm" {
            let text = b.text.trim_start_matches('#');
            if immediate.is_none() {
                immediate = Some(text.to_string());
            }
            if desc.imm_is_offset && offset.is_none() {
                offset = text.parse::<i64>().ok();
            }
            operands.push(Operand::immediate(&b.text));
            continue;
        }
        let Some(role) = role_of(desc, &b.name) else {
            continue;
        };
        let class = placeholder_class(&b.name);
        let is_base = desc.addr_base == Some(b.name.as_str());
        if is_base {
            base = Some(b.text.clone());
        }
        operands.push(Operand {
            name: b.text.clone(),
            role,
            class: Some(class),
            address: is_base,
        });
    }

    if desc.modifies_flags {
        operands.push(Operand::write("flags", RegisterClass::Flags));
    }
    if desc.depends_on_flags {
        operands.push(Operand::read("flags", RegisterClass::Flags));
    }

    let addr = base.map(|base| AddrExpr {
        base,
        // Post-increment accesses at the pre-increment address: offset 0.
        offset: if desc.imm_is_offset { offset.unwrap_or(0) } else { 0 },
    });

    Instruction {
        mnemonic,
        template,
        operands,
        immediate,
        mem: desc.mem,
        addr,
        inplace: None,
    }
}

/// The Armv7-M + MVE architecture model.
#[derive(Debug, Clone, Copy, Default)]
pub struct Armv7m;

impl Arch for Armv7m {
    fn name(&self) -> &'static str {
        "armv7m"
    }

    fn classify(&self, text: &str) -> Result<Instruction, ClassifyError> {
        let line = text.trim();
        for desc in TABLE {
            if let Some(bindings) = match_pattern(desc.pattern, line) {
                return Ok(build_instruction(desc, line, bindings));
            }
        }
        Err(ClassifyError {
            text: line.to_string(),
            reason: "no instruction pattern matches; the table may need a new (variant of the) \
                     instruction"
                .to_string(),
        })
    }

    fn registers(&self, class: RegisterClass) -> &'static [&'static str] {
        match class {
            RegisterClass::Gpr => reg::GPRS,
            RegisterClass::Fpr => reg::FPRS,
            RegisterClass::Vector => reg::VECTORS,
            RegisterClass::Flags => reg::FLAGS,
        }
    }

    fn register_class(&self, name: &str) -> Option<RegisterClass> {
        if reg::GPRS.contains(&name) {
            Some(RegisterClass::Gpr)
        } else if reg::FPRS.contains(&name) {
            Some(RegisterClass::Fpr)
        } else if reg::VECTORS.contains(&name) {
            Some(RegisterClass::Vector)
        } else if reg::FLAGS.contains(&name) {
            Some(RegisterClass::Flags)
        } else {
            None
        }
    }

    fn reserved(&self) -> &'static [&'static str] {
        reg::RESERVED
    }

    fn aliases(&self) -> &'static [(&'static str, &'static str)] {
        reg::ALIASES
    }
}
