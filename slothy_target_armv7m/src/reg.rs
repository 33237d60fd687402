//! Architectural register file of the target.

pub const GPRS: &[&str] = &[
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "r13", "r14",
];

pub const FPRS: &[&str] = &[
    "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11", "s12", "s13", "s14",
    "s15", "s16", "s17", "s18", "s19", "s20", "s21", "s22", "s23", "s24", "s25", "s26", "s27",
    "s28", "s29", "s30", "s31",
];

pub const VECTORS: &[&str] = &["q0", "q1", "q2", "q3", "q4", "q5", "q6", "q7"];

pub const FLAGS: &[&str] = &["flags"];

/// Registers the renamer must never hand out: stack pointer, link register,
/// and the flags resource.
pub const RESERVED: &[&str] = &["r13", "r14", "flags"];

pub const ALIASES: &[(&str, &str)] = &[("lr", "r14"), ("sp", "r13")];
