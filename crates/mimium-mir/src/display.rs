// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! Textual dump of MIR — a debug artifact, but a testable contract (spec §4.1
//! / §8). Indentation is an explicit depth parameter threaded through the
//! recursion rather than mutable state on the block (Design Notes "Global
//! mutable state"): two dumps of the same MIR from different call sites
//! can never disagree about indentation.

use std::fmt;

use crate::instr::{CallKind, Instr};
use crate::MirBlock;

const INDENT: &str = "  ";

fn pad(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        write!(f, "{INDENT}")?;
    }
    Ok(())
}

impl MirBlock {
    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        pad(f, depth)?;
        writeln!(f, "{}:", self.label)?;
        for instr in &self.instructions {
            write_instr(instr, f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for MirBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

fn write_instr(instr: &Instr, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    pad(f, depth)?;
    match instr {
        Instr::Number { lv, value } => writeln!(f, "{lv} = {value}"),
        Instr::Symbol { lv, name } => writeln!(f, "{lv} = {name}"),
        Instr::Ref { lv, name } => writeln!(f, "{lv} = ref {name}"),
        Instr::Alloca { lv, ty } => writeln!(f, "{lv} = alloca {ty}"),
        Instr::Time { lv, value, time } => writeln!(f, "{lv} = {value}@{time}"),
        Instr::Op { lv, op, lhs, rhs } => writeln!(f, "{lv} = {lhs} {} {rhs}", op.as_str()),
        Instr::Assign { lv, value } => writeln!(f, "{lv} = assign {value}"),
        Instr::Fun { lv, args, body, free_vars } => {
            write!(f, "{lv} = fun {}", args.join(", "))?;
            if !free_vars.is_empty() {
                write!(f, " fv{{ {} }}", free_vars.join(", "))?;
            }
            writeln!(f)?;
            body.write_indented(f, depth + 1)
        }
        Instr::MakeClosure { lv, fname, captures, .. } => {
            writeln!(f, "{lv} = makeclosure {fname} {}", captures.join(", "))
        }
        Instr::Fcall { lv, fname, args, kind, is_timed } => {
            let timed = if *is_timed { "@timed" } else { "" };
            writeln!(f, "{lv} = app{}{timed} {fname} {}", kind.suffix(), args.join(", "))
        }
        Instr::Array { lv, args } => writeln!(f, "{lv} = array {}", args.join(", ")),
        Instr::ArrayAccess { lv, name, index } => writeln!(f, "{lv} = arrayaccess {name} {index}"),
        Instr::If { lv, cond, then_block, else_block } => {
            writeln!(f, "{lv} = if {cond}")?;
            then_block.write_indented(f, depth + 1)?;
            else_block.write_indented(f, depth + 1)
        }
        Instr::Return { lv, value } => writeln!(f, "{lv} = return {value}"),
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.suffix())
    }
}
