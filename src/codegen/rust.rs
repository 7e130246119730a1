//! Rust printer: a module holding the `State` enum and the machine struct.
//!
//! Guards and action bodies are copied verbatim, so they are lexed with
//! `proc_macro2` first to reject text that cannot be Rust.

use std::str::FromStr;

use proc_macro2::TokenStream;

use super::ir::{Block, Program, Stmt};
use super::writer::{comment_text, CodeWriter};
use super::{CodegenError, CodegenResult, Header, GENERATOR_NAME};

/// Strict and reserved keywords of Rust 2021
pub(crate) const KEYWORDS: &[&str] = &[
    "_", "abstract", "as", "async", "await", "become", "box", "break", "const", "continue",
    "crate", "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub",
    "ref", "return", "self", "Self", "static", "struct", "super", "trait", "true", "try",
    "type", "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Names the generated module declares or imports
pub(crate) const TYPE_NAMES: &[&str] = &["State", "Rng"];

pub(crate) fn render(program: &Program, header: &Header<'_>) -> CodegenResult<String> {
    check_tokens(program)?;

    let mut w = CodeWriter::new("    ");
    w.line(format!("// Generated by: {}", GENERATOR_NAME));
    w.line(format!("// Generation date: {}", header.stamp()));
    w.blank();

    let modules: Vec<&str> = header.package.map(|p| p.split('.').collect()).unwrap_or_default();
    for module in &modules {
        w.open(format!("pub mod {} {{", module));
    }

    w.line("use rand::Rng;");
    w.blank();
    state_enum(&mut w, program);
    w.blank();
    machine(&mut w, program, header.type_name);

    for module in modules.iter().rev() {
        w.close(format!("}} // mod {}", module));
    }
    Ok(w.finish())
}

fn check_tokens(program: &Program) -> CodegenResult<()> {
    let mut guards = Vec::new();
    program.walk(&mut |stmt: &Stmt| {
        if let Stmt::Branch { arms, .. } = stmt {
            guards.extend(arms.iter().map(|arm| arm.guard.clone()));
        }
    });
    for guard in guards {
        if let Err(err) = TokenStream::from_str(&guard) {
            return Err(CodegenError::InvalidGuard {
                guard,
                reason: err.to_string(),
            });
        }
    }

    for action in &program.actions {
        if let Some(ref body) = action.body {
            if let Err(err) = TokenStream::from_str(body) {
                return Err(CodegenError::InvalidActionBody {
                    action: action.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn state_enum(w: &mut CodeWriter, program: &Program) {
    w.line("/// States of the simulated machine.");
    w.line("#[allow(non_camel_case_types)]");
    w.line("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]");
    w.open("pub enum State {");
    if program.states.is_empty() {
        w.line("// FIXME: Add states");
    }
    for decl in &program.states {
        w.line(format!("/// State: {}", comment_text(&decl.label)));
        w.line(format!("{},", decl.ident));
    }
    w.close("}");
    w.blank();

    w.open("impl State {");
    let all: Vec<String> = program
        .states
        .iter()
        .map(|decl| format!("State::{}", decl.ident))
        .collect();
    w.line("/// Every state, in declaration order.");
    w.line(format!(
        "pub const ALL: [State; {}] = [{}];",
        all.len(),
        all.join(", ")
    ));
    w.blank();
    w.line("/// Whether halting in this state accepts.");
    w.open("pub fn is_accepting(self) -> bool {");
    w.open("match self {");
    for decl in &program.states {
        w.line(format!("State::{} => {},", decl.ident, decl.accepting));
    }
    w.close("}");
    w.close("}");
    w.close("}");
}

fn machine(w: &mut CodeWriter, program: &Program, type_name: &str) {
    w.line("#[allow(dead_code)]");
    w.open(format!("pub struct {} {{", type_name));
    w.line("rng: rand::rngs::ThreadRng,");
    w.line("current_state: Option<State>,");
    w.close("}");
    w.blank();

    w.open(format!("impl {} {{", type_name));
    w.open("pub fn new() -> Self {");
    w.open("let mut machine = Self {");
    w.line("rng: rand::rng(),");
    w.line("current_state: None,");
    w.close("};");
    w.line("machine.start();");
    w.line("machine");
    w.close("}");
    w.blank();

    w.open("fn start(&mut self) {");
    match program.init {
        Some(ref init) => block(w, program, init),
        None if program.states.is_empty() => {
            w.line("// FIXME: no state to start in");
        }
        None => {
            w.line("let index = self.rng.random_range(0..State::ALL.len());");
            w.line("self.current_state = Some(State::ALL[index]);");
        }
    }
    w.close("}");
    w.blank();

    w.line("/// Replies the current state of the simulated machine.");
    w.open("pub fn current_state(&self) -> Option<State> {");
    w.line("self.current_state");
    w.close("}");
    w.blank();

    w.line("/// Runs one step of the simulation.");
    w.open("pub fn run(&mut self) {");
    w.open("let Some(state) = self.current_state else {");
    w.line("return;");
    w.close("};");
    w.open("match state {");
    for (decl, step) in program.states.iter().zip(&program.steps) {
        w.open(format!("State::{} => {{ // {}", decl.ident, comment_text(&decl.label)));
        block(w, program, step);
        w.close("}");
    }
    w.close("}");
    w.close("}");

    for action in &program.actions {
        w.blank();
        w.line("#[allow(dead_code)]");
        w.open(format!("fn action_{}(&mut self) {{", action.name));
        if let Some(ref body) = action.body {
            w.verbatim(body);
        }
        w.close("}");
    }
    w.close("}");
    w.blank();

    w.open(format!("impl Default for {} {{", type_name));
    w.open("fn default() -> Self {");
    w.line("Self::new()");
    w.close("}");
    w.close("}");
}

fn block(w: &mut CodeWriter, program: &Program, stmts: &Block) {
    for stmt in stmts {
        match stmt {
            Stmt::Call(name) => w.line(format!("self.action_{}();", name)),
            Stmt::Enter(None) => w.line("self.current_state = None;"),
            Stmt::Enter(Some(index)) => match program.states.get(*index) {
                Some(decl) => w.line(format!("self.current_state = Some(State::{});", decl.ident)),
                None => w.line("unreachable!(\"unknown target state\");"),
            },
            Stmt::Branch { arms, otherwise } => {
                for (position, arm) in arms.iter().enumerate() {
                    if position == 0 {
                        w.open(format!("if {} {{", arm.guard));
                    } else {
                        w.reopen(format!("}} else if {} {{", arm.guard));
                    }
                    block(w, program, &arm.body);
                }
                if let Some(otherwise) = otherwise {
                    w.reopen("} else {");
                    block(w, program, otherwise);
                }
                w.close("}");
            }
            Stmt::Choose(blocks) => {
                w.open(format!("match self.rng.random_range(0..{}) {{", blocks.len()));
                for (index, choice) in blocks.iter().enumerate() {
                    w.open(format!("{} => {{", index));
                    block(w, program, choice);
                    w.close("}");
                }
                w.line("_ => unreachable!(\"random index out of range\"),");
                w.close("}");
            }
        }
    }
}
