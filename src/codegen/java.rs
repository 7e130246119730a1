//! Java printer: a `Runnable` class whose `run()` performs one step.

use super::ir::{Block, Program, Stmt};
use super::writer::{comment_text, CodeWriter};
use super::{Header, GENERATOR_NAME};

/// Reserved words and literals of Java
pub(crate) const KEYWORDS: &[&str] = &[
    "_", "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class",
    "const", "continue", "default", "do", "double", "else", "enum", "extends", "false", "final",
    "finally", "float", "for", "goto", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "native", "new", "null", "package", "private", "protected", "public",
    "return", "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw",
    "throws", "transient", "true", "try", "void", "volatile", "while",
];

/// Types the generated class declares, imports or implements
pub(crate) const TYPE_NAMES: &[&str] = &["State", "Random", "Runnable"];

pub(crate) fn render(program: &Program, header: &Header<'_>) -> String {
    let mut w = CodeWriter::new("\t");

    w.line(format!("/* Generated by: {}", GENERATOR_NAME));
    w.line(format!("   Generation date: {}", header.stamp()));
    w.line(" */");
    if let Some(package) = header.package {
        w.line(format!("package {};", package));
    }
    w.blank();
    w.line("import java.util.Random;");
    w.blank();
    w.open(format!("public class {} implements Runnable {{", header.type_name));

    state_enum(&mut w, program);

    w.line("private final Random random = new Random();");
    w.line("private State currentState;");

    w.open(format!("public {}() {{", header.type_name));
    match program.init {
        Some(ref init) => block(&mut w, program, init),
        None if program.states.is_empty() => {
            w.line("// FIXME: no state to start in");
            w.line("this.currentState = null;");
        }
        None => {
            w.line("State[] allStates = State.values();");
            w.line("this.currentState = allStates[this.random.nextInt(allStates.length)];");
        }
    }
    w.close("}");

    w.line("/** Replies the current state of the simulated FSM.");
    w.line(" * @return the current state of the simulated FSM.");
    w.line(" */");
    w.open("public State getCurrentState() {");
    w.line("return this.currentState;");
    w.close("}");

    w.line("/** Run one step of the simulation of the FSM.");
    w.line(" */");
    w.open("public void run() {");
    w.line("if (this.currentState == null) return;");
    w.line("switch (this.currentState) {");
    for (decl, step) in program.states.iter().zip(&program.steps) {
        w.open(format!("case {}: {{ // {}", decl.ident, comment_text(&decl.label)));
        block(&mut w, program, step);
        w.line("break;");
        w.close("}");
    }
    w.line("default: throw new IllegalStateException();");
    w.line("} // end of current-state switch");
    w.close("}");

    for action in &program.actions {
        w.open(format!("protected void action_{}() {{", action.name));
        if let Some(ref body) = action.body {
            w.verbatim(body);
        }
        w.close("}");
    }

    w.close(format!("}} // class {}", header.type_name));
    w.finish()
}

fn state_enum(w: &mut CodeWriter, program: &Program) {
    w.open("public enum State {");
    if program.states.is_empty() {
        w.line("// FIXME: Add states");
        w.line(";");
    }
    let last = program.states.len().saturating_sub(1);
    for (index, decl) in program.states.iter().enumerate() {
        w.line(format!("/** State: {}", comment_text(&decl.label)));
        w.line(" */");
        let separator = if index == last { ';' } else { ',' };
        w.line(format!("{}({}){}", decl.ident, decl.accepting, separator));
    }
    w.line("private final boolean isAccepting;");
    w.open("State(boolean isAccepting) {");
    w.line("this.isAccepting = isAccepting;");
    w.close("}");
    w.open("public boolean isAccepting() {");
    w.line("return this.isAccepting;");
    w.close("}");
    w.close("} // enum State");
}

fn block(w: &mut CodeWriter, program: &Program, stmts: &Block) {
    for stmt in stmts {
        match stmt {
            Stmt::Call(name) => w.line(format!("action_{}();", name)),
            Stmt::Enter(None) => w.line("this.currentState = null;"),
            Stmt::Enter(Some(index)) => match program.states.get(*index) {
                Some(decl) => w.line(format!("this.currentState = State.{};", decl.ident)),
                None => w.line("throw new IllegalStateException();"),
            },
            Stmt::Branch { arms, otherwise } => {
                for (position, arm) in arms.iter().enumerate() {
                    if position == 0 {
                        w.open(format!("if ({}) {{", arm.guard));
                    } else {
                        w.reopen(format!("}} else if ({}) {{", arm.guard));
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
                w.line(format!("switch (this.random.nextInt({})) {{", blocks.len()));
                for (index, choice) in blocks.iter().enumerate() {
                    w.open(format!("case {}: {{", index));
                    block(w, program, choice);
                    w.line("break;");
                    w.close("}");
                }
                w.line("default: throw new IllegalStateException();");
                w.line("} // end of random switch");
            }
        }
    }
}
