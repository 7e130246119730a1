//! Simulation of a lowered machine
//!
//! Runs a [`Program`] the way the generated code would, with guards
//! answered by the caller and random choices drawn from any [`Rng`].

use log::trace;
use rand::Rng;

use crate::codegen::ir::{Block, Program, StateDecl, Stmt};


/// Interpreter state for one run of a program
#[derive(Debug, Clone)]
pub struct Simulation<'p> {
    program: &'p Program,
    current: Option<usize>,
    trace: Vec<String>,
}

impl<'p> Simulation<'p> {
    /// A halted simulation; call [`Simulation::start`] to initialise it
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            current: None,
            trace: Vec::new(),
        }
    }

    /// Run the initialisation dispatch
    ///
    /// Without start transitions a state is drawn uniformly; an empty
    /// program stays halted.
    pub fn start<R, G>(&mut self, rng: &mut R, guards: G)
    where
        R: Rng,
        G: Fn(&str) -> bool,
    {
        let program = self.program;
        self.current = None;
        match program.init {
            Some(ref init) => self.exec(init, rng, &guards),
            None if program.states.is_empty() => {}
            None => self.current = Some(rng.random_range(0..program.states.len())),
        }
    }

    /// Run one step; a halted simulation does nothing
    pub fn step<R, G>(&mut self, rng: &mut R, guards: G)
    where
        R: Rng,
        G: Fn(&str) -> bool,
    {
        let Some(index) = self.current else {
            return;
        };
        let program = self.program;
        if let Some(block) = program.steps.get(index) {
            self.exec(block, rng, &guards);
        }
    }

    pub fn current_state(&self) -> Option<&'p StateDecl> {
        self.current.and_then(|index| self.program.states.get(index))
    }

    pub fn is_halted(&self) -> bool {
        self.current.is_none()
    }

    /// Whether the machine currently sits in an accepting state
    pub fn is_accepting(&self) -> bool {
        self.current_state().is_some_and(|s| s.accepting)
    }

    /// Actions called since the last call, in order
    pub fn take_trace(&mut self) -> Vec<String> {
        std::mem::take(&mut self.trace)
    }

    fn exec<R, G>(&mut self, block: &Block, rng: &mut R, guards: &G)
    where
        R: Rng,
        G: Fn(&str) -> bool,
    {
        for stmt in block {
            match stmt {
                Stmt::Call(name) => {
                    trace!("action_{}", name);
                    self.trace.push(name.clone());
                }
                Stmt::Enter(target) => {
                    trace!("enter {:?}", target);
                    self.current = *target;
                }
                Stmt::Branch { arms, otherwise } => {
                    match arms.iter().find(|arm| guards(&arm.guard)) {
                        Some(arm) => self.exec(&arm.body, rng, guards),
                        None => {
                            if let Some(otherwise) = otherwise {
                                self.exec(otherwise, rng, guards);
                            }
                        }
                    }
                }
                Stmt::Choose(blocks) => {
                    if !blocks.is_empty() {
                        let index = rng.random_range(0..blocks.len());
                        self.exec(&blocks[index], rng, guards);
                    }
                }
            }
        }
    }
}
