//! Code Generation Module
//! Lowers a FSM diagram into a runnable simulation of the machine.
//!
//! Generation is split in two passes. The diagram is first lowered into a
//! [`Program`](ir::Program): one block of dispatch statements for the
//! machine initialisation and one per state. A printer then renders the
//! program for the selected [`CodegenTarget`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fsm::{is_identifier, Action, FiniteStateMachine, GuardKind, NodeId, State, Transition};

pub mod ir;
mod java;
mod rust;
mod writer;


use ir::{ActionStub, Block, GuardArm, Program, StateDecl, Stmt};

/// Name written in the banner of every generated file
pub const GENERATOR_NAME: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("Invalid state machine: {}", .0.join("; "))]
    InvalidModel(Vec<String>),
    #[error("Invalid type name '{0}'")]
    InvalidTypeName(String),
    #[error("'{name}' is reserved in the generated {target} code")]
    ReservedName { name: String, target: CodegenTarget },
    #[error("Guard '{guard}' is not a valid expression: {reason}")]
    InvalidGuard { guard: String, reason: String },
    #[error("Body of action '{action}' is not valid code: {reason}")]
    InvalidActionBody { action: String, reason: String },
}

pub type CodegenResult<T> = Result<T, CodegenError>;

/// Language of the generated simulation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodegenTarget {
    /// A `Runnable` Java class
    #[default]
    Java,
    /// A Rust module driven by `rand`
    Rust,
}

impl CodegenTarget {
    /// Whether `name` cannot be used as a package segment or type name
    pub fn is_reserved(self, name: &str) -> bool {
        match self {
            CodegenTarget::Java => java::KEYWORDS.contains(&name),
            CodegenTarget::Rust => rust::KEYWORDS.contains(&name),
        }
    }

    /// Whether `name` clashes with a type the generated code declares or imports
    fn is_taken_type_name(self, name: &str) -> bool {
        match self {
            CodegenTarget::Java => java::TYPE_NAMES.contains(&name),
            CodegenTarget::Rust => rust::TYPE_NAMES.contains(&name),
        }
    }
}

impl fmt::Display for CodegenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodegenTarget::Java => f.write_str("java"),
            CodegenTarget::Rust => f.write_str("rust"),
        }
    }
}

/// Output of one generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCode {
    /// Generated source text
    pub source: String,
    /// Action names called somewhere in the dispatch code
    pub referenced_actions: BTreeSet<String>,
}

/// Name, package and stamp of the generated type, shared by the printers
pub(crate) struct Header<'a> {
    pub(crate) package: Option<&'a str>,
    pub(crate) type_name: &'a str,
    pub(crate) timestamp: DateTime<Utc>,
}

impl Header<'_> {
    pub(crate) fn stamp(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }
}

/// Generator of simulation code for a FSM
///
/// The generator keeps no state between calls: concurrent `generate` calls
/// on the same instance are independent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsmGenerator {
    package: Option<String>,
    type_name: String,
    target: CodegenTarget,
}

impl FsmGenerator {
    /// `qualified_name` may be prefixed by a package, `org.example.Door`
    pub fn new(qualified_name: &str) -> Self {
        let (package, type_name) = match qualified_name.rsplit_once('.') {
            Some((package, type_name)) => (Some(package.to_string()), type_name.to_string()),
            None => (None, qualified_name.to_string()),
        };
        Self {
            package: package.filter(|p| !p.is_empty()),
            type_name,
            target: CodegenTarget::default(),
        }
    }

    pub fn with_target(mut self, target: CodegenTarget) -> Self {
        self.target = target;
        self
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn target(&self) -> CodegenTarget {
        self.target
    }

    /// Generate the code for the given FSM, stamped with the current time
    pub fn generate(&self, fsm: &FiniteStateMachine) -> CodegenResult<GeneratedCode> {
        self.generate_at(fsm, Utc::now())
    }

    /// Generate the code for the given FSM with a fixed banner stamp
    pub fn generate_at(
        &self,
        fsm: &FiniteStateMachine,
        timestamp: DateTime<Utc>,
    ) -> CodegenResult<GeneratedCode> {
        self.check_names()?;
        let (program, referenced_actions) = lower(fsm)?;

        let header = Header {
            package: self.package.as_deref(),
            type_name: &self.type_name,
            timestamp,
        };
        let source = match self.target {
            CodegenTarget::Java => java::render(&program, &header),
            CodegenTarget::Rust => rust::render(&program, &header)?,
        };

        info!(
            "Generated {} code for '{}': {} states, {} actions",
            self.target,
            fsm.name,
            program.states.len(),
            program.actions.len()
        );
        Ok(GeneratedCode {
            source,
            referenced_actions,
        })
    }

    /// Lower the FSM without rendering it
    pub fn lower(&self, fsm: &FiniteStateMachine) -> CodegenResult<Program> {
        lower(fsm).map(|(program, _)| program)
    }

    fn check_names(&self) -> CodegenResult<()> {
        let segments = self.package.iter().flat_map(|p| p.split('.'));
        for segment in segments.chain(std::iter::once(self.type_name.as_str())) {
            if !is_identifier(segment) {
                return Err(CodegenError::InvalidTypeName(self.qualified_name()));
            }
            if self.target.is_reserved(segment) {
                return Err(CodegenError::ReservedName {
                    name: segment.to_string(),
                    target: self.target,
                });
            }
        }
        if self.target.is_taken_type_name(&self.type_name) {
            return Err(CodegenError::ReservedName {
                name: self.type_name.clone(),
                target: self.target,
            });
        }
        Ok(())
    }

    fn qualified_name(&self) -> String {
        match self.package {
            Some(ref package) => format!("{}.{}", package, self.type_name),
            None => self.type_name.clone(),
        }
    }
}

/// Generate code for `fsm` as the type `qualified_name`
pub fn generate_code(
    fsm: &FiniteStateMachine,
    qualified_name: &str,
    target: CodegenTarget,
) -> CodegenResult<String> {
    FsmGenerator::new(qualified_name)
        .with_target(target)
        .generate(fsm)
        .map(|code| code.source)
}

/// Lower a machine, returning the program and the referenced action names
fn lower(fsm: &FiniteStateMachine) -> CodegenResult<(Program, BTreeSet<String>)> {
    fsm.validate().map_err(CodegenError::InvalidModel)?;

    let states = fsm.states();
    if states.is_empty() {
        warn!("FSM '{}' has no states", fsm.name);
    }

    let mut lowering = Lowering {
        states: states
            .iter()
            .enumerate()
            .map(|(index, &(id, state))| (id, (index, state)))
            .collect(),
        referenced: BTreeSet::new(),
    };

    // A valid model only has transitions leaving the start point or a state
    let start = fsm.start_point();
    let mut start_transitions = Vec::new();
    let mut outgoing: BTreeMap<NodeId, Vec<&Transition>> = BTreeMap::new();
    for transition in fsm.transitions_in_order() {
        if Some(transition.source.node) == start {
            start_transitions.push(transition);
        } else {
            outgoing.entry(transition.source.node).or_default().push(transition);
        }
    }

    let init = if start_transitions.is_empty() {
        debug!("No start transitions, the initial state is drawn at random");
        None
    } else {
        Some(lowering.group(None, &start_transitions))
    };

    let mut steps = Vec::with_capacity(states.len());
    for (id, state) in &states {
        let transitions = outgoing.get(id).map(Vec::as_slice).unwrap_or_default();
        steps.push(lowering.group(Some(*state), transitions));
    }

    let declarations = states
        .iter()
        .enumerate()
        .map(|(index, (_, state))| StateDecl {
            ident: format!("STATE_{}", index),
            label: state.name.clone(),
            accepting: state.accepting,
        })
        .collect();

    let referenced = lowering.referenced;
    let actions = action_stubs(fsm.action_codes(), &referenced);

    Ok((
        Program {
            states: declarations,
            init,
            steps,
            actions,
        },
        referenced,
    ))
}

/// Supplied bodies first, then an empty stub for each remaining referenced name
fn action_stubs(codes: &BTreeMap<String, String>, referenced: &BTreeSet<String>) -> Vec<ActionStub> {
    let mut pending = referenced.clone();
    let mut stubs = Vec::with_capacity(codes.len() + pending.len());
    for (name, body) in codes {
        pending.remove(name);
        stubs.push(ActionStub {
            name: name.clone(),
            body: Some(body.clone()),
        });
    }
    stubs.extend(pending.into_iter().map(|name| ActionStub { name, body: None }));
    stubs
}

/// Per-call lowering context
struct Lowering<'a> {
    /// Enumeration index of each state
    states: BTreeMap<NodeId, (usize, &'a State)>,
    referenced: BTreeSet<String>,
}

impl Lowering<'_> {
    /// Dispatch code of one group of transitions sharing a source
    ///
    /// `source` is `None` for the start transitions.
    fn group(&mut self, source: Option<&State>, transitions: &[&Transition]) -> Block {
        let mut unguarded = Vec::new();
        let mut otherwise = Vec::new();
        let mut guarded = Vec::new();
        for &transition in transitions {
            match transition.guard_kind() {
                GuardKind::Unguarded => unguarded.push(transition),
                GuardKind::Else => otherwise.push(transition),
                GuardKind::Condition(guard) => guarded.push((guard, transition)),
            }
        }
        debug!(
            "Lowering group of {}: {} guarded, {} else, {} unguarded",
            source.map_or("start point", |s| s.name.as_str()),
            guarded.len(),
            otherwise.len(),
            unguarded.len()
        );

        // Unguarded transitions are enabled whatever the guards say, so they
        // join the random choice of every guarded arm and of the else branch.
        let fallback: Vec<&Transition> = if otherwise.is_empty() {
            unguarded.clone()
        } else {
            merge_in_order(&otherwise, &unguarded)
        };

        if guarded.is_empty() {
            return if fallback.is_empty() {
                self.in_action(source)
            } else {
                self.random(source, &fallback)
            };
        }

        let mut arms = Vec::with_capacity(guarded.len());
        for (guard, transition) in guarded {
            let body = if unguarded.is_empty() {
                self.single(source, transition)
            } else {
                self.random(source, &merge_in_order(&[transition], &unguarded))
            };
            arms.push(GuardArm {
                guard: guard.to_string(),
                body,
            });
        }

        let otherwise = if fallback.is_empty() {
            Some(self.in_action(source)).filter(|block| !block.is_empty())
        } else {
            Some(self.random(source, &fallback))
        };
        vec![Stmt::Branch { arms, otherwise }]
    }

    /// Uniform choice between transitions; a single one is dispatched directly
    fn random(&mut self, source: Option<&State>, transitions: &[&Transition]) -> Block {
        match transitions {
            [single] => self.single(source, single),
            _ => {
                let blocks = transitions
                    .iter()
                    .map(|transition| self.single(source, transition))
                    .collect();
                vec![Stmt::Choose(blocks)]
            }
        }
    }

    /// Exit action, transition action, then entry into the target
    fn single(&mut self, source: Option<&State>, transition: &Transition) -> Block {
        let mut block = Vec::new();
        if let Some(state) = source {
            self.call(&mut block, state.exit_action.as_ref());
        }
        self.call(&mut block, transition.action.as_ref());

        match self.states.get(&transition.target.node) {
            Some(&(index, state)) => {
                self.call(&mut block, state.enter_action.as_ref());
                block.push(Stmt::Enter(Some(index)));
            }
            // the end point
            None => block.push(Stmt::Enter(None)),
        }
        block
    }

    /// Body of a state when no transition fires
    fn in_action(&mut self, source: Option<&State>) -> Block {
        let mut block = Vec::new();
        self.call(&mut block, source.and_then(|s| s.in_action.as_ref()));
        block
    }

    fn call(&mut self, block: &mut Block, action: Option<&Action>) {
        if let Some(action) = action.filter(|a| !a.is_blank()) {
            self.referenced.insert(action.name.clone());
            block.push(Stmt::Call(action.name.clone()));
        }
    }
}

/// Union of two id-sorted transition lists, kept in id order
fn merge_in_order<'a>(left: &[&'a Transition], right: &[&'a Transition]) -> Vec<&'a Transition> {
    let mut merged: Vec<&Transition> = left.iter().chain(right.iter()).copied().collect();
    merged.sort_by_key(|t| t.id);
    merged.dedup_by_key(|t| t.id);
    merged
}
