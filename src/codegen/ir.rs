//! Target-independent representation of a lowered state machine.
//!
//! A [`Program`] is what every printer renders: the state table, the
//! initialisation block, one step block per state and the action stubs.

/// A state of the generated enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDecl {
    /// Enumerated name, `STATE_<k>`
    pub ident: String,
    /// Diagram name, for comments
    pub label: String,
    pub accepting: bool,
}

/// Statements of the dispatch code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    /// Invoke `action_<name>`
    Call(String),
    /// Make the given state current; `None` halts the machine
    Enter(Option<usize>),
    /// `if / else if / else` chain over guard expressions
    Branch {
        arms: Vec<GuardArm>,
        otherwise: Option<Block>,
    },
    /// Uniform random choice between at least two blocks
    Choose(Vec<Block>),
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardArm {
    /// Guard text, verbatim
    pub guard: String,
    pub body: Block,
}

/// A generated action method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionStub {
    pub name: String,
    /// Supplied body; `None` for an empty stub
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub states: Vec<StateDecl>,
    /// Dispatch of the start transitions; `None` when there are none
    pub init: Option<Block>,
    /// Step block of each state, indexed like `states`
    pub steps: Vec<Block>,
    /// Supplied actions first, then empty stubs, each group sorted by name
    pub actions: Vec<ActionStub>,
}

impl Program {
    /// Every statement of the program, depth first
    pub fn walk(&self, visit: &mut dyn FnMut(&Stmt)) {
        for block in self.init.iter().chain(self.steps.iter()) {
            walk_block(block, visit);
        }
    }
}

fn walk_block(block: &Block, visit: &mut dyn FnMut(&Stmt)) {
    for stmt in block {
        visit(stmt);
        match stmt {
            Stmt::Call(_) | Stmt::Enter(_) => {}
            Stmt::Branch { arms, otherwise } => {
                for arm in arms {
                    walk_block(&arm.body, visit);
                }
                if let Some(block) = otherwise {
                    walk_block(block, visit);
                }
            }
            Stmt::Choose(blocks) => {
                for block in blocks {
                    walk_block(block, visit);
                }
            }
        }
    }
}
