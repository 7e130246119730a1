//! FSM Data Structures
//! Core types representing Finite State Machine diagrams

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(test)]
mod tests;

/// Errors raised while assembling a machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("The machine already has a start point ({0})")]
    DuplicateStartPoint(NodeId),
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Transitions cannot leave end point {0}")]
    SourceIsEndPoint(NodeId),
    #[error("Transitions cannot enter start point {0}")]
    TargetIsStartPoint(NodeId),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Sequence number of a node, assigned on insertion
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sequence number of a transition, assigned on insertion
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransitionId(pub usize);

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A complete FSM diagram
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiniteStateMachine {
    /// Name of the FSM
    pub name: String,
    /// Start point, end points and states
    pub nodes: Vec<Node>,
    /// Directed transitions between nodes
    pub transitions: Vec<Transition>,
    /// Explicit action bodies, keyed by action name
    #[serde(default)]
    pub action_codes: BTreeMap<String, String>,
    /// Next sequence numbers handed out by the `add_*` methods
    #[serde(skip)]
    next_ids: NextIds,
}

#[derive(Debug, Clone, Copy, Default)]
struct NextIds {
    node: usize,
    transition: usize,
}

impl PartialEq for FiniteStateMachine {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.nodes == other.nodes
            && self.transitions == other.transitions
            && self.action_codes == other.action_codes
    }
}

impl FiniteStateMachine {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            transitions: Vec::new(),
            action_codes: BTreeMap::new(),
            next_ids: NextIds::default(),
        }
    }

    fn next_node_id(&mut self) -> NodeId {
        // Nodes loaded from JSON or pushed by hand are seen through the last one
        let last = self.nodes.last().map_or(0, |n| n.id.0 + 1);
        if self.next_ids.node < last {
            self.next_ids.node = self.nodes.iter().map(|n| n.id.0 + 1).max().unwrap_or(0);
        }
        let id = NodeId(self.next_ids.node);
        self.next_ids.node += 1;
        id
    }

    fn next_transition_id(&mut self) -> TransitionId {
        let last = self.transitions.last().map_or(0, |t| t.id.0 + 1);
        if self.next_ids.transition < last {
            self.next_ids.transition = self
                .transitions
                .iter()
                .map(|t| t.id.0 + 1)
                .max()
                .unwrap_or(0);
        }
        let id = TransitionId(self.next_ids.transition);
        self.next_ids.transition += 1;
        id
    }

    /// Storage index of a node
    ///
    /// Nodes added through the `add_*` methods are stored in id order, so the
    /// binary search usually hits; other layouts fall back to a scan.
    fn position(&self, id: NodeId) -> Option<usize> {
        match self.nodes.binary_search_by_key(&id, |n| n.id) {
            Ok(index) if self.nodes[index].id == id => Some(index),
            _ => self.nodes.iter().position(|n| n.id == id),
        }
    }

    fn push_node(&mut self, kind: NodeKind) -> NodeId {
        let id = self.next_node_id();
        self.nodes.push(Node { id, kind });
        id
    }

    /// Add the unique start point
    pub fn add_start_point(&mut self) -> ModelResult<NodeId> {
        if let Some(existing) = self.start_point() {
            return Err(ModelError::DuplicateStartPoint(existing));
        }
        Ok(self.push_node(NodeKind::StartPoint))
    }

    pub fn add_end_point(&mut self) -> NodeId {
        self.push_node(NodeKind::EndPoint)
    }

    pub fn add_state(&mut self, state: State) -> NodeId {
        self.push_node(NodeKind::State(state))
    }

    /// Add a transition, assigning it the next sequence number
    pub fn add_transition(&mut self, mut transition: Transition) -> ModelResult<TransitionId> {
        let source = self
            .node(transition.source.node)
            .ok_or(ModelError::UnknownNode(transition.source.node))?;
        if matches!(source.kind, NodeKind::EndPoint) {
            return Err(ModelError::SourceIsEndPoint(source.id));
        }
        let target = self
            .node(transition.target.node)
            .ok_or(ModelError::UnknownNode(transition.target.node))?;
        if matches!(target.kind, NodeKind::StartPoint) {
            return Err(ModelError::TargetIsStartPoint(target.id));
        }

        transition.id = self.next_transition_id();
        let id = transition.id;
        self.transitions.push(transition);
        Ok(id)
    }

    /// Supply the body of an action
    pub fn set_action_code(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.action_codes.insert(name.into(), body.into());
    }

    pub fn action_codes(&self) -> &BTreeMap<String, String> {
        &self.action_codes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.position(id).map(|index| &self.nodes[index])
    }

    pub fn state(&self, id: NodeId) -> Option<&State> {
        self.node(id).and_then(Node::as_state)
    }

    pub fn state_mut(&mut self, id: NodeId) -> Option<&mut State> {
        let index = self.position(id)?;
        match self.nodes[index].kind {
            NodeKind::State(ref mut state) => Some(state),
            _ => None,
        }
    }

    pub fn start_point(&self) -> Option<NodeId> {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::StartPoint))
            .map(|n| n.id)
            .min()
    }

    /// Nodes sorted by sequence number
    pub fn nodes_in_order(&self) -> Vec<&Node> {
        let mut nodes: Vec<&Node> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| n.id);
        nodes
    }

    /// States sorted by sequence number
    pub fn states(&self) -> Vec<(NodeId, &State)> {
        self.nodes_in_order()
            .into_iter()
            .filter_map(|n| n.as_state().map(|s| (n.id, s)))
            .collect()
    }

    /// Transitions sorted by sequence number
    pub fn transitions_in_order(&self) -> Vec<&Transition> {
        let mut transitions: Vec<&Transition> = self.transitions.iter().collect();
        transitions.sort_by_key(|t| t.id);
        transitions
    }

    /// Outgoing transitions of a node, sorted by sequence number
    pub fn transitions_from(&self, node: NodeId) -> Vec<&Transition> {
        self.transitions_in_order()
            .into_iter()
            .filter(|t| t.source.node == node)
            .collect()
    }

    /// Every action name mentioned by states and transitions
    ///
    /// Blank names stand for "no action" and are left out.
    pub fn referenced_actions(&self) -> BTreeSet<&str> {
        let from_states = self.nodes.iter().filter_map(Node::as_state).flat_map(|s| {
            [&s.enter_action, &s.exit_action, &s.in_action]
                .into_iter()
                .flatten()
        });
        let from_transitions = self.transitions.iter().filter_map(|t| t.action.as_ref());
        from_states
            .chain(from_transitions)
            .filter(|a| !a.is_blank())
            .map(|a| a.name.as_str())
            .collect()
    }

    /// Validate the FSM definition
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let starts = self
            .nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::StartPoint))
            .count();
        if starts > 1 {
            errors.push(format!("Found {} start points, at most one is allowed", starts));
        }

        let mut index = BTreeMap::new();
        for node in &self.nodes {
            if index.insert(node.id, &node.kind).is_some() {
                errors.push(format!("Duplicate node id {}", node.id));
            }
        }
        let mut transition_ids = BTreeSet::new();
        for transition in &self.transitions {
            if !transition_ids.insert(transition.id) {
                errors.push(format!("Duplicate transition id {}", transition.id));
            }
        }

        for transition in &self.transitions {
            match index.get(&transition.source.node).copied() {
                None => errors.push(format!(
                    "Transition {} source node {} not found",
                    transition.id, transition.source.node
                )),
                Some(NodeKind::EndPoint) => errors.push(format!(
                    "Transition {} leaves end point {}",
                    transition.id, transition.source.node
                )),
                Some(_) => {}
            }
            match index.get(&transition.target.node).copied() {
                None => errors.push(format!(
                    "Transition {} target node {} not found",
                    transition.id, transition.target.node
                )),
                Some(NodeKind::StartPoint) => errors.push(format!(
                    "Transition {} enters start point {}",
                    transition.id, transition.target.node
                )),
                Some(_) => {}
            }
        }

        for name in self
            .referenced_actions()
            .into_iter()
            .chain(self.action_codes.keys().map(String::as_str))
        {
            if !is_identifier(name) {
                errors.push(format!("Action name '{}' is not an identifier", name));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// ASCII identifier check shared by the model and the code generator
pub fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A node of the diagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn as_state(&self) -> Option<&State> {
        match self.kind {
            NodeKind::State(ref state) => Some(state),
            NodeKind::StartPoint | NodeKind::EndPoint => None,
        }
    }
}

/// Node variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry of the machine; its transitions initialise it
    StartPoint,
    /// Terminal node; entering it halts the machine
    EndPoint,
    State(State),
}

/// A state in the FSM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// State name, used in comments of the generated code
    pub name: String,
    /// Whether halting in this state accepts
    #[serde(default)]
    pub accepting: bool,
    /// Entry action
    #[serde(default)]
    pub enter_action: Option<Action>,
    /// Exit action
    #[serde(default)]
    pub exit_action: Option<Action>,
    /// Action run while no transition fires
    #[serde(default)]
    pub in_action: Option<Action>,
}

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accepting: false,
            enter_action: None,
            exit_action: None,
            in_action: None,
        }
    }

    pub fn accepting(mut self) -> Self {
        self.accepting = true;
        self
    }

    pub fn with_enter(mut self, action: Action) -> Self {
        self.enter_action = Some(action);
        self
    }

    pub fn with_exit(mut self, action: Action) -> Self {
        self.exit_action = Some(action);
        self
    }

    pub fn with_in(mut self, action: Action) -> Self {
        self.in_action = Some(action);
        self
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Attachment of a transition end to a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub node: NodeId,
}

impl From<NodeId> for Anchor {
    fn from(node: NodeId) -> Self {
        Self { node }
    }
}

/// A transition between nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub id: TransitionId,
    pub source: Anchor,
    pub target: Anchor,
    /// Guard condition
    #[serde(default)]
    pub guard: Option<Guard>,
    /// Action to execute
    #[serde(default)]
    pub action: Option<Action>,
}

impl Transition {
    /// The id is reassigned by [`FiniteStateMachine::add_transition`]
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: TransitionId(0),
            source: source.into(),
            target: target.into(),
            guard: None,
            action: None,
        }
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn guard_kind(&self) -> GuardKind<'_> {
        match self.guard {
            None => GuardKind::Unguarded,
            Some(ref guard) => guard.kind(),
        }
    }

    /// Format transition label for display
    pub fn label(&self) -> String {
        let mut parts = Vec::new();

        if let Some(ref guard) = self.guard {
            parts.push(format!("[{}]", guard.expression));
        }

        if let Some(action) = self.action.as_ref().filter(|a| !a.is_blank()) {
            parts.push(format!("/ {}", action.name));
        }

        parts.join(" ")
    }
}

/// Classification of a transition by its guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardKind<'a> {
    Unguarded,
    Else,
    Condition(&'a str),
}

/// A guard condition for transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guard {
    /// Boolean expression, emitted verbatim
    pub expression: String,
}

impl Guard {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub fn otherwise() -> Self {
        Self::new("else")
    }

    pub fn kind(&self) -> GuardKind<'_> {
        let text = self.expression.trim();
        if text.is_empty() {
            GuardKind::Unguarded
        } else if text.eq_ignore_ascii_case("else") {
            GuardKind::Else
        } else {
            GuardKind::Condition(text)
        }
    }
}

/// A named action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    /// Action name; generated code calls `action_<name>`
    pub name: String,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// A blank name means no action at all
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
    }
}
