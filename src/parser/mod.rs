//! FSM Parser Module
//! Parses the textual FSM notation into FSM diagrams

use std::collections::HashMap;

use log::debug;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::fsm::{
    Action, FiniteStateMachine, Guard, ModelError, ModelResult, NodeId, State, Transition,
};


#[derive(Parser)]
#[grammar = "parser/fsm.pest"]
pub struct FsmParser;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    PestError(#[from] pest::error::Error<Rule>),
    #[error("Invalid syntax at line {line}: {message}")]
    SyntaxError { line: usize, message: String },
    #[error("Invalid machine at line {line}: {source}")]
    Model { line: usize, source: ModelError },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse FSM DSL source code into FSM diagrams
pub fn parse_fsm(source: &str) -> ParseResult<Vec<FiniteStateMachine>> {
    let pairs = FsmParser::parse(Rule::file, source)?;
    let mut fsms = Vec::new();

    for pair in pairs {
        match pair.as_rule() {
            Rule::file => {
                for inner in pair.into_inner() {
                    if inner.as_rule() == Rule::fsm_definition {
                        fsms.push(parse_fsm_definition(inner)?);
                    }
                }
            }
            Rule::fsm_definition => {
                fsms.push(parse_fsm_definition(pair)?);
            }
            _ => {}
        }
    }

    Ok(fsms)
}

/// Name to node bookkeeping while a machine is being read
struct MachineBuilder {
    fsm: FiniteStateMachine,
    states: HashMap<String, NodeId>,
    start: Option<NodeId>,
    end: Option<NodeId>,
}

impl MachineBuilder {
    fn new(name: &str) -> Self {
        Self {
            fsm: FiniteStateMachine::new(name),
            states: HashMap::new(),
            start: None,
            end: None,
        }
    }

    /// The state called `name`, created on first mention
    fn state(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.states.get(name) {
            return id;
        }
        let id = self.fsm.add_state(State::new(name));
        self.states.insert(name.to_string(), id);
        id
    }

    fn start_point(&mut self) -> ModelResult<NodeId> {
        match self.start {
            Some(id) => Ok(id),
            None => {
                let id = self.fsm.add_start_point()?;
                self.start = Some(id);
                Ok(id)
            }
        }
    }

    fn end_point(&mut self) -> NodeId {
        match self.end {
            Some(id) => id,
            None => {
                let id = self.fsm.add_end_point();
                self.end = Some(id);
                id
            }
        }
    }
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

fn syntax_error(pair: &Pair<Rule>, message: impl Into<String>) -> ParseError {
    ParseError::SyntaxError {
        line: line_of(pair),
        message: message.into(),
    }
}

/// First inner pair produced by `rule`
fn child<'i>(pair: &Pair<'i, Rule>, rule: Rule) -> ParseResult<Pair<'i, Rule>> {
    pair.clone()
        .into_inner()
        .find(|p| p.as_rule() == rule)
        .ok_or_else(|| syntax_error(pair, format!("expected {:?}", rule)))
}

fn parse_fsm_definition(pair: Pair<Rule>) -> ParseResult<FiniteStateMachine> {
    let name = child(&pair, Rule::identifier)?;
    let mut builder = MachineBuilder::new(name.as_str());

    for item in pair.into_inner() {
        if item.as_rule() == Rule::fsm_body {
            for inner in item.into_inner() {
                if inner.as_rule() == Rule::fsm_item {
                    parse_fsm_item(inner, &mut builder)?;
                }
            }
        }
    }

    let fsm = builder.fsm;
    debug!(
        "Parsed FSM '{}': {} nodes, {} transitions, {} action bodies",
        fsm.name,
        fsm.nodes.len(),
        fsm.transitions.len(),
        fsm.action_codes.len()
    );
    Ok(fsm)
}

fn parse_fsm_item(pair: Pair<Rule>, builder: &mut MachineBuilder) -> ParseResult<()> {
    let Some(inner) = pair.clone().into_inner().next() else {
        return Err(syntax_error(&pair, "empty item"));
    };

    match inner.as_rule() {
        Rule::action_def => parse_action_def(inner, builder),
        Rule::state_def => parse_state_definition(inner, builder),
        Rule::transition => parse_transition(inner, builder),
        _ => Ok(()),
    }
}

fn parse_action_def(pair: Pair<Rule>, builder: &mut MachineBuilder) -> ParseResult<()> {
    let name = child(&pair, Rule::identifier)?.as_str().to_string();
    let block = child(&pair, Rule::action_block)?;
    let code = child(&block, Rule::action_code)?;

    if builder.fsm.action_codes.contains_key(&name) {
        return Err(syntax_error(
            &pair,
            format!("Action '{}' is defined twice", name),
        ));
    }
    builder.fsm.set_action_code(name, dedent(code.as_str()));
    Ok(())
}

fn parse_state_definition(pair: Pair<Rule>, builder: &mut MachineBuilder) -> ParseResult<()> {
    let name = child(&pair, Rule::identifier)?.as_str().to_string();

    let mut accepting = false;
    let mut enter = None;
    let mut exit = None;
    let mut inside = None;

    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::kw_accepting => accepting = true,
            Rule::state_body => {
                for body_item in item.into_inner() {
                    let Some(action_item) = body_item.into_inner().next() else {
                        continue;
                    };
                    let action = parse_action_call(child(&action_item, Rule::action_call)?)?;
                    match action_item.as_rule() {
                        Rule::entry_action => enter = Some(action),
                        Rule::exit_action => exit = Some(action),
                        Rule::in_action => inside = Some(action),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    // Update existing or add new
    let id = builder.state(&name);
    if let Some(state) = builder.fsm.state_mut(id) {
        state.accepting |= accepting;
        if enter.is_some() {
            state.enter_action = enter;
        }
        if exit.is_some() {
            state.exit_action = exit;
        }
        if inside.is_some() {
            state.in_action = inside;
        }
    }
    Ok(())
}

fn parse_transition(pair: Pair<Rule>, builder: &mut MachineBuilder) -> ParseResult<()> {
    let line = line_of(&pair);
    let mut inner = pair.clone().into_inner();

    let source = inner
        .next()
        .ok_or_else(|| syntax_error(&pair, "missing transition source"))?;
    let source = match source.into_inner().next() {
        Some(p) if p.as_rule() == Rule::pseudo_state => builder
            .start_point()
            .map_err(|err| ParseError::Model { line, source: err })?,
        Some(p) => builder.state(p.as_str()),
        None => return Err(syntax_error(&pair, "missing transition source")),
    };

    let target = inner
        .find(|p| p.as_rule() == Rule::endpoint)
        .ok_or_else(|| syntax_error(&pair, "missing transition target"))?;
    let target = match target.into_inner().next() {
        Some(p) if p.as_rule() == Rule::pseudo_state => builder.end_point(),
        Some(p) => builder.state(p.as_str()),
        None => return Err(syntax_error(&pair, "missing transition target")),
    };

    let mut transition = Transition::new(source, target);

    // Parse optional transition label
    if let Some(label) = inner.find(|p| p.as_rule() == Rule::transition_label) {
        for item in label.into_inner() {
            match item.as_rule() {
                Rule::guard => {
                    let expr = child(&item, Rule::guard_expr)?;
                    transition.guard = Some(Guard::new(expr.as_str().trim()));
                }
                Rule::action => {
                    let call = child(&item, Rule::action_call)?;
                    transition.action = Some(parse_action_call(call)?);
                }
                _ => {}
            }
        }
    }

    builder
        .fsm
        .add_transition(transition)
        .map_err(|err| ParseError::Model { line, source: err })?;
    Ok(())
}

fn parse_action_call(pair: Pair<Rule>) -> ParseResult<Action> {
    let name = child(&pair, Rule::identifier)?;
    Ok(Action::new(name.as_str()))
}

/// Strip the blank lines around `code` and the indentation common to its lines
fn dedent(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) else {
        return String::new();
    };
    let last = lines
        .iter()
        .rposition(|l| !l.trim().is_empty())
        .unwrap_or(first);
    let body = &lines[first..=last];

    let indent = body
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()).trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
