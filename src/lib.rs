//! fsmgen - FSM diagram to simulation code generator
//! Lowers finite state machine diagrams into runnable Java or Rust simulations

pub mod codegen;
pub mod fsm;
pub mod parser;
pub mod sim;

pub use codegen::{generate_code, CodegenError, CodegenTarget, FsmGenerator, GeneratedCode};
pub use fsm::*;
pub use parser::parse_fsm;
pub use sim::Simulation;
