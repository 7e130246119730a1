//! fsmgen CLI - Command Line Interface for FSM checking, generation and simulation

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, LevelFilter};
use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use fsmgen::parser::ParseError;
use fsmgen::{
    parse_fsm, CodegenError, CodegenTarget, FiniteStateMachine, FsmGenerator, NodeKind,
    Simulation,
};

/// Finite State Machine diagram to simulation code generator
#[derive(Parser)]
#[command(name = "fsmgen", version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate machines, then print a summary
    Check {
        /// `.fsm` source or `.json` model
        file: PathBuf,
    },
    /// Generate the simulation code of a machine
    Generate {
        file: PathBuf,
        /// Machine to use when the file holds several
        #[arg(short, long)]
        machine: Option<String>,
        /// Generated type, optionally package qualified (defaults to the machine name)
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long, value_enum, default_value_t = Target::Java)]
        target: Target,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print a machine as JSON
    Json {
        file: PathBuf,
        #[arg(short, long)]
        machine: Option<String>,
    },
    /// Run the machine for a number of steps
    Simulate {
        file: PathBuf,
        #[arg(short, long)]
        machine: Option<String>,
        #[arg(long, default_value_t = 10)]
        steps: usize,
        /// Seed of the random choices
        #[arg(long)]
        seed: Option<u64>,
        /// Guard expression to consider true (repeatable); others are false
        #[arg(long = "assume")]
        assume: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Target {
    Java,
    Rust,
}

impl From<Target> for CodegenTarget {
    fn from(target: Target) -> Self {
        match target {
            Target::Java => CodegenTarget::Java,
            Target::Rust => CodegenTarget::Rust,
        }
    }
}

#[derive(Error, Debug)]
enum CliError {
    #[error("Could not access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Invalid JSON model: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error("No machine named '{0}'")]
    UnknownMachine(String),
    #[error("No machine found in '{}'", .0.display())]
    NoMachine(PathBuf),
    #[error("Machine '{name}' is invalid: {}", .errors.join("; "))]
    Invalid { name: String, errors: Vec<String> },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Info);
        }
        2 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.init();
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Check { file } => check(&file),
        Commands::Generate {
            file,
            machine,
            name,
            target,
            output,
        } => {
            let fsm = select(load(&file)?, machine.as_deref(), &file)?;
            let name = name.unwrap_or_else(|| fsm.name.clone());
            let generated = FsmGenerator::new(&name)
                .with_target(target.into())
                .generate(&fsm)?;
            match output {
                Some(path) => {
                    fs::write(&path, &generated.source).map_err(|source| CliError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    info!("Wrote {} to {}", name, path.display());
                }
                None => print!("{}", generated.source),
            }
            Ok(())
        }
        Commands::Json { file, machine } => {
            let fsm = select(load(&file)?, machine.as_deref(), &file)?;
            println!("{}", serde_json::to_string_pretty(&fsm)?);
            Ok(())
        }
        Commands::Simulate {
            file,
            machine,
            steps,
            seed,
            assume,
        } => {
            let fsm = select(load(&file)?, machine.as_deref(), &file)?;
            simulate(&fsm, steps, seed, &assume.into_iter().collect())
        }
    }
}

/// Read machines from DSL source, or a single machine from JSON
fn load(path: &Path) -> Result<Vec<FiniteStateMachine>, CliError> {
    let content = fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    debug!("Loading {} as {}", path.display(), if is_json { "JSON" } else { "DSL" });
    if is_json {
        Ok(vec![serde_json::from_str(&content)?])
    } else {
        Ok(parse_fsm(&content)?)
    }
}

fn select(
    fsms: Vec<FiniteStateMachine>,
    machine: Option<&str>,
    path: &Path,
) -> Result<FiniteStateMachine, CliError> {
    match machine {
        Some(name) => fsms
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| CliError::UnknownMachine(name.to_string())),
        None => fsms
            .into_iter()
            .next()
            .ok_or_else(|| CliError::NoMachine(path.to_path_buf())),
    }
}

fn check(file: &Path) -> Result<(), CliError> {
    let fsms = load(file)?;
    print!("{}", summary(&fsms)?);
    Ok(())
}

/// Summary of every machine, once all of them are valid
fn summary(fsms: &[FiniteStateMachine]) -> Result<String, CliError> {
    for fsm in fsms {
        fsm.validate().map_err(|errors| CliError::Invalid {
            name: fsm.name.clone(),
            errors,
        })?;
    }

    let mut out = String::new();
    let _ = writeln!(out, "✅ Successfully parsed {} FSM(s):", fsms.len());
    for fsm in fsms {
        let _ = writeln!(out);
        let _ = writeln!(out, "  FSM: {}", fsm.name);
        let states = fsm.states();
        let _ = writeln!(out, "  States: {}", states.len());
        for (_, state) in &states {
            let marker = if state.accepting { " (accepting)" } else { "" };
            let _ = writeln!(out, "    - {}{}", state.name, marker);
        }
        let _ = writeln!(out, "  Transitions: {}", fsm.transitions.len());
        for t in fsm.transitions_in_order() {
            let _ = writeln!(
                out,
                "    {} --> {} : {}",
                node_label(fsm, t.source.node),
                node_label(fsm, t.target.node),
                t.label()
            );
        }
        let actions = fsm.referenced_actions();
        let missing = actions
            .iter()
            .filter(|name| !fsm.action_codes().contains_key(**name))
            .count();
        let _ = writeln!(
            out,
            "  Actions: {} referenced, {} without body",
            actions.len(),
            missing
        );
    }
    Ok(out)
}

fn node_label(fsm: &FiniteStateMachine, id: fsmgen::NodeId) -> String {
    match fsm.node(id).map(|n| &n.kind) {
        Some(NodeKind::State(state)) => state.name.clone(),
        Some(NodeKind::StartPoint) | Some(NodeKind::EndPoint) => "[*]".to_string(),
        None => id.to_string(),
    }
}

fn simulate(
    fsm: &FiniteStateMachine,
    steps: usize,
    seed: Option<u64>,
    assume: &BTreeSet<String>,
) -> Result<(), CliError> {
    let program = FsmGenerator::new(&fsm.name).lower(fsm)?;
    let seed = seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let guards = |guard: &str| assume.contains(guard);

    println!("Simulating '{}' (seed {})", fsm.name, seed);
    let mut sim = Simulation::new(&program);
    sim.start(&mut rng, guards);
    report(0, &mut sim);

    for step in 1..=steps {
        if sim.is_halted() {
            break;
        }
        sim.step(&mut rng, guards);
        report(step, &mut sim);
    }

    let verdict = if sim.is_accepting() { "accepting" } else { "not accepting" };
    println!("Final state is {}", verdict);
    Ok(())
}

fn report(step: usize, sim: &mut Simulation<'_>) {
    let actions = sim.take_trace();
    let state = sim
        .current_state()
        .map(|s| format!("{} ({})", s.ident, s.label))
        .unwrap_or_else(|| "halted".to_string());
    if actions.is_empty() {
        println!("  [{}] {}", step, state);
    } else {
        println!("  [{}] {} after {}", step, state, actions.join(", "));
    }
}
