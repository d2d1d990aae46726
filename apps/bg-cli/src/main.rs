use bg_core::{BgError, BgResult};
use bg_graph::BondGraph;
use bg_reduce::{Causality, ReductionConfig, ReductionEngine};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

mod demos;

#[derive(Parser)]
#[command(name = "bg-cli")]
#[command(about = "Bond-graph reduction to state-space equations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in demo models
    List,
    /// Reduce a demo model and print its equations
    Reduce {
        /// Demo name (see `list`)
        demo: String,
        /// Print the model as JSON
        #[arg(long)]
        json: bool,
        /// Override a parameter, e.g. `--set R.R=220`
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
        /// Causality tried first on linear resistors
        #[arg(long, value_enum, default_value_t = CausalityArg::FlowOut)]
        resistor: CausalityArg,
    },
    /// Show the qualified parameters of a demo model
    Params {
        /// Demo name
        demo: String,
    },
    /// Show per-port causality and resolved power variables
    Ports {
        /// Demo name
        demo: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum CausalityArg {
    EffortOut,
    FlowOut,
}

impl From<CausalityArg> for Causality {
    fn from(arg: CausalityArg) -> Self {
        match arg {
            CausalityArg::EffortOut => Causality::EffortOut,
            CausalityArg::FlowOut => Causality::FlowOut,
        }
    }
}

fn main() -> BgResult<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => cmd_list(),
        Commands::Reduce {
            demo,
            json,
            set,
            resistor,
        } => cmd_reduce(&demo, json, &set, resistor.into()),
        Commands::Params { demo } => cmd_params(&demo),
        Commands::Ports { demo } => cmd_ports(&demo),
    }
}

fn load(name: &str) -> BgResult<BondGraph> {
    let demo = demos::find(name).ok_or_else(|| BgError::InvalidArg {
        what: format!("unknown demo '{name}' (try `bg-cli list`)"),
    })?;
    Ok(demo.build()?)
}

fn apply_overrides(graph: &mut BondGraph, overrides: &[String]) -> BgResult<()> {
    for item in overrides {
        let (name, value) = item.split_once('=').ok_or_else(|| BgError::InvalidArg {
            what: format!("expected NAME=VALUE, got '{item}'"),
        })?;
        let value: f64 = value.trim().parse().map_err(|_| BgError::InvalidArg {
            what: format!("'{value}' is not a number"),
        })?;
        graph.set_param(name.trim(), value)?;
        info!(param = name, value, "parameter override");
    }
    Ok(())
}

fn cmd_list() -> BgResult<()> {
    println!("Demo models:");
    for demo in demos::DEMOS {
        println!("  {:<20} {}", demo.name, demo.description);
    }
    Ok(())
}

fn cmd_reduce(name: &str, json: bool, overrides: &[String], resistor: Causality) -> BgResult<()> {
    let mut graph = load(name)?;
    apply_overrides(&mut graph, overrides)?;

    let engine = ReductionEngine::with_config(ReductionConfig {
        resistor_preference: resistor,
        ..ReductionConfig::default()
    });
    let model = engine.reduce(&graph)?;

    if json {
        let text = model.to_json().map_err(|e| BgError::InvalidArg {
            what: e.to_string(),
        })?;
        println!("{text}");
        return Ok(());
    }

    println!("Model: {name}");
    for s in model.states() {
        println!("  {} : {} ({:?}), dH/dx = {}", s.name, s.component, s.role, s.co_state);
    }
    for u in model.inputs() {
        println!("  {} : {} {:?}", u.name, u.variable, u.origin);
    }
    print!("{model}");
    if model.linear_form().is_some() {
        println!("  (linear in states and inputs)");
    }
    println!("  fingerprint: {}", model.fingerprint());
    Ok(())
}

fn cmd_params(name: &str) -> BgResult<()> {
    let graph = load(name)?;
    let params = graph.parameters();
    if params.is_empty() {
        println!("No parameters");
        return Ok(());
    }
    for (qualified, value) in params {
        match value {
            Some(v) => println!("  {qualified} = {v}"),
            None => println!("  {qualified} (symbolic)"),
        }
    }
    Ok(())
}

fn cmd_ports(name: &str) -> BgResult<()> {
    let graph = load(name)?;
    let sys = bg_reduce::reduce_detailed(&graph)?;
    for port in &sys.ports {
        println!("  {:<12} {:<10} e = {}", port.name, port.causality, port.effort);
        println!("  {:<12} {:<10} f = {}", "", "", port.flow);
    }
    Ok(())
}
