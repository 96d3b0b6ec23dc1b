use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kotodama::{
    Error, GeneratorConfig, Interpreter, ProfileState, RuleSpec, RunInput, ScriptGenerator,
};
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a rule set to standalone script text
    Compile(CompileArgs),

    /// Run a rule set in process and print the trace
    Preview(PreviewArgs),

    /// Check a rule set for structural problems
    Lint(LintArgs),
}

#[derive(Parser)]
struct CompileArgs {
    /// Path to the rule set (JSON)
    #[arg(short, long)]
    spec: PathBuf,

    /// Write the script here instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Global name of the profile table in the host
    #[arg(long, default_value = "profile")]
    profile_global: String,

    /// Global name of the chat array in the host
    #[arg(long, default_value = "chat")]
    chat_global: String,
}

#[derive(Parser)]
struct PreviewArgs {
    /// Path to the rule set (JSON)
    #[arg(short, long)]
    spec: PathBuf,

    /// Starting profile (JSON); an empty profile when omitted
    #[arg(short, long)]
    profile: Option<PathBuf>,

    /// Chat history file, one message per line
    #[arg(long)]
    history: Option<PathBuf>,

    /// Override for the total message count
    #[arg(long)]
    count: Option<u64>,

    /// Seed for reproducible random draws
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Parser)]
struct LintArgs {
    /// Path to the rule set (JSON)
    #[arg(short, long)]
    spec: PathBuf,
}

fn load_spec(path: &PathBuf) -> Result<RuleSpec, Error> {
    let content = fs::read_to_string(path)?;
    let spec = RuleSpec::from_json(&content)?;
    debug!(
        "loaded {:?}: {} lists, {} derived, {} blocks",
        path,
        spec.lists.len(),
        spec.derived.len(),
        spec.blocks.len()
    );
    Ok(spec)
}

fn report_lint(spec: &RuleSpec) {
    let warnings = kotodama::lint(spec);
    if !warnings.is_empty() {
        warn!("lint: {} warnings", warnings.len());
        for warning in &warnings {
            warn!("{}", warning);
        }
    }
}

fn output_json<T: serde::Serialize>(data: &T, pretty: bool) -> Result<(), Error> {
    let output = if pretty {
        serde_json::to_string_pretty(data)
    } else {
        serde_json::to_string(data)
    }?;

    println!("{}", output);
    Ok(())
}

fn compile(args: &CompileArgs) -> Result<(), Error> {
    let spec = load_spec(&args.spec)?;
    report_lint(&spec);

    let config = GeneratorConfig {
        profile_global: args.profile_global.clone(),
        chat_global: args.chat_global.clone(),
        ..GeneratorConfig::default()
    };
    let script = ScriptGenerator::new(config).generate(&spec);

    match &args.out {
        Some(path) => fs::write(path, script)?,
        None => print!("{}", script),
    }
    Ok(())
}

fn preview(args: &PreviewArgs) -> Result<(), Error> {
    let spec = load_spec(&args.spec)?;
    report_lint(&spec);

    let profile = match &args.profile {
        Some(path) => ProfileState::from_json(&fs::read_to_string(path)?)?,
        None => ProfileState::default(),
    };
    let history: Vec<String> = match &args.history {
        Some(path) => fs::read_to_string(path)?
            .lines()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let mut interpreter = match args.seed {
        Some(seed) => Interpreter::seeded(seed),
        None => Interpreter::new(),
    };
    let outcome = interpreter.run(
        &spec,
        RunInput {
            profile,
            history,
            message_count: args.count,
        },
    );

    println!("{}", outcome.trace);
    output_json(&outcome.profile, true)
}

fn lint_spec(args: &LintArgs) -> Result<(), Error> {
    let spec = load_spec(&args.spec)?;
    let warnings = kotodama::lint(&spec);

    if warnings.is_empty() {
        println!("No warnings.");
    } else {
        for warning in &warnings {
            println!("warning: {}", warning);
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), Error> {
    match &cli.command {
        Commands::Compile(args) => compile(args),
        Commands::Preview(args) => preview(args),
        Commands::Lint(args) => lint_spec(args),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(fmt::layer())
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
