/*!
# Mapscript CLI

Command-line interface for the mapscript object-mapping compiler.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::{style, Term};
use mapscript::{
    compile_directory, compile_file, load_type_index, Executor, NoDelegates, PseudoBackend,
    RunReport, Value,
};
use mapscript::codegen::PlanBackend;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "mapscript",
    version = env!("CARGO_PKG_VERSION"),
    author = "Mapscript Team",
    about = "Compiler for the mapscript object-mapping DSL"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short = 'f', long, default_value = "text")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile script files into mapping plans
    Compile {
        /// Path to a script file or a directory of script files
        #[arg(short, long)]
        path: PathBuf,

        /// Type descriptor files (repeatable)
        #[arg(short, long, required = true)]
        model: Vec<PathBuf>,

        /// Report output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate script files without emitting plans
    Check {
        /// Path to a script file or a directory of script files
        #[arg(short, long)]
        path: PathBuf,

        /// Type descriptor files (repeatable)
        #[arg(short, long, required = true)]
        model: Vec<PathBuf>,
    },

    /// Render a compiled plan as readable pseudo-code
    Render {
        /// Path to one script file
        #[arg(short, long)]
        path: PathBuf,

        /// Type descriptor files (repeatable)
        #[arg(short, long, required = true)]
        model: Vec<PathBuf>,
    },

    /// Compile one script file and apply it to a JSON document
    Apply {
        /// Path to one script file
        #[arg(short, long)]
        path: PathBuf,

        /// Type descriptor files (repeatable)
        #[arg(short, long, required = true)]
        model: Vec<PathBuf>,

        /// Source document (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Target document output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show type model information
    Info {
        /// Type descriptor files (repeatable)
        #[arg(short, long, required = true)]
        model: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("mapscript={}", log_level))
        .init();

    match cli.command {
        Commands::Compile {
            path,
            model,
            output,
        } => {
            compile_command(path, model, output, &cli.format)?;
        }
        Commands::Check { path, model } => {
            check_command(path, model)?;
        }
        Commands::Render { path, model } => {
            render_command(path, model)?;
        }
        Commands::Apply {
            path,
            model,
            input,
            output,
        } => {
            apply_command(path, model, input, output)?;
        }
        Commands::Info { model } => {
            info_command(model)?;
        }
    }

    Ok(())
}

fn compile_run(path: &PathBuf, model: &[PathBuf]) -> Result<(RunReport, Vec<mapscript::CompiledFile>)> {
    let index = load_type_index(model)?;
    if path.is_dir() {
        compile_directory(&index, path)
    } else {
        let compiled = compile_file(&index, path)?;
        let mut run = RunReport::new();
        run.add(compiled.report.clone());
        Ok((run, vec![compiled]))
    }
}

fn compile_command(
    path: PathBuf,
    model: Vec<PathBuf>,
    output: Option<PathBuf>,
    format: &str,
) -> Result<()> {
    let term = Term::stdout();
    let (run, _) = compile_run(&path, &model)?;

    let rendered = match format {
        "json" => serde_json::to_string_pretty(&run)?,
        _ => run.to_string(),
    };
    match output {
        Some(out) => {
            std::fs::write(&out, rendered)
                .with_context(|| format!("cannot write report to {}", out.display()))?;
            term.write_line(&format!(
                "Report written to {}",
                style(out.display()).green()
            ))?;
        }
        None => term.write_line(&rendered)?,
    }

    if !run.is_success() {
        term.write_line(&format!("{}", style("compilation failed").red().bold()))?;
        std::process::exit(1);
    }
    Ok(())
}

fn check_command(path: PathBuf, model: Vec<PathBuf>) -> Result<()> {
    let term = Term::stdout();
    let (run, _) = compile_run(&path, &model)?;

    for report in &run.files {
        let name = report.file.as_deref().unwrap_or("<inline>");
        if report.is_success() && report.failed_count() == 0 {
            term.write_line(&format!(
                "{} {} ({} scripts)",
                style("OK").green().bold(),
                name,
                report.generated_count()
            ))?;
        } else {
            term.write_line(&format!(
                "{} {} ({} failed)",
                style("FAIL").red().bold(),
                name,
                report.failed_count()
            ))?;
            term.write_line(&report.to_string())?;
        }
    }

    if !run.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn render_command(path: PathBuf, model: Vec<PathBuf>) -> Result<()> {
    let term = Term::stdout();
    let index = load_type_index(&model)?;
    let compiled = compile_file(&index, &path)?;

    if let Some(cause) = &compiled.report.aborted {
        term.write_line(&format!("{} {}", style("aborted:").red().bold(), cause))?;
        std::process::exit(1);
    }

    let backend = PseudoBackend;
    term.write_line(&backend.render(&compiled.plan, &compiled.arena))?;

    if !compiled.report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

fn apply_command(
    path: PathBuf,
    model: Vec<PathBuf>,
    input: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let term = Term::stdout();
    let index = load_type_index(&model)?;
    let compiled = compile_file(&index, &path)?;

    if !compiled.report.is_success() {
        term.write_line(&compiled.report.to_string())?;
        term.write_line(&format!("{}", style("compilation failed").red().bold()))?;
        std::process::exit(1);
    }

    let document = std::fs::read_to_string(&input)
        .with_context(|| format!("cannot read source document {}", input.display()))?;
    let document: serde_json::Value = serde_json::from_str(&document)
        .with_context(|| format!("source document {} is not valid JSON", input.display()))?;

    let executor = Executor::new(&index, &compiled.arena, &NoDelegates);
    let outcome = executor.run(&compiled.plan, &Value::from(document));
    info!(units = outcome.units.len(), "plan applied");

    for (script_id, unit) in &outcome.units {
        if !unit.is_completed() {
            term.write_line(&format!(
                "{} {}: {:?}",
                style("incomplete").yellow(),
                script_id,
                unit
            ))?;
        }
    }

    let target = serde_json::Value::from(outcome.target);
    let rendered = serde_json::to_string_pretty(&target)?;
    match output {
        Some(out) => {
            std::fs::write(&out, rendered)
                .with_context(|| format!("cannot write target document to {}", out.display()))?;
            term.write_line(&format!(
                "Target document written to {}",
                style(out.display()).green()
            ))?;
        }
        None => term.write_line(&rendered)?,
    }
    Ok(())
}

fn info_command(model: Vec<PathBuf>) -> Result<()> {
    use mapscript::typemodel::{TypeId, TypeKind};

    let term = Term::stdout();
    let index = load_type_index(&model)?;

    term.write_line(&format!("{}", style("Type Model").bold().cyan()))?;
    term.write_line(&format!("  types: {}", style(index.len()).green()))?;

    for i in 0..index.len() {
        let def = index.get(TypeId(i as u32));
        let detail = match def.kind {
            TypeKind::Enum => format!("{} variants", def.variants.len()),
            _ => format!("{} fields", def.fields.len()),
        };
        term.write_line(&format!(
            "  {} ({:?}, {})",
            style(&def.name).bold(),
            def.kind,
            detail
        ))?;
    }
    Ok(())
}
