//! verify - inspect and check metric verification job documents
//!
//! ## Commands
//!
//! - `inspect`: Print metadata and measurements of job documents
//! - `lint`: Load metric definitions and report unresolvable dependencies
//! - `check`: Compare measurements with a specification level

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, Level};

use verify_core::obs::JobSpan;
use verify_core::{check_job, render_check, render_report, Job, MetricSet};

#[derive(Parser)]
#[command(name = "verify")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and check metric verification job documents", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print job metadata and a summary of every measurement
    Inspect {
        /// Job documents (JSON)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Validate metric definition files
    Lint {
        /// Definition files (.yaml, .yml or .json)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Report pass/fail of each measurement for a specification level
    Check {
        /// Job document (JSON)
        path: PathBuf,

        /// Specification level to compare against
        #[arg(short, long, default_value = "design")]
        level: String,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    verify_core::init_tracing(cli.json, level);

    let ok = match cli.command {
        Commands::Inspect { paths } => cmd_inspect(&paths),
        Commands::Lint { paths } => cmd_lint(&paths),
        Commands::Check { path, level } => cmd_check(&path, &level)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Inspect each job document; a failing file prints only its error.
fn cmd_inspect(paths: &[PathBuf]) -> bool {
    let mut ok = true;
    for (i, path) in paths.iter().enumerate() {
        let _span = JobSpan::enter(&path.display().to_string());
        match inspect_file(path) {
            Ok(report) => {
                if paths.len() > 1 {
                    if i > 0 {
                        println!();
                    }
                    println!("{}:", path.display());
                }
                print!("{report}");
            }
            Err(e) => {
                eprintln!("error: {e:#}");
                ok = false;
            }
        }
    }
    ok
}

fn inspect_file(path: &Path) -> Result<String> {
    let job = Job::read(path).with_context(|| format!("Failed to read job document {:?}", path))?;
    debug!(measurements = job.measurements().len(), "job document parsed");
    Ok(render_report(&job))
}

fn cmd_lint(paths: &[PathBuf]) -> bool {
    let mut ok = true;
    for path in paths {
        match lint_file(path) {
            Ok((count, problems)) if problems.is_empty() => {
                println!("{}: ok ({} metrics)", path.display(), count);
            }
            Ok((_, problems)) => {
                ok = false;
                for problem in problems {
                    println!("{}: {}", path.display(), problem);
                }
            }
            Err(e) => {
                ok = false;
                eprintln!("error: {e:#}");
            }
        }
    }
    ok
}

/// Number of metrics in the file and the dependency problems found.
fn lint_file(path: &Path) -> Result<(usize, Vec<String>)> {
    let metrics = MetricSet::load(path)
        .with_context(|| format!("Failed to load metric definitions {:?}", path))?;
    let problems = metrics.lint().iter().map(ToString::to_string).collect();
    Ok((metrics.len(), problems))
}

fn cmd_check(path: &Path, level: &str) -> Result<bool> {
    let (text, ok) = check_file(path, level)?;
    print!("{text}");
    Ok(ok)
}

fn check_file(path: &Path, level: &str) -> Result<(String, bool)> {
    let job = Job::read(path).with_context(|| format!("Failed to read job document {:?}", path))?;
    let results = check_job(&job, level);
    let ok = !results.iter().any(|(_, verdict)| verdict.is_failure());
    Ok((render_check(level, &results), ok))
}
