// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Circuitvc CLI
//!
//! Command-line interface for circuit version control.
//!
//! Exit codes: 0 success, 1 invalid input, 2 not found, 3 lock conflict,
//! 4 repository corruption, 5 I/O failure.

use anyhow::{Context, Result};
use circuitvc_core::{CircuitVcError, ErrorKind};
use circuitvc_storage::circuit_git::{
    CommitSummary, DiffConfig, DiffEngine, Repository, VersionControl, VersionDiff, VersionRef,
};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, Level};

#[derive(Parser, Debug)]
#[command(name = "circuitvc")]
#[command(about = "Circuitvc - version control for quantum circuits", long_about = None)]
struct Cli {
    /// Repository directory
    #[arg(long, global = true, default_value = ".circuitvc")]
    repo_path: PathBuf,

    /// Verbose mode
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Circuit versioning commands
    Version {
        #[command(subcommand)]
        command: VersionCommands,
    },
}

#[derive(Subcommand, Debug)]
enum VersionCommands {
    /// Initialize a new repository
    Init {
        /// Default author for commits
        #[arg(long)]
        author: String,

        /// Discard an existing repository at the same path
        #[arg(long)]
        force: bool,
    },

    /// Commit a new version of a circuit
    Commit {
        #[arg(long)]
        circuit_name: String,

        /// File holding the circuit source
        #[arg(long)]
        circuit_file: PathBuf,

        #[arg(long, short)]
        message: String,

        /// Overrides the repository's default author
        #[arg(long)]
        author: Option<String>,

        /// Give up if the circuit stays locked this long (milliseconds)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// List versions of a circuit, or every circuit
    List {
        #[arg(long)]
        circuit_name: Option<String>,
    },

    /// Print a version (or write it with --output-file)
    Get {
        #[arg(long)]
        circuit_name: String,

        /// Commit id, unique id prefix, or "latest"
        #[arg(long, default_value = "latest")]
        version_id: String,

        #[arg(long)]
        output_file: Option<PathBuf>,
    },

    /// Write a version to a file
    Checkout {
        #[arg(long)]
        circuit_name: String,

        /// Commit id, unique id prefix, or "latest"
        #[arg(long, default_value = "latest")]
        version_id: String,

        #[arg(long)]
        output_file: PathBuf,
    },

    /// Show the structural difference between two versions
    Diff {
        #[arg(long)]
        circuit_name: String,

        #[arg(long)]
        from: String,

        #[arg(long, default_value = "latest")]
        to: String,

        /// Line-based unified diff instead of gate-level diff
        #[arg(long)]
        unified: bool,

        /// Context lines around each hunk of a unified diff
        #[arg(long, default_value_t = 3)]
        context_lines: usize,
    },

    /// Check every object and commit for corruption
    Verify,

    /// Get repository statistics
    Stats,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Usage errors are invalid input (1); --help and --version are not errors
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // Setup logging (stdout is reserved for payloads and JSON)
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("✗ {:#}", err);
            std::process::exit(exit_code(&err));
        }
    }
}

/// Exit code for a failed command, taken from the first library error in the chain
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|e| e.downcast_ref::<CircuitVcError>())
        .map_or(1, CircuitVcError::exit_code)
}

fn run(cli: Cli) -> Result<i32> {
    let Commands::Version { command } = cli.command;
    debug!(repo = %cli.repo_path.display(), ?command, "running command");

    let command = match command {
        VersionCommands::Init { author, force } => {
            return init_repository(&cli.repo_path, &author, force, cli.json);
        }
        other => other,
    };

    let vc = VersionControl::open(&cli.repo_path)
        .with_context(|| format!("Failed to open repository {}", cli.repo_path.display()))?;

    match command {
        VersionCommands::Init { .. } => {}

        VersionCommands::Commit {
            circuit_name,
            circuit_file,
            message,
            author,
            timeout_ms,
        } => {
            let payload = read_circuit_file(&circuit_file)?;
            let commit = vc.commit_with_timeout(
                &circuit_name,
                &payload,
                &message,
                author.as_deref(),
                timeout_ms.map(Duration::from_millis),
            )?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&commit)?);
            } else {
                println!(
                    "✓ Committed {} version {} ({})",
                    circuit_name, commit.sequence_number, commit.id
                );
                println!("  id: {}", commit.id.to_hex());
            }
        }

        VersionCommands::List {
            circuit_name: Some(circuit_name),
        } => {
            let versions = vc.list_versions(&circuit_name)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else {
                for version in &versions {
                    println!("{}", format_summary(version));
                }
            }
        }

        VersionCommands::List { circuit_name: None } => {
            let circuits = vc.list_circuits()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&circuits)?);
            } else if circuits.is_empty() {
                println!("No circuits committed yet");
            } else {
                for circuit in &circuits {
                    println!(
                        "{:<32} {:>5} version(s)  head {}",
                        circuit.name, circuit.versions, circuit.head
                    );
                }
            }
        }

        VersionCommands::Get {
            circuit_name,
            version_id,
            output_file: Some(output_file),
        }
        | VersionCommands::Checkout {
            circuit_name,
            version_id,
            output_file,
        } => {
            let version: VersionRef = version_id.parse()?;
            let commit = vc.checkout(&circuit_name, &version, &output_file)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&CommitSummary::from(&commit))?);
            } else {
                println!(
                    "✓ Wrote {} version {} ({}) to {}",
                    circuit_name,
                    commit.sequence_number,
                    commit.id,
                    output_file.display()
                );
            }
        }

        VersionCommands::Get {
            circuit_name,
            version_id,
            output_file: None,
        } => {
            let version: VersionRef = version_id.parse()?;
            let commit = vc.resolve(&circuit_name, &version)?;
            let payload = vc.get_version(&circuit_name, &VersionRef::id(&commit.id))?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "commit": CommitSummary::from(&commit),
                        "payload": String::from_utf8_lossy(&payload),
                    }))?
                );
            } else {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&payload)?;
                stdout.flush()?;
            }
        }

        VersionCommands::Diff {
            circuit_name,
            from,
            to,
            unified,
            context_lines,
        } => {
            let from: VersionRef = from.parse()?;
            let to: VersionRef = to.parse()?;

            if unified {
                let vc = vc.with_diff_engine(DiffEngine::with_config(DiffConfig {
                    context_lines,
                    ..DiffConfig::default()
                }));
                print!("{}", vc.unified_diff(&circuit_name, &from, &to)?);
            } else {
                let diff = vc.diff_versions(&circuit_name, &from, &to)?;
                if cli.json {
                    println!("{}", serde_json::to_string_pretty(&diff)?);
                } else {
                    print_version_diff(&diff);
                }
            }
        }

        VersionCommands::Verify => {
            let report = vc.verify()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Checked {} object(s), {} circuit(s), {} commit(s)",
                    report.objects_checked, report.circuits_checked, report.commits_checked
                );
                for problem in &report.problems {
                    println!("  ✗ {}", problem);
                }
                if report.is_clean() {
                    println!("✓ Repository is consistent");
                }
            }
            if !report.is_clean() {
                return Ok(ErrorKind::Integrity.exit_code());
            }
        }

        VersionCommands::Stats => {
            let stats = vc.stats()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                let repo = vc.repository();
                println!("Repository Statistics:");
                println!("  Location:     {}", repo.root().display());
                println!("  Author:       {}", repo.default_author());
                println!("  Circuits:     {}", stats.circuit_count);
                println!("  Commits:      {}", stats.commit_count);
                println!("  Objects:      {}", stats.objects.object_count);
                println!("  Stored bytes: {}", stats.objects.total_size_bytes);
            }
        }
    }

    Ok(0)
}

fn init_repository(path: &Path, author: &str, force: bool, json: bool) -> Result<i32> {
    let repo = Repository::init(path, author, force)
        .with_context(|| format!("Failed to initialize {}", path.display()))?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "path": repo.root(),
                "default_author": repo.default_author(),
                "format_version": repo.config().format_version,
                "created_at": repo.config().created_at,
            }))?
        );
    } else {
        println!(
            "✓ Initialized circuit repository at {}",
            repo.root().display()
        );
    }
    Ok(0)
}

fn read_circuit_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        let err = if e.kind() == std::io::ErrorKind::NotFound {
            CircuitVcError::not_found(format!("circuit file {}", path.display()))
        } else {
            CircuitVcError::Io(e)
        };
        anyhow::Error::new(err).context(format!("Failed to read {}", path.display()))
    })
}

fn format_summary(version: &CommitSummary) -> String {
    format!(
        "{:>4}  {}  {}  {:<16}  {}",
        version.sequence_number,
        version.id,
        version.timestamp.format("%Y-%m-%d %H:%M:%S"),
        version.author,
        version.title()
    )
}

fn print_version_diff(diff: &VersionDiff) {
    println!(
        "--- {} version {} ({})",
        diff.circuit_name, diff.from.sequence_number, diff.from.id
    );
    println!(
        "+++ {} version {} ({})",
        diff.circuit_name, diff.to.sequence_number, diff.to.id
    );
    print!("{}", diff.diff.to_text());

    let stats = diff.diff.stats();
    println!(
        "{} kept, {} removed, {} inserted",
        stats.kept, stats.removed, stats.inserted
    );
}
