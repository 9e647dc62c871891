//! CLI smoke entry point and workspace maintenance tool.
//!
//! # Responsibility
//! - Without a subcommand, print ping/version to verify `designspace_core`
//!   linkage.
//! - `list`, `export` and `import` operate on a workspace database file.

use clap::{Parser, Subcommand};
use designspace_core::db::open_db;
use designspace_core::{SqliteBulkTier, SqliteKvTier, Store, Workspace};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "designspace_cli", version, about = "Design-space workspace utilities")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered projects; `*` marks the current one.
    List {
        /// Workspace database file
        db: PathBuf,
    },
    /// Print one project as export JSON.
    Export {
        db: PathBuf,
        project_id: String,
    },
    /// Import an exported project (or a bare document) as the current project.
    Import {
        db: PathBuf,
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = match cli.command {
        None => {
            println!("designspace_core ping={}", designspace_core::ping());
            println!("designspace_core version={}", designspace_core::core_version());
            Ok(())
        }
        Some(Commands::List { db }) => with_workspace(&db, |workspace| {
            for meta in workspace.projects() {
                let marker = if meta.id == workspace.current_project_id() {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}\t{}\t{}", meta.id, meta.name, meta.theme);
            }
            Ok(())
        }),
        Some(Commands::Export { db, project_id }) => with_workspace(&db, |workspace| {
            let json = workspace
                .export_project(&project_id)
                .map_err(|err| err.to_string())?;
            println!("{json}");
            Ok(())
        }),
        Some(Commands::Import { db, file }) => std::fs::read_to_string(&file)
            .map_err(|err| format!("failed to read `{}`: {err}", file.display()))
            .and_then(|text| {
                with_workspace(&db, |workspace| {
                    let meta = workspace
                        .import_project(&text)
                        .map_err(|err| err.to_string())?;
                    println!("imported {}\t{}", meta.id, meta.name);
                    Ok(())
                })
            }),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

/// Opens the workspace at `db`, runs `f`, then flushes pending saves.
fn with_workspace(
    db: &Path,
    f: impl FnOnce(&mut Workspace<'_>) -> Result<(), String>,
) -> Result<(), String> {
    let conn = open_db(db).map_err(|err| format!("failed to open `{}`: {err}", db.display()))?;
    let bulk = SqliteBulkTier::try_new(&conn).map_err(|err| err.to_string())?;
    let kv = SqliteKvTier::try_new(&conn).map_err(|err| err.to_string())?;
    let mut workspace = Workspace::open(Store::new(bulk, kv));
    let result = f(&mut workspace);
    workspace.tick();
    result
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
