mod bootstrap;
mod console;
mod objects;
mod pack;
mod scene_controller;
mod script;
mod session;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use sce_engine::sce_catalog;
use tracing::{error, info};

pub(crate) use bootstrap::init_tracing;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invocation {
    Run {
        script: PathBuf,
    },
    Pack {
        source: PathBuf,
        archive: PathBuf,
        segmented: bool,
    },
    Opcodes,
    Help,
}

pub(crate) fn parse_invocation(args: &[String]) -> Result<Invocation, String> {
    let Some(command) = args.first() else {
        return Err(usage_text());
    };
    let rest = &args[1..];
    match command.as_str() {
        "-h" | "--help" => Ok(Invocation::Help),
        "run" => match rest {
            [script] => Ok(Invocation::Run {
                script: PathBuf::from(script),
            }),
            [] => Err("run requires a script path".to_string()),
            _ => Err("run takes exactly one script path".to_string()),
        },
        "pack" => match rest {
            [source, archive] => Ok(Invocation::Pack {
                source: PathBuf::from(source),
                archive: PathBuf::from(archive),
                segmented: false,
            }),
            [source, archive, flag] if flag == "--segmented" => Ok(Invocation::Pack {
                source: PathBuf::from(source),
                archive: PathBuf::from(archive),
                segmented: true,
            }),
            _ => Err("usage: pack <source_dir> <archive> [--segmented]".to_string()),
        },
        "opcodes" => {
            if rest.is_empty() {
                Ok(Invocation::Opcodes)
            } else {
                Err("opcodes takes no arguments".to_string())
            }
        }
        other => Err(format!("unknown subcommand '{other}'\n{}", usage_text())),
    }
}

pub(crate) fn usage_text() -> String {
    [
        "usage: sce_runner <command>",
        "",
        "commands:",
        "  run <script.json>   decode and dispatch a run script",
        "  pack <dir> <archive> [--segmented]",
        "                      pack a directory into an archive",
        "  opcodes             print the opcode table as JSON",
        "",
        "environment:",
        "  SCE_DATA_ROOT           directory holding the archives",
        "  SCE_ARCHIVE_EXTENSION   archive file extension (default .pak)",
        "  RUST_LOG                log filter (default info)",
    ]
    .join("\n")
}

pub(crate) fn run(invocation: Invocation) -> ExitCode {
    match invocation {
        Invocation::Help => {
            println!("{}", usage_text());
            ExitCode::SUCCESS
        }
        Invocation::Opcodes => print_opcodes(),
        Invocation::Run { script } => run_script(&script),
        Invocation::Pack {
            source,
            archive,
            segmented,
        } => match pack::pack_directory(&source, &archive, segmented) {
            Ok(_) => ExitCode::SUCCESS,
            Err(err) => {
                error!(error = %err, "pack_failed");
                ExitCode::FAILURE
            }
        },
    }
}

fn print_opcodes() -> ExitCode {
    let table = sce_catalog().map(|builder| builder.build().to_json());
    match table {
        Ok(Ok(json)) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            error!(error = %err, "opcode_table_encode_failed");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!(error = %err, "startup_failed");
            ExitCode::FAILURE
        }
    }
}

fn run_script(path: &Path) -> ExitCode {
    let started = script::load_run_script(path).and_then(|run_script| {
        let script_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let config = bootstrap::RunnerConfig::resolve(&run_script, script_dir)?;
        let wiring = bootstrap::build_runner(&config)?;
        Ok((run_script, wiring))
    });
    let (run_script, wiring) = match started {
        Ok(started) => started,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    let outcome = session::execute_script(&wiring, &run_script);
    {
        let controller = wiring.scene_controller.borrow();
        let console = wiring.console.borrow();
        info!(
            scene = ?controller.current_scene(),
            scene_entry_bytes = ?controller.entry_len(),
            resident = ?wiring.cache.borrow().resident_archive(),
            game_state = ?console.game_state(),
            transcript_lines = console.transcript().count(),
            "run_state"
        );
    }
    wiring.cache.borrow_mut().dispose();

    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "script_failed");
            ExitCode::FAILURE
        }
    }
}
