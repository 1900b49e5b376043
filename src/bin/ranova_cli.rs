use ranova::project::Project;
use ranova::r_engine::{EngineConfig, REngine, RscriptEngine};
use ranova::shell::{parse_shell_line, parse_shell_tokens, shell_help_text, ShellSession};
use serde::Serialize;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

fn usage() {
    eprintln!(
        "Usage:\n  \
  ranova_cli --version\n  \
  ranova_cli [--rscript PROG] [--workdir DIR] [--no-packages]\n  \
  ranova_cli [--rscript PROG] [--workdir DIR] [--no-packages] SHELL_COMMAND...\n\n  \
  Without a shell command an interactive prompt is started.\n\n{}",
        shell_help_text()
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Could not serialize JSON output: {e}"))?;
    println!("{text}");
    Ok(())
}

/// Global flags before the first shell word; returns the engine config and
/// the index of the first non-flag argument.
fn parse_global_args(args: &[String]) -> Result<(EngineConfig, usize), String> {
    let mut config = EngineConfig::default();
    let mut idx = 1;
    while idx < args.len() {
        match args[idx].as_str() {
            "--rscript" => {
                config.program = args
                    .get(idx + 1)
                    .ok_or_else(|| "Missing value after --rscript".to_string())?
                    .clone();
                idx += 2;
            }
            "--workdir" => {
                config.working_dir = Some(
                    args.get(idx + 1)
                        .ok_or_else(|| "Missing value after --workdir".to_string())?
                        .clone(),
                );
                idx += 2;
            }
            "--no-packages" => {
                config.packages.clear();
                idx += 1;
            }
            _ => break,
        }
    }
    Ok((config, idx))
}

fn start_session(config: &EngineConfig) -> Result<ShellSession, String> {
    let engine = RscriptEngine::start(config)
        .map_err(|e| format!("Could not start '{}': {e}", config.program))?;
    engine
        .ping()
        .map_err(|e| format!("Engine started but did not answer: {e}"))?;
    let engine: Arc<dyn REngine> = Arc::new(engine);
    let project = Project::new(engine);
    project
        .refresh_all()
        .map_err(|e| format!("Could not list engine objects: {e}"))?;
    Ok(ShellSession::new(project))
}

fn run_interactive(session: &ShellSession) -> Result<(), String> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("ranova> ");
        stdout.flush().map_err(|e| e.to_string())?;
        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| format!("Could not read input: {e}"))?;
        if read == 0 {
            return Ok(());
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line == "quit" || line == "exit" {
            return Ok(());
        }
        match parse_shell_line(line).and_then(|cmd| session.execute(&cmd)) {
            Ok(result) => print_json(&result.output)?,
            Err(e) => eprintln!("{e}"),
        }
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", ranova::version_cli_text());
        return Ok(());
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        usage();
        return Ok(());
    }

    let (config, cmd_idx) = parse_global_args(&args)?;

    if args.len() <= cmd_idx {
        let session = start_session(&config)?;
        return run_interactive(&session);
    }

    let command = parse_shell_tokens(&args[cmd_idx..]).map_err(|e| {
        usage();
        e
    })?;
    let session = start_session(&config)?;
    let result = session.execute(&command)?;
    print_json(&result.output)
}
