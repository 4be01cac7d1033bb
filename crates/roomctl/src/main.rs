use std::env;
use std::io;
use std::process::ExitCode;

use roomctl::{run, CommandKind, CommonOptions};

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let mut options = CommonOptions::default();
    let mut index = 0usize;
    while index < args.len() {
        match args[index].as_str() {
            "--url" => {
                let value = args
                    .get(index + 1)
                    .ok_or_else(|| "missing value for --url".to_string())?;
                options.url = value.clone();
                index += 2;
            }
            _ => break,
        }
    }

    let command = args
        .get(index)
        .ok_or_else(|| "missing subcommand".to_string())?
        .as_str();
    let command_args = &args[(index + 1)..];

    let kind = match command {
        "rooms" => {
            if !command_args.is_empty() {
                return Err("rooms takes no arguments".to_string());
            }
            CommandKind::Rooms
        }
        "top" => {
            if !command_args.is_empty() {
                return Err("top takes no arguments".to_string());
            }
            CommandKind::Top
        }
        other => return Err(format!("unknown subcommand '{other}'")),
    };

    run(kind, options, &mut io::stdout())
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "roomctl - room directory and leaderboard client",
        "",
        "Usage:",
        "  roomctl [--url <base>] rooms",
        "  roomctl [--url <base>] top",
        "",
        "Defaults:",
        "  --url http://127.0.0.1:8090",
    ]
    .join("\n")
}
