use log::{error, info, LevelFilter};
use std::sync::Arc;

use rusty_c64::components::reference_machine;
use rusty_c64::console::{run_console, ConsoleConfig, ConsoleHooks, ConsoleLogger};
use rusty_c64::runloop::MIN_PRG_LEN;
use rusty_c64::{Runloop, RunloopConfig};

const BASIC_START: u16 = 0x0801;

fn usage() {
    eprintln!("Usage: rusty_c64 [config.json] [program.prg]");
}

/// Command that starts a program loaded at `load_addr`.
fn start_command(load_addr: u16) -> String {
    if load_addr == BASIC_START {
        "RUN\r".to_string()
    } else {
        format!("SYS {}\r", load_addr)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        usage();
        return;
    }

    let config = match args.first() {
        Some(path) => match RunloopConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => RunloopConfig::default(),
    };

    let program = match args.get(1) {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                eprintln!("Failed to read program '{}': {}", path, e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let console_config = ConsoleConfig::default();
    let logger = match ConsoleLogger::install(console_config.log_lines, LevelFilter::Info) {
        Ok(logger) => Some(logger),
        Err(e) => {
            eprintln!("Log capture unavailable: {}", e);
            None
        }
    };

    let hooks = ConsoleHooks::new();
    let runloop = Runloop::with_config(reference_machine(&config), config.clone(), Arc::new(hooks.clone()));

    match program {
        Some(image) if image.len() >= MIN_PRG_LEN => {
            let command = start_command(u16::from_le_bytes([image[0], image[1]]));
            let runloop = runloop.clone();
            tokio::spawn(async move {
                match runloop.ingest_prg(&image, &command).await {
                    Ok(_) => info!("Program started with {:?}", command.trim_end()),
                    Err(e) => error!("Failed to start program: {}", e),
                }
            });
        }
        Some(image) => {
            eprintln!("Program image too short ({} bytes)", image.len());
            std::process::exit(1);
        }
        None => {
            if let Err(e) = runloop.run_default() {
                error!("Failed to start: {}", e);
            }
        }
    }

    if let Err(e) = run_console(runloop, hooks, logger, console_config).await {
        eprintln!("Console error: {}", e);
        std::process::exit(1);
    }
}
