//! `pcc`: the Pascal-to-P-Code compiler command-line driver.
//!
//! Parses a single Pascal source file and emits either a debug text dump of
//! the collected opcodes or a JSON diagnostics report, depending on
//! `--emit`.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use pcc_front::objectsink::VecSink;

/// Command-line interface for the Pascal-to-P-Code front end.
#[derive(Parser)]
#[command(name = "pcc")]
#[command(about = "Single-pass Pascal-to-P-Code compiler front end", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the Pascal source file to compile.
    input: PathBuf,

    /// What to print on success.
    #[arg(long, value_enum, default_value_t = EmitFormat::Text)]
    emit: EmitFormat,

    /// Print diagnostics as JSON even when there are none.
    #[arg(long)]
    always_diagnostics: bool,

    /// Include-file search directories. Accepted for compatibility with the
    /// driver contract; unused until the tokenizer grows `{$I file}`
    /// inclusion.
    #[arg(short = 'I', long = "include")]
    include_dirs: Vec<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitFormat {
    /// Human-readable opcode and symbol dump.
    Text,
    /// Machine-readable diagnostics only.
    Json,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    if !cli.include_dirs.is_empty() {
        log::debug!("include directories {:?} accepted but not yet consulted", cli.include_dirs);
    }

    let source = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("pcc: cannot read {}: {e}", cli.input.display());
            return ExitCode::FAILURE;
        }
    };

    let mut sink = VecSink::new();
    let source_path = cli.input.display().to_string();
    let result = pcc_front::compile(&source, &source_path, &mut sink);

    match cli.emit {
        EmitFormat::Json => {
            let diagnostics_json = serde_json::to_string_pretty(&result.diagnostics)
                .unwrap_or_else(|_| "[]".to_string());
            println!("{diagnostics_json}");
        }
        EmitFormat::Text => {
            for diag in &result.diagnostics {
                eprintln!("{:?}: {} ({}..{})", diag.kind, diag.message, diag.span.start, diag.span.end);
            }
            if cli.always_diagnostics || result.diagnostics.is_empty() {
                println!("opcodes: {}", sink.opcodes.len());
                println!("symbols: {}", sink.symbols.len());
                println!("ro_data bytes: {}", sink.ro_data.len());
            }
        }
    }

    if result.diagnostics.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
