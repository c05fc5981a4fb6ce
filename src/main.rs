//! Purpose: `heapbridge` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, builds a bridge, runs commands, emits JSON on stdout.
//! Invariants: Command results go to stdout; errors and notices go to stderr.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use heapbridge::api::{BridgeConfig, DEFAULT_MEMORY_LIMIT, Error, ErrorKind, to_exit_code};
use heapbridge::notice::{Notice, notice_json};
use heapbridge::report_json::{error_json, error_message};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `heapbridge --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();

    let color_mode = cli.color;
    let config = BridgeConfig::new()
        .with_memory_limit(cli.memory_limit)
        .with_table_capacity(cli.table_capacity);

    command_dispatch::dispatch_command(cli.command, config, color_mode)
        .map_err(|err| (err, color_mode))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "heapbridge",
    version,
    about = "Handle table and UTF-16 heap strings for linear-memory sandboxes",
    long_about = None,
    after_help = r#"EXAMPLES
  $ heapbridge encode AB
  $ heapbridge decode 0200000041004200
  $ heapbridge run ops.json
  $ echo '{"op":"store","value":"hi"}' | heapbridge run -

NOTES
  - Handles are printed as u64 bits: generation << 32 | slot index
  - Pointers are heap string bases; the 4-byte count header comes first
  - Set RUST_LOG=debug to trace bridge operations on stderr"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value_t = DEFAULT_MEMORY_LIMIT,
        help = "Linear memory limit in bytes for the bridge arena"
    )]
    memory_limit: u32,
    #[arg(
        long,
        default_value_t = 0,
        help = "Initial handle table capacity (slots)"
    )]
    table_capacity: usize,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics and pretty JSON output: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        about = "Encode text into a heap string buffer",
        after_help = r#"EXAMPLES
  $ heapbridge encode AB
  {"count":2,"hex":"0200000041004200","len":8,"ptr":8}"#
    )]
    Encode {
        #[arg(help = "Text to encode as UTF-16 code units")]
        text: String,
    },
    #[command(
        about = "Decode a heap string buffer given as hex",
        after_help = r#"EXAMPLES
  $ heapbridge decode 0200000041004200
  $ heapbridge decode --count 2 0200000041004200

NOTES
  - Without --count the buffer length must match its header exactly
  - With --count the buffer is loaded into the arena and decoded (consumed) from there"#
    )]
    Decode {
        #[arg(help = "Wire buffer bytes as hex (whitespace and 0x prefix allowed)")]
        hex: String,
        #[arg(long, help = "Code unit count to pass to decode")]
        count: Option<u32>,
    },
    #[command(
        about = "Replay a script of bridge operations",
        after_help = r#"EXAMPLES
  $ heapbridge run ops.json
  $ heapbridge run --keep-going ops.jsonl

SCRIPT
  A JSON array (or JSON Lines) of ops:
    {"op":"store","value":"hi"}          {"op":"load","handle":0}
    {"op":"release","handle":0}          {"op":"push","list":0,"elem":1}
    {"op":"encode","text":"hi"}          {"op":"export","handle":0}
    {"op":"decode","ptr":8,"count":2}    {"op":"import","ptr":8,"count":2}
    {"op":"free","ptr":8}                {"op":"read","ptr":8,"len":8}"#
    )]
    Run {
        #[arg(help = "Script path (use - for stdin)", value_hint = ValueHint::FilePath)]
        script: String,
        #[arg(long, help = "Report failing ops and continue instead of stopping")]
        keep_going: bool,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

fn read_script_input(script: &str) -> Result<String, Error> {
    if script == "-" {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read script from stdin")
                .with_source(err)
        })?;
        return Ok(input);
    }
    let path = PathBuf::from(script);
    std::fs::read_to_string(&path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message(format!("failed to read script {}", path.display()))
            .with_hint("Pass a readable file path, or - for stdin.")
            .with_source(err)
    })
}

fn emit_version_output(color_mode: ColorMode) {
    if io::stdout().is_terminal() {
        println!("heapbridge {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(
            json!({
                "name": "heapbridge",
                "version": env!("CARGO_PKG_VERSION"),
            }),
            color_mode,
        );
    }
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_line(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {}", notice.message);
        return;
    }

    let value = notice_json(notice);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));
    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(handle) = err.handle() {
        lines.push(format!(
            "{} {handle:#x}",
            colorize_label("handle:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(ptr) = err.ptr() {
        lines.push(format!(
            "{} {ptr:#x}",
            colorize_label("ptr:", use_color, AnsiColor::Yellow)
        ));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, error_text};
    use clap::Parser;
    use heapbridge::api::{Error, ErrorKind};

    #[test]
    fn error_text_respects_color_flag() {
        let err = Error::new(ErrorKind::InvalidHandle)
            .with_message("handle was released")
            .with_handle(0x1_0000_0000);
        let colored = error_text(&err, true);
        let plain = error_text(&err, false);
        assert!(colored.contains("\u{1b}[31merror:\u{1b}[0m"));
        assert!(plain.contains("error: handle was released"));
        assert!(plain.contains("handle: 0x100000000"));
        assert!(!plain.contains("\u{1b}["));
    }

    #[test]
    fn global_flags_configure_bridge() {
        let cli = Cli::try_parse_from([
            "heapbridge",
            "--memory-limit",
            "4096",
            "--table-capacity",
            "8",
            "encode",
            "AB",
        ])
        .expect("parse");
        assert_eq!(cli.memory_limit, 4096);
        assert_eq!(cli.table_capacity, 8);
        assert!(matches!(cli.command, Command::Encode { ref text } if text == "AB"));
    }
}
