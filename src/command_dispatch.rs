//! Purpose: Hold top-level CLI command dispatch for `heapbridge`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each command builds a fresh bridge from the shared `BridgeConfig`.
//! Invariants: `run` emits one JSON line per op, then a leak notice if state remains live.

use super::*;
use heapbridge::api::{Bridge, LinearMemory, Utf16Text, decode_wire};
use heapbridge::hex::{parse_hex, to_hex};
use heapbridge::notice::leak_notice;
use heapbridge::script::{parse_script, run_script};

pub(super) fn dispatch_command(
    command: Command,
    config: BridgeConfig,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "heapbridge", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output(color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Encode { text } => {
            let mut bridge = Bridge::with_config(&config);
            let text = Utf16Text::from(text.as_str());
            let ptr = bridge.encode_to_heap(&text)?;
            let len = bridge.memory().allocation_len(ptr).ok_or_else(|| {
                Error::new(ErrorKind::Internal)
                    .with_message("encoded buffer is not a live allocation")
                    .with_ptr(ptr)
            })?;
            let bytes = bridge.memory().read_bytes(ptr, len)?;
            emit_json(
                json!({
                    "ptr": ptr,
                    "len": len,
                    "count": text.len(),
                    "hex": to_hex(bytes),
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Decode { hex, count } => {
            let bytes = parse_hex(&hex)?;
            let text = match count {
                None => decode_wire(&bytes)?,
                Some(count) => {
                    let mut bridge = Bridge::with_config(&config);
                    let size = u32::try_from(bytes.len()).map_err(|_| {
                        Error::new(ErrorKind::OutOfMemory)
                            .with_message("buffer does not fit in linear memory")
                    })?;
                    let ptr = bridge.allocate(size)?;
                    bridge.memory_mut().write_bytes(ptr, &bytes)?;
                    bridge.decode_from_heap(ptr, count)?
                }
            };
            emit_json(
                json!({
                    "count": text.len(),
                    "text": text.to_string_lossy(),
                    "units": text.units(),
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Run { script, keep_going } => {
            let input = read_script_input(&script)?;
            let ops = parse_script(&input)?;
            let mut bridge = Bridge::with_config(&config);
            let summary = run_script(&mut bridge, &ops, keep_going, |value| emit_line(&value))?;

            let time = notice_time_now().unwrap_or_default();
            let live = bridge.live_handles();
            if let Some(notice) = leak_notice("run", time, &bridge.stats(), &live) {
                emit_notice(&notice, color_mode);
            }
            match summary.first_failure {
                Some(kind) => Ok(RunOutcome::with_code(to_exit_code(kind))),
                None => Ok(RunOutcome::ok()),
            }
        }
    }
}
