//! Purpose: Hex rendering and parsing for wire buffers shown on the CLI.
//! Exports: `to_hex`, `parse_hex`.
//! Invariants: Output is lowercase without separators; input tolerates whitespace and `0x`.
use crate::core::error::{Error, ErrorKind};

pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn parse_hex(input: &str) -> Result<Vec<u8>, Error> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    let digits: String = trimmed.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    hex::decode(&digits).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid hex input")
            .with_hint("Pass an even number of hex digits, optionally prefixed with 0x.")
            .with_source(err)
    })
}
