//! Byte size arguments.

/// Parses a byte count with an optional binary suffix.
///
/// Accepts a plain number (`4096`) or a number followed by `K`, `M` or `G`
/// (case-insensitive, optional trailing `B` or `iB`), e.g. `64M`, `1GiB`.
///
/// # Errors
///
/// Returns a message suitable for clap if the input is malformed, zero, or
/// overflows `u64`.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, suffix) = trimmed.split_at(split);

    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{s}', expected e.g. 4096, 512K or 64M"))?;

    let shift = match suffix.to_ascii_uppercase().as_str() {
        "" | "B" => 0,
        "K" | "KB" | "KIB" => 10,
        "M" | "MB" | "MIB" => 20,
        "G" | "GB" | "GIB" => 30,
        other => return Err(format!("unknown size suffix '{other}' in '{s}'")),
    };

    let bytes = value
        .checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size '{s}' is too large"))?;
    if bytes == 0 {
        return Err("size must be greater than zero".to_string());
    }
    Ok(bytes)
}
