use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use anyhow::Result;

/// Reads a file to a string, returning `None` when it does not exist
pub fn read_optional(path: impl AsRef<Path>) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Reads a file as raw bytes, returning `None` when it does not exist
pub fn read_optional_bytes(path: impl AsRef<Path>) -> std::io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Shortens text to at most max_chars characters for log lines, appending an ellipsis when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Parses a 1-based list selection such as "#3" against a list of length len
pub fn parse_selection(input: &str, len: usize) -> Result<usize> {
    let digits = input.trim().trim_start_matches('#');
    let n: usize = digits.parse()?;
    if n == 0 || n > len {
        anyhow::bail!("selection {n} out of range 1..={len}");
    }
    Ok(n - 1)
}
