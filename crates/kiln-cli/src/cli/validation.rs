use std::path::PathBuf;

/// Parse an `--entry NAME=PATH` value.
///
/// The name becomes the output file stem, so it may not contain a path
/// separator.
pub fn parse_entry(s: &str) -> Result<(String, PathBuf), String> {
    let Some((name, path)) = s.split_once('=') else {
        return Err(format!("expected NAME=PATH, got '{}'", s));
    };
    let name = name.trim();
    let path = path.trim();

    if name.is_empty() {
        return Err(format!("entry name is empty in '{}'", s));
    }
    if name.contains(['/', '\\']) {
        return Err(format!("entry name may not contain a path separator: '{}'", name));
    }
    if path.is_empty() {
        return Err(format!("entry path is empty in '{}'", s));
    }

    Ok((name.to_string(), PathBuf::from(path)))
}

pub fn parse_inline_limit(s: &str) -> Result<u64, String> {
    match s.parse::<u64>() {
        Ok(0) => Err("inline limit must be greater than zero".to_string()),
        Ok(limit) => Ok(limit),
        Err(e) => Err(format!("invalid byte count '{}': {}", s, e)),
    }
}
