use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::debug;

const ENV_PREFIX: &str = "COLORIZER_";

pub(super) fn read_env_file(app_root: &Path) -> Result<HashMap<String, String>, std::io::Error> {
    let path = app_root.join(".env");
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path)?;
    Ok(parse_env_file(raw.as_str()))
}

// Only keys in the COLORIZER_ namespace are kept.
pub(super) fn parse_env_file(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for (key, value) in raw.lines().filter_map(parse_env_line) {
        if !key.starts_with(ENV_PREFIX) {
            debug!(key = %key, "skipping .env key outside the colorizer namespace");
            continue;
        }
        out.insert(key, value);
    }
    out
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map_or(line, str::trim_start);
    let (key, value) = line.split_once('=')?;
    Some((key.trim().to_string(), unquote(value.trim()).to_string()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
        .split_once(" #")
        .map_or(value, |(before, _)| before.trim_end())
}
