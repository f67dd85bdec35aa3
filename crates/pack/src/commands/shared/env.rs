//! `-e/--env`, `--env-file`, and `--volume` flag parsing shared by `build`
//! and `rebase`.

use pack_core::docker::Bind;
use pack_core::errors::{PackError, Result};
use std::collections::HashMap;
use std::path::Path;

/// Parse one `KEY=VALUE` pair, as accepted by `-e/--env`.
pub fn parse_env_pair(pair: &str) -> Result<(String, String)> {
    match pair.split_once('=') {
        Some((key, value)) => Ok((key.to_string(), value.to_string())),
        None => Err(PackError::usage(format!(
            "invalid --env value '{pair}': expected KEY=VALUE"
        ))),
    }
}

/// Parse an `--env-file`: one `KEY=VALUE` per line, blank lines and `#`
/// comments ignored.
pub fn parse_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| PackError::io(format!("reading '{}'", path.display()), e))?;
    let mut env = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = parse_env_pair(line)?;
        env.insert(key, value);
    }
    Ok(env)
}

/// Parse a `--volume source:target[:ro]` value.
pub fn parse_volume(spec: &str) -> Result<Bind> {
    let parts: Vec<&str> = spec.splitn(3, ':').collect();
    if parts.len() < 2 {
        return Err(PackError::usage(format!(
            "invalid --volume value '{spec}': expected source:target[:ro]"
        )));
    }
    let read_only = parts.get(2).map(|flag| *flag == "ro").unwrap_or(false);
    Ok(Bind {
        source: parts[0].to_string(),
        target: parts[1].to_string(),
        read_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_pair_requires_equals() {
        assert!(parse_env_pair("NODE_ENV").is_err());
        let (k, v) = parse_env_pair("NODE_ENV=production").unwrap();
        assert_eq!(k, "NODE_ENV");
        assert_eq!(v, "production");
    }

    #[test]
    fn volume_parses_optional_ro_suffix() {
        let bind = parse_volume("/host:/container:ro").unwrap();
        assert_eq!(bind.source, "/host");
        assert_eq!(bind.target, "/container");
        assert!(bind.read_only);

        let bind = parse_volume("cache-vol:/cache").unwrap();
        assert!(!bind.read_only);
    }

    #[test]
    fn volume_rejects_missing_target() {
        assert!(parse_volume("/host").is_err());
    }
}
