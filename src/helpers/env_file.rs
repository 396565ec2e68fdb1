use std::fs;
use std::path::Path;

use crate::prelude::*;

/// Parse `KEY=VALUE` lines. Blank lines, `#` comments and lines without `=` are skipped.
///
/// Values are kept verbatim, quotes included.
pub fn parse_env_file(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value))
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Overrides of the environment file at `path`. An unreadable file only produces a warning.
pub fn load_env_file(path: &Path) -> Vec<(String, String)> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let overrides = parse_env_file(&content);
            debug!(
                "Loaded {} environment overrides from {}",
                overrides.len(),
                path.display()
            );
            overrides
        }
        Err(e) => {
            warn!("Ignoring environment file {}: {e}", path.display());
            vec![]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_env_file() {
        let content = "\
# database settings
DB_HOST=localhost

  DB_PORT=5432  
NOT_AN_ASSIGNMENT
GREETING=hello=world
EMPTY=
=orphan
QUOTED=\"a b\"
";
        assert_eq!(
            parse_env_file(content),
            pairs(&[
                ("DB_HOST", "localhost"),
                ("DB_PORT", "5432"),
                ("GREETING", "hello=world"),
                ("EMPTY", ""),
                ("QUOTED", "\"a b\""),
            ])
        );
    }

    #[test]
    fn test_load_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.env");
        fs::write(&path, "THREADS=4\n").unwrap();

        assert_eq!(load_env_file(&path), pairs(&[("THREADS", "4")]));
    }

    #[test]
    fn test_missing_env_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_env_file(&dir.path().join("missing.env")).is_empty());
    }
}
