//! Configuration loading utilities.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::config::schema::Config;

/// Load configuration from a JSON file, or return a default [`Config`] if
/// the file does not exist or cannot be parsed.
pub fn load_config(path: &Path) -> Config {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        "Failed to parse config from {}: {}. Using default configuration.",
                        path.display(),
                        e
                    );
                }
            },
            Err(e) => {
                warn!(
                    "Failed to read config from {}: {}. Using default configuration.",
                    path.display(),
                    e
                );
            }
        }
    }

    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = load_config(Path::new("/nonexistent/plumebot.json"));
        assert_eq!(cfg.agent.max_iterations, 10);
    }

    #[test]
    fn test_valid_file_loads() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"agent": {{"maxIterations": 3}}}}"#).unwrap();
        let cfg = load_config(f.path());
        assert_eq!(cfg.agent.max_iterations, 3);
    }

    #[test]
    fn test_malformed_file_gives_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        let cfg = load_config(f.path());
        assert_eq!(cfg.parser.max_tool_calls, 8);
    }
}
