//! Start-up configuration read from an INI file (`vm.ini` by default).
//!
//! ```ini
//! ; heap persistence
//! [general]
//! bootfile=boot.dat
//! writeable=true
//! debug=false
//! ```
//!
//! Only the `[general]` section is read. Unknown keys and sections are
//! ignored so the file can be shared with other tools.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use zvm_derive::Error;

/// File looked up in the working directory when no `-c` option is given.
pub const DEFAULT_CONFIG_FILE: &str = "vm.ini";

const GENERAL_SECTION: &str = "general";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Engine configuration. Read once at start-up and never mutated by the VM.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Heap persistence file, loaded before execution.
    pub bootfile: Option<PathBuf>,
    /// Mirror every heap mutation to `bootfile`.
    pub writeable: bool,
    /// Trace every executed instruction.
    pub debug: bool,
}

impl Config {
    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut config = Config::default();
        let mut section = String::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| ConfigError::Parse {
                    line: idx + 1,
                    message: format!("unterminated section header '{line}'"),
                })?;
                section = name.trim().to_ascii_lowercase();
                continue;
            }

            let (key, value) = line.split_once('=').ok_or_else(|| ConfigError::Parse {
                line: idx + 1,
                message: format!("expected key=value, got '{line}'"),
            })?;

            if section != GENERAL_SECTION {
                continue;
            }

            let value = value.trim();
            match key.trim() {
                "bootfile" if !value.is_empty() => config.bootfile = Some(PathBuf::from(value)),
                "writeable" => config.writeable = parse_bool(value),
                "debug" => config.debug = parse_bool(value),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Loads the configuration at `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}
