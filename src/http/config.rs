use std::path::PathBuf;

/// File uploads above this many bytes move to disk.
pub const DEFAULT_MEMORY_THRESHOLD: usize = 0x4000;
pub const DEFAULT_MAX_PART_HEADER_BYTES: usize = 8 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub memory_threshold: usize,
    /// System temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    pub max_part_header_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_threshold: DEFAULT_MEMORY_THRESHOLD,
            temp_dir: None,
            max_part_header_bytes: DEFAULT_MAX_PART_HEADER_BYTES,
        }
    }
}

impl Config {
    /// Reads ASSEMBLER_MEMORY_THRESHOLD, ASSEMBLER_TEMP_DIR and
    /// ASSEMBLER_MAX_PART_HEADER_BYTES, keeping defaults for unset or unparsable values.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.memory_threshold = parse_env_usize("ASSEMBLER_MEMORY_THRESHOLD", cfg.memory_threshold);
        cfg.temp_dir = std::env::var("ASSEMBLER_TEMP_DIR").ok().map(PathBuf::from);
        cfg.max_part_header_bytes =
            parse_env_usize("ASSEMBLER_MAX_PART_HEADER_BYTES", cfg.max_part_header_bytes);

        cfg
    }

    pub fn memory_threshold(mut self, bytes: usize) -> Self {
        self.memory_threshold = bytes;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(default)
}
