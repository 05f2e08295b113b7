//! Registry configuration.

use std::path::{Path, PathBuf};

/// Registry configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Mapping file read by `Sorcery::apply_config` (none disables it)
    pub mapping_file: Option<PathBuf>,
    /// Directory used to resolve relative backend file paths
    pub config_dir: PathBuf,
    /// Maximum retry attempts for transient I/O errors
    pub io_max_retries: u32,
    /// Delay between retry attempts in milliseconds
    pub io_retry_delay_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            mapping_file: None,
            config_dir: PathBuf::from("."),
            io_max_retries: 3,     // Default retry attempts
            io_retry_delay_ms: 50, // 50ms delay between retries
        }
    }
}

impl RegistryConfig {
    /// Resolves `path` against `config_dir` unless it is absolute.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}
