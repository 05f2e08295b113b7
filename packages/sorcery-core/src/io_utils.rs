//! I/O helpers shared by file based backends.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use crate::error::SorceryError;

/// Classifies I/O errors into specific `SorceryError` variants.
pub fn classify_io_error(error: std::io::Error, context: &str) -> SorceryError {
    match error.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => {
            SorceryError::TransientIo(format!("{}: {}", context, error))
        }
        _ => SorceryError::Io(format!("{}: {}", context, error)),
    }
}

/// Retries an operation that may fail with transient I/O errors.
pub fn retry_io_operation<F, T>(
    operation: F,
    max_retries: u32,
    retry_delay_ms: u64,
    context: &str,
) -> Result<T, SorceryError>
where
    F: Fn() -> Result<T, SorceryError>,
{
    let mut attempt = 0;
    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(err);
                }

                if let SorceryError::TransientIo(_) = err {
                    tracing::warn!(
                        "Transient I/O error in {} (attempt {}/{}): {}",
                        context,
                        attempt,
                        max_retries,
                        err
                    );

                    if retry_delay_ms > 0 {
                        std::thread::sleep(std::time::Duration::from_millis(retry_delay_ms));
                    }

                    continue;
                }

                return Err(err);
            }
        }
    }
}

/// Writes `contents` to `path` through a temporary sibling file and an
/// atomic rename, so readers never observe a partially written file.
pub fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), SorceryError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|e| classify_io_error(e, "Failed to create directory"))?;
        }
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = std::path::PathBuf::from(temp_path);

    let mut file =
        File::create(&temp_path).map_err(|e| classify_io_error(e, "Failed to create temp file"))?;
    file.write_all(contents)
        .map_err(|e| classify_io_error(e, "Failed to write temp file"))?;
    file.sync_all()
        .map_err(|e| classify_io_error(e, "Failed to sync temp file"))?;

    fs::rename(&temp_path, path).map_err(|e| classify_io_error(e, "Failed to rename temp file"))
}
