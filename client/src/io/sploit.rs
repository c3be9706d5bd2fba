//! Pre-flight checks on the sploit file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::info;

/// Extensions of interpreted sploits whose source is checked.
pub const SCRIPT_EXTENSIONS: [&str; 3] = ["pl", "py", "rb"];

static FLUSH_CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"flush[(=]").unwrap());

#[derive(Debug, Error)]
pub enum SploitError {
    #[error("no such file: {}", .0.display())]
    Missing(PathBuf),
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sploit won't be run because of validation errors:\n- {}", .0.join("\n- "))]
    Invalid(Vec<String>),
    #[error("the provided file doesn't appear to be executable")]
    NotExecutable,
}

pub fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            SCRIPT_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Problems in a script's source that make flags get lost or the script
/// fail to start.
pub fn check_script_source(source: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if !source.starts_with("#!") {
        errors.push(
            "please use shebang (e.g. #!/usr/bin/env python3) as the first line of your script"
                .to_string(),
        );
    }
    if !FLUSH_CALL.is_match(source) {
        errors.push(
            "please print the newline and call flush() each time after your sploit outputs \
             flags (in Python 3, use print(..., flush=True)); otherwise the flags may be lost \
             if the sploit process is killed, or sent with a delay"
                .to_string(),
        );
    }
    errors
}

/// Verify that `path` can be run as a sploit.
///
/// Scripts missing the owner-execute bit get it set; other files without it
/// are rejected.
pub fn check_sploit(path: &Path) -> Result<(), SploitError> {
    if !path.is_file() {
        return Err(SploitError::Missing(path.to_path_buf()));
    }

    let script = is_script(path);
    if script {
        let bytes = fs::read(path).map_err(|source| SploitError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let errors = check_script_source(&String::from_utf8_lossy(&bytes));
        if !errors.is_empty() {
            return Err(SploitError::Invalid(errors));
        }
    }

    ensure_executable(path, script)
}

#[cfg(unix)]
fn ensure_executable(path: &Path, script: bool) -> Result<(), SploitError> {
    use std::os::unix::fs::PermissionsExt;

    const OWNER_EXECUTE: u32 = 0o100;

    let io_err = |source| SploitError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut permissions = fs::metadata(path).map_err(io_err)?.permissions();
    if permissions.mode() & OWNER_EXECUTE != 0 {
        return Ok(());
    }
    if !script {
        return Err(SploitError::NotExecutable);
    }
    info!(path = %path.display(), "setting the executable bit");
    permissions.set_mode(permissions.mode() | OWNER_EXECUTE);
    fs::set_permissions(path, permissions).map_err(io_err)
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path, _script: bool) -> Result<(), SploitError> {
    Ok(())
}
