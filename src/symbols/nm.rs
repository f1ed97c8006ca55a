//! Symbol tables from `go tool nm`.

use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use super::SymbolTable;
use crate::error::Result;

/// Find the `go` binary: the configured path if it exists, otherwise `PATH`.
pub fn locate_go(configured: Option<&Path>) -> io::Result<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            path = %path.display(),
            "Configured go binary does not exist, falling back to PATH"
        );
    }
    which::which("go").map_err(|e| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("go toolchain not found in PATH: {e}"),
        )
    })
}

/// Run `go tool nm <program>` and load its output into `table`.
///
/// Returns the number of symbols read.
pub fn load_program_symbols(table: &mut SymbolTable, go: &Path, program: &Path) -> Result<usize> {
    tracing::debug!(
        go = %go.display(),
        program = %program.display(),
        "Running go tool nm"
    );

    let mut child = Command::new(go)
        .arg("tool")
        .arg("nm")
        .arg(program)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("go tool nm produced no stdout"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("go tool nm produced no stderr"))?;
    // Drained concurrently so a chatty stderr cannot stall stdout.
    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        stderr.read_to_end(&mut buf).map(|_| buf)
    });

    let parsed = table.read_nm(BufReader::new(stdout));
    let status = child.wait()?;
    let stderr = stderr_reader
        .join()
        .map_err(|_| io::Error::other("go tool nm stderr reader panicked"))??;

    if !status.success() {
        let stderr = String::from_utf8_lossy(&stderr);
        return Err(io::Error::other(format!(
            "go tool nm {} failed ({}): {}",
            program.display(),
            status,
            stderr.trim()
        ))
        .into());
    }

    let count = parsed?;
    tracing::info!(symbols = count, program = %program.display(), "Loaded program symbols");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_go_falls_back_to_path() {
        let result = locate_go(Some(Path::new("/definitely/not/a/go/binary")));
        // Whether go is installed varies; only the fallback behavior is checked.
        match result {
            Ok(path) => assert!(path.ends_with("go") || path.ends_with("go.exe")),
            Err(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
        }
    }

    #[cfg(unix)]
    #[test]
    fn large_stderr_does_not_block_symbol_loading() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-go");
        std::fs::write(
            &script,
            "#!/bin/sh\nhead -c 262144 /dev/zero >&2\necho '  5c0000 D main.cache'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut table = SymbolTable::new();
        let count = load_program_symbols(&mut table, &script, Path::new("prog")).unwrap();
        assert_eq!(count, 1);
        assert_eq!(table.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_reported() {
        let mut table = SymbolTable::new();
        // `false` ignores its arguments and exits non-zero.
        let err = load_program_symbols(&mut table, Path::new("false"), Path::new("prog"))
            .unwrap_err();
        assert!(err.to_string().contains("go tool nm"));
    }
}
