use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use arboard::Clipboard;
use crossterm::cursor::MoveTo;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::library::{Snippet, parse_library};

const DEFAULT_LIBRARY: &str = "## Examples/Order confirmation
Hi {formtext: name=client; label=Client name; required=yes},

Thanks for ordering {formtext: name=qty; label=Quantity; default=1} x size {formdropdown: name=size; label=Size; options=S, M, L; default=M}.
Total: {= qty * 4.5} EUR
{formtoggle: name=gift; label=Gift wrap; truetext=Your parcel will be gift wrapped.}

## Support/Reply
Hello {client},

{formparagraph: name=body; label=Message}

{formtoggle: name=sign; label=Signature; default=yes; truetext=-- The support team}
";

#[derive(Debug, Error)]
pub(crate) enum SystemError {
    #[error("cannot locate the home directory")]
    NoHome,
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to create {}: {source}", .path.display())]
    Create { path: PathBuf, source: io::Error },
    #[error("no snippets found in {}; start a snippet with a `## name` heading", .0.display())]
    EmptyLibrary(PathBuf),
    #[error("EDITOR is empty")]
    EmptyEditor,
    #[error("failed to launch the editor: {0}")]
    EditorLaunch(io::Error),
    #[error("the editor exited with {0}")]
    EditorStatus(ExitStatus),
    #[error("terminal error: {0}")]
    Terminal(io::Error),
    #[error("clipboard error: {0}")]
    Clipboard(#[from] arboard::Error),
}

/// Library location: an explicit path, or `~/.config/snipfill/snippets.md`.
pub(crate) fn library_path(explicit: Option<PathBuf>) -> Result<PathBuf, SystemError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let home = env::var_os("USERPROFILE")
        .or_else(|| env::var_os("HOME"))
        .map(PathBuf::from)
        .ok_or(SystemError::NoHome)?;
    Ok(home.join(".config").join("snipfill").join("snippets.md"))
}

/// Log file kept next to the library.
pub(crate) fn log_path(library: &Path) -> PathBuf {
    library.with_file_name("snipfill.log")
}

/// Creates the library with sample snippets when it does not exist yet.
pub(crate) fn ensure_library_file(path: &Path) -> Result<(), SystemError> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| SystemError::Create {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, DEFAULT_LIBRARY).map_err(|source| SystemError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "created snippet library");
    Ok(())
}

pub(crate) fn load_library(path: &Path) -> Result<Vec<Snippet>, SystemError> {
    ensure_library_file(path)?;
    let content = read_file(path)?;
    let snippets = parse_library(&content);
    if snippets.is_empty() {
        return Err(SystemError::EmptyLibrary(path.to_path_buf()));
    }
    debug!(path = %path.display(), count = snippets.len(), "loaded snippet library");
    Ok(snippets)
}

pub(crate) fn read_file(path: &Path) -> Result<String, SystemError> {
    fs::read_to_string(path).map_err(|source| SystemError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Suspends the terminal UI, runs `$EDITOR` on `path`, and restores the UI.
pub(crate) fn run_editor_command(editor: &str, path: &Path) -> Result<(), SystemError> {
    let mut parts = editor.split_whitespace();
    let command = parts.next().ok_or(SystemError::EmptyEditor)?;
    let args: Vec<&str> = parts.collect();

    disable_raw_mode().map_err(SystemError::Terminal)?;
    execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture)
        .map_err(SystemError::Terminal)?;

    let status = Command::new(command).args(&args).arg(path).status();

    execute!(
        io::stdout(),
        EnterAlternateScreen,
        EnableMouseCapture,
        Clear(ClearType::All),
        MoveTo(0, 0)
    )
    .and_then(|_| enable_raw_mode())
    .map_err(SystemError::Terminal)?;

    let status = status.map_err(SystemError::EditorLaunch)?;
    if !status.success() {
        return Err(SystemError::EditorStatus(status));
    }
    Ok(())
}

pub(crate) fn set_clipboard(text: &str) -> Result<(), SystemError> {
    Clipboard::new()?.set_text(text.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_is_created_with_samples() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("snippets.md");
        let snippets = load_library(&path).expect("library loads");
        assert!(path.exists());
        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].name, "Examples/Order confirmation");
    }

    #[test]
    fn existing_library_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snippets.md");
        fs::write(&path, "## Only\nbody").expect("write");
        let snippets = load_library(&path).expect("library loads");
        assert_eq!(snippets.len(), 1);
        assert_eq!(snippets[0].body, "body");
    }

    #[test]
    fn library_without_headings_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snippets.md");
        fs::write(&path, "no headings here").expect("write");
        assert!(matches!(
            load_library(&path),
            Err(SystemError::EmptyLibrary(_))
        ));
    }

    #[test]
    fn sample_snippets_scan_cleanly() {
        for snippet in parse_library(DEFAULT_LIBRARY) {
            let result = snipfill::scan(&snippet.body);
            assert!(!result.fields.is_empty(), "{} has no fields", snippet.name);
        }
    }

    #[test]
    fn explicit_path_wins() {
        let path = library_path(Some(PathBuf::from("/tmp/lib.md"))).expect("path");
        assert_eq!(path, PathBuf::from("/tmp/lib.md"));
        assert_eq!(log_path(&path), PathBuf::from("/tmp/snipfill.log"));
    }
}
