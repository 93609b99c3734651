use crate::prompt::AssistRequest;
use directories::BaseDirs;
use std::io;
use std::path::{Path, PathBuf};

/// Lines starting with this character go to the model instead of the shell.
pub const AI_PREFIX: char = '!';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellInput {
    Empty,
    Exit,
    Assist(AssistRequest),
    ChangeDir(Option<String>),
    Run(String),
}

impl ShellInput {
    pub fn classify(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Self::Exit;
        }
        if let Some(rest) = line.strip_prefix(AI_PREFIX) {
            if rest.trim().is_empty() {
                return Self::Empty;
            }
            return Self::Assist(AssistRequest::parse(rest));
        }
        if line == "cd" {
            return Self::ChangeDir(None);
        }
        if let Some(target) = line.strip_prefix("cd ").or_else(|| line.strip_prefix("cd\t")) {
            let target = target.trim();
            return Self::ChangeDir((!target.is_empty()).then(|| target.to_string()));
        }
        Self::Run(line.to_string())
    }
}

pub fn home_dir() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Resolves the argument of `cd` against `cwd`, `~` and `-`.
pub fn resolve_directory(
    target: Option<&str>,
    cwd: &Path,
    previous: Option<&Path>,
) -> io::Result<PathBuf> {
    let no_home = || io::Error::new(io::ErrorKind::NotFound, "home directory not found");

    let candidate = match target.map(str::trim) {
        None | Some("") | Some("~") => home_dir().ok_or_else(no_home)?,
        Some("-") => previous
            .map(Path::to_path_buf)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no previous directory"))?,
        Some(path) => match path.strip_prefix("~/") {
            Some(rest) => home_dir().ok_or_else(no_home)?.join(rest),
            None => cwd.join(path),
        },
    };

    let resolved = candidate.canonicalize().map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Directory not found: {}", candidate.display()),
        )
    })?;
    if !resolved.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("Not a directory: {}", candidate.display()),
        ));
    }
    Ok(resolved)
}
