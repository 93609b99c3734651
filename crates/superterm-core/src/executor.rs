//! Runs shell commands, either on the user's terminal or with output captured.
//!
//! Programs that take over the terminal (editors, pagers, monitors, REPLs)
//! get the inherited stdio and nothing is captured. Everything else runs with
//! piped stdout/stderr, streamed line by line to an [`OutputSink`] and kept
//! as context for the model.

use crate::context::tail_chars;
use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SHELL: &str = "sh";

/// How long to keep reading after the shell exits while a background job still
/// holds its output pipes.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

pub const INTERACTIVE_PROGRAMS: &[&str] = &[
    // editors
    "nano", "vi", "vim", "nvim", "emacs",
    // pagers
    "less", "more", "man",
    // monitors
    "top", "htop", "btop", "glances", "atop", "iotop", "iftop",
    // partitioning
    "fdisk", "cfdisk", "parted", "gdisk", "sgdisk",
    // package managers with prompts or progress bars
    "apt", "apt-get", "aptitude", "dpkg-reconfigure", "yum", "dnf", "zypper", "snap", "flatpak",
    // remote sessions
    "ssh", "telnet", "ftp", "sftp",
    // never-ending output
    "tail -f", "journalctl -f", "dmesg -w", "watch",
    // shells and REPLs
    "bash", "sh", "zsh", "python", "python3", "ipython", "node", "mysql", "psql", "mongo",
    // system administration
    "nmcli", "systemctl", "service", "ufw", "passwd", "adduser", "deluser", "usermod",
    // misc
    "crontab -e", "visudo", "alsamixer", "amixer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Receives command output as it arrives.
pub trait OutputSink {
    fn line(&mut self, stream: Stream, line: &str);

    /// Called right before an interactive program takes over the terminal.
    fn interactive_start(&mut self, _command: &str) {}
}

/// Forwards stdout lines to stdout and stderr lines to stderr.
#[derive(Debug, Default)]
pub struct StdioSink;

impl OutputSink for StdioSink {
    fn line(&mut self, stream: Stream, line: &str) {
        // A closed pipe on our side must not abort the command.
        let _ = match stream {
            Stream::Stdout => {
                let mut out = io::stdout().lock();
                writeln!(out, "{}", line).and_then(|_| out.flush())
            }
            Stream::Stderr => {
                let mut err = io::stderr().lock();
                writeln!(err, "{}", line).and_then(|_| err.flush())
            }
        };
    }

    fn interactive_start(&mut self, command: &str) {
        println!("Launching interactive session: {}\n", command);
    }
}

impl OutputSink for Vec<(Stream, String)> {
    fn line(&mut self, stream: Stream, line: &str) {
        self.push((stream, line.to_string()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Interactive,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: String,
    pub kind: CommandKind,
    pub exit_code: Option<i32>,
    /// Captured output, already cut to the capture limit. Empty for interactive runs.
    pub output: String,
    pub cancelled: bool,
    pub error: Option<String>,
}

impl CommandOutcome {
    fn failed(command: &str, kind: CommandKind, error: io::Error) -> Self {
        Self {
            command: command.to_string(),
            kind,
            exit_code: None,
            output: String::new(),
            cancelled: false,
            error: Some(error.to_string()),
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && !self.cancelled && self.exit_code == Some(0)
    }

    /// What the model gets to see about this run.
    pub fn context_text(&self) -> String {
        if let Some(error) = &self.error {
            return format!("[Error running command: {}]", error);
        }
        match self.kind {
            CommandKind::Interactive => format!(
                "[Exited interactive command with code {}]",
                self.exit_code.unwrap_or(-1)
            ),
            CommandKind::Batch if self.cancelled => format!("{}\n[Interrupted]", self.output),
            CommandKind::Batch => self.output.clone(),
        }
    }
}

/// Whether `command` needs a real terminal.
///
/// Every `|`, `;` or `&` separated segment is checked. Leading `sudo`, `env`
/// and `VAR=value` words are skipped and the program is compared by basename,
/// so `sh` matches `/bin/sh -c x` but not `shred`.
pub fn is_interactive(command: &str, extra: &[String]) -> bool {
    command
        .split(|c: char| matches!(c, '|' | ';' | '&'))
        .map(program_tokens)
        .filter(|tokens| !tokens.is_empty())
        .any(|tokens| {
            INTERACTIVE_PROGRAMS
                .iter()
                .copied()
                .chain(extra.iter().map(String::as_str))
                .any(|keyword| keyword_matches(keyword, &tokens))
        })
}

fn program_tokens(segment: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    let mut in_prefix = true;
    let mut after_wrapper = false;

    for token in segment.split_whitespace() {
        if in_prefix {
            if token == "sudo" || token == "env" {
                after_wrapper = true;
                continue;
            }
            if after_wrapper && token.starts_with('-') {
                continue;
            }
            if is_assignment(token) {
                continue;
            }
            in_prefix = false;
            tokens.push(token.rsplit('/').next().unwrap_or(token));
            continue;
        }
        tokens.push(token);
    }
    tokens
}

fn is_assignment(token: &str) -> bool {
    match token.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

fn keyword_matches(keyword: &str, tokens: &[&str]) -> bool {
    let mut words = keyword.split_whitespace();
    let Some(program) = words.next() else {
        return false;
    };
    if tokens.first() != Some(&program) {
        return false;
    }
    words.all(|flag| tokens[1..].contains(&flag))
}

#[derive(Debug, Clone)]
pub struct Executor {
    capture_limit: usize,
    extra_keywords: Vec<String>,
}

impl Executor {
    pub fn new(capture_limit: usize, extra_keywords: Vec<String>) -> Self {
        Self {
            capture_limit,
            extra_keywords,
        }
    }

    pub fn is_interactive(&self, command: &str) -> bool {
        is_interactive(command, &self.extra_keywords)
    }

    /// Runs `command`, killing a batch command on Ctrl-C.
    pub async fn run(&self, command: &str, cwd: &Path, sink: &mut dyn OutputSink) -> CommandOutcome {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        self.run_with_cancel(command, cwd, sink, ctrl_c).await
    }

    /// Like [`Executor::run`], with `cancel` standing in for Ctrl-C.
    ///
    /// Interactive programs get the terminal and never see `cancel`.
    pub async fn run_with_cancel<F>(
        &self,
        command: &str,
        cwd: &Path,
        sink: &mut dyn OutputSink,
        cancel: F,
    ) -> CommandOutcome
    where
        F: Future<Output = ()>,
    {
        let outcome = if self.is_interactive(command) {
            debug!(command, "running on the terminal");
            sink.interactive_start(command);
            self.run_interactive(command, cwd).await
        } else {
            debug!(command, "running with captured output");
            self.run_batch(command, cwd, sink, cancel).await
        };

        match &outcome.error {
            Some(error) => warn!(command, %error, "command failed to run"),
            None => info!(
                command,
                exit_code = ?outcome.exit_code,
                cancelled = outcome.cancelled,
                captured = outcome.output.len(),
                "command finished"
            ),
        }
        outcome
    }

    async fn run_interactive(&self, command: &str, cwd: &Path) -> CommandOutcome {
        let spawned = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .env("PWD", cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return CommandOutcome::failed(command, CommandKind::Interactive, e),
        };

        // Ctrl-C belongs to the program; just keep it from reaching us.
        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = tokio::signal::ctrl_c() => continue,
            }
        };

        match status {
            Ok(status) => CommandOutcome {
                command: command.to_string(),
                kind: CommandKind::Interactive,
                exit_code: status.code(),
                output: String::new(),
                cancelled: false,
                error: None,
            },
            Err(e) => CommandOutcome::failed(command, CommandKind::Interactive, e),
        }
    }

    async fn run_batch<F>(
        &self,
        command: &str,
        cwd: &Path,
        sink: &mut dyn OutputSink,
        cancel: F,
    ) -> CommandOutcome
    where
        F: Future<Output = ()>,
    {
        let spawned = Command::new(SHELL)
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .env("PWD", cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => return CommandOutcome::failed(command, CommandKind::Batch, e),
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Stream::Stderr, tx);
        }

        let mut capture = Capture::new(self.capture_limit);
        let mut cancelled = false;
        let mut exited = None;
        tokio::pin!(cancel);

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some((stream, line)) => capture.push(sink, stream, &line),
                    None => break,
                },
                status = child.wait() => {
                    exited = Some(status);
                    break;
                }
                _ = &mut cancel => {
                    cancelled = true;
                    if let Err(e) = child.start_kill() {
                        debug!("kill after interrupt failed: {e}");
                    }
                    break;
                }
            }
        }

        // The shell is gone but a background job may keep the pipes open.
        if exited.is_some() {
            let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
            while let Ok(Some((stream, line))) = tokio::time::timeout_at(deadline, rx.recv()).await {
                capture.push(sink, stream, &line);
            }
        }

        let status = match exited {
            Some(status) => status,
            None => child.wait().await,
        };
        let output = capture.finish();

        match status {
            Ok(status) => CommandOutcome {
                command: command.to_string(),
                kind: CommandKind::Batch,
                exit_code: status.code(),
                output,
                cancelled,
                error: None,
            },
            Err(e) => CommandOutcome::failed(command, CommandKind::Batch, e),
        }
    }
}

/// Output lines in arrival order, trimmed to the tail as they come in.
struct Capture {
    text: String,
    limit: usize,
}

impl Capture {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    fn push(&mut self, sink: &mut dyn OutputSink, stream: Stream, line: &str) {
        sink.line(stream, line);
        self.text.push_str(line);
        self.text.push('\n');
        if self.text.len() > self.limit.saturating_mul(8) {
            self.text = tail_chars(&self.text, self.limit).to_string();
        }
    }

    fn finish(self) -> String {
        tail_chars(&self.text, self.limit).to_string()
    }
}

fn spawn_reader<R>(reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
                    if tx.send((stream, line.to_string())).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(?stream, "output stream closed: {e}");
                    break;
                }
            }
        }
    });
}
