use crate::context::CommandContext;
use crate::executor::{CommandOutcome, Executor, OutputSink};
use crate::history::History;
use crate::models::{LanguageModel, ModelError};
use crate::parser::{parse_response, ModelReply};
use crate::prompt::{compose, AssistRequest};
use crate::settings::Settings;
use crate::shell::{resolve_directory, ShellInput};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    ChangeDir(#[from] io::Error),
}

/// What the caller has to do after [`Session::dispatch`].
#[derive(Debug)]
pub enum Dispatch {
    Nothing,
    Exit,
    Assist(AssistRequest),
    Changed(PathBuf),
    ChangeFailed(SessionError),
    Ran(CommandOutcome),
}

pub struct Session<M> {
    settings: Settings,
    model: M,
    context: CommandContext,
    history: History,
    executor: Executor,
    cwd: PathBuf,
    previous_dir: Option<PathBuf>,
}

impl<M: LanguageModel> Session<M> {
    pub fn new(settings: Settings, model: M, cwd: PathBuf) -> Self {
        let context = CommandContext::new(settings.context_limit);
        let history = History::new(settings.history_size);
        let executor = Executor::new(
            settings.capture_limit,
            settings.interactive_programs.clone(),
        );
        Self {
            settings,
            model,
            context,
            history,
            executor,
            cwd,
            previous_dir: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn prompt(&self) -> String {
        format!("{} > ", self.cwd.display())
    }

    pub async fn ask(&self, request: &AssistRequest) -> Result<ModelReply, ModelError> {
        let prompt = compose(&self.context, request);
        debug!(mode = %request.mode, prompt_chars = prompt.len(), "asking model");
        let raw = self.model.generate(&prompt).await?;
        Ok(parse_response(&raw))
    }

    pub fn change_directory(&mut self, target: Option<&str>) -> Result<&Path, SessionError> {
        let resolved = resolve_directory(target, &self.cwd, self.previous_dir.as_deref())?;

        self.history.push(&match target {
            Some(target) => format!("cd {}", target),
            None => "cd".to_string(),
        });

        info!(from = %self.cwd.display(), to = %resolved.display(), "changed directory");
        let previous = std::mem::replace(&mut self.cwd, resolved);
        self.previous_dir = Some(previous);
        Ok(&self.cwd)
    }

    pub async fn execute(&mut self, command: &str, sink: &mut dyn OutputSink) -> CommandOutcome {
        let outcome = self.executor.run(command, &self.cwd, sink).await;
        self.context.record(command, &outcome.context_text());
        self.history.push(command);
        outcome
    }

    pub async fn dispatch(&mut self, line: &str, sink: &mut dyn OutputSink) -> Dispatch {
        match ShellInput::classify(line) {
            ShellInput::Empty => Dispatch::Nothing,
            ShellInput::Exit => Dispatch::Exit,
            ShellInput::Assist(request) => Dispatch::Assist(request),
            ShellInput::ChangeDir(target) => match self.change_directory(target.as_deref()) {
                Ok(path) => Dispatch::Changed(path.to_path_buf()),
                Err(e) => Dispatch::ChangeFailed(e),
            },
            ShellInput::Run(command) => Dispatch::Ran(self.execute(&command, sink).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Stream;
    use crate::prompt::AssistMode;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedModel {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn answering(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(ModelError::Api)
        }
    }

    fn session(model: ScriptedModel, cwd: &Path) -> Session<ScriptedModel> {
        Session::new(Settings::default(), model, cwd.canonicalize().unwrap())
    }

    #[tokio::test]
    async fn test_execute_records_context_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(ScriptedModel::answering("{}"), dir.path());
        let mut sink: Vec<(Stream, String)> = Vec::new();

        let outcome = session.execute("echo 42", &mut sink).await;

        assert!(outcome.success());
        assert_eq!(session.context().command(), Some("echo 42"));
        assert_eq!(session.context().output(), Some("42"));
        assert_eq!(session.history().entries().collect::<Vec<_>>(), vec!["echo 42"]);
    }

    #[tokio::test]
    async fn test_ask_sends_context_and_parses_reply() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::answering(
            r#"{"explanation": "42 is the answer.", "command": "[None]"}"#,
        );
        let mut session = session(model, dir.path());
        let mut sink: Vec<(Stream, String)> = Vec::new();
        session.execute("echo 42", &mut sink).await;

        let request = AssistRequest::parse("ref what was printed?");
        let reply = session.ask(&request).await.unwrap();

        assert_eq!(reply.explanation, "42 is the answer.");
        assert_eq!(reply.command, None);

        let prompt = session.model.last_prompt().unwrap();
        assert!(prompt.contains("Command:\necho 42\n"));
        assert!(prompt.contains("Output:\n42\n"));
        assert!(prompt.contains("Mode: reference"));

        // Asking never rewrites what the model sees next time.
        assert_eq!(session.context().command(), Some("echo 42"));
    }

    #[tokio::test]
    async fn test_ask_propagates_model_errors() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(ScriptedModel::failing("model not loaded"), dir.path());

        let err = session
            .ask(&AssistRequest::parse("list files"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    #[tokio::test]
    async fn test_dispatch_cd_then_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("inner")).unwrap();
        let mut session = session(ScriptedModel::answering("{}"), dir.path());
        let root = session.cwd().to_path_buf();
        let mut sink: Vec<(Stream, String)> = Vec::new();

        match session.dispatch("cd inner", &mut sink).await {
            Dispatch::Changed(path) => assert_eq!(path, root.join("inner")),
            other => panic!("expected cd, got {:?}", other),
        }
        assert_eq!(session.prompt(), format!("{} > ", root.join("inner").display()));

        match session.dispatch("pwd -P", &mut sink).await {
            Dispatch::Ran(outcome) => {
                assert_eq!(outcome.output.trim(), root.join("inner").to_string_lossy())
            }
            other => panic!("expected run, got {:?}", other),
        }

        match session.dispatch("cd -", &mut sink).await {
            Dispatch::Changed(path) => assert_eq!(path, root),
            other => panic!("expected cd, got {:?}", other),
        }

        assert_eq!(
            session.history().entries().collect::<Vec<_>>(),
            vec!["cd inner", "pwd -P", "cd -"]
        );
    }

    #[tokio::test]
    async fn test_dispatch_failed_cd_keeps_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(ScriptedModel::answering("{}"), dir.path());
        let before = session.cwd().to_path_buf();
        let mut sink: Vec<(Stream, String)> = Vec::new();

        match session.dispatch("cd does-not-exist", &mut sink).await {
            Dispatch::ChangeFailed(err) => assert!(err.to_string().contains("Directory not found")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(session.cwd(), before);
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_leaves_assistance_and_exit_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(ScriptedModel::answering("{}"), dir.path());
        let mut sink: Vec<(Stream, String)> = Vec::new();

        match session.dispatch("!info ubuntu", &mut sink).await {
            Dispatch::Assist(request) => assert_eq!(request.mode, AssistMode::Info),
            other => panic!("expected assist, got {:?}", other),
        }
        assert!(matches!(session.dispatch("exit", &mut sink).await, Dispatch::Exit));
        assert!(matches!(session.dispatch("  ", &mut sink).await, Dispatch::Nothing));
        assert!(session.model.last_prompt().is_none());
        assert!(session.history().is_empty());
    }
}
