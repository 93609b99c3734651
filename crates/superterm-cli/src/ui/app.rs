use super::{
    line_editor::{LineEditor, ReadOutcome},
    spinner::Spinner,
};
use anyhow::Result;
use tracing::debug;
use superterm_core::{
    executor::{CommandKind, CommandOutcome, StdioSink},
    models::LanguageModel,
    parser::ModelReply,
    prompt::AssistRequest,
    session::{Dispatch, Session},
};

const BANNER: &str = "🧠 SuperTerm - AI-powered terminal";
const TIP: &str = "💡 Tip: Prefix '!' for AI (e.g., '!ref why?', '!info ubuntu'), normal commands run as shell.\n";

pub struct App<M> {
    session: Session<M>,
    editor: LineEditor,
    sink: StdioSink,
    /// Suggested command waiting to be placed on the next prompt.
    prefill: Option<String>,
}

impl<M: LanguageModel> App<M> {
    pub fn new(session: Session<M>) -> Self {
        Self {
            session,
            editor: LineEditor::new(),
            sink: StdioSink,
            prefill: None,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("{}", BANNER);
        println!(
            "   model: {} @ {}",
            self.session.settings().model,
            self.session.settings().base_url()
        );
        println!("{}", TIP);

        loop {
            let prompt = self.session.prompt();
            let prefill = self.prefill.take();
            let line = match self.editor.read_line(
                &prompt,
                prefill.as_deref(),
                self.session.history_mut(),
            )? {
                ReadOutcome::Line(line) => line,
                ReadOutcome::Cancelled => continue,
                ReadOutcome::Interrupted | ReadOutcome::Eof => {
                    println!("Exiting SuperTerm.");
                    break;
                }
            };

            match self.session.dispatch(&line, &mut self.sink).await {
                Dispatch::Nothing | Dispatch::Changed(_) => {}
                Dispatch::Exit => break,
                Dispatch::Assist(request) => self.prefill = self.assist(&request).await,
                Dispatch::ChangeFailed(e) => println!("  {}", e),
                Dispatch::Ran(outcome) => report(&outcome),
            }
        }
        Ok(())
    }

    /// Asks the model and returns the command to pre-fill, if any.
    async fn assist(&self, request: &AssistRequest) -> Option<String> {
        let spinner = Spinner::start("🧠 Thinking...");
        let result = tokio::select! {
            result = self.session.ask(request) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        spinner.stop().await;

        match result {
            None => {
                println!("Cancelled.");
                None
            }
            Some(Err(e)) => {
                println!("❌ {}", e);
                None
            }
            Some(Ok(reply)) => {
                debug!(format = ?reply.format, "model replied");
                show_reply(&reply)
            }
        }
    }
}

fn show_reply(reply: &ModelReply) -> Option<String> {
    let width = crossterm::terminal::size()
        .map(|(columns, _)| usize::from(columns).max(20))
        .unwrap_or(80);

    if !reply.explanation.is_empty() {
        println!("{}\n", textwrap::fill(&format!("💬 {}", reply.explanation), width));
    }

    let command = reply.suggested_command()?;
    println!("💡 Suggested command: {}\n", command);
    Some(command.to_string())
}

fn report(outcome: &CommandOutcome) {
    if let Some(error) = &outcome.error {
        println!("❌ Error executing command '{}': {}", outcome.command, error);
        return;
    }
    if outcome.cancelled {
        println!("^C");
        return;
    }
    if outcome.kind == CommandKind::Interactive {
        println!("\n[Exited interactive command]");
    }
}
