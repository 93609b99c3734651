//! Prompt assembly for assistance requests.
//!
//! Every request carries the previous command and its output so the model can
//! answer questions like `!ref how much space is left?`.

use crate::context::CommandContext;
use std::fmt;

pub const SYSTEM_PROMPT: &str = r#"
You are SuperTerm, a Linux assistant running inside the user's terminal.

Your job is to interpret user queries and respond with structured JSON output.

-------------------------
RESPONSE FORMAT (STRICT)
-------------------------
Always respond only with a single JSON object like this:

{
  "explanation": "<one concise sentence describing what the command does or reasoning result>",
  "command": "<a valid Linux shell command or [None] if no command is needed>"
}

Rules for each mode:

1. Command Mode (default)
   - Generate a single safe and meaningful Linux command that satisfies the user's request.
   - Example:
     User: list all running containers
     Response:
     {
       "explanation": "Lists all currently running Docker containers.",
       "command": "docker ps"
     }

2. Reference Mode (!ref prefix)
   - Analyze the previous shell output and answer analytically: compute or summarize results.
   - You must not return any executable command in this mode.
   - Example:
     User: !ref calculate total free disk space
     Response:
     {
       "explanation": "Total free space across all file systems is approximately 2.4 TB.",
       "command": "[None]"
     }

3. Info Mode (!info prefix)
   - Provide a concise factual explanation about a Linux topic.
   - No executable command.
   - Example:
     {
       "explanation": "The 'df' command reports file system disk space usage.",
       "command": "[None]"
     }

-------------------------
BEHAVIOR GUIDELINES
-------------------------
- Never use Markdown, quotes, or backticks around commands.
- Never include additional text outside the JSON object.
- Do not prefix your response with words like "Here is your result" or "Output:".
- Do not format as code; output raw JSON only.
- When no command is appropriate, always return "command": "[None]".
- Use simple, standard Linux commands (ls, df -h, du -sh, etc.).
- Avoid any destructive or system-altering operations.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AssistMode {
    #[default]
    Command,
    Reference,
    Info,
}

const MODE_KEYWORDS: [(AssistMode, &str); 2] =
    [(AssistMode::Reference, "ref"), (AssistMode::Info, "info")];

impl fmt::Display for AssistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Command => "command",
            Self::Reference => "reference",
            Self::Info => "info",
        };
        f.write_str(name)
    }
}

/// What the user asked for after the `!` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistRequest {
    pub mode: AssistMode,
    /// Query text with the mode keyword removed.
    pub query: String,
    /// Everything after the marker, as typed.
    pub original: String,
}

impl AssistRequest {
    pub fn parse(text: &str) -> Self {
        let original = text.trim().to_string();

        for (mode, keyword) in MODE_KEYWORDS {
            if let Some(rest) = strip_keyword(&original, keyword) {
                return Self {
                    mode,
                    query: rest.trim().to_string(),
                    original,
                };
            }
        }

        Self {
            mode: AssistMode::Command,
            query: original.clone(),
            original,
        }
    }
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

pub fn compose(context: &CommandContext, request: &AssistRequest) -> String {
    format!(
        "{system}\n\n\
         --- Previous Command Context ---\n\
         Command:\n{command}\n\n\
         Output:\n{output}\n\
         ---------------------------------\n\n\
         Mode: {mode}\n\n\
         User input:\n{input}\nAssistant:",
        system = SYSTEM_PROMPT.trim(),
        command = context.command().unwrap_or("[None]"),
        output = context.output().unwrap_or("[No output captured]"),
        mode = request.mode,
        input = request.original,
    )
}
