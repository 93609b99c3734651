//! # SuperTerm Core Library
//!
//! Everything behind the `superterm` shell that does not touch the terminal
//! directly: configuration, the Ollama client, prompt assembly, the model
//! reply parser and the subprocess runner.
//!
//! ## Modules
//!
//! - `settings`: Configuration loading and validation
//! - `models`: Ollama HTTP client and the `LanguageModel` seam
//! - `context`: The last command and its output, as seen by the model
//! - `prompt`: Assistance modes and prompt composition
//! - `parser`: Extracting explanation and command from model replies
//! - `executor`: Interactive detection and streamed command execution
//! - `shell`: Input classification and `cd` resolution
//! - `history`: In-memory command history
//! - `session`: Glue between all of the above

pub mod context;
pub mod executor;
pub mod history;
pub mod models;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod shell;

pub use executor::{CommandOutcome, OutputSink, StdioSink, Stream};
pub use models::{LanguageModel, ModelError, OllamaClient};
pub use parser::{parse_response, ModelReply};
pub use prompt::{AssistMode, AssistRequest};
pub use session::{Dispatch, Session, SessionError};
pub use settings::{Settings, SettingsError, ValidationError};
