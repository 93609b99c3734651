use crate::shell::AI_PREFIX;

/// The last shell command that actually ran, plus the tail of its output.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    command: Option<String>,
    output: Option<String>,
    limit: usize,
}

impl CommandContext {
    pub fn new(limit: usize) -> Self {
        Self {
            command: None,
            output: None,
            limit,
        }
    }

    /// Blank commands and AI requests leave the previous context in place.
    pub fn record(&mut self, command: &str, output: &str) {
        let command = command.trim();
        if command.is_empty() || command.starts_with(AI_PREFIX) {
            return;
        }

        self.command = Some(command.to_string());

        let output = tail_chars(output.trim(), self.limit);
        self.output = if output.is_empty() {
            None
        } else {
            Some(output.to_string())
        };
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }
}

/// The last `limit` characters of `text`, never splitting a code point.
pub fn tail_chars(text: &str, limit: usize) -> &str {
    let count = text.chars().count();
    if count <= limit {
        return text;
    }
    let skip = count - limit;
    match text.char_indices().nth(skip) {
        Some((start, _)) => &text[start..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_trims_command_and_output() {
        let mut context = CommandContext::new(100);
        context.record("  df -h ", "\nFilesystem  Size\n/dev/sda1  100G\n\n");
        assert_eq!(context.command(), Some("df -h"));
        assert_eq!(context.output(), Some("Filesystem  Size\n/dev/sda1  100G"));
    }

    #[test]
    fn test_ai_requests_and_blank_commands_keep_previous_context() {
        let mut context = CommandContext::new(100);
        context.record("ls", "a b c");
        context.record("!ref how many files?", "ignored");
        context.record("   ", "ignored");
        assert_eq!(context.command(), Some("ls"));
        assert_eq!(context.output(), Some("a b c"));
    }

    #[test]
    fn test_empty_output_does_not_keep_stale_output() {
        let mut context = CommandContext::new(100);
        context.record("ls", "a b c");
        context.record("true", "   ");
        assert_eq!(context.command(), Some("true"));
        assert_eq!(context.output(), None);
    }

    #[test]
    fn test_long_output_keeps_tail() {
        let mut context = CommandContext::new(5);
        context.record("seq 10", "0123456789");
        assert_eq!(context.output(), Some("56789"));
    }

    #[test]
    fn test_tail_chars_respects_char_boundaries() {
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
        assert_eq!(tail_chars("🧠🧠🧠", 2), "🧠🧠");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abc", 0), "");
    }
}
