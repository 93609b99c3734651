use std::collections::VecDeque;

/// Bounded in-memory command history with a browsing cursor.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    /// Offset from the newest entry while browsing; `None` when not browsing.
    cursor: Option<usize>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            cursor: None,
        }
    }

    pub fn push(&mut self, entry: &str) {
        let entry = entry.trim();
        self.cursor = None;
        if entry.is_empty() || self.entries.back().map(String::as_str) == Some(entry) {
            return;
        }
        self.entries.push_back(entry.to_string());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Steps one entry further into the past. Stays on the oldest entry.
    pub fn previous(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        let next = match self.cursor {
            None => 0,
            Some(offset) => (offset + 1).min(self.entries.len() - 1),
        };
        self.cursor = Some(next);
        self.at_cursor()
    }

    /// Steps back toward the present. `None` means the cursor left the history.
    pub fn next(&mut self) -> Option<&str> {
        match self.cursor {
            None | Some(0) => {
                self.cursor = None;
                None
            }
            Some(offset) => {
                self.cursor = Some(offset - 1);
                self.at_cursor()
            }
        }
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = None;
    }

    fn at_cursor(&self) -> Option<&str> {
        let offset = self.cursor?;
        let index = self.entries.len().checked_sub(offset + 1)?;
        self.entries.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_skips_blank_and_consecutive_duplicates() {
        let mut history = History::new(10);
        history.push("ls");
        history.push("ls");
        history.push("  ");
        history.push("pwd");
        history.push("ls");
        assert_eq!(history.entries().collect::<Vec<_>>(), vec!["ls", "pwd", "ls"]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = History::new(2);
        history.push("a");
        history.push("b");
        history.push("c");
        assert_eq!(history.len(), 2);
        assert_eq!(history.entries().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_browsing() {
        let mut history = History::new(10);
        assert_eq!(history.previous(), None);

        history.push("one");
        history.push("two");
        history.push("three");

        assert_eq!(history.previous(), Some("three"));
        assert_eq!(history.previous(), Some("two"));
        assert_eq!(history.previous(), Some("one"));
        assert_eq!(history.previous(), Some("one"));
        assert_eq!(history.next(), Some("two"));
        assert_eq!(history.next(), Some("three"));
        assert_eq!(history.next(), None);
        assert_eq!(history.next(), None);

        history.previous();
        history.reset_cursor();
        assert_eq!(history.previous(), Some("three"));
    }
}
