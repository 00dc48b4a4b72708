//! Committed-text history handed to the scorer as context.
//!
//! The buffer keeps the last few committed strings and renders them as one
//! string, cut to a character budget from the front so the most recent text
//! always survives.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct ContextBuffer {
    entries: VecDeque<String>,
    capacity: usize,
    max_chars: usize,
}

impl ContextBuffer {
    /// Keep at most `capacity` commits and render at most `max_chars` characters.
    pub fn new(capacity: usize, max_chars: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            max_chars,
        }
    }

    pub fn push(&mut self, text: &str) {
        if text.is_empty() || self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(text.to_string());
    }

    /// The last `n` commits, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&str> {
        let start = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(start).map(String::as_str).collect()
    }

    /// Concatenated history, keeping only the last `max_chars` characters.
    pub fn render(&self) -> String {
        let joined: String = self.entries.iter().map(String::as_str).collect();
        let total = joined.chars().count();
        if total <= self.max_chars {
            return joined;
        }
        joined.chars().skip(total - self.max_chars).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buf = ContextBuffer::new(2, 100);
        buf.push("今天");
        buf.push("天气");
        buf.push("很好");
        assert_eq!(buf.recent(5), vec!["天气", "很好"]);
        assert_eq!(buf.render(), "天气很好");
    }

    #[test]
    fn test_render_keeps_latest_chars() {
        let mut buf = ContextBuffer::new(4, 3);
        buf.push("我们");
        buf.push("明天见");
        assert_eq!(buf.render(), "明天见");
        buf.push("吧");
        assert_eq!(buf.render(), "天见吧");
    }

    #[test]
    fn test_empty_commits_are_ignored() {
        let mut buf = ContextBuffer::new(4, 10);
        buf.push("");
        assert!(buf.is_empty());
        assert_eq!(buf.render(), "");
    }
}
