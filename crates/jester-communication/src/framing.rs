//! Line framing for the inbound byte stream
//!
//! Reads hand over arbitrary chunks; a line may arrive split across several
//! reads or several lines may arrive in one. The framer buffers bytes until
//! `\n` and strips a trailing `\r`.

/// Longest line kept in the buffer before it is cut and emitted anyway
pub const MAX_LINE_LENGTH: usize = 4096;

/// Buffers input and emits a line whenever a newline is encountered
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Create an empty framer
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    /// Feed a chunk and collect every line it completes
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &b in bytes {
            if b == b'\n' {
                lines.push(self.take_line());
                continue;
            }
            self.buffer.push(b);
            if self.buffer.len() >= MAX_LINE_LENGTH {
                lines.push(self.take_line());
            }
        }

        lines
    }

    /// Emit whatever partial line is buffered
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        if self.buffer.last() == Some(&b'\r') {
            self.buffer.pop();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_simple() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"hello\nworld\n");
        assert_eq!(lines, vec!["hello", "world"]);
        assert_eq!(framer.flush(), None);
    }

    #[test]
    fn test_lines_split_across_reads() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"defa").is_empty());
        assert!(framer.push(b"ult:bo").is_empty());
        assert_eq!(framer.push(b"th\r\nnext"), vec!["default:both"]);
        assert_eq!(framer.flush(), Some("next".to_string()));
        assert_eq!(framer.flush(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"ok \xff\n");
        assert_eq!(lines, vec!["ok \u{fffd}"]);
    }

    #[test]
    fn test_overlong_line_is_cut() {
        let mut framer = LineFramer::new();
        let chunk = vec![b'x'; MAX_LINE_LENGTH + 10];
        let lines = framer.push(&chunk);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE_LENGTH);
        assert_eq!(framer.flush().map(|l| l.len()), Some(10));
    }
}
