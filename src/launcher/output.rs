//! Interpretation of worker output streams.

use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use crate::host::MainContextHandle;
use crate::protocol::{decode_command, Command};

/// One line of worker stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Command(Command),
    /// Anything else: progress messages, stray JSON, blank lines.
    Text(String),
}

pub fn classify_line(line: &str) -> OutputLine {
    match decode_command(line.as_bytes()) {
        Ok(command) => OutputLine::Command(command),
        Err(_) => OutputLine::Text(line.to_string()),
    }
}

/// Read stdout line by line until EOF, acting on commands as they arrive.
///
/// A final line without a trailing newline still counts as a line.
pub(super) fn pump_stdout<R: Read>(stream: R, host: &MainContextHandle, script: &str, duration: Duration) {
    for_each_line(stream, script, |line| match classify_line(line) {
        OutputLine::Command(Command::Notify { text }) => {
            tracing::debug!(script, text = %text, "Notification from script");
            super::notify(host, text, duration);
        }
        OutputLine::Text(text) => {
            if !text.trim().is_empty() {
                tracing::info!(script, "{}", crate::protocol::preview(text.as_bytes()));
            }
        }
    });
}

/// Stderr is diagnostic only and never parsed.
pub(super) fn pump_stderr<R: Read>(stream: R, script: &str) {
    for_each_line(stream, script, |line| {
        if !line.trim().is_empty() {
            tracing::warn!(script, "stderr: {line}");
        }
    });
}

fn for_each_line<R: Read, F: FnMut(&str)>(stream: R, script: &str, mut handle: F) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                handle(line.trim_end_matches(['\n', '\r']));
            }
            Err(e) => {
                tracing::warn!(script, error = %e, "Failed to read script output");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_classify_command_line() {
        assert_eq!(
            classify_line(r#"{"action": "show_notification", "text": "Tagged 4 notes"}"#),
            OutputLine::Command(Command::Notify {
                text: "Tagged 4 notes".to_string()
            })
        );
    }

    #[test]
    fn test_classify_plain_and_foreign_json() {
        assert_eq!(
            classify_line("Working on Inbox.md"),
            OutputLine::Text("Working on Inbox.md".to_string())
        );
        assert!(matches!(classify_line(r#"{"progress": 0.5}"#), OutputLine::Text(_)));
        assert!(matches!(classify_line("[1, 2]"), OutputLine::Text(_)));
        assert!(matches!(
            classify_line(r#"{"action": "show_notification"}"#),
            OutputLine::Text(_)
        ));
    }

    #[test]
    fn test_lines_split_on_newlines_only() {
        let input = Cursor::new(b"one\r\n\ntwo\nthree".to_vec());
        let mut seen = Vec::new();
        for_each_line(input, "t", |line| seen.push(line.to_string()));
        assert_eq!(seen, vec!["one", "", "two", "three"]);
    }

    #[test]
    fn test_invalid_utf8_is_not_fatal() {
        let input = Cursor::new(vec![0xff, b'a', b'\n', b'b']);
        let mut seen = Vec::new();
        for_each_line(input, "t", |line| seen.push(line.to_string()));
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1], "b");
    }
}
