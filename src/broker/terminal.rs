//! Line-based input dialogs for a terminal-hosted bridge.

use std::io::{BufRead, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::{InputDialog, InputKind};

/// Presents input dialogs one at a time on a line-oriented terminal.
///
/// Dialogs queue up and are shown in arrival order on a dedicated thread, so
/// opening one never blocks the host's main context. An empty line or end of
/// input dismisses the current dialog. Dialogs whose request timed out are
/// closed; a line typed into one goes to the next dialog still waiting.
pub struct TerminalPrompter {
    queue: Option<Sender<InputDialog>>,
    handle: Option<JoinHandle<()>>,
}

impl TerminalPrompter {
    pub fn spawn<R, W>(input: R, output: W) -> Self
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        let (queue, dialogs) = mpsc::channel::<InputDialog>();
        let handle = thread::Builder::new()
            .name("input-prompter".to_string())
            .spawn(move || run_prompts(dialogs, input, output))
            .map_err(|e| tracing::error!(error = %e, "Failed to start input prompter"))
            .ok();
        Self {
            queue: Some(queue),
            handle,
        }
    }

    /// Prompter reading stdin and writing to stderr.
    pub fn stdio() -> Self {
        Self::spawn(std::io::BufReader::new(std::io::stdin()), std::io::stderr())
    }

    /// Queue a dialog. If the prompter is gone the dialog is dismissed.
    pub fn open(&self, dialog: InputDialog) {
        if let Some(queue) = &self.queue {
            if let Err(mpsc::SendError(dialog)) = queue.send(dialog) {
                tracing::warn!("Input prompter stopped; dismissing dialog");
                dialog.dismiss();
            }
        }
    }
}

impl Drop for TerminalPrompter {
    fn drop(&mut self) {
        // Closing the queue lets the prompt thread finish after the current
        // dialog. It may be parked on a blocking read, so it is not joined.
        self.queue.take();
        self.handle.take();
    }
}

fn run_prompts<R: BufRead, W: Write>(dialogs: Receiver<InputDialog>, mut input: R, mut output: W) {
    let mut input_closed = false;
    // A line typed while its dialog timed out, and the next dialog it now answers
    let mut carried: Option<(InputDialog, String)> = None;

    loop {
        let (mut dialog, mut pending) = match carried.take() {
            Some((dialog, line)) => (dialog, Some(line)),
            None => match dialogs.recv() {
                Ok(dialog) => (dialog, None),
                Err(_) => break,
            },
        };
        if dialog.is_abandoned() {
            tracing::debug!(title = %dialog.spec().prompt_title, "Skipping timed-out input dialog");
            dialog.dismiss();
            continue;
        }
        if input_closed || write_header(&mut output, &dialog).is_err() {
            dialog.dismiss();
            continue;
        }

        loop {
            let answer = match pending.take() {
                Some(line) => {
                    let _ = writeln!(output, "> {line}");
                    line
                }
                None => match read_answer(&mut input, &mut output) {
                    Some(line) => line,
                    None => {
                        input_closed = true;
                        break;
                    }
                },
            };

            if dialog.is_abandoned() {
                let _ = writeln!(output, "(request timed out)");
                if !answer.is_empty() {
                    carried = next_live_dialog(&dialogs).map(|next| (next, answer));
                }
                break;
            }
            if answer.is_empty() {
                break;
            }
            match dialog.confirm(&answer) {
                Ok(()) => break,
                Err(e) => {
                    let _ = writeln!(output, "{e}");
                }
            }
        }

        if !dialog.is_resolved() {
            if !dialog.is_abandoned() {
                let _ = writeln!(output, "(dismissed)");
            }
            dialog.dismiss();
        }
    }
}

/// Prompt and read one line. `None` once input is closed.
fn read_answer<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Option<String> {
    let _ = write!(output, "> ");
    let _ = output.flush();

    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
    }
}

/// First queued dialog whose request is still waiting. Timed-out ones are closed.
fn next_live_dialog(dialogs: &Receiver<InputDialog>) -> Option<InputDialog> {
    while let Ok(dialog) = dialogs.try_recv() {
        if !dialog.is_abandoned() {
            return Some(dialog);
        }
        dialog.dismiss();
    }
    None
}

fn write_header<W: Write>(output: &mut W, dialog: &InputDialog) -> std::io::Result<()> {
    let spec = dialog.spec();
    writeln!(output)?;
    writeln!(output, "== {} ==", spec.prompt_title)?;
    writeln!(output, "{}", spec.message)?;
    let hint = match spec.kind {
        InputKind::Text => "text".to_string(),
        InputKind::Number => {
            let bound = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
            let step = spec.step.map(|s| format!(", step {s}")).unwrap_or_default();
            format!("number {}..{}{step}", bound(spec.min_value), bound(spec.max_value))
        }
        InputKind::Boolean => "yes/no".to_string(),
        InputKind::Date => "YYYY-MM-DD".to_string(),
    };
    writeln!(output, "[{hint}, empty line to cancel]")
}
