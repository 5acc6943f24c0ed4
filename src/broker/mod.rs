//! User-input broker.
//!
//! Turns a modal dialog, which the host drives on its own thread at the end
//! user's pace, into a value a request handler can wait for. Each request gets
//! a one-shot channel; the [`InputDialog`] handed to the host owns the only
//! sender, so the request resolves at most once. Dropping the dialog without
//! confirming resolves the request as [`InputResult::Dismissed`].

mod dialog;
mod terminal;

pub use dialog::{InputDialog, InputValidationError};
pub use terminal::TerminalPrompter;

use chrono::NaiveDate;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use thiserror::Error;

use crate::host::MainContextHandle;

/// Kind of control the dialog shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Free text, optionally checked against a regex.
    Text,
    /// Bounded numeric slider (min/max/step).
    Number,
    /// Checkbox.
    Boolean,
    /// Date picker, `YYYY-MM-DD`.
    Date,
}

impl InputKind {
    /// Parse a wire `inputType`. `range` and `checkbox` are accepted aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "text" => Some(InputKind::Text),
            "number" | "range" => Some(InputKind::Number),
            "boolean" | "checkbox" => Some(InputKind::Boolean),
            "date" => Some(InputKind::Date),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Number => "number",
            InputKind::Boolean => "boolean",
            InputKind::Date => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputRequestSpec {
    /// Dialog title, usually the requesting script's name.
    pub prompt_title: String,
    pub kind: InputKind,
    pub message: String,
    pub validation_regex: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub step: Option<f64>,
}

impl InputRequestSpec {
    pub fn new(prompt_title: impl Into<String>, kind: InputKind, message: impl Into<String>) -> Self {
        Self {
            prompt_title: prompt_title.into(),
            kind,
            message: message.into(),
            validation_regex: None,
            min_value: None,
            max_value: None,
            step: None,
        }
    }
}

/// A confirmed value, typed by the dialog's [`InputKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl InputValue {
    pub fn to_json(&self) -> Value {
        match self {
            InputValue::Text(s) => Value::String(s.clone()),
            InputValue::Number(n) => number_to_json(*n),
            InputValue::Boolean(b) => Value::Bool(*b),
            InputValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

/// Whole numbers within `i64` range are sent as JSON integers.
fn number_to_json(n: f64) -> Value {
    // 2^63, exactly representable as f64
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
    if n.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&n) {
        return Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputResult {
    Submitted(InputValue),
    /// The dialog closed without its confirm action.
    Dismissed,
}

impl InputResult {
    /// Wire value: the submitted value, or `null` when dismissed.
    pub fn to_json(&self) -> Value {
        match self {
            InputResult::Submitted(value) => value.to_json(),
            InputResult::Dismissed => Value::Null,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum BrokerError {
    /// Distinct from dismissal: the user never acted within the bound.
    #[error("User input timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("Host is not accepting input dialogs")]
    HostUnavailable,
}

/// Opens input dialogs on the host and waits for their outcome.
#[derive(Clone)]
pub struct UserInputBroker {
    host: MainContextHandle,
    timeout: Option<Duration>,
}

impl UserInputBroker {
    /// `timeout` bounds how long a request waits for the end user; `None`
    /// waits until the dialog is confirmed or dismissed.
    pub fn new(host: MainContextHandle, timeout: Option<Duration>) -> Self {
        Self { host, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Open a dialog for `spec` and block until it resolves.
    pub fn request_input(&self, spec: InputRequestSpec) -> Result<InputResult, BrokerError> {
        let (sender, receiver) = mpsc::sync_channel(1);
        let dialog = InputDialog::new(spec, sender);
        let abandoned = dialog.abandon_flag();

        tracing::debug!(
            title = %dialog.spec().prompt_title,
            kind = dialog.spec().kind.as_str(),
            "Opening input dialog"
        );
        self.host
            .post(move |host| host.open_input_dialog(dialog))
            .map_err(|_| BrokerError::HostUnavailable)?;

        let outcome = match self.timeout {
            Some(limit) => receiver.recv_timeout(limit),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match outcome {
            Ok(value) => Ok(InputResult::Submitted(value)),
            Err(RecvTimeoutError::Disconnected) => Ok(InputResult::Dismissed),
            Err(RecvTimeoutError::Timeout) => {
                abandoned.store(true, Ordering::Release);
                let limit = self.timeout.unwrap_or_default();
                tracing::warn!(timeout_secs = limit.as_secs(), "Input dialog timed out");
                Err(BrokerError::TimedOut(limit))
            }
        }
    }
}
