use chrono::NaiveDate;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use thiserror::Error;

use super::{InputKind, InputRequestSpec, InputValue};

#[derive(Debug, Error, PartialEq)]
pub enum InputValidationError {
    #[error("Input does not match the required format")]
    PatternMismatch,
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("'{0}' is not yes or no")]
    NotABoolean(String),
    #[error("'{0}' is not a date (expected YYYY-MM-DD)")]
    NotADate(String),
    #[error("Expected a {expected} value")]
    WrongKind { expected: &'static str },
    #[error("This dialog has already been answered")]
    AlreadyResolved,
}

/// A pending input request, as handed to the host UI.
///
/// `confirm` is the only way to deliver a value, and it disables itself after
/// the first success. Dropping the dialog unconfirmed reports a dismissal.
#[derive(Debug)]
pub struct InputDialog {
    spec: InputRequestSpec,
    pattern: Option<Regex>,
    resolver: Option<SyncSender<InputValue>>,
    abandoned: Arc<AtomicBool>,
}

impl InputDialog {
    pub(crate) fn new(spec: InputRequestSpec, resolver: SyncSender<InputValue>) -> Self {
        let pattern = match (&spec.kind, &spec.validation_regex) {
            (InputKind::Text, Some(source)) => match Regex::new(source) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(regex = %source, error = %e, "Ignoring invalid validation regex");
                    None
                }
            },
            _ => None,
        };
        Self {
            spec,
            pattern,
            resolver: Some(resolver),
            abandoned: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set by the requester when it stops waiting for this dialog.
    pub(crate) fn abandon_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abandoned)
    }

    /// Whether the request behind this dialog gave up waiting. A UI should
    /// close such a dialog rather than collect an answer nobody reads.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    pub fn spec(&self) -> &InputRequestSpec {
        &self.spec
    }

    pub fn is_resolved(&self) -> bool {
        self.resolver.is_none()
    }

    /// Confirm with text as typed by the end user, parsed per the dialog kind.
    ///
    /// Numbers are clamped into `[min_value, max_value]`. On a validation error
    /// the dialog stays open.
    pub fn confirm(&mut self, raw: &str) -> Result<(), InputValidationError> {
        let value = self.parse(raw)?;
        self.confirm_value(value)
    }

    /// Confirm with an already-typed value, as a native control would.
    pub fn confirm_value(&mut self, value: InputValue) -> Result<(), InputValidationError> {
        if self.resolver.is_none() {
            return Err(InputValidationError::AlreadyResolved);
        }
        let value = self.validate(value)?;
        let Some(resolver) = self.resolver.take() else {
            return Err(InputValidationError::AlreadyResolved);
        };
        match resolver.try_send(value) {
            Ok(()) => {}
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!(
                    title = %self.spec.prompt_title,
                    "Input confirmed after the request was abandoned"
                );
            }
            Err(TrySendError::Full(_)) => {
                tracing::error!("Input dialog resolver was already used");
            }
        }
        Ok(())
    }

    /// Close without a value.
    pub fn dismiss(self) {
        tracing::debug!(title = %self.spec.prompt_title, "Input dialog dismissed");
    }

    fn parse(&self, raw: &str) -> Result<InputValue, InputValidationError> {
        let trimmed = raw.trim();
        match self.spec.kind {
            InputKind::Text => Ok(InputValue::Text(raw.to_string())),
            InputKind::Number => trimmed
                .parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map(InputValue::Number)
                .ok_or_else(|| InputValidationError::NotANumber(trimmed.to_string())),
            InputKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" | "on" => Ok(InputValue::Boolean(true)),
                "n" | "no" | "false" | "0" | "off" => Ok(InputValue::Boolean(false)),
                _ => Err(InputValidationError::NotABoolean(trimmed.to_string())),
            },
            InputKind::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .map(InputValue::Date)
                .map_err(|_| InputValidationError::NotADate(trimmed.to_string())),
        }
    }

    fn validate(&self, value: InputValue) -> Result<InputValue, InputValidationError> {
        match (self.spec.kind, value) {
            (InputKind::Text, InputValue::Text(text)) => match &self.pattern {
                Some(pattern) if !pattern.is_match(&text) => {
                    Err(InputValidationError::PatternMismatch)
                }
                _ => Ok(InputValue::Text(text)),
            },
            (InputKind::Number, InputValue::Number(mut n)) => {
                if let Some(min) = self.spec.min_value {
                    n = n.max(min);
                }
                if let Some(max) = self.spec.max_value {
                    n = n.min(max);
                }
                Ok(InputValue::Number(n))
            }
            (InputKind::Boolean, value @ InputValue::Boolean(_)) => Ok(value),
            (InputKind::Date, value @ InputValue::Date(_)) => Ok(value),
            (kind, _) => Err(InputValidationError::WrongKind {
                expected: kind.as_str(),
            }),
        }
    }
}
