use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::types::{ActionTag, Command, Request, Response};
use crate::broker::{InputKind, InputRequestSpec};

/// Maximum length of raw payload echoed into logs.
const MAX_LOG_PREVIEW: usize = 200;

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// Not a JSON object carrying a string `action`.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    /// Recognized action whose parameters are missing or of the wrong type.
    #[error("invalid parameters for {action}: {reason}")]
    InvalidField { action: ActionTag, reason: String },
    #[error("not a command")]
    NotACommand,
}

impl CodecError {
    /// The error reply a worker receives for this decode failure.
    pub fn to_response(&self) -> Response {
        match self {
            CodecError::MalformedMessage(_) | CodecError::NotACommand => {
                Response::error("Invalid request format")
            }
            CodecError::UnknownAction(_) => Response::error("Unknown action"),
            CodecError::InvalidField { action, reason } => {
                Response::error(format!("Invalid parameters for {action}: {reason}"))
            }
        }
    }
}

#[derive(Deserialize)]
struct NotificationParams {
    text_for_notif: String,
    duration: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInputParams {
    script_name: String,
    input_type: String,
    message: String,
    validation_regex: Option<String>,
    min_value: Option<f64>,
    max_value: Option<f64>,
    step: Option<f64>,
}

#[derive(Deserialize)]
struct NotePathParams {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptSettingsParams {
    script_path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModifyNoteParams {
    file_path: String,
    content: String,
}

/// Decode one request body.
///
/// Total over arbitrary bytes: every failure is a [`CodecError`], never a panic.
///
/// # Classification
/// - invalid JSON, non-object, missing or non-string `action` → `MalformedMessage`
/// - unrecognized `action` → `UnknownAction`
/// - recognized `action` with bad parameters → `InvalidField`
pub fn decode_request(bytes: &[u8]) -> Result<Request, CodecError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::MalformedMessage(format!("{e} in {}", preview(bytes))))?;

    let name = match value.get("action") {
        Some(Value::String(name)) => name.clone(),
        Some(_) => {
            return Err(CodecError::MalformedMessage(
                "'action' must be a string".to_string(),
            ))
        }
        None if value.is_object() => {
            return Err(CodecError::MalformedMessage(
                "'action' field is missing".to_string(),
            ))
        }
        None => {
            return Err(CodecError::MalformedMessage(
                "request must be a JSON object".to_string(),
            ))
        }
    };

    let action = ActionTag::from_wire(&name).ok_or(CodecError::UnknownAction(name))?;

    let request = match action {
        ActionTag::GetActiveNoteContent => Request::GetActiveNoteContent,
        ActionTag::GetActiveNoteAbsolutePath => Request::GetActiveNoteAbsolutePath,
        ActionTag::GetActiveNoteRelativePath => Request::GetActiveNoteRelativePath,
        ActionTag::GetActiveNoteTitle => Request::GetActiveNoteTitle,
        ActionTag::GetCurrentVaultAbsolutePath => Request::GetCurrentVaultAbsolutePath,
        ActionTag::GetFrontmatter => Request::GetFrontmatter,
        ActionTag::GetAllNotePaths => Request::GetAllNotePaths,
        ActionTag::Ping => Request::Ping,
        ActionTag::GetScriptSettings => {
            let params: ScriptSettingsParams = params(action, value)?;
            Request::GetScriptSettings {
                script_path: params.script_path,
            }
        }
        ActionTag::ShowNotification => {
            let params: NotificationParams = params(action, value)?;
            Request::ShowNotification {
                text: params.text_for_notif,
                duration_ms: params.duration,
            }
        }
        ActionTag::RequestUserInput => {
            let params: UserInputParams = params(action, value)?;
            let kind =
                InputKind::parse(&params.input_type).ok_or_else(|| CodecError::InvalidField {
                    action,
                    reason: format!(
                        "field `inputType` must be one of text, number, boolean, date (got `{}`)",
                        params.input_type
                    ),
                })?;
            Request::RequestUserInput(InputRequestSpec {
                prompt_title: params.script_name,
                kind,
                message: params.message,
                validation_regex: params.validation_regex,
                min_value: params.min_value,
                max_value: params.max_value,
                step: params.step,
            })
        }
        ActionTag::GetNoteContent => {
            let params: NotePathParams = params(action, value)?;
            Request::GetNoteContent { path: params.path }
        }
        ActionTag::GetNoteFrontmatter => {
            let params: NotePathParams = params(action, value)?;
            Request::GetNoteFrontmatter { path: params.path }
        }
        ActionTag::ModifyNoteContent => {
            let params: ModifyNoteParams = params(action, value)?;
            Request::ModifyNoteContent {
                file_path: params.file_path,
                content: params.content,
            }
        }
    };

    Ok(request)
}

fn params<T: DeserializeOwned>(action: ActionTag, value: Value) -> Result<T, CodecError> {
    serde_json::from_value(value).map_err(|e| CodecError::InvalidField {
        action,
        reason: e.to_string(),
    })
}

/// Encode a response body. Total for every [`Response`].
pub fn encode_response(response: &Response) -> Vec<u8> {
    serde_json::to_vec(response).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to encode response");
        br#"{"error":"Failed to encode response"}"#.to_vec()
    })
}

/// Decode one unit of worker stdout into a [`Command`].
///
/// Anything that is not a JSON object with a known command `action` is
/// [`CodecError::NotACommand`]; callers treat that as plain output.
pub fn decode_command(bytes: &[u8]) -> Result<Command, CodecError> {
    let trimmed = trim_ascii(bytes);
    if !trimmed.starts_with(b"{") {
        return Err(CodecError::NotACommand);
    }
    serde_json::from_slice(trimmed).map_err(|_| CodecError::NotACommand)
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Truncated, lossy rendering of a payload for error messages.
pub(crate) fn preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() > MAX_LOG_PREVIEW {
        let cut: String = text.chars().take(MAX_LOG_PREVIEW).collect();
        format!("{cut}...")
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple_actions() {
        let request = decode_request(br#"{"action":"get_active_note_title"}"#).unwrap();
        assert_eq!(request, Request::GetActiveNoteTitle);

        let request = decode_request(br#"{"action":"get_frontmatter","extra":1}"#).unwrap();
        assert_eq!(request, Request::GetFrontmatter);

        let request = decode_request(br#"{"action":"_test_connection_ping"}"#).unwrap();
        assert_eq!(request, Request::Ping);
    }

    #[test]
    fn test_decode_script_settings_request() {
        let request =
            decode_request(br#"{"action":"get_script_settings","scriptPath":"tagger.py"}"#)
                .unwrap();
        assert_eq!(
            request,
            Request::GetScriptSettings {
                script_path: "tagger.py".to_string()
            }
        );

        let err = decode_request(br#"{"action":"get_script_settings"}"#).unwrap_err();
        assert!(err.to_string().contains("scriptPath"), "error: {err}");
    }

    #[test]
    fn test_decode_show_notification() {
        let request =
            decode_request(br#"{"action":"show_notification","text_for_notif":"Done"}"#).unwrap();
        assert_eq!(
            request,
            Request::ShowNotification {
                text: "Done".to_string(),
                duration_ms: None
            }
        );
    }

    #[test]
    fn test_missing_field_is_field_level_error() {
        let err = decode_request(br#"{"action":"show_notification"}"#).unwrap_err();
        match &err {
            CodecError::InvalidField { action, reason } => {
                assert_eq!(*action, ActionTag::ShowNotification);
                assert!(reason.contains("text_for_notif"), "reason: {reason}");
            }
            other => panic!("Expected InvalidField, got {other:?}"),
        }
        let Response::Error { error } = err.to_response() else {
            panic!("Expected error response");
        };
        assert!(error.starts_with("Invalid parameters for show_notification"));
    }

    #[test]
    fn test_wrong_field_type_is_field_level_error() {
        let err =
            decode_request(br#"{"action":"get_note_content","path":42}"#).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidField {
                action: ActionTag::GetNoteContent,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_user_input_request() {
        let body = br#"{"action":"request_user_input","scriptName":"tagger","inputType":"number","message":"How many?","minValue":1,"maxValue":5,"step":1}"#;
        let Request::RequestUserInput(spec) = decode_request(body).unwrap() else {
            panic!("Expected RequestUserInput");
        };
        assert_eq!(spec.prompt_title, "tagger");
        assert_eq!(spec.kind, InputKind::Number);
        assert_eq!(spec.min_value, Some(1.0));
        assert_eq!(spec.max_value, Some(5.0));
        assert_eq!(spec.step, Some(1.0));
        assert!(spec.validation_regex.is_none());
    }

    #[test]
    fn test_unknown_input_type_names_the_field() {
        let body = br#"{"action":"request_user_input","scriptName":"s","inputType":"color","message":"m"}"#;
        let err = decode_request(body).unwrap_err();
        assert!(err.to_string().contains("inputType"));
    }

    #[test]
    fn test_unknown_action() {
        let err = decode_request(br#"{"action":"nonexistent_action"}"#).unwrap_err();
        assert_eq!(err, CodecError::UnknownAction("nonexistent_action".to_string()));
        assert_eq!(err.to_response(), Response::error("Unknown action"));
    }

    #[test]
    fn test_malformed_inputs_never_panic() {
        let cases: [&[u8]; 9] = [
            b"",
            b"{",
            br#"{"action":"show_notif"#,
            b"null",
            b"[1,2,3]",
            br#""get_active_note_title""#,
            br#"{"payload":{}}"#,
            br#"{"action":7}"#,
            &[0xff, 0xfe, 0x00],
        ];
        for case in cases {
            let err = decode_request(case).unwrap_err();
            assert!(
                matches!(err, CodecError::MalformedMessage(_)),
                "{:?} gave {err:?}",
                String::from_utf8_lossy(case)
            );
            assert_eq!(err.to_response(), Response::error("Invalid request format"));
        }
    }

    #[test]
    fn test_decode_command() {
        let command = decode_command(b"  {\"action\":\"show_notification\",\"text\":\"hi\"}\r\n")
            .unwrap();
        assert_eq!(
            command,
            Command::Notify {
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_decode_command_rejects_plain_output() {
        assert_eq!(decode_command(b"Processing 3 notes..."), Err(CodecError::NotACommand));
        assert_eq!(decode_command(b"{not json"), Err(CodecError::NotACommand));
        assert_eq!(
            decode_command(br#"{"action":"launch_rockets"}"#),
            Err(CodecError::NotACommand)
        );
        assert_eq!(decode_command(b""), Err(CodecError::NotACommand));
    }

    #[test]
    fn test_encode_response() {
        let bytes = encode_response(&Response::error("Unknown action"));
        assert_eq!(bytes, br#"{"error":"Unknown action"}"#);
    }

    #[test]
    fn test_preview_truncates() {
        let long = vec![b'a'; 500];
        let shown = preview(&long);
        assert_eq!(shown.len(), MAX_LOG_PREVIEW + 3);
        assert!(shown.ends_with("..."));
    }
}
