//! Request dispatcher.
//!
//! Maps each decoded [`Request`] onto a host accessor, the frontmatter
//! normalizer or the user-input broker. [`Dispatcher::dispatch`] is total:
//! whatever a handler runs into comes back as an error response.

use std::path::{Component, Path};
use std::time::Duration;
use thiserror::Error;

use crate::broker::{BrokerError, UserInputBroker};
use crate::frontmatter::normalize;
use crate::host::{Host, HostError, MainContextHandle};
use crate::launcher::ScriptSettings;
use crate::protocol::{decode_request, ActionTag, CodecError, Payload, Request, Response};

/// Why a request produced an error response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("No active note")]
    NoActiveNote,
    #[error("User input timed out")]
    InputTimedOut,
    #[error("Host unavailable")]
    HostUnavailable,
    #[error("Failed to execute action \"{action}\": {reason}")]
    Action { action: ActionTag, reason: String },
}

impl DispatchError {
    fn from_host(action: ActionTag, error: HostError) -> Self {
        match error {
            HostError::NoActiveNote => DispatchError::NoActiveNote,
            HostError::Unavailable => DispatchError::HostUnavailable,
            other => DispatchError::Action {
                action,
                reason: other.to_string(),
            },
        }
    }

    pub fn to_response(&self) -> Response {
        match self {
            DispatchError::Codec(e) => e.to_response(),
            other => Response::error(other.to_string()),
        }
    }
}

/// Routes requests to their handlers.
///
/// Holds no per-request state, so one instance is shared by every connection.
pub struct Dispatcher {
    host: MainContextHandle,
    broker: UserInputBroker,
    notification_duration: Duration,
    script_settings: ScriptSettings,
}

impl Dispatcher {
    pub fn new(host: MainContextHandle, broker: UserInputBroker, notification_duration: Duration) -> Self {
        Self {
            host,
            broker,
            notification_duration,
            script_settings: ScriptSettings::default(),
        }
    }

    /// Serve `get_script_settings` from `settings`.
    pub fn with_script_settings(mut self, settings: ScriptSettings) -> Self {
        self.script_settings = settings;
        self
    }

    /// Decode one request body and dispatch it.
    pub fn handle_bytes(&self, bytes: &[u8]) -> Response {
        match decode_request(bytes) {
            Ok(request) => self.dispatch(request),
            Err(e) => {
                tracing::warn!(error = %e, "Rejected request");
                e.to_response()
            }
        }
    }

    pub fn dispatch(&self, request: Request) -> Response {
        let action = request.action();
        tracing::debug!(action = %action, "Dispatching request");

        match self.route(request) {
            Ok(payload) => Response::Success(payload),
            Err(e) => {
                tracing::warn!(action = %action, error = %e, "Request failed");
                e.to_response()
            }
        }
    }

    fn route(&self, request: Request) -> Result<Payload, DispatchError> {
        let action = request.action();
        let payload = match request {
            Request::GetActiveNoteContent => {
                let content = self.try_call(action, |host| host.active_note_content())?;
                Payload::Content { content }
            }
            Request::GetActiveNoteAbsolutePath => {
                let (vault, relative) = self.call(action, |host| {
                    (host.vault_path(), host.active_note_relative_path())
                })?;
                let absolute_path = match (vault, relative) {
                    (Some(vault), Some(relative)) => {
                        Some(vault.join(relative).to_string_lossy().into_owned())
                    }
                    _ => None,
                };
                Payload::AbsolutePath { absolute_path }
            }
            Request::GetActiveNoteRelativePath => Payload::RelativePath {
                relative_path: self.call(action, |host| host.active_note_relative_path())?,
            },
            Request::GetActiveNoteTitle => Payload::Title {
                title: self.call(action, |host| host.active_note_title())?,
            },
            Request::GetCurrentVaultAbsolutePath => {
                let vault = self.call(action, |host| host.vault_path())?;
                Payload::VaultPath {
                    vault_path: vault.map(|p| p.to_string_lossy().into_owned()),
                }
            }
            Request::ShowNotification { text, duration_ms } => {
                let duration = duration_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.notification_duration);
                self.call(action, move |host| host.notify(&text, duration))?;
                Payload::Status {
                    status: "notification sent",
                }
            }
            Request::GetFrontmatter => {
                let mapping = self.try_call(action, |host| host.active_note_frontmatter())?;
                Payload::Frontmatter {
                    frontmatter: mapping.as_ref().map(normalize),
                }
            }
            Request::RequestUserInput(spec) => {
                let result = self.broker.request_input(spec).map_err(|e| match e {
                    BrokerError::TimedOut(_) => DispatchError::InputTimedOut,
                    BrokerError::HostUnavailable => DispatchError::HostUnavailable,
                })?;
                Payload::UserInput {
                    user_input: result.to_json(),
                }
            }
            Request::GetAllNotePaths => Payload::Paths {
                paths: self.try_call(action, |host| host.note_paths())?,
            },
            Request::GetNoteContent { path } => {
                let content = self.try_call(action, move |host| host.note_content(&path))?;
                Payload::Content {
                    content: Some(content),
                }
            }
            Request::GetNoteFrontmatter { path } => {
                let mapping = self.try_call(action, move |host| host.note_frontmatter(&path))?;
                Payload::Frontmatter {
                    frontmatter: mapping.as_ref().map(normalize),
                }
            }
            Request::ModifyNoteContent { file_path, content } => {
                let relative = self.vault_relative(action, &file_path)?;
                self.try_call(action, move |host| host.modify_note(&relative, &content))?;
                Payload::Status {
                    status: "note modified",
                }
            }
            Request::Ping => Payload::Status { status: "pong" },
            Request::GetScriptSettings { script_path } => Payload::Settings {
                settings: self.script_settings.resolve(&script_path),
            },
        };
        Ok(payload)
    }

    /// Run `job` on the host's main context.
    fn call<T, F>(&self, action: ActionTag, job: F) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Host) -> T + Send + 'static,
    {
        self.host
            .call(job)
            .map_err(|e| DispatchError::from_host(action, e))
    }

    /// Like [`Self::call`] for accessors that can fail themselves.
    fn try_call<T, F>(&self, action: ActionTag, job: F) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn Host) -> Result<T, HostError> + Send + 'static,
    {
        self.call(action, job)?
            .map_err(|e| DispatchError::from_host(action, e))
    }

    /// Turn an absolute `filePath` into a path relative to the vault root.
    fn vault_relative(&self, action: ActionTag, file_path: &str) -> Result<String, DispatchError> {
        let invalid = |reason: &str| {
            DispatchError::Codec(CodecError::InvalidField {
                action,
                reason: reason.to_string(),
            })
        };

        let path = Path::new(file_path);
        if !path.is_absolute() {
            return Err(invalid("field `filePath` must be an absolute path"));
        }
        let vault = self
            .call(action, |host| host.vault_path())?
            .ok_or_else(|| DispatchError::Action {
                action,
                reason: "host has no vault directory".to_string(),
            })?;

        let relative = path
            .strip_prefix(&vault)
            .map_err(|_| invalid("field `filePath` must be inside the vault"))?;
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(invalid("field `filePath` must be inside the vault"));
        }
        Ok(relative.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::ScriptedHost;
    use crate::host::MainContext;
    use serde_json::{json, Value};

    fn dispatcher(host: ScriptedHost) -> (MainContext, Dispatcher) {
        let context = MainContext::spawn(host);
        let broker = UserInputBroker::new(context.handle(), Some(Duration::from_secs(5)));
        let dispatcher = Dispatcher::new(context.handle(), broker, Duration::from_millis(4000));
        (context, dispatcher)
    }

    fn send(dispatcher: &Dispatcher, body: Value) -> Value {
        let bytes = serde_json::to_vec(&body).unwrap();
        serde_json::to_value(dispatcher.handle_bytes(&bytes)).unwrap()
    }

    const NOTE: &str = "---\ntags: [a, b]\ndue: 2024-06-01\n---\n# Today\n";

    #[test]
    fn test_show_notification_reaches_host() {
        let host = ScriptedHost::dismissing();
        let notifications = host.notifications.clone();
        let (_context, dispatcher) = dispatcher(host);

        let reply = send(
            &dispatcher,
            json!({"action": "show_notification", "text_for_notif": "Done"}),
        );
        assert_eq!(reply, json!({"status": "notification sent"}));
        assert_eq!(*notifications.lock().unwrap(), vec!["Done".to_string()]);
    }

    #[test]
    fn test_unknown_action() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::dismissing());
        let reply = send(&dispatcher, json!({"action": "nonexistent_action"}));
        assert_eq!(reply, json!({"error": "Unknown action"}));
    }

    #[test]
    fn test_truncated_body() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::dismissing());
        let reply = serde_json::to_value(dispatcher.handle_bytes(br#"{"action":"show_notif"#)).unwrap();
        assert_eq!(reply, json!({"error": "Invalid request format"}));
    }

    #[test]
    fn test_frontmatter_without_active_note() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::dismissing());
        let reply = send(&dispatcher, json!({"action": "get_frontmatter"}));
        assert_eq!(reply, json!({"error": "No active note"}));
    }

    #[test]
    fn test_frontmatter_of_active_note() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::with_note("Inbox/today.md", NOTE));
        let reply = send(&dispatcher, json!({"action": "get_frontmatter"}));
        assert_eq!(
            reply,
            json!({"frontmatter": {"tags": ["a", "b"], "due": "2024-06-01"}})
        );
    }

    #[test]
    fn test_note_without_frontmatter_is_null() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::with_note("plain.md", "just text"));
        let reply = send(&dispatcher, json!({"action": "get_frontmatter"}));
        assert_eq!(reply, json!({"frontmatter": null}));
    }

    #[test]
    fn test_dismissed_number_input_is_null() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::dismissing());
        let reply = send(
            &dispatcher,
            json!({
                "action": "request_user_input",
                "scriptName": "rater",
                "inputType": "number",
                "message": "Rate it",
                "minValue": 1,
                "maxValue": 5,
                "step": 1
            }),
        );
        assert_eq!(reply, json!({"userInput": null}));
    }

    #[test]
    fn test_submitted_input_is_typed() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::answering(["yes"]));
        let reply = send(
            &dispatcher,
            json!({
                "action": "request_user_input",
                "scriptName": "s",
                "inputType": "checkbox",
                "message": "Proceed?"
            }),
        );
        assert_eq!(reply, json!({"userInput": true}));
    }

    #[test]
    fn test_whole_number_input_is_an_integer() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::answering(["3"]));
        let reply = dispatcher.handle_bytes(
            br#"{"action":"request_user_input","scriptName":"s","inputType":"range","message":"m","minValue":1,"maxValue":5}"#,
        );
        assert_eq!(
            crate::protocol::encode_response(&reply),
            br#"{"userInput":3}"#.to_vec()
        );
    }

    #[test]
    fn test_input_timeout_is_an_error() {
        let context = MainContext::spawn(ScriptedHost::holding());
        let broker = UserInputBroker::new(context.handle(), Some(Duration::from_millis(50)));
        let dispatcher = Dispatcher::new(context.handle(), broker, Duration::from_secs(1));

        let reply = send(
            &dispatcher,
            json!({
                "action": "request_user_input",
                "scriptName": "s",
                "inputType": "text",
                "message": "m"
            }),
        );
        assert_eq!(reply, json!({"error": "User input timed out"}));
    }

    #[test]
    fn test_active_note_accessor_shapes() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::with_note("Inbox/today.md", NOTE));

        assert_eq!(
            send(&dispatcher, json!({"action": "get_active_note_content"})),
            json!({"content": NOTE})
        );
        assert_eq!(
            send(&dispatcher, json!({"action": "get_active_note_absolute_path"})),
            json!({"absolutePath": "/vault/Inbox/today.md"})
        );
        assert_eq!(
            send(&dispatcher, json!({"action": "get_active_note_relative_path"})),
            json!({"relativePath": "Inbox/today.md"})
        );
        assert_eq!(
            send(&dispatcher, json!({"action": "get_active_note_title"})),
            json!({"title": "today"})
        );
        assert_eq!(
            send(&dispatcher, json!({"action": "get_current_vault_absolute_path"})),
            json!({"vaultPath": "/vault"})
        );
        assert_eq!(
            send(&dispatcher, json!({"action": "get_all_note_paths"})),
            json!({"paths": ["Inbox/today.md"]})
        );
    }

    #[test]
    fn test_accessors_without_note_are_null() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::dismissing().without_vault());

        for (action, key) in [
            ("get_active_note_content", "content"),
            ("get_active_note_absolute_path", "absolutePath"),
            ("get_active_note_relative_path", "relativePath"),
            ("get_active_note_title", "title"),
            ("get_current_vault_absolute_path", "vaultPath"),
        ] {
            let reply = send(&dispatcher, json!({ "action": action }));
            assert_eq!(reply, json!({ key: null }), "action {action}");
        }
    }

    #[test]
    fn test_note_content_by_path() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::with_note("a.md", "body"));

        assert_eq!(
            send(&dispatcher, json!({"action": "get_note_content", "path": "a.md"})),
            json!({"content": "body"})
        );
        let reply = send(&dispatcher, json!({"action": "get_note_content", "path": "b.md"}));
        let error = reply["error"].as_str().unwrap();
        assert!(error.starts_with("Failed to execute action \"get_note_content\""), "{error}");
    }

    #[test]
    fn test_modify_note_requires_absolute_path_inside_vault() {
        let (context, dispatcher) = dispatcher(ScriptedHost::with_note("a.md", "old"));

        let reply = send(
            &dispatcher,
            json!({"action": "modify_note_content", "filePath": "a.md", "content": "x"}),
        );
        assert!(reply["error"].as_str().unwrap().contains("absolute path"));

        let reply = send(
            &dispatcher,
            json!({"action": "modify_note_content", "filePath": "/elsewhere/a.md", "content": "x"}),
        );
        assert!(reply["error"].as_str().unwrap().contains("inside the vault"));

        let reply = send(
            &dispatcher,
            json!({"action": "modify_note_content", "filePath": "/vault/../etc/a.md", "content": "x"}),
        );
        assert!(reply["error"].as_str().unwrap().contains("inside the vault"));

        let reply = send(
            &dispatcher,
            json!({"action": "modify_note_content", "filePath": "/vault/a.md", "content": "new"}),
        );
        assert_eq!(reply, json!({"status": "note modified"}));
        let content = context
            .handle()
            .call(|host| host.note_content("a.md"))
            .unwrap()
            .unwrap();
        assert_eq!(content, "new");
    }

    #[test]
    fn test_missing_parameter_is_field_level() {
        let (_context, dispatcher) = dispatcher(ScriptedHost::dismissing());
        let reply = send(&dispatcher, json!({"action": "get_note_content"}));
        let error = reply["error"].as_str().unwrap();
        assert!(error.starts_with("Invalid parameters for get_note_content"), "{error}");
        assert!(error.contains("path"), "{error}");
    }

    #[test]
    fn test_stopped_host_is_unavailable() {
        let context = MainContext::spawn(ScriptedHost::dismissing());
        let handle = context.handle();
        let broker = UserInputBroker::new(handle.clone(), None);
        let dispatcher = Dispatcher::new(handle, broker, Duration::from_secs(1));
        context.shutdown();

        let reply = send(&dispatcher, json!({"action": "get_active_note_title"}));
        assert_eq!(reply, json!({"error": "Host unavailable"}));
    }

    #[test]
    fn test_ping_does_not_need_the_host() {
        let context = MainContext::spawn(ScriptedHost::dismissing());
        let handle = context.handle();
        let broker = UserInputBroker::new(handle.clone(), None);
        let dispatcher = Dispatcher::new(handle, broker, Duration::from_secs(1));
        context.shutdown();

        let reply = send(&dispatcher, json!({"action": "_test_connection_ping"}));
        assert_eq!(reply, json!({"status": "pong"}));
    }

    #[test]
    fn test_script_settings_merge_stored_values() {
        let definitions = crate::launcher::parse_definitions(
            r#"[{"key":"limit","type":"number","label":"Limit","default":5},
                {"key":"prefix","type":"text","label":"Prefix","default":"tag-"}]"#,
        )
        .unwrap();
        let mut entry = crate::config::ScriptConfig::default();
        entry.settings.insert("limit".to_string(), toml::Value::Integer(9));
        let mut settings = ScriptSettings::default();
        settings.insert("tagger.py", definitions, &entry);

        let (_context, dispatcher) = dispatcher(ScriptedHost::dismissing());
        let dispatcher = dispatcher.with_script_settings(settings);

        let reply = send(
            &dispatcher,
            json!({"action": "get_script_settings", "scriptPath": "tagger.py"}),
        );
        assert_eq!(reply, json!({"settings": {"limit": 9, "prefix": "tag-"}}));

        let reply = send(
            &dispatcher,
            json!({"action": "get_script_settings", "scriptPath": "unknown.py"}),
        );
        assert_eq!(reply, json!({"settings": {}}));
    }
}
