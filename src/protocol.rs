use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::session::{Session, SessionError};

/// Magic number carried by imaging submissions.
pub const IMAGING_MAGIC: u32 = 0x7E1E;
/// Magic number carried by admin messages.
pub const ADMIN_MAGIC: u32 = 0xAD71;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message carries no magic number")]
    MissingMagic,
    #[error("unknown magic number {0:#x}")]
    UnknownMagic(u64),
    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, PartialEq)]
pub enum Request {
    Imaging(Session),
    Admin(AdminAction),
}

#[derive(Debug, PartialEq)]
pub enum AdminAction {
    EnableIntake,
    DisableIntake,
    Unrecognized { kind: String, action: String },
}

#[derive(Debug, Deserialize)]
struct AdminMessage {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    action: String,
}

/// One-line reply to every request. An ack is just the echoed magic; an
/// error adds a short machine-readable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub magic: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Reply {
    pub fn ack(magic: u32) -> Self {
        Self { magic, error: None }
    }

    pub fn error(magic: u32, code: impl Into<String>) -> Self {
        Self {
            magic,
            error: Some(code.into()),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.error.is_none()
    }
}

/// Decodes one newline-delimited request. The magic number is inspected
/// first and decides how the rest of the document is read.
pub fn parse_request(line: &str) -> Result<Request, ProtocolError> {
    let value: Value = serde_json::from_str(line)?;
    let magic = value
        .get("magic")
        .and_then(Value::as_u64)
        .ok_or(ProtocolError::MissingMagic)?;

    if magic == u64::from(IMAGING_MAGIC) {
        let session: Session = serde_json::from_value(value)?;
        session.validate()?;
        Ok(Request::Imaging(session))
    } else if magic == u64::from(ADMIN_MAGIC) {
        let message: AdminMessage = serde_json::from_value(value)?;
        let action = match (message.kind.as_str(), message.action.as_str()) {
            ("state", "enable") => AdminAction::EnableIntake,
            ("state", "disable") => AdminAction::DisableIntake,
            _ => AdminAction::Unrecognized {
                kind: message.kind,
                action: message.action,
            },
        };
        Ok(Request::Admin(action))
    } else {
        Err(ProtocolError::UnknownMagic(magic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imaging_submissions_parse_into_validated_sessions() {
        let line = format!(
            r#"{{"magic": {}, "targets": ["m31"], "exposure_time": 60.0, "user": "sam"}}"#,
            IMAGING_MAGIC
        );
        match parse_request(&line).unwrap() {
            Request::Imaging(session) => {
                assert_eq!(session.user, "sam");
                assert_eq!(session.targets, vec!["m31".to_string()]);
                assert_eq!(session.exposure_count, 1);
            }
            other => panic!("expected an imaging request, got {:?}", other),
        }
    }

    #[test]
    fn admin_state_messages_toggle_intake() {
        let enable = format!(
            r#"{{"magic": {}, "type": "state", "action": "enable"}}"#,
            ADMIN_MAGIC
        );
        assert_eq!(
            parse_request(&enable).unwrap(),
            Request::Admin(AdminAction::EnableIntake)
        );

        let disable = format!(
            r#"{{"magic": {}, "type": "state", "action": "disable"}}"#,
            ADMIN_MAGIC
        );
        assert_eq!(
            parse_request(&disable).unwrap(),
            Request::Admin(AdminAction::DisableIntake)
        );
    }

    #[test]
    fn unfamiliar_admin_messages_are_preserved_for_logging() {
        let line = format!(
            r#"{{"magic": {}, "type": "power", "action": "cycle"}}"#,
            ADMIN_MAGIC
        );
        assert_eq!(
            parse_request(&line).unwrap(),
            Request::Admin(AdminAction::Unrecognized {
                kind: "power".to_string(),
                action: "cycle".to_string(),
            })
        );
    }

    #[test]
    fn a_message_without_magic_is_rejected() {
        let err = parse_request(r#"{"targets": ["m31"]}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingMagic));
    }

    #[test]
    fn an_unknown_magic_is_rejected_with_its_value() {
        let err = parse_request(r#"{"magic": 39321}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownMagic(39321)));
    }

    #[test]
    fn garbage_is_an_invalid_message() {
        assert!(matches!(
            parse_request("not json at all").unwrap_err(),
            ProtocolError::Json(_)
        ));
    }

    #[test]
    fn an_unsound_session_is_rejected_at_the_door() {
        let line = format!(
            r#"{{"magic": {}, "targets": [], "exposure_time": 60.0, "user": "sam"}}"#,
            IMAGING_MAGIC
        );
        assert!(matches!(
            parse_request(&line).unwrap_err(),
            ProtocolError::Session(SessionError::NoTargets)
        ));
    }

    #[test]
    fn ack_replies_leave_the_error_field_out_entirely() {
        let ack = serde_json::to_string(&Reply::ack(IMAGING_MAGIC)).unwrap();
        assert_eq!(ack, r#"{"magic":32286}"#);

        let rejected = serde_json::to_string(&Reply::error(IMAGING_MAGIC, "intake_disabled")).unwrap();
        assert!(rejected.contains("intake_disabled"));

        let parsed: Reply = serde_json::from_str(&ack).unwrap();
        assert!(parsed.is_ack());
    }
}
