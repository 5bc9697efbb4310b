// SPDX-License-Identifier: MIT

//! Backward-compatibility tests for `Response` deserialization.

use super::*;

#[test]
fn error_suggested_actions_default_to_empty() {
    let json = r#"{"type":"Error","message":"job not found"}"#;
    let decoded: Response = serde_json::from_str(json).expect("deserialize failed");
    match decoded {
        Response::Error { suggested_actions, help_link, kind, message } => {
            assert!(suggested_actions.is_empty());
            assert!(help_link.is_none());
            assert_eq!(kind, "");
            assert_eq!(message, "job not found");
        }
        _ => panic!("expected Error response"),
    }
}

#[test]
fn core_error_converts_to_wire_error_response() {
    let err = peft_core::CoreError::not_found("job 'x' not found")
        .with_actions(vec![peft_core::SuggestedAction::new("check job_id", false)])
        .with_help_link("job-not-found");
    let response = Response::from(&err);
    match response {
        Response::Error { kind, message, suggested_actions, help_link } => {
            assert_eq!(kind, "not_found");
            assert_eq!(message, "job 'x' not found");
            assert_eq!(suggested_actions.len(), 1);
            assert_eq!(help_link.as_deref(), Some("job-not-found"));
        }
        _ => panic!("expected Error response"),
    }
}

#[test]
fn ok_round_trips() {
    let json = serde_json::to_string(&Response::Ok).expect("serialize");
    let decoded: Response = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(decoded, Response::Ok);
}
