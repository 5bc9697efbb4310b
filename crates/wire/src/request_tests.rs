// SPDX-License-Identifier: MIT

//! Backward-compatibility tests for `Request` deserialization.

use super::*;

#[test]
fn history_limit_defaults_when_omitted() {
    let json = r#"{"type":"History"}"#;
    let decoded: Request = serde_json::from_str(json).expect("deserialize failed");
    match decoded {
        Request::History { limit, offset, filter } => {
            assert_eq!(limit, 50);
            assert_eq!(offset, 0);
            assert_eq!(filter, HistoryFilter::default());
        }
        _ => panic!("expected History request"),
    }
}

#[test]
fn create_job_round_trips_through_json() {
    let config = peft_core::Config::builder().build();
    let request = Request::CreateJob { job_id: "job-1".to_string(), config: config.clone() };
    let json = serde_json::to_string(&request).expect("serialize");
    let decoded: Request = serde_json::from_str(&json).expect("deserialize");
    match decoded {
        Request::CreateJob { job_id, config: decoded_config } => {
            assert_eq!(job_id, "job-1");
            assert_eq!(decoded_config, config);
        }
        _ => panic!("expected CreateJob request"),
    }
}

#[test]
fn status_is_tagged_by_type_field() {
    let json = r#"{"type":"Status","job_id":"job-42"}"#;
    let decoded: Request = serde_json::from_str(json).expect("deserialize failed");
    assert_eq!(decoded, Request::Status { job_id: "job-42".to_string() });
}
