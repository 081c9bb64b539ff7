//! Protocol layer tests — JSON-RPC serialization, error codes, push events.

#[cfg(test)]
mod tests {
    use caphub_protocol::events::TaggedEvent;
    use caphub_protocol::methods::is_known_method;
    use caphub_protocol::*;
    use serde_json::json;

    // ─────────────────────────────────────────────────────────────────────
    // RequestId / RpcRequest
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn request_id_untagged() {
        assert_eq!(serde_json::to_value(RequestId::Number(42)).unwrap(), json!(42));
        let id: RequestId = serde_json::from_value(json!("req-1")).unwrap();
        assert_eq!(id, RequestId::String("req-1".into()));
    }

    #[test]
    fn request_without_id_is_notification() {
        let wire = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let req: RpcRequest = serde_json::from_str(wire).unwrap();
        assert!(req.is_valid());
        assert!(req.is_notification());
    }

    #[test]
    fn null_id_is_not_a_notification() {
        let wire = r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#;
        let req: RpcRequest = serde_json::from_str(wire).unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.response_id(), None);

        let resp = RpcResponse::from_result(req.response_id(), Ok(json!({})));
        let wire = serde_json::to_value(&resp).unwrap();
        assert!(wire.get("id").unwrap().is_null());
        assert_eq!(wire["result"], json!({}));
    }

    #[test]
    fn request_with_wrong_version_is_invalid() {
        let wire = r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#;
        let req: RpcRequest = serde_json::from_str(wire).unwrap();
        assert!(!req.is_valid());
    }

    // ─────────────────────────────────────────────────────────────────────
    // Error envelope
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn error_code_values() {
        assert_eq!(CapErrorCode::ParseError.code(), -32700);
        assert_eq!(CapErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(CapErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(CapErrorCode::InvalidParams.code(), -32602);
        assert_eq!(CapErrorCode::InternalError.code(), -32603);
        assert_eq!(CapErrorCode::ServerError.code(), -32000);
        assert_eq!(CapErrorCode::AuthenticationRequired.code(), -32001);
        assert_eq!(CapErrorCode::ResourceNotFound.code(), -32002);
        assert_eq!(CapErrorCode::ToolNotFound.code(), -32003);
        assert_eq!(CapErrorCode::PromptNotFound.code(), -32004);
        assert_eq!(CapErrorCode::from_code(-32003), CapErrorCode::ToolNotFound);
        assert_eq!(CapErrorCode::from_code(-1), CapErrorCode::Custom(-1));
    }

    #[test]
    fn error_envelope_shape() {
        let resp = RpcResponse::error(None, CapError::tool_not_found("nope"));
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["jsonrpc"], "2.0");
        assert_eq!(wire["error"]["code"], -32003);
        assert!(wire["error"]["message"].as_str().unwrap().contains("nope"));
        assert!(wire["error"].get("data").is_none());
        assert!(wire["id"].is_null());
    }

    #[test]
    fn error_with_data_and_display() {
        let e = CapError::invalid_params("missing field").with_data(json!({"field": "name"}));
        assert_eq!(e.data.as_ref().unwrap()["field"], "name");
        let s = format!("{e}");
        assert!(s.contains("-32602"));
        assert!(s.contains("missing field"));
    }

    #[test]
    fn lookup_errors_name_their_subject() {
        assert_eq!(CapError::tool_not_found("nope").message, "Tool not found: nope");
        assert_eq!(CapError::method_not_found("x/y").message, "Method not found: x/y");
        let auth = CapError::authentication_required();
        assert_eq!(auth.message, CapErrorCode::AuthenticationRequired.default_message());
        assert_eq!(CapError::from(CapErrorCode::Custom(5)).message, "Handler error");
    }

    #[test]
    fn custom_codes_are_not_protocol_errors() {
        assert!(CapError::tool_not_found("x").is_protocol_error());
        assert!(!CapError::new(CapErrorCode::Custom(17), "boom").is_protocol_error());
    }

    #[test]
    fn success_response_wire_format() {
        let resp = RpcResponse::from_result(Some(RequestId::Number(7)), Ok(json!({"ok": true})));
        assert!(resp.is_success());
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["result"]["ok"], true);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Push events
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn progress_event_has_no_type() {
        let event = PushEvent::progress(ProgressSnapshot::new("analyze", 50.0, "halfway"));
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["stage"], "analyze");
        assert_eq!(wire["percent"], 50.0);
        assert_eq!(wire["message"], "halfway");
        assert!(wire.get("type").is_none());
        assert!(wire["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(ProgressSnapshot::new("s", 140.0, "").percent, 100.0);
        assert_eq!(ProgressSnapshot::new("s", -3.0, "").percent, 0.0);
    }

    #[test]
    fn notification_and_complete_events() {
        let wire = serde_json::to_value(PushEvent::notification("tools activated")).unwrap();
        assert_eq!(wire["type"], "notification");
        assert_eq!(wire["message"], "tools activated");

        let done = PushEvent::complete(false, Some("boom".into()));
        assert!(done.is_complete());
        let wire = serde_json::to_value(&done).unwrap();
        assert_eq!(wire["type"], "complete");
        assert_eq!(wire["success"], false);
        assert_eq!(wire["error"], "boom");

        let ok = serde_json::to_value(PushEvent::complete(true, None)).unwrap();
        assert!(ok.get("error").is_none());
    }

    #[test]
    fn events_parse_back_from_lines() {
        let line = PushEvent::notification("hi").to_line().unwrap();
        assert!(line.ends_with('\n'));
        let parsed: PushEvent = serde_json::from_str(line.trim_end()).unwrap();
        assert!(matches!(parsed, PushEvent::Tagged(TaggedEvent::Notification { .. })));

        let line = PushEvent::progress(ProgressSnapshot::new("a", 1.0, "b")).to_line().unwrap();
        let parsed: PushEvent = serde_json::from_str(line.trim_end()).unwrap();
        assert!(matches!(parsed, PushEvent::Progress(_)));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Methods / identity
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn known_methods() {
        assert!(is_known_method(Methods::TOOLS_CALL));
        assert!(is_known_method("generate"));
        assert!(is_known_method("session/progress"));
        assert!(!is_known_method("tools/delete"));
        assert!(!is_known_method(""));
    }

    #[test]
    fn identity_merge_is_non_destructive() {
        let mut identity = Identity {
            user_id: "u1".into(),
            username: Some("ada".into()),
            role: Some("admin".into()),
        };
        identity.merge(Identity {
            user_id: "u1".into(),
            username: None,
            role: Some("viewer".into()),
        });
        assert_eq!(identity.username.as_deref(), Some("ada"));
        assert_eq!(identity.role.as_deref(), Some("viewer"));
    }
}
