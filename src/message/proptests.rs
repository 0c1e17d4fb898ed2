//! Property-based tests for the representation converter
//!
//! These tests verify the conversion invariants hold across arbitrary input:
//! - conversion is pure (same input, same output)
//! - display never panics and preserves undecodable text
//! - encoded tool calls always produce null content and a matching call count

use super::content::{StructuredContent, ToolCallEntry, ToolStatus};
use super::convert::{to_display, to_model_history};
use super::types::{DisplayContent, Role, StorageMessage};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use serde_json::{Map, Value};

// ============================================================================
// Strategies
// ============================================================================

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::User),
        Just(Role::Assistant),
        Just(Role::System),
        Just(Role::Tool),
    ]
}

fn arb_parameters() -> impl Strategy<Value = Map<String, Value>> {
    proptest::collection::hash_map("[a-z_]{1,10}", "[a-zA-Z0-9 ]{0,20}", 0..4).prop_map(|m| {
        m.into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<Map<String, Value>>()
    })
}

fn arb_entry() -> impl Strategy<Value = ToolCallEntry> {
    (
        proptest::option::of("[a-z0-9]{4,12}"),
        "[a-z_]{3,16}",
        arb_parameters(),
    )
        .prop_map(|(id, name, parameters)| ToolCallEntry {
            id,
            name,
            parameters,
        })
}

fn arb_tool_calls_content() -> impl Strategy<Value = StructuredContent> {
    prop_oneof![
        proptest::collection::vec(arb_entry(), 1..6)
            .prop_map(|calls| StructuredContent::ToolCalls { calls }),
        arb_entry().prop_map(|entry| StructuredContent::ToolCall {
            id: entry.id,
            name: entry.name,
            parameters: entry.parameters,
        }),
    ]
}

fn arb_structured() -> impl Strategy<Value = StructuredContent> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,40}".prop_map(StructuredContent::text),
        arb_tool_calls_content(),
        ("[a-z0-9]{4,12}", any::<bool>(), "[a-zA-Z ]{0,30}").prop_map(|(id, ok, message)| {
            StructuredContent::ToolResult {
                tool_call_id: id,
                status: if ok {
                    ToolStatus::Success
                } else {
                    ToolStatus::Error
                },
                message,
                payload: None,
            }
        }),
        proptest::collection::vec("[a-z]{1,10}", 0..4)
            .prop_map(|fields| StructuredContent::DataRequest { fields }),
        arb_parameters().prop_map(|data| StructuredContent::DataResponse { data }),
    ]
}

/// Raw stored text: prose, structured JSON, or brace-wrapped garbage
fn arb_raw_content() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 .,!?]{0,60}",
        arb_structured().prop_map(|c| c.to_json_string()),
        "[a-zA-Z0-9 :,\"]{0,40}".prop_map(|inner| format!("{{{inner}}}")),
    ]
}

fn message(id: String, role: Role, content: String) -> StorageMessage {
    StorageMessage {
        id,
        content,
        role,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        user_id: "user-1".to_string(),
        thread_id: "thread-1".to_string(),
        is_visible: true,
        send_to_llm: true,
        tool_call_id: Some("call-x".to_string()),
        sequence: None,
        metadata: None,
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_conversion_is_pure(
        id in "[a-z0-9]{1,12}",
        role in arb_role(),
        content in arb_raw_content(),
    ) {
        let msg = message(id, role, content);
        prop_assert_eq!(to_display(&msg), to_display(&msg));
        prop_assert_eq!(to_model_history(&msg), to_model_history(&msg));
    }

    #[test]
    fn prop_model_history_is_well_formed(
        id in "[a-z0-9]{1,12}",
        role in arb_role(),
        content in arb_raw_content(),
    ) {
        let history = to_model_history(&message(id, role, content));
        prop_assert!(history.is_well_formed());
    }

    #[test]
    fn prop_tool_calls_null_content_and_count(
        id in "[a-z0-9]{1,12}",
        content in arb_tool_calls_content(),
    ) {
        let expected = content.tool_call_entries().map_or(0, |c| c.len());
        let history = to_model_history(&message(id, Role::Assistant, content.to_json_string()));
        prop_assert!(history.content.is_none());
        prop_assert_eq!(history.tool_calls.len(), expected);
        for call in &history.tool_calls {
            prop_assert!(!call.id.is_empty());
            let args: Value = serde_json::from_str(&call.arguments).unwrap();
            prop_assert!(args.is_object());
        }
    }

    #[test]
    fn prop_undecodable_braces_keep_original(
        id in "[a-z0-9]{1,12}",
        inner in "[a-zA-Z ]{1,30}",
    ) {
        let raw = format!("{{{inner}}}");
        let display = to_display(&message(id, Role::Assistant, raw.clone()));
        match display.content {
            DisplayContent::Structured(StructuredContent::Error { original_content, .. }) => {
                prop_assert_eq!(original_content, Some(raw));
            }
            other => prop_assert!(false, "expected error variant, got {:?}", other),
        }
    }
}
