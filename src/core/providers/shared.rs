//! Behavior shared by the mocked vendors
//!
//! Both vendors run the same deterministic "model": token counts are a pure
//! function of the text, and the reply planner implements the order-lookup
//! heuristic the demo agents rely on.

use crate::core::types::{ChatRole, NeutralRequest, ToolCallData};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches an order id like "12345" or "#12345" in a user message
static ORDER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"#?(\d{4,})").expect("valid regex"));

/// What the mock model decided to answer with
#[derive(Debug, Clone)]
pub(crate) struct PlannedReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallData>,
}

/// Rough token estimate: one token per four characters, at least one for
/// non-empty text
pub(crate) fn estimate_tokens(text: &str) -> i64 {
    if text.is_empty() {
        return 0;
    }
    ((text.chars().count() as i64) / 4).max(1)
}

/// Input-side token count for a whole request
pub(crate) fn request_tokens(request: &NeutralRequest) -> i64 {
    let mut total = estimate_tokens(&request.system_prompt);
    for message in &request.messages {
        total += 4 + estimate_tokens(&message.content);
        for call in &message.tool_calls {
            total += estimate_tokens(&call.args.to_string());
        }
        for result in &message.tool_results {
            if let Some(value) = &result.result {
                total += estimate_tokens(&value.to_string());
            }
        }
    }
    total
}

/// Output-side token count for a planned reply
pub(crate) fn reply_tokens(reply: &PlannedReply) -> i64 {
    let mut total = estimate_tokens(&reply.content);
    for call in &reply.tool_calls {
        total += 8 + estimate_tokens(&call.args.to_string());
    }
    total.max(1)
}

/// Decide what the mock model says for this request
///
/// Two special cases drive the tool loop: a user message carrying a numeric
/// order id triggers an InvoiceLookup call, and a follow-up turn whose last
/// user message is empty (the tool-result round) produces the final
/// natural-language answer from the latest tool result.
pub(crate) fn plan_reply(request: &NeutralRequest) -> PlannedReply {
    let last = request.messages.last();

    let is_tool_followup =
        matches!(last, Some(m) if m.role == ChatRole::User && m.content.is_empty());
    if is_tool_followup {
        return PlannedReply {
            content: answer_from_tool_results(request),
            tool_calls: Vec::new(),
        };
    }

    let last_user_content = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User)
        .map(|m| m.content.as_str())
        .unwrap_or("");

    let lookup_enabled = request.tools.iter().any(|t| t.name == "InvoiceLookup");
    if lookup_enabled {
        if let Some(order_id) = ORDER_ID
            .captures(last_user_content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
        {
            return PlannedReply {
                content: String::new(),
                tool_calls: vec![ToolCallData {
                    id: format!("call_{}", order_id),
                    name: "InvoiceLookup".to_string(),
                    args: serde_json::json!({ "orderId": order_id }),
                }],
            };
        }
    }

    PlannedReply {
        content: canned_reply(last_user_content),
        tool_calls: Vec::new(),
    }
}

/// Compose the final answer for a tool-result round
fn answer_from_tool_results(request: &NeutralRequest) -> String {
    let latest_result = request
        .messages
        .iter()
        .rev()
        .flat_map(|m| m.tool_results.iter())
        .next();

    let Some(result) = latest_result else {
        return "I wasn't able to look that up, sorry.".to_string();
    };

    if let Some(error) = &result.error {
        return format!("I couldn't complete the lookup: {}", error);
    }

    let Some(data) = &result.result else {
        return "The lookup returned no data.".to_string();
    };

    // Invoice lookups come back with a known shape; everything else gets a
    // generic summary.
    match (
        data.get("orderId").and_then(|v| v.as_str()),
        data.get("status").and_then(|v| v.as_str()),
    ) {
        (Some(order_id), Some(status)) => {
            let mut answer = format!("Order {} is currently {}.", order_id, status);
            if let Some(tracking) = data.get("tracking").and_then(|v| v.as_str()) {
                answer.push_str(&format!(" Tracking number: {}.", tracking));
            }
            if let Some(items) = data.get("items").and_then(|v| v.as_array()) {
                answer.push_str(&format!(" The order contains {} item(s).", items.len()));
            }
            answer
        }
        _ => format!("Here is what I found: {}", data),
    }
}

/// Deterministic reply for messages that need no tool
fn canned_reply(user_content: &str) -> String {
    let lower = user_content.to_lowercase();
    if lower.contains("hello") || lower.contains("hi ") || lower == "hi" {
        "Hello! How can I help you today?".to_string()
    } else if lower.contains("thank") {
        "You're welcome! Is there anything else I can help with?".to_string()
    } else if user_content.is_empty() {
        "How can I help you today?".to_string()
    } else {
        format!(
            "Thanks for reaching out. I understand your message: \"{}\". How else can I assist?",
            user_content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{NeutralMessage, ToolDescriptor, ToolResultData};

    fn request_with(messages: Vec<NeutralMessage>, tools: Vec<ToolDescriptor>) -> NeutralRequest {
        NeutralRequest {
            system_prompt: "You are a support agent.".to_string(),
            messages,
            temperature: 0.7,
            max_tokens: 256,
            tools,
        }
    }

    fn invoice_tool() -> ToolDescriptor {
        ToolDescriptor {
            name: "InvoiceLookup".to_string(),
            description: "Look up an order".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn token_estimates_are_deterministic() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        let request = request_with(vec![NeutralMessage::user("hello there")], vec![]);
        assert_eq!(request_tokens(&request), request_tokens(&request));
    }

    #[test]
    fn order_id_triggers_invoice_lookup() {
        let request = request_with(
            vec![NeutralMessage::user("what's the status of order #12345?")],
            vec![invoice_tool()],
        );
        let reply = plan_reply(&request);
        assert_eq!(reply.tool_calls.len(), 1);
        let call = &reply.tool_calls[0];
        assert_eq!(call.name, "InvoiceLookup");
        assert_eq!(call.args["orderId"], "12345");
        assert_eq!(call.id, "call_12345");
    }

    #[test]
    fn no_tool_call_without_the_tool_enabled() {
        let request = request_with(
            vec![NeutralMessage::user("what's the status of order #12345?")],
            vec![],
        );
        let reply = plan_reply(&request);
        assert!(reply.tool_calls.is_empty());
        assert!(!reply.content.is_empty());
    }

    #[test]
    fn short_ids_are_ignored() {
        let request = request_with(
            vec![NeutralMessage::user("my pin is 123")],
            vec![invoice_tool()],
        );
        assert!(plan_reply(&request).tool_calls.is_empty());
    }

    #[test]
    fn tool_followup_produces_natural_language() {
        let tool_turn = NeutralMessage {
            role: ChatRole::Tool,
            content: "{}".to_string(),
            tool_calls: Vec::new(),
            tool_results: vec![ToolResultData {
                id: "call_12345".into(),
                result: Some(serde_json::json!({
                    "orderId": "12345",
                    "status": "SHIPPED",
                    "tracking": "TRK-9000",
                    "items": [{"sku": "A-1"}]
                })),
                error: None,
            }],
        };
        let request = request_with(
            vec![
                NeutralMessage::user("status of order #12345"),
                tool_turn,
                NeutralMessage::user(""),
            ],
            vec![invoice_tool()],
        );
        let reply = plan_reply(&request);
        assert!(reply.tool_calls.is_empty());
        assert!(reply.content.contains("12345"));
        assert!(reply.content.contains("SHIPPED"));
        assert!(reply.content.contains("TRK-9000"));
    }

    #[test]
    fn tool_error_is_reflected_in_the_answer() {
        let tool_turn = NeutralMessage {
            role: ChatRole::Tool,
            content: "{}".to_string(),
            tool_calls: Vec::new(),
            tool_results: vec![ToolResultData {
                id: "call_99999".into(),
                result: None,
                error: Some("Order not found".into()),
            }],
        };
        let request = request_with(
            vec![
                NeutralMessage::user("status of order #99999"),
                tool_turn,
                NeutralMessage::user(""),
            ],
            vec![invoice_tool()],
        );
        let reply = plan_reply(&request);
        assert!(reply.content.contains("Order not found"));
    }
}
