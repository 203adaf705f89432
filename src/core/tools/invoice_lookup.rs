//! Invoice lookup tool
//!
//! Resolves an order id or invoice number against a fixed order table.

use super::{DataAccess, Tool, ToolContext, ToolLimits, ToolOutcome, ToolPermissions, ToolSpec};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

static ORDERS: Lazy<HashMap<&'static str, Value>> = Lazy::new(|| {
    HashMap::from([
        (
            "12345",
            json!({
                "orderId": "12345",
                "invoiceNumber": "INV-12345",
                "status": "SHIPPED",
                "tracking": "TRK-842917",
                "items": [
                    { "sku": "WB-200", "name": "Wireless headphones", "quantity": 1 },
                    { "sku": "CB-011", "name": "USB-C cable", "quantity": 2 }
                ],
                "totalCents": 15999
            }),
        ),
        (
            "67890",
            json!({
                "orderId": "67890",
                "invoiceNumber": "INV-67890",
                "status": "PROCESSING",
                "tracking": null,
                "items": [
                    { "sku": "KB-550", "name": "Mechanical keyboard", "quantity": 1 }
                ],
                "totalCents": 8950
            }),
        ),
        (
            "24680",
            json!({
                "orderId": "24680",
                "invoiceNumber": "INV-24680",
                "status": "DELIVERED",
                "tracking": "TRK-118204",
                "items": [
                    { "sku": "MS-320", "name": "Vertical mouse", "quantity": 1 }
                ],
                "totalCents": 4599
            }),
        ),
    ])
});

/// Order lookup against the static table
pub struct InvoiceLookup;

#[async_trait]
impl Tool for InvoiceLookup {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "InvoiceLookup".to_string(),
            description: "Look up an order's status, tracking, and line items by order id or invoice number".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "orderId": {
                        "type": "string",
                        "description": "Numeric order id, e.g. 12345"
                    },
                    "invoiceNumber": {
                        "type": "string",
                        "description": "Invoice number, e.g. INV-12345"
                    }
                },
                "oneOf": [
                    { "required": ["orderId"] },
                    { "required": ["invoiceNumber"] }
                ]
            }),
            permissions: ToolPermissions {
                data_access: DataAccess::TenantReadonly,
                network_access: false,
                estimated_cost_cents: 0,
            },
            limits: ToolLimits {
                timeout: Duration::from_secs(5),
                max_payload_bytes: 4096,
            },
        }
    }

    async fn execute(&self, args: &Value, _ctx: &ToolContext) -> ToolOutcome {
        let order_id = args.get("orderId").and_then(|v| v.as_str());
        let invoice_number = args.get("invoiceNumber").and_then(|v| v.as_str());

        let key = match (order_id, invoice_number) {
            (Some(id), None) => id.to_string(),
            (None, Some(invoice)) => invoice.trim_start_matches("INV-").to_string(),
            (Some(_), Some(_)) => {
                return ToolOutcome::failure("Provide orderId or invoiceNumber, not both")
            }
            (None, None) => {
                return ToolOutcome::failure("Either orderId or invoiceNumber is required")
            }
        };

        match ORDERS.get(key.as_str()) {
            Some(order) => ToolOutcome::success(order.clone()),
            None => ToolOutcome::failure("Order not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext {
            tenant_id: "t1".into(),
            session_id: "s1".into(),
            correlation_id: "c1".into(),
        }
    }

    #[tokio::test]
    async fn known_order_resolves() {
        let outcome = InvoiceLookup
            .execute(&json!({"orderId": "12345"}), &ctx())
            .await;
        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["status"], "SHIPPED");
        assert_eq!(data["tracking"], "TRK-842917");
    }

    #[tokio::test]
    async fn invoice_number_resolves_the_same_order() {
        let outcome = InvoiceLookup
            .execute(&json!({"invoiceNumber": "INV-67890"}), &ctx())
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.data.unwrap()["orderId"], "67890");
    }

    #[tokio::test]
    async fn unknown_order_is_a_clean_failure() {
        let outcome = InvoiceLookup
            .execute(&json!({"orderId": "99999"}), &ctx())
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Order not found"));
    }

    #[tokio::test]
    async fn both_selectors_rejected() {
        let outcome = InvoiceLookup
            .execute(&json!({"orderId": "12345", "invoiceNumber": "INV-12345"}), &ctx())
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn missing_selectors_rejected() {
        let outcome = InvoiceLookup.execute(&json!({}), &ctx()).await;
        assert!(!outcome.success);
    }
}
