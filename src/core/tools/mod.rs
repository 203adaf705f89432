//! Tool registry
//!
//! Named callable units with typed inputs, declared permissions, and hard
//! timeouts. Every invocation leaves an audit row; a failure to write the
//! audit row never fails the enclosing message.

mod invoice_lookup;

pub use invoice_lookup::InvoiceLookup;

use crate::core::types::{ToolCallData, ToolDescriptor};
use crate::storage::calls::NewToolExecution;
use crate::storage::models::ToolExecStatus;
use crate::storage::Database;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// What data a tool may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAccess {
    None,
    SessionOnly,
    TenantReadonly,
    TenantWrite,
}

/// Declared permissions for a tool
#[derive(Debug, Clone)]
pub struct ToolPermissions {
    pub data_access: DataAccess,
    pub network_access: bool,
    pub estimated_cost_cents: i64,
}

/// Execution bounds for a tool
#[derive(Debug, Clone)]
pub struct ToolLimits {
    pub timeout: Duration,
    pub max_payload_bytes: usize,
}

/// A tool's full declaration
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub permissions: ToolPermissions,
    pub limits: ToolLimits,
}

impl ToolSpec {
    /// The shape advertised to providers
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

/// Result of running a tool's business logic
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Ambient context handed to every execution
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub tenant_id: String,
    pub session_id: String,
    pub correlation_id: String,
}

/// Contract every tool implements
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn execute(&self, args: &Value, ctx: &ToolContext) -> ToolOutcome;
}

/// Observable outcome of one registry invocation
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub status: ToolExecStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub latency_ms: i64,
}

/// Named tool lookup plus the invocation protocol
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Registry preloaded with the built-in tools
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(InvoiceLookup));
        registry
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        self.tools.write().insert(name, tool);
    }

    /// Descriptors for the tools an agent has enabled
    pub fn descriptors_for(&self, enabled: &HashSet<String>) -> Vec<ToolDescriptor> {
        let tools = self.tools.read();
        let mut descriptors: Vec<ToolDescriptor> = tools
            .values()
            .map(|t| t.spec())
            .filter(|spec| enabled.contains(&spec.name))
            .map(|spec| spec.descriptor())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Run one tool call under the invocation protocol and write its audit row
    pub async fn invoke(
        &self,
        db: &Database,
        call: &ToolCallData,
        enabled: &HashSet<String>,
        message_id: Option<&str>,
        ctx: &ToolContext,
    ) -> ToolInvocation {
        let invocation = self.run(call, enabled, ctx).await;
        self.audit(db, call, message_id, ctx, &invocation).await;
        invocation
    }

    async fn run(
        &self,
        call: &ToolCallData,
        enabled: &HashSet<String>,
        ctx: &ToolContext,
    ) -> ToolInvocation {
        let started = Instant::now();

        if !enabled.contains(&call.name) {
            return ToolInvocation {
                status: ToolExecStatus::Failed,
                result: None,
                error: Some(format!("FORBIDDEN: tool '{}' is not enabled for this agent", call.name)),
                latency_ms: 0,
            };
        }

        // Clone the handle out so no lock guard is held across the await
        let tool = { self.tools.read().get(&call.name).cloned() };
        let Some(tool) = tool else {
            return ToolInvocation {
                status: ToolExecStatus::Failed,
                result: None,
                error: Some(format!("NOT_FOUND: no tool named '{}' is registered", call.name)),
                latency_ms: 0,
            };
        };

        let spec = tool.spec();
        let payload_bytes = call.args.to_string().len();
        if payload_bytes > spec.limits.max_payload_bytes {
            return ToolInvocation {
                status: ToolExecStatus::Failed,
                result: None,
                error: Some(format!(
                    "payload of {} bytes exceeds the {}-byte limit",
                    payload_bytes, spec.limits.max_payload_bytes
                )),
                latency_ms: 0,
            };
        }

        match tokio::time::timeout(spec.limits.timeout, tool.execute(&call.args, ctx)).await {
            Ok(outcome) => {
                let latency_ms = started.elapsed().as_millis() as i64;
                if outcome.success {
                    ToolInvocation {
                        status: ToolExecStatus::Success,
                        result: outcome.data,
                        error: None,
                        latency_ms,
                    }
                } else {
                    ToolInvocation {
                        status: ToolExecStatus::Failed,
                        result: None,
                        error: outcome.error,
                        latency_ms,
                    }
                }
            }
            Err(_) => ToolInvocation {
                status: ToolExecStatus::Timeout,
                result: None,
                error: Some(format!(
                    "tool '{}' exceeded its {}ms timeout",
                    call.name,
                    spec.limits.timeout.as_millis()
                )),
                latency_ms: started.elapsed().as_millis() as i64,
            },
        }
    }

    async fn audit(
        &self,
        db: &Database,
        call: &ToolCallData,
        message_id: Option<&str>,
        ctx: &ToolContext,
        invocation: &ToolInvocation,
    ) {
        let cost_cents = if invocation.status == ToolExecStatus::Success {
            self.tools
                .read()
                .get(&call.name)
                .map(|t| t.spec().permissions.estimated_cost_cents)
                .unwrap_or(0)
        } else {
            0
        };

        let record = NewToolExecution {
            session_id: ctx.session_id.clone(),
            message_id: message_id.map(str::to_string),
            correlation_id: ctx.correlation_id.clone(),
            tool_name: call.name.clone(),
            tool_input: call.args.clone(),
            tool_output: invocation.result.clone(),
            status: invocation.status,
            error_message: invocation.error.clone(),
            latency_ms: invocation.latency_ms,
            cost_cents,
        };

        if let Err(e) = db.insert_tool_execution(record).await {
            warn!(
                correlation_id = %ctx.correlation_id,
                tool = %call.name,
                error = %e,
                "failed to write tool execution audit row"
            );
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
