#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agent_provider::{ToolArguments, ToolCall};
use coding_agent::tools::{
    FnTool, PermissionGroup, PermissionLevel, SessionPolicy, ToolDefinition, ToolRegistry,
};
use serde_json::{json, Value};

pub fn args(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap_or_default()
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, args(arguments))
}

pub fn registry(level: PermissionLevel) -> (Arc<SessionPolicy>, ToolRegistry) {
    let policy = SessionPolicy::shared(level);
    let registry = ToolRegistry::new(Arc::clone(&policy));
    (policy, registry)
}

/// Tool that counts invocations and records the arguments it saw.
#[derive(Clone, Default)]
pub struct Probe {
    pub calls: Arc<AtomicUsize>,
    pub seen: Arc<Mutex<Vec<ToolArguments>>>,
}

impl Probe {
    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<ToolArguments> {
        self.seen.lock().expect("probe lock").clone()
    }

    pub fn definition(&self, name: &str, group: PermissionGroup, output: &str) -> ToolDefinition {
        let probe = self.clone();
        let output = output.to_string();
        ToolDefinition::new(
            name,
            format!("{name} probe"),
            json!({"type": "object", "properties": {}}),
            group,
            FnTool::new(move |arguments: ToolArguments, _cancel| {
                let probe = probe.clone();
                let output = output.clone();
                async move {
                    probe.calls.fetch_add(1, Ordering::SeqCst);
                    probe.seen.lock().expect("probe lock").push(arguments);
                    Ok(output)
                }
            }),
        )
    }
}
