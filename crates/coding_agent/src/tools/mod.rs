//! Tool registry with permission gating.
//!
//! Tools are resolved by name at call time. Whether a call needs human
//! confirmation is decided from the tool's [`PermissionGroup`] and the
//! session's current [`PermissionLevel`], both read when `execute` runs.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use agent_provider::{CancelSignal, ToolArguments, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod builtin;

/// Result string returned when the user rejects a gated call.
pub const DECLINED_MESSAGE: &str = "User declined to run this tool.";

/// Classification used to decide confirmation requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionGroup {
    Read,
    Write,
    /// Never gated.
    None,
}

impl PermissionGroup {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::None => "none",
        }
    }
}

/// Session-wide confirmation policy, changeable at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PermissionLevel {
    #[default]
    WriteOnly,
    ReadAndWrite,
    AutoAccept,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 3] = [Self::WriteOnly, Self::ReadAndWrite, Self::AutoAccept];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteOnly => "write-only",
            Self::ReadAndWrite => "read-and-write",
            Self::AutoAccept => "auto-accept",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| {
                format!(
                    "unknown permission level '{trimmed}'; expected one of: write-only, read-and-write, auto-accept"
                )
            })
    }
}

/// Whether a call in `group` needs confirmation under `level`.
#[must_use]
pub fn requires_confirmation(group: PermissionGroup, level: PermissionLevel) -> bool {
    match (level, group) {
        (_, PermissionGroup::None) => false,
        (PermissionLevel::AutoAccept, _) => false,
        (PermissionLevel::WriteOnly, PermissionGroup::Write) => true,
        (PermissionLevel::WriteOnly, PermissionGroup::Read) => false,
        (PermissionLevel::ReadAndWrite, PermissionGroup::Read | PermissionGroup::Write) => true,
    }
}

/// Failure raised by a tool handler or a confirmation handler.
///
/// `Cancelled` propagates out of the registry; every other variant is turned
/// into a result string the model can read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("cancelled")]
    Cancelled,
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Cancellation observed while executing a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("tool execution was cancelled")]
pub struct Cancelled;

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: &ToolArguments, cancel: &CancelSignal) -> Result<String, ToolError>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnTool<F> {
    f: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(ToolArguments, CancelSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ToolError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(ToolArguments, CancelSignal) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, ToolError>> + Send,
{
    async fn call(&self, args: &ToolArguments, cancel: &CancelSignal) -> Result<String, ToolError> {
        (self.f)(args.clone(), Arc::clone(cancel)).await
    }
}

/// Decides whether a gated tool call may run.
#[async_trait]
pub trait ConfirmationHandler: Send + Sync {
    async fn confirm(
        &self,
        tool_name: &str,
        args: &ToolArguments,
        cancel: &CancelSignal,
    ) -> Result<bool, ToolError>;
}

/// Adapts a synchronous closure into a [`ConfirmationHandler`].
pub struct FnConfirmation<F> {
    f: F,
}

impl<F> FnConfirmation<F>
where
    F: Fn(&str, &ToolArguments) -> Result<bool, ToolError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ConfirmationHandler for FnConfirmation<F>
where
    F: Fn(&str, &ToolArguments) -> Result<bool, ToolError> + Send + Sync,
{
    async fn confirm(
        &self,
        tool_name: &str,
        args: &ToolArguments,
        _cancel: &CancelSignal,
    ) -> Result<bool, ToolError> {
        (self.f)(tool_name, args)
    }
}

/// Caller-owned permission state shared with the registry.
///
/// Both fields are read on every `execute`, so changes apply to the next call
/// that has not started yet.
#[derive(Default)]
pub struct SessionPolicy {
    level: Mutex<PermissionLevel>,
    confirmation: Mutex<Option<Arc<dyn ConfirmationHandler>>>,
}

impl SessionPolicy {
    #[must_use]
    pub fn new(level: PermissionLevel) -> Self {
        Self {
            level: Mutex::new(level),
            confirmation: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn shared(level: PermissionLevel) -> Arc<Self> {
        Arc::new(Self::new(level))
    }

    #[must_use]
    pub fn level(&self) -> PermissionLevel {
        *lock_unpoisoned(&self.level)
    }

    pub fn set_level(&self, level: PermissionLevel) {
        *lock_unpoisoned(&self.level) = level;
        info!(level = level.as_str(), "permission level changed");
    }

    pub fn set_confirmation_handler(&self, handler: Option<Arc<dyn ConfirmationHandler>>) {
        *lock_unpoisoned(&self.confirmation) = handler;
    }

    #[must_use]
    pub fn confirmation_handler(&self) -> Option<Arc<dyn ConfirmationHandler>> {
        lock_unpoisoned(&self.confirmation).clone()
    }
}

impl fmt::Debug for SessionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPolicy")
            .field("level", &self.level())
            .field("has_confirmation", &self.confirmation_handler().is_some())
            .finish()
    }
}

/// One registered tool.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub group: PermissionGroup,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        group: PermissionGroup,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            group,
            handler: Arc::new(handler),
        }
    }

    #[must_use]
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Name-keyed tool table; listing follows first registration order.
#[derive(Debug)]
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, ToolDefinition>,
    policy: Arc<SessionPolicy>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(policy: Arc<SessionPolicy>) -> Self {
        Self {
            order: Vec::new(),
            tools: HashMap::new(),
            policy,
        }
    }

    /// Registers `definition`, replacing any tool with the same name in place.
    pub fn register(&mut self, definition: ToolDefinition) {
        if !self.tools.contains_key(&definition.name) {
            self.order.push(definition.name.clone());
        }
        self.tools.insert(definition.name.clone(), definition);
    }

    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(ToolDefinition::schema)
            .collect()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn policy(&self) -> &Arc<SessionPolicy> {
        &self.policy
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Runs one tool call and returns the model-facing result string.
    ///
    /// Only cancellation is reported as an error. Unknown tools, declined
    /// confirmations and handler failures all become result strings.
    pub async fn execute(
        &self,
        name: &str,
        args: &ToolArguments,
        cancel: &CancelSignal,
    ) -> Result<String, Cancelled> {
        let Some(definition) = self.tools.get(name) else {
            warn!(tool = name, "model requested unknown tool");
            return Ok(format!("Error: unknown tool '{name}'"));
        };

        let level = self.policy.level();
        if requires_confirmation(definition.group, level) {
            let Some(confirmation) = self.policy.confirmation_handler() else {
                warn!(
                    tool = name,
                    level = level.as_str(),
                    "confirmation required but no handler installed; declining"
                );
                return Ok(DECLINED_MESSAGE.to_string());
            };

            match confirmation.confirm(name, args, cancel).await {
                Ok(true) => debug!(tool = name, "tool call approved"),
                Ok(false) => {
                    info!(tool = name, "tool call declined");
                    return Ok(DECLINED_MESSAGE.to_string());
                }
                Err(ToolError::Cancelled) => return Err(Cancelled),
                Err(error) => {
                    warn!(tool = name, %error, "confirmation handler failed");
                    return Ok(format!("Error: {error}"));
                }
            }
        }

        match definition.handler.call(args, cancel).await {
            Ok(output) => Ok(output),
            Err(ToolError::Cancelled) => Err(Cancelled),
            Err(error) => {
                debug!(tool = name, %error, "tool handler failed");
                Ok(format!("Error: {error}"))
            }
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
