//! Built-in workspace tools.
//!
//! Every path argument is resolved against the workspace root and rejected
//! when its canonical form escapes that root.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use agent_provider::{is_cancelled, CancelSignal, ToolArguments};
use async_trait::async_trait;
use memory_journal::MemoryJournal;
use serde_json::{json, Value};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::{PermissionGroup, ToolDefinition, ToolError, ToolHandler, ToolRegistry};

const DEFAULT_COMMAND_TIMEOUT_SEC: u64 = 30;
const DEFAULT_COMMAND_MAX_OUTPUT_BYTES: usize = 100 * 1024;
const DEFAULT_READ_MAX_BYTES: usize = 200 * 1024;
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);
const EMPTY_DIRECTORY: &str = "(empty directory)";

/// Canonical workspace root plus the limits the built-in tools apply.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    command_timeout: Duration,
    command_max_output_bytes: usize,
    read_max_bytes: usize,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, String> {
        let root = root.into();
        let canonical_root = root
            .canonicalize()
            .map_err(|err| format!("Failed to resolve workspace root: {err}"))?;

        if !canonical_root.is_dir() {
            return Err("Workspace root must be a directory".to_string());
        }

        Ok(Self {
            root: canonical_root,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SEC),
            command_max_output_bytes: DEFAULT_COMMAND_MAX_OUTPUT_BYTES,
            read_max_bytes: DEFAULT_READ_MAX_BYTES,
        })
    }

    #[must_use]
    pub fn with_read_max_bytes(mut self, max_bytes: usize) -> Self {
        self.read_max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn list_directory(&self, path: &str) -> Result<String, ToolError> {
        let resolved = self.resolve_existing_path(path)?;
        if !resolved.is_dir() {
            return Err(ToolError::failed(format!(
                "Not a directory: {}",
                self.relative_display(&resolved)
            )));
        }

        let entries = fs::read_dir(&resolved).map_err(|error| {
            ToolError::failed(format!(
                "Failed to list directory {}: {error}",
                resolved.display()
            ))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| {
                ToolError::failed(format!("Failed to read directory entry: {error}"))
            })?;
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        if names.is_empty() {
            return Ok(EMPTY_DIRECTORY.to_string());
        }
        Ok(names.join("\n"))
    }

    fn read_file(&self, path: &str) -> Result<String, ToolError> {
        let resolved = self.resolve_existing_path(path)?;
        let bytes = fs::read(&resolved).map_err(|error| {
            ToolError::failed(format!("Failed to read file {}: {error}", resolved.display()))
        })?;

        if bytes.len() > self.read_max_bytes {
            return Err(ToolError::failed(format!(
                "File exceeds max read size ({} bytes > {} bytes)",
                bytes.len(),
                self.read_max_bytes
            )));
        }

        String::from_utf8(bytes)
            .map_err(|_| ToolError::failed("File is not valid UTF-8 text"))
    }

    fn write_file(&self, path: &str, content: &str) -> Result<String, ToolError> {
        let resolved = self.resolve_write_path(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).map_err(|error| {
                ToolError::failed(format!(
                    "Failed to create parent directories {}: {error}",
                    parent.display()
                ))
            })?;

            let canonical_parent = parent.canonicalize().map_err(|error| {
                ToolError::failed(format!(
                    "Failed to resolve write parent {}: {error}",
                    parent.display()
                ))
            })?;
            self.ensure_inside_workspace(&canonical_parent)?;
        }

        fs::write(&resolved, content).map_err(|error| {
            ToolError::failed(format!("Failed to write file {}: {error}", resolved.display()))
        })?;

        Ok(format!(
            "Wrote {} bytes to {}",
            content.len(),
            self.relative_display(&resolved)
        ))
    }

    fn edit_file(&self, path: &str, old_text: &str, new_text: &str) -> Result<String, ToolError> {
        if old_text.is_empty() {
            return Err(ToolError::InvalidArguments(
                "old_text must not be empty".to_string(),
            ));
        }

        let resolved = self.resolve_existing_path(path)?;
        let current = fs::read_to_string(&resolved).map_err(|error| {
            ToolError::failed(format!("Failed to read file {}: {error}", resolved.display()))
        })?;

        let occurrences = current.match_indices(old_text).count();
        if occurrences != 1 {
            return Err(ToolError::failed(format!(
                "edit_file requires exactly one match; found {occurrences}"
            )));
        }

        let updated = current.replacen(old_text, new_text, 1);
        fs::write(&resolved, updated).map_err(|error| {
            ToolError::failed(format!("Failed to write file {}: {error}", resolved.display()))
        })?;

        Ok(format!("Updated {}", self.relative_display(&resolved)))
    }

    /// Runs `bash -lc <command>`, polling `cancel` while the child is alive.
    fn run_command(
        &self,
        command: &str,
        timeout: Option<Duration>,
        cwd: Option<&str>,
        cancel: &CancelSignal,
    ) -> Result<String, ToolError> {
        let timeout = timeout.unwrap_or(self.command_timeout);
        let mut builder = Command::new("bash");
        builder
            .arg("-lc")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(cwd) = cwd {
            let cwd_path = self
                .resolve_existing_path(cwd)
                .map_err(|error| ToolError::failed(format!("Invalid command cwd: {error}")))?;
            if !cwd_path.is_dir() {
                return Err(ToolError::failed(
                    "Invalid command cwd: expected a directory",
                ));
            }
            builder.current_dir(cwd_path);
        }

        let mut child = builder.spawn().map_err(|error| {
            ToolError::failed(format!("Failed to launch command: {error}"))
        })?;
        let stdout = drain_pipe(child.stdout.take());
        let stderr = drain_pipe(child.stderr.take());

        let started = Instant::now();
        let (timed_out, status) = loop {
            if is_cancelled(cancel) {
                let _ = child.kill();
                let _ = child.wait();
                debug!(command, "command cancelled");
                return Err(ToolError::Cancelled);
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                let _ = child.kill();
                let status = child.wait().map_err(|error| {
                    ToolError::failed(format!(
                        "Command timed out after {}s and wait failed: {error}",
                        timeout.as_secs()
                    ))
                })?;
                break (true, status);
            }

            let slice = (timeout - elapsed).min(CANCEL_POLL_INTERVAL);
            match child.wait_timeout(slice) {
                Ok(Some(status)) => break (false, status),
                Ok(None) => continue,
                Err(error) => {
                    let _ = child.kill();
                    return Err(ToolError::failed(format!(
                        "Failed waiting for command: {error}"
                    )));
                }
            }
        };

        let stdout = join_pipe(stdout);
        let stderr = join_pipe(stderr);
        let status_label = if timed_out {
            warn!(command, timeout_secs = timeout.as_secs(), "command timed out");
            format!("timeout after {}s", timeout.as_secs())
        } else {
            format_exit_status(status)
        };

        let content = format!(
            "status: {status_label}\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&stdout),
            String::from_utf8_lossy(&stderr)
        );
        Ok(truncate_to_byte_limit(content, self.command_max_output_bytes))
    }

    fn resolve_existing_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "path must not be empty".to_string(),
            ));
        }

        let candidate = self.absolute_candidate(path);
        let canonical = candidate.canonicalize().map_err(|error| {
            ToolError::failed(format!(
                "Failed to resolve path {}: {error}",
                candidate.display()
            ))
        })?;

        self.ensure_inside_workspace(&canonical)?;
        Ok(canonical)
    }

    fn resolve_write_path(&self, path: &str) -> Result<PathBuf, ToolError> {
        if path.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "path must not be empty".to_string(),
            ));
        }

        let candidate = self.absolute_candidate(path);
        let parent = candidate.parent().ok_or_else(|| {
            ToolError::failed(format!(
                "Path {} has no parent directory and cannot be written safely",
                candidate.display()
            ))
        })?;

        let anchor = canonicalize_existing_ancestor(parent)?;
        self.ensure_inside_workspace(&anchor)?;
        Ok(candidate)
    }

    fn absolute_candidate(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn ensure_inside_workspace(&self, canonical_path: &Path) -> Result<(), ToolError> {
        if canonical_path.starts_with(&self.root) {
            Ok(())
        } else {
            Err(ToolError::failed(format!(
                "Path escapes workspace root: {}",
                canonical_path.display()
            )))
        }
    }

    fn relative_display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) if relative.as_os_str().is_empty() => ".".to_string(),
            Ok(relative) => relative.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

struct ListDirectory(Arc<Workspace>);
struct ReadFile(Arc<Workspace>);
struct WriteFile(Arc<Workspace>);
struct EditFile(Arc<Workspace>);
struct RunCommand(Arc<Workspace>);
struct SaveLearning(Arc<MemoryJournal>);

#[async_trait]
impl ToolHandler for ListDirectory {
    async fn call(
        &self,
        args: &ToolArguments,
        _cancel: &CancelSignal,
    ) -> Result<String, ToolError> {
        let path = optional_str(args, "path")?.unwrap_or(".");
        self.0.list_directory(path)
    }
}

#[async_trait]
impl ToolHandler for ReadFile {
    async fn call(
        &self,
        args: &ToolArguments,
        _cancel: &CancelSignal,
    ) -> Result<String, ToolError> {
        self.0.read_file(required_str(args, "path")?)
    }
}

#[async_trait]
impl ToolHandler for WriteFile {
    async fn call(
        &self,
        args: &ToolArguments,
        _cancel: &CancelSignal,
    ) -> Result<String, ToolError> {
        self.0.write_file(required_str(args, "path")?, required_str(args, "content")?)
    }
}

#[async_trait]
impl ToolHandler for EditFile {
    async fn call(
        &self,
        args: &ToolArguments,
        _cancel: &CancelSignal,
    ) -> Result<String, ToolError> {
        self.0.edit_file(
            required_str(args, "path")?,
            required_str(args, "old_text")?,
            required_str(args, "new_text")?,
        )
    }
}

#[async_trait]
impl ToolHandler for RunCommand {
    async fn call(
        &self,
        args: &ToolArguments,
        cancel: &CancelSignal,
    ) -> Result<String, ToolError> {
        let command = required_str(args, "command")?.to_string();
        let timeout = optional_u64(args, "timeout_sec")?.map(Duration::from_secs);
        let cwd = optional_str(args, "cwd")?.map(str::to_string);
        let workspace = Arc::clone(&self.0);
        let cancel = Arc::clone(cancel);

        tokio::task::spawn_blocking(move || {
            workspace.run_command(&command, timeout, cwd.as_deref(), &cancel)
        })
        .await
        .map_err(|error| ToolError::failed(format!("Command task failed: {error}")))?
    }
}

#[async_trait]
impl ToolHandler for SaveLearning {
    async fn call(
        &self,
        args: &ToolArguments,
        _cancel: &CancelSignal,
    ) -> Result<String, ToolError> {
        let text = required_str(args, "text")?;
        let line = self
            .0
            .append(text)
            .map_err(|error| ToolError::failed(error.to_string()))?;
        Ok(format!("Saved learning: {line}"))
    }
}

/// Registers the workspace tools plus `save_learning` backed by `journal`.
pub fn register_builtin_tools(
    registry: &mut ToolRegistry,
    workspace: Workspace,
    journal: MemoryJournal,
) {
    let workspace = Arc::new(workspace);

    registry.register(ToolDefinition::new(
        "list_directory",
        "List the entries of a directory inside the workspace. Directories end with '/'.",
        object_schema(
            json!({
                "path": {
                    "type": "string",
                    "description": "Directory path, relative to the workspace root. Defaults to '.'."
                }
            }),
            &[],
        ),
        PermissionGroup::None,
        ListDirectory(Arc::clone(&workspace)),
    ));
    registry.register(ToolDefinition::new(
        "read_file",
        "Read a UTF-8 text file inside the workspace.",
        object_schema(
            json!({
                "path": {
                    "type": "string",
                    "description": "File path, relative to the workspace root."
                }
            }),
            &["path"],
        ),
        PermissionGroup::Read,
        ReadFile(Arc::clone(&workspace)),
    ));
    registry.register(ToolDefinition::new(
        "write_file",
        "Create or overwrite a file inside the workspace, creating parent directories.",
        object_schema(
            json!({
                "path": {"type": "string"},
                "content": {"type": "string"}
            }),
            &["path", "content"],
        ),
        PermissionGroup::Write,
        WriteFile(Arc::clone(&workspace)),
    ));
    registry.register(ToolDefinition::new(
        "edit_file",
        "Replace exactly one occurrence of old_text with new_text in an existing file.",
        object_schema(
            json!({
                "path": {"type": "string"},
                "old_text": {"type": "string"},
                "new_text": {"type": "string"}
            }),
            &["path", "old_text", "new_text"],
        ),
        PermissionGroup::Write,
        EditFile(Arc::clone(&workspace)),
    ));
    registry.register(ToolDefinition::new(
        "run_command",
        "Run a shell command with bash -lc in the workspace and return its status and output.",
        object_schema(
            json!({
                "command": {"type": "string"},
                "timeout_sec": {"type": "integer", "minimum": 1},
                "cwd": {"type": "string", "description": "Working directory inside the workspace."}
            }),
            &["command"],
        ),
        PermissionGroup::Write,
        RunCommand(workspace),
    ));
    registry.register(ToolDefinition::new(
        "save_learning",
        "Save a short, durable learning about this project for future sessions.",
        object_schema(json!({"text": {"type": "string"}}), &["text"]),
        PermissionGroup::None,
        SaveLearning(Arc::new(journal)),
    ));
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

fn required_str<'a>(args: &'a ToolArguments, key: &str) -> Result<&'a str, ToolError> {
    optional_str(args, key)?
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing string argument '{key}'")))
}

fn optional_str<'a>(args: &'a ToolArguments, key: &str) -> Result<Option<&'a str>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.as_str())),
        Some(_) => Err(ToolError::InvalidArguments(format!(
            "argument '{key}' must be a string"
        ))),
    }
}

fn optional_u64(args: &ToolArguments, key: &str) -> Result<Option<u64>, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .filter(|value| *value > 0)
            .map(Some)
            .ok_or_else(|| {
                ToolError::InvalidArguments(format!("argument '{key}' must be a positive integer"))
            }),
    }
}

fn drain_pipe(pipe: Option<impl Read + Send + 'static>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            bytes
        })
    })
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn truncate_to_byte_limit(content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !content.is_char_boundary(cutoff) {
        cutoff -= 1;
    }

    let mut truncated = content[..cutoff].to_string();
    truncated.push_str("\n[truncated]");
    truncated
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf, ToolError> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor.canonicalize().map_err(|error| {
                ToolError::failed(format!(
                    "Failed to resolve path {}: {error}",
                    ancestor.display()
                ))
            });
        }
    }

    Err(ToolError::failed(format!(
        "No existing ancestor found for path {}",
        path.display()
    )))
}

fn format_exit_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit_code={code}"),
        None => "exit_code=terminated_by_signal".to_string(),
    }
}
