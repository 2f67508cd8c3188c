//! JSONL request log, one file per platform.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use chrono::{SecondsFormat, Utc};
use relay_core::{ContentBlock, Message, ProcessedResponse};
use serde_json::{Map, Value, json};

use super::preview;
use crate::{BackendError, ErrorReport, FileLogConfig, ObservabilityBackend, RequestContext};

/// Appends one JSON object per event to `{dir}/{platform}_requests.jsonl`.
///
/// Payload previews are written only when `include_previews` is set, and
/// thinking content is never written for requests in `ThinkingMode::Exclude`.
#[derive(Debug)]
pub struct FileBackend {
    config: FileLogConfig,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Create the backend, creating the log directory if needed.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn new(config: FileLogConfig) -> Result<Self, BackendError> {
        fs::create_dir_all(&config.dir)?;
        Ok(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Log file for a platform.
    #[must_use]
    pub fn log_path(&self, platform: &str) -> PathBuf {
        self.config.dir.join(format!("{platform}_requests.jsonl"))
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    fn append(&self, ctx: &RequestContext<'_>, event: &str, fields: Value) -> Result<(), BackendError> {
        let mut record = Map::new();
        record.insert(
            "timestamp".into(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert("event".into(), Value::from(event));
        record.insert("request_id".into(), Value::from(ctx.request_id.to_string()));
        record.insert("user_id".into(), Value::from(ctx.config.user_id()));
        record.insert("platform".into(), Value::from(ctx.config.platform()));
        if let Value::Object(fields) = fields {
            record.extend(fields);
        }

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(ctx.config.platform()))?;
        file.write_all(&line)?;
        Ok(())
    }

    fn content_preview(&self, text: &str) -> Option<String> {
        self.config
            .include_previews
            .then(|| preview(text, self.config.content_preview_chars).to_string())
    }

    fn log_block(
        &self,
        ctx: &RequestContext<'_>,
        role: &str,
        sequence: usize,
        block: &ContentBlock,
    ) -> Result<(), BackendError> {
        match block {
            ContentBlock::Text { text } => self.append(
                ctx,
                "text",
                json!({
                    "sequence": sequence,
                    "role": role,
                    "length": text.len(),
                    "content": self.content_preview(text),
                }),
            ),
            ContentBlock::ToolUse { id, name, input } => self.append(
                ctx,
                "tool_use",
                json!({
                    "sequence": sequence,
                    "tool_name": name,
                    "tool_use_id": id,
                    "input": self.config.include_previews.then_some(input),
                }),
            ),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let content = content.as_ref().and_then(|c| match c {
                    Value::String(s) => self.content_preview(s),
                    other => self.content_preview(&other.to_string()),
                });
                self.append(
                    ctx,
                    "tool_result",
                    json!({
                        "sequence": sequence,
                        "tool_use_id": tool_use_id,
                        "is_error": is_error.unwrap_or(false),
                        "content": content,
                    }),
                )
            }
            ContentBlock::Thinking { thinking, .. } => {
                if !ctx.config.thinking_mode().allows_logging() {
                    return Ok(());
                }
                self.append(
                    ctx,
                    "thinking",
                    json!({
                        "sequence": sequence,
                        "length": thinking.len(),
                        "content": self.content_preview(thinking),
                    }),
                )
            }
            ContentBlock::Unsupported => Ok(()),
        }
    }
}

impl ObservabilityBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn on_request_start(&self, ctx: &RequestContext<'_>, prompt: &str) -> Result<(), BackendError> {
        let prompt_preview = self
            .config
            .include_previews
            .then(|| preview(prompt, self.config.prompt_preview_chars));
        self.append(
            ctx,
            "request_start",
            json!({
                "prompt_length": prompt.len(),
                "prompt_preview": prompt_preview,
                "has_session": ctx.config.has_session(),
                "session_id": ctx.config.session_id(),
                "response_mode": ctx.config.response_mode(),
                "thinking_mode": ctx.config.thinking_mode(),
            }),
        )
    }

    fn on_message(
        &self,
        ctx: &RequestContext<'_>,
        message: &Message,
        sequence: usize,
    ) -> Result<(), BackendError> {
        match message {
            Message::Assistant { content, .. } => content
                .iter()
                .try_for_each(|block| self.log_block(ctx, "assistant", sequence, block)),
            Message::User { content } => content
                .iter()
                .try_for_each(|block| self.log_block(ctx, "user", sequence, block)),
            Message::System { subtype, .. } => self.append(
                ctx,
                "system",
                json!({ "sequence": sequence, "subtype": subtype }),
            ),
            Message::Result(result) => {
                let summary = result.result.as_deref().and_then(|r| self.content_preview(r));
                self.append(
                    ctx,
                    "result",
                    json!({
                        "sequence": sequence,
                        "success": !result.is_error,
                        "subtype": result.subtype,
                        "summary": summary,
                        "duration_ms": result.duration_ms,
                        "num_turns": result.num_turns,
                        "session_id": result.session_id,
                        "total_cost_usd": result.total_cost_usd,
                        "usage": result.usage,
                    }),
                )
            }
        }
    }

    fn on_completion(
        &self,
        ctx: &RequestContext<'_>,
        response: &ProcessedResponse,
    ) -> Result<(), BackendError> {
        self.append(
            ctx,
            "request_complete",
            json!({
                "response_length": response.text.len(),
                "tool_uses": response.tool_uses,
                "thinking_blocks_count": response.thinking_blocks.len(),
                "session_id": response.session_id,
                "metrics": response.metrics,
            }),
        )
    }

    fn on_error(&self, ctx: &RequestContext<'_>, error: &ErrorReport) -> Result<(), BackendError> {
        self.append(
            ctx,
            "request_error",
            json!({
                "error_type": error.kind,
                "error_message": error.message,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use relay_core::{ExecutorConfig, ResultMessage, ThinkingMode};
    use tempfile::TempDir;

    use super::*;

    fn backend(dir: &TempDir, include_previews: bool) -> FileBackend {
        FileBackend::new(FileLogConfig {
            enabled: true,
            dir: dir.path().join("logs"),
            include_previews,
            ..FileLogConfig::default()
        })
        .unwrap()
    }

    fn records(backend: &FileBackend, platform: &str) -> Vec<Value> {
        fs::read_to_string(backend.log_path(platform))
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn config(thinking: ThinkingMode) -> ExecutorConfig {
        ExecutorConfig::builder("u1", "telegram")
            .thinking_mode(thinking)
            .build()
            .unwrap()
    }

    #[test]
    fn test_lifecycle_records_without_previews() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, false);
        let config = config(ThinkingMode::Exclude);
        let ctx = RequestContext::new(&config);

        backend.on_request_start(&ctx, "secret prompt").unwrap();
        backend
            .on_message(
                &ctx,
                &Message::assistant(vec![
                    ContentBlock::text("secret answer"),
                    ContentBlock::tool_use("t1", "Bash"),
                ]),
                0,
            )
            .unwrap();
        backend
            .on_message(&ctx, &Message::Result(ResultMessage::success("s1", 42)), 1)
            .unwrap();
        backend
            .on_completion(
                &ctx,
                &ProcessedResponse {
                    text: "secret answer".into(),
                    tool_uses: vec!["Bash".into()],
                    session_id: Some("s1".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let records = records(&backend, "telegram");
        let events: Vec<&str> = records.iter().map(|r| r["event"].as_str().unwrap()).collect();
        assert_eq!(
            events,
            vec!["request_start", "text", "tool_use", "result", "request_complete"]
        );
        assert!(records.iter().all(|r| r["request_id"] == ctx.request_id.to_string()));
        assert_eq!(records[0]["prompt_length"], 13);
        assert!(records[0]["prompt_preview"].is_null());
        assert!(records[1]["content"].is_null());
        assert_eq!(records[2]["tool_name"], "Bash");
        assert_eq!(records[3]["session_id"], "s1");
        assert_eq!(records[4]["tool_uses"], json!(["Bash"]));

        let raw = fs::read_to_string(backend.log_path("telegram")).unwrap();
        assert!(!raw.contains("secret"));
    }

    #[test]
    fn test_previews_are_truncated() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, true);
        let config = config(ThinkingMode::Exclude);
        let ctx = RequestContext::new(&config);

        let prompt = "p".repeat(500);
        backend.on_request_start(&ctx, &prompt).unwrap();

        let records = records(&backend, "telegram");
        assert_eq!(records[0]["prompt_preview"].as_str().unwrap().len(), 200);
    }

    #[test]
    fn test_thinking_logged_only_when_mode_allows() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, true);
        let message = Message::assistant(vec![ContentBlock::thinking("pondering")]);

        let excluded = config(ThinkingMode::Exclude);
        backend
            .on_message(&RequestContext::new(&excluded), &message, 0)
            .unwrap();
        assert!(!backend.log_path("telegram").exists());

        let log_only = config(ThinkingMode::LogOnly);
        backend
            .on_message(&RequestContext::new(&log_only), &message, 0)
            .unwrap();
        let records = records(&backend, "telegram");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["event"], "thinking");
        assert_eq!(records[0]["content"], "pondering");
    }

    #[test]
    fn test_error_record() {
        let dir = TempDir::new().unwrap();
        let backend = backend(&dir, false);
        let config = ExecutorConfig::builder("u2", "api").build().unwrap();
        backend
            .on_error(&RequestContext::new(&config), &ErrorReport::new("spawn", "no such file"))
            .unwrap();

        let records = records(&backend, "api");
        assert_eq!(records[0]["event"], "request_error");
        assert_eq!(records[0]["error_type"], "spawn");
        assert_eq!(records[0]["user_id"], "u2");
    }
}
