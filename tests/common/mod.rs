//! Shared test fixtures: a scriptable stub LLM and config/context builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reviewd::config::DaemonConfig;
use reviewd::llm::{CallOptions, LlmClient, LlmError, LlmErrorKind};
use reviewd::models::{ParsedDiff, ReviewConfig, ReviewContext};

/// Scriptable in-process LLM. Replies are keyed by agent id; unscripted
/// agents answer `[]`. Optionally delays or fails specific agents, and
/// records every invocation for assertions.
pub struct StubLlm {
    replies: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    failures: HashMap<String, LlmErrorKind>,
    pub calls: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn new() -> Self {
        Self {
            replies: HashMap::new(),
            delays: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Stub every analyzer with an empty findings array.
    pub fn silent() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn with_reply(mut self, agent_id: &str, reply: &str) -> Self {
        self.replies.insert(agent_id.to_string(), reply.to_string());
        self
    }

    pub fn with_delay(mut self, agent_id: &str, delay: Duration) -> Self {
        self.delays.insert(agent_id.to_string(), delay);
        self
    }

    pub fn with_failure(mut self, agent_id: &str, kind: LlmErrorKind) -> Self {
        self.failures.insert(agent_id.to_string(), kind);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmClient for StubLlm {
    async fn invoke(
        &self,
        agent_id: &str,
        _system_prompt: &str,
        _user_prompt: &str,
        _opts: &CallOptions,
    ) -> Result<String, LlmError> {
        self.calls.lock().unwrap().push(agent_id.to_string());

        if let Some(delay) = self.delays.get(agent_id) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(kind) = self.failures.get(agent_id) {
            return Err(LlmError::new(*kind, "stubbed failure"));
        }
        Ok(self
            .replies
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| "[]".to_string()))
    }
}

/// Daemon config tuned for tests: tiny timeouts, temp-friendly defaults.
pub fn test_config() -> DaemonConfig {
    let mut config = DaemonConfig::new(
        "127.0.0.1".to_string(),
        0,
        Some(std::env::temp_dir().join("reviewd-test")),
        "warn".to_string(),
    );
    config.analyzer_timeout = Duration::from_secs(5);
    config.review_timeout = Duration::from_secs(10);
    config
}

pub fn context_for(diff: ParsedDiff, config: ReviewConfig) -> Arc<ReviewContext> {
    Arc::new(ReviewContext {
        diff,
        config,
        metadata: None,
    })
}

/// A one-file, three-added-lines Python diff.
pub const SIMPLE_DIFF: &str = "\
diff --git a/app.py b/app.py
index 1111111..2222222 100644
--- a/app.py
+++ b/app.py
@@ -1,2 +1,5 @@
 import os
+def load(path):
+    with open(path) as f:
+        return f.read()
 print(\"ready\")
";

/// A Python diff adding a SQL string concatenation on line 2.
pub const SQL_INJECTION_DIFF: &str = "\
diff --git a/db.py b/db.py
index 1111111..2222222 100644
--- a/db.py
+++ b/db.py
@@ -1,1 +1,2 @@
 import sqlite3
+query = \"SELECT * FROM u WHERE id=\" + uid
";
