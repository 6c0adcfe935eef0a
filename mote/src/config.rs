//! Ambient run configuration snapshot (for logging and `/api/v1/config`).
//!
//! [`EngineConfig`] holds the knobs the orchestrator, run queue, and compactor
//! read at run time. This module does not load files: values are set by the
//! embedder and exposed as a [`RunConfigSummary`]
//! the way the teacher's `config::summary` exposes LLM/memory/tool sections.

use std::io::Write;

use crate::compactor::CompactionConfig;

/// One labeled block of config for display (e.g. to stderr when verbose, or
/// serialized for `/api/v1/config`). No secrets: only knobs that are safe to log.
pub trait ConfigSection: Send + Sync {
    /// Section label, e.g. `"orchestrator"`, `"queue"`, `"compaction"`.
    fn section_name(&self) -> &str;
    /// Key-value pairs, in display order.
    fn entries(&self) -> Vec<(&'static str, String)>;
    /// Prints one line to stderr: `[section_name] k1=v1 k2=v2 ...`. Best-effort.
    fn print_to_stderr(&self) {
        let entries: Vec<String> = self
            .entries()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        let _ = writeln!(
            std::io::stderr(),
            "[{}] {}",
            self.section_name(),
            entries.join(" ")
        );
        let _ = std::io::stderr().flush();
    }
}

/// Orchestrator loop knobs: iteration bound, retry backoff, tool-error bound.
#[derive(Clone, Debug)]
pub struct OrchestratorConfigSummary {
    pub max_iterations: u32,
    pub retry_backoff_secs: Vec<u64>,
    pub max_consecutive_tool_errors: u32,
}

impl ConfigSection for OrchestratorConfigSummary {
    fn section_name(&self) -> &str {
        "orchestrator"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("max_iterations", self.max_iterations.to_string()),
            (
                "retry_backoff_secs",
                format!("{:?}", self.retry_backoff_secs),
            ),
            (
                "max_consecutive_tool_errors",
                self.max_consecutive_tool_errors.to_string(),
            ),
        ]
    }
}

/// Run queue knobs: per-session queue capacity and idle-worker timeout.
#[derive(Clone, Debug)]
pub struct QueueConfigSummary {
    pub queue_capacity: usize,
    pub idle_timeout_secs: u64,
}

impl ConfigSection for QueueConfigSummary {
    fn section_name(&self) -> &str {
        "queue"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("queue_capacity", self.queue_capacity.to_string()),
            ("idle_timeout_secs", self.idle_timeout_secs.to_string()),
        ]
    }
}

/// Compaction knobs, reusing [`CompactionConfig`]'s field names.
#[derive(Clone, Debug)]
pub struct CompactionConfigSummary(pub CompactionConfig);

impl ConfigSection for CompactionConfigSummary {
    fn section_name(&self) -> &str {
        "compaction"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let c = &self.0;
        vec![
            ("auto", c.auto.to_string()),
            ("prune", c.prune.to_string()),
            ("max_context_tokens", c.max_context_tokens.to_string()),
            ("reserve_tokens", c.reserve_tokens.to_string()),
            ("prune_keep_tokens", c.prune_keep_tokens.to_string()),
            ("compact_keep_recent", c.compact_keep_recent.to_string()),
        ]
    }
}

/// Session cache knobs: in-memory LRU capacity.
#[derive(Clone, Debug)]
pub struct SessionCacheConfigSummary {
    pub cache_capacity: usize,
}

impl ConfigSection for SessionCacheConfigSummary {
    fn section_name(&self) -> &str {
        "session_cache"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        vec![("cache_capacity", self.cache_capacity.to_string())]
    }
}

/// Aggregated config summary, printed/serialized in a fixed section order.
#[derive(Default)]
pub struct RunConfigSummary {
    sections: Vec<Box<dyn ConfigSection>>,
}

impl RunConfigSummary {
    pub fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    pub fn with_section(mut self, s: Box<dyn ConfigSection>) -> Self {
        self.sections.push(s);
        self
    }

    pub fn sections(&self) -> &[Box<dyn ConfigSection>] {
        &self.sections
    }

    pub fn print_to_stderr(&self) {
        for s in &self.sections {
            s.print_to_stderr();
        }
    }

    /// Flattens all sections into a JSON object keyed by section name, for
    /// `/api/v1/config`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for s in &self.sections {
            let mut entries = serde_json::Map::new();
            for (k, v) in s.entries() {
                entries.insert(k.to_string(), serde_json::Value::String(v));
            }
            obj.insert(s.section_name().to_string(), serde_json::Value::Object(entries));
        }
        serde_json::Value::Object(obj)
    }
}

/// Top-level engine configuration. Construct with [`EngineConfig::default`] and
/// override fields directly; there is no file format to parse.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub retry_backoff_secs: Vec<u64>,
    pub max_consecutive_tool_errors: u32,
    pub queue_capacity: usize,
    pub idle_timeout_secs: u64,
    pub session_cache_capacity: usize,
    pub compaction: CompactionConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            retry_backoff_secs: vec![10, 20],
            max_consecutive_tool_errors: 3,
            queue_capacity: 64,
            idle_timeout_secs: 300,
            session_cache_capacity: 512,
            compaction: CompactionConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Builds config from environment variables, falling back to
    /// [`EngineConfig::default`] per field when unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse_u64 =
            |key: &str, default: u64| std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default);
        let parse_u32 =
            |key: &str, default: u32| std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default);
        let parse_usize = |key: &str, default: usize| {
            std::env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
        };
        let retry_backoff_secs = std::env::var("MOTE_RETRY_BACKOFF_SECS")
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|part| part.trim().parse().ok())
                    .collect::<Vec<u64>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.retry_backoff_secs);

        Self {
            max_iterations: parse_u32("MOTE_MAX_ITERATIONS", defaults.max_iterations),
            retry_backoff_secs,
            max_consecutive_tool_errors: parse_u32(
                "MOTE_MAX_CONSECUTIVE_TOOL_ERRORS",
                defaults.max_consecutive_tool_errors,
            ),
            queue_capacity: parse_usize("MOTE_QUEUE_CAPACITY", defaults.queue_capacity),
            idle_timeout_secs: parse_u64("MOTE_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            session_cache_capacity: parse_usize(
                "MOTE_SESSION_CACHE_CAPACITY",
                defaults.session_cache_capacity,
            ),
            compaction: defaults.compaction,
        }
    }

    /// Builds the section-by-section summary shown by `print_to_stderr` or
    /// serialized for `/api/v1/config`.
    pub fn summary(&self) -> RunConfigSummary {
        RunConfigSummary::new()
            .with_section(Box::new(OrchestratorConfigSummary {
                max_iterations: self.max_iterations,
                retry_backoff_secs: self.retry_backoff_secs.clone(),
                max_consecutive_tool_errors: self.max_consecutive_tool_errors,
            }))
            .with_section(Box::new(QueueConfigSummary {
                queue_capacity: self.queue_capacity,
                idle_timeout_secs: self.idle_timeout_secs,
            }))
            .with_section(Box::new(SessionCacheConfigSummary {
                cache_capacity: self.session_cache_capacity,
            }))
            .with_section(Box::new(CompactionConfigSummary(self.compaction.clone())))
    }
}
