//! Skill tools: each runs a small script inside a pooled, sandboxed Rhai
//! `Engine`. Grounded on `mofa-plugins::rhai_runtime`'s security-limited
//! engine construction and JSON<->`Dynamic` conversion, generalized from a
//! plugin-lifecycle VM into a single `execute(args)` call per tool
//! invocation.

use std::sync::Mutex;

use async_trait::async_trait;
use rhai::{Dynamic, Engine, Map, Scope, AST};

use crate::error::EngineError;

use super::{Tool, ToolCallContext, ToolOutput, ToolSpec};

const MAX_OPERATIONS: u64 = 100_000;
const MAX_CALL_STACK_DEPTH: usize = 32;
const MAX_ARRAY_SIZE: usize = 10_000;
const MAX_STRING_SIZE: usize = 1_000_000;

fn sandboxed_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_OPERATIONS);
    engine.set_max_call_levels(MAX_CALL_STACK_DEPTH);
    engine.set_max_array_size(MAX_ARRAY_SIZE);
    engine.set_max_string_size(MAX_STRING_SIZE);
    engine.set_strict_variables(false);
    engine
}

/// A small reuse pool of preconfigured engines. Rhai's `Engine` is cheap to
/// build but not `Sync`, so a checked-out-then-returned pool avoids paying
/// the security-limit setup cost on every tool call while still letting
/// concurrent calls run on distinct engines.
pub struct SkillEnginePool {
    idle: Mutex<Vec<Engine>>,
    max_idle: usize,
}

impl SkillEnginePool {
    pub fn new(max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            max_idle,
        }
    }

    fn checkout(&self) -> Engine {
        self.idle
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(sandboxed_engine)
    }

    fn checkin(&self, engine: Engine) {
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max_idle {
            idle.push(engine);
        }
    }
}

impl Default for SkillEnginePool {
    fn default() -> Self {
        Self::new(8)
    }
}

/// One skill tool: a name, its declared spec, and the Rhai source defining
/// `fn execute(args)`.
pub struct SkillTool {
    spec: ToolSpec,
    script: String,
    pool: std::sync::Arc<SkillEnginePool>,
}

impl SkillTool {
    pub fn new(spec: ToolSpec, script: impl Into<String>, pool: std::sync::Arc<SkillEnginePool>) -> Self {
        Self {
            spec,
            script: script.into(),
            pool,
        }
    }
}

#[async_trait]
impl Tool for SkillTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: &ToolCallContext,
    ) -> Result<ToolOutput, EngineError> {
        let pool = self.pool.clone();
        let script = self.script.clone();
        tokio::task::spawn_blocking(move || run_execute(&pool, &script, args))
            .await
            .map_err(|e| EngineError::ToolExecutionError(e.to_string()))?
    }
}

fn run_execute(
    pool: &SkillEnginePool,
    script: &str,
    args: serde_json::Value,
) -> Result<ToolOutput, EngineError> {
    let engine = pool.checkout();
    let ast: AST = match engine.compile(script) {
        Ok(ast) => ast,
        Err(e) => {
            return Ok(ToolOutput::error(format!("skill compile error: {}", e)));
        }
    };
    let mut scope = Scope::new();
    let result: Result<Dynamic, _> =
        engine.call_fn(&mut scope, &ast, "execute", (json_to_dynamic(&args),));
    pool.checkin(engine);

    match result {
        Ok(value) => Ok(ToolOutput::ok(dynamic_to_json(&value).to_string())),
        Err(e) => Ok(ToolOutput::error(format!("skill execution error: {}", e))),
    }
}

fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
    match value {
        serde_json::Value::Null => Dynamic::UNIT,
        serde_json::Value::Bool(b) => Dynamic::from(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::UNIT
            }
        }
        serde_json::Value::String(s) => Dynamic::from(s.clone()),
        serde_json::Value::Array(arr) => {
            let vec: Vec<Dynamic> = arr.iter().map(json_to_dynamic).collect();
            Dynamic::from(vec)
        }
        serde_json::Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.as_str().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

fn dynamic_to_json(value: &Dynamic) -> serde_json::Value {
    if value.is_unit() {
        serde_json::Value::Null
    } else if let Some(b) = value.clone().try_cast::<bool>() {
        serde_json::Value::Bool(b)
    } else if let Some(i) = value.clone().try_cast::<i64>() {
        serde_json::json!(i)
    } else if let Some(f) = value.clone().try_cast::<f64>() {
        serde_json::json!(f)
    } else if let Some(s) = value.clone().try_cast::<String>() {
        serde_json::Value::String(s)
    } else if value.is_array() {
        let arr = value.clone().cast::<rhai::Array>();
        serde_json::Value::Array(arr.iter().map(dynamic_to_json).collect())
    } else if value.is_map() {
        let map = value.clone().cast::<Map>();
        let mut obj = serde_json::Map::new();
        for (k, v) in map.iter() {
            obj.insert(k.to_string(), dynamic_to_json(v));
        }
        serde_json::Value::Object(obj)
    } else {
        serde_json::Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tool(script: &str) -> SkillTool {
        SkillTool::new(
            ToolSpec {
                name: "double".to_string(),
                description: None,
                input_schema: serde_json::json!({}),
            },
            script,
            Arc::new(SkillEnginePool::default()),
        )
    }

    #[tokio::test]
    async fn skill_tool_executes_script_and_returns_json_result() {
        let t = tool("fn execute(args) { args.n * 2 }");
        let ctx = ToolCallContext {
            session_id: "s1".to_string(),
        };
        let out = t.call(serde_json::json!({"n": 21}), &ctx).await.unwrap();
        assert!(!out.is_error);
        assert_eq!(out.content, "42");
    }

    #[tokio::test]
    async fn compile_error_becomes_an_error_result_not_a_failure() {
        let t = tool("fn execute(args) { this is not rhai");
        let ctx = ToolCallContext {
            session_id: "s1".to_string(),
        };
        let out = t.call(serde_json::json!({}), &ctx).await.unwrap();
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn runaway_loop_is_stopped_by_the_operation_limit() {
        let t = tool("fn execute(args) { let x = 0; loop { x += 1; } }");
        let ctx = ToolCallContext {
            session_id: "s1".to_string(),
        };
        let out = t.call(serde_json::json!({}), &ctx).await.unwrap();
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn engine_is_reused_across_calls() {
        let pool = Arc::new(SkillEnginePool::default());
        let t = SkillTool::new(
            ToolSpec {
                name: "inc".to_string(),
                description: None,
                input_schema: serde_json::json!({}),
            },
            "fn execute(args) { args.n + 1 }",
            pool.clone(),
        );
        let ctx = ToolCallContext {
            session_id: "s1".to_string(),
        };
        t.call(serde_json::json!({"n": 1}), &ctx).await.unwrap();
        t.call(serde_json::json!({"n": 2}), &ctx).await.unwrap();
        assert_eq!(pool.idle.lock().unwrap().len(), 1);
    }
}
