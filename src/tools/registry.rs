//! Tool registry for managing available tools.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::ConfigError;
use crate::llm::ToolDefinition;
use crate::tools::builtin::BUILTIN_TOOLS;
use crate::tools::tool::{Tool, ToolKind};

/// Registry of available tools.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    /// Names registered as built-in (protected from shadowing).
    builtin_names: RwLock<HashSet<String>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            builtin_names: RwLock::new(HashSet::new()),
        }
    }

    /// Register a tool. Rejects tools that try to shadow a built-in name.
    pub async fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.builtin_names.read().await.contains(&name) {
            tracing::warn!(
                tool = %name,
                "Rejected tool registration: would shadow a built-in tool"
            );
            return;
        }
        self.tools.write().await.insert(name.clone(), tool);
        tracing::debug!(tool = %name, "Registered tool");
    }

    /// Register a built-in tool (sync version for startup).
    pub fn register_sync(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if let Ok(mut tools) = self.tools.try_write() {
            tools.insert(name.clone(), tool);
            if BUILTIN_TOOLS.iter().any(|(n, _)| *n == name)
                && let Ok(mut builtins) = self.builtin_names.try_write()
            {
                builtins.insert(name.clone());
            }
            tracing::debug!(tool = %name, "Registered built-in tool");
        }
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(name).cloned()
    }

    /// Check if a tool exists.
    pub async fn has(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Get the number of registered tools.
    pub fn count(&self) -> usize {
        self.tools.try_read().map(|t| t.len()).unwrap_or(0)
    }

    /// Get tool definitions for LLM function calling, sorted by name.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .await
            .values()
            .map(|tool| tool.definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Get tool definitions filtered by kind, sorted by name.
    pub async fn tool_definitions_for_kind(&self, kind: ToolKind) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .read()
            .await
            .values()
            .filter(|tool| tool.kind() == kind)
            .map(|tool| tool.definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Check that every built-in tool is registered with its expected kind.
    pub async fn validate_builtins(&self) -> Result<(), ConfigError> {
        let tools = self.tools.read().await;
        for (name, expected) in BUILTIN_TOOLS {
            match tools.get(*name) {
                Some(tool) if tool.kind() == *expected => {}
                Some(tool) => {
                    return Err(ConfigError::InvalidValue {
                        key: format!("tool.{name}"),
                        message: format!("expected kind {expected:?}, found {:?}", tool.kind()),
                    });
                }
                None => {
                    return Err(ConfigError::InvalidValue {
                        key: format!("tool.{name}"),
                        message: "built-in tool is not registered".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
