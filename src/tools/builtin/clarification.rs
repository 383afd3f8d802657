//! Clarification requests for lookups with missing or ambiguous parameters.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;

use crate::tools::builtin::{CLARIFICATION_TOOL_NAME, SEND_EMAIL_TOOL_NAME};
use crate::tools::tool::{
    Tool, ToolContext, ToolError, ToolKind, ToolOutput, optional_str_list, require_str,
};

/// Explains a parameter to the reviewer and offers default choices.
#[derive(Debug, Clone)]
struct ParameterHint {
    explanation: String,
    suggestions: Vec<String>,
}

/// Builds a structured clarification request for the reviewer.
///
/// Domain tools register hints for their own parameters with
/// [`ClarificationTool::with_parameter`] and an example query with
/// [`ClarificationTool::with_example`].
pub struct ClarificationTool {
    hints: HashMap<String, ParameterHint>,
    examples: HashMap<String, String>,
}

impl ClarificationTool {
    pub fn new() -> Self {
        let tool = Self {
            hints: HashMap::new(),
            examples: HashMap::new(),
        };
        tool.with_parameter(
            "days_back",
            "number of days to search back",
            &["7 (last week)", "14 (last 2 weeks)", "30 (last month)", "90 (last 3 months)"],
        )
        .with_parameter(
            "days_ahead",
            "number of days to search ahead",
            &["7 (next week)", "14 (next 2 weeks)", "30 (next month)"],
        )
        .with_parameter("name", "full or partial name of a person", &[])
        .with_parameter("query", "keyword to look for in titles or subjects", &[])
        .with_parameter(
            "active",
            "whether to include only active records",
            &["true (active only)", "false (include inactive)"],
        )
        .with_parameter("limit", "maximum number of results", &["10", "25", "50"])
    }

    pub fn with_parameter(mut self, name: &str, explanation: &str, suggestions: &[&str]) -> Self {
        self.hints.insert(
            name.to_string(),
            ParameterHint {
                explanation: explanation.to_string(),
                suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_example(mut self, target_tool: &str, example: &str) -> Self {
        self.examples
            .insert(target_tool.to_string(), example.to_string());
        self
    }

    fn render(
        &self,
        target_tool: &str,
        params: &[String],
        context: &str,
        suggestions: &HashMap<String, Vec<String>>,
    ) -> String {
        let mut out = format!(
            "To answer your question about '{context}' with the {target_tool} tool, \
             I need some more information:\n\n"
        );

        for param in params {
            let hint = self.hints.get(param);
            let explanation = hint.map(|h| h.explanation.as_str()).unwrap_or(param);
            out.push_str(&format!("**{}**: {explanation}\n", param.to_uppercase()));

            let options = suggestions
                .get(param)
                .filter(|s| !s.is_empty())
                .or_else(|| hint.map(|h| &h.suggestions).filter(|s| !s.is_empty()));
            if let Some(options) = options {
                out.push_str(&format!("   Possible options: {}\n", options.join(", ")));
            }
            out.push('\n');
        }

        if let Some(example) = self.examples.get(target_tool) {
            out.push_str(&format!("**Example**: {example}\n\n"));
        }

        out.push_str(
            "Could you provide this information so I can run a targeted search?\n\n",
        );
        out.push_str(&format!(
            "STOP: Waiting for user clarification. Use {SEND_EMAIL_TOOL_NAME} to ask for more \
             information."
        ));
        out
    }
}

impl Default for ClarificationTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ClarificationTool {
    fn name(&self) -> &str {
        CLARIFICATION_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Ask the user for clarification when parameters for a lookup tool are missing \
         or unclear. Improves the success rate of lookups."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target_tool": {
                    "type": "string",
                    "description": "The tool that needs more information"
                },
                "missing_or_unclear_params": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Parameters that are missing or unclear"
                },
                "user_request_context": {
                    "type": "string",
                    "description": "Context of the user's original request"
                },
                "suggestions": {
                    "type": "object",
                    "additionalProperties": {"type": "array", "items": {"type": "string"}},
                    "description": "Optional suggested values per parameter"
                }
            },
            "required": ["target_tool", "missing_or_unclear_params", "user_request_context"]
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Clarification
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let target_tool = require_str(&params, "target_tool")?;
        let context = require_str(&params, "user_request_context")?;
        let missing = optional_str_list(&params, "missing_or_unclear_params");
        if missing.is_empty() {
            return Err(ToolError::InvalidParameters(
                "missing_or_unclear_params must name at least one parameter".to_string(),
            ));
        }

        let suggestions: HashMap<String, Vec<String>> = params
            .get("suggestions")
            .and_then(|s| s.as_object())
            .map(|map| {
                map.keys()
                    .map(|k| (k.clone(), optional_str_list(&params["suggestions"], k)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(ToolOutput::text(
            self.render(target_tool, &missing, context, &suggestions),
            start.elapsed(),
        ))
    }
}
