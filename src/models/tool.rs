//! Tool catalog and typed tool invocations.
//!
//! Callers send `{ "name": ..., "arguments": {...} }`. The pair is decoded
//! into one [`ToolCall`] variant per supported tool, with defaults filled
//! in, before anything is dispatched to the tool backend.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Names of every tool the gateway exposes.
pub const TOOL_NAMES: [&str; 5] = [
    "get_stylus_context",
    "generate_stylus_code",
    "ask_stylus",
    "generate_tests",
    "get_workflow",
];

/// A validated tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum ToolCall {
    GetStylusContext(ContextArgs),
    GenerateStylusCode(GenerateCodeArgs),
    AskStylus(AskArgs),
    GenerateTests(GenerateTestsArgs),
    GetWorkflow(WorkflowArgs),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextArgs {
    pub query: String,
    #[serde(default = "default_n_results")]
    pub n_results: u32,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default = "default_true")]
    pub rerank: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Code,
    Documentation,
    #[default]
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCodeArgs {
    pub prompt: String,
    #[serde(default)]
    pub contract_type: ContractType,
    #[serde(default)]
    pub include_tests: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractType {
    Token,
    Nft,
    Defi,
    #[default]
    Utility,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskArgs {
    pub question: String,
    #[serde(default)]
    pub code_context: Option<String>,
    #[serde(default)]
    pub question_type: QuestionType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    #[default]
    General,
    Debugging,
    Optimization,
    Security,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestsArgs {
    pub contract_code: String,
    #[serde(default)]
    pub test_framework: TestFramework,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestFramework {
    #[default]
    RustNative,
    Foundry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowArgs {
    pub workflow_type: WorkflowType,
    #[serde(default)]
    pub network: Network,
    #[serde(default = "default_true")]
    pub include_troubleshooting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Build,
    Deploy,
    Test,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    ArbitrumSepolia,
    ArbitrumOne,
    ArbitrumNova,
}

fn default_n_results() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl ToolCall {
    /// Decode a named invocation into its typed variant.
    ///
    /// Missing `arguments` are treated as `{}` so required-field errors name
    /// the missing field. Errors are human-readable and safe to return to
    /// the caller.
    pub fn parse(name: &str, arguments: Option<Value>) -> Result<Self, String> {
        if !TOOL_NAMES.contains(&name) {
            return Err(format!("Unknown tool: {}", name));
        }

        let arguments = arguments.unwrap_or_else(|| json!({}));
        if !arguments.is_object() {
            return Err("Tool arguments must be an object".to_string());
        }

        let call: ToolCall = serde_json::from_value(json!({
            "name": name,
            "arguments": arguments,
        }))
        .map_err(|e| format!("Invalid arguments for {}: {}", name, e))?;

        call.validate()?;
        Ok(call)
    }

    /// Wire name of the tool.
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::GetStylusContext(_) => "get_stylus_context",
            ToolCall::GenerateStylusCode(_) => "generate_stylus_code",
            ToolCall::AskStylus(_) => "ask_stylus",
            ToolCall::GenerateTests(_) => "generate_tests",
            ToolCall::GetWorkflow(_) => "get_workflow",
        }
    }

    fn validate(&self) -> Result<(), String> {
        let (field, value) = match self {
            ToolCall::GetStylusContext(args) => ("query", &args.query),
            ToolCall::GenerateStylusCode(args) => ("prompt", &args.prompt),
            ToolCall::AskStylus(args) => ("question", &args.question),
            ToolCall::GenerateTests(args) => ("contractCode", &args.contract_code),
            ToolCall::GetWorkflow(_) => return Ok(()),
        };

        if value.trim().is_empty() {
            return Err(format!("Missing required field: {}", field));
        }

        if let ToolCall::GetStylusContext(args) = self {
            if args.n_results == 0 || args.n_results > 50 {
                return Err("nResults must be between 1 and 50".to_string());
            }
        }

        Ok(())
    }
}

/// Result of a tool invocation as reported by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolOutput {
    pub data: Value,
    #[serde(default)]
    pub tokens_used: Option<i32>,
}

impl ToolOutput {
    /// Render the data as the text content of a tool result.
    pub fn to_text(&self) -> String {
        match &self.data {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        }
    }
}

/// The static tool catalog returned by `tools/list`.
pub fn catalog() -> Value {
    json!([
        {
            "name": "get_stylus_context",
            "description": "Search for relevant Stylus documentation, code examples, and patterns.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "The search query to find relevant context" },
                    "nResults": { "type": "number", "description": "Number of results to return (default: 5)", "default": 5 },
                    "contentType": { "type": "string", "enum": ["code", "documentation", "all"], "default": "all" },
                    "rerank": { "type": "boolean", "description": "Whether to rerank results for better relevance", "default": true }
                },
                "required": ["query"]
            }
        },
        {
            "name": "generate_stylus_code",
            "description": "Generate Stylus (Rust) smart contract code based on a description.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Description of the contract or code to generate" },
                    "contractType": { "type": "string", "enum": ["token", "nft", "defi", "utility", "custom"], "default": "utility" },
                    "includeTests": { "type": "boolean", "default": false }
                },
                "required": ["prompt"]
            }
        },
        {
            "name": "ask_stylus",
            "description": "Ask questions about Stylus development, debugging, optimization, or security.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "question": { "type": "string", "description": "The question to ask about Stylus development" },
                    "codeContext": { "type": "string", "description": "Optional code context for more specific answers" },
                    "questionType": { "type": "string", "enum": ["general", "debugging", "optimization", "security"], "default": "general" }
                },
                "required": ["question"]
            }
        },
        {
            "name": "generate_tests",
            "description": "Generate tests for Stylus contract code.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "contractCode": { "type": "string", "description": "The Stylus contract code to generate tests for" },
                    "testFramework": { "type": "string", "enum": ["rust_native", "foundry"], "default": "rust_native" }
                },
                "required": ["contractCode"]
            }
        },
        {
            "name": "get_workflow",
            "description": "Get step-by-step workflow instructions for building, deploying, or testing Stylus contracts.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "workflowType": { "type": "string", "enum": ["build", "deploy", "test"] },
                    "network": { "type": "string", "enum": ["arbitrum_sepolia", "arbitrum_one", "arbitrum_nova"], "default": "arbitrum_sepolia" },
                    "includeTroubleshooting": { "type": "boolean", "default": true }
                },
                "required": ["workflowType"]
            }
        }
    ])
}
