//! Fixed catalog of agent evaluation tasks.

use serde::{Deserialize, Serialize};

/// Timeout applied when a task declares none.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;

/// Tools every catalog task may use.
const READ_ONLY_TOOLS: &str = "Read,Glob,Grep";

/// A unit of work handed to the coding agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub description: String,
    pub prompt: String,
    /// Comma-separated tool allow-list, empty for no restriction.
    pub tools_allowed: String,
    /// Per-task timeout; zero selects [`DEFAULT_TASK_TIMEOUT_SECS`].
    pub timeout_seconds: u64,
}

impl Task {
    pub fn new(id: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            prompt: prompt.into(),
            tools_allowed: String::new(),
            timeout_seconds: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools(mut self, tools: impl Into<String>) -> Self {
        self.tools_allowed = tools.into();
        self
    }

    pub fn with_timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    /// Timeout in seconds after applying the default.
    pub fn effective_timeout_secs(&self) -> u64 {
        if self.timeout_seconds > 0 {
            self.timeout_seconds
        } else {
            DEFAULT_TASK_TIMEOUT_SECS
        }
    }
}

/// Returns the evaluation tasks in catalog order.
pub fn all_tasks() -> Vec<Task> {
    vec![
        Task::new(
            "intent_clarity",
            "Intent Clarity",
            "Find the main entry point function in this project and explain what it does. Include:\n\
             1) The function name and file location\n\
             2) What the function accomplishes\n\
             3) Key dependencies or imports it uses\n\
             \n\
             Be specific and reference actual code.",
        )
        .with_description("Measures agent's ability to find and explain code purpose")
        .with_tools(READ_ONLY_TOOLS)
        .with_timeout_seconds(DEFAULT_TASK_TIMEOUT_SECS),
        Task::new(
            "modification_confidence",
            "Modification Confidence",
            "Find a function in this project that would benefit from input validation. \
             Propose the specific validation code to add, showing:\n\
             1) The function to modify and its location\n\
             2) The exact code changes (diff-style)\n\
             3) Why this validation is appropriate\n\
             \n\
             Do not actually modify the file - just propose the change.",
        )
        .with_description("Measures agent's ability to propose safe, scoped changes")
        .with_tools(READ_ONLY_TOOLS)
        .with_timeout_seconds(DEFAULT_TASK_TIMEOUT_SECS),
        Task::new(
            "cross_file_coherence",
            "Cross-File Coherence",
            "Trace the data flow for the primary operation in this project. Start from an entry \
             point (CLI command, API handler, or main function) and follow the data through to \
             where it's processed or stored. Show:\n\
             1) The starting point\n\
             2) Each file/function the data passes through\n\
             3) The final destination\n\
             \n\
             Reference actual file paths and function names.",
        )
        .with_description("Measures agent's ability to trace code across files")
        .with_tools(READ_ONLY_TOOLS)
        .with_timeout_seconds(DEFAULT_TASK_TIMEOUT_SECS),
        Task::new(
            "semantic_completeness",
            "Semantic Completeness",
            "Find an area of this codebase that could benefit from improved error handling. \
             Propose error handling that matches existing patterns in the codebase. Show:\n\
             1) The code location needing improvement\n\
             2) Examples of existing error handling patterns you found\n\
             3) Your proposed changes that follow those patterns\n\
             \n\
             Do not actually modify files - just propose the change.",
        )
        .with_description("Measures agent's ability to follow existing patterns")
        .with_tools(READ_ONLY_TOOLS)
        .with_timeout_seconds(DEFAULT_TASK_TIMEOUT_SECS),
    ]
}

/// Looks up a catalog task by id.
pub fn task_by_id(id: &str) -> Option<Task> {
    all_tasks().into_iter().find(|t| t.id == id)
}
