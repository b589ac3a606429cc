//! Prompt templates, code extraction, and the execution preamble

use crate::config::AgentConfig;
use crate::error::Result;
use crate::intent::Intent;
use minijinja::{Environment, context};
use regex::Regex;
use std::sync::LazyLock;

/// Instruction template for the code generator
///
/// The knowledge context is interpolated into `{{ knowledge_base }}`; the
/// rules are fixed.
const SYSTEM_PROMPT_TEMPLATE: &str = r#"
You are an advanced Financial Data Analyst Agent capable of writing and executing Python code to solve complex data tasks.
Your goal is to satisfy the user's request by generating a SINGLE, COMPLETE Python script.

### Execution Environment
- The system automatically injects a "Pre-amble" script before your code.
- **Pre-loaded Libraries**: `pandas` (pd), `numpy` (np), `tushare` (ts), `matplotlib.pyplot` (plt), `os`, `sys`, `datetime`.
- **Tushare Token**: Already initialized (`ts.set_token(...)` and `pro = ts.pro_api()`).
- **CRITICAL**: DO NOT call `ts.set_token()` or `ts.pro_api()` again. Use the existing `pro` object directly.
- **CRITICAL**: Use only the globals the pre-amble provides; do not import OS-level facilities beyond them.
- **Plotting**: Matplotlib is configured with `Agg` backend (non-interactive). You must save figures to files.

### Knowledge Base
{{ knowledge_base }}

### Constraints & Rules
1. **No Interactive Input**: Do not use `input()`.
2. **No Fabricated Data**: Never invent or mock market data; fetch it through `pro`.
3. **File Paths**: Save Excel/CSV and plots to `{{ exports_dir }}/` with descriptive filenames.
4. **Localized Columns**: Rename output columns to Chinese labels before saving.
5. **Output**:
   - To deliver a file to the user, you MUST call the helper function `print_output_path(path)` exactly once at the end of your script.
   - Example: `print_output_path('{{ exports_dir }}/result.xlsx')`
   - If drawing a plot, save it and print the path.
6. **Self-Correction**:
   - If your code fails, you will receive the error message. You must analyze the error and rewrite the *entire* script to fix it.
7. **Data Processing**:
   - Always handle potential empty dataframes.
   - Sort time series ascending by date.

### Response Format
- Briefly explain your plan (1-2 sentences).
- Provide the Python code in a markdown block:
```python
# Your code here
```
"#;

/// Render the system prompt with the knowledge context
pub fn render_system_prompt(knowledge: &str, config: &AgentConfig) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("system", SYSTEM_PROMPT_TEMPLATE)?;
    let rendered = env.get_template("system")?.render(context! {
        knowledge_base => knowledge,
        exports_dir => config.exports_dir.display().to_string(),
    })?;
    Ok(rendered)
}

/// First user turn: raw intent plus the resolved-parameter summary
pub fn build_user_prompt(intent: &Intent, suggested_path: &str) -> String {
    format!(
        "意图：{}\n参数解析：ts_code={}, start_date={}, end_date={}, export={}, plot={}\n建议导出路径：{}\n要求：严格生成可直接运行的完整 Python 代码。",
        intent.raw,
        intent.entity_code.as_deref().unwrap_or("未知"),
        intent.start_date.as_deref().unwrap_or("未知"),
        intent.end_date.as_deref().unwrap_or("未知"),
        intent.actions.export,
        intent.actions.plot,
        suggested_path,
    )
}

/// Repair turn: verbatim diagnostic text plus the rewrite instruction
pub fn build_repair_prompt(error_text: &str) -> String {
    format!(
        "上一段代码执行失败，错误信息如下：\n{error_text}\n请分析错误原因，重写**完整**的脚本（不要只给出修改片段）。"
    )
}

/// Extracted program text from a generator response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCode {
    /// The program text
    pub code: String,
    /// Whether the text came from a fenced block
    pub fenced: bool,
}

static PYTHON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```python\s*\n([\s\S]*?)```").expect("valid fence pattern"));

static ANY_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z]*\s*\n([\s\S]*?)```").expect("valid fence pattern"));

/// Extract the program from a generator response
///
/// Prefers the first ```python fence, falls back to any fence, and finally
/// to the raw text (unfenced) so the caller can decide whether a short
/// unfenced response is a conversational answer instead of code.
pub fn extract_code(text: &str) -> ExtractedCode {
    if let Some(caps) = PYTHON_FENCE_RE.captures(text) {
        return ExtractedCode {
            code: caps[1].to_string(),
            fenced: true,
        };
    }
    if let Some(caps) = ANY_FENCE_RE.captures(text) {
        return ExtractedCode {
            code: caps[1].to_string(),
            fenced: true,
        };
    }
    ExtractedCode {
        code: text.trim().to_string(),
        fenced: false,
    }
}

/// Build the fixed preamble prefixed to every generated script
///
/// Centralizes the secret-bearing initialization (API client, headless
/// plotting backend, directory creation, the tagged output-path helper) so
/// generated code never has to carry it. The credential itself reaches the
/// subprocess through its environment, not through this text.
pub fn build_preamble(config: &AgentConfig) -> String {
    let exports = config.exports_dir.display();
    let scripts = config.temp_scripts_dir.display();
    format!(
        r#"
import os
import sys
import pandas as pd
import numpy as np
import tushare as ts
import matplotlib
matplotlib.use('Agg') # Non-interactive backend
import matplotlib.pyplot as plt
from datetime import datetime
from dotenv import load_dotenv

# Load environment variables
load_dotenv()

# Initialize Tushare
token = os.getenv('TUSHARE_TOKEN')
if token:
    ts.set_token(token)
    pro = ts.pro_api()
else:
    print("Warning: TUSHARE_TOKEN not found in environment variables.")
    pro = None

# Ensure workspace directories exist
os.makedirs('{exports}', exist_ok=True)
os.makedirs('{scripts}', exist_ok=True)

# Helper to print the deliverable path clearly for the agent to pick up
def print_output_path(path):
    print(f"OUTPUT_PATH:{{os.path.abspath(path)}}")

"#
    )
}
