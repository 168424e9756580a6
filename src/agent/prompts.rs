//! Prompt templates for the coder and inspector agents

/// System preamble for the coder agent, parameterized by the session's
/// working directory.
pub fn coder_preamble(working_path: &str) -> String {
    format!(
        "You are an expert data analyst. You accomplish the user's requests by \
writing Python code.\n\n\
Code rules:\n\
1. Wrap all of your code in a single markdown block tagged as python:\n\
```python\n\
# your code here\n\
```\n\
2. Work inside the path {working_path}, both for reading uploaded files and \
for saving any output files or figures.\n\
3. Your code should print or plot some visible result.\n\
4. If the execution result contains an error, fix and improve the code.\n\
5. Follow these rules in every later turn of the conversation.",
    )
}

/// Policy block appended once to the coder preamble when knowledge
/// retrieval is enabled.
pub const KNOWLEDGE_POLICY: &str = "\n\nAdditionally, reference code may be \
retrieved from a knowledge base and attached to a request. Retrieved code \
comes in two modes. In 'full' mode a complete code snippet is shown; refer \
to it and adapt it to the request. In 'core' mode the functions and classes \
shown have already been defined and executed in the execution backend; check \
that they satisfy the request and call them directly instead of redefining \
them.";

/// Bootstrap cell executed when a session's kernel starts.
///
/// The scientific stack is optional so that a bare interpreter still boots;
/// Agg keeps matplotlib headless.
pub const BOOTSTRAP_IMPORTS: &str = "\
import os, sys, re, json, math, time
from datetime import datetime
try:
    import numpy as np
    import pandas as pd
    import matplotlib
    matplotlib.use('Agg')
    import matplotlib.pyplot as plt
except ImportError:
    pass
";

/// Inspection request sent to the inspector agent for a failed execution.
pub fn inspect_request(bug_code: &str, error_message: &str) -> String {
    format!(
        "You are an experienced and insightful inspector. Identify the bug in \
the given code based on the error message and suggest how to fix it.\n\n\
- Buggy code:\n{bug_code}\n\n\
When executing the code above, an error occurred: {error_message}.\n\
Check the implementation and give a fix method based on the error message. \
Do not provide the corrected code itself.\n\n\
Fix method:\n",
    )
}

/// Repair request sent to the coder agent after an inspector diagnosis.
pub fn repair_request(bug_code: &str, error_message: &str, fix_method: &str) -> String {
    format!(
        "Try to fix the bug in the following code according to the error \
message and the fix method. Check every suspect area carefully and make the \
appropriate corrections. If the error is caused by a missing package, you can \
install it with '!pip install package_name'.\n\n\
- Buggy code:\n{bug_code}\n\n\
When executing the code above, an error occurred: {error_message}.\n\n\
- Fix method:\n{fix_method}\n\n\
Your fixed code (wrapped in ```python```):\n",
    )
}

/// Result-explanation request appended after a successful execution.
pub fn result_prompt(execution_output: &str) -> String {
    format!(
        "This is the result of the execution:\n{execution_output}\n\n\
Now: reformat any tabular result into markdown. Then explain the result in \
1-3 sentences. Finally, suggest next steps based on the conversation history, \
listing at least 3 points in a format like:\n\
Next, you can:\n\
[1] Standardize the data.\n\
[2] Run outlier detection on the data.\n\
[3] Train a neural network model.",
    )
}

/// Message recorded when the user supplies code directly.
pub fn human_loop(code: &str) -> String {
    format!("I wrote or fixed the code myself:\n```python\n{code}\n```")
}

/// Fallback instruction used instead of an inspector diagnosis at the
/// escalation round.
pub const FALLBACK_FIX: &str = "Try other packages or methods.";

/// Degraded diagnosis used when the inspector service cannot be reached.
pub const INSPECTOR_UNAVAILABLE: &str =
    "The inspector could not be reached. Re-read the error message and fix the code yourself.";

/// Terminal apology emitted when the repair loop exhausts its attempts.
pub fn escalation_apology(attempts: usize) -> String {
    format!(
        "\nSorry, I can't fix the code within {attempts} attempts. Could you \
help me modify it or give some suggestions?",
    )
}

/// Notice appended to the transcript when the orchestrator itself faults.
pub const INTERNAL_ERROR_NOTICE: &str =
    "\nSorry, there is an error in the program, please try again.";

/// System prompt for report generation.
pub const REPORT_SYSTEM: &str = "You are a report writer. Write an academic \
data analysis report in markdown format based on the conversation history. \
Include, when present: 1. Title. 2. Abstract (~200 words: task background, \
datasets, processing methods, models, conclusions). 3. Introduction (~200 \
words). 4. Methodology, with subsections for the dataset, data processing, \
and modeling; embed saved figures with their links, for example \
![figure.png](/path/to/the/figure.png). 5. Results, summarized in tables \
where possible, with all model evaluation metrics in one comparison table. \
6. Conclusion (~200 words).";

/// Closing user message of a report-generation request.
pub fn report_request(figures: &[String]) -> String {
    format!(
        "Now, generate a report according to the chat history above (do not \
give further suggestions at the end of the report).\n\
Note: here is the figure list with links in the chat history: {figures:?}",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coder_preamble_includes_working_path() {
        let preamble = coder_preamble("/tmp/session-1");
        assert!(preamble.contains("/tmp/session-1"));
        assert!(preamble.contains("```python"));
    }

    #[test]
    fn test_repair_request_carries_all_parts() {
        let msg = repair_request("1/0", "ZeroDivisionError", "guard the divisor");
        assert!(msg.contains("1/0"));
        assert!(msg.contains("ZeroDivisionError"));
        assert!(msg.contains("guard the divisor"));
    }

    #[test]
    fn test_escalation_apology_mentions_attempts() {
        assert!(escalation_apology(5).contains("5 attempts"));
    }
}
