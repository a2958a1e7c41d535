use std::fmt::Write;

use codebench_core::Problem;

const PREAMBLE: &str =
    "Solve the following programming problem. Return only the Python code solution, no explanations.";

const REQUIREMENTS: &str = "## Requirements

- Write clean, correct Python code
- Handle all edge cases
- Your code should read from stdin and write to stdout if no starter code is provided
- If starter code is provided, implement the function with that exact signature
- Return ONLY the code, wrapped in ```python ... ``` markers
";

pub fn format_prompt(problem: &Problem) -> String {
    let mut prompt = format!("{PREAMBLE}\n\n## Problem\n\n{}\n\n", problem.prompt_content);

    if let Some(starter) = problem.starter_code.as_deref() {
        let _ = write!(
            prompt,
            "## Starter Code\n\nUse the following function signature:\n\n```python\n{starter}\n```\n\n"
        );
    }

    prompt.push_str(REQUIREMENTS);
    prompt
}
