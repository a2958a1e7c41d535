use std::sync::OnceLock;

use regex::Regex;

fn python_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:python|py)\r?\n(.*?)```").expect("valid python fence regex"))
}

fn any_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```\w*\r?\n(.*?)```").expect("valid fence regex"))
}

/// Pull the program out of a model response.
///
/// Prefers the last ```python / ```py block, then the last fenced block of
/// any language, and finally the whole response. The result is trimmed.
pub fn extract_code(response: &str) -> String {
    last_capture(python_block(), response)
        .or_else(|| last_capture(any_block(), response))
        .unwrap_or(response)
        .trim()
        .to_string()
}

fn last_capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_python_block_wins() {
        let response = "First try:\n```python\nprint(1)\n```\nBetter:\n```python\nprint(2)\n```\n";
        assert_eq!(extract_code(response), "print(2)");
    }

    #[test]
    fn test_python_block_preferred_over_later_generic_block() {
        let response = "```py\nx = input()\nprint(x)\n```\nExample run:\n```\n$ python sol.py\n```";
        assert_eq!(extract_code(response), "x = input()\nprint(x)");
    }

    #[test]
    fn test_generic_block_fallback() {
        let response = "Here you go\n```\nprint('a')\n```\nand\n```text\nprint('b')\n```";
        assert_eq!(extract_code(response), "print('b')");
    }

    #[test]
    fn test_no_fence_returns_whole_response() {
        assert_eq!(extract_code("  print(42)\n\n"), "print(42)");
    }

    #[test]
    fn test_unterminated_fence_returns_whole_response() {
        let response = "```python\nprint(1)";
        assert_eq!(extract_code(response), response);
    }

    #[test]
    fn test_crlf_fence() {
        assert_eq!(extract_code("```python\r\nprint(3)\r\n```"), "print(3)");
    }
}
