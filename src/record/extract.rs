use once_cell::sync::Lazy;
use regex::Regex;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:python)?\s*([\s\S]+?)\s*```").unwrap_or_else(|e| panic!("code fence pattern: {e}"))
});

/// Body of the first fenced code block (```` ```python ```` or bare
/// ```` ``` ````), or the whole field trimmed when there is none.
pub fn extract_code_block(text: &str) -> String {
    match CODE_FENCE.captures(text).and_then(|caps| caps.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_python_fence() {
        let text = "Here:\n```python\nx = 1\nprint(x)\n```\ntrailing";
        assert_eq!(extract_code_block(text), "x = 1\nprint(x)");
    }

    #[test]
    fn extracts_bare_fence() {
        assert_eq!(extract_code_block("```\n  y = 2\n```"), "y = 2");
    }

    #[test]
    fn first_block_wins() {
        let text = "```python\na = 1\n```\n```python\nb = 2\n```";
        assert_eq!(extract_code_block(text), "a = 1");
    }

    #[test]
    fn no_fence_falls_back_to_trimmed_text() {
        assert_eq!(extract_code_block("  z = 3  \n"), "z = 3");
    }
}
