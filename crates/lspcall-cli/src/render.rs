//! Plain-text rendering of tool results.

use lspcall_mcp::ContentBlock;

/// Render a successful result: text blocks concatenated, other blocks shown
/// with their type and raw JSON.
pub fn render_success(blocks: &[ContentBlock]) -> String {
    if blocks.is_empty() {
        return "Tool returned a result without content.".to_string();
    }
    let mut out = String::new();
    for block in blocks {
        match block {
            ContentBlock::Text(text) => out.push_str(text),
            ContentBlock::Other { kind, raw } => {
                out.push_str(&format!("\n[Unsupported content type: {kind}]\n{raw}\n"));
            }
        }
    }
    out.trim().to_string()
}

/// Render a tool-level error. Falls back to the raw blocks when none of them
/// carries text.
pub fn render_tool_failure(blocks: &[ContentBlock]) -> String {
    let details: String = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            ContentBlock::Other { .. } => None,
        })
        .collect();

    if details.is_empty() {
        let raw = serde_json::Value::Array(blocks.iter().map(block_json).collect());
        format!("Tool call resulted in an error.\nRaw error result: {raw}")
    } else {
        format!("Tool call resulted in an error.\nError details:\n{details}")
    }
}

fn block_json(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text(text) => serde_json::json!({"type": "text", "text": text}),
        ContentBlock::Other { raw, .. } => raw.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ContentBlock {
        ContentBlock::Text(s.to_string())
    }

    #[test]
    fn success_concatenates_text() {
        let out = render_success(&[text("func main() {\n"), text("}\n")]);
        assert_eq!(out, "func main() {\n}");
    }

    #[test]
    fn success_marks_unsupported_blocks() {
        let out = render_success(&[
            text("see image"),
            ContentBlock::Other {
                kind: "image".into(),
                raw: serde_json::json!({"type": "image"}),
            },
        ]);
        assert!(out.starts_with("see image"));
        assert!(out.contains("[Unsupported content type: image]"));
        assert!(out.ends_with(r#"{"type":"image"}"#));
    }

    #[test]
    fn empty_success() {
        assert_eq!(
            render_success(&[]),
            "Tool returned a result without content."
        );
    }

    #[test]
    fn failure_with_text() {
        let out = render_tool_failure(&[text("symbol "), text("not found")]);
        assert_eq!(
            out,
            "Tool call resulted in an error.\nError details:\nsymbol not found"
        );
    }

    #[test]
    fn failure_without_text_shows_raw() {
        let out = render_tool_failure(&[ContentBlock::Other {
            kind: "resource".into(),
            raw: serde_json::json!({"type": "resource", "uri": "file:///x"}),
        }]);
        assert!(out.starts_with("Tool call resulted in an error.\nRaw error result: "));
        assert!(out.contains("file:///x"));
    }
}
