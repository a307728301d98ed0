//! Human-readable rendering of a completion response.

use crate::client::CompletionResult;
use std::fmt;

const CHOICE_RULE_WIDTH: usize = 200;
const TOOL_RULE_WIDTH: usize = 100;

/// Diagnostic view of one response together with its cost estimate.
pub struct ResponseReport<'a> {
    result: &'a CompletionResult,
    estimate: f64,
}

impl<'a> ResponseReport<'a> {
    /// Wraps a response and its estimated cost.
    #[must_use]
    pub const fn new(result: &'a CompletionResult, estimate: f64) -> Self {
        Self { result, estimate }
    }
}

impl fmt::Display for ResponseReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let choice_rule = "*".repeat(CHOICE_RULE_WIDTH);
        let tool_rule = "-".repeat(TOOL_RULE_WIDTH);

        writeln!(f, "Response ID: {}", self.result.id)?;
        writeln!(f, "Total Tokens Used: {}", self.result.total_tokens())?;
        writeln!(f, "Estimated cost for completion: ${:.4}", self.estimate)?;

        for choice in &self.result.choices {
            let message = &choice.message;
            writeln!(f, "{choice_rule}")?;
            writeln!(
                f,
                "Finish Reason: {}",
                choice.finish_reason.as_deref().unwrap_or("None")
            )?;
            writeln!(f, "Choice Index: {}", choice.index)?;
            writeln!(
                f,
                "Message Content: {}",
                message.content.as_deref().unwrap_or("None")
            )?;
            writeln!(f, "Message Role: {}", message.role)?;
            match &message.function_call {
                Some(call) => writeln!(f, "Function Call: {}({})", call.name, call.arguments)?,
                None => writeln!(f, "Function Call: None")?,
            }

            let tool_calls = message.tool_calls();
            if tool_calls.is_empty() {
                writeln!(f, "Tools not required")?;
            }
            for call in tool_calls {
                writeln!(f, "{tool_rule}")?;
                writeln!(f, "Tool call ID: {}", call.id)?;
                match call.parsed_arguments() {
                    Ok(arguments) => writeln!(f, "Tool function arguments: {arguments}")?,
                    Err(_) => writeln!(f, "Tool function arguments: {}", call.function.arguments)?,
                }
                writeln!(f, "Tool function name: {}", call.function.name)?;
                writeln!(f, "Tool type: {}", call.kind)?;
            }
        }

        write!(f, "{choice_rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::result_with;
    use crate::client::{FunctionCall, ToolCall};

    #[test]
    fn test_report_text_response() {
        let result = result_with("Hello", 1500);
        let rendered = ResponseReport::new(&result, 0.015).to_string();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], "Response ID: chatcmpl-test");
        assert_eq!(lines[1], "Total Tokens Used: 1500");
        assert_eq!(lines[2], "Estimated cost for completion: $0.0150");
        assert_eq!(lines[3], "*".repeat(200));
        assert_eq!(lines[4], "Finish Reason: stop");
        assert_eq!(lines[5], "Choice Index: 0");
        assert_eq!(lines[6], "Message Content: Hello");
        assert_eq!(lines[7], "Message Role: assistant");
        assert_eq!(lines[8], "Function Call: None");
        assert_eq!(lines[9], "Tools not required");
        assert_eq!(lines[10], "*".repeat(200));
        assert_eq!(lines.len(), 11);
    }

    #[test]
    fn test_report_tool_calls() {
        let mut result = result_with("", 10);
        result.choices[0].message.content = None;
        result.choices[0].message.tool_calls = Some(vec![ToolCall {
            id: "call_7".to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: "get_weather".to_string(),
                arguments: r#"{"city": "Oslo"}"#.to_string(),
            },
        }]);

        let rendered = ResponseReport::new(&result, 0.0001).to_string();

        assert!(!rendered.contains("Tools not required"));
        assert!(rendered.contains(&"-".repeat(100)));
        assert!(rendered.contains("Tool call ID: call_7"));
        assert!(rendered.contains(r#"Tool function arguments: {"city":"Oslo"}"#));
        assert!(rendered.contains("Tool function name: get_weather"));
        assert!(rendered.contains("Tool type: function"));
        assert!(rendered.contains("Message Content: None"));
    }
}
