//! `key=value` tool arguments and value coercion.

use lspcall_mcp::ArgValue;
use std::collections::BTreeMap;

/// Coerce one raw value: `true`/`false` (any case), then integer, then
/// finite float, then a quoted string with its quotes removed, then the raw
/// string.
pub fn parse_value(raw: &str) -> ArgValue {
    if raw.eq_ignore_ascii_case("true") {
        return ArgValue::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return ArgValue::Bool(false);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return ArgValue::Integer(n);
    }
    // NaN and infinities have no JSON representation.
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() => return ArgValue::Float(f),
        _ => {}
    }
    ArgValue::String(unquote(raw).to_string())
}

fn unquote(raw: &str) -> &str {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Parse `key=value` pairs. Splits on the first `=`; a repeated key keeps the
/// last value.
pub fn parse_tool_arguments(pairs: &[String]) -> Result<BTreeMap<String, ArgValue>, String> {
    let mut arguments = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(format!(
                "Invalid argument format: '{pair}'. Expected 'key=value'."
            ));
        };
        if key.is_empty() {
            return Err(format!("Argument key cannot be empty in '{pair}'."));
        }
        arguments.insert(key.to_string(), parse_value(value));
    }
    Ok(arguments)
}
