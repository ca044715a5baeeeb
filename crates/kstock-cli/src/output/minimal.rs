use serde_json::Value;

/// Print just the key answer from the output.
///
/// Looks for well-known result fields in priority order, then falls back to
/// the first field. Weight lists print one `name weight` line each.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = [
        "display_weights",
        "expected_return",
        "jensens_alpha",
        "pnl_percent",
        "covariance",
        "results",
    ];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    print_value(val);
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    // Scalar result
    println!("{}", format_minimal(result_obj));
}

fn print_value(value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                match (item.get("name"), item.get("weight")) {
                    (Some(name), Some(weight)) => {
                        println!("{} {}", format_minimal(name), format_minimal(weight))
                    }
                    _ => println!("{}", format_minimal(item)),
                }
            }
        }
        _ => println!("{}", format_minimal(value)),
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
