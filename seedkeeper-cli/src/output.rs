//! Output formatting for human-readable and JSON modes.
//!
//! JSON mode prints exactly one JSON document per invocation, on stdout for
//! results and on stderr for errors.

use serde::Serialize;

/// Prints a success message.
pub fn print_success(msg: &str, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::json!({ "status": "ok", "message": msg }));
    } else {
        println!("ok: {msg}");
    }
}

/// Prints a flat serializable value, one `key: value` line per field in
/// human mode.
pub fn print_value<T: Serialize>(value: &T, json_mode: bool) {
    let encoded = match serde_json::to_value(value) {
        Ok(encoded) => encoded,
        Err(e) => {
            eprintln!("error formatting output: {e}");
            return;
        }
    };
    if json_mode {
        println!("{encoded}");
        return;
    }
    match encoded {
        serde_json::Value::Object(fields) => {
            for (key, value) in fields {
                match value {
                    serde_json::Value::Null => println!("{key}: -"),
                    serde_json::Value::String(s) => println!("{key}: {s}"),
                    other => println!("{key}: {other}"),
                }
            }
        }
        other => println!("{other}"),
    }
}

/// Prints an error report, including its causes.
pub fn print_error(report: &eyre::Report, json_mode: bool) {
    if json_mode {
        let causes: Vec<String> = report.chain().skip(1).map(ToString::to_string).collect();
        eprintln!(
            "{}",
            serde_json::json!({ "error": report.to_string(), "causes": causes })
        );
    } else {
        eprintln!("error: {report}");
        for cause in report.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
}
