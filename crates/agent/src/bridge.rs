//! Schema bridge between the tool host and the model.
//!
//! Converts discovered [`ToolSchema`]s into function definitions the model
//! understands, and checks each model-requested call against the schema
//! before anything is sent to the tool host. Pure functions, no state.

use railchat_core::{
    BridgeError, FunctionSpec, FunctionTool, RpcInvocation, ToolCallRequest, ToolSchema,
};
use serde_json::{Map, Value, json};

/// Convert tool schemas to the model's function-calling format.
pub fn to_model_schemas(schemas: &[ToolSchema]) -> Vec<FunctionTool> {
    schemas
        .iter()
        .map(|schema| FunctionTool {
            r#type: "function".into(),
            function: FunctionSpec {
                name: schema.name.clone(),
                description: if schema.description.trim().is_empty() {
                    schema.name.clone()
                } else {
                    schema.description.clone()
                },
                parameters: normalize_parameters(&schema.parameters),
            },
        })
        .collect()
}

fn normalize_parameters(parameters: &Value) -> Value {
    match parameters {
        Value::Object(map) => {
            let mut map = map.clone();
            map.entry("type").or_insert_with(|| json!("object"));
            Value::Object(map)
        }
        _ => json!({"type": "object", "properties": {}}),
    }
}

/// Validate a model-requested call and turn it into an invocation.
pub fn to_rpc_invocation(
    call: &ToolCallRequest,
    schemas: &[ToolSchema],
) -> Result<RpcInvocation, BridgeError> {
    let schema = schemas
        .iter()
        .find(|s| s.name == call.name)
        .ok_or_else(|| BridgeError::UnknownTool {
            name: call.name.clone(),
        })?;

    let invalid = |reason: String| BridgeError::InvalidArguments {
        tool: call.name.clone(),
        reason,
    };

    let Value::Object(args) = &call.arguments else {
        return Err(invalid(format!(
            "arguments must be a JSON object, got {}",
            type_name(&call.arguments)
        )));
    };

    let empty = Map::new();
    let properties = schema
        .parameters
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let required: Vec<&str> = schema
        .parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for field in &required {
        match args.get(*field) {
            None | Some(Value::Null) => {
                return Err(invalid(format!("missing required field: '{field}'")));
            }
            Some(_) => {}
        }
    }

    for (field, value) in args {
        let Some(property) = properties.get(field) else {
            continue;
        };
        // Optional fields sent as null are treated as absent.
        if value.is_null() && !required.contains(&field.as_str()) {
            continue;
        }
        check_type(field, value, property).map_err(invalid)?;
        check_enum(field, value, property).map_err(invalid)?;
    }

    Ok(RpcInvocation {
        name: schema.name.clone(),
        arguments: call.arguments.clone(),
        idempotent: schema.idempotent,
    })
}

fn check_type(field: &str, value: &Value, property: &Value) -> Result<(), String> {
    let declared: Vec<&str> = match property.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).collect(),
        _ => return Ok(()),
    };
    if declared.is_empty() || declared.iter().any(|t| matches_type(value, t)) {
        return Ok(());
    }
    Err(format!(
        "field '{field}' should be {}, got {}",
        declared.join(" or "),
        type_name(value)
    ))
}

/// JSON type check. Numbers and booleans may arrive string-encoded.
fn matches_type(value: &Value, declared: &str) -> bool {
    match declared {
        "string" => value.is_string(),
        "number" => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
            _ => false,
        },
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        "boolean" => match value {
            Value::Bool(_) => true,
            Value::String(s) => matches!(s.trim(), "true" | "false"),
            _ => false,
        },
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        // Unknown type keywords are not ours to enforce.
        _ => true,
    }
}

fn check_enum(field: &str, value: &Value, property: &Value) -> Result<(), String> {
    let Some(allowed) = property.get("enum").and_then(Value::as_array) else {
        return Ok(());
    };
    let text = scalar_text(value);
    let found = allowed
        .iter()
        .any(|option| option == value || (text.is_some() && scalar_text(option) == text));
    if found {
        return Ok(());
    }
    let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
    Err(format!(
        "field '{field}' must be one of [{}], got {value}",
        options.join(", ")
    ))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
