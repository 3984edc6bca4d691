use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A type the model can be forced to emit through `response_format: json_schema`.
///
/// Strict mode on the OpenAI side wants every object closed
/// (`additionalProperties: false`), every property listed in `required`,
/// and no `$ref` indirection. [`StructuredOutput::strict_schema`] rewrites the
/// schemars output into that shape.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn strict_schema() -> Value {
        let mut value = serde_json::to_value(schema_for!(Self)).unwrap_or_default();

        let definitions = value
            .as_object_mut()
            .and_then(|root| root.remove("definitions"))
            .unwrap_or(Value::Object(Map::new()));

        inline_definitions(&mut value, &definitions);
        close_objects(&mut value);

        if let Value::Object(root) = &mut value {
            root.remove("$schema");
            root.remove("title");
        }
        value
    }

    /// Name sent as `json_schema.name`; OpenAI allows `[a-zA-Z0-9_-]` only.
    fn format_name() -> String {
        <Self as JsonSchema>::schema_name()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn close_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object") {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
                let keys: Vec<Value> = map
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| props.keys().cloned().map(Value::String).collect())
                    .unwrap_or_default();
                map.insert("required".to_string(), Value::Array(keys));
            }
            map.values_mut().for_each(close_objects);
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}

fn inline_definitions(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|path| path.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(mut resolved) = target {
                inline_definitions(&mut resolved, definitions);
                *value = resolved;
                return;
            }

            // schemars wraps documented references as `allOf: [{ $ref }]`
            let single_all_of = match map.get("allOf") {
                Some(Value::Array(parts)) if parts.len() == 1 => parts.first().cloned(),
                _ => None,
            };
            if let Some(mut inner) = single_all_of {
                inline_definitions(&mut inner, definitions);
                if let Some(description) = map.get("description").cloned() {
                    if let Value::Object(inner_map) = &mut inner {
                        inner_map.insert("description".to_string(), description);
                    }
                }
                *value = inner;
                return;
            }

            for child in map.values_mut() {
                inline_definitions(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                inline_definitions(item, definitions);
            }
        }
        _ => {}
    }
}
