use jail_core::JailError;
use rhai::{Array, Dynamic, EvalAltResult, FnPtr, ImmutableString, Map, Position, FLOAT, INT};
use rust_decimal::Decimal;
use serde_json::{Number, Value};

pub fn json_to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(value) => Dynamic::from_bool(*value),
        Value::Number(number) => {
            if let Some(value) = number.as_i64() {
                Dynamic::from_int(value as INT)
            } else {
                Dynamic::from_float(number.as_f64().unwrap_or(FLOAT::NAN) as FLOAT)
            }
        }
        Value::String(value) => Dynamic::from(value.clone()),
        Value::Array(values) => {
            let mut array = Array::with_capacity(values.len());
            for value in values {
                array.push(json_to_dynamic(value));
            }
            Dynamic::from_array(array)
        }
        Value::Object(values) => {
            let mut map = Map::new();
            for (key, value) in values {
                map.insert(key.as_str().into(), json_to_dynamic(value));
            }
            Dynamic::from_map(map)
        }
    }
}

/// Converts a script value to JSON the way `JSON.stringify` would: unit is
/// `null`, function pointers inside maps are skipped and inside arrays become
/// `null`, decimals are rendered as strings.
pub fn dynamic_to_json(value: Dynamic) -> Result<Value, JailError> {
    let value = value.flatten();
    if value.is_unit() {
        return Ok(Value::Null);
    }
    if value.is::<bool>() {
        return Ok(Value::Bool(value.cast::<bool>()));
    }
    if value.is::<INT>() {
        return Ok(Value::from(value.cast::<INT>()));
    }
    if value.is::<FLOAT>() {
        return Ok(Number::from_f64(value.cast::<FLOAT>() as f64)
            .map(Value::Number)
            .unwrap_or(Value::Null));
    }
    if value.is::<Decimal>() {
        return Ok(Value::String(value.cast::<Decimal>().to_string()));
    }
    if value.is::<ImmutableString>() {
        return Ok(Value::String(value.cast::<ImmutableString>().to_string()));
    }
    if value.is::<char>() {
        return Ok(Value::String(value.cast::<char>().to_string()));
    }
    if value.is::<FnPtr>() {
        return Ok(Value::Null);
    }
    if value.is::<Array>() {
        let array = value.cast::<Array>();
        let mut out = Vec::with_capacity(array.len());
        for item in array {
            out.push(dynamic_to_json(item)?);
        }
        return Ok(Value::Array(out));
    }
    if value.is::<Map>() {
        let map = value.cast::<Map>();
        let mut out = serde_json::Map::new();
        for (key, value) in map {
            if value.is::<FnPtr>() {
                continue;
            }
            out.insert(key.to_string(), dynamic_to_json(value)?);
        }
        return Ok(Value::Object(out));
    }

    Err(JailError::script(format!(
        "cannot convert script value of type {} to JSON",
        value.type_name()
    )))
}

pub fn stringify_dynamic(value: Dynamic) -> Result<String, JailError> {
    let json = dynamic_to_json(value)?;
    serde_json::to_string(&json).map_err(|error| JailError::internal(error.to_string()))
}

pub fn parse_to_dynamic(text: &str) -> Result<Dynamic, JailError> {
    let value = serde_json::from_str::<Value>(text)
        .map_err(|error| JailError::script(format!("JSON parse failed: {}", error)))?;
    Ok(json_to_dynamic(&value))
}

/// Text form of a value returned from a script call. Unit renders as
/// `undefined`, strings pass through, everything else is JSON.
pub fn dynamic_to_text(value: Dynamic) -> Result<String, JailError> {
    let value = value.flatten();
    if value.is_unit() {
        return Ok("undefined".to_string());
    }
    if value.is::<ImmutableString>() {
        return Ok(value.cast::<ImmutableString>().to_string());
    }
    stringify_dynamic(value)
}

pub fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

pub fn script_error(error: Box<EvalAltResult>) -> JailError {
    JailError::script(error.to_string())
}
