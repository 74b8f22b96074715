//! Value coercion: turn a raw source value into the typed value of a field.
//!
//! Environment variables, flags and defaults arrive as text; file decoders
//! hand over loosely-typed [`serde_json::Value`]s. Both paths end in the same
//! typed representation, the serde shape of the field's Rust type.
//!
//! An empty string or a `null` is never an error: it coerces to `None` and
//! the stage leaves the slot alone.

use std::num::IntErrorKind;

use serde_json::{Map, Value};

use crate::duration;
use crate::error::LayerfigError;
use crate::file::RawMap;
use crate::record::Record;
use crate::resolve::{self, Policy};
use crate::schema::{Kind, Schema};
use crate::tree::FieldTree;
use crate::types;
use crate::validate;

/// Coerces raw values for one source.
///
/// `format` is the key kind used to look up the fields of nested records:
/// the decoder format for file values, `json` for structured text.
pub struct Coercer<'a> {
    policy: &'a Policy,
    format: &'a str,
}

impl<'a> Coercer<'a> {
    pub fn new(policy: &'a Policy, format: &'a str) -> Self {
        Self { policy, format }
    }

    /// Coerce a textual value.
    pub fn coerce_str(
        &self,
        kind: &Kind,
        raw: &str,
        path: &str,
    ) -> Result<Option<Value>, LayerfigError> {
        if raw.is_empty() {
            return Ok(None);
        }
        let value = match kind {
            Kind::Optional(inner) => return self.coerce_str(inner, raw, path),
            Kind::Text(decoder) => decoder
                .parse(raw)
                .map_err(|reason| LayerfigError::coercion(path, raw, reason))?,
            _ if is_structured(kind) && looks_like_json(raw) => {
                let parsed: Value = serde_json::from_str(raw.trim())
                    .map_err(|e| LayerfigError::coercion(path, raw, e.to_string()))?;
                // JSON text names nested fields by their JSON keys, whatever
                // source carried it.
                return Coercer::new(self.policy, types::JSON).coerce_value(kind, &parsed, path);
            }
            Kind::Record(_) => {
                return Err(LayerfigError::coercion(path, raw, "expected a JSON object"));
            }
            Kind::Seq(element) if matches!(element.as_ref(), Kind::U8) => {
                Value::Array(raw.bytes().map(Value::from).collect())
            }
            Kind::Seq(element) => {
                let mut items = Vec::new();
                for part in raw.split(',') {
                    let item = self.coerce_str(element, part.trim(), path)?;
                    items.push(item.unwrap_or_else(|| element.zero()));
                }
                Value::Array(items)
            }
            Kind::Map(key_kind, value_kind) => {
                let mut entries = Map::new();
                for entry in raw.split(',') {
                    let Some((key, value)) = entry.split_once(':') else {
                        return Err(LayerfigError::coercion(
                            path,
                            raw,
                            format!("map entry {entry:?} is missing ':'"),
                        ));
                    };
                    let key = self.coerce_map_key(key_kind, key.trim(), path)?;
                    let value = self
                        .coerce_str(value_kind, value.trim(), path)?
                        .unwrap_or_else(|| value_kind.zero());
                    entries.insert(key, value);
                }
                Value::Object(entries)
            }
            scalar => coerce_scalar(scalar, raw)
                .map_err(|reason| LayerfigError::coercion(path, raw, reason))?,
        };
        Ok(Some(value))
    }

    /// Coerce a value decoded from a file.
    pub fn coerce_value(
        &self,
        kind: &Kind,
        raw: &Value,
        path: &str,
    ) -> Result<Option<Value>, LayerfigError> {
        let value = match (kind, raw) {
            (_, Value::Null) => return Ok(None),
            (Kind::Optional(inner), _) => return self.coerce_value(inner, raw, path),
            (_, Value::String(text)) => return self.coerce_str(kind, text, path),
            (Kind::Record(schema), Value::Object(_) | Value::Array(_)) => {
                self.coerce_record(schema, raw, path)?
            }
            (Kind::Seq(element), Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let item = self.coerce_value(element, item, &format!("{path}.{i}"))?;
                    out.push(item.unwrap_or_else(|| element.zero()));
                }
                Value::Array(out)
            }
            (Kind::Map(key_kind, value_kind), Value::Object(object)) => {
                let mut entries = Map::new();
                for (key, value) in object {
                    let coerced_key = self.coerce_map_key(key_kind, key, path)?;
                    let value = self
                        .coerce_value(value_kind, value, &format!("{path}.{key}"))?
                        .unwrap_or_else(|| value_kind.zero());
                    entries.insert(coerced_key, value);
                }
                Value::Object(entries)
            }
            (_, Value::Bool(_) | Value::Number(_)) if !is_structured(kind) => {
                let text = scalar_text(kind, raw);
                return self.coerce_str(kind, &text, path);
            }
            (_, other) => {
                return Err(LayerfigError::coercion(
                    path,
                    other.to_string(),
                    format!("cannot use {} as {kind}", json_type(other)),
                ));
            }
        };
        Ok(Some(value))
    }

    fn coerce_map_key(&self, kind: &Kind, raw: &str, path: &str) -> Result<String, LayerfigError> {
        let value = self.coerce_str(kind, raw, path)?.unwrap_or_else(|| kind.zero());
        match value {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(LayerfigError::coercion(path, raw, format!("{kind} cannot be a map key"))),
        }
    }

    /// Resolve one nested record: defaults, then every object in order, then
    /// the record's own required check.
    fn coerce_record(
        &self,
        schema: &Schema,
        raw: &Value,
        path: &str,
    ) -> Result<Value, LayerfigError> {
        let objects: Vec<&RawMap> = match raw {
            Value::Object(object) => vec![object],
            Value::Array(items) if items.iter().all(Value::is_object) => {
                items.iter().filter_map(Value::as_object).collect()
            }
            other => {
                return Err(LayerfigError::coercion(
                    path,
                    other.to_string(),
                    format!("cannot use {} as record {}", json_type(other), schema.name()),
                ));
            }
        };

        let tree = FieldTree::build(schema, &self.policy.keys)
            .map_err(|e| LayerfigError::coercion(path, raw.to_string(), e.to_string()))?;
        let mut record = Record::new(&tree);
        let nest = |err| nest_error(path, err);

        if !self.policy.skip_defaults {
            resolve::apply_defaults(&tree, &mut record, self.policy).map_err(nest)?;
        }
        for object in objects {
            let mut map = object.clone();
            resolve::apply_map(&tree, &mut record, &mut map, self.format, self.policy)
                .map_err(nest)?;
            if !self.policy.allow_unknown_fields
                && let Some((key, value)) = map.iter().next()
            {
                return Err(LayerfigError::coercion(
                    &format!("{path}.{key}"),
                    value.to_string(),
                    "unknown field",
                ));
            }
        }
        validate::check_required(&tree, &record, self.policy).map_err(nest)?;
        Ok(record.to_value())
    }
}

fn nest_error(parent: &str, err: LayerfigError) -> LayerfigError {
    match err {
        LayerfigError::Coercion { path, literal, reason } => LayerfigError::Coercion {
            path: format!("{parent}.{path}"),
            literal,
            reason,
        },
        LayerfigError::MissingRequired { fields } => LayerfigError::MissingRequired {
            fields: fields.into_iter().map(|f| format!("{parent}.{f}")).collect(),
        },
        other => other,
    }
}

/// Kinds that accept a JSON document when given as text.
fn is_structured(kind: &Kind) -> bool {
    match kind {
        Kind::Record(_) => true,
        Kind::Seq(inner) | Kind::Optional(inner) => is_structured(inner),
        Kind::Map(_, value) => is_structured(value),
        _ => false,
    }
}

fn looks_like_json(raw: &str) -> bool {
    let trimmed = raw.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Text form of a decoded bool or number. Integral floats lose their
/// fraction when the target is an integer, so `5.0` from YAML fits a `u8`.
fn scalar_text(kind: &Kind, raw: &Value) -> String {
    let integer_kind = matches!(
        kind,
        Kind::I8 | Kind::I16 | Kind::I32 | Kind::I64 | Kind::U8 | Kind::U16 | Kind::U32 | Kind::U64
    );
    match raw {
        Value::Number(n) if integer_kind && n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

fn coerce_scalar(kind: &Kind, raw: &str) -> Result<Value, String> {
    match kind {
        Kind::String => Ok(Value::String(raw.to_string())),
        Kind::Bool => parse_bool(raw).map(Value::Bool),
        Kind::I8 => signed(raw, i8::MIN.into(), i8::MAX.into()),
        Kind::I16 => signed(raw, i16::MIN.into(), i16::MAX.into()),
        Kind::I32 => signed(raw, i32::MIN.into(), i32::MAX.into()),
        Kind::I64 => signed(raw, i64::MIN.into(), i64::MAX.into()),
        Kind::U8 => unsigned(raw, u8::MAX.into()),
        Kind::U16 => unsigned(raw, u16::MAX.into()),
        Kind::U32 => unsigned(raw, u32::MAX.into()),
        Kind::U64 => unsigned(raw, u64::MAX),
        Kind::F32 => {
            let parsed: f32 = raw.parse().map_err(|_| "invalid float".to_string())?;
            if parsed.is_infinite() && raw.parse::<f64>().is_ok_and(f64::is_finite) {
                return Err("value out of range for f32".into());
            }
            finite(f64::from(parsed))
        }
        Kind::F64 => finite(raw.parse().map_err(|_| "invalid float".to_string())?),
        Kind::Duration => duration::parse(raw).map(duration::to_value),
        other => Err(format!("{other} cannot be parsed from text")),
    }
}

fn finite(v: f64) -> Result<Value, String> {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .ok_or_else(|| "non-finite floats are not supported".to_string())
}

pub(crate) fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err("invalid boolean".into()),
    }
}

fn signed(raw: &str, min: i64, max: i64) -> Result<Value, String> {
    let n = parse_int(raw)?;
    if n < i128::from(min) || n > i128::from(max) {
        return Err("value out of range".into());
    }
    Ok(Value::from(n as i64))
}

fn unsigned(raw: &str, max: u64) -> Result<Value, String> {
    let n = parse_int(raw)?;
    if n < 0 || n > i128::from(max) {
        return Err("value out of range".into());
    }
    Ok(Value::from(n as u64))
}

/// Integer literal with an optional sign and base prefix: `0b`, `0o`, `0x`,
/// or a bare leading `0` for octal. `_` may separate digits.
fn parse_int(raw: &str) -> Result<i128, String> {
    let (negative, body) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    let lower = body.get(..2).map(str::to_ascii_lowercase);
    let (radix, digits, prefixed) = match lower.as_deref() {
        Some("0x") => (16, &body[2..], true),
        Some("0b") => (2, &body[2..], true),
        Some("0o") => (8, &body[2..], true),
        _ if body.len() > 1 && body.starts_with('0') => (8, &body[1..], true),
        _ => (10, body, false),
    };

    if !underscores_ok(digits, prefixed) {
        return Err("invalid syntax".into());
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_digit(radix)) {
        return Err("invalid syntax".into());
    }

    let magnitude = u128::from_str_radix(&cleaned, radix).map_err(|e| match e.kind() {
        IntErrorKind::PosOverflow => "value out of range".to_string(),
        _ => "invalid syntax".to_string(),
    })?;
    let magnitude = i128::try_from(magnitude).map_err(|_| "value out of range".to_string())?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// `_` must sit between two digits, or between a base prefix and a digit.
fn underscores_ok(digits: &str, prefixed: bool) -> bool {
    let mut after_digit = prefixed;
    let mut last_underscore = false;
    for c in digits.chars() {
        if c == '_' {
            if !after_digit {
                return false;
            }
            after_digit = false;
            last_underscore = true;
        } else {
            after_digit = true;
            last_underscore = false;
        }
    }
    !last_underscore
}
