//! Companion schema files.
//!
//! A schema can be declared in TOML next to the application instead of in
//! code:
//!
//! ```toml
//! name = "Server"
//!
//! [[field]]
//! name = "port"
//! type = "u16"
//! default = "8080"
//! usage = "Port to listen on."
//! env = "PORT"
//!
//! [[field]]
//! name = "database"
//! type = "record"
//!
//!   [[field.fields]]
//!   name = "url"
//!   type = "option<string>"
//!   required = true
//! ```
//!
//! Types: `bool`, `string`, `i8`..`i64`, `u8`..`u64`, `f32`, `f64`,
//! `duration`, `bytes`, `seq<T>`, `map<K, V>`, `option<T>` and `record`.
//! A `record` anywhere in a type takes its fields from the entry's `fields`
//! list.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::SchemaError;
use crate::schema::{FieldSpec, Kind, Schema};
use crate::types;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaDoc {
    name: String,
    #[serde(default)]
    field: Vec<FieldEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    default: Option<String>,
    usage: Option<String>,
    #[serde(default)]
    required: bool,
    env: Option<String>,
    flag: Option<String>,
    json: Option<String>,
    yaml: Option<String>,
    toml: Option<String>,
    hcl: Option<String>,
    #[serde(default)]
    embedded: bool,
    #[serde(default)]
    private: bool,
    /// Name of the nested record; defaults to the field name.
    record: Option<String>,
    #[serde(default)]
    fields: Vec<FieldEntry>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

impl Schema {
    /// Parse a schema from its TOML description.
    pub fn from_toml_str(content: &str) -> Result<Schema, SchemaError> {
        let doc: SchemaDoc =
            toml::from_str(content).map_err(|e| SchemaError::InvalidSchemaFile(e.to_string()))?;
        build_schema(doc.name, doc.field)
    }
}

fn build_schema(name: String, entries: Vec<FieldEntry>) -> Result<Schema, SchemaError> {
    let mut schema = Schema::new(name);
    for entry in entries {
        schema = schema.field(build_field(entry)?);
    }
    Ok(schema)
}

fn build_field(entry: FieldEntry) -> Result<FieldSpec, SchemaError> {
    let FieldEntry {
        name,
        ty,
        default,
        usage,
        required,
        env,
        flag,
        json,
        yaml,
        toml,
        hcl,
        embedded,
        private,
        record,
        fields,
        tags,
    } = entry;

    let record_name = record.unwrap_or_else(|| name.clone());
    let nested = if fields.is_empty() {
        None
    } else {
        Some(build_schema(record_name.clone(), fields)?)
    };
    let kind = parse_type(&ty, &name, nested.as_ref(), &record_name)?;

    let mut spec = if embedded {
        let Kind::Record(schema) = kind else {
            return Err(SchemaError::InvalidSchemaFile(format!(
                "embedded field '{name}' must have type 'record'"
            )));
        };
        FieldSpec::embedded(schema)
    } else {
        FieldSpec::new(name, kind)
    };

    let named_tags = [
        (types::DEFAULT, default),
        (types::USAGE, usage),
        (types::ENV, env),
        (types::FLAG, flag),
        (types::JSON, json),
        (types::YAML, yaml),
        (types::TOML, toml),
        (types::HCL, hcl),
    ];
    for (tag, value) in named_tags {
        if let Some(value) = value {
            spec = spec.tag(tag, value);
        }
    }
    for (tag, value) in tags {
        spec = spec.tag(tag, value);
    }
    if required {
        spec = spec.required();
    }
    if private {
        spec = spec.private();
    }
    Ok(spec)
}

fn parse_type(
    ty: &str,
    field: &str,
    nested: Option<&Schema>,
    record_name: &str,
) -> Result<Kind, SchemaError> {
    let unknown = || SchemaError::UnknownType {
        field: field.to_string(),
        ty: ty.to_string(),
    };
    let ty = ty.trim();

    if let Some((outer, args)) = ty.split_once('<') {
        let args = args.strip_suffix('>').ok_or_else(unknown)?;
        let args = split_args(args);
        let arg = |i: usize| -> Result<Kind, SchemaError> {
            parse_type(args[i], field, nested, record_name)
        };
        return match (outer.trim(), args.len()) {
            ("seq", 1) => Ok(Kind::seq(arg(0)?)),
            ("option", 1) => Ok(Kind::optional(arg(0)?)),
            ("map", 2) => Ok(Kind::map(arg(0)?, arg(1)?)),
            _ => Err(unknown()),
        };
    }

    let kind = match ty {
        "bool" => Kind::Bool,
        "string" => Kind::String,
        "i8" => Kind::I8,
        "i16" => Kind::I16,
        "i32" => Kind::I32,
        "i64" => Kind::I64,
        "u8" => Kind::U8,
        "u16" => Kind::U16,
        "u32" => Kind::U32,
        "u64" => Kind::U64,
        "f32" => Kind::F32,
        "f64" => Kind::F64,
        "duration" => Kind::Duration,
        "bytes" => Kind::bytes(),
        "record" => Kind::Record(
            nested
                .cloned()
                .unwrap_or_else(|| Schema::new(record_name)),
        ),
        _ => return Err(unknown()),
    };
    Ok(kind)
}

/// Split generic arguments on top-level commas.
fn split_args(args: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(args[start..].trim());
    out
}
