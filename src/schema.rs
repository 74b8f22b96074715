//! Declarative record schemas.
//!
//! A [`Schema`] is the single source of truth for a settings record: the
//! field identifiers, their static [`Kind`], and the per-field tags that
//! steer key derivation (`env`, `flag`, `json`, ...), defaults and required
//! checks. It is built in code with [`FieldSpec`] builders, or parsed from a
//! companion schema file (see [`Schema::from_toml_str`]).
//!
//! ```ignore
//! let schema = Schema::new("Server")
//!     .field(FieldSpec::new("host", Kind::String).default("localhost"))
//!     .field(FieldSpec::new("port", Kind::U16).default("8080").env("PORT"))
//!     .field(FieldSpec::nested("database", Schema::new("Database")
//!         .field(FieldSpec::new("url", Kind::optional(Kind::String)).required())));
//! ```
//!
//! Identifiers double as the serde field names of the typed record, so a
//! `Settings` struct deserializes straight from the resolved values.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::types;

/// A settings record that knows its own schema.
///
/// The schema identifiers must match the serde field names of `Self`.
/// Embedded records map to `#[serde(flatten)]` fields.
pub trait Settings: DeserializeOwned {
    fn schema() -> Schema;
}

/// Static type of a schema field.
#[derive(Debug, Clone)]
pub enum Kind {
    Bool,
    String,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    /// A `std::time::Duration`, written as a compound literal like `1h2m3s`.
    Duration,
    /// A sequence; `Seq(U8)` takes a raw string as its literal bytes.
    Seq(Box<Kind>),
    Map(Box<Kind>, Box<Kind>),
    /// A value that may be absent; its slot starts out empty.
    Optional(Box<Kind>),
    Record(Schema),
    /// A type that decodes itself from text.
    Text(TextDecoder),
}

impl Kind {
    pub fn seq(element: Kind) -> Self {
        Kind::Seq(Box::new(element))
    }

    pub fn bytes() -> Self {
        Kind::Seq(Box::new(Kind::U8))
    }

    pub fn map(key: Kind, value: Kind) -> Self {
        Kind::Map(Box::new(key), Box::new(value))
    }

    pub fn optional(inner: Kind) -> Self {
        Kind::Optional(Box::new(inner))
    }

    /// A kind for any type that parses itself with [`FromStr`].
    pub fn text<T>() -> Self
    where
        T: FromStr + Serialize + Default + 'static,
        T::Err: fmt::Display,
    {
        Kind::Text(TextDecoder::of::<T>())
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Kind::Record(_))
    }

    /// The value an untouched slot of this kind holds.
    pub fn zero(&self) -> Value {
        match self {
            Kind::Bool => Value::Bool(false),
            Kind::String => Value::String(String::new()),
            Kind::I8 | Kind::I16 | Kind::I32 | Kind::I64 => Value::from(0i64),
            Kind::U8 | Kind::U16 | Kind::U32 | Kind::U64 => Value::from(0u64),
            Kind::F32 | Kind::F64 => Value::from(0.0f64),
            Kind::Duration => crate::duration::to_value(std::time::Duration::ZERO),
            Kind::Seq(_) => Value::Array(Vec::new()),
            Kind::Map(_, _) => Value::Object(Map::new()),
            Kind::Optional(_) => Value::Null,
            Kind::Record(schema) => Value::Object(schema.zero()),
            Kind::Text(decoder) => decoder.zero(),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Bool => f.write_str("bool"),
            Kind::String => f.write_str("string"),
            Kind::I8 => f.write_str("i8"),
            Kind::I16 => f.write_str("i16"),
            Kind::I32 => f.write_str("i32"),
            Kind::I64 => f.write_str("i64"),
            Kind::U8 => f.write_str("u8"),
            Kind::U16 => f.write_str("u16"),
            Kind::U32 => f.write_str("u32"),
            Kind::U64 => f.write_str("u64"),
            Kind::F32 => f.write_str("f32"),
            Kind::F64 => f.write_str("f64"),
            Kind::Duration => f.write_str("duration"),
            Kind::Seq(element) => write!(f, "seq<{element}>"),
            Kind::Map(key, value) => write!(f, "map<{key}, {value}>"),
            Kind::Optional(inner) => write!(f, "option<{inner}>"),
            Kind::Record(schema) => write!(f, "record {}", schema.name),
            Kind::Text(decoder) => f.write_str(decoder.type_name),
        }
    }
}

type ParseFn = dyn Fn(&str) -> Result<Value, String> + Send + Sync;
type ZeroFn = dyn Fn() -> Value + Send + Sync;

/// Text decoding capability of a [`Kind::Text`] field.
#[derive(Clone)]
pub struct TextDecoder {
    type_name: &'static str,
    parse: Arc<ParseFn>,
    zero: Arc<ZeroFn>,
}

impl TextDecoder {
    pub fn of<T>() -> Self
    where
        T: FromStr + Serialize + Default + 'static,
        T::Err: fmt::Display,
    {
        Self {
            type_name: std::any::type_name::<T>(),
            parse: Arc::new(|raw: &str| {
                let parsed = raw.parse::<T>().map_err(|e| e.to_string())?;
                serde_json::to_value(parsed).map_err(|e| e.to_string())
            }),
            zero: Arc::new(|| serde_json::to_value(T::default()).unwrap_or(Value::Null)),
        }
    }

    pub fn parse(&self, raw: &str) -> Result<Value, String> {
        (self.parse)(raw)
    }

    pub fn zero(&self) -> Value {
        (self.zero)()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextDecoder")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// An ordered list of field declarations describing one record.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field declaration. Declaration order is resolution order.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Zero-valued object for this record. Embedded records share the
    /// object of their parent; private fields are left out.
    pub fn zero(&self) -> Map<String, Value> {
        let mut out = Map::new();
        self.zero_into(&mut out);
        out
    }

    fn zero_into(&self, out: &mut Map<String, Value>) {
        for spec in &self.fields {
            match &spec.kind {
                Kind::Record(schema) if spec.embedded => schema.zero_into(out),
                _ if spec.private => {}
                kind => {
                    out.insert(spec.ident.clone(), kind.zero());
                }
            }
        }
    }
}

/// Declaration of one schema field: identifier, kind and tags.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    ident: String,
    kind: Kind,
    tags: BTreeMap<String, String>,
    embedded: bool,
    private: bool,
}

impl FieldSpec {
    pub fn new(ident: impl Into<String>, kind: Kind) -> Self {
        Self {
            ident: ident.into(),
            kind,
            tags: BTreeMap::new(),
            embedded: false,
            private: false,
        }
    }

    /// A named nested record: its fields live under `ident`.
    pub fn nested(ident: impl Into<String>, schema: Schema) -> Self {
        Self::new(ident, Kind::Record(schema))
    }

    /// An embedded record: its fields are spliced into the enclosing record.
    pub fn embedded(schema: Schema) -> Self {
        let ident = schema.name.clone();
        let mut spec = Self::new(ident, Kind::Record(schema));
        spec.embedded = true;
        spec
    }

    /// Set an arbitrary tag. Later calls for the same tag win.
    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    pub fn default(self, value: impl Into<String>) -> Self {
        self.tag(types::DEFAULT, value)
    }

    pub fn usage(self, text: impl Into<String>) -> Self {
        self.tag(types::USAGE, text)
    }

    pub fn env(self, key: impl Into<String>) -> Self {
        self.tag(types::ENV, key)
    }

    pub fn flag(self, key: impl Into<String>) -> Self {
        self.tag(types::FLAG, key)
    }

    pub fn json(self, key: impl Into<String>) -> Self {
        self.tag(types::JSON, key)
    }

    pub fn yaml(self, key: impl Into<String>) -> Self {
        self.tag(types::YAML, key)
    }

    pub fn toml(self, key: impl Into<String>) -> Self {
        self.tag(types::TOML, key)
    }

    pub fn hcl(self, key: impl Into<String>) -> Self {
        self.tag(types::HCL, key)
    }

    pub fn required(self) -> Self {
        self.tag(types::REQUIRED, "true")
    }

    /// Mark the field as not externally settable. Private fields are
    /// skipped by the tree builder unless embedded.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn ident(&self) -> &str {
        &self.ident
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn get_tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    pub fn is_private(&self) -> bool {
        self.private
    }
}
