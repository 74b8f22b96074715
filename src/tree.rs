//! Field tree: the flattened, ordered list of field descriptors derived from
//! a [`Schema`].
//!
//! Each descriptor knows its dotted path, its parent (by index), its
//! effective lookup key for every source and the raw default. Keys are
//! computed once here and never change afterward.
//!
//! # Key composition
//!
//! For environment variables and flags the effective key is the global
//! prefix, then every ancestor key, then the field's own key, joined by the
//! source delimiter:
//!
//! | Field | Env (prefix `APP`) | Flag (prefix `app`) | File |
//! |-------|-------------------|--------------------|------|
//! | `port` | `APP_PORT` | `app.port` | `port` |
//! | `db.pool_size` | `APP_DB_POOL_SIZE` | `app.db.pool_size` | `db.pool_size` |
//!
//! A declared key ending in `,exact` is used verbatim and stops the prefix
//! walk. A declared key of `-` removes the field from that source; on a
//! nested record it removes every descendant that has no explicit key of its
//! own. Embedded records add no level at all.

use std::collections::{BTreeMap, HashMap};

use crate::error::SchemaError;
use crate::schema::{Kind, Schema};
use crate::types;
use crate::words;

/// Everything key derivation depends on.
#[derive(Debug, Clone)]
pub struct KeyOptions {
    pub env_prefix: String,
    pub env_delimiter: String,
    pub flag_prefix: String,
    pub flag_delimiter: String,
    pub allow_duplicates: bool,
    pub dont_generate_tags: bool,
    /// File formats to derive keys for, besides the built-in ones.
    pub formats: Vec<String>,
}

impl Default for KeyOptions {
    fn default() -> Self {
        Self {
            env_prefix: String::new(),
            env_delimiter: "_".into(),
            flag_prefix: String::new(),
            flag_delimiter: ".".into(),
            allow_duplicates: false,
            dont_generate_tags: false,
            formats: Vec::new(),
        }
    }
}

/// A field's own key for one source, before prefixing.
#[derive(Debug, Clone, PartialEq)]
enum OwnKey {
    Skip,
    Key {
        name: String,
        exact: bool,
        explicit: bool,
    },
}

/// One leaf or container of the tree.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub ident: String,
    pub path: String,
    /// Object path of the value in the resolved record.
    pub segments: Vec<String>,
    pub parent: Option<usize>,
    pub kind: Kind,
    pub tags: BTreeMap<String, String>,
    /// Effective key per key kind; a missing entry means excluded.
    pub keys: BTreeMap<String, String>,
    pub default: String,
    pub required: bool,
    pub is_leaf: bool,
    own: BTreeMap<String, OwnKey>,
}

impl FieldDescriptor {
    pub fn key(&self, kind: &str) -> Option<&str> {
        self.keys.get(kind).map(String::as_str)
    }

    pub fn usage(&self) -> &str {
        self.tags.get(types::USAGE).map_or("", String::as_str)
    }
}

/// Ordered arena of descriptors. Parents always precede their children.
#[derive(Debug, Clone)]
pub struct FieldTree {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl FieldTree {
    /// Walk `schema` and derive every descriptor.
    pub fn build(schema: &Schema, opts: &KeyOptions) -> Result<Self, SchemaError> {
        let mut tree = FieldTree {
            name: schema.name().to_string(),
            fields: Vec::new(),
        };
        let key_kinds = key_kinds(opts);
        tree.add_record(schema, None, &[], opts, &key_kinds)?;

        if !tree.fields.iter().any(|f| f.is_leaf) {
            return Err(SchemaError::EmptyRecord {
                name: schema.name().to_string(),
            });
        }
        if !opts.allow_duplicates {
            tree.check_duplicates(&key_kinds)?;
        }
        Ok(tree)
    }

    fn add_record(
        &mut self,
        schema: &Schema,
        parent: Option<usize>,
        segments: &[String],
        opts: &KeyOptions,
        key_kinds: &[String],
    ) -> Result<(), SchemaError> {
        for spec in schema.fields() {
            if spec.is_private() && !spec.is_embedded() {
                continue;
            }

            if let Kind::Record(nested) = spec.kind()
                && spec.is_embedded()
            {
                self.add_record(nested, parent, segments, opts, key_kinds)?;
                continue;
            }

            let mut field_segments = segments.to_vec();
            field_segments.push(spec.ident().to_string());
            let path = field_segments.join(".");

            let required = match spec.get_tag(types::REQUIRED) {
                None => false,
                Some("true") => true,
                Some(other) => {
                    return Err(SchemaError::InvalidRequiredTag {
                        path,
                        value: other.to_string(),
                    });
                }
            };

            validate_nested_kinds(spec.kind(), opts)?;

            let word_list = words::split_words(spec.ident());
            let own = key_kinds
                .iter()
                .map(|kind| {
                    let key = own_key(kind, spec.get_tag(kind), spec.ident(), &word_list, opts);
                    (kind.clone(), key)
                })
                .collect();

            let index = self.fields.len();
            self.fields.push(FieldDescriptor {
                ident: spec.ident().to_string(),
                path,
                segments: field_segments.clone(),
                parent,
                kind: spec.kind().clone(),
                tags: spec.tags().clone(),
                keys: BTreeMap::new(),
                default: spec.get_tag(types::DEFAULT).unwrap_or_default().to_string(),
                required,
                is_leaf: !spec.kind().is_record(),
                own,
            });
            let keys = key_kinds
                .iter()
                .filter_map(|kind| self.effective_key(index, kind, opts).map(|k| (kind.clone(), k)))
                .collect();
            self.fields[index].keys = keys;

            if let Kind::Record(nested) = spec.kind() {
                self.add_record(nested, Some(index), &field_segments, opts, key_kinds)?;
            }
        }
        Ok(())
    }

    fn effective_key(&self, index: usize, kind: &str, opts: &KeyOptions) -> Option<String> {
        let field = &self.fields[index];
        let OwnKey::Key { name, exact, explicit } = field.own.get(kind)? else {
            return None;
        };

        let (delimiter, prefix) = match kind {
            types::ENV => (opts.env_delimiter.as_str(), opts.env_prefix.as_str()),
            types::FLAG => (opts.flag_delimiter.as_str(), opts.flag_prefix.as_str()),
            _ => (".", ""),
        };

        let mut parts = vec![name.clone()];
        let mut stopped = *exact;
        let mut cursor = field.parent;
        while let Some(p) = cursor {
            if stopped {
                break;
            }
            let ancestor = &self.fields[p];
            match ancestor.own.get(kind) {
                Some(OwnKey::Key { name, exact, .. }) => {
                    parts.push(name.clone());
                    stopped = *exact;
                }
                Some(OwnKey::Skip) | None if *explicit => {}
                Some(OwnKey::Skip) | None => return None,
            }
            cursor = ancestor.parent;
        }
        if !stopped && !prefix.is_empty() {
            parts.push(prefix.to_string());
        }
        parts.reverse();
        Some(parts.join(delimiter))
    }

    fn check_duplicates(&self, key_kinds: &[String]) -> Result<(), SchemaError> {
        for kind in key_kinds {
            let mut seen: HashMap<&str, &str> = HashMap::new();
            for field in self.fields.iter().filter(|f| f.is_leaf) {
                let Some(key) = field.key(kind) else {
                    continue;
                };
                if let Some(first) = seen.insert(key, &field.path) {
                    return Err(SchemaError::DuplicateField {
                        kind: kind.clone(),
                        key: key.to_string(),
                        first: first.to_string(),
                        second: field.path.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> &FieldDescriptor {
        &self.fields[index]
    }

    /// Indices of the leaves, in declaration order.
    pub fn leaves(&self) -> impl Iterator<Item = usize> + '_ {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.is_leaf)
            .map(|(i, _)| i)
    }

    pub fn field(&self, index: usize) -> Field<'_> {
        Field { tree: self, index }
    }
}

fn key_kinds(opts: &KeyOptions) -> Vec<String> {
    let mut kinds: Vec<String> = vec![types::ENV.into(), types::FLAG.into()];
    let formats = types::FILE_FORMATS
        .iter()
        .copied()
        .chain(opts.formats.iter().map(String::as_str));
    for format in formats {
        if !kinds.iter().any(|k| k == format) {
            kinds.push(format.to_string());
        }
    }
    kinds
}

fn own_key(
    kind: &str,
    declared: Option<&str>,
    ident: &str,
    word_list: &[String],
    opts: &KeyOptions,
) -> OwnKey {
    let prefixable = kind == types::ENV || kind == types::FLAG;
    match declared {
        Some(types::SKIP) => OwnKey::Skip,
        Some(declared) if !declared.is_empty() => {
            let (name, exact) = match declared.strip_suffix(types::EXACT_SUFFIX) {
                Some(name) if prefixable => (name, true),
                _ => (declared, false),
            };
            OwnKey::Key {
                name: name.to_string(),
                exact,
                explicit: true,
            }
        }
        _ => {
            let name = match kind {
                types::ENV => words::env_name(word_list),
                types::FLAG => words::key_name(word_list),
                _ if opts.dont_generate_tags => ident.to_string(),
                _ => words::key_name(word_list),
            };
            OwnKey::Key {
                name,
                exact: false,
                explicit: false,
            }
        }
    }
}

/// Records nested inside sequences, maps and optionals are resolved lazily
/// by the coercer; make sure their schemas are sound up front.
fn validate_nested_kinds(kind: &Kind, opts: &KeyOptions) -> Result<(), SchemaError> {
    match kind {
        Kind::Seq(inner) | Kind::Optional(inner) => match inner.as_ref() {
            Kind::Record(schema) => FieldTree::build(schema, opts).map(|_| ()),
            other => validate_nested_kinds(other, opts),
        },
        Kind::Map(key, value) => {
            validate_nested_kinds(key, opts)?;
            match value.as_ref() {
                Kind::Record(schema) => FieldTree::build(schema, opts).map(|_| ()),
                other => validate_nested_kinds(other, opts),
            }
        }
        _ => Ok(()),
    }
}

/// Read-only view of one descriptor, handed out by
/// [`Loader::walk_fields`](crate::Loader::walk_fields).
#[derive(Clone, Copy)]
pub struct Field<'a> {
    tree: &'a FieldTree,
    index: usize,
}

impl<'a> Field<'a> {
    fn descriptor(&self) -> &'a FieldDescriptor {
        &self.tree.fields[self.index]
    }

    /// Dotted path, e.g. `database.pool_size`.
    pub fn path(&self) -> &'a str {
        &self.descriptor().path
    }

    /// The declared identifier.
    pub fn name(&self) -> &'a str {
        &self.descriptor().ident
    }

    /// Effective key for a source (`env`, `flag`, `json`, ...), or `None`
    /// when the field is excluded from it.
    pub fn key(&self, kind: &str) -> Option<&'a str> {
        self.descriptor().key(kind)
    }

    /// A raw declared tag.
    pub fn tag(&self, name: &str) -> Option<&'a str> {
        self.descriptor().tags.get(name).map(String::as_str)
    }

    pub fn default_value(&self) -> &'a str {
        &self.descriptor().default
    }

    pub fn usage(&self) -> &'a str {
        self.descriptor().usage()
    }

    pub fn is_required(&self) -> bool {
        self.descriptor().required
    }

    pub fn kind(&self) -> &'a Kind {
        &self.descriptor().kind
    }

    pub fn parent(&self) -> Option<Field<'a>> {
        self.descriptor().parent.map(|index| Field {
            tree: self.tree,
            index,
        })
    }
}

impl std::fmt::Debug for Field<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("path", &self.path())
            .field("keys", &self.descriptor().keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSpec;

    fn build(schema: &Schema) -> FieldTree {
        FieldTree::build(schema, &KeyOptions::default()).unwrap()
    }

    fn leaf<'a>(tree: &'a FieldTree, path: &str) -> &'a FieldDescriptor {
        tree.descriptors()
            .iter()
            .find(|f| f.path == path)
            .unwrap_or_else(|| panic!("no field {path}"))
    }

    fn nested_schema() -> Schema {
        Schema::new("Root")
            .field(FieldSpec::new("HTTPPort", Kind::U16).default("8080"))
            .field(FieldSpec::nested(
                "Sub",
                Schema::new("Sub")
                    .field(FieldSpec::new("Float", Kind::F64))
                    .field(FieldSpec::nested(
                        "Deep",
                        Schema::new("Deep").field(FieldSpec::new("APIKey", Kind::String)),
                    )),
            ))
            .field(FieldSpec::embedded(
                Schema::new("Embedded").field(FieldSpec::new("Em", Kind::String)),
            ))
    }

    #[test]
    fn flattens_in_declaration_order() {
        let tree = build(&nested_schema());
        let paths: Vec<&str> = tree.descriptors().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["HTTPPort", "Sub", "Sub.Float", "Sub.Deep", "Sub.Deep.APIKey", "Em"]
        );
        let leaves: Vec<&str> = tree.leaves().map(|i| tree.get(i).path.as_str()).collect();
        assert_eq!(leaves, vec!["HTTPPort", "Sub.Float", "Sub.Deep.APIKey", "Em"]);
    }

    #[test]
    fn parents_are_containers() {
        let tree = build(&nested_schema());
        let deep = leaf(&tree, "Sub.Deep.APIKey");
        let parent = tree.get(deep.parent.unwrap());
        assert_eq!(parent.path, "Sub.Deep");
        assert!(!parent.is_leaf);
        assert_eq!(leaf(&tree, "Em").parent, None);
    }

    #[test]
    fn derived_keys() {
        let tree = build(&nested_schema());
        let port = leaf(&tree, "HTTPPort");
        assert_eq!(port.key("env"), Some("HTTP_PORT"));
        assert_eq!(port.key("flag"), Some("http_port"));
        assert_eq!(port.key("json"), Some("http_port"));
        let deep = leaf(&tree, "Sub.Deep.APIKey");
        assert_eq!(deep.key("env"), Some("SUB_DEEP_API_KEY"));
        assert_eq!(deep.key("flag"), Some("sub.deep.api_key"));
        assert_eq!(deep.key("yaml"), Some("sub.deep.api_key"));
        assert_eq!(leaf(&tree, "Em").key("env"), Some("EM"));
    }

    #[test]
    fn prefixes_and_delimiters() {
        let opts = KeyOptions {
            env_prefix: "TST".into(),
            flag_prefix: "tst".into(),
            flag_delimiter: "-".into(),
            ..KeyOptions::default()
        };
        let tree = FieldTree::build(&nested_schema(), &opts).unwrap();
        let float = leaf(&tree, "Sub.Float");
        assert_eq!(float.key("env"), Some("TST_SUB_FLOAT"));
        assert_eq!(float.key("flag"), Some("tst-sub-float"));
        assert_eq!(float.key("json"), Some("sub.float"));
    }

    #[test]
    fn exact_key_skips_prefix() {
        let schema = Schema::new("Root")
            .field(FieldSpec::new("Str", Kind::String).env("STR,exact"))
            .field(FieldSpec::nested(
                "Db",
                Schema::new("Db")
                    .field(FieldSpec::new("Url", Kind::String))
                    .field(FieldSpec::new("Pool", Kind::U32).flag("pool,exact")),
            )
            .env("DATABASE,exact"));
        let opts = KeyOptions {
            env_prefix: "TST".into(),
            flag_prefix: "tst".into(),
            ..KeyOptions::default()
        };
        let tree = FieldTree::build(&schema, &opts).unwrap();
        assert_eq!(leaf(&tree, "Str").key("env"), Some("STR"));
        assert_eq!(leaf(&tree, "Str").key("flag"), Some("tst.str"));
        assert_eq!(leaf(&tree, "Db.Url").key("env"), Some("DATABASE_URL"));
        assert_eq!(leaf(&tree, "Db.Pool").key("flag"), Some("pool"));
        assert_eq!(leaf(&tree, "Db.Pool").key("env"), Some("DATABASE_POOL"));
    }

    #[test]
    fn skip_excludes_field_and_descendants() {
        let schema = Schema::new("Root")
            .field(FieldSpec::new("Hidden", Kind::String).env("-"))
            .field(FieldSpec::nested(
                "Sub",
                Schema::new("Sub")
                    .field(FieldSpec::new("Inherited", Kind::String))
                    .field(FieldSpec::new("Explicit", Kind::String).env("EXPLICIT")),
            )
            .env("-"));
        let opts = KeyOptions {
            env_prefix: "APP".into(),
            ..KeyOptions::default()
        };
        let tree = FieldTree::build(&schema, &opts).unwrap();
        assert_eq!(leaf(&tree, "Hidden").key("env"), None);
        assert_eq!(leaf(&tree, "Hidden").key("flag"), Some("hidden"));
        assert_eq!(leaf(&tree, "Sub.Inherited").key("env"), None);
        assert_eq!(leaf(&tree, "Sub.Explicit").key("env"), Some("APP_EXPLICIT"));
    }

    #[test]
    fn declared_file_keys_and_literal_idents() {
        let schema = Schema::new("Root")
            .field(FieldSpec::new("A", Kind::String).json("aaa"))
            .field(FieldSpec::new("B", Kind::String).yaml("aaa").toml("bbb"))
            .field(FieldSpec::new("DooDoo", Kind::String))
            .field(FieldSpec::new("HTTPPort", Kind::I32).yaml("port"));
        let opts = KeyOptions {
            dont_generate_tags: true,
            ..KeyOptions::default()
        };
        let tree = FieldTree::build(&schema, &opts).unwrap();
        assert_eq!(leaf(&tree, "A").key("json"), Some("aaa"));
        assert_eq!(leaf(&tree, "B").key("yaml"), Some("aaa"));
        assert_eq!(leaf(&tree, "B").key("toml"), Some("bbb"));
        assert_eq!(leaf(&tree, "DooDoo").key("toml"), Some("DooDoo"));
        assert_eq!(leaf(&tree, "DooDoo").key("flag"), Some("doo_doo"));
        assert_eq!(leaf(&tree, "HTTPPort").key("json"), Some("HTTPPort"));
        assert_eq!(leaf(&tree, "HTTPPort").key("yaml"), Some("port"));
    }

    #[test]
    fn registered_formats_get_keys() {
        let schema = Schema::new("Root").field(FieldSpec::new("LogLevel", Kind::String));
        let opts = KeyOptions {
            formats: vec!["ini".into()],
            ..KeyOptions::default()
        };
        let tree = FieldTree::build(&schema, &opts).unwrap();
        assert_eq!(leaf(&tree, "LogLevel").key("ini"), Some("log_level"));
    }

    #[test]
    fn duplicate_env_key_fails() {
        let schema = Schema::new("Root")
            .field(FieldSpec::new("foo_bar", Kind::String).flag("one"))
            .field(FieldSpec::new("FooBar", Kind::String).flag("two").json("other"));
        let err = FieldTree::build(&schema, &KeyOptions::default()).unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateField {
                kind: "env".into(),
                key: "FOO_BAR".into(),
                first: "foo_bar".into(),
                second: "FooBar".into(),
            }
        );
    }

    #[test]
    fn duplicates_allowed_when_configured() {
        let schema = Schema::new("Root")
            .field(FieldSpec::new("foo_bar", Kind::String))
            .field(FieldSpec::new("FooBar", Kind::String));
        let opts = KeyOptions {
            allow_duplicates: true,
            ..KeyOptions::default()
        };
        let tree = FieldTree::build(&schema, &opts).unwrap();
        assert_eq!(tree.leaves().count(), 2);
    }

    #[test]
    fn required_tag_must_be_true() {
        let ok = Schema::new("Root").field(FieldSpec::new("Field", Kind::String).required());
        assert!(build(&ok).get(0).required);

        let bad = Schema::new("Root")
            .field(FieldSpec::new("Field", Kind::String).tag("required", "boom"));
        let err = FieldTree::build(&bad, &KeyOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::InvalidRequiredTag { ref value, .. } if value == "boom"
        ));
    }

    #[test]
    fn private_fields_skipped() {
        let schema = Schema::new("Root")
            .field(FieldSpec::new("secret", Kind::String).private())
            .field(FieldSpec::new("public", Kind::String));
        let tree = build(&schema);
        assert_eq!(tree.descriptors().len(), 1);

        let only_private =
            Schema::new("Hidden").field(FieldSpec::new("secret", Kind::String).private());
        let err = FieldTree::build(&only_private, &KeyOptions::default()).unwrap_err();
        assert_eq!(err, SchemaError::EmptyRecord { name: "Hidden".into() });
    }

    #[test]
    fn nested_element_schemas_validated_up_front() {
        let element =
            Schema::new("Item").field(FieldSpec::new("x", Kind::I32).tag("required", "yes"));
        let schema =
            Schema::new("Root").field(FieldSpec::new("items", Kind::seq(Kind::Record(element))));
        let err = FieldTree::build(&schema, &KeyOptions::default()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRequiredTag { .. }));
    }

    #[test]
    fn field_view_walks_to_parent() {
        let schema = Schema::new("Root").field(FieldSpec::nested(
            "B",
            Schema::new("B").field(
                FieldSpec::new("C", Kind::I32)
                    .default("-1")
                    .flag("two")
                    .usage("pretty simple usage duh")
                    .tag("marco", "polo"),
            ),
        ));
        let tree = build(&schema);
        let index = tree.leaves().next().unwrap();
        let field = tree.field(index);
        assert_eq!(field.path(), "B.C");
        assert_eq!(field.name(), "C");
        assert_eq!(field.default_value(), "-1");
        assert_eq!(field.usage(), "pretty simple usage duh");
        assert_eq!(field.tag("marco"), Some("polo"));
        assert_eq!(field.key("flag"), Some("b.two"));
        assert_eq!(field.parent().unwrap().path(), "B");
        assert!(field.parent().unwrap().parent().is_none());
    }
}
