//! Core resolution pipeline: run every source over a record arena.
//!
//! Operates on pre-loaded data ([`ResolveInput`]) with no I/O, making the full
//! pipeline testable with synthetic inputs. Stages run in fixed precedence
//! order, each one skippable, later stages overwriting earlier ones:
//!
//! 1. Defaults: the `default` tag of every leaf
//! 2. Files: each config file in order (all of them with `merge_files`,
//!    otherwise the first one found)
//! 3. Environment: the variable named by each leaf's `env` key
//! 4. Flags: only flags explicitly given on the command line
//!
//! Every stage removes the keys it consumed, then rejects leftovers according
//! to the `allow_unknown_*` switches. Required fields are checked last.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, trace};

use crate::coerce::Coercer;
use crate::error::LayerfigError;
use crate::file::{self, Decoders, RawMap};
use crate::flatten;
use crate::record::Record;
use crate::tree::{FieldTree, KeyOptions};
use crate::types::{self, Stage};
use crate::validate;

/// Switches that steer one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub keys: KeyOptions,
    pub skip_defaults: bool,
    pub skip_files: bool,
    pub skip_env: bool,
    pub skip_flags: bool,
    pub allow_unknown_fields: bool,
    pub allow_unknown_envs: bool,
    pub allow_unknown_flags: bool,
    pub all_fields_required: bool,
    pub fail_on_file_not_found: bool,
    pub merge_files: bool,
}

/// All pre-loaded data needed to resolve a record. No I/O happens here.
pub struct ResolveInput<'a> {
    /// Config files in precedence order; `None` content means not found.
    pub files: Vec<(PathBuf, Option<String>)>,
    pub decoders: &'a Decoders,
    /// Environment snapshot.
    pub envs: Vec<(String, String)>,
    /// Flags explicitly supplied on the command line, as `(key, raw value)`.
    pub flags: Vec<(String, String)>,
}

/// Resolve a record from pre-loaded inputs.
pub fn resolve(
    tree: &FieldTree,
    policy: &Policy,
    input: ResolveInput<'_>,
) -> Result<Record, LayerfigError> {
    let mut record = Record::new(tree);

    if !policy.skip_defaults {
        let applied = apply_defaults(tree, &mut record, policy)?;
        debug!(stage = %Stage::Defaults, applied, "stage done");
    }
    if !policy.skip_files {
        apply_files(tree, &mut record, policy, input.files, input.decoders)?;
    }
    if !policy.skip_env {
        let mut vars: BTreeMap<String, String> = input.envs.into_iter().collect();
        let applied = apply_text(tree, &mut record, &mut vars, types::ENV, policy)?;
        debug!(stage = %Stage::Environment, applied, "stage done");
        validate::check_unknown_envs(&vars, policy)?;
    }
    if !policy.skip_flags {
        let mut flags: BTreeMap<String, String> = input.flags.into_iter().collect();
        let applied = apply_text(tree, &mut record, &mut flags, types::FLAG, policy)?;
        debug!(stage = %Stage::Flags, applied, "stage done");
        validate::check_unknown_flags(&flags, policy)?;
    }

    validate::check_required(tree, &record, policy)?;
    Ok(record)
}

/// Coerce and write every non-empty default.
pub fn apply_defaults(
    tree: &FieldTree,
    record: &mut Record,
    policy: &Policy,
) -> Result<usize, LayerfigError> {
    let coercer = Coercer::new(policy, types::JSON);
    let mut applied = 0;
    for index in tree.leaves() {
        let field = tree.get(index);
        if field.default.is_empty() {
            continue;
        }
        if let Some(value) = coercer.coerce_str(&field.kind, &field.default, &field.path)? {
            trace!(path = %field.path, stage = %Stage::Defaults, "set");
            record.write(index, value);
            applied += 1;
        }
    }
    Ok(applied)
}

fn apply_files(
    tree: &FieldTree,
    record: &mut Record,
    policy: &Policy,
    files: Vec<(PathBuf, Option<String>)>,
    decoders: &Decoders,
) -> Result<(), LayerfigError> {
    for (path, content) in files {
        let decoder = decoders.for_path(&path)?;
        let Some(content) = content else {
            if policy.fail_on_file_not_found {
                return Err(LayerfigError::FileNotFound { path });
            }
            debug!(path = %path.display(), "config file not found, skipping");
            continue;
        };

        let mut map = file::decode(decoder, &path, &content)?;
        let applied = apply_map(tree, record, &mut map, decoder.format(), policy)?;
        debug!(stage = %Stage::Files, path = %path.display(), applied, "file applied");
        validate::check_unknown_fields(&map, &path, policy)?;

        if !policy.merge_files {
            break;
        }
    }
    Ok(())
}

/// Apply a decoded file map: every leaf with a key for `format` takes its
/// value, and consumed keys are removed from `map`.
pub fn apply_map(
    tree: &FieldTree,
    record: &mut Record,
    map: &mut RawMap,
    format: &str,
    policy: &Policy,
) -> Result<usize, LayerfigError> {
    let coercer = Coercer::new(policy, format);
    let mut consumed = Vec::new();
    let mut applied = 0;

    for index in tree.leaves() {
        let field = tree.get(index);
        let Some(key) = field.key(format) else {
            continue;
        };
        let Some(raw) = flatten::lookup(map, key) else {
            continue;
        };
        if let Some(value) = coercer.coerce_value(&field.kind, raw, &field.path)? {
            trace!(path = %field.path, key, stage = %Stage::Files, "set");
            record.write(index, value);
            applied += 1;
        }
        if policy.keys.allow_duplicates {
            consumed.push(key);
        } else {
            map.remove(key);
        }
    }
    for key in consumed {
        map.remove(key);
    }
    Ok(applied)
}

/// Apply textual key/value pairs (environment or flags) keyed by `kind`.
fn apply_text(
    tree: &FieldTree,
    record: &mut Record,
    values: &mut BTreeMap<String, String>,
    kind: &str,
    policy: &Policy,
) -> Result<usize, LayerfigError> {
    let coercer = Coercer::new(policy, types::JSON);
    let mut consumed = Vec::new();
    let mut applied = 0;

    for index in tree.leaves() {
        let field = tree.get(index);
        let Some(key) = field.key(kind) else {
            continue;
        };
        let Some(raw) = values.get(key) else {
            continue;
        };
        if let Some(value) = coercer.coerce_str(&field.kind, raw, &field.path)? {
            trace!(path = %field.path, key, source = kind, "set");
            record.write(index, value);
            applied += 1;
        }
        if policy.keys.allow_duplicates {
            consumed.push(key);
        } else {
            values.remove(key);
        }
    }
    for key in consumed {
        values.remove(key);
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{AppSettings, app_schema};
    use crate::schema::{FieldSpec, Kind, Schema};
    use serde_json::json;

    fn tree(policy: &Policy) -> FieldTree {
        FieldTree::build(&app_schema(), &policy.keys).unwrap()
    }

    fn input(decoders: &Decoders) -> ResolveInput<'_> {
        ResolveInput {
            files: vec![],
            decoders,
            envs: vec![],
            flags: vec![],
        }
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn settings(record: &Record) -> AppSettings {
        serde_json::from_value(record.to_value()).unwrap()
    }

    fn app_policy() -> Policy {
        Policy {
            keys: KeyOptions {
                env_prefix: "APP".into(),
                flag_prefix: "app".into(),
                ..KeyOptions::default()
            },
            ..Policy::default()
        }
    }

    #[test]
    fn defaults_only() {
        let decoders = Decoders::builtin();
        let policy = Policy::default();
        let record = resolve(&tree(&policy), &policy, input(&decoders)).unwrap();
        let cfg = settings(&record);
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.port, 8080);
        assert!(!cfg.debug);
        assert_eq!(cfg.database.pool_size, 5);
        assert_eq!(cfg.database.url, None);
    }

    #[test]
    fn skip_defaults_leaves_zero_values() {
        let decoders = Decoders::builtin();
        let policy = Policy {
            skip_defaults: true,
            ..Policy::default()
        };
        let record = resolve(&tree(&policy), &policy, input(&decoders)).unwrap();
        assert_eq!(settings(&record).port, 0);
    }

    #[test]
    fn file_overrides_default() {
        let decoders = Decoders::builtin();
        let policy = Policy::default();
        let record = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                files: vec![("app.toml".into(), Some("port = 3000\n".into()))],
                ..input(&decoders)
            },
        )
        .unwrap();
        let cfg = settings(&record);
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.host, "localhost");
    }

    #[test]
    fn first_found_file_wins_without_merge() {
        let decoders = Decoders::builtin();
        let policy = Policy::default();
        let record = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                files: vec![
                    ("missing.json".into(), None),
                    ("first.json".into(), Some(r#"{"port": 1000}"#.into())),
                    ("second.yaml".into(), Some("host: other\n".into())),
                ],
                ..input(&decoders)
            },
        )
        .unwrap();
        let cfg = settings(&record);
        assert_eq!(cfg.port, 1000);
        assert_eq!(cfg.host, "localhost");
    }

    #[test]
    fn merged_files_later_wins() {
        let decoders = Decoders::builtin();
        let policy = Policy {
            merge_files: true,
            ..Policy::default()
        };
        let record = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                files: vec![
                    (
                        "base.toml".into(),
                        Some(
                            "port = 1000\n[database]\nurl = \"pg://base\"\npool_size = 5\n"
                                .into(),
                        ),
                    ),
                    (
                        "local.json".into(),
                        Some(r#"{"port": 2000, "database": {"pool_size": 50}}"#.into()),
                    ),
                ],
                ..input(&decoders)
            },
        )
        .unwrap();
        let cfg = settings(&record);
        assert_eq!(cfg.port, 2000);
        assert_eq!(cfg.database.url.as_deref(), Some("pg://base"));
        assert_eq!(cfg.database.pool_size, 50);
    }

    #[test]
    fn missing_file_fails_when_configured() {
        let decoders = Decoders::builtin();
        let policy = Policy {
            fail_on_file_not_found: true,
            ..Policy::default()
        };
        let err = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                files: vec![("gone.toml".into(), None)],
                ..input(&decoders)
            },
        )
        .unwrap_err();
        assert!(matches!(err, LayerfigError::FileNotFound { .. }));
    }

    #[test]
    fn unsupported_extension_fails_before_reading() {
        let decoders = Decoders::builtin();
        let policy = Policy::default();
        let err = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                files: vec![("app.ini".into(), None)],
                ..input(&decoders)
            },
        )
        .unwrap_err();
        assert!(matches!(err, LayerfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn unknown_file_key_rejected_unless_allowed() {
        let decoders = Decoders::builtin();
        let files: Vec<(PathBuf, Option<String>)> =
            vec![("bad.toml".into(), Some("typo = 1\nport = 3000\n".into()))];

        let strict = Policy::default();
        let err = resolve(
            &tree(&strict),
            &strict,
            ResolveInput {
                files: files.clone(),
                ..input(&decoders)
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("typo"));

        let lenient = Policy {
            allow_unknown_fields: true,
            ..Policy::default()
        };
        let record = resolve(
            &tree(&lenient),
            &lenient,
            ResolveInput {
                files,
                ..input(&decoders)
            },
        )
        .unwrap();
        assert_eq!(settings(&record).port, 3000);
    }

    #[test]
    fn precedence_defaults_files_env_flags() {
        let decoders = Decoders::builtin();
        let policy = app_policy();
        let record = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                files: vec![(
                    "app.toml".into(),
                    Some("host = \"filehost\"\nport = 3000\n[database]\npool_size = 20\n".into()),
                )],
                envs: pairs(&[("APP_PORT", "5000"), ("APP_DEBUG", "true"), ("PATH", "/bin")]),
                flags: pairs(&[("app.port", "9999")]),
                ..input(&decoders)
            },
        )
        .unwrap();
        let cfg = settings(&record);
        assert_eq!(cfg.host, "filehost");
        assert_eq!(cfg.port, 9999);
        assert!(cfg.debug);
        assert_eq!(cfg.database.pool_size, 20);
    }

    #[test]
    fn unknown_env_with_prefix_rejected() {
        let decoders = Decoders::builtin();
        let policy = app_policy();
        let err = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                envs: pairs(&[("APP_PORT", "1"), ("APP_PORTT", "2")]),
                ..input(&decoders)
            },
        )
        .unwrap_err();
        assert!(matches!(err, LayerfigError::UnknownEnv { ref key, .. } if key == "APP_PORTT"));
    }

    #[test]
    fn unknown_env_without_prefix_ignored() {
        let decoders = Decoders::builtin();
        let policy = Policy::default();
        let record = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                envs: pairs(&[("PORT", "81"), ("SOMETHING_ELSE", "x")]),
                ..input(&decoders)
            },
        )
        .unwrap();
        assert_eq!(settings(&record).port, 81);
    }

    #[test]
    fn unknown_prefixed_flag_rejected() {
        let decoders = Decoders::builtin();
        let policy = app_policy();
        let err = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                flags: pairs(&[("app.extra", "1")]),
                ..input(&decoders)
            },
        )
        .unwrap_err();
        assert!(matches!(err, LayerfigError::UnknownFlag { .. }));
    }

    #[test]
    fn coercion_error_names_field() {
        let decoders = Decoders::builtin();
        let policy = Policy::default();
        let err = resolve(
            &tree(&policy),
            &policy,
            ResolveInput {
                envs: pairs(&[("PORT", "eighty")]),
                ..input(&decoders)
            },
        )
        .unwrap_err();
        assert!(matches!(err, LayerfigError::Coercion { ref path, .. } if path == "port"));
    }

    #[test]
    fn empty_env_value_does_not_count_as_set() {
        let schema = Schema::new("Root").field(FieldSpec::new("token", Kind::String).required());
        let policy = Policy::default();
        let tree = FieldTree::build(&schema, &policy.keys).unwrap();
        let decoders = Decoders::builtin();
        let err = resolve(
            &tree,
            &policy,
            ResolveInput {
                envs: pairs(&[("TOKEN", "")]),
                ..input(&decoders)
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Fields required but not set: token");
    }

    #[test]
    fn duplicates_all_receive_the_value() {
        let schema = Schema::new("Root")
            .field(FieldSpec::new("a", Kind::String).env("SHARED").json("shared"))
            .field(FieldSpec::new("b", Kind::String).env("SHARED").json("shared"));
        let policy = Policy {
            keys: KeyOptions {
                allow_duplicates: true,
                ..KeyOptions::default()
            },
            ..Policy::default()
        };
        let tree = FieldTree::build(&schema, &policy.keys).unwrap();
        let decoders = Decoders::builtin();

        let record = resolve(
            &tree,
            &policy,
            ResolveInput {
                envs: pairs(&[("SHARED", "env")]),
                ..input(&decoders)
            },
        )
        .unwrap();
        assert_eq!(record.to_value(), json!({"a": "env", "b": "env"}));

        let mut map: RawMap = json!({"shared": "file"}).as_object().cloned().unwrap();
        let mut record = Record::new(&tree);
        assert_eq!(apply_map(&tree, &mut record, &mut map, "json", &policy).unwrap(), 2);
        assert!(map.is_empty());
    }

    #[test]
    fn nested_file_values_found_by_lookahead() {
        let schema = Schema::new("Root").field(FieldSpec::nested(
            "sub",
            Schema::new("Sub").field(FieldSpec::nested(
                "deep",
                Schema::new("Deep").field(FieldSpec::new("value", Kind::I32)),
            )),
        ));
        let policy = Policy::default();
        let tree = FieldTree::build(&schema, &policy.keys).unwrap();
        let mut record = Record::new(&tree);
        let mut map: RawMap = json!({"sub": {"deep": {"value": 7}}}).as_object().cloned().unwrap();
        apply_map(&tree, &mut record, &mut map, "yaml", &policy).unwrap();
        assert_eq!(record.lookup("sub.deep.value"), Some(&json!(7)));
        assert!(map.is_empty());
    }
}
