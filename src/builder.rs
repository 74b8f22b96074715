use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgMatches, Command};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::cli;
use crate::error::{LayerfigError, SchemaError};
use crate::file::{self, Decoders, FileDecoder};
use crate::record::Record;
use crate::resolve::{self, Policy, ResolveInput};
use crate::schema::{Schema, Settings};
use crate::tree::{Field, FieldTree};
use crate::types;

type MapFlags = Box<dyn FnOnce(Command) -> Command + Send>;

/// Entry point for building a layerfig loader.
pub struct Layerfig;

impl Layerfig {
    pub fn loader<C: Settings>() -> LoaderBuilder<C> {
        LoaderBuilder::new(C::schema())
    }

    /// A loader for a schema without a Rust type; resolves into a JSON value
    /// or a [`Record`].
    pub fn loader_for(schema: Schema) -> LoaderBuilder<serde_json::Value> {
        LoaderBuilder::new(schema)
    }
}

/// Builder for configuring a [`Loader`].
///
/// Every switch defaults to off, prefixes default to empty, and delimiters
/// default to `_` (environment) and `.` (flags).
pub struct LoaderBuilder<C> {
    schema: Schema,
    policy: Policy,
    files: Vec<PathBuf>,
    file_flag: Option<String>,
    decoders: Decoders,
    args: Option<Vec<String>>,
    envs: Option<Vec<(String, String)>>,
    command_name: Option<String>,
    map_flags: Option<MapFlags>,
    _phantom: PhantomData<fn() -> C>,
}

impl<C: DeserializeOwned> LoaderBuilder<C> {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            policy: Policy::default(),
            files: Vec::new(),
            file_flag: None,
            decoders: Decoders::builtin(),
            args: None,
            envs: None,
            command_name: None,
            map_flags: None,
            _phantom: PhantomData,
        }
    }

    pub fn skip_defaults(mut self, skip: bool) -> Self {
        self.policy.skip_defaults = skip;
        self
    }

    pub fn skip_files(mut self, skip: bool) -> Self {
        self.policy.skip_files = skip;
        self
    }

    pub fn skip_env(mut self, skip: bool) -> Self {
        self.policy.skip_env = skip;
        self
    }

    pub fn skip_flags(mut self, skip: bool) -> Self {
        self.policy.skip_flags = skip;
        self
    }

    /// Prefix for every environment key, e.g. `"APP"` gives `APP_PORT`.
    /// Also scopes the unknown-variable check.
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.policy.keys.env_prefix = prefix.to_string();
        self
    }

    pub fn env_delimiter(mut self, delimiter: &str) -> Self {
        self.policy.keys.env_delimiter = delimiter.to_string();
        self
    }

    /// Prefix for every flag key, e.g. `"app"` gives `--app.port`.
    pub fn flag_prefix(mut self, prefix: &str) -> Self {
        self.policy.keys.flag_prefix = prefix.to_string();
        self
    }

    pub fn flag_delimiter(mut self, delimiter: &str) -> Self {
        self.policy.keys.flag_delimiter = delimiter.to_string();
        self
    }

    /// Let several fields share one key. Each of them receives the value.
    pub fn allow_duplicates(mut self, allow: bool) -> Self {
        self.policy.keys.allow_duplicates = allow;
        self
    }

    pub fn allow_unknown_fields(mut self, allow: bool) -> Self {
        self.policy.allow_unknown_fields = allow;
        self
    }

    pub fn allow_unknown_envs(mut self, allow: bool) -> Self {
        self.policy.allow_unknown_envs = allow;
        self
    }

    pub fn allow_unknown_flags(mut self, allow: bool) -> Self {
        self.policy.allow_unknown_flags = allow;
        self
    }

    /// Treat every field as required.
    pub fn all_fields_required(mut self, all: bool) -> Self {
        self.policy.all_fields_required = all;
        self
    }

    /// Use literal identifiers as file keys instead of derived snake case.
    pub fn dont_generate_tags(mut self, dont: bool) -> Self {
        self.policy.keys.dont_generate_tags = dont;
        self
    }

    pub fn fail_on_file_not_found(mut self, fail: bool) -> Self {
        self.policy.fail_on_file_not_found = fail;
        self
    }

    /// Apply every config file found instead of only the first one.
    pub fn merge_files(mut self, merge: bool) -> Self {
        self.policy.merge_files = merge;
        self
    }

    /// Replace the config file list. Files are tried in order.
    pub fn files<I, P>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    /// Append one config file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Name a flag whose value is one more config file.
    ///
    /// That file takes precedence over the listed ones. With
    /// [`merge_files`](Self::merge_files) it is applied last; otherwise it is
    /// tried first, and the listed files only serve when it does not exist.
    pub fn file_flag(mut self, flag: &str) -> Self {
        self.file_flag = Some(flag.to_string());
        self
    }

    /// Register a decoder for files with extension `ext`.
    pub fn file_decoder(mut self, ext: &str, decoder: impl FileDecoder + 'static) -> Self {
        self.decoders.register(ext, Arc::new(decoder));
        self
    }

    /// Command-line arguments, without the binary name. Defaults to the
    /// process arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    /// Environment snapshot. Defaults to the process environment.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Name shown in the flag usage text (default: the schema name).
    pub fn command_name(mut self, name: &str) -> Self {
        self.command_name = Some(name.to_string());
        self
    }

    /// Adjust the generated flag set, e.g. to register flags of your own.
    /// Their values are reachable through [`Loader::matches`].
    pub fn map_flags(mut self, f: impl FnOnce(Command) -> Command + Send + 'static) -> Self {
        self.map_flags = Some(Box::new(f));
        self
    }

    /// Build the loader.
    ///
    /// # Panics
    ///
    /// Panics if the schema is malformed (see [`SchemaError`]). Use
    /// [`try_build`](Self::try_build) to get the error instead.
    pub fn build(self) -> Loader<C> {
        self.try_build().unwrap_or_else(|err| panic!("layerfig: {err}"))
    }

    /// Build the loader, returning schema errors.
    pub fn try_build(mut self) -> Result<Loader<C>, SchemaError> {
        self.policy.keys.formats = self.decoders.formats();
        let tree = FieldTree::build(&self.schema, &self.policy.keys)?;
        debug!(
            record = tree.name(),
            fields = tree.descriptors().len(),
            "field tree built"
        );

        let name = self.command_name.unwrap_or_else(|| tree.name().to_string());
        let mut command = cli::build_command(&tree, &name, self.file_flag.as_deref());
        if let Some(map_flags) = self.map_flags {
            command = map_flags(command);
        }

        Ok(Loader {
            tree,
            policy: self.policy,
            files: self.files,
            file_flag: self.file_flag,
            decoders: self.decoders,
            args: self.args,
            envs: self.envs,
            command,
            matches: None,
            _phantom: PhantomData,
        })
    }

    /// Build and load in one step.
    pub fn load(self) -> Result<C, LayerfigError> {
        self.build().load()
    }
}

/// A built loader: the field tree plus everything one resolution pass needs.
pub struct Loader<C> {
    tree: FieldTree,
    policy: Policy,
    files: Vec<PathBuf>,
    file_flag: Option<String>,
    decoders: Decoders,
    args: Option<Vec<String>>,
    envs: Option<Vec<(String, String)>>,
    command: Command,
    matches: Option<ArgMatches>,
    _phantom: PhantomData<fn() -> C>,
}

impl<C: DeserializeOwned> Loader<C> {
    /// Resolve every stage and deserialize into `C`.
    pub fn load(self) -> Result<C, LayerfigError> {
        let record = self.load_record()?;
        serde_json::from_value(record.to_value()).map_err(LayerfigError::Deserialize)
    }

    /// Resolve every stage into the untyped [`Record`].
    pub fn load_record(mut self) -> Result<Record, LayerfigError> {
        if !self.policy.skip_flags || self.file_flag.is_some() {
            self.parse_flags()?;
        }

        let mut files = self.files.clone();
        let mut flags = Vec::new();
        if let Some(matches) = &self.matches {
            if let Some(flag) = &self.file_flag
                && let Some(path) = cli::file_flag_value(matches, flag)?
            {
                debug!(path = %path.display(), flag = flag.as_str(), "config file from flag");
                // The named file outranks the listed ones: applied last when
                // merging, tried first otherwise.
                if self.policy.merge_files {
                    files.push(path);
                } else {
                    files.insert(0, path);
                }
            }
            let file_flag = self.file_flag.as_deref().filter(|flag| !self.is_field_flag(flag));
            flags = cli::supplied(matches)
                .into_iter()
                .filter(|(key, _)| Some(key.as_str()) != file_flag)
                .collect();
        }

        let files = if self.policy.skip_files {
            Vec::new()
        } else {
            file::read_config_files(&files, !self.policy.merge_files)?
        };
        let envs = match self.envs.take() {
            _ if self.policy.skip_env => Vec::new(),
            Some(envs) => envs,
            None => std::env::vars_os()
                .map(|(k, v)| (k.to_string_lossy().into_owned(), v.to_string_lossy().into_owned()))
                .collect(),
        };

        resolve::resolve(
            &self.tree,
            &self.policy,
            ResolveInput {
                files,
                decoders: &self.decoders,
                envs,
                flags,
            },
        )
    }

    /// Parse the command line. Only the first call parses; later calls are
    /// no-ops.
    pub fn parse_flags(&mut self) -> Result<(), LayerfigError> {
        if self.matches.is_some() {
            return Ok(());
        }
        let args = self.args.clone().unwrap_or_else(|| {
            std::env::args_os()
                .skip(1)
                .map(|a| a.to_string_lossy().into_owned())
                .collect()
        });
        self.matches = Some(cli::parse(self.command.clone(), &args)?);
        Ok(())
    }

    /// Parsed flags, once [`parse_flags`](Self::parse_flags) has run.
    pub fn matches(&self) -> Option<&ArgMatches> {
        self.matches.as_ref()
    }

    /// Visit every leaf field in declaration order until `visit` returns
    /// `false`.
    pub fn walk_fields(&self, mut visit: impl FnMut(Field<'_>) -> bool) {
        for index in self.tree.leaves() {
            if !visit(self.tree.field(index)) {
                break;
            }
        }
    }

    /// Help text for the generated flags.
    pub fn usage(&self) -> String {
        self.command.clone().render_help().to_string()
    }

    fn is_field_flag(&self, flag: &str) -> bool {
        self.tree
            .leaves()
            .any(|index| self.tree.get(index).key(types::FLAG) == Some(flag))
    }
}
