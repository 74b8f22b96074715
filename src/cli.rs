//! Clap adapter: a `clap::Command` derived from the field tree.
//!
//! Every leaf with a flag key becomes a `--<key>` option that takes its value
//! as a string; coercion happens later, in the flags stage, exactly as for
//! environment variables. Bool fields also accept a bare `--<key>` meaning
//! `true`, and take an explicit value only in the `--<key>=false` form.
//!
//! Field defaults are registered as clap defaults so they show up in
//! [`Loader::usage`](crate::Loader::usage), but only values whose
//! [`ValueSource`] is the command line are handed to the resolver.

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::error::LayerfigError;
use crate::schema::Kind;
use crate::tree::{FieldDescriptor, FieldTree};
use crate::types;

const HELP: &str = "help";

/// Build the flag set for `tree`. `file_flag` adds one more option naming an
/// extra config file.
pub fn build_command(tree: &FieldTree, name: &str, file_flag: Option<&str>) -> Command {
    let mut command = Command::new(name.to_string())
        .no_binary_name(true)
        .args_override_self(true)
        .disable_help_flag(true);

    let mut registered = BTreeSet::new();
    for index in tree.leaves() {
        let field = tree.get(index);
        let Some(key) = field.key(types::FLAG) else {
            continue;
        };
        // Duplicate keys share one option; every field with the key reads it.
        if !registered.insert(key.to_string()) {
            continue;
        }
        command = command.arg(field_arg(field, key));
    }

    // A field or the file flag may claim `help`; the help flag then steps aside.
    if !registered.contains(HELP) && file_flag != Some(HELP) {
        command = command.arg(
            Arg::new(HELP)
                .short('h')
                .long(HELP)
                .action(ArgAction::Help)
                .help("Print help"),
        );
    }

    if let Some(flag) = file_flag
        && !registered.contains(flag)
    {
        command = command.arg(
            Arg::new(flag.to_string())
                .long(flag.to_string())
                .value_name("PATH")
                .value_parser(value_parser!(String))
                .action(ArgAction::Set)
                .help("Path to an additional config file"),
        );
    }
    command
}

fn field_arg(field: &FieldDescriptor, key: &str) -> Arg {
    let mut arg = Arg::new(key.to_string())
        .long(key.to_string())
        .value_name(field.kind.to_string())
        .value_parser(value_parser!(String))
        .action(ArgAction::Set);

    if !field.usage().is_empty() {
        arg = arg.help(field.usage().to_string());
    }
    if !field.default.is_empty() {
        arg = arg.default_value(field.default.clone());
    }
    if is_bool(&field.kind) {
        arg = arg
            .num_args(0..=1)
            .require_equals(true)
            .default_missing_value("true");
    } else {
        arg = arg.allow_hyphen_values(true);
    }
    arg
}

fn is_bool(kind: &Kind) -> bool {
    match kind {
        Kind::Bool => true,
        Kind::Optional(inner) => is_bool(inner),
        _ => false,
    }
}

/// Parse `args` (without the binary name).
pub fn parse(command: Command, args: &[String]) -> Result<ArgMatches, LayerfigError> {
    Ok(command.try_get_matches_from(args)?)
}

/// `(key, raw value)` for every option given explicitly on the command line.
pub fn supplied(matches: &ArgMatches) -> Vec<(String, String)> {
    matches
        .ids()
        .filter(|id| matches.value_source(id.as_str()) == Some(ValueSource::CommandLine))
        .filter_map(|id| {
            let raw = matches.get_raw(id.as_str())?.last()?;
            Some((id.as_str().to_string(), raw.to_string_lossy().into_owned()))
        })
        .collect()
}

/// The config file named by the file flag, if it was given.
pub fn file_flag_value(matches: &ArgMatches, flag: &str) -> Result<Option<PathBuf>, LayerfigError> {
    if matches.value_source(flag) != Some(ValueSource::CommandLine) {
        return Ok(None);
    }
    match matches.get_raw(flag).and_then(|values| values.last()) {
        Some(path) if !path.is_empty() => Ok(Some(PathBuf::from(path))),
        _ => Err(LayerfigError::EmptyFileFlag {
            flag: flag.to_string(),
        }),
    }
}
