//! Shared vocabulary: tag names, key kinds and resolution stages.
//!
//! # Tags
//!
//! Every schema field carries a set of string tags, the same way a struct
//! field would carry attributes:
//!
//! | Tag | Effect |
//! |-----|--------|
//! | `default` | literal default value, coerced in the defaults stage |
//! | `usage` | help text, shown in [`Loader::usage`](crate::Loader::usage) |
//! | `env` | explicit environment key; `-` disables; `,exact` skips prefixing |
//! | `flag` | explicit flag key; same `-` / `,exact` rules |
//! | `json` / `yaml` / `toml` / `hcl` | explicit per-format file key; `-` disables |
//! | `required` | must be `"true"` or absent |
//!
//! Any other tag is kept verbatim and readable through
//! [`Field::tag`](crate::Field::tag).

use std::fmt;

pub const DEFAULT: &str = "default";
pub const USAGE: &str = "usage";
pub const REQUIRED: &str = "required";
pub const ENV: &str = "env";
pub const FLAG: &str = "flag";
pub const JSON: &str = "json";
pub const YAML: &str = "yaml";
pub const TOML: &str = "toml";
pub const HCL: &str = "hcl";

/// File formats that always get a derived key, whether or not a decoder is
/// registered for them.
pub const FILE_FORMATS: [&str; 4] = [JSON, YAML, TOML, HCL];

/// Declared key that excludes a field from a source.
pub const SKIP: &str = "-";

/// Suffix on a declared `env` or `flag` key that disables prefixing.
pub const EXACT_SUFFIX: &str = ",exact";

/// One of the ranked origins of configuration values, lowest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Defaults,
    Files,
    Environment,
    Flags,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Defaults => "defaults",
            Stage::Files => "files",
            Stage::Environment => "environment",
            Stage::Flags => "flags",
        };
        f.write_str(name)
    }
}
