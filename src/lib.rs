//! Layered settings resolution for Rust applications. Describe a record,
//! point at your files, and go.
//!
//! Layerfig fills one settings record from four sources (compiled defaults,
//! config files, environment variables and command-line flags) through a
//! builder API, then hands you a typed struct.
//!
//! ```ignore
//! let config: AppSettings = Layerfig::loader::<AppSettings>()
//!     .file("app.toml")
//!     .env_prefix("APP")
//!     .load()?;
//! ```
//!
//! That call applies the `default` of every field, the first of the listed
//! files that exists, every `APP_*` variable, and every `--flag` given on the
//! command line, in that order.
//!
//! # Schema as source of truth
//!
//! A [`Schema`] lists the record's fields, their [`Kind`] and their tags.
//! Every key is derived from it:
//!
//! | Field path           | env                  | flag                 | file key             |
//! |----------------------|----------------------|----------------------|----------------------|
//! | `HTTPPort`           | `HTTP_PORT`          | `http_port`          | `http_port`          |
//! | `Database.PoolSize`  | `DATABASE_POOL_SIZE` | `database.pool_size` | `database.pool_size` |
//!
//! A tag overrides the derived key for that field only; its descendants
//! still use it as their prefix. A `,exact` suffix makes the key absolute,
//! and `-` removes the field from that source. Two fields resolving to the
//! same key is a programmer error and panics in
//! [`LoaderBuilder::build`] unless duplicates are allowed.
//!
//! Typed records implement [`Settings`], which ties a `Deserialize` struct to
//! its schema. Schemas can also be loaded from a TOML description with
//! [`Schema::from_toml_str`].
//!
//! # Layer precedence
//!
//! ```text
//! Defaults              FieldSpec::default
//!        ↑ overridden by
//! Config files          first existing file, or all of them with merge_files
//!        ↑ overridden by
//! Environment vars      PREFIX_KEY
//!        ↑ overridden by
//! Flags                 --prefix.key=value
//! ```
//!
//! Empty values never overwrite. Each stage can be skipped.
//!
//! # Files
//!
//! The extension picks the decoder: `json`, `toml`, `yaml`/`yml` and `.env`
//! are built in, and [`LoaderBuilder::file_decoder`] registers more. Nested
//! keys are looked up through dotted paths, so `database.pool_size` matches
//! both a flat key and a `database` table.
//!
//! # Strict mode
//!
//! Unknown file keys, unknown prefixed variables and unknown prefixed flags
//! are errors unless allowed. Missing required fields are reported together:
//!
//! ```text
//! Fields required but not set: Database.URL,Port
//! ```
//!
//! # Error handling
//!
//! Schema mistakes are [`SchemaError`]s; [`LoaderBuilder::build`] panics on
//! them and [`LoaderBuilder::try_build`] returns them. Everything that can
//! go wrong at load time is a [`LayerfigError`]. With the `rich-errors`
//! feature both derive `miette::Diagnostic`.

pub mod error;
pub mod types;
pub mod words;

mod builder;
mod cli;
mod coerce;
mod duration;
mod file;
mod flatten;
mod record;
mod resolve;
mod schema;
mod schema_file;
mod tree;
mod validate;

#[cfg(test)]
mod fixtures;

pub use builder::{Layerfig, Loader, LoaderBuilder};
pub use error::{DecodeError, LayerfigError, SchemaError};
pub use file::{FileDecoder, RawMap};
pub use record::Record;
pub use schema::{FieldSpec, Kind, Schema, Settings, TextDecoder};
pub use tree::Field;
pub use types::Stage;
