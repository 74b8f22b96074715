//! # layerfig demo application
//!
//! A sample CLI tool showing how layerfig resolves one settings record from
//! defaults, a config file, environment variables and flags. It exists to
//! demonstrate and manually verify the loader.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example layerfig_demo
//! cargo run --example layerfig_demo -- --demo.server.port=9000
//! ```
//!
//! ## Features demonstrated
//!
//! | Feature              | How to exercise it                                                    |
//! |----------------------|-----------------------------------------------------------------------|
//! | Compiled defaults    | `cargo run --example layerfig_demo`                                   |
//! | Config file (cwd)    | Create `layerfig-demo.toml` with `[server]\nport = 7000`, then run    |
//! | Config file by flag  | `cargo run --example layerfig_demo -- --config other.yaml`            |
//! | Env var override     | `DEMO_SERVER_PORT=9999 cargo run --example layerfig_demo`             |
//! | Exact env key        | `DEMO_TOKEN=secret cargo run --example layerfig_demo`                 |
//! | Flag override        | `cargo run --example layerfig_demo -- --demo.timeout=1m30s`           |
//! | Usage text           | `cargo run --example layerfig_demo -- --help`                         |
//! | Unknown env var      | `DEMO_PROT=1 cargo run --example layerfig_demo`                       |

mod config;

use std::process::ExitCode;

use clap::{Arg, ArgAction};

use layerfig::Layerfig;

use config::DemoSettings;

fn main() -> ExitCode {
    let mut loader = Layerfig::loader::<DemoSettings>()
        .command_name("layerfig-demo")
        .files(["layerfig-demo.toml", "layerfig-demo.yaml", "layerfig-demo.json"])
        .file_flag("config")
        .env_prefix("DEMO")
        .flag_prefix("demo")
        .map_flags(|cmd| {
            cmd.arg(
                Arg::new("fields")
                    .long("fields")
                    .action(ArgAction::SetTrue)
                    .help("List every field and its keys, then exit."),
            )
        })
        .build();

    if let Err(err) = loader.parse_flags() {
        if let layerfig::LayerfigError::Flags(clap_err) = &err {
            clap_err.exit();
        }
        eprintln!("error: {err}");
        return ExitCode::FAILURE;
    }

    if loader.matches().is_some_and(|m| m.get_flag("fields")) {
        loader.walk_fields(|field| {
            println!(
                "{:<14} env={:<20} flag={:<22} toml={}",
                field.path(),
                field.key("env").unwrap_or("-"),
                field.key("flag").unwrap_or("-"),
                field.key("toml").unwrap_or("-"),
            );
            true
        });
        return ExitCode::SUCCESS;
    }

    match loader.load() {
        Ok(settings) => {
            println!("name     = {}", settings.name);
            println!("timeout  = {:?}", settings.timeout);
            println!("tags     = {:?}", settings.tags);
            println!("server   = {}:{}", settings.server.host, settings.server.port);
            println!(
                "token    = {}",
                if settings.token.is_some() { "<set>" } else { "<unset>" }
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
