use std::time::Duration;

use serde::Deserialize;

use layerfig::{FieldSpec, Kind, Schema, Settings};

#[derive(Deserialize, Debug)]
pub struct DemoSettings {
    pub name: String,
    pub timeout: Duration,
    pub tags: Vec<String>,
    pub server: ServerSettings,
    pub token: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Settings for DemoSettings {
    fn schema() -> Schema {
        Schema::new("DemoSettings")
            .field(FieldSpec::new("name", Kind::String).default("demo").usage("Display name."))
            .field(
                FieldSpec::new("timeout", Kind::Duration)
                    .default("30s")
                    .usage("Request timeout, e.g. 1m30s."),
            )
            .field(FieldSpec::new("tags", Kind::seq(Kind::String)).usage("Comma-separated tags."))
            .field(FieldSpec::nested(
                "server",
                Schema::new("ServerSettings")
                    .field(
                        FieldSpec::new("host", Kind::String)
                            .default("127.0.0.1")
                            .usage("Bind host."),
                    )
                    .field(FieldSpec::new("port", Kind::U16).default("8080").usage("Bind port.")),
            ))
            .field(
                FieldSpec::new("token", Kind::optional(Kind::String))
                    .env("DEMO_TOKEN,exact")
                    .flag("-")
                    .usage("API token, read from DEMO_TOKEN only."),
            )
    }
}
