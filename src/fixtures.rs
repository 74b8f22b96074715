#[cfg(test)]
pub mod test {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use serde::Deserialize;

    use crate::schema::{FieldSpec, Kind, Schema, Settings};

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct AppSettings {
        pub host: String,
        pub port: u16,
        pub debug: bool,
        pub database: DbSettings,
    }

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct DbSettings {
        pub url: Option<String>,
        pub pool_size: u32,
    }

    pub fn app_schema() -> Schema {
        Schema::new("AppSettings")
            .field(
                FieldSpec::new("host", Kind::String)
                    .default("localhost")
                    .usage("The application host."),
            )
            .field(FieldSpec::new("port", Kind::U16).default("8080").usage("The port number."))
            .field(FieldSpec::new("debug", Kind::Bool).usage("Enable debug mode."))
            .field(FieldSpec::nested(
                "database",
                Schema::new("DbSettings")
                    .field(
                        FieldSpec::new("url", Kind::optional(Kind::String))
                            .usage("Connection string URL."),
                    )
                    .field(
                        FieldSpec::new("pool_size", Kind::U32)
                            .default("5")
                            .usage("Connection pool size."),
                    ),
            ))
    }

    impl Settings for AppSettings {
        fn schema() -> Schema {
            app_schema()
        }
    }

    // -- Fixture covering composite kinds ---------------------------------------

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct Composite {
        pub timeout: Duration,
        pub tags: Vec<String>,
        pub limits: BTreeMap<String, u32>,
        pub raw: Vec<u8>,
        pub ratio: f32,
        pub offset: i8,
        pub servers: Vec<Server>,
        #[serde(flatten)]
        pub common: Common,
    }

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct Server {
        pub host: String,
        pub port: u16,
    }

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct Common {
        pub verbose: bool,
    }

    pub fn server_schema() -> Schema {
        Schema::new("Server")
            .field(FieldSpec::new("host", Kind::String).default("localhost"))
            .field(FieldSpec::new("port", Kind::U16).required())
    }

    impl Settings for Composite {
        fn schema() -> Schema {
            Schema::new("Composite")
                .field(FieldSpec::new("timeout", Kind::Duration).default("1m30s"))
                .field(FieldSpec::new("tags", Kind::seq(Kind::String)).default("a,b"))
                .field(
                    FieldSpec::new("limits", Kind::map(Kind::String, Kind::U32))
                        .default("cpu:2,mem:512"),
                )
                .field(FieldSpec::new("raw", Kind::bytes()).default("hi"))
                .field(FieldSpec::new("ratio", Kind::F32).default("0.5"))
                .field(FieldSpec::new("offset", Kind::I8).default("-0x10"))
                .field(FieldSpec::new("servers", Kind::seq(Kind::Record(server_schema()))))
                .field(FieldSpec::embedded(
                    Schema::new("Common").field(FieldSpec::new("verbose", Kind::Bool)),
                ))
        }
    }

    #[test]
    fn app_schema_matches_serde_shape() {
        let zero = serde_json::Value::Object(app_schema().zero());
        let parsed: AppSettings = serde_json::from_value(zero).unwrap();
        assert_eq!(parsed.database.url, None);
        assert_eq!(parsed.port, 0);
    }

    #[test]
    fn composite_schema_matches_serde_shape() {
        let zero = serde_json::Value::Object(Composite::schema().zero());
        let parsed: Composite = serde_json::from_value(zero).unwrap();
        assert!(parsed.servers.is_empty());
        assert_eq!(parsed.timeout, Duration::ZERO);
        assert!(!parsed.common.verbose);
    }
}
