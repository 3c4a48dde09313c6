use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Configuration {
    #[serde(default)]
    pub server: ServerConfiguration,
    #[serde(default)]
    pub demo: DemoUser,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfiguration {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_seconds: u64,

    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_seconds: u64,
}

/// The single account the development backend knows about.
#[derive(Debug, Deserialize, Clone)]
pub struct DemoUser {
    #[serde(default = "default_user_id")]
    pub id: String,

    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_email")]
    pub email: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default)]
    pub tel: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3333
}

fn default_access_token_ttl() -> u64 {
    900
}

fn default_refresh_token_ttl() -> u64 {
    60 * 60 * 24 * 30
}

fn default_user_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_name() -> String {
    "Demo User".to_string()
}

fn default_email() -> String {
    "demo@storefront.dev".to_string()
}

fn default_password() -> String {
    "123456".to_string()
}

impl Default for ServerConfiguration {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            access_token_ttl_seconds: default_access_token_ttl(),
            refresh_token_ttl_seconds: default_refresh_token_ttl(),
        }
    }
}

impl Default for DemoUser {
    fn default() -> Self {
        Self {
            id: default_user_id(),
            name: default_name(),
            email: default_email(),
            password: default_password(),
            tel: None,
        }
    }
}

impl Configuration {
    pub fn new() -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if std::path::Path::new("config.toml").exists() {
            builder = builder.add_source(config::File::with_name("config"));
        }

        builder =
            builder.add_source(config::Environment::with_prefix("STOREFRONT_DEV").separator("__"));

        builder.build()?.try_deserialize()
    }
}
