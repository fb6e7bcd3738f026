use secrecy::Secret;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub backend: BackendSettings,
    pub ai: AiSettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub session_secret: Secret<String>,
    /// Mark cookies `Secure`. Off for local HTTP, on behind TLS.
    #[serde(default)]
    pub secure_cookies: bool,
}

#[derive(Deserialize, Clone)]
pub struct BackendSettings {
    /// Base URL of the upstream backend service (sites, users, subscriptions).
    pub url: String,
}

#[derive(Deserialize, Clone)]
pub struct AiSettings {
    /// Base URL of the chat completion service.
    pub url: String,
    /// Service token used for site-scoped chat when the widget supplies no
    /// chat token of its own.
    #[serde(default)]
    pub token: Option<Secret<String>>,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().expect("Failed to determine the current directory");
    let configuration_directory = base_path.join("config");

    let settings = config::Config::builder()
        .add_source(config::File::from(configuration_directory.join("base.yaml")).required(true))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
