use log::debug;

/// Backend configuration, sourced from the environment with demo fallbacks so
/// the app starts without any setup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    /// Namespace segment of the document path; separates deployments sharing
    /// one project.
    pub namespace_id: String,
    /// When set, identity acquisition exchanges this token instead of signing
    /// in anonymously.
    pub custom_auth_token: Option<String>,
    /// Run against the in-memory store with a locally minted identity.
    /// Useful with simulation mode when there is no backend to talk to.
    pub offline: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            api_key: env_or("BAGTRACK_API_KEY", "AIzaSyDemoKey"),
            auth_domain: env_or("BAGTRACK_AUTH_DOMAIN", "bagtrack-demo.firebaseapp.com"),
            project_id: env_or("BAGTRACK_PROJECT_ID", "bagtrack-demo"),
            storage_bucket: env_or("BAGTRACK_STORAGE_BUCKET", "bagtrack-demo.appspot.com"),
            messaging_sender_id: env_or("BAGTRACK_SENDER_ID", "000000000000"),
            app_id: env_or("BAGTRACK_APP_ID", "1:000000000000:web:abc123def456"),
            namespace_id: env_or("BAGTRACK_NAMESPACE_ID", "bagtrack-app-1"),
            custom_auth_token: std::env::var("BAGTRACK_CUSTOM_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            offline: flag("BAGTRACK_OFFLINE"),
        };

        debug!(
            "config loaded: project={} auth_domain={} bucket={} sender={} app={} namespace={} offline={}",
            config.project_id,
            config.auth_domain,
            config.storage_bucket,
            config.messaging_sender_id,
            config.app_id,
            config.namespace_id,
            config.offline,
        );

        config
    }
}

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn flag(key: &str) -> bool {
    std::env::var(key)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
