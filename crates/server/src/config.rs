use std::{collections::HashMap, fs};

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_bind: String,
    /// Secret used to verify application session tokens on incoming requests.
    pub session_secret: String,
    pub chat_account_sid: String,
    pub chat_api_key: String,
    pub chat_api_secret: String,
    pub chat_service_sid: String,
    pub chat_token_ttl_seconds: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8443".into(),
            session_secret: "devsessionsecret".into(),
            chat_account_sid: "ACdev".into(),
            chat_api_key: "SKdev".into(),
            chat_api_secret: "devsecret".into(),
            chat_service_sid: "ISdev".into(),
            chat_token_ttl_seconds: 86_400,
        }
    }
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("server.toml") {
        apply_file_overrides(&mut settings, &raw);
    }

    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());

    settings
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.get("bind_addr") {
        settings.server_bind = v.clone();
    }
    if let Some(v) = file_cfg.get("session_secret") {
        settings.session_secret = v.clone();
    }
    if let Some(v) = file_cfg.get("chat_account_sid") {
        settings.chat_account_sid = v.clone();
    }
    if let Some(v) = file_cfg.get("chat_api_key") {
        settings.chat_api_key = v.clone();
    }
    if let Some(v) = file_cfg.get("chat_api_secret") {
        settings.chat_api_secret = v.clone();
    }
    if let Some(v) = file_cfg.get("chat_service_sid") {
        settings.chat_service_sid = v.clone();
    }
    if let Some(v) = file_cfg.get("chat_token_ttl_seconds") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.chat_token_ttl_seconds = parsed;
        }
    }
}

fn apply_env_overrides(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    for name in ["SERVER_BIND", "APP__BIND_ADDR"] {
        if let Some(v) = var(name) {
            settings.server_bind = v;
        }
    }
    for name in ["SESSION_SECRET", "APP__SESSION_SECRET"] {
        if let Some(v) = var(name) {
            settings.session_secret = v;
        }
    }
    for name in ["CHAT_ACCOUNT_SID", "APP__CHAT_ACCOUNT_SID"] {
        if let Some(v) = var(name) {
            settings.chat_account_sid = v;
        }
    }
    for name in ["CHAT_API_KEY", "APP__CHAT_API_KEY"] {
        if let Some(v) = var(name) {
            settings.chat_api_key = v;
        }
    }
    for name in ["CHAT_API_SECRET", "APP__CHAT_API_SECRET"] {
        if let Some(v) = var(name) {
            settings.chat_api_secret = v;
        }
    }
    for name in ["CHAT_SERVICE_SID", "APP__CHAT_SERVICE_SID"] {
        if let Some(v) = var(name) {
            settings.chat_service_sid = v;
        }
    }
    for name in ["CHAT_TOKEN_TTL_SECONDS", "APP__CHAT_TOKEN_TTL_SECONDS"] {
        if let Some(v) = var(name) {
            if let Ok(parsed) = v.parse::<i64>() {
                settings.chat_token_ttl_seconds = parsed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_one_day() {
        let settings = Settings::default();
        assert_eq!(settings.chat_token_ttl_seconds, 86_400);
    }

    #[test]
    fn file_overrides_apply_known_keys_only() {
        let mut settings = Settings::default();
        apply_file_overrides(
            &mut settings,
            "bind_addr = \"0.0.0.0:9000\"\nchat_service_sid = \"IS123\"\nunknown = \"x\"\n",
        );
        assert_eq!(settings.server_bind, "0.0.0.0:9000");
        assert_eq!(settings.chat_service_sid, "IS123");
        assert_eq!(settings.chat_api_key, Settings::default().chat_api_key);
    }

    #[test]
    fn env_overrides_prefer_app_prefixed_names() {
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |name| match name {
            "CHAT_API_KEY" => Some("SKplain".to_string()),
            "APP__CHAT_API_KEY" => Some("SKprefixed".to_string()),
            "APP__CHAT_TOKEN_TTL_SECONDS" => Some("3600".to_string()),
            _ => None,
        });
        assert_eq!(settings.chat_api_key, "SKprefixed");
        assert_eq!(settings.chat_token_ttl_seconds, 3600);
    }

    #[test]
    fn malformed_ttl_override_is_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, |name| match name {
            "CHAT_TOKEN_TTL_SECONDS" => Some("not-a-number".to_string()),
            _ => None,
        });
        assert_eq!(settings.chat_token_ttl_seconds, 86_400);
    }
}
