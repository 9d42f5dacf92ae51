use std::env;

use crate::identity::DEFAULT_ALLOWED_DOMAINS;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{0} must be at least 32 characters long")]
    WeakSecret(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub data_dir: Option<String>,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub allowed_domains: Vec<String>,
    pub bootstrap_admins: Vec<String>,
    pub google: Option<GoogleOAuth>,
    pub frontend_url: String,
    pub site_url: String,
    pub mail: Option<MailConfig>,
    pub enable_hsts: bool,
}

impl Settings {
    /// Defaults for everything but the signing secret. Used by tests and as
    /// the base that [`Settings::from_env`] overrides.
    pub fn with_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            database_url: None,
            database_max_connections: 5,
            data_dir: None,
            jwt_secret: jwt_secret.into(),
            jwt_ttl_hours: 24,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            bootstrap_admins: Vec::new(),
            google: None,
            frontend_url: "http://localhost:5173".into(),
            site_url: "http://localhost:8080".into(),
            mail: None,
            enable_hsts: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < 32 {
            return Err(ConfigError::WeakSecret("JWT_SECRET"));
        }
        let mut s = Self::with_secret(secret);

        if let Some(v) = var("BIND_ADDR") { s.bind_addr = v; }
        s.database_url = var("DATABASE_URL");
        if let Some(v) = var("DATABASE_MAX_CONNECTIONS") { s.database_max_connections = parse("DATABASE_MAX_CONNECTIONS", v)?; }
        s.data_dir = var("FORUM_DATA_DIR");
        if let Some(v) = var("JWT_TTL_HOURS") { s.jwt_ttl_hours = ttl_hours(v)?; }
        if let Some(v) = var("ALLOWED_EMAIL_DOMAINS") { s.allowed_domains = list(&v); }
        if let Some(v) = var("BOOTSTRAP_ADMIN_EMAILS") { s.bootstrap_admins = list(&v); }
        if let Some(v) = var("FRONTEND_URL") { s.frontend_url = v; }
        if let Some(v) = var("SITE_URL") { s.site_url = v; }
        s.enable_hsts = var("ENABLE_HSTS").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);

        // Social login is optional; the login endpoints answer 503 without it.
        if let (Some(client_id), Some(client_secret)) = (var("GOOGLE_CLIENT_ID"), var("GOOGLE_CLIENT_SECRET")) {
            s.google = Some(GoogleOAuth {
                client_id,
                client_secret,
                redirect_uri: var("GOOGLE_REDIRECT_URI")
                    .unwrap_or_else(|| "http://localhost:8080/auth/google/callback".into()),
                auth_url: var("GOOGLE_AUTH_URL")
                    .unwrap_or_else(|| "https://accounts.google.com/o/oauth2/v2/auth".into()),
                token_url: var("GOOGLE_TOKEN_URL")
                    .unwrap_or_else(|| "https://oauth2.googleapis.com/token".into()),
                userinfo_url: var("GOOGLE_USERINFO_URL")
                    .unwrap_or_else(|| "https://openidconnect.googleapis.com/v1/userinfo".into()),
            });
        }

        if let Some(api_url) = var("MAIL_API_URL") {
            s.mail = Some(MailConfig {
                api_url,
                api_key: var("MAIL_API_KEY"),
                from: var("MAIL_FROM").unwrap_or_else(|| "forum@localhost".into()),
            });
        }
        Ok(s)
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid { name, value })
}

/// Session lifetime, at most one year.
pub const MAX_JWT_TTL_HOURS: i64 = 24 * 365;

fn ttl_hours(value: String) -> Result<i64, ConfigError> {
    let hours: i64 = parse("JWT_TTL_HOURS", value.clone())?;
    if !(1..=MAX_JWT_TTL_HOURS).contains(&hours) {
        return Err(ConfigError::Invalid { name: "JWT_TTL_HOURS", value });
    }
    Ok(hours)
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_lists_skip_blanks() {
        assert_eq!(list(" a@x.in, ,b@x.in,"), vec!["a@x.in", "b@x.in"]);
    }

    #[test]
    fn numeric_values_are_validated() {
        assert!(parse::<u32>("DATABASE_MAX_CONNECTIONS", "ten".into()).is_err());
        assert_eq!(parse::<i64>("JWT_TTL_HOURS", " 12 ".into()).unwrap(), 12);
    }

    #[test]
    fn session_lifetime_is_bounded() {
        assert_eq!(ttl_hours("8760".into()).unwrap(), MAX_JWT_TTL_HOURS);
        for bad in ["0", "-3", "8761", "9223372036854775807"] {
            assert!(matches!(ttl_hours(bad.into()), Err(ConfigError::Invalid { .. })), "{bad}");
        }
    }
}
