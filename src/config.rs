use std::path::PathBuf;

fn str_env(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn opt_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Clone, Debug)]
pub struct MailConfig {
    pub server: String,
    pub port: u16,
    pub use_tls: bool,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    /// External base URL used when building password-reset links.
    pub public_base_url: String,
    pub upload_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub frontend_url: Option<String>,
    pub mail: Option<MailConfig>,
    pub gemini_api_key: Option<String>,
    pub gemini_api_url: String,
}

pub const DEFAULT_GEMINI_API_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

impl AppConfig {
    pub fn from_env() -> Self {
        // Mail is an optional capability: no MAIL_USERNAME means disabled.
        let mail = opt_env("MAIL_USERNAME").map(|username| MailConfig {
            server: str_env("MAIL_SERVER", "smtp.gmail.com"),
            port: str_env("MAIL_PORT", "587").parse().unwrap_or(587),
            use_tls: str_env("MAIL_USE_TLS", "true").eq_ignore_ascii_case("true"),
            username,
            password: str_env("MAIL_PASSWORD", ""),
        });

        Self {
            port: str_env("PORT", "8080").parse().unwrap_or(8080),
            public_base_url: str_env("PUBLIC_BASE_URL", "http://localhost:8080"),
            upload_dir: PathBuf::from(str_env("UPLOAD_DIR", "data/uploads")),
            allowed_extensions: str_env("ALLOWED_EXTENSIONS", "png,jpg,jpeg,gif,webp")
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            frontend_url: opt_env("FRONTEND_URL"),
            mail,
            gemini_api_key: opt_env("GEMINI_API_KEY"),
            gemini_api_url: str_env("GEMINI_API_URL", DEFAULT_GEMINI_API_URL),
        }
    }
}
