use std::env;

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_header: String,
    pub api_prefix: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .or_else(|_| env::var("PORT"))
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8000);

        let sqlite_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/easy-blog.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "easy-blog-secret".to_string());

        let token_header = env::var("TOKEN_HEADER").unwrap_or_else(|_| "Authorization".to_string());

        let api_prefix = env::var("API_PREFIX")
            .map(|v| normalize_prefix(&v))
            .unwrap_or_else(|_| "/blog-service".to_string());

        Self {
            server_port,
            sqlite_path,
            database_url,
            jwt_secret,
            token_header,
            api_prefix,
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}?mode=rwc", path)
    }
}

fn normalize_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("/{}", trimmed)
}

#[cfg(test)]
impl AppConfig {
    pub fn for_test() -> Self {
        Self {
            server_port: 0,
            sqlite_path: String::new(),
            database_url: Some("sqlite::memory:".to_string()),
            jwt_secret: "test-secret".to_string(),
            token_header: "Authorization".to_string(),
            api_prefix: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_normalized() {
        assert_eq!(normalize_prefix("blog-service/"), "/blog-service");
        assert_eq!(normalize_prefix("/api"), "/api");
        assert_eq!(normalize_prefix("/"), "");
    }

    #[test]
    fn sqlite_path_becomes_url() {
        let mut config = AppConfig::for_test();
        config.database_url = None;
        config.sqlite_path = "/tmp/blog.sqlite".to_string();
        assert_eq!(config.database_url(), "sqlite:///tmp/blog.sqlite?mode=rwc");

        config.sqlite_path = "sqlite::memory:".to_string();
        assert_eq!(config.database_url(), "sqlite::memory:");
    }
}
