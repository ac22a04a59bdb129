use serde::{Deserialize, Serialize};
use std::env;

use crate::utils::validation::{USERNAME_MAX_LENGTH, USERNAME_MIN_LENGTH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub environment: String,
    pub log_level: String,
    pub log_format: String,

    // Identity provider
    pub identity_api_url: String,
    pub identity_token_url: String,
    pub identity_api_key: Option<String>,
    pub identity_oauth_redirect_uri: String,
    pub http_timeout_secs: u64,

    // Search
    pub search_min_length: usize,
    pub search_max_results: usize,

    // Notifications
    pub notifications_page_size: usize,

    // Content settings
    pub username_min_length: usize,
    pub username_max_length: usize,
    pub max_comment_length: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "readshelf=debug".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),

            identity_api_url: env::var("IDENTITY_API_URL")
                .unwrap_or_else(|_| "https://identitytoolkit.googleapis.com".to_string()),
            identity_token_url: env::var("IDENTITY_TOKEN_URL")
                .unwrap_or_else(|_| "https://securetoken.googleapis.com".to_string()),
            identity_api_key: env::var("IDENTITY_API_KEY").ok().filter(|k| !k.is_empty()),
            identity_oauth_redirect_uri: env::var("IDENTITY_OAUTH_REDIRECT_URI")
                .unwrap_or_else(|_| "http://localhost".to_string()),
            http_timeout_secs: env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,

            search_min_length: env::var("SEARCH_MIN_LENGTH")
                .unwrap_or_else(|_| "2".to_string())
                .parse()?,
            search_max_results: env::var("SEARCH_MAX_RESULTS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()?,

            notifications_page_size: env::var("NOTIFICATIONS_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            username_min_length: env::var("USERNAME_MIN_LENGTH")
                .unwrap_or_else(|_| "6".to_string())
                .parse()?,
            username_max_length: env::var("USERNAME_MAX_LENGTH")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            max_comment_length: env::var("MAX_COMMENT_LENGTH")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "readshelf=debug".to_string(),
            log_format: "pretty".to_string(),
            identity_api_url: "https://identitytoolkit.googleapis.com".to_string(),
            identity_token_url: "https://securetoken.googleapis.com".to_string(),
            identity_api_key: None,
            identity_oauth_redirect_uri: "http://localhost".to_string(),
            http_timeout_secs: 30,
            search_min_length: 2,
            search_max_results: 10,
            notifications_page_size: 20,
            username_min_length: USERNAME_MIN_LENGTH,
            username_max_length: USERNAME_MAX_LENGTH,
            max_comment_length: 2000,
        }
    }
}
