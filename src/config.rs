use std::{env, fmt::Display, path::PathBuf, str::FromStr};
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8888/app/weight";
pub const API_BASE_PATH: &str = "/app/weight";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub store_path: PathBuf,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            store_path: store_path.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            load_or("FAT_API_BASE_URL", DEFAULT_BASE_URL.to_string()),
            PathBuf::from(load_or("FAT_STORE_PATH", "data/client.json".to_string())),
        )
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub port: u16,
    pub data_path: PathBuf,
    pub login_code: String,
    pub access_token_ttl_secs: i64,
}

impl BackendConfig {
    pub fn from_env() -> Self {
        Self {
            port: load_or("PORT", 8888),
            data_path: PathBuf::from(load_or("APP_DATA_PATH", "data/backend.json".to_string())),
            login_code: load_or("FAT_LOGIN_CODE", "111111".to_string()),
            access_token_ttl_secs: load_or("FAT_ACCESS_TOKEN_TTL_SECS", 7200),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            port: 8888,
            data_path: PathBuf::from("data/backend.json"),
            login_code: "111111".to_string(),
            access_token_ttl_secs: 7200,
        }
    }
}

fn load_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(value) => match value.parse() {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("invalid {key} value {value:?}: {err}, using default: {default}");
                default
            }
        },
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_trims_trailing_slash() {
        let config = ClientConfig::new("http://127.0.0.1:9000/app/weight/", "state.json");
        assert_eq!(config.base_url, "http://127.0.0.1:9000/app/weight");
    }

    #[test]
    fn missing_variable_falls_back() {
        let port: u16 = load_or("FAT_TRACKER_TEST_UNSET_VARIABLE", 4242);
        assert_eq!(port, 4242);
    }
}
