use std::env;

use crate::query::PageLimits;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    File,
}

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub storage_backend: StorageBackend,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub data_dir: String,
    pub page_size_default: i64,
    pub page_size_max: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        let storage_backend = match env::var("STORAGE_BACKEND")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "file" => StorageBackend::File,
            _ => StorageBackend::Sqlite,
        };

        let sqlite_path =
            env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/ideahub.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok();
        let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let page_size_default = env::var("PAGE_SIZE_DEFAULT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(10);
        let page_size_max = env::var("PAGE_SIZE_MAX")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v >= page_size_default)
            .unwrap_or(50);

        Self {
            server_port,
            storage_backend,
            sqlite_path,
            database_url,
            data_dir,
            page_size_default,
            page_size_max,
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
        format!("sqlite://{}", path)
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default: self.page_size_default,
            max: self.page_size_max,
        }
    }
}
