use std::env;
use std::str::FromStr;
use tracing::warn;

/// Where the engine keeps its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Supabase,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "supabase" | "postgrest" => Ok(StorageBackend::Supabase),
            "memory" | "in-memory" | "in_memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub notification_relay_url: String,
    pub payment_init_url: String,
    pub server_url: String,
    pub host_timezone: Option<String>,
    pub storage_backend: StorageBackend,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            notification_relay_url: env::var("NOTIFICATION_RELAY_URL")
                .unwrap_or_else(|_| {
                    warn!("NOTIFICATION_RELAY_URL not set, booking notifications will fail to dispatch");
                    String::new()
                }),
            payment_init_url: env::var("PAYMENT_INIT_URL")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_INIT_URL not set, payment initiation will fail");
                    String::new()
                }),
            server_url: env::var("SERVER_URL")
                .unwrap_or_else(|_| {
                    warn!("SERVER_URL not set, using default");
                    "http://localhost:3000".to_string()
                }),
            host_timezone: env::var("HOST_TIMEZONE").ok().filter(|tz| !tz.trim().is_empty()),
            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|value| {
                    value.parse().map_err(|e| warn!("{}, using supabase", e)).ok()
                })
                .unwrap_or(StorageBackend::Supabase),
            port: env::var("PORT")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        let storage_ready = match self.storage_backend {
            StorageBackend::Memory => true,
            StorageBackend::Supabase => {
                !self.supabase_url.is_empty() && !self.supabase_service_role_key.is_empty()
            }
        };

        storage_ready && !self.supabase_jwt_secret.is_empty()
    }

    pub fn is_payment_configured(&self) -> bool {
        !self.payment_init_url.is_empty()
    }

    pub fn is_notification_relay_configured(&self) -> bool {
        !self.notification_relay_url.is_empty()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            notification_relay_url: String::new(),
            payment_init_url: String::new(),
            server_url: "http://localhost:3000".to_string(),
            host_timezone: None,
            storage_backend: StorageBackend::Supabase,
            port: 3000,
        }
    }
}
