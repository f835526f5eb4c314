use crate::files::remote::RemoteOptions;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Minimum accepted length of `JWT_SECRET`, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Where identities, resources and codes are kept.
#[derive(Clone)]
pub enum StoreBackend {
    Redis { url: String },
    Memory,
}

/// Where uploaded bytes are kept.
#[derive(Clone, Debug)]
pub enum StorageBackend {
    Local { upload_dir: PathBuf },
    Remote(RemoteOptions),
}

#[derive(Clone)]
pub struct Config {
    // Tokens
    pub jwt_secret: Zeroizing<String>,

    // Server
    pub bind_addr: SocketAddr,
    pub request_timeout_secs: u64,

    // Backends
    pub store: StoreBackend,
    pub storage: StorageBackend,

    // Limits
    pub max_upload_bytes: usize,

    // TTLs (in seconds)
    pub session_ttl_secs: u64,
    pub code_ttl_secs: u64,

    // Rate limiting
    pub rate_limit_codes_per_window: u32,
    pub rate_limit_window_secs: u64,

    // Bootstrap admin
    pub admin_email: Option<String>,
    pub admin_password: Option<Zeroizing<String>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = match &self.store {
            StoreBackend::Redis { .. } => "redis",
            StoreBackend::Memory => "memory",
        };
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("bind_addr", &self.bind_addr)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("store", &store)
            .field("storage", &self.storage)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("code_ttl_secs", &self.code_ttl_secs)
            .field("rate_limit_codes_per_window", &self.rate_limit_codes_per_window)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &self.admin_password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Token secret - required
        let jwt_secret = Zeroizing::new(
            env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET".to_string()))?,
        );
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                format!("must be at least {} bytes", MIN_SECRET_LEN),
            ));
        }

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:9527".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let request_timeout_secs = parse_env_or_default("REQUEST_TIMEOUT_SECS", 30)?;

        // Metadata store
        let store = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "redis".to_string())
            .as_str()
        {
            "redis" => StoreBackend::Redis {
                url: env::var("REDIS_URL")
                    .map_err(|_| ConfigError::MissingVar("REDIS_URL".to_string()))?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORE_BACKEND".to_string(),
                    format!("expected redis or memory, got {}", other),
                ))
            }
        };

        // File storage
        let storage = match env::var("STORAGE_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .as_str()
        {
            "local" => StorageBackend::Local {
                upload_dir: PathBuf::from(
                    env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
                ),
            },
            "remote" => StorageBackend::Remote(RemoteOptions {
                endpoint: required_var("REMOTE_ENDPOINT")?,
                bucket: required_var("REMOTE_BUCKET")?,
                access_key_id: required_var("REMOTE_ACCESS_KEY_ID")?,
                access_key_secret: Zeroizing::new(required_var("REMOTE_ACCESS_KEY_SECRET")?),
                path_style: parse_env_or_default("REMOTE_PATH_STYLE", false)?,
            }),
            other => {
                return Err(ConfigError::InvalidValue(
                    "STORAGE_BACKEND".to_string(),
                    format!("expected local or remote, got {}", other),
                ))
            }
        };

        // Limits
        let max_upload_bytes = parse_env_or_default("MAX_UPLOAD_BYTES", 33_554_432)?;

        // TTLs
        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", 86_400)?;
        let code_ttl_secs = parse_env_or_default("CODE_TTL_SECS", 300)?;

        // Rate limiting
        let rate_limit_codes_per_window = parse_env_or_default("RATE_LIMIT_CODES_PER_WINDOW", 1)?;
        let rate_limit_window_secs = parse_env_or_default("RATE_LIMIT_WINDOW_SECS", 60)?;
        if rate_limit_codes_per_window == 0 || rate_limit_window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_CODES_PER_WINDOW/RATE_LIMIT_WINDOW_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Bootstrap admin - both or neither
        let admin_email = env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty());
        let admin_password = env::var("ADMIN_PASSWORD")
            .ok()
            .filter(|s| !s.is_empty())
            .map(Zeroizing::new);
        if admin_email.is_some() != admin_password.is_some() {
            return Err(ConfigError::InvalidValue(
                "ADMIN_EMAIL/ADMIN_PASSWORD".to_string(),
                "must be set together".to_string(),
            ));
        }

        Ok(Config {
            jwt_secret,
            bind_addr,
            request_timeout_secs,
            store,
            storage,
            max_upload_bytes,
            session_ttl_secs,
            code_ttl_secs,
            rate_limit_codes_per_window,
            rate_limit_window_secs,
            admin_email,
            admin_password,
        })
    }
}

fn required_var(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ConfigError::MissingVar(key.to_string())),
    }
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
