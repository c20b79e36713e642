use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use anyhow::{Context, Result};
use axum_server::tls_rustls::RustlsConfig;
use sqlx::postgres::{PgPool, PgPoolOptions};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// `DATABASE_URL` wins over the individual `DATABASE_*` variables.
    pub fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").ok().filter(|u| !u.trim().is_empty());
        let password = match url {
            Some(_) => env::var("DATABASE_PASSWORD").unwrap_or_default(),
            None => env::var("DATABASE_PASSWORD")
                .context("DATABASE_PASSWORD must be set when DATABASE_URL is not")?,
        };

        Ok(Self {
            url,
            host: env::var("DATABASE_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("DATABASE_PORT")
                .unwrap_or_else(|_| "5432".to_string())
                .parse()?,
            username: env::var("DATABASE_USER").unwrap_or_else(|_| "postgres".to_string()),
            password,
            database: env::var("DATABASE_NAME").unwrap_or_else(|_| "orderdesk".to_string()),
            ssl_mode: env::var("DATABASE_SSL_MODE").unwrap_or_else(|_| "prefer".to_string()),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10),
        })
    }

    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.username, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub async fn connect(&self) -> Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.connection_string())
            .await
            .context("Failed to connect to PostgreSQL")?;
        Ok(pool)
    }
}

/// Sender identity printed on labels, invoices and manifests.
#[derive(Debug, Clone)]
pub struct CompanyProfile {
    pub name: String,
    pub tax_id: String,
    pub address: String,
    pub phone: Option<String>,
}

impl CompanyProfile {
    fn from_env() -> Self {
        Self {
            name: env::var("COMPANY_NAME").unwrap_or_else(|_| "OrderDesk SpA".to_string()),
            tax_id: env::var("COMPANY_RUT").unwrap_or_else(|_| "76.000.000-0".to_string()),
            address: env::var("COMPANY_ADDRESS").unwrap_or_else(|_| "Santiago, Chile".to_string()),
            phone: env::var("COMPANY_PHONE").ok(),
        }
    }
}

impl Default for CompanyProfile {
    fn default() -> Self {
        Self {
            name: "OrderDesk SpA".to_string(),
            tax_id: "76.000.000-0".to_string(),
            address: "Santiago, Chile".to_string(),
            phone: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanSettings {
    /// Minimum confidence for a scanned code to be counted without confirmation.
    pub auto_accept_confidence: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self { auto_accept_confidence: 0.90 }
    }
}

#[derive(Debug, Clone)]
pub struct LiquidationSettings {
    pub workers: usize,
    pub max_upload_bytes: usize,
    pub queue_capacity: usize,
}

impl Default for LiquidationSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            max_upload_bytes: 20 * 1024 * 1024,
            queue_capacity: 64,
        }
    }
}

/// HTTPS listener, for when the back office is reachable outside the warehouse LAN.
#[derive(Debug, Clone, PartialEq)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub port: u16,
}

impl TlsSettings {
    /// `None` unless `TLS_ENABLED` is true; then both PEM paths are required.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let enabled = lookup("TLS_ENABLED")
            .and_then(|v| v.trim().parse::<bool>().ok())
            .unwrap_or(false);
        if !enabled {
            return Ok(None);
        }

        let cert_path = lookup("TLS_CERT_PATH")
            .filter(|p| !p.trim().is_empty())
            .context("TLS_CERT_PATH must be set when TLS is enabled")?;
        let key_path = lookup("TLS_KEY_PATH")
            .filter(|p| !p.trim().is_empty())
            .context("TLS_KEY_PATH must be set when TLS is enabled")?;
        let port = match lookup("TLS_PORT") {
            Some(port) => port.trim().parse().context("Invalid TLS_PORT")?,
            None => 8443,
        };

        Ok(Some(Self {
            cert_path: PathBuf::from(cert_path),
            key_path: PathBuf::from(key_path),
            port,
        }))
    }

    pub async fn rustls_config(&self) -> Result<RustlsConfig> {
        for (what, path) in [("certificate", &self.cert_path), ("private key", &self.key_path)] {
            if !path.exists() {
                anyhow::bail!("TLS {} not found at {}", what, path.display());
            }
        }
        let config = RustlsConfig::from_pem_file(&self.cert_path, &self.key_path)
            .await
            .context("Failed to load TLS certificates")?;
        tracing::info!(cert = %self.cert_path.display(), "TLS certificate loaded");
        Ok(config)
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: Option<DatabaseConfig>,
    pub jwt_secret: String,
    pub server_host: String,
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub database_pool: PgPool,
    pub file_storage_path: String,
    pub company: CompanyProfile,
    pub scan: ScanSettings,
    pub liquidation: LiquidationSettings,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub tls: Option<TlsSettings>,
    pub secure_cookies: bool,
}

impl AppConfig {
    pub async fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_config = DatabaseConfig::from_env()?;
        let database_pool = database_config.connect().await?;

        let auto_accept_confidence: f64 = env_or("SCAN_AUTO_ACCEPT_CONFIDENCE", 0.90);
        if !(0.0..=1.0).contains(&auto_accept_confidence) {
            anyhow::bail!("SCAN_AUTO_ACCEPT_CONFIDENCE must be between 0 and 1");
        }

        let max_upload_mb: usize = env_or("MAX_UPLOAD_MB", 20);
        let tls = TlsSettings::from_lookup(|key| env::var(key).ok())?;

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some(BootstrapAdmin { email, password })
            }
            _ => None,
        };

        Ok(Self {
            database: Some(database_config),
            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env_or("SERVER_PORT", 8080),
            cors_origins,
            database_pool,
            file_storage_path: env::var("FILE_STORAGE_PATH")
                .unwrap_or_else(|_| "./uploads".to_string()),
            company: CompanyProfile::from_env(),
            scan: ScanSettings { auto_accept_confidence },
            liquidation: LiquidationSettings {
                workers: env_or::<usize>("LIQUIDATION_WORKERS", 2).max(1),
                max_upload_bytes: max_upload_mb * 1024 * 1024,
                queue_capacity: env_or("LIQUIDATION_QUEUE_CAPACITY", 64),
            },
            bootstrap_admin,
            secure_cookies: tls.is_some(),
            tls,
        })
    }

    /// Configuration around an existing pool with defaults for everything else.
    /// Used by tests and tooling that do not read the environment.
    pub fn with_pool(database_pool: PgPool, jwt_secret: impl Into<String>) -> Self {
        Self {
            database: None,
            jwt_secret: jwt_secret.into(),
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            cors_origins: vec!["http://localhost:3000".to_string()],
            database_pool,
            file_storage_path: std::env::temp_dir()
                .join("orderdesk-uploads")
                .to_string_lossy()
                .into_owned(),
            company: CompanyProfile::default(),
            scan: ScanSettings::default(),
            liquidation: LiquidationSettings::default(),
            bootstrap_admin: None,
            tls: None,
            secure_cookies: false,
        }
    }

    /// Listen address: the TLS port when HTTPS is configured.
    pub fn server_address(&self) -> String {
        let port = self.tls.as_ref().map_or(self.server_port, |tls| tls.port);
        format!("{}:{}", self.server_host, port)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_takes_precedence() {
        let config = DatabaseConfig {
            url: Some("postgres://u:p@db:5432/orders".to_string()),
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "orderdesk".to_string(),
            ssl_mode: "prefer".to_string(),
            max_connections: 5,
        };
        assert_eq!(config.connection_string(), "postgres://u:p@db:5432/orders");
    }

    #[test]
    fn test_connection_string_from_parts() {
        let config = DatabaseConfig {
            url: None,
            host: "db".to_string(),
            port: 5433,
            username: "backoffice".to_string(),
            password: "secret".to_string(),
            database: "orderdesk".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 5,
        };
        assert_eq!(
            config.connection_string(),
            "postgres://backoffice:secret@db:5433/orderdesk?sslmode=disable"
        );
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("ORDERDESK_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or::<u16>("ORDERDESK_TEST_ENV_OR", 42), 42);
        std::env::remove_var("ORDERDESK_TEST_ENV_OR");
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn test_tls_disabled_by_default() {
        assert_eq!(TlsSettings::from_lookup(lookup(&[])).unwrap(), None);
        assert_eq!(
            TlsSettings::from_lookup(lookup(&[("TLS_ENABLED", "false"), ("TLS_CERT_PATH", "c.pem")]))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_tls_requires_both_paths() {
        let result = TlsSettings::from_lookup(lookup(&[("TLS_ENABLED", "true"), ("TLS_CERT_PATH", "c.pem")]));
        assert!(result.unwrap_err().to_string().contains("TLS_KEY_PATH"));

        let result = TlsSettings::from_lookup(lookup(&[
            ("TLS_ENABLED", "true"),
            ("TLS_CERT_PATH", "c.pem"),
            ("TLS_KEY_PATH", "k.pem"),
            ("TLS_PORT", "https"),
        ]));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tls_moves_the_listen_port() {
        let tls = TlsSettings::from_lookup(lookup(&[
            ("TLS_ENABLED", "true"),
            ("TLS_CERT_PATH", "/etc/orderdesk/cert.pem"),
            ("TLS_KEY_PATH", "/etc/orderdesk/key.pem"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(tls.port, 8443);

        let mut config = AppConfig::with_pool(
            PgPoolOptions::new()
                .connect_lazy("postgres://orderdesk@localhost/orderdesk")
                .unwrap(),
            "secret",
        );
        assert_eq!(config.server_address(), "127.0.0.1:8080");
        config.tls = Some(tls);
        assert_eq!(config.server_address(), "127.0.0.1:8443");
    }
}
