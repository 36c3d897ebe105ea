// server/src/config.rs

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MAX_CONCURRENT_JOBS: usize = 20;
const DEFAULT_MAX_PAGES_PER_JOB: usize = 50;
const DEFAULT_RATE_LIMIT_DELAY_SECS: f64 = 0.5;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DOWNLOADS_DIR: &str = "downloads";

/// Configuración del server, leída de variables de entorno al arrancar.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_concurrent_jobs: usize,
    pub max_pages_per_job: usize,
    /// Pausa fija entre páginas del mismo job
    pub politeness_delay: Duration,
    pub fetch_timeout: Duration,
    pub downloads_dir: PathBuf,
    /// JSON opcional con la tabla de candidatos del auto-detect
    pub autodetect_table: Option<PathBuf>,
    /// Directorio para los archivos de log; sin él sólo se loguea a stdout
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            max_pages_per_job: DEFAULT_MAX_PAGES_PER_JOB,
            politeness_delay: Duration::from_secs_f64(DEFAULT_RATE_LIMIT_DELAY_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            downloads_dir: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            autodetect_table: None,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn log_dir_from_env() -> Option<PathBuf> {
        log_dir(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una función de lookup inyectable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "PORT", DEFAULT_PORT);
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| format!("0.0.0.0:{}", port));

        let delay_secs: f64 = parse_or(&lookup, "RATE_LIMIT_DELAY", DEFAULT_RATE_LIMIT_DELAY_SECS);
        let politeness_delay = if delay_secs.is_finite() && delay_secs >= 0.0 {
            Duration::from_secs_f64(delay_secs)
        } else {
            warn!("RATE_LIMIT_DELAY={} no es válido, usando default", delay_secs);
            Duration::from_secs_f64(DEFAULT_RATE_LIMIT_DELAY_SECS)
        };

        Self {
            bind_addr,
            max_concurrent_jobs: parse_or(&lookup, "MAX_CONCURRENT_JOBS", DEFAULT_MAX_CONCURRENT_JOBS)
                .max(1),
            max_pages_per_job: parse_or(&lookup, "MAX_PAGES_PER_JOB", DEFAULT_MAX_PAGES_PER_JOB),
            politeness_delay,
            fetch_timeout: Duration::from_secs(
                parse_or(&lookup, "FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS).max(1),
            ),
            downloads_dir: lookup("DOWNLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOADS_DIR)),
            autodetect_table: lookup("AUTODETECT_TABLE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            log_dir: log_dir(&lookup),
        }
    }
}

fn log_dir<F>(lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    lookup("LOG_DIR")
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{}='{}' no se pudo interpretar, usando default", key, raw);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn sin_variables_usa_defaults() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[]));

        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.max_concurrent_jobs, 20);
        assert_eq!(cfg.max_pages_per_job, 50);
        assert_eq!(cfg.politeness_delay, Duration::from_millis(500));
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(30));
        assert_eq!(cfg.downloads_dir, PathBuf::from("downloads"));
        assert!(cfg.autodetect_table.is_none());
        assert!(cfg.log_dir.is_none());
    }

    #[test]
    fn lee_variables_de_entorno() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("MAX_CONCURRENT_JOBS", "3"),
            ("MAX_PAGES_PER_JOB", "5"),
            ("RATE_LIMIT_DELAY", "1.5"),
            ("FETCH_TIMEOUT_SECS", "10"),
            ("DOWNLOADS_DIR", "/tmp/out"),
            ("AUTODETECT_TABLE", "/etc/tabla.json"),
            ("LOG_DIR", "/var/log/crawler"),
        ]));

        assert_eq!(cfg.bind_addr, "0.0.0.0:9000");
        assert_eq!(cfg.max_concurrent_jobs, 3);
        assert_eq!(cfg.max_pages_per_job, 5);
        assert_eq!(cfg.politeness_delay, Duration::from_millis(1500));
        assert_eq!(cfg.fetch_timeout, Duration::from_secs(10));
        assert_eq!(cfg.downloads_dir, PathBuf::from("/tmp/out"));
        assert_eq!(cfg.autodetect_table, Some(PathBuf::from("/etc/tabla.json")));
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/var/log/crawler")));
    }

    #[test]
    fn bind_addr_tiene_prioridad_sobre_port() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("PORT", "9000"),
            ("BIND_ADDR", "127.0.0.1:7000"),
        ]));
        assert_eq!(cfg.bind_addr, "127.0.0.1:7000");
    }

    #[test]
    fn valores_invalidos_caen_al_default() {
        let cfg = ServerConfig::from_lookup(lookup_from(&[
            ("MAX_CONCURRENT_JOBS", "muchos"),
            ("RATE_LIMIT_DELAY", "-2"),
            ("PORT", "99999"),
        ]));

        assert_eq!(cfg.max_concurrent_jobs, 20);
        assert_eq!(cfg.politeness_delay, Duration::from_millis(500));
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
    }
}
