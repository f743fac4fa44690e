use std::env;
use std::time::Duration;

use tenure_application::LeaderElectionConfig;
use tenure_core::{AppError, AppResult, NonEmptyString};
use tenure_domain::{ElectionTiming, LockName};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOCK_NAME: &str = "tenure-controller-lock";
const DEFAULT_NAMESPACE: &str = "default";
const DEFAULT_REDIS_KEY_PREFIX: &str = "tenure:locks";

/// Backing store for the shared lock record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockBackend {
    Redis { url: String, key_prefix: String },
    Postgres { database_url: String },
    Memory,
}

impl LockBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis { .. } => "redis",
            Self::Postgres { .. } => "postgres",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub backend: LockBackend,
    pub lock: LockName,
    pub identity: NonEmptyString,
    pub timing: ElectionTiming,
    pub store_timeout: Duration,
    pub workload_parallelism: usize,
    pub workload_poll_interval: Duration,
}

impl ControllerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok(), local_host_name)
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        host_name: impl FnOnce() -> Option<String>,
    ) -> AppResult<Self> {
        let backend = match optional_value(&lookup, "LOCK_BACKEND")
            .unwrap_or_else(|| "redis".to_owned())
            .as_str()
        {
            "redis" => LockBackend::Redis {
                url: required_value(&lookup, "REDIS_URL")?,
                key_prefix: optional_value(&lookup, "REDIS_KEY_PREFIX")
                    .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_owned()),
            },
            "postgres" => LockBackend::Postgres {
                database_url: required_value(&lookup, "DATABASE_URL")?,
            },
            "memory" => LockBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "LOCK_BACKEND must be 'redis', 'postgres' or 'memory', got '{other}'"
                )));
            }
        };

        let lock = LockName::new(
            optional_value(&lookup, "NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_owned()),
            optional_value(&lookup, "LOCK_NAME").unwrap_or_else(|| DEFAULT_LOCK_NAME.to_owned()),
        )?;

        let identity = match optional_value(&lookup, "ELECTION_IDENTITY").or_else(host_name) {
            Some(identity) => NonEmptyString::new(identity)?,
            None => {
                return Err(AppError::Validation(
                    "ELECTION_IDENTITY is required when the host name cannot be read".to_owned(),
                ));
            }
        };

        let timing = ElectionTiming::new(
            Duration::from_secs(parse_value(&lookup, "LEASE_DURATION_SECONDS", 60_u64)?),
            Duration::from_secs(parse_value(&lookup, "RENEW_DEADLINE_SECONDS", 30_u64)?),
            Duration::from_secs(parse_value(&lookup, "RETRY_PERIOD_SECONDS", 20_u64)?),
        )?;

        let store_timeout_ms = parse_value(&lookup, "STORE_TIMEOUT_MS", 5_000_u64)?;
        let workload_parallelism = parse_value(&lookup, "WORKLOAD_PARALLELISM", 2_usize)?;
        let workload_poll_interval_ms = parse_value(&lookup, "WORKLOAD_POLL_INTERVAL_MS", 5_000_u64)?;

        if workload_parallelism == 0 {
            return Err(AppError::Validation(
                "WORKLOAD_PARALLELISM must be greater than zero".to_owned(),
            ));
        }

        if workload_poll_interval_ms == 0 {
            return Err(AppError::Validation(
                "WORKLOAD_POLL_INTERVAL_MS must be greater than zero".to_owned(),
            ));
        }

        let config = Self {
            backend,
            lock,
            identity,
            timing,
            store_timeout: Duration::from_millis(store_timeout_ms),
            workload_parallelism,
            workload_poll_interval: Duration::from_millis(workload_poll_interval_ms),
        };
        config.election_config()?;

        Ok(config)
    }

    pub fn election_config(&self) -> AppResult<LeaderElectionConfig> {
        LeaderElectionConfig::new(self.lock.clone(), self.identity.clone(), self.timing)
            .with_store_timeout(self.store_timeout)
            .map_err(|error| AppError::Validation(format!("invalid STORE_TIMEOUT_MS: {error}")))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn local_host_name() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
}

fn optional_value(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn required_value(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> AppResult<String> {
    optional_value(lookup, name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn parse_value<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional_value(lookup, name) {
        Some(value) => value.parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}
