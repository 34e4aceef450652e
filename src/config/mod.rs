use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    /// Без DATABASE_URL сервис работает на хранилище в памяти.
    pub database: Option<DatabaseConfig>,
    /// Без REDIS_URL события уходят только во внутреннюю шину.
    pub redis: Option<RedisConfig>,
    pub jwt: JwtConfig,
    pub booking: BookingConfig,
    pub features: FeatureFlags,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки Redis
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub events_stream: String,
}

// Настройки JWT (токены выпускает внешний сервис авторизации)
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
}

/// Параметры движка бронирования. Передаются в сервисы явно.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    /// Максимум мест в одной брони (включительно).
    pub max_seats_per_booking: usize,
    /// Сколько ждать области сеанса, прежде чем ответить `Busy`.
    pub scope_timeout: Duration,
    /// Повторы при проигранном CAS (другой процесс успел раньше).
    pub commit_retries: u32,
    /// Минимальный интервал между началами сеансов в одном зале, в минутах.
    /// 0 - конфликтуют только сеансы с одинаковым временем начала.
    pub showtime_overlap_minutes: i64,
    /// Разрешить принудительное удаление сеанса с бронями.
    pub allow_force_delete: bool,
    pub audit_interval: Duration,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_seats_per_booking: 10,
            scope_timeout: Duration::from_millis(2000),
            commit_retries: 3,
            showtime_overlap_minutes: 0,
            allow_force_delete: false,
            audit_interval: Duration::from_secs(300),
        }
    }
}

// Feature flags для включения/выключения функциональности
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    pub enable_auth: bool,
    pub enable_audit: bool,
}

fn var_or(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    let raw = var_or(name, default);
    raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw })
}

// Окно пересечения сеансов: от 0 до недели
const MAX_OVERLAP_MINUTES: i64 = 7 * 24 * 60;

fn overlap_minutes(raw: String) -> Result<i64, ConfigError> {
    match raw.parse::<i64>() {
        Ok(minutes) if (0..=MAX_OVERLAP_MINUTES).contains(&minutes) => Ok(minutes),
        _ => Err(ConfigError::Invalid { name: "BOOKING_SHOWTIME_OVERLAP_MINUTES", value: raw }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = match env::var("DATABASE_URL") {
            Ok(url) => Some(DatabaseConfig {
                url,
                pool_size: parse_var("DB_POOL_SIZE", "20")?,
            }),
            Err(_) => None,
        };

        let redis = match env::var("REDIS_URL") {
            Ok(url) => Some(RedisConfig {
                url,
                events_stream: var_or("REDIS_EVENTS_STREAM", "booking-events"),
            }),
            Err(_) => None,
        };

        let features = FeatureFlags {
            enable_auth: parse_var("ENABLE_AUTH", "true")?,
            enable_audit: parse_var("ENABLE_AUDIT", "true")?,
        };

        // Секрет обязателен только при включённой проверке токенов
        let secret = match env::var("JWT_SECRET") {
            Ok(s) => s,
            Err(_) if !features.enable_auth => String::new(),
            Err(_) => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let max_seats: usize = parse_var("BOOKING_MAX_SEATS_PER_BOOKING", "10")?;
        if max_seats == 0 {
            return Err(ConfigError::Invalid { name: "BOOKING_MAX_SEATS_PER_BOOKING", value: "0".into() });
        }

        Ok(Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parse_var("PORT", "8000")?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "seat_booking=debug,tower_http=debug"),
            },
            database,
            redis,
            jwt: JwtConfig { secret },
            booking: BookingConfig {
                max_seats_per_booking: max_seats,
                scope_timeout: Duration::from_millis(parse_var("BOOKING_SCOPE_TIMEOUT_MS", "2000")?),
                commit_retries: parse_var("BOOKING_COMMIT_RETRIES", "3")?,
                showtime_overlap_minutes: overlap_minutes(var_or("BOOKING_SHOWTIME_OVERLAP_MINUTES", "0"))?,
                allow_force_delete: parse_var("BOOKING_ALLOW_FORCE_DELETE", "false")?,
                audit_interval: Duration::from_secs(parse_var("BOOKING_AUDIT_INTERVAL_SECONDS", "300")?),
            },
            features,
        })
    }

    /// Конфигурация для тестов и локального запуска: без БД, Redis и проверки JWT.
    pub fn local(booking: BookingConfig) -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "seat_booking=debug".to_string(),
            },
            database: None,
            redis: None,
            jwt: JwtConfig { secret: String::new() },
            booking,
            features: FeatureFlags { enable_auth: false, enable_audit: false },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_window_is_bounded() {
        assert_eq!(overlap_minutes("0".into()).unwrap(), 0);
        assert_eq!(overlap_minutes("10080".into()).unwrap(), MAX_OVERLAP_MINUTES);

        for raw in ["-5", "10081", "9223372036854775807", "two hours"] {
            let err = overlap_minutes(raw.to_string()).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { name: "BOOKING_SHOWTIME_OVERLAP_MINUTES", .. }));
        }
    }
}
