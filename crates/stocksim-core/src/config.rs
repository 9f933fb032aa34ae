//! 설정 관리.
//!
//! 애플리케이션 전역 설정을 정의하고 환경변수에서 로드합니다.

use serde::{Deserialize, Serialize};

/// 애플리케이션 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// `.env` 파일이 있으면 먼저 읽어들입니다.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            database: DatabaseConfig::from_env(),
            logging: LoggingConfig::from_env(),
        }
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// PostgreSQL 연결 URL
    pub url: Option<String>,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connection_timeout_secs: 30,
        }
    }
}

impl DatabaseConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// # 환경변수
    /// * `DATABASE_URL` - PostgreSQL 연결 URL
    /// * `DATABASE_MAX_CONNECTIONS` - 최대 연결 수 (기본: 10)
    /// * `DATABASE_CONNECTION_TIMEOUT_SECS` - 연결 타임아웃 (기본: 30)
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL").ok();

        let max_connections: u32 = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let connection_timeout_secs: u64 = std::env::var("DATABASE_CONNECTION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Self {
            url,
            max_connections,
            connection_timeout_secs,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    /// 환경변수에서 설정을 로드합니다.
    ///
    /// # 환경변수
    /// * `RUST_LOG` - 로그 레벨 (기본: info)
    /// * `LOG_FORMAT` - 로그 형식 (기본: pretty)
    pub fn from_env() -> Self {
        let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

        Self { level, format }
    }
}
