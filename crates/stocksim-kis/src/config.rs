//! 한국투자증권 (KIS) API 설정.
//!
//! KIS API는 app_key와 app_secret을 사용한 OAuth 2.0
//! client_credentials 인증이 필요합니다. 세 가지 설정값
//! (기본 URL, app_key, app_secret)은 모두 필수이며
//! 생성 시점에 검증됩니다.

use serde::{Deserialize, Serialize};

use crate::error::{KisError, KisResult};

/// 기본 HTTP 요청 타임아웃 (초).
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// KIS API 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KisConfig {
    /// API 기본 URL (예: "https://openapi.koreainvestment.com:9443")
    pub base_url: String,
    /// 발급받은 AppKey
    pub app_key: String,
    /// 발급받은 AppSecret
    pub app_secret: String,
    /// HTTP 요청 타임아웃 (초)
    pub timeout_secs: u64,
}

impl KisConfig {
    /// 새 설정 생성.
    pub fn new(
        base_url: impl Into<String>,
        app_key: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// 환경변수에서 설정을 로드합니다.
    ///
    /// # 환경변수
    /// * `KIS_API_URL` - API 기본 URL (필수)
    /// * `KIS_API_KEY` - AppKey (필수)
    /// * `KIS_API_SECRET` - AppSecret (필수)
    /// * `KIS_API_TIMEOUT_SECS` - 요청 타임아웃 (기본: 10)
    ///
    /// # Errors
    /// 필수 환경변수가 없으면 `KisError::Config`를 반환합니다.
    pub fn from_env() -> KisResult<Self> {
        let base_url = std::env::var("KIS_API_URL").unwrap_or_default();
        let app_key = std::env::var("KIS_API_KEY").unwrap_or_default();
        let app_secret = std::env::var("KIS_API_SECRET").unwrap_or_default();

        let timeout_secs: u64 = std::env::var("KIS_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let config = Self {
            base_url,
            app_key,
            app_secret,
            timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    /// 필수 설정값이 모두 존재하는지 검증합니다.
    ///
    /// # Errors
    /// 누락된 값이 있으면 `KisError::Config`를 반환합니다.
    pub fn validate(&self) -> KisResult<()> {
        if self.base_url.is_empty() || self.app_key.is_empty() || self.app_secret.is_empty() {
            return Err(KisError::Config(
                "KIS API 설정이 불완전합니다. 환경변수를 확인하세요: \
                 KIS_API_URL, KIS_API_KEY, KIS_API_SECRET"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
