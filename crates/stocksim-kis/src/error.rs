//! KIS 연동 에러 타입.

use thiserror::Error;

/// KIS 연동 관련 에러.
#[derive(Debug, Error)]
pub enum KisError {
    /// 필수 설정 누락 (생성 시점에 검증, 복구 불가)
    #[error("설정 에러: {0}")]
    Config(String),

    /// 토큰 발급 실패 (발급 엔드포인트 장애, 에러 응답, 불완전한 응답)
    #[error("토큰 발급 실패: {0}")]
    TokenIssuance(String),

    /// 외부 호출 직전에 유효한 토큰을 확보하지 못함
    #[error("유효한 액세스 토큰을 가져올 수 없습니다: {0}")]
    AuthUnavailable(String),

    /// KIS API가 요청을 거부하거나 처리에 실패함
    #[error("KIS API 에러 {status_code} [{error_code}]: {error_message}")]
    Api {
        /// 원본 HTTP 상태 코드
        status_code: u16,
        /// KIS 메시지 코드 (예: "EGW00123")
        error_code: String,
        /// KIS 메시지 내용
        error_message: String,
    },

    /// 토큰 저장소 에러
    #[error("토큰 저장소 에러: {0}")]
    Store(String),
}

/// KIS 작업을 위한 Result 타입.
pub type KisResult<T> = Result<T, KisError>;

impl KisError {
    /// 다음 호출 또는 다음 스케줄에서 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KisError::TokenIssuance(_) | KisError::Store(_))
    }

    /// 원본 HTTP 상태 코드 반환 (API 에러인 경우).
    pub fn status_code(&self) -> Option<u16> {
        match self {
            KisError::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for KisError {
    fn from(err: sqlx::Error) -> Self {
        KisError::Store(err.to_string())
    }
}
