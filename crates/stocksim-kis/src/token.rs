//! 토큰 관련 타입.
//!
//! KIS OAuth 와이어 타입과 저장소에 영속되는 토큰 레코드를 정의합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// KIS OAuth 토큰 발급 응답 (POST /oauth2/tokenP).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// 접근 토큰
    pub access_token: String,
    /// 토큰 타입 (항상 "Bearer")
    pub token_type: String,
    /// 토큰 만료 시간 (초, 통상 86400)
    pub expires_in: i64,
}

/// KIS OAuth 에러 응답 (토큰 발급 실패 시).
#[derive(Debug, Clone, Deserialize)]
pub struct KisOAuthErrorResponse {
    /// 에러 코드 (예: "EGW00103")
    pub error_code: String,
    /// 에러 설명
    pub error_description: String,
}

/// KIS API 공통 에러 응답.
#[derive(Debug, Clone, Deserialize)]
pub struct KisErrorEnvelope {
    /// 응답 코드 (0 = 성공)
    pub rt_cd: String,
    /// 메시지 코드
    pub msg_cd: String,
    /// 메시지 내용
    pub msg1: String,
}

/// 저장소에 영속되는 접근 토큰 레코드.
///
/// 토큰 값은 발급 후 변경되지 않습니다. 갱신 시에는 기존 레코드의
/// `is_active`만 해제되고 새 레코드가 추가됩니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AccessTokenRecord {
    pub id: Uuid,
    /// 접근 토큰 (Authorization 헤더에 그대로 사용)
    pub access_token: String,
    /// 만료 시각 (발급 시각 + expires_in 초, 로컬 시계 기준)
    pub expires_at: DateTime<Utc>,
    /// 현재 사용 대상 여부 (시스템 전체에서 최대 1개)
    pub is_active: bool,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl AccessTokenRecord {
    /// 주어진 시각 기준으로 아직 유효한지 확인.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Authorization 헤더 값 반환.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}
