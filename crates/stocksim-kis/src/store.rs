//! 토큰 저장소.
//!
//! 발급된 접근 토큰 레코드의 영속화를 담당합니다. 쓰기는 항상
//! "기존 레코드 비활성화 + 새 레코드 추가" 방식이며, 토큰 값 자체를
//! 수정하는 연산은 없습니다.
//!
//! `PgTokenStore`가 사용하는 테이블:
//!
//! ```sql
//! CREATE TABLE kis_access_tokens (
//!     id           UUID PRIMARY KEY DEFAULT gen_random_uuid(),
//!     access_token TEXT NOT NULL,
//!     expires_at   TIMESTAMPTZ NOT NULL,
//!     is_active    BOOLEAN NOT NULL DEFAULT true,
//!     created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use stocksim_core::DatabaseConfig;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{KisError, KisResult};
use crate::token::AccessTokenRecord;

/// 토큰 저장소 인터페이스.
///
/// 운영환경에서는 `PgTokenStore`, 테스트 및 DB 없는 로컬 실행에서는
/// `MemoryTokenStore`를 사용합니다.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 현재 사용 가능한 토큰 레코드 조회.
    ///
    /// `is_active = true`이고 `expires_at > now`인 레코드 중
    /// 가장 최근에 생성된 것을 반환합니다. 활성 레코드는 설계상
    /// 최대 1개지만, 경합으로 일시적으로 여러 개가 존재할 수 있어
    /// 최신 생성 순으로 선택합니다.
    async fn find_current(&self, now: DateTime<Utc>) -> KisResult<Option<AccessTokenRecord>>;

    /// 새 활성 토큰 레코드 추가.
    async fn insert_active(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> KisResult<AccessTokenRecord>;

    /// 모든 활성 레코드 비활성화. 비활성화된 레코드 수를 반환합니다.
    async fn deactivate_all(&self) -> KisResult<u64>;

    /// 만료된 레코드 일괄 삭제 (활성 여부 무관). 삭제된 레코드 수를 반환합니다.
    async fn delete_expired(&self, now: DateTime<Utc>) -> KisResult<u64>;
}

/// PostgreSQL 기반 토큰 저장소.
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    /// 새 저장소 생성.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 데이터베이스 설정으로 연결 풀을 생성해 저장소를 만듭니다.
    ///
    /// # Errors
    /// `DATABASE_URL`이 없으면 `KisError::Config`,
    /// 연결 실패 시 `KisError::Store`를 반환합니다.
    pub async fn connect(config: &DatabaseConfig) -> KisResult<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            KisError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout_secs))
            .connect(url)
            .await?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn find_current(&self, now: DateTime<Utc>) -> KisResult<Option<AccessTokenRecord>> {
        let record = sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            SELECT id, access_token, expires_at, is_active, created_at
            FROM kis_access_tokens
            WHERE is_active = true AND expires_at > $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_active(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> KisResult<AccessTokenRecord> {
        let record = sqlx::query_as::<_, AccessTokenRecord>(
            r#"
            INSERT INTO kis_access_tokens (id, access_token, expires_at, is_active, created_at)
            VALUES ($1, $2, $3, true, $4)
            RETURNING id, access_token, expires_at, is_active, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(access_token)
        .bind(expires_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn deactivate_all(&self) -> KisResult<u64> {
        let result = sqlx::query(
            "UPDATE kis_access_tokens SET is_active = false WHERE is_active = true",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> KisResult<u64> {
        let result = sqlx::query("DELETE FROM kis_access_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// 인메모리 토큰 저장소.
///
/// 테스트와 DB 없는 로컬 실행을 위한 구현입니다. `PgTokenStore`와
/// 동일한 조회/변경 의미를 갖습니다.
#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<Vec<AccessTokenRecord>>,
}

impl MemoryTokenStore {
    /// 빈 저장소 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 전체 레코드의 스냅샷 반환 (검증용).
    pub async fn snapshot(&self) -> Vec<AccessTokenRecord> {
        self.records.read().await.clone()
    }

    /// 레코드를 직접 추가 (테스트 픽스처용).
    pub async fn push(&self, record: AccessTokenRecord) {
        self.records.write().await.push(record);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find_current(&self, now: DateTime<Utc>) -> KisResult<Option<AccessTokenRecord>> {
        let records = self.records.read().await;
        let current = records
            .iter()
            .filter(|r| r.is_active && r.expires_at > now)
            .max_by_key(|r| r.created_at)
            .cloned();
        Ok(current)
    }

    async fn insert_active(
        &self,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> KisResult<AccessTokenRecord> {
        let record = AccessTokenRecord {
            id: Uuid::new_v4(),
            access_token: access_token.to_string(),
            expires_at,
            is_active: true,
            created_at: Utc::now(),
        };
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn deactivate_all(&self) -> KisResult<u64> {
        let mut records = self.records.write().await;
        let mut count = 0;
        for record in records.iter_mut().filter(|r| r.is_active) {
            record.is_active = false;
            count += 1;
        }
        Ok(count)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> KisResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.expires_at >= now);
        Ok((before - records.len()) as u64)
    }
}
