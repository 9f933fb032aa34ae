//! 접근 토큰 수명 주기 관리자.
//!
//! 처리 기능:
//! - 토큰 발급 (POST /oauth2/tokenP) 및 저장소 영속화
//! - 요청 시점 캐시 조회 (저장소의 활성/미만료 레코드)
//! - 갱신: 기존 활성 레코드 일괄 비활성화 후 새 토큰 발급
//! - 만료 레코드 정리
//!
//! 갱신 경로는 의도적으로 잠금을 잡지 않습니다. 캐시 미스 상태의
//! 동시 호출자는 각자 발급을 수행할 수 있으며, `is_active` 플래그는
//! 마지막 쓰기가 이깁니다. 조회가 항상 최신 생성 레코드를 선택하므로
//! 토큰 값 자체는 불변으로 유지됩니다.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::KisConfig;
use crate::error::{KisError, KisResult};
use crate::store::TokenStore;
use crate::token::{KisOAuthErrorResponse, TokenResponse};

/// 토큰 발급 요청 본문.
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    appkey: &'a str,
    appsecret: &'a str,
}

/// 접근 토큰 수명 주기 관리자.
///
/// 토큰 레코드에 대한 쓰기는 이 관리자만 수행합니다.
pub struct TokenManager {
    config: KisConfig,
    client: Client,
    store: Arc<dyn TokenStore>,
}

impl TokenManager {
    /// 새 관리자 생성.
    ///
    /// # Errors
    /// 필수 설정이 누락되었거나 HTTP 클라이언트 생성에 실패하면
    /// `KisError::Config`를 반환합니다.
    pub fn new(config: KisConfig, store: Arc<dyn TokenStore>) -> KisResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KisError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            store,
        })
    }

    /// 현재 유효한 토큰 조회 (발급 없음).
    ///
    /// 활성이면서 만료되지 않은 최신 레코드의 토큰을 반환합니다.
    /// 저장소 조회 실패는 로그 후 "없음"으로 간주되어, 호출자가
    /// 갱신 경로로 넘어갈 수 있게 합니다.
    pub async fn current_token(&self) -> Option<String> {
        match self.store.find_current(Utc::now()).await {
            Ok(record) => record.map(|r| r.access_token),
            Err(e) => {
                warn!(error = %e, "토큰 조회 실패, 토큰 없음으로 간주");
                None
            }
        }
    }

    /// 유효한 토큰이 있으면 반환하고, 없으면 새로 발급합니다.
    ///
    /// 외부 API를 호출하는 컴포넌트는 이 메서드만 사용해야 합니다.
    pub async fn ensure_valid_token(&self) -> KisResult<String> {
        if let Some(token) = self.current_token().await {
            debug!("유효한 토큰이 존재합니다");
            return Ok(token);
        }

        info!("유효한 토큰이 없어 새로 발급합니다");
        self.refresh_access_token().await
    }

    /// 접근 토큰 강제 갱신.
    ///
    /// 기존 활성 레코드를 모두 비활성화한 뒤 새 토큰을 발급하고
    /// 저장합니다. 발급에 실패하면 새 레코드는 저장되지 않으며,
    /// 다음 성공 시도까지 활성 토큰이 없는 상태로 남습니다.
    ///
    /// # Errors
    /// 발급 엔드포인트 장애 시 `KisError::TokenIssuance`,
    /// 저장소 쓰기 실패 시 `KisError::Store`를 반환합니다.
    pub async fn refresh_access_token(&self) -> KisResult<String> {
        let deactivated = self.store.deactivate_all().await?;
        if deactivated > 0 {
            debug!(count = deactivated, "기존 활성 토큰 비활성화");
        }

        let issued = self.issue_access_token().await?;
        let expires_at = Utc::now() + Duration::seconds(issued.expires_in);

        let record = self.store.insert_active(&issued.access_token, expires_at).await?;

        info!(
            expires_at = %record.expires_at,
            "새로운 액세스 토큰이 발급되어 저장되었습니다"
        );
        Ok(record.access_token)
    }

    /// KIS API에서 접근 토큰 발급.
    async fn issue_access_token(&self) -> KisResult<TokenResponse> {
        let url = format!("{}/oauth2/tokenP", self.config.base_url);

        let request_body = TokenRequest {
            grant_type: "client_credentials",
            appkey: &self.config.app_key,
            appsecret: &self.config.app_secret,
        };

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json; charset=utf-8")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| KisError::TokenIssuance(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| KisError::TokenIssuance(e.to_string()))?;

        if !status.is_success() {
            error!("토큰 발급 요청 실패: {} - {}", status, body);

            // OAuth 에러 응답이면 코드와 설명을 그대로 전달
            if let Ok(oauth_error) = serde_json::from_str::<KisOAuthErrorResponse>(&body) {
                return Err(KisError::TokenIssuance(format!(
                    "{} ({})",
                    oauth_error.error_description, oauth_error.error_code
                )));
            }

            return Err(KisError::TokenIssuance(format!(
                "토큰 발급 요청 실패: {} - {}",
                status, body
            )));
        }

        let token_resp: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| KisError::TokenIssuance(format!("토큰 응답 파싱 실패: {}", e)))?;

        if token_resp.access_token.is_empty() {
            return Err(KisError::TokenIssuance(
                "토큰 응답에 access_token이 없습니다".to_string(),
            ));
        }

        Ok(token_resp)
    }

    /// 만료된 토큰 레코드 일괄 삭제.
    ///
    /// 순수한 가비지 컬렉션입니다. 조회가 이미 만료 여부를 필터링하므로
    /// 정리 실패가 토큰 조회의 정확성에 영향을 주지 않습니다.
    pub async fn prune_expired(&self) -> KisResult<u64> {
        let deleted = self.store.delete_expired(Utc::now()).await?;
        if deleted > 0 {
            info!(count = deleted, "만료된 토큰을 정리했습니다");
        }
        Ok(deleted)
    }

    /// 시작 시 토큰 예열 (best-effort).
    ///
    /// 첫 실제 요청이 발급 지연을 겪지 않도록 미리 토큰을 확보합니다.
    /// 실패는 로그만 남기며 프로세스 시작을 막지 않습니다.
    pub async fn warm_up(&self) {
        match self.ensure_valid_token().await {
            Ok(_) => info!("시작 시 토큰 예열 완료"),
            Err(e) => warn!(error = %e, "시작 시 토큰 예열 실패, 다음 호출에서 재시도"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;
    use crate::token::AccessTokenRecord;
    use uuid::Uuid;

    fn manager_for(server: &mockito::ServerGuard, store: Arc<MemoryTokenStore>) -> TokenManager {
        let config = KisConfig::new(server.url(), "test-app-key", "test-app-secret");
        TokenManager::new(config, store).unwrap()
    }

    fn token_body(token: &str) -> String {
        format!(
            r#"{{"access_token":"{}","token_type":"Bearer","expires_in":86400}}"#,
            token
        )
    }

    #[test]
    fn test_new_rejects_incomplete_config() {
        let config = KisConfig::new("", "key", "secret");
        let store = Arc::new(MemoryTokenStore::new());
        assert!(matches!(
            TokenManager::new(config, store),
            Err(KisError::Config(_))
        ));
    }

    // 시나리오 A: 레코드 없음 → 발급 1회, 이후 ensure는 발급 없이 재사용
    #[tokio::test]
    async fn test_ensure_issues_once_then_reuses() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(token_body("tok-1"))
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_for(&server, Arc::clone(&store));

        let first = manager.ensure_valid_token().await.unwrap();
        assert_eq!(first, "tok-1");
        assert_eq!(manager.current_token().await.unwrap(), "tok-1");

        let second = manager.ensure_valid_token().await.unwrap();
        assert_eq!(second, "tok-1");

        mock.assert_async().await;
    }

    // 시나리오 B: 활성 토큰이 있어도 갱신하면 교체되고 기존 레코드는 비활성화
    #[tokio::test]
    async fn test_refresh_replaces_active_token() {
        let mut server = mockito::Server::new_async().await;
        let first_mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(token_body("tok-old"))
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_for(&server, Arc::clone(&store));

        manager.ensure_valid_token().await.unwrap();
        first_mock.assert_async().await;

        // 이후 발급은 새 토큰을 반환 (최신 mock이 우선 매칭됨)
        server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(token_body("tok-new"))
            .expect(1)
            .create_async()
            .await;

        let refreshed = manager.refresh_access_token().await.unwrap();
        assert_eq!(refreshed, "tok-new");
        assert_eq!(manager.current_token().await.unwrap(), "tok-new");

        let records = store.snapshot().await;
        assert_eq!(records.len(), 2);
        let active: Vec<_> = records.iter().filter(|r| r.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].access_token, "tok-new");
    }

    // 시나리오 C: 발급 엔드포인트 500 → 실패, 레코드 미저장
    #[tokio::test]
    async fn test_issuance_failure_leaves_no_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/tokenP")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_for(&server, Arc::clone(&store));

        let result = manager.ensure_valid_token().await;
        assert!(matches!(result, Err(KisError::TokenIssuance(_))));
        assert!(store.snapshot().await.is_empty());
        assert!(manager.current_token().await.is_none());
    }

    // 발급 실패 시 기존 토큰은 이미 비활성화된 상태로 남음 (원 설계의 동작)
    #[tokio::test]
    async fn test_failed_refresh_deactivates_prior_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/tokenP")
            .with_status(503)
            .with_body(r#"{"error_code":"EGW00001","error_description":"일시적인 오류"}"#)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        store
            .push(AccessTokenRecord {
                id: Uuid::new_v4(),
                access_token: "tok-prior".to_string(),
                expires_at: Utc::now() + Duration::hours(1),
                is_active: true,
                created_at: Utc::now(),
            })
            .await;

        let manager = manager_for(&server, Arc::clone(&store));

        let result = manager.refresh_access_token().await;
        assert!(matches!(result, Err(KisError::TokenIssuance(_))));

        // 비활성화는 발급 전에 수행되므로 활성 토큰 없음
        assert!(manager.current_token().await.is_none());
    }

    // 만료된 활성 레코드는 무시되고 새 토큰이 발급됨
    #[tokio::test]
    async fn test_expired_active_record_triggers_refresh() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(token_body("tok-fresh"))
            .expect(1)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        store
            .push(AccessTokenRecord {
                id: Uuid::new_v4(),
                access_token: "tok-stale".to_string(),
                expires_at: Utc::now() - Duration::seconds(1),
                is_active: true,
                created_at: Utc::now() - Duration::hours(25),
            })
            .await;

        let manager = manager_for(&server, Arc::clone(&store));

        assert!(manager.current_token().await.is_none());
        assert_eq!(manager.ensure_valid_token().await.unwrap(), "tok-fresh");
        mock.assert_async().await;
    }

    // 불완전한 발급 응답 (expires_in 누락)은 발급 실패로 처리
    #[tokio::test]
    async fn test_incomplete_issuance_response_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/oauth2/tokenP")
            .with_status(200)
            .with_body(r#"{"access_token":"tok","token_type":"Bearer"}"#)
            .create_async()
            .await;

        let store = Arc::new(MemoryTokenStore::new());
        let manager = manager_for(&server, Arc::clone(&store));

        let result = manager.ensure_valid_token().await;
        assert!(matches!(result, Err(KisError::TokenIssuance(_))));
        assert!(store.snapshot().await.is_empty());
    }

    // 정리 작업은 미만료 레코드를 절대 삭제하지 않음
    #[tokio::test]
    async fn test_prune_never_removes_valid_records() {
        let server = mockito::Server::new_async().await;
        let store = Arc::new(MemoryTokenStore::new());
        let now = Utc::now();

        store
            .push(AccessTokenRecord {
                id: Uuid::new_v4(),
                access_token: "tok-expired".to_string(),
                expires_at: now - Duration::hours(1),
                is_active: false,
                created_at: now - Duration::hours(25),
            })
            .await;
        store
            .push(AccessTokenRecord {
                id: Uuid::new_v4(),
                access_token: "tok-valid".to_string(),
                expires_at: now + Duration::hours(23),
                is_active: true,
                created_at: now,
            })
            .await;

        let manager = manager_for(&server, Arc::clone(&store));

        let deleted = manager.prune_expired().await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(manager.current_token().await.unwrap(), "tok-valid");
    }
}
