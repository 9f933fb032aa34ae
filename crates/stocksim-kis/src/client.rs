//! KIS API 게이트웨이 클라이언트.
//!
//! 토큰 관리자에서 확보한 접근 토큰으로 인증 헤더를 구성하고
//! 외부 API 호출을 수행합니다. KIS 에러 응답은 원본 HTTP 상태를
//! 보존한 단일 에러 형태(`KisError::Api`)로 정규화되며, 그 외의
//! 전송 계층 실패는 상태 500의 일반 에러로 변환됩니다.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::KisConfig;
use crate::error::{KisError, KisResult};
use crate::manager::TokenManager;
use crate::token::KisErrorEnvelope;

/// 고객 유형 헤더 값 (P = 개인).
const CUSTTYPE: &str = "P";

/// 정규화된 알 수 없는 에러의 메시지 코드.
const UNKNOWN_ERROR_CODE: &str = "UNKNOWN";

/// KIS API 게이트웨이 클라이언트.
///
/// `TokenManager`를 `Arc`로 공유하여 여러 클라이언트가 동일한
/// 토큰을 사용합니다. KIS API는 토큰 발급을 1분에 1회로 제한하므로
/// 토큰 공유가 필수적입니다.
pub struct KisApiClient {
    config: KisConfig,
    client: Client,
    token_manager: Arc<TokenManager>,
}

impl KisApiClient {
    /// 새 게이트웨이 클라이언트 생성.
    ///
    /// # Errors
    /// 필수 설정(기본 URL, AppKey, AppSecret)이 누락되었거나
    /// HTTP 클라이언트 생성에 실패하면 `KisError::Config`를 반환합니다.
    pub fn new(config: KisConfig, token_manager: Arc<TokenManager>) -> KisResult<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| KisError::Config(format!("HTTP 클라이언트 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            token_manager,
        })
    }

    /// 인증된 요청을 위한 공통 헤더 생성.
    ///
    /// # Errors
    /// 유효한 토큰을 확보하지 못하면 `KisError::AuthUnavailable`을
    /// 반환합니다.
    pub async fn build_headers(&self, tr_id: &str) -> KisResult<HeaderMap> {
        let token = self
            .token_manager
            .ensure_valid_token()
            .await
            .map_err(|e| KisError::AuthUnavailable(e.to_string()))?;

        let mut headers = HeaderMap::new();

        // 상수 문자열은 컴파일 타임에 검증되므로 unwrap() 안전
        headers.insert(
            "content-type",
            "application/json; charset=utf-8".parse().unwrap(),
        );
        headers.insert("custtype", CUSTTYPE.parse().unwrap());

        // 동적 값들은 에러로 전파
        headers.insert(
            "authorization",
            format!("Bearer {}", token)
                .parse()
                .map_err(|_| unknown_error("authorization 헤더에 유효하지 않은 문자 포함"))?,
        );
        headers.insert(
            "appkey",
            self.config
                .app_key
                .parse()
                .map_err(|_| unknown_error("appkey에 유효하지 않은 문자 포함"))?,
        );
        headers.insert(
            "appsecret",
            self.config
                .app_secret
                .parse()
                .map_err(|_| unknown_error("appsecret에 유효하지 않은 문자 포함"))?,
        );
        headers.insert(
            "tr_id",
            tr_id
                .parse()
                .map_err(|_| unknown_error("tr_id에 유효하지 않은 문자 포함"))?,
        );

        Ok(headers)
    }

    /// GET 요청 수행.
    ///
    /// # 인자
    /// * `path` - API 경로 (예: "/uapi/domestic-stock/v1/quotations/...")
    /// * `tr_id` - API별 고유 거래 ID
    /// * `params` - 쿼리 파라미터
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        tr_id: &str,
        params: &[(&str, &str)],
    ) -> KisResult<T> {
        let headers = self.build_headers(tr_id).await?;
        let url = format!("{}{}", self.config.base_url, path);

        debug!(%url, tr_id, "KIS API GET 요청");

        let response = self
            .client
            .get(&url)
            .headers(headers)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                error!(path, error = %e, "KIS API 요청 실패");
                unknown_error(&e.to_string())
            })?;

        self.decode_response(path, response).await
    }

    /// POST 요청 수행 (JSON 본문).
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        tr_id: &str,
        body: &B,
    ) -> KisResult<T> {
        let headers = self.build_headers(tr_id).await?;
        let url = format!("{}{}", self.config.base_url, path);

        debug!(%url, tr_id, "KIS API POST 요청");

        let response = self
            .client
            .post(&url)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(path, error = %e, "KIS API 요청 실패");
                unknown_error(&e.to_string())
            })?;

        self.decode_response(path, response).await
    }

    /// 응답 디코딩 및 에러 정규화.
    async fn decode_response<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> KisResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unknown_error(&e.to_string()))?;

        if !status.is_success() {
            error!(path, %status, "KIS API 에러 응답: {}", body);
            return Err(map_api_error(status, &body));
        }

        serde_json::from_str(&body).map_err(|e| {
            error!(path, error = %e, "KIS API 응답 파싱 실패");
            unknown_error(&format!("응답 파싱 실패: {}", e))
        })
    }
}

/// 비 2xx 응답을 정규화된 에러로 변환.
///
/// 본문이 KIS 에러 응답 형식이면 원본 상태/코드/메시지를 보존하고,
/// 그 외에는 상태 500의 일반 에러로 처리합니다.
fn map_api_error(status: StatusCode, body: &str) -> KisError {
    if let Ok(envelope) = serde_json::from_str::<KisErrorEnvelope>(body) {
        return KisError::Api {
            status_code: status.as_u16(),
            error_code: envelope.msg_cd,
            error_message: envelope.msg1,
        };
    }

    unknown_error(body)
}

/// 전송 계층 실패를 상태 500의 일반 에러로 변환.
fn unknown_error(detail: &str) -> KisError {
    debug!("KIS API 알 수 없는 오류: {}", detail);
    KisError::Api {
        status_code: 500,
        error_code: UNKNOWN_ERROR_CODE.to_string(),
        error_message: "한국투자증권 API 호출 중 알 수 없는 오류가 발생했습니다".to_string(),
    }
}
