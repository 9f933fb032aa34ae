//! 한국투자증권 (KIS) 오픈 API 연동.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 접근 토큰 수명 주기 관리 (발급, 캐싱, 정기 갱신, 만료 토큰 정리)
//! - 토큰 저장소 (PostgreSQL / 인메모리)
//! - 인증 헤더가 포함된 게이트웨이 클라이언트 (GET/POST + 에러 정규화)
//! - 일 단위 정기 갱신/정리 스케줄러
//!
//! 시스템 전체에서 활성 토큰은 항상 하나만 유지됩니다. 토큰 발급은
//! `TokenManager`만 수행하며, 나머지 컴포넌트는 발급된 토큰 값을
//! 요청 단위로만 읽습니다.

pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod scheduler;
pub mod store;
pub mod token;

pub use client::KisApiClient;
pub use config::KisConfig;
pub use error::{KisError, KisResult};
pub use manager::TokenManager;
pub use scheduler::{start_token_scheduler, SchedulerConfig};
pub use store::{MemoryTokenStore, PgTokenStore, TokenStore};
pub use token::{AccessTokenRecord, KisErrorEnvelope, TokenResponse};
