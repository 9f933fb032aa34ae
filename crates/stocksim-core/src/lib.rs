//! # Stocksim Core
//!
//! 모의 주식 거래 백엔드의 공용 인프라를 제공합니다:
//! - 설정 관리 (환경변수 기반)
//! - 로깅 인프라 (tracing)

pub mod config;
pub mod logging;

pub use config::*;
pub use logging::*;
