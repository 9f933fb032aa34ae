//! 토큰 백그라운드 스케줄러.
//!
//! 서버 실행 중 주기적으로 실행되는 두 개의 독립 작업을 소유합니다:
//! - 정기 토큰 갱신: 매일 지정 시각(기본 09:00 KST)에 무조건 갱신하여
//!   트래픽과 무관하게 토큰 수명을 제한
//! - 만료 토큰 정리: 매일 지정 시각(기본 00:00 KST)에 만료된 레코드 삭제
//!
//! 각 작업의 실패는 로그만 남기며 다음 스케줄에 영향을 주지 않습니다.
//! 시작 시 토큰 예열도 이 모듈에서 수행됩니다.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Asia::Seoul;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::manager::TokenManager;

/// 스케줄러 설정.
///
/// 실행 시각은 한국 표준시(KST) 기준입니다. KIS는 한국 거래소 개장에
/// 맞춰 운영되므로 벽시계 기준점도 KST를 사용합니다.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// 정기 갱신 실행 시각 (KST)
    pub refresh_at: NaiveTime,
    /// 만료 토큰 정리 실행 시각 (KST)
    pub prune_at: NaiveTime,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            // unwrap() 안전: 상수 시각
            refresh_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            prune_at: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
        }
    }
}

impl SchedulerConfig {
    /// 환경변수에서 설정 로드.
    ///
    /// # 환경변수
    /// * `KIS_TOKEN_REFRESH_AT` - 정기 갱신 시각, "HH:MM" (기본: 09:00)
    /// * `KIS_TOKEN_PRUNE_AT` - 정리 시각, "HH:MM" (기본: 00:00)
    pub fn from_env() -> Self {
        let default = Self::default();

        let refresh_at = std::env::var("KIS_TOKEN_REFRESH_AT")
            .ok()
            .and_then(|v| NaiveTime::parse_from_str(&v, "%H:%M").ok())
            .unwrap_or(default.refresh_at);

        let prune_at = std::env::var("KIS_TOKEN_PRUNE_AT")
            .ok()
            .and_then(|v| NaiveTime::parse_from_str(&v, "%H:%M").ok())
            .unwrap_or(default.prune_at);

        Self {
            refresh_at,
            prune_at,
        }
    }
}

/// 토큰 스케줄러 시작.
///
/// 시작 시 토큰 예열(best-effort)을 수행한 뒤, 정기 갱신과 만료 토큰
/// 정리를 각각 독립된 태스크로 실행합니다. 두 작업은 서로, 그리고
/// 요청 처리 중의 on-demand 갱신과 동시에 실행될 수 있습니다.
pub fn start_token_scheduler(
    manager: Arc<TokenManager>,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
) {
    // 시작 시 토큰 예열: 실패해도 프로세스 시작을 막지 않음
    {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager.warm_up().await;
        });
    }

    // 정기 갱신 루프
    {
        let manager = Arc::clone(&manager);
        let shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            info!(at = %config.refresh_at, "토큰 정기 갱신 스케줄러 시작 (KST)");
            loop {
                let delay = delay_until_next(Utc::now(), config.refresh_at);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {
                        info!("정기 토큰 갱신 작업 시작");
                        if let Err(e) = manager.refresh_access_token().await {
                            error!(error = %e, "정기 토큰 갱신 실패, 다음 스케줄에서 재시도");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        info!("토큰 갱신 스케줄러: 종료 시그널 수신");
                        break;
                    }
                }
            }
        });
    }

    // 만료 토큰 정리 루프
    tokio::spawn(async move {
        info!(at = %config.prune_at, "만료 토큰 정리 스케줄러 시작 (KST)");
        loop {
            let delay = delay_until_next(Utc::now(), config.prune_at);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    if let Err(e) = manager.prune_expired().await {
                        error!(error = %e, "만료 토큰 정리 실패");
                    }
                }
                _ = shutdown_token.cancelled() => {
                    info!("만료 토큰 정리 스케줄러: 종료 시그널 수신");
                    break;
                }
            }
        }
    });
}

/// 다음 실행 시각(KST 벽시계 기준)까지의 대기 시간 계산.
fn delay_until_next(now: DateTime<Utc>, at: NaiveTime) -> StdDuration {
    let now_kst = now.with_timezone(&Seoul);
    let mut date = now_kst.date_naive();
    if now_kst.time() >= at {
        date = date + Duration::days(1);
    }

    match Seoul.from_local_datetime(&date.and_time(at)).earliest() {
        Some(next) => (next.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(StdDuration::ZERO),
        // KST에는 DST가 없어 도달하지 않지만, 모호한 경우 하루 뒤로 미룸
        None => StdDuration::from_secs(24 * 60 * 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_delay_same_day() {
        // 08:00 KST (23:00 UTC 전일) → 당일 09:00 KST까지 1시간
        let now = utc("2026-08-23T23:00:00Z");
        let delay = delay_until_next(now, at(9, 0));
        assert_eq!(delay, StdDuration::from_secs(60 * 60));
    }

    #[test]
    fn test_delay_rolls_to_next_day() {
        // 10:00 KST (01:00 UTC) → 다음날 09:00 KST까지 23시간
        let now = utc("2026-08-24T01:00:00Z");
        let delay = delay_until_next(now, at(9, 0));
        assert_eq!(delay, StdDuration::from_secs(23 * 60 * 60));
    }

    #[test]
    fn test_delay_exactly_at_fire_time_waits_full_day() {
        // 09:00 KST 정각이면 다음 실행은 내일
        let now = utc("2026-08-24T00:00:00Z");
        let delay = delay_until_next(now, at(9, 0));
        assert_eq!(delay, StdDuration::from_secs(24 * 60 * 60));
    }

    #[test]
    fn test_midnight_prune_time() {
        // 23:30 KST (14:30 UTC) → 자정까지 30분
        let now = utc("2026-08-24T14:30:00Z");
        let delay = delay_until_next(now, at(0, 0));
        assert_eq!(delay, StdDuration::from_secs(30 * 60));
    }

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.refresh_at, at(9, 0));
        assert_eq!(config.prune_at, at(0, 0));
    }
}
