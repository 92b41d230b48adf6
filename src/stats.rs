//! RTT 추정과 전송 통계

use std::time::{Duration, Instant};

/// 재전송 타이머 하한
pub const TIMEOUT_MIN: Duration = Duration::from_millis(2);

/// 재전송 타이머 상한 (avg_rtt 초기값)
pub const TIMEOUT_MAX: Duration = Duration::from_millis(200);

/// EWMA 한 스텝: `clamp(avg * 3/4 + rtt / 4, MIN, MAX)`
pub fn smooth(avg: Duration, rtt: Duration) -> Duration {
    let next = avg * 3 / 4 + rtt / 4;
    next.clamp(TIMEOUT_MIN, TIMEOUT_MAX)
}

/// 세션 RTT 통계
///
/// `start_time`은 마지막 송신 제출 시각. 매 송신마다 직전 기준점과의
/// 간격을 RTT 표본으로 EWMA에 반영하고 기준점을 옮긴다.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub start_time: Instant,
    pub avg_rtt: Duration,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            avg_rtt: TIMEOUT_MAX,
        }
    }

    /// 송신 제출 시점마다 호출. 갱신된 avg_rtt를 돌려준다.
    pub fn update(&mut self) -> Duration {
        let now = Instant::now();
        let rtt = now - self.start_time;
        self.avg_rtt = smooth(self.avg_rtt, rtt);
        self.start_time = now;
        self.avg_rtt
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// 전송 전체 통계 (핸들에서 스냅샷으로 조회)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 와이어로 오간 페이로드 바이트
    pub total_bytes: u64,

    /// 처리한 블록 수
    pub total_blocks: u64,

    /// 재전송 횟수
    pub retransmits: u64,

    /// 현재 평활 RTT
    pub avg_rtt: Duration,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            total_bytes: 0,
            total_blocks: 0,
            retransmits: 0,
            avg_rtt: TIMEOUT_MAX,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Blocks: {} | Bytes: {} | Retransmits: {} | RTT: {:.1}ms",
            self.elapsed().as_secs_f64(),
            self.total_blocks,
            self.total_bytes,
            self.retransmits,
            self.avg_rtt.as_secs_f64() * 1000.0,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smooth_basic() {
        // 100ms 평균에 표본 0 → 75ms
        assert_eq!(
            smooth(Duration::from_millis(100), Duration::ZERO),
            Duration::from_millis(75)
        );

        // 100ms 평균에 표본 100ms → 그대로
        assert_eq!(
            smooth(Duration::from_millis(100), Duration::from_millis(100)),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_smooth_clamps() {
        // 아래로 수렴해도 TIMEOUT_MIN 밑으로 내려가지 않는다
        assert_eq!(smooth(Duration::from_millis(2), Duration::ZERO), TIMEOUT_MIN);

        // 큰 표본도 TIMEOUT_MAX에서 잘린다
        assert_eq!(
            smooth(Duration::from_millis(200), Duration::from_secs(10)),
            TIMEOUT_MAX
        );
    }

    #[test]
    fn test_smooth_stays_in_range() {
        let samples = [0u64, 1, 5, 50, 199, 200, 500, 10_000];
        let mut avg = TIMEOUT_MAX;
        for &ms in &samples {
            avg = smooth(avg, Duration::from_millis(ms));
            assert!(avg >= TIMEOUT_MIN);
            assert!(avg <= TIMEOUT_MAX);
        }
    }

    #[test]
    fn test_statistics_initial_value() {
        let stats = Statistics::new();
        assert_eq!(stats.avg_rtt, TIMEOUT_MAX);
    }

    #[test]
    fn test_statistics_update_moves_origin() {
        let mut stats = Statistics::new();
        let before = stats.start_time;
        std::thread::sleep(Duration::from_millis(5));
        let avg = stats.update();
        assert!(stats.start_time > before);
        assert_eq!(avg, stats.avg_rtt);
        assert!(avg >= TIMEOUT_MIN && avg <= TIMEOUT_MAX);
    }

    #[test]
    fn test_transfer_stats_summary() {
        let mut stats = TransferStats::new();
        stats.total_blocks = 3;
        stats.total_bytes = 1100;
        let summary = stats.summary();
        assert!(summary.contains("Blocks: 3"));
        assert!(summary.contains("Bytes: 1100"));
    }
}
