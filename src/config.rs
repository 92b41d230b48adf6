//! 클라이언트 설정

use std::net::SocketAddr;
use std::path::PathBuf;

/// TFTP 클라이언트 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 패킷당 최대 재전송 횟수
    pub max_retries: u32,

    /// 업로드 재전송 타이머 배수 (avg_rtt 기준)
    pub put_rtt_factor: u32,

    /// 다운로드 타이머 배수. 마지막 ACK 뒤 완료 유예에도 쓰인다.
    pub get_rtt_factor: u32,

    /// 로컬 바인드 주소 (포트 0 = 전송마다 임시 포트)
    pub bind_addr: SocketAddr,

    /// 다운로드 임시 파일 디렉토리 (None이면 시스템 temp)
    pub tmp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 5,
            put_rtt_factor: 2,
            get_rtt_factor: 5,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            tmp_dir: None,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 손실이 잦은 네트워크용 설정
    pub fn lossy_network() -> Self {
        Self {
            max_retries: 8,
            put_rtt_factor: 3,
            get_rtt_factor: 6,
            ..Self::default()
        }
    }
}
