//! # tftpc
//!
//! RFC 1350 TFTP 클라이언트 코어
//!
//! ## 핵심 특징
//! - **Lockstep 전송**: stop-and-wait DATA/ACK 블록 교환, 짧은 블록으로 종료 감지
//! - **적응형 타임아웃**: EWMA 평활 RTT 기반 재전송 타이머 (클램핑 포함)
//! - **NETASCII 코덱**: 블록 경계를 넘는 carry-over 인코딩/디코딩
//! - **서버 TID 추적**: 첫 응답의 출처 포트를 학습, 이외 출처는 ERROR(5)로 거절
//! - **취소 안전**: 전송당 단일 태스크, cleanup 멱등, 완료는 정확히 한 번

pub mod client;
pub mod config;
pub mod error;
pub mod netascii;
pub mod packet;
pub mod receiver;
pub mod resolve;
pub mod sender;
pub mod session;
pub mod stats;

pub use client::{Client, Transfer};
pub use config::Config;
pub use error::{Error, Result};
pub use packet::{ErrorCode, Mode, Opcode, Packet, Status};
pub use stats::TransferStats;

/// DATA 페이로드 최대 크기 (바이트)
pub const BLOCK_LEN: usize = 512;

/// DATA 헤더 크기 (opcode + 블록 번호)
pub const DATA_HEADER_LEN: usize = 4;

/// 정상 데이터그램 최대 크기
pub const DATAGRAM_MAXLEN: usize = DATA_HEADER_LEN + BLOCK_LEN;

/// 기본 TFTP 서버 포트
pub const DEFAULT_PORT: u16 = 69;
