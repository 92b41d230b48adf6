//! 전송 세션 상태
//!
//! 세션은 파일 핸들, 임시 경로, 송신 버퍼, 피어 TID, 완료 채널을 단독
//! 소유한다. cleanup은 멱등이고 finalize는 cleanup을 먼저 수행한 뒤
//! 완료를 정확히 한 번만 전달한다. 재진입은 no-op.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::packet::{ErrorCode, Mode, Opcode, Packet, Status};
use crate::stats::Statistics;
use crate::DATAGRAM_MAXLEN;

/// 전송 완료 값: 프로토콜 Status 또는 전송 계층 에러
pub type Outcome = Result<Status>;

/// 상태 머신 한 스텝의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// 수신만 다시 제출 (타이머 유지)
    Continue,

    /// 송신이 있었으므로 타이머 재무장
    Rearm,

    /// finalize 완료, 루프 종료
    Done,
}

/// 수신 데이터그램 분류 결과
#[derive(Debug)]
pub(crate) enum Inbound {
    /// 학습된 피어에서 온 정상 패킷
    Packet(Packet),

    /// 피어가 아닌 출처 (ERROR(5)로 응답할 대상)
    Rogue(SocketAddr),

    /// 너무 짧거나 잘렸거나 형식 위반
    Invalid,
}

/// 수신 데이터그램을 분류한다. 피어가 아직 없으면 첫 응답 출처를 피어로 본다.
pub(crate) fn classify(peer: Option<SocketAddr>, from: SocketAddr, datagram: &[u8]) -> Inbound {
    if let Some(peer) = peer {
        if from != peer {
            return Inbound::Rogue(from);
        }
    }

    if datagram.len() < 2 || datagram.len() > DATAGRAM_MAXLEN {
        return Inbound::Invalid;
    }

    match Packet::from_bytes(datagram) {
        Some(packet) => Inbound::Packet(packet),
        None => Inbound::Invalid,
    }
}

/// 피어가 아닌 출처에 ERROR(5)를 보낸다. 실패해도 전송은 계속된다.
pub(crate) async fn reject_unknown_tid(socket: &UdpSocket, from: SocketAddr) {
    warn!("알 수 없는 TID에서 데이터그램: {}", from);
    let reply = Packet::error(ErrorCode::UnknownTid).to_bytes();
    if let Err(e) = socket.send_to(&reply, from).await {
        debug!("TID 거절 응답 실패: {}", e);
    }
}

/// 한 전송의 상태
pub struct Session {
    /// 원격 파일 이름 (요청 패킷에 실린다)
    pub remote: String,

    /// 최종 로컬 경로
    pub local: PathBuf,

    /// 다운로드 임시 파일 경로. 성공 rename 후에는 None.
    pub tmp: Option<PathBuf>,

    /// 열린 파일 핸들
    pub file: Option<File>,

    /// 전송 모드
    pub mode: Mode,

    /// 업로드: 마지막으로 보낸 블록 / 다운로드: 마지막으로 ACK한 블록
    pub block_num: u16,

    /// 마지막으로 보낸 패킷 종류. 중복 DATA에 send_buffer를 "직전 ACK"으로
    /// 재전송해도 되는지 판별하는 데 쓴다.
    pub last_opcode: Option<Opcode>,

    /// 현재 패킷 재전송 횟수 (상태 전진 시 리셋)
    pub retries: u32,

    /// 마지막 송신 데이터그램 (재전송용으로 ACK까지 유지)
    pub send_buffer: Bytes,

    /// 서버 TID. 첫 응답에서 학습한다.
    pub peer: Option<SocketAddr>,

    /// RTT 통계
    pub statistics: Statistics,

    /// 완료 채널. take 후 재진입은 no-op.
    completion: Option<oneshot::Sender<Outcome>>,
}

impl Session {
    pub fn new(
        remote: String,
        local: PathBuf,
        mode: Mode,
        completion: oneshot::Sender<Outcome>,
    ) -> Self {
        Self {
            remote,
            local,
            tmp: None,
            file: None,
            mode,
            block_num: 0,
            last_opcode: None,
            retries: 0,
            send_buffer: Bytes::new(),
            peer: None,
            statistics: Statistics::new(),
            completion: Some(completion),
        }
    }

    /// 임시 파일 경로: `tmp_dir / (local의 파일명)`
    pub fn tmp_path(tmp_dir: &Path, local: &Path) -> Result<PathBuf> {
        let name = local.file_name().ok_or_else(|| Error::InvalidLocalPath {
            path: local.display().to_string(),
        })?;
        Ok(tmp_dir.join(name))
    }

    /// 자원 해제. 모든 종료 경로에서 실행되고 여러 번 불려도 안전하다.
    pub async fn cleanup(&mut self) {
        self.file.take();

        if let Some(tmp) = self.tmp.take() {
            if let Err(e) = tokio::fs::remove_file(&tmp).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("임시 파일 제거 실패 {}: {}", tmp.display(), e);
                }
            }
        }
    }

    /// cleanup 후 완료를 정확히 한 번 전달한다
    pub async fn finalize(&mut self, outcome: Outcome) {
        self.cleanup().await;
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.completion.is_none()
    }
}
