//! 전송 오케스트레이터
//!
//! 전송마다 새 소켓(임시 포트)과 단일 태스크를 만들고, 완료는
//! oneshot으로 정확히 한 번 전달받는다. 상태 머신의 에러 arm이
//! cleanup 후 finalize를 수행하므로 핸들 쪽에서는 결과만 기다리면
//! 된다. 태스크가 완료 없이 죽는 경우는 닫힌 채널로 감지한다.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::fs::File;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::packet::{Mode, Status};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::session::{Outcome, Session};
use crate::stats::TransferStats;

/// 진행 중인 전송 핸들
///
/// 핸들을 버리면 stop 신호가 끊겨 전송도 취소된다.
pub struct Transfer {
    done: oneshot::Receiver<Outcome>,
    stats: Arc<RwLock<TransferStats>>,
    stop: watch::Sender<bool>,
}

impl Transfer {
    /// 완료 대기. 완료는 정확히 한 번 전달된다.
    pub async fn wait(self) -> Result<Status> {
        match self.done.await {
            Ok(outcome) => outcome,
            // 태스크가 완료를 전달하지 못하고 죽음
            Err(_) => Err(Error::StateNotRecoverable),
        }
    }

    /// 진행 통계 스냅샷
    pub fn stats(&self) -> TransferStats {
        self.stats.read().clone()
    }

    /// 전송 중단 요청. 루프는 다음 중단점에서 정리 후 종료한다.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// TFTP 클라이언트
///
/// # Example
///
/// ```rust,no_run
/// use tftpc::{Client, Config, Mode};
///
/// # async fn example() -> tftpc::Result<()> {
/// let client = Client::new(Config::default());
/// let server = tftpc::resolve::resolve("192.168.1.100", 69).await?;
///
/// let transfer = client.get(server, "remote.txt", "local.txt", Mode::Octet).await?;
/// let status = transfer.wait().await?;
/// assert!(status.is_ok());
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: Config,
}

impl Client {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 파일 업로드 (WRQ). 로컬 파일을 읽어 원격 이름으로 보낸다.
    pub async fn put(
        &self,
        server: SocketAddr,
        local: impl AsRef<Path>,
        remote: impl Into<String>,
        mode: Mode,
    ) -> Result<Transfer> {
        let local = local.as_ref();
        let file = File::open(local).await?;

        let (handle, mut session, stats, stop) = self.prepare(remote.into(), local, mode);
        session.file = Some(file);

        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        debug!("업로드 소켓: {}", socket.local_addr()?);

        let sender = Sender::new(
            self.config.clone(),
            socket,
            server,
            session,
            stats,
            stop,
        );
        tokio::spawn(sender.run());

        Ok(handle)
    }

    /// 파일 다운로드 (RRQ). 임시 파일에 받은 뒤 성공 시 최종 경로로 옮긴다.
    pub async fn get(
        &self,
        server: SocketAddr,
        remote: impl Into<String>,
        local: impl AsRef<Path>,
        mode: Mode,
    ) -> Result<Transfer> {
        // mail은 업로드 전용
        if mode == Mode::Mail {
            return Err(Error::ModeNotAllowed { mode });
        }

        let local = local.as_ref();
        let tmp_dir = self
            .config
            .tmp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let tmp = Session::tmp_path(&tmp_dir, local)?;

        let (handle, mut session, stats, stop) = self.prepare(remote.into(), local, mode);
        session.file = Some(File::create(&tmp).await?);
        session.tmp = Some(tmp);

        let socket = UdpSocket::bind(self.config.bind_addr).await?;
        debug!("다운로드 소켓: {}", socket.local_addr()?);

        let receiver = Receiver::new(
            self.config.clone(),
            socket,
            server,
            session,
            stats,
            stop,
        );
        tokio::spawn(receiver.run());

        Ok(handle)
    }

    /// 세션/핸들 공통 배선: 완료 oneshot, stop watch, 통계 스냅샷
    fn prepare(
        &self,
        remote: String,
        local: &Path,
        mode: Mode,
    ) -> (
        Transfer,
        Session,
        Arc<RwLock<TransferStats>>,
        watch::Receiver<bool>,
    ) {
        let (done_tx, done_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        let stats = Arc::new(RwLock::new(TransferStats::new()));

        let session = Session::new(remote, local.to_path_buf(), mode, done_tx);
        let handle = Transfer {
            done: done_rx,
            stats: stats.clone(),
            stop: stop_tx,
        };

        (handle, session, stats, stop_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_rejects_mail_mode() {
        let client = Client::new(Config::default());
        let server: SocketAddr = "127.0.0.1:69".parse().unwrap();

        let result = client.get(server, "inbox", "local.txt", Mode::Mail).await;
        assert!(matches!(
            result,
            Err(Error::ModeNotAllowed { mode: Mode::Mail })
        ));
    }

    #[tokio::test]
    async fn test_put_missing_local_file_is_immediate_error() {
        let client = Client::new(Config::default());
        let server: SocketAddr = "127.0.0.1:69".parse().unwrap();

        let result = client
            .put(server, "/no/such/tftpc/file", "remote", Mode::Octet)
            .await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
