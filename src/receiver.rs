//! 다운로드 (GET) 상태 머신
//!
//! RRQ → { DATA(n) → 디코딩+기록 → ACK(n) } 반복. 512바이트 미만
//! DATA가 마지막 블록이다. 기록은 임시 파일로 하고, 마지막 ACK 뒤
//! 유예 타이머가 만료되면 최종 경로로 rename하고 완료한다. 유예
//! 중의 중복 마지막 DATA에는 ACK을 다시 보낸다.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::netascii::Decoder;
use crate::packet::{Opcode, Packet, Status};
use crate::session::{self, Flow, Inbound, Session};
use crate::stats::TransferStats;
use crate::{BLOCK_LEN, DATAGRAM_MAXLEN};

/// 수신 루프가 깨어난 원인
enum Event {
    Stopped,
    Timeout,
    Datagram(usize, SocketAddr),
}

/// 다운로드 수신자. 전송 태스크가 단독 소유한다.
pub struct Receiver {
    config: Config,
    socket: UdpSocket,
    server_addr: SocketAddr,
    session: Session,
    /// netascii일 때만 Some
    decoder: Option<Decoder>,
    /// 마지막 블록을 ACK했고 유예 타이머가 완료 신호로 동작 중
    grace: bool,
    stats: Arc<RwLock<TransferStats>>,
    stop: watch::Receiver<bool>,
}

impl Receiver {
    pub fn new(
        config: Config,
        socket: UdpSocket,
        server_addr: SocketAddr,
        session: Session,
        stats: Arc<RwLock<TransferStats>>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let decoder = session.mode.is_text().then(Decoder::new);
        Self {
            config,
            socket,
            server_addr,
            session,
            decoder,
            grace: false,
            stats,
            stop,
        }
    }

    /// 전송 실행. 반환 시점에는 완료가 정확히 한 번 전달되어 있다.
    pub async fn run(mut self) {
        if let Err(err) = self.drive().await {
            warn!("다운로드 실패: {}", err);
            self.session.finalize(Err(err)).await;
        }
    }

    async fn drive(&mut self) -> Result<()> {
        info!(
            "GET {} -> {} ({})",
            self.session.remote,
            self.session.local.display(),
            self.session.mode
        );

        self.send_request().await?;
        let mut deadline = self.arm();
        let mut buf = vec![0u8; DATAGRAM_MAXLEN + 1];

        loop {
            let event = tokio::select! {
                biased;
                _ = self.stop.changed() => Event::Stopped,
                _ = time::sleep_until(deadline) => Event::Timeout,
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, from) = recv?;
                    Event::Datagram(len, from)
                }
            };

            let flow = match event {
                Event::Stopped => return Err(Error::Cancelled),
                Event::Timeout => self.on_timeout().await?,
                Event::Datagram(len, from) => self.on_datagram(&buf[..len], from).await?,
            };

            match flow {
                Flow::Continue => {}
                Flow::Rearm => deadline = self.arm(),
                Flow::Done => return Ok(()),
            }
        }
    }

    /// 타이머 만료: 유예 중이면 완료 신호, 아니면 재전송
    async fn on_timeout(&mut self) -> Result<Flow> {
        if self.grace {
            return self.complete().await.map(|_| Flow::Done);
        }

        if self.session.retries >= self.config.max_retries {
            debug!("재시도 한도 초과: block {}", self.session.block_num);
            self.session.finalize(Ok(Status::timed_out())).await;
            return Ok(Flow::Done);
        }

        self.session.retries += 1;
        self.stats.write().retransmits += 1;
        debug!(
            "재전송 {:?} block {} (시도 {})",
            self.session.last_opcode, self.session.block_num, self.session.retries
        );
        self.transmit().await?;
        Ok(Flow::Rearm)
    }

    async fn on_datagram(&mut self, datagram: &[u8], from: SocketAddr) -> Result<Flow> {
        let packet = match session::classify(self.session.peer, from, datagram) {
            Inbound::Rogue(addr) => {
                session::reject_unknown_tid(&self.socket, addr).await;
                return Ok(Flow::Continue);
            }
            Inbound::Invalid => {
                self.session.finalize(Ok(Status::invalid_response())).await;
                return Ok(Flow::Done);
            }
            Inbound::Packet(packet) => packet,
        };

        // 첫 정상 응답의 출처가 서버 TID
        if self.session.peer.is_none() {
            self.session.peer = Some(from);
            debug!("서버 TID 학습: {}", from);
        }

        match packet {
            Packet::Error { code, message } => {
                debug!("서버 에러: {} {}", code, message);
                self.session.finalize(Ok(Status::new(code, message))).await;
                Ok(Flow::Done)
            }
            Packet::Data { block, payload } => self.on_data(block, &payload).await,
            _ => Ok(Flow::Continue),
        }
    }

    async fn on_data(&mut self, block: u16, payload: &[u8]) -> Result<Flow> {
        // 유예 중에는 마지막 블록의 중복만 다시 ACK한다
        if self.grace {
            if block == self.session.block_num {
                self.transmit().await?;
                return Ok(Flow::Rearm);
            }
            return Ok(Flow::Continue);
        }

        let expected = self.session.block_num.wrapping_add(1);

        // send_buffer의 "직전 ACK"은 실제로 ACK을 보낸 적이 있을 때만 유효하다.
        // RRQ만 보낸 상태에서 오는 DATA(0)이 여기 걸리면 안 된다.
        let acked_before = self.session.last_opcode == Some(Opcode::Ack);

        if block == self.session.block_num && acked_before {
            // 직전에 ACK한 블록의 중복: 같은 ACK 재전송
            debug!("중복 DATA {} 재확인", block);
            self.transmit().await?;
            return Ok(Flow::Rearm);
        }

        if block != expected {
            debug!("순서 밖 DATA {} 무시 (기대 {})", block, expected);
            return Ok(Flow::Continue);
        }

        self.session.retries = 0;
        let terminal = payload.len() < BLOCK_LEN;

        self.write_payload(payload, terminal).await?;
        self.session.block_num = block;

        {
            let mut stats = self.stats.write();
            stats.total_blocks += 1;
            stats.total_bytes += payload.len() as u64;
        }

        if terminal {
            // 파일을 닫은 뒤 ACK을 보내고 유예 타이머를 완료 신호로 쓴다
            self.session.file.take();
            self.grace = true;
        }

        self.send_ack(block).await?;
        Ok(Flow::Rearm)
    }

    /// 페이로드를 모드에 맞게 디코딩해 임시 파일에 덧붙인다
    async fn write_payload(&mut self, payload: &[u8], terminal: bool) -> Result<()> {
        let file = self
            .session
            .file
            .as_mut()
            .ok_or(Error::StateNotRecoverable)?;

        match self.decoder.as_mut() {
            Some(decoder) => {
                let mut decoded = Vec::with_capacity(payload.len() + 1);
                decoder.decode(payload, &mut decoded);
                if terminal {
                    decoder.finish(&mut decoded);
                }
                file.write_all(&decoded).await?;
            }
            None => file.write_all(payload).await?,
        }

        if terminal {
            file.flush().await?;
        }
        Ok(())
    }

    async fn send_request(&mut self) -> Result<()> {
        let rrq = Packet::Rrq {
            filename: self.session.remote.clone(),
            mode: self.session.mode,
        };
        self.session.send_buffer = rrq.to_bytes();
        self.session.last_opcode = Some(Opcode::Rrq);
        self.transmit().await
    }

    async fn send_ack(&mut self, block: u16) -> Result<()> {
        self.session.send_buffer = Packet::Ack { block }.to_bytes();
        self.session.last_opcode = Some(Opcode::Ack);
        self.transmit().await
    }

    /// 유예 만료: 임시 파일을 최종 경로로 옮기고 완료
    async fn complete(&mut self) -> Result<()> {
        if let Some(tmp) = self.session.tmp.as_ref() {
            tokio::fs::rename(tmp, &self.session.local).await?;
        }
        self.session.tmp = None;
        info!("다운로드 완료: {}", self.session.local.display());
        self.session.finalize(Ok(Status::ok())).await;
        Ok(())
    }

    /// 데이터그램 송신 + RTT 갱신
    async fn transmit(&mut self) -> Result<()> {
        let peer = self.session.peer.unwrap_or(self.server_addr);
        self.socket.send_to(&self.session.send_buffer, peer).await?;
        let avg = self.session.statistics.update();
        self.stats.write().avg_rtt = avg;
        Ok(())
    }

    /// 타이머: get_rtt_factor × avg_rtt (유예 구간 포함)
    fn arm(&self) -> time::Instant {
        time::Instant::now() + self.config.get_rtt_factor * self.session.statistics.avg_rtt
    }
}
