//! 업로드 (PUT) 상태 머신
//!
//! WRQ → ACK(0) → { 블록 읽기+인코딩 → DATA(n) → ACK(n) } 반복.
//! 512바이트 미만 페이로드가 마지막 블록이고, 파일 크기가 512의
//! 배수면 빈 DATA로 끝낸다.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::io::AsyncReadExt;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::netascii::Encoder;
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

/// 업로드 송신자. 전송 태스크가 단독 소유한다.
pub struct Sender {
    config: Config,
    socket: UdpSocket,
    server_addr: SocketAddr,
    session: Session,
    /// netascii/mail일 때만 Some
    encoder: Option<Encoder>,
    /// 인코딩 결과가 512바이트를 넘칠 때의 carry-over 버퍼
    carry: Vec<u8>,
    eof: bool,
    /// 마지막(짧은) 블록을 이미 보냈음
    finished: bool,
    stats: Arc<RwLock<TransferStats>>,
    stop: watch::Receiver<bool>,
}

impl Sender {
    pub fn new(
        config: Config,
        socket: UdpSocket,
        server_addr: SocketAddr,
        session: Session,
        stats: Arc<RwLock<TransferStats>>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let encoder = session.mode.is_text().then(Encoder::new);
        Self {
            config,
            socket,
            server_addr,
            session,
            encoder,
            carry: Vec::with_capacity(2 * BLOCK_LEN),
            eof: false,
            finished: false,
            stats,
            stop,
        }
    }

    /// 전송 실행. 반환 시점에는 완료가 정확히 한 번 전달되어 있다.
    pub async fn run(mut self) {
        if let Err(err) = self.drive().await {
            warn!("업로드 실패: {}", err);
            self.session.finalize(Err(err)).await;
        }
    }

    async fn drive(&mut self) -> Result<()> {
        info!(
            "PUT {} -> {} ({})",
            self.session.local.display(),
            self.session.remote,
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

    /// 타이머 만료: 한도 내에서 마지막 데이터그램을 재전송한다
    async fn on_timeout(&mut self) -> Result<Flow> {
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
            Packet::Ack { block } => self.on_ack(block).await,
            _ => Ok(Flow::Continue),
        }
    }

    /// 기대 블록의 ACK이면 다음 블록을 보내고, 아니면 무시한다
    async fn on_ack(&mut self, block: u16) -> Result<Flow> {
        if block != self.session.block_num {
            debug!(
                "늦거나 중복된 ACK {} 무시 (기대 {})",
                block, self.session.block_num
            );
            return Ok(Flow::Continue);
        }

        self.session.retries = 0;

        if self.finished {
            info!("업로드 완료: {}", self.session.remote);
            self.session.finalize(Ok(Status::ok())).await;
            return Ok(Flow::Done);
        }

        self.send_block().await?;
        Ok(Flow::Rearm)
    }

    async fn send_request(&mut self) -> Result<()> {
        let wrq = Packet::Wrq {
            filename: self.session.remote.clone(),
            mode: self.session.mode,
        };
        self.session.send_buffer = wrq.to_bytes();
        self.session.last_opcode = Some(Opcode::Wrq);
        self.transmit().await
    }

    /// 다음 DATA 블록 구성: carry 버퍼를 512바이트까지 채운 뒤 잘라낸다
    async fn send_block(&mut self) -> Result<()> {
        while self.carry.len() < BLOCK_LEN && !self.eof {
            let mut chunk = [0u8; BLOCK_LEN];
            let file = self
                .session
                .file
                .as_mut()
                .ok_or(Error::StateNotRecoverable)?;
            let n = file.read(&mut chunk).await?;

            if n == 0 {
                self.eof = true;
                if let Some(encoder) = self.encoder.as_mut() {
                    encoder.finish(&mut self.carry);
                }
            } else {
                match self.encoder.as_mut() {
                    Some(encoder) => encoder.encode(&chunk[..n], &mut self.carry),
                    None => self.carry.extend_from_slice(&chunk[..n]),
                }
            }
        }

        let take = self.carry.len().min(BLOCK_LEN);
        let payload: Vec<u8> = self.carry.drain(..take).collect();
        if payload.len() < BLOCK_LEN {
            self.finished = true;
        }

        self.session.block_num = self.session.block_num.wrapping_add(1);
        let data = Packet::Data {
            block: self.session.block_num,
            payload: Bytes::from(payload),
        };
        self.session.send_buffer = data.to_bytes();
        self.session.last_opcode = Some(Opcode::Data);

        {
            let mut stats = self.stats.write();
            stats.total_blocks += 1;
            stats.total_bytes += take as u64;
        }

        self.transmit().await
    }

    /// 데이터그램 송신 + RTT 갱신
    async fn transmit(&mut self) -> Result<()> {
        let peer = self.session.peer.unwrap_or(self.server_addr);
        self.socket.send_to(&self.session.send_buffer, peer).await?;
        let avg = self.session.statistics.update();
        self.stats.write().avg_rtt = avg;
        Ok(())
    }

    /// 재전송 타이머: put_rtt_factor × avg_rtt
    fn arm(&self) -> time::Instant {
        time::Instant::now() + self.config.put_rtt_factor * self.session.statistics.avg_rtt
    }
}
