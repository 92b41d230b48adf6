//! 와이어 패킷 정의
//!
//! RFC 1350의 5가지 패킷 (RRQ/WRQ/DATA/ACK/ERROR).
//! 모든 16비트 필드는 네트워크 바이트 오더.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::DATAGRAM_MAXLEN;

/// 패킷 opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Opcode {
    /// 읽기 요청
    Rrq = 1,

    /// 쓰기 요청
    Wrq = 2,

    /// 데이터 블록
    Data = 3,

    /// 블록 확인
    Ack = 4,

    /// 에러 통지
    Error = 5,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Opcode> {
        match value {
            1 => Some(Opcode::Rrq),
            2 => Some(Opcode::Wrq),
            3 => Some(Opcode::Data),
            4 => Some(Opcode::Ack),
            5 => Some(Opcode::Error),
            _ => None,
        }
    }
}

/// 전송 모드
///
/// mail은 업로드 전용이며 수신 방향에서는 생성 시점에 거절된다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 줄 끝을 CRLF로 정규화하는 텍스트 모드
    Netascii,

    /// 바이트 그대로 전송
    Octet,

    /// 송신은 netascii와 동일하게 취급
    Mail,
}

impl Mode {
    /// 와이어 토큰 (소문자)
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Netascii => "netascii",
            Mode::Octet => "octet",
            Mode::Mail => "mail",
        }
    }

    /// 대소문자 무시 토큰 파싱
    pub fn parse(token: &str) -> Option<Mode> {
        if token.eq_ignore_ascii_case("netascii") {
            Some(Mode::Netascii)
        } else if token.eq_ignore_ascii_case("octet") {
            Some(Mode::Octet)
        } else if token.eq_ignore_ascii_case("mail") {
            Some(Mode::Mail)
        } else {
            None
        }
    }

    /// 페이로드에 NETASCII 변환이 필요한 모드인지
    pub fn is_text(&self) -> bool {
        !matches!(self, Mode::Octet)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// RFC 1350 에러 코드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    NotDefined = 0,
    FileNotFound = 1,
    AccessViolation = 2,
    DiskFull = 3,
    IllegalOperation = 4,
    UnknownTid = 5,
    FileAlreadyExists = 6,
    NoSuchUser = 7,
}

impl ErrorCode {
    /// 코드별 표준 메시지. 모르는 코드는 NotDefined 취급.
    pub fn message(code: u16) -> &'static str {
        match code {
            1 => "File not found.",
            2 => "Access violation.",
            3 => "Disk full.",
            4 => "Illegal operation.",
            5 => "Unknown TID.",
            6 => "File already exists.",
            7 => "No such user.",
            _ => "Not defined.",
        }
    }
}

/// 전송 결과 상태
///
/// `{0, ""}`이 성공. 0이 아닌 코드는 서버가 보고한 프로토콜 에러,
/// `{0, "Timed out"}`은 로컬 재시도 한도 초과.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub code: u16,
    pub message: String,
}

impl Status {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 성공 상태
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0 && self.message.is_empty()
    }

    /// 재시도 한도 초과
    pub fn timed_out() -> Self {
        Self::new(0, "Timed out")
    }

    /// 형식 위반/잘린 데이터그램
    pub fn invalid_response() -> Self {
        Self::new(ErrorCode::IllegalOperation as u16, "Invalid server response.")
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

/// TFTP 패킷
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Rrq { filename: String, mode: Mode },
    Wrq { filename: String, mode: Mode },
    Data { block: u16, payload: Bytes },
    Ack { block: u16 },
    Error { code: u16, message: String },
}

impl Packet {
    /// 표준 메시지를 담은 ERROR 패킷
    pub fn error(code: ErrorCode) -> Packet {
        Packet::Error {
            code: code as u16,
            message: ErrorCode::message(code as u16).to_string(),
        }
    }

    /// 데이터그램으로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(DATAGRAM_MAXLEN);
        match self {
            Packet::Rrq { filename, mode } => {
                put_request(&mut buf, Opcode::Rrq, filename, *mode);
            }
            Packet::Wrq { filename, mode } => {
                put_request(&mut buf, Opcode::Wrq, filename, *mode);
            }
            Packet::Data { block, payload } => {
                buf.put_u16(Opcode::Data as u16);
                buf.put_u16(*block);
                buf.put_slice(payload);
            }
            Packet::Ack { block } => {
                buf.put_u16(Opcode::Ack as u16);
                buf.put_u16(*block);
            }
            Packet::Error { code, message } => {
                buf.put_u16(Opcode::Error as u16);
                buf.put_u16(*code);
                buf.put_slice(message.as_bytes());
                buf.put_u8(0);
            }
        }
        buf.freeze()
    }

    /// 수신 데이터그램 디코딩
    ///
    /// 길이/형식 위반은 None. 호출측이 불법 응답으로 처리한다.
    pub fn from_bytes(datagram: &[u8]) -> Option<Packet> {
        if datagram.len() < 2 {
            return None;
        }

        let opcode = u16::from_be_bytes([datagram[0], datagram[1]]);
        match Opcode::from_u16(opcode)? {
            Opcode::Rrq => parse_request(&datagram[2..], true),
            Opcode::Wrq => parse_request(&datagram[2..], false),
            Opcode::Data => {
                if datagram.len() < 4 {
                    return None;
                }
                Some(Packet::Data {
                    block: u16::from_be_bytes([datagram[2], datagram[3]]),
                    payload: Bytes::copy_from_slice(&datagram[4..]),
                })
            }
            Opcode::Ack => {
                if datagram.len() != 4 {
                    return None;
                }
                Some(Packet::Ack {
                    block: u16::from_be_bytes([datagram[2], datagram[3]]),
                })
            }
            Opcode::Error => {
                if datagram.len() < 5 {
                    return None;
                }
                let code = u16::from_be_bytes([datagram[2], datagram[3]]);
                let message =
                    String::from_utf8_lossy(error_message(&datagram[4..])).into_owned();
                Some(Packet::Error { code, message })
            }
        }
    }
}

fn put_request(buf: &mut BytesMut, opcode: Opcode, filename: &str, mode: Mode) {
    buf.put_u16(opcode as u16);
    buf.put_slice(filename.as_bytes());
    buf.put_u8(0);
    buf.put_slice(mode.as_str().as_bytes());
    buf.put_u8(0);
}

fn parse_request(body: &[u8], read: bool) -> Option<Packet> {
    let mut parts = body.split(|&b| b == 0);
    let filename = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let mode = Mode::parse(std::str::from_utf8(parts.next()?).ok()?)?;
    if read {
        Some(Packet::Rrq { filename, mode })
    } else {
        Some(Packet::Wrq { filename, mode })
    }
}

/// ERROR 메시지 추출: 첫 NUL 직전까지. NUL이 없으면 빈 메시지.
fn error_message(body: &[u8]) -> &[u8] {
    match body.iter().position(|&b| b == 0) {
        Some(end) => &body[..end],
        None => &[],
    }
}
