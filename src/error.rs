//! 에러 타입 정의

use thiserror::Error;

use crate::packet::Mode;

/// TFTP 클라이언트 에러 타입
///
/// 전송 계층/로컬 실패만 여기에 담는다. 서버가 보고한 프로토콜 수준
/// 결과는 [`crate::Status`]로 전달된다.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("호스트 해석 실패: {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("주소를 찾을 수 없음: {host}")]
    AddressNotFound { host: String },

    #[error("{mode} 모드는 업로드에서만 허용됨")]
    ModeNotAllowed { mode: Mode },

    #[error("로컬 파일 이름이 유효하지 않음: {path}")]
    InvalidLocalPath { path: String },

    #[error("전송 취소됨")]
    Cancelled,

    #[error("상태 복구 불가")]
    StateNotRecoverable,
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
