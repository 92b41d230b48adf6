//! TFTP 클라이언트 CLI
//!
//! 사용법:
//!   tftpc -H <host[:port]> get <remote> <local>
//!   tftpc -H <host[:port]> put <local> <remote>

use std::process::ExitCode;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use tftpc::resolve::resolve;
use tftpc::{Client, Config, Mode, DEFAULT_PORT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Put,
}

struct CliConfig {
    hostname: String,
    port: u16,
    method: Method,
    /// get: 원격 이름 / put: 로컬 경로
    first: String,
    /// get: 로컬 경로 / put: 원격 이름
    second: String,
    mode: Mode,
}

fn print_usage(program: &str) {
    eprintln!(
        r#"{program} - TFTP (RFC 1350) 클라이언트

사용법:
  {program} [OPTIONS] get <remote> <local>
  {program} [OPTIONS] put <local> <remote>

인자:
  get <remote> <local>    원격 파일을 로컬 경로로 다운로드
  put <local> <remote>    로컬 파일을 원격 경로로 업로드

옵션:
  -H, --host <host[:port]>  TFTP 서버 (필수, 기본 포트: 69)
  --mode <netascii|octet|mail>  전송 모드 (기본: octet)
  -h, --help                이 도움말 출력

예시:
  {program} -H 192.168.1.10 get firmware.bin ./firmware.bin
  {program} -H tftp.local:6969 --mode netascii put notes.txt notes.txt
"#
    );
}

fn parse_host_port(value: &str) -> Option<(String, u16)> {
    match value.split_once(':') {
        None => Some((value.to_string(), DEFAULT_PORT)),
        Some((host, port)) => {
            if host.is_empty() {
                return None;
            }
            Some((host.to_string(), port.parse().ok()?))
        }
    }
}

fn parse_args(args: &[String]) -> Option<CliConfig> {
    let mut hostname: Option<String> = None;
    let mut port = DEFAULT_PORT;
    let mut mode = Mode::Octet;
    let mut positionals: Vec<String> = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return None,
            "-H" | "--host" => {
                let value = args.get(i + 1)?;
                let (host, parsed_port) = parse_host_port(value)?;
                hostname = Some(host);
                port = parsed_port;
                i += 1;
            }
            "--mode" => {
                let value = args.get(i + 1)?;
                mode = match Mode::parse(value) {
                    Some(mode) => mode,
                    None => {
                        eprintln!("Error: --mode는 netascii, octet, mail 중 하나여야 함");
                        return None;
                    }
                };
                i += 1;
            }
            flag if flag.starts_with('-') => {
                eprintln!("Error: 모르는 옵션: {}", flag);
                return None;
            }
            value => positionals.push(value.to_string()),
        }
        i += 1;
    }

    let hostname = match hostname {
        Some(hostname) => hostname,
        None => {
            eprintln!("Error: --host 옵션이 필요함");
            return None;
        }
    };

    if positionals.len() != 3 {
        eprintln!("Error: 위치 인자는 <method> <src> <dst> 세 개여야 함");
        return None;
    }

    let method = match positionals[0].to_ascii_lowercase().as_str() {
        "get" => Method::Get,
        "put" => Method::Put,
        other => {
            eprintln!("Error: method는 get 또는 put이어야 함: {}", other);
            return None;
        }
    };

    Some(CliConfig {
        hostname,
        port,
        method,
        first: positionals[1].clone(),
        second: positionals[2].clone(),
        mode,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let args: Vec<String> = std::env::args().collect();
    let program = args
        .first()
        .map(String::as_str)
        .unwrap_or("tftpc")
        .to_string();

    let Some(conf) = parse_args(&args[1..]) else {
        print_usage(&program);
        return ExitCode::FAILURE;
    };

    let server = match resolve(&conf.hostname, conf.port).await {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = Client::new(Config::default());

    let transfer = match conf.method {
        Method::Get => {
            client
                .get(server, conf.first.clone(), &conf.second, conf.mode)
                .await
        }
        Method::Put => {
            client
                .put(server, &conf.first, conf.second.clone(), conf.mode)
                .await
        }
    };

    let transfer = match transfer {
        Ok(transfer) => transfer,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match transfer.wait().await {
        Ok(status) => {
            if !status.is_ok() {
                eprintln!("{} {}", status.code, status.message);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
