//! 호스트 이름 해석

use std::net::SocketAddr;

use tokio::net::lookup_host;

use crate::error::{Error, Result};

/// 호스트 이름을 UDP 주소 하나로 해석한다. IPv4 우선, 없으면 IPv6.
pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|source| Error::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| Error::AddressNotFound {
            host: host.to_string(),
        })
}
