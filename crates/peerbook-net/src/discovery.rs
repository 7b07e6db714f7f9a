//! Address helpers for joining the DHT and reaching people.
//!
//! Turns configured `host:port` pairs and resolved [`Person`]s into QUIC
//! multiaddrs, and picks the address a node advertises in its presence
//! record.

use std::net::IpAddr;

use hickory_resolver::TokioAsyncResolver;
use libp2p::{multiaddr::Protocol, Multiaddr};
use tracing::{debug, info};

use peerbook_shared::{BootstrapPeer, Person};

use crate::dns::resolve_host;

/// `/ip4/<ip>/udp/<port>/quic-v1` (or `/ip6/...`).
pub fn quic_multiaddr(ip: IpAddr, port: u16) -> Multiaddr {
    Multiaddr::empty()
        .with(Protocol::from(ip))
        .with(Protocol::Udp(port))
        .with(Protocol::QuicV1)
}

/// Extract the IP and UDP port of a QUIC multiaddr.
pub fn socket_of(addr: &Multiaddr) -> Option<(IpAddr, u16)> {
    let mut ip = None;
    let mut port = None;
    for protocol in addr.iter() {
        match protocol {
            Protocol::Ip4(v4) => ip = Some(IpAddr::V4(v4)),
            Protocol::Ip6(v6) => ip = Some(IpAddr::V6(v6)),
            Protocol::Udp(p) => port = Some(p),
            _ => {}
        }
    }
    Some((ip?, port?))
}

/// Choose the address to publish from the node's listen addresses.
///
/// Routable addresses win over loopback; IPv4 wins over IPv6. Unspecified
/// addresses are never chosen.
pub fn pick_advertised(addrs: &[Multiaddr]) -> Option<(IpAddr, u16)> {
    let mut candidates: Vec<(IpAddr, u16)> = addrs
        .iter()
        .filter_map(socket_of)
        .filter(|(ip, _)| !ip.is_unspecified())
        .collect();

    candidates.sort_by_key(|(ip, _)| (ip.is_loopback(), ip.is_ipv6()));
    candidates.into_iter().next()
}

/// Multiaddr for `host:port`. IP literals are used as-is; hostnames go
/// through the DoH resolver since the transport has no DNS layer.
pub async fn resolve_multiaddr(
    host: &str,
    port: u16,
    resolver: &TokioAsyncResolver,
) -> anyhow::Result<Multiaddr> {
    let ip = match host.parse::<IpAddr>() {
        Ok(ip) => ip,
        Err(_) => {
            debug!(host = %host, "Resolving hostname");
            let ip = resolve_host(resolver, host).await?;
            info!(host = %host, ip = %ip, "Resolved hostname");
            ip
        }
    };
    Ok(quic_multiaddr(ip, port))
}

/// Resolve a configured bootstrap peer to a dialable multiaddr.
pub async fn bootstrap_multiaddr(
    peer: &BootstrapPeer,
    resolver: &TokioAsyncResolver,
) -> anyhow::Result<Multiaddr> {
    resolve_multiaddr(&peer.host, peer.port, resolver).await
}

/// Multiaddr at which a person's node can be dialed.
pub async fn person_multiaddr(
    person: &Person,
    resolver: &TokioAsyncResolver,
) -> anyhow::Result<Multiaddr> {
    resolve_multiaddr(&person.address, person.port, resolver).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_quic_multiaddr_roundtrip() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let addr = quic_multiaddr(ip, 5001);
        assert_eq!(addr.to_string(), "/ip4/10.0.0.7/udp/5001/quic-v1");
        assert_eq!(socket_of(&addr), Some((ip, 5001)));
    }

    #[test]
    fn test_socket_of_requires_port() {
        let addr: Multiaddr = "/ip4/127.0.0.1".parse().unwrap();
        assert_eq!(socket_of(&addr), None);
    }

    #[test]
    fn test_pick_advertised_prefers_routable() {
        let addrs: Vec<Multiaddr> = vec![
            "/ip4/127.0.0.1/udp/5001/quic-v1".parse().unwrap(),
            "/ip4/0.0.0.0/udp/5001/quic-v1".parse().unwrap(),
            "/ip4/192.168.1.20/udp/5001/quic-v1".parse().unwrap(),
        ];
        let (ip, port) = pick_advertised(&addrs).unwrap();
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));
        assert_eq!(port, 5001);
    }

    #[test]
    fn test_pick_advertised_falls_back_to_loopback() {
        let addrs: Vec<Multiaddr> = vec!["/ip4/127.0.0.1/udp/6001/quic-v1".parse().unwrap()];
        assert_eq!(
            pick_advertised(&addrs),
            Some((IpAddr::V4(Ipv4Addr::LOCALHOST), 6001))
        );
        assert_eq!(pick_advertised(&[]), None);
    }

    #[tokio::test]
    async fn test_person_multiaddr_ip_literal() {
        let resolver = crate::dns::build_doh_resolver();
        let p = Person::new("bob", "10.1.2.3", 4001);
        assert_eq!(
            person_multiaddr(&p, &resolver).await.unwrap().to_string(),
            "/ip4/10.1.2.3/udp/4001/quic-v1"
        );
    }

    #[tokio::test]
    async fn test_bootstrap_multiaddr_ip_literal_skips_dns() {
        let resolver = crate::dns::build_doh_resolver();
        let peer = BootstrapPeer::new("127.0.0.1", 4001);
        let addr = bootstrap_multiaddr(&peer, &resolver).await.unwrap();
        assert_eq!(addr.to_string(), "/ip4/127.0.0.1/udp/4001/quic-v1");
    }
}
