#![allow(dead_code)]

use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use svcpulse::config::{DnsChoice, ServiceConfig, Timeouts};
use svcpulse::probes::Prober;
use svcpulse::resolver::DnsResolver;

fn timeouts() -> Timeouts {
    Timeouts {
        connect_timeout_ms: 2000,
        read_timeout_ms: 300,
        http_timeout_ms: 3000,
    }
}

pub fn prober() -> Prober {
    // Fixtures are IP literals, so the upstream is never queried.
    let resolver = DnsResolver::new(DnsChoice::Cloudflare).unwrap();
    Prober::new(resolver, timeouts()).unwrap()
}

/// Prober whose resolver only asks `nameserver`.
pub fn prober_using(nameserver: SocketAddr) -> Prober {
    let servers =
        NameServerConfigGroup::from_ips_clear(&[nameserver.ip()], nameserver.port(), true);
    let resolver = DnsResolver::from_config(ResolverConfig::from_parts(None, vec![], servers));
    Prober::new(resolver, timeouts()).unwrap()
}

/// UDP name server that answers every query with NXDOMAIN.
pub async fn nxdomain_nameserver() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 1500];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            if len < 12 {
                continue;
            }
            // Echo the query back as a response: QR set, RA set, RCODE 3.
            let mut reply = buf[..len].to_vec();
            reply[2] |= 0x80;
            reply[3] = 0x83;
            let _ = socket.send_to(&reply, peer).await;
        }
    });
    addr
}

pub fn service(name: &str, service_type: &str, url: String) -> ServiceConfig {
    ServiceConfig {
        name: name.into(),
        service_type: Some(service_type.into()),
        url,
    }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Answers every request with `status` after `delay`.
pub async fn http_server(status: u16, delay: Duration) -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            tokio::spawn(respond(stream, status, delay));
        }
    });
    addr
}

async fn respond(mut stream: TcpStream, status: u16, delay: Duration) {
    let mut buf = [0u8; 4096];
    let mut request = Vec::new();
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                request.extend_from_slice(&buf[..n]);
                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                    break;
                }
            }
        }
    }

    tokio::time::sleep(delay).await;
    let response =
        format!("HTTP/1.1 {status} Fixture\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Accepts connections and never writes.
pub async fn silent_listener() -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    addr
}

/// Writes a greeting and keeps the connection open.
pub async fn greeting_listener(greeting: &'static [u8]) -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.write_all(greeting).await;
            held.push(stream);
        }
    });
    addr
}

/// Accepts and closes immediately, so the client reads EOF.
pub async fn closing_listener() -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let _ = stream.shutdown().await;
        }
    });
    addr
}

/// Accepts and resets the connection.
#[allow(deprecated)]
pub async fn resetting_listener() -> SocketAddr {
    let (listener, addr) = bind().await;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = stream.set_linger(Some(Duration::ZERO));
            drop(stream);
        }
    });
    addr
}

/// A port that was just released, so connecting is refused.
pub async fn closed_port() -> SocketAddr {
    let (listener, addr) = bind().await;
    drop(listener);
    addr
}
