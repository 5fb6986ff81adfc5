//! Reachability probes.
//!
//! Each probe answers "is something alive at this URL" with a boolean and an
//! optional reason. None of them speak the service's real protocol: the TCP
//! probe only proves a listener accepts connections, the proxy probe only
//! proves the proxy answers, and the HTTP probe counts auth challenges as up.

use anyhow::{Context, Result};
use reqwest::{Client, Proxy, StatusCode};
use std::error::Error as StdError;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::config::Timeouts;
use crate::models::{ProbeKind, ProbeOutcome};
use crate::resolver::DnsResolver;

/// Reason shown for any probe that failed on name resolution.
pub const DNS_HINT: &str =
    "Failed to resolve host, check https://dnschecker.org/#A to see DNS propagation.";

const DNS_FAILURE_MARKER: &str = "Failed to resolve";

// reqwest's error when an HTTPS CONNECT tunnel is answered with 407. The
// wording moved from "authentication" to "authorization" between releases.
const TUNNEL_AUTH_MARKERS: &[&str] = &[
    "proxy authorization required",
    "proxy authentication required",
];

const READ_BUFFER: usize = 1024;

const SOCKS_SCHEMES: &[&str] = &["socks4", "socks4a", "socks5", "socks5h"];

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("malformed url {0:?}: expected scheme://host:port")]
    MalformedUrl(String),
    #[error("{0}")]
    ConnectionRefused(std::io::Error),
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("{0}")]
    NameResolution(String),
    #[error("{0}")]
    Connect(std::io::Error),
    #[error("read failed: {0}")]
    Read(std::io::Error),
    #[error("{0}")]
    Http(String),
    #[error("unexpected status {0}")]
    UnexpectedStatus(StatusCode),
}

impl ProbeError {
    /// Human-readable reason. Resolution failures collapse to [`DNS_HINT`]
    /// no matter which layer reported them.
    pub fn reason(&self) -> String {
        let message = self.to_string();
        if message.contains(DNS_FAILURE_MARKER) {
            DNS_HINT.to_string()
        } else {
            message
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        ProbeError::Http(error_chain(&err))
    }
}

impl From<Result<(), ProbeError>> for ProbeOutcome {
    fn from(result: Result<(), ProbeError>) -> Self {
        match result {
            Ok(()) => ProbeOutcome::up(),
            Err(e) => ProbeOutcome::down(e.reason()),
        }
    }
}

/// Joins an error with its sources. reqwest keeps the interesting part
/// (resolver, io) in the source chain, not in its own message.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// Whether a transport error is a proxy refusing the CONNECT tunnel with 407.
pub fn tunnel_auth_required(chain: &str) -> bool {
    TUNNEL_AUTH_MARKERS.iter().any(|marker| chain.contains(marker))
}

/// Splits `scheme://host:port` (scheme optional) into host and port.
pub fn split_host_port(url: &str) -> Result<(&str, u16), ProbeError> {
    let malformed = || ProbeError::MalformedUrl(url.to_string());
    let rest = url.rsplit_once("://").map_or(url, |(_, rest)| rest);

    let mut parts = rest.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(host), Some(port), None) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| malformed())?;
            Ok((host, port))
        }
        _ => Err(malformed()),
    }
}

/// Proxy and request target for a proxy service URL.
///
/// HTTP(S) proxies are asked for the URL itself. SOCKS listeners cannot be
/// fetched directly, so a plain HTTP request to the same address is tunnelled
/// through them instead.
pub fn proxy_route(url: &str) -> Result<(Proxy, String), ProbeError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| ProbeError::MalformedUrl(url.to_string()))?;

    let proxy_address = format!("http://{rest}");
    let route = match scheme {
        "http" => (Proxy::http(&proxy_address), url.to_string()),
        "https" => (Proxy::https(&proxy_address), url.to_string()),
        s if SOCKS_SCHEMES.contains(&s) => (Proxy::all(url), format!("http://{rest}/")),
        _ => (Proxy::all(url), url.to_string()),
    };

    match route {
        (Ok(proxy), target) => Ok((proxy, target)),
        (Err(e), _) => Err(ProbeError::from_reqwest(e)),
    }
}

/// Holds what probes share: the resolver, the plain HTTP client and timeouts.
pub struct Prober {
    http_client: Client,
    resolver: DnsResolver,
    timeouts: Timeouts,
}

impl Prober {
    pub fn new(resolver: DnsResolver, timeouts: Timeouts) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeouts.http())
            .no_proxy()
            .dns_resolver(Arc::new(resolver.clone()))
            .user_agent(concat!("svcpulse/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            resolver,
            timeouts,
        })
    }

    pub async fn check(&self, kind: ProbeKind, url: &str) -> ProbeOutcome {
        let result = match kind {
            ProbeKind::OpenVpn => self.check_tcp(url).await,
            ProbeKind::Proxy => self.check_proxy(url).await,
            ProbeKind::Generic => self.check_http(url).await,
        };
        if let Err(e) = &result {
            debug!(kind = kind.as_str(), url, error = %e, "Probe failed");
        }
        result.into()
    }

    /// Looks `host` up through the shared resolver, bounded by the connect
    /// timeout.
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, ProbeError> {
        match timeout(self.timeouts.connect(), self.resolver.lookup(host)).await {
            Ok(Ok(ips)) => Ok(ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect()),
            Ok(Err(e)) => Err(ProbeError::NameResolution(e.to_string())),
            Err(_) => Err(ProbeError::NameResolution(format!(
                "Failed to resolve host {host}: lookup timed out"
            ))),
        }
    }

    /// SOCKS connectors look the proxy host up on their own, bypassing the
    /// shared resolver. Swap the host for an address resolved here first.
    async fn pin_socks_host(&self, url: &str) -> Result<String, ProbeError> {
        let Some((scheme, rest)) = url.split_once("://") else {
            return Ok(url.to_string());
        };
        if !SOCKS_SCHEMES.contains(&scheme) {
            return Ok(url.to_string());
        }

        let (host, port) =
            split_host_port(rest).map_err(|_| ProbeError::MalformedUrl(url.to_string()))?;
        let addr = self.resolve(host, port).await?.into_iter().next().ok_or_else(|| {
            ProbeError::NameResolution(format!("Failed to resolve host {host}: no addresses found"))
        })?;
        Ok(format!("{scheme}://{addr}"))
    }

    /// Connects and waits briefly for a greeting. Many VPN listeners never
    /// speak first, so data, EOF and a read timeout all count as up.
    pub async fn check_tcp(&self, url: &str) -> Result<(), ProbeError> {
        let (host, port) = split_host_port(url)?;
        let addrs = self.resolve(host, port).await?;

        let connect_timeout = self.timeouts.connect();
        let mut stream = match timeout(connect_timeout, TcpStream::connect(&addrs[..])).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => {
                return Err(ProbeError::ConnectionRefused(e))
            }
            Ok(Err(e)) => return Err(ProbeError::Connect(e)),
            Err(_) => return Err(ProbeError::ConnectTimeout(connect_timeout)),
        };

        let mut buf = [0u8; READ_BUFFER];
        match timeout(self.timeouts.read(), stream.read(&mut buf)).await {
            Ok(Ok(read)) => {
                debug!(url, bytes = read, "TCP listener answered");
                Ok(())
            }
            Ok(Err(e)) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(()),
            Ok(Err(e)) => Err(ProbeError::Read(e)),
            Err(_) => Ok(()),
        }
    }

    /// Sends the request through the proxy itself, without credentials.
    /// A 407 proves the proxy is alive and enforcing auth.
    pub async fn check_proxy(&self, url: &str) -> Result<(), ProbeError> {
        let url = self.pin_socks_host(url).await?;
        let (proxy, target) = proxy_route(&url)?;
        let client = Client::builder()
            .proxy(proxy)
            .timeout(self.timeouts.http())
            .dns_resolver(Arc::new(self.resolver.clone()))
            .build()
            .map_err(ProbeError::from_reqwest)?;

        let response = match client.get(&target).send().await {
            Ok(response) => response,
            Err(e) => {
                let chain = error_chain(&e);
                if tunnel_auth_required(&chain) {
                    return Ok(());
                }
                return Err(ProbeError::Http(chain));
            }
        };

        let status = response.status();
        if status.is_success() || status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedStatus(status))
        }
    }

    /// 401 and 403 mean the endpoint is up and guarding itself.
    pub async fn check_http(&self, url: &str) -> Result<(), ProbeError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(ProbeError::from_reqwest)?;

        let status = response.status();
        if status.is_success()
            || status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
        {
            Ok(())
        } else {
            Err(ProbeError::UnexpectedStatus(status))
        }
    }
}
