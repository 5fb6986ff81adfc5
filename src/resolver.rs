use anyhow::{Context, Result};
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::TokioResolver;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::DnsChoice;

/// Resolution failure. The message always starts with "Failed to resolve",
/// which is what probes look for when choosing the DNS hint.
#[derive(Debug, Error)]
#[error("Failed to resolve host {host}: {cause}")]
pub struct ResolveFailure {
    pub host: String,
    pub cause: String,
}

/// Shared resolver used by the TCP probe and plugged into every reqwest client.
#[derive(Clone)]
pub struct DnsResolver {
    inner: Arc<TokioResolver>,
}

impl DnsResolver {
    pub fn new(choice: DnsChoice) -> Result<Self> {
        let resolver = match choice {
            DnsChoice::System => Self {
                inner: Arc::new(
                    TokioResolver::builder_tokio()
                        .context("Failed to read system resolver configuration")?
                        .build(),
                ),
            },
            DnsChoice::Cloudflare => Self::from_config(ResolverConfig::cloudflare()),
            DnsChoice::Google => Self::from_config(ResolverConfig::google()),
        };

        info!(upstream = ?choice, "DNS resolver configured");
        Ok(resolver)
    }

    /// Resolver with explicit upstream name servers.
    pub fn from_config(config: ResolverConfig) -> Self {
        let resolver =
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default()).build();
        Self { inner: Arc::new(resolver) }
    }

    pub async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveFailure> {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let lookup = self.inner.lookup_ip(host).await.map_err(|e| ResolveFailure {
            host: host.to_string(),
            cause: e.to_string(),
        })?;
        let ips: Vec<IpAddr> = lookup.iter().collect();
        if ips.is_empty() {
            return Err(ResolveFailure {
                host: host.to_string(),
                cause: "no addresses found".into(),
            });
        }
        Ok(ips)
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl Resolve for DnsResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let ips = resolver
                .lookup(name.as_str())
                .await
                .map_err(|e| Box::new(e) as BoxError)?;
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok::<Addrs, BoxError>(addrs)
        })
    }
}
