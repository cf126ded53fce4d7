//! Command-line interface of the `atomicserver` binary.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, ConfigError};

/// Run the HTTP server with test-controlled transaction scopes.
#[derive(Debug, Parser)]
#[command(name = "atomicserver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port number or ipaddr:port to run the server on
    #[arg(long)]
    pub addrport: Option<String>,

    /// Start the server on an IPv6 address
    #[arg(short = '6', long = "ipv6")]
    pub use_ipv6: bool,

    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "atomic-config.yaml")]
    pub config: PathBuf,
}

impl Cli {
    /// The address to bind to: `--addrport` if given, else the config's
    /// `server` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddrPort`] if the address is malformed.
    pub fn bind_addr(&self, config: &AppConfig) -> Result<SocketAddr, ConfigError> {
        match &self.addrport {
            Some(addrport) => parse_addrport(addrport, self.use_ipv6),
            None => {
                let ip = parse_host(&config.server.host, self.use_ipv6).ok_or_else(|| {
                    ConfigError::InvalidAddrPort(format!(
                        "{}:{}",
                        config.server.host, config.server.port
                    ))
                })?;
                Ok(SocketAddr::new(ip, config.server.port))
            }
        }
    }
}

/// Parse `addr:port`, or a bare port bound to loopback.
///
/// IPv6 addresses may be bracketed (`[::1]:8000`) and are only accepted
/// when `ipv6` is set.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddrPort`] for anything else.
pub fn parse_addrport(value: &str, ipv6: bool) -> Result<SocketAddr, ConfigError> {
    let invalid = || ConfigError::InvalidAddrPort(value.to_owned());

    if let Ok(port) = value.parse::<u16>() {
        let ip = if ipv6 {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };
        return Ok(SocketAddr::new(ip, port));
    }

    let (host, port) = value.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_bad_port| invalid())?;
    let ip = parse_host(host, ipv6).ok_or_else(invalid)?;
    Ok(SocketAddr::new(ip, port))
}

fn parse_host(host: &str, ipv6: bool) -> Option<IpAddr> {
    if host == "localhost" {
        return Some(if ipv6 {
            IpAddr::V6(Ipv6Addr::LOCALHOST)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
    }

    if ipv6 {
        let bare = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        bare.parse::<Ipv6Addr>().ok().map(IpAddr::V6)
    } else {
        host.parse::<Ipv4Addr>().ok().map(IpAddr::V4)
    }
}
