use std::net::{Ipv4Addr, SocketAddrV4, ToSocketAddrs};
use std::path::PathBuf;

use clap::Parser;

use crate::Error;

/// Send a file reliably to a peer over a lossy UDP substrate.
#[derive(Debug, Parser)]
#[command(name = "rdt-send", version, about)]
pub struct Cli {
    /// Peer hostname or IPv4 address.
    pub peer_host: String,

    /// Peer UDP port.
    pub peer_port: u16,

    /// Path of the file to transmit.
    pub file_path: PathBuf,

    /// Where to append the CWND/SSTHRESH observation log, or "none" to disable it.
    #[arg(long, default_value = "CWND.csv")]
    pub cwnd_log: String,
}

pub struct Config {
    pub peer: SocketAddrV4,
    pub file_path: PathBuf,
    pub cwnd_log: Option<String>,
}

impl Cli {
    pub fn resolve(self) -> Result<Config, Error> {
        let peer = resolve_peer(&self.peer_host, self.peer_port)?;

        let cwnd_log = if self.cwnd_log.eq_ignore_ascii_case("none") {
            None
        } else {
            Some(self.cwnd_log)
        };

        Ok(Config {
            peer,
            file_path: self.file_path,
            cwnd_log,
        })
    }
}

fn resolve_peer(host: &str, port: u16) -> Result<SocketAddrV4, Error> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddrV4::new(addr, port));
    }

    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.find_map(|a| match a {
            std::net::SocketAddr::V4(v4) => Some(v4),
            _ => None,
        }))
        .ok_or_else(|| Error::InvalidPeer {
            host: host.to_string(),
            port,
        })
}
