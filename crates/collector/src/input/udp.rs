//! UDP input
//!
//! One blocking socket; each datagram is one IPFIX message, so datagram
//! boundaries are message boundaries and no framing is needed. The loop
//! runs for the life of the process and ends when the pipeline closes
//! under it.

use std::net::{SocketAddr, UdpSocket};

use anyhow::Context;
use bytes::Bytes;
use tracing::{info, warn};

use flowcol_protocol::{SourceInfo, Transport};

use super::Ingestor;
use crate::config::UdpInputConfig;

pub struct UdpInput {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl UdpInput {
    pub fn bind(config: &UdpInputConfig) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(&config.listen)
            .with_context(|| format!("binding udp listener on {}", config.listen))?;
        let input = Self {
            socket,
            buffer: vec![0u8; config.buffer_size],
        };
        info!(listen = %input.local_addr()?, "udp input listening");
        Ok(input)
    }

    /// The address the listener actually bound (resolves port 0)
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.socket.local_addr().context("reading bound udp address")
    }

    /// Receive until the pipeline closes
    pub fn run(&mut self, ingestor: &mut Ingestor) -> anyhow::Result<()> {
        loop {
            let (len, peer) = match self.socket.recv_from(&mut self.buffer) {
                Ok(received) => received,
                Err(e) => {
                    warn!(%e, "udp receive failed");
                    continue;
                }
            };
            let payload = Bytes::copy_from_slice(&self.buffer[..len]);
            let source = SourceInfo::new(peer, Transport::Udp);
            if !ingestor.ingest(payload, source) {
                break;
            }
        }
        info!(rejected = ingestor.rejected(), "udp input stopped");
        Ok(())
    }
}
