//! UDP worker (C5): a single datagram probe classified by response,
//! ICMP-surfaced error, or timeout. Goes through `tokio::net::UdpSocket`
//! directly rather than raw capture -- UDP needs no handshake to
//! observe, so there's nothing a packet-capture layer would add here.

use crate::orchestrator::WorkerFn;
use cortex_core::{PortState, ScanJob, ScanResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, trace};

const DIAL_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(2);

pub fn worker() -> WorkerFn {
    Arc::new(|job, _catalogue| Box::pin(scan(job)))
}

async fn scan(job: ScanJob) -> ScanResult {
    let state = scan_inner(&job).await;
    let addr = format!("{}:{}", job.host, job.port);
    debug!("{addr} -> {state}");
    ScanResult::new(job.host, job.port, state)
}

async fn scan_inner(job: &ScanJob) -> PortState {
    let addr = format!("{}:{}", job.host, job.port);
    trace!("dialing {addr}");

    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(e) => {
            debug!("failed to bind local UDP socket for {addr}: {e}");
            return PortState::Closed;
        }
    };

    match timeout(DIAL_TIMEOUT, socket.connect(&addr)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            debug!("{addr} connect failed: {e}");
            return PortState::Closed;
        }
        Err(_) => {
            debug!("{addr} connect timed out");
            return PortState::OpenFiltered;
        }
    }

    match timeout(READ_TIMEOUT, socket.send(&[0u8])).await {
        Ok(Ok(n)) => trace!("{addr} sent {n}-byte probe"),
        Ok(Err(e)) => {
            debug!("{addr} send failed: {e}");
            return PortState::OpenFiltered;
        }
        Err(_) => {
            debug!("{addr} send timed out");
            return PortState::OpenFiltered;
        }
    }

    let mut buf = [0u8; 512];
    match timeout(READ_TIMEOUT, socket.recv(&mut buf)).await {
        Ok(Ok(0)) => {
            trace!("{addr} recv returned 0 bytes");
            PortState::OpenFiltered
        }
        Ok(Ok(n)) => {
            trace!("{addr} received {n}-byte response");
            PortState::Open
        }
        Ok(Err(e)) => {
            debug!("{addr} recv failed: {e}");
            PortState::Closed
        }
        Err(_) => {
            trace!("{addr} recv timed out");
            PortState::OpenFiltered
        }
    }
}
