//! TCP-connect worker (C3): completes the three-way handshake, then
//! reuses the same connection to run service-fingerprinting probes.

use crate::orchestrator::WorkerFn;
use cortex_core::{PortState, ProbeCatalogue, ScanJob, ScanResult};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

const DIAL_TIMEOUT: Duration = Duration::from_secs(2);
const LIVENESS_TIMEOUT: Duration = Duration::from_millis(100);
const PROBE_READ_TIMEOUT: Duration = Duration::from_secs(3);
const PROBE_READ_BUF: usize = 4096;

/// Builds the worker function used for `connect`-mode tasks. Unlike
/// the SYN and UDP modes there is no fallible one-time setup.
pub fn worker() -> WorkerFn {
    Arc::new(|job, catalogue| Box::pin(scan(job, catalogue)))
}

async fn scan(job: ScanJob, catalogue: Arc<ProbeCatalogue>) -> ScanResult {
    let addr = format!("{}:{}", job.host, job.port);
    trace!("dialing {addr}");

    let stream = match timeout(DIAL_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            let state = classify_dial_error(&e);
            debug!("{addr} dial failed: {e} ({state})");
            return ScanResult::new(job.host, job.port, state);
        }
        Err(_) => {
            debug!("{addr} dial timed out");
            return ScanResult::new(job.host, job.port, PortState::Filtered);
        }
    };

    probe(stream, job, &catalogue).await
}

fn classify_dial_error(err: &io::Error) -> PortState {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => PortState::Closed,
        _ => PortState::Filtered,
    }
}

async fn probe(mut stream: TcpStream, job: ScanJob, catalogue: &ProbeCatalogue) -> ScanResult {
    let addr = format!("{}:{}", job.host, job.port);

    let mut liveness_buf = [0u8; 1];
    if let Ok(Err(e)) = timeout(LIVENESS_TIMEOUT, stream.read(&mut liveness_buf)).await {
        debug!("{addr} reset during liveness check: {e}");
        return ScanResult::new(job.host, job.port, PortState::Closed);
    }
    debug!(
        "{addr} open, running {} probes",
        catalogue.tcp_probes().len()
    );

    for probe in catalogue.tcp_probes() {
        if !probe.data.is_empty() {
            trace!("{addr} writing probe ({} bytes)", probe.data.len());
            if let Err(e) = stream.write_all(&probe.data).await {
                debug!("{addr} write failed: {e}");
                return ScanResult::new(job.host, job.port, PortState::Closed);
            }
        }

        let mut buf = [0u8; PROBE_READ_BUF];
        match timeout(PROBE_READ_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(0)) => {
                trace!("{addr} probe closed with no data, trying next probe");
                continue;
            }
            Ok(Ok(n)) => {
                let banner = &buf[..n];
                for m in &probe.matches {
                    if m.pattern.is_match(&String::from_utf8_lossy(banner)) {
                        debug!("{addr} matched service {}", m.service_name);
                        return ScanResult::new(job.host, job.port, PortState::Open)
                            .with_service(m.service_name.clone());
                    }
                }
                debug!("{addr} open, no probe match, {n} bytes of raw banner");
                return ScanResult::new(job.host, job.port, PortState::Open)
                    .with_service(String::from_utf8_lossy(banner).into_owned());
            }
            Ok(Err(e)) => {
                debug!("{addr} read failed: {e}");
                return ScanResult::new(job.host, job.port, PortState::Closed);
            }
            Err(_) => {
                trace!("{addr} probe read timed out, trying next probe");
                continue;
            }
        }
    }

    ScanResult::new(job.host, job.port, PortState::Open)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cortex_core::Protocol;
    use tokio::net::TcpListener;

    async fn empty_catalogue() -> ProbeCatalogue {
        ProbeCatalogue::default()
    }

    #[tokio::test]
    async fn closed_port_has_no_listener() {
        let job = ScanJob {
            host: "127.0.0.1".to_string(),
            port: 1,
        };
        let result = scan(job, Arc::new(empty_catalogue().await)).await;
        assert_eq!(result.state, PortState::Closed);
        assert_eq!(result.service, "");
    }

    #[tokio::test]
    async fn open_port_with_matched_probe() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 64];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nServer: stub\r\n\r\n")
                    .await;
            }
        });

        let (catalogue, _stats) = ProbeCatalogue::parse(
            "Probe TCP GetRequest q|GET / HTTP/1.0\\r\\n\\r\\n|\nports 80\nmatch http m|^HTTP/1\\.[01] |\n",
        );

        let job = ScanJob {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let result = scan(job, Arc::new(catalogue)).await;
        assert_eq!(result.state, PortState::Open);
        assert_eq!(result.service, "http");
    }

    #[tokio::test]
    async fn open_port_with_unmatched_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 64];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(b"GARBAGE\n").await;
            }
        });

        let (catalogue, _stats) = ProbeCatalogue::parse(
            "Probe TCP GetRequest q|GET / HTTP/1.0\\r\\n\\r\\n|\nports 80\nmatch http m|^HTTP/1\\.[01] |\n",
        );

        let job = ScanJob {
            host: addr.ip().to_string(),
            port: addr.port(),
        };
        let result = scan(job, Arc::new(catalogue)).await;
        assert_eq!(result.state, PortState::Open);
        assert_eq!(result.service, "GARBAGE\n");
    }

    #[test]
    fn classify_connection_refused_as_closed() {
        let err = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(classify_dial_error(&err), PortState::Closed);
    }

    #[test]
    fn classify_other_errors_as_filtered() {
        let err = io::Error::from(io::ErrorKind::NetworkUnreachable);
        assert_eq!(classify_dial_error(&err), PortState::Filtered);
    }

    #[test]
    fn protocol_is_reexported_for_probe_authors() {
        // keeps `Protocol` imported for probe construction in other tests
        let _ = Protocol::Tcp;
    }
}
