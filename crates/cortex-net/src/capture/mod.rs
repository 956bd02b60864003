//! Packet capture abstraction used by the SYN worker to send raw SYNs
//! and observe the first reply.

use cortex_core::Result;

pub trait PacketCapture: Send {
    /// Opens the capture device on the given interface (`None` = pick
    /// the first non-loopback, up interface).
    fn open(&mut self, interface: Option<&str>) -> Result<()>;

    /// Sends a raw, fully-serialized link-layer frame.
    fn send_packet(&mut self, packet: &[u8]) -> Result<()>;

    /// Blocks up to `timeout_ms` for the next captured frame.
    fn receive_packet(&mut self, timeout_ms: u64) -> Result<Option<Vec<u8>>>;

    fn close(&mut self) -> Result<()>;
}

/// Creates a platform-specific capture implementation.
pub fn create_capture() -> Result<Box<dyn PacketCapture>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::LinuxCapture::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(cortex_core::Error::Network(
            "packet capture is only implemented on Linux".to_string(),
        ))
    }
}

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxCapture;
