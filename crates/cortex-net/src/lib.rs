//! Cortex network layer.
//!
//! Raw packet capture, interface enumeration and privilege checks used
//! by the TCP-SYN worker; the connect and UDP workers go through
//! `tokio::net` directly and don't need any of this.
//!
//! # Example
//!
//! ```no_run
//! use cortex_net::{capture::create_capture, check_privileges};
//!
//! check_privileges().expect("insufficient privileges");
//!
//! let mut capture = create_capture().unwrap();
//! capture.open(Some("eth0")).unwrap();
//!
//! let packet = vec![0u8; 64];
//! capture.send_packet(&packet).unwrap();
//!
//! if let Some(received) = capture.receive_packet(1000).unwrap() {
//!     println!("received {} bytes", received.len());
//! }
//!
//! capture.close().unwrap();
//! ```

pub mod capture;
pub mod interface;
pub mod packet_builder;
pub mod privilege;

pub use capture::{create_capture, PacketCapture};
pub use interface::{
    enumerate_interfaces, find_interface_by_name, find_interface_for_target,
    get_source_ip_for_target, InterfaceError, NetworkInterface,
};
pub use packet_builder::{PacketBuilderError, TcpFlags, TcpPacketBuilder};
pub use privilege::{check_privileges, has_raw_socket_capability};
