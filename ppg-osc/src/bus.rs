//! The OSC bus: broadcast UDP transport with reuse-port listeners.
//!
//! Each logical port (ppg/beat/control/admin) is one [`OscBus`]. Producers
//! call [`OscBus::broadcast`]; any number of consumer processes or threads
//! can call [`OscBus::spawn_listener`] against the same port and each
//! receives every datagram.
//!
//! Receive threads poll with a short timeout (<=100ms) so they can observe
//! a shutdown flag without blocking indefinitely.

use std::fmt;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::message::BusMessage;
use crate::socket::bind_reuse_port;

/// How often a listener thread wakes up to check the shutdown flag.
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum OscBusError {
    Bind(std::io::Error),
    Send(std::io::Error),
}

impl fmt::Display for OscBusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscBusError::Bind(e) => write!(f, "failed to bind OSC port: {e}"),
            OscBusError::Send(e) => write!(f, "failed to send OSC message: {e}"),
        }
    }
}

impl std::error::Error for OscBusError {}

/// A single logical OSC port: a broadcast target address plus the means to
/// listen on it any number of times.
pub struct OscBus {
    port: u16,
    broadcast_addr: SocketAddr,
    send_socket: UdpSocket,
}

impl OscBus {
    /// Open the bus for port `port`. Broadcasts go to 255.255.255.255:port
    /// by default (local-segment broadcast, not routed) so every reuse-port
    /// listener on the host receives them.
    pub fn open(port: u16) -> Result<Self, OscBusError> {
        let send_socket = UdpSocket::bind(("0.0.0.0", 0)).map_err(OscBusError::Bind)?;
        send_socket.set_broadcast(true).map_err(OscBusError::Bind)?;
        let broadcast_addr: SocketAddr = format!("255.255.255.255:{port}")
            .parse()
            .expect("valid broadcast address");
        Ok(Self {
            port,
            broadcast_addr,
            send_socket,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Broadcast one message to every listener on this port. UDP loss is
    /// accepted silently; the only error surfaced is a local socket
    /// failure.
    pub fn broadcast(&self, msg: &BusMessage) -> Result<(), OscBusError> {
        let packet = msg.encode();
        let bytes = rosc::encoder::encode(&packet).map_err(|e| {
            OscBusError::Send(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.send_socket
            .send_to(&bytes, self.broadcast_addr)
            .map_err(OscBusError::Send)?;
        Ok(())
    }

    /// Spawn a dedicated receive thread bound to this port with the
    /// reuse-port option, invoking `handler` for every decodable message.
    /// Returns a shutdown handle: drop it or call `.stop()` to end the
    /// thread within one `POLL_TIMEOUT`.
    pub fn spawn_listener<F>(
        &self,
        name: &str,
        handler: F,
    ) -> Result<ListenerHandle, OscBusError>
    where
        F: Fn(BusMessage) + Send + 'static,
    {
        let addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse().unwrap();
        let socket = bind_reuse_port(addr).map_err(OscBusError::Bind)?;
        socket
            .set_read_timeout(Some(POLL_TIMEOUT))
            .map_err(OscBusError::Bind)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);
        let thread_name = name.to_string();

        let join = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    if thread_shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    match socket.recv(&mut buf) {
                        Ok(n) => {
                            if let Ok((_, packet)) = rosc::decoder::decode_udp(&buf[..n]) {
                                dispatch_packet(&packet, &handler);
                            }
                        }
                        Err(ref e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue
                        }
                        Err(e) => {
                            log::warn!(target: "osc::bus", "listener {thread_name} recv error: {e}");
                            continue;
                        }
                    }
                }
            })
            .expect("failed to spawn OSC listener thread");

        Ok(ListenerHandle {
            shutdown,
            join: Some(join),
        })
    }
}

fn dispatch_packet(packet: &rosc::OscPacket, handler: &impl Fn(BusMessage)) {
    match packet {
        rosc::OscPacket::Message(m) => {
            if let Some(decoded) = BusMessage::decode(m) {
                handler(decoded);
            }
        }
        rosc::OscPacket::Bundle(b) => {
            for inner in &b.content {
                dispatch_packet(inner, handler);
            }
        }
    }
}

/// Handle to a running listener thread. Dropping it (or calling `stop`)
/// signals shutdown and joins the thread.
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ListenerHandle {
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}
