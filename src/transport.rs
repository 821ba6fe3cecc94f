//! Raw socket plumbing: the one-shot sender and the receive loop.

use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::args::{ListenConfig, SenderConfig};
use crate::classify::classify;
use crate::error::TransportError;
use crate::icmp::{self, MAX_SEND_SIZE, PAIRING_ID};
use crate::ipv4::{self, build_ipv4};

/// Largest IPv4 datagram; also the size of the receive buffer.
pub const RECV_BUF_TARGET: usize = 65_535;
pub const RECV_BUF_MIN: usize = 1024;
const RECV_BUF_STEP: usize = 1024;

/// Sequence number of the single echo request the sender emits.
pub const ECHO_SEQUENCE: u16 = 0;

/// Warns when raw sockets are unlikely to be available.
#[cfg(unix)]
pub fn warn_if_unprivileged() {
    // Safety: geteuid has no preconditions and cannot fail.
    let uid = unsafe { libc::geteuid() };
    if uid != 0 {
        warn!("not running as root (uid {}); raw sockets need CAP_NET_RAW", uid);
    }
}

#[cfg(not(unix))]
pub fn warn_if_unprivileged() {}

fn open_raw_icmp() -> Result<Socket> {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .context("socket() failed to get socket descriptor")
}

/// Tries `target`, then smaller sizes in `step` decrements, settling for
/// anything down to `min`.
pub fn negotiate_buffer<F>(
    target: usize,
    min: usize,
    step: usize,
    mut set: F,
) -> std::result::Result<usize, TransportError>
where
    F: FnMut(usize) -> io::Result<()>,
{
    let mut size = target;
    loop {
        match set(size) {
            Ok(()) => break,
            Err(e) => {
                debug!("buffer size {} refused: {}", size, e);
                if size <= min {
                    return Err(TransportError::NoUsableBuffer { min });
                }
                size = size.saturating_sub(step).max(min);
            }
        }
    }

    if size < target {
        warn!(
            "Could only allocate a receive buffer of {} bytes (default {})",
            size, target
        );
    }
    Ok(size)
}

/// Prints every ICMP datagram delivered to the host until `running` is
/// cleared. Without a poll interval the receive blocks indefinitely and only
/// process termination ends the loop.
pub fn listen(config: &ListenConfig, running: &AtomicBool) -> Result<()> {
    let sock = open_raw_icmp()?;

    let size = negotiate_buffer(RECV_BUF_TARGET, RECV_BUF_MIN, RECV_BUF_STEP, |n| {
        sock.set_recv_buffer_size(n)
    })?;
    debug!(
        "receive buffer: asked {} bytes, kernel reports {:?}",
        size,
        sock.recv_buffer_size().ok()
    );

    sock.set_read_timeout(config.poll_interval)
        .context("Cannot set the receive timeout")?;

    let mut buf = [MaybeUninit::<u8>::uninit(); RECV_BUF_TARGET];
    info!("listening for ICMP datagrams");

    let handled = receive_loop(
        running,
        &mut buf,
        |b| sock.recv_from(b).map(|(n, from)| (n, from.as_socket_ipv4())),
        report,
    );

    info!("listener stopped after {} datagrams", handled);
    Ok(())
}

/// Calls `recv` until `running` is cleared and hands every datagram to
/// `handle`. Interrupted calls and receive timeouts re-check the flag; any
/// other receive error is logged and the loop carries on. Returns the
/// number of datagrams handled.
pub fn receive_loop<R, H>(
    running: &AtomicBool,
    buf: &mut [MaybeUninit<u8>],
    mut recv: R,
    mut handle: H,
) -> usize
where
    R: FnMut(&mut [MaybeUninit<u8>]) -> io::Result<(usize, Option<SocketAddrV4>)>,
    H: FnMut(&[u8], Option<SocketAddrV4>),
{
    let mut handled = 0;
    while running.load(Ordering::SeqCst) {
        let (n, from) = match recv(&mut *buf) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                continue;
            }
            Err(e) => {
                error!("recvfrom: {}", e);
                continue;
            }
        };

        handle(initialised(buf, n), from);
        handled += 1;
    }
    handled
}

fn initialised(buf: &[MaybeUninit<u8>], n: usize) -> &[u8] {
    let n = n.min(buf.len());
    // Safety: recv_from wrote the first `n` bytes of `buf`.
    unsafe { std::slice::from_raw_parts(buf.as_ptr().cast::<u8>(), n) }
}

fn report(packet: &[u8], from: Option<SocketAddrV4>) {
    match from {
        Some(addr) => println!("Ip : {}", addr.ip()),
        None => warn!("sender address is not IPv4"),
    }

    match classify(packet) {
        Ok(descriptor) => {
            for warning in &descriptor.warnings {
                warn!("{}", warning);
            }
            println!("{}", descriptor);
        }
        Err(e) => warn!("dropping {} byte packet: {}", packet.len(), e),
    }
}

/// Resolves `host` to its first IPv4 address.
pub fn resolve(host: &str) -> Result<Ipv4Addr> {
    let addrs: Vec<Ipv4Addr> = (host, 0)
        .to_socket_addrs()
        .with_context(|| format!("getaddrinfo could not resolve {}", host))?
        .filter_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .collect();

    let first = *addrs
        .first()
        .with_context(|| format!("no IPv4 address for {}", host))?;
    if addrs.len() > 1 {
        for addr in &addrs {
            warn!("getaddrinfo multiple results for {} : {}", host, addr);
        }
    }
    debug!("Ip : {}", first);
    Ok(first)
}

/// Echo request wrapped in its IPv4 header, ready for a header-included
/// raw socket.
pub fn build_packet(config: &SenderConfig, dst: Ipv4Addr) -> Vec<u8> {
    let echo = icmp::build_echo(PAIRING_ID, ECHO_SEQUENCE, &config.message);
    build_ipv4(ipv4::PROTO_ICMP, &echo, config.source, dst)
}

/// Best effort: a failure is logged and the default route is used.
#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_interface(sock: &Socket, iface: &str) {
    match sock.bind_device(Some(iface.as_bytes())) {
        Ok(()) => debug!("Socket bound to interface {}", iface),
        Err(e) => warn!("failed to bind to interface {}: {}", iface, e),
    }
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_interface(_sock: &Socket, iface: &str) {
    warn!("binding to interface {} is not supported on this platform", iface);
}

fn ensure_send_buffer(sock: &Socket, size: usize) -> Result<()> {
    let current = sock
        .send_buffer_size()
        .context("getsockopt, unable to get the max send size")?;
    if current < size {
        sock.set_send_buffer_size(size)
            .context("setsockopt, unable to set the max send size")?;
    }
    Ok(())
}

fn transmit(sock: &Socket, packet: Vec<u8>, dst: Ipv4Addr) -> Result<()> {
    let whereto = SockAddr::from(SocketAddrV4::new(dst, 0));
    let sent = sock.send_to(&packet, &whereto).context("sendto() failed")?;
    info!("sent {} of {} bytes to {}", sent, packet.len(), dst);
    Ok(())
}

/// Builds one echo request and sends it once. The socket is closed on
/// return.
pub fn send(config: &SenderConfig) -> Result<()> {
    let dst = resolve(&config.destination)?;
    let packet = build_packet(config, dst);

    let sock = open_raw_icmp()?;
    sock.set_header_included_v4(true)
        .context("setsockopt() failed to set IP_HDRINCL")?;

    if let Some(iface) = &config.interface {
        bind_interface(&sock, iface);
    }
    ensure_send_buffer(&sock, MAX_SEND_SIZE)?;

    transmit(&sock, packet, dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Message;
    use crate::icmp::MAX_PAYLOAD_LEN;
    use std::collections::VecDeque;

    const PEER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(192, 0, 2, 7), 0);

    /// Replays `script` one entry per receive call. Once it runs dry the
    /// running flag is cleared and the call times out.
    fn replay<'a>(
        running: &'a AtomicBool,
        mut script: VecDeque<Result<&'static [u8], io::ErrorKind>>,
        calls: &'a mut usize,
    ) -> impl FnMut(&mut [MaybeUninit<u8>]) -> io::Result<(usize, Option<SocketAddrV4>)> + 'a {
        move |buf| {
            *calls += 1;
            match script.pop_front() {
                Some(Ok(bytes)) => {
                    for (slot, b) in buf.iter_mut().zip(bytes) {
                        *slot = MaybeUninit::new(*b);
                    }
                    Ok((bytes.len(), Some(PEER)))
                }
                Some(Err(kind)) => Err(io::Error::from(kind)),
                None => {
                    running.store(false, Ordering::SeqCst);
                    Err(io::Error::from(io::ErrorKind::WouldBlock))
                }
            }
        }
    }

    fn refuse_above(
        limit: usize,
        tried: &mut Vec<usize>,
    ) -> impl FnMut(usize) -> io::Result<()> + '_ {
        move |n| {
            tried.push(n);
            if n > limit {
                Err(io::Error::from(io::ErrorKind::InvalidInput))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn buffer_target_accepted_first_try() {
        let mut tried = Vec::new();
        let size = negotiate_buffer(65_535, 1024, 1024, refuse_above(usize::MAX, &mut tried));
        assert_eq!(size, Ok(65_535));
        assert_eq!(tried, vec![65_535]);
    }

    #[test]
    fn buffer_steps_down_until_accepted() {
        let mut tried = Vec::new();
        let size = negotiate_buffer(65_535, 1024, 1024, refuse_above(63_000, &mut tried));
        assert_eq!(size, Ok(62_463));
        assert_eq!(tried, vec![65_535, 64_511, 63_487, 62_463]);
    }

    #[test]
    fn buffer_minimum_is_tried_last() {
        let mut tried = Vec::new();
        let size = negotiate_buffer(4000, 1024, 1024, refuse_above(1024, &mut tried));
        assert_eq!(size, Ok(1024));
        assert_eq!(tried, vec![4000, 2976, 1952, 1024]);
    }

    #[test]
    fn buffer_fails_when_nothing_fits() {
        let mut tried = Vec::new();
        let size = negotiate_buffer(3000, 1024, 1024, refuse_above(0, &mut tried));
        assert_eq!(size, Err(TransportError::NoUsableBuffer { min: 1024 }));
        assert_eq!(tried.last(), Some(&1024));
    }

    #[test]
    fn resolves_ipv4_literals() {
        assert_eq!(resolve("127.0.0.1").unwrap(), Ipv4Addr::LOCALHOST);
        assert_eq!(resolve("192.0.2.10").unwrap(), Ipv4Addr::new(192, 0, 2, 10));
    }

    #[test]
    fn ipv6_only_destination_is_fatal() {
        assert!(resolve("::1").is_err());
    }

    #[test]
    fn packet_carries_pairing_id_and_source() {
        let config = SenderConfig {
            destination: "192.0.2.10".into(),
            interface: None,
            source: Ipv4Addr::new(192, 0, 2, 1),
            message: b"1337.42".to_vec(),
        };
        let packet = build_packet(&config, Ipv4Addr::new(192, 0, 2, 10));
        let desc = classify(&packet).unwrap();
        assert!(desc.warnings.is_empty());
        assert_eq!(desc.ip.source, Ipv4Addr::new(192, 0, 2, 1));
        assert_eq!(desc.ip.destination, Ipv4Addr::new(192, 0, 2, 10));
        match desc.message {
            Message::EchoRequest(echo) => {
                assert_eq!(echo.ident, PAIRING_ID);
                assert_eq!(echo.seq, ECHO_SEQUENCE);
                assert_eq!(echo.payload, b"1337.42");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn oversized_message_fills_max_send_size() {
        let config = SenderConfig {
            destination: "192.0.2.10".into(),
            interface: None,
            source: Ipv4Addr::UNSPECIFIED,
            message: vec![b'a'; 2000],
        };
        let packet = build_packet(&config, Ipv4Addr::new(192, 0, 2, 10));
        assert_eq!(packet.len(), MAX_SEND_SIZE);
        match classify(&packet).unwrap().message {
            Message::EchoRequest(echo) => assert_eq!(echo.payload.len(), MAX_PAYLOAD_LEN),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn receive_survives_interrupts_timeouts_and_errors() {
        let running = AtomicBool::new(true);
        let script = VecDeque::from(vec![
            Err(io::ErrorKind::Interrupted),
            Ok(&b"first"[..]),
            Err(io::ErrorKind::WouldBlock),
            Err(io::ErrorKind::TimedOut),
            Err(io::ErrorKind::ConnectionRefused),
            Ok(&b"second"[..]),
        ]);
        let mut calls = 0;
        let mut seen = Vec::new();
        let mut buf = [MaybeUninit::<u8>::uninit(); 64];

        let handled = receive_loop(
            &running,
            &mut buf,
            replay(&running, script, &mut calls),
            |packet, from| seen.push((packet.to_vec(), from)),
        );

        assert_eq!(handled, 2);
        assert_eq!(
            seen,
            vec![(b"first".to_vec(), Some(PEER)), (b"second".to_vec(), Some(PEER))]
        );
        assert_eq!(calls, 7);
        assert!(!running.load(Ordering::SeqCst));
    }

    #[test]
    fn receive_does_not_start_when_stopped() {
        let running = AtomicBool::new(false);
        let mut calls = 0;
        let mut buf = [MaybeUninit::<u8>::uninit(); 16];

        let handled = receive_loop(
            &running,
            &mut buf,
            replay(&running, VecDeque::from(vec![Ok(&b"x"[..])]), &mut calls),
            |_, _| panic!("nothing should be handled"),
        );

        assert_eq!(handled, 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn receive_stops_once_handler_clears_flag() {
        let running = AtomicBool::new(true);
        let script = VecDeque::from(vec![Ok(&b"one"[..]), Ok(&b"two"[..])]);
        let mut calls = 0;
        let mut buf = [MaybeUninit::<u8>::uninit(); 16];

        let handled = receive_loop(
            &running,
            &mut buf,
            replay(&running, script, &mut calls),
            |packet, _| {
                assert_eq!(packet, b"one");
                running.store(false, Ordering::SeqCst);
            },
        );

        assert_eq!(handled, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn initialised_clamps_to_buffer() {
        let buf = [MaybeUninit::new(7u8); 4];
        assert_eq!(initialised(&buf, 2), &[7, 7]);
        assert_eq!(initialised(&buf, 10).len(), 4);
    }
}
