//! Coalesces bursts of controller-bound OSC messages into bundles, flushed
//! no more often than once per `send_interval`.
//!
//! The original Python implementation polled a private `_contents` list on
//! the bundle builder to decide whether anything was pending; here the
//! pending count is simply `pending.len()`, owned by this loop (see the
//! "throttler internals" design note in the crate's requirements doc).

use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, error};

use crate::osc_codec::{encode_bundle, OutMsg};

/// The enqueue side of the throttle: cheap, non-blocking, and lossless.
#[derive(Clone)]
pub struct OutboundThrottler {
    tx: Sender<OutMsg>,
}

impl OutboundThrottler {
    /// Creates a throttler and returns it along with the receiving end that
    /// [`run_throttler_loop`] should be driven with on a dedicated thread.
    pub fn new() -> (OutboundThrottler, Receiver<OutMsg>) {
        let (tx, rx) = unbounded();
        (OutboundThrottler { tx }, rx)
    }

    /// Queues `msg` for the next bundle flush. Never blocks; an unbounded
    /// channel only fails to send once every receiver is gone (shutdown).
    pub fn enqueue(&self, msg: OutMsg) {
        let _ = self.tx.send(msg);
    }
}

/// Drains `rx`, accumulating an OSC bundle, flushing it no sooner than
/// `send_interval` after the previous flush. Runs until `rx` disconnects,
/// flushing whatever is still pending before returning.
pub fn run_throttler_loop(rx: Receiver<OutMsg>, send_interval: Duration, socket: &UdpSocket, remote_addr: &str) {
    let mut pending: Vec<OutMsg> = Vec::new();
    let mut last_send = Instant::now()
        .checked_sub(send_interval)
        .unwrap_or_else(Instant::now);

    loop {
        match rx.try_recv() {
            Ok(msg) => pending.push(msg),
            Err(TryRecvError::Empty) => thread::sleep(Duration::from_millis(5)),
            Err(TryRecvError::Disconnected) => {
                if !pending.is_empty() {
                    flush(&mut pending, socket, remote_addr);
                }
                debug!("throttler loop exiting, queue disconnected");
                return;
            }
        }

        if pending.is_empty() {
            continue;
        }

        if last_send.elapsed() >= send_interval {
            flush(&mut pending, socket, remote_addr);
            last_send = Instant::now();
        }
    }
}

fn flush(pending: &mut Vec<OutMsg>, socket: &UdpSocket, remote_addr: &str) {
    let bundle = encode_bundle(std::mem::take(pending));
    if let Err(e) = socket.send_to(&bundle, remote_addr) {
        error!("failed to send osc bundle to {}: {}", remote_addr, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc_codec::decode_packet;
    use rosc::OscPacket;
    use std::sync::mpsc;

    fn spawn_loopback_receiver() -> (UdpSocket, String) {
        let recv_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = recv_socket.local_addr().unwrap().to_string();
        (recv_socket, addr)
    }

    #[test]
    fn coalesces_rapid_enqueues_into_one_bundle() {
        let (recv_socket, addr) = spawn_loopback_receiver();
        recv_socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();

        let (throttler, rx) = OutboundThrottler::new();
        let send_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let send_interval = Duration::from_millis(10);

        let (done_tx, done_rx) = mpsc::channel();
        let addr_clone = addr.clone();
        let handle = thread::spawn(move || {
            run_throttler_loop(rx, send_interval, &send_socket, &addr_clone);
            let _ = done_tx.send(());
        });

        throttler.enqueue(OutMsg::float("/fx/param/1/val", 0.1));
        throttler.enqueue(OutMsg::float("/fx/param/2/val", 0.2));
        throttler.enqueue(OutMsg::float("/fx/param/3/val", 0.3));

        let mut buf = [0u8; 4096];
        let (len, _) = recv_socket.recv_from(&mut buf).unwrap();
        let packet = decode_packet(&buf[..len]).unwrap();
        match packet {
            OscPacket::Bundle(b) => assert_eq!(b.content.len(), 3),
            OscPacket::Message(_) => panic!("expected the three rapid enqueues to coalesce"),
        }

        drop(throttler);
        handle.join().unwrap();
        done_rx.recv_timeout(Duration::from_millis(500)).unwrap();
    }

    #[test]
    fn flushes_pending_bundle_on_shutdown() {
        let (recv_socket, addr) = spawn_loopback_receiver();
        recv_socket
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();

        let (throttler, rx) = OutboundThrottler::new();
        let send_socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        // A long interval so the message would never flush on its own
        // schedule; only the shutdown-time drain should deliver it.
        let send_interval = Duration::from_secs(60);

        throttler.enqueue(OutMsg::string("/fx/name", "Delay"));
        drop(throttler);

        run_throttler_loop(rx, send_interval, &send_socket, &addr);

        let mut buf = [0u8; 4096];
        let (len, _) = recv_socket.recv_from(&mut buf).unwrap();
        let packet = decode_packet(&buf[..len]).unwrap();
        match packet {
            OscPacket::Bundle(b) => assert_eq!(b.content.len(), 1),
            OscPacket::Message(_) => panic!("expected a bundle"),
        }
    }
}
