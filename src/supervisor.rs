//! Wires the config, FX map store, OSC sockets, MIDI ports, throttler and
//! [`crate::remap_core::RemapCore`] together into a running proxy, and owns
//! the startup/shutdown sequence.
//!
//! Network I/O rides on the tokio runtime, mirroring the teacher's
//! `run_server_application`/`run_server_processing_loop` split: async tasks
//! do the listening, a dedicated OS thread drains the merged event channel
//! and owns the single mutable [`crate::remap_core::RemapCore`], and a
//! `crossbeam_channel::Receiver<()>` is the shutdown signal passed down from
//! `main`, just like the teacher's `shutdown_rx`.

use std::net::UdpSocket as StdUdpSocket;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle as TokioJoinHandle;

use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use crate::fx_map::FxMapStore;
use crate::midi_io::{MidiIoAdapter, MidiOutSender};
use crate::osc_codec::{decode_packet, encode_message, flatten_packet, OutMsg};
use crate::remap_core::{Effect, InboundEvent, RemapCore};
use crate::throttler::{run_throttler_loop, OutboundThrottler};

#[derive(Clone, Copy)]
enum EventSource {
    Daw,
    Ctl,
}

/// A running proxy. Call [`Self::run_until_shutdown`] to block until the
/// shutdown signal fires; everything is torn down in order on the way out.
pub struct ProxySupervisor {
    daw_listener: TokioJoinHandle<()>,
    ctl_listener: TokioJoinHandle<()>,
    worker: Option<JoinHandle<()>>,
    throttler_thread: Option<JoinHandle<()>>,
    event_tx: Sender<InboundEvent>,
    /// Owns the live MIDI input connection (and therefore the `InboundEvent`
    /// sender its callback captured). Kept here, *not* moved into the worker
    /// thread, and dropped before `event_tx`/`worker` in [`Self::shutdown`] —
    /// otherwise the worker would transitively hold a sender to its own
    /// event channel and `event_rx.iter()` would never see a disconnect.
    midi_io: Option<MidiIoAdapter>,
}

impl ProxySupervisor {
    /// Opens MIDI ports, binds OSC sockets, runs the initial device-reset
    /// sequence, then starts the listener tasks and the worker thread.
    pub async fn start(config: Config) -> ProxyResult<ProxySupervisor> {
        let fx_maps_path = config.fx_maps_path();
        let store = FxMapStore::load(&fx_maps_path)?;
        let mut core = RemapCore::new(&config, store);

        let daw_send_socket = StdUdpSocket::bind("0.0.0.0:0")
            .map_err(|source| ProxyError::ConfigRead { path: "daw send socket".into(), source })?;
        let daw_remote_addr = config.daw_osc.remote_addr();

        let (throttler, throttler_rx) = OutboundThrottler::new();
        let ctl_send_socket = StdUdpSocket::bind("0.0.0.0:0")
            .map_err(|source| ProxyError::ConfigRead { path: "controller send socket".into(), source })?;
        let ctl_remote_addr = config.controller_osc.remote_addr();
        let send_interval = Duration::from_millis(config.send_interval_ms);
        let throttler_thread = thread::Builder::new()
            .name("osc-throttler".into())
            .spawn(move || run_throttler_loop(throttler_rx, send_interval, &ctl_send_socket, &ctl_remote_addr))
            .expect("failed to spawn osc-throttler thread");

        let (event_tx, event_rx) = unbounded::<InboundEvent>();

        let midi_tx = event_tx.clone();
        let midi_io = MidiIoAdapter::open(
            &config.controller_midi.input_port_name,
            &config.controller_midi.output_port_name,
            move |cc| {
                if midi_tx.send(InboundEvent::CtlMidi(cc)).is_err() {
                    warn!("worker thread gone, dropping inbound midi cc");
                }
            },
        )?;

        // A handle to the outbound MIDI queue alone, with none of the input
        // connection's captured state — this is what the worker thread
        // gets, so it never holds a sender to its own inbound event channel.
        let midi_out = midi_io.output_sender();

        // Startup reset sequence: blank the controller's display, zero its
        // midi feedback, then re-request whatever FX the DAW currently has
        // focused so the proxy starts in sync rather than stale.
        for effect in core.init_osc_device() {
            dispatch_effect(effect, &daw_send_socket, &daw_remote_addr, &throttler, &midi_out);
        }
        for effect in core.init_midi_device() {
            dispatch_effect(effect, &daw_send_socket, &daw_remote_addr, &throttler, &midi_out);
        }
        for msg in [OutMsg::int("/fx/select/prev", 1), OutMsg::int("/fx/select/next", 1)] {
            dispatch_effect(Effect::ToDaw(msg), &daw_send_socket, &daw_remote_addr, &throttler, &midi_out);
        }

        let worker = thread::Builder::new()
            .name("remap-core".into())
            .spawn(move || run_worker_loop(core, event_rx, daw_send_socket, daw_remote_addr, throttler, midi_out))
            .expect("failed to spawn remap-core worker thread");

        let daw_listener = spawn_osc_listener("daw", config.daw_osc.listen_addr(), event_tx.clone(), EventSource::Daw).await?;
        let ctl_listener = spawn_osc_listener(
            "controller",
            config.controller_osc.listen_addr(),
            event_tx.clone(),
            EventSource::Ctl,
        )
        .await?;

        info!(
            "proxy started: daw<->{}, controller<->{}",
            config.daw_osc.remote_addr(),
            config.controller_osc.remote_addr()
        );

        Ok(ProxySupervisor {
            daw_listener,
            ctl_listener,
            worker: Some(worker),
            throttler_thread: Some(throttler_thread),
            event_tx,
            midi_io: Some(midi_io),
        })
    }

    /// Blocks until `shutdown_rx` fires (or its senders are all dropped),
    /// then tears everything down: abort the listener tasks, drop the event
    /// sender so the worker thread's receive loop ends, and join both the
    /// worker and the throttler thread so any pending output is flushed
    /// before this returns.
    pub async fn run_until_shutdown(self, shutdown_rx: Receiver<()>) -> ProxyResult<()> {
        let _ = tokio::task::spawn_blocking(move || shutdown_rx.recv()).await;
        self.shutdown();
        Ok(())
    }

    fn shutdown(mut self) {
        info!("shutting down proxy");
        self.daw_listener.abort();
        self.ctl_listener.abort();
        // Drop the midi input connection first: its callback captured a
        // clone of `event_tx`, so that sender must go away before our own
        // `event_tx` is dropped, or `event_rx.iter()` in the worker loop
        // would never see a disconnect and `join()` below would hang.
        drop(self.midi_io.take());
        drop(self.event_tx);
        if let Some(h) = self.worker.take() {
            let _ = h.join();
        }
        if let Some(h) = self.throttler_thread.take() {
            let _ = h.join();
        }
    }
}

fn dispatch_effect(
    effect: Effect,
    daw_socket: &StdUdpSocket,
    daw_remote_addr: &str,
    throttler: &OutboundThrottler,
    midi_out: &MidiOutSender,
) {
    match effect {
        Effect::ToDaw(msg) => {
            if let Err(e) = daw_socket.send_to(&encode_message(msg), daw_remote_addr) {
                warn!("failed to send osc to daw at {}: {}", daw_remote_addr, e);
            }
        }
        Effect::ToCtlOsc(msg) => throttler.enqueue(msg),
        Effect::ToCtlMidiCc { channel, cc, value } => midi_out.send_cc(channel, cc, value),
    }
}

/// The single-writer worker: every mutation of [`RemapCore`] happens here,
/// on one thread, in the order events arrive on the merged channel. Takes
/// only a [`MidiOutSender`], not the full [`MidiIoAdapter`] — the adapter
/// (and the input connection's captured event sender) stays with the
/// supervisor so this loop's `event_rx.iter()` can actually observe a
/// disconnect on shutdown.
fn run_worker_loop(
    mut core: RemapCore,
    event_rx: Receiver<InboundEvent>,
    daw_socket: StdUdpSocket,
    daw_remote_addr: String,
    throttler: OutboundThrottler,
    midi_out: MidiOutSender,
) {
    for event in event_rx.iter() {
        for effect in core.handle_event(event) {
            dispatch_effect(effect, &daw_socket, &daw_remote_addr, &throttler, &midi_out);
        }
    }
    debug!("remap-core worker exiting, event queue disconnected");
}

async fn spawn_osc_listener(
    label: &'static str,
    addr: String,
    event_tx: Sender<InboundEvent>,
    source: EventSource,
) -> ProxyResult<TokioJoinHandle<()>> {
    let socket = UdpSocket::bind(&addr)
        .await
        .map_err(|source_err| ProxyError::ConfigRead { path: format!("{label} osc listener {addr}"), source: source_err })?;
    info!("{} osc listener bound to {}", label, addr);

    let handle = tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            let len = match socket.recv_from(&mut buf).await {
                Ok((len, _from)) => len,
                Err(e) => {
                    warn!("{} osc listener recv error: {}", label, e);
                    continue;
                }
            };
            let packet = match decode_packet(&buf[..len]) {
                Ok(p) => p,
                Err(e) => {
                    warn!("{} osc listener dropped a malformed packet: {:?}", label, e);
                    continue;
                }
            };
            for msg in flatten_packet(packet) {
                let event = match source {
                    EventSource::Daw => InboundEvent::DawOsc { addr: msg.addr, args: msg.args },
                    EventSource::Ctl => InboundEvent::CtlOsc { addr: msg.addr, args: msg.args },
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
        }
    });
    Ok(handle)
}
