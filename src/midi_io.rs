//! Opens the named MIDI input/output ports and bridges them to the rest of
//! the proxy via plain channels, so the rtmidi/midir callback thread (which
//! must never block) only ever does a non-blocking send.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use crate::error::{ProxyError, ProxyResult};

const CLIENT_NAME: &str = "oscremap-proxy";

/// A decoded three-byte Control Change message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CcMessage {
    pub status: u8,
    pub cc: u8,
    pub value: u8,
}

/// A lightweight, cloneable handle for queuing outbound MIDI CC messages.
///
/// Deliberately holds only the output channel's `Sender`, not the input
/// connection: this is the handle to give to the worker thread, so that
/// thread never transitively keeps the input callback's `InboundEvent`
/// sender alive (the input connection lives in [`MidiIoAdapter`] instead,
/// owned by the supervisor, and must be dropped before the worker's event
/// channel is torn down — see [`crate::supervisor::ProxySupervisor`]).
#[derive(Clone)]
pub struct MidiOutSender {
    tx: Sender<[u8; 3]>,
}

impl MidiOutSender {
    /// Queues a three-byte CC message for the output thread. Never blocks.
    pub fn send_cc(&self, channel: u8, cc: u8, value: u8) {
        let status = 0xB0 | (channel & 0x0F);
        if self.tx.send([status, cc, value]).is_err() {
            warn!("midi output thread is gone, dropping cc {cc}={value}");
        }
    }
}

/// Holds the live MIDI input connection (dropping it closes the port and
/// drops the callback's captured `InboundEvent` sender) and the sending half
/// of the outbound queue, plus the join handle of the dedicated
/// output-writer thread.
pub struct MidiIoAdapter {
    _input_conn: MidiInputConnection<()>,
    out_tx: Option<Sender<[u8; 3]>>,
    out_thread: Option<JoinHandle<()>>,
}

impl MidiIoAdapter {
    /// Opens `input_port_name` and `output_port_name` by exact match against
    /// the enumerated port list. `on_cc` is invoked on midir's callback
    /// thread for every inbound Control Change message and must not block.
    pub fn open(
        input_port_name: &str,
        output_port_name: &str,
        on_cc: impl Fn(CcMessage) + Send + 'static,
    ) -> ProxyResult<MidiIoAdapter> {
        let midi_in = MidiInput::new(CLIENT_NAME)
            .map_err(|e| ProxyError::Midi(format!("failed to init midi input: {e}")))?;
        let in_port = find_input_port(&midi_in, input_port_name)?;

        let midi_out = MidiOutput::new(CLIENT_NAME)
            .map_err(|e| ProxyError::Midi(format!("failed to init midi output: {e}")))?;
        let out_port = find_output_port(&midi_out, output_port_name)?;

        info!(
            "opening midi input '{}' and output '{}'",
            input_port_name, output_port_name
        );

        let input_conn = midi_in
            .connect(
                &in_port,
                &format!("{CLIENT_NAME}-in"),
                move |_timestamp_us, msg, _| {
                    if msg.len() < 3 {
                        return;
                    }
                    if msg[0] & 0xF0 != 0xB0 {
                        return; // only Control Change is handled, per scope
                    }
                    on_cc(CcMessage {
                        status: msg[0],
                        cc: msg[1],
                        value: msg[2],
                    });
                },
                (),
            )
            .map_err(|e| ProxyError::Midi(format!("failed to connect midi input: {e}")))?;

        let mut output_conn = midi_out
            .connect(&out_port, &format!("{CLIENT_NAME}-out"))
            .map_err(|e| ProxyError::Midi(format!("failed to connect midi output: {e}")))?;

        let (out_tx, out_rx): (Sender<[u8; 3]>, Receiver<[u8; 3]>) = unbounded();
        let out_thread = thread::Builder::new()
            .name("midi-out".into())
            .spawn(move || run_output_loop(out_rx, &mut output_conn))
            .expect("failed to spawn midi-out thread");

        Ok(MidiIoAdapter {
            _input_conn: input_conn,
            out_tx: Some(out_tx),
            out_thread: Some(out_thread),
        })
    }

    /// Queues a three-byte CC message for the output thread. Never blocks.
    pub fn send_cc(&self, channel: u8, cc: u8, value: u8) {
        let status = 0xB0 | (channel & 0x0F);
        if let Some(tx) = &self.out_tx {
            if tx.send([status, cc, value]).is_err() {
                warn!("midi output thread is gone, dropping cc {cc}={value}");
            }
        }
    }

    /// Returns a cloneable handle for sending outbound CC messages that does
    /// not carry the live input connection with it — safe to move into the
    /// worker thread (see [`MidiOutSender`]).
    pub fn output_sender(&self) -> MidiOutSender {
        MidiOutSender {
            tx: self.out_tx.clone().expect("out_tx is only taken by Drop"),
        }
    }
}

impl Drop for MidiIoAdapter {
    fn drop(&mut self) {
        // Drop the sending half first: `run_output_loop`'s `rx.iter()` only
        // ends once every `Sender` is gone, so joining while `out_tx` is
        // still a live field would deadlock.
        self.out_tx.take();
        if let Some(handle) = self.out_thread.take() {
            let _ = handle.join();
        }
    }
}

fn run_output_loop(rx: Receiver<[u8; 3]>, conn: &mut MidiOutputConnection) {
    for msg in rx.iter() {
        if let Err(e) = conn.send(&msg) {
            error!("failed to send midi message {:?}: {}", msg, e);
        } else {
            debug!("sent midi {:?}", msg);
        }
    }
    debug!("midi output loop exiting, queue disconnected");
}

fn find_input_port(io: &MidiInput, name: &str) -> ProxyResult<midir::MidiInputPort> {
    let ports = io.ports();
    let names: Vec<String> = ports.iter().filter_map(|p| io.port_name(p).ok()).collect();
    ports
        .into_iter()
        .find(|p| io.port_name(p).map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| ProxyError::UnknownMidiPort(name.to_string(), names))
}

fn find_output_port(io: &MidiOutput, name: &str) -> ProxyResult<midir::MidiOutputPort> {
    let ports = io.ports();
    let names: Vec<String> = ports.iter().filter_map(|p| io.port_name(p).ok()).collect();
    ports
        .into_iter()
        .find(|p| io.port_name(p).map(|n| n == name).unwrap_or(false))
        .ok_or_else(|| ProxyError::UnknownMidiPort(name.to_string(), names))
}
