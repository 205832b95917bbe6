//! OSC 1.0 message/bundle encode+decode and fixed-prefix address parsing.
//!
//! Dispatch is deliberately *not* done through a library router matching many
//! specific routes (see the "duplicate listener on `/*`" design note): every
//! inbound packet is decoded once and handed to the core, which matches on
//! the address prefix itself.

use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

/// The "immediate" OSC timetag: all bits zero except the least significant,
/// per the OSC 1.0 spec. rosc has no built-in constant for this.
const IMMEDIATE: OscTime = OscTime {
    seconds: 0,
    fractional: 1,
};

/// A single outbound OSC message, queued either directly to a client socket
/// (DAW-bound) or through the [`crate::throttler::OutboundThrottler`]
/// (controller-bound).
#[derive(Debug, Clone, PartialEq)]
pub struct OutMsg {
    pub addr: String,
    pub args: Vec<OscType>,
}

impl OutMsg {
    pub fn new(addr: impl Into<String>, args: Vec<OscType>) -> Self {
        OutMsg {
            addr: addr.into(),
            args,
        }
    }

    pub fn float(addr: impl Into<String>, value: f32) -> Self {
        OutMsg::new(addr, vec![OscType::Float(value)])
    }

    pub fn string(addr: impl Into<String>, value: impl Into<String>) -> Self {
        OutMsg::new(addr, vec![OscType::String(value.into())])
    }

    pub fn int(addr: impl Into<String>, value: i32) -> Self {
        OutMsg::new(addr, vec![OscType::Int(value)])
    }

    pub fn bang(addr: impl Into<String>) -> Self {
        OutMsg::new(addr, vec![OscType::Int(1)])
    }

    pub fn into_message(self) -> OscMessage {
        OscMessage {
            addr: self.addr,
            args: self.args,
        }
    }
}

/// Encodes a single message for direct (unbundled) transmission.
pub fn encode_message(msg: OutMsg) -> Vec<u8> {
    // A lone message is valid UDP OSC content; no bundle wrapper needed.
    rosc::encoder::encode(&OscPacket::Message(msg.into_message()))
        .expect("encoding a well-formed OscMessage cannot fail")
}

/// Encodes a batch of messages as one immediate-timetag bundle.
pub fn encode_bundle(msgs: Vec<OutMsg>) -> Vec<u8> {
    let content = msgs
        .into_iter()
        .map(|m| OscPacket::Message(m.into_message()))
        .collect();
    let bundle = OscBundle {
        timetag: IMMEDIATE,
        content,
    };
    rosc::encoder::encode(&OscPacket::Bundle(bundle))
        .expect("encoding a well-formed OscBundle cannot fail")
}

/// Decodes a UDP datagram into an [`OscPacket`]. Malformed input is a
/// protocol error: the caller logs a warning and drops the packet.
pub fn decode_packet(buf: &[u8]) -> Result<OscPacket, rosc::OscError> {
    rosc::decoder::decode_udp(buf).map(|(_, packet)| packet)
}

/// Flattens a decoded packet into its constituent messages, recursing into
/// nested bundles. A bare message yields a single-element vec.
pub fn flatten_packet(packet: OscPacket) -> Vec<OscMessage> {
    let mut out = Vec::new();
    flatten_into(packet, &mut out);
    out
}

fn flatten_into(packet: OscPacket, out: &mut Vec<OscMessage>) {
    match packet {
        OscPacket::Message(m) => out.push(m),
        OscPacket::Bundle(b) => {
            for content in b.content {
                flatten_into(content, out);
            }
        }
    }
}

/// Which trailing attribute of a `/fx/param/<n>/<attr>` address this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamAttr {
    Val,
    Name,
    Str,
}

/// Parses `/fx/param/<n>/<attr>` into `(n, attr)`. Returns `None` for any
/// other shape, including addresses with extra trailing segments or a
/// non-positive parameter number — source and target slots are both `>= 1`
/// per the data model's invariants, so `/fx/param/0/...` is malformed, not a
/// slot zero.
pub fn parse_param_addr(addr: &str) -> Option<(u32, ParamAttr)> {
    let rest = addr.strip_prefix("/fx/param/")?;
    let mut parts = rest.split('/');
    let num_str = parts.next()?;
    let attr_str = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    let num: u32 = num_str.parse().ok()?;
    if num < 1 {
        return None;
    }
    let attr = match attr_str {
        "val" => ParamAttr::Val,
        "name" => ParamAttr::Name,
        "str" => ParamAttr::Str,
        _ => return None,
    };
    Some((num, attr))
}

pub fn param_addr(param: u32, attr: ParamAttr) -> String {
    let attr = match attr {
        ParamAttr::Val => "val",
        ParamAttr::Name => "name",
        ParamAttr::Str => "str",
    };
    format!("/fx/param/{param}/{attr}")
}

/// Reads the first argument of a message as a float, per OSC 1.0's loose
/// numeric typing (DAWs may send Int where a Float is expected).
pub fn arg_as_f32(args: &[OscType]) -> Option<f32> {
    match args.first()? {
        OscType::Float(v) => Some(*v),
        OscType::Double(v) => Some(*v as f32),
        OscType::Int(v) => Some(*v as f32),
        _ => None,
    }
}

pub fn arg_as_string(args: &[OscType]) -> Option<String> {
    match args.first()? {
        OscType::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Reads the first argument as a bool the way the original Python `bool(x)`
/// coercion did: zero/false-ish values are false, everything else is true.
pub fn arg_as_bool(args: &[OscType]) -> Option<bool> {
    match args.first()? {
        OscType::Bool(b) => Some(*b),
        OscType::Int(v) => Some(*v != 0),
        OscType::Float(v) => Some(*v != 0.0),
        _ => None,
    }
}
