//! The state machine at the heart of the proxy: current FX, the active
//! bijection, learn-mode, and the bypass/visible/follow flags, plus the
//! translation of inbound DAW-OSC, controller-OSC and controller-MIDI events
//! into outbound effects.
//!
//! Handlers are pure with respect to I/O: they mutate `self` and return a
//! `Vec<Effect>` describing what to send. The caller (the supervisor's
//! central worker loop) is the only thing that actually touches a socket or
//! MIDI connection, which makes this module testable without any of that.

use std::path::PathBuf;

use bimap::BiMap;
use log::{debug, info, warn};
use rosc::OscType;

use crate::config::Config;
use crate::fx_map::{FxMap, FxMapStore};
use crate::midi_io::CcMessage;
use crate::osc_codec::{arg_as_bool, arg_as_f32, arg_as_string, param_addr, OutMsg, ParamAttr};

/// Every parameter slot on the controller side gets a full set of display
/// resets, independent of how many parameters the current FX actually uses.
/// Matches the fixed `range(1, 17)` of the reference implementation.
const DISPLAY_PARAM_COUNT: u32 = 16;

/// One thing to send, produced by a handler and dispatched by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Sent directly (unbundled) to the DAW.
    ToDaw(OutMsg),
    /// Queued through the [`crate::throttler::OutboundThrottler`].
    ToCtlOsc(OutMsg),
    /// Queued to the controller's MIDI output.
    ToCtlMidiCc { channel: u8, cc: u8, value: u8 },
}

/// Merged inbound event, as enqueued by the three listener threads/tasks.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    DawOsc { addr: String, args: Vec<OscType> },
    CtlOsc { addr: String, args: Vec<OscType> },
    CtlMidi(CcMessage),
}

#[derive(Debug, Clone)]
pub struct RemapState {
    pub current_fx: String,
    pub learn_active: bool,
    pub learn_source: Option<u32>,
    pub learn_target: Option<u32>,
    pub bypass_fx: bool,
    pub fx_visible: bool,
    pub fx_follow: bool,
}

impl Default for RemapState {
    fn default() -> Self {
        RemapState {
            current_fx: String::new(),
            learn_active: false,
            learn_source: None,
            learn_target: None,
            bypass_fx: false,
            fx_visible: false,
            fx_follow: true,
        }
    }
}

pub struct RemapCore {
    state: RemapState,
    store: FxMapStore,
    fx_maps_path: PathBuf,
    cc_param_map: BiMap<u8, u32>,
    params: u32,
    cc_param_start: u8,
    param_channel: u8,
    cmd_channel: u8,
    cc_learn: u8,
    cc_toggle_ui: u8,
    cc_bypass_fx: u8,
    cc_prev_fx: u8,
    cc_next_fx: u8,
    cc_fx_follow: u8,
}

fn build_cc_param_map(cc_param_start: u8, params: u32) -> BiMap<u8, u32> {
    let mut map = BiMap::new();
    for i in 0..params {
        let cc = cc_param_start as u32 + i;
        if cc > u8::MAX as u32 {
            warn!("cc_param_start + params exceeds a midi cc number, truncating param map");
            break;
        }
        map.insert(cc as u8, i + 1);
    }
    map
}

impl RemapCore {
    pub fn new(config: &Config, store: FxMapStore) -> RemapCore {
        let midi = &config.controller_midi;
        RemapCore {
            state: RemapState::default(),
            store,
            fx_maps_path: config.fx_maps_path(),
            cc_param_map: build_cc_param_map(midi.cc_param_start, config.params),
            params: config.params,
            cc_param_start: midi.cc_param_start,
            param_channel: midi.param_channel,
            cmd_channel: midi.cmd_channel,
            cc_learn: midi.cc_learn,
            cc_toggle_ui: midi.cc_toggle_ui,
            cc_bypass_fx: midi.cc_bypass_fx,
            cc_prev_fx: midi.cc_prev_fx,
            cc_next_fx: midi.cc_next_fx,
            cc_fx_follow: midi.cc_fx_follow,
        }
    }

    pub fn state(&self) -> &RemapState {
        &self.state
    }

    fn active_map(&self) -> Option<&FxMap> {
        self.store.get(&self.state.current_fx)
    }

    fn active_map_mut(&mut self) -> &mut FxMap {
        self.store.get_or_create(&self.state.current_fx.clone())
    }

    fn cc_param_end(&self) -> u32 {
        self.cc_param_start as u32 + self.params
    }

    /// Dispatches one merged inbound event to its handler.
    pub fn handle_event(&mut self, event: InboundEvent) -> Vec<Effect> {
        match event {
            InboundEvent::DawOsc { addr, args } => self.handle_osc_from_daw(&addr, &args),
            InboundEvent::CtlOsc { addr, args } => self.handle_osc_from_ctl(&addr, &args),
            InboundEvent::CtlMidi(msg) => self.handle_midi_from_ctl(msg),
        }
    }

    // ---- 4.4.1 Inbound DAW OSC ----------------------------------------

    pub fn handle_osc_from_daw(&mut self, addr: &str, args: &[OscType]) -> Vec<Effect> {
        let mut effects = Vec::new();

        if addr == "/fx/name" {
            let Some(fx_name) = arg_as_string(args) else {
                warn!("/fx/name without a string argument, dropping");
                return effects;
            };
            info!("daw announced fx: {}", fx_name);
            self.set_fx(fx_name.clone());
            effects.push(Effect::ToCtlOsc(OutMsg::string("/fx/name", fx_name)));
            effects.extend(self.init_osc_device_params());
            effects.extend(self.init_midi_device_params());
            return effects;
        }

        if let Some((target, attr)) = crate::osc_codec::parse_param_addr(addr) {
            if attr == ParamAttr::Val && self.state.learn_active {
                self.set_learn_target(target, &mut effects);
            }

            let Some(source) = self.active_map().and_then(|m| m.inverse(target)) else {
                return effects; // map miss: normal steady-state drop
            };

            match attr {
                ParamAttr::Val => {
                    let Some(v) = arg_as_f32(args) else {
                        warn!("{} without a numeric argument, dropping", addr);
                        return effects;
                    };
                    effects.push(Effect::ToCtlOsc(OutMsg::float(param_addr(source, ParamAttr::Val), v)));
                    let midi_val = (v * 127.0).round().clamp(0.0, 127.0) as u8;
                    let cc = self.cc_param_start as u32 + source - 1;
                    if let Ok(cc) = u8::try_from(cc) {
                        effects.push(Effect::ToCtlMidiCc {
                            channel: self.param_channel,
                            cc,
                            value: midi_val,
                        });
                    }
                }
                ParamAttr::Name => {
                    if let Some(name) = arg_as_string(args) {
                        effects.push(Effect::ToCtlOsc(OutMsg::string(param_addr(source, ParamAttr::Name), name)));
                    }
                }
                ParamAttr::Str => {
                    if let Some(s) = arg_as_string(args) {
                        effects.push(Effect::ToCtlOsc(OutMsg::string(param_addr(source, ParamAttr::Str), s)));
                    }
                }
            }
            return effects;
        }

        if addr == "/fx/bypass" {
            if let Some(b) = arg_as_bool(args) {
                self.state.bypass_fx = b;
            }
            return effects;
        }

        if addr == "/fx/openui" {
            if let Some(b) = arg_as_bool(args) {
                self.state.fx_visible = b;
            }
            return effects;
        }

        debug!("ignoring unrecognized daw osc address: {}", addr);
        effects
    }

    // ---- 4.4.2 Inbound Controller OSC ----------------------------------

    pub fn handle_osc_from_ctl(&mut self, addr: &str, args: &[OscType]) -> Vec<Effect> {
        let mut effects = Vec::new();

        if let Some((source, ParamAttr::Val)) = crate::osc_codec::parse_param_addr(addr) {
            if self.state.learn_active {
                self.set_learn_source(source, &mut effects);
            }
            let Some(target) = self.active_map().and_then(|m| m.get(source)) else {
                return effects;
            };
            let Some(v) = arg_as_f32(args) else {
                warn!("{} without a numeric argument, dropping", addr);
                return effects;
            };
            effects.push(Effect::ToDaw(OutMsg::float(param_addr(target, ParamAttr::Val), v)));
            return effects;
        }

        if addr == "/fx/learn" {
            return self.toggle_learn();
        }

        if addr == "/fx/clear" {
            return self.clear();
        }

        debug!("ignoring unrecognized controller osc address: {}", addr);
        effects
    }

    // ---- 4.4.3 Inbound Controller MIDI ---------------------------------

    pub fn handle_midi_from_ctl(&mut self, msg: CcMessage) -> Vec<Effect> {
        let mut effects = Vec::new();
        let channel = msg.status & 0x0F;
        let cc = msg.cc;
        let value = msg.value;

        if channel == self.cmd_channel && value == 127 {
            if cc == self.cc_toggle_ui {
                effects.extend(self.toggle_fx_ui());
            } else if cc == self.cc_bypass_fx {
                effects.extend(self.toggle_bypass_fx());
            } else if cc == self.cc_prev_fx {
                effects.push(Effect::ToDaw(OutMsg::int("/fx/select/prev", 1)));
            } else if cc == self.cc_next_fx {
                effects.push(Effect::ToDaw(OutMsg::int("/fx/select/next", 1)));
            } else if cc == self.cc_fx_follow {
                effects.extend(self.toggle_fx_follow());
            } else if cc == self.cc_learn {
                effects.extend(self.toggle_learn());
            }
        }

        if channel == self.param_channel {
            let cc_u32 = cc as u32;
            if cc_u32 >= self.cc_param_start as u32 && cc_u32 < self.cc_param_end() {
                if let Some(&source) = self.cc_param_map.get_by_left(&cc) {
                    if self.state.learn_active {
                        self.set_learn_source(source, &mut effects);
                        return effects;
                    }
                    let Some(target) = self.active_map().and_then(|m| m.get(source)) else {
                        return effects;
                    };
                    let osc_val = value as f32 / 127.0;
                    effects.push(Effect::ToDaw(OutMsg::float(param_addr(target, ParamAttr::Val), osc_val)));
                }
            }
        }

        effects
    }

    // ---- fx switching ----------------------------------------------------

    fn set_fx(&mut self, fx_name: String) {
        self.state.current_fx = fx_name.clone();
        self.store.get_or_create(&fx_name);
    }

    // ---- command-channel toggles ------------------------------------------

    fn toggle_fx_ui(&mut self) -> Vec<Effect> {
        self.state.fx_visible = !self.state.fx_visible;
        vec![Effect::ToDaw(OutMsg::int("/fx/openui", self.state.fx_visible as i32))]
    }

    fn toggle_bypass_fx(&mut self) -> Vec<Effect> {
        self.state.bypass_fx = !self.state.bypass_fx;
        let value = self.state.bypass_fx as i32;
        vec![
            Effect::ToDaw(OutMsg::int("/fx/bypass", value)),
            Effect::ToCtlOsc(OutMsg::int("/fx/bypass", value)),
        ]
    }

    fn toggle_fx_follow(&mut self) -> Vec<Effect> {
        self.state.fx_follow = !self.state.fx_follow;
        let addr = if self.state.fx_follow {
            "/device/fx/follows/focused"
        } else {
            "/device/fx/follows/device"
        };
        vec![Effect::ToDaw(OutMsg::int(addr, 1))]
    }

    // ---- 4.4.5 learn protocol ----------------------------------------------

    fn toggle_learn(&mut self) -> Vec<Effect> {
        self.state.learn_active = !self.state.learn_active;
        self.state.learn_source = None;
        self.state.learn_target = None;

        let mut effects = vec![Effect::ToCtlOsc(OutMsg::int(
            "/fx/learn",
            self.state.learn_active as i32,
        ))];

        if !self.state.learn_active {
            self.persist_store();
        }

        effects.extend(self.refresh_fx());
        effects
    }

    fn set_learn_source(&mut self, source: u32, effects: &mut Vec<Effect>) {
        self.state.learn_source = Some(source);
        debug!("learn source set to {}", source);
        self.learn_check(effects);
    }

    fn set_learn_target(&mut self, target: u32, effects: &mut Vec<Effect>) {
        if self.state.learn_source.is_none() {
            return;
        }
        self.state.learn_target = Some(target);
        debug!("learn target set to {}", target);
        self.learn_check(effects);
    }

    fn learn_check(&mut self, effects: &mut Vec<Effect>) {
        let (Some(source), Some(target)) = (self.state.learn_source, self.state.learn_target) else {
            return;
        };
        if source < 1 || target < 1 {
            // Slots are both >= 1 per the data model's invariants; reject
            // rather than commit a binding that would violate it (a source
            // of 0 would also underflow cc_param_start + source - 1 in
            // handle_osc_from_daw's val forwarding).
            warn!("refusing to learn invalid pair source={} target={}", source, target);
            self.state.learn_source = None;
            self.state.learn_target = None;
            return;
        }
        info!("learned source {} -> target {}", source, target);
        self.active_map_mut().forceput(source, target);
        self.state.learn_source = None;
        self.state.learn_target = None;
        self.persist_store();
        effects.extend(self.init_osc_device_params());
        effects.extend(self.init_midi_device_params());
        effects.extend(self.refresh_fx());
    }

    fn clear(&mut self) -> Vec<Effect> {
        self.active_map_mut().clear();
        self.persist_store();
        let mut effects = self.init_osc_device_params();
        effects.extend(self.init_midi_device_params());
        effects.extend(self.refresh_fx());
        effects
    }

    fn persist_store(&self) {
        if let Err(e) = self.store.save(&self.fx_maps_path) {
            warn!("failed to persist fx map store: {}", e);
        }
    }

    // ---- 4.4.4 display re-initialization -----------------------------------

    fn init_osc_device_params(&self) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(DISPLAY_PARAM_COUNT as usize * 3);
        for p in 1..=DISPLAY_PARAM_COUNT {
            effects.push(Effect::ToCtlOsc(OutMsg::string(param_addr(p, ParamAttr::Str), "")));
            effects.push(Effect::ToCtlOsc(OutMsg::string(param_addr(p, ParamAttr::Name), "")));
            effects.push(Effect::ToCtlOsc(OutMsg::float(param_addr(p, ParamAttr::Val), 0.0)));
        }
        effects
    }

    pub fn init_osc_device(&self) -> Vec<Effect> {
        let mut effects = vec![
            Effect::ToCtlOsc(OutMsg::int("/fx/learn", 0)),
            Effect::ToCtlOsc(OutMsg::string("/fx/name", "")),
        ];
        effects.extend(self.init_osc_device_params());
        effects
    }

    fn init_midi_device_params(&self) -> Vec<Effect> {
        let mut ccs: Vec<u8> = self.cc_param_map.left_values().copied().collect();
        ccs.sort_unstable();
        ccs.into_iter()
            .map(|cc| Effect::ToCtlMidiCc {
                channel: self.param_channel,
                cc,
                value: 0,
            })
            .collect()
    }

    pub fn init_midi_device(&self) -> Vec<Effect> {
        self.init_midi_device_params()
    }

    fn refresh_fx(&self) -> Vec<Effect> {
        vec![
            Effect::ToDaw(OutMsg::int("/fx/select/prev", 1)),
            Effect::ToDaw(OutMsg::int("/fx/select/next", 1)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MidiConfig, OscEndpoint};

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            params: 16,
            params_in_row: 4,
            daw_osc: OscEndpoint {
                listen_ip: "127.0.0.1".into(),
                listen_port: 9001,
                remote_ip: "127.0.0.1".into(),
                remote_port: 9002,
            },
            controller_osc: OscEndpoint {
                listen_ip: "127.0.0.1".into(),
                listen_port: 9003,
                remote_ip: "127.0.0.1".into(),
                remote_port: 9004,
            },
            controller_midi: MidiConfig {
                input_port_name: "In".into(),
                output_port_name: "Out".into(),
                param_channel: 0,
                cmd_channel: 0,
                cc_param_start: 0,
                cc_learn: 56,
                cc_toggle_ui: 57,
                cc_bypass_fx: 58,
                cc_prev_fx: 59,
                cc_next_fx: 60,
                cc_fx_follow: 61,
            },
            send_interval_ms: 10,
            fx_maps_path: dir.join("fxmaps.yaml").to_string_lossy().to_string(),
        }
    }

    fn core_with_fx(dir: &std::path::Path, fx: &str, bindings: &[(u32, u32)]) -> RemapCore {
        let cfg = test_config(dir);
        let mut core = RemapCore::new(&cfg, FxMapStore::new());
        core.handle_osc_from_daw("/fx/name", &[OscType::String(fx.into())]);
        for (s, t) in bindings {
            core.active_map_mut().forceput(*s, *t);
        }
        core
    }

    // S1 — Controller knob moves mapped parameter.
    #[test]
    fn s1_controller_cc_moves_mapped_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[(3, 7)]);

        let effects = core.handle_midi_from_ctl(CcMessage {
            status: 0xB0,
            cc: 2,
            value: 64,
        });

        assert_eq!(effects.len(), 1);
        match &effects[0] {
            Effect::ToDaw(msg) => {
                assert_eq!(msg.addr, "/fx/param/7/val");
                assert_eq!(msg.args, vec![OscType::Float(64.0 / 127.0)]);
            }
            other => panic!("unexpected effect: {:?}", other),
        }
    }

    // S2 — Learn from controller side.
    #[test]
    fn s2_learn_from_controller_binds_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[]);

        let learn_effects = core.handle_osc_from_ctl("/fx/learn", &[]);
        assert!(core.state().learn_active);
        assert!(learn_effects
            .iter()
            .any(|e| matches!(e, Effect::ToCtlOsc(m) if m.addr == "/fx/learn" && m.args == vec![OscType::Int(1)])));

        // cc 1 -> source 2 on the param channel.
        let cc_effects = core.handle_midi_from_ctl(CcMessage {
            status: 0xB0,
            cc: 1,
            value: 100,
        });
        assert_eq!(core.state().learn_source, Some(2));
        assert!(cc_effects.is_empty());

        let commit_effects = core.handle_osc_from_daw(
            "/fx/param/9/val",
            &[OscType::Float(0.3)],
        );
        assert_eq!(core.state().learn_source, None);
        assert_eq!(core.state().learn_target, None);
        assert_eq!(core.active_map_mut().get(2), Some(9));

        assert!(commit_effects
            .iter()
            .any(|e| matches!(e, Effect::ToDaw(m) if m.addr == "/fx/select/prev")));
        assert!(commit_effects
            .iter()
            .any(|e| matches!(e, Effect::ToDaw(m) if m.addr == "/fx/select/next")));

        let reloaded = FxMapStore::load(dir.path().join("fxmaps.yaml")).unwrap();
        assert_eq!(reloaded.get("Reverb").unwrap().get(2), Some(9));
    }

    // S3 — DAW value forward with MIDI mirror.
    #[test]
    fn s3_daw_value_forwards_to_controller_osc_and_midi() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[(5, 12)]);

        let effects = core.handle_osc_from_daw("/fx/param/12/val", &[OscType::Float(0.25)]);

        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ToCtlOsc(m) if m.addr == "/fx/param/5/val" && m.args == vec![OscType::Float(0.25)])));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::ToCtlMidiCc { cc: 4, value: 32, .. }
        )));
    }

    // S4 — FX change resets display.
    #[test]
    fn s4_fx_change_emits_name_and_48_reinit_messages() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());
        let mut core = RemapCore::new(&cfg, FxMapStore::new());

        let effects = core.handle_osc_from_daw("/fx/name", &[OscType::String("Delay".into())]);

        let name_msgs: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::ToCtlOsc(m) if m.addr == "/fx/name"))
            .collect();
        assert_eq!(name_msgs.len(), 1);

        let osc_reinit = effects
            .iter()
            .filter(|e| matches!(e, Effect::ToCtlOsc(m) if m.addr.starts_with("/fx/param/")))
            .count();
        assert_eq!(osc_reinit, 48);

        let midi_reinit = effects
            .iter()
            .filter(|e| matches!(e, Effect::ToCtlMidiCc { .. }))
            .count();
        assert_eq!(midi_reinit, 16);
    }

    // S5 — forceput evicts conflicts.
    #[test]
    fn s5_forceput_evicts_conflicting_bindings() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[(2, 7), (3, 9)]);
        core.active_map_mut().forceput(2, 9);
        assert_eq!(core.active_map().unwrap().len(), 1);
        assert_eq!(core.active_map().unwrap().get(2), Some(9));
    }

    // S6 — Unmapped parameter drop.
    #[test]
    fn s6_unmapped_parameter_produces_no_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[]);
        let effects = core.handle_midi_from_ctl(CcMessage {
            status: 0xB0,
            cc: 0,
            value: 50,
        });
        assert!(effects.is_empty());
    }

    // Property 5 — command-channel edge trigger.
    #[test]
    fn command_cc_requires_value_127() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[]);
        let effects = core.handle_midi_from_ctl(CcMessage {
            status: 0xB0,
            cc: 58, // cc_bypass_fx
            value: 126,
        });
        assert!(effects.is_empty());
        assert!(!core.state().bypass_fx);
    }

    #[test]
    fn bypass_toggle_sends_to_both_sides() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[]);
        let effects = core.handle_midi_from_ctl(CcMessage {
            status: 0xB0,
            cc: 58,
            value: 127,
        });
        assert!(core.state().bypass_fx);
        assert!(effects.iter().any(|e| matches!(e, Effect::ToDaw(m) if m.addr == "/fx/bypass")));
        assert!(effects.iter().any(|e| matches!(e, Effect::ToCtlOsc(m) if m.addr == "/fx/bypass")));
    }

    #[test]
    fn learn_target_is_only_triggered_by_val_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[]);
        core.handle_osc_from_ctl("/fx/learn", &[]);
        core.handle_midi_from_ctl(CcMessage { status: 0xB0, cc: 1, value: 10 });
        assert_eq!(core.state().learn_source, Some(2));

        core.handle_osc_from_daw("/fx/param/9/name", &[OscType::String("Mix".into())]);
        assert_eq!(core.state().learn_target, None, "name attribute must not set learn_target");

        core.handle_osc_from_daw("/fx/param/9/val", &[OscType::Float(0.5)]);
        assert_eq!(core.state().learn_source, None, "val attribute commits the learned pair");
    }

    #[test]
    fn cc_param_end_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[(1, 1)]);
        // params=16, cc_param_start=0 => valid range is cc 0..16 (exclusive of 16).
        let effects = core.handle_midi_from_ctl(CcMessage { status: 0xB0, cc: 16, value: 64 });
        assert!(effects.is_empty(), "cc == cc_param_start + params must not alias a parameter");
    }

    #[test]
    fn parse_param_addr_rejects_slot_zero_so_learn_never_sees_source_zero() {
        assert_eq!(crate::osc_codec::parse_param_addr("/fx/param/0/val"), None);
    }

    #[test]
    fn learn_check_refuses_a_zero_source_or_target() {
        let dir = tempfile::tempdir().unwrap();
        let mut core = core_with_fx(dir.path(), "Reverb", &[]);

        // Exercise the commit-point guard directly: even if something
        // upstream ever let a zero slot through, learn_check must reject it
        // rather than commit a binding that violates s,t >= 1 or underflow
        // the cc_param_start + source - 1 computation downstream.
        let mut effects = Vec::new();
        core.set_learn_source(0, &mut effects);
        core.set_learn_target(5, &mut effects);

        assert_eq!(core.state().learn_source, None);
        assert_eq!(core.state().learn_target, None);
        assert_eq!(core.active_map_mut().get(0), None);
    }
}
