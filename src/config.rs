//! Immutable configuration record consumed by [`crate::supervisor::ProxySupervisor`].
//!
//! Loading this from a YAML file and gathering values from a CLI is treated as
//! an external concern (see crate root docs); this module only owns the shape
//! of the record and the validation that must hold before the proxy starts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, ProxyResult};

/// One end of a UDP OSC link: where we listen, and where we send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscEndpoint {
    pub listen_ip: String,
    pub listen_port: u16,
    pub remote_ip: String,
    pub remote_port: u16,
}

impl OscEndpoint {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_ip, self.listen_port)
    }

    pub fn remote_addr(&self) -> String {
        format!("{}:{}", self.remote_ip, self.remote_port)
    }
}

/// MIDI port names, channels and CC assignments for the controller side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiConfig {
    pub input_port_name: String,
    pub output_port_name: String,
    pub param_channel: u8,
    pub cmd_channel: u8,
    pub cc_param_start: u8,
    pub cc_learn: u8,
    pub cc_toggle_ui: u8,
    pub cc_bypass_fx: u8,
    pub cc_prev_fx: u8,
    pub cc_next_fx: u8,
    pub cc_fx_follow: u8,
}

fn default_params() -> u32 {
    16
}

fn default_params_in_row() -> u32 {
    4
}

fn default_send_interval_ms() -> u64 {
    10
}

fn default_fx_maps_path() -> String {
    "~/.oscremap_fxmaps.yaml".to_string()
}

/// The full, immutable configuration record.
///
/// Mirrors the `global` / `daw_osc` / `controller_osc` / `controller_midi`
/// sections of the original YAML config, plus two knobs (`send_interval_ms`,
/// `fx_maps_path`) that the original hardcoded as constants — promoted here so
/// tests can point them at scratch values without touching global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_params")]
    pub params: u32,
    #[serde(default = "default_params_in_row")]
    pub params_in_row: u32,
    pub daw_osc: OscEndpoint,
    pub controller_osc: OscEndpoint,
    pub controller_midi: MidiConfig,
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    #[serde(default = "default_fx_maps_path")]
    pub fx_maps_path: String,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> ProxyResult<Config> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ProxyError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let cfg: Config = serde_yaml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range-checks the numeric fields that `serde` cannot express on its
    /// own: MIDI channels fit in a nibble, CC numbers fit in 7 bits, and the
    /// parameter-CC window derived from `cc_param_start`/`params` must not
    /// run past CC 127. MIDI port *names* are validated separately, against
    /// the enumerated port list, when [`crate::midi_io::MidiIoAdapter::open`]
    /// runs — that check needs a live backend and can't happen here.
    pub fn validate(&self) -> ProxyResult<()> {
        if self.params == 0 {
            return Err(ProxyError::InvalidConfig("params must be at least 1".into()));
        }
        let midi = &self.controller_midi;
        for (name, channel) in [("param_channel", midi.param_channel), ("cmd_channel", midi.cmd_channel)] {
            if channel > 15 {
                return Err(ProxyError::InvalidConfig(format!("{name}={channel} is not a valid MIDI channel (0..=15)")));
            }
        }
        if self.cc_param_end() > 128 {
            return Err(ProxyError::InvalidConfig(format!(
                "cc_param_start={} + params={} runs past the highest MIDI CC (127)",
                midi.cc_param_start, self.params
            )));
        }
        Ok(())
    }

    /// Resolves `~` in [`Self::fx_maps_path`] against `$HOME`, falling back to
    /// the literal path if the home directory cannot be determined.
    pub fn fx_maps_path(&self) -> PathBuf {
        if let Some(rest) = self.fx_maps_path.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.fx_maps_path)
    }

    pub fn cc_param_end(&self) -> u32 {
        self.controller_midi.cc_param_start as u32 + self.params
    }
}
