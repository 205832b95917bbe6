use thiserror::Error;

/// Fatal, startup-class failures. Anything reachable once the proxy is running
/// (a malformed OSC address, a dropped send, an unmapped parameter) is logged
/// and swallowed at the call site instead of being threaded through here —
/// see the error handling notes in the crate root docs.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("MIDI port '{0}' not found among enumerated ports: {1:?}")]
    UnknownMidiPort(String, Vec<String>),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("duplicate {0} param {1} in fx map entry '{2}'")]
    DuplicateFxMapKey(&'static str, i64, String),

    #[error("midi backend error: {0}")]
    Midi(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type ProxyResult<T> = Result<T, ProxyError>;
