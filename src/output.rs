use clap::ValueEnum;
use serde::Deserialize;

/// How output of external commands reaches the terminal.
#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Stream command output live.
    Stream,
    /// Capture output; callers decide what to print once the command exits.
    #[default]
    Group,
}

impl OutputMode {
    pub fn streams(self) -> bool {
        matches!(self, OutputMode::Stream)
    }
}
