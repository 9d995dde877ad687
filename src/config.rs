//! Settings resolved once at startup and passed down by value.

use std::io::IsTerminal;

use crate::wire::Schema;

/// When to colour terminal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl std::str::FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(ColorChoice::Auto),
            "always" => Ok(ColorChoice::Always),
            "never" => Ok(ColorChoice::Never),
            other => Err(format!("unknown color choice '{other}' (expected auto, always or never)")),
        }
    }
}

impl ColorChoice {
    /// `Auto` colours only a terminal, and never when `NO_COLOR` is set.
    pub fn enabled(self, no_color_env: bool, is_terminal: bool) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => !no_color_env && is_terminal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub schema: Schema,
    pub use_color: bool,
    pub json: bool,
    pub engine: Option<String>,
}

impl Config {
    pub fn resolve(schema: Schema, color: ColorChoice, json: bool, engine: Option<String>) -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        let use_color = !json && color.enabled(no_color, std::io::stdout().is_terminal());
        Config { schema, use_color, json, engine }
    }
}
