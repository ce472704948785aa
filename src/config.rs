use std::env;

use crate::error::{Result, SmapError};
use crate::models::FileIdStyle;
use crate::parser::ParseMode;

/// Configuration for parsing and writing SMAPs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmapConfig {
    /// Strict parsing fails on anything unexpected, lenient skips it
    pub parse_mode: ParseMode,
    /// Overrides the file-id style recorded in each SMAP when writing
    pub file_id_style: Option<FileIdStyle>,
    /// Check invariants (non-overlap, declared files) after parsing
    pub validate: bool,
}

impl Default for SmapConfig {
    fn default() -> Self {
        Self {
            parse_mode: ParseMode::Strict,
            file_id_style: None,
            validate: true,
        }
    }
}

pub fn parse_mode_from_str(value: &str) -> Result<ParseMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "strict" => Ok(ParseMode::Strict),
        "lenient" => Ok(ParseMode::Lenient),
        other => Err(SmapError::Config(format!("unknown parse mode `{other}`"))),
    }
}

pub fn file_id_style_from_str(value: &str) -> Result<FileIdStyle> {
    match value.trim().to_ascii_lowercase().as_str() {
        "always" => Ok(FileIdStyle::Always),
        "on-change" | "on_change" => Ok(FileIdStyle::OnChange),
        other => Err(SmapError::Config(format!("unknown file id style `{other}`"))),
    }
}

/// Get configuration from environment variables
///
/// Invalid values are ignored with a warning and the default is kept.
pub fn get_config() -> SmapConfig {
    let mut config = SmapConfig::default();

    if let Ok(mode) = env::var("SMAP_PARSE_MODE") {
        match parse_mode_from_str(&mode) {
            Ok(mode) => config.parse_mode = mode,
            Err(e) => tracing::warn!("ignoring SMAP_PARSE_MODE: {e}"),
        }
    }

    if let Ok(style) = env::var("SMAP_FILE_IDS")
        && !style.trim().is_empty()
    {
        match file_id_style_from_str(&style) {
            Ok(style) => config.file_id_style = Some(style),
            Err(e) => tracing::warn!("ignoring SMAP_FILE_IDS: {e}"),
        }
    }

    if let Ok(validate) = env::var("SMAP_VALIDATE") {
        let v = validate.trim().to_ascii_lowercase();
        config.validate = !(v == "false" || v == "0");
    }

    config
}
