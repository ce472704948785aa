//! Serializer producing the textual SMAP encoding.

use std::fmt::{self, Write};

use crate::config::SmapConfig;
use crate::models::{FileIdStyle, FileMapping, RangeMapping, Smap};

/// Writes [`Smap`]s back to text.
///
/// Lines are written in the order they were parsed or composed in. Without
/// an explicit style each stratum keeps the file-id style it was parsed
/// with, so valid input survives a round trip unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct SmapWriter {
    file_id_style: Option<FileIdStyle>,
}

impl SmapWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SmapConfig) -> Self {
        Self {
            file_id_style: config.file_id_style,
        }
    }

    pub fn with_file_id_style(mut self, style: FileIdStyle) -> Self {
        self.file_id_style = Some(style);
        self
    }

    pub fn write(&self, smap: &Smap) -> String {
        let mut out = String::with_capacity(64 + smap.intervals().len() * 12);
        // Writing into a String cannot fail
        let _ = self.write_to(smap, &mut out);
        out
    }

    pub fn write_to(&self, smap: &Smap, out: &mut impl Write) -> fmt::Result {
        writeln!(out, "SMAP")?;
        writeln!(out, "{}", smap.source_name())?;
        writeln!(out, "{}", smap.default_stratum())?;
        write_stratum(
            out,
            smap.default_stratum(),
            smap.file_mappings(),
            &smap.mappings_in_line_order(),
            self.file_id_style.unwrap_or(smap.file_id_style()),
        )?;
        for stratum in smap.secondary_strata() {
            write_stratum(
                out,
                &stratum.name,
                &stratum.file_mappings,
                &stratum.mappings_in_line_order(),
                self.file_id_style.unwrap_or(stratum.file_id_style),
            )?;
        }
        writeln!(out, "*E")
    }
}

fn write_stratum(
    out: &mut impl Write,
    name: &str,
    files: &[FileMapping],
    lines: &[&RangeMapping],
    style: FileIdStyle,
) -> fmt::Result {
    writeln!(out, "*S {name}")?;
    writeln!(out, "*F")?;
    for file in files {
        match file.path() {
            Some(path) => writeln!(out, "+ {} {}\n{path}", file.id(), file.name())?,
            None => writeln!(out, "{} {}", file.id(), file.name())?,
        }
    }
    writeln!(out, "*L")?;
    let mut previous_id = 0u32;
    for mapping in lines {
        write!(out, "{}", mapping.source_start())?;
        if style == FileIdStyle::Always || mapping.file_id() != previous_id {
            write!(out, "#{}", mapping.file_id())?;
        }
        previous_id = mapping.file_id();
        if mapping.repeat() != 1 {
            write!(out, ",{}", mapping.repeat())?;
        }
        write!(out, ":{}", mapping.dest_start())?;
        if mapping.increment() != 1 {
            write!(out, ",{}", mapping.increment())?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Serializes with the SMAP's own file-id style.
pub fn serialize(smap: &Smap) -> String {
    SmapWriter::new().write(smap)
}

impl fmt::Display for Smap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        SmapWriter::new().write_to(self, f)
    }
}
