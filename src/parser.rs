//! Parser for the textual SMAP encoding.
//!
//! The encoding is line oriented:
//!
//! ```text
//! SMAP
//! Foo.kt
//! Kotlin
//! *S Kotlin
//! *F
//! + 1 Foo.kt
//! pkg/FooKt
//! + 2 Bar.kt
//! pkg/BarKt
//! *L
//! 1#1,20:1
//! 7#2:21,4
//! *E
//! ```
//!
//! Line-info entries are `InputStart[#FileId][,RepeatCount]:OutputStart[,OutputIncrement]`.
//! An omitted file id inherits the previous entry's id within the section.

use memchr::memchr_iter;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::config::SmapConfig;
use crate::error::{Result, SmapError};
use crate::models::{FileIdStyle, FileMapping, RangeMapping, Smap, Stratum};

/// How the parser reacts to input it does not understand.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Any deviation from the encoding is an error.
    #[default]
    Strict,
    /// Unknown sections and malformed entries are skipped with a warning.
    Lenient,
}

/// Kinds of `*X` section markers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum SectionKind {
    Stratum,
    Files,
    Lines,
    End,
    Vendor,
    OpenEmbedded,
    CloseEmbedded,
}

impl SectionKind {
    const MARKERS: [(&'static str, SectionKind); 7] = [
        ("*S", SectionKind::Stratum),
        ("*F", SectionKind::Files),
        ("*L", SectionKind::Lines),
        ("*E", SectionKind::End),
        ("*V", SectionKind::Vendor),
        ("*O", SectionKind::OpenEmbedded),
        ("*C", SectionKind::CloseEmbedded),
    ];

    /// Looks up the kind of a marker line such as `*S Kotlin`.
    pub fn from_marker(line: &str) -> Option<Self> {
        let marker = line.get(..2)?;
        if line.len() > 2 && !line[2..].starts_with(' ') {
            return None;
        }
        Self::MARKERS
            .iter()
            .find(|(m, _)| *m == marker)
            .map(|(_, kind)| *kind)
    }

    /// Whether this parser interprets the section's contents.
    pub fn is_understood(self) -> bool {
        matches!(
            self,
            SectionKind::Stratum | SectionKind::Files | SectionKind::Lines | SectionKind::End
        )
    }
}

/// Run-length state carried from one line-info entry to the next.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct LineInfoState {
    /// File id inherited by an entry that omits `#id`.
    pub file_id: u32,
    /// Whether any entry so far omitted its file id.
    pub elided: bool,
}

/// Decodes one line-info entry given the state left by the previous one.
///
/// Pure: the returned state is the only thing carried forward.
pub fn parse_line_info(
    state: LineInfoState,
    text: &str,
) -> std::result::Result<(LineInfoState, RangeMapping), String> {
    let (input, output) = text
        .split_once(':')
        .ok_or_else(|| format!("missing ':' in line info `{text}`"))?;
    let (input, repeat) = split_optional(input, ',');
    let (start, file_id) = split_optional(input, '#');
    let (dest, increment) = split_optional(output, ',');

    let source = number(start, "input start line")?;
    let repeat = repeat.map(|r| number(r, "repeat count")).transpose()?;
    let dest = number(dest, "output start line")?;
    let increment = increment
        .map(|i| number(i, "output increment"))
        .transpose()?;
    let (file_id, elided) = match file_id {
        Some(id) => (number(id, "file id")?, state.elided),
        None => (state.file_id, true),
    };

    let mapping = RangeMapping::with_increment(
        source,
        file_id,
        repeat.unwrap_or(1),
        dest,
        increment.unwrap_or(1),
    )
    .ok_or_else(|| format!("empty or overflowing range `{text}`"))?;
    Ok((LineInfoState { file_id, elided }, mapping))
}

fn split_optional(s: &str, sep: char) -> (&str, Option<&str>) {
    match s.split_once(sep) {
        Some((head, tail)) => (head, Some(tail)),
        None => (s, None),
    }
}

fn number(s: &str, what: &str) -> std::result::Result<u32, String> {
    s.trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid {what} `{s}`: {e}"))
}

/// Splits text into `(1-based line number, line)` pairs, dropping a trailing
/// `\r` from each line.
fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut start = 0usize;
    let mut ends = memchr_iter(b'\n', text.as_bytes()).chain(std::iter::once(text.len()));
    std::iter::from_fn(move || {
        if start > text.len() {
            return None;
        }
        let end = ends.next()?;
        let line = &text[start..end];
        start = end + 1;
        if end == text.len() && line.is_empty() {
            return None;
        }
        Some(line.strip_suffix('\r').unwrap_or(line))
    })
    .enumerate()
    .map(|(i, line)| (i + 1, line))
}

/// A stratum while its sections are being read.
struct StratumBuilder {
    name: SmolStr,
    files: Vec<FileMapping>,
    lines: Vec<(usize, RangeMapping)>,
    elided: bool,
}

impl StratumBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: SmolStr::new(name),
            files: Vec::new(),
            lines: Vec::new(),
            elided: false,
        }
    }
}

/// Parses SMAP text under a [`ParseMode`].
#[derive(Clone, Copy, Debug)]
pub struct SmapParser {
    mode: ParseMode,
    validate: bool,
}

impl Default for SmapParser {
    fn default() -> Self {
        Self::new(ParseMode::Strict)
    }
}

impl SmapParser {
    pub fn new(mode: ParseMode) -> Self {
        Self {
            mode,
            validate: true,
        }
    }

    pub fn from_config(config: &SmapConfig) -> Self {
        Self {
            mode: config.parse_mode,
            validate: config.validate,
        }
    }

    /// Disables or enables the post-parse invariant check.
    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    /// Reports a recoverable problem: an error in strict mode, a warning
    /// otherwise.
    fn recover(&self, line: usize, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        match self.mode {
            ParseMode::Strict => Err(SmapError::parse(line, message)),
            ParseMode::Lenient => {
                tracing::warn!("skipping SMAP line {line}: {message}");
                Ok(())
            }
        }
    }

    pub fn parse(&self, text: &str) -> Result<Smap> {
        let mut lines = numbered_lines(text).peekable();

        match lines.next() {
            Some((_, "SMAP")) => {}
            Some((n, other)) => {
                return Err(SmapError::parse(n, format!("expected `SMAP` header, found `{other}`")));
            }
            None => return Err(SmapError::parse(1, "empty input")),
        }
        let (_, source_name) = lines
            .next()
            .ok_or_else(|| SmapError::parse(2, "missing output file name"))?;
        let (_, default_stratum) = lines
            .next()
            .ok_or_else(|| SmapError::parse(3, "missing default stratum name"))?;

        let mut strata: Vec<StratumBuilder> = Vec::new();
        let mut ended = false;

        while let Some((n, line)) = lines.next() {
            if ended {
                if !line.trim().is_empty() {
                    self.recover(n, "content after `*E`")?;
                }
                continue;
            }
            let Some(kind) = SectionKind::from_marker(line) else {
                self.recover(n, format!("unexpected line `{line}` outside of a section"))?;
                continue;
            };
            match kind {
                SectionKind::Stratum => {
                    let name = line[2..].trim();
                    if name.is_empty() {
                        self.recover(n, "stratum without a name")?;
                    }
                    strata.push(StratumBuilder::new(name));
                }
                SectionKind::End => ended = true,
                SectionKind::Files | SectionKind::Lines => {
                    let Some(stratum) = strata.last_mut() else {
                        self.recover(n, "section before any `*S` stratum")?;
                        while lines.next_if(|(_, l)| !l.starts_with('*')).is_some() {}
                        continue;
                    };
                    if kind == SectionKind::Files {
                        self.read_files(&mut lines, stratum)?;
                    } else {
                        let mut state = LineInfoState::default();
                        while let Some((n, entry)) = lines.next_if(|(_, l)| !l.starts_with('*')) {
                            match parse_line_info(state, entry) {
                                Ok((next, mapping)) => {
                                    state = next;
                                    stratum.lines.push((n, mapping));
                                }
                                Err(message) => self.recover(n, message)?,
                            }
                        }
                        stratum.elided |= state.elided;
                    }
                }
                unknown => {
                    debug_assert!(!unknown.is_understood());
                    self.recover(n, format!("unsupported section `{line}`"))?;
                    while lines.next_if(|(_, l)| !l.starts_with('*')).is_some() {}
                }
            }
        }

        if !ended {
            self.recover(numbered_lines(text).count(), "missing `*E` terminator")?;
        }

        let smap = self.assemble(source_name, default_stratum, strata)?;
        if self.validate {
            match smap.validate() {
                Ok(()) => {}
                Err(e) if self.mode == ParseMode::Lenient => {
                    tracing::warn!("SMAP of {} is inconsistent: {e}", smap.source_name());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(smap)
    }

    fn read_files<'a>(
        &self,
        lines: &mut std::iter::Peekable<impl Iterator<Item = (usize, &'a str)>>,
        stratum: &mut StratumBuilder,
    ) -> Result<()> {
        while let Some((n, entry)) = lines.next_if(|(_, l)| !l.starts_with('*')) {
            let (has_path, rest) = match entry.strip_prefix("+ ") {
                Some(rest) => (true, rest),
                None => (false, entry),
            };
            let path = if has_path {
                match lines.next_if(|(_, l)| !l.starts_with('*')) {
                    Some((_, path)) => Some(SmolStr::new(path)),
                    None => {
                        self.recover(n, format!("file entry `{entry}` without a path line"))?;
                        continue;
                    }
                }
            } else {
                None
            };
            let Some((id, name)) = rest.split_once(' ') else {
                self.recover(n, format!("malformed file entry `{entry}`"))?;
                continue;
            };
            let id = match number(id, "file id") {
                Ok(id) => id,
                Err(message) => {
                    self.recover(n, message)?;
                    continue;
                }
            };
            if stratum.files.iter().any(|f| f.id() == id) {
                self.recover(n, format!("duplicate file id {id}"))?;
                continue;
            }
            stratum.files.push(FileMapping::new(id, name, path));
        }
        Ok(())
    }

    fn assemble(
        &self,
        source_name: &str,
        default_stratum: &str,
        strata: Vec<StratumBuilder>,
    ) -> Result<Smap> {
        let mut resolved = Vec::with_capacity(strata.len());
        for stratum in strata {
            let StratumBuilder {
                name,
                mut files,
                lines,
                elided,
            } = stratum;
            let mut line_order = Vec::with_capacity(lines.len());
            for (n, mapping) in lines {
                match files.iter_mut().find(|f| f.id() == mapping.file_id()) {
                    Some(file) => {
                        file.push(mapping);
                        line_order.push(mapping.file_id());
                    }
                    None => self.recover(
                        n,
                        format!("line info `{mapping}` refers to undeclared file {}", mapping.file_id()),
                    )?,
                }
            }
            // Each stratum keeps its own file-id style.
            let file_id_style = if elided {
                FileIdStyle::OnChange
            } else {
                FileIdStyle::Always
            };
            resolved.push(Stratum {
                name,
                file_mappings: files,
                line_order,
                file_id_style,
            });
        }

        let main = match resolved.iter().position(|s| s.name == default_stratum) {
            Some(0) => 0,
            Some(idx) => {
                self.recover(0, format!("default stratum `{default_stratum}` is not the first one"))?;
                idx
            }
            None if resolved.is_empty() => {
                self.recover(0, "no stratum defined")?;
                return Ok(Smap::new(source_name, Vec::new()).with_stratum(default_stratum));
            }
            None => {
                self.recover(0, format!("default stratum `{default_stratum}` is not defined"))?;
                0
            }
        };
        let primary = resolved.remove(main);
        tracing::debug!(
            "parsed SMAP of {source_name}: {} files, {} secondary strata",
            primary.file_mappings.len(),
            resolved.len()
        );

        Ok(Smap::new(source_name, primary.file_mappings)
            .with_line_order(primary.line_order)
            .with_stratum(default_stratum)
            .with_secondary_strata(resolved)
            .with_file_id_style(primary.file_id_style))
    }
}

/// Parses strictly; any malformed input is an error.
pub fn parse(text: &str) -> Result<Smap> {
    SmapParser::new(ParseMode::Strict).parse(text)
}

/// Parses defensively, skipping what cannot be understood.
pub fn parse_lenient(text: &str) -> Result<Smap> {
    SmapParser::new(ParseMode::Lenient).parse(text)
}

/// Parses a batch of encodings in parallel.
pub fn parse_many<S>(parser: SmapParser, texts: &[S]) -> Vec<Result<Smap>>
where
    S: AsRef<str> + Sync,
{
    texts
        .par_iter()
        .map(|text| parser.parse(text.as_ref()))
        .collect()
}
