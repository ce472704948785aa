//! Data models for SMAP line mappings.
//!
//! A [`Smap`] maps the line numbers of one compiled class back to the
//! original source files. Each referenced source file is a [`FileMapping`]
//! holding the [`RangeMapping`]s that originate from it, and the SMAP keeps a
//! flattened, destination-sorted view of every range for lookups.

use std::cmp::Ordering;
use std::fmt;

use foldhash::quality::RandomState as FoldHasher;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use smol_str::SmolStr;

use crate::error::{Result, SmapError};
use crate::utils;

/// An IndexMap with FoldHasher for fast + high-quality hashing.
pub type FoldIndexMap<K, V> = IndexMap<K, V, FoldHasher>;

/// An IndexSet with FoldHasher for fast + high-quality hashing.
pub type FoldIndexSet<K> = IndexSet<K, FoldHasher>;

/// Name of the stratum the Kotlin backend writes its mappings into.
pub const KOTLIN_STRATUM: &str = "Kotlin";

/// Name of the secondary stratum carrying inline call-site information.
pub const KOTLIN_DEBUG_STRATUM: &str = "KotlinDebug";

/// One contiguous block of destination lines originating from one
/// contiguous block of source lines in a single file.
///
/// Each of the `repeat` source lines starting at `source` maps onto
/// `increment` destination lines, so the destination range is
/// `[dest, dest + repeat * increment)`. A plain line-for-line copy has
/// `increment == 1`; a single source line expanded into several generated
/// lines has `repeat == 1`.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RangeMapping {
    source: u32,
    file_id: u32,
    repeat: u32,
    dest: u32,
    increment: u32,
}

impl RangeMapping {
    /// Creates a line-for-line mapping of `len` lines.
    ///
    /// Returns `None` for an empty range or when the range would overflow.
    pub fn new(source: u32, dest: u32, len: u32, file_id: u32) -> Option<Self> {
        Self::with_increment(source, file_id, len, dest, 1)
    }

    /// Creates a mapping where the single `source` line expands into
    /// `dest_len` generated lines.
    pub fn repeating(source: u32, dest: u32, dest_len: u32, file_id: u32) -> Option<Self> {
        Self::with_increment(source, file_id, 1, dest, dest_len)
    }

    /// Creates a mapping from its raw encoded fields.
    pub fn with_increment(
        source: u32,
        file_id: u32,
        repeat: u32,
        dest: u32,
        increment: u32,
    ) -> Option<Self> {
        if repeat == 0 || increment == 0 {
            return None;
        }
        source.checked_add(repeat - 1)?;
        dest.checked_add(repeat.checked_mul(increment)?)?;
        Some(Self {
            source,
            file_id,
            repeat,
            dest,
            increment,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    /// First source line.
    pub fn source_start(&self) -> u32 {
        self.source
    }

    /// Last source line (inclusive).
    pub fn source_end(&self) -> u32 {
        self.source + (self.repeat - 1)
    }

    /// Number of source lines.
    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    /// Number of destination lines each source line expands into.
    pub fn increment(&self) -> u32 {
        self.increment
    }

    /// First destination line.
    pub fn dest_start(&self) -> u32 {
        self.dest
    }

    /// One past the last destination line.
    pub fn dest_end(&self) -> u32 {
        self.dest + self.dest_len()
    }

    pub fn dest_len(&self) -> u32 {
        self.repeat * self.increment
    }

    /// True for a single source line spread across several destination lines.
    pub fn is_repeating(&self) -> bool {
        self.repeat == 1 && self.increment > 1
    }

    /// Whether `dest_line` lies in `[dest_start, dest_end)`.
    pub fn contains(&self, dest_line: u32) -> bool {
        self.dest <= dest_line && dest_line < self.dest_end()
    }

    /// Translates a destination line to its source line.
    pub fn map(&self, dest_line: u32) -> Option<u32> {
        if !self.contains(dest_line) {
            return None;
        }
        Some(self.source + (dest_line - self.dest) / self.increment)
    }

    /// Moves the destination range by `delta` lines, keeping the source side.
    pub fn shifted(self, delta: i64) -> Option<Self> {
        let dest = u32::try_from(i64::from(self.dest) + delta).ok()?;
        Self::with_increment(self.source, self.file_id, self.repeat, dest, self.increment)
    }

    /// Same mapping attributed to another file id.
    pub fn with_file_id(self, file_id: u32) -> Self {
        Self { file_id, ..self }
    }

    /// Whether the two destination ranges share at least one line.
    pub fn overlaps(&self, other: &RangeMapping) -> bool {
        utils::common_dest_lines(*self, *other).is_some()
    }
}

impl Ord for RangeMapping {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dest
            .cmp(&other.dest)
            .then_with(|| self.dest_end().cmp(&other.dest_end()))
            .then_with(|| self.file_id.cmp(&other.file_id))
            .then_with(|| self.source.cmp(&other.source))
            .then_with(|| self.repeat.cmp(&other.repeat))
    }
}

impl PartialOrd for RangeMapping {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RangeMapping {
    /// Formats as an encoded line-info entry with an explicit file id.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source, self.file_id)?;
        if self.repeat != 1 {
            write!(f, ",{}", self.repeat)?;
        }
        write!(f, ":{}", self.dest)?;
        if self.increment != 1 {
            write!(f, ",{}", self.increment)?;
        }
        Ok(())
    }
}

// Most files contribute a handful of ranges to a class
pub type MappingVec = SmallVec<[RangeMapping; 4]>;

/// All ranges of one class that originate from one source file.
///
/// Mappings keep the order they were declared or added in; the
/// destination-sorted view lives in [`Smap::intervals`].
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct FileMapping {
    id: u32,
    name: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<SmolStr>,
    mappings: MappingVec,
}

impl FileMapping {
    pub fn new(id: u32, name: impl Into<SmolStr>, path: Option<SmolStr>) -> Self {
        Self {
            id,
            name: name.into(),
            path,
            mappings: MappingVec::new(),
        }
    }

    /// Builds a file mapping, attributing every range to this file.
    pub fn with_mappings(
        id: u32,
        name: impl Into<SmolStr>,
        path: Option<SmolStr>,
        mappings: impl IntoIterator<Item = RangeMapping>,
    ) -> Self {
        let mut file = Self::new(id, name, path);
        file.mappings
            .extend(mappings.into_iter().map(|m| m.with_file_id(id)));
        file
    }

    pub(crate) fn push(&mut self, mapping: RangeMapping) {
        self.mappings.push(mapping.with_file_id(self.id));
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Display name of the source file, e.g. `Foo.kt`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full path of the source file, e.g. `pkg/FooKt`.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn mappings(&self) -> &[RangeMapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Returns the range containing `dest_line`, if any.
    pub fn interval_containing(&self, dest_line: u32) -> Option<&RangeMapping> {
        self.mappings.iter().find(|m| m.contains(dest_line))
    }

    pub fn position_of(&self, dest_line: u32) -> Option<SourcePosition> {
        let line = self.interval_containing(dest_line)?.map(dest_line)?;
        Some(SourcePosition {
            file_name: self.name.clone(),
            path: self.path.clone(),
            line,
        })
    }

    pub(crate) fn identity(&self) -> (SmolStr, Option<SmolStr>) {
        (self.name.clone(), self.path.clone())
    }
}

/// A resolved original-source location.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SourcePosition {
    pub file_name: SmolStr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<SmolStr>,
    pub line: u32,
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_name, self.line)
    }
}

/// How file ids are written in the line section.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FileIdStyle {
    /// Every line carries `#id`.
    #[default]
    Always,
    /// `#id` only when it differs from the previous line.
    OnChange,
}

/// A stratum other than the default one, kept for faithful re-encoding.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Stratum {
    pub name: SmolStr,
    pub file_mappings: Vec<FileMapping>,
    /// Authored order of the line section, see [`Smap::line_order`].
    #[serde(default)]
    pub line_order: Vec<u32>,
    #[serde(default)]
    pub file_id_style: FileIdStyle,
}

impl Stratum {
    /// Creates a stratum whose lines are ordered file by file.
    pub fn new(name: impl Into<SmolStr>, file_mappings: Vec<FileMapping>) -> Self {
        let line_order = utils::grouped_line_order(&file_mappings);
        Self {
            name: name.into(),
            file_mappings,
            line_order,
            file_id_style: FileIdStyle::default(),
        }
    }

    /// Ranges in the order they are written; falls back to file by file
    /// when `line_order` does not account for every range.
    pub fn mappings_in_line_order(&self) -> Vec<&RangeMapping> {
        utils::ordered_mappings(&self.file_mappings, &self.line_order)
            .unwrap_or_else(|| grouped_mappings(&self.file_mappings))
    }
}

impl PartialEq for Stratum {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.file_mappings == other.file_mappings
            && self.line_order == other.line_order
    }
}

impl Eq for Stratum {}

fn grouped_mappings(files: &[FileMapping]) -> Vec<&RangeMapping> {
    files.iter().flat_map(|f| f.mappings()).collect()
}

/// The composed mapping of one compiled class.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(from = "SmapParts", into = "SmapParts")]
pub struct Smap {
    source_name: SmolStr,
    default_stratum: SmolStr,
    file_mappings: Vec<FileMapping>,
    line_order: Vec<u32>,
    intervals: Vec<RangeMapping>,
    secondary_strata: Vec<Stratum>,
    file_id_style: FileIdStyle,
}

#[derive(Serialize, Deserialize, Clone)]
struct SmapParts {
    source_name: SmolStr,
    default_stratum: SmolStr,
    file_mappings: Vec<FileMapping>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    line_order: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    secondary_strata: Vec<Stratum>,
    #[serde(default)]
    file_id_style: FileIdStyle,
}

impl From<SmapParts> for Smap {
    fn from(parts: SmapParts) -> Self {
        let smap = Smap::new(parts.source_name, parts.file_mappings);
        let smap = if parts.line_order.is_empty() {
            smap
        } else {
            smap.with_line_order(parts.line_order)
        };
        smap.with_stratum(parts.default_stratum)
            .with_secondary_strata(parts.secondary_strata)
            .with_file_id_style(parts.file_id_style)
    }
}

impl From<Smap> for SmapParts {
    fn from(smap: Smap) -> Self {
        SmapParts {
            source_name: smap.source_name,
            default_stratum: smap.default_stratum,
            file_mappings: smap.file_mappings,
            line_order: smap.line_order,
            secondary_strata: smap.secondary_strata,
            file_id_style: smap.file_id_style,
        }
    }
}

// Encoding details (`file_id_style`) and the derived interval view are not
// part of structural equality.
impl PartialEq for Smap {
    fn eq(&self, other: &Self) -> bool {
        self.source_name == other.source_name
            && self.default_stratum == other.default_stratum
            && self.file_mappings == other.file_mappings
            && self.line_order == other.line_order
            && self.secondary_strata == other.secondary_strata
    }
}

impl Eq for Smap {}

impl Smap {
    /// Creates a SMAP in the default Kotlin stratum.
    pub fn new(source_name: impl Into<SmolStr>, file_mappings: Vec<FileMapping>) -> Self {
        let intervals = utils::sorted_intervals(&file_mappings);
        let line_order = utils::grouped_line_order(&file_mappings);
        Self {
            source_name: source_name.into(),
            default_stratum: SmolStr::new_static(KOTLIN_STRATUM),
            file_mappings,
            line_order,
            intervals,
            secondary_strata: Vec::new(),
            file_id_style: FileIdStyle::default(),
        }
    }

    pub fn with_stratum(mut self, name: impl Into<SmolStr>) -> Self {
        self.default_stratum = name.into();
        self
    }

    /// Sets the authored order of the line section. Entry `n` names the file
    /// of the `n`-th written line; the `k`-th occurrence of an id stands for
    /// that file's `k`-th range. An order that does not cover every range
    /// exactly once is ignored and the file-by-file order is kept.
    pub fn with_line_order(mut self, order: Vec<u32>) -> Self {
        if utils::ordered_mappings(&self.file_mappings, &order).is_some() {
            self.line_order = order;
        } else {
            tracing::warn!(
                "ignoring line order of {} that does not match its ranges",
                self.source_name
            );
        }
        self
    }

    pub fn with_secondary_strata(mut self, strata: Vec<Stratum>) -> Self {
        self.secondary_strata = strata;
        self
    }

    pub fn with_file_id_style(mut self, style: FileIdStyle) -> Self {
        self.file_id_style = style;
        self
    }

    /// Name of the compiled source, first line after the `SMAP` header.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn default_stratum(&self) -> &str {
        &self.default_stratum
    }

    pub fn file_mappings(&self) -> &[FileMapping] {
        &self.file_mappings
    }

    pub fn line_order(&self) -> &[u32] {
        &self.line_order
    }

    /// Ranges in the order they are written in the line section.
    pub fn mappings_in_line_order(&self) -> Vec<&RangeMapping> {
        utils::ordered_mappings(&self.file_mappings, &self.line_order)
            .unwrap_or_else(|| grouped_mappings(&self.file_mappings))
    }

    /// Every range across all files, sorted by destination start.
    pub fn intervals(&self) -> &[RangeMapping] {
        &self.intervals
    }

    pub fn secondary_strata(&self) -> &[Stratum] {
        &self.secondary_strata
    }

    pub fn file_id_style(&self) -> FileIdStyle {
        self.file_id_style
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn file(&self, id: u32) -> Option<&FileMapping> {
        self.file_mappings.iter().find(|f| f.id == id)
    }

    /// Finds the interval containing `dest_line` by binary search.
    pub fn find_interval(&self, dest_line: u32) -> Option<&RangeMapping> {
        utils::find_interval(&self.intervals, dest_line).map(|idx| &self.intervals[idx])
    }

    /// Like [`Smap::find_interval`] but an unmapped line is an error.
    pub fn interval_for(&self, dest_line: u32) -> Result<&RangeMapping> {
        self.find_interval(dest_line)
            .ok_or_else(|| SmapError::UnmappedLine {
                line: dest_line,
                context: format!("no interval in SMAP of {}", self.source_name),
            })
    }

    /// Resolves a generated line to its original file and line.
    pub fn resolve(&self, dest_line: u32) -> Option<SourcePosition> {
        let interval = self.find_interval(dest_line)?;
        let file = self.file(interval.file_id)?;
        Some(SourcePosition {
            file_name: file.name.clone(),
            path: file.path.clone(),
            line: interval.map(dest_line)?,
        })
    }

    /// Lowest destination line and one past the highest.
    pub fn dest_span(&self) -> Option<(u32, u32)> {
        let first = self.intervals.first()?;
        let end = self.intervals.iter().map(|m| m.dest_end()).max()?;
        Some((first.dest_start(), end))
    }

    /// Checks that file ids are unique, every range refers to a declared
    /// file and no two ranges share a destination line.
    pub fn validate(&self) -> Result<()> {
        let mut ids = FoldIndexSet::with_capacity_and_hasher(
            self.file_mappings.len(),
            FoldHasher::default(),
        );
        for file in &self.file_mappings {
            if !ids.insert(file.id) {
                return Err(SmapError::Internal(format!(
                    "duplicate file id {} in SMAP of {}",
                    file.id, self.source_name
                )));
            }
        }
        if let Some(orphan) = self.intervals.iter().find(|m| !ids.contains(&m.file_id)) {
            return Err(SmapError::UnknownFile(orphan.file_id));
        }
        if let Some((first, second)) = utils::first_overlap(&self.intervals) {
            return Err(SmapError::Overlap { first, second });
        }
        Ok(())
    }
}
