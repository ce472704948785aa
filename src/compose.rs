//! Composition of SMAPs during inlining.
//!
//! When a function body is inlined, its instructions receive a fresh window
//! of destination lines in the caller. Every range of the callee's SMAP is
//! moved into that window while its source side is left untouched, so a
//! chain of nested inlines still resolves to the line the author wrote.

use foldhash::quality::RandomState as FoldHasher;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{ErrorContext, Result, SmapError};
use crate::models::{FileMapping, FoldIndexMap, RangeMapping, Smap};
use crate::utils;

/// Destination lines handed out to one inlined body or call site.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct InlineWindow {
    /// First destination line of the window.
    pub start: u32,
    /// Number of lines in the window.
    pub len: u32,
    /// Offset added to every callee destination line.
    pub shift: i64,
}

impl InlineWindow {
    /// One past the last line of the window.
    pub fn end(&self) -> u32 {
        self.start + self.len
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line < self.end()
    }

    /// Where a callee line lands in the caller.
    pub fn translate(&self, callee_line: u32) -> Option<u32> {
        u32::try_from(i64::from(callee_line) + self.shift)
            .ok()
            .filter(|line| self.contains(*line))
    }
}

type FileKey = (SmolStr, Option<SmolStr>);

/// Builds the SMAP of one class while its methods are generated.
///
/// Every operation either applies completely or, on error, leaves the
/// builder as it was.
#[derive(Clone, Debug)]
pub struct SmapBuilder {
    source_name: SmolStr,
    files: Vec<FileMapping>,
    ids: FoldIndexMap<FileKey, usize>,
    occupied: Vec<RangeMapping>,
    line_order: Vec<u32>,
    next_line: u32,
}

impl SmapBuilder {
    /// Starts a SMAP for a class compiled from `source_name`.
    ///
    /// The class's own file becomes file 1 with an identity mapping over its
    /// `line_count` lines; inlined code is placed after them.
    pub fn new(source_name: impl Into<SmolStr>, path: impl Into<SmolStr>, line_count: u32) -> Self {
        let source_name = source_name.into();
        let mut builder = Self {
            source_name: source_name.clone(),
            files: Vec::new(),
            ids: FoldIndexMap::with_hasher(FoldHasher::default()),
            occupied: Vec::new(),
            line_order: Vec::new(),
            next_line: 1,
        };
        let own = builder.file_index(source_name, Some(path.into()));
        if let Some(identity) = RangeMapping::new(1, 1, line_count, 0) {
            builder.commit(own, identity);
        }
        builder
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// First destination line not yet handed out.
    pub fn next_free_line(&self) -> u32 {
        self.next_line
    }

    /// Id of a file, registering it if this is its first appearance.
    pub fn file_id(&mut self, name: impl Into<SmolStr>, path: Option<SmolStr>) -> u32 {
        let idx = self.file_index(name.into(), path);
        self.files[idx].id()
    }

    fn file_index(&mut self, name: SmolStr, path: Option<SmolStr>) -> usize {
        let key = (name, path);
        if let Some(&idx) = self.ids.get(&key) {
            return idx;
        }
        let idx = self.files.len();
        let id = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        self.files.push(FileMapping::new(id, key.0.clone(), key.1.clone()));
        self.ids.insert(key, idx);
        idx
    }

    /// Rejects `mappings` if any of them shares a destination line with an
    /// occupied one or with another of them. Nothing is modified.
    fn check_free(&self, mappings: &[RangeMapping]) -> Result<()> {
        for &mapping in mappings {
            utils::insertion_point(&self.occupied, mapping).map_err(|existing| {
                SmapError::Overlap {
                    first: existing,
                    second: mapping,
                }
            })?;
        }
        let mut sorted = mappings.to_vec();
        sorted.sort_unstable();
        match utils::first_overlap(&sorted) {
            Some((first, second)) => Err(SmapError::Overlap { first, second }),
            None => Ok(()),
        }
    }

    /// Records a mapping already known not to overlap anything.
    fn commit(&mut self, idx: usize, mapping: RangeMapping) {
        let mapping = mapping.with_file_id(self.files[idx].id());
        let at = self.occupied.partition_point(|m| m < &mapping);
        self.occupied.insert(at, mapping);
        self.files[idx].push(mapping);
        self.line_order.push(mapping.file_id());
        self.next_line = self.next_line.max(mapping.dest_end());
    }

    fn allocate(&self, len: u32) -> Result<u32> {
        self.next_line
            .checked_add(len)
            .map(|_| self.next_line)
            .ok_or_else(|| SmapError::Internal(format!("destination lines exhausted in {}", self.source_name)))
    }

    /// Maps a fresh window of `dest_len` generated lines onto a single
    /// source line, as produced when one call site expands into many lines.
    pub fn map_call_site(
        &mut self,
        name: impl Into<SmolStr>,
        path: Option<SmolStr>,
        source_line: u32,
        dest_len: u32,
    ) -> Result<InlineWindow> {
        let start = self.allocate(dest_len)?;
        let mapping = if dest_len > 0 {
            let mapping = RangeMapping::repeating(source_line, start, dest_len, 0)
                .context("call site mapping overflows")?;
            self.check_free(&[mapping])?;
            Some(mapping)
        } else {
            None
        };
        let idx = self.file_index(name.into(), path);
        if let Some(mapping) = mapping {
            self.commit(idx, mapping);
        }
        Ok(InlineWindow {
            start,
            len: dest_len,
            shift: 0,
        })
    }

    /// Inlines `callee` into a freshly allocated window.
    pub fn inline(&mut self, callee: &Smap) -> Result<InlineWindow> {
        let len = callee.dest_span().map_or(0, |(lo, hi)| hi - lo);
        let start = self.allocate(len)?;
        self.inline_at(callee, start)
    }

    /// Inlines `callee` so that its lowest destination line lands on
    /// `dest_start`. Sharing a line with anything already mapped is an
    /// [`SmapError::Overlap`], in which case nothing is inlined.
    ///
    /// The callee's lines keep their written order after this builder's.
    pub fn inline_at(&mut self, callee: &Smap, dest_start: u32) -> Result<InlineWindow> {
        let Some((lo, hi)) = callee.dest_span() else {
            tracing::debug!(
                "inlining {} into {}: no executable lines",
                callee.source_name(),
                self.source_name
            );
            for file in callee.file_mappings() {
                let (name, path) = file.identity();
                self.file_index(name, path);
            }
            return Ok(InlineWindow {
                start: dest_start,
                len: 0,
                shift: 0,
            });
        };

        let shift = i64::from(dest_start) - i64::from(lo);
        let moved = callee
            .mappings_in_line_order()
            .into_iter()
            .map(|mapping| {
                mapping
                    .shifted(shift)
                    .with_context(|| format!("shifting {mapping} by {shift} overflows"))
            })
            .collect::<Result<Vec<_>>>()?;
        self.check_free(&moved)?;

        let mut keys: FoldIndexMap<u32, FileKey> =
            FoldIndexMap::with_capacity_and_hasher(callee.file_mappings().len(), FoldHasher::default());
        for file in callee.file_mappings() {
            keys.entry(file.id()).or_insert_with(|| file.identity());
        }
        if let Some(stray) = moved.iter().find(|m| !keys.contains_key(&m.file_id())) {
            return Err(SmapError::UnknownFile(stray.file_id()));
        }

        let targets: FoldIndexMap<u32, usize> = keys
            .into_iter()
            .map(|(id, (name, path))| (id, self.file_index(name, path)))
            .collect();
        for mapping in moved {
            if let Some(&idx) = targets.get(&mapping.file_id()) {
                self.commit(idx, mapping);
            }
        }

        let window = InlineWindow {
            start: dest_start,
            len: hi - lo,
            shift,
        };
        tracing::debug!(
            "inlined {} into {} at lines {}..{}",
            callee.source_name(),
            self.source_name,
            window.start,
            window.end()
        );
        Ok(window)
    }

    /// Finishes the SMAP and re-checks its invariants.
    pub fn build(self) -> Result<Smap> {
        let smap = Smap::new(self.source_name, self.files).with_line_order(self.line_order);
        smap.validate()?;
        Ok(smap)
    }
}
