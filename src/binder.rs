//! Binding of a generated method's line numbers to its class SMAP.

use foldhash::quality::RandomState as FoldHasher;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{Result, SmapError};
use crate::models::{FoldIndexSet, RangeMapping, Smap};

/// Identifies a label within one method body.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[serde(transparent)]
pub struct LabelId(pub u32);

/// A line-number marker: code from `start` onwards belongs to `line`.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LineNumber {
    pub line: u32,
    pub start: LabelId,
}

/// A typed instruction record.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Insn {
    Label { id: LabelId },
    LineNumber(LineNumber),
    Op { opcode: u16 },
}

/// The instruction sequence of one generated method.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
pub struct MethodBody {
    pub name: SmolStr,
    insns: Vec<Insn>,
}

impl MethodBody {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            insns: Vec::new(),
        }
    }

    pub fn with_insns(name: impl Into<SmolStr>, insns: Vec<Insn>) -> Self {
        Self {
            name: name.into(),
            insns,
        }
    }

    pub fn push(&mut self, insn: Insn) {
        self.insns.push(insn);
    }

    /// Appends a label followed by a line-number marker starting at it.
    pub fn mark_line(&mut self, label: LabelId, line: u32) {
        self.insns.push(Insn::Label { id: label });
        self.insns
            .push(Insn::LineNumber(LineNumber { line, start: label }));
    }

    /// Walks the instructions in order; call again to restart.
    pub fn insns(&self) -> std::slice::Iter<'_, Insn> {
        self.insns.iter()
    }

    pub fn line_numbers(&self) -> impl Iterator<Item = LineNumber> + Clone + '_ {
        self.insns.iter().filter_map(|insn| match insn {
            Insn::LineNumber(ln) => Some(*ln),
            _ => None,
        })
    }
}

/// A line-number marker paired with the interval it falls into.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub struct LabelAndMapping {
    pub line_number: LineNumber,
    pub mapping: RangeMapping,
}

/// A method bound to the SMAP of its class.
#[derive(Clone, Debug)]
pub struct SmapAndMethod<'a> {
    method: &'a MethodBody,
    smap: &'a Smap,
    lines: Vec<LabelAndMapping>,
    ranges: Vec<RangeMapping>,
}

impl<'a> SmapAndMethod<'a> {
    /// Resolves every line-number marker of `method` against `smap`.
    ///
    /// A marker outside every interval means the inliner produced a line it
    /// never mapped, reported as [`SmapError::UnmappedLine`].
    pub fn bind(method: &'a MethodBody, smap: &'a Smap) -> Result<Self> {
        let lines = method
            .line_numbers()
            .map(|line_number| {
                let mapping = smap.find_interval(line_number.line).ok_or_else(|| {
                    SmapError::UnmappedLine {
                        line: line_number.line,
                        context: format!(
                            "label {} in inlined method {}",
                            line_number.start.0, method.name
                        ),
                    }
                })?;
                Ok(LabelAndMapping {
                    line_number,
                    mapping: *mapping,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut distinct: FoldIndexSet<RangeMapping> =
            FoldIndexSet::with_capacity_and_hasher(lines.len(), FoldHasher::default());
        distinct.extend(lines.iter().map(|l| l.mapping));
        tracing::debug!(
            "bound {}: {} line markers in {} ranges",
            method.name,
            lines.len(),
            distinct.len()
        );

        Ok(Self {
            method,
            smap,
            lines,
            ranges: distinct.into_iter().collect(),
        })
    }

    pub fn method(&self) -> &'a MethodBody {
        self.method
    }

    pub fn smap(&self) -> &'a Smap {
        self.smap
    }

    pub fn lines(&self) -> &[LabelAndMapping] {
        &self.lines
    }

    /// Distinct intervals the method touches, in first-encountered order.
    pub fn ranges(&self) -> &[RangeMapping] {
        &self.ranges
    }

    pub fn mapping_for(&self, label: LabelId) -> Option<&RangeMapping> {
        self.lines
            .iter()
            .find(|l| l.line_number.start == label)
            .map(|l| &l.mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::SmapBuilder;

    fn class_smap() -> Smap {
        let mut b = SmapBuilder::new("A.kt", "pkg/AKt", 10);
        b.map_call_site("B.kt", Some("pkg/BKt".into()), 7, 3).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn test_line_numbers_iterator_is_restartable() {
        let mut m = MethodBody::new("run");
        m.mark_line(LabelId(0), 1);
        m.push(Insn::Op { opcode: 0xb1 });
        m.mark_line(LabelId(1), 2);
        let iter = m.line_numbers();
        assert_eq!(iter.clone().count(), 2);
        assert_eq!(iter.map(|l| l.line).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(m.insns().count(), 5);
        assert_eq!(m.insns().count(), 5);
    }

    #[test]
    fn test_bind_collects_distinct_ranges_in_order() {
        let smap = class_smap();
        let mut m = MethodBody::new("run");
        m.mark_line(LabelId(0), 12);
        m.mark_line(LabelId(1), 3);
        m.mark_line(LabelId(2), 11);
        m.mark_line(LabelId(3), 4);
        let bound = SmapAndMethod::bind(&m, &smap).unwrap();
        assert_eq!(bound.lines().len(), 4);
        let starts: Vec<u32> = bound.ranges().iter().map(|r| r.dest_start()).collect();
        assert_eq!(starts, vec![11, 1]);
        assert_eq!(bound.mapping_for(LabelId(1)).unwrap().dest_start(), 1);
        assert!(bound.mapping_for(LabelId(9)).is_none());
    }

    #[test]
    fn test_bind_fails_on_unmapped_label() {
        let smap = class_smap();
        let mut m = MethodBody::new("run");
        m.mark_line(LabelId(0), 2);
        m.mark_line(LabelId(1), 14);
        match SmapAndMethod::bind(&m, &smap) {
            Err(SmapError::UnmappedLine { line, context }) => {
                assert_eq!(line, 14);
                assert!(context.contains("run"), "{context}");
            }
            other => panic!("expected unmapped line, got {other:?}"),
        }
    }

    #[test]
    fn test_bind_method_without_lines() {
        let smap = class_smap();
        let m = MethodBody::with_insns("empty", vec![Insn::Op { opcode: 0 }]);
        let bound = SmapAndMethod::bind(&m, &smap).unwrap();
        assert!(bound.lines().is_empty());
        assert!(bound.ranges().is_empty());
    }
}
