//! Stack-trace remapping for code that went through inlining.
//!
//! A frame such as `at pkg.AKt.main(A.kt:27)` may point at a line past the
//! end of `A.kt` when line 27 belongs to an inlined body. The class SMAP
//! tells which file and line that really was.

use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use smol_str::SmolStr;

use crate::models::{Smap, SourcePosition};

static STACK_FRAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w|\s]*at\s+(.+)\.(.+)\((.+):(\d+)\)\s*$").expect("valid stack frame pattern")
});

/// One parsed stack-trace line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct StackFrame {
    pub class_name: SmolStr,
    pub method: SmolStr,
    pub file_name: SmolStr,
    pub line: u32,
    /// Byte range of `File.kt:12` within the original text.
    location: Range<usize>,
}

impl StackFrame {
    /// Recognises `"\tat pkg.Cls.method(File.kt:12)"` and
    /// `"Breakpoint reached at pkg.Cls.method(File.kt:12)"`.
    pub fn parse(line: &str) -> Option<Self> {
        let caps = STACK_FRAME.captures(line)?;
        let file = caps.get(3)?;
        let number = caps.get(4)?;
        Some(Self {
            class_name: SmolStr::new(caps.get(1)?.as_str()),
            method: SmolStr::new(caps.get(2)?.as_str()),
            file_name: SmolStr::new(file.as_str()),
            line: number.as_str().parse().ok()?,
            location: file.start()..number.end(),
        })
    }

    /// Class name in internal form, `pkg/Cls$Inner`.
    pub fn internal_class_name(&self) -> String {
        self.class_name.replace('.', "/")
    }

    /// Rewrites `original` (the line this frame was parsed from) so that it
    /// points at `pos`.
    pub fn rewrite(&self, original: &str, pos: &SourcePosition) -> String {
        let mut out = String::with_capacity(original.len() + 8);
        out.push_str(&original[..self.location.start]);
        out.push_str(&pos.to_string());
        out.push_str(&original[self.location.end..]);
        out
    }
}

/// Remaps one frame through the SMAP of its class.
///
/// With `own_line_count` set, lines within the class's own file need no
/// remapping and yield `None`. Otherwise the first file, in declaration
/// order, holding an interval for the line decides the position.
pub fn retrace_frame(
    frame: &StackFrame,
    smap: &Smap,
    own_line_count: Option<u32>,
) -> Option<SourcePosition> {
    if own_line_count.is_some_and(|count| frame.line <= count) {
        return None;
    }
    smap.file_mappings()
        .iter()
        .find_map(|file| file.position_of(frame.line))
}

/// Rewrites every recognised frame for which `lookup` yields the class SMAP
/// (and optionally the class's own line count). Other lines pass through.
pub fn retrace_text<'s, F>(text: &str, mut lookup: F) -> String
where
    F: FnMut(&StackFrame) -> Option<(&'s Smap, Option<u32>)>,
{
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let (body, newline) = match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        };
        let rewritten = StackFrame::parse(body).and_then(|frame| {
            let (smap, own) = lookup(&frame)?;
            let pos = retrace_frame(&frame, smap, own)?;
            tracing::debug!("{}:{} -> {pos}", frame.file_name, frame.line);
            Some(frame.rewrite(body, &pos))
        });
        out.push_str(rewritten.as_deref().unwrap_or(body));
        out.push_str(newline);
    }
    out
}

/// Finds the file on disk behind a resolved position.
pub trait SourceLocator {
    /// `None` means no location is available, e.g. the file was removed.
    fn locate(&self, pos: &SourcePosition) -> Option<PathBuf>;
}

/// Looks for sources below a set of root directories.
///
/// For a position with path `pkg/FooKt` and name `Foo.kt`, `<root>/pkg/Foo.kt`
/// is tried before `<root>/Foo.kt`.
#[derive(Clone, Debug, Default)]
pub struct FsLocator {
    roots: Vec<PathBuf>,
}

impl FsLocator {
    pub fn new(roots: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    fn candidates<'a>(&'a self, pos: &'a SourcePosition) -> impl Iterator<Item = PathBuf> + 'a {
        let package_dir = pos
            .path
            .as_deref()
            .and_then(|p| Path::new(p).parent())
            .filter(|dir| !dir.as_os_str().is_empty());
        self.roots.iter().flat_map(move |root| {
            let nested = package_dir.map(|dir| root.join(dir).join(pos.file_name.as_str()));
            nested
                .into_iter()
                .chain(std::iter::once(root.join(pos.file_name.as_str())))
        })
    }
}

impl SourceLocator for FsLocator {
    fn locate(&self, pos: &SourcePosition) -> Option<PathBuf> {
        let found = self.candidates(pos).find(|p| p.is_file());
        if found.is_none() {
            tracing::debug!("no source found for {pos}");
        }
        found
    }
}
