//! Composition of SMAPs across one or more levels of inlining.
//!
//! Test framework: Rust's built-in test harness (#[test]) with standard assertions.

use smap::compose::SmapBuilder;
use smap::models::*;
use smap::utils::first_overlap;
use smap::{SmapError, parse, serialize};

fn body(name: &str, path: &str, source: u32, len: u32) -> Smap {
    Smap::new(
        name,
        vec![FileMapping::with_mappings(
            1,
            name,
            Some(path.into()),
            [RangeMapping::new(source, 1, len, 0).unwrap()],
        )],
    )
}

#[test]
fn two_level_inline_resolves_to_the_innermost_file() {
    // g: one line of Y.kt expanded into four generated lines.
    let g = Smap::new(
        "Y.kt",
        vec![FileMapping::with_mappings(
            1,
            "Y.kt",
            Some("pkg/YKt".into()),
            [RangeMapping::repeating(7, 1, 4, 0).unwrap()],
        )],
    );

    // f (X.kt) contributes no lines of its own to the inlined region.
    let mut f = SmapBuilder::new("X.kt", "pkg/XKt", 0);
    f.inline(&g).unwrap();
    let f = f.build().unwrap();

    let mut main = SmapBuilder::new("Main.kt", "pkg/MainKt", 49);
    let window = main.inline(&f).unwrap();
    assert_eq!((window.start, window.end()), (50, 54));
    let main = main.build().unwrap();

    for line in 50..=53 {
        let pos = main.resolve(line).unwrap();
        assert_eq!(pos.file_name, "Y.kt", "line {line}");
        assert_eq!(pos.line, 7);
    }
    assert_eq!(main.resolve(49).unwrap().file_name, "Main.kt");
    assert!(main.resolve(54).is_none());
}

#[test]
fn nested_composition_matches_single_pass_composition() {
    let c = body("C.kt", "pkg/CKt", 3, 4);

    // Two steps: C into B, then B into A.
    let mut b = SmapBuilder::new("B.kt", "pkg/BKt", 10);
    let c_in_b = b.inline(&c).unwrap();
    let b = b.build().unwrap();
    let mut a = SmapBuilder::new("A.kt", "pkg/AKt", 30);
    let b_in_a = a.inline(&b).unwrap();
    let nested = a.build().unwrap();

    // One step: both shifts applied directly while building A.
    let b_own = body("B.kt", "pkg/BKt", 1, 10);
    let mut direct = SmapBuilder::new("A.kt", "pkg/AKt", 30);
    direct.inline_at(&b_own, b_in_a.start).unwrap();
    let c_start = u32::try_from(i64::from(c_in_b.start) + b_in_a.shift).unwrap();
    direct.inline_at(&c, c_start).unwrap();
    let direct = direct.build().unwrap();

    for callee_line in 1..=4 {
        let line = b_in_a.translate(c_in_b.translate(callee_line).unwrap()).unwrap();
        let expected = c.resolve(callee_line).unwrap();
        assert_eq!(nested.resolve(line).unwrap(), expected);
        assert_eq!(direct.resolve(line).unwrap(), expected);
    }
    assert_eq!(nested, direct);
}

#[test]
fn composed_intervals_never_overlap() {
    let mut builder = SmapBuilder::new("A.kt", "pkg/AKt", 25);
    builder.inline(&body("B.kt", "pkg/BKt", 4, 6)).unwrap();
    builder
        .map_call_site("A.kt", Some("pkg/AKt".into()), 12, 3)
        .unwrap();
    builder.inline(&body("C.kt", "pkg/CKt", 1, 2)).unwrap();
    builder.inline(&body("B.kt", "pkg/BKt", 20, 5)).unwrap();
    let smap = builder.build().unwrap();

    assert!(first_overlap(smap.intervals()).is_none());
    for pair in smap.intervals().windows(2) {
        assert!(pair[0].dest_end() <= pair[1].dest_start(), "{} / {}", pair[0], pair[1]);
    }
    // B.kt appears once even though it was inlined twice.
    let names: Vec<&str> = smap.file_mappings().iter().map(|f| f.name()).collect();
    assert_eq!(names, vec!["A.kt", "B.kt", "C.kt"]);
    assert_eq!(smap.file(2).unwrap().mappings().len(), 2);
}

#[test]
fn explicit_placement_over_mapped_lines_is_rejected() {
    let mut builder = SmapBuilder::new("A.kt", "pkg/AKt", 10);
    let err = builder
        .inline_at(&body("B.kt", "pkg/BKt", 1, 3), 9)
        .unwrap_err();
    match err {
        SmapError::Overlap { first, second } => {
            assert_eq!(first.dest_start(), 1);
            assert_eq!(second.dest_start(), 9);
        }
        other => panic!("expected overlap, got {other:?}"),
    }

    // Touching the exclusive end is fine.
    let mut builder = SmapBuilder::new("A.kt", "pkg/AKt", 10);
    assert!(builder.inline_at(&body("B.kt", "pkg/BKt", 1, 3), 11).is_ok());
}

#[test]
fn composed_smap_survives_text_round_trip() {
    let mut builder = SmapBuilder::new("A.kt", "pkg/AKt", 18);
    builder.inline(&body("Lib.kt", "lib/LibKt", 40, 7)).unwrap();
    builder
        .map_call_site("Other.kt", Some("lib/OtherKt".into()), 3, 2)
        .unwrap();
    let smap = builder.build().unwrap();

    let text = serialize(&smap);
    assert_eq!(
        text,
        "SMAP\nA.kt\nKotlin\n*S Kotlin\n*F\n+ 1 A.kt\npkg/AKt\n+ 2 Lib.kt\nlib/LibKt\n+ 3 Other.kt\nlib/OtherKt\n*L\n1#1,18:1\n40#2,7:19\n3#3:26,2\n*E\n"
    );
    assert_eq!(parse(&text).unwrap(), smap);
}
