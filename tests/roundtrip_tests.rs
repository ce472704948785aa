//! Text and structure round trips through the parser and writer.
//!
//! Test framework: Rust's built-in test harness (#[test]) with standard assertions.
//! Every text below is a valid encoding, so each must come back byte for
//! byte, interleaved line sections included.

use smap::compose::SmapBuilder;
use smap::config::SmapConfig;
use smap::models::*;
use smap::parser::{ParseMode, SmapParser, parse_many};
use smap::writer::SmapWriter;
use smap::{parse, serialize};

const BACKEND: &str = "SMAP\nMain.kt\nKotlin\n*S Kotlin\n*F\n+ 1 Main.kt\napp/MainKt\n+ 2 Collections.kt\nkotlin/collections/CollectionsKt___CollectionsKt\n*L\n1#1,42:1\n1849#2,2:43\n*E\n";

const WITH_DEBUG_STRATUM: &str = "SMAP\nMain.kt\nKotlin\n*S Kotlin\n*F\n+ 1 Main.kt\napp/MainKt\n+ 2 Util.kt\napp/UtilKt\n*L\n1#1,20:1\n5#2,3:21\n*S KotlinDebug\n*F\n+ 1 Main.kt\napp/MainKt\n*L\n12#1:21,3\n*E\n";

const INTERLEAVED: &str = "SMAP\nMain.kt\nKotlin\n*S Kotlin\n*F\n+ 1 Main.kt\napp/MainKt\n+ 2 Util.kt\napp/UtilKt\n*L\n1#1,5:1\n7#2:6,3\n20#1,2:9\n*E\n";

const ELIDED_IDS: &str = "SMAP\nMain.kt\nKotlin\n*S Kotlin\n*F\n1 Main.kt\n+ 2 Util.kt\napp/UtilKt\n*L\n1#1,10:1\n14,2:11\n3#2:13,4\n8:17\n*E\n";

#[test]
fn valid_texts_are_reproduced_exactly() {
    for text in [BACKEND, WITH_DEBUG_STRATUM, ELIDED_IDS, INTERLEAVED] {
        let smap = parse(text).unwrap();
        assert_eq!(serialize(&smap), text);
        assert_eq!(smap.to_string(), text);
    }
}

#[test]
fn detected_file_id_style_follows_the_input() {
    assert_eq!(parse(BACKEND).unwrap().file_id_style(), FileIdStyle::Always);
    assert_eq!(parse(ELIDED_IDS).unwrap().file_id_style(), FileIdStyle::OnChange);
}

#[test]
fn forcing_a_style_changes_only_the_file_ids() {
    let smap = parse(ELIDED_IDS).unwrap();
    let always = SmapWriter::new()
        .with_file_id_style(FileIdStyle::Always)
        .write(&smap);
    assert!(always.contains("14#1,2:11\n"), "{always}");
    assert!(always.contains("8#2:17\n"), "{always}");
    assert_eq!(parse(&always).unwrap(), smap);

    let config = SmapConfig {
        file_id_style: Some(FileIdStyle::OnChange),
        ..SmapConfig::default()
    };
    assert_eq!(SmapWriter::from_config(&config).write(&smap), ELIDED_IDS);
}

#[test]
fn built_structures_round_trip_structurally() {
    let smap = Smap::new(
        "A.kt",
        vec![
            FileMapping::with_mappings(
                1,
                "A.kt",
                Some("pkg/AKt".into()),
                [RangeMapping::new(1, 1, 9, 0).unwrap()],
            ),
            FileMapping::with_mappings(
                2,
                "B.kt",
                None,
                [
                    RangeMapping::repeating(4, 10, 5, 0).unwrap(),
                    RangeMapping::with_increment(30, 0, 3, 15, 2).unwrap(),
                ],
            ),
            FileMapping::new(3, "Empty.kt", Some("pkg/EmptyKt".into())),
        ],
    );
    smap.validate().unwrap();
    let text = serialize(&smap);
    let back = parse(&text).unwrap();
    assert_eq!(back, smap);
    assert_eq!(back.intervals(), smap.intervals());
    assert_eq!(serialize(&back), text);
}

#[test]
fn crlf_input_parses_to_the_same_structure() {
    let crlf = BACKEND.replace('\n', "\r\n");
    assert_eq!(parse(&crlf).unwrap(), parse(BACKEND).unwrap());
}

#[test]
fn lenient_parse_drops_unknown_sections_from_output() {
    let with_vendor = BACKEND.replace("*L\n", "*V\nacme\n1 2 3\n*L\n");
    assert!(parse(&with_vendor).is_err());
    let smap = SmapParser::new(ParseMode::Lenient).parse(&with_vendor).unwrap();
    assert_eq!(serialize(&smap), BACKEND);
}

#[test]
fn batch_parse_keeps_input_order() {
    let texts = [BACKEND, ELIDED_IDS, "SMAP\n", WITH_DEBUG_STRATUM];
    let results = parse_many(SmapParser::default(), &texts);
    let names: Vec<Option<String>> = results
        .iter()
        .map(|r| r.as_ref().ok().map(|s| s.source_name().to_string()))
        .collect();
    assert_eq!(
        names,
        vec![
            Some("Main.kt".to_string()),
            Some("Main.kt".to_string()),
            None,
            Some("Main.kt".to_string())
        ]
    );
}

#[test]
fn json_dump_rebuilds_the_lookup_view() {
    let smap = parse(WITH_DEBUG_STRATUM).unwrap();
    let json = serde_json::to_string(&smap).unwrap();
    assert!(!json.contains("intervals"));
    let back: Smap = serde_json::from_str(&json).unwrap();
    assert_eq!(back, smap);
    assert_eq!(back.resolve(22).unwrap().to_string(), "Util.kt:6");
}

#[test]
fn interleaved_files_keep_their_written_order() {
    let smap = parse(INTERLEAVED).unwrap();
    assert_eq!(serialize(&smap), INTERLEAVED);

    let on_change = SmapWriter::new()
        .with_file_id_style(FileIdStyle::OnChange)
        .write(&smap);
    assert!(on_change.contains("*L\n1#1,5:1\n7#2:6,3\n20#1,2:9\n*E\n"), "{on_change}");
    assert_eq!(parse(&on_change).unwrap(), smap);
}

#[test]
fn inlining_keeps_the_callee_line_order() {
    let callee = parse(INTERLEAVED).unwrap();
    let mut builder = SmapBuilder::new("App.kt", "app/AppKt", 3);
    let window = builder.inline(&callee).unwrap();
    assert_eq!(window.start, 4);
    let smap = builder.build().unwrap();

    assert_eq!(smap.line_order(), &[1, 2, 3, 2]);
    let text = serialize(&smap);
    assert!(
        text.ends_with("*L\n1#1,3:1\n1#2,5:4\n7#3:9,3\n20#2,2:12\n*E\n"),
        "{text}"
    );
    assert_eq!(parse(&text).unwrap(), smap);
}

#[test]
fn debug_stratum_keeps_its_own_file_id_style() {
    let text = WITH_DEBUG_STRATUM.replace("*L\n12#1:21,3\n", "*L\n12#1:21,3\n13:24\n");
    let smap = parse(&text).unwrap();
    assert_eq!(smap.file_id_style(), FileIdStyle::Always);
    let debug = &smap.secondary_strata()[0];
    assert_eq!(debug.name, KOTLIN_DEBUG_STRATUM);
    assert_eq!(debug.file_id_style, FileIdStyle::OnChange);
    assert_eq!(serialize(&smap), text);
}
