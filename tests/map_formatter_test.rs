// End-to-end tests: the sample program's maps at every stop, for every library

use mapscope::config::SessionConfig;
use mapscope::debuggee::StdLib;
use mapscope::session::{Session, SessionError};

/// Libraries whose map layout is recognized
const SUPPORTED: [StdLib; 4] = [
    StdLib::LibCxx,
    StdLib::LibCxxLegacy,
    StdLib::LibStdCxx,
    StdLib::MsvcStl,
];

fn launch(library: StdLib) -> Session {
    Session::launch(SessionConfig::new(library)).expect("recording failed")
}

/// `frame variable <name>` without the `(type) name = ` prefix
fn value_of(session: &mut Session, name: &str) -> String {
    let text = session
        .frame_variable(name)
        .unwrap_or_else(|e| panic!("frame variable {}: {}", name, e));
    let marker = format!(") {} = ", name);
    let (_, value) = text
        .split_once(&marker)
        .unwrap_or_else(|| panic!("unexpected output: {}", text));
    value.to_string()
}

fn expect_map(pairs: &[(&str, &str)]) -> String {
    if pairs.is_empty() {
        return "size=0 {}".to_string();
    }
    let mut out = format!("size={} {{\n", pairs.len());
    for (i, (k, v)) in pairs.iter().enumerate() {
        out.push_str(&format!("  [{}] = (first = {}, second = {})\n", i, k, v));
    }
    out.push('}');
    out
}

/// Continue to the 1-based stop `stop`
fn goto(session: &mut Session, stop: usize) {
    while session.stop_index() + 1 < stop {
        session.continue_to_breakpoint().expect("continue failed");
    }
    assert_eq!(session.stop_index() + 1, stop);
}

#[test]
fn test_intint_map_at_every_stop() {
    for library in SUPPORTED {
        let mut s = launch(library);
        assert_eq!(value_of(&mut s, "ii"), expect_map(&[]), "{}", library);

        goto(&mut s, 2);
        assert_eq!(
            value_of(&mut s, "ii"),
            expect_map(&[("0", "0"), ("1", "1")]),
            "{}",
            library
        );

        goto(&mut s, 3);
        assert_eq!(
            value_of(&mut s, "ii"),
            expect_map(&[("0", "0"), ("1", "1"), ("2", "0"), ("3", "1")]),
            "{}",
            library
        );

        goto(&mut s, 4);
        assert_eq!(
            value_of(&mut s, "ii"),
            expect_map(&[
                ("0", "0"),
                ("1", "1"),
                ("2", "0"),
                ("3", "1"),
                ("4", "0"),
                ("5", "1"),
                ("6", "0"),
                ("7", "1"),
            ]),
            "{}",
            library
        );
        assert_eq!(value_of(&mut s, "it"), "(first = 0, second = 0)", "{}", library);
        assert_eq!(
            value_of(&mut s, "const_it"),
            "(first = 0, second = 0)",
            "{}",
            library
        );

        goto(&mut s, 5);
        assert_eq!(value_of(&mut s, "ii"), expect_map(&[]), "{}", library);
    }
}

#[test]
fn test_string_keyed_map_is_sorted() {
    for library in SUPPORTED {
        let mut s = launch(library);
        goto(&mut s, 5);
        assert_eq!(value_of(&mut s, "si"), expect_map(&[]), "{}", library);

        goto(&mut s, 6);
        assert_eq!(
            value_of(&mut s, "si"),
            expect_map(&[("\"zero\"", "0")]),
            "{}",
            library
        );

        goto(&mut s, 7);
        assert_eq!(
            value_of(&mut s, "si"),
            expect_map(&[
                ("\"one\"", "1"),
                ("\"three\"", "3"),
                ("\"two\"", "2"),
                ("\"zero\"", "0"),
            ]),
            "{}",
            library
        );

        goto(&mut s, 8);
        assert_eq!(value_of(&mut s, "si"), expect_map(&[]), "{}", library);
    }
}

#[test]
fn test_string_valued_maps() {
    for library in SUPPORTED {
        let mut s = launch(library);
        goto(&mut s, 9);
        assert_eq!(value_of(&mut s, "is"), expect_map(&[]), "{}", library);

        goto(&mut s, 10);
        assert_eq!(
            value_of(&mut s, "is"),
            expect_map(&[
                ("1", "\"is\""),
                ("2", "\"smart\""),
                ("3", "\"!!!\""),
                ("85", "\"goofy\""),
            ]),
            "{}",
            library
        );

        goto(&mut s, 11);
        assert_eq!(value_of(&mut s, "is"), expect_map(&[]), "{}", library);

        goto(&mut s, 13);
        assert_eq!(
            value_of(&mut s, "ss"),
            expect_map(&[
                ("\"casa\"", "\"house\""),
                ("\"ciao\"", "\"hello\""),
                ("\"gatto\"", "\"cat\""),
            ]),
            "{}",
            library
        );

        goto(&mut s, 14);
        assert_eq!(value_of(&mut s, "ss"), expect_map(&[]), "{}", library);
    }
}

#[test]
fn test_msvc_end_iterator() {
    let mut s = launch(StdLib::MsvcStl);
    goto(&mut s, 4);
    assert_eq!(value_of(&mut s, "it_end"), "end");
    assert_eq!(value_of(&mut s, "const_it_end"), "end");
}

#[test]
fn test_debug_mode_map_is_shown_empty() {
    let mut s = launch(StdLib::LibStdCxxDebug);
    goto(&mut s, 4);
    assert_eq!(value_of(&mut s, "ii"), "size=0 {}");
    assert!(!s.might_have_children("ii").unwrap());
}

#[test]
fn test_indexing_a_child() {
    for library in SUPPORTED {
        let mut s = launch(library);
        goto(&mut s, 4);
        let text = s.frame_variable("ii[7]").unwrap();
        assert!(
            text.ends_with(" ii[7] = (first = 7, second = 1)"),
            "{}: {}",
            library,
            text
        );
        assert!(text.starts_with("(std::pair<"), "{}: {}", library, text);
        assert!(matches!(
            s.frame_variable("ii[8]"),
            Err(SessionError::Formatter(_))
        ));
    }
}

#[test]
fn test_reverse_continue_rereads_memory() {
    for library in SUPPORTED {
        let mut s = launch(library);
        goto(&mut s, 3);
        assert!(value_of(&mut s, "ii").starts_with("size=4 {"));

        s.reverse_continue().unwrap();
        assert_eq!(
            value_of(&mut s, "ii"),
            expect_map(&[("0", "0"), ("1", "1")]),
            "{}",
            library
        );

        s.continue_to_breakpoint().unwrap();
        assert!(value_of(&mut s, "ii").starts_with("size=4 {"));
    }
}

#[test]
fn test_frame_change_keeps_results_stable() {
    let mut s = launch(StdLib::LibCxx);
    goto(&mut s, 2);
    let before = value_of(&mut s, "ii");

    s.select_frame(1).unwrap();
    assert!(s.frame_variable("ii").is_err());
    s.select_frame(0).unwrap();

    assert_eq!(value_of(&mut s, "ii"), before);
    assert_eq!(value_of(&mut s, "ii"), before);
}

#[test]
fn test_might_have_children_tracks_stops() {
    for library in SUPPORTED {
        let mut s = launch(library);
        assert!(!s.might_have_children("ii").unwrap(), "{}", library);
        goto(&mut s, 2);
        assert!(s.might_have_children("ii").unwrap(), "{}", library);
        goto(&mut s, 5);
        assert!(!s.might_have_children("ii").unwrap(), "{}", library);
    }
}

#[test]
fn test_small_child_limit_elides() {
    let mut config = SessionConfig::new(StdLib::LibStdCxx);
    config.formatter.max_children = 2;
    let mut s = Session::launch(config).unwrap();
    goto(&mut s, 4);
    assert_eq!(
        value_of(&mut s, "ii"),
        "size=8 {\n  [0] = (first = 0, second = 0)\n  [1] = (first = 1, second = 1)\n  ...\n}"
    );
}
