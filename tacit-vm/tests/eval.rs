//! End-to-end scenarios: one input line in, printed bytes out.

use tacit_vm::{Outcome, Repl};

fn run(repl: &mut Repl, src: &str) -> (Outcome, String) {
    let mut out = Vec::new();
    let outcome = repl.line(src, &mut out).expect("write to vec");
    (outcome, String::from_utf8(out).expect("utf8 output"))
}

fn printed(repl: &mut Repl, src: &str) -> String {
    let (outcome, text) = run(repl, src);
    assert_eq!(outcome, Outcome::Continue, "{src:?}");
    text
}

#[rstest::rstest]
#[case::sum_over_iota("+/!10", "45\n")]
#[case::right_to_left("2*3+4", "14\n")]
#[case::assign_then_use("x:1 2 3; x+x", "2 4 6\n")]
#[case::string_catenation("\"abc\",\"de\"", "abcde\n")]
#[case::scope_application("a::{x+1}; a 4", "5\n")]
fn scenario(#[case] src: &str, #[case] want: &str) {
    let mut repl = Repl::new(1);
    assert_eq!(printed(&mut repl, src), want);
}

#[test]
fn timing_prints_a_non_negative_integer() {
    let mut repl = Repl::new(1);
    let text = printed(&mut repl, "\\t 100 +/!1000");
    let value: u64 = text.trim().parse().expect("one integer");
    let _ = value; // any non-negative count is acceptable
}

#[test]
fn quit_is_clean() {
    let mut repl = Repl::new(1);
    assert_eq!(run(&mut repl, "\\q").0, Outcome::Quit);
}

#[test]
fn errors_print_glyph_and_token_then_resume() {
    let mut repl = Repl::new(1);
    assert_eq!(printed(&mut repl, "1%0"), "% dom\n");
    assert_eq!(printed(&mut repl, "1 2+1 2 3"), "+ len\n");
    assert_eq!(printed(&mut repl, "2 2#1.0 2.0 3.0 4.0 . 1 2"), ". typ\n");
    // The session survives every recoverable fault.
    assert_eq!(printed(&mut repl, "1+1"), "2\n");
}

#[test]
fn scripts_load_like_typed_lines() {
    let dir = std::env::temp_dir().join(format!("tacit-script-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    let path = dir.join("demo.tc");
    std::fs::write(&path, "/ a demo script\nx:21\nx+x\n").expect("write script");

    let mut repl = Repl::new(1);
    let mut out = Vec::new();
    let outcome = repl.load(&path, &mut out).expect("load");
    assert_eq!(outcome, Outcome::Continue);
    assert_eq!(String::from_utf8(out).expect("utf8"), "42\n");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn worker_count_does_not_change_results() {
    let mut narrow = Repl::new(1);
    let mut wide = Repl::new(8);
    for src in ["+/x*x:`f$!30000", "m . +m:20 100#`f$!2000"] {
        assert_eq!(printed(&mut narrow, src), printed(&mut wide, src), "{src}");
    }
}
