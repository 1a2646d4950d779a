//! Evaluator-level tests driving whole source lines.

use tacit_asm::Fault;

use crate::error::VmError;
use crate::Interpreter;

fn eval(vm: &mut Interpreter, src: &str) -> String {
    match vm.line(src) {
        Ok(text) => text.unwrap_or_default(),
        Err(error) => panic!("{src:?} failed: {error}"),
    }
}

fn fault(vm: &mut Interpreter, src: &str) -> (char, Fault) {
    match vm.line(src) {
        Err(VmError::Fault { glyph, fault }) => (glyph, fault),
        other => panic!("{src:?} should fault, got {other:?}"),
    }
}

#[test]
fn evaluation_is_right_to_left() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "2*3+4"), "14");
    assert_eq!(eval(&mut vm, "10-2-3"), "11");
    assert_eq!(eval(&mut vm, "(2*3)+4"), "10");
}

#[test]
fn negative_literals_and_negation() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "-3"), "-3");
    assert_eq!(eval(&mut vm, "2*-3"), "-6");
    assert_eq!(eval(&mut vm, "-(1+2)"), "-3");
}

#[test]
fn scalars_broadcast_over_arrays() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "1+!5"), "1 2 3 4 5");
    assert_eq!(eval(&mut vm, "(!5)+1"), "1 2 3 4 5");
    assert_eq!(eval(&mut vm, "2*1 2 3"), "2 4 6");
}

#[test]
fn type_promotion_widens() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "1+0.5"), "1.5");
    assert_eq!(eval(&mut vm, "1 2 3+0.5"), "1.5 2.5 3.5");
}

#[test]
fn reductions() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "+/!10"), "45");
    assert_eq!(eval(&mut vm, "|/3 9 4"), "9");
    assert_eq!(eval(&mut vm, "&/3 9 4"), "3");
    // The sum of an empty array is the type's zero.
    assert_eq!(eval(&mut vm, "+/0#0"), "0");
}

#[test]
fn assignment_is_silent_and_binds() {
    let mut vm = Interpreter::new(1);
    assert_eq!(vm.line("x:1 2 3").expect("assign"), None);
    assert_eq!(eval(&mut vm, "x+x"), "2 4 6");
    assert_eq!(vm.line("y:x:9").expect("chain"), None);
    assert_eq!(eval(&mut vm, "y"), "9");
}

#[test]
fn strings_catenate_and_print_verbatim() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "\"abc\",\"de\""), "abcde");
    assert_eq!(eval(&mut vm, "#\"abc\",\"de\""), "5");
}

#[test]
fn symbols_intern_and_compare() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "`ab"), "`ab");
    assert_eq!(eval(&mut vm, "`a `b `c"), "`a `b `c");
    assert_eq!(eval(&mut vm, "`a=`a"), "1");
    assert_eq!(eval(&mut vm, "`a=`b"), "0");
}

#[test]
fn indexing_by_juxtaposition_bracket_and_gather() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "x:10 20 30");
    assert_eq!(eval(&mut vm, "x 1"), "20");
    assert_eq!(eval(&mut vm, "x[2]"), "30");
    assert_eq!(eval(&mut vm, "x@0 2"), "10 30");
    assert_eq!(fault(&mut vm, "x 3"), ('@', Fault::Index));
    assert_eq!(fault(&mut vm, "x@-1"), ('@', Fault::Index));
}

#[test]
fn user_scopes_apply_monadically_and_dyadically() {
    let mut vm = Interpreter::new(1);
    assert_eq!(vm.line("a::{x+1}").expect("define"), None);
    assert_eq!(eval(&mut vm, "a 4"), "5");
    assert_eq!(eval(&mut vm, "a a 4"), "6");
    eval(&mut vm, "b::{x-y}");
    assert_eq!(eval(&mut vm, "10 b 3"), "7");
}

#[test]
fn scope_reentry_is_rejected() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "a::{a x}");
    assert_eq!(fault(&mut vm, "a 1"), ('a', Fault::InUse));
}

#[test]
fn unbound_names_fault() {
    let mut vm = Interpreter::new(1);
    assert_eq!(fault(&mut vm, "q").1, Fault::Parse);
}

#[test]
fn matrices_reshape_flip_and_project() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "m:2 2#1 2 3 4");
    assert_eq!(eval(&mut vm, "m"), "1 2\n3 4");
    assert_eq!(eval(&mut vm, "+m"), "1 3\n2 4");
    assert_eq!(eval(&mut vm, "=m"), "1 4");
    assert_eq!(eval(&mut vm, "#m"), "4");
    assert_eq!(eval(&mut vm, ",m"), "1 2 3 4");
    // Reshape cycles its source.
    assert_eq!(eval(&mut vm, "2 3#1 2"), "1 2 1\n2 1 2");
    assert_eq!(eval(&mut vm, "5#1 2 3"), "1 2 3 1 2");
}

#[test]
fn matrix_products() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "m:2 2#1.0 2.0 3.0 4.0");
    assert_eq!(eval(&mut vm, "m . m"), "7 10\n15 22");
    assert_eq!(eval(&mut vm, "m . 1.0 1.0"), "3 7");
    assert_eq!(eval(&mut vm, "1.0 1.0 . m"), "4 6");
    assert_eq!(eval(&mut vm, "1.0 2.0 . 3.0 4.0"), "11");
    assert_eq!(fault(&mut vm, "m . 1 1"), ('.', Fault::Type));
    assert_eq!(fault(&mut vm, "m . 1.0 1.0 1.0"), ('.', Fault::Rank));
}

#[test]
fn elementwise_shape_mismatches() {
    let mut vm = Interpreter::new(1);
    assert_eq!(fault(&mut vm, "1 2+1 2 3"), ('+', Fault::Length));
    eval(&mut vm, "m:2 2#1 2 3 4");
    assert_eq!(fault(&mut vm, "m+1 2 3 4"), ('+', Fault::Rank));
    assert_eq!(eval(&mut vm, "m+10"), "11 12\n13 14");
}

#[test]
fn casts_and_bits() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "`i$1.9 2.9"), "1 2");
    assert_eq!(eval(&mut vm, "`b$0 3 0"), "0 1 0");
    assert_eq!(eval(&mut vm, "+/`b$1 1 1 0"), "3");
    assert_eq!(eval(&mut vm, "~0 1 2"), "1 0 0");
    assert_eq!(eval(&mut vm, "`c$104 105"), "hi");
    assert_eq!(fault(&mut vm, "`q$1"), ('$', Fault::Domain));
}

#[test]
fn comparisons_yield_the_wider_type() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "3<5"), "1");
    assert_eq!(eval(&mut vm, "1 5 3<2 2 9"), "1 0 1");
    assert_eq!(eval(&mut vm, "1.0<2"), "1");
}

#[test]
fn division_and_modulo_identity() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "7%2"), "3");
    assert_eq!(eval(&mut vm, "7!2"), "1");
    assert_eq!(eval(&mut vm, "((7%2)*2)+7!2"), "7");
    assert_eq!(fault(&mut vm, "7!0"), ('!', Fault::Domain));
    assert_eq!(fault(&mut vm, "1 2 3%0"), ('%', Fault::Domain));
}

#[test]
fn grades_and_reverse() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "<3 1 2"), "1 2 0");
    assert_eq!(eval(&mut vm, ">3 1 2"), "0 2 1");
    assert_eq!(eval(&mut vm, "|1 2 3"), "3 2 1");
    assert_eq!(eval(&mut vm, "||1 2 3"), "1 2 3");
    // Gathering through the grade sorts.
    assert_eq!(eval(&mut vm, "x@<x:5 1 4"), "1 4 5");
}

#[test]
fn float_math_surface() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "*4"), "2");
    assert_eq!(eval(&mut vm, "^0"), "1");
    assert_eq!(eval(&mut vm, "%2"), "0.5");
    assert_eq!(eval(&mut vm, "&-3"), "3");
    assert_eq!(fault(&mut vm, "*-1"), ('*', Fault::Domain));
}

#[test]
fn softmax_and_norm_have_the_right_shape() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "#'1.0 2.0 3.0"), "3");
    assert_eq!(eval(&mut vm, "+/'5.0 5.0"), "1");
    assert_eq!(eval(&mut vm, "$4.0 4.0"), "1 1");
    assert_eq!(eval(&mut vm, "$0.0 0.0"), "0 0");
}

#[test]
fn random_is_deterministic_per_session() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "#?7"), "7");
    let mut a = Interpreter::new(1);
    let mut b = Interpreter::new(1);
    assert_eq!(eval(&mut a, "?4"), eval(&mut b, "?4"));
}

#[test]
fn mixed_arrays_flatten_their_elements() {
    let mut vm = Interpreter::new(1);
    assert_eq!(eval(&mut vm, "1,`a"), "1 `a");
    assert_eq!(eval(&mut vm, "(1 2 3),`a"), "1 2 3 `a");
    assert_eq!(eval(&mut vm, "#(1 2 3),`a"), "4");
    assert_eq!(eval(&mut vm, "((1 2),`a)@2"), "`a");
}

#[test]
fn worker_split_matches_the_serial_path() {
    let mut serial = Interpreter::new(1);
    let mut parallel = Interpreter::new(4);
    for src in [
        "+/x*x:`f$!10000",
        "+/x+x:!50000",
        "m . m:50 50#`f$!100",
        "+/,'m:40 64#`f$!256",
    ] {
        assert_eq!(eval(&mut serial, src), eval(&mut parallel, src), "{src}");
    }
}

#[test]
fn teardown_returns_every_handle() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "x:!1000");
    eval(&mut vm, "y:2 8#`f$!16");
    eval(&mut vm, "z:x,`a");
    eval(&mut vm, "a::{x+1}");
    eval(&mut vm, "a 4");
    assert!(vm.live_handles() > 0);
    vm.reset();
    assert_eq!(vm.live_handles(), 0);
    assert_eq!(vm.heap_bytes(), 0);
}

#[test]
fn errors_release_partial_intermediates() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "x:!10");
    let before = vm.live_handles();
    assert_eq!(fault(&mut vm, "(1+x)+(x,x)@20 0").1, Fault::Index);
    // After a fault only the literal slots of the failing line remain;
    // re-binding x exercises release of the old value too.
    eval(&mut vm, "x:!3");
    vm.reset();
    assert_eq!(vm.live_handles(), 0);
    let _ = before;
}

#[test]
fn assignments_never_leave_partial_state_on_error() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "x:42");
    assert_eq!(fault(&mut vm, "x:1%0").1, Fault::Domain);
    assert_eq!(eval(&mut vm, "x"), "42");
}
