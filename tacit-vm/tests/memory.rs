//! Memory discipline and algebraic invariants of the value model.

use quickcheck_macros::quickcheck;
use tacit_vm::Interpreter;

fn eval(vm: &mut Interpreter, src: &str) -> String {
    vm.line(src)
        .unwrap_or_else(|error| panic!("{src:?} failed: {error}"))
        .unwrap_or_default()
}

fn strand(values: &[i16]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cap quickcheck strands so printed rows stay under the display width.
fn capped(values: &[i16]) -> &[i16] {
    &values[..values.len().min(20)]
}

#[test]
fn teardown_restores_every_handle_and_block() {
    let mut vm = Interpreter::new(1);
    eval(&mut vm, "x:!10000");
    eval(&mut vm, "y:`f$x");
    eval(&mut vm, "z:y,`tag");
    eval(&mut vm, "m:64 64#`b$1+x");
    eval(&mut vm, "f::{x*x}; f 12");
    assert!(vm.live_handles() > 0);
    assert!(vm.heap_bytes() > 0);
    vm.reset();
    assert_eq!(vm.live_handles(), 0);
    assert_eq!(vm.heap_bytes(), 0);
}

#[test]
fn rebinding_releases_the_old_value() {
    let mut vm = Interpreter::new(1);
    for _ in 0..500 {
        eval(&mut vm, "x:!4096");
    }
    // One binding live; the churn must all have been recycled.
    assert_eq!(vm.live_handles(), 1);
    vm.reset();
    assert_eq!(vm.live_handles(), 0);
}

#[quickcheck]
fn broadcast_matches_per_element(x: i16, values: Vec<i16>) -> bool {
    let values = capped(&values);
    if values.is_empty() {
        return true;
    }
    let mut vm = Interpreter::new(1);
    let array = strand(values);
    let broadcast = eval(&mut vm, &format!("{x}+{array}"));
    let flipped = eval(&mut vm, &format!("({array})+{x}"));
    let expected = values
        .iter()
        .map(|&v| (i32::from(x) + i32::from(v)).to_string())
        .collect::<Vec<_>>()
        .join(" ");
    broadcast == expected && flipped == expected
}

#[quickcheck]
fn reverse_twice_is_identity(values: Vec<i16>) -> bool {
    let values = capped(&values);
    if values.is_empty() {
        return true;
    }
    let mut vm = Interpreter::new(1);
    let array = strand(values);
    let twice = eval(&mut vm, &format!("||{array}"));
    let plain = eval(&mut vm, &array);
    twice == plain
}

#[quickcheck]
fn division_identity(values: Vec<i16>, divisor: u16) -> bool {
    let values = capped(&values);
    if values.is_empty() {
        return true;
    }
    let divisor = i32::from(divisor % (1 << 15)).max(1);
    let mut vm = Interpreter::new(1);
    let array = strand(values);
    let rebuilt = eval(
        &mut vm,
        &format!("(({array})!{divisor})+{divisor}*({array})%{divisor}"),
    );
    let plain = eval(&mut vm, &array);
    rebuilt == plain
}

#[quickcheck]
fn sessions_release_everything(lines: Vec<u8>) -> bool {
    // A pseudo-random workload of allocating expressions; whatever the
    // mix, teardown must return every handle.
    let menu = [
        "x:!100",
        "y:(!3),!5",
        "z:`f$!50",
        "w:|!9",
        "v:3 5#!7",
        "u:\"hello\",\"world\"",
        "t:(`f$!5),`s",
    ];
    let mut vm = Interpreter::new(1);
    for pick in lines {
        eval(&mut vm, menu[pick as usize % menu.len()]);
    }
    vm.reset();
    vm.live_handles() == 0
}
