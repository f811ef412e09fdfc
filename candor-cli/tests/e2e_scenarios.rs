//! End-to-end scenario tests for the `candor` driver (spec.md §8.4).
//!
//! Each scenario is run three ways: plain, with `--collect-before-return`
//! (forces a collection between the script's return and reading its
//! result out of its handle), and with `--stress-gc` (forces a minor
//! collection before every single allocation the run performs). All
//! three must agree, proving the handle scope keeps results correctly
//! rooted and relocated across a moving collection triggered at any
//! point in the run.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write as _;

fn candor() -> Command {
    Command::cargo_bin("candor").unwrap()
}

fn script_file(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".cd").tempfile().unwrap();
    write!(file, "{source}").unwrap();
    file
}

/// Runs `source` under plain execution, `--collect-before-return`, and
/// `--stress-gc`, asserting `exit_code` in each case.
fn assert_exit_code_under_every_gc_mode(source: &str, exit_code: u8) {
    let file = script_file(source);
    candor().arg(file.path()).assert().code(exit_code as i32);

    let file = script_file(source);
    candor()
        .arg("--collect-before-return")
        .arg(file.path())
        .assert()
        .code(exit_code as i32);

    let file = script_file(source);
    candor().arg("--stress-gc").arg(file.path()).assert().code(exit_code as i32);
}

/// Runs a script that `print()`s its result under every GC mode,
/// asserting the printed text. Used for scenarios whose expected value
/// (a string or a boolean) doesn't survive `to_integer()`'s truncation
/// to an exit code.
fn assert_stdout_under_every_gc_mode(source: &str, expected: &str) {
    let file = script_file(source);
    candor()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(expected));

    let file = script_file(source);
    candor()
        .arg("--collect-before-return")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(expected));

    let file = script_file(source);
    candor()
        .arg("--stress-gc")
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(expected));
}

#[test]
fn scenario_1_arithmetic_precedence() {
    assert_exit_code_under_every_gc_mode("return 1 + 2 * 3", 7);
}

#[test]
fn scenario_2_object_literal_property_read() {
    assert_exit_code_under_every_gc_mode("a = {a:1,b:2,c:3}; return a.c", 3);
}

#[test]
fn scenario_3_array_assignment_and_sizeof() {
    assert_exit_code_under_every_gc_mode("a = []; a[3] = 4; return sizeof a", 4);
}

#[test]
fn scenario_4_closure_captures_and_mutates_a_shared_local() {
    assert_exit_code_under_every_gc_mode(
        "counter() { x = 0; return () { x = x + 1; return x } } c = counter(); c(); c(); return c()",
        3,
    );
}

#[test]
fn scenario_5_while_loop_with_post_decrement_condition() {
    assert_exit_code_under_every_gc_mode("i = 10; j = 0; while (i--) { j = j + 1 }; return j", 10);
}

#[test]
fn scenario_6_typeof_an_object_literal() {
    assert_stdout_under_every_gc_mode("print(typeof { }); return 0", "object");
}

#[test]
fn scenario_7_function_identity_equality() {
    assert_stdout_under_every_gc_mode("a() {}; print(a == a); return 0", "true");
}

#[test]
fn scenario_8_string_value_equality() {
    assert_stdout_under_every_gc_mode("print('abc' == 'abc'); return 0", "true");
}
