//! Parser edge-case tests.

use crate::{parse_program, AssignOp, BinOp, Expr, Stmt, UnaryOp};
use candor_util::{FileId, Handler};

fn parse_ok(source: &str) -> crate::Program {
    let handler = Handler::new();
    let program = parse_program(source, FileId::DUMMY, &handler);
    assert!(!handler.has_errors(), "unexpected parse errors for {source:?}");
    program.expect("parser returned None without reporting an error")
}

fn parse_err(source: &str) {
    let handler = Handler::new();
    let program = parse_program(source, FileId::DUMMY, &handler);
    assert!(
        handler.has_errors() || program.is_none(),
        "expected a parse error for {source:?}"
    );
}

#[test]
fn empty_source() {
    let program = parse_ok("");
    assert!(program.body.stmts.is_empty());
}

#[test]
fn arithmetic_precedence() {
    let program = parse_ok("return 1 + 2 * 3");
    match &program.body.stmts[0] {
        Stmt::Return(Some(Expr::Binary { op: BinOp::Add, rhs, .. }), _) => {
            assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
        }
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn object_literal_member_access() {
    let program = parse_ok("a = {a:1,b:2,c:3}; return a.c");
    assert_eq!(program.body.stmts.len(), 2);
    assert!(matches!(
        &program.body.stmts[0],
        Stmt::Expr(Expr::Assign { op: AssignOp::Assign, .. })
    ));
}

#[test]
fn array_index_assignment() {
    let program = parse_ok("a = []; a[3] = 4; return sizeof a");
    assert_eq!(program.body.stmts.len(), 3);
    match &program.body.stmts[2] {
        Stmt::Return(Some(Expr::Unary { op: UnaryOp::Sizeof, .. }), _) => {}
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn named_function_literal_and_nested_closure() {
    let program = parse_ok(
        "counter() { x = 0; return () { x = x + 1; return x } } \
         c = counter(); c(); c(); return c()",
    );
    match &program.body.stmts[0] {
        Stmt::Expr(Expr::Function(f)) => {
            assert!(f.name.is_some());
            assert!(f.params.is_empty());
        }
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn postfix_decrement_in_while_condition() {
    let program = parse_ok("i = 10; j = 0; while (i--) { j = j + 1 }; return j");
    assert!(matches!(&program.body.stmts[2], Stmt::While { .. }));
}

#[test]
fn anonymous_function_call() {
    let program = parse_ok("a() {}; return a == a");
    match &program.body.stmts[0] {
        Stmt::Expr(Expr::Function(f)) => assert_eq!(f.params.len(), 0),
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn grouping_not_mistaken_for_function_literal() {
    let program = parse_ok("return (1 + 2) * 3");
    match &program.body.stmts[0] {
        Stmt::Return(Some(Expr::Binary { op: BinOp::Mul, .. }), _) => {}
        other => panic!("unexpected ast: {other:?}"),
    }
}

#[test]
fn scope_declaration() {
    let program = parse_ok("scope { a, b } a = 1; return a");
    assert!(matches!(&program.body.stmts[0], Stmt::ScopeDecl(names, _) if names.len() == 2));
}

#[test]
fn if_else_chain() {
    let program = parse_ok("if (1) { return 1 } else if (2) { return 2 } else { return 3 }");
    assert!(matches!(&program.body.stmts[0], Stmt::If { else_branch: Some(_), .. }));
}

#[test]
fn unterminated_block_is_an_error() {
    parse_err("if (1) { return 1");
}

#[test]
fn missing_expression_is_an_error() {
    parse_err("return +");
}

#[test]
fn clone_and_delete_unary_forms() {
    let program = parse_ok("a = clone b; delete a.c; return a");
    assert!(matches!(&program.body.stmts[0], Stmt::Expr(Expr::Assign { .. })));
    assert!(matches!(&program.body.stmts[1], Stmt::Expr(Expr::Delete(..))));
}

#[test]
fn compound_assignment_operators() {
    let program = parse_ok("a = 1; a += 2; a -= 1; a *= 3; a /= 2; a %= 2; return a");
    assert!(matches!(
        &program.body.stmts[1],
        Stmt::Expr(Expr::Assign { op: AssignOp::AddAssign, .. })
    ));
}
