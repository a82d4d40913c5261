//! Compile-time diagnostics: format, recovery, and the error taxonomy.

use opal::compile;

fn compile_err(source: &str) -> (usize, String) {
    let err = compile(source).expect_err("expected compile errors");
    (err.count, err.to_string())
}

#[test]
fn diagnostic_format_has_line_excerpt_and_caret() {
    let (count, rendered) = compile_err("var x = 1\nvar y = oops + 1\n");
    assert_eq!(count, 1);
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[0], "line 2: error: Undeclared identifier oops");
    assert!(lines[1].contains("var y = oops + 1"));
    // The caret points at the offending column.
    assert_eq!(lines[2].trim_end(), format!("{}^", " ".repeat(8 + 8)));
}

#[test]
fn lexical_errors_are_counted_and_reported() {
    let (count, rendered) = compile_err("var @ = 1;");
    assert!(count >= 1);
    assert!(rendered.contains("Unrecognized character '@'"), "got:\n{rendered}");
}

#[test]
fn unterminated_string() {
    let (_, rendered) = compile_err("var s = \"oops");
    assert!(rendered.contains("Unterminated string literal"), "got:\n{rendered}");
}

#[test]
fn parser_recovers_and_reports_every_error() {
    let (count, _) = compile_err("var = 1;\nvar y = ;\n");
    assert!(count >= 2, "expected both errors, got {count}");
}

#[test]
fn missing_token_message_names_the_expectation() {
    let (_, rendered) = compile_err("if (true { println(1); }");
    assert!(rendered.contains("Expected ')'"), "got:\n{rendered}");
}

#[test]
fn invalid_assignment_target() {
    let (_, rendered) = compile_err("func f() { } f() = 3;");
    assert!(rendered.contains("Invalid assignment target"), "got:\n{rendered}");
}

#[test]
fn compound_assignment_with_call_in_target() {
    let (_, rendered) = compile_err("class A { } var a = A(); a.get().x += 1;");
    assert!(
        rendered.contains("Compound assignment target must not contain a call"),
        "got:\n{rendered}"
    );
}

#[test]
fn duplicate_declarations() {
    let (_, rendered) = compile_err("var a = 1; var a = 2;");
    assert!(rendered.contains("a is already defined"), "got:\n{rendered}");

    let (_, rendered) = compile_err("func f() { var b = 1; var b = 2; } f();");
    assert!(rendered.contains("Variable b is already defined"), "got:\n{rendered}");
}

#[test]
fn undeclared_identifier() {
    let (_, rendered) = compile_err("println(ghost);");
    assert!(rendered.contains("Undeclared identifier ghost"), "got:\n{rendered}");
}

#[test]
fn class_body_rejects_statements() {
    let (_, rendered) = compile_err("class C { println(1); }");
    assert!(
        rendered.contains("Class declarations must be a variable or function"),
        "got:\n{rendered}"
    );
}

#[test]
fn static_outside_a_class() {
    let (_, rendered) = compile_err("static var n = 1;");
    assert!(
        rendered.contains("'static' is only allowed inside a class body"),
        "got:\n{rendered}"
    );
}

#[test]
fn instance_member_from_static_method() {
    let (_, rendered) = compile_err("class C { var x; static func f() { return x; } }");
    assert!(rendered.contains("Cannot reference instance member x"), "got:\n{rendered}");
}

#[test]
fn builtin_names_cannot_be_redeclared() {
    let (_, rendered) = compile_err("var println = 1;");
    assert!(rendered.contains("println is already defined"), "got:\n{rendered}");
}
