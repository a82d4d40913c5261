//! Tests for bytecode encoding limits and compiler invariants.
//!
//! Operands are single bytes: local slots and jump offsets top out at 255,
//! inline integer literals at 255 (larger ones go through the constant
//! pool), and constant pools are deduplicated.

use std::fmt::Write;

use opal::compile;

/// Generates a function with `count` local variables, then calls it.
fn generate_many_locals(count: usize) -> String {
    let mut code = String::from("func f() {\n");
    for i in 0..count {
        writeln!(code, "    var v{i} = {i};").unwrap();
    }
    writeln!(code, "    return v{};", count - 1).unwrap();
    code.push_str("}\nf();");
    code
}

/// Generates an if statement whose body emits roughly `stmts * 7` bytes.
fn generate_wide_branch(stmts: usize) -> String {
    let mut code = String::from("var x = 0;\nif (true) {\n");
    for _ in 0..stmts {
        code.push_str("    x = x + 1;\n");
    }
    code.push_str("}\n");
    code
}

mod local_limits {
    use super::*;

    #[test]
    fn locals_at_limit_compile() {
        let code = generate_many_locals(255);
        assert!(compile(&code).is_ok(), "255 locals should compile");
    }

    #[test]
    fn locals_over_limit_are_rejected() {
        let code = generate_many_locals(256);
        let err = compile(&code).expect_err("256 locals should be rejected");
        assert!(
            err.to_string().contains("Maximum number of local variables"),
            "unexpected message:\n{err}"
        );
    }
}

mod inline_int_limits {
    use super::*;

    #[test]
    fn small_int_uses_inline_load() {
        let program = compile("var a = 255;").unwrap();
        let listing = program.disassemble();
        assert!(
            listing.lines().any(|l| l.contains("loadi") && l.contains("255")),
            "expected loadi 255 in:\n{listing}"
        );
    }

    #[test]
    fn larger_int_is_promoted_to_the_pool() {
        let program = compile("var a = 256;").unwrap();
        let listing = program.disassemble();
        assert!(
            listing.lines().any(|l| l.contains("loadk") && l.contains("256")),
            "expected a pool load of 256 in:\n{listing}"
        );
        assert!(
            !listing.lines().any(|l| l.contains("loadi") && l.contains("256")),
            "256 must not be inlined:\n{listing}"
        );
    }
}

mod jump_limits {
    use super::*;

    #[test]
    fn branch_under_the_limit_compiles() {
        let code = generate_wide_branch(10);
        assert!(compile(&code).is_ok());
    }

    #[test]
    fn branch_over_the_limit_is_a_compile_error() {
        let code = generate_wide_branch(60);
        let err = compile(&code).expect_err("oversized branch should be rejected");
        assert!(
            err.to_string().contains("jump range"),
            "unexpected message:\n{err}"
        );
    }
}

mod constant_pool {
    use super::*;

    #[test]
    fn equal_constants_share_one_entry() {
        let program = compile("println(\"hi\"); println(\"hi\"); var a = 1300; var b = 1300;").unwrap();
        let pool = program.dump_constants();
        assert_eq!(pool.matches("\"hi\"").count(), 1, "pool:\n{pool}");
        assert_eq!(pool.matches("1300").count(), 1, "pool:\n{pool}");
    }

    #[test]
    fn distinct_constants_keep_distinct_entries() {
        let program = compile("var a = 1300; var b = 1301; var c = 1.0;").unwrap();
        let pool = program.dump_constants();
        assert!(pool.contains("1300"));
        assert!(pool.contains("1301"));
    }
}

mod determinism {
    use super::*;

    /// Compiling the same source twice produces byte-identical bytecode and
    /// constant pools.
    #[test]
    fn compilation_is_deterministic() {
        let source = "class P { var x = 1; func get() { return x; } }\n\
                      func make(n) { func inner() { return n; } return inner; }\n\
                      var p = P(); println(p.get()); println(make(3)());";
        let first = compile(source).unwrap();
        let second = compile(source).unwrap();
        assert_eq!(first.disassemble(), second.disassemble());
        assert_eq!(first.dump_constants(), second.dump_constants());
    }
}
