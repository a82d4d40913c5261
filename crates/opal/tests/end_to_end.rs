//! Black-box scenarios: compile a program, run it, compare print output.

use opal::{compile, CollectStringPrint, Vm};

/// Compiles and runs `source`, returning everything it printed.
fn run(source: &str) -> String {
    let program = compile(source).unwrap_or_else(|err| panic!("compile failed:\n{err}"));
    let mut print = CollectStringPrint::new();
    {
        let mut vm = Vm::new(program, &mut print);
        vm.run().unwrap_or_else(|err| panic!("runtime error: {err}"));
    }
    print.into_output()
}

/// Compiles and runs `source`, expecting a runtime error; returns its message.
fn run_err(source: &str) -> String {
    let program = compile(source).unwrap_or_else(|err| panic!("compile failed:\n{err}"));
    let mut print = CollectStringPrint::new();
    let err = {
        let mut vm = Vm::new(program, &mut print);
        vm.run().expect_err("expected a runtime error")
    };
    err.to_string()
}

mod closures {
    use super::*;

    #[test]
    fn closure_captures_mutable_local() {
        let out = run(
            "func make() { var c = 0; func inc() { c = c + 1; return c; } return inc; }\n\
             var f = make(); println(f()); println(f()); println(f());",
        );
        assert_eq!(out, "1\n2\n3\n");
    }

    #[test]
    fn upvalue_through_two_levels() {
        let out = run(
            "func outer() { var x = 7; func middle() { func inner() { return x; } return inner; } return middle; }\n\
             println(outer()()());",
        );
        assert_eq!(out, "7\n");
    }

    #[test]
    fn two_closures_over_one_function_share_nothing() {
        let out = run(
            "func make() { var c = 0; func inc() { c = c + 1; return c; } return inc; }\n\
             var a = make(); var b = make();\n\
             a(); a(); println(a()); println(b());",
        );
        assert_eq!(out, "3\n1\n");
    }

    #[test]
    fn anonymous_function_expression() {
        let out = run("var twice = func (x) { return x + x; }; println(twice(21));");
        assert_eq!(out, "42\n");
    }

    #[test]
    fn closure_name_method() {
        let out = run("func greet() { } println(greet.name());");
        assert_eq!(out, "greet\n");
    }
}

mod classes {
    use super::*;

    #[test]
    fn method_dispatch_on_two_classes() {
        let out = run(
            "class A { func greet() { return \"A\"; } }\n\
             class B { func hi() { return \"B\"; } }\n\
             var a = A(); println(a.greet()); var b = B(); println(b.hi());",
        );
        assert_eq!(out, "A\nB\n");
    }

    #[test]
    fn constructor_and_fields() {
        let out = run(
            "class Point { var x; var y; func Point(a, b) { x = a; y = b; } func sum() { return x + y; } }\n\
             var p = Point(3, 4);\n\
             println(p.sum()); println(p.x); println(p.y);",
        );
        assert_eq!(out, "7\n3\n4\n");
    }

    #[test]
    fn field_initializers_run_per_instance() {
        let out = run(
            "class K { var n = 5; func bump() { n = n + 1; return n; } }\n\
             var a = K(); var b = K();\n\
             a.bump(); println(a.bump()); println(b.n);",
        );
        assert_eq!(out, "7\n5\n");
    }

    #[test]
    fn field_assignment_through_accessor() {
        let out = run(
            "class Box { var v; }\n\
             var b = Box(); b.v = 12; println(b.v);",
        );
        assert_eq!(out, "12\n");
    }

    #[test]
    fn static_members() {
        let out = run(
            "class C {\n\
                 static var count = 0;\n\
                 static func bump() { count = count + 1; return count; }\n\
             }\n\
             C.bump(); println(C.bump()); println(C.count);\n\
             C.count = 10; println(C.count);",
        );
        assert_eq!(out, "2\n2\n10\n");
    }

    #[test]
    fn class_and_object_introspection() {
        let out = run(
            "class A { }\n\
             var a = A();\n\
             println(A.name()); println(a.class());",
        );
        assert_eq!(out, "A\n{class A}\n");
    }

    #[test]
    fn user_string_method_wins_in_println() {
        let out = run(
            "class P { func string() { return \"a point\"; } }\n\
             println(P());",
        );
        assert_eq!(out, "a point\n");
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn mixed_type_arithmetic_with_strings() {
        let out = run("println(1 + \" cat\"); println(1.5 + 2);");
        assert_eq!(out, "1 cat\n3.500000\n");
    }

    #[test]
    fn string_concatenation() {
        let out = run("println(\"ab\" + \"cd\"); println(\"n = \" + 4);");
        assert_eq!(out, "abcd\nn = 4\n");
    }

    #[test]
    fn integer_division_truncates() {
        let out = run("println(7 / 2); println(7 % 3);");
        assert_eq!(out, "3\n1\n");
    }

    #[test]
    fn comparisons_and_logic() {
        let out = run("println(1 < 2); println(2.5 >= 3); println(true && false); println(!false);");
        assert_eq!(out, "true\nfalse\nfalse\ntrue\n");
    }

    #[test]
    fn equality_dispatch() {
        let out = run(
            "println(1 == 1.0); println(\"a\" == \"a\"); println(\"a\" == \"b\"); println(true == true);",
        );
        assert_eq!(out, "true\ntrue\nfalse\ntrue\n");
    }

    #[test]
    fn unary_negation() {
        let out = run("println(-5); println(-1.5);");
        assert_eq!(out, "-5\n-1.500000\n");
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        assert_eq!(run_err("println(1 / 0);"), "Division by zero");
        assert_eq!(run_err("println(1 % 0);"), "Modulo by zero");
    }

    #[test]
    fn modulo_error_names_the_real_operand_types() {
        let message = run_err("println(7 % 2.5);");
        assert!(message.contains("'%': int and float"), "got: {message}");
        let message = run_err("println(7.5 % 2.5);");
        assert!(message.contains("'%': float and float"), "got: {message}");
    }
}

mod control_flow {
    use super::*;

    #[test]
    fn fibonacci() {
        let out = run("func fib(n){ if (n < 2) { return n; } return fib(n-1)+fib(n-2); } println(fib(10));");
        assert_eq!(out, "55\n");
    }

    #[test]
    fn else_if_chain() {
        let out = run(
            "func label(n) {\n\
                 if (n < 0) { return \"neg\"; }\n\
                 else if (n == 0) { return \"zero\"; }\n\
                 else { return \"pos\"; }\n\
             }\n\
             println(label(0 - 3)); println(label(0)); println(label(9));",
        );
        assert_eq!(out, "neg\nzero\npos\n");
    }

    #[test]
    fn while_loop() {
        let out = run("var n = 3; while (n > 0) { println(n); n = n - 1; }");
        assert_eq!(out, "3\n2\n1\n");
    }

    #[test]
    fn c_style_for() {
        let out = run("for (var i = 0; i < 3; i += 1) { println(i); }");
        assert_eq!(out, "0\n1\n2\n");
    }

    #[test]
    fn for_in_over_array() {
        let out = run("for x in [4, 5, 6] { println(x); }");
        assert_eq!(out, "4\n5\n6\n");
    }

    #[test]
    fn for_in_over_range() {
        let out = run("func f() { for i in 2..5 { println(i); } } f();");
        assert_eq!(out, "2\n3\n4\n");
    }

    #[test]
    fn compound_assignment() {
        let out = run("var x = 1; x += 2; x *= 3; println(x);");
        assert_eq!(out, "9\n");
    }
}

mod core_library {
    use super::*;

    #[test]
    fn array_map() {
        let out = run(
            "var xs = [1,2,3]; var ys = xs.map(func sq(x){ return x*x; }); println(ys.size()); println(ys.get(2));",
        );
        assert_eq!(out, "3\n9\n");
    }

    #[test]
    fn array_add_and_subscript() {
        let out = run(
            "var xs = [1, 2];\n\
             xs.add(3);\n\
             xs[0] = 9;\n\
             println(xs[0]); println(xs.size()); println(xs);",
        );
        assert_eq!(out, "9\n3\n[9, 2, 3]\n");
    }

    #[test]
    fn string_methods() {
        let out = run(
            "var s = \"hello\";\n\
             println(s.length()); println(s.charAt(1)); println(s.concat(\"!\"));\n\
             println(s.equals(\"hello\")); println(s[0]);",
        );
        assert_eq!(out, "5\ne\nhello!\ntrue\nh\n");
    }

    #[test]
    fn conversions() {
        let out = run(
            "println(Int(\"42\")); println(Int(3.9)); println(Float(2)); println(Bool(0)); println(String(17));",
        );
        assert_eq!(out, "42\n3\n2.000000\nfalse\n17\n");
    }

    #[test]
    fn array_constructor() {
        let out = run("var xs = Array(1, 2, 3); println(xs.size()); println(xs);");
        assert_eq!(out, "3\n[1, 2, 3]\n");
    }

    #[test]
    fn range_methods() {
        let out = run("var r = 1..4; println(r.size()); println(r.start()); println(r.end()); println(r[2]);");
        assert_eq!(out, "3\n1\n4\n3\n");
    }

    #[test]
    fn uninitialized_variable_is_null() {
        let out = run("var x; println(x);");
        assert_eq!(out, "null\n");
    }

    #[test]
    fn print_without_newline() {
        let out = run("print(\"a\"); print(\"b\"); println(\"c\");");
        assert_eq!(out, "abc\n");
    }

    #[test]
    fn builtin_reprs() {
        let out = run("func f() { } println(f); println(Int); println(println);");
        assert_eq!(out, "{func f}\n{class Int}\n{native func}\n");
    }
}

mod runtime_errors {
    use super::*;

    #[test]
    fn missing_property() {
        let message = run_err("class A { } var a = A(); println(a.missing);");
        assert!(message.contains("Undefined property 'missing'"), "got: {message}");
    }

    #[test]
    fn calling_a_non_callable() {
        let message = run_err("var x = 3; x();");
        assert!(message.contains("Cannot call a int value"), "got: {message}");
    }

    #[test]
    fn array_out_of_bounds() {
        let message = run_err("var xs = [1]; println(xs.get(4));");
        assert!(message.contains("out of range"), "got: {message}");
    }

    #[test]
    fn operator_type_mismatch() {
        let message = run_err("println([1] + 2);");
        assert!(message.contains("Unsupported operands"), "got: {message}");
    }

    #[test]
    fn non_bool_condition() {
        let message = run_err("if (1) { }");
        assert!(message.contains("Condition must be a bool"), "got: {message}");
    }

    #[test]
    fn bad_conversion() {
        let message = run_err("println(Int(\"pony\"));");
        assert!(message.contains("Cannot convert"), "got: {message}");
    }
}
