use cminus::{compile, Options};
use runtime::{Machine, VmError};

fn run_with(source: &str, input: &str, options: Options) -> Result<(Option<i32>, String), VmError> {
    let compilation = compile(source.as_bytes(), "test.cm", options).unwrap();

    let mut output = Vec::new();
    let mut machine = Machine::new(&compilation.image, input.as_bytes(), &mut output).seed(42);
    let result = machine.run();
    drop(machine);

    Ok((result?, String::from_utf8(output).unwrap()))
}

fn run(source: &str, input: &str) -> (Option<i32>, String) {
    run_with(source, input, Options::empty()).unwrap()
}

fn result(source: &str) -> i32 {
    run(source, "").0.unwrap()
}

fn first_error(source: &str) -> String {
    let diagnostics = compile(source.as_bytes(), "test.cm", Options::empty()).unwrap_err();
    assert_eq!(diagnostics.len(), 1);

    let message = diagnostics.messages().next().unwrap();
    message
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(result("int main() { int x = 2 + 3 * 4; return x; }"), 14);
    assert_eq!(result("int main() { return 7 :<: 3 + 1 :>: 2; }"), 4);
    assert_eq!(result("int main() { return 17 % 5 - -2; }"), 4);
}

#[test]
fn for_loop_with_step() {
    let source = "
        int main() {
            int s;
            s = 0;
            for i = 1 to 9 by 2 do
                s += i;

            return s;
        }
    ";

    assert_eq!(result(source), 25);
}

#[test]
fn random_stays_in_range() {
    let source = "
        int main() {
            int ok;
            ok = 1;

            for i = 1 to 50 do {
                if ?10 < 0 or ?10 >= 10 then ok = 0;
                if ?(-5) > 0 or ?(-5) <= -5 then ok = 0;
            }

            return ok;
        }
    ";

    assert_eq!(result(source), 1);
}

#[test]
fn array_copy() {
    let source = "
        int main() {
            int a[3];
            int b[2];

            b[0] = 4;
            b[1] = 5;
            a[2] = 9;
            a = b;

            return a[0] * 100 + a[1] * 10 + a[2];
        }
    ";

    assert_eq!(result(source), 459);

    let error = first_error("main() { int a[2], b[2]; a += b; }");
    assert!(error.contains("must be `=`"), "{}", error);
}

#[test]
fn arrays_are_passed_by_reference() {
    let source = "
        fill(int v[]; int x) {
            for i = 0 to *v - 1 do
                v[i] = x;
        }

        int main() {
            int a[4];
            fill(a, 3);
            return a[0] + a[3] + *a;
        }
    ";

    assert_eq!(result(source), 10);
}

#[test]
fn implicit_returns() {
    let source = "
        char c() { }
        int z() { }

        int main() {
            if c() == '.' and z() == 0 then
                return 1;

            return 2;
        }
    ";

    assert_eq!(result(source), 1);
}

#[test]
fn recursion() {
    let source = "
        int fact(int n) {
            if n <= 1 then
                return 1;

            return n * fact(n - 1);
        }

        int main() { return fact(5); }
    ";

    assert_eq!(result(source), 120);
}

#[test]
fn print_by_type_and_format() {
    let source = r#"
        main() {
            print("n={0} b={1} c={2}\n", 42, true, 'z');
            print(7);
            print(false);
            print('q');
            print("\n");
        }
    "#;

    let (status, output) = run(source, "");
    assert_eq!(status, None);
    assert_eq!(output, "n=42 b=True c=z\n7Falseq\n");
}

#[test]
fn shadowing_and_redefinition() {
    let source = "
        int x : 1;

        int main() {
            int r;
            r = x;

            {
                int x;
                x = 10;
                r = r + x;
            }

            return r + x;
        }
    ";

    assert_eq!(result(source), 12);

    let error = first_error("main() { int a; int a; }");
    assert!(error.contains("already declared"), "{}", error);
}

#[test]
fn put_reads_typed_lines() {
    let source = "
        int main() {
            int n, a[2];
            bool b;
            char c;

            put(n, b, c, a[1]);
            if b and c == 'A' then
                return n + a[1];

            return 0;
        }
    ";

    let (status, _) = run(source, "5\nTRUE\nA\n 7 \n");
    assert_eq!(status, Some(12));

    let error = run_with(source, "5\nmaybe\n", Options::empty()).unwrap_err();
    assert!(matches!(error, VmError::BadInput(..)));
}

#[test]
fn break_leaves_innermost_loop() {
    let source = "
        int main() {
            int i, s;
            i = 0;

            while true do {
                i++;
                if i == 4 then break;
            }

            for j = 1 to 100 do {
                if j == 7 then break;
                s = j;
            }

            return i * 10 + s;
        }
    ";

    assert_eq!(result(source), 46);
}

#[test]
fn static_locals_keep_their_value() {
    let source = "
        int counter() {
            static int n : 10;
            n++;
            return n;
        }

        int main() {
            counter();
            counter();
            return counter();
        }
    ";

    assert_eq!(result(source), 13);
}

#[test]
fn compound_assignment_side_effects() {
    let source = "
        int g : 0;

        int bump() {
            g++;
            return 1;
        }

        int main() {
            int a;
            a = 10;
            a -= bump();
            return a * 10 + g;
        }
    ";

    assert_eq!(run_with(source, "", Options::empty()).unwrap().0, Some(91));
    assert_eq!(run_with(source, "", Options::LEGACY_COMPOUND).unwrap().0, Some(92));
}

#[test]
fn program_without_main_runs_placeholder() {
    let (status, output) = run("int f() { return 3; }", "");

    assert_eq!(status, None);
    assert!(output.is_empty());
}

#[test]
fn errors_are_located() {
    let diagnostics = compile(&b"main() {\n  y = 1;\n}\n"[..], "test.cm", Options::empty()).unwrap_err();
    let report = diagnostics.to_string();

    assert!(report.starts_with("semantic error: `y` is not declared in this scope"), "{}", report);
    assert!(report.contains(" --> test.cm:"), "{}", report);
    assert!(report.contains("|   y = 1;"), "{}", report);
    assert!(report.contains("Build failed with 1 error"), "{}", report);

    let diagnostics = compile(&b"int a @ 1;\n"[..], "test.cm", Options::empty()).unwrap_err();
    assert!(diagnostics.to_string().starts_with("lexical error"));
}

#[test]
fn deep_recursion_runs_on_heap_frames() {
    let source = "
        int depth(int n) {
            if n == 0 then
                return 0;

            return 1 + depth(n - 1);
        }

        int main() { return depth(1000); }
    ";

    assert_eq!(result(source), 1000);

    let runaway = "int f(int n) { return f(n + 1); } int main() { return f(0); }";
    let error = run_with(runaway, "", Options::empty()).unwrap_err();
    assert!(matches!(error, VmError::StackOverflow));
}

#[test]
fn for_bound_and_step_are_reevaluated() {
    let source = "
        int main() {
            int n, s, c;
            n = 10;
            s = 1;
            c = 0;

            for i = 1 to n by s do {
                n = 3;
                s = 1;
                c++;
            }

            return c;
        }
    ";

    assert_eq!(result(source), 3);

    let stepped = "
        int main() {
            int s, c;
            s = 1;
            c = 0;

            for i = 0 to 20 by s do {
                s = s * 2;
                c++;
            }

            return c;
        }
    ";

    // i = 0, 2, 6, 14
    assert_eq!(result(stepped), 4);
}
