//! End-to-end pipeline tests: source text through parser, compiler,
//! image round-trip, and VM, asserting on captured program output.

use std::io::Cursor;

use abc_drv::compile_source;
use abc_img::{ReadImageExt, WriteImageExt};
use abc_vm::Vm;

/// Compile, round-trip through the image format, execute, and return
/// the program's output.
fn run_program(source: &str) -> String {
    let program = compile_source(source).expect("program should compile");

    // The image is the persistence contract; every run exercises it.
    let mut image = Vec::new();
    image.write_image(&program).expect("image should serialize");
    let loaded = image.as_slice().read_image().expect("image should load");
    assert_eq!(loaded, program);

    let mut out = Vec::new();
    {
        let mut vm = Vm::with_io(&loaded, &mut out, Cursor::new(""));
        vm.run();
    }
    String::from_utf8(out).expect("output is UTF-8")
}

#[test]
fn test_hello() {
    assert_eq!(run_program("10 PRINT \"HELLO\"\n"), "HELLO\n");
}

#[test]
fn test_arithmetic_print_spacing() {
    assert_eq!(run_program("10 PRINT 2+3\n"), " 5\n");
}

#[test]
fn test_for_loop() {
    assert_eq!(
        run_program("10 FOR I=1 TO 3 : PRINT I : NEXT I\n"),
        " 1\n 2\n 3\n"
    );
}

#[test]
fn test_gosub_and_return() {
    assert_eq!(
        run_program("10 GOSUB 100 : END\n100 PRINT \"SUB\" : RETURN\n"),
        "SUB\n"
    );
}

#[test]
fn test_data_read() {
    assert_eq!(
        run_program("10 DATA 1,\"A\",,3\n20 READ A,B$,C,D : PRINT A;B$;C;D\n"),
        " 1 A 0 3\n"
    );
}

#[test]
fn test_trap_catches_then_disarms() {
    assert_eq!(
        run_program("10 TRAP 100 : PRINT 1/0 : END\n100 PRINT \"CAUGHT\"\n"),
        "CAUGHT\n"
    );
    // One-shot: a second error after the handler halts the program.
    assert_eq!(
        run_program(concat!(
            "10 TRAP 100 : PRINT 1/0 : END\n",
            "100 PRINT \"CAUGHT\" : PRINT 1/0 : PRINT \"NOPE\"\n",
        )),
        "CAUGHT\n"
    );
}

#[test]
fn test_larger_program_sieve() {
    // A small sieve exercising DIM, nested control flow, and arrays.
    let source = concat!(
        "10 DIM F(30)\n",
        "20 FOR I=2 TO 30\n",
        "30 IF F(I)=1 THEN 70\n",
        "40 PRINT I;\n",
        "50 FOR J=I TO 30 STEP I\n",
        "60 F(J)=1 : NEXT J\n",
        "70 NEXT I\n",
        "80 PRINT\n",
    );
    // Every number carries its sign-field space and, mid-line, a
    // trailing space.
    assert_eq!(run_program(source), " 2 3 5 7 11 13 17 19 23 29 \n");
}

#[test]
fn test_string_program() {
    let source = concat!(
        "10 A$=\"BASIC\"\n",
        "20 FOR I=1 TO LEN(A$)\n",
        "30 PRINT MID$(A$,I,1);\n",
        "40 NEXT I\n",
        "50 PRINT\n",
    );
    assert_eq!(run_program(source), "BASIC\n");
}

#[test]
fn test_parse_error_stops_pipeline() {
    let err = compile_source("10 FROB 1\n").unwrap_err();
    assert!(err.to_string().contains("Compilation failed with 1 error"));
}

#[test]
fn test_input_drives_program() {
    let program = compile_source("10 INPUT A,B : PRINT A*B\n").unwrap();
    let mut out = Vec::new();
    {
        let mut vm = Vm::with_io(&program, &mut out, Cursor::new("6,7\n"));
        vm.run();
    }
    assert_eq!(String::from_utf8(out).unwrap(), "? 6,7\n 42\n");
}
