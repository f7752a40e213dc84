#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

use laze_lang::interner::InternedStr;
use laze_lang::program::{
    EvalErrorKind, EvalStackTraceItem, ImportError, NativeError, Program, Thunk, Value,
};
use laze_lang::span::SpanId;

pub(crate) struct TestCallbacks;

impl TestCallbacks {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn init_native_funcs(&mut self, program: &mut Program) {
        program.register_native_func(program.intern_str("returnNum"), &[]);
        program.register_native_func(
            program.intern_str("isString"),
            &[program.intern_str("value")],
        );
        program.register_native_func(
            program.intern_str("lastItemOfFirst"),
            &[program.intern_str("array")],
        );
        program.register_native_func(program.intern_str("failure"), &[]);
    }
}

impl laze_lang::program::Callbacks for TestCallbacks {
    fn import(
        &mut self,
        _program: &mut Program,
        _from: SpanId,
        _path: &str,
    ) -> Result<Thunk, ImportError> {
        unimplemented!();
    }

    fn import_str(
        &mut self,
        _program: &mut Program,
        _from: SpanId,
        _path: &str,
    ) -> Result<String, ImportError> {
        unimplemented!();
    }

    fn import_bin(
        &mut self,
        _program: &mut Program,
        _from: SpanId,
        _path: &str,
    ) -> Result<Vec<u8>, ImportError> {
        unimplemented!();
    }

    fn trace(&mut self, _program: &mut Program, _message: &str, _stack: &[EvalStackTraceItem]) {}

    fn native_call(
        &mut self,
        _program: &mut Program,
        name: &InternedStr,
        args: &[Value],
    ) -> Result<Value, NativeError> {
        match name.value() {
            "returnNum" => {
                assert!(args.is_empty());
                Ok(Value::number(1234.0))
            }
            "isString" => {
                let [arg] = args else {
                    unreachable!();
                };
                Ok(Value::bool(arg.is_string()))
            }
            "lastItemOfFirst" => {
                let [arg] = args else {
                    unreachable!();
                };
                if let Some(root_items) = arg.to_array() {
                    if let Some(first_items) = root_items.first().and_then(Value::to_array) {
                        first_items.last().ok_or(NativeError).cloned()
                    } else {
                        Err(NativeError)
                    }
                } else {
                    Err(NativeError)
                }
            }
            "failure" => Err(NativeError),
            _ => unreachable!(),
        }
    }
}

#[test]
fn test_value_types() {
    #[track_caller]
    pub(crate) fn test(input: &[u8], check: impl FnOnce(Value)) {
        let mut program = Program::new();
        let mut callbacks = TestCallbacks::new();

        let (span_ctx, _) = program
            .span_manager_mut()
            .insert_source_context(input.len());

        let thunk = program
            .load_source(span_ctx, input, true, "test.jsonnet")
            .unwrap();

        let value = program.eval_value(&thunk, &mut callbacks).unwrap();
        check(value);
    }

    test(b"null", |value| {
        assert!(value.is_null());
    });
    test(b"true", |value| {
        assert_eq!(value.as_bool(), Some(true));
    });
    test(b"false", |value| {
        assert_eq!(value.as_bool(), Some(false));
    });
    test(b"1.50", |value| {
        assert_eq!(value.as_number(), Some(1.5));
    });
    test(b"\"string\"", |value| {
        assert_eq!(value.to_string(), Some("string".into()));
    });
    test(b"[]", |value| {
        let items = value.to_array().unwrap();
        assert!(items.is_empty());
    });
    test(b"[true, false]", |value| {
        let items = value.to_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_bool(), Some(true));
        assert_eq!(items[1].as_bool(), Some(false));
    });
    test(b"{}", |value| {
        let fields = value.to_object().unwrap();
        assert!(fields.is_empty());
    });
    test(b"{y: true, x: false}", |value| {
        let fields = value.to_object().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].0.value(), "x");
        assert_eq!(fields[0].1.as_bool(), Some(false));
        assert_eq!(fields[1].0.value(), "y");
        assert_eq!(fields[1].1.as_bool(), Some(true));
    });
}

#[test]
fn test_manifest_single_line() {
    #[track_caller]
    fn test(input: &[u8], expected_result: &str) {
        let mut program = Program::new();
        let mut callbacks = TestCallbacks::new();

        let (span_ctx, _) = program
            .span_manager_mut()
            .insert_source_context(input.len());

        let thunk = program
            .load_source(span_ctx, input, true, "test.jsonnet")
            .unwrap();

        let value = program.eval_value(&thunk, &mut callbacks).unwrap();
        let result = program.manifest_json(&value, false);
        let result = result.unwrap();
        assert_eq!(result, expected_result);
    }

    test(b"null", "null");
    test(b"true", "true");
    test(b"false", "false");
    test(b"0", "0");
    test(b"-0", "-0");
    test(b"1.5", "1.5");
    test(b"\"string\"", "\"string\"");
    test(b"[]", "[ ]");
    test(b"[[]]", "[[ ]]");
    test(b"[[1, 2]]", "[[1, 2]]");
    test(b"[1, 2, 3]", "[1, 2, 3]");
    test(b"{}", "{ }");
    test(b"{a: 1, b: 2}", "{\"a\": 1, \"b\": 2}");
    test(b"{a: 1, b:: 2, c::: 3}", "{\"a\": 1, \"c\": 3}");
    test(b"{a: {}}", "{\"a\": { }}");
    test(b"{a: {b: 1}}", "{\"a\": {\"b\": 1}}");
    test(b"{a:: error \"err\"}", "{ }");
}

#[test]
fn test_manifest_multi_line() {
    #[track_caller]
    fn test(input: &[u8], expected_result: &str) {
        let mut program = Program::new();
        let mut callbacks = TestCallbacks::new();

        let (span_ctx, _) = program
            .span_manager_mut()
            .insert_source_context(input.len());

        let thunk = program
            .load_source(span_ctx, input, true, "test.jsonnet")
            .unwrap();

        let value = program.eval_value(&thunk, &mut callbacks).unwrap();
        let result = program.manifest_json(&value, true);
        let result = result.unwrap();
        assert_eq!(result, expected_result);
    }

    test(b"null", "null");
    test(b"true", "true");
    test(b"false", "false");
    test(b"0", "0");
    test(b"-0", "-0");
    test(b"1.5", "1.5");
    test(b"\"string\"", "\"string\"");
    test(b"[]", "[ ]");
    test(b"[1, 2, 3]", "[\n   1,\n   2,\n   3\n]");
    test(b"[[]]", "[\n   [ ]\n]");
    test(b"[[1, 2]]", "[\n   [\n      1,\n      2\n   ]\n]");
    test(b"{}", "{ }");
    test(b"{a: 1, b: 2}", "{\n   \"a\": 1,\n   \"b\": 2\n}");
    test(b"{a: 1, b:: 2, c::: 3}", "{\n   \"a\": 1,\n   \"c\": 3\n}");
    test(b"{a: {}}", "{\n   \"a\": { }\n}");
    test(b"{a: {b: 1}}", "{\n   \"a\": {\n      \"b\": 1\n   }\n}");
    test(b"{a:: error \"err\"}", r"{ }");
}

#[test]
fn test_native() {
    #[track_caller]
    fn test(input: &[u8], expected: &str) {
        let mut program = Program::new();
        let mut callbacks = TestCallbacks::new();
        callbacks.init_native_funcs(&mut program);

        let (span_ctx, _) = program
            .span_manager_mut()
            .insert_source_context(input.len());

        let root_thunk = program
            .load_source(span_ctx, input, true, "test.jsonnet")
            .unwrap();

        let value = program.eval_value(&root_thunk, &mut callbacks).unwrap();
        let value_str = program.manifest_json(&value, false).unwrap();
        assert_eq!(value_str, expected);
    }

    test(b"std.native(\"returnNum\")()", "1234");
    test(b"std.native(\"isString\")(null)", "false");
    test(b"std.native(\"isString\")(\"str\")", "true");
    test(
        b"std.native(\"lastItemOfFirst\")([[1, 2], [3, 4], [5, 6]])",
        "2",
    );

    test(b"std.native(\"unknown\")", "null");
    test(b"std.isFunction(std.native(\"returnNum\"))", "true");
    test(b"std.length(std.native(\"returnNum\"))", "0");
    test(b"std.length(std.native(\"isString\"))", "1");

    #[track_caller]
    fn test_fail(input: &[u8]) {
        let mut program = Program::new();
        let mut callbacks = TestCallbacks::new();
        callbacks.init_native_funcs(&mut program);

        let (span_ctx, _) = program
            .span_manager_mut()
            .insert_source_context(input.len());

        let thunk = program
            .load_source(span_ctx, input, true, "test.jsonnet")
            .unwrap();

        let error = program.eval_value(&thunk, &mut callbacks).err().unwrap();
        assert_eq!(error.kind, EvalErrorKind::NativeCallFailed);
    }

    test_fail(b"std.native(\"failure\")()");
}

#[test]
fn test_explicit_error() {
    let mut program = Program::new();
    let mut callbacks = TestCallbacks::new();

    let input = b"error \"boom\"";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let error = program.eval_value(&thunk, &mut callbacks).err().unwrap();
    let EvalErrorKind::ExplicitError { message, .. } = error.kind else {
        panic!("expected ExplicitError, got {:?}", error.kind);
    };
    assert_eq!(message, "boom");
}

#[test]
fn test_stack_depth_bound() {
    let mut program = Program::new();
    program.set_max_stack(8);
    let mut callbacks = TestCallbacks::new();

    let input = b"local f(x) = 1 + f(x); f(0)";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let error = program.eval_value(&thunk, &mut callbacks).err().unwrap();
    assert_eq!(error.kind, EvalErrorKind::StackOverflow);
}

#[test]
fn test_tailstrict_recursion_is_stack_bounded() {
    let mut program = Program::new();
    program.set_max_stack(50);
    let mut callbacks = TestCallbacks::new();

    let input = b"local f(x) = if x == 0 then 0 else f(x - 1) tailstrict; f(100000)";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let value = program.eval_value(&thunk, &mut callbacks).unwrap();
    assert_eq!(value.as_number(), Some(0.0));
}

#[test]
fn test_manifest_multi() {
    let mut program = Program::new();
    let mut callbacks = TestCallbacks::new();

    let input = b"{ b: 2, a: 1 }";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let value = program.eval_value(&thunk, &mut callbacks).unwrap();
    let result = program.manifest_json_multi(&value).unwrap();
    assert_eq!(result, "a\01\n\0b\02\n\0\0");
}

#[test]
fn test_manifest_multi_rejects_non_object() {
    let mut program = Program::new();
    let mut callbacks = TestCallbacks::new();

    let input = b"[1, 2, 3]";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let value = program.eval_value(&thunk, &mut callbacks).unwrap();
    assert!(program.manifest_json_multi(&value).is_err());
}

#[test]
fn test_manifest_stream() {
    let mut program = Program::new();
    let mut callbacks = TestCallbacks::new();

    let input = b"[1, 2, 3]";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let value = program.eval_value(&thunk, &mut callbacks).unwrap();
    let result = program.manifest_json_stream(&value).unwrap();
    assert_eq!(result, "1\n\02\n\03\n\0\0");
}

#[test]
fn test_manifest_string_output() {
    let mut program = Program::new();
    let mut callbacks = TestCallbacks::new();

    let input = b"\"hello\"";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let value = program.eval_value(&thunk, &mut callbacks).unwrap();
    let result = program.manifest_string_output(&value).unwrap();
    assert_eq!(result, "hello");

    assert!(program.manifest_string_output(&Value::number(1.0)).is_err());
}

#[test]
fn test_gc_tunables_do_not_affect_correctness() {
    let mut program = Program::new();
    program.set_gc_min_objects(0);
    program.set_gc_growth_trigger(1.0);
    let mut callbacks = TestCallbacks::new();

    let input = b"[std.makeArray(1000, function(i) i)]";
    let (span_ctx, _) = program
        .span_manager_mut()
        .insert_source_context(input.len());

    let thunk = program
        .load_source(span_ctx, input, true, "test.jsonnet")
        .unwrap();

    let value = program.eval_value(&thunk, &mut callbacks).unwrap();
    let result = program.manifest_json(&value, false).unwrap();
    assert!(result.starts_with("[[0, 1, 2"));
}
