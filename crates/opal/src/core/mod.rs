//! The core runtime: builtin classes and native functions.
//!
//! All builtin classes are constructed in a single batch and then frozen;
//! user classes are appended after them, so the well-known ids below are
//! stable for the life of the program. Every value's dispatch class is one
//! of these (or a user class for instances); `Class` anchors the metaclass
//! chain, `Object` is the root of every superclass chain.
//!
//! `CoreRegistry` is built once and handed to the compiler, which threads
//! it into the program; there are no hidden singletons.

use crate::bytecode::code::{Function, FunctionId, NativeFn};
use crate::class::{lookup_property, Class, ClassId};
use crate::heap::HeapData;
use crate::value::Value;
use crate::vm::{RuntimeError, Vm};

pub const CLASS_OBJECT: ClassId = ClassId::of(0);
pub const CLASS_CLASS: ClassId = ClassId::of(1);
pub const CLASS_BOOL: ClassId = ClassId::of(2);
pub const CLASS_INT: ClassId = ClassId::of(3);
pub const CLASS_FLOAT: ClassId = ClassId::of(4);
pub const CLASS_NULL: ClassId = ClassId::of(5);
pub const CLASS_STRING: ClassId = ClassId::of(6);
pub const CLASS_CLOSURE: ClassId = ClassId::of(7);
pub const CLASS_INSTANCE: ClassId = ClassId::of(8);
pub const CLASS_ARRAY: ClassId = ClassId::of(9);
/// No global slot: ranges are built with the `..` operator.
pub const CLASS_RANGE: ClassId = ClassId::of(10);

const META_BOOL: ClassId = ClassId::of(11);
const META_INT: ClassId = ClassId::of(12);
const META_FLOAT: ClassId = ClassId::of(13);
const META_STRING: ClassId = ClassId::of(14);
const META_ARRAY: ClassId = ClassId::of(15);

/// Names of the pre-populated global slots, in slot order.
pub const GLOBAL_NAMES: [&str; 12] = [
    "println", "print", "Object", "Class", "Bool", "Int", "Float", "Null", "String", "Closure", "Instance", "Array",
];

/// The builtin classes, native functions and initial globals, ready to seed
/// a program.
pub struct CoreRegistry {
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
    pub globals: Vec<Value>,
}

impl Default for CoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreRegistry {
    pub fn new() -> Self {
        let mut functions = Vec::new();
        let mut add = |name: &str, f: NativeFn| -> Value {
            let id = FunctionId::new(functions.len());
            functions.push(Function::native(name, f));
            Value::Func(id)
        };

        let mut object = Class::new("Object", None, None);
        object.bind("class", add("class", object_class));
        object.bind("string", add("string", object_string));
        object.bind("$eqeq", add("$eqeq", object_eqeq));
        object.bind("$loadfield", add("$loadfield", object_loadfield));
        object.bind("$storefield", add("$storefield", object_storefield));

        let mut class_class = Class::new("Class", Some(CLASS_OBJECT), None);
        class_class.bind("name", add("name", class_name));

        let bool_class = Class::new("Bool", Some(CLASS_OBJECT), Some(META_BOOL));

        let mut int_class = Class::new("Int", Some(CLASS_OBJECT), Some(META_INT));
        int_class.bind("$add", add("$add", num_add));
        int_class.bind("$sub", add("$sub", num_sub));
        int_class.bind("$mul", add("$mul", num_mul));
        int_class.bind("$div", add("$div", num_div));

        let mut float_class = Class::new("Float", Some(CLASS_OBJECT), Some(META_FLOAT));
        float_class.bind("$add", add("$add", num_add));
        float_class.bind("$sub", add("$sub", num_sub));
        float_class.bind("$mul", add("$mul", num_mul));
        float_class.bind("$div", add("$div", num_div));

        let null_class = Class::new("Null", Some(CLASS_OBJECT), None);

        let mut string_class = Class::new("String", Some(CLASS_OBJECT), Some(META_STRING));
        string_class.bind("length", add("length", string_length));
        string_class.bind("equals", add("equals", string_equals));
        string_class.bind("charAt", add("charAt", string_char_at));
        string_class.bind("concat", add("concat", string_concat));
        string_class.bind("$add", add("$add", string_add));
        string_class.bind("$eqeq", add("$eqeq", string_eqeq));
        string_class.bind("$loadat", add("$loadat", string_char_at));

        let mut closure_class = Class::new("Closure", Some(CLASS_OBJECT), None);
        closure_class.bind("name", add("name", closure_name));

        let instance_class = Class::new("Instance", Some(CLASS_OBJECT), None);

        let mut array_class = Class::new("Array", Some(CLASS_OBJECT), Some(META_ARRAY));
        array_class.bind("size", add("size", array_size));
        array_class.bind("add", add("add", array_add));
        array_class.bind("get", add("get", array_get));
        array_class.bind("map", add("map", array_map));
        array_class.bind("$loadat", add("$loadat", array_load_at));
        array_class.bind("$storeat", add("$storeat", array_store_at));

        let mut range_class = Class::new("Range", Some(CLASS_OBJECT), None);
        range_class.bind("size", add("size", range_size));
        range_class.bind("start", add("start", range_start));
        range_class.bind("end", add("end", range_end));
        range_class.bind("$loadat", add("$loadat", range_load_at));

        let mut meta_bool = Class::new("Bool metaclass", Some(CLASS_CLASS), None);
        meta_bool.bind("$new", add("$new", bool_new));
        let mut meta_int = Class::new("Int metaclass", Some(CLASS_CLASS), None);
        meta_int.bind("$new", add("$new", int_new));
        let mut meta_float = Class::new("Float metaclass", Some(CLASS_CLASS), None);
        meta_float.bind("$new", add("$new", float_new));
        let mut meta_string = Class::new("String metaclass", Some(CLASS_CLASS), None);
        meta_string.bind("$new", add("$new", string_new));
        let mut meta_array = Class::new("Array metaclass", Some(CLASS_CLASS), None);
        meta_array.bind("$new", add("$new", array_new));

        let println_value = add("println", native_println);
        let print_value = add("print", native_print);

        let classes = vec![
            object,
            class_class,
            bool_class,
            int_class,
            float_class,
            null_class,
            string_class,
            closure_class,
            instance_class,
            array_class,
            range_class,
            meta_bool,
            meta_int,
            meta_float,
            meta_string,
            meta_array,
        ];

        let globals = vec![
            println_value,
            print_value,
            Value::Class(CLASS_OBJECT),
            Value::Class(CLASS_CLASS),
            Value::Class(CLASS_BOOL),
            Value::Class(CLASS_INT),
            Value::Class(CLASS_FLOAT),
            Value::Class(CLASS_NULL),
            Value::Class(CLASS_STRING),
            Value::Class(CLASS_CLOSURE),
            Value::Class(CLASS_INSTANCE),
            Value::Class(CLASS_ARRAY),
        ];

        Self {
            functions,
            classes,
            globals,
        }
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn want(args: &[Value], count: usize, name: &str) -> Result<(), RuntimeError> {
    if args.len() < count {
        return Err(RuntimeError::new(format!(
            "{name} expects {count} argument(s), got {}",
            args.len()
        )));
    }
    Ok(())
}

fn str_arg(vm: &Vm, value: Value, name: &str) -> Result<String, RuntimeError> {
    vm.value_str(value)
        .ok_or_else(|| RuntimeError::new(format!("{name} expects a string, got {}", value.type_name())))
}

fn int_arg(value: Value, name: &str) -> Result<i64, RuntimeError> {
    match value {
        Value::Int(v) => Ok(v),
        other => Err(RuntimeError::new(format!(
            "{name} expects an int, got {}",
            other.type_name()
        ))),
    }
}

fn array_elems(vm: &Vm, value: Value, name: &str) -> Result<Vec<Value>, RuntimeError> {
    if let Value::Array(id) = value {
        if let HeapData::Array(elements) = vm.heap.get(id) {
            return Ok(elements.clone());
        }
    }
    Err(RuntimeError::new(format!(
        "{name} expects an array, got {}",
        value.type_name()
    )))
}

// ============================================================================
// print / println
// ============================================================================

fn native_println(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if let Some(&value) = args.first() {
        let s = vm.stringify(value)?;
        vm.print.write_str(&s);
    }
    vm.print.write_str("\n");
    Ok(Value::Null)
}

fn native_print(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    if let Some(&value) = args.first() {
        let s = vm.stringify(value)?;
        vm.print.write_str(&s);
    }
    Ok(Value::Null)
}

// ============================================================================
// Object
// ============================================================================

fn object_class(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "class")?;
    Ok(Value::Class(vm.class_of(args[0])))
}

fn object_string(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "string")?;
    let s = vm.default_repr(args[0])?;
    Ok(vm.alloc_str(s))
}

fn object_eqeq(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "$eqeq")?;
    Ok(Value::Bool(vm.identity_eq(args[0], args[1])))
}

/// Field access by name for objects whose table did not resolve the
/// property directly.
fn object_loadfield(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "$loadfield")?;
    let name = str_arg(vm, args[1], "$loadfield")?;
    let class = vm.class_of(args[0]);
    match lookup_property(&vm.program.classes, class, &name) {
        Some(Value::Int(slot)) => vm.load_slot(args[0], slot),
        Some(value) => Ok(value),
        None => Err(RuntimeError::new(format!(
            "Undefined property '{}' on {}",
            name,
            args[0].type_name()
        ))),
    }
}

fn object_storefield(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 3, "$storefield")?;
    let name = str_arg(vm, args[1], "$storefield")?;
    let class = vm.class_of(args[0]);
    match lookup_property(&vm.program.classes, class, &name) {
        Some(Value::Int(slot)) => {
            vm.store_slot(args[0], slot, args[2])?;
            Ok(args[2])
        }
        _ => Err(RuntimeError::new(format!(
            "Undefined property '{}' on {}",
            name,
            args[0].type_name()
        ))),
    }
}

// ============================================================================
// Class / Closure
// ============================================================================

fn class_name(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "name")?;
    let Value::Class(cid) = args[0] else {
        return Err(RuntimeError::new(format!(
            "name expects a class, got {}",
            args[0].type_name()
        )));
    };
    let name = vm.program.classes[cid.index()].name.clone();
    Ok(vm.alloc_str(name))
}

fn closure_name(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "name")?;
    let fid = match args[0] {
        Value::Func(fid) => fid,
        Value::Closure(id) => match vm.heap.get(id) {
            HeapData::Closure(closure) => closure.function,
            _ => return Err(RuntimeError::new("Corrupt closure reference")),
        },
        other => {
            return Err(RuntimeError::new(format!(
                "name expects a closure, got {}",
                other.type_name()
            )));
        }
    };
    let function = vm.program.function(fid);
    let name = if function.is_native() {
        "{native func}".to_owned()
    } else {
        function.name.clone()
    };
    Ok(vm.alloc_str(name))
}

// ============================================================================
// String
// ============================================================================

fn string_length(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "length")?;
    let s = str_arg(vm, args[0], "length")?;
    Ok(Value::Int(s.chars().count() as i64))
}

fn string_equals(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "equals")?;
    let a = str_arg(vm, args[0], "equals")?;
    Ok(Value::Bool(match vm.value_str(args[1]) {
        Some(b) => a == b,
        None => false,
    }))
}

fn string_eqeq(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    string_equals(vm, args)
}

fn string_char_at(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "charAt")?;
    let s = str_arg(vm, args[0], "charAt")?;
    let index = int_arg(args[1], "charAt")?;
    let ch = usize::try_from(index).ok().and_then(|i| s.chars().nth(i));
    match ch {
        Some(ch) => Ok(vm.alloc_str(ch.to_string())),
        None => Err(RuntimeError::new("String index out of range")),
    }
}

fn string_concat(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "concat")?;
    let mut s = str_arg(vm, args[0], "concat")?;
    s.push_str(&vm.stringify(args[1])?);
    Ok(vm.alloc_str(s))
}

/// `string + anything` stringifies the right operand and concatenates.
fn string_add(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    string_concat(vm, args)
}

// ============================================================================
// Int / Float operator methods
// ============================================================================

/// `number + string` stringifies the left operand; numeric pairs are
/// normally handled by the inline fast path but compute here when invoked
/// directly.
fn num_add(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "$add")?;
    let (a, b) = (args[0], args[1]);
    if b.is_string() {
        let mut s = vm.stringify(a)?;
        s.push_str(&str_arg(vm, b, "$add")?);
        return Ok(vm.alloc_str(s));
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(x as f64 + y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x + y as f64)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        _ => Err(RuntimeError::new(format!(
            "Unsupported operands for '+': {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn num_binop(args: &[Value], symbol: char, int_op: fn(i64, i64) -> i64, float_op: fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    want(args, 2, "$op")?;
    match (args[0], args[1]) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(int_op(x, y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(float_op(x as f64, y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(float_op(x, y as f64))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(float_op(x, y))),
        (a, b) => Err(RuntimeError::new(format!(
            "Unsupported operands for '{symbol}': {} and {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn num_sub(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    num_binop(args, '-', i64::wrapping_sub, |x, y| x - y)
}

fn num_mul(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    num_binop(args, '*', i64::wrapping_mul, |x, y| x * y)
}

fn num_div(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "$div")?;
    if matches!(args[1], Value::Int(0)) || matches!(args[1], Value::Float(f) if f == 0.0) {
        return Err(RuntimeError::new("Division by zero"));
    }
    num_binop(args, '/', i64::wrapping_div, |x, y| x / y)
}

// ============================================================================
// Conversion constructors ($new on the metaclasses)
// ============================================================================

fn int_new(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let Some(&value) = args.get(1) else {
        return Ok(Value::Int(0));
    };
    match value {
        Value::Int(v) => Ok(Value::Int(v)),
        Value::Float(v) => Ok(Value::Int(v as i64)),
        Value::Bool(v) => Ok(Value::Int(i64::from(v))),
        Value::Str(_) | Value::HeapStr(_) => {
            let s = str_arg(vm, value, "Int")?;
            s.trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| RuntimeError::new(format!("Cannot convert '{s}' to Int")))
        }
        other => Err(RuntimeError::new(format!(
            "Cannot convert {} to Int",
            other.type_name()
        ))),
    }
}

fn float_new(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let Some(&value) = args.get(1) else {
        return Ok(Value::Float(0.0));
    };
    match value {
        Value::Float(v) => Ok(Value::Float(v)),
        Value::Int(v) => Ok(Value::Float(v as f64)),
        Value::Bool(v) => Ok(Value::Float(f64::from(u8::from(v)))),
        Value::Str(_) | Value::HeapStr(_) => {
            let s = str_arg(vm, value, "Float")?;
            s.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| RuntimeError::new(format!("Cannot convert '{s}' to Float")))
        }
        other => Err(RuntimeError::new(format!(
            "Cannot convert {} to Float",
            other.type_name()
        ))),
    }
}

fn bool_new(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let Some(&value) = args.get(1) else {
        return Ok(Value::Bool(false));
    };
    match value {
        Value::Bool(v) => Ok(Value::Bool(v)),
        Value::Null => Ok(Value::Bool(false)),
        Value::Int(v) => Ok(Value::Bool(v != 0)),
        Value::Float(v) => Ok(Value::Bool(v != 0.0)),
        Value::Str(_) | Value::HeapStr(_) => {
            let s = str_arg(vm, value, "Bool")?;
            match s.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(RuntimeError::new(format!("Cannot convert '{s}' to Bool"))),
            }
        }
        other => Err(RuntimeError::new(format!(
            "Cannot convert {} to Bool",
            other.type_name()
        ))),
    }
}

fn string_new(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let Some(&value) = args.get(1) else {
        return Ok(vm.alloc_str(String::new()));
    };
    let s = vm.stringify(value)?;
    Ok(vm.alloc_str(s))
}

/// `Array(...)` packs its arguments into a new array.
fn array_new(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    let elements = args[1..].to_vec();
    Ok(Value::Array(vm.heap.alloc(HeapData::Array(elements))))
}

// ============================================================================
// Array
// ============================================================================

fn array_size(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "size")?;
    let elements = array_elems(vm, args[0], "size")?;
    Ok(Value::Int(elements.len() as i64))
}

/// Appends in place; returns the array for chaining.
fn array_add(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "add")?;
    let Value::Array(id) = args[0] else {
        return Err(RuntimeError::new(format!(
            "add expects an array, got {}",
            args[0].type_name()
        )));
    };
    let HeapData::Array(elements) = vm.heap.get_mut(id) else {
        return Err(RuntimeError::new("Corrupt array reference"));
    };
    elements.push(args[1]);
    Ok(args[0])
}

fn array_get(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "get")?;
    let elements = array_elems(vm, args[0], "get")?;
    let index = int_arg(args[1], "get")?;
    usize::try_from(index)
        .ok()
        .and_then(|i| elements.get(i).copied())
        .ok_or_else(|| RuntimeError::new("Array index out of range"))
}

fn array_map(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "map")?;
    let elements = array_elems(vm, args[0], "map")?;
    let mapper = args[1];

    let mut mapped = Vec::with_capacity(elements.len());
    for element in elements {
        mapped.push(vm.run_closure(mapper, &[element])?);
    }
    Ok(Value::Array(vm.heap.alloc(HeapData::Array(mapped))))
}

fn array_load_at(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    array_get(vm, args)
}

fn array_store_at(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 3, "$storeat")?;
    let Value::Array(id) = args[0] else {
        return Err(RuntimeError::new(format!(
            "$storeat expects an array, got {}",
            args[0].type_name()
        )));
    };
    let index = int_arg(args[1], "$storeat")?;
    let HeapData::Array(elements) = vm.heap.get_mut(id) else {
        return Err(RuntimeError::new("Corrupt array reference"));
    };
    let slot = usize::try_from(index)
        .ok()
        .and_then(|i| elements.get_mut(i))
        .ok_or_else(|| RuntimeError::new("Array index out of range"))?;
    *slot = args[2];
    Ok(args[2])
}

// ============================================================================
// Range
// ============================================================================

fn range_data(vm: &Vm, value: Value, name: &str) -> Result<crate::heap::Range, RuntimeError> {
    if let Value::Range(id) = value {
        if let HeapData::Range(range) = vm.heap.get(id) {
            return Ok(*range);
        }
    }
    Err(RuntimeError::new(format!(
        "{name} expects a range, got {}",
        value.type_name()
    )))
}

fn range_size(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "size")?;
    Ok(Value::Int(range_data(vm, args[0], "size")?.len()))
}

fn range_start(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "start")?;
    Ok(Value::Int(range_data(vm, args[0], "start")?.start))
}

fn range_end(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 1, "end")?;
    Ok(Value::Int(range_data(vm, args[0], "end")?.end))
}

fn range_load_at(vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    want(args, 2, "$loadat")?;
    let range = range_data(vm, args[0], "$loadat")?;
    let index = int_arg(args[1], "$loadat")?;
    if index < 0 || index >= range.len() {
        return Err(RuntimeError::new("Range index out of range"));
    }
    Ok(Value::Int(range.start + index))
}
