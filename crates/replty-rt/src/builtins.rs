//! Built-in class table.
//!
//! Built once per process and never mutated afterwards by this crate. User
//! classes are created with [`Module::new_class`] and made visible through a
//! [`crate::Binding`], not by registering them here.

use std::sync::OnceLock;

use replty_common::Visibility;

use crate::module::Module;
use crate::object::{Object, Value};

pub struct Core {
    pub basic_object: Module,
    pub object: Module,
    pub kernel: Module,
    pub module: Module,
    pub class: Module,
    pub comparable: Module,
    pub enumerable: Module,
    pub numeric: Module,
    pub integer: Module,
    pub float: Module,
    pub rational: Module,
    pub complex: Module,
    pub string: Module,
    pub symbol: Module,
    pub nil_class: Module,
    pub true_class: Module,
    pub false_class: Module,
    pub array: Module,
    pub hash: Module,
    pub range: Module,
    pub regexp: Module,
    pub proc_: Module,
    pub exception: Module,
    pub standard_error: Module,
    pub nil: Object,
    pub true_: Object,
    pub false_: Object,
}

static CORE: OnceLock<Core> = OnceLock::new();

/// The process-wide built-in class table.
pub fn core() -> &'static Core {
    CORE.get_or_init(Core::build)
}

const BASIC_OBJECT_METHODS: &[&str] = &["!", "!=", "==", "__id__", "__send__", "equal?", "instance_eval", "instance_exec"];

const KERNEL_METHODS: &[&str] = &[
    "!~", "<=>", "===", "=~", "class", "clone", "define_singleton_method", "display", "dup",
    "enum_for", "eql?", "extend", "freeze", "frozen?", "hash", "inspect", "instance_of?",
    "instance_variable_defined?", "instance_variable_get", "instance_variable_set",
    "instance_variables", "is_a?", "itself", "kind_of?", "method", "methods", "nil?",
    "object_id", "public_send", "respond_to?", "send", "singleton_class", "singleton_methods",
    "tap", "then", "to_enum", "to_s",
];

const KERNEL_PRIVATE_METHODS: &[&str] = &[
    "Array", "Float", "Hash", "Integer", "String", "abort", "at_exit", "binding", "block_given?",
    "catch", "exit", "fail", "format", "gets", "lambda", "loop", "p", "pp", "print", "printf",
    "proc", "puts", "raise", "rand", "require", "require_relative", "sleep", "sprintf", "srand",
    "throw", "warn",
];

const MODULE_METHODS: &[&str] = &[
    "<", "<=", ">", ">=", "alias_method", "ancestors", "attr_accessor", "attr_reader",
    "attr_writer", "class_eval", "class_variable_get", "class_variable_set", "class_variables",
    "const_defined?", "const_get", "const_set", "constants", "define_method", "include",
    "include?", "included_modules", "instance_method", "instance_methods", "method_defined?",
    "module_eval", "name", "prepend", "private_instance_methods", "public_instance_methods",
];

const MODULE_PRIVATE_METHODS: &[&str] = &["module_function", "private", "private_constant", "protected", "public"];

const CLASS_METHODS: &[&str] = &["allocate", "new", "subclasses", "superclass"];

const COMPARABLE_METHODS: &[&str] = &["<", "<=", "==", ">", ">=", "between?", "clamp"];

const ENUMERABLE_METHODS: &[&str] = &[
    "all?", "any?", "chunk_while", "collect", "count", "each_slice", "each_with_index",
    "each_with_object", "entries", "filter", "filter_map", "find", "find_index", "first",
    "flat_map", "group_by", "include?", "inject", "map", "max", "max_by", "min", "min_by",
    "none?", "partition", "reduce", "reject", "select", "sort", "sort_by", "sum", "tally",
    "to_a", "to_h", "uniq", "zip",
];

const NUMERIC_METHODS: &[&str] = &[
    "%", "*", "**", "+", "-", "-@", "/", "abs", "ceil", "coerce", "div", "divmod", "floor",
    "integer?", "negative?", "positive?", "round", "step", "to_c", "to_i", "to_int", "truncate",
    "zero?",
];

const INTEGER_METHODS: &[&str] = &[
    "&", "<<", ">>", "^", "bit_length", "chr", "digits", "downto", "even?", "gcd", "lcm",
    "next", "odd?", "ord", "pred", "succ", "times", "to_f", "to_r", "to_s", "upto", "|",
];

const FLOAT_METHODS: &[&str] = &["finite?", "infinite?", "nan?", "next_float", "prev_float", "to_f", "to_r", "to_s"];

const STRING_METHODS: &[&str] = &[
    "%", "*", "+", "<<", "=~", "[]", "[]=", "bytes", "bytesize", "capitalize", "center",
    "chars", "chomp", "chop", "concat", "count", "delete", "downcase", "each_char",
    "each_line", "empty?", "encoding", "end_with?", "force_encoding", "freeze", "gsub",
    "include?", "index", "length", "lines", "ljust", "lstrip", "match", "match?", "ord",
    "prepend", "replace", "reverse", "rjust", "rstrip", "scan", "size", "slice", "split",
    "squeeze", "start_with?", "strip", "sub", "succ", "swapcase", "to_c", "to_f", "to_i",
    "to_r", "to_s", "to_str", "to_sym", "tr", "unpack", "upcase",
];

const SYMBOL_METHODS: &[&str] = &["[]", "downcase", "empty?", "length", "size", "to_proc", "to_s", "to_sym", "upcase"];

const NIL_METHODS: &[&str] = &["&", "inspect", "nil?", "to_a", "to_h", "to_i", "to_f", "to_s", "|"];

const BOOLEAN_METHODS: &[&str] = &["&", "^", "inspect", "to_s", "|"];

const ARRAY_METHODS: &[&str] = &[
    "&", "*", "+", "-", "<<", "[]", "[]=", "at", "clear", "compact", "concat", "delete",
    "delete_at", "delete_if", "dig", "each", "each_index", "empty?", "fetch", "fill",
    "flatten", "index", "insert", "join", "keep_if", "last", "length", "pack", "pop",
    "product", "push", "rotate", "sample", "shift", "shuffle", "size", "slice", "sum",
    "take", "to_a", "to_ary", "transpose", "unshift", "values_at", "|",
];

const HASH_METHODS: &[&str] = &[
    "[]", "[]=", "any?", "clear", "compact", "delete", "dig", "each", "each_key", "each_pair",
    "each_value", "empty?", "fetch", "filter_map", "key", "key?", "keys", "length", "merge",
    "merge!", "size", "store", "to_a", "to_h", "to_hash", "transform_keys",
    "transform_values", "update", "value?", "values",
];

const RANGE_METHODS: &[&str] = &["begin", "cover?", "each", "end", "exclude_end?", "first", "last", "size", "step", "to_a"];

const REGEXP_METHODS: &[&str] = &["=~", "match", "match?", "names", "options", "source"];

const PROC_METHODS: &[&str] = &["[]", "arity", "call", "curry", "lambda?", "parameters", "to_proc", "yield"];

const EXCEPTION_METHODS: &[&str] = &["backtrace", "cause", "full_message", "message"];

impl Core {
    fn build() -> Core {
        let basic_object = Module::new_class(Some("BasicObject"), None);
        let object = Module::new_class(Some("Object"), Some(&basic_object));
        let kernel = Module::new_module(Some("Kernel"));
        let module = Module::new_class(Some("Module"), Some(&object));
        let class = Module::new_class(Some("Class"), Some(&module));
        let comparable = Module::new_module(Some("Comparable"));
        let enumerable = Module::new_module(Some("Enumerable"));
        let numeric = Module::new_class(Some("Numeric"), Some(&object));
        let integer = Module::new_class(Some("Integer"), Some(&numeric));
        let float = Module::new_class(Some("Float"), Some(&numeric));
        let rational = Module::new_class(Some("Rational"), Some(&numeric));
        let complex = Module::new_class(Some("Complex"), Some(&numeric));
        let string = Module::new_class(Some("String"), Some(&object));
        let symbol = Module::new_class(Some("Symbol"), Some(&object));
        let nil_class = Module::new_class(Some("NilClass"), Some(&object));
        let true_class = Module::new_class(Some("TrueClass"), Some(&object));
        let false_class = Module::new_class(Some("FalseClass"), Some(&object));
        let array = Module::new_class(Some("Array"), Some(&object));
        let hash = Module::new_class(Some("Hash"), Some(&object));
        let range = Module::new_class(Some("Range"), Some(&object));
        let regexp = Module::new_class(Some("Regexp"), Some(&object));
        let proc_ = Module::new_class(Some("Proc"), Some(&object));
        let exception = Module::new_class(Some("Exception"), Some(&object));
        let standard_error = Module::new_class(Some("StandardError"), Some(&exception));

        object.include(&kernel);
        numeric.include(&comparable);
        string.include(&comparable);
        array.include(&enumerable);
        hash.include(&enumerable);
        range.include(&enumerable);

        let public = Visibility::Public;
        basic_object.define_methods(BASIC_OBJECT_METHODS, public);
        basic_object.define_method("initialize", Visibility::Private);
        kernel.define_methods(KERNEL_METHODS, public);
        kernel.define_methods(KERNEL_PRIVATE_METHODS, Visibility::Private);
        module.define_methods(MODULE_METHODS, public);
        module.define_methods(MODULE_PRIVATE_METHODS, Visibility::Private);
        class.define_methods(CLASS_METHODS, public);
        comparable.define_methods(COMPARABLE_METHODS, public);
        enumerable.define_methods(ENUMERABLE_METHODS, public);
        numeric.define_methods(NUMERIC_METHODS, public);
        integer.define_methods(INTEGER_METHODS, public);
        float.define_methods(FLOAT_METHODS, public);
        rational.define_methods(&["denominator", "numerator", "to_f", "to_r"], public);
        complex.define_methods(&["abs", "conjugate", "imaginary", "real", "to_c"], public);
        string.define_methods(STRING_METHODS, public);
        symbol.define_methods(SYMBOL_METHODS, public);
        nil_class.define_methods(NIL_METHODS, public);
        true_class.define_methods(BOOLEAN_METHODS, public);
        false_class.define_methods(BOOLEAN_METHODS, public);
        array.define_methods(ARRAY_METHODS, public);
        hash.define_methods(HASH_METHODS, public);
        range.define_methods(RANGE_METHODS, public);
        regexp.define_methods(REGEXP_METHODS, public);
        proc_.define_methods(PROC_METHODS, public);
        exception.define_methods(EXCEPTION_METHODS, public);
        exception.define_singleton_method("exception", public);

        for m in [
            &basic_object, &object, &kernel, &module, &class, &comparable, &enumerable, &numeric,
            &integer, &float, &rational, &complex, &string, &symbol, &nil_class, &true_class,
            &false_class, &array, &hash, &range, &regexp, &proc_, &exception, &standard_error,
        ] {
            if let Some(name) = m.name() {
                object.set_const(name, Object::module(m));
            }
        }

        let nil = Object::new(&nil_class, Value::Nil);
        let true_ = Object::new(&true_class, Value::Bool(true));
        let false_ = Object::new(&false_class, Value::Bool(false));

        Core {
            basic_object,
            object,
            kernel,
            module,
            class,
            comparable,
            enumerable,
            numeric,
            integer,
            float,
            rational,
            complex,
            string,
            symbol,
            nil_class,
            true_class,
            false_class,
            array,
            hash,
            range,
            regexp,
            proc_,
            exception,
            standard_error,
            nil,
            true_,
            false_,
        }
    }

    /// Look up a built-in class or module by name.
    pub fn by_name(&self, name: &str) -> Option<Module> {
        self.object
            .const_get(name)
            .and_then(|o| o.as_module().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_follow_includes_then_superclass() {
        let c = core();
        let names: Vec<String> = c.string.ancestors().iter().map(|m| m.to_string()).collect();
        assert_eq!(names, vec!["String", "Comparable", "Object", "Kernel", "BasicObject"]);
    }

    #[test]
    fn private_kernel_methods_stay_private() {
        let c = core();
        assert!(c.object.private_instance_methods().contains(&"puts".to_string()));
        assert!(!c.object.instance_methods().contains(&"puts".to_string()));
        assert_eq!(c.object.instance_method_visibility("puts"), Some(Visibility::Private));
    }

    #[test]
    fn builtins_are_registered_as_object_constants() {
        let c = core();
        assert!(c.by_name("Hash").unwrap().ptr_eq(&c.hash));
        assert!(c.by_name("Nope").is_none());
    }

    #[test]
    fn class_singleton_methods_are_inherited() {
        let c = core();
        assert!(c.standard_error.singleton_methods().contains(&"exception".to_string()));
        assert!(!c.string.singleton_methods().contains(&"exception".to_string()));
    }
}
