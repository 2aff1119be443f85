//! The standard library table.
//!
//! Built once at startup and shared read-only between all analyses.

use std::collections::HashMap;

/// A function of the `std` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinFunction {
    /// Name without the `std.` prefix.
    pub name: &'static str,
    /// Parameter names in order.
    pub params: &'static [&'static str],
    /// One-line description.
    pub doc: &'static str,
}

impl BuiltinFunction {
    /// `std.name(a, b)`.
    #[must_use]
    pub fn signature(&self) -> String {
        format!("std.{}({})", self.name, self.params.join(", "))
    }
}

macro_rules! std_functions {
    ($($name:ident($($param:ident),*) => $doc:literal,)*) => {
        &[$(BuiltinFunction {
            name: stringify!($name),
            params: &[$(stringify!($param)),*],
            doc: $doc,
        },)*]
    };
}

const STD: &[BuiltinFunction] = std_functions! {
    extVar(x) => "Value of the external variable `x`.",
    thisFile() => "Path of the current file.",
    type(x) => "Type name of `x` as a string.",
    length(x) => "Length of an array, string, object or function arity.",
    get(o, f, default, inc_hidden) => "Field `f` of `o`, or `default` when absent.",
    objectHas(o, f) => "Whether `o` has the visible field `f`.",
    objectFields(o) => "Sorted names of the visible fields of `o`.",
    objectValues(o) => "Values of the visible fields of `o`.",
    objectKeysValues(o) => "Key/value pairs of the visible fields of `o`.",
    objectHasAll(o, f) => "Whether `o` has the field `f`, hidden or not.",
    objectFieldsAll(o) => "Sorted names of all fields of `o`.",
    objectValuesAll(o) => "Values of all fields of `o`.",
    objectKeysValuesAll(o) => "Key/value pairs of all fields of `o`.",
    objectRemoveKey(obj, key) => "A copy of `obj` without `key`.",
    prune(a) => "Recursively remove empty and null values.",
    mapWithKey(func, obj) => "Apply `func(key, value)` to every field.",
    abs(n) => "Absolute value.",
    sign(n) => "-1, 0 or 1.",
    max(a, b) => "Larger of two numbers.",
    min(a, b) => "Smaller of two numbers.",
    pow(x, n) => "`x` raised to `n`.",
    exp(x) => "e raised to `x`.",
    log(x) => "Natural logarithm.",
    exponent(x) => "Exponent of the floating point representation.",
    mantissa(x) => "Mantissa of the floating point representation.",
    floor(x) => "Largest integer not greater than `x`.",
    ceil(x) => "Smallest integer not less than `x`.",
    sqrt(x) => "Square root.",
    sin(x) => "Sine.",
    cos(x) => "Cosine.",
    tan(x) => "Tangent.",
    asin(x) => "Arc sine.",
    acos(x) => "Arc cosine.",
    atan(x) => "Arc tangent.",
    round(x) => "Nearest integer.",
    clamp(x, minVal, maxVal) => "`x` limited to the range.",
    isString(v) => "Whether `v` is a string.",
    isNumber(v) => "Whether `v` is a number.",
    isBoolean(v) => "Whether `v` is a boolean.",
    isObject(v) => "Whether `v` is an object.",
    isArray(v) => "Whether `v` is an array.",
    isFunction(v) => "Whether `v` is a function.",
    toString(a) => "String representation of `a`.",
    codepoint(str) => "Code point of a one-character string.",
    char(n) => "One-character string of a code point.",
    substr(str, from, len) => "Substring of `len` characters starting at `from`.",
    findSubstr(pat, str) => "Indexes of occurrences of `pat` in `str`.",
    startsWith(a, b) => "Whether `a` starts with `b`.",
    endsWith(a, b) => "Whether `a` ends with `b`.",
    stripChars(str, chars) => "Remove `chars` from both ends.",
    lstripChars(str, chars) => "Remove `chars` from the start.",
    rstripChars(str, chars) => "Remove `chars` from the end.",
    split(str, c) => "Split `str` on `c`.",
    splitLimit(str, c, maxsplits) => "Split `str` on `c` at most `maxsplits` times.",
    splitLimitR(str, c, maxsplits) => "Split from the right at most `maxsplits` times.",
    strReplace(str, from, to) => "Replace every `from` with `to`.",
    isEmpty(str) => "Whether the string is empty.",
    trim(str) => "Remove surrounding whitespace.",
    asciiUpper(str) => "Upper-case ASCII letters.",
    asciiLower(str) => "Lower-case ASCII letters.",
    stringChars(str) => "Array of the characters of `str`.",
    format(str, vals) => "Python-style `%` formatting.",
    escapeStringBash(str) => "Quote for bash.",
    escapeStringDollars(str) => "Escape `$` characters.",
    escapeStringJson(str) => "Quote as a JSON string.",
    escapeStringPython(str) => "Quote as a Python string.",
    escapeStringXml(str) => "Escape XML special characters.",
    parseInt(str) => "Parse a decimal integer.",
    parseOctal(str) => "Parse an octal integer.",
    parseHex(str) => "Parse a hexadecimal integer.",
    parseJson(str) => "Parse a JSON document.",
    parseYaml(str) => "Parse a YAML document.",
    encodeUTF8(str) => "UTF-8 bytes of `str`.",
    decodeUTF8(arr) => "String from UTF-8 bytes.",
    manifestIni(ini) => "Render an INI document.",
    manifestPython(v) => "Render as a Python literal.",
    manifestPythonVars(conf) => "Render as Python variable assignments.",
    manifestJsonEx(value, indent, newline, key_val_sep) => "Render JSON with custom layout.",
    manifestJson(value) => "Render JSON with four-space indentation.",
    manifestJsonMinified(value) => "Render JSON without whitespace.",
    manifestYamlDoc(value, indent_array_in_object, quote_keys) => "Render a YAML document.",
    manifestYamlStream(value, indent_array_in_object, c_document_end, quote_keys) => "Render a YAML stream.",
    manifestXmlJsonml(value) => "Render JsonML as XML.",
    manifestTomlEx(toml, indent) => "Render a TOML document.",
    makeArray(sz, func) => "Array of `func(i)` for `i` in `0..sz`.",
    member(arr, x) => "Whether `arr` contains `x`.",
    count(arr, x) => "Occurrences of `x` in `arr`.",
    find(value, arr) => "Indexes of `value` in `arr`.",
    map(func, arr) => "Apply `func` to every element.",
    mapWithIndex(func, arr) => "Apply `func(i, x)` to every element.",
    filterMap(filter_func, map_func, arr) => "Map the elements that pass the filter.",
    flatMap(func, arr) => "Map then flatten.",
    filter(func, arr) => "Elements for which `func` is true.",
    foldl(func, arr, init) => "Left fold.",
    foldr(func, arr, init) => "Right fold.",
    range(from, to) => "Integers from `from` to `to` inclusive.",
    repeat(what, count) => "Repeat an array or string.",
    slice(indexable, index, end, step) => "Slice of an array or string.",
    join(sep, arr) => "Join arrays or strings with a separator.",
    lines(arr) => "Join strings with trailing newlines.",
    flattenArrays(arr) => "Concatenate an array of arrays.",
    flattenDeepArray(value) => "Recursively flatten nested arrays.",
    reverse(arr) => "Reverse an array.",
    sort(arr, keyF) => "Sort an array.",
    uniq(arr, keyF) => "Remove consecutive duplicates.",
    set(arr, keyF) => "Sorted array without duplicates.",
    setInter(a, b, keyF) => "Set intersection.",
    setUnion(a, b, keyF) => "Set union.",
    setDiff(a, b, keyF) => "Set difference.",
    setMember(x, arr, keyF) => "Whether `x` is in the set.",
    all(arr) => "Whether every element is true.",
    any(arr) => "Whether some element is true.",
    sum(arr) => "Sum of an array of numbers.",
    avg(arr) => "Mean of an array of numbers.",
    contains(arr, elem) => "Whether `arr` contains `elem`.",
    remove(arr, elem) => "Remove the first occurrence of `elem`.",
    removeAt(arr, idx) => "Remove the element at `idx`.",
    minArray(arr, keyF, onEmpty) => "Smallest element.",
    maxArray(arr, keyF, onEmpty) => "Largest element.",
    base64(input) => "Base64 encoding.",
    base64DecodeBytes(str) => "Decode Base64 to bytes.",
    base64Decode(str) => "Decode Base64 to a string.",
    md5(s) => "MD5 hex digest.",
    sha1(s) => "SHA-1 hex digest.",
    sha256(s) => "SHA-256 hex digest.",
    sha512(s) => "SHA-512 hex digest.",
    sha3(s) => "SHA3-512 hex digest.",
    mergePatch(target, patch) => "Apply a JSON merge patch.",
    trace(str, rest) => "Print `str` and return `rest`.",
    assertEqual(a, b) => "Fail unless `a == b`.",
    equalsIgnoreCase(str1, str2) => "Case-insensitive equality.",
    isEven(x) => "Whether `x` is even.",
    isOdd(x) => "Whether `x` is odd.",
    isInteger(x) => "Whether `x` is an integer.",
    isDecimal(x) => "Whether `x` has a fractional part.",
    xor(x, y) => "Boolean exclusive or.",
    xnor(x, y) => "Boolean equivalence.",
    native(name) => "A native function registered with the interpreter.",
};

/// Names injected into the outermost scope of every document.
const ROOT_NAMES: &[&str] = &["std"];

/// The builtin table.
#[derive(Debug, Clone)]
pub struct Builtins {
    functions: &'static [BuiltinFunction],
    by_name: HashMap<&'static str, usize>,
}

impl Builtins {
    /// The Jsonnet standard library.
    #[must_use]
    pub fn standard() -> Self {
        let by_name = STD.iter().enumerate().map(|(i, f)| (f.name, i)).collect();
        Self {
            functions: STD,
            by_name,
        }
    }

    /// Names visible in every document.
    pub fn root_names(&self) -> impl Iterator<Item = &'static str> {
        ROOT_NAMES.iter().copied()
    }

    /// Whether `name` is one of the root names.
    #[must_use]
    pub fn is_root(&self, name: &str) -> bool {
        ROOT_NAMES.contains(&name)
    }

    /// Look up `std.<name>`.
    #[must_use]
    pub fn std_function(&self, name: &str) -> Option<&'static BuiltinFunction> {
        self.by_name.get(name).map(|&i| &self.functions[i])
    }

    /// All functions of `std`, in table order.
    #[must_use]
    pub const fn std_functions(&self) -> &'static [BuiltinFunction] {
        self.functions
    }
}

impl Default for Builtins {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let builtins = Builtins::standard();
        let map = builtins.std_function("map").unwrap();
        assert_eq!(map.signature(), "std.map(func, arr)");
        assert!(builtins.std_function("nope").is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let builtins = Builtins::standard();
        assert_eq!(builtins.by_name.len(), builtins.std_functions().len());
    }

    #[test]
    fn test_root_names() {
        let builtins = Builtins::standard();
        assert_eq!(builtins.root_names().collect::<Vec<_>>(), vec!["std"]);
        assert!(builtins.is_root("std"));
        assert!(!builtins.is_root("self"));
    }
}
