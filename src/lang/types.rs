//! Static types and the small standard library the checker knows about.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Long,
    Double,
    Boolean,
    Str,
    Void,
    Null,
    /// A user or library class, interface, enum or record.
    Class(String),
    /// Placeholder for expressions whose type depends on something
    /// unresolved; compatible with everything.
    Unknown,
}

impl Type {
    /// Types spelled with a reserved word, plus `String` and `Object`.
    pub fn builtin(name: &str) -> Option<Type> {
        Some(match name {
            "int" => Type::Int,
            "long" => Type::Long,
            "double" => Type::Double,
            "boolean" => Type::Boolean,
            "void" => Type::Void,
            "String" | "java.lang.String" => Type::Str,
            "Object" | "java.lang.Object" => Type::Class("Object".into()),
            _ => return None,
        })
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Double | Type::Unknown)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Type::Int | Type::Long | Type::Double | Type::Boolean)
    }

    pub fn is_unknown(&self) -> bool {
        *self == Type::Unknown
    }

    /// Primitive to its box, for member lookup and assignment to references.
    pub fn boxed(&self) -> Option<&'static str> {
        match self {
            Type::Int => Some("Integer"),
            Type::Long => Some("Long"),
            Type::Double => Some("Double"),
            Type::Boolean => Some("Boolean"),
            _ => None,
        }
    }

    pub fn unboxed(name: &str) -> Option<Type> {
        match name {
            "Integer" => Some(Type::Int),
            "Long" => Some(Type::Long),
            "Double" => Some(Type::Double),
            "Boolean" => Some(Type::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::Long => f.write_str("long"),
            Type::Double => f.write_str("double"),
            Type::Boolean => f.write_str("boolean"),
            Type::Str => f.write_str("String"),
            Type::Void => f.write_str("void"),
            Type::Null | Type::Unknown => f.write_str("Object"),
            Type::Class(name) => f.write_str(name),
        }
    }
}

/// Binary numeric promotion.
pub fn promote(a: &Type, b: &Type) -> Option<Type> {
    let rank = |t: &Type| match t {
        Type::Int => Some(0),
        Type::Long => Some(1),
        Type::Double => Some(2),
        Type::Unknown => Some(3),
        _ => None,
    };
    let (ra, rb) = (rank(a)?, rank(b)?);
    Some(if ra >= rb { a.clone() } else { b.clone() })
}

// ── Library catalog ───────────────────────────────────────────────────────

pub struct LibraryClass {
    pub package: &'static str,
    pub name: &'static str,
    pub superclass: Option<&'static str>,
    /// Can be constructed with `new`; everything else is usable only as a type.
    pub instantiable: bool,
}

impl LibraryClass {
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.package, self.name)
    }
}

macro_rules! library {
    (@sup) => { None };
    (@sup $s:literal) => { Some($s) };
    (@new) => { false };
    (@new $n:ident) => { true };
    ($( $pkg:literal : $name:literal $(extends $sup:literal)? $(, $new:ident)? ;)*) => {
        &[$(LibraryClass {
            package: $pkg,
            name: $name,
            superclass: library!(@sup $($sup)?),
            instantiable: library!(@new $($new)?),
        },)*]
    };
}

const LIBRARY: &[LibraryClass] = library! {
    "java.lang": "Object", new;
    "java.lang": "String";
    "java.lang": "Integer";
    "java.lang": "Long";
    "java.lang": "Double";
    "java.lang": "Boolean";
    "java.lang": "Number";
    "java.lang": "Math";
    "java.lang": "System";
    "java.lang": "CharSequence";
    "java.lang": "Comparable";
    "java.lang": "Runnable";
    "java.lang": "Iterable";
    "java.lang": "StringBuilder";
    "java.lang": "Throwable", new;
    "java.lang": "Exception" extends "Throwable", new;
    "java.lang": "Error" extends "Throwable", new;
    "java.lang": "RuntimeException" extends "Exception", new;
    "java.lang": "ArithmeticException" extends "RuntimeException", new;
    "java.lang": "IllegalArgumentException" extends "RuntimeException", new;
    "java.lang": "NumberFormatException" extends "IllegalArgumentException", new;
    "java.lang": "IllegalStateException" extends "RuntimeException", new;
    "java.lang": "NullPointerException" extends "RuntimeException", new;
    "java.lang": "UnsupportedOperationException" extends "RuntimeException", new;
    "java.lang": "IndexOutOfBoundsException" extends "RuntimeException", new;
    "java.lang": "StringIndexOutOfBoundsException" extends "IndexOutOfBoundsException", new;
    "java.lang": "StackOverflowError" extends "Error", new;
    "java.lang": "LinkageError" extends "Error", new;
    "java.lang": "NoClassDefFoundError" extends "LinkageError", new;
    "java.lang": "NoSuchMethodError" extends "LinkageError", new;
    "java.lang": "NoSuchFieldError" extends "LinkageError", new;
    "java.lang": "AbstractMethodError" extends "LinkageError", new;
    "java.io": "PrintStream";
    "java.io": "File";
    "java.io": "IOException" extends "Exception", new;
    "java.util": "List";
    "java.util": "ArrayList";
    "java.util": "Map";
    "java.util": "HashMap";
    "java.util": "Set";
    "java.util": "HashSet";
    "java.util": "Optional";
    "java.util": "Random";
    "java.util": "Scanner";
    "java.util": "Objects";
    "java.util": "Arrays";
    "java.util": "Collections";
    "java.util.function": "Function";
    "java.util.function": "Supplier";
    "java.util.function": "Consumer";
    "java.util.function": "Predicate";
    "java.util.function": "BiFunction";
    "java.math": "BigInteger";
    "java.math": "BigDecimal";
    "java.time": "LocalDate";
    "java.time": "Duration";
    "java.time": "Instant";
};

/// A `java.lang` class or one reachable through `import`.
pub fn library_class(simple: &str) -> Option<&'static LibraryClass> {
    LIBRARY.iter().find(|c| c.name == simple)
}

pub fn library_qualified(path: &str) -> Option<&'static LibraryClass> {
    let (pkg, name) = path.rsplit_once('.')?;
    LIBRARY.iter().find(|c| c.package == pkg && c.name == name)
}

pub fn is_library_package(pkg: &str) -> bool {
    LIBRARY.iter().any(|c| c.package == pkg)
}

pub fn library_package(pkg: &str) -> impl Iterator<Item = &'static LibraryClass> + '_ {
    LIBRARY.iter().filter(move |c| c.package == pkg)
}

/// Walk the library superclass chain; `Object` is implicit at the top.
pub fn library_is_subclass(name: &str, ancestor: &str) -> bool {
    let mut current = Some(name);
    while let Some(n) = current {
        if n == ancestor {
            return true;
        }
        current = library_class(n).and_then(|c| c.superclass);
    }
    ancestor == "Object"
}

pub fn is_throwable_library(name: &str) -> bool {
    library_class(name).is_some() && library_is_subclass(name, "Throwable") && name != "Object"
}

/// A library method signature. A return of `"="` means "the promoted type
/// of the arguments" (`Math.max`).
pub struct LibraryMethod {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub ret: &'static str,
}

macro_rules! methods {
    ($( $name:literal ( $($p:literal),* ) $ret:literal ;)*) => {
        &[$(LibraryMethod { name: $name, params: &[$($p),*], ret: $ret },)*]
    };
}

pub fn static_methods(class: &str) -> &'static [LibraryMethod] {
    match class {
        "Math" => methods! {
            "abs"("double") "=";
            "max"("double", "double") "=";
            "min"("double", "double") "=";
            "pow"("double", "double") "double";
            "sqrt"("double") "double";
            "floor"("double") "double";
            "ceil"("double") "double";
        },
        "Integer" => methods! {
            "parseInt"("String") "int";
            "valueOf"("int") "int";
            "toString"("int") "String";
            "max"("int", "int") "int";
            "min"("int", "int") "int";
        },
        "Long" => methods! { "parseLong"("String") "long"; },
        "Double" => methods! { "parseDouble"("String") "double"; },
        "Boolean" => methods! { "parseBoolean"("String") "boolean"; },
        "String" => methods! { "valueOf"("Object") "String"; },
        "System" => methods! {
            "exit"("int") "void";
            "currentTimeMillis"() "long";
            "nanoTime"() "long";
        },
        _ => &[],
    }
}

pub fn static_field(class: &str, name: &str) -> Option<Type> {
    match (class, name) {
        ("Integer", "MAX_VALUE" | "MIN_VALUE") => Some(Type::Int),
        ("Long", "MAX_VALUE" | "MIN_VALUE") => Some(Type::Long),
        ("Math", "PI" | "E") => Some(Type::Double),
        ("System", "out" | "err") => Some(Type::Class("PrintStream".into())),
        _ => None,
    }
}

const OBJECT_METHODS: &[LibraryMethod] = methods! {
    "toString"() "String";
    "equals"("Object") "boolean";
    "hashCode"() "int";
};

/// Instance methods of a library receiver, most specific first. `Object`'s
/// methods are always included.
pub fn instance_methods(class: &str) -> impl Iterator<Item = &'static LibraryMethod> {
    let own: &'static [LibraryMethod] = match class {
        "String" => methods! {
            "length"() "int";
            "isEmpty"() "boolean";
            "substring"("int") "String";
            "substring"("int", "int") "String";
            "toUpperCase"() "String";
            "toLowerCase"() "String";
            "trim"() "String";
            "equalsIgnoreCase"("String") "boolean";
            "contains"("String") "boolean";
            "indexOf"("String") "int";
            "startsWith"("String") "boolean";
            "endsWith"("String") "boolean";
            "concat"("String") "String";
            "repeat"("int") "String";
        },
        "PrintStream" => methods! {
            "println"() "void";
            "println"("Object") "void";
            "print"("Object") "void";
        },
        c if is_throwable_library(c) => methods! { "getMessage"() "String"; },
        _ => &[],
    };
    own.iter().chain(OBJECT_METHODS.iter())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_picks_wider_type() {
        assert_eq!(promote(&Type::Int, &Type::Long), Some(Type::Long));
        assert_eq!(promote(&Type::Double, &Type::Int), Some(Type::Double));
        assert_eq!(promote(&Type::Str, &Type::Int), None);
    }

    #[test]
    fn exception_hierarchy() {
        assert!(library_is_subclass("ArithmeticException", "RuntimeException"));
        assert!(library_is_subclass("ArithmeticException", "Throwable"));
        assert!(!library_is_subclass("StackOverflowError", "Exception"));
        assert!(is_throwable_library("IOException"));
        assert!(!is_throwable_library("String"));
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(library_qualified("java.util.List").map(|c| c.name), Some("List"));
        assert!(library_qualified("java.util.Nope").is_none());
        assert!(is_library_package("java.util.function"));
        assert!(!is_library_package("com.example"));
        assert_eq!(library_class("RuntimeException").unwrap().qualified(), "java.lang.RuntimeException");
    }

    #[test]
    fn string_methods_include_object_methods() {
        let names: Vec<&str> = instance_methods("String").map(|m| m.name).collect();
        assert!(names.contains(&"length"));
        assert!(names.contains(&"hashCode"));
    }
}
