//! Per-language tree-sitter wiring.
//!
//! Each supported language maps file extensions to a grammar and tells
//! the generic extractor which node kinds declare symbols, how to pull a
//! declaration's name out of the tree, and what a call site looks like.

use tree_sitter::{Language, Node};

/// Languages the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    Go,
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Java,
    C,
    Cpp,
}

/// Every extension the walker treats as source code.
pub const SOURCE_EXTENSIONS: &[&str] = &[
    "go", "py", "pyi", "js", "mjs", "cjs", "jsx", "ts", "mts", "cts", "tsx", "rs", "java", "c",
    "h", "cc", "cpp", "cxx", "hpp", "hh", "hxx",
];

/// Grammar for a file extension, when the language is supported.
pub fn grammar_for_extension(ext: &str) -> Option<(Lang, Language)> {
    match ext {
        "go" => Some((Lang::Go, tree_sitter_go::language())),
        "py" | "pyi" => Some((Lang::Python, tree_sitter_python::language())),
        "js" | "mjs" | "cjs" | "jsx" => {
            Some((Lang::JavaScript, tree_sitter_javascript::language()))
        }
        "ts" | "mts" | "cts" => Some((
            Lang::TypeScript,
            tree_sitter_typescript::language_typescript(),
        )),
        "tsx" => Some((Lang::TypeScript, tree_sitter_typescript::language_tsx())),
        "rs" => Some((Lang::Rust, tree_sitter_rust::language())),
        "java" => Some((Lang::Java, tree_sitter_java::language())),
        "c" | "h" => Some((Lang::C, tree_sitter_c::language())),
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => {
            Some((Lang::Cpp, tree_sitter_cpp::language()))
        }
        _ => None,
    }
}

impl Lang {
    /// Separator used in `scope_path` and `qualified_name`.
    pub fn scope_separator(self) -> &'static str {
        match self {
            Self::Rust | Self::C | Self::Cpp => "::",
            _ => ".",
        }
    }

    /// Classify a declaration node. Returns the stored `node_type`.
    /// "function" is refined to "method" by the extractor when the
    /// enclosing scope is a type.
    pub fn decl_type(self, kind: &str) -> Option<&'static str> {
        match self {
            Self::Go => match kind {
                "function_declaration" => Some("function"),
                "method_declaration" => Some("method"),
                // type_spec is resolved by `go_type_spec_kind`
                _ => None,
            },
            Self::Python => match kind {
                "function_definition" => Some("function"),
                "class_definition" => Some("class"),
                _ => None,
            },
            Self::JavaScript => match kind {
                "function_declaration" | "generator_function_declaration" => Some("function"),
                "method_definition" => Some("method"),
                "class_declaration" => Some("class"),
                _ => None,
            },
            Self::TypeScript => match kind {
                "function_declaration" | "generator_function_declaration" => Some("function"),
                "method_definition" => Some("method"),
                "class_declaration" | "abstract_class_declaration" => Some("class"),
                "interface_declaration" => Some("interface"),
                "enum_declaration" => Some("enum"),
                "internal_module" => Some("module"),
                _ => None,
            },
            Self::Rust => match kind {
                "function_item" => Some("function"),
                "struct_item" => Some("struct"),
                "enum_item" => Some("enum"),
                "trait_item" => Some("interface"),
                "mod_item" => Some("module"),
                _ => None,
            },
            Self::Java => match kind {
                "method_declaration" | "constructor_declaration" => Some("method"),
                "class_declaration" => Some("class"),
                "interface_declaration" => Some("interface"),
                "enum_declaration" => Some("enum"),
                _ => None,
            },
            Self::C => match kind {
                "function_definition" => Some("function"),
                "struct_specifier" => Some("struct"),
                "enum_specifier" => Some("enum"),
                _ => None,
            },
            Self::Cpp => match kind {
                "function_definition" => Some("function"),
                "class_specifier" => Some("class"),
                "struct_specifier" => Some("struct"),
                "enum_specifier" => Some("enum"),
                "namespace_definition" => Some("module"),
                _ => None,
            },
        }
    }

    /// Nodes that contribute a scope segment without declaring a symbol
    /// themselves (`impl Foo { .. }`).
    pub fn is_scope_container(self, kind: &str) -> bool {
        matches!((self, kind), (Self::Rust, "impl_item"))
    }

    /// Scope segment for a scope-only container.
    pub fn scope_container_name(self, node: Node<'_>, src: &str) -> Option<String> {
        match (self, node.kind()) {
            (Self::Rust, "impl_item") => {
                let ty = node.child_by_field_name("type")?;
                Some(base_type_name(ty, src))
            }
            _ => None,
        }
    }

    /// Extract a declaration's name.
    pub fn decl_name(self, node: Node<'_>, src: &str) -> Option<String> {
        match (self, node.kind()) {
            (Self::C | Self::Cpp, "function_definition") => {
                c_function_name(node, src)
            }
            _ => {
                let name = node.child_by_field_name("name")?;
                text_of(name, src).map(|s| {
                    // qualified_identifier ("Foo::bar") keeps only the tail
                    s.rsplit("::").next().unwrap_or(&s).to_string()
                })
            }
        }
    }

    /// Extra scope segment a declaration introduces for its own qualified
    /// name, e.g. the receiver type of a Go method.
    pub fn decl_owner(self, node: Node<'_>, src: &str) -> Option<String> {
        match (self, node.kind()) {
            (Self::Go, "method_declaration") => {
                let receiver = node.child_by_field_name("receiver")?;
                let mut cursor = receiver.walk();
                for child in receiver.named_children(&mut cursor) {
                    if child.kind() == "parameter_declaration" {
                        if let Some(ty) = child.child_by_field_name("type") {
                            return Some(base_type_name(ty, src));
                        }
                    }
                }
                None
            }
            _ => None,
        }
    }

    /// When `node` is a call site, return the raw callee identifier.
    pub fn callee_name(self, node: Node<'_>, src: &str) -> Option<String> {
        let kind = node.kind();
        match self {
            Self::Python => {
                if kind != "call" {
                    return None;
                }
                let f = node.child_by_field_name("function")?;
                callee_of(f, src)
            }
            Self::Java => match kind {
                "method_invocation" => {
                    let name = node.child_by_field_name("name")?;
                    text_of(name, src)
                }
                "object_creation_expression" => {
                    let ty = node.child_by_field_name("type")?;
                    Some(base_type_name(ty, src))
                }
                _ => None,
            },
            _ => {
                match kind {
                    "call_expression" => {
                        let f = node.child_by_field_name("function")?;
                        callee_of(f, src)
                    }
                    // JS/TS `new Foo()`
                    "new_expression"
                        if matches!(self, Self::JavaScript | Self::TypeScript) =>
                    {
                        let c = node.child_by_field_name("constructor")?;
                        callee_of(c, src)
                    }
                    _ => None,
                }
            }
        }
    }
}

/// Resolve the rightmost identifier of a callable expression.
fn callee_of(node: Node<'_>, src: &str) -> Option<String> {
    match node.kind() {
        "identifier" | "field_identifier" | "type_identifier" => text_of(node, src),
        "attribute" => text_of(node.child_by_field_name("attribute")?, src),
        "member_expression" => text_of(node.child_by_field_name("property")?, src),
        "selector_expression" => text_of(node.child_by_field_name("field")?, src),
        "field_expression" => {
            let field = node.child_by_field_name("field")?;
            text_of(field, src)
        }
        "scoped_identifier" | "qualified_identifier" => {
            text_of(node.child_by_field_name("name")?, src)
        }
        "generic_function" => callee_of(node.child_by_field_name("function")?, src),
        "parenthesized_expression" => {
            let inner = node.named_child(0)?;
            callee_of(inner, src)
        }
        _ => None,
    }
}

/// Name of a C/C++ function: descend the declarator chain to the
/// innermost identifier.
fn c_function_name(node: Node<'_>, src: &str) -> Option<String> {
    let mut current = node.child_by_field_name("declarator")?;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" => return text_of(current, src),
            "qualified_identifier" => {
                current = current.child_by_field_name("name")?;
            }
            "function_declarator" | "pointer_declarator" | "parenthesized_declarator"
            | "reference_declarator" => {
                current = current
                    .child_by_field_name("declarator")
                    .or_else(|| current.named_child(0))?;
            }
            "destructor_name" | "operator_name" => return text_of(current, src),
            _ => return None,
        }
    }
}

/// Strip pointers, references and generics down to the base type name.
fn base_type_name(node: Node<'_>, src: &str) -> String {
    let raw = text_of(node, src).unwrap_or_default();
    raw.trim_start_matches(['*', '&'])
        .split(['<', '[', '('])
        .next()
        .unwrap_or("")
        .trim()
        .rsplit("::")
        .next()
        .unwrap_or("")
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_string()
}

fn text_of(node: Node<'_>, src: &str) -> Option<String> {
    node.utf8_text(src.as_bytes()).ok().map(str::to_string)
}

/// Go `type_spec` nodes declare structs or interfaces depending on the
/// underlying type.
pub fn go_type_spec_kind(node: Node<'_>) -> Option<&'static str> {
    if node.kind() != "type_spec" {
        return None;
    }
    let ty = node.child_by_field_name("type")?;
    match ty.kind() {
        "struct_type" => Some("struct"),
        "interface_type" => Some("interface"),
        _ => None,
    }
}
