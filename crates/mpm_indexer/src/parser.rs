//! Generic symbol and call extraction over a tree-sitter parse tree.
//!
//! One walk per file. Declarations push a scope frame, so nested
//! declarations get a `scope_path` like `SessionManager::GetSession`.
//! Call sites attach to the nearest enclosing declaration; callee names
//! are stored raw and resolved to canonical ids in a post-pass.

use crate::lang::{go_type_spec_kind, grammar_for_extension, Lang};
use crate::types::{canonical_id, FileParse, ParsedCall, ParsedSymbol};
use crate::IndexError;
use std::collections::HashMap;
use tree_sitter::{Node, Parser};

const MAX_SIGNATURE_LEN: usize = 200;

/// Parse one file into symbols and call edges. `rel_path` is the
/// project-relative forward-slash path used in canonical ids.
pub fn parse_file(rel_path: &str, ext: &str, source: &str) -> Result<FileParse, IndexError> {
    let Some((lang, grammar)) = grammar_for_extension(ext) else {
        return Ok(FileParse::default());
    };

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parser(rel_path.to_string(), e.to_string()))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parser(rel_path.to_string(), "parse returned no tree".into()))?;

    let mut extractor = Extractor {
        lang,
        src: source,
        rel_path,
        scope: Vec::new(),
        symbol_stack: Vec::new(),
        by_canonical: HashMap::new(),
        out: FileParse::default(),
    };
    extractor.visit(tree.root_node());
    Ok(extractor.out)
}

struct ScopeFrame {
    name: String,
    is_type: bool,
}

struct Extractor<'a> {
    lang: Lang,
    src: &'a str,
    rel_path: &'a str,
    scope: Vec<ScopeFrame>,
    symbol_stack: Vec<usize>,
    by_canonical: HashMap<String, usize>,
    out: FileParse,
}

impl<'a> Extractor<'a> {
    fn visit(&mut self, node: Node<'a>) {
        let kind = node.kind();

        // Scope-only containers (impl blocks).
        if self.lang.is_scope_container(kind) {
            let pushed = match self.lang.scope_container_name(node, self.src) {
                Some(name) if !name.is_empty() => {
                    self.scope.push(ScopeFrame {
                        name,
                        is_type: true,
                    });
                    true
                }
                _ => false,
            };
            self.visit_children(node);
            if pushed {
                self.scope.pop();
            }
            return;
        }

        let mut decl_type = self
            .lang
            .decl_type(kind)
            .or_else(|| go_type_spec_kind(node));

        // C/C++ type specifiers also appear as bare references
        // (`struct buffer *b`); only definitions carry a body.
        if matches!(
            kind,
            "struct_specifier" | "class_specifier" | "enum_specifier"
        ) && node.child_by_field_name("body").is_none()
        {
            decl_type = None;
        }

        if let Some(node_type) = decl_type {
            if let Some(name) = self.lang.decl_name(node, self.src) {
                self.visit_declaration(node, node_type, name);
                return;
            }
        }

        if let Some(callee) = self.lang.callee_name(node, self.src) {
            self.record_call(node, callee);
        }

        self.visit_children(node);
    }

    fn visit_children(&mut self, node: Node<'a>) {
        for i in 0..node.named_child_count() {
            if let Some(child) = node.named_child(i) {
                self.visit(child);
            }
        }
    }

    fn visit_declaration(&mut self, node: Node<'a>, node_type: &'static str, name: String) {
        let sep = self.lang.scope_separator();
        let owner = self.lang.decl_owner(node, self.src).filter(|o| !o.is_empty());

        let node_type = if node_type == "function"
            && (owner.is_some() || self.scope.last().is_some_and(|f| f.is_type))
        {
            "method"
        } else {
            node_type
        };

        let mut segments: Vec<&str> = self.scope.iter().map(|f| f.name.as_str()).collect();
        if let Some(ref o) = owner {
            segments.push(o);
        }
        let scope_path = segments.join(sep);
        let qualified_name = if scope_path.is_empty() {
            name.clone()
        } else {
            format!("{}{}{}", scope_path, sep, name)
        };

        let canonical = canonical_id(node_type, self.rel_path, &qualified_name);
        let index = match self.by_canonical.get(&canonical) {
            // Overloads collapse onto the first declaration.
            Some(&existing) => existing,
            None => {
                let symbol = ParsedSymbol {
                    canonical_id: canonical.clone(),
                    name: name.clone(),
                    qualified_name,
                    scope_path,
                    node_type,
                    line_start: node.start_position().row as i64 + 1,
                    line_end: node.end_position().row as i64 + 1,
                    signature: signature_of(node, self.src),
                };
                self.out.symbols.push(symbol);
                let index = self.out.symbols.len() - 1;
                self.by_canonical.insert(canonical, index);
                index
            }
        };

        let is_type = matches!(node_type, "class" | "struct" | "interface" | "enum");
        self.scope.push(ScopeFrame { name, is_type });
        self.symbol_stack.push(index);
        self.visit_children(node);
        self.symbol_stack.pop();
        self.scope.pop();
    }

    fn record_call(&mut self, node: Node<'a>, callee: String) {
        let Some(&caller) = self.symbol_stack.last() else {
            return; // top-level call, no enclosing declaration
        };
        if callee.is_empty() {
            return;
        }
        self.out.calls.push(ParsedCall {
            caller,
            callee_name: callee,
            line: node.start_position().row as i64 + 1,
        });
    }
}

/// First line of the declaration, trimmed and capped.
fn signature_of(node: Node<'_>, src: &str) -> String {
    let text = node.utf8_text(src.as_bytes()).unwrap_or_default();
    let mut line = text.lines().next().unwrap_or("").trim().to_string();
    if line.len() > MAX_SIGNATURE_LEN {
        line.truncate(MAX_SIGNATURE_LEN);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(parse: &FileParse) -> Vec<(&str, &str)> {
        parse
            .symbols
            .iter()
            .map(|s| (s.node_type, s.qualified_name.as_str()))
            .collect()
    }

    #[test]
    fn go_functions_methods_and_types() {
        let src = r#"
package auth

type Session struct {
    ID string
}

type Store interface {
    Get(id string) *Session
}

func Login(name string) *Session {
    s := makeSession(name)
    audit(s)
    return s
}

func (m *Manager) GetSession(id string) *Session {
    return m.lookup(id)
}
"#;
        let parse = parse_file("auth/a.go", "go", src).unwrap();
        let ns = names(&parse);
        assert!(ns.contains(&("struct", "Session")));
        assert!(ns.contains(&("interface", "Store")));
        assert!(ns.contains(&("function", "Login")));
        assert!(ns.contains(&("method", "Manager.GetSession")));

        let login = parse
            .symbols
            .iter()
            .position(|s| s.name == "Login")
            .unwrap();
        let callees: Vec<&str> = parse
            .calls
            .iter()
            .filter(|c| c.caller == login)
            .map(|c| c.callee_name.as_str())
            .collect();
        assert!(callees.contains(&"makeSession"));
        assert!(callees.contains(&"audit"));

        let get_session = parse
            .symbols
            .iter()
            .find(|s| s.name == "GetSession")
            .unwrap();
        assert_eq!(get_session.scope_path, "Manager");
        assert_eq!(
            get_session.canonical_id,
            "method:auth/a.go::Manager.GetSession"
        );
    }

    #[test]
    fn python_classes_and_nested_methods() {
        let src = r#"
class SessionManager:
    def get_session(self, sid):
        return self.lookup(sid)

def login(name):
    mgr = SessionManager()
    return mgr.get_session(name)
"#;
        let parse = parse_file("api/b.py", "py", src).unwrap();
        let ns = names(&parse);
        assert!(ns.contains(&("class", "SessionManager")));
        assert!(ns.contains(&("method", "SessionManager.get_session")));
        assert!(ns.contains(&("function", "login")));

        let login = parse
            .symbols
            .iter()
            .position(|s| s.name == "login")
            .unwrap();
        let callees: Vec<&str> = parse
            .calls
            .iter()
            .filter(|c| c.caller == login)
            .map(|c| c.callee_name.as_str())
            .collect();
        assert!(callees.contains(&"SessionManager"));
        assert!(callees.contains(&"get_session"));
    }

    #[test]
    fn rust_impl_methods_get_type_scope() {
        let src = r#"
pub struct Cache {
    entries: Vec<String>,
}

impl Cache {
    pub fn lookup(&self, key: &str) -> Option<&String> {
        self.entries.iter().find(|e| e.as_str() == key)
    }
}

pub fn warm(cache: &Cache) {
    cache.lookup("seed");
}
"#;
        let parse = parse_file("src/cache.rs", "rs", src).unwrap();
        let ns = names(&parse);
        assert!(ns.contains(&("struct", "Cache")));
        assert!(ns.contains(&("method", "Cache::lookup")));
        assert!(ns.contains(&("function", "warm")));

        let warm = parse.symbols.iter().position(|s| s.name == "warm").unwrap();
        assert!(parse
            .calls
            .iter()
            .any(|c| c.caller == warm && c.callee_name == "lookup"));
    }

    #[test]
    fn typescript_interfaces_and_enums() {
        let src = r#"
export interface User {
    id: string;
}

export enum Role {
    Admin,
    Member,
}

export class Directory {
    find(id: string): User | null {
        return lookup(id);
    }
}
"#;
        let parse = parse_file("src/users.ts", "ts", src).unwrap();
        let ns = names(&parse);
        assert!(ns.contains(&("interface", "User")));
        assert!(ns.contains(&("enum", "Role")));
        assert!(ns.contains(&("class", "Directory")));
        assert!(ns.contains(&("method", "Directory.find")));
    }

    #[test]
    fn java_methods_and_constructor_calls() {
        let src = r#"
public class Billing {
    public Invoice charge(Account account) {
        Invoice invoice = new Invoice(account);
        return finalize(invoice);
    }
}
"#;
        let parse = parse_file("src/Billing.java", "java", src).unwrap();
        let ns = names(&parse);
        assert!(ns.contains(&("class", "Billing")));
        assert!(ns.contains(&("method", "Billing.charge")));

        let charge = parse
            .symbols
            .iter()
            .position(|s| s.name == "charge")
            .unwrap();
        let callees: Vec<&str> = parse
            .calls
            .iter()
            .filter(|c| c.caller == charge)
            .map(|c| c.callee_name.as_str())
            .collect();
        assert!(callees.contains(&"Invoice"));
        assert!(callees.contains(&"finalize"));
    }

    #[test]
    fn c_function_names_descend_declarators() {
        let src = r#"
struct buffer {
    int len;
};

static int *grow(struct buffer *b, int by) {
    return resize(b, by);
}
"#;
        let parse = parse_file("src/buf.c", "c", src).unwrap();
        let ns = names(&parse);
        assert!(ns.contains(&("struct", "buffer")));
        assert!(ns.contains(&("function", "grow")));

        let grow = parse.symbols.iter().position(|s| s.name == "grow").unwrap();
        assert!(parse
            .calls
            .iter()
            .any(|c| c.caller == grow && c.callee_name == "resize"));
    }

    #[test]
    fn unknown_extension_yields_empty_parse() {
        let parse = parse_file("readme.md", "md", "# nothing").unwrap();
        assert!(parse.symbols.is_empty());
        assert!(parse.calls.is_empty());
    }

    #[test]
    fn reparsing_unchanged_source_is_canonical_id_stable() {
        let src = "def a():\n    b()\n\ndef b():\n    pass\n";
        let one = parse_file("m.py", "py", src).unwrap();
        let two = parse_file("m.py", "py", src).unwrap();
        let ids1: Vec<&String> = one.symbols.iter().map(|s| &s.canonical_id).collect();
        let ids2: Vec<&String> = two.symbols.iter().map(|s| &s.canonical_id).collect();
        assert_eq!(ids1, ids2);
    }
}
