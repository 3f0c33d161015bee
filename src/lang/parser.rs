use std::sync::Arc;

use crate::error::{Diag, Span};
use crate::lang::ast::*;

const KEYWORDS: &[&str] = &[
    "abstract", "boolean", "break", "case", "catch", "class", "continue", "default", "do",
    "double", "else", "enum", "extends", "false", "final", "finally", "for", "if", "implements",
    "import", "instanceof", "int", "interface", "long", "new", "null", "package", "private",
    "protected", "public", "return", "static", "super", "switch", "this", "throw", "throws",
    "true", "try", "void", "while",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Apply `.name` / `.name(args)` selectors to a primary expression.
fn apply_selectors(
    start: usize,
    primary: Expr,
    selectors: Vec<(String, Option<Vec<Expr>>, usize)>,
) -> Expr {
    selectors
        .into_iter()
        .fold(primary, |target, (name, call, end)| match call {
            Some(args) => Expr::Call {
                target: Some(Box::new(target)),
                name,
                args,
                span: (start, end),
            },
            None => Expr::Field {
                target: Box::new(target),
                name,
                span: (start, end),
            },
        })
}

peg::parser! {
    grammar java_parser() for str {
        rule line_comment() = "//" [^ '\n']*

        rule block_comment() = "/*" (!"*/" [_])* "*/"

        rule _() = quiet!{([' ' | '\t' | '\n' | '\r'] / line_comment() / block_comment())*}

        rule ident_start() = ['a'..='z' | 'A'..='Z' | '_' | '$']

        rule ident_char() = ['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '$']

        rule word() -> &'input str = $(ident_start() ident_char()*)

        rule kw(k: &'static str) = w:word() {? if w == k { Ok(()) } else { Err(k) } }

        rule ident() -> String
            = quiet!{ w:word() {? if is_keyword(w) { Err("identifier") } else { Ok(w.to_string()) } } }
            / expected!("identifier")

        rule qualified() -> String
            = first:ident() rest:("." n:ident() { n })*
              {
                  let mut name = first;
                  for part in rest {
                      name.push('.');
                      name.push_str(&part);
                  }
                  name
              }

        rule primitive() -> String
            = w:word() {?
                match w {
                    "int" | "long" | "double" | "boolean" | "void" | "var" => Ok(w.to_string()),
                    _ => Err("type"),
                }
            }

        rule type_ref() -> TypeRef
            = s:position!() name:(primitive() / qualified()) e:position!()
              { TypeRef { name, span: (s, e) } }

        // ── Modifiers ─────────────────────────────────────────────────────

        rule modifier_word() -> Modifier
            = w:word() {?
                match w {
                    "public" => Ok(Modifier::Public),
                    "protected" => Ok(Modifier::Protected),
                    "private" => Ok(Modifier::Private),
                    "static" => Ok(Modifier::Static),
                    "final" => Ok(Modifier::Final),
                    "abstract" => Ok(Modifier::Abstract),
                    "default" => Ok(Modifier::Default),
                    _ => Err("modifier"),
                }
            }

        rule annotation()
            = "@" _ !kw("interface") qualified() (_ "(" _ (expr() ** (_ "," _)) _ ")")?

        rule mod_item() -> Option<(Modifier, Span)>
            = s:position!() m:modifier_word() e:position!() _ { Some((m, (s, e))) }
            / annotation() _ { None }

        rule modifiers() -> Modifiers
            = ms:mod_item()* { Modifiers(ms.into_iter().flatten().collect()) }

        // ── Declarations ──────────────────────────────────────────────────

        rule import_decl() -> ImportDecl
            = s:position!() kw("import") _ st:(kw("static") _)? path:qualified()
              od:(_ "." _ "*")? e:position!()
              {
                  ImportDecl {
                      path,
                      is_static: st.is_some(),
                      on_demand: od.is_some(),
                      span: (s, e),
                  }
              }

        rule type_list() -> Vec<TypeRef>
            = ts:(type_ref() ++ (_ "," _)) { ts }

        rule param() -> Param
            = s:position!() (kw("final") _)? ty:type_ref() _ name:ident() e:position!()
              { Param { ty, name, span: (s, e) } }

        rule params() -> Vec<Param>
            = ps:(param() ** (_ "," _)) { ps }

        rule throws_clause() = kw("throws") _ type_list() _

        rule var_decl_core() -> VarDecl
            = s:position!() modifiers:modifiers() ty:type_ref() _
              ns:position!() name:ident() ne:position!()
              init:(_ "=" !"=" _ x:expr() { x })? e:position!()
              {
                  VarDecl {
                      modifiers,
                      ty,
                      name,
                      name_span: (ns, ne),
                      init,
                      span: (s, e),
                  }
              }

        rule method_decl() -> MethodDecl
            = s:position!() modifiers:modifiers() ret:type_ref() _
              ns:position!() name:ident() ne:position!() _
              "(" _ params:params() _ ")" _ throws_clause()?
              body:(b:block() { Some(b) } / ";" { None }) e:position!()
              {
                  MethodDecl {
                      modifiers,
                      ret,
                      name,
                      name_span: (ns, ne),
                      params,
                      body,
                      span: (s, e),
                  }
              }

        rule constructor_decl() -> ConstructorDecl
            = s:position!() modifiers:modifiers() name:ident() _
              "(" _ params:params() _ ")" _ throws_clause()? body:block() e:position!()
              { ConstructorDecl { modifiers, name, params, body, span: (s, e) } }

        rule member() -> Member
            = m:(
                m:method_decl() { Member::Method(Arc::new(m)) }
              / c:constructor_decl() { Member::Constructor(c) }
              / v:var_decl_core() _ ";" { Member::Field(v) }
            ) _ { m }

        rule class_body() -> Vec<Member>
            = "{" _ members:member()* "}" { members }

        rule class_decl() -> TypeDecl
            = s:position!() modifiers:modifiers() kw("class") _
              ns:position!() name:ident() ne:position!() _
              ext:(kw("extends") _ t:type_ref() _ { t })?
              imp:(kw("implements") _ ts:type_list() _ { ts })?
              members:class_body() e:position!()
              {
                  TypeDecl {
                      kind: TypeKind::Class,
                      modifiers,
                      name,
                      name_span: (ns, ne),
                      extends: ext.into_iter().collect(),
                      implements: imp.unwrap_or_default(),
                      components: Vec::new(),
                      constants: Vec::new(),
                      members,
                      span: (s, e),
                  }
              }

        rule interface_decl() -> TypeDecl
            = s:position!() modifiers:modifiers() kw("interface") _
              ns:position!() name:ident() ne:position!() _
              ext:(kw("extends") _ ts:type_list() _ { ts })?
              members:class_body() e:position!()
              {
                  TypeDecl {
                      kind: TypeKind::Interface,
                      modifiers,
                      name,
                      name_span: (ns, ne),
                      extends: ext.unwrap_or_default(),
                      implements: Vec::new(),
                      components: Vec::new(),
                      constants: Vec::new(),
                      members,
                      span: (s, e),
                  }
              }

        rule annotation_decl() -> TypeDecl
            = s:position!() modifiers:modifiers() "@" _ kw("interface") _
              ns:position!() name:ident() ne:position!() _
              members:class_body() e:position!()
              {
                  TypeDecl {
                      kind: TypeKind::Annotation,
                      modifiers,
                      name,
                      name_span: (ns, ne),
                      extends: Vec::new(),
                      implements: Vec::new(),
                      components: Vec::new(),
                      constants: Vec::new(),
                      members,
                      span: (s, e),
                  }
              }

        rule enum_constant() -> (String, Span)
            = s:position!() name:ident() e:position!() { (name, (s, e)) }

        rule enum_decl() -> TypeDecl
            = s:position!() modifiers:modifiers() kw("enum") _
              ns:position!() name:ident() ne:position!() _
              imp:(kw("implements") _ ts:type_list() _ { ts })?
              "{" _ constants:(enum_constant() ** (_ "," _)) _ ("," _)?
              members:(";" _ ms:member()* { ms })? "}" e:position!()
              {
                  TypeDecl {
                      kind: TypeKind::Enum,
                      modifiers,
                      name,
                      name_span: (ns, ne),
                      extends: Vec::new(),
                      implements: imp.unwrap_or_default(),
                      components: Vec::new(),
                      constants,
                      members: members.unwrap_or_default(),
                      span: (s, e),
                  }
              }

        rule record_decl() -> TypeDecl
            = s:position!() modifiers:modifiers() kw("record") _
              ns:position!() name:ident() ne:position!() _
              "(" _ components:params() _ ")" _
              imp:(kw("implements") _ ts:type_list() _ { ts })?
              members:class_body() e:position!()
              {
                  TypeDecl {
                      kind: TypeKind::Record,
                      modifiers,
                      name,
                      name_span: (ns, ne),
                      extends: Vec::new(),
                      implements: imp.unwrap_or_default(),
                      components,
                      constants: Vec::new(),
                      members,
                      span: (s, e),
                  }
              }

        rule type_decl() -> TypeDecl
            = class_decl() / interface_decl() / annotation_decl() / enum_decl() / record_decl()

        // ── Statements ────────────────────────────────────────────────────

        rule block() -> Block
            = s:position!() "{" _ stmts:(st:stmt() _ { st })* "}" e:position!()
              { Block { stmts, span: (s, e) } }

        rule for_init() -> Box<Stmt>
            = v:var_decl_core() { Box::new(Stmt::Local(v)) }
            / x:expr() { Box::new(Stmt::Expr(x)) }

        rule catch_clause() -> Catch
            = s:position!() kw("catch") _ "(" _ (kw("final") _)?
              types:(type_ref() ++ (_ "|" _)) _ name:ident() _ ")" _ body:block() e:position!()
              { Catch { types, name, body, span: (s, e) } }

        rule keyword_stmt() -> Stmt
            = b:block() { Stmt::Block(b) }
            / s:position!() kw("if") _ "(" _ cond:expr() _ ")" _ then:stmt()
              els:(_ kw("else") _ x:stmt() { x })? e:position!()
              {
                  Stmt::If {
                      cond,
                      then: Box::new(then),
                      els: els.map(Box::new),
                      span: (s, e),
                  }
              }
            / s:position!() kw("while") _ "(" _ cond:expr() _ ")" _ body:stmt() e:position!()
              { Stmt::While { cond, body: Box::new(body), span: (s, e) } }
            / s:position!() kw("do") _ body:stmt() _ kw("while") _ "(" _ cond:expr() _ ")" _ ";"
              e:position!()
              { Stmt::DoWhile { body: Box::new(body), cond, span: (s, e) } }
            / s:position!() kw("for") _ "(" _ init:for_init()? _ ";" _ cond:expr()? _ ";" _
              update:(expr() ** (_ "," _)) _ ")" _ body:stmt() e:position!()
              {
                  Stmt::For {
                      init,
                      cond,
                      update,
                      body: Box::new(body),
                      span: (s, e),
                  }
              }
            / s:position!() kw("return") _ value:expr()? _ ";" e:position!()
              { Stmt::Return { value, span: (s, e) } }
            / s:position!() kw("throw") _ value:expr() _ ";" e:position!()
              { Stmt::Throw { value, span: (s, e) } }
            / s:position!() kw("try") _ body:block() _ catches:(c:catch_clause() _ { c })*
              finally:(kw("finally") _ b:block() { b })? e:position!()
              { Stmt::Try { body, catches, finally, span: (s, e) } }
            / s:position!() kw("break") _ ";" e:position!() { Stmt::Break((s, e)) }
            / s:position!() kw("continue") _ ";" e:position!() { Stmt::Continue((s, e)) }

        rule stmt() -> Stmt
            = keyword_stmt()
            / s:position!() kw("super") _ "(" _ args:args() _ ")" _ ";" e:position!()
              { Stmt::SuperCall { args, span: (s, e) } }
            / v:var_decl_core() _ ";" { Stmt::Local(v) }
            / x:expr() _ ";" { Stmt::Expr(x) }
            / s:position!() ";" e:position!() { Stmt::Empty((s, e)) }

        // ── Expressions ───────────────────────────────────────────────────

        rule args() -> Vec<Expr>
            = a:(expr() ** (_ "," _)) { a }

        rule string_char() -> char
            = "\\n" { '\n' }
            / "\\t" { '\t' }
            / "\\r" { '\r' }
            / "\\\\" { '\\' }
            / "\\\"" { '"' }
            / "\\'" { '\'' }
            / c:[^ '"' | '\\' | '\n'] { c }

        rule literal() -> Expr
            = s:position!() n:$(['0'..='9']+ "." ['0'..='9']+) ['d' | 'D']? e:position!()
              {? n.parse::<f64>().map(|value| Expr::Double { value, span: (s, e) }).or(Err("number")) }
            / s:position!() n:$(['0'..='9']+) l:['l' | 'L']? !ident_char() e:position!()
              {?
                  n.parse::<i64>()
                      .map(|value| Expr::Int { value, long: l.is_some(), span: (s, e) })
                      .or(Err("integer"))
              }
            / s:position!() "\"" chars:string_char()* "\"" e:position!()
              { Expr::Str { value: chars.into_iter().collect(), span: (s, e) } }
            / s:position!() kw("true") e:position!() { Expr::Bool { value: true, span: (s, e) } }
            / s:position!() kw("false") e:position!() { Expr::Bool { value: false, span: (s, e) } }
            / s:position!() kw("null") e:position!() { Expr::Null((s, e)) }

        rule primary() -> Expr
            = "(" _ x:expr() _ ")" { x }
            / literal()
            / s:position!() kw("new") _ ty:type_ref() _ "(" _ args:args() _ ")" e:position!()
              { Expr::New { ty, args, span: (s, e) } }
            / s:position!() kw("this") e:position!() { Expr::This((s, e)) }
            / s:position!() name:ident() call:(_ "(" _ a:args() _ ")" { a })? e:position!()
              {
                  match call {
                      Some(args) => Expr::Call { target: None, name, args, span: (s, e) },
                      None => Expr::Name { name, span: (s, e) },
                  }
              }

        rule selector() -> (String, Option<Vec<Expr>>, usize)
            = _ "." _ name:ident() call:(_ "(" _ a:args() _ ")" { a })? e:position!()
              { (name, call, e) }

        rule postfix() -> Expr
            = s:position!() p:primary() sels:selector()*
              inc:(_ op:$("++" / "--") e:position!() { (op, e) })?
              {
                  let target = apply_selectors(s, p, sels);
                  match inc {
                      Some((op, e)) => Expr::IncDec {
                          target: Box::new(target),
                          increment: op == "++",
                          prefix: false,
                          span: (s, e),
                      },
                      None => target,
                  }
              }

        rule unary() -> Expr
            = s:position!() "++" _ x:unary() e:position!()
              { Expr::IncDec { target: Box::new(x), increment: true, prefix: true, span: (s, e) } }
            / s:position!() "--" _ x:unary() e:position!()
              { Expr::IncDec { target: Box::new(x), increment: false, prefix: true, span: (s, e) } }
            / s:position!() "-" _ x:unary() e:position!()
              { Expr::Unary { op: UnaryOp::Neg, expr: Box::new(x), span: (s, e) } }
            / s:position!() "!" _ x:unary() e:position!()
              { Expr::Unary { op: UnaryOp::Not, expr: Box::new(x), span: (s, e) } }
            / "+" _ x:unary() { x }
            / postfix()

        rule binary() -> Expr = precedence!{
            x:(@) _ "||" _ y:@ { bin(BinOp::Or, x, y) }
            --
            x:(@) _ "&&" _ y:@ { bin(BinOp::And, x, y) }
            --
            x:(@) _ "==" _ y:@ { bin(BinOp::Eq, x, y) }
            x:(@) _ "!=" _ y:@ { bin(BinOp::Ne, x, y) }
            --
            x:(@) _ "<=" _ y:@ { bin(BinOp::Le, x, y) }
            x:(@) _ ">=" _ y:@ { bin(BinOp::Ge, x, y) }
            x:(@) _ "<" _ y:@ { bin(BinOp::Lt, x, y) }
            x:(@) _ ">" _ y:@ { bin(BinOp::Gt, x, y) }
            x:@ _ kw("instanceof") _ ty:type_ref() { Expr::InstanceOf { expr: Box::new(x), ty } }
            --
            x:(@) _ "+" _ y:@ { bin(BinOp::Add, x, y) }
            x:(@) _ "-" _ y:@ { bin(BinOp::Sub, x, y) }
            --
            x:(@) _ "*" _ y:@ { bin(BinOp::Mul, x, y) }
            x:(@) _ "/" _ y:@ { bin(BinOp::Div, x, y) }
            x:(@) _ "%" _ y:@ { bin(BinOp::Rem, x, y) }
            --
            u:unary() { u }
        }

        rule ternary() -> Expr
            = c:binary() rest:(_ "?" _ t:expr() _ ":" _ f:ternary() { (t, f) })?
              {
                  match rest {
                      Some((t, f)) => Expr::Cond {
                          cond: Box::new(c),
                          then: Box::new(t),
                          els: Box::new(f),
                      },
                      None => c,
                  }
              }

        rule assign_op() -> AssignOp
            = "+=" { Some(BinOp::Add) }
            / "-=" { Some(BinOp::Sub) }
            / "*=" { Some(BinOp::Mul) }
            / "/=" { Some(BinOp::Div) }
            / "%=" { Some(BinOp::Rem) }
            / "=" !"=" { None }

        rule expr() -> Expr
            = t:ternary() rest:(_ op:assign_op() _ v:expr() { (op, v) })?
              {
                  match rest {
                      Some((op, v)) => Expr::Assign {
                          op,
                          target: Box::new(t),
                          value: Box::new(v),
                      },
                      None => t,
                  }
              }

        // ── Snippets ──────────────────────────────────────────────────────

        rule item() -> Item
            = i:import_decl() { Item::Import(i) }
            / t:type_decl() { Item::Type(Arc::new(t)) }
            / m:method_decl() { Item::Method(Arc::new(m)) }
            / v:var_decl_core() { Item::Var(v) }
            / s:keyword_stmt() { Item::Stmt(s) }
            / x:expr() { Item::Expr(x) }

        pub rule snippet() -> Item
            = _ i:item() _ (";" _)* ![_] { i }
    }
}

/// Parse one snippet's source text.
pub fn parse_fragment(source: &str) -> Result<Fragment, Diag> {
    java_parser::snippet(source)
        .map(|item| Fragment {
            source: Arc::from(source),
            item,
        })
        .map_err(|e| {
            let offset = e.location.offset;
            Diag::error(
                "expected",
                (offset, offset + 1),
                format!("expected {}", e.expected),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(src: &str) -> Item {
        parse_fragment(src).unwrap().item
    }

    #[test]
    fn parse_method_with_forward_call() {
        match item("int x() { return g(); }") {
            Item::Method(m) => {
                assert_eq!(m.name, "x");
                assert_eq!(m.ret.name, "int");
                assert!(m.params.is_empty());
                assert_eq!(m.body.as_ref().unwrap().stmts.len(), 1);
            }
            other => panic!("expected method, got {:?}", other),
        }
    }

    #[test]
    fn parse_var_without_semicolon() {
        match item("int x = 5") {
            Item::Var(v) => {
                assert_eq!(v.name, "x");
                assert_eq!(v.ty.name, "int");
                assert!(matches!(v.init, Some(Expr::Int { value: 5, .. })));
            }
            other => panic!("expected var, got {:?}", other),
        }
    }

    #[test]
    fn parse_class_with_members() {
        let src = "class A extends B implements I, J { int n; A(int n) { this.n = n; } int get() { return n; } }";
        match item(src) {
            Item::Type(t) => {
                assert_eq!(t.kind, TypeKind::Class);
                assert_eq!(t.name, "A");
                assert_eq!(t.extends[0].name, "B");
                assert_eq!(t.implements.len(), 2);
                assert_eq!(t.fields().count(), 1);
                assert_eq!(t.constructors().count(), 1);
                assert_eq!(t.methods().count(), 1);
            }
            other => panic!("expected class, got {:?}", other),
        }
    }

    #[test]
    fn parse_enum_and_record() {
        match item("enum Color { RED, GREEN, }") {
            Item::Type(t) => {
                assert_eq!(t.kind, TypeKind::Enum);
                assert_eq!(t.constants.len(), 2);
            }
            other => panic!("expected enum, got {:?}", other),
        }
        match item("record Point(int x, int y) {}") {
            Item::Type(t) => {
                assert_eq!(t.kind, TypeKind::Record);
                assert_eq!(t.components.len(), 2);
            }
            other => panic!("expected record, got {:?}", other),
        }
        match item("@interface Marker { int value(); }") {
            Item::Type(t) => assert_eq!(t.kind, TypeKind::Annotation),
            other => panic!("expected annotation, got {:?}", other),
        }
    }

    #[test]
    fn parse_imports() {
        match item("import static java.lang.Math.*;") {
            Item::Import(i) => {
                assert!(i.is_static && i.on_demand);
                assert_eq!(i.target(), "java.lang.Math.*");
            }
            other => panic!("expected import, got {:?}", other),
        }
        match item("import java.util.List") {
            Item::Import(i) => assert_eq!(i.target(), "java.util.List"),
            other => panic!("expected import, got {:?}", other),
        }
    }

    #[test]
    fn parse_expressions() {
        assert!(matches!(item("x"), Item::Expr(Expr::Name { .. })));
        assert!(matches!(item("x = 6"), Item::Expr(Expr::Assign { op: None, .. })));
        assert!(matches!(item("x += 1"), Item::Expr(Expr::Assign { op: Some(BinOp::Add), .. })));
        assert!(matches!(item("x++"), Item::Expr(Expr::IncDec { prefix: false, .. })));
        assert!(matches!(item("a == b"), Item::Expr(Expr::Binary { op: BinOp::Eq, .. })));
        assert!(matches!(
            item("System.out.println(1)"),
            Item::Expr(Expr::Call { .. })
        ));
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        match item("1 + 2 * 3") {
            Item::Expr(Expr::Binary { op, rhs, .. }) => {
                assert_eq!(op, BinOp::Add);
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_statements() {
        assert!(matches!(item("if (a) b(); else c();"), Item::Stmt(Stmt::If { .. })));
        assert!(matches!(item("while (true) {}"), Item::Stmt(Stmt::While { .. })));
        assert!(matches!(
            item("for (int i = 0; i < 3; i++) s += i;"),
            Item::Stmt(Stmt::For { .. })
        ));
        assert!(matches!(
            item("try { f(); } catch (RuntimeException e) { g(); } finally { h(); }"),
            Item::Stmt(Stmt::Try { .. })
        ));
    }

    #[test]
    fn comments_are_whitespace() {
        assert!(matches!(
            item("// leading\nint /* inline */ y = 2; // trailing"),
            Item::Var(_)
        ));
    }

    #[test]
    fn keywords_are_not_identifiers() {
        assert!(parse_fragment("int class = 3").is_err());
    }

    #[test]
    fn syntax_error_reports_offset() {
        let err = parse_fragment("int x = ;").unwrap_err();
        assert_eq!(err.code, "expected");
        assert_eq!(err.span.0, 8);
        assert!(err.message.starts_with("expected "));
    }

    #[test]
    fn spans_cover_source() {
        let src = "  int g() { return 5; }";
        match item(src) {
            Item::Method(m) => assert_eq!(m.span, (2, src.len())),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn modifier_and_constant_spans() {
        match item("static final int K = 1") {
            Item::Var(v) => assert_eq!(
                v.modifiers.0,
                vec![(Modifier::Static, (0, 6)), (Modifier::Final, (7, 12))]
            ),
            other => panic!("unexpected {:?}", other),
        }
        match item("enum E { A, BB }") {
            Item::Type(t) => assert_eq!(
                t.constants,
                vec![("A".to_string(), (9, 10)), ("BB".to_string(), (12, 14))]
            ),
            other => panic!("unexpected {:?}", other),
        }
    }
}
