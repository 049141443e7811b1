use super::*;
use scc_ast::{
    DataTypeExprKind, ExprKind, GlobalDecl, NodeIdGen, ProcDefKind, SecTypeExprKind, StmtKind,
    Subscript, TypeExprKind,
};
use scc_common::{CompileLog, Interner, SourceMap};

fn parse_ok(text: &str) -> (scc_ast::Module, Interner) {
    let mut sources = SourceMap::new();
    let file = sources.add_file("test.sc", text);
    let mut interner = Interner::new();
    let mut idgen = NodeIdGen::new();
    let mut log = CompileLog::new();
    let module = parse_module(file, &sources, &mut interner, &mut idgen, &mut log)
        .unwrap_or_else(|_| panic!("parse failed: {log}"));
    (module, interner)
}

fn parse_err(text: &str) -> CompileLog {
    let mut sources = SourceMap::new();
    let file = sources.add_file("test.sc", text);
    let mut interner = Interner::new();
    let mut idgen = NodeIdGen::new();
    let mut log = CompileLog::new();
    assert!(parse_module(file, &sources, &mut interner, &mut idgen, &mut log).is_err());
    log
}

#[test]
fn parses_kind_and_domain() {
    let (module, interner) = parse_ok(
        "kind shared3p {\n\
         type bool;\n\
         type uint64 { public = uint64, size = 8 };\n\
         }\n\
         domain pd_shared3p shared3p;\n",
    );
    assert_eq!(module.decls.len(), 2);
    match &module.decls[0] {
        GlobalDecl::Kind(kind) => {
            assert_eq!(interner.resolve(kind.name.name), "shared3p");
            assert_eq!(kind.types.len(), 2);
            assert_eq!(kind.types[1].size, Some(8));
        }
        other => panic!("expected kind, got {other:?}"),
    }
    match &module.decls[1] {
        GlobalDecl::Domain(domain) => {
            assert_eq!(interner.resolve(domain.name.name), "pd_shared3p");
        }
        other => panic!("expected domain, got {other:?}"),
    }
}

#[test]
fn parses_template_procedure() {
    let (module, interner) = parse_ok(
        "template <domain D, type T, dim N>\n\
         D T[[N]] id(D T[[N]] x) { return x; }\n",
    );
    match &module.decls[0] {
        GlobalDecl::Template(t) => {
            assert_eq!(t.quantifiers.len(), 3);
            assert_eq!(interner.resolve(t.body.name.name), "id");
            assert_eq!(t.body.params.len(), 1);
            match &t.body.ret.kind {
                TypeExprKind::Basic { sec, .. } => match &sec.kind {
                    SecTypeExprKind::Named(id) => assert_eq!(interner.resolve(id.name), "D"),
                    other => panic!("expected named domain, got {other:?}"),
                },
                other => panic!("expected basic type, got {other:?}"),
            }
        }
        other => panic!("expected template, got {other:?}"),
    }
}

#[test]
fn distinguishes_declarations_from_expressions() {
    let (module, _) = parse_ok(
        "void main() {\n\
         int x = 1;\n\
         x = x + 1;\n\
         pd_shared3p int y;\n\
         }\n",
    );
    let proc = match &module.decls[0] {
        GlobalDecl::Proc(p) => p,
        other => panic!("expected proc, got {other:?}"),
    };
    let stmts = match &proc.body.kind {
        StmtKind::Compound(stmts) => stmts,
        other => panic!("expected compound, got {other:?}"),
    };
    assert!(matches!(stmts[0].kind, StmtKind::Decl(_)));
    assert!(matches!(stmts[1].kind, StmtKind::Expr(_)));
    assert!(matches!(stmts[2].kind, StmtKind::Decl(_)));
}

#[test]
fn struct_typed_declaration_has_no_domain() {
    let (module, interner) = parse_ok("void main() { point p; }\n");
    let proc = match &module.decls[0] {
        GlobalDecl::Proc(p) => p,
        other => panic!("expected proc, got {other:?}"),
    };
    let stmts = match &proc.body.kind {
        StmtKind::Compound(stmts) => stmts,
        _ => unreachable!(),
    };
    let decl = match &stmts[0].kind {
        StmtKind::Decl(d) => d,
        other => panic!("expected decl, got {other:?}"),
    };
    match &decl.ty.kind {
        TypeExprKind::Basic { sec, data, .. } => {
            assert!(matches!(sec.kind, SecTypeExprKind::Public));
            match &data.kind {
                DataTypeExprKind::Var(id) => assert_eq!(interner.resolve(id.name), "point"),
                other => panic!("expected type variable, got {other:?}"),
            }
        }
        other => panic!("expected basic type, got {other:?}"),
    }
}

#[test]
fn parses_shaped_declaration_with_array_constructor() {
    let (module, _) = parse_ok("void main() { int [[1]] x (3) = {1, 2, 3}; }\n");
    let proc = match &module.decls[0] {
        GlobalDecl::Proc(p) => p,
        _ => unreachable!(),
    };
    let stmts = match &proc.body.kind {
        StmtKind::Compound(stmts) => stmts,
        _ => unreachable!(),
    };
    let decl = match &stmts[0].kind {
        StmtKind::Decl(d) => d,
        _ => unreachable!(),
    };
    assert_eq!(decl.inits.len(), 1);
    assert_eq!(decl.inits[0].shape.len(), 1);
    assert!(matches!(
        decl.inits[0].init.as_ref().unwrap().kind,
        ExprKind::ArrayCtor(_)
    ));
}

#[test]
fn parses_slices_and_selects() {
    let (module, _) = parse_ok("void main() { y = m[1, 2:5].f; }\n");
    let proc = match &module.decls[0] {
        GlobalDecl::Proc(p) => p,
        _ => unreachable!(),
    };
    let stmts = match &proc.body.kind {
        StmtKind::Compound(stmts) => stmts,
        _ => unreachable!(),
    };
    let expr = match &stmts[0].kind {
        StmtKind::Expr(e) => e,
        _ => unreachable!(),
    };
    let rhs = match &expr.kind {
        ExprKind::Assign { rhs, .. } => rhs,
        other => panic!("expected assignment, got {other:?}"),
    };
    let inner = match &rhs.kind {
        ExprKind::Select { expr, .. } => expr,
        other => panic!("expected select, got {other:?}"),
    };
    match &inner.kind {
        ExprKind::Index { subs, .. } => {
            assert_eq!(subs.len(), 2);
            assert!(matches!(subs[0], Subscript::Index(_)));
            assert!(matches!(subs[1], Subscript::Slice(Some(_), Some(_))));
        }
        other => panic!("expected index, got {other:?}"),
    }
}

#[test]
fn parses_operator_definition() {
    let (module, interner) = parse_ok(
        "template <domain D>\n\
         D int operator + (D int x, D int y) { return x; }\n",
    );
    match &module.decls[0] {
        GlobalDecl::Template(t) => {
            assert!(matches!(t.body.kind, ProcDefKind::Operator(_)));
            assert_eq!(interner.resolve(t.body.name.name), "__operator+");
        }
        other => panic!("expected template, got {other:?}"),
    }
}

#[test]
fn reports_syntax_errors_with_location() {
    let log = parse_err("void main() { int x = ; }\n");
    assert!(log.has_errors());
    let rendered = log.to_string();
    assert!(rendered.contains("test.sc:1:"), "{rendered}");
    assert!(rendered.contains("syntax error"), "{rendered}");
}

#[test]
fn parses_ternary_and_qualified() {
    let (module, _) = parse_ok("void main() { x = (b ? 1 : 2) :: int; }\n");
    let proc = match &module.decls[0] {
        GlobalDecl::Proc(p) => p,
        _ => unreachable!(),
    };
    let stmts = match &proc.body.kind {
        StmtKind::Compound(s) => s,
        _ => unreachable!(),
    };
    let expr = match &stmts[0].kind {
        StmtKind::Expr(e) => e,
        _ => unreachable!(),
    };
    match &expr.kind {
        ExprKind::Assign { rhs, .. } => {
            assert!(matches!(rhs.kind, ExprKind::Qualified { .. }));
        }
        other => panic!("expected assignment, got {other:?}"),
    }
}
