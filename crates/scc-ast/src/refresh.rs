//! Node id renumbering for cloned subtrees.
//!
//! Template instantiation deep-copies the template body. The copy must not
//! share node ids with the declaration (or with other instances), since
//! resolved types are memoized per node id. This pass walks a cloned
//! subtree and assigns fresh ids throughout.

use crate::tree::*;

pub fn refresh_proc_def(proc: &mut ProcDef, gen: &mut NodeIdGen) {
    proc.id = gen.fresh();
    refresh_ident(&mut proc.name, gen);
    refresh_type_expr(&mut proc.ret, gen);
    for param in &mut proc.params {
        refresh_var_decl(param, gen);
    }
    refresh_stmt(&mut proc.body, gen);
}

fn refresh_ident(ident: &mut Ident, gen: &mut NodeIdGen) {
    ident.id = gen.fresh();
}

fn refresh_type_expr(ty: &mut TypeExpr, gen: &mut NodeIdGen) {
    ty.id = gen.fresh();
    if let TypeExprKind::Basic { sec, data, dim } = &mut ty.kind {
        refresh_sec_type_expr(sec, gen);
        refresh_data_type_expr(data, gen);
        refresh_dim_type_expr(dim, gen);
    }
}

fn refresh_sec_type_expr(sec: &mut SecTypeExpr, gen: &mut NodeIdGen) {
    sec.id = gen.fresh();
    if let SecTypeExprKind::Named(id) = &mut sec.kind {
        refresh_ident(id, gen);
    }
}

fn refresh_data_type_expr(data: &mut DataTypeExpr, gen: &mut NodeIdGen) {
    data.id = gen.fresh();
    match &mut data.kind {
        DataTypeExprKind::Const(_) => {}
        DataTypeExprKind::Var(id) => refresh_ident(id, gen),
        DataTypeExprKind::Template(id, args) => {
            refresh_ident(id, gen);
            for arg in args {
                refresh_type_arg_expr(arg, gen);
            }
        }
    }
}

fn refresh_dim_type_expr(dim: &mut DimTypeExpr, gen: &mut NodeIdGen) {
    dim.id = gen.fresh();
    if let DimTypeExprKind::Var(id) = &mut dim.kind {
        refresh_ident(id, gen);
    }
}

fn refresh_type_arg_expr(arg: &mut TypeArgExpr, gen: &mut NodeIdGen) {
    arg.id = gen.fresh();
    match &mut arg.kind {
        TypeArgExprKind::Var(id) => refresh_ident(id, gen),
        TypeArgExprKind::Template(id, args) => {
            refresh_ident(id, gen);
            for a in args {
                refresh_type_arg_expr(a, gen);
            }
        }
        TypeArgExprKind::DataConst(_) | TypeArgExprKind::DimConst(_) | TypeArgExprKind::Public => {}
    }
}

fn refresh_var_decl(decl: &mut VarDecl, gen: &mut NodeIdGen) {
    decl.id = gen.fresh();
    refresh_type_expr(&mut decl.ty, gen);
    for init in &mut decl.inits {
        init.id = gen.fresh();
        refresh_ident(&mut init.name, gen);
        for e in &mut init.shape {
            refresh_expr(e, gen);
        }
        if let Some(e) = &mut init.init {
            refresh_expr(e, gen);
        }
    }
}

fn refresh_lvalue(lval: &mut LValue, gen: &mut NodeIdGen) {
    lval.id = gen.fresh();
    match &mut lval.kind {
        LValueKind::Var(id) => refresh_ident(id, gen),
        LValueKind::Index { lval, subs } => {
            refresh_lvalue(lval, gen);
            for sub in subs {
                refresh_subscript(sub, gen);
            }
        }
        LValueKind::Select { lval, field } => {
            refresh_lvalue(lval, gen);
            refresh_ident(field, gen);
        }
    }
}

fn refresh_subscript(sub: &mut Subscript, gen: &mut NodeIdGen) {
    match sub {
        Subscript::Index(e) => refresh_expr(e, gen),
        Subscript::Slice(lo, hi) => {
            if let Some(e) = lo {
                refresh_expr(e, gen);
            }
            if let Some(e) = hi {
                refresh_expr(e, gen);
            }
        }
    }
}

fn refresh_expr(expr: &mut Expr, gen: &mut NodeIdGen) {
    expr.id = gen.fresh();
    match &mut expr.kind {
        ExprKind::IntLit(_)
        | ExprKind::FloatLit(_)
        | ExprKind::BoolLit(_)
        | ExprKind::StrLit(_) => {}
        ExprKind::Var(id) => refresh_ident(id, gen),
        ExprKind::Binary { lhs, rhs, .. } => {
            refresh_expr(lhs, gen);
            refresh_expr(rhs, gen);
        }
        ExprKind::Unary { expr, .. } => refresh_expr(expr, gen),
        ExprKind::Assign { lval, rhs, .. } => {
            refresh_lvalue(lval, gen);
            refresh_expr(rhs, gen);
        }
        ExprKind::IncDec { lval, .. } => refresh_lvalue(lval, gen),
        ExprKind::Cast { ty, expr } => {
            refresh_data_type_expr(ty, gen);
            refresh_expr(expr, gen);
        }
        ExprKind::Classify(e)
        | ExprKind::Declassify(e)
        | ExprKind::Shape(e)
        | ExprKind::Size(e)
        | ExprKind::ToString(e)
        | ExprKind::Strlen(e)
        | ExprKind::StringFromBytes(e)
        | ExprKind::BytesFromString(e) => refresh_expr(e, gen),
        ExprKind::DomainId(id) => refresh_ident(id, gen),
        ExprKind::ProcCall { name, args } => {
            refresh_ident(name, gen);
            for a in args {
                refresh_expr(a, gen);
            }
        }
        ExprKind::Index { expr, subs } => {
            refresh_expr(expr, gen);
            for sub in subs {
                refresh_subscript(sub, gen);
            }
        }
        ExprKind::Reshape { expr, dims } => {
            refresh_expr(expr, gen);
            for d in dims {
                refresh_expr(d, gen);
            }
        }
        ExprKind::Cat { lhs, rhs, dim } => {
            refresh_expr(lhs, gen);
            refresh_expr(rhs, gen);
            if let Some(d) = dim {
                refresh_expr(d, gen);
            }
        }
        ExprKind::Ternary {
            cond,
            then_expr,
            else_expr,
        } => {
            refresh_expr(cond, gen);
            refresh_expr(then_expr, gen);
            refresh_expr(else_expr, gen);
        }
        ExprKind::ArrayCtor(elems) => {
            for e in elems {
                refresh_expr(e, gen);
            }
        }
        ExprKind::Select { expr, field } => {
            refresh_expr(expr, gen);
            refresh_ident(field, gen);
        }
        ExprKind::Qualified { expr, quals } => {
            refresh_expr(expr, gen);
            for q in quals {
                match q {
                    TypeQual::Sec(s) => refresh_sec_type_expr(s, gen),
                    TypeQual::Data(d) => refresh_data_type_expr(d, gen),
                    TypeQual::Dim(d) => refresh_dim_type_expr(d, gen),
                }
            }
        }
    }
}

fn refresh_stmt(stmt: &mut Stmt, gen: &mut NodeIdGen) {
    stmt.id = gen.fresh();
    match &mut stmt.kind {
        StmtKind::Compound(stmts) => {
            for s in stmts {
                refresh_stmt(s, gen);
            }
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            refresh_expr(cond, gen);
            refresh_stmt(then_branch, gen);
            if let Some(s) = else_branch {
                refresh_stmt(s, gen);
            }
        }
        StmtKind::While { cond, body } => {
            refresh_expr(cond, gen);
            refresh_stmt(body, gen);
        }
        StmtKind::DoWhile { body, cond } => {
            refresh_stmt(body, gen);
            refresh_expr(cond, gen);
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            if let Some(init) = init {
                match init.as_mut() {
                    ForInit::Decl(d) => refresh_var_decl(d, gen),
                    ForInit::Expr(e) => refresh_expr(e, gen),
                }
            }
            if let Some(e) = cond {
                refresh_expr(e, gen);
            }
            if let Some(e) = step {
                refresh_expr(e, gen);
            }
            refresh_stmt(body, gen);
        }
        StmtKind::Decl(decl) => refresh_var_decl(decl, gen),
        StmtKind::Expr(e) | StmtKind::Assert(e) => refresh_expr(e, gen),
        StmtKind::Return(e) => {
            if let Some(e) = e {
                refresh_expr(e, gen);
            }
        }
        StmtKind::Break | StmtKind::Continue => {}
        StmtKind::Print(exprs) => {
            for e in exprs {
                refresh_expr(e, gen);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scc_common::{Atom, Span};

    fn ident(gen: &mut NodeIdGen, name: u32) -> Ident {
        Ident {
            id: gen.fresh(),
            span: Span::dummy(),
            name: Atom(name),
        }
    }

    #[test]
    fn clone_gets_fresh_ids() {
        let mut gen = NodeIdGen::new();
        let body = Stmt {
            id: gen.fresh(),
            span: Span::dummy(),
            kind: StmtKind::Return(Some(Expr {
                id: gen.fresh(),
                span: Span::dummy(),
                kind: ExprKind::Var(ident(&mut gen, 0)),
            })),
        };
        let proc = ProcDef {
            id: gen.fresh(),
            span: Span::dummy(),
            kind: ProcDefKind::Proc,
            name: ident(&mut gen, 1),
            ret: TypeExpr {
                id: gen.fresh(),
                span: Span::dummy(),
                kind: TypeExprKind::Void,
            },
            params: Vec::new(),
            body,
        };

        let mut copy = proc.clone();
        refresh_proc_def(&mut copy, &mut gen);
        assert_ne!(copy.id, proc.id);
        assert_ne!(copy.body.id, proc.body.id);
        assert_ne!(copy.name.id, proc.name.id);
        // the interned name itself is shared
        assert_eq!(copy.name.name, proc.name.name);
    }
}
