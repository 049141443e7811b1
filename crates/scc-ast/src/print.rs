//! AST pretty-printer for `--print-ast`.
//!
//! Prints an indented tree, one node per line, with identifier and literal
//! payloads inline.

use crate::ops::Prim;
use crate::tree::*;
use scc_common::Interner;
use std::fmt::Write;

pub fn print_program(program: &Program, interner: &Interner) -> String {
    let mut p = Printer {
        interner,
        out: String::new(),
        depth: 0,
    };
    for module in &program.modules {
        p.module(module);
    }
    p.out
}

struct Printer<'a> {
    interner: &'a Interner,
    out: String,
    depth: usize,
}

impl<'a> Printer<'a> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, header: &str, f: impl FnOnce(&mut Self)) {
        self.line(header);
        self.depth += 1;
        f(self);
        self.depth -= 1;
    }

    fn name(&self, ident: &Ident) -> &'a str {
        self.interner.resolve(ident.name)
    }

    fn module(&mut self, module: &Module) {
        let header = match &module.name {
            Some(name) => format!("MODULE {}", self.name(name)),
            None => "MODULE".to_owned(),
        };
        self.nested(&header, |p| {
            for import in &module.imports {
                let text = format!("IMPORT {}", p.name(&import.name));
                p.line(&text);
            }
            for decl in &module.decls {
                p.global_decl(decl);
            }
        });
    }

    fn global_decl(&mut self, decl: &GlobalDecl) {
        match decl {
            GlobalDecl::Kind(kind) => {
                let header = format!("KIND {}", self.name(&kind.name));
                self.nested(&header, |p| {
                    for ty in &kind.types {
                        let mut text = format!("TYPE {}", p.name(&ty.name));
                        if let Some(public) = ty.public_type {
                            let _ = write!(text, " public = {public}");
                        }
                        if let Some(size) = ty.size {
                            let _ = write!(text, " size = {size}");
                        }
                        p.line(&text);
                    }
                });
            }
            GlobalDecl::Domain(domain) => {
                let text = format!(
                    "DOMAIN {} : {}",
                    self.name(&domain.name),
                    self.name(&domain.kind)
                );
                self.line(&text);
            }
            GlobalDecl::Struct(s) => self.struct_decl(s),
            GlobalDecl::Template(t) => self.template_decl(t),
            GlobalDecl::Proc(proc) => self.proc_def(proc),
            GlobalDecl::Var(decl) => self.var_decl(decl),
        }
    }

    fn struct_decl(&mut self, s: &StructDecl) {
        let header = format!("STRUCT {}{}", self.name(&s.name), self.quants(&s.quantifiers));
        self.nested(&header, |p| {
            for field in &s.fields {
                let text = format!("FIELD {} {}", p.type_expr(&field.ty), p.name(&field.name));
                p.line(&text);
            }
        });
    }

    fn quants(&self, quantifiers: &[Quantifier]) -> String {
        if quantifiers.is_empty() {
            return String::new();
        }

        let mut text = String::from(" <");
        for (i, q) in quantifiers.iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            match &q.kind {
                QuantifierKind::Domain(None) => {
                    let _ = write!(text, "domain {}", self.name(&q.name));
                }
                QuantifierKind::Domain(Some(kind)) => {
                    let _ = write!(text, "domain {} : {}", self.name(&q.name), self.name(kind));
                }
                QuantifierKind::Data => {
                    let _ = write!(text, "type {}", self.name(&q.name));
                }
                QuantifierKind::Dim => {
                    let _ = write!(text, "dim {}", self.name(&q.name));
                }
            }
        }
        text.push('>');
        text
    }

    fn template_decl(&mut self, t: &TemplateDecl) {
        let header = format!("TEMPLATE{}", self.quants(&t.quantifiers));
        self.nested(&header, |p| p.proc_def(&t.body));
    }

    fn proc_def(&mut self, proc: &ProcDef) {
        let kind = match proc.kind {
            ProcDefKind::Proc => "PROCDEF",
            ProcDefKind::Operator(_) => "OPDEF",
            ProcDefKind::Cast => "CASTDEF",
        };
        let header = format!(
            "{} {} {}",
            kind,
            self.type_expr(&proc.ret),
            self.name(&proc.name)
        );
        self.nested(&header, |p| {
            for param in &proc.params {
                p.var_decl(param);
            }
            p.stmt(&proc.body);
        });
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        let header = format!("DECL {}", self.type_expr(&decl.ty));
        self.nested(&header, |p| {
            for init in &decl.inits {
                let header = format!("VARINIT {}", p.name(&init.name));
                p.nested(&header, |p| {
                    for e in &init.shape {
                        p.expr(e);
                    }
                    if let Some(e) = &init.init {
                        p.expr(e);
                    }
                });
            }
        });
    }

    fn type_expr(&self, ty: &TypeExpr) -> String {
        match &ty.kind {
            TypeExprKind::Void => "void".to_owned(),
            TypeExprKind::Basic { sec, data, dim } => {
                let sec = match &sec.kind {
                    SecTypeExprKind::Public => "public".to_owned(),
                    SecTypeExprKind::Named(id) => self.name(id).to_owned(),
                };
                let data = self.data_type_expr(data);
                match &dim.kind {
                    DimTypeExprKind::Const(0) => format!("{sec} {data}"),
                    DimTypeExprKind::Const(n) => format!("{sec} {data}[[{n}]]"),
                    DimTypeExprKind::Var(id) => format!("{sec} {data}[[{}]]", self.name(id)),
                }
            }
        }
    }

    fn data_type_expr(&self, data: &DataTypeExpr) -> String {
        match &data.kind {
            DataTypeExprKind::Const(p) => p.name().to_owned(),
            DataTypeExprKind::Var(id) => self.name(id).to_owned(),
            DataTypeExprKind::Template(id, args) => {
                let mut text = format!("{}<", self.name(id));
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        text.push_str(", ");
                    }
                    text.push_str(&self.type_arg_expr(arg));
                }
                text.push('>');
                text
            }
        }
    }

    fn type_arg_expr(&self, arg: &TypeArgExpr) -> String {
        match &arg.kind {
            TypeArgExprKind::Var(id) => self.name(id).to_owned(),
            TypeArgExprKind::Template(id, args) => {
                let inner = args
                    .iter()
                    .map(|a| self.type_arg_expr(a))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}<{}>", self.name(id), inner)
            }
            TypeArgExprKind::DataConst(p) => p.name().to_owned(),
            TypeArgExprKind::DimConst(n) => n.to_string(),
            TypeArgExprKind::Public => "public".to_owned(),
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Compound(stmts) => self.nested("COMPOUND", |p| {
                for s in stmts {
                    p.stmt(s);
                }
            }),
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.nested("IF", |p| {
                p.expr(cond);
                p.stmt(then_branch);
                if let Some(s) = else_branch {
                    p.stmt(s);
                }
            }),
            StmtKind::While { cond, body } => self.nested("WHILE", |p| {
                p.expr(cond);
                p.stmt(body);
            }),
            StmtKind::DoWhile { body, cond } => self.nested("DOWHILE", |p| {
                p.stmt(body);
                p.expr(cond);
            }),
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => self.nested("FOR", |p| {
                if let Some(init) = init {
                    match init.as_ref() {
                        ForInit::Decl(d) => p.var_decl(d),
                        ForInit::Expr(e) => p.expr(e),
                    }
                }
                if let Some(e) = cond {
                    p.expr(e);
                }
                if let Some(e) = step {
                    p.expr(e);
                }
                p.stmt(body);
            }),
            StmtKind::Decl(decl) => self.var_decl(decl),
            StmtKind::Expr(e) => self.nested("EXPR", |p| p.expr(e)),
            StmtKind::Return(e) => self.nested("RETURN", |p| {
                if let Some(e) = e {
                    p.expr(e);
                }
            }),
            StmtKind::Break => self.line("BREAK"),
            StmtKind::Continue => self.line("CONTINUE"),
            StmtKind::Print(exprs) => self.nested("PRINT", |p| {
                for e in exprs {
                    p.expr(e);
                }
            }),
            StmtKind::Assert(e) => self.nested("ASSERT", |p| p.expr(e)),
        }
    }

    fn lvalue(&mut self, lval: &LValue) {
        match &lval.kind {
            LValueKind::Var(id) => {
                let text = format!("LVALUE {}", self.name(id));
                self.line(&text);
            }
            LValueKind::Index { lval, subs } => self.nested("LINDEX", |p| {
                p.lvalue(lval);
                for sub in subs {
                    p.subscript(sub);
                }
            }),
            LValueKind::Select { lval, field } => {
                let header = format!("LSELECT .{}", self.name(field));
                self.nested(&header, |p| p.lvalue(lval));
            }
        }
    }

    fn subscript(&mut self, sub: &Subscript) {
        match sub {
            Subscript::Index(e) => self.nested("INDEX", |p| p.expr(e)),
            Subscript::Slice(lo, hi) => self.nested("SLICE", |p| {
                if let Some(e) = lo {
                    p.expr(e);
                }
                if let Some(e) = hi {
                    p.expr(e);
                }
            }),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::IntLit(v) => {
                let text = format!("INT {v}");
                self.line(&text);
            }
            ExprKind::FloatLit(v) => {
                let text = format!("FLOAT {v}");
                self.line(&text);
            }
            ExprKind::BoolLit(v) => {
                let text = format!("BOOL {v}");
                self.line(&text);
            }
            ExprKind::StrLit(s) => {
                let text = format!("STRING {s:?}");
                self.line(&text);
            }
            ExprKind::Var(id) => {
                let text = format!("RVARIABLE {}", self.name(id));
                self.line(&text);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let header = format!("BINARY {}", op.token());
                self.nested(&header, |p| {
                    p.expr(lhs);
                    p.expr(rhs);
                });
            }
            ExprKind::Unary { op, expr } => {
                let header = format!("UNARY {}", op.token());
                self.nested(&header, |p| p.expr(expr));
            }
            ExprKind::Assign { op, lval, rhs } => {
                let header = match op {
                    Some(op) => format!("ASSIGN {}=", op.token()),
                    None => "ASSIGN =".to_owned(),
                };
                self.nested(&header, |p| {
                    p.lvalue(lval);
                    p.expr(rhs);
                });
            }
            ExprKind::IncDec {
                lval,
                is_inc,
                is_prefix,
            } => {
                let tok = if *is_inc { "++" } else { "--" };
                let pos = if *is_prefix { "PREFIX" } else { "POSTFIX" };
                let header = format!("{pos} {tok}");
                self.nested(&header, |p| p.lvalue(lval));
            }
            ExprKind::Cast { ty, expr } => {
                let header = format!("CAST ({})", self.data_type_expr(ty));
                self.nested(&header, |p| p.expr(expr));
            }
            ExprKind::Classify(e) => self.nested("CLASSIFY", |p| p.expr(e)),
            ExprKind::Declassify(e) => self.nested("DECLASSIFY", |p| p.expr(e)),
            ExprKind::DomainId(id) => {
                let text = format!("DOMAINID {}", self.name(id));
                self.line(&text);
            }
            ExprKind::ProcCall { name, args } => {
                let header = format!("PROCCALL {}", self.name(name));
                self.nested(&header, |p| {
                    for a in args {
                        p.expr(a);
                    }
                });
            }
            ExprKind::Index { expr, subs } => self.nested("INDEX", |p| {
                p.expr(expr);
                for sub in subs {
                    p.subscript(sub);
                }
            }),
            ExprKind::Shape(e) => self.nested("SHAPE", |p| p.expr(e)),
            ExprKind::Size(e) => self.nested("SIZE", |p| p.expr(e)),
            ExprKind::Reshape { expr, dims } => self.nested("RESHAPE", |p| {
                p.expr(expr);
                for d in dims {
                    p.expr(d);
                }
            }),
            ExprKind::Cat { lhs, rhs, dim } => self.nested("CAT", |p| {
                p.expr(lhs);
                p.expr(rhs);
                if let Some(d) = dim {
                    p.expr(d);
                }
            }),
            ExprKind::ToString(e) => self.nested("TOSTRING", |p| p.expr(e)),
            ExprKind::Strlen(e) => self.nested("STRLEN", |p| p.expr(e)),
            ExprKind::StringFromBytes(e) => self.nested("STRING_FROM_BYTES", |p| p.expr(e)),
            ExprKind::BytesFromString(e) => self.nested("BYTES_FROM_STRING", |p| p.expr(e)),
            ExprKind::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self.nested("TERNIF", |p| {
                p.expr(cond);
                p.expr(then_expr);
                p.expr(else_expr);
            }),
            ExprKind::ArrayCtor(elems) => self.nested("ARRAY_CONSTRUCTOR", |p| {
                for e in elems {
                    p.expr(e);
                }
            }),
            ExprKind::Select { expr, field } => {
                let header = format!("SELECTION .{}", self.name(field));
                self.nested(&header, |p| p.expr(expr));
            }
            ExprKind::Qualified { expr, quals } => {
                let mut header = String::from("TYPE_QUAL ::");
                for q in quals {
                    match q {
                        TypeQual::Sec(s) => match &s.kind {
                            SecTypeExprKind::Public => header.push_str(" public"),
                            SecTypeExprKind::Named(id) => {
                                let _ = write!(header, " {}", self.name(id));
                            }
                        },
                        TypeQual::Data(d) => {
                            let _ = write!(header, " {}", self.data_type_expr(d));
                        }
                        TypeQual::Dim(d) => match &d.kind {
                            DimTypeExprKind::Const(n) => {
                                let _ = write!(header, " [[{n}]]");
                            }
                            DimTypeExprKind::Var(id) => {
                                let _ = write!(header, " [[{}]]", self.name(id));
                            }
                        },
                    }
                }
                self.nested(&header, |p| p.expr(expr));
            }
        }
    }
}

/// Render the primitive name for diagnostics.
pub fn prim_name(p: Prim) -> &'static str {
    p.name()
}
