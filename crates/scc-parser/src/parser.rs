//! Recursive-descent parser.
//!
//! One `parse_module` call consumes a whole source file. The first parse
//! problem is logged and aborts the file; the driver keeps going with the
//! other modules so unrelated files still get their own diagnostics.

use crate::scanner::{scan, Token, TokenKind};
use scc_ast::*;
use scc_common::{CompileLog, FileId, Interner, SourceMap, Span};
use std::rc::Rc;

pub struct ParseFailed;

type PResult<T> = Result<T, ParseFailed>;

/// Parse one file into a module. Problems are logged; `Err` means the
/// file did not produce a usable tree.
pub fn parse_module(
    file: FileId,
    sources: &SourceMap,
    interner: &mut Interner,
    idgen: &mut NodeIdGen,
    log: &mut CompileLog,
) -> Result<Module, ParseFailed> {
    let text = sources.file(file).text.clone();
    let tokens = match scan(&text) {
        Ok(tokens) => tokens,
        Err(err) => {
            log.fatal(Some(sources.location(file, err.span)), err.message);
            return Err(ParseFailed);
        }
    };

    let mut parser = Parser {
        file,
        sources,
        tokens,
        pos: 0,
        interner,
        idgen,
        log,
    };
    parser.module()
}

struct Parser<'a> {
    file: FileId,
    sources: &'a SourceMap,
    tokens: Vec<Token>,
    pos: usize,
    interner: &'a mut Interner,
    idgen: &'a mut NodeIdGen,
    log: &'a mut CompileLog,
}

impl<'a> Parser<'a> {
    /*******************************************************************
      Token plumbing
    *******************************************************************/

    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let i = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[i].kind
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    fn bump(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            self.error_here(&format!("expected {what}"))
        }
    }

    fn error_here<T>(&mut self, message: &str) -> PResult<T> {
        let loc = self.sources.location(self.file, self.span());
        self.log.fatal(Some(loc), format!("syntax error: {message}"));
        Err(ParseFailed)
    }

    fn fresh(&mut self) -> NodeId {
        self.idgen.fresh()
    }

    fn ident(&mut self, what: &str) -> PResult<Ident> {
        let span = self.span();
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                let name = self.interner.intern(&name);
                Ok(Ident {
                    id: self.fresh(),
                    span,
                    name,
                })
            }
            _ => self.error_here(&format!("expected {what}")),
        }
    }

    /*******************************************************************
      Modules and top-level declarations
    *******************************************************************/

    fn module(&mut self) -> PResult<Module> {
        let id = self.fresh();
        let mut name = None;
        if self.eat(&TokenKind::KwModule) {
            name = Some(self.ident("module name")?);
            self.expect(&TokenKind::Semicolon, "';' after module header")?;
        }

        let mut imports = Vec::new();
        while self.at(&TokenKind::KwImport) {
            let span = self.span();
            self.bump();
            let name = self.ident("module name")?;
            self.expect(&TokenKind::Semicolon, "';' after import")?;
            imports.push(Import {
                id: self.fresh(),
                span: span.merge(self.prev_span()),
                name,
            });
        }

        let mut decls = Vec::new();
        while !self.at(&TokenKind::Eof) {
            decls.push(self.global_decl()?);
        }

        Ok(Module {
            id,
            file: self.file,
            name,
            imports,
            decls,
        })
    }

    fn global_decl(&mut self) -> PResult<GlobalDecl> {
        match self.peek() {
            TokenKind::KwKind => self.kind_decl().map(GlobalDecl::Kind),
            TokenKind::KwDomain => self.domain_decl().map(GlobalDecl::Domain),
            TokenKind::KwStruct => {
                let s = self.struct_decl(Vec::new())?;
                Ok(GlobalDecl::Struct(Rc::new(s)))
            }
            TokenKind::KwTemplate => self.template_decl(),
            _ => self.proc_or_global_var(),
        }
    }

    fn kind_decl(&mut self) -> PResult<KindDecl> {
        let span = self.span();
        self.bump();
        let name = self.ident("kind name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut types = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            let tspan = self.span();
            self.expect(&TokenKind::KwType, "'type' declaration inside kind")?;
            let tname = self.ident("type name")?;

            let mut public_type = None;
            let mut size = None;
            if self.eat(&TokenKind::LBrace) {
                loop {
                    let param = self.ident("kind type parameter")?;
                    self.expect(&TokenKind::Assign, "'='")?;
                    match self.interner.resolve(param.name) {
                        "public" => {
                            let value = self.ident("public representation type")?;
                            let word = self.interner.resolve(value.name).to_owned();
                            match Prim::from_keyword(&word) {
                                Some(p) => public_type = Some(p),
                                None => {
                                    return self
                                        .error_here("public representation must be a builtin type")
                                }
                            }
                        }
                        "size" => match self.bump() {
                            TokenKind::IntLit(v) => size = Some(v),
                            _ => return self.error_here("size must be an integer"),
                        },
                        _ => return self.error_here("unknown kind type parameter"),
                    }
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
            }
            self.expect(&TokenKind::Semicolon, "';'")?;

            types.push(KindTypeDecl {
                id: self.fresh(),
                span: tspan.merge(self.prev_span()),
                name: tname,
                public_type,
                size,
            });
        }

        Ok(KindDecl {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            name,
            types,
        })
    }

    fn domain_decl(&mut self) -> PResult<DomainDecl> {
        let span = self.span();
        self.bump();
        let name = self.ident("domain name")?;
        let kind = self.ident("kind name")?;
        self.expect(&TokenKind::Semicolon, "';'")?;
        Ok(DomainDecl {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            name,
            kind,
        })
    }

    fn quantifiers(&mut self) -> PResult<Vec<Quantifier>> {
        self.expect(&TokenKind::Less, "'<' after template")?;
        let mut quantifiers = Vec::new();
        loop {
            let span = self.span();
            match self.bump() {
                TokenKind::KwDomain => {
                    let name = self.ident("domain variable")?;
                    let kind = if self.eat(&TokenKind::Colon) {
                        Some(self.ident("kind name")?)
                    } else {
                        None
                    };
                    quantifiers.push(Quantifier {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        name,
                        kind: QuantifierKind::Domain(kind),
                    });
                }
                TokenKind::KwType => {
                    let name = self.ident("type variable")?;
                    quantifiers.push(Quantifier {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        name,
                        kind: QuantifierKind::Data,
                    });
                }
                TokenKind::KwDim => {
                    let name = self.ident("dimensionality variable")?;
                    quantifiers.push(Quantifier {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        name,
                        kind: QuantifierKind::Dim,
                    });
                }
                _ => return self.error_here("expected 'domain', 'type' or 'dim' quantifier"),
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Greater, "'>'")?;
        Ok(quantifiers)
    }

    fn template_decl(&mut self) -> PResult<GlobalDecl> {
        let span = self.span();
        self.bump();
        let quantifiers = self.quantifiers()?;

        if self.at(&TokenKind::KwStruct) {
            let s = self.struct_decl(quantifiers)?;
            return Ok(GlobalDecl::Struct(Rc::new(s)));
        }

        let body = self.proc_def()?;
        Ok(GlobalDecl::Template(Rc::new(TemplateDecl {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            quantifiers,
            body,
        })))
    }

    fn struct_decl(&mut self, quantifiers: Vec<Quantifier>) -> PResult<StructDecl> {
        let span = self.span();
        self.bump(); // struct
        let name = self.ident("struct name")?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut fields = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            let fspan = self.span();
            let ty = self.type_expr()?;
            let fname = self.ident("field name")?;
            self.expect(&TokenKind::Semicolon, "';'")?;
            fields.push(FieldDecl {
                id: self.fresh(),
                span: fspan.merge(self.prev_span()),
                ty,
                name: fname,
            });
        }

        Ok(StructDecl {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            name,
            quantifiers,
            fields,
        })
    }

    /// Either a procedure/operator/cast definition or a global variable
    /// declaration; both start with a type expression.
    fn proc_or_global_var(&mut self) -> PResult<GlobalDecl> {
        let start = self.pos;
        let _ = self.type_expr()?;
        let is_proc = match self.peek() {
            TokenKind::KwOperator | TokenKind::KwCast => true,
            TokenKind::Ident(_) => {
                matches!(self.peek_at(1), TokenKind::LParen) && self.paren_group_precedes_brace(1)
            }
            _ => false,
        };
        self.pos = start;

        if is_proc {
            Ok(GlobalDecl::Proc(Rc::new(self.proc_def()?)))
        } else {
            let decl = self.var_decl()?;
            Ok(GlobalDecl::Var(decl))
        }
    }

    /// After an identifier, decide whether `(...)` is a parameter list of
    /// a definition (followed by `{`) or the shape of a declarator.
    fn paren_group_precedes_brace(&self, offset: usize) -> bool {
        let mut i = self.pos + offset;
        debug_assert!(matches!(self.tokens[i].kind, TokenKind::LParen));
        let mut depth = 0usize;
        while i < self.tokens.len() {
            match self.tokens[i].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(i + 1).map(|t| &t.kind),
                            Some(TokenKind::LBrace)
                        );
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn proc_def(&mut self) -> PResult<ProcDef> {
        let span = self.span();
        let ret = self.type_expr()?;

        let (kind, name) = match self.peek().clone() {
            TokenKind::KwOperator => {
                self.bump();
                let op = self.overload_op()?;
                let name = self.interner.intern(&op.name());
                let name = Ident {
                    id: self.fresh(),
                    span: self.prev_span(),
                    name,
                };
                (ProcDefKind::Operator(op), name)
            }
            TokenKind::KwCast => {
                self.bump();
                let name = self.interner.intern(&OverloadOp::Cast.name());
                let name = Ident {
                    id: self.fresh(),
                    span: self.prev_span(),
                    name,
                };
                (ProcDefKind::Cast, name)
            }
            _ => (ProcDefKind::Proc, self.ident("procedure name")?),
        };

        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let pspan = self.span();
                let ty = self.type_expr()?;
                let pname = self.ident("parameter name")?;
                let init = VarInit {
                    id: self.fresh(),
                    span: pspan.merge(self.prev_span()),
                    name: pname,
                    shape: Vec::new(),
                    init: None,
                };
                params.push(VarDecl {
                    id: self.fresh(),
                    span: pspan.merge(self.prev_span()),
                    ty,
                    inits: vec![init],
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;

        let body = self.compound_stmt()?;
        Ok(ProcDef {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            kind,
            name,
            ret,
            params,
            body,
        })
    }

    fn overload_op(&mut self) -> PResult<OverloadOp> {
        let op = match self.bump() {
            TokenKind::Plus => OverloadOp::Binary(BinaryOp::Add),
            TokenKind::Minus => OverloadOp::Binary(BinaryOp::Sub),
            TokenKind::Star => OverloadOp::Binary(BinaryOp::Mul),
            TokenKind::Slash => OverloadOp::Binary(BinaryOp::Div),
            TokenKind::Percent => OverloadOp::Binary(BinaryOp::Mod),
            TokenKind::EqEq => OverloadOp::Binary(BinaryOp::Eq),
            TokenKind::NotEq => OverloadOp::Binary(BinaryOp::Ne),
            TokenKind::LessEq => OverloadOp::Binary(BinaryOp::Le),
            TokenKind::Less => OverloadOp::Binary(BinaryOp::Lt),
            TokenKind::GreaterEq => OverloadOp::Binary(BinaryOp::Ge),
            TokenKind::Greater => OverloadOp::Binary(BinaryOp::Gt),
            TokenKind::AndAnd => OverloadOp::Binary(BinaryOp::Land),
            TokenKind::OrOr => OverloadOp::Binary(BinaryOp::Lor),
            TokenKind::Amp => OverloadOp::Binary(BinaryOp::Band),
            TokenKind::Pipe => OverloadOp::Binary(BinaryOp::Bor),
            TokenKind::Caret => OverloadOp::Binary(BinaryOp::Xor),
            TokenKind::Shl => OverloadOp::Binary(BinaryOp::Shl),
            TokenKind::Shr => OverloadOp::Binary(BinaryOp::Shr),
            TokenKind::Bang => OverloadOp::Unary(UnaryOp::Neg),
            TokenKind::Tilde => OverloadOp::Unary(UnaryOp::Inv),
            _ => return self.error_here("expected an overloadable operator"),
        };
        Ok(op)
    }

    /*******************************************************************
      Types
    *******************************************************************/

    /// Whether the upcoming tokens start a type expression. Used to
    /// separate declarations from expression statements.
    fn starts_type(&self) -> bool {
        match self.peek() {
            TokenKind::KwVoid | TokenKind::KwPublic => true,
            TokenKind::Ident(name) => {
                if Prim::from_keyword(name).is_some() {
                    return true;
                }
                match self.peek_at(1) {
                    // `pd int x` / `mystruct y`
                    TokenKind::Ident(_) => true,
                    TokenKind::KwPublic => true,
                    // `mystruct[[..]]` does not occur; `int[[2]]` is
                    // caught above, so `ident [[` means a type variable.
                    TokenKind::DoubleLBracket => true,
                    // `list<int> x`: scan the argument list.
                    TokenKind::Less => self.template_args_precede_ident(1),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn template_args_precede_ident(&self, offset: usize) -> bool {
        let mut i = self.pos + offset;
        debug_assert!(matches!(self.tokens[i].kind, TokenKind::Less));
        let mut depth = 0usize;
        while i < self.tokens.len() {
            match self.tokens[i].kind {
                TokenKind::Less => depth += 1,
                TokenKind::Greater => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.tokens.get(i + 1).map(|t| &t.kind),
                            Some(TokenKind::Ident(_))
                        );
                    }
                }
                TokenKind::Ident(_)
                | TokenKind::IntLit(_)
                | TokenKind::Comma
                | TokenKind::KwPublic
                | TokenKind::DoubleLBracket
                | TokenKind::DoubleRBracket => {}
                _ => return false,
            }
            i += 1;
        }
        false
    }

    fn type_expr(&mut self) -> PResult<TypeExpr> {
        let span = self.span();
        if self.eat(&TokenKind::KwVoid) {
            return Ok(TypeExpr {
                id: self.fresh(),
                span,
                kind: TypeExprKind::Void,
            });
        }

        // Optional security type.
        let sec = if self.eat(&TokenKind::KwPublic) {
            SecTypeExpr {
                id: self.fresh(),
                span,
                kind: SecTypeExprKind::Public,
            }
        } else if let TokenKind::Ident(name) = self.peek().clone() {
            // `D T x`: an identifier followed by a data type which is
            // itself followed by a declarator is a domain annotation;
            // `point p;` is a struct-typed declaration without one.
            let is_domain = Prim::from_keyword(&name).is_none()
                && match self.peek_at(1) {
                    TokenKind::Ident(second) => {
                        Prim::from_keyword(second).is_some()
                            || matches!(
                                self.peek_at(2),
                                TokenKind::Ident(_)
                                    | TokenKind::DoubleLBracket
                                    | TokenKind::Less
                            )
                    }
                    _ => false,
                };
            if is_domain {
                let id = self.ident("domain")?;
                SecTypeExpr {
                    id: self.fresh(),
                    span: id.span,
                    kind: SecTypeExprKind::Named(id),
                }
            } else {
                SecTypeExpr {
                    id: self.fresh(),
                    span: Span::at(span.start),
                    kind: SecTypeExprKind::Public,
                }
            }
        } else {
            return self.error_here("expected a type");
        };

        let data = self.data_type_expr()?;

        // Optional dimensionality.
        let dim = if self.eat(&TokenKind::DoubleLBracket) {
            let dspan = self.span();
            let kind = match self.bump() {
                TokenKind::IntLit(n) => DimTypeExprKind::Const(n as u32),
                TokenKind::Ident(name) => {
                    let name = self.interner.intern(&name);
                    DimTypeExprKind::Var(Ident {
                        id: self.fresh(),
                        span: dspan,
                        name,
                    })
                }
                _ => return self.error_here("expected a dimensionality"),
            };
            self.expect(&TokenKind::DoubleRBracket, "']]'")?;
            DimTypeExpr {
                id: self.fresh(),
                span: dspan,
                kind,
            }
        } else {
            DimTypeExpr {
                id: self.fresh(),
                span: Span::at(self.prev_span().end),
                kind: DimTypeExprKind::Const(0),
            }
        };

        Ok(TypeExpr {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            kind: TypeExprKind::Basic { sec, data, dim },
        })
    }

    fn data_type_expr(&mut self) -> PResult<DataTypeExpr> {
        let span = self.span();
        let name = self.ident("data type")?;
        let word = self.interner.resolve(name.name).to_owned();

        if let Some(p) = Prim::from_keyword(&word) {
            return Ok(DataTypeExpr {
                id: self.fresh(),
                span,
                kind: DataTypeExprKind::Const(p),
            });
        }

        if self.at(&TokenKind::Less) {
            self.bump();
            let mut args = Vec::new();
            loop {
                args.push(self.type_arg_expr()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::Greater, "'>'")?;
            return Ok(DataTypeExpr {
                id: self.fresh(),
                span: span.merge(self.prev_span()),
                kind: DataTypeExprKind::Template(name, args),
            });
        }

        Ok(DataTypeExpr {
            id: self.fresh(),
            span,
            kind: DataTypeExprKind::Var(name),
        })
    }

    fn type_arg_expr(&mut self) -> PResult<TypeArgExpr> {
        let span = self.span();
        match self.peek().clone() {
            TokenKind::KwPublic => {
                self.bump();
                Ok(TypeArgExpr {
                    id: self.fresh(),
                    span,
                    kind: TypeArgExprKind::Public,
                })
            }
            TokenKind::IntLit(n) => {
                self.bump();
                Ok(TypeArgExpr {
                    id: self.fresh(),
                    span,
                    kind: TypeArgExprKind::DimConst(n as u32),
                })
            }
            TokenKind::Ident(word) => {
                if let Some(p) = Prim::from_keyword(&word) {
                    self.bump();
                    return Ok(TypeArgExpr {
                        id: self.fresh(),
                        span,
                        kind: TypeArgExprKind::DataConst(p),
                    });
                }
                let name = self.ident("type argument")?;
                if self.eat(&TokenKind::Less) {
                    let mut args = Vec::new();
                    loop {
                        args.push(self.type_arg_expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::Greater, "'>'")?;
                    return Ok(TypeArgExpr {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        kind: TypeArgExprKind::Template(name, args),
                    });
                }
                Ok(TypeArgExpr {
                    id: self.fresh(),
                    span,
                    kind: TypeArgExprKind::Var(name),
                })
            }
            _ => self.error_here("expected a type argument"),
        }
    }

    /*******************************************************************
      Statements
    *******************************************************************/

    fn compound_stmt(&mut self) -> PResult<Stmt> {
        let span = self.span();
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            stmts.push(self.stmt()?);
        }
        Ok(Stmt {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            kind: StmtKind::Compound(stmts),
        })
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        let span = self.span();
        match self.peek().clone() {
            TokenKind::LBrace => self.compound_stmt(),
            TokenKind::KwIf => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let then_branch = Box::new(self.stmt()?);
                let else_branch = if self.eat(&TokenKind::KwElse) {
                    Some(Box::new(self.stmt()?))
                } else {
                    None
                };
                Ok(Stmt {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: StmtKind::If {
                        cond,
                        then_branch,
                        else_branch,
                    },
                })
            }
            TokenKind::KwWhile => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                let body = Box::new(self.stmt()?);
                Ok(Stmt {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: StmtKind::While { cond, body },
                })
            }
            TokenKind::KwDo => {
                self.bump();
                let body = Box::new(self.stmt()?);
                self.expect(&TokenKind::KwWhile, "'while'")?;
                self.expect(&TokenKind::LParen, "'('")?;
                let cond = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(Stmt {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: StmtKind::DoWhile { body, cond },
                })
            }
            TokenKind::KwFor => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let init = if self.eat(&TokenKind::Semicolon) {
                    None
                } else if self.starts_type() {
                    let decl = self.var_decl()?;
                    Some(Box::new(ForInit::Decl(decl)))
                } else {
                    let e = self.expr()?;
                    self.expect(&TokenKind::Semicolon, "';'")?;
                    Some(Box::new(ForInit::Expr(e)))
                };
                let cond = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(&TokenKind::Semicolon, "';'")?;
                let step = if self.at(&TokenKind::RParen) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(&TokenKind::RParen, "')'")?;
                let body = Box::new(self.stmt()?);
                Ok(Stmt {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: StmtKind::For {
                        init,
                        cond,
                        step,
                        body,
                    },
                })
            }
            TokenKind::KwReturn => {
                self.bump();
                let expr = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(Stmt {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: StmtKind::Return(expr),
                })
            }
            TokenKind::KwBreak => {
                self.bump();
                self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(Stmt {
                    id: self.fresh(),
                    span,
                    kind: StmtKind::Break,
                })
            }
            TokenKind::KwContinue => {
                self.bump();
                self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(Stmt {
                    id: self.fresh(),
                    span,
                    kind: StmtKind::Continue,
                })
            }
            TokenKind::KwPrint => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let mut exprs = vec![self.expr()?];
                while self.eat(&TokenKind::Comma) {
                    exprs.push(self.expr()?);
                }
                self.expect(&TokenKind::RParen, "')'")?;
                self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(Stmt {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: StmtKind::Print(exprs),
                })
            }
            TokenKind::KwAssert => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let expr = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.expect(&TokenKind::Semicolon, "';'")?;
                Ok(Stmt {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: StmtKind::Assert(expr),
                })
            }
            _ => {
                if self.starts_type() {
                    let decl = self.var_decl()?;
                    Ok(Stmt {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        kind: StmtKind::Decl(decl),
                    })
                } else {
                    let expr = self.expr()?;
                    self.expect(&TokenKind::Semicolon, "';'")?;
                    Ok(Stmt {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        kind: StmtKind::Expr(expr),
                    })
                }
            }
        }
    }

    /// `ty name(shape)? (= init)? (, ...)* ;`
    fn var_decl(&mut self) -> PResult<VarDecl> {
        let span = self.span();
        let ty = self.type_expr()?;

        let mut inits = Vec::new();
        loop {
            let ispan = self.span();
            let name = self.ident("variable name")?;

            let mut shape = Vec::new();
            if self.eat(&TokenKind::LParen) {
                loop {
                    shape.push(self.expr()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RParen, "')'")?;
            }

            let init = if self.eat(&TokenKind::Assign) {
                Some(self.expr()?)
            } else {
                None
            };

            inits.push(VarInit {
                id: self.fresh(),
                span: ispan.merge(self.prev_span()),
                name,
                shape,
                init,
            });

            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Semicolon, "';'")?;

        Ok(VarDecl {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            ty,
            inits,
        })
    }

    /*******************************************************************
      Expressions
    *******************************************************************/

    fn expr(&mut self) -> PResult<Expr> {
        self.assign_expr()
    }

    fn assign_expr(&mut self) -> PResult<Expr> {
        let span = self.span();
        let lhs = self.ternary_expr()?;

        let op = match self.peek() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            TokenKind::PercentAssign => Some(BinaryOp::Mod),
            TokenKind::AmpAssign => Some(BinaryOp::Band),
            TokenKind::PipeAssign => Some(BinaryOp::Bor),
            TokenKind::CaretAssign => Some(BinaryOp::Xor),
            _ => return Ok(lhs),
        };
        self.bump();

        let lval = match self.expr_to_lvalue(lhs) {
            Some(lval) => Box::new(lval),
            None => return self.error_here("left-hand side of assignment is not an lvalue"),
        };
        let rhs = Box::new(self.assign_expr()?);
        Ok(Expr {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            kind: ExprKind::Assign { op, lval, rhs },
        })
    }

    fn expr_to_lvalue(&mut self, expr: Expr) -> Option<LValue> {
        let span = expr.span;
        let kind = match expr.kind {
            ExprKind::Var(id) => LValueKind::Var(id),
            ExprKind::Index { expr, subs } => {
                let inner = self.expr_to_lvalue(*expr)?;
                LValueKind::Index {
                    lval: Box::new(inner),
                    subs,
                }
            }
            ExprKind::Select { expr, field } => {
                let inner = self.expr_to_lvalue(*expr)?;
                LValueKind::Select {
                    lval: Box::new(inner),
                    field,
                }
            }
            _ => return None,
        };
        Some(LValue {
            id: self.fresh(),
            span,
            kind,
        })
    }

    fn ternary_expr(&mut self) -> PResult<Expr> {
        let span = self.span();
        let cond = self.qualified_expr()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }

        let then_expr = Box::new(self.expr()?);
        self.expect(&TokenKind::Colon, "':'")?;
        let else_expr = Box::new(self.ternary_expr()?);
        Ok(Expr {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            kind: ExprKind::Ternary {
                cond: Box::new(cond),
                then_expr,
                else_expr,
            },
        })
    }

    /// `e :: qual ...` pushes explicit type context.
    fn qualified_expr(&mut self) -> PResult<Expr> {
        let span = self.span();
        let expr = self.lor_expr()?;
        if !self.at(&TokenKind::DoubleColon) {
            return Ok(expr);
        }
        self.bump();

        let mut quals = Vec::new();
        loop {
            match self.peek().clone() {
                TokenKind::KwPublic => {
                    let qspan = self.span();
                    self.bump();
                    quals.push(TypeQual::Sec(SecTypeExpr {
                        id: self.fresh(),
                        span: qspan,
                        kind: SecTypeExprKind::Public,
                    }));
                }
                TokenKind::DoubleLBracket => {
                    let qspan = self.span();
                    self.bump();
                    let kind = match self.bump() {
                        TokenKind::IntLit(n) => DimTypeExprKind::Const(n as u32),
                        TokenKind::Ident(name) => {
                            let name = self.interner.intern(&name);
                            DimTypeExprKind::Var(Ident {
                                id: self.fresh(),
                                span: qspan,
                                name,
                            })
                        }
                        _ => return self.error_here("expected a dimensionality"),
                    };
                    self.expect(&TokenKind::DoubleRBracket, "']]'")?;
                    quals.push(TypeQual::Dim(DimTypeExpr {
                        id: self.fresh(),
                        span: qspan,
                        kind,
                    }));
                }
                TokenKind::Ident(word) => {
                    let qspan = self.span();
                    if let Some(p) = Prim::from_keyword(&word) {
                        self.bump();
                        quals.push(TypeQual::Data(DataTypeExpr {
                            id: self.fresh(),
                            span: qspan,
                            kind: DataTypeExprKind::Const(p),
                        }));
                    } else {
                        // A domain or a named data type; the checker
                        // resolves which.
                        let id = self.ident("type qualifier")?;
                        quals.push(TypeQual::Sec(SecTypeExpr {
                            id: self.fresh(),
                            span: qspan,
                            kind: SecTypeExprKind::Named(id),
                        }));
                    }
                }
                _ => break,
            }
            if quals.is_empty() {
                break;
            }
            // Qualifiers are juxtaposed: `e :: pd int [[2]]`.
            if !matches!(
                self.peek(),
                TokenKind::KwPublic | TokenKind::DoubleLBracket | TokenKind::Ident(_)
            ) {
                break;
            }
        }

        if quals.is_empty() {
            return self.error_here("expected a type qualifier after '::'");
        }

        Ok(Expr {
            id: self.fresh(),
            span: span.merge(self.prev_span()),
            kind: ExprKind::Qualified {
                expr: Box::new(expr),
                quals,
            },
        })
    }

    fn lor_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.land_expr()?;
        while self.at(&TokenKind::OrOr) {
            self.bump();
            let rhs = self.land_expr()?;
            lhs = self.binary(BinaryOp::Lor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn land_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.bor_expr()?;
        while self.at(&TokenKind::AndAnd) {
            self.bump();
            let rhs = self.bor_expr()?;
            lhs = self.binary(BinaryOp::Land, lhs, rhs);
        }
        Ok(lhs)
    }

    fn bor_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.bxor_expr()?;
        while self.at(&TokenKind::Pipe) {
            self.bump();
            let rhs = self.bxor_expr()?;
            lhs = self.binary(BinaryOp::Bor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn bxor_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.band_expr()?;
        while self.at(&TokenKind::Caret) {
            self.bump();
            let rhs = self.band_expr()?;
            lhs = self.binary(BinaryOp::Xor, lhs, rhs);
        }
        Ok(lhs)
    }

    fn band_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.eq_expr()?;
        while self.at(&TokenKind::Amp) {
            self.bump();
            let rhs = self.eq_expr()?;
            lhs = self.binary(BinaryOp::Band, lhs, rhs);
        }
        Ok(lhs)
    }

    fn eq_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.rel_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.rel_expr()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn rel_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.shift_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::LessEq => BinaryOp::Le,
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::GreaterEq => BinaryOp::Ge,
                TokenKind::Greater => BinaryOp::Gt,
                _ => break,
            };
            self.bump();
            let rhs = self.shift_expr()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn shift_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                _ => break,
            };
            self.bump();
            let rhs = self.add_expr()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.mul_expr()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.unary_expr()?;
            lhs = self.binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.merge(rhs.span);
        Expr {
            id: self.fresh(),
            span,
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    fn unary_expr(&mut self) -> PResult<Expr> {
        let span = self.span();
        let op = match self.peek() {
            TokenKind::Bang => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::Inv),
            TokenKind::Minus => Some(UnaryOp::Minus),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let expr = Box::new(self.unary_expr()?);
            return Ok(Expr {
                id: self.fresh(),
                span: span.merge(self.prev_span()),
                kind: ExprKind::Unary { op, expr },
            });
        }

        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let is_inc = matches!(self.peek(), TokenKind::PlusPlus);
            self.bump();
            let inner = self.unary_expr()?;
            let lval = match self.expr_to_lvalue(inner) {
                Some(lval) => Box::new(lval),
                None => return self.error_here("operand of '++'/'--' is not an lvalue"),
            };
            return Ok(Expr {
                id: self.fresh(),
                span: span.merge(self.prev_span()),
                kind: ExprKind::IncDec {
                    lval,
                    is_inc,
                    is_prefix: true,
                },
            });
        }

        // `(ty) e` cast: a parenthesised primitive type keyword.
        if self.at(&TokenKind::LParen) {
            if let TokenKind::Ident(word) = self.peek_at(1).clone() {
                if Prim::from_keyword(&word).is_some()
                    && matches!(self.peek_at(2), TokenKind::RParen)
                {
                    self.bump(); // (
                    let tspan = self.span();
                    self.bump(); // type
                    self.bump(); // )
                    let p = Prim::from_keyword(&word).unwrap();
                    let ty = DataTypeExpr {
                        id: self.fresh(),
                        span: tspan,
                        kind: DataTypeExprKind::Const(p),
                    };
                    let expr = Box::new(self.unary_expr()?);
                    return Ok(Expr {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        kind: ExprKind::Cast { ty, expr },
                    });
                }
            }
        }

        self.postfix_expr()
    }

    fn postfix_expr(&mut self) -> PResult<Expr> {
        let mut expr = self.primary_expr()?;

        loop {
            match self.peek() {
                TokenKind::LBracket => {
                    self.bump();
                    let mut subs = Vec::new();
                    loop {
                        subs.push(self.subscript()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RBracket, "']'")?;
                    let span = expr.span.merge(self.prev_span());
                    expr = Expr {
                        id: self.fresh(),
                        span,
                        kind: ExprKind::Index {
                            expr: Box::new(expr),
                            subs,
                        },
                    };
                }
                TokenKind::Dot => {
                    self.bump();
                    let field = self.ident("field name")?;
                    let span = expr.span.merge(field.span);
                    expr = Expr {
                        id: self.fresh(),
                        span,
                        kind: ExprKind::Select {
                            expr: Box::new(expr),
                            field,
                        },
                    };
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let is_inc = matches!(self.peek(), TokenKind::PlusPlus);
                    self.bump();
                    let span = expr.span.merge(self.prev_span());
                    let lval = match self.expr_to_lvalue(expr) {
                        Some(lval) => Box::new(lval),
                        None => {
                            return self.error_here("operand of '++'/'--' is not an lvalue")
                        }
                    };
                    expr = Expr {
                        id: self.fresh(),
                        span,
                        kind: ExprKind::IncDec {
                            lval,
                            is_inc,
                            is_prefix: false,
                        },
                    };
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn subscript(&mut self) -> PResult<Subscript> {
        // `:`, `lo:`, `:hi`, `lo:hi`, or a plain index.
        if self.eat(&TokenKind::Colon) {
            if self.subscript_ends() {
                return Ok(Subscript::Slice(None, None));
            }
            let hi = self.expr()?;
            return Ok(Subscript::Slice(None, Some(hi)));
        }

        let lo = self.expr()?;
        if self.eat(&TokenKind::Colon) {
            if self.subscript_ends() {
                return Ok(Subscript::Slice(Some(lo), None));
            }
            let hi = self.expr()?;
            return Ok(Subscript::Slice(Some(lo), Some(hi)));
        }
        Ok(Subscript::Index(lo))
    }

    fn subscript_ends(&self) -> bool {
        matches!(self.peek(), TokenKind::Comma | TokenKind::RBracket)
    }

    fn primary_expr(&mut self) -> PResult<Expr> {
        let span = self.span();
        macro_rules! unary_builtin {
            ($ctor:ident) => {{
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let e = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Expr {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: ExprKind::$ctor(Box::new(e)),
                })
            }};
        }

        match self.peek().clone() {
            TokenKind::IntLit(v) => {
                self.bump();
                Ok(Expr {
                    id: self.fresh(),
                    span,
                    kind: ExprKind::IntLit(v),
                })
            }
            TokenKind::FloatLit(v) => {
                self.bump();
                Ok(Expr {
                    id: self.fresh(),
                    span,
                    kind: ExprKind::FloatLit(v),
                })
            }
            TokenKind::StrLit(s) => {
                self.bump();
                Ok(Expr {
                    id: self.fresh(),
                    span,
                    kind: ExprKind::StrLit(s),
                })
            }
            TokenKind::KwTrue => {
                self.bump();
                Ok(Expr {
                    id: self.fresh(),
                    span,
                    kind: ExprKind::BoolLit(true),
                })
            }
            TokenKind::KwFalse => {
                self.bump();
                Ok(Expr {
                    id: self.fresh(),
                    span,
                    kind: ExprKind::BoolLit(false),
                })
            }
            TokenKind::LParen => {
                self.bump();
                let e = self.expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(e)
            }
            TokenKind::LBrace => {
                self.bump();
                let mut elems = Vec::new();
                if !self.at(&TokenKind::RBrace) {
                    loop {
                        elems.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
                Ok(Expr {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: ExprKind::ArrayCtor(elems),
                })
            }
            TokenKind::KwDeclassify => unary_builtin!(Declassify),
            TokenKind::KwClassify => unary_builtin!(Classify),
            TokenKind::KwShape => unary_builtin!(Shape),
            TokenKind::KwSize => unary_builtin!(Size),
            TokenKind::KwToString => unary_builtin!(ToString),
            TokenKind::KwStrlen => unary_builtin!(Strlen),
            TokenKind::KwStringFromBytes => unary_builtin!(StringFromBytes),
            TokenKind::KwBytesFromString => unary_builtin!(BytesFromString),
            TokenKind::KwDomainId => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let domain = self.ident("domain name")?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Expr {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: ExprKind::DomainId(domain),
                })
            }
            TokenKind::KwReshape => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let e = self.expr()?;
                let mut dims = Vec::new();
                while self.eat(&TokenKind::Comma) {
                    dims.push(self.expr()?);
                }
                self.expect(&TokenKind::RParen, "')'")?;
                if dims.is_empty() {
                    return self.error_here("reshape needs at least one dimension");
                }
                Ok(Expr {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: ExprKind::Reshape {
                        expr: Box::new(e),
                        dims,
                    },
                })
            }
            TokenKind::KwCat => {
                self.bump();
                self.expect(&TokenKind::LParen, "'('")?;
                let lhs = self.expr()?;
                self.expect(&TokenKind::Comma, "','")?;
                let rhs = self.expr()?;
                let dim = if self.eat(&TokenKind::Comma) {
                    Some(Box::new(self.expr()?))
                } else {
                    None
                };
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Expr {
                    id: self.fresh(),
                    span: span.merge(self.prev_span()),
                    kind: ExprKind::Cat {
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        dim,
                    },
                })
            }
            TokenKind::Ident(_) => {
                let name = self.ident("identifier")?;
                if self.eat(&TokenKind::LParen) {
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    return Ok(Expr {
                        id: self.fresh(),
                        span: span.merge(self.prev_span()),
                        kind: ExprKind::ProcCall { name, args },
                    });
                }
                Ok(Expr {
                    id: self.fresh(),
                    span,
                    kind: ExprKind::Var(name),
                })
            }
            _ => self.error_here("expected an expression"),
        }
    }
}

#[cfg(test)]
#[path = "tests/parser_tests.rs"]
mod tests;
