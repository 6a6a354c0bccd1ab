use crate::ast::*;

pub fn to_sexp(program: &Program) -> String {
    let mut buf = String::new();
    for stmt in &program.body.statements {
        sexp_stmt(&mut buf, stmt);
        buf.push('\n');
    }
    buf
}

pub fn to_json(program: &Program) -> String {
    serde_json::to_string_pretty(program).expect("AST should be serializable")
}

fn sexp_stmt(buf: &mut String, stmt: &Stmt) {
    match stmt {
        Stmt::Expression(e) => sexp_expr(buf, &e.expression),
        Stmt::VarDecl(v) => {
            buf.push_str("(var ");
            buf.push_str(&v.name);
            if let Some(ref init) = v.initializer {
                buf.push(' ');
                sexp_expr(buf, init);
            }
            buf.push(')');
        }
        Stmt::FunctionDef(f) => {
            buf.push_str("(function ");
            buf.push_str(&f.name);
            buf.push_str(" (");
            for (i, param) in f.params.iter().enumerate() {
                if i > 0 {
                    buf.push(' ');
                }
                buf.push_str(param);
            }
            buf.push(')');
            buf.push(' ');
            sexp_block(buf, &f.body);
            buf.push(')');
        }
        Stmt::If(i) => sexp_if(buf, i),
        Stmt::While(w) => {
            buf.push_str("(while ");
            sexp_expr(buf, &w.condition);
            buf.push(' ');
            sexp_block(buf, &w.body);
            buf.push(')');
        }
        Stmt::For(f) => {
            buf.push_str("(for ");
            match f.init {
                Some(ref init) => sexp_stmt(buf, init),
                None => buf.push('_'),
            }
            buf.push(' ');
            match f.condition {
                Some(ref cond) => sexp_expr(buf, cond),
                None => buf.push('_'),
            }
            buf.push(' ');
            match f.increment {
                Some(ref incr) => sexp_expr(buf, incr),
                None => buf.push('_'),
            }
            buf.push(' ');
            sexp_block(buf, &f.body);
            buf.push(')');
        }
        Stmt::Block(b) => sexp_block(buf, b),
        Stmt::Import(i) => {
            buf.push_str("(import \"");
            buf.push_str(&i.path);
            buf.push_str("\")");
        }
        Stmt::Switch(s) => {
            buf.push_str("(switch ");
            sexp_expr(buf, &s.condition);
            buf.push(')');
        }
    }
}

fn sexp_if(buf: &mut String, i: &IfStmt) {
    buf.push_str("(if ");
    sexp_expr(buf, &i.condition);
    buf.push(' ');
    sexp_block(buf, &i.then_block);
    if let Some(ref else_branch) = i.else_branch {
        buf.push(' ');
        match else_branch {
            ElseBranch::Block(b) => sexp_block(buf, b),
            ElseBranch::If(chained) => sexp_if(buf, chained),
        }
    }
    buf.push(')');
}

fn sexp_block(buf: &mut String, block: &Block) {
    buf.push_str("(block");
    for stmt in &block.statements {
        buf.push(' ');
        sexp_stmt(buf, stmt);
    }
    buf.push(')');
}

fn sexp_expr(buf: &mut String, expr: &Expr) {
    match expr {
        Expr::Binary(b) => {
            buf.push('(');
            buf.push_str(&b.operator.to_string());
            buf.push(' ');
            sexp_expr(buf, &b.left);
            buf.push(' ');
            sexp_expr(buf, &b.right);
            buf.push(')');
        }
        Expr::Unary(u) => {
            buf.push('(');
            buf.push_str(&u.operator.to_string());
            buf.push(' ');
            sexp_expr(buf, &u.operand);
            buf.push(')');
        }
        Expr::Literal(l) => match &l.value {
            LiteralValue::Number(n) => buf.push_str(&format!("{n}")),
            LiteralValue::String(s) => {
                buf.push('"');
                buf.push_str(s);
                buf.push('"');
            }
            LiteralValue::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
            LiteralValue::Null => buf.push_str("null"),
        },
        Expr::Variable(v) => buf.push_str(&v.name),
        Expr::Assign(a) => {
            buf.push_str("(= ");
            buf.push_str(&a.name);
            buf.push(' ');
            sexp_expr(buf, &a.value);
            buf.push(')');
        }
        Expr::Call(c) => {
            buf.push_str("(call ");
            buf.push_str(&c.callee);
            for arg in &c.arguments {
                buf.push(' ');
                sexp_expr(buf, arg);
            }
            buf.push(')');
        }
        Expr::Array(a) => {
            buf.push_str("(array");
            for element in &a.elements {
                buf.push(' ');
                sexp_expr(buf, element);
            }
            buf.push(')');
        }
        Expr::Index(i) => {
            buf.push_str("(index ");
            sexp_expr(buf, &i.object);
            buf.push(' ');
            sexp_expr(buf, &i.index);
            buf.push(')');
        }
    }
}
