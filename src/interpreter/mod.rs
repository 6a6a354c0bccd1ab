pub mod builtins;
pub mod environment;
pub mod value;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::ast::*;
use crate::error::RuntimeError;
use crate::interpreter::builtins::Builtin;
use crate::interpreter::environment::Environment;
use crate::interpreter::value::{FunctionValue, UserFunction, Value};

pub struct Interpreter {
    environment: Rc<RefCell<Environment>>,
    output: Vec<String>,
    /// Writer for print output (allows testing without stdout)
    writer: Box<dyn Write>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let globals = Rc::new(RefCell::new(Environment::new()));
        for builtin in Builtin::all() {
            globals.borrow_mut().set(
                builtin.name(),
                Value::Function(FunctionValue::Builtin(*builtin)),
            );
        }
        Self {
            environment: globals,
            output: Vec::new(),
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Create an interpreter that captures output (for testing).
    #[cfg(test)]
    fn new_capturing() -> Self {
        let mut interp = Self::new();
        interp.writer = Box::new(Vec::<u8>::new());
        interp
    }

    pub fn interpret(&mut self, program: &Program) -> Result<(), RuntimeError> {
        for stmt in &program.body.statements {
            self.execute_stmt(stmt)?;
        }
        Ok(())
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    fn execute_stmt(&mut self, stmt: &Stmt) -> Result<(), RuntimeError> {
        match stmt {
            Stmt::Expression(e) => {
                self.evaluate_expr(&e.expression)?;
                Ok(())
            }
            Stmt::VarDecl(v) => {
                let value = match &v.initializer {
                    Some(init) => self.evaluate_expr(init)?,
                    None => Value::Null,
                };
                self.environment.borrow_mut().set(&v.name, value);
                Ok(())
            }
            Stmt::FunctionDef(f) => {
                let function = UserFunction {
                    name: f.name.clone(),
                    params: f.params.clone(),
                    body: f.body.clone(),
                };
                self.environment.borrow_mut().set(
                    &f.name,
                    Value::Function(FunctionValue::User(Rc::new(function))),
                );
                Ok(())
            }
            Stmt::If(i) => self.execute_if(i),
            Stmt::While(w) => {
                loop {
                    let condition = self.evaluate_expr(&w.condition)?;
                    if !expect_bool(&condition, "while condition", w.condition.span())? {
                        break;
                    }
                    self.execute_block(&w.body)?;
                }
                Ok(())
            }
            Stmt::For(f) => {
                // The for header gets its own scope.
                let previous = Rc::clone(&self.environment);
                self.environment = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &previous,
                ))));
                let result = self.run_for(f);
                self.environment = previous;
                result
            }
            Stmt::Block(b) => self.execute_block(b),
            Stmt::Import(i) => Err(RuntimeError::Unsupported {
                message: "'import' is only supported by the bytecode compiler".to_string(),
                span: Some(i.span),
            }),
            Stmt::Switch(s) => Err(RuntimeError::Unsupported {
                message: "switch/case evaluation is not implemented".to_string(),
                span: Some(s.span),
            }),
        }
    }

    fn execute_if(&mut self, i: &IfStmt) -> Result<(), RuntimeError> {
        let condition = self.evaluate_expr(&i.condition)?;
        if expect_bool(&condition, "if condition", i.condition.span())? {
            self.execute_block(&i.then_block)
        } else {
            match i.else_branch {
                Some(ElseBranch::Block(ref b)) => self.execute_block(b),
                Some(ElseBranch::If(ref chained)) => self.execute_if(chained),
                None => Ok(()),
            }
        }
    }

    fn run_for(&mut self, f: &ForStmt) -> Result<(), RuntimeError> {
        if let Some(ref init) = f.init {
            self.execute_stmt(init)?;
        }
        loop {
            if let Some(ref cond) = f.condition {
                let condition = self.evaluate_expr(cond)?;
                if !expect_bool(&condition, "for condition", cond.span())? {
                    break;
                }
            }
            self.execute_block(&f.body)?;
            if let Some(ref incr) = f.increment {
                self.evaluate_expr(incr)?;
            }
        }
        Ok(())
    }

    /// Plain blocks execute in the enclosing scope; only function calls and
    /// for headers introduce a new one.
    fn execute_block(&mut self, block: &Block) -> Result<(), RuntimeError> {
        for stmt in &block.statements {
            self.execute_stmt(stmt)?;
        }
        Ok(())
    }

    fn evaluate_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(l) => Ok(match &l.value {
                LiteralValue::Number(n) => Value::Number(*n),
                LiteralValue::String(s) => Value::Str(s.clone()),
                LiteralValue::Bool(b) => Value::Bool(*b),
                LiteralValue::Null => Value::Null,
            }),
            Expr::Variable(v) => self
                .environment
                .borrow()
                .get(&v.name)
                .ok_or_else(|| RuntimeError::UndefinedVariable {
                    name: v.name.clone(),
                    span: Some(v.span),
                }),
            Expr::Unary(u) => {
                let operand = self.evaluate_expr(&u.operand)?;
                match u.operator {
                    UnaryOp::Negate => match operand {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => Err(RuntimeError::type_mismatch(
                            format!("unary '-' requires a number, got {}", other.kind_name()),
                            u.span,
                        )),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!operand.is_truthy_for_not())),
                }
            }
            Expr::Binary(b) => self.evaluate_binary(b),
            Expr::Assign(a) => {
                let value = self.evaluate_expr(&a.value)?;
                self.environment.borrow_mut().set(&a.name, value.clone());
                Ok(value)
            }
            Expr::Call(c) => self.evaluate_call(c),
            Expr::Array(a) => {
                let mut elements = Vec::with_capacity(a.elements.len());
                for element in &a.elements {
                    elements.push(self.evaluate_expr(element)?);
                }
                Ok(Value::Array(elements))
            }
            Expr::Index(i) => {
                let object = self.evaluate_expr(&i.object)?;
                let index = self.evaluate_expr(&i.index)?;
                let elements = match object {
                    Value::Array(elements) => elements,
                    other => {
                        return Err(RuntimeError::type_mismatch(
                            format!("cannot index a {}", other.kind_name()),
                            i.span,
                        ));
                    }
                };
                let idx = match index {
                    Value::Number(n) => n as i64,
                    _ => {
                        return Err(RuntimeError::type_mismatch(
                            "array index must be a number",
                            i.index.span(),
                        ));
                    }
                };
                if idx < 0 || idx as usize >= elements.len() {
                    return Err(RuntimeError::IndexOutOfBounds {
                        index: idx,
                        len: elements.len(),
                        span: Some(i.span),
                    });
                }
                Ok(elements[idx as usize].clone())
            }
        }
    }

    fn evaluate_binary(&mut self, b: &BinaryExpr) -> Result<Value, RuntimeError> {
        let left = self.evaluate_expr(&b.left)?;
        let right = self.evaluate_expr(&b.right)?;

        match b.operator {
            BinaryOp::Add => match (&left, &right) {
                (Value::Number(a), Value::Number(c)) => Ok(Value::Number(a + c)),
                // Any other combination string-coerces both sides.
                _ => Ok(Value::Str(format!(
                    "{}{}",
                    left.coerce_string(),
                    right.coerce_string()
                ))),
            },
            BinaryOp::Subtract => number_binop(&left, &right, |a, c| a - c, b),
            BinaryOp::Multiply => number_binop(&left, &right, |a, c| a * c, b),
            BinaryOp::Divide => {
                check_divisor(&right, b)?;
                number_binop(&left, &right, |a, c| a / c, b)
            }
            BinaryOp::Modulo => {
                check_divisor(&right, b)?;
                number_binop(&left, &right, |a, c| a % c, b)
            }
            BinaryOp::Less => number_cmp(&left, &right, |a, c| a < c, b),
            BinaryOp::LessEqual => number_cmp(&left, &right, |a, c| a <= c, b),
            BinaryOp::Greater => number_cmp(&left, &right, |a, c| a > c, b),
            BinaryOp::GreaterEqual => number_cmp(&left, &right, |a, c| a >= c, b),
            BinaryOp::Equal => Ok(Value::Bool(left.is_equal(&right))),
            BinaryOp::NotEqual => Ok(Value::Bool(!left.is_equal(&right))),
            // Both sides are evaluated eagerly; no short-circuit.
            BinaryOp::And | BinaryOp::Or => match (&left, &right) {
                (Value::Bool(a), Value::Bool(c)) => Ok(Value::Bool(if b.operator == BinaryOp::And
                {
                    *a && *c
                } else {
                    *a || *c
                })),
                _ => Err(RuntimeError::type_mismatch(
                    format!("'{}' requires boolean operands", b.operator),
                    b.span,
                )),
            },
        }
    }

    fn evaluate_call(&mut self, c: &CallExpr) -> Result<Value, RuntimeError> {
        let callee = self.environment.borrow().get(&c.callee);
        let Some(Value::Function(function)) = callee else {
            return Err(RuntimeError::UndefinedFunction {
                name: c.callee.clone(),
                span: Some(c.span),
            });
        };

        let mut args = Vec::with_capacity(c.arguments.len());
        for arg in &c.arguments {
            args.push(self.evaluate_expr(arg)?);
        }

        match function {
            FunctionValue::Builtin(Builtin::Print) => {
                let text: String = args.iter().map(|v| v.to_string()).collect();
                writeln!(self.writer, "{text}")?;
                self.output.push(text);
                Ok(Value::Null)
            }
            FunctionValue::Builtin(builtin) => builtin.call(&args).map_err(|e| match e {
                RuntimeError::TypeMismatch {
                    message,
                    span: None,
                } => RuntimeError::TypeMismatch {
                    message,
                    span: Some(c.span),
                },
                other => other,
            }),
            FunctionValue::User(function) => {
                // The call body runs in a child scope of the caller's scope.
                // Missing arguments bind null; extras are discarded.
                let previous = Rc::clone(&self.environment);
                let child = Rc::new(RefCell::new(Environment::with_enclosing(Rc::clone(
                    &previous,
                ))));
                {
                    let mut child_env = child.borrow_mut();
                    for (i, param) in function.params.iter().enumerate() {
                        let value = args.get(i).cloned().unwrap_or(Value::Null);
                        child_env.set(param, value);
                    }
                }
                self.environment = child;
                let result = self.execute_block(&function.body);
                self.environment = previous;
                result?;
                // Functions complete by falling off the end and yield null.
                Ok(Value::Null)
            }
        }
    }
}

fn expect_bool(value: &Value, what: &str, span: crate::lexer::token::Span) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(RuntimeError::type_mismatch(
            format!("{what} must be a boolean, got {}", other.kind_name()),
            span,
        )),
    }
}

fn check_divisor(right: &Value, b: &BinaryExpr) -> Result<(), RuntimeError> {
    if matches!(right, Value::Number(n) if *n == 0.0) {
        Err(RuntimeError::DivideByZero { span: Some(b.span) })
    } else {
        Ok(())
    }
}

fn number_binop(
    left: &Value,
    right: &Value,
    op: fn(f64, f64) -> f64,
    b: &BinaryExpr,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(c)) => Ok(Value::Number(op(*a, *c))),
        _ => Err(RuntimeError::type_mismatch(
            format!("operator '{}' requires numeric operands", b.operator),
            b.span,
        )),
    }
}

fn number_cmp(
    left: &Value,
    right: &Value,
    op: fn(f64, f64) -> bool,
    b: &BinaryExpr,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(a), Value::Number(c)) => Ok(Value::Bool(op(*a, *c))),
        _ => Err(RuntimeError::type_mismatch(
            format!("operator '{}' requires numeric operands", b.operator),
            b.span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser::Parser;
    use rstest::rstest;

    fn run(source: &str) -> Vec<String> {
        let tokens = lexer::tokenize(source).expect("scan should succeed");
        let program = Parser::new(tokens).parse().expect("parse should succeed");
        let mut interp = Interpreter::new_capturing();
        interp
            .interpret(&program)
            .expect("interpret should succeed");
        interp.output.clone()
    }

    fn run_err(source: &str) -> RuntimeError {
        let tokens = lexer::tokenize(source).expect("scan should succeed");
        let program = Parser::new(tokens).parse().expect("parse should succeed");
        let mut interp = Interpreter::new_capturing();
        interp.interpret(&program).unwrap_err()
    }

    #[rstest]
    #[case("print(1 + 2);", "3")]
    #[case("print(10 - 3);", "7")]
    #[case("print(2 * 3);", "6")]
    #[case("print(10 / 4);", "2.5")]
    #[case("print(10 % 3);", "1")]
    #[case("print(-5);", "-5")]
    fn arithmetic(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(run(source), vec![expected]);
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(
            run("print(\"hello\" + \" \" + \"world\");"),
            vec!["hello world"]
        );
    }

    #[test]
    fn mixed_concatenation_uses_two_decimal_coercion() {
        assert_eq!(run("print(\"n = \" + 42);"), vec!["n = 42.00"]);
        assert_eq!(run("print(true + \"!\");"), vec!["true!"]);
        assert_eq!(run("print(null + \"\");"), vec!["null"]);
    }

    #[test]
    fn print_concatenates_arguments_without_separator() {
        assert_eq!(run("print(\"a\", 1, true);"), vec!["a1true"]);
    }

    #[test]
    fn equality() {
        assert_eq!(run("print(1 == 1);"), vec!["true"]);
        assert_eq!(run("print(1 == 2);"), vec!["false"]);
        assert_eq!(run("print(null == null);"), vec!["true"]);
        assert_eq!(run("print(1 != \"1\");"), vec!["true"]);
        assert_eq!(run("print(1 == \"1\");"), vec!["false"]);
    }

    #[test]
    fn logical_operators_require_booleans() {
        assert_eq!(run("print(true && false);"), vec!["false"]);
        assert_eq!(run("print(true || false);"), vec!["true"]);
        let err = run_err("print(1 && true);");
        assert!(err.to_string().contains("boolean operands"));
    }

    #[test]
    fn not_coerces_by_truthiness() {
        assert_eq!(run("print(!true);"), vec!["false"]);
        assert_eq!(run("print(!0);"), vec!["true"]);
        assert_eq!(run("print(!3);"), vec!["false"]);
        assert_eq!(run("print(!\"\");"), vec!["true"]);
        assert_eq!(run("print(!\"x\");"), vec!["false"]);
        assert_eq!(run("print(!null);"), vec!["true"]);
    }

    #[test]
    fn variables() {
        assert_eq!(run("var x = 10; print(x);"), vec!["10"]);
        assert_eq!(run("var x; print(x);"), vec!["null"]);
        assert_eq!(run("var x = 1; x = 2; print(x);"), vec!["2"]);
        assert_eq!(run("let a = 1; const b = 2; print(a + b);"), vec!["3"]);
    }

    #[test]
    fn assignment_yields_its_value() {
        assert_eq!(run("var x = 0; var y = 0; y = x = 5; print(y);"), vec!["5"]);
    }

    #[test]
    fn if_else() {
        assert_eq!(
            run("if (true) { print(1); } else { print(2); }"),
            vec!["1"]
        );
        assert_eq!(
            run("if (false) { print(1); } else { print(2); }"),
            vec!["2"]
        );
    }

    #[test]
    fn else_if_chain() {
        let source = "var n = 7;\n\
            if (n == 0) { print(\"zero\"); } else if (n < 5) { print(\"small\"); } else { print(\"big\"); }";
        assert_eq!(run(source), vec!["big"]);
    }

    #[test]
    fn non_boolean_condition_is_type_mismatch() {
        let err = run_err("if (1) { }");
        assert!(err.to_string().contains("must be a boolean"));
        let err = run_err("while (\"x\") { }");
        assert!(err.to_string().contains("must be a boolean"));
    }

    #[test]
    fn while_loop() {
        assert_eq!(
            run("var s = 0; var i = 1; while (i <= 5) { s = s + i; i = i + 1; } print(s);"),
            vec!["15"]
        );
    }

    #[test]
    fn for_loop() {
        assert_eq!(
            run("for (var i = 0; i < 3; i = i + 1) { print(i); }"),
            vec!["0", "1", "2"]
        );
    }

    #[test]
    fn for_loop_header_variable_is_scoped() {
        let err = run_err("for (var i = 0; i < 1; i = i + 1) { } print(i);");
        assert!(matches!(err, RuntimeError::UndefinedVariable { ref name, .. } if name == "i"));
    }

    #[test]
    fn for_loop_without_condition_needs_no_header_parts() {
        // An empty condition means true; break out via a runtime error since
        // the language has no break statement.
        let err = run_err("for (;;) { print(\"once\"); missing(); }");
        assert!(matches!(err, RuntimeError::UndefinedFunction { .. }));
    }

    #[test]
    fn blocks_share_the_enclosing_scope() {
        // Assignment inside a block updates the outer binding, and
        // declarations inside a block stay visible after it.
        assert_eq!(
            run("var x = 1; { x = 2; var y = 3; } print(x + y);"),
            vec!["5"]
        );
    }

    #[test]
    fn functions_bind_parameters() {
        assert_eq!(
            run("function inc(x) { x = x + 1; print(x); } inc(41);"),
            vec!["42"]
        );
    }

    #[test]
    fn function_parameters_are_scoped_to_the_call() {
        let err = run_err("function f(p) { } f(1); print(p);");
        assert!(matches!(err, RuntimeError::UndefinedVariable { .. }));
    }

    #[test]
    fn missing_arguments_bind_null() {
        assert_eq!(run("function f(a, b) { print(a, b); } f(1);"), vec!["1null"]);
    }

    #[test]
    fn extra_arguments_are_discarded() {
        assert_eq!(run("function f(a) { print(a); } f(1, 2, 3);"), vec!["1"]);
    }

    #[test]
    fn function_calls_yield_null() {
        assert_eq!(run("function f() { } print(f());"), vec!["null"]);
    }

    #[test]
    fn functions_read_caller_scope() {
        assert_eq!(
            run("var base = 10; function show(n) { print(base + n); } show(5);"),
            vec!["15"]
        );
    }

    #[test]
    fn arrays_and_indexing() {
        assert_eq!(run("var a = [10, 20, 30]; print(a[1]);"), vec!["20"]);
        assert_eq!(run("var m = [[1, 2], [3, 4]]; print(m[1][0]);"), vec!["3"]);
        assert_eq!(run("print([] == []);"), vec!["false"]);
    }

    #[test]
    fn index_out_of_bounds() {
        let err = run_err("var a = [1]; print(a[3]);");
        assert!(matches!(
            err,
            RuntimeError::IndexOutOfBounds { index: 3, len: 1, .. }
        ));
        let err = run_err("var a = [1]; print(a[0 - 1]);");
        assert!(matches!(err, RuntimeError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn division_by_zero() {
        let err = run_err("print(1 / 0);");
        assert!(matches!(err, RuntimeError::DivideByZero { .. }));
        let err = run_err("print(1 % 0);");
        assert!(matches!(err, RuntimeError::DivideByZero { .. }));
    }

    #[test]
    fn arithmetic_type_errors() {
        let err = run_err("print(1 - \"a\");");
        assert!(err.to_string().contains("numeric operands"));
        let err = run_err("print(\"a\" < \"b\");");
        assert!(err.to_string().contains("numeric operands"));
    }

    #[test]
    fn undefined_variable_error() {
        let err = run_err("print(x);");
        assert!(matches!(err, RuntimeError::UndefinedVariable { ref name, .. } if name == "x"));
    }

    #[test]
    fn undefined_function_error() {
        let err = run_err("nope();");
        assert!(matches!(err, RuntimeError::UndefinedFunction { ref name, .. } if name == "nope"));
    }

    #[test]
    fn calling_a_non_function_is_undefined_function() {
        let err = run_err("var x = 1; x();");
        assert!(matches!(err, RuntimeError::UndefinedFunction { .. }));
    }

    #[test]
    fn builtins_are_registered() {
        assert_eq!(run("print(floor(2.9));"), vec!["2"]);
        assert_eq!(run("print(pow(2, 8));"), vec!["256"]);
        assert_eq!(run("print(to_upper(\"ember\"));"), vec!["EMBER"]);
        assert_eq!(run("print(substring(\"hello world\", 6, 5));"), vec!["world"]);
        assert_eq!(run("print(index_of(\"hello\", \"llo\"));"), vec!["2"]);
        assert_eq!(
            run("print(replace(\"a-b-c\", \"-\", \"+\"));"),
            vec!["a+b-c"]
        );
        assert_eq!(run("print(concat(\"em\", \"ber\"));"), vec!["ember"]);
    }

    #[test]
    fn builtin_arity_error_carries_call_site() {
        let err = run_err("floor();");
        assert!(matches!(
            err,
            RuntimeError::TypeMismatch { span: Some(_), .. }
        ));
    }

    #[test]
    fn import_is_unsupported_on_the_evaluator() {
        let err = run_err("import \"other.ember\";");
        assert!(matches!(err, RuntimeError::Unsupported { .. }));
    }

    #[test]
    fn error_message_includes_line() {
        let source = "var x = 1;\nprint(y);\n";
        let err = run_err(source);
        assert_eq!(
            err.display_with_line(source),
            "Error: line 2: undefined variable 'y'"
        );
    }
}
