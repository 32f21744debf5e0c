//! Single-pass Pratt compiler: parsing and code generation happen in the
//! same walk, with no intermediate AST. Each statement or expression is
//! parsed and its bytecode emitted before the parser moves on.

use ember_core::{Chunk, Heap, OpCode, Value};

use crate::scanner::{Scanner, Token, TokenKind};

const MAX_CONSTANTS: usize = u8::MAX as usize + 1;
const MAX_LOCALS: usize = u8::MAX as usize + 1;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Eq, Ord)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        match self {
            Precedence::None => Precedence::Assignment,
            Precedence::Assignment => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Equality,
            Precedence::Equality => Precedence::Comparison,
            Precedence::Comparison => Precedence::Term,
            Precedence::Term => Precedence::Factor,
            Precedence::Factor => Precedence::Unary,
            Precedence::Unary => Precedence::Call,
            Precedence::Call => Precedence::Primary,
            Precedence::Primary => Precedence::Primary,
        }
    }
}

// Logical `and`/`or` sit between ASSIGNMENT and EQUALITY in the precedence
// ordering but, like the rest of control flow, have no infix rule in this
// grammar: neither token carries a binary-operator meaning here.
fn infix_precedence(kind: TokenKind) -> Precedence {
    use TokenKind::*;
    match kind {
        EqualEqual | BangEqual => Precedence::Equality,
        Less | LessEqual | Greater | GreaterEqual => Precedence::Comparison,
        Plus | Minus => Precedence::Term,
        Star | Slash => Precedence::Factor,
        _ => Precedence::None,
    }
}

struct Local<'a> {
    name: &'a str,
    /// `None` while the local's initializer is still being compiled (so a
    /// reference to its own name in that initializer is rejected); `Some`
    /// once it is ready to be read.
    depth: Option<u32>,
}

pub struct Compiler<'a> {
    scanner: Scanner<'a>,
    heap: &'a mut Heap,
    chunk: Chunk,

    current: Token<'a>,
    previous: Token<'a>,
    had_error: bool,
    panic_mode: bool,

    locals: Vec<Local<'a>>,
    scope_depth: u32,
}

impl<'a> Compiler<'a> {
    pub fn compile(source: &'a str, heap: &'a mut Heap) -> Option<Chunk> {
        let mut scanner = Scanner::new(source);
        let first = scanner.scan_token();

        let mut compiler = Compiler {
            scanner,
            heap,
            chunk: Chunk::new(),
            current: first,
            previous: first,
            had_error: false,
            panic_mode: false,
            locals: Vec::new(),
            scope_depth: 0,
        };

        while !compiler.check(TokenKind::Eof) {
            compiler.declaration();
        }
        compiler.emit_return();

        if compiler.had_error {
            None
        } else {
            #[cfg(feature = "print_code")]
            ember_core::disassemble::disassemble_chunk(&compiler.chunk, "code");

            Some(compiler.chunk)
        }
    }

    // --- token plumbing -----------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
            return;
        }
        self.error_at_current(message);
    }

    fn error_at_current(&mut self, message: &str) {
        let token = self.current;
        self.error_at(token, message);
    }

    fn error(&mut self, message: &str) {
        let token = self.previous;
        self.error_at(token, message);
    }

    fn error_at(&mut self, token: Token<'a>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        eprint!("[line {}] Error", token.line);
        if token.kind == TokenKind::Eof {
            eprint!(" at end");
        } else if token.kind != TokenKind::Error {
            eprint!(" at '{}'", token.lexeme);
        }
        eprintln!(": {message}");
        self.had_error = true;
    }

    /// Skips tokens until the start of what looks like the next statement,
    /// so one syntax error doesn't cascade into a wall of spurious ones.
    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            match self.current.kind {
                TokenKind::Class
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Print
                | TokenKind::Return => return,
                _ => self.advance(),
            }
        }
    }

    // --- emission --------------------------------------------------------

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk.write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.chunk.write_op(op, line);
    }

    fn emit_ops(&mut self, a: OpCode, b: OpCode) {
        self.emit_op(a);
        self.emit_op(b);
    }

    fn emit_return(&mut self) {
        self.emit_op(OpCode::Return);
    }

    fn emit_constant(&mut self, value: Value) {
        let index = self.make_constant(value);
        self.emit_op(OpCode::Constant);
        self.emit_byte(index);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let index = self.chunk.add_constant(value);
        if index >= MAX_CONSTANTS {
            self.error("Too many constants in one chunk.");
            return 0;
        }
        index as u8
    }

    // --- scopes and locals -------------------------------------------------

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.scope_depth -= 1;
        while let Some(local) = self.locals.last() {
            if local.depth.map_or(false, |d| d > self.scope_depth) {
                self.emit_op(OpCode::Pop);
                self.locals.pop();
            } else {
                break;
            }
        }
    }

    fn add_local(&mut self, name: &'a str) {
        if self.locals.len() >= MAX_LOCALS {
            self.error("Too many local variables in function.");
            return;
        }
        self.locals.push(Local { name, depth: None });
    }

    fn declare_variable(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        for local in self.locals.iter().rev() {
            if local.depth.is_some_and(|d| d < self.scope_depth) {
                break;
            }
            if local.name == name {
                self.error("Already a variable with this name in this scope.");
                return;
            }
        }
        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        if self.scope_depth == 0 {
            return;
        }
        if let Some(local) = self.locals.last_mut() {
            local.depth = Some(self.scope_depth);
        }
    }

    fn resolve_local(&mut self, name: &str) -> Option<u8> {
        for (i, local) in self.locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth.is_none() {
                    self.error("Can't read local variable in its own initializer.");
                }
                return Some(i as u8);
            }
        }
        None
    }

    // --- declarations and statements ---------------------------------------

    fn declaration(&mut self) {
        if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }

        if self.panic_mode {
            self.synchronize();
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("Expect variable name.");

        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "Expect ';' after variable declaration.");

        self.define_variable(global);
    }

    /// Consumes the variable's name and, for a global, interns and
    /// constant-pools it. For a local this only declares the local (and
    /// returns an unused placeholder), since locals aren't looked up by
    /// name at runtime.
    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);

        self.declare_variable();
        if self.scope_depth > 0 {
            return 0;
        }

        let name = self.heap.copy_string(self.previous.lexeme);
        self.make_constant(Value::from(name))
    }

    fn define_variable(&mut self, global: u8) {
        if self.scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_op(OpCode::DefineGlobal);
        self.emit_byte(global);
    }

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after value.");
        self.emit_op(OpCode::Print);
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "Expect ';' after expression.");
        self.emit_op(OpCode::Pop);
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "Expect '}' after block.");
    }

    // --- expressions (Pratt parsing) ----------------------------------------

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let can_assign = precedence <= Precedence::Assignment;
        if !self.prefix_rule(self.previous.kind, can_assign) {
            self.error("Expect expression.");
            return;
        }

        while precedence <= infix_precedence(self.current.kind) {
            self.advance();
            self.infix_rule(self.previous.kind, can_assign);
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("Invalid assignment target.");
        }
    }

    /// Dispatches to the prefix parser for `kind`, if it has one. Returns
    /// `false` when `kind` can't start an expression.
    fn prefix_rule(&mut self, kind: TokenKind, can_assign: bool) -> bool {
        use TokenKind::*;
        match kind {
            LeftParen => self.grouping(),
            Minus | Bang => self.unary(),
            Number => self.number(),
            String => self.string(),
            Identifier => self.variable(can_assign),
            Nil | True | False => self.literal(),
            _ => return false,
        }
        true
    }

    fn infix_rule(&mut self, kind: TokenKind, can_assign: bool) {
        use TokenKind::*;
        match kind {
            Plus | Minus | Star | Slash | EqualEqual | BangEqual | Less | LessEqual | Greater
            | GreaterEqual => self.binary(kind),
            _ => {
                let _ = can_assign;
                unreachable!("token {kind:?} has no infix rule but was in the precedence loop")
            }
        }
    }

    fn grouping(&mut self) {
        self.expression();
        self.consume(TokenKind::RightParen, "Expect ')' after expression.");
    }

    fn unary(&mut self) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!(),
        }
    }

    fn binary(&mut self, operator: TokenKind) {
        let precedence = infix_precedence(operator);
        self.parse_precedence(precedence.next());
        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::BangEqual => self.emit_ops(OpCode::Equal, OpCode::Not),
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => self.emit_ops(OpCode::Greater, OpCode::Not),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => self.emit_ops(OpCode::Less, OpCode::Not),
            _ => unreachable!(),
        }
    }

    fn number(&mut self) {
        let value: f64 = self.previous.lexeme.parse().expect("scanner only emits valid numbers");
        self.emit_constant(Value::from(value));
    }

    fn string(&mut self) {
        let lexeme = self.previous.lexeme;
        let text = &lexeme[1..lexeme.len() - 1];
        let interned = self.heap.copy_string(text);
        self.emit_constant(Value::from(interned));
    }

    fn literal(&mut self) {
        match self.previous.kind {
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::False => self.emit_op(OpCode::False),
            _ => unreachable!(),
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        let (get_op, set_op, arg) = if let Some(slot) = self.resolve_local(name) {
            (OpCode::GetLocal, OpCode::SetLocal, slot)
        } else {
            let interned = self.heap.copy_string(name);
            let index = self.make_constant(Value::from(interned));
            (OpCode::GetGlobal, OpCode::SetGlobal, index)
        };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_op(set_op);
        } else {
            self.emit_op(get_op);
        }
        self.emit_byte(arg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_ok(source: &str) -> Chunk {
        let mut heap = Heap::new();
        Compiler::compile(source, &mut heap).expect("expected source to compile")
    }

    fn compile_err(source: &str) {
        let mut heap = Heap::new();
        assert!(Compiler::compile(source, &mut heap).is_none());
    }

    #[test]
    fn compiles_an_arithmetic_expression_statement() {
        let chunk = compile_ok("1 + 2 * 3;");
        assert!(chunk.code.contains(&(OpCode::Multiply as u8)));
        assert!(chunk.code.contains(&(OpCode::Add as u8)));
        assert_eq!(*chunk.code.last().unwrap(), OpCode::Return as u8);
    }

    #[test]
    fn global_variable_roundtrip() {
        let chunk = compile_ok("var a = 1; print a;");
        assert!(chunk.code.contains(&(OpCode::DefineGlobal as u8)));
        assert!(chunk.code.contains(&(OpCode::GetGlobal as u8)));
    }

    #[test]
    fn local_variables_use_slot_opcodes_not_globals() {
        let chunk = compile_ok("{ var a = 1; print a; }");
        assert!(!chunk.code.contains(&(OpCode::DefineGlobal as u8)));
        assert!(chunk.code.contains(&(OpCode::GetLocal as u8)));
    }

    #[test]
    fn shadowing_a_local_with_itself_is_an_error() {
        compile_err("{ var a = 1; var a = 2; }");
    }

    #[test]
    fn self_referential_initializer_is_an_error() {
        compile_err("{ var a = a; }");
    }

    #[test]
    fn redeclaring_a_global_is_allowed() {
        compile_ok("var a; var a;");
    }

    #[test]
    fn nested_blocks_pop_locals_on_the_way_out() {
        let chunk = compile_ok("{ var a = 1; { var b = 2; print b; } print a; }");
        assert_eq!(chunk.code.iter().filter(|&&b| b == OpCode::Pop as u8).count(), 2);
    }

    #[test]
    fn comparison_operators_desugar_to_their_opposite_plus_not() {
        let chunk = compile_ok("print 1 <= 2;");
        assert!(chunk.code.contains(&(OpCode::Greater as u8)));
        assert!(chunk.code.contains(&(OpCode::Not as u8)));
    }

    #[test]
    fn too_many_constants_is_reported() {
        let mut source = String::new();
        for i in 0..257 {
            source.push_str(&format!("print {i};\n"));
        }
        compile_err(&source);
    }

    #[test]
    fn too_many_locals_is_reported() {
        let mut source = String::from("{\n");
        for i in 0..257 {
            source.push_str(&format!("var v{i} = {i};\n"));
        }
        source.push_str("}\n");
        compile_err(&source);
    }

    #[test]
    fn invalid_assignment_target_is_reported() {
        compile_err("1 + 2 = 3;");
    }
}
