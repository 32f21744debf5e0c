use ember_core::{Chunk, Heap, OpCode, Table, Value};

const STACK_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

/// Pops two numeric operands and pushes `a <op> b`, bailing out with a
/// runtime error if either isn't a number. `Value::from` picks `Number` or
/// `Bool` to wrap the result based on what `$op` produces.
macro_rules! binary_op {
    ($self:ident, $op:tt) => {{
        if !$self.peek(0).is_number() || !$self.peek(1).is_number() {
            return $self.runtime_error("Operands must be numbers.");
        }
        let b = $self.pop().as_number().unwrap();
        let a = $self.pop().as_number().unwrap();
        $self.push(Value::from(a $op b));
    }};
}

/// Owns every piece of runtime state: the operand stack, the heap (and its
/// string interner), and the globals table. A single `Vm` can drive several
/// `interpret` calls in a row, sharing globals and interned strings across
/// them, the way a REPL would.
pub struct Vm {
    chunk: Chunk,
    ip: usize,
    stack: Vec<Value>,
    heap: Heap,
    globals: Table,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Vm {
            chunk: Chunk::new(),
            ip: 0,
            stack: Vec::with_capacity(STACK_MAX),
            heap: Heap::new(),
            globals: Table::new(),
        }
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let chunk = match ember_compiler::compile(source, &mut self.heap) {
            Some(chunk) => chunk,
            None => return InterpretResult::CompileError,
        };

        self.chunk = chunk;
        self.ip = 0;
        self.stack.clear();
        self.run()
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("bytecode popped an empty stack")
    }

    fn peek(&self, distance: usize) -> &Value {
        let index = self.stack.len() - 1 - distance;
        &self.stack[index]
    }

    fn read_byte(&mut self) -> u8 {
        let byte = self.chunk.code[self.ip];
        self.ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        u16::from_be_bytes([hi, lo])
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte() as usize;
        self.chunk.constants[index].clone()
    }

    fn read_string(&mut self) -> std::rc::Rc<ember_core::StringObj> {
        self.read_constant().as_string().expect("operand constant was not a string").clone()
    }

    fn run(&mut self) -> InterpretResult {
        loop {
            #[cfg(feature = "trace_execution")]
            {
                print!("          ");
                for value in &self.stack {
                    print!("[ {value} ]");
                }
                println!();
                ember_core::disassemble::disassemble_instruction(&self.chunk, self.ip);
            }

            let byte = self.read_byte();
            let Ok(op) = OpCode::try_from(byte) else {
                return self.runtime_error(&format!("Unknown opcode {byte}."));
            };

            match op {
                OpCode::Constant => {
                    let constant = self.read_constant();
                    self.push(constant);
                }
                OpCode::Nil => self.push(Value::Nil),
                OpCode::True => self.push(Value::Bool(true)),
                OpCode::False => self.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    self.push(self.stack[slot].clone());
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    self.stack[slot] = self.peek(0).clone();
                }
                OpCode::GetGlobal => {
                    let name = self.read_string();
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value);
                        }
                        None => {
                            return self
                                .runtime_error(&format!("Undefined variable '{}'.", name.as_str()));
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0).clone();
                    self.globals.set(name, value);
                    self.pop();
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0).clone();
                    // `set` reports whether it created a new key; for an
                    // assignment that must already exist, a new key means
                    // the global was never defined. Undo the insert and
                    // report the error instead of silently creating it.
                    if self.globals.set(std::rc::Rc::clone(&name), value) {
                        self.globals.delete(&name);
                        return self
                            .runtime_error(&format!("Undefined variable '{}'.", name.as_str()));
                    }
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                OpCode::Greater => binary_op!(self, >),
                OpCode::Less => binary_op!(self, <),
                OpCode::Add => {
                    let numbers_ok = self.peek(0).is_number() && self.peek(1).is_number();
                    let strings_ok = self.peek(0).as_string().is_some() && self.peek(1).as_string().is_some();
                    if numbers_ok {
                        let b = self.pop().as_number().unwrap();
                        let a = self.pop().as_number().unwrap();
                        self.push(Value::from(a + b));
                    } else if strings_ok {
                        let b = self.pop().as_string().unwrap().clone();
                        let a = self.pop().as_string().unwrap().clone();
                        let mut concatenated = String::with_capacity(a.len() + b.len());
                        concatenated.push_str(a.as_str());
                        concatenated.push_str(b.as_str());
                        let interned = self.heap.take_string(concatenated);
                        self.push(Value::from(interned));
                    } else {
                        return self.runtime_error("Operands must be two numbers or two strings.");
                    }
                }
                OpCode::Subtract => binary_op!(self, -),
                OpCode::Multiply => binary_op!(self, *),
                OpCode::Divide => binary_op!(self, /),
                OpCode::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    if !self.peek(0).is_number() {
                        return self.runtime_error("Operand must be a number.");
                    }
                    let value = self.pop().as_number().unwrap();
                    self.push(Value::from(-value));
                }
                OpCode::Print => {
                    let value = self.pop();
                    println!("{value}");
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    self.ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if self.peek(0).is_falsey() {
                        self.ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    self.ip -= offset as usize;
                }
                OpCode::Return => return InterpretResult::Ok,
            }
        }
    }

    fn runtime_error(&mut self, message: &str) -> InterpretResult {
        let line = self.chunk.lines[self.ip - 1];
        eprintln!("{message}");
        eprintln!("[line {line}] in script");
        self.stack.clear();
        InterpretResult::RuntimeError
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> InterpretResult {
        Vm::new().interpret(source)
    }

    #[test]
    fn arithmetic_and_print_run_to_completion() {
        assert_eq!(run("print 1 + 2 * 3;"), InterpretResult::Ok);
    }

    #[test]
    fn string_concatenation_is_interned() {
        assert_eq!(run("print \"foo\" + \"bar\";"), InterpretResult::Ok);
    }

    #[test]
    fn global_variables_roundtrip() {
        assert_eq!(run("var a = 1; a = a + 1; print a;"), InterpretResult::Ok);
    }

    #[test]
    fn local_variables_roundtrip() {
        assert_eq!(run("{ var a = 1; a = a + 1; print a; }"), InterpretResult::Ok);
    }

    #[test]
    fn reading_an_undefined_global_is_a_runtime_error() {
        assert_eq!(run("print nope;"), InterpretResult::RuntimeError);
    }

    #[test]
    fn assigning_an_undefined_global_is_a_runtime_error_and_does_not_define_it() {
        let mut vm = Vm::new();
        assert_eq!(vm.interpret("x = 1;"), InterpretResult::RuntimeError);
        assert_eq!(vm.interpret("print x;"), InterpretResult::RuntimeError);
    }

    #[test]
    fn adding_a_number_and_a_string_is_a_runtime_error() {
        assert_eq!(run("print 1 + \"a\";"), InterpretResult::RuntimeError);
    }

    #[test]
    fn negating_a_string_is_a_runtime_error() {
        assert_eq!(run("print -\"a\";"), InterpretResult::RuntimeError);
    }

    #[test]
    fn a_syntax_error_is_reported_as_a_compile_error() {
        assert_eq!(run("var;"), InterpretResult::CompileError);
    }

    #[test]
    fn nan_is_never_equal_to_itself_at_runtime() {
        assert_eq!(run("print (0.0 / 0.0) == (0.0 / 0.0);"), InterpretResult::Ok);
    }

    #[test]
    fn globals_persist_across_interpret_calls_on_the_same_vm() {
        let mut vm = Vm::new();
        assert_eq!(vm.interpret("var a = 1;"), InterpretResult::Ok);
        assert_eq!(vm.interpret("print a;"), InterpretResult::Ok);
    }
}
