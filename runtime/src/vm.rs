//! Máquina virtual de pila.
//!
//! La máquina ejecuta primero el inicializador de la imagen y luego
//! la rutina de entrada. Cada invocación de rutina recibe su propio
//! marco con argumentos, locales y pila de evaluación. Los valores
//! escalares (`int`, `bool`, `char`) son palabras de 32 bits; los
//! arreglos se comparten por referencia.

use crate::image::{Code, Image, Instruction, Type};
use log::{debug, trace};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    cell::RefCell,
    fmt,
    io::{self, BufRead, Write},
    rc::Rc,
};

use thiserror::Error;
use unicase::UniCase;

/// Profundidad máxima de llamadas anidadas.
const MAX_DEPTH: usize = 1024;

/// Error de ejecución.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum VmError {
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Evaluation stack underflow in `{0}`")]
    StackUnderflow(String),

    #[error("Expected {expected} on the evaluation stack, found {found}")]
    Expected {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Division by zero")]
    DivideByZero,

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Index {index} is out of range for an array of length {length}")]
    IndexOutOfRange { index: i32, length: usize },

    #[error("Cannot parse {0:?} as `{1}`")]
    BadInput(String, Type),

    #[error("Unexpected end of input")]
    EndOfInput,

    #[error("Bad format string {0:?}")]
    BadFormat(String),

    #[error("Call depth limit exceeded")]
    StackOverflow,

    #[error("Reference to undefined {0} {1}")]
    BadReference(&'static str, u32),

    #[error("Routine `{0}` ended without returning")]
    MissingReturn(String),
}

/// Un valor en tiempo de ejecución.
#[derive(Clone, Debug)]
pub enum Value {
    Word(i32),
    Str(Rc<str>),
    Array(Rc<RefCell<Vec<i32>>>),
    Boxed(Type, i32),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Word(_) => "word",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Boxed(_, _) => "boxed value",
        }
    }

    fn word(self) -> Result<i32, VmError> {
        match self {
            Value::Word(word) => Ok(word),
            other => Err(VmError::Expected {
                expected: "word",
                found: other.kind(),
            }),
        }
    }

    fn string(self) -> Result<Rc<str>, VmError> {
        match self {
            Value::Str(string) => Ok(string),
            other => Err(VmError::Expected {
                expected: "string",
                found: other.kind(),
            }),
        }
    }

    fn array(self) -> Result<Rc<RefCell<Vec<i32>>>, VmError> {
        match self {
            Value::Array(array) => Ok(array),
            other => Err(VmError::Expected {
                expected: "array",
                found: other.kind(),
            }),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Word(0)
    }
}

/// Representación textual de una palabra según su tipo.
pub struct Rendered(pub Type, pub i32);

impl fmt::Display for Rendered {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Rendered(Type::Int, word) => write!(fmt, "{}", word),
            Rendered(Type::Bool, word) => fmt.write_str(if word != 0 { "True" } else { "False" }),
            Rendered(Type::Char, word) => {
                let c = char::from_u32(word as u32).unwrap_or(char::REPLACEMENT_CHARACTER);
                write!(fmt, "{}", c)
            }
        }
    }
}

/// Intérprete de imágenes.
pub struct Machine<'a, R, W> {
    image: &'a Image,
    fields: Vec<Value>,
    input: R,
    output: W,
    rng: StdRng,
}

/// Marco de activación de una rutina.
///
/// Las llamadas no recurren sobre la pila nativa: cada `Call` apila
/// un marco nuevo y cada `Return` lo desapila.
struct Frame<'a> {
    name: &'a str,
    code: &'a Code,
    pc: usize,
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
}

impl<'a> Frame<'a> {
    fn new(name: &'a str, code: &'a Code, args: Vec<Value>, locals: u32) -> Self {
        Frame {
            name,
            code,
            pc: 0,
            args,
            locals: vec![Value::default(); locals as usize],
            stack: Vec::new(),
        }
    }
}

/// Transferencia de control fuera del marco actual.
enum Transfer<'a> {
    Call(Frame<'a>),
    Return(Option<Value>),
}

impl<'a, R: BufRead, W: Write> Machine<'a, R, W> {
    /// Prepara una ejecución con semilla aleatoria de entropía del sistema.
    pub fn new(image: &'a Image, input: R, output: W) -> Self {
        Machine {
            image,
            fields: vec![Value::default(); image.fields.len()],
            input,
            output,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fija la semilla del operador `?`, para ejecuciones reproducibles.
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Ejecuta el inicializador y luego la rutina de entrada.
    ///
    /// Retorna el valor de retorno de la entrada, si lo hay.
    pub fn run(&mut self) -> Result<Option<i32>, VmError> {
        let image = self.image;
        let entry = image
            .entry()
            .ok_or(VmError::BadReference("routine", image.entry))?;

        debug!("Running initializer ({} instructions)", image.initializer.instructions.len());
        self.execute(Frame::new("<initializer>", &image.initializer, Vec::new(), 0))?;

        // Una entrada con parámetros recibe valores nulos
        let args = entry
            .params
            .iter()
            .map(|param| match param.array {
                true => Value::Array(Default::default()),
                false => Value::default(),
            })
            .collect();

        debug!("Entering `{}`", entry.name);
        let result = self.execute(Frame::new(&entry.name, &entry.code, args, entry.locals))?;
        self.output.flush()?;

        result.map(Value::word).transpose()
    }

    /// Devuelve los flujos de E/S.
    pub fn into_io(self) -> (R, W) {
        (self.input, self.output)
    }

    /// Ejecuta desde `base` hasta que este marco retorne.
    fn execute(&mut self, base: Frame<'a>) -> Result<Option<Value>, VmError> {
        let mut frames = vec![base];

        while let Some(frame) = frames.last_mut() {
            match self.step(frame)? {
                None => (),

                Some(Transfer::Call(callee)) => {
                    if frames.len() == MAX_DEPTH {
                        return Err(VmError::StackOverflow);
                    }

                    trace!("call `{}` with {} arguments", callee.name, callee.args.len());
                    frames.push(callee);
                }

                Some(Transfer::Return(value)) => {
                    frames.pop();
                    match (frames.last_mut(), value) {
                        (None, value) => return Ok(value),
                        (Some(caller), Some(value)) => caller.stack.push(value),
                        (Some(_), None) => (),
                    }
                }
            }
        }

        Ok(None)
    }

    /// Ejecuta una instrucción del marco actual.
    fn step(&mut self, frame: &mut Frame<'a>) -> Result<Option<Transfer<'a>>, VmError> {
        use Instruction::*;

        let image = self.image;
        let (name, code) = (frame.name, frame.code);
        let underflow = || VmError::StackUnderflow(name.to_owned());

        let instruction = code
            .instructions
            .get(frame.pc)
            .ok_or_else(|| VmError::MissingReturn(name.to_owned()))?;

        trace!("{}:{:04} {:?}", name, frame.pc, instruction);
        frame.pc += 1;

        macro_rules! pop {
            () => {
                frame.stack.pop().ok_or_else(underflow)?
            };
        }

        match instruction {
            PushInt(value) => frame.stack.push(Value::Word(*value)),
            PushStr(string) => frame.stack.push(Value::Str(Rc::clone(string))),

            Pop => {
                pop!();
            }

            Dup => {
                let value = frame.stack.last().cloned().ok_or_else(underflow)?;
                frame.stack.push(value);
            }

            Swap => {
                let (b, a) = (pop!(), pop!());
                frame.stack.push(b);
                frame.stack.push(a);
            }

            LoadLocal(index) => {
                let value = slot(&frame.locals, *index, "local")?.clone();
                frame.stack.push(value);
            }

            StoreLocal(index) => {
                let value = pop!();
                *slot_mut(&mut frame.locals, *index, "local")? = value;
            }

            LoadArg(index) => {
                let value = slot(&frame.args, *index, "argument")?.clone();
                frame.stack.push(value);
            }

            StoreArg(index) => {
                let value = pop!();
                *slot_mut(&mut frame.args, *index, "argument")? = value;
            }

            LoadField(index) => {
                let value = slot(&self.fields, *index, "field")?.clone();
                frame.stack.push(value);
            }

            StoreField(index) => {
                let value = pop!();
                *slot_mut(&mut self.fields, *index, "field")? = value;
            }

            NewArray(length) => {
                let array = vec![0; *length as usize];
                frame.stack.push(Value::Array(Rc::new(RefCell::new(array))));
            }

            LoadElem => {
                let index = pop!().word()?;
                let array = pop!().array()?;

                let value = element(&array.borrow(), index)?;
                frame.stack.push(Value::Word(value));
            }

            StoreElem => {
                let value = pop!().word()?;
                let index = pop!().word()?;
                let array = pop!().array()?;

                let mut array = array.borrow_mut();
                let length = array.len();
                match usize::try_from(index).ok().and_then(|i| array.get_mut(i)) {
                    Some(target) => *target = value,
                    None => return Err(VmError::IndexOutOfRange { index, length }),
                }
            }

            ArrayLen => {
                let array = pop!().array()?;
                let length = array.borrow().len() as i32;
                frame.stack.push(Value::Word(length));
            }

            Neg => {
                let value = pop!().word()?;
                frame.stack.push(Value::Word(value.wrapping_neg()));
            }

            Add | Sub | Mul | Div | Rem | Min | Max | And | Or | Eq | Lt | Gt => {
                let b = pop!().word()?;
                let a = pop!().word()?;

                let result = binary(instruction, a, b)?;
                frame.stack.push(Value::Word(result));
            }

            Jump(label) => frame.pc = jump(code, *label)?,

            JumpIfFalse(label) => {
                if pop!().word()? == 0 {
                    frame.pc = jump(code, *label)?;
                }
            }

            JumpIfTrue(label) => {
                if pop!().word()? != 0 {
                    frame.pc = jump(code, *label)?;
                }
            }

            Call(index) => {
                let callee = image
                    .routines
                    .get(*index as usize)
                    .ok_or(VmError::BadReference("routine", *index))?;

                let argc = callee.params.len();
                if frame.stack.len() < argc {
                    return Err(underflow());
                }

                let args = frame.stack.split_off(frame.stack.len() - argc);
                let callee = Frame::new(&callee.name, &callee.code, args, callee.locals);

                return Ok(Some(Transfer::Call(callee)));
            }

            Return => return Ok(Some(Transfer::Return(frame.stack.pop()))),

            Random => {
                let bound = pop!().word()?;
                let value = if bound > 0 { self.rng.gen_range(0..bound) } else { 0 };
                frame.stack.push(Value::Word(value));
            }

            Box(ty) => {
                let word = pop!().word()?;
                frame.stack.push(Value::Boxed(*ty, word));
            }

            Print(ty) => {
                let word = pop!().word()?;
                write!(self.output, "{}", Rendered(*ty, word))?;
            }

            PrintStr => {
                let string = pop!().string()?;
                self.output.write_all(string.as_bytes())?;
            }

            PrintFormat(argc) => {
                let argc = *argc as usize;
                if frame.stack.len() < argc + 1 {
                    return Err(underflow());
                }

                let args = frame.stack.split_off(frame.stack.len() - argc);
                let format = pop!().string()?;

                let text = compose(&format, &args)?;
                self.output.write_all(text.as_bytes())?;
            }

            ReadLine => {
                self.output.flush()?;

                let mut line = String::new();
                if self.input.read_line(&mut line)? == 0 {
                    return Err(VmError::EndOfInput);
                }

                let trimmed = line.trim_end_matches(&['\r', '\n'][..]);
                frame.stack.push(Value::Str(trimmed.into()));
            }

            Parse(ty) => {
                let text = pop!().string()?;
                let word = parse(&text, *ty)?;
                frame.stack.push(Value::Word(word));
            }
        }

        Ok(None)
    }
}

fn slot<'v>(slots: &'v [Value], index: u32, what: &'static str) -> Result<&'v Value, VmError> {
    slots.get(index as usize).ok_or(VmError::BadReference(what, index))
}

fn slot_mut<'v>(
    slots: &'v mut [Value],
    index: u32,
    what: &'static str,
) -> Result<&'v mut Value, VmError> {
    slots.get_mut(index as usize).ok_or(VmError::BadReference(what, index))
}

fn element(array: &[i32], index: i32) -> Result<i32, VmError> {
    usize::try_from(index)
        .ok()
        .and_then(|i| array.get(i).copied())
        .ok_or(VmError::IndexOutOfRange {
            index,
            length: array.len(),
        })
}

fn jump(code: &Code, label: crate::image::Label) -> Result<usize, VmError> {
    code.target(label).ok_or(VmError::BadReference("label", label.0))
}

fn binary(instruction: &Instruction, a: i32, b: i32) -> Result<i32, VmError> {
    use Instruction::*;

    let result = match instruction {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        Div | Rem if b == 0 => return Err(VmError::DivideByZero),
        Div => a.checked_div(b).ok_or(VmError::Overflow)?,
        Rem => a.checked_rem(b).ok_or(VmError::Overflow)?,
        Min => a.min(b),
        Max => a.max(b),
        And => a & b,
        Or => a | b,
        Eq => (a == b) as i32,
        Lt => (a < b) as i32,
        Gt => (a > b) as i32,
        _ => unreachable!("not a binary operation: {:?}", instruction),
    };

    Ok(result)
}

/// Convierte una línea de entrada a una palabra del tipo dado.
fn parse(text: &str, ty: Type) -> Result<i32, VmError> {
    let trimmed = text.trim();
    let bad_input = || VmError::BadInput(text.to_owned(), ty);

    match ty {
        Type::Int => trimmed.parse().map_err(|_| bad_input()),

        Type::Bool => {
            let text = UniCase::new(trimmed);
            if text == UniCase::new("true") {
                Ok(1)
            } else if text == UniCase::new("false") {
                Ok(0)
            } else {
                Err(bad_input())
            }
        }

        // Exactamente un carácter, sin recortar espacios
        Type::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c as i32),
                _ => Err(bad_input()),
            }
        }
    }
}

/// Formato compuesto: `{n}` se sustituye por el argumento `n`,
/// `{{` y `}}` escapan llaves literales.
fn compose(format: &str, args: &[Value]) -> Result<String, VmError> {
    let bad_format = || VmError::BadFormat(format.to_owned());

    let mut text = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }

            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }

            '{' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(digit) if digit.is_ascii_digit() => index.push(digit),
                        _ => return Err(bad_format()),
                    }
                }

                let arg = index
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| args.get(index))
                    .ok_or_else(bad_format)?;

                match arg {
                    Value::Boxed(ty, word) => text.push_str(&Rendered(*ty, *word).to_string()),
                    Value::Word(word) => text.push_str(&word.to_string()),
                    Value::Str(string) => text.push_str(string),
                    Value::Array(_) => return Err(bad_format()),
                }
            }

            '}' => return Err(bad_format()),
            c => text.push(c),
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Code, Field, ImageFlags, Label, Routine, Slot};

    fn program(main: Vec<Instruction>, labels: Vec<u32>) -> Image {
        Image {
            flags: ImageFlags::USER_ENTRY,
            fields: Vec::new(),
            initializer: Code {
                instructions: vec![Instruction::Return],
                labels: Vec::new(),
            },
            routines: vec![Routine {
                name: "main".into(),
                params: Vec::new(),
                returns: Some(Type::Int),
                locals: 1,
                code: Code {
                    instructions: main,
                    labels,
                },
            }],
            entry: 0,
        }
    }

    fn run(image: &Image, input: &str) -> (Result<Option<i32>, VmError>, String) {
        let mut output = Vec::new();
        let mut machine = Machine::new(image, input.as_bytes(), &mut output).seed(7);
        let result = machine.run();
        drop(machine);

        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn arithmetic_and_return() {
        use Instruction::*;

        let image = program(
            vec![PushInt(7), PushInt(3), Sub, PushInt(5), Mul, PushInt(2), Swap, Rem, Return],
            Vec::new(),
        );

        // 2 % 20
        assert_eq!(run(&image, "").0.unwrap(), Some(2));
    }

    #[test]
    fn division_by_zero_is_reported() {
        use Instruction::*;

        let image = program(vec![PushInt(1), PushInt(0), Div, Return], Vec::new());
        assert!(matches!(run(&image, "").0, Err(VmError::DivideByZero)));
    }

    #[test]
    fn loops_through_labels() {
        use Instruction::*;

        // x = 0; while (x < 5) x = x + 1; return x;
        let image = program(
            vec![
                PushInt(0),
                StoreLocal(0),
                Jump(Label(1)),
                LoadLocal(0),
                PushInt(1),
                Add,
                StoreLocal(0),
                LoadLocal(0),
                PushInt(5),
                Lt,
                JumpIfTrue(Label(0)),
                LoadLocal(0),
                Return,
            ],
            vec![3, 7],
        );

        assert_eq!(run(&image, "").0.unwrap(), Some(5));
    }

    #[test]
    fn initializer_runs_before_entry() {
        use Instruction::*;

        let mut image = program(vec![LoadField(0), Return], Vec::new());
        image.fields.push(Field {
            name: "g".into(),
            slot: Slot::scalar(Type::Int),
        });
        image.initializer.instructions = vec![PushInt(42), StoreField(0), Return];

        assert_eq!(run(&image, "").0.unwrap(), Some(42));
    }

    #[test]
    fn array_bounds_are_checked() {
        use Instruction::*;

        let image = program(vec![NewArray(3), PushInt(3), LoadElem, Return], Vec::new());
        assert!(matches!(
            run(&image, "").0,
            Err(VmError::IndexOutOfRange { index: 3, length: 3 })
        ));
    }

    #[test]
    fn composite_formatting() {
        use Instruction::*;

        let image = program(
            vec![
                PushStr("{{{0}}} {1}{2}\n".into()),
                PushInt(1),
                Box(Type::Bool),
                PushInt('z' as i32),
                Box(Type::Char),
                PushInt(-3),
                Box(Type::Int),
                PrintFormat(3),
                PushInt(0),
                Return,
            ],
            Vec::new(),
        );

        let (result, output) = run(&image, "");
        assert_eq!(result.unwrap(), Some(0));
        assert_eq!(output, "{True} z-3\n");
    }

    #[test]
    fn format_index_out_of_range() {
        assert!(matches!(compose("{1}", &[Value::Boxed(Type::Int, 0)]), Err(VmError::BadFormat(_))));
        assert!(matches!(compose("{", &[]), Err(VmError::BadFormat(_))));
    }

    #[test]
    fn parses_input_lines() {
        use Instruction::*;

        let image = program(
            vec![
                ReadLine,
                Parse(Type::Int),
                ReadLine,
                Parse(Type::Bool),
                Add,
                ReadLine,
                Parse(Type::Char),
                Add,
                Return,
            ],
            Vec::new(),
        );

        let (result, _) = run(&image, "40\r\nTRUE\nA\n");
        assert_eq!(result.unwrap(), Some(40 + 1 + 'A' as i32));

        assert!(matches!(run(&image, "4o\n").0, Err(VmError::BadInput(_, Type::Int))));
        assert!(matches!(run(&image, "1\n").0, Err(VmError::EndOfInput)));
    }

    #[test]
    fn random_stays_in_range() {
        use Instruction::*;

        let image = program(vec![PushInt(10), Random, Return], Vec::new());
        for _ in 0..32 {
            let value = run(&image, "").0.unwrap().unwrap();
            assert!((0..10).contains(&value));
        }

        let image = program(vec![PushInt(0), Random, Return], Vec::new());
        assert_eq!(run(&image, "").0.unwrap(), Some(0));
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        use Instruction::*;

        let image = program(vec![Call(0), Return], Vec::new());
        assert!(matches!(run(&image, "").0, Err(VmError::StackOverflow)));
    }
}
