//! Imagen ejecutable.
//!
//! Una imagen es el artefacto que el compilador persiste y que la
//! máquina virtual carga. Contiene la tabla de campos globales, el
//! flujo inicializador (que se ejecuta exactamente una vez antes del
//! punto de entrada) y una rutina por cada función definida por el
//! usuario.
//!
//! # Formato binario
//! Todos los enteros se escriben en little-endian. El archivo inicia
//! con [`MAGIC`] y un número de versión, seguido de las banderas de
//! encabezado, el índice de la rutina de entrada, los campos, el
//! inicializador y finalmente las rutinas. Las cadenas se codifican
//! como una longitud `u32` seguida de bytes UTF-8.

use bitflags::bitflags;
use std::{
    fmt::{self, Display},
    io::{self, Read, Write},
    rc::Rc,
};

use thiserror::Error;

/// Identificador de formato al inicio de cada imagen.
pub const MAGIC: [u8; 4] = *b"CMIX";

/// Versión actual del formato binario.
pub const VERSION: u32 = 1;

bitflags! {
    /// Banderas de encabezado de una imagen.
    pub struct ImageFlags: u32 {
        /// El punto de entrada es una función `main` del usuario.
        ///
        /// En su ausencia, la rutina de entrada es un marcador vacío
        /// sintetizado por el compilador.
        const USER_ENTRY = 0x01;
    }
}

/// Error de lectura de una imagen.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ImageError {
    /// Error de E/S, incluyendo fin abrupto del archivo.
    #[error("I/O error")]
    Io(#[from] io::Error),

    #[error("Not an image file (bad magic number)")]
    BadMagic,

    #[error("Unsupported image version {0}, expected 1")]
    Version(u32),

    #[error("Unknown header flags 0x{0:x}")]
    BadFlags(u32),

    #[error("Unknown opcode 0x{0:02x}")]
    BadOpcode(u8),

    #[error("Unknown type tag {0}")]
    BadType(u8),

    #[error("Malformed UTF-8 string")]
    BadString,

    #[error("String of {0} bytes runs past the end of the image")]
    ShortString(u32),

    #[error("Entry routine {0} does not exist")]
    BadEntry(u32),
}

/// Tipo primitivo de un valor de palabra.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Bool,
    Char,
}

impl Type {
    fn tag(self) -> u8 {
        match self {
            Type::Int => 0,
            Type::Bool => 1,
            Type::Char => 2,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, ImageError> {
        match tag {
            0 => Ok(Type::Int),
            1 => Ok(Type::Bool),
            2 => Ok(Type::Char),
            _ => Err(ImageError::BadType(tag)),
        }
    }
}

impl Display for Type {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Int => "int",
            Type::Bool => "bool",
            Type::Char => "char",
        };

        fmt.write_str(name)
    }
}

/// Forma de una ranura de almacenamiento: un escalar o un arreglo.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    pub ty: Type,
    pub array: bool,
}

impl Slot {
    pub fn scalar(ty: Type) -> Self {
        Slot { ty, array: false }
    }

    pub fn array(ty: Type) -> Self {
        Slot { ty, array: true }
    }
}

impl Display for Slot {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.array {
            write!(fmt, "{}[]", self.ty)
        } else {
            write!(fmt, "{}", self.ty)
        }
    }
}

/// Un campo global. Los `static` locales también se almacenan aquí.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub slot: Slot,
}

/// Etiqueta de salto, relativa a un único flujo de instrucciones.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// Instrucción de la máquina de pila.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    PushInt(i32),
    PushStr(Rc<str>),
    Pop,
    Dup,
    Swap,
    LoadLocal(u32),
    StoreLocal(u32),
    LoadArg(u32),
    StoreArg(u32),
    LoadField(u32),
    StoreField(u32),
    /// Crea un arreglo de enteros inicializados en cero.
    NewArray(u32),
    /// `arreglo, índice -> valor`
    LoadElem,
    /// `arreglo, índice, valor ->`
    StoreElem,
    ArrayLen,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Min,
    Max,
    And,
    Or,
    Eq,
    Lt,
    Gt,
    Jump(Label),
    JumpIfFalse(Label),
    JumpIfTrue(Label),
    Call(u32),
    Return,
    /// `n -> r`, con `r` uniforme en `[0, n)`.
    Random,
    Box(Type),
    Print(Type),
    PrintStr,
    /// Formato compuesto seguido de N argumentos empacados.
    PrintFormat(u32),
    ReadLine,
    Parse(Type),
}

/// Código de un flujo de instrucciones.
///
/// `labels[i]` es el índice de instrucción en que se marcó la
/// etiqueta `Label(i)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Code {
    pub instructions: Vec<Instruction>,
    pub labels: Vec<u32>,
}

impl Code {
    /// Resuelve una etiqueta a un índice de instrucción.
    pub fn target(&self, Label(label): Label) -> Option<usize> {
        self.labels.get(label as usize).map(|&target| target as usize)
    }
}

/// Una función compilada.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Routine {
    pub name: String,
    pub params: Vec<Slot>,
    pub returns: Option<Type>,
    pub locals: u32,
    pub code: Code,
}

/// Programa completo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub flags: ImageFlags,
    pub fields: Vec<Field>,
    pub initializer: Code,
    pub routines: Vec<Routine>,
    pub entry: u32,
}

impl Image {
    /// Obtiene la rutina de entrada.
    pub fn entry(&self) -> Option<&Routine> {
        self.routines.get(self.entry as usize)
    }

    /// Serializa la imagen.
    pub fn write_to<W: Write>(&self, output: &mut W) -> io::Result<()> {
        output.write_all(&MAGIC)?;
        wr_u32(output, VERSION)?;
        wr_u32(output, self.flags.bits())?;
        wr_u32(output, self.entry)?;

        wr_u32(output, self.fields.len() as u32)?;
        for field in &self.fields {
            wr_str(output, &field.name)?;
            wr_slot(output, field.slot)?;
        }

        write_code(output, &self.initializer)?;

        wr_u32(output, self.routines.len() as u32)?;
        for routine in &self.routines {
            wr_str(output, &routine.name)?;

            wr_u32(output, routine.params.len() as u32)?;
            for &param in &routine.params {
                wr_slot(output, param)?;
            }

            match routine.returns {
                None => output.write_all(&[0xff])?,
                Some(ty) => output.write_all(&[ty.tag()])?,
            }

            wr_u32(output, routine.locals)?;
            write_code(output, &routine.code)?;
        }

        Ok(())
    }

    /// Deserializa una imagen.
    pub fn read_from<R: Read>(input: &mut R) -> Result<Self, ImageError> {
        let mut magic = [0; 4];
        input.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(ImageError::BadMagic);
        }

        match rd_u32(input)? {
            VERSION => (),
            version => return Err(ImageError::Version(version)),
        }

        let flags = rd_u32(input)?;
        let flags = ImageFlags::from_bits(flags).ok_or(ImageError::BadFlags(flags))?;
        let entry = rd_u32(input)?;

        let field_count = rd_u32(input)?;
        let mut fields = Vec::new();
        for _ in 0..field_count {
            let name = rd_str(input)?;
            let slot = rd_slot(input)?;
            fields.push(Field { name, slot });
        }

        let initializer = read_code(input)?;

        let routine_count = rd_u32(input)?;
        let mut routines = Vec::new();
        for _ in 0..routine_count {
            let name = rd_str(input)?;

            let param_count = rd_u32(input)?;
            let mut params = Vec::new();
            for _ in 0..param_count {
                params.push(rd_slot(input)?);
            }

            let returns = match rd_u8(input)? {
                0xff => None,
                tag => Some(Type::from_tag(tag)?),
            };

            let locals = rd_u32(input)?;
            let code = read_code(input)?;

            routines.push(Routine {
                name,
                params,
                returns,
                locals,
                code,
            });
        }

        if entry as usize >= routines.len() {
            return Err(ImageError::BadEntry(entry));
        }

        Ok(Image {
            flags,
            fields,
            initializer,
            routines,
            entry,
        })
    }
}

mod opcode {
    pub const PUSH_INT: u8 = 0x01;
    pub const PUSH_STR: u8 = 0x02;
    pub const POP: u8 = 0x03;
    pub const DUP: u8 = 0x04;
    pub const SWAP: u8 = 0x05;
    pub const LOAD_LOCAL: u8 = 0x10;
    pub const STORE_LOCAL: u8 = 0x11;
    pub const LOAD_ARG: u8 = 0x12;
    pub const STORE_ARG: u8 = 0x13;
    pub const LOAD_FIELD: u8 = 0x14;
    pub const STORE_FIELD: u8 = 0x15;
    pub const NEW_ARRAY: u8 = 0x20;
    pub const LOAD_ELEM: u8 = 0x21;
    pub const STORE_ELEM: u8 = 0x22;
    pub const ARRAY_LEN: u8 = 0x23;
    pub const ADD: u8 = 0x30;
    pub const SUB: u8 = 0x31;
    pub const MUL: u8 = 0x32;
    pub const DIV: u8 = 0x33;
    pub const REM: u8 = 0x34;
    pub const NEG: u8 = 0x35;
    pub const MIN: u8 = 0x36;
    pub const MAX: u8 = 0x37;
    pub const AND: u8 = 0x38;
    pub const OR: u8 = 0x39;
    pub const EQ: u8 = 0x3a;
    pub const LT: u8 = 0x3b;
    pub const GT: u8 = 0x3c;
    pub const JUMP: u8 = 0x40;
    pub const JUMP_IF_FALSE: u8 = 0x41;
    pub const JUMP_IF_TRUE: u8 = 0x42;
    pub const CALL: u8 = 0x43;
    pub const RETURN: u8 = 0x44;
    pub const RANDOM: u8 = 0x50;
    pub const BOX: u8 = 0x51;
    pub const PRINT: u8 = 0x52;
    pub const PRINT_STR: u8 = 0x53;
    pub const PRINT_FORMAT: u8 = 0x54;
    pub const READ_LINE: u8 = 0x55;
    pub const PARSE: u8 = 0x56;
}

fn write_code<W: Write>(output: &mut W, code: &Code) -> io::Result<()> {
    use {opcode::*, Instruction::*};

    wr_u32(output, code.instructions.len() as u32)?;
    for instruction in &code.instructions {
        match instruction {
            PushInt(value) => {
                output.write_all(&[PUSH_INT])?;
                output.write_all(&value.to_le_bytes())?;
            }

            PushStr(string) => {
                output.write_all(&[PUSH_STR])?;
                wr_str(output, string)?;
            }

            Pop => output.write_all(&[POP])?,
            Dup => output.write_all(&[DUP])?,
            Swap => output.write_all(&[SWAP])?,
            LoadLocal(index) => wr_op_u32(output, LOAD_LOCAL, *index)?,
            StoreLocal(index) => wr_op_u32(output, STORE_LOCAL, *index)?,
            LoadArg(index) => wr_op_u32(output, LOAD_ARG, *index)?,
            StoreArg(index) => wr_op_u32(output, STORE_ARG, *index)?,
            LoadField(index) => wr_op_u32(output, LOAD_FIELD, *index)?,
            StoreField(index) => wr_op_u32(output, STORE_FIELD, *index)?,
            NewArray(length) => wr_op_u32(output, NEW_ARRAY, *length)?,
            LoadElem => output.write_all(&[LOAD_ELEM])?,
            StoreElem => output.write_all(&[STORE_ELEM])?,
            ArrayLen => output.write_all(&[ARRAY_LEN])?,
            Add => output.write_all(&[ADD])?,
            Sub => output.write_all(&[SUB])?,
            Mul => output.write_all(&[MUL])?,
            Div => output.write_all(&[DIV])?,
            Rem => output.write_all(&[REM])?,
            Neg => output.write_all(&[NEG])?,
            Min => output.write_all(&[MIN])?,
            Max => output.write_all(&[MAX])?,
            And => output.write_all(&[AND])?,
            Or => output.write_all(&[OR])?,
            Eq => output.write_all(&[EQ])?,
            Lt => output.write_all(&[LT])?,
            Gt => output.write_all(&[GT])?,
            Jump(Label(label)) => wr_op_u32(output, JUMP, *label)?,
            JumpIfFalse(Label(label)) => wr_op_u32(output, JUMP_IF_FALSE, *label)?,
            JumpIfTrue(Label(label)) => wr_op_u32(output, JUMP_IF_TRUE, *label)?,
            Call(routine) => wr_op_u32(output, CALL, *routine)?,
            Return => output.write_all(&[RETURN])?,
            Random => output.write_all(&[RANDOM])?,
            Box(ty) => output.write_all(&[BOX, ty.tag()])?,
            Print(ty) => output.write_all(&[PRINT, ty.tag()])?,
            PrintStr => output.write_all(&[PRINT_STR])?,
            PrintFormat(argc) => wr_op_u32(output, PRINT_FORMAT, *argc)?,
            ReadLine => output.write_all(&[READ_LINE])?,
            Parse(ty) => output.write_all(&[PARSE, ty.tag()])?,
        }
    }

    wr_u32(output, code.labels.len() as u32)?;
    for &target in &code.labels {
        wr_u32(output, target)?;
    }

    Ok(())
}

fn read_code<R: Read>(input: &mut R) -> Result<Code, ImageError> {
    use {opcode::*, Instruction::*};

    let count = rd_u32(input)?;
    let mut instructions = Vec::new();

    for _ in 0..count {
        let instruction = match rd_u8(input)? {
            PUSH_INT => PushInt(rd_u32(input)? as i32),
            PUSH_STR => PushStr(rd_str(input)?.into()),
            POP => Pop,
            DUP => Dup,
            SWAP => Swap,
            LOAD_LOCAL => LoadLocal(rd_u32(input)?),
            STORE_LOCAL => StoreLocal(rd_u32(input)?),
            LOAD_ARG => LoadArg(rd_u32(input)?),
            STORE_ARG => StoreArg(rd_u32(input)?),
            LOAD_FIELD => LoadField(rd_u32(input)?),
            STORE_FIELD => StoreField(rd_u32(input)?),
            NEW_ARRAY => NewArray(rd_u32(input)?),
            LOAD_ELEM => LoadElem,
            STORE_ELEM => StoreElem,
            ARRAY_LEN => ArrayLen,
            ADD => Add,
            SUB => Sub,
            MUL => Mul,
            DIV => Div,
            REM => Rem,
            NEG => Neg,
            MIN => Min,
            MAX => Max,
            AND => And,
            OR => Or,
            EQ => Eq,
            LT => Lt,
            GT => Gt,
            JUMP => Jump(Label(rd_u32(input)?)),
            JUMP_IF_FALSE => JumpIfFalse(Label(rd_u32(input)?)),
            JUMP_IF_TRUE => JumpIfTrue(Label(rd_u32(input)?)),
            CALL => Call(rd_u32(input)?),
            RETURN => Return,
            RANDOM => Random,
            BOX => Box(Type::from_tag(rd_u8(input)?)?),
            PRINT => Print(Type::from_tag(rd_u8(input)?)?),
            PRINT_STR => PrintStr,
            PRINT_FORMAT => PrintFormat(rd_u32(input)?),
            READ_LINE => ReadLine,
            PARSE => Parse(Type::from_tag(rd_u8(input)?)?),
            other => return Err(ImageError::BadOpcode(other)),
        };

        instructions.push(instruction);
    }

    let label_count = rd_u32(input)?;
    let mut labels = Vec::new();
    for _ in 0..label_count {
        labels.push(rd_u32(input)?);
    }

    Ok(Code {
        instructions,
        labels,
    })
}

fn wr_u32<W: Write>(output: &mut W, value: u32) -> io::Result<()> {
    output.write_all(&value.to_le_bytes())
}

fn wr_op_u32<W: Write>(output: &mut W, opcode: u8, operand: u32) -> io::Result<()> {
    output.write_all(&[opcode])?;
    wr_u32(output, operand)
}

fn wr_str<W: Write>(output: &mut W, string: &str) -> io::Result<()> {
    wr_u32(output, string.len() as u32)?;
    output.write_all(string.as_bytes())
}

fn wr_slot<W: Write>(output: &mut W, slot: Slot) -> io::Result<()> {
    output.write_all(&[slot.ty.tag(), slot.array as u8])
}

fn rd_u8<R: Read>(input: &mut R) -> io::Result<u8> {
    let mut byte = [0; 1];
    input.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn rd_u32<R: Read>(input: &mut R) -> io::Result<u32> {
    let mut bytes = [0; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn rd_str<R: Read>(input: &mut R) -> Result<String, ImageError> {
    // La longitud no es confiable: se lee a lo sumo lo que exista
    let length = rd_u32(input)?;
    let mut bytes = Vec::new();
    input.by_ref().take(length.into()).read_to_end(&mut bytes)?;

    if bytes.len() != length as usize {
        return Err(ImageError::ShortString(length));
    }

    String::from_utf8(bytes).map_err(|_| ImageError::BadString)
}

fn rd_slot<R: Read>(input: &mut R) -> Result<Slot, ImageError> {
    let ty = Type::from_tag(rd_u8(input)?)?;
    let array = rd_u8(input)? != 0;

    Ok(Slot { ty, array })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Image {
        let mut main = Code::default();
        main.instructions = vec![
            Instruction::LoadField(0),
            Instruction::JumpIfFalse(Label(0)),
            Instruction::PushStr("x = {0}\n".into()),
            Instruction::PushInt(-7),
            Instruction::Box(Type::Int),
            Instruction::PrintFormat(1),
            Instruction::PushInt(0),
            Instruction::Return,
        ];
        main.labels = vec![6];

        Image {
            flags: ImageFlags::USER_ENTRY,
            fields: vec![Field {
                name: "flag".into(),
                slot: Slot::scalar(Type::Bool),
            }],
            initializer: Code {
                instructions: vec![Instruction::PushInt(1), Instruction::StoreField(0), Instruction::Return],
                labels: Vec::new(),
            },
            routines: vec![Routine {
                name: "main".into(),
                params: vec![Slot::array(Type::Char)],
                returns: Some(Type::Int),
                locals: 2,
                code: main,
            }],
            entry: 0,
        }
    }

    #[test]
    fn image_survives_serialization() {
        let image = sample();

        let mut bytes = Vec::new();
        image.write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"CMIX");

        let read = Image::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, image);
    }

    #[test]
    fn rejects_foreign_files() {
        let result = Image::read_from(&mut &b"MZ\x90\x00rest"[..]);
        assert!(matches!(result, Err(ImageError::BadMagic)));
    }

    #[test]
    fn truncated_image_is_an_io_error() {
        let mut bytes = Vec::new();
        sample().write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);

        let result = Image::read_from(&mut bytes.as_slice());
        assert!(matches!(result, Err(ImageError::Io(_))));
    }

    #[test]
    fn oversized_string_length_is_rejected() {
        let mut bytes = Vec::new();
        wr_u32(&mut bytes, u32::MAX).unwrap();
        bytes.extend_from_slice(b"abc");

        let result = rd_str(&mut bytes.as_slice());
        assert!(matches!(result, Err(ImageError::ShortString(u32::MAX))));
    }

    #[test]
    fn bad_entry_is_rejected() {
        let mut image = sample();
        image.entry = 4;

        let mut bytes = Vec::new();
        image.write_to(&mut bytes).unwrap();

        let result = Image::read_from(&mut bytes.as_slice());
        assert!(matches!(result, Err(ImageError::BadEntry(4))));
    }
}
