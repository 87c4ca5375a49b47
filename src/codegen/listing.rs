//! Listados legibles de imágenes.
//!
//! El listado no es un formato de entrada: existe para inspeccionar
//! lo que el generador emitió. Cada flujo de código se imprime con
//! sus etiquetas intercaladas en las posiciones que señalan.

use std::io::{self, Write};

use runtime::{Code, Image, Instruction, Label};

/// Escribe el listado completo de una imagen.
pub fn write<W: Write>(image: &Image, output: &mut W) -> io::Result<()> {
    for (index, field) in image.fields.iter().enumerate() {
        writeln!(output, ".field {} {} {}", index, field.slot, field.name)?;
    }

    writeln!(output, "\n.initializer")?;
    write_code(&image.initializer, output)?;

    for (index, routine) in image.routines.iter().enumerate() {
        let params: Vec<_> = routine.params.iter().map(ToString::to_string).collect();
        let returns = match routine.returns {
            Some(ty) => ty.to_string(),
            None => String::from("void"),
        };

        let entry = if index as u32 == image.entry { " .entry" } else { "" };
        writeln!(
            output,
            "\n.routine {} {} {}({}) locals={}{}",
            index,
            returns,
            routine.name,
            params.join(", "),
            routine.locals,
            entry
        )?;

        write_code(&routine.code, output)?;
    }

    Ok(())
}

fn write_code<W: Write>(code: &Code, output: &mut W) -> io::Result<()> {
    // Varias etiquetas pueden señalar la misma posición, incluso el final
    let mut marks: Vec<(usize, usize)> = code
        .labels
        .iter()
        .enumerate()
        .map(|(label, &at)| (at as usize, label))
        .collect();

    marks.sort_unstable();
    let mut marks = marks.into_iter().peekable();

    for position in 0..=code.instructions.len() {
        while let Some((_, label)) = marks.next_if(|&(at, _)| at == position) {
            writeln!(output, ".L{}:", label)?;
        }

        if let Some(instruction) = code.instructions.get(position) {
            write_instruction(instruction, output)?;
        }
    }

    Ok(())
}

fn write_instruction<W: Write>(instruction: &Instruction, output: &mut W) -> io::Result<()> {
    use Instruction::*;

    match instruction {
        PushInt(value) => emit!(output, "push", "{}", value),
        PushStr(string) => emit!(output, "push.str", "{:?}", string),
        Pop => emit!(output, "pop"),
        Dup => emit!(output, "dup"),
        Swap => emit!(output, "swap"),
        LoadLocal(index) => emit!(output, "ld.local", "{}", index),
        StoreLocal(index) => emit!(output, "st.local", "{}", index),
        LoadArg(index) => emit!(output, "ld.arg", "{}", index),
        StoreArg(index) => emit!(output, "st.arg", "{}", index),
        LoadField(index) => emit!(output, "ld.field", "{}", index),
        StoreField(index) => emit!(output, "st.field", "{}", index),
        NewArray(length) => emit!(output, "newarr", "{}", length),
        LoadElem => emit!(output, "ld.elem"),
        StoreElem => emit!(output, "st.elem"),
        ArrayLen => emit!(output, "len"),
        Add => emit!(output, "add"),
        Sub => emit!(output, "sub"),
        Mul => emit!(output, "mul"),
        Div => emit!(output, "div"),
        Rem => emit!(output, "rem"),
        Neg => emit!(output, "neg"),
        Min => emit!(output, "min"),
        Max => emit!(output, "max"),
        And => emit!(output, "and"),
        Or => emit!(output, "or"),
        Eq => emit!(output, "eq"),
        Lt => emit!(output, "lt"),
        Gt => emit!(output, "gt"),
        Jump(Label(label)) => emit!(output, "jmp", ".L{}", label),
        JumpIfFalse(Label(label)) => emit!(output, "jmp.f", ".L{}", label),
        JumpIfTrue(Label(label)) => emit!(output, "jmp.t", ".L{}", label),
        Call(routine) => emit!(output, "call", "{}", routine),
        Return => emit!(output, "ret"),
        Random => emit!(output, "rand"),
        Box(ty) => emit!(output, "box", "{}", ty),
        Print(ty) => emit!(output, "print", "{}", ty),
        PrintStr => emit!(output, "print.str"),
        PrintFormat(argc) => emit!(output, "print.fmt", "{}", argc),
        ReadLine => emit!(output, "readln"),
        Parse(ty) => emit!(output, "parse", "{}", ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime::{ImageFlags, Routine};
    use Instruction::Return;

    #[test]
    fn labels_are_interleaved() {
        let image = Image {
            flags: ImageFlags::USER_ENTRY,
            fields: Vec::new(),
            initializer: Code {
                instructions: vec![Return],
                labels: Vec::new(),
            },
            routines: vec![Routine {
                name: String::from("main"),
                params: Vec::new(),
                returns: None,
                locals: 0,
                code: Code {
                    instructions: vec![Instruction::Jump(Label(0)), Instruction::Return],
                    labels: vec![1, 2],
                },
            }],
            entry: 0,
        };

        let mut output = Vec::new();
        write(&image, &mut output).unwrap();
        let listing = String::from_utf8(output).unwrap();

        assert!(listing.contains(".routine 0 void main() locals=0 .entry"));
        let expected = format!("\t{:12}.L0\n.L0:\n\tret\n.L1:\n", "jmp");
        assert!(listing.contains(&expected));
    }

    #[test]
    fn labels_out_of_order_share_positions() {
        let code = Code {
            instructions: vec![Instruction::Pop, Instruction::Return],
            labels: vec![2, 0, 2, 0],
        };

        let mut output = Vec::new();
        write_code(&code, &mut output).unwrap();

        let expected = ".L1:\n.L3:\n\tpop\n\tret\n.L0:\n.L2:\n";
        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }
}
