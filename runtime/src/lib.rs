//! Entorno de ejecución para programas C-minus.
//!
//! # Propósito
//! El compilador no emite código nativo, sino una [`Image`] para una
//! máquina de pila. Esta biblioteca define tanto el formato de dicha
//! imagen como el intérprete que la ejecuta, de modo que compilador
//! y entorno de ejecución comparten exactamente el mismo conjunto de
//! instrucciones.
//!
//! # Funciones preconstruidas
//! `print` y `put` no son rutinas de la imagen. El compilador las
//! reduce a instrucciones dedicadas ([`Instruction::Print`],
//! [`Instruction::PrintFormat`], [`Instruction::ReadLine`] y
//! [`Instruction::Parse`]) cuya semántica se implementa en [`vm`].
//!
//! # Uso
//! ```no_run
//! use runtime::{Image, Machine};
//! use std::{fs::File, io::{self, BufReader}};
//!
//! let mut file = BufReader::new(File::open("program.cmx").unwrap());
//! let image = Image::read_from(&mut file).unwrap();
//!
//! let stdin = io::stdin();
//! let mut machine = Machine::new(&image, stdin.lock(), io::stdout());
//! let status = machine.run().unwrap();
//! ```

pub mod image;
pub mod vm;

pub use image::{Code, Field, Image, ImageError, ImageFlags, Instruction, Label, Routine, Slot, Type};
pub use vm::{Machine, Value, VmError};
