//! Compilador de C-minus.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente. Este
//! archivo se somete primero a análisis léxico en [`lex`], de lo cual
//! se obtiene un flujo de tokens. El flujo de tokens alimenta al
//! analizador sintáctico en [`parse`], que construye el árbol de
//! [`ast`] y a la vez conduce al generador de código.
//!
//! # Generación
//! No existe una representación intermedia. El generador verifica
//! tipos y resuelve nombres contra las tablas de [`symbol`] conforme
//! recibe subárboles, y emite instrucciones para la máquina de pila
//! de `runtime` en una sola pasada. El resultado es una [`Image`] que
//! [`link`] persiste en disco y que el cargador `cmrun` ejecuta.

#[macro_use]
mod macros;

pub mod ast;
pub mod error;
pub mod lex;
pub mod link;
pub mod parse;
pub mod semantic;
pub mod source;
pub mod symbol;

mod codegen;

use bitflags::bitflags;
use log::debug;
use runtime::Image;

use std::io::BufRead;

use crate::{ast::Node, error::Diagnostics, lex::Lexer};

pub use crate::codegen::listing;

bitflags! {
    /// Opciones de compilación.
    pub struct Options: u32 {
        /// Compila `-=` y `/=` evaluando el lado derecho dos veces,
        /// descartando el primer resultado.
        const LEGACY_COMPOUND = 0x01;
    }
}

/// Resultado de una compilación exitosa.
#[derive(Debug)]
pub struct Compilation {
    pub ast: Node,
    pub image: Image,
}

/// Compila un programa completo a partir de su código fuente.
///
/// `name` identifica al origen en los diagnósticos. La compilación se
/// detiene en el primer error sintáctico o semántico; los errores
/// léxicos se reportan todos juntos.
pub fn compile<R: BufRead>(reader: R, name: &str, options: Options) -> Result<Compilation, Diagnostics> {
    let (start, chars) = source::chars(reader, name);

    let tokens = Lexer::new(start.clone(), chars)
        .try_exhaustive()
        .map_err(Diagnostics::from)?;

    debug!("{}: {} tokens", name, tokens.len());

    let (ast, image) = parse::parse(tokens, start, options)?;
    Ok(Compilation { ast, image })
}
