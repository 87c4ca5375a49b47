//! Llamadas a `print` y `put`.

use runtime::Instruction;

use super::{expr::Place, Generator, Target};
use crate::{
    ast::Node,
    lex::Identifier,
    semantic::{ExprType, Semantic, SemanticError},
    source::Located,
};

impl Generator {
    /// Salida estándar.
    ///
    /// Un solo argumento se imprime según su tipo. Con más de uno, el
    /// primero debe ser una cadena de formato compuesto y el resto se
    /// empaquetan como valores genéricos.
    pub(super) fn print(&mut self, name: &Located<Identifier>, args: &[Node], target: Target) -> Semantic<ExprType> {
        let (format, rest) = match args.split_first() {
            Some(split) => split,
            None => {
                let error = SemanticError::MissingArguments(name.val().clone());
                return Err(Located::at(error, name.location().clone()));
            }
        };

        let found = self.compile_expression(format, target)?;
        if rest.is_empty() {
            let instruction = match found {
                ExprType::Scalar(ty) => Instruction::Print(ty),
                ExprType::Str => Instruction::PrintStr,
                found => return self.error(format, SemanticError::NotPrintable(found)),
            };

            self.emit(target, instruction);
            return Ok(ExprType::Expression);
        }

        if found != ExprType::Str {
            return self.error(format, SemanticError::PrintFormat(found));
        }

        for arg in rest {
            match self.compile_expression(arg, target)? {
                ExprType::Scalar(ty) => self.emit(target, Instruction::Box(ty)),
                ExprType::Str => (),
                found => return self.error(arg, SemanticError::NotPrintable(found)),
            }
        }

        self.emit(target, Instruction::PrintFormat(rest.len() as u32));
        Ok(ExprType::Expression)
    }

    /// Entrada estándar. Cada argumento debe ser una variable escalar o
    /// un elemento de arreglo, que recibe una línea convertida a su tipo.
    pub(super) fn put(&mut self, name: &Located<Identifier>, args: &[Node], target: Target) -> Semantic<ExprType> {
        if args.is_empty() {
            let error = SemanticError::MissingArguments(name.val().clone());
            return Err(Located::at(error, name.location().clone()));
        }

        for arg in args {
            let mutable = match arg.as_mutable() {
                Some(mutable) => mutable,
                None => return self.error(arg, SemanticError::PutTarget),
            };

            let variable = self.name(mutable)?;
            let symbol = self.resolve(&variable, target)?;
            let index = mutable.child(1);

            match (index, symbol.is_array()) {
                (None, true) => return self.error(arg, SemanticError::PutArray(variable.into_inner())),
                (Some(_), false) => return self.error(arg, SemanticError::NotAnArray(variable.into_inner())),
                _ => (),
            }

            let ty = symbol.ty;
            let place = Place { symbol, index };

            self.place_prefix(&place, target)?;
            self.emit(target, Instruction::ReadLine);
            self.emit(target, Instruction::Parse(ty));
            self.place_store(&place, target);
        }

        Ok(ExprType::Expression)
    }
}
