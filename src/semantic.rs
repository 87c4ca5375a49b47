//! Análisis semántico.
//!
//! El compilador es de una sola pasada: no existe una fase semántica
//! separada, sino que el generador de código verifica tipos y ámbitos
//! a medida que el analizador sintáctico le entrega subárboles. Este
//! módulo define el vocabulario compartido de esa verificación: tipos
//! de expresión, errores semánticos y funciones que extraen tipos y
//! nombres a partir de la forma de un subárbol de declaración.

use thiserror::Error;

use std::fmt::{self, Display};

use crate::{
    ast::{Node, Rule},
    lex::{Identifier, Keyword, Token},
    source::Located,
};

pub use runtime::{Slot, Type};

pub type Semantic<T> = Result<T, Located<SemanticError>>;

/// Tipo de una expresión compilada.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExprType {
    /// Valor escalar en la pila.
    Scalar(Type),

    /// Referencia a un arreglo en la pila.
    Array(Type),

    /// Cadena literal.
    Str,

    /// Llamada a una función sin tipo de retorno.
    Void,

    /// Expresión que ya fue consumida por completo, como una
    /// asignación o una llamada preconstruida.
    Expression,

    /// Operador ya emitido, sin valor propio.
    Operator,
}

impl ExprType {
    /// Determina si la expresión deja un valor en la pila.
    pub fn has_value(self) -> bool {
        matches!(self, ExprType::Scalar(_) | ExprType::Array(_) | ExprType::Str)
    }
}

impl From<Slot> for ExprType {
    fn from(slot: Slot) -> Self {
        match slot.array {
            true => ExprType::Array(slot.ty),
            false => ExprType::Scalar(slot.ty),
        }
    }
}

impl Display for ExprType {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprType::Scalar(ty) => write!(fmt, "{}", ty),
            ExprType::Array(ty) => write!(fmt, "{}[]", ty),
            ExprType::Str => fmt.write_str("string"),
            ExprType::Void => fmt.write_str("void"),
            ExprType::Expression => fmt.write_str("expression"),
            ExprType::Operator => fmt.write_str("operator"),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("`{0}` is not declared in this scope")]
    Undeclared(Identifier),

    #[error("Function `{0}` is not declared")]
    FunctionUndeclared(Identifier),

    #[error("`{0}` is already declared in this scope")]
    Redefinition(Identifier),

    #[error("A function named `{0}` already exists")]
    FunctionRedefinition(Identifier),

    #[error("Type mismatch: expected `{0}`, found `{1}`")]
    TypeMismatch(ExprType, ExprType),

    #[error("Function `{name}` expects {expected} arguments, found {found}")]
    ArgumentCount {
        name: Identifier,
        expected: usize,
        found: usize,
    },

    #[error("`{0}` is not an array")]
    NotAnArray(Identifier),

    #[error("Wrong operator {0}, must be `=` when working with the array itself")]
    ArrayOperator(Token),

    #[error("An array can only be assigned from another array variable")]
    ArraySource,

    #[error("Length of array `{0}` is not known here, it cannot be copied")]
    UnknownLength(Identifier),

    #[error("Array length must be positive")]
    ArraySize,

    #[error("Left side of assignment must be a variable")]
    NotAssignable,

    #[error("Operator {0} requires an `int` operand, found `{1}`")]
    IntOperand(Token, ExprType),

    #[error("Incorrect use of print: multiple arguments require a format string, found `{0}`")]
    PrintFormat(ExprType),

    #[error("Function `{0}` requires at least one argument")]
    MissingArguments(Identifier),

    #[error("put expects variable arguments")]
    PutTarget,

    #[error("put cannot read into the whole array `{0}`")]
    PutArray(Identifier),

    #[error("`break` outside of a loop")]
    BreakOutsideLoop,

    #[error("Function `{0}` returns no value")]
    ReturnInVoid(Identifier),

    #[error("Function `{0}` must return a value of type `{1}`")]
    MissingReturnValue(Identifier, Type),

    #[error("Initializer may only refer to constants and global variables, `{0}` is neither")]
    NotConstant(Identifier),

    #[error("Range of a `for` loop requires an upper bound (`to`)")]
    MissingBound,

    #[error("Operator `*` requires an array operand, found `{0}`")]
    ArrayOperand(ExprType),

    #[error("Cannot print a value of type `{0}`")]
    NotPrintable(ExprType),

    #[error("Malformed `{0:?}` node")]
    Malformed(Rule),
}

/// Tipo declarado por una hoja [`Rule::TypeSpec`].
pub fn declared_type(type_spec: &Node) -> Type {
    match type_spec.token().map(Located::val) {
        Some(Token::Keyword(Keyword::Bool)) => Type::Bool,
        Some(Token::Keyword(Keyword::Char)) => Type::Char,
        _ => Type::Int,
    }
}

/// Tipo de retorno de una [`Rule::FunDecl`]. `None` indica `void`.
pub fn function_type(fun_decl: &Node) -> Option<Type> {
    fun_decl.find(Rule::TypeSpec).map(declared_type)
}

/// Parámetros de una [`Rule::FunDecl`], en orden de declaración.
pub fn parameters(fun_decl: &Node) -> Vec<(Located<Identifier>, Slot)> {
    let parms = match fun_decl.find(Rule::Parms) {
        Some(parms) => parms,
        None => return Vec::new(),
    };

    parms
        .children()
        .iter()
        .flat_map(parameter_group)
        .collect()
}

/// Tipos de parámetros de una [`Rule::FunDecl`].
pub fn parameter_types(fun_decl: &Node) -> Vec<Slot> {
    parameters(fun_decl).into_iter().map(|(_, slot)| slot).collect()
}

/// Parámetros de un grupo [`Rule::ParmTypeList`], que comparten tipo.
pub fn parameter_group(parm_type_list: &Node) -> Vec<(Located<Identifier>, Slot)> {
    let ty = parm_type_list
        .find(Rule::TypeSpec)
        .map(declared_type)
        .unwrap_or(Type::Int);

    let ids = match parm_type_list.find(Rule::ParmIdList) {
        Some(ids) => ids.children(),
        None => &[],
    };

    ids.iter()
        .filter_map(|parm_id| {
            let id = parm_id.find(Rule::Id)?.identifier()?;
            let array = parm_id.find(Rule::Brackets).is_some();

            Some((id, Slot { ty, array }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, parse, source, Options};

    fn first_function(source: &str) -> Node {
        let (start, chars) = source::chars(source.as_bytes(), "test.cm");
        let tokens = Lexer::new(start.clone(), chars).try_exhaustive().unwrap();
        let (program, _) = parse::parse(tokens, start, Options::empty()).unwrap();

        program
            .children()
            .iter()
            .find(|node| node.rule() == Rule::FunDecl)
            .cloned()
            .unwrap()
    }

    #[test]
    fn function_shape() {
        let fun = first_function("char f(int a, b[]; bool c) { return 'x'; }");

        assert_eq!(function_type(&fun), Some(Type::Char));
        assert_eq!(
            parameter_types(&fun),
            vec![Slot::scalar(Type::Int), Slot::array(Type::Int), Slot::scalar(Type::Bool)]
        );

        let names: Vec<_> = parameters(&fun)
            .into_iter()
            .map(|(id, _)| id.into_inner().to_string())
            .collect();

        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn void_function_without_parameters() {
        let fun = first_function("g() { }");

        assert_eq!(function_type(&fun), None);
        assert!(parameter_types(&fun).is_empty());
    }

    #[test]
    fn type_display() {
        assert_eq!(ExprType::Array(Type::Char).to_string(), "char[]");
        assert_eq!(ExprType::from(Slot::scalar(Type::Bool)).to_string(), "bool");
        assert!(!ExprType::Expression.has_value());
    }
}
