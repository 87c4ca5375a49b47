//! Compilación de expresiones.
//!
//! Cada función recibe un subárbol y el flujo destino, emite el código
//! que deja el valor de la expresión en la pila (si lo tiene) y retorna
//! el [`ExprType`] resultante.

use runtime::Instruction;

use super::{Generator, Target};
use crate::{
    ast::{Node, Rule},
    lex::{Identifier, Token},
    semantic::{ExprType, Semantic, SemanticError, Type},
    source::Located,
    symbol::{Body, Intrinsic, Shape, Symbol},
};

/// Destino de una asignación: una variable o uno de sus elementos.
pub(super) struct Place<'n> {
    pub symbol: Symbol,
    pub index: Option<&'n Node>,
}

impl Generator {
    /// Compila una [`Rule::Expression`], incluyendo asignaciones.
    pub(super) fn compile_expression(&mut self, expression: &Node, target: Target) -> Semantic<ExprType> {
        match expression.children() {
            [simple] => self.compile_node(simple, target),
            [place, operator] => self.step(place, operator, target),
            [place, operator, value] => self.assignment(place, operator, value, target),
            _ => self.error(expression, SemanticError::Malformed(expression.rule())),
        }
    }

    /// Compila cualquier subárbol de expresión.
    pub(super) fn compile_node(&mut self, node: &Node, target: Target) -> Semantic<ExprType> {
        match node.rule() {
            Rule::Expression => self.compile_expression(node, target),
            Rule::SimpleExpression => self.logical(node, Instruction::Or, target),
            Rule::AndExpression => self.logical(node, Instruction::And, target),
            Rule::UnaryRelExpression => self.unary_relational(node, target),
            Rule::RelExpression => self.relational(node, target),
            Rule::MinMaxExpression | Rule::SumExpression | Rule::MulExpression => {
                self.arithmetic(node, target)
            }

            Rule::UnaryExpression => self.unary(node, target),
            Rule::Factor | Rule::Immutable => match node.children() {
                [inner] => self.compile_node(inner, target),
                _ => self.error(node, SemanticError::Malformed(node.rule())),
            },

            Rule::Mutable => self.load_mutable(node, target),
            Rule::Call => self.call(node, target),
            Rule::Constant => self.constant(node, target),
            Rule::Operator => self.operator(node, target),
            rule => self.error(node, SemanticError::Malformed(rule)),
        }
    }

    /// Secuencias de `or` o de `and`.
    fn logical(&mut self, node: &Node, instruction: Instruction, target: Target) -> Semantic<ExprType> {
        let (first, rest) = match node.children().split_first() {
            Some(split) => split,
            None => return self.error(node, SemanticError::Malformed(node.rule())),
        };

        let found = self.compile_node(first, target)?;
        if rest.is_empty() {
            return Ok(found);
        }

        let boolean = ExprType::Scalar(Type::Bool);
        self.expect_type(first, boolean, found)?;

        for operand in rest {
            let found = self.compile_node(operand, target)?;
            self.expect_type(operand, boolean, found)?;
            self.emit(target, instruction.clone());
        }

        Ok(boolean)
    }

    fn unary_relational(&mut self, node: &Node, target: Target) -> Semantic<ExprType> {
        match node.children() {
            [inner] => self.compile_node(inner, target),
            [_not, operand] => {
                let boolean = ExprType::Scalar(Type::Bool);
                let found = self.compile_node(operand, target)?;
                self.expect_type(operand, boolean, found)?;

                self.emit(target, Instruction::PushInt(0));
                self.emit(target, Instruction::Eq);
                Ok(boolean)
            }

            _ => self.error(node, SemanticError::Malformed(node.rule())),
        }
    }

    /// Comparaciones. `==` y `!=` aceptan cualquier par de escalares del
    /// mismo tipo; las demás solo `int` o `char`.
    fn relational(&mut self, node: &Node, target: Target) -> Semantic<ExprType> {
        use Instruction::*;

        let (left, operator, right) = match node.children() {
            [inner] => return self.compile_node(inner, target),
            [left, operator, right] => (left, operator, right),
            _ => return self.error(node, SemanticError::Malformed(node.rule())),
        };

        let left_type = self.compile_node(left, target)?;
        let right_type = self.compile_node(right, target)?;

        let token = self.operator_token(operator)?;
        let ordered = !matches!(token, Token::Equal | Token::NotEqual);

        match left_type {
            ExprType::Scalar(Type::Int) | ExprType::Scalar(Type::Char) => (),
            ExprType::Scalar(Type::Bool) if !ordered => (),
            found => {
                let expected = ExprType::Scalar(Type::Int);
                return self.error(left, SemanticError::TypeMismatch(expected, found));
            }
        }

        self.expect_type(right, left_type, right_type)?;

        // Las relaciones negadas se invierten comparando contra cero
        let instructions = match token {
            Token::Equal => vec![Eq],
            Token::NotEqual => vec![Eq, PushInt(0), Eq],
            Token::Less => vec![Lt],
            Token::Greater => vec![Gt],
            Token::GreaterOrEqual => vec![Lt, PushInt(0), Eq],
            Token::LessOrEqual => vec![Gt, PushInt(0), Eq],
            _ => return self.error(operator, SemanticError::Malformed(Rule::RelExpression)),
        };

        for instruction in instructions {
            self.emit(target, instruction);
        }

        Ok(ExprType::Scalar(Type::Bool))
    }

    /// Secuencias de operadores binarios enteros, asociativas a la izquierda.
    fn arithmetic(&mut self, node: &Node, target: Target) -> Semantic<ExprType> {
        let (first, rest) = match node.children().split_first() {
            Some(split) => split,
            None => return self.error(node, SemanticError::Malformed(node.rule())),
        };

        let found = self.compile_node(first, target)?;
        if rest.is_empty() {
            return Ok(found);
        }

        let integer = ExprType::Scalar(Type::Int);
        for pair in rest.chunks(2) {
            let (operator, operand) = match pair {
                [operator, operand] => (operator, operand),
                _ => return self.error(node, SemanticError::Malformed(node.rule())),
            };

            if found != integer {
                let token = self.operator_token(operator)?;
                return self.error(first, SemanticError::IntOperand(token, found));
            }

            let operand_type = self.compile_node(operand, target)?;
            if operand_type != integer {
                let token = self.operator_token(operator)?;
                return self.error(operand, SemanticError::IntOperand(token, operand_type));
            }

            self.compile_node(operator, target)?;
        }

        Ok(integer)
    }

    /// Operadores prefijos `-`, `*` (longitud de arreglo) y `?` (aleatorio).
    fn unary(&mut self, node: &Node, target: Target) -> Semantic<ExprType> {
        use Instruction::*;

        let (operator, operand) = match node.children() {
            [inner] => return self.compile_node(inner, target),
            [operator, operand] => (operator, operand),
            _ => return self.error(node, SemanticError::Malformed(node.rule())),
        };

        let token = self.operator_token(operator)?;
        let found = self.compile_node(operand, target)?;
        let integer = ExprType::Scalar(Type::Int);

        match token {
            Token::Times => match found {
                ExprType::Array(_) => self.emit(target, ArrayLen),
                found => return self.error(operand, SemanticError::ArrayOperand(found)),
            },

            _ if found != integer => return self.error(operand, SemanticError::IntOperand(token, found)),

            Token::Minus => self.emit(target, Neg),

            // `?n` toma un valor en [0, n); para n negativo, el
            // resultado es el opuesto de `?(-n)`
            Token::Question => {
                let positive = self.define_label(target);
                let end = self.define_label(target);

                for instruction in [Dup, PushInt(0), Lt, JumpIfFalse(positive), Neg, Random, Neg, Jump(end)] {
                    self.emit(target, instruction);
                }

                self.mark_label(target, positive);
                self.emit(target, Random);
                self.mark_label(target, end);
            }

            _ => return self.error(operator, SemanticError::Malformed(Rule::UnaryExpression)),
        }

        Ok(integer)
    }

    fn operator(&mut self, node: &Node, target: Target) -> Semantic<ExprType> {
        use Instruction::*;

        let instruction = match self.operator_token(node)? {
            Token::Plus => Add,
            Token::Minus => Sub,
            Token::Times => Mul,
            Token::Divide => Div,
            Token::Percent => Rem,
            Token::Max => Max,
            Token::Min => Min,
            _ => return self.error(node, SemanticError::Malformed(Rule::Operator)),
        };

        self.emit(target, instruction);
        Ok(ExprType::Operator)
    }

    fn constant(&mut self, node: &Node, target: Target) -> Semantic<ExprType> {
        let (instruction, ty) = match node.token().map(Located::val) {
            Some(&Token::IntLiteral(value)) => (Instruction::PushInt(value), ExprType::Scalar(Type::Int)),
            Some(&Token::BoolLiteral(value)) => {
                (Instruction::PushInt(value as i32), ExprType::Scalar(Type::Bool))
            }

            Some(&Token::CharLiteral(c)) => (Instruction::PushInt(c as i32), ExprType::Scalar(Type::Char)),
            Some(Token::StrLiteral(string)) => (Instruction::PushStr(string.clone()), ExprType::Str),
            _ => return self.error(node, SemanticError::Malformed(Rule::Constant)),
        };

        self.emit(target, instruction);
        Ok(ty)
    }

    /// Lectura de una variable o de un elemento de arreglo.
    fn load_mutable(&mut self, mutable: &Node, target: Target) -> Semantic<ExprType> {
        let name = self.name(mutable)?;
        let symbol = self.resolve(&name, target)?;

        self.load_symbol(&symbol, target);
        match (mutable.child(1), symbol.is_array()) {
            (Some(index), true) => {
                self.int_operand(index, target)?;
                self.emit(target, Instruction::LoadElem);
                Ok(ExprType::Scalar(symbol.ty))
            }

            (Some(_), false) => self.error(mutable, SemanticError::NotAnArray(name.into_inner())),
            (None, true) => Ok(ExprType::Array(symbol.ty)),
            (None, false) => Ok(ExprType::Scalar(symbol.ty)),
        }
    }

    fn call(&mut self, call: &Node, target: Target) -> Semantic<ExprType> {
        let name = self.name(call)?;
        let args = call.find(Rule::Args).map(Node::children).unwrap_or(&[]);
        let function = self.functions.resolve(&name)?.clone();

        let routine = match function.body {
            Body::Intrinsic(Intrinsic::Print) => return self.print(&name, args, target),
            Body::Intrinsic(Intrinsic::Put) => return self.put(&name, args, target),
            Body::Routine(routine) => routine,
        };

        if args.len() != function.params.len() {
            let error = SemanticError::ArgumentCount {
                name: name.into_inner(),
                expected: function.params.len(),
                found: args.len(),
            };

            return self.error(call, error);
        }

        // Los arreglos se pasan por referencia
        for (arg, &param) in args.iter().zip(&function.params) {
            let found = self.compile_expression(arg, target)?;
            self.expect_type(arg, ExprType::from(param), found)?;
        }

        self.emit(target, Instruction::Call(routine));
        Ok(function.returns.map(ExprType::Scalar).unwrap_or(ExprType::Void))
    }

    /// Asignación simple o compuesta.
    fn assignment(&mut self, place: &Node, operator: &Node, value: &Node, target: Target) -> Semantic<ExprType> {
        let mutable = match place.as_mutable() {
            Some(mutable) => mutable,
            None => return self.error(place, SemanticError::NotAssignable),
        };

        let name = self.name(mutable)?;
        let symbol = self.resolve(&name, target)?;
        let token = self.operator_token(operator)?;

        match (mutable.child(1), symbol.is_array()) {
            (None, true) if token != Token::Assign => {
                self.error(operator, SemanticError::ArrayOperator(token))?
            }

            (None, true) => self.copy_array(&symbol, &name, value, target)?,
            (Some(_), false) => self.error(mutable, SemanticError::NotAnArray(name.into_inner()))?,
            (index, _) => {
                let place = Place { symbol, index };
                self.assign(&place, operator, &token, value, target)?
            }
        }

        Ok(ExprType::Expression)
    }

    fn assign(
        &mut self,
        place: &Place<'_>,
        operator: &Node,
        token: &Token,
        value: &Node,
        target: Target,
    ) -> Semantic<()> {
        use Instruction::*;

        let ty = place.symbol.ty;
        let integer = ExprType::Scalar(Type::Int);

        if *token != Token::Assign && ty != Type::Int {
            let error = SemanticError::IntOperand(token.clone(), ExprType::Scalar(ty));
            return self.error(operator, error);
        }

        self.place_prefix(place, target)?;
        match token {
            Token::Assign => {
                let found = self.compile_expression(value, target)?;
                self.expect_type(value, ExprType::Scalar(ty), found)?;
            }

            Token::AddAssign | Token::MulAssign => {
                let found = self.compile_expression(value, target)?;
                self.expect_type(value, integer, found)?;
                self.place_load(place, target)?;

                let instruction = if *token == Token::AddAssign { Add } else { Mul };
                self.emit(target, instruction);
            }

            Token::SubAssign | Token::DivAssign => {
                let found = self.compile_expression(value, target)?;
                self.expect_type(value, integer, found)?;

                if self.is_legacy_compound() {
                    // El lado derecho se evalúa dos veces
                    self.emit(target, Pop);
                    self.place_load(place, target)?;
                    self.compile_expression(value, target)?;
                } else {
                    self.place_load(place, target)?;
                    self.emit(target, Swap);
                }

                let instruction = if *token == Token::SubAssign { Sub } else { Div };
                self.emit(target, instruction);
            }

            _ => return self.error(operator, SemanticError::Malformed(Rule::Expression)),
        }

        self.place_store(place, target);
        Ok(())
    }

    /// `++` y `--`, solo sobre `int`.
    fn step(&mut self, place: &Node, operator: &Node, target: Target) -> Semantic<ExprType> {
        let mutable = match place.as_mutable() {
            Some(mutable) => mutable,
            None => return self.error(place, SemanticError::NotAssignable),
        };

        let name = self.name(mutable)?;
        let symbol = self.resolve(&name, target)?;
        let token = self.operator_token(operator)?;

        let found = match (mutable.child(1), symbol.is_array()) {
            (None, true) => ExprType::Array(symbol.ty),
            (Some(_), false) => return self.error(mutable, SemanticError::NotAnArray(name.into_inner())),
            _ => ExprType::Scalar(symbol.ty),
        };

        if found != ExprType::Scalar(Type::Int) {
            return self.error(place, SemanticError::IntOperand(token, found));
        }

        let instruction = match token {
            Token::Increment => Instruction::Add,
            Token::Decrement => Instruction::Sub,
            _ => return self.error(operator, SemanticError::Malformed(Rule::Expression)),
        };

        let place = Place {
            symbol,
            index: mutable.child(1),
        };

        self.place_prefix(&place, target)?;
        self.place_load(&place, target)?;
        self.emit(target, Instruction::PushInt(1));
        self.emit(target, instruction);
        self.place_store(&place, target);

        Ok(ExprType::Expression)
    }

    /// Copia elemento por elemento sobre la longitud menor.
    fn copy_array(
        &mut self,
        destination: &Symbol,
        name: &Located<Identifier>,
        value: &Node,
        target: Target,
    ) -> Semantic<()> {
        use Instruction::*;

        let source = match value.as_mutable() {
            Some(source) if source.child(1).is_none() => source,
            _ => return self.error(value, SemanticError::ArraySource),
        };

        let source_name = self.name(source)?;
        let source = self.resolve(&source_name, target)?;
        if !source.is_array() {
            return self.error(value, SemanticError::ArraySource);
        }

        if source.ty != destination.ty {
            let expected = ExprType::Array(destination.ty);
            return self.error(value, SemanticError::TypeMismatch(expected, ExprType::Array(source.ty)));
        }

        let length = match (destination.shape, source.shape) {
            (Shape::Array(Some(a)), Shape::Array(Some(b))) => a.min(b),
            (Shape::Array(None), _) | (Shape::Scalar, _) => {
                let error = SemanticError::UnknownLength(name.val().clone());
                return Err(Located::at(error, name.location().clone()));
            }

            _ => return self.error(value, SemanticError::UnknownLength(source_name.into_inner())),
        };

        for index in 0..length as i32 {
            self.load_symbol(destination, target);
            self.emit(target, PushInt(index));
            self.load_symbol(&source, target);
            self.emit(target, PushInt(index));
            self.emit(target, LoadElem);
            self.emit(target, StoreElem);
        }

        Ok(())
    }

    /// Parte de un destino que precede al valor: arreglo e índice.
    pub(super) fn place_prefix(&mut self, place: &Place<'_>, target: Target) -> Semantic<()> {
        if let Some(index) = place.index {
            self.load_symbol(&place.symbol, target);
            self.int_operand(index, target)?;
        }

        Ok(())
    }

    /// Valor actual de un destino. El índice se evalúa de nuevo.
    pub(super) fn place_load(&mut self, place: &Place<'_>, target: Target) -> Semantic<()> {
        self.load_symbol(&place.symbol, target);
        if let Some(index) = place.index {
            self.int_operand(index, target)?;
            self.emit(target, Instruction::LoadElem);
        }

        Ok(())
    }

    pub(super) fn place_store(&mut self, place: &Place<'_>, target: Target) {
        match place.index {
            Some(_) => self.emit(target, Instruction::StoreElem),
            None => self.store_symbol(&place.symbol, target),
        }
    }

    fn operator_token(&self, operator: &Node) -> Semantic<Token> {
        match operator.token() {
            Some(token) => Ok(token.val().clone()),
            None => self.error(operator, SemanticError::Malformed(operator.rule())),
        }
    }
}
