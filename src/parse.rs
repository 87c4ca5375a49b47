//! Análisis sintáctico.
//!
//! Descenso recursivo con una función por no terminal. Las decisiones
//! se toman observando hasta tres tokens adelante, sin retroceso: una
//! vez que una producción consume su primer token distintivo, queda
//! comprometida.
//!
//! El analizador conduce directamente al generador de código. En cuanto
//! una construcción con peso semántico queda reconocida, el subárbol
//! correspondiente se entrega a [`Generator`], de modo que el árbol
//! sintáctico, la tabla de símbolos y las instrucciones se construyen
//! en una única pasada.

use thiserror::Error;

use runtime::Image;

use crate::{
    ast::{Node, Rule},
    codegen::Generator,
    lex::{Keyword, Token, TokenStream},
    semantic::SemanticError,
    source::{Located, Location},
    Options,
};

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Expected {0}, found {1} instead")]
    UnexpectedToken(Token, Token),

    #[error("Expected {0}, none was found instead")]
    MissingToken(Token),

    #[error("Expected identifier")]
    ExpectedId,

    #[error("Expected a variable or function declaration")]
    ExpectedDeclaration,

    #[error("Expected any of `int`, `bool`, `char`")]
    ExpectedType,

    #[error("Expected an expression")]
    ExpectedExpr,

    #[error("Expected an integer array length")]
    ExpectedArraySize,

    #[error("Abrupt end of program")]
    UnexpectedEof,
}

/// Primer error que detuvo la compilación.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("{}", .0.val())]
    Syntax(Located<ParserError>),

    #[error("{}", .0.val())]
    Semantic(Located<SemanticError>),
}

impl CompileError {
    pub fn location(&self) -> &Location {
        match self {
            CompileError::Syntax(error) => error.location(),
            CompileError::Semantic(error) => error.location(),
        }
    }
}

impl From<Located<ParserError>> for CompileError {
    fn from(error: Located<ParserError>) -> Self {
        CompileError::Syntax(error)
    }
}

impl From<Located<SemanticError>> for CompileError {
    fn from(error: Located<SemanticError>) -> Self {
        CompileError::Semantic(error)
    }
}

type Parse<T> = Result<T, CompileError>;

/// Analiza y compila un programa completo.
///
/// `start` es la ubicación del inicio del archivo, que se utiliza para
/// errores que no tienen un token asociado.
pub fn parse<T>(tokens: T, start: Location, options: Options) -> Parse<(Node, Image)>
where
    T: IntoIterator<Item = Located<Token>>,
{
    let mut parser = Parser {
        tokens: TokenStream::new(tokens),
        last_known: start.clone(),
        gen: Generator::new(start, options),
    };

    let program = parser.program()?;
    Ok((program, parser.gen.finish()))
}

struct Parser<I: Iterator<Item = Located<Token>>> {
    tokens: TokenStream<I>,
    last_known: Location,
    gen: Generator,
}

impl<I: Iterator<Item = Located<Token>>> Parser<I> {
    fn program(&mut self) -> Parse<Node> {
        let mut program = Node::new(Rule::Program);
        while self.peek(1).is_some() {
            let declaration = self.declaration()?;
            program.push(declaration);
        }

        Ok(program)
    }

    fn declaration(&mut self) -> Parse<Node> {
        match (self.peek(1), self.peek(2), self.peek(3)) {
            (Some(token), Some(Token::Id(_)), Some(Token::OpenParen)) if is_type(&token) => {
                self.fun_decl()
            }

            (Some(Token::Id(_)), Some(Token::OpenParen), _) => self.fun_decl(),
            (Some(token), _, _) if is_type(&token) => self.var_decl(),

            _ => {
                self.next()?;
                self.fail(ParserError::ExpectedDeclaration)
            }
        }
    }

    fn var_decl(&mut self) -> Parse<Node> {
        let mut var_decl = Node::new(Rule::VarDecl);
        var_decl.push(self.type_spec()?);
        var_decl.push(self.var_decl_list()?);
        self.expect(Token::Semicolon)?;

        self.gen.declare_globals(&var_decl)?;
        Ok(var_decl)
    }

    fn scoped_var_decl(&mut self) -> Parse<Node> {
        let mut scoped = Node::new(Rule::ScopedVarDecl);
        if let Some(Token::Keyword(Keyword::Static)) = self.peek(1) {
            let token = self.next()?;
            scoped.push(Node::leaf(Rule::Static, token));
        }

        scoped.push(self.type_spec()?);
        scoped.push(self.var_decl_list()?);
        self.expect(Token::Semicolon)?;

        self.gen.declare_locals(&scoped)?;
        Ok(scoped)
    }

    fn var_decl_list(&mut self) -> Parse<Node> {
        let mut list = Node::new(Rule::VarDeclList);
        list.push(self.var_decl_init()?);

        if self.accept(Token::Comma)? {
            let tail = self.var_decl_list()?;
            list.absorb(tail);
        }

        Ok(list)
    }

    fn var_decl_init(&mut self) -> Parse<Node> {
        let mut init = Node::new(Rule::VarDeclInit);
        init.push(self.var_decl_id()?);

        // `:` y `=` son equivalentes en declaraciones
        if self.accept(Token::Colon)? || self.accept(Token::Assign)? {
            init.push(self.simple_expression()?);
        }

        Ok(init)
    }

    fn var_decl_id(&mut self) -> Parse<Node> {
        let mut var_decl_id = Node::new(Rule::VarDeclId);
        var_decl_id.push(self.id()?);

        if self.accept(Token::OpenSquare)? {
            let token = self.next()?;
            if !matches!(token.val(), Token::IntLiteral(_)) {
                return self.fail(ParserError::ExpectedArraySize);
            }

            var_decl_id.push(Node::leaf(Rule::Constant, token));

            self.expect(Token::CloseSquare)?;
        }

        Ok(var_decl_id)
    }

    fn type_spec(&mut self) -> Parse<Node> {
        let token = self.next()?;
        if !is_type(token.val()) {
            return self.fail(ParserError::ExpectedType);
        }

        Ok(Node::leaf(Rule::TypeSpec, token))
    }

    /// Una función abre su ámbito antes de sus parámetros y lo cierra
    /// luego de compilar su cuerpo.
    fn fun_decl(&mut self) -> Parse<Node> {
        let mut fun = Node::new(Rule::FunDecl);
        if let Some(token) = self.peek(1) {
            if is_type(&token) {
                fun.push(self.type_spec()?);
            }
        }

        let id = self.id()?;
        let name = match id.identifier() {
            Some(name) => name,
            None => return self.fail(ParserError::ExpectedId),
        };

        fun.push(id);

        self.gen.scopes.push();
        self.expect(Token::OpenParen)?;
        fun.push(self.parms()?);
        self.expect(Token::CloseParen)?;

        self.gen.begin_function(&name, &fun)?;
        fun.push(self.statement()?);
        self.gen.scopes.pop();

        Ok(fun)
    }

    fn parms(&mut self) -> Parse<Node> {
        let mut parms = Node::new(Rule::Parms);
        if let Some(Token::CloseParen) = self.peek(1) {
            return Ok(parms);
        }

        loop {
            parms.push(self.parm_type_list()?);
            if !self.accept(Token::Semicolon)? {
                break Ok(parms);
            }
        }
    }

    fn parm_type_list(&mut self) -> Parse<Node> {
        let mut list = Node::new(Rule::ParmTypeList);
        list.push(self.type_spec()?);
        list.push(self.parm_id_list()?);

        self.gen.define_parameters(&list)?;
        Ok(list)
    }

    fn parm_id_list(&mut self) -> Parse<Node> {
        let mut list = Node::new(Rule::ParmIdList);
        loop {
            let mut parm_id = Node::new(Rule::ParmId);
            parm_id.push(self.id()?);

            if let Some(Token::OpenSquare) = self.peek(1) {
                let token = self.next()?;
                self.expect(Token::CloseSquare)?;
                parm_id.push(Node::leaf(Rule::Brackets, token));
            }

            list.push(parm_id);
            if !self.accept(Token::Comma)? {
                break Ok(list);
            }
        }
    }

    fn statement(&mut self) -> Parse<Node> {
        match self.peek(1) {
            Some(Token::OpenCurly) => self.compound_stmt(),
            Some(Token::Keyword(Keyword::If)) => self.select_stmt(),
            Some(Token::Keyword(Keyword::While)) => self.while_stmt(),
            Some(Token::Keyword(Keyword::For)) => self.for_stmt(),
            Some(Token::Keyword(Keyword::Return)) => self.return_stmt(),
            Some(Token::Keyword(Keyword::Break)) => self.break_stmt(),

            Some(Token::Semicolon) => {
                let token = self.next()?;
                Ok(Node::leaf(Rule::EmptyStmt, token))
            }

            _ => self.exp_stmt(),
        }
    }

    fn compound_stmt(&mut self) -> Parse<Node> {
        self.expect(Token::OpenCurly)?;
        self.gen.scopes.push();

        let mut compound = Node::new(Rule::CompoundStmt);
        let mut decls = Node::new(Rule::LocalDecls);

        loop {
            match self.peek(1) {
                Some(Token::Keyword(Keyword::Static)) => decls.push(self.scoped_var_decl()?),
                Some(token) if is_type(&token) => decls.push(self.scoped_var_decl()?),
                _ => break,
            }
        }

        let mut statements = Node::new(Rule::StmtList);
        loop {
            match self.peek(1) {
                Some(Token::CloseCurly) => break,
                None => return self.fail(ParserError::MissingToken(Token::CloseCurly)),
                _ => statements.push(self.statement()?),
            }
        }

        self.expect(Token::CloseCurly)?;
        self.gen.scopes.pop();

        compound.push(decls);
        compound.push(statements);
        Ok(compound)
    }

    fn exp_stmt(&mut self) -> Parse<Node> {
        let mut statement = Node::new(Rule::ExpStmt);
        let expression = self.expression()?;
        self.expect(Token::Semicolon)?;

        self.gen.expression_statement(&expression)?;
        statement.push(expression);

        Ok(statement)
    }

    fn select_stmt(&mut self) -> Parse<Node> {
        let mut select = Node::new(Rule::SelectStmt);
        self.keyword(Keyword::If)?;

        let condition = self.simple_expression()?;
        let otherwise = self.gen.begin_if(&condition)?;
        select.push(condition);

        self.keyword(Keyword::Then)?;
        select.push(self.statement()?);

        if let Some(Token::Keyword(Keyword::Else)) = self.peek(1) {
            self.next()?;

            let end = self.gen.begin_else(otherwise);
            select.push(self.statement()?);
            self.gen.end_if(end);
        } else {
            self.gen.end_if(otherwise);
        }

        Ok(select)
    }

    fn while_stmt(&mut self) -> Parse<Node> {
        let mut while_stmt = Node::new(Rule::WhileStmt);
        self.keyword(Keyword::While)?;

        let condition = self.simple_expression()?;
        self.keyword(Keyword::Do)?;

        let labels = self.gen.begin_while();
        let body = self.statement()?;
        self.gen.end_while(labels, &condition)?;

        while_stmt.push(condition);
        while_stmt.push(body);
        Ok(while_stmt)
    }

    fn for_stmt(&mut self) -> Parse<Node> {
        let mut for_stmt = Node::new(Rule::ForStmt);
        self.keyword(Keyword::For)?;

        let id = self.id()?;
        let variable = match id.identifier() {
            Some(variable) => variable,
            None => return self.fail(ParserError::ExpectedId),
        };

        self.expect(Token::Assign)?;
        let range = self.iter_range()?;
        self.keyword(Keyword::Do)?;

        let for_loop = self.gen.begin_for(&variable, &range)?;
        let body = self.statement()?;
        self.gen.end_for(for_loop, &range)?;

        for_stmt.push(id);
        for_stmt.push(range);
        for_stmt.push(body);
        Ok(for_stmt)
    }

    fn iter_range(&mut self) -> Parse<Node> {
        let mut range = Node::new(Rule::IterRange);
        range.push(self.simple_expression()?);

        if let Some(Token::Keyword(Keyword::To)) = self.peek(1) {
            self.next()?;
            range.push(self.simple_expression()?);

            if let Some(Token::Keyword(Keyword::By)) = self.peek(1) {
                self.next()?;
                range.push(self.simple_expression()?);
            }
        }

        Ok(range)
    }

    fn return_stmt(&mut self) -> Parse<Node> {
        let mut return_stmt = Node::new(Rule::ReturnStmt);
        let location = self.keyword(Keyword::Return)?;

        let value = match self.peek(1) {
            Some(Token::Semicolon) => None,
            _ => Some(self.expression()?),
        };

        self.expect(Token::Semicolon)?;
        self.gen.return_statement(value.as_ref(), &location)?;

        if let Some(value) = value {
            return_stmt.push(value);
        }

        Ok(return_stmt)
    }

    fn break_stmt(&mut self) -> Parse<Node> {
        let token = self.next()?;
        self.expect(Token::Semicolon)?;

        self.gen.break_statement(token.location())?;
        Ok(Node::leaf(Rule::BreakStmt, token))
    }

    /// Una expresión cuyo lado izquierdo resulta ser variable puede
    /// continuar como asignación, `++` o `--`.
    fn expression(&mut self) -> Parse<Node> {
        let mut expression = Node::new(Rule::Expression);
        expression.push(self.simple_expression()?);

        match self.peek(1) {
            Some(token) if token.is_assignment() => {
                let operator = self.next()?;
                expression.push(Node::leaf(Rule::Operator, operator));
                expression.push(self.expression()?);
            }

            Some(Token::Increment) | Some(Token::Decrement) => {
                let operator = self.next()?;
                expression.push(Node::leaf(Rule::Operator, operator));
            }

            _ => (),
        }

        Ok(expression)
    }

    fn simple_expression(&mut self) -> Parse<Node> {
        self.sequence(Rule::SimpleExpression, Parser::and_expression, |token| {
            *token == Token::Keyword(Keyword::Or)
        })
    }

    fn and_expression(&mut self) -> Parse<Node> {
        self.sequence(Rule::AndExpression, Parser::unary_rel_expression, |token| {
            *token == Token::Keyword(Keyword::And)
        })
    }

    fn unary_rel_expression(&mut self) -> Parse<Node> {
        let mut unary = Node::new(Rule::UnaryRelExpression);
        match self.peek(1) {
            Some(Token::Keyword(Keyword::Not)) => {
                let not = self.next()?;
                unary.push(Node::leaf(Rule::Operator, not));
                unary.push(self.unary_rel_expression()?);
            }

            _ => unary.push(self.rel_expression()?),
        }

        Ok(unary)
    }

    fn rel_expression(&mut self) -> Parse<Node> {
        use Token::*;

        let mut relation = Node::new(Rule::RelExpression);
        relation.push(self.min_max_expression()?);

        if let Some(Equal | NotEqual | Less | LessOrEqual | Greater | GreaterOrEqual) = self.peek(1) {
            let operator = self.next()?;
            relation.push(Node::leaf(Rule::Operator, operator));
            relation.push(self.min_max_expression()?);
        }

        Ok(relation)
    }

    fn min_max_expression(&mut self) -> Parse<Node> {
        self.operator_chain(Rule::MinMaxExpression, Parser::sum_expression, |token| {
            matches!(token, Token::Min | Token::Max)
        })
    }

    fn sum_expression(&mut self) -> Parse<Node> {
        self.operator_chain(Rule::SumExpression, Parser::mul_expression, |token| {
            matches!(token, Token::Plus | Token::Minus)
        })
    }

    fn mul_expression(&mut self) -> Parse<Node> {
        self.operator_chain(Rule::MulExpression, Parser::unary_expression, |token| {
            matches!(token, Token::Times | Token::Divide | Token::Percent)
        })
    }

    fn unary_expression(&mut self) -> Parse<Node> {
        let mut unary = Node::new(Rule::UnaryExpression);
        match self.peek(1) {
            Some(Token::Minus | Token::Times | Token::Question) => {
                let operator = self.next()?;
                unary.push(Node::leaf(Rule::Operator, operator));
                unary.push(self.unary_expression()?);
            }

            _ => unary.push(self.factor()?),
        }

        Ok(unary)
    }

    fn factor(&mut self) -> Parse<Node> {
        let mut factor = Node::new(Rule::Factor);
        match (self.peek(1), self.peek(2)) {
            (Some(Token::Id(_)), Some(Token::OpenParen)) => factor.push(self.immutable()?),
            (Some(Token::Id(_)), _) => factor.push(self.mutable()?),
            _ => factor.push(self.immutable()?),
        }

        Ok(factor)
    }

    fn immutable(&mut self) -> Parse<Node> {
        let mut immutable = Node::new(Rule::Immutable);
        match self.peek(1) {
            Some(Token::OpenParen) => {
                self.next()?;
                immutable.push(self.expression()?);
                self.expect(Token::CloseParen)?;
            }

            Some(Token::Id(_)) => immutable.push(self.call()?),

            Some(
                Token::IntLiteral(_) | Token::BoolLiteral(_) | Token::CharLiteral(_) | Token::StrLiteral(_),
            ) => {
                let constant = self.next()?;
                immutable.push(Node::leaf(Rule::Constant, constant));
            }

            _ => {
                self.next()?;
                return self.fail(ParserError::ExpectedExpr);
            }
        }

        Ok(immutable)
    }

    fn mutable(&mut self) -> Parse<Node> {
        let mut mutable = Node::new(Rule::Mutable);
        mutable.push(self.id()?);

        if self.accept(Token::OpenSquare)? {
            mutable.push(self.expression()?);
            self.expect(Token::CloseSquare)?;
        }

        Ok(mutable)
    }

    fn call(&mut self) -> Parse<Node> {
        let mut call = Node::new(Rule::Call);
        call.push(self.id()?);
        self.expect(Token::OpenParen)?;

        let mut args = Node::new(Rule::Args);
        if !self.accept(Token::CloseParen)? {
            loop {
                args.push(self.expression()?);
                if !self.accept(Token::Comma)? {
                    break;
                }
            }

            self.expect(Token::CloseParen)?;
        }

        call.push(args);
        Ok(call)
    }

    /// Operandos separados por un operador lógico. El operador queda
    /// implícito en la producción del nodo.
    fn sequence<F, P>(&mut self, rule: Rule, mut operand: F, is_operator: P) -> Parse<Node>
    where
        F: FnMut(&mut Self) -> Parse<Node>,
        P: Fn(&Token) -> bool,
    {
        let mut node = Node::new(rule);
        node.push(operand(self)?);

        while self.peek(1).map_or(false, |token| is_operator(&token)) {
            self.next()?;
            node.push(operand(self)?);
        }

        Ok(node)
    }

    /// Operandos intercalados con hojas de operador.
    fn operator_chain<F, P>(&mut self, rule: Rule, mut operand: F, is_operator: P) -> Parse<Node>
    where
        F: FnMut(&mut Self) -> Parse<Node>,
        P: Fn(&Token) -> bool,
    {
        let mut node = Node::new(rule);
        node.push(operand(self)?);

        while self.peek(1).map_or(false, |token| is_operator(&token)) {
            let operator = self.next()?;
            node.push(Node::leaf(Rule::Operator, operator));
            node.push(operand(self)?);
        }

        Ok(node)
    }

    fn id(&mut self) -> Parse<Node> {
        let token = self.next()?;
        match token.val() {
            Token::Id(_) => Ok(Node::leaf(Rule::Id, token)),
            _ => self.fail(ParserError::ExpectedId),
        }
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<Location> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<Location> {
        match self.tokens.next() {
            Some(found) => {
                self.last_known = found.location().clone();

                let (location, found) = found.split();
                if found == token {
                    Ok(location)
                } else {
                    self.fail(ParserError::UnexpectedToken(token, found))
                }
            }

            None => self.fail(ParserError::MissingToken(token)),
        }
    }

    /// Consume el siguiente token solo si es el indicado.
    fn accept(&mut self, token: Token) -> Parse<bool> {
        match self.peek(1) {
            Some(next) if next == token => self.next().map(|_| true),
            _ => Ok(false),
        }
    }

    fn peek(&mut self, k: usize) -> Option<Token> {
        self.tokens.peek(k).map(|token| token.val().clone())
    }

    fn next(&mut self) -> Parse<Located<Token>> {
        match self.tokens.next() {
            Some(token) => {
                self.last_known = token.location().clone();
                Ok(token)
            }

            None => self.fail(ParserError::UnexpectedEof),
        }
    }

    fn fail<T>(&self, error: ParserError) -> Parse<T> {
        Err(Located::at(error, self.last_known.clone()).into())
    }
}

fn is_type(token: &Token) -> bool {
    matches!(
        token,
        Token::Keyword(Keyword::Int) | Token::Keyword(Keyword::Bool) | Token::Keyword(Keyword::Char)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, source};

    fn parse_str(source: &str) -> Parse<(Node, Image)> {
        let (start, chars) = source::chars(source.as_bytes(), "test.cm");
        let tokens = Lexer::new(start.clone(), chars).try_exhaustive().unwrap();
        parse(tokens, start, Options::empty())
    }

    fn syntax_error(source: &str) -> ParserError {
        match parse_str(source) {
            Err(CompileError::Syntax(error)) => error.into_inner(),
            Err(CompileError::Semantic(error)) => panic!("semantic error: {}", error.val()),
            Ok(_) => panic!("program was accepted"),
        }
    }

    #[test]
    fn declarations_are_distinguished_by_lookahead() {
        let (program, image) = parse_str("int x, y[3] : 1;\nint f(int a) { return a; }\ng() { }").unwrap();

        let rules: Vec<_> = program.children().iter().map(Node::rule).collect();
        assert_eq!(rules, [Rule::VarDecl, Rule::FunDecl, Rule::FunDecl]);

        let list = program.child(0).unwrap().find(Rule::VarDeclList).unwrap();
        assert_eq!(list.children().len(), 2);

        // f, g y la entrada sintetizada
        assert_eq!(image.routines.len(), 3);
        assert_eq!(image.fields.len(), 2);
    }

    #[test]
    fn assignment_keeps_its_operator() {
        let (program, _) = parse_str("main() { int a, b; a += b * 2; }").unwrap();

        let body = program.child(0).unwrap().find(Rule::CompoundStmt).unwrap();
        let statement = body.find(Rule::StmtList).unwrap().child(0).unwrap();
        let expression = statement.child(0).unwrap();

        assert_eq!(expression.rule(), Rule::Expression);
        assert_eq!(expression.children().len(), 3);
        assert!(expression.child(0).unwrap().as_mutable().is_some());

        let operator = expression.child(1).unwrap().token().unwrap();
        assert_eq!(*operator.val(), Token::AddAssign);
        assert_eq!(expression.child(2).unwrap().rule(), Rule::Expression);
    }

    #[test]
    fn call_and_indexing_are_told_apart() {
        let (program, _) = parse_str("int f(int v[]) { return v[0]; }\nmain() { int a[2]; f(a); }").unwrap();
        let text = program.to_string();

        assert!(text.contains("Call"));
        assert!(text.contains("Mutable"));
        assert!(text.contains("Brackets"));
    }

    #[test]
    fn syntax_errors() {
        assert!(matches!(syntax_error("main() { int x }"), ParserError::UnexpectedToken(..)));
        assert!(matches!(syntax_error("x;"), ParserError::ExpectedDeclaration));
        assert!(matches!(syntax_error("int a[b];"), ParserError::ExpectedArraySize));
        assert!(matches!(syntax_error("main() { return + ; }"), ParserError::ExpectedExpr));
        assert!(matches!(syntax_error("main() {"), ParserError::MissingToken(Token::CloseCurly)));
        assert!(matches!(
            syntax_error("main() { if true do ; }"),
            ParserError::UnexpectedToken(Token::Keyword(Keyword::Then), _)
        ));
    }
}
