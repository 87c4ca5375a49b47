//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone un [`InputStream`]
//! (flujo de caracteres) en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido esta asociado a una ubicación en el código fuente original,
//! lo cual permite rastrear errores en tanto los mismos como constructos
//! más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de
//! lo que son y no incluyen lexemas. Los identificadores sí incluyen su
//! lexema original. Las constantes literales se resuelven a sus valores,
//! incluyendo las secuencias de escape de caracteres y cadenas.
//!
//! # Reglas importantes del lenguaje
//! - El lenguaje distingue mayúsculas de minúsculas.
//! - Los identificadores inician con una letra o `_`.
//! - `true` y `false` son constantes, no identificadores.
//! - Los comentarios `/* */` pueden anidarse.
//! - `:>:` y `:<:` son los operadores de máximo y mínimo.
//!
//! # Errores
//! El lexer es capaz de recuperarse parcialmente de condiciones de error.
//! Esto ocurre en suficiente grado como para reportar más de un error por
//! ejecución, pero no lo suficiente como para permitir el avance a las
//! demás fases de la compilación.

use crate::source::{InputStream, Located, Location};
use std::{
    collections::VecDeque,
    fmt::{self, Display},
    rc::Rc,
    str::FromStr,
};

use thiserror::Error;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LexerError {
    /// Error de E/S originado por el [`InputStream`].
    #[error("I/O error")]
    Input(#[from] std::io::Error),

    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("Bad character {0:?} in input stream")]
    BadChar(char),

    /// Se esperaba un carácter específico en esta posición.
    #[error("Expected {0:?}")]
    Expected(char),

    /// Una constante entera se encuentra fuera de rango.
    #[error("Integer literal overflow, valid range is [0, 2147483647]")]
    IntOverflow,

    #[error("Unknown escape sequence `\\{0}`")]
    BadEscape(char),

    #[error("Empty character constant")]
    EmptyChar,

    #[error("Unterminated string literal")]
    UnterminatedString,

    #[error("Unterminated block comment")]
    UnterminatedComment,
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(name.into())
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, fmt)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i32),

    /// `true` o `false`.
    BoolLiteral(bool),

    /// Literal de carácter, con escapes ya resueltos.
    CharLiteral(char),

    /// Literal de cadena, con escapes ya resueltos.
    StrLiteral(Rc<str>),

    /// `=`
    Assign,

    /// `+=`
    AddAssign,

    /// `-=`
    SubAssign,

    /// `*=`
    MulAssign,

    /// `/=`
    DivAssign,

    /// `++`
    Increment,

    /// `--`
    Decrement,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Divide,

    /// `%`
    Percent,

    /// `?`
    Question,

    /// `==`
    Equal,

    /// `!=`
    NotEqual,

    /// `<`
    Less,

    /// `<=`
    LessOrEqual,

    /// `>`
    Greater,

    /// `>=`
    GreaterOrEqual,

    /// `:<:`
    Min,

    /// `:>:`
    Max,

    /// `:`
    Colon,

    /// `,`
    Comma,

    /// `;`
    Semicolon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,
}

impl Token {
    /// Determina si el token es un operador de asignación.
    pub fn is_assignment(&self) -> bool {
        use Token::*;
        matches!(self, Assign | AddAssign | SubAssign | MulAssign | DivAssign)
    }
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            BoolLiteral(boolean) => write!(fmt, "literal `{}`", boolean),
            CharLiteral(c) => write!(fmt, "literal {:?}", c),
            StrLiteral(string) => write!(fmt, "literal {:?}", string),
            Assign => fmt.write_str("`=`"),
            AddAssign => fmt.write_str("`+=`"),
            SubAssign => fmt.write_str("`-=`"),
            MulAssign => fmt.write_str("`*=`"),
            DivAssign => fmt.write_str("`/=`"),
            Increment => fmt.write_str("`++`"),
            Decrement => fmt.write_str("`--`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Divide => fmt.write_str("`/`"),
            Percent => fmt.write_str("`%`"),
            Question => fmt.write_str("`?`"),
            Equal => fmt.write_str("`==`"),
            NotEqual => fmt.write_str("`!=`"),
            Less => fmt.write_str("`<`"),
            LessOrEqual => fmt.write_str("`<=`"),
            Greater => fmt.write_str("`>`"),
            GreaterOrEqual => fmt.write_str("`>=`"),
            Min => fmt.write_str("`:<:`"),
            Max => fmt.write_str("`:>:`"),
            Colon => fmt.write_str("`:`"),
            Comma => fmt.write_str("`,`"),
            Semicolon => fmt.write_str("`;`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
        }
    }
}

/// Una palabra clave.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Int,
    Bool,
    Char,
    Static,
    If,
    Then,
    Else,
    While,
    Do,
    For,
    To,
    By,
    Return,
    Break,
    And,
    Or,
    Not,
}

/// Tabla de palabras clave y sus lexemas.
const KEYWORDS: &[(&str, Keyword)] = &[
    ("int",    Keyword::Int),
    ("bool",   Keyword::Bool),
    ("char",   Keyword::Char),
    ("static", Keyword::Static),
    ("if",     Keyword::If),
    ("then",   Keyword::Then),
    ("else",   Keyword::Else),
    ("while",  Keyword::While),
    ("do",     Keyword::Do),
    ("for",    Keyword::For),
    ("to",     Keyword::To),
    ("by",     Keyword::By),
    ("return", Keyword::Return),
    ("break",  Keyword::Break),
    ("and",    Keyword::And),
    ("or",     Keyword::Or),
    ("not",    Keyword::Not),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let string = KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map(|&(name, _)| name)
            .unwrap_or("?");

        fmt.write_str(string)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Máquina de estados para análisis sintáctico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<S: Iterator> {
    source: std::iter::Peekable<S>,
    state: State,
    start: Location,
    next: Location,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de error.
    Error,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Operador de uno o dos caracteres. Si el siguiente carácter
    /// no lo extiende, se emite el token incluido.
    Pending(Token),

    /// Se encontró `/`: división, `/=` o inicio de comentario.
    Slash,

    /// Se encontró `!`, que solo es válido como parte de `!=`.
    Bang,

    /// Se encontró `:`, posible inicio de `:>:` o `:<:`.
    Colon,

    /// Se encontró `:>` o `:<`. Debe seguir `:`.
    MinMax(Token),

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    LineComment,

    /// Comentario de bloque con su nivel de anidamiento y el último
    /// carácter relevante (`/` o `*`) observado.
    BlockComment { depth: u32, last: Option<char> },

    /// Constante entera.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(i32),

    /// Término que puede ser un identificador, palabra clave o
    /// constante booleana.
    Word(String),

    /// Tras `'`, se espera el contenido de la constante.
    CharOpen,

    /// Tras `'\`.
    CharEscape,

    /// Contenido leído, se espera `'`.
    CharClose(char),

    /// Cuerpo de cadena literal.
    Str(String),

    /// Tras `\` en una cadena.
    StrEscape(String),
}

impl<S: InputStream> Lexer<S> {
    /// Crea un lexer en estado inicial a partir de un flujo.
    pub fn new(start: Location, source: S) -> Self {
        let next = start.clone();
        Lexer {
            source: source.peekable(),
            state: State::Start,
            start,
            next,
        }
    }

    /// Reduce la entrada a sea una secuencia conocida de tokens
    /// infalibles o una secuencia de errores.
    ///
    /// En caso de que ocurra al menos un error, el lexer dejará
    /// de buscar tokens exitosos y comenzará a acumular solamente
    /// errores. El propósito de esta función es permitir la
    /// recolección de múltiples errores léxicos en una misma ejecución
    /// del compilador.
    pub fn try_exhaustive(mut self) -> Result<Vec<Located<Token>>, Vec<Located<LexerError>>> {
        let mut tokens = Vec::new();

        while let Some(result) = self.next() {
            match result {
                Ok(token) => tokens.push(token),
                Err(error) => {
                    drop(tokens);

                    let mut errors = vec![error];
                    errors.extend(self.filter_map(Result::err));

                    return Err(errors);
                }
            }
        }

        Ok(tokens)
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<(Token, Location)>, LexerError> {
        use {State::*, Token::*};

        let mut last_accepted = self.start.clone();
        let token = loop {
            // Se espera un siguiente carácter, fallando si hay error de E/S
            let next_char = match self.source.peek() {
                None => None,
                Some(Ok((c, _))) => Some(*c),
                Some(Err(_)) => match self.source.next() {
                    Some(Err(error)) => break Err(error.into()),
                    _ => None,
                },
            };

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next.clone();
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Condiciones de error: se descarta la línea donde
                // ocurrió el error. Al llegar al final de la línea
                // el lexer se recupera y reinicia.
                (Error, None) => return Ok(None),
                (Error, Some('\n')) => self.state = Start,
                (Error, Some(_)) => (),

                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some(',')) => self.state = Complete(Comma),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('%')) => self.state = Complete(Percent),
                (Start, Some('?')) => self.state = Complete(Question),

                // Operadores que pueden extenderse con un segundo carácter
                (Start, Some('+')) => self.state = Pending(Plus),
                (Start, Some('-')) => self.state = Pending(Minus),
                (Start, Some('*')) => self.state = Pending(Times),
                (Start, Some('=')) => self.state = Pending(Assign),
                (Start, Some('<')) => self.state = Pending(Less),
                (Start, Some('>')) => self.state = Pending(Greater),
                (Start, Some('/')) => self.state = Slash,
                (Start, Some('!')) => self.state = Bang,
                (Start, Some(':')) => self.state = State::Colon,

                // Literales de carácter y de cadena
                (Start, Some('\'')) => self.state = CharOpen,
                (Start, Some('"')) => self.state = Str(String::new()),

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() || c == '_' => {
                    self.state = Word(c.to_string())
                }

                // Inicio de una constante numérica. No se consume
                // el entero, ya que esta lógica ya está implementada
                // en el respectivo caso para un estado de constante
                // entera para el cual el siguiente carácter es un
                // dígito. Por tanto, la constante es inicialmente cero.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(0);
                    continue;
                }

                // Espacios en blanco y caracteres inesperados
                (Start, Some(c)) if c.is_whitespace() => (),
                (Start, Some(c)) => break Err(LexerError::BadChar(c)),

                // Emisión retardada de tokens cualesquiera
                (Complete(value), _) => break Ok(std::mem::replace(value, Plus)),

                // Operadores de dos caracteres
                (Pending(Plus), Some('+')) => self.state = Complete(Increment),
                (Pending(Plus), Some('=')) => self.state = Complete(AddAssign),
                (Pending(Minus), Some('-')) => self.state = Complete(Decrement),
                (Pending(Minus), Some('=')) => self.state = Complete(SubAssign),
                (Pending(Times), Some('=')) => self.state = Complete(MulAssign),
                (Pending(Assign), Some('=')) => self.state = Complete(Equal),
                (Pending(Less), Some('=')) => self.state = Complete(LessOrEqual),
                (Pending(Greater), Some('=')) => self.state = Complete(GreaterOrEqual),
                (Pending(token), _) => break Ok(std::mem::replace(token, Plus)),

                (Bang, Some('=')) => self.state = Complete(NotEqual),
                (Bang, _) => break Err(LexerError::Expected('=')),

                // `/` puede ser división, `/=` o iniciar un comentario
                (Slash, Some('/')) => self.state = LineComment,
                (Slash, Some('*')) => {
                    self.state = BlockComment {
                        depth: 1,
                        last: None,
                    }
                }
                (Slash, Some('=')) => self.state = Complete(DivAssign),
                (Slash, _) => break Ok(Divide),

                (State::Colon, Some('>')) => self.state = MinMax(Max),
                (State::Colon, Some('<')) => self.state = MinMax(Min),
                (State::Colon, _) => break Ok(Token::Colon),

                (MinMax(token), Some(':')) => {
                    let token = std::mem::replace(token, Plus);
                    self.state = Complete(token);
                }
                (MinMax(_), _) => break Err(LexerError::Expected(':')),

                // Los comentarios de línea descartan la línea donde ocurren
                (LineComment, Some('\n')) => self.state = Start,
                (LineComment, Some(_)) => (),
                (LineComment, None) => self.state = Start,

                // Comentarios de bloque, posiblemente anidados
                (BlockComment { .. }, None) => break Err(LexerError::UnterminatedComment),
                (BlockComment { depth, last }, Some(c)) => match (*last, c) {
                    (Some('/'), '*') => {
                        *depth += 1;
                        *last = None;
                    }

                    (Some('*'), '/') if *depth == 1 => self.state = Start,
                    (Some('*'), '/') => {
                        *depth -= 1;
                        *last = None;
                    }

                    (_, '/') | (_, '*') => *last = Some(c),
                    _ => *last = None,
                },

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = digit as i32 - '0' as i32;

                    match accumulated
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(result) => *accumulated = result,
                        None => break Err(LexerError::IntOverflow),
                    }
                }

                // Si sigue algo que no es un dígito, la constante a terminado
                (Integer(integer), _) => break Ok(IntLiteral(*integer)),

                // Extensión de términos
                (Word(word), Some(c)) if is_word_char(c) => {
                    word.push(c);
                }

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => match word.as_str() {
                    "true" => break Ok(BoolLiteral(true)),
                    "false" => break Ok(BoolLiteral(false)),
                    word => match self::Keyword::from_str(word) {
                        Ok(keyword) => break Ok(Keyword(keyword)),
                        Err(()) => break Ok(Id(Identifier::from(word))),
                    },
                },

                // Constantes de carácter
                (CharOpen, Some('\\')) => self.state = CharEscape,
                (CharOpen, Some('\'')) => break Err(LexerError::EmptyChar),
                (CharOpen, Some('\n')) | (CharOpen, None) => break Err(LexerError::Expected('\'')),
                (CharOpen, Some(c)) => self.state = CharClose(c),

                (CharEscape, Some(c)) => match escape(c) {
                    Some(c) => self.state = CharClose(c),
                    None => break Err(LexerError::BadEscape(c)),
                },
                (CharEscape, None) => break Err(LexerError::Expected('\'')),

                (CharClose(c), Some('\'')) => {
                    let c = *c;
                    self.state = Complete(CharLiteral(c));
                }
                (CharClose(_), _) => break Err(LexerError::Expected('\'')),

                // Cadenas literales, que no pueden cruzar líneas
                (Str(string), Some('"')) => {
                    let string = std::mem::take(string);
                    self.state = Complete(StrLiteral(string.into()));
                }
                (Str(string), Some('\\')) => {
                    let string = std::mem::take(string);
                    self.state = StrEscape(string);
                }
                (Str(_), Some('\n')) | (Str(_), None) => break Err(LexerError::UnterminatedString),
                (Str(string), Some(c)) => string.push(c),

                (StrEscape(string), Some(c)) => match escape(c) {
                    Some(c) => {
                        let mut string = std::mem::take(string);
                        string.push(c);
                        self.state = Str(string);
                    }

                    None => break Err(LexerError::BadEscape(c)),
                },
                (StrEscape(_), None) => break Err(LexerError::UnterminatedString),
            }

            // Si no hubo `continue`, aquí se consume el carácter que
            // se observó con lookahead anteriormente
            if let Some(Ok((_, next_position))) = self.source.next() {
                last_accepted = std::mem::replace(&mut self.next, next_position);
            }
        };

        token.map(|token| Some((token, last_accepted)))
    }
}

impl<S: InputStream> Iterator for Lexer<S> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.lex() {
            Ok(None) => None,
            Ok(Some((token, last_accepted))) => {
                self.state = State::Start;

                let location = Location::span(self.start.clone(), &last_accepted);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => {
                self.state = State::Error;
                Some(Err(Located::at(error, self.next.clone())))
            }
        }
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Resuelve el carácter que sigue a `\` en una secuencia de escape.
fn escape(c: char) -> Option<char> {
    match c {
        'n' => Some('\n'),
        't' => Some('\t'),
        '0' => Some('\0'),
        '\\' | '\'' | '"' => Some(c),
        _ => None,
    }
}

/// Flujo de tokens con lookahead arbitrario.
///
/// El analizador sintáctico decide entre producciones observando
/// hasta algunos tokens adelante sin consumirlos.
pub struct TokenStream<I: Iterator<Item = Located<Token>>> {
    tokens: I,
    buffer: VecDeque<Located<Token>>,
}

impl<I: Iterator<Item = Located<Token>>> TokenStream<I> {
    pub fn new<T>(tokens: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        TokenStream {
            tokens: tokens.into_iter(),
            buffer: VecDeque::new(),
        }
    }

    /// Observa el `k`-ésimo token siguiente sin consumirlo, iniciando en 1.
    pub fn peek(&mut self, k: usize) -> Option<&Located<Token>> {
        debug_assert!(k > 0, "lookahead starts at 1");

        while self.buffer.len() < k {
            let token = self.tokens.next()?;
            self.buffer.push_back(token);
        }

        self.buffer.get(k - 1)
    }
}

impl<I: Iterator<Item = Located<Token>>> Iterator for TokenStream<I> {
    type Item = Located<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.pop_front().or_else(|| self.tokens.next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    fn lex(source: &str) -> Result<Vec<Token>, Vec<LexerError>> {
        let (start, chars) = source::chars(source.as_bytes(), "test.cm");
        Lexer::new(start, chars)
            .try_exhaustive()
            .map(|tokens| tokens.into_iter().map(Located::into_inner).collect())
            .map_err(|errors| errors.into_iter().map(Located::into_inner).collect())
    }

    fn id(name: &str) -> Token {
        Token::Id(Identifier::from(name))
    }

    #[test]
    fn declarations_and_keywords() {
        use Token::*;

        let tokens = lex("static int count : 10;\nbool _flag[3];").unwrap();
        assert_eq!(
            tokens,
            vec![
                Keyword(self::Keyword::Static),
                Keyword(self::Keyword::Int),
                id("count"),
                Colon,
                IntLiteral(10),
                Semicolon,
                Keyword(self::Keyword::Bool),
                id("_flag"),
                OpenSquare,
                IntLiteral(3),
                CloseSquare,
                Semicolon,
            ]
        );
    }

    #[test]
    fn case_sensitive_words() {
        let tokens = lex("If true False").unwrap();
        assert_eq!(tokens, vec![id("If"), Token::BoolLiteral(true), id("False")]);
    }

    #[test]
    fn operators_use_longest_match() {
        use Token::*;

        let tokens = lex("a+=b++ - -c:>:d:<:e != f<=g>h ==i?j%k/=l/m").unwrap();
        assert_eq!(
            tokens,
            vec![
                id("a"),
                AddAssign,
                id("b"),
                Increment,
                Minus,
                Minus,
                id("c"),
                Max,
                id("d"),
                Min,
                id("e"),
                NotEqual,
                id("f"),
                LessOrEqual,
                id("g"),
                Greater,
                id("h"),
                Equal,
                id("i"),
                Question,
                id("j"),
                Percent,
                id("k"),
                DivAssign,
                id("l"),
                Divide,
                id("m"),
            ]
        );
    }

    #[test]
    fn literals_resolve_escapes() {
        use Token::*;

        let tokens = lex(r#"'a' '\n' '\'' "x = {0}\n\t\"q\"""#).unwrap();
        assert_eq!(
            tokens,
            vec![
                CharLiteral('a'),
                CharLiteral('\n'),
                CharLiteral('\''),
                StrLiteral("x = {0}\n\t\"q\"".into()),
            ]
        );
    }

    #[test]
    fn comments_nest() {
        let tokens = lex("a /* x /* y */ z */ b // c\nd").unwrap();
        assert_eq!(tokens, vec![id("a"), id("b"), id("d")]);
    }

    #[test]
    fn errors_are_collected_per_line() {
        let errors = lex("int @x;\nint y = 99999999999;\nchar c = '';\n\"open").unwrap_err();

        assert!(matches!(
            errors.as_slice(),
            [
                LexerError::BadChar('@'),
                LexerError::IntOverflow,
                LexerError::EmptyChar,
                LexerError::UnterminatedString,
            ]
        ));
    }

    #[test]
    fn unterminated_comment() {
        let errors = lex("/* /* */").unwrap_err();
        assert!(matches!(errors.as_slice(), [LexerError::UnterminatedComment]));
    }

    #[test]
    fn locations_are_tracked() {
        let (start, chars) = source::chars("int\n  x;".as_bytes(), "test.cm");
        let tokens = Lexer::new(start, chars).try_exhaustive().unwrap();

        let x = tokens[1].location();
        assert_eq!((x.start().line(), x.start().column()), (2, 3));
    }

    #[test]
    fn stream_lookahead() {
        let (start, chars) = source::chars("f ( x )".as_bytes(), "test.cm");
        let tokens = Lexer::new(start, chars).try_exhaustive().unwrap();
        let mut stream = TokenStream::new(tokens);

        assert_eq!(stream.peek(2).map(Located::val), Some(&Token::OpenParen));
        assert_eq!(stream.peek(1).map(Located::val), Some(&id("f")));
        assert_eq!(stream.next().map(Located::into_inner), Some(id("f")));
        assert_eq!(stream.peek(3).map(Located::val), Some(&Token::CloseParen));
        assert!(stream.peek(4).is_none());
        assert_eq!(stream.count(), 3);
    }
}
