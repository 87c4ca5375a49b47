//! Ubicaciones en el código fuente.
//!
//! Cada carácter leído, cada token y cada nodo llevan la región del
//! archivo de donde provienen. Las líneas ya leídas se conservan en el
//! [`Source`] compartido para poder citarlas en los diagnósticos.

use std::{
    cell::RefCell,
    fmt::{self, Debug, Display, Formatter},
    io::{self, BufRead, Lines},
    iter,
    ops::Range,
    rc::Rc,
    vec,
};

/// Ancho de los divisores de tabulador.
const TAB_STOP: u32 = 4;

/// Un flujo de entrada, carácter por carácter.
pub trait InputStream: Iterator<Item = io::Result<(char, Location)>> {}

impl<I> InputStream for I where I: Iterator<Item = io::Result<(char, Location)>> {}

/// Un valor junto a la región de donde proviene.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }

    pub fn val(&self) -> &T {
        &self.value
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn split(self) -> (Location, T) {
        (self.location, self.value)
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Región semiabierta `[start, end)` dentro de un archivo.
#[derive(Clone)]
pub struct Location {
    source: Rc<Source>,
    range: Range<Position>,
}

impl Location {
    /// Región que va del inicio de `from` al final de `to`, en el mismo archivo.
    pub fn span(from: Location, to: &Location) -> Self {
        Location {
            source: from.source,
            range: from.range.start..to.range.end,
        }
    }

    pub fn start(&self) -> Position {
        self.range.start
    }

    pub fn end(&self) -> Position {
        self.range.end
    }

    pub fn source(&self) -> &Source {
        &self.source
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.source.name, self.range.start)
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        let Range { start, end } = self.range;
        write!(formatter, "{}:{}..{}", self.source.name, start, end)
    }
}

/// Línea y columna, ambas desde 1.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    /// Posición que sigue a `c`.
    fn after(self, c: char) -> Position {
        let Position { line, column } = self;
        match c {
            '\n' => Position { line: line + 1, column: 1 },
            '\t' => Position {
                line,
                column: 1 + ((column - 1) / TAB_STOP + 1) * TAB_STOP,
            },
            _ => Position { line, column: column + 1 },
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

/// Nombre de un archivo y las líneas que se han leído de él.
pub struct Source {
    name: String,
    lines: RefCell<Vec<String>>,
}

impl Source {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Texto de una línea ya leída. Las líneas que aún no se han
    /// consumido se observan vacías.
    pub fn line(&self, number: u32) -> String {
        let lines = self.lines.borrow();
        number
            .checked_sub(1)
            .and_then(|index| lines.get(index as usize))
            .cloned()
            .unwrap_or_default()
    }
}

/// Caracteres de un archivo, cada uno con la ubicación del carácter
/// que le sigue. Toda línea termina en `'\n'`, incluso la última.
pub struct Chars<R> {
    lines: Lines<R>,
    source: Rc<Source>,
    pending: vec::IntoIter<char>,
    next: Position,
}

impl<R: BufRead> Iterator for Chars<R> {
    type Item = io::Result<(char, Location)>;

    fn next(&mut self) -> Option<Self::Item> {
        let c = loop {
            if let Some(c) = self.pending.next() {
                break c;
            }

            match self.lines.next()? {
                Ok(line) => {
                    let chars: Vec<_> = line.chars().chain(iter::once('\n')).collect();
                    self.pending = chars.into_iter();
                    self.source.lines.borrow_mut().push(line);
                }

                // La línea ilegible se cuenta igualmente
                Err(error) => {
                    self.source.lines.borrow_mut().push(String::new());
                    self.next = self.next.after('\n');
                    return Some(Err(error));
                }
            }
        };

        self.next = self.next.after(c);
        let location = Location {
            source: Rc::clone(&self.source),
            range: self.next..self.next.after(' '),
        };

        Some(Ok((c, location)))
    }
}

/// Abre un flujo de caracteres sobre `reader`.
///
/// La ubicación retornada corresponde al primer carácter del archivo.
pub fn chars<R, S>(reader: R, name: S) -> (Location, Chars<R>)
where
    R: BufRead,
    S: Into<String>,
{
    let source = Rc::new(Source {
        name: name.into(),
        lines: Default::default(),
    });

    let first = Position::default();
    let start = Location {
        source: Rc::clone(&source),
        range: first..first.after(' '),
    };

    let chars = Chars {
        lines: reader.lines(),
        source,
        pending: Vec::new().into_iter(),
        next: first,
    };

    (start, chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_char_points_past_itself() {
        let (start, chars) = chars(&b"ab\n\tc"[..], "test.cm");
        assert_eq!(start.start(), Position::default());

        let chars: Vec<_> = chars.map(Result::unwrap).collect();
        let text: String = chars.iter().map(|(c, _)| c).collect();
        assert_eq!(text, "ab\n\tc\n");

        let positions: Vec<_> = chars
            .iter()
            .map(|(_, location)| (location.start().line(), location.start().column()))
            .collect();

        assert_eq!(positions, [(1, 2), (1, 3), (2, 1), (2, 5), (2, 6), (3, 1)]);
    }

    #[test]
    fn read_lines_are_kept() {
        let (start, chars) = chars(&b"int x;\n  x = 1;\n"[..], "test.cm");
        assert_eq!(start.source().line(2), "");

        chars.for_each(drop);
        assert_eq!(start.source().line(2), "  x = 1;");
        assert_eq!(start.source().line(9), "");
        assert_eq!(start.source().name(), "test.cm");
    }

    #[test]
    fn spans_join_locations() {
        let (start, chars) = chars(&b"abc"[..], "test.cm");
        let last = chars.map(Result::unwrap).nth(1).map(|(_, location)| location).unwrap();

        let span = Location::span(start, &last);
        assert_eq!((span.start().column(), span.end().column()), (1, 4));
        assert_eq!(span.to_string(), "test.cm:1:1");
    }
}
