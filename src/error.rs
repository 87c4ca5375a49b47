//! Reporte de errores.
//!
//! Todo error que detiene la compilación lleva una ubicación. Los
//! diagnósticos se imprimen con la línea de código fuente afectada y
//! un subrayado de la región señalada.

use crate::{
    lex::LexerError,
    parse::CompileError,
    source::{Located, Location},
};

use std::fmt::{self, Display};

/// Fase del compilador que detectó un error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Lexical,
    Syntax,
    Semantic,
}

impl Display for Phase {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(match self {
            Phase::Lexical => "lexical error",
            Phase::Syntax => "syntax error",
            Phase::Semantic => "semantic error",
        })
    }
}

/// Un error ya convertido a texto, junto a su origen.
pub struct Diagnostic {
    pub phase: Phase,
    pub message: String,
    pub location: Location,
}

impl Diagnostic {
    /// Cita las líneas afectadas y subraya la región señalada.
    fn render(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostic {
            phase,
            message,
            location,
        } = self;

        let (start, end) = (location.start(), location.end());
        let gutter = end.line().to_string().len();

        writeln!(fmt, "{}: {}", phase, message)?;
        writeln!(fmt, "{:gutter$} --> {}", "", location, gutter = gutter - 1)?;
        writeln!(fmt, "{:gutter$} |", "", gutter = gutter)?;

        for line in start.line()..=end.line() {
            let text = location.source().line(line);
            writeln!(fmt, "{:>gutter$} | {}", line, text, gutter = gutter)?;
        }

        // El final es exclusivo; una región vacía se subraya igual
        let first = start.column().min(end.column().saturating_sub(1)).max(1);
        let last = start.column().max(end.column().saturating_sub(1));
        let width = (last - first + 1) as usize;

        writeln!(
            fmt,
            "{:gutter$} | {:indent$}{:^<width$}",
            "",
            "",
            "",
            gutter = gutter,
            indent = (first - 1) as usize,
            width = width
        )
    }
}

/// Errores que detuvieron una compilación.
#[derive(Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn push<E: Display>(&mut self, phase: Phase, error: &Located<E>) {
        self.0.push(Diagnostic {
            phase,
            message: error.val().to_string(),
            location: error.location().clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    /// Mensajes de cada error, sin ubicación.
    pub fn messages(&self) -> impl Iterator<Item = String> + '_ {
        self.iter().map(|diagnostic| diagnostic.message.clone())
    }
}

impl From<Vec<Located<LexerError>>> for Diagnostics {
    fn from(errors: Vec<Located<LexerError>>) -> Self {
        let mut diagnostics = Diagnostics::default();
        for error in &errors {
            diagnostics.push(Phase::Lexical, error);
        }

        diagnostics
    }
}

impl From<CompileError> for Diagnostics {
    fn from(error: CompileError) -> Self {
        let phase = match error {
            CompileError::Syntax(_) => Phase::Syntax,
            CompileError::Semantic(_) => Phase::Semantic,
        };

        Diagnostics(vec![Diagnostic {
            phase,
            message: error.to_string(),
            location: error.location().clone(),
        }])
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, fmt)
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in self.iter() {
            diagnostic.render(fmt)?;
            writeln!(fmt)?;
        }

        match self.len() {
            0 => writeln!(fmt, "No errors were reported"),
            1 => writeln!(fmt, "Build failed with 1 error"),
            count => writeln!(fmt, "Build failed with {} errors", count),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lex::Lexer, source};

    fn lexical(text: &str) -> Diagnostics {
        let (start, chars) = source::chars(text.as_bytes(), "test.cm");
        let errors = Lexer::new(start, chars).try_exhaustive().unwrap_err();

        Diagnostics::from(errors)
    }

    #[test]
    fn every_lexical_error_is_reported() {
        let diagnostics = lexical("int a @ 1;\nint b;\nchar c = '';\n");

        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().all(|diagnostic| diagnostic.phase == Phase::Lexical));
        assert_eq!(diagnostics.iter().map(|d| d.location.start().line()).collect::<Vec<_>>(), [1, 3]);

        let report = diagnostics.to_string();
        assert!(report.starts_with("lexical error: "), "{}", report);
        assert!(report.ends_with("Build failed with 2 errors\n"), "{}", report);
    }

    #[test]
    fn report_quotes_and_underlines() {
        let report = lexical("int a @ 1;\n").to_string();
        let lines: Vec<_> = report.lines().collect();

        assert_eq!(lines[1], " --> test.cm:1:7");
        assert_eq!(lines[2], "  |");
        assert_eq!(lines[3], "1 | int a @ 1;");
        assert_eq!(lines[4], format!("  | {}^", " ".repeat(6)));
    }
}
