//! Tablas de símbolos.
//!
//! Las variables se resuelven a través de una cadena de ámbitos: el
//! ámbito global siempre está presente en la base y cada función,
//! bloque compuesto y ciclo `for` apila uno nuevo. La búsqueda procede
//! desde el ámbito más interno hacia afuera, por lo que una declaración
//! interna oculta a cualquier otra del mismo nombre en ámbitos externos.
//!
//! Las funciones viven en una tabla plana separada, de modo que una
//! variable y una función pueden compartir nombre.

use log::debug;
use std::collections::HashMap;

use crate::{
    lex::Identifier,
    semantic::{Semantic, SemanticError, Slot, Type},
    source::Located,
};

/// Clase de almacenamiento de una variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Storage {
    Static,
    Local,
    Argument,
    Global,
}

impl Storage {
    fn counter(self) -> usize {
        match self {
            Storage::Static => 0,
            Storage::Local => 1,
            Storage::Argument => 2,
            Storage::Global => 3,
        }
    }
}

/// Forma de una variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Shape {
    Scalar,

    /// Los parámetros arreglo no tienen longitud conocida.
    Array(Option<u32>),
}

/// Ubicación física del valor de una variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Handle {
    Field(u32),
    Local(u32),
    Argument(u32),
}

/// Una variable declarada.
#[derive(Clone, Debug)]
pub struct Symbol {
    pub ty: Type,
    pub storage: Storage,

    /// Orden de declaración dentro de su clase de almacenamiento y ámbito.
    pub index: u32,
    pub shape: Shape,
    pub handle: Handle,
}

impl Symbol {
    pub fn is_array(&self) -> bool {
        matches!(self.shape, Shape::Array(_))
    }
}

#[derive(Default)]
struct Frame {
    symbols: HashMap<Identifier, Symbol>,
    counters: [u32; 4],
}

/// Cadena de ámbitos léxicos.
pub struct ScopeChain {
    frames: Vec<Frame>,
}

impl Default for ScopeChain {
    fn default() -> Self {
        ScopeChain {
            frames: vec![Frame::default()],
        }
    }
}

impl ScopeChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abre un ámbito anidado.
    pub fn push(&mut self) {
        self.frames.push(Frame::default());
        debug!("Entering scope at depth {}", self.depth());
    }

    /// Cierra el ámbito más interno. El ámbito global nunca se cierra.
    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            debug!("Leaving scope at depth {}", self.depth());
            self.frames.pop();
        }
    }

    /// Cantidad de ámbitos anidados sobre el global.
    pub fn depth(&self) -> usize {
        self.frames.len() - 1
    }

    pub fn is_global(&self) -> bool {
        self.frames.len() == 1
    }

    /// Cantidad de variables de una clase ya declaradas en el ámbito actual.
    pub fn count(&self, storage: Storage) -> u32 {
        self.innermost().counters[storage.counter()]
    }

    /// Declara una variable en el ámbito más interno.
    ///
    /// Falla si el mismo nombre ya existe en este ámbito; ocultar
    /// nombres de ámbitos externos está permitido.
    pub fn define(
        &mut self,
        name: &Located<Identifier>,
        ty: Type,
        storage: Storage,
        shape: Shape,
        handle: Handle,
    ) -> Semantic<&Symbol> {
        let depth = self.depth();
        let frame = self.innermost_mut();

        if frame.symbols.contains_key(name.val()) {
            let error = SemanticError::Redefinition(name.val().clone());
            return Err(Located::at(error, name.location().clone()));
        }

        let counter = &mut frame.counters[storage.counter()];
        let index = *counter;
        *counter += 1;

        debug!(
            "Defined {:?} `{}`: {} {:?} at depth {} as {:?}",
            storage,
            name.val(),
            ty,
            shape,
            depth,
            handle
        );

        let symbol = Symbol {
            ty,
            storage,
            index,
            shape,
            handle,
        };

        Ok(frame.symbols.entry(name.val().clone()).or_insert(symbol))
    }

    /// Busca un nombre desde el ámbito más interno hacia afuera.
    pub fn lookup(&self, name: &Identifier) -> Option<&Symbol> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.symbols.get(name))
    }

    /// Como [`ScopeChain::lookup()`], pero falla si no existe.
    pub fn resolve(&self, name: &Located<Identifier>) -> Semantic<&Symbol> {
        self.lookup(name.val()).ok_or_else(|| {
            Located::at(
                SemanticError::Undeclared(name.val().clone()),
                name.location().clone(),
            )
        })
    }

    fn innermost(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn innermost_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

/// Funciones preconstruidas, que se reducen a instrucciones dedicadas.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Intrinsic {
    Print,
    Put,
}

/// Implementación de una función.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Intrinsic(Intrinsic),

    /// Índice de rutina en la imagen.
    Routine(u32),
}

/// Firma de una función.
#[derive(Clone, Debug)]
pub struct FunctionSymbol {
    pub params: Vec<Slot>,
    pub returns: Option<Type>,
    pub body: Body,
}

/// Tabla plana de funciones.
pub struct FunctionTable {
    functions: HashMap<Identifier, FunctionSymbol>,
}

impl Default for FunctionTable {
    fn default() -> Self {
        let mut functions = HashMap::new();
        for (name, intrinsic) in [("print", Intrinsic::Print), ("put", Intrinsic::Put)] {
            let symbol = FunctionSymbol {
                params: Vec::new(),
                returns: None,
                body: Body::Intrinsic(intrinsic),
            };

            functions.insert(Identifier::from(name), symbol);
        }

        FunctionTable { functions }
    }
}

impl FunctionTable {
    /// Crea una tabla que ya contiene a `print` y `put`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, name: &Located<Identifier>, symbol: FunctionSymbol) -> Semantic<()> {
        if self.functions.contains_key(name.val()) {
            let error = SemanticError::FunctionRedefinition(name.val().clone());
            return Err(Located::at(error, name.location().clone()));
        }

        debug!(
            "Defined function `{}` with {} parameters as {:?}",
            name.val(),
            symbol.params.len(),
            symbol.body
        );

        self.functions.insert(name.val().clone(), symbol);
        Ok(())
    }

    pub fn lookup(&self, name: &Identifier) -> Option<&FunctionSymbol> {
        self.functions.get(name)
    }

    pub fn resolve(&self, name: &Located<Identifier>) -> Semantic<&FunctionSymbol> {
        self.lookup(name.val()).ok_or_else(|| {
            Located::at(
                SemanticError::FunctionUndeclared(name.val().clone()),
                name.location().clone(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source;

    fn located(name: &str) -> Located<Identifier> {
        let (start, _) = source::chars(&b""[..], "test.cm");
        Located::at(Identifier::from(name), start)
    }

    #[test]
    fn inner_scopes_shadow_outer() {
        let mut scopes = ScopeChain::new();
        let x = located("x");

        scopes
            .define(&x, Type::Int, Storage::Global, Shape::Scalar, Handle::Field(0))
            .unwrap();

        scopes.push();
        scopes
            .define(&x, Type::Char, Storage::Local, Shape::Array(Some(4)), Handle::Local(0))
            .unwrap();

        let inner = scopes.lookup(x.val()).unwrap();
        assert_eq!((inner.ty, inner.handle), (Type::Char, Handle::Local(0)));
        assert!(inner.is_array());

        scopes.pop();
        let outer = scopes.lookup(x.val()).unwrap();
        assert_eq!((outer.ty, outer.handle), (Type::Int, Handle::Field(0)));
    }

    #[test]
    fn redefinition_in_same_scope_fails() {
        let mut scopes = ScopeChain::new();
        let y = located("y");

        scopes.push();
        scopes
            .define(&y, Type::Int, Storage::Local, Shape::Scalar, Handle::Local(0))
            .unwrap();

        let error = scopes
            .define(&y, Type::Bool, Storage::Static, Shape::Scalar, Handle::Field(1))
            .unwrap_err();

        assert!(matches!(error.val(), SemanticError::Redefinition(_)));
    }

    #[test]
    fn counters_are_per_storage_and_scope() {
        let mut scopes = ScopeChain::new();
        scopes.push();

        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let storage = if i == 1 { Storage::Static } else { Storage::Local };
            let symbol = scopes
                .define(&located(name), Type::Int, storage, Shape::Scalar, Handle::Local(i as u32))
                .unwrap();

            assert_eq!(symbol.index, if i == 2 { 1 } else { 0 });
        }

        assert_eq!(scopes.count(Storage::Local), 2);
        assert_eq!(scopes.count(Storage::Static), 1);

        scopes.push();
        assert_eq!(scopes.count(Storage::Local), 0);
    }

    #[test]
    fn global_scope_is_never_popped() {
        let mut scopes = ScopeChain::new();
        scopes.pop();
        assert!(scopes.is_global());

        let missing = scopes.resolve(&located("nope")).unwrap_err();
        assert!(matches!(missing.val(), SemanticError::Undeclared(_)));
    }

    #[test]
    fn builtins_are_predefined() {
        let mut functions = FunctionTable::new();
        let print = functions.lookup(&Identifier::from("print")).unwrap();
        assert_eq!(print.body, Body::Intrinsic(Intrinsic::Print));

        let symbol = FunctionSymbol {
            params: Vec::new(),
            returns: None,
            body: Body::Routine(0),
        };

        let error = functions.define(&located("put"), symbol).unwrap_err();
        assert!(matches!(error.val(), SemanticError::FunctionRedefinition(_)));
    }
}
