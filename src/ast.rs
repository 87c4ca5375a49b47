//! Árbol de sintaxis.
//!
//! Cada nodo registra la producción que lo generó. Las hojas llevan
//! el token que las originó; los nodos interiores llevan sus hijos en
//! orden de aparición. El árbol se construye de abajo hacia arriba
//! durante el análisis sintáctico y no se modifica después de que un
//! nodo ha sido entregado a su padre.

use crate::{
    lex::{Identifier, Token},
    source::{Located, Location},
};

use std::fmt::{self, Display};

/// Producción que originó un nodo.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    Program,
    VarDecl,
    ScopedVarDecl,
    VarDeclList,
    VarDeclInit,
    VarDeclId,
    TypeSpec,
    Static,
    FunDecl,
    Parms,
    ParmTypeList,
    ParmIdList,
    ParmId,
    Brackets,
    CompoundStmt,
    LocalDecls,
    StmtList,
    ExpStmt,
    EmptyStmt,
    SelectStmt,
    WhileStmt,
    ForStmt,
    IterRange,
    ReturnStmt,
    BreakStmt,
    Expression,
    SimpleExpression,
    AndExpression,
    UnaryRelExpression,
    RelExpression,
    MinMaxExpression,
    SumExpression,
    MulExpression,
    UnaryExpression,
    Factor,
    Immutable,
    Mutable,
    Call,
    Args,
    Constant,
    Operator,
    Id,
}

/// Nodo del árbol de sintaxis.
#[derive(Clone, Debug)]
pub struct Node {
    rule: Rule,
    token: Option<Located<Token>>,
    children: Vec<Node>,
}

impl Node {
    /// Crea un nodo interior aún sin hijos.
    pub fn new(rule: Rule) -> Self {
        Node {
            rule,
            token: None,
            children: Vec::new(),
        }
    }

    /// Crea una hoja.
    pub fn leaf(rule: Rule, token: Located<Token>) -> Self {
        Node {
            rule,
            token: Some(token),
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: Node) {
        self.children.push(child);
    }

    /// Absorbe los hijos de una cola de lista. Las producciones de
    /// lista recursivas por la derecha quedan aplanadas en su padre.
    pub fn absorb(&mut self, tail: Node) {
        self.children.extend(tail.children);
    }

    pub fn rule(&self) -> Rule {
        self.rule
    }

    pub fn token(&self) -> Option<&Located<Token>> {
        self.token.as_ref()
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children.get(index)
    }

    /// Primer hijo con una producción dada.
    pub fn find(&self, rule: Rule) -> Option<&Node> {
        self.children.iter().find(|child| child.rule == rule)
    }

    /// Identificador de una hoja [`Rule::Id`].
    pub fn identifier(&self) -> Option<Located<Identifier>> {
        match self.token.as_ref().map(|token| (token.location(), token.val())) {
            Some((location, Token::Id(id))) => Some(Located::at(id.clone(), location.clone())),
            _ => None,
        }
    }

    /// Rango de ubicaciones que cubren las hojas de este subárbol.
    pub fn location(&self) -> Option<Location> {
        let first = self.first_leaf()?.location().clone();
        let last = self.last_leaf()?.location();

        Some(Location::span(first, last))
    }

    /// Desciende por una cadena de nodos de un solo hijo hasta llegar
    /// a un [`Rule::Mutable`]. Esto identifica expresiones que pueden
    /// aparecer a la izquierda de una asignación.
    pub fn as_mutable(&self) -> Option<&Node> {
        let mut node = self;
        loop {
            match (node.rule, node.children.as_slice()) {
                (Rule::Mutable, _) => break Some(node),
                (Rule::Immutable, _) => break None,
                (_, [only]) => node = only,
                _ => break None,
            }
        }
    }

    fn first_leaf(&self) -> Option<&Located<Token>> {
        self.token
            .as_ref()
            .or_else(|| self.children.iter().find_map(Node::first_leaf))
    }

    fn last_leaf(&self) -> Option<&Located<Token>> {
        self.token
            .as_ref()
            .or_else(|| self.children.iter().rev().find_map(Node::last_leaf))
    }

    fn write_indented(&self, fmt: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(fmt, "{:indent$}{:?}", "", self.rule, indent = depth * 2)?;
        match &self.token {
            Some(token) => writeln!(fmt, " {} @ {}", token.val(), token.location())?,
            None => writeln!(fmt)?,
        }

        for child in &self.children {
            child.write_indented(fmt, depth + 1)?;
        }

        Ok(())
    }
}

impl Display for Node {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(fmt, 0)
    }
}
