//! Generación de código.
//!
//! El generador recibe subárboles del analizador sintáctico en cuanto
//! cada construcción queda reconocida, verifica tipos y ámbitos y
//! emite instrucciones de inmediato. Existen dos flujos de salida:
//!
//! - El inicializador, donde se asignan arreglos globales y `static`
//!   y se evalúan sus inicializadores. Se ejecuta una sola vez antes
//!   del punto de entrada.
//! - El flujo de la función en compilación, que se reinicia con cada
//!   nueva función.
//!
//! Cada operación de emisión recibe explícitamente el [`Target`] al
//! que escribe. Al finalizar, [`Generator::finish()`] ensambla la
//! [`Image`] completa.

use log::{debug, trace, warn};
use runtime::{Code, Field, Image, ImageFlags, Instruction, Label, Routine};

use crate::{
    ast::{Node, Rule},
    lex::{Identifier, Token},
    semantic::{self, ExprType, Semantic, SemanticError, Slot, Type},
    source::{Located, Location},
    symbol::{Body, FunctionSymbol, FunctionTable, Handle, ScopeChain, Shape, Storage, Symbol},
    Options,
};

mod builtin;
mod expr;

pub mod listing;

/// Flujo de instrucciones destino de una emisión.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Target {
    Initializer,
    Function,
}

/// Etiquetas de un ciclo en compilación.
#[derive(Copy, Clone, Debug)]
pub struct Loop {
    top: Label,
    condition: Label,
    exit: Label,
}

/// Un ciclo `for` en compilación.
#[derive(Copy, Clone, Debug)]
pub struct ForLoop {
    variable: u32,
    labels: Loop,
}

#[derive(Default)]
struct Stream {
    instructions: Vec<Instruction>,
    labels: Vec<Option<u32>>,
}

impl Stream {
    fn define_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() as u32 - 1)
    }

    fn mark_label(&mut self, Label(label): Label) {
        let here = self.instructions.len() as u32;
        if let Some(slot) = self.labels.get_mut(label as usize) {
            *slot = Some(here);
        }
    }

    fn into_code(self) -> Code {
        // Una etiqueta nunca marcada salta al final del flujo
        let end = self.instructions.len() as u32;
        let labels = self
            .labels
            .into_iter()
            .map(|target| target.unwrap_or(end))
            .collect();

        Code {
            instructions: self.instructions,
            labels,
        }
    }
}

/// Función en compilación.
struct Function {
    name: Located<Identifier>,
    params: Vec<Slot>,
    returns: Option<Type>,
    locals: u32,
}

/// Generador de código de una sola pasada.
pub struct Generator {
    pub scopes: ScopeChain,
    pub functions: FunctionTable,
    options: Options,
    origin: Location,
    fields: Vec<Field>,
    initializer: Stream,
    function: Stream,
    routines: Vec<Routine>,
    current: Option<Function>,
    loops: Vec<Label>,
}

impl Generator {
    /// Crea un generador. `origin` es la ubicación de respaldo para
    /// errores sobre nodos sin hojas.
    pub fn new(origin: Location, options: Options) -> Self {
        Generator {
            scopes: ScopeChain::new(),
            functions: FunctionTable::new(),
            options,
            origin,
            fields: Vec::new(),
            initializer: Stream::default(),
            function: Stream::default(),
            routines: Vec::new(),
            current: None,
            loops: Vec::new(),
        }
    }

    /// Declara las variables de una [`Rule::VarDecl`] global.
    pub fn declare_globals(&mut self, var_decl: &Node) -> Semantic<()> {
        self.declare_all(var_decl, false)
    }

    /// Declara las variables de una [`Rule::ScopedVarDecl`].
    pub fn declare_locals(&mut self, scoped_var_decl: &Node) -> Semantic<()> {
        let is_static = scoped_var_decl.find(Rule::Static).is_some();
        self.declare_all(scoped_var_decl, is_static)
    }

    /// Declara los parámetros de un grupo [`Rule::ParmTypeList`] en el
    /// ámbito actual, que debe ser el de la función.
    pub fn define_parameters(&mut self, parm_type_list: &Node) -> Semantic<()> {
        for (name, slot) in semantic::parameter_group(parm_type_list) {
            let index = self.scopes.count(Storage::Argument);
            let shape = match slot.array {
                true => Shape::Array(None),
                false => Shape::Scalar,
            };

            self.scopes
                .define(&name, slot.ty, Storage::Argument, shape, Handle::Argument(index))?;
        }

        Ok(())
    }

    /// Registra una función y dirige la emisión a su cuerpo.
    ///
    /// La función anterior, si existe, recibe su retorno implícito y
    /// queda finalizada.
    pub fn begin_function(&mut self, name: &Located<Identifier>, fun_decl: &Node) -> Semantic<()> {
        self.finish_function();

        let returns = semantic::function_type(fun_decl);
        let params = semantic::parameter_types(fun_decl);
        let routine = self.routines.len() as u32;

        let symbol = FunctionSymbol {
            params: params.clone(),
            returns,
            body: Body::Routine(routine),
        };

        self.functions.define(name, symbol)?;

        if *name.val() == Identifier::from("main") && !params.is_empty() {
            warn!("{}: `main` takes parameters, they will be zero or empty", name.location());
        }

        debug!("Compiling function `{}` as routine {}", name.val(), routine);

        self.current = Some(Function {
            name: name.clone(),
            params,
            returns,
            locals: 0,
        });

        self.loops.clear();
        Ok(())
    }

    /// Ensambla la imagen final.
    ///
    /// La rutina de entrada es `main` si existe; de lo contrario se
    /// sintetiza una rutina vacía.
    pub fn finish(mut self) -> Image {
        self.finish_function();
        self.emit(Target::Initializer, Instruction::Return);

        let main = self.functions.lookup(&Identifier::from("main")).map(|main| main.body);
        let (entry, flags) = match main {
            Some(Body::Routine(routine)) => (routine, ImageFlags::USER_ENTRY),
            _ => {
                debug!("No `main` defined, synthesizing an empty entry point");

                self.routines.push(Routine {
                    name: String::from("Main"),
                    params: Vec::new(),
                    returns: None,
                    locals: 0,
                    code: Code {
                        instructions: vec![Instruction::Return],
                        labels: Vec::new(),
                    },
                });

                (self.routines.len() as u32 - 1, ImageFlags::empty())
            }
        };

        Image {
            flags,
            fields: self.fields,
            initializer: self.initializer.into_code(),
            routines: self.routines,
            entry,
        }
    }

    /// Sentencia de expresión. Un valor sobrante se descarta.
    pub fn expression_statement(&mut self, expression: &Node) -> Semantic<()> {
        if self.compile_expression(expression, Target::Function)?.has_value() {
            self.emit(Target::Function, Instruction::Pop);
        }

        Ok(())
    }

    /// Evalúa la condición de un `if` y salta a la etiqueta retornada
    /// si es falsa.
    pub fn begin_if(&mut self, condition: &Node) -> Semantic<Label> {
        self.condition(condition)?;

        let otherwise = self.define_label(Target::Function);
        self.emit(Target::Function, Instruction::JumpIfFalse(otherwise));

        Ok(otherwise)
    }

    /// Cierra la rama verdadera e inicia la rama `else`.
    pub fn begin_else(&mut self, otherwise: Label) -> Label {
        let end = self.define_label(Target::Function);
        self.emit(Target::Function, Instruction::Jump(end));
        self.mark_label(Target::Function, otherwise);

        end
    }

    pub fn end_if(&mut self, label: Label) {
        self.mark_label(Target::Function, label);
    }

    /// Inicia un `while`. La condición se emite después del cuerpo.
    pub fn begin_while(&mut self) -> Loop {
        let labels = self.begin_loop();
        self.emit(Target::Function, Instruction::Jump(labels.condition));
        self.mark_label(Target::Function, labels.top);

        labels
    }

    pub fn end_while(&mut self, labels: Loop, condition: &Node) -> Semantic<()> {
        self.mark_label(Target::Function, labels.condition);
        self.condition(condition)?;
        self.emit(Target::Function, Instruction::JumpIfTrue(labels.top));

        self.end_loop(labels);
        Ok(())
    }

    /// Inicia un `for`: abre un ámbito con la variable de control, la
    /// inicializa y salta a la prueba de límite.
    pub fn begin_for(&mut self, variable: &Located<Identifier>, range: &Node) -> Semantic<ForLoop> {
        let start = self.part(range, 0)?;
        if range.child(1).is_none() {
            return self.error(range, SemanticError::MissingBound);
        }

        self.scopes.push();

        let slot = self.allocate_local();
        self.scopes
            .define(variable, Type::Int, Storage::Local, Shape::Scalar, Handle::Local(slot))?;

        self.int_operand(start, Target::Function)?;
        self.emit(Target::Function, Instruction::StoreLocal(slot));

        let labels = self.begin_loop();
        self.emit(Target::Function, Instruction::Jump(labels.condition));
        self.mark_label(Target::Function, labels.top);

        Ok(ForLoop {
            variable: slot,
            labels,
        })
    }

    /// Cierra un `for`: incremento, prueba `variable <= límite` y
    /// salto al inicio del cuerpo.
    pub fn end_for(&mut self, for_loop: ForLoop, range: &Node) -> Semantic<()> {
        use Instruction::*;

        let ForLoop { variable, labels } = for_loop;

        self.emit(Target::Function, LoadLocal(variable));
        match range.child(2) {
            Some(step) => self.int_operand(step, Target::Function)?,
            None => self.emit(Target::Function, PushInt(1)),
        }

        self.emit(Target::Function, Add);
        self.emit(Target::Function, StoreLocal(variable));

        self.mark_label(Target::Function, labels.condition);
        self.emit(Target::Function, LoadLocal(variable));
        let bound = self.part(range, 1)?;
        self.int_operand(bound, Target::Function)?;

        for instruction in [Gt, PushInt(0), Eq, JumpIfTrue(labels.top)] {
            self.emit(Target::Function, instruction);
        }

        self.end_loop(labels);
        self.scopes.pop();

        Ok(())
    }

    pub fn return_statement(&mut self, value: Option<&Node>, location: &Location) -> Semantic<()> {
        let (name, returns) = match &self.current {
            Some(function) => (function.name.val().clone(), function.returns),
            None => return Err(Located::at(SemanticError::Malformed(Rule::ReturnStmt), location.clone())),
        };

        match (value, returns) {
            (Some(value), Some(ty)) => {
                let found = self.compile_expression(value, Target::Function)?;
                self.expect_type(value, ExprType::Scalar(ty), found)?;
            }

            (Some(value), None) => return self.error(value, SemanticError::ReturnInVoid(name)),

            (None, Some(ty)) => {
                let error = SemanticError::MissingReturnValue(name, ty);
                return Err(Located::at(error, location.clone()));
            }

            (None, None) => (),
        }

        self.emit(Target::Function, Instruction::Return);
        Ok(())
    }

    /// `break` salta a la salida del ciclo más interno.
    pub fn break_statement(&mut self, location: &Location) -> Semantic<()> {
        match self.loops.last() {
            Some(&exit) => {
                self.emit(Target::Function, Instruction::Jump(exit));
                Ok(())
            }

            None => Err(Located::at(SemanticError::BreakOutsideLoop, location.clone())),
        }
    }

    fn emit(&mut self, target: Target, instruction: Instruction) {
        trace!("{:?} <- {:?}", target, instruction);
        self.stream(target).instructions.push(instruction);
    }

    fn define_label(&mut self, target: Target) -> Label {
        self.stream(target).define_label()
    }

    fn mark_label(&mut self, target: Target, label: Label) {
        self.stream(target).mark_label(label);
    }

    fn stream(&mut self, target: Target) -> &mut Stream {
        match target {
            Target::Initializer => &mut self.initializer,
            Target::Function => &mut self.function,
        }
    }

    fn begin_loop(&mut self) -> Loop {
        let labels = Loop {
            top: self.define_label(Target::Function),
            condition: self.define_label(Target::Function),
            exit: self.define_label(Target::Function),
        };

        self.loops.push(labels.exit);
        labels
    }

    fn end_loop(&mut self, labels: Loop) {
        self.mark_label(Target::Function, labels.exit);
        self.loops.pop();
    }

    /// Agrega el retorno implícito de la función actual y la archiva.
    fn finish_function(&mut self) {
        let function = match self.current.take() {
            Some(function) => function,
            None => return,
        };

        match function.returns {
            Some(Type::Char) => self.emit(Target::Function, Instruction::PushInt('.' as i32)),
            Some(_) => self.emit(Target::Function, Instruction::PushInt(0)),
            None => (),
        }

        self.emit(Target::Function, Instruction::Return);

        let code = std::mem::take(&mut self.function).into_code();
        debug!(
            "Finished `{}`: {} instructions, {} locals",
            function.name.val(),
            code.instructions.len(),
            function.locals
        );

        self.routines.push(Routine {
            name: function.name.val().to_string(),
            params: function.params,
            returns: function.returns,
            locals: function.locals,
            code,
        });
    }

    fn allocate_local(&mut self) -> u32 {
        match &mut self.current {
            Some(function) => {
                function.locals += 1;
                function.locals - 1
            }

            None => 0,
        }
    }

    fn add_field(&mut self, name: String, slot: Slot) -> u32 {
        self.fields.push(Field { name, slot });
        self.fields.len() as u32 - 1
    }

    fn declare_all(&mut self, decl: &Node, is_static: bool) -> Semantic<()> {
        let ty = semantic::declared_type(self.find(decl, Rule::TypeSpec)?);
        let list = self.find(decl, Rule::VarDeclList)?;

        for var_decl_init in list.children() {
            self.declare(ty, is_static, var_decl_init)?;
        }

        Ok(())
    }

    /// Declara una variable, asigna su almacenamiento y compila su
    /// inicializador. Un arreglo con inicializador evalúa la expresión
    /// una vez por cada elemento.
    fn declare(&mut self, ty: Type, is_static: bool, var_decl_init: &Node) -> Semantic<()> {
        use Instruction::*;

        let var_decl_id = self.find(var_decl_init, Rule::VarDeclId)?;
        let name = self.name(var_decl_id)?;

        let shape = match var_decl_id.find(Rule::Constant).and_then(Node::token).map(Located::val) {
            Some(Token::IntLiteral(0)) => return self.error(var_decl_id, SemanticError::ArraySize),
            Some(&Token::IntLiteral(length)) => Shape::Array(Some(length as u32)),
            _ => Shape::Scalar,
        };

        let slot = Slot {
            ty,
            array: shape != Shape::Scalar,
        };

        let owner = self.current.as_ref().map(|function| function.name.val().clone());
        let (storage, handle, target) = match (self.scopes.is_global(), is_static, owner) {
            (true, _, _) => {
                let field = self.add_field(name.val().to_string(), slot);
                (Storage::Global, Handle::Field(field), Target::Initializer)
            }

            (false, true, Some(owner)) => {
                let hidden = format!("{}${}", owner, name.val());
                let field = self.add_field(hidden, slot);
                (Storage::Static, Handle::Field(field), Target::Initializer)
            }

            (false, _, _) => (Storage::Local, Handle::Local(self.allocate_local()), Target::Function),
        };

        let symbol = self.scopes.define(&name, ty, storage, shape, handle)?.clone();

        let length = match shape {
            Shape::Array(Some(length)) => {
                self.emit(target, NewArray(length));
                self.store_symbol(&symbol, target);
                Some(length)
            }

            _ => None,
        };

        let init = match var_decl_init.find(Rule::SimpleExpression) {
            Some(init) => init,
            None => return Ok(()),
        };

        match length {
            None => {
                let found = self.compile_node(init, target)?;
                self.expect_type(init, ExprType::Scalar(ty), found)?;
                self.store_symbol(&symbol, target);
            }

            Some(length) => {
                for index in 0..length {
                    self.load_symbol(&symbol, target);
                    self.emit(target, PushInt(index as i32));

                    let found = self.compile_node(init, target)?;
                    self.expect_type(init, ExprType::Scalar(ty), found)?;
                    self.emit(target, StoreElem);
                }
            }
        }

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol, target: Target) {
        let instruction = match symbol.handle {
            Handle::Field(index) => Instruction::LoadField(index),
            Handle::Local(index) => Instruction::LoadLocal(index),
            Handle::Argument(index) => Instruction::LoadArg(index),
        };

        self.emit(target, instruction);
    }

    fn store_symbol(&mut self, symbol: &Symbol, target: Target) {
        let instruction = match symbol.handle {
            Handle::Field(index) => Instruction::StoreField(index),
            Handle::Local(index) => Instruction::StoreLocal(index),
            Handle::Argument(index) => Instruction::StoreArg(index),
        };

        self.emit(target, instruction);
    }

    /// Resuelve una variable. Los inicializadores solo pueden hacer
    /// referencia a campos globales.
    fn resolve(&self, name: &Located<Identifier>, target: Target) -> Semantic<Symbol> {
        let symbol = self.scopes.resolve(name)?.clone();
        match (target, symbol.handle) {
            (Target::Initializer, Handle::Local(_)) | (Target::Initializer, Handle::Argument(_)) => {
                let error = SemanticError::NotConstant(name.val().clone());
                Err(Located::at(error, name.location().clone()))
            }

            _ => Ok(symbol),
        }
    }

    fn condition(&mut self, condition: &Node) -> Semantic<()> {
        let found = self.compile_node(condition, Target::Function)?;
        self.expect_type(condition, ExprType::Scalar(Type::Bool), found)
    }

    fn int_operand(&mut self, node: &Node, target: Target) -> Semantic<()> {
        let found = self.compile_node(node, target)?;
        self.expect_type(node, ExprType::Scalar(Type::Int), found)
    }

    fn expect_type(&self, node: &Node, expected: ExprType, found: ExprType) -> Semantic<()> {
        if expected == found {
            Ok(())
        } else {
            self.error(node, SemanticError::TypeMismatch(expected, found))
        }
    }

    fn error<T>(&self, node: &Node, error: SemanticError) -> Semantic<T> {
        let location = node.location().unwrap_or_else(|| self.origin.clone());
        Err(Located::at(error, location))
    }

    fn find<'n>(&self, node: &'n Node, rule: Rule) -> Semantic<&'n Node> {
        match node.find(rule) {
            Some(child) => Ok(child),
            None => self.error(node, SemanticError::Malformed(node.rule())),
        }
    }

    fn part<'n>(&self, node: &'n Node, index: usize) -> Semantic<&'n Node> {
        match node.child(index) {
            Some(child) => Ok(child),
            None => self.error(node, SemanticError::Malformed(node.rule())),
        }
    }

    /// Identificador de un nodo con una hoja [`Rule::Id`] como hijo.
    fn name(&self, node: &Node) -> Semantic<Located<Identifier>> {
        match self.find(node, Rule::Id)?.identifier() {
            Some(name) => Ok(name),
            None => self.error(node, SemanticError::Malformed(node.rule())),
        }
    }

    fn is_legacy_compound(&self) -> bool {
        self.options.contains(Options::LEGACY_COMPOUND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        lex::Lexer,
        parse::{self, CompileError},
        source,
    };

    use Instruction::*;

    fn compile_with(source: &str, options: Options) -> Result<Image, CompileError> {
        let (start, chars) = source::chars(source.as_bytes(), "test.cm");
        let tokens = Lexer::new(start.clone(), chars).try_exhaustive().unwrap();
        parse::parse(tokens, start, options).map(|(_, image)| image)
    }

    fn routine(source: &str, options: Options) -> Code {
        let image = compile_with(source, options).unwrap();
        image.routines[image.entry as usize].code.clone()
    }

    fn semantic_error(source: &str) -> SemanticError {
        match compile_with(source, Options::empty()) {
            Err(CompileError::Semantic(error)) => error.into_inner(),
            Err(CompileError::Syntax(error)) => panic!("syntax error: {}", error.val()),
            Ok(_) => panic!("program was accepted"),
        }
    }

    #[test]
    fn while_tests_condition_after_body() {
        let code = routine("main() { int i; while i < 3 do i++; }", Options::empty());

        assert_eq!(
            code.instructions,
            [
                Jump(Label(1)),
                LoadLocal(0),
                PushInt(1),
                Add,
                StoreLocal(0),
                LoadLocal(0),
                PushInt(3),
                Lt,
                JumpIfTrue(Label(0)),
                Return,
            ]
        );

        assert_eq!(code.labels, [1, 5, 9]);
    }

    #[test]
    fn compound_subtraction_evaluates_right_side_once() {
        let source = "main() { int a; a -= 2; }";

        let code = routine(source, Options::empty());
        assert_eq!(code.instructions, [PushInt(2), LoadLocal(0), Swap, Sub, StoreLocal(0), Return]);

        let legacy = routine(source, Options::LEGACY_COMPOUND);
        assert_eq!(
            legacy.instructions,
            [PushInt(2), Pop, LoadLocal(0), PushInt(2), Sub, StoreLocal(0), Return]
        );
    }

    #[test]
    fn negated_relations() {
        let code = routine("bool main() { return 1 >= 2; }", Options::empty());
        assert_eq!(&code.instructions[..5], [PushInt(1), PushInt(2), Lt, PushInt(0), Eq]);

        let code = routine("bool main() { return 'a' != 'b'; }", Options::empty());
        assert_eq!(&code.instructions[2..5], [Eq, PushInt(0), Eq]);
    }

    #[test]
    fn implicit_returns_by_type() {
        let image = compile_with("char c() { }\nint i() { }\nv() { }", Options::empty()).unwrap();
        let tails: Vec<_> = image
            .routines
            .iter()
            .map(|routine| routine.code.instructions.clone())
            .collect();

        assert_eq!(tails[0], [PushInt('.' as i32), Return]);
        assert_eq!(tails[1], [PushInt(0), Return]);
        assert_eq!(tails[2], [Return]);

        // Sin `main` se sintetiza la entrada
        assert_eq!(image.routines[image.entry as usize].name, "Main");
        assert!(!image.flags.contains(ImageFlags::USER_ENTRY));
    }

    #[test]
    fn static_locals_live_in_hidden_fields() {
        let image = compile_with("int f() { static int n : 5; n++; return n; }", Options::empty()).unwrap();

        assert_eq!(image.fields.len(), 1);
        assert_eq!(image.fields[0].name, "f$n");
        assert_eq!(image.initializer.instructions, [PushInt(5), StoreField(0), Return]);
    }

    #[test]
    fn global_arrays_are_filled_in_initializer() {
        let image = compile_with("char s[2] : 'x';", Options::empty()).unwrap();

        assert_eq!(
            image.initializer.instructions,
            [
                NewArray(2),
                StoreField(0),
                LoadField(0),
                PushInt(0),
                PushInt('x' as i32),
                StoreElem,
                LoadField(0),
                PushInt(1),
                PushInt('x' as i32),
                StoreElem,
                Return,
            ]
        );
    }

    #[test]
    fn array_copy_is_unrolled_over_shorter_length() {
        let code = routine("main() { int a[3]; int b[2]; a = b; }", Options::empty());
        let copies = code.instructions.iter().filter(|instruction| **instruction == StoreElem).count();

        assert_eq!(copies, 2);
    }

    #[test]
    fn semantic_errors() {
        use SemanticError::*;

        assert!(matches!(semantic_error("main() { x = 1; }"), Undeclared(_)));
        assert!(matches!(semantic_error("main() { f(); }"), FunctionUndeclared(_)));
        assert!(matches!(semantic_error("main() { int a; bool a; }"), Redefinition(_)));
        assert!(matches!(semantic_error("f() { }\nint f() { }"), FunctionRedefinition(_)));
        assert!(matches!(semantic_error("main() { int a; a = true; }"), TypeMismatch(..)));
        assert!(matches!(semantic_error("f(int x) { }\nmain() { f(); }"), ArgumentCount { .. }));
        assert!(matches!(semantic_error("main() { int a[2], b[2]; a += b; }"), ArrayOperator(_)));
        assert!(matches!(semantic_error("f(int a[]) { int b[2]; b = a; }"), UnknownLength(_)));
        assert!(matches!(semantic_error("main() { bool b; b++; }"), IntOperand(..)));
        assert!(matches!(semantic_error("main() { print(1, 2); }"), PrintFormat(_)));
        assert!(matches!(semantic_error("main() { put(1); }"), PutTarget));
        assert!(matches!(semantic_error("main() { int a[2]; put(a); }"), PutArray(_)));
        assert!(matches!(semantic_error("main() { break; }"), BreakOutsideLoop));
        assert!(matches!(semantic_error("main() { return 1; }"), ReturnInVoid(_)));
        assert!(matches!(semantic_error("int main() { return; }"), MissingReturnValue(..)));
        assert!(matches!(semantic_error("f(int p) { static int n : p; }"), NotConstant(_)));
        assert!(matches!(semantic_error("main() { int i; for i = 0 do ; }"), MissingBound));
        assert!(matches!(semantic_error("main() { int a[0]; }"), ArraySize));
        assert!(matches!(semantic_error("main() { (1) = 2; }"), NotAssignable));
        assert!(matches!(semantic_error("main() { int x; x[0] = 1; }"), NotAnArray(_)));
        assert!(matches!(semantic_error("main() { int a; a = *a; }"), ArrayOperand(_)));
    }
}
