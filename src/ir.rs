//! Program model consumed by the analysis.
//!
//! A host adapter lowers its compiler IR into a [`Program`]: globals, functions with
//! basic blocks, and instructions classified by how they affect points-to facts.
//! Pointer arithmetic, casts and phi-nodes are expected to be lowered to [`InstKind::Copy`];
//! everything that neither defines nor consumes a pointer becomes [`InstKind::Other`].

use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct GlobalId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FuncId(pub u32);

/// Index of an instruction within its function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct InstId(pub u32);

/// Index of a basic block within its function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BlockId(pub u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Ty {
    Void,
    Int,
    Float,
    Ptr,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Signature {
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub variadic: bool,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = Ty>, ret: Ty) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
            variadic: false,
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Const {
    Null,
    Int(i64),
    Undef,
}

/// An SSA value.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Value {
    Global(GlobalId),
    Function(FuncId),
    Arg(FuncId, u32),
    Inst(FuncId, InstId),
    Const(Const),
}

impl Value {
    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Const(_))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GlobalInit {
    /// The global's storage initially holds the address of another global or a function.
    Address(Value),
    /// The global's storage is initialized with something the analysis does not model.
    Opaque,
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub init: Option<GlobalInit>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Callee {
    Direct(FuncId),
    Indirect(Value),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InstKind {
    /// `x = alloc`: a fresh storage cell.
    Alloc,
    /// `x = merge(v1, ..., vk)`: phi, select, cast or pointer arithmetic.
    Copy { sources: Vec<Value> },
    /// `x = *ptr`
    Load { ptr: Value },
    /// `*ptr = value`
    Store { value: Value, ptr: Value },
    /// `x = callee(args...)`; `signature` is the declared type at the call site.
    Call {
        callee: Callee,
        args: Vec<Value>,
        signature: Signature,
    },
    Return { value: Option<Value> },
    /// Anything that neither defines nor consumes points-to facts.
    Other { operands: Vec<Value> },
}

impl InstKind {
    /// All operand values, in order.
    pub fn operands(&self) -> Vec<Value> {
        match self {
            InstKind::Alloc => Vec::new(),
            InstKind::Copy { sources } => sources.clone(),
            InstKind::Load { ptr } => vec![*ptr],
            InstKind::Store { value, ptr } => vec![*value, *ptr],
            InstKind::Call { callee, args, .. } => {
                let mut ops = Vec::with_capacity(args.len() + 1);
                if let Callee::Indirect(f) = callee {
                    ops.push(*f);
                }
                ops.extend(args.iter().copied());
                ops
            }
            InstKind::Return { value } => value.iter().copied().collect(),
            InstKind::Other { operands } => operands.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inst {
    pub name: String,
    pub kind: InstKind,
    /// Type of the produced value (`Void` if none).
    pub ty: Ty,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub insts: Vec<InstId>,
    pub succs: Vec<BlockId>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    pub insts: Vec<Inst>,
    /// Basic blocks; the first one is the entry block. No blocks means a declaration.
    pub blocks: Vec<Block>,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn inst(&self, id: InstId) -> &Inst {
        &self.insts[id.0 as usize]
    }

    pub fn inst_ids(&self) -> impl Iterator<Item = InstId> + '_ {
        (0..self.insts.len() as u32).map(InstId)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0 as usize]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn global_ids(&self) -> impl Iterator<Item = GlobalId> {
        (0..self.globals.len() as u32).map(GlobalId)
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> {
        (0..self.functions.len() as u32).map(FuncId)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.function_ids().find(|&f| self.function(f).name == name)
    }

    /// Static type of a value, if the value exists in this program.
    pub fn type_of(&self, value: Value) -> Option<Ty> {
        match value {
            Value::Global(g) => self.globals.get(g.0 as usize).map(|_| Ty::Ptr),
            Value::Function(f) => self.functions.get(f.0 as usize).map(|_| Ty::Ptr),
            Value::Arg(f, i) => self
                .functions
                .get(f.0 as usize)
                .and_then(|func| func.signature.params.get(i as usize).copied()),
            Value::Inst(f, i) => self
                .functions
                .get(f.0 as usize)
                .and_then(|func| func.insts.get(i.0 as usize))
                .map(|inst| inst.ty),
            Value::Const(Const::Int(_)) => Some(Ty::Int),
            Value::Const(_) => Some(Ty::Ptr),
        }
    }

    /// Human-readable name of a value.
    pub fn value_name(&self, value: Value) -> String {
        match value {
            Value::Global(g) => format!("@{}", self.global(g).name),
            Value::Function(f) => format!("@{}", self.function(f).name),
            Value::Arg(f, i) => format!("{}.arg{}", self.function(f).name, i),
            Value::Inst(f, i) => format!("{}.{}", self.function(f).name, self.function(f).inst(i).name),
            Value::Const(c) => c.to_string(),
        }
    }

    pub fn add_global(&mut self, name: impl Into<String>, init: Option<GlobalInit>) -> Value {
        let id = GlobalId(self.globals.len() as u32);
        self.globals.push(Global { name: name.into(), init });
        Value::Global(id)
    }

    /// Add a function without a body; use [`Program::define`] to give it one.
    pub fn declare(&mut self, name: impl Into<String>, signature: Signature) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(Function {
            name: name.into(),
            signature,
            insts: Vec::new(),
            blocks: Vec::new(),
        });
        id
    }

    /// Start building the body of `func`. The builder positions itself in a fresh entry block.
    pub fn define(&mut self, func: FuncId) -> FunctionBuilder<'_> {
        let mut builder = FunctionBuilder {
            program: self,
            func,
            current: BlockId(0),
        };
        builder.current = builder.block();
        builder
    }
}

impl Display for Const {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Const::Null => write!(f, "null"),
            Const::Int(x) => write!(f, "{}", x),
            Const::Undef => write!(f, "undef"),
        }
    }
}

/// Appends blocks and instructions to one function.
pub struct FunctionBuilder<'a> {
    program: &'a mut Program,
    func: FuncId,
    current: BlockId,
}

impl FunctionBuilder<'_> {
    fn function(&mut self) -> &mut Function {
        &mut self.program.functions[self.func.0 as usize]
    }

    pub fn id(&self) -> FuncId {
        self.func
    }

    pub fn arg(&self, index: u32) -> Value {
        Value::Arg(self.func, index)
    }

    /// Append a new empty block (without switching to it).
    pub fn block(&mut self) -> BlockId {
        let f = self.function();
        f.blocks.push(Block::default());
        BlockId(f.blocks.len() as u32 - 1)
    }

    pub fn current(&self) -> BlockId {
        self.current
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    /// Add a control-flow edge between blocks.
    pub fn edge(&mut self, from: BlockId, to: BlockId) {
        self.function().blocks[from.0 as usize].succs.push(to);
    }

    pub fn inst(&mut self, name: impl Into<String>, kind: InstKind, ty: Ty) -> Value {
        let func = self.func;
        let current = self.current;
        let f = self.function();
        let id = InstId(f.insts.len() as u32);
        f.insts.push(Inst {
            name: name.into(),
            kind,
            ty,
        });
        f.blocks[current.0 as usize].insts.push(id);
        Value::Inst(func, id)
    }

    pub fn alloc(&mut self, name: impl Into<String>) -> Value {
        self.inst(name, InstKind::Alloc, Ty::Ptr)
    }

    pub fn copy(&mut self, name: impl Into<String>, sources: impl IntoIterator<Item = Value>) -> Value {
        let sources = sources.into_iter().collect();
        self.inst(name, InstKind::Copy { sources }, Ty::Ptr)
    }

    pub fn load(&mut self, name: impl Into<String>, ptr: Value) -> Value {
        self.load_as(name, ptr, Ty::Ptr)
    }

    pub fn load_as(&mut self, name: impl Into<String>, ptr: Value, ty: Ty) -> Value {
        self.inst(name, InstKind::Load { ptr }, ty)
    }

    pub fn store(&mut self, value: Value, ptr: Value) {
        self.inst("", InstKind::Store { value, ptr }, Ty::Void);
    }

    pub fn call(&mut self, name: impl Into<String>, callee: FuncId, args: impl IntoIterator<Item = Value>) -> Value {
        let signature = self.program.function(callee).signature.clone();
        let ty = signature.ret;
        let kind = InstKind::Call {
            callee: Callee::Direct(callee),
            args: args.into_iter().collect(),
            signature,
        };
        self.inst(name, kind, ty)
    }

    pub fn call_indirect(
        &mut self,
        name: impl Into<String>,
        fptr: Value,
        signature: Signature,
        args: impl IntoIterator<Item = Value>,
    ) -> Value {
        let ty = signature.ret;
        let kind = InstKind::Call {
            callee: Callee::Indirect(fptr),
            args: args.into_iter().collect(),
            signature,
        };
        self.inst(name, kind, ty)
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.inst("", InstKind::Return { value }, Ty::Void);
    }

    pub fn other(&mut self, name: impl Into<String>, ty: Ty, operands: impl IntoIterator<Item = Value>) -> Value {
        let operands = operands.into_iter().collect();
        self.inst(name, InstKind::Other { operands }, ty)
    }
}
