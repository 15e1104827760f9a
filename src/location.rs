//! Dense numbering of everything the analysis tracks.
//!
//! Id 0 is the sentinel "points to everything". Every global, function and argument
//! receives an id together with a companion `id + 1` (its storage cell, its identity,
//! or its default pointee). Defining instructions follow, function by function;
//! allocations again receive a storage companion.

use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::ir::{FuncId, GlobalInit, InstKind, Program, Ty, Value};

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Location(u32);

impl Location {
    /// The universal sentinel.
    pub const EVERYTHING: Location = Location(0);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(self) -> u32 {
        self.0
    }

    pub const fn is_everything(self) -> bool {
        self.0 == 0
    }

    /// The companion location `id + 1`.
    pub const fn storage(self) -> Location {
        Location(self.0 + 1)
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct LocationMap {
    ids: HashMap<Value, Location>,
    names: Vec<String>,
}

impl LocationMap {
    /// Number every trackable value of the program.
    pub fn build(program: &Program) -> Result<Self> {
        let mut map = LocationMap {
            ids: HashMap::new(),
            names: vec!["EVERYTHING".to_string()],
        };

        for g in program.global_ids() {
            let name = &program.global(g).name;
            map.assign_pair(Value::Global(g), name.clone(), format!("{}__HEAP", name))?;
        }

        for f in program.function_ids() {
            let func = program.function(f);
            map.assign_pair(Value::Function(f), func.name.clone(), format!("{}__FUNCTION", func.name))?;
            for i in 0..func.signature.params.len() as u32 {
                let name = format!("{}.arg{}", func.name, i);
                map.assign_pair(Value::Arg(f, i), name.clone(), format!("{}__ARGUMENT", name))?;
            }
        }

        for f in program.function_ids() {
            let used = used_results(program, f);
            let func = program.function(f);
            for id in func.inst_ids() {
                let inst = func.inst(id);
                let value = Value::Inst(f, id);
                let name = program.value_name(value);
                match &inst.kind {
                    InstKind::Alloc => {
                        map.assign_pair(value, name.clone(), format!("{}__HEAP", name))?;
                    }
                    InstKind::Copy { .. } | InstKind::Load { .. } => {
                        map.assign(value, name)?;
                    }
                    InstKind::Call { .. } => {
                        if inst.ty != Ty::Void && used.contains(&value) {
                            map.assign(value, name)?;
                        }
                    }
                    InstKind::Store { .. } | InstKind::Return { .. } | InstKind::Other { .. } => {}
                }
            }
        }

        info!("Numbered {} locations", map.len());
        Ok(map)
    }

    fn assign(&mut self, value: Value, name: String) -> Result<Location> {
        let location = Location(self.names.len() as u32);
        if let Some(&previous) = self.ids.get(&value) {
            return Err(Error::DuplicateLocation {
                location: previous,
                first: self.names[previous.0 as usize].clone(),
                second: name,
            });
        }
        debug!("{} = {}", location, name);
        self.ids.insert(value, location);
        self.names.push(name);
        Ok(location)
    }

    fn assign_pair(&mut self, value: Value, name: String, companion: String) -> Result<Location> {
        let location = self.assign(value, name)?;
        self.names.push(companion);
        Ok(location)
    }

    /// Number of locations, including the sentinel.
    pub fn len(&self) -> u32 {
        self.names.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }

    pub fn get(&self, value: Value) -> Option<Location> {
        self.ids.get(&value).copied()
    }

    /// Location of a value, or the sentinel if the value is not tracked.
    pub fn lookup(&self, value: Value) -> Location {
        self.get(value).unwrap_or(Location::EVERYTHING)
    }

    /// Identity location of a function (the target of pointers to it).
    pub fn identity(&self, func: FuncId) -> Option<Location> {
        self.get(Value::Function(func)).map(Location::storage)
    }

    pub fn name(&self, location: Location) -> &str {
        self.names.get(location.0 as usize).map(String::as_str).unwrap_or("?")
    }
}

/// Results of `func` used as an operand anywhere in the program.
fn used_results(program: &Program, func: FuncId) -> HashSet<Value> {
    let mut used = HashSet::new();
    let mut note = |v: Value| {
        if matches!(v, Value::Inst(f, _) if f == func) {
            used.insert(v);
        }
    };
    for f in program.function_ids() {
        let body = program.function(f);
        for inst in &body.insts {
            inst.kind.operands().into_iter().for_each(&mut note);
        }
    }
    for g in &program.globals {
        if let Some(GlobalInit::Address(v)) = &g.init {
            note(*v);
        }
    }
    used
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::ir::{Const, Signature};

    #[test]
    fn test_numbering_order() {
        let mut program = Program::new();
        let g = program.add_global("g", None);
        let callee = program.declare("callee", Signature::new([], Ty::Ptr));
        let main = program.declare("main", Signature::new([Ty::Ptr], Ty::Void));

        let mut b = program.define(main);
        let x = b.alloc("x");
        let y = b.load("y", x);
        let unused = b.call("unused", callee, []);
        let used = b.call("used", callee, []);
        b.store(used, x);
        b.ret(None);

        let locs = LocationMap::build(&program).unwrap();

        assert_eq!(locs.lookup(g), Location::new(1));
        assert_eq!(locs.lookup(Value::Function(callee)), Location::new(3));
        assert_eq!(locs.identity(callee), Some(Location::new(4)));
        assert_eq!(locs.lookup(Value::Function(main)), Location::new(5));
        assert_eq!(locs.lookup(Value::Arg(main, 0)), Location::new(7));
        assert_eq!(locs.lookup(x), Location::new(9));
        assert_eq!(locs.lookup(y), Location::new(11));
        assert_eq!(locs.get(unused), None);
        assert_eq!(locs.lookup(used), Location::new(12));
        assert_eq!(locs.len(), 13);

        assert_eq!(locs.name(Location::EVERYTHING), "EVERYTHING");
        assert_eq!(locs.name(Location::new(2)), "g__HEAP");
        assert_eq!(locs.name(Location::new(10)), "main.x__HEAP");
    }

    #[test]
    fn test_untracked_is_everything() {
        let program = Program::new();
        let locs = LocationMap::build(&program).unwrap();
        assert!(locs.is_empty());
        assert_eq!(
            locs.lookup(Value::Const(Const::Undef)),
            Location::EVERYTHING
        );
    }

    #[test]
    fn test_duplicate_is_fatal() {
        let mut program = Program::new();
        let g = program.add_global("g", None);
        let mut locs = LocationMap::build(&program).unwrap();
        let err = locs.assign(g, "again".to_string()).unwrap_err();
        assert!(matches!(err, Error::DuplicateLocation { .. }));
    }
}
