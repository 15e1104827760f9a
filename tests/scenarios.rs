use fs_pta::ir::{Const, GlobalInit, InstId, Program, Signature, Ty, Value};
use fs_pta::location::Location;
use fs_pta::{analyze, analyze_with, AliasResult, AnalysisConfig, Error, HeapFilter, PointsTo};

use test_log::test;

fn cell(pt: &PointsTo, value: Value) -> Location {
    pt.locations().get(value).unwrap().storage()
}

#[test]
fn test_unrelated_allocas_do_not_alias() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let p = b.alloc("p");
    let q = b.alloc("q");
    b.store(p, q);
    let r = b.load("r", p);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    assert_eq!(pt.alias(p, q), AliasResult::NoAlias);
    assert!(pt.points_to_everything(r));
    assert_eq!(pt.points_to(q), vec![cell(&pt, q)]);
}

#[test]
fn test_uninitialized_load_is_repaired() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let p = b.alloc("p");
    let x = b.load("x", p);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    assert_eq!(pt.points_to(x), vec![Location::EVERYTHING]);
    assert_eq!(pt.stats().repair_rounds, 1);
    assert_eq!(pt.stats().repairs, 1);
}

#[test]
fn test_repair_round_bound() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let p = b.alloc("p");
    b.load("x", p);
    b.ret(None);

    let config = AnalysisConfig::default().with_max_repair_rounds(0);
    match analyze_with(&program, config) {
        Err(Error::NotConverged { rounds, loads }) => {
            assert_eq!(rounds, 0);
            assert_eq!(loads, vec!["main.x".to_string()]);
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("analysis should not converge"),
    }
}

#[test]
fn test_stores_on_branches_merge() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let entry = b.current();
    let a = b.alloc("a");
    let bb = b.alloc("b");
    let c = b.alloc("c");
    let left = b.block();
    let right = b.block();
    let join = b.block();
    b.edge(entry, left);
    b.edge(entry, right);
    b.edge(left, join);
    b.edge(right, join);
    b.switch_to(left);
    b.store(a, c);
    b.switch_to(right);
    b.store(bb, c);
    b.switch_to(join);
    let x = b.load("x", c);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    let mut expected = vec![cell(&pt, a), cell(&pt, bb)];
    expected.sort();
    assert_eq!(pt.points_to(x), expected);
    assert_eq!(pt.alias(x, a), AliasResult::MayAlias);
    assert_eq!(pt.alias(x, bb), AliasResult::MayAlias);
    assert_eq!(pt.alias(a, bb), AliasResult::NoAlias);
}

#[test]
fn test_ambiguous_pointer_takes_weak_update() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let a = b.alloc("a");
    let bb = b.alloc("b");
    let c1 = b.alloc("c1");
    let c2 = b.alloc("c2");
    let c = b.copy("c", [c1, c2]);
    b.store(a, c);
    b.store(bb, c);
    let x = b.load("x", c1);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    let mut expected = vec![cell(&pt, a), cell(&pt, bb)];
    expected.sort();
    assert_eq!(pt.points_to(x), expected);
}

#[test]
fn test_strong_update_kills() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let a = b.alloc("a");
    let bb = b.alloc("b");
    let c = b.alloc("c");
    b.store(a, c);
    b.store(bb, c);
    let x = b.load("x", c);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    assert_eq!(pt.points_to(x), vec![cell(&pt, bb)]);
    assert_eq!(pt.alias(x, bb), AliasResult::MustAlias);
    assert_eq!(pt.alias(x, a), AliasResult::NoAlias);

    // Instructions: a, b, c, store a, store b, load, ret.
    assert_eq!(pt.cell_after(main, InstId(3), cell(&pt, c)), Some(vec![cell(&pt, a)]));
    assert_eq!(pt.cell_after(main, InstId(4), cell(&pt, c)), Some(vec![cell(&pt, bb)]));
}

#[test]
fn test_indirect_call_reaches_every_candidate() {
    let mut program = Program::new();
    let sig = Signature::new([Ty::Ptr], Ty::Void);
    let f1 = program.declare("f1", sig.clone());
    let f2 = program.declare("f2", sig.clone());
    let other = program.declare("other", Signature::new([Ty::Ptr, Ty::Ptr], Ty::Void));
    let main = program.declare("main", Signature::new([], Ty::Void));
    for f in [f1, f2] {
        let mut b = program.define(f);
        b.load("y", b.arg(0));
        b.ret(None);
    }
    {
        let mut b = program.define(other);
        b.ret(None);
    }
    let a = {
        let mut b = program.define(main);
        let a = b.alloc("a");
        let fp = b.copy("fp", [Value::Function(f1), Value::Function(f2)]);
        b.call_indirect("", fp, sig, [a]);
        b.ret(None);
        a
    };

    let pt = analyze(&program).unwrap();
    let a_cell = cell(&pt, a);
    assert_eq!(pt.points_to(Value::Arg(f1, 0)), vec![a_cell]);
    assert_eq!(pt.points_to(Value::Arg(f2, 0)), vec![a_cell]);
    // `other` is never called, so it keeps its default pointee.
    assert!(!pt.points_to(Value::Arg(other, 0)).contains(&a_cell));

    let edges = pt.call_edges();
    assert!(edges.contains(&(main, f1)));
    assert!(edges.contains(&(main, f2)));
    assert!(!edges.contains(&(main, other)));
}

#[test]
fn test_direct_call_binds_and_returns() {
    let mut program = Program::new();
    let id = program.declare("id", Signature::new([Ty::Ptr], Ty::Ptr));
    let main = program.declare("main", Signature::new([], Ty::Void));
    {
        let mut b = program.define(id);
        let p = b.arg(0);
        b.ret(Some(p));
    }
    let (a, r) = {
        let mut b = program.define(main);
        let a = b.alloc("a");
        let r = b.call("r", id, [a]);
        let s = b.alloc("s");
        b.store(r, s);
        b.ret(None);
        (a, r)
    };

    let pt = analyze(&program).unwrap();
    assert_eq!(pt.points_to(Value::Arg(id, 0)), pt.points_to(a));
    assert_eq!(pt.points_to(r), pt.points_to(a));
    assert_eq!(pt.alias(r, a), AliasResult::MustAlias);
}

#[test]
fn test_callee_stores_are_visible_after_call() {
    for filter in [HeapFilter::Reachable, HeapFilter::Full] {
        let mut program = Program::new();
        let set = program.declare("set", Signature::new([Ty::Ptr, Ty::Ptr], Ty::Void));
        let main = program.declare("main", Signature::new([], Ty::Void));
        {
            let mut b = program.define(set);
            let (p, q) = (b.arg(0), b.arg(1));
            b.store(q, p);
            b.ret(None);
        }
        let (v, x) = {
            let mut b = program.define(main);
            let slot = b.alloc("slot");
            let v = b.alloc("v");
            b.call("", set, [slot, v]);
            let x = b.load("x", slot);
            b.ret(None);
            (v, x)
        };

        let pt = analyze_with(&program, AnalysisConfig::default().with_heap_filter(filter)).unwrap();
        assert!(pt.points_to(x).contains(&cell(&pt, v)), "filter {:?}", filter);
        assert!(!pt.points_to_everything(x), "filter {:?}", filter);
    }
}

#[test]
fn test_unknown_operands_point_to_everything() {
    let mut program = Program::new();
    let ext = program.declare("ext", Signature::new([], Ty::Ptr));
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let p = b.alloc("p");
    let x = b.copy("x", [p, Value::Const(Const::Undef)]);
    let y = b.load("y", Value::Const(Const::Undef));
    let z = b.call("z", ext, []);
    b.store(z, p);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    assert!(pt.points_to_everything(x));
    assert!(pt.points_to(x).contains(&cell(&pt, p)));
    assert!(pt.points_to_everything(y));
    assert!(pt.points_to_everything(z));
    assert_eq!(pt.alias(x, p), AliasResult::MayAlias);
}

#[test]
fn test_alias_is_reflexive_and_symmetric() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let p = b.alloc("p");
    let q = b.alloc("q");
    let r = b.copy("r", [p, q]);
    let s = b.copy("s", [q]);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    let values = [p, q, r, s];
    for &x in &values {
        assert_eq!(pt.alias(x, x), AliasResult::MustAlias);
        for &y in &values {
            assert_eq!(pt.alias(x, y), pt.alias(y, x));
        }
    }
    assert_eq!(pt.alias(r, p), AliasResult::MayAlias);
    assert_eq!(pt.alias(s, q), AliasResult::MustAlias);
    assert_eq!(pt.alias(s, p), AliasResult::NoAlias);
}

#[test]
fn test_global_initializers() {
    let mut program = Program::new();
    let g1 = program.add_global("g1", None);
    let g2 = program.add_global("g2", Some(GlobalInit::Address(g1)));
    let g3 = program.add_global("g3", Some(GlobalInit::Opaque));
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let x = b.load("x", g2);
    let y = b.load("y", g3);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    assert_eq!(pt.points_to(x), vec![cell(&pt, g1)]);
    assert_eq!(pt.alias(x, g1), AliasResult::MustAlias);
    assert!(pt.points_to_everything(y));
}

#[test]
fn test_function_pointer_in_global() {
    let mut program = Program::new();
    let sig = Signature::new([], Ty::Void);
    let callback = program.declare("callback", sig.clone());
    let main = program.declare("main", sig.clone());
    let table = program.add_global("table", Some(GlobalInit::Address(Value::Function(callback))));
    {
        let mut b = program.define(callback);
        b.ret(None);
    }
    {
        let mut b = program.define(main);
        let fp = b.load("fp", table);
        b.call_indirect("", fp, sig, []);
        b.ret(None);
    }

    let pt = analyze(&program).unwrap();
    assert_eq!(pt.call_edges(), vec![(main, callback)]);
}

#[test]
fn test_arity_mismatch() {
    let mut program = Program::new();
    let f = program.declare("f", Signature::new([Ty::Ptr], Ty::Void));
    let printf = program.declare("printf", Signature::new([Ty::Ptr], Ty::Int).variadic());
    let main = program.declare("main", Signature::new([], Ty::Void));
    {
        let mut b = program.define(f);
        b.ret(None);
    }
    {
        let mut b = program.define(main);
        let p = b.alloc("p");
        b.call("", printf, [p, p, Value::Const(Const::Int(1))]);
        b.call("", f, []);
        b.ret(None);
    }

    match analyze(&program) {
        Err(Error::ArityMismatch { callee, expected, actual }) => {
            assert_eq!(callee, "f");
            assert_eq!(expected, 1);
            assert_eq!(actual, 0);
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("arity mismatch should be reported"),
    }
}

#[test]
fn test_preserving_instructions_are_reduced() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    let p = b.alloc("p");
    let q = b.alloc("q");
    b.store(q, p);
    let n = b.other("n", Ty::Int, [Value::Const(Const::Int(1))]);
    b.other("m", Ty::Int, [n]);
    let x = b.load("x", p);
    b.ret(None);

    let pt = analyze(&program).unwrap();
    assert!(pt.stats().reduced_nodes >= 2);
    assert_eq!(pt.points_to(x), vec![cell(&pt, q)]);
}

#[test]
fn test_address_taken_callee_has_no_default_pointee() {
    let mut program = Program::new();
    let sig = Signature::new([Ty::Ptr], Ty::Void);
    // Declared before `main`, so its body is processed before the indirect call binds `p`.
    let f1 = program.declare("f1", sig.clone());
    let main = program.declare("main", Signature::new([], Ty::Void));
    let y = {
        let mut b = program.define(f1);
        let y = b.copy("y", [b.arg(0)]);
        b.ret(None);
        y
    };
    let a = {
        let mut b = program.define(main);
        let a = b.alloc("a");
        let fp = b.copy("fp", [Value::Function(f1)]);
        b.call_indirect("", fp, sig, [a]);
        b.ret(None);
        a
    };

    let pt = analyze(&program).unwrap();
    let p = Value::Arg(f1, 0);
    assert_eq!(pt.points_to(p), vec![cell(&pt, a)]);
    assert_eq!(pt.points_to(y), pt.points_to(p));
    assert_eq!(pt.alias(y, p), AliasResult::MustAlias);
}

#[test]
fn test_unknown_function_pointer_reaches_matching_signatures() {
    let sig = Signature::new([Ty::Ptr], Ty::Void);
    let build = |fptr: Option<Value>| {
        let mut program = Program::new();
        let f1 = program.declare("f1", sig.clone());
        let f2 = program.declare("f2", sig.clone());
        let other = program.declare("other", Signature::new([Ty::Ptr, Ty::Ptr], Ty::Void));
        let main = program.declare("main", Signature::new([], Ty::Void));
        let opaque = program.add_global("opaque", Some(GlobalInit::Opaque));
        for f in [f1, f2, other] {
            let mut b = program.define(f);
            b.ret(None);
        }
        let a = {
            let mut b = program.define(main);
            let a = b.alloc("a");
            // No pointer given: load one from a global holding something unknown.
            let fp = fptr.unwrap_or_else(|| b.load("fp", opaque));
            b.call_indirect("", fp, sig.clone(), [a]);
            b.ret(None);
            a
        };
        (program, [f1, f2, other, main], a)
    };

    for fptr in [Some(Value::Const(Const::Undef)), None] {
        let (program, [f1, f2, other, main], a) = build(fptr);
        let pt = analyze(&program).unwrap();
        let edges = pt.call_edges();
        assert!(edges.contains(&(main, f1)), "{:?}", fptr);
        assert!(edges.contains(&(main, f2)), "{:?}", fptr);
        assert!(!edges.contains(&(main, other)), "{:?}", fptr);
        assert!(pt.points_to(Value::Arg(f1, 0)).contains(&cell(&pt, a)));
        assert!(pt.points_to(Value::Arg(f2, 0)).contains(&cell(&pt, a)));
    }
}

/// `f(p) { q = *p }` called from `main` after `*a = x`, `*b = y`.
fn build_filtered_call(arg: Option<Value>, store_through_unknown: bool) -> (Program, [Value; 5]) {
    let mut program = Program::new();
    let f = program.declare("f", Signature::new([Ty::Ptr], Ty::Void));
    let main = program.declare("main", Signature::new([], Ty::Void));
    let q = {
        let mut b = program.define(f);
        let q = b.load("q", b.arg(0));
        b.ret(None);
        q
    };
    let values = {
        let mut b = program.define(main);
        let a = b.alloc("a");
        let bb = b.alloc("b");
        let x = b.alloc("x");
        let y = b.alloc("y");
        b.store(x, a);
        b.store(y, bb);
        if store_through_unknown {
            b.store(x, Value::Const(Const::Undef));
        }
        b.call("", f, [arg.unwrap_or(a)]);
        b.ret(None);
        [a, bb, x, y, q]
    };
    (program, values)
}

#[test]
fn test_unresolved_argument_passes_whole_heap() {
    let (program, [a, bb, x, y, _]) = build_filtered_call(Some(Value::Const(Const::Undef)), false);
    let f = program.function_by_name("f").unwrap();
    let pt = analyze_with(&program, AnalysisConfig::default().with_heap_filter(HeapFilter::Reachable)).unwrap();

    let heap = pt.heap_after(f, InstId(0)).unwrap();
    let rel = pt.relations();
    assert!(rel.contains_pair(heap, cell(&pt, a), cell(&pt, x)));
    assert!(rel.contains_pair(heap, cell(&pt, bb), cell(&pt, y)));
}

#[test]
fn test_unknown_cell_always_passes_filter() {
    let (program, [a, bb, x, y, q]) = build_filtered_call(None, true);
    let f = program.function_by_name("f").unwrap();
    let pt = analyze_with(&program, AnalysisConfig::default().with_heap_filter(HeapFilter::Reachable)).unwrap();

    let heap = pt.heap_after(f, InstId(0)).unwrap();
    let rel = pt.relations();
    assert!(rel.contains_pair(heap, cell(&pt, a), cell(&pt, x)));
    assert!(rel.contains_pair(heap, Location::EVERYTHING, cell(&pt, x)));
    assert!(!rel.contains_pair(heap, cell(&pt, bb), cell(&pt, y)));
    assert_eq!(pt.points_to(q), vec![cell(&pt, x)]);
}

#[test]
fn test_return_reaches_every_call_site() {
    let mut program = Program::new();
    let fill = program.declare("fill", Signature::new([Ty::Ptr], Ty::Ptr));
    let main = program.declare("main", Signature::new([], Ty::Void));
    let o = {
        let mut b = program.define(fill);
        let o = b.alloc("o");
        b.store(o, b.arg(0));
        b.ret(Some(o));
        o
    };
    let (r, ignored, x, u) = {
        let mut b = program.define(main);
        let s1 = b.alloc("s1");
        let s2 = b.alloc("s2");
        let r = b.call("r", fill, [s1]);
        let ignored = b.call("ignored", fill, [s2]);
        let x = b.load("x", s2);
        let u = b.copy("u", [r]);
        b.ret(None);
        (r, ignored, x, u)
    };

    let pt = analyze(&program).unwrap();
    let o_cell = cell(&pt, o);
    assert_eq!(pt.points_to(r), vec![o_cell]);
    assert_eq!(pt.points_to(u), vec![o_cell]);
    // The second site discards the value but still sees the callee's store.
    assert_eq!(pt.locations().get(ignored), None);
    assert_eq!(pt.points_to(x), vec![o_cell]);
    assert_eq!(pt.stats().repair_rounds, 0);
}

#[test]
fn test_oversized_storage_is_rejected() {
    let mut program = Program::new();
    let main = program.declare("main", Signature::new([], Ty::Void));
    let mut b = program.define(main);
    b.ret(None);

    let config = AnalysisConfig::default().with_storage_bits(40);
    assert!(matches!(analyze_with(&program, config), Err(Error::InvalidConfig(_))));
}
