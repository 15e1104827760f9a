use clap::Parser;

use fs_pta::ir::{GlobalInit, Program, Signature, Ty, Value};
use fs_pta::{analyze_with, AnalysisConfig, HeapFilter, PointsTo};

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of items pushed into the list.
    #[arg(value_name = "INT", default_value = "3")]
    items: usize,

    /// BDD size (in bits, so the initial size is `2^size` nodes).
    #[clap(long, value_name = "INT", default_value = "16")]
    size: usize,

    /// Maximum number of uninitialized-load repair rounds.
    #[clap(long, value_name = "INT", default_value = "2")]
    rounds: usize,

    /// Pass the whole caller heap into callees.
    #[clap(long)]
    full_heap: bool,

    /// Print the alias matrix of `main`.
    #[clap(long)]
    alias: bool,
}

/// A small program: a list cell filled by `push`, and two handlers called through a pointer.
fn build(items: usize) -> Program {
    let mut program = Program::new();
    let push = program.declare("push", Signature::new([Ty::Ptr, Ty::Ptr], Ty::Void));
    let handler_sig = Signature::new([Ty::Ptr], Ty::Ptr);
    let first = program.declare("first", handler_sig.clone());
    let second = program.declare("second", handler_sig.clone());
    let main = program.declare("main", Signature::new([], Ty::Void));
    let fallback = program.add_global("fallback", Some(GlobalInit::Address(Value::Function(second))));

    {
        let mut b = program.define(push);
        let (list, item) = (b.arg(0), b.arg(1));
        b.store(item, list);
        b.ret(None);
    }
    for handler in [first, second] {
        let mut b = program.define(handler);
        let v = b.load("v", b.arg(0));
        b.ret(Some(v));
    }
    {
        let mut b = program.define(main);
        let entry = b.current();
        let list = b.alloc("list");
        for i in 0..items {
            let item = b.alloc(format!("item{}", i));
            b.call("", push, [list, item]);
        }
        let head = b.load("head", list);

        let then = b.block();
        let join = b.block();
        b.edge(entry, then);
        b.edge(entry, join);
        b.edge(then, join);
        b.switch_to(then);
        let other = b.load("other", fallback);
        b.switch_to(join);
        let handler = b.copy("handler", [Value::Function(first), other]);
        let result = b.call_indirect("result", handler, handler_sig, [head]);
        let sink = b.alloc("sink");
        b.store(result, sink);
        b.ret(None);
    }
    program
}

fn report(pt: &PointsTo) {
    let program = pt.program();
    let locs = pt.locations();
    for f in program.function_ids() {
        let func = program.function(f);
        if func.is_declaration() {
            continue;
        }
        println!("{}:", func.name);
        let values = (0..func.signature.params.len() as u32)
            .map(|i| Value::Arg(f, i))
            .chain(func.inst_ids().map(|i| Value::Inst(f, i)));
        for value in values {
            if locs.get(value).is_none() {
                continue;
            }
            let targets = pt
                .points_to(value)
                .into_iter()
                .map(|loc| locs.name(loc).to_string())
                .collect::<Vec<_>>();
            println!("  {} -> {{{}}}", program.value_name(value), targets.join(", "));
        }
    }

    println!("Call edges:");
    for (caller, callee) in pt.call_edges() {
        println!("  {} -> {}", program.function(caller).name, program.function(callee).name);
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let program = build(args.items);
    let config = AnalysisConfig::default()
        .with_storage_bits(args.size)
        .with_max_repair_rounds(args.rounds)
        .with_heap_filter(if args.full_heap { HeapFilter::Full } else { HeapFilter::Reachable });

    let pt = analyze_with(&program, config)?;
    report(&pt);

    if args.alias {
        let main = program.function_by_name("main").ok_or_else(|| color_eyre::eyre::eyre!("no main"))?;
        let values = program
            .function(main)
            .inst_ids()
            .map(|i| Value::Inst(main, i))
            .filter(|&v| pt.locations().get(v).is_some())
            .collect::<Vec<_>>();
        println!("Aliases in main:");
        for (i, &a) in values.iter().enumerate() {
            for &b in &values[i + 1..] {
                println!("  {} vs {}: {}", program.value_name(a), program.value_name(b), pt.alias(a, b));
            }
        }
    }

    println!("stats = {:?}", pt.stats());
    println!("Total time: {:.3} s", time_total.elapsed().as_secs_f64());
    Ok(())
}
