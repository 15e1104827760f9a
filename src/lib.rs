//! # fs-pta: flow-sensitive points-to analysis over BDDs
//!
//! **`fs-pta`** computes, for every pointer-valued location of a program, the set of memory
//! cells it may reference. The analysis is flow-sensitive for memory (each program point has
//! its own heap relation), inter-procedural (call targets are discovered on the fly, including
//! indirect ones), and distinguishes strong from weak updates.
//!
//! ## How it works
//!
//! - Every relevant value gets a numeric [`Location`][crate::location::Location]; id `0` is the
//!   sentinel meaning "anything".
//! - Points-to relations are sets of location pairs, encoded as BDDs over two columns of bits
//!   (see [`relation`]). All set algebra goes through one hash-consed [`Bdd`][crate::bdd::Bdd] manager.
//! - Each function is turned into a sparse [`FlowGraph`][crate::graph::FlowGraph]; instructions that
//!   cannot change points-to facts are collapsed away by T2/T4 reduction.
//! - A two-level worklist drives transfer functions to a fixpoint. Loads that still read nothing
//!   are then assumed to read anything, and the fixpoint is resumed.
//!
//! ## Basic Usage
//!
//! ```rust
//! use fs_pta::ir::{Program, Signature, Ty};
//! use fs_pta::{analyze, AliasResult};
//!
//! let mut program = Program::new();
//! let main = program.declare("main", Signature::new([], Ty::Void));
//! let mut b = program.define(main);
//! let p = b.alloc("p");
//! let q = b.alloc("q");
//! b.store(q, p);
//! let r = b.load("r", p);
//! b.ret(None);
//!
//! let pt = analyze(&program).unwrap();
//! assert_eq!(pt.alias(p, q), AliasResult::NoAlias);
//! assert_eq!(pt.alias(r, q), AliasResult::MustAlias);
//! ```
//!
//! ## Core Components
//!
//! - **[`ir`]**: The program model the analysis consumes.
//! - **[`analysis`]**: The fixpoint driver and the [`PointsTo`] result.
//! - **[`alias`]**: Alias classification on top of the result.
//! - **[`bdd`]**, **[`relation`]**: The BDD kernel and the relation encoding built on it.

pub mod alias;
pub mod analysis;
pub mod bdd;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod ir;
pub mod location;
pub mod reference;
pub mod relation;
pub mod sat;
pub mod scc;
pub mod table;
mod transfer;
pub mod utils;
pub mod worklist;

pub use alias::AliasResult;
pub use analysis::{analyze, analyze_with, PointsTo, Stats};
pub use config::{AnalysisConfig, HeapFilter};
pub use error::{Error, Result};
