use super::*;
use crate::bdd::Bdd;
use crate::call::{Arg, CallBuilder, CallPathBuilder};
use crate::solver::{SolverConfig, SolverContext};

fn packet_byte(offset: u64) -> Expr {
    Expr::read_lsb("packet_chunks", offset, 8)
}

/// spec.md §8 scenario S1, synthesized for x86: a straight-line chain
/// lowers to `PacketBorrowNextChunk -> Ignore -> Forward(1)` — the
/// unmodified `packet_return_chunk` elides to `Ignore` on x86 the same way
/// it does on P4, via `build_modifications` finding no changed bytes.
#[test]
fn s1_synthesizes_an_x86_plan() {
    let path = CallPathBuilder::new("s1.call_path")
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(14, 32))).build())
        .call(CallBuilder::new("packet_return_chunk").arg("the_chunk", Arg::with_in_out(packet_byte(0), packet_byte(0))).build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(1, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(std::slice::from_ref(&path), &mut solver).unwrap();

    let plan = synthesize(
        &bdd,
        std::slice::from_ref(&path),
        bdd.process_root(),
        Target::X86,
        &mut solver,
        &MaximizeHardwareOffload,
        &SearchConfig::default(),
    )
    .unwrap();

    assert!(plan.leaves_are_terminal());
    let names: Vec<&str> = plan.modules().map(|m| m.name()).collect();
    assert_eq!(names, vec!["PacketBorrowNextChunk", "Ignore", "Forward"]);
}

/// S1 on the Tofino target: the unmodified return collapses to nothing
/// (spec.md §4.5's `Ignore` elision), so only the header parser and the
/// terminal forward remain.
#[test]
fn s1_synthesizes_a_tofino_plan_with_ignore_elided() {
    let path = CallPathBuilder::new("s1.call_path")
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(14, 32))).build())
        .call(CallBuilder::new("packet_return_chunk").arg("the_chunk", Arg::with_in_out(packet_byte(0), packet_byte(0))).build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(1, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(std::slice::from_ref(&path), &mut solver).unwrap();

    let plan = synthesize(
        &bdd,
        std::slice::from_ref(&path),
        bdd.process_root(),
        Target::Tofino,
        &mut solver,
        &MaximizeHardwareOffload,
        &SearchConfig::default(),
    )
    .unwrap();

    assert!(plan.leaves_are_terminal());
    let names: Vec<&str> = plan.modules().map(|m| m.name()).collect();
    assert_eq!(names, vec!["EthernetConsume", "Forward"]);
}

/// spec.md §8 scenario S2: an `If` module forks into fixed `Then`/`Else`
/// wrappers that each continue the search on their own BDD child.
#[test]
fn s2_synthesizes_if_then_else() {
    let ethertype = packet_byte(12);

    let fwd_path = CallPathBuilder::new("s2.fwd.call_path")
        .constraint(Expr::eq(&ethertype, &Expr::constant(0x08, 8)))
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(14, 32))).build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(1, 32))).build())
        .build();

    let drop_path = CallPathBuilder::new("s2.drop.call_path")
        .constraint(Expr::ne(&ethertype, &Expr::constant(0x08, 8)))
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(14, 32))).build())
        .call(CallBuilder::new("packet_receive").arg("VIGOR_DEVICE", Arg::new(Expr::constant(0, 32))).build())
        .build();

    let paths = vec![fwd_path, drop_path];
    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&paths, &mut solver).unwrap();

    let plan = synthesize(&bdd, &paths, bdd.process_root(), Target::X86, &mut solver, &MaximizeHardwareOffload, &SearchConfig::default()).unwrap();

    assert!(plan.leaves_are_terminal());
    assert!(plan.modules().any(|m| m.name() == "If"));
    assert!(plan.modules().any(|m| m.name() == "Forward"));
    assert!(plan.modules().any(|m| m.name() == "Drop"));
}

/// spec.md §8 property 7: `module.equals(module.clone())`.
#[test]
fn module_equality_is_idempotent_under_cloning() {
    let forward: Box<dyn Module> = Box::new(x86::Forward { port: 4 });
    let cloned = forward.clone();
    assert!(forward.equals(cloned.as_ref()));

    let other: Box<dyn Module> = Box::new(x86::Forward { port: 5 });
    assert!(!forward.equals(other.as_ref()));

    let drop_a: Box<dyn Module> = Box::new(p4::Drop { target: Target::Tofino });
    let drop_b = drop_a.clone();
    assert!(drop_a.equals(drop_b.as_ref()));
}

/// A call no module of the target recognizes surfaces as spec.md §7's
/// "unhandled call" error, not a bare `no_plan_for_target`.
#[test]
fn unrecognized_call_is_reported_by_name() {
    let path = CallPathBuilder::new("unhandled.call_path")
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("map_erase").build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(std::slice::from_ref(&path), &mut solver).unwrap();

    let err = synthesize(
        &bdd,
        std::slice::from_ref(&path),
        bdd.process_root(),
        Target::X86,
        &mut solver,
        &MaximizeHardwareOffload,
        &SearchConfig::default(),
    )
    .unwrap_err();

    match err {
        Error::UnhandledCall(e) => assert_eq!(e.function, "map_erase"),
        other => panic!("expected UnhandledCall, found {:?}", other),
    }
}

/// spec.md §8 scenario S4: a call no P4 module absorbs (but x86 does)
/// still completes the plan via `SendToController`'s cross-target edge.
#[test]
fn s4_escapes_to_controller_when_p4_cannot_absorb() {
    let path = CallPathBuilder::new("s4.call_path")
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("expire_items_single_map").build())
        .call(CallBuilder::new("packet_receive").arg("VIGOR_DEVICE", Arg::new(Expr::constant(0, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(std::slice::from_ref(&path), &mut solver).unwrap();

    let plan = synthesize(
        &bdd,
        std::slice::from_ref(&path),
        bdd.process_root(),
        Target::Tofino,
        &mut solver,
        &MaximizeHardwareOffload,
        &SearchConfig::default(),
    )
    .unwrap();

    assert!(plan.leaves_are_terminal());
    assert!(plan.modules().any(|m| m.name() == "SendToController"));
    assert!(plan.modules().any(|m| m.name() == "Drop"));
}

/// `MaximizeHardwareOffload` never changes the set of recognized modules,
/// only which complete plan the search returns first (spec.md §4.5: "the
/// heuristic is pure ... swapping heuristics must not affect correctness,
/// only the chosen plan").
#[derive(Debug, Clone, Copy, Default)]
struct FirstComplete;
impl Heuristic for FirstComplete {
    fn pick(&self, frontier: &[ExecutionPlan]) -> Option<usize> {
        frontier.iter().position(|p| p.is_complete()).or(if frontier.is_empty() { None } else { Some(0) })
    }
}

#[test]
fn alternate_heuristic_still_reaches_a_terminal_plan() {
    let path = CallPathBuilder::new("heuristic.call_path")
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_borrow_next_chunk").arg("length", Arg::new(Expr::constant(14, 32))).build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(7, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(std::slice::from_ref(&path), &mut solver).unwrap();

    let plan = synthesize(&bdd, std::slice::from_ref(&path), bdd.process_root(), Target::Tofino, &mut solver, &FirstComplete, &SearchConfig::default()).unwrap();

    assert!(plan.leaves_are_terminal());
    assert!(plan.modules().any(|m| m.name() == "Forward"));
}
