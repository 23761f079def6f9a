use super::*;
use crate::call::{Arg, CallBuilder, CallPathBuilder};
use crate::solver::{SolverConfig, SolverContext};

fn packet_byte(offset: u64) -> Expr {
    Expr::read_lsb("packet_chunks", offset, 8)
}

/// spec.md §8 scenario S1: a single straight-line call path with no
/// branches at all.
#[test]
fn single_chain_forwards_to_expected_port() {
    let path = CallPathBuilder::new("s1.call_path")
        .call(CallBuilder::new("packet_receive").arg("VIGOR_DEVICE", Arg::new(Expr::constant(0, 32))).build())
        .call(CallBuilder::new("start_time").build())
        .call(
            CallBuilder::new("packet_borrow_next_chunk")
                .arg("length", Arg::new(Expr::constant(14, 32)))
                .build(),
        )
        .call(CallBuilder::new("packet_return_chunk").arg("the_chunk", Arg::with_in_out(packet_byte(0), packet_byte(0))).build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(1, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&[path], &mut solver).unwrap();
    bdd.check_shape().unwrap();

    match bdd.node(bdd.init_root()) {
        Node::ReturnInit { value, .. } => assert_eq!(*value, ReturnInitValue::Success),
        other => panic!("expected ReturnInit, found {:?}", other),
    }

    let mut cursor = bdd.node(bdd.process_root());
    let mut functions = Vec::new();
    loop {
        match cursor {
            Node::Call { call, next, .. } => {
                functions.push(call.function.to_string());
                cursor = bdd.node(*next);
            }
            Node::ReturnProcess { operation, .. } => {
                assert_eq!(*operation, ReturnProcessOp::Fwd(1));
                break;
            }
            other => panic!("unexpected node in process chain: {:?}", other),
        }
    }
    assert_eq!(functions, vec!["packet_borrow_next_chunk", "packet_return_chunk"]);
}

/// spec.md §8 scenario S2: two call paths agree up to the Ethernet
/// ethertype byte, then diverge into `Fwd` vs `Drop`.
#[test]
fn diverging_ethertype_produces_a_branch() {
    let ethertype = packet_byte(12);

    let ipv4_path = CallPathBuilder::new("s2.ipv4.call_path")
        .constraint(Expr::eq(&ethertype, &Expr::constant(0x08, 8)))
        .call(CallBuilder::new("start_time").build())
        .call(
            CallBuilder::new("packet_borrow_next_chunk")
                .arg("length", Arg::new(Expr::constant(14, 32)))
                .build(),
        )
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(1, 32))).build())
        .build();

    let other_path = CallPathBuilder::new("s2.other.call_path")
        .constraint(Expr::ne(&ethertype, &Expr::constant(0x08, 8)))
        .call(CallBuilder::new("start_time").build())
        .call(
            CallBuilder::new("packet_borrow_next_chunk")
                .arg("length", Arg::new(Expr::constant(14, 32)))
                .build(),
        )
        .call(CallBuilder::new("packet_receive").arg("VIGOR_DEVICE", Arg::new(Expr::constant(0, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&[ipv4_path, other_path], &mut solver).unwrap();
    bdd.check_shape().unwrap();

    let has_branch = bdd.iter().any(|n| matches!(n, Node::Branch { .. }));
    assert!(has_branch, "expected a Branch node separating the two ethertype outcomes");

    let has_fwd = bdd.iter().any(|n| matches!(n, Node::ReturnProcess { operation: ReturnProcessOp::Fwd(1), .. }));
    let has_drop = bdd.iter().any(|n| matches!(n, Node::ReturnProcess { operation: ReturnProcessOp::Drop, .. }));
    assert!(has_fwd);
    assert!(has_drop);
}

/// A path that never reaches `start_time` fails to initialize (spec.md
/// §4.4's `ReturnInit::Failure` case).
#[test]
fn missing_marker_call_yields_init_failure() {
    let path = CallPathBuilder::new("no_marker.call_path")
        .call(CallBuilder::new("packet_receive").arg("VIGOR_DEVICE", Arg::new(Expr::constant(0, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&[path], &mut solver).unwrap();

    match bdd.node(bdd.init_root()) {
        Node::ReturnInit { value, .. } => assert_eq!(*value, ReturnInitValue::Failure),
        other => panic!("expected ReturnInit, found {:?}", other),
    }
}

/// spec.md §4.4's skip-condition rule: a branch whose condition reads only
/// `received_a_packet` is elided in favor of its `on_true` child, even
/// though both children are independently feasible.
#[test]
fn skip_condition_branch_is_elided() {
    let flag = Expr::read("received_a_packet", &Expr::constant(0, 32));

    let on_true = CallPathBuilder::new("skip.true.call_path")
        .constraint(Expr::eq(&flag, &Expr::constant(1, 8)))
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(5, 32))).build())
        .build();

    let on_false = CallPathBuilder::new("skip.false.call_path")
        .constraint(Expr::eq(&flag, &Expr::constant(0, 8)))
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_receive").arg("VIGOR_DEVICE", Arg::new(Expr::constant(0, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&[on_true, on_false], &mut solver).unwrap();
    bdd.check_shape().unwrap();

    assert!(!bdd.iter().any(|n| matches!(n, Node::Branch { .. })), "skip-condition branch should have been elided");
    match bdd.node(bdd.process_root()) {
        Node::ReturnProcess { operation, .. } => assert_eq!(*operation, ReturnProcessOp::Fwd(5)),
        other => panic!("expected ReturnProcess, found {:?}", other),
    }
}

/// spec.md §4.4's "replaced by their feasible child" rule: a branch
/// encountered before `start_time` elides to whichever child actually
/// continues, even when that child is `on_false` rather than `on_true`.
#[test]
fn pre_init_branch_prefers_the_side_that_actually_initializes() {
    let flag = Expr::read("feasibility_flag", &Expr::constant(0, 32));

    // on_true never calls `start_time` at all, so walking it alone would
    // terminate the process BDD in an init failure.
    let on_true = CallPathBuilder::new("feasible.true.call_path")
        .constraint(Expr::eq(&flag, &Expr::constant(1, 8)))
        .call(CallBuilder::new("packet_receive").arg("VIGOR_DEVICE", Arg::new(Expr::constant(0, 32))).build())
        .build();

    // on_false is the side that actually reaches `start_time` and forwards.
    let on_false = CallPathBuilder::new("feasible.false.call_path")
        .constraint(Expr::eq(&flag, &Expr::constant(0, 8)))
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(9, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&[on_true, on_false], &mut solver).unwrap();
    bdd.check_shape().unwrap();

    match bdd.node(bdd.process_root()) {
        Node::Call { call, next, .. } => {
            assert_eq!(call.function.as_ref(), "packet_send");
            match bdd.node(*next) {
                Node::ReturnProcess { operation, .. } => assert_eq!(*operation, ReturnProcessOp::Fwd(9)),
                other => panic!("expected ReturnProcess, found {:?}", other),
            }
        }
        other => panic!("expected the feasible (on_false) chain to survive, found {:?}", other),
    }
}

#[test]
fn clone_with_renumbering_produces_dense_ids() {
    let path = CallPathBuilder::new("s1.call_path")
        .call(CallBuilder::new("start_time").build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(2, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&[path], &mut solver).unwrap();
    let (sub, new_root) = bdd.clone_with_renumbering(bdd.process_root());
    sub.check_shape().unwrap();
    assert_eq!(new_root, sub.len() - 1);
}

#[test]
fn serialize_then_deserialize_round_trips() {
    let path = CallPathBuilder::new("s6.call_path")
        .call(CallBuilder::new("start_time").build())
        .call(
            CallBuilder::new("packet_borrow_next_chunk")
                .arg("length", Arg::new(Expr::constant(14, 32)))
                .build(),
        )
        .call(CallBuilder::new("packet_return_chunk").arg("the_chunk", Arg::with_in_out(packet_byte(0), packet_byte(0))).build())
        .call(CallBuilder::new("packet_send").arg("dst_device", Arg::new(Expr::constant(3, 32))).build())
        .build();

    let mut solver = SolverContext::new(SolverConfig::default());
    let bdd = Bdd::build(&[path.clone()], &mut solver).unwrap();

    let text = serialize(&bdd, &[path]);
    let (round_tripped, _paths) = deserialize(&text).unwrap();
    round_tripped.check_shape().unwrap();

    assert_eq!(bdd.len(), round_tripped.len());

    let kinds = |b: &Bdd| -> Vec<&'static str> {
        b.iter()
            .map(|n| match n {
                Node::Branch { .. } => "branch",
                Node::Call { .. } => "call",
                Node::ReturnInit { .. } => "return_init",
                Node::ReturnProcess { .. } => "return_process",
            })
            .collect()
    };
    assert_eq!(kinds(&bdd), kinds(&round_tripped));
}
