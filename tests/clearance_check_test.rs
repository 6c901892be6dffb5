//! End-to-end scenarios for the copper clearance check

use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use board_drc::geometry::{Path, Point};
use board_drc::{
    Board, CheckContext, CheckId, CheckLevel, ClearanceRule, LayerRange, NetTie, PatchKey,
    PatchStore, PatchType, RuleSet,
};

fn mm(v: f64) -> i64 {
    (v * 1_000_000.0).round() as i64
}

fn rect(x0: i64, y0: i64, x1: i64, y1: i64) -> Path {
    vec![
        Point::new(x0, y0),
        Point::new(x1, y0),
        Point::new(x1, y1),
        Point::new(x0, y1),
    ]
}

fn track_key(net: board_drc::NetId) -> PatchKey {
    PatchKey {
        patch_type: PatchType::Track,
        layer: LayerRange::single(0),
        net: Some(net),
    }
}

fn no_status(_: &str) {}

#[test]
fn test_two_patches_closer_than_clearance_fail() {
    let mut board = Board::two_layer();
    let gnd = board.add_net("GND");
    let vcc = board.add_net("VCC");

    let mut store = PatchStore::new();
    store.insert(track_key(gnd), vec![rect(0, 0, mm(1.0), mm(1.0))]);
    // 0.1 mm gap against a 0.2 mm rule
    store.insert(track_key(vcc), vec![rect(mm(1.1), 0, mm(2.1), mm(1.0))]);

    let mut rules = RuleSet::new();
    rules.add_clearance_copper(ClearanceRule::new(0, mm(0.2) as u64));

    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let r = board_drc::run_check(CheckId::ClearanceCopper, &ctx, &no_status, &cancel);

    assert_eq!(r.level, CheckLevel::Fail);
    assert_eq!(r.errors.len(), 1);
    let e = &r.errors[0];
    assert_eq!(e.level, CheckLevel::Fail);
    assert!(e.comment.contains("GND"), "comment: {}", e.comment);
    assert!(e.comment.contains("VCC"), "comment: {}", e.comment);
    assert!(e.location.is_some());
    assert!(!e.error_polygons.is_empty());
    assert_eq!(e.layers, vec![0]);
}

#[test]
fn test_two_patches_farther_than_clearance_pass() {
    let mut board = Board::two_layer();
    let gnd = board.add_net("GND");
    let vcc = board.add_net("VCC");

    let mut store = PatchStore::new();
    store.insert(track_key(gnd), vec![rect(0, 0, mm(1.0), mm(1.0))]);
    // 0.3 mm gap against a 0.2 mm rule
    store.insert(track_key(vcc), vec![rect(mm(1.3), 0, mm(2.3), mm(1.0))]);

    let mut rules = RuleSet::new();
    rules.add_clearance_copper(ClearanceRule::new(0, mm(0.2) as u64));

    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let r = board_drc::run_check(CheckId::ClearanceCopper, &ctx, &no_status, &cancel);

    assert_eq!(r.level, CheckLevel::Pass);
    assert!(r.errors.is_empty());
}

#[test]
fn test_all_gaps_below_clearance_are_found() {
    // pruning soundness end to end: every pair with a gap below the
    // rule distance must survive the bbox filter and be reported
    let mut board = Board::two_layer();
    let mut store = PatchStore::new();
    let gaps = [mm(0.05), mm(0.15), mm(0.199), mm(0.25), mm(0.4)];
    for (i, gap) in gaps.iter().enumerate() {
        let a = board.add_net(&format!("A{i}"));
        let b = board.add_net(&format!("B{i}"));
        let y = i as i64 * mm(10.0);
        store.insert(track_key(a), vec![rect(0, y, mm(1.0), y + mm(1.0))]);
        store.insert(
            track_key(b),
            vec![rect(mm(1.0) + gap, y, mm(2.0) + gap, y + mm(1.0))],
        );
    }

    let mut rules = RuleSet::new();
    rules.add_clearance_copper(ClearanceRule::new(0, mm(0.2) as u64));

    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let r = board_drc::run_check(CheckId::ClearanceCopper, &ctx, &no_status, &cancel);

    assert_eq!(r.level, CheckLevel::Fail);
    assert_eq!(r.errors.len(), 3, "gaps below 0.2 mm must all be reported");
}

#[test]
fn test_net_tie_bridge_is_suppressed() {
    let mut board = Board::two_layer();
    let gnd = board.add_net("GND");
    let agnd = board.add_net("AGND");
    board.net_ties.push(NetTie {
        net_primary: gnd,
        net_secondary: agnd,
    });

    let mut store = PatchStore::new();
    store.insert(track_key(gnd), vec![rect(0, 0, mm(1.0), mm(1.0))]);
    store.insert(
        PatchKey {
            patch_type: PatchType::NetTie,
            layer: LayerRange::single(0),
            net: Some(agnd),
        },
        // bridges right up to the GND patch
        vec![rect(mm(1.05), 0, mm(2.0), mm(1.0))],
    );

    let mut rules = RuleSet::new();
    rules.add_clearance_copper(ClearanceRule::new(0, mm(0.2) as u64));

    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let r = board_drc::run_check(CheckId::ClearanceCopper, &ctx, &no_status, &cancel);
    assert_eq!(r.level, CheckLevel::Pass);
    assert!(r.errors.is_empty());
}

#[test]
fn test_net_tie_with_wrong_partner_still_fails() {
    let mut board = Board::two_layer();
    let gnd = board.add_net("GND");
    let agnd = board.add_net("AGND");
    let other = board.add_net("OTHER");
    board.net_ties.push(NetTie {
        net_primary: agnd,
        net_secondary: other,
    });

    let mut store = PatchStore::new();
    store.insert(track_key(gnd), vec![rect(0, 0, mm(1.0), mm(1.0))]);
    store.insert(
        PatchKey {
            patch_type: PatchType::NetTie,
            layer: LayerRange::single(0),
            net: Some(agnd),
        },
        vec![rect(mm(1.05), 0, mm(2.0), mm(1.0))],
    );

    let mut rules = RuleSet::new();
    rules.add_clearance_copper(ClearanceRule::new(0, mm(0.2) as u64));

    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let r = board_drc::run_check(CheckId::ClearanceCopper, &ctx, &no_status, &cancel);
    assert_eq!(r.level, CheckLevel::Fail);
}

#[test]
fn test_missing_rule_is_observable() {
    let mut board = Board::two_layer();
    let gnd = board.add_net("GND");
    let vcc = board.add_net("VCC");

    let mut store = PatchStore::new();
    // overlapping copper of different nets, no rules defined at all
    store.insert(track_key(gnd), vec![rect(0, 0, mm(1.0), mm(1.0))]);
    store.insert(track_key(vcc), vec![rect(mm(0.5), 0, mm(1.5), mm(1.0))]);

    let rules = RuleSet::new();
    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let r = board_drc::run_check(CheckId::ClearanceCopper, &ctx, &no_status, &cancel);

    // the overlap itself still fails, and the silent zero clearance is
    // called out as a warning
    assert_eq!(r.level, CheckLevel::Fail);
    assert!(r
        .errors
        .iter()
        .any(|e| e.level == CheckLevel::Warn && e.comment.contains("No clearance rule")));
}

#[test]
fn test_cancellation_before_work_yields_not_run() {
    let mut board = Board::two_layer();
    let gnd = board.add_net("GND");
    let vcc = board.add_net("VCC");
    let mut store = PatchStore::new();
    store.insert(track_key(gnd), vec![rect(0, 0, mm(1.0), mm(1.0))]);
    store.insert(track_key(vcc), vec![rect(mm(1.1), 0, mm(2.1), mm(1.0))]);
    let mut rules = RuleSet::new();
    rules.add_clearance_copper(ClearanceRule::new(0, mm(0.2) as u64));

    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(true);
    for id in CheckId::ALL {
        let r = board_drc::run_check(id, &ctx, &no_status, &cancel);
        assert_eq!(r.level, CheckLevel::NotRun, "check {:?}", id);
        assert!(r.errors.is_empty(), "check {:?}", id);
    }
}

#[test]
fn test_progress_is_reported_and_result_serializes() -> anyhow::Result<()> {
    let mut board = Board::two_layer();
    let gnd = board.add_net("GND");
    let vcc = board.add_net("VCC");
    let mut store = PatchStore::new();
    store.insert(track_key(gnd), vec![rect(0, 0, mm(1.0), mm(1.0))]);
    store.insert(track_key(vcc), vec![rect(mm(1.1), 0, mm(2.1), mm(1.0))]);
    let mut rules = RuleSet::new();
    rules.add_clearance_copper(ClearanceRule::new(0, mm(0.2) as u64));

    let messages: Mutex<Vec<String>> = Mutex::new(Vec::new());
    let status = |s: &str| messages.lock().unwrap().push(s.to_string());

    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let r = board_drc::run_check(CheckId::ClearanceCopper, &ctx, &status, &cancel);

    let messages = messages.into_inner().unwrap();
    assert!(messages.iter().any(|m| m.contains("Getting patches")));
    assert!(messages.iter().any(|m| m.contains("Expanding patch")));

    let json = serde_json::to_string(&r)?;
    assert!(json.contains("Fail"));
    assert!(json.contains("error_polygons"));
    Ok(())
}

#[test]
fn test_run_all_reports_every_check() {
    let board = Board::two_layer();
    let store = PatchStore::new();
    let rules = RuleSet::new();
    let ctx = CheckContext {
        board: &board,
        store: &store,
        rules: &rules,
    };
    let cancel = AtomicBool::new(false);
    let results = board_drc::run_all(&ctx, &no_status, &cancel);
    assert_eq!(results.len(), CheckId::ALL.len());
    for (id, r) in &results {
        assert_eq!(r.level, CheckLevel::Pass, "check {:?} on empty board", id);
    }
}
