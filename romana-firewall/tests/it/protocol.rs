use romana_firewall::{
    planner::{FORWARD_IN, INPUT},
    DivertAction, Error, Placement, RuleSpec, Target,
};
use romana_ledger::RuleState;

use crate::common::{tap123, Harness};

fn forward_drop() -> RuleSpec {
    RuleSpec::Default { chain: "ROMANA-T2S3-FORWARD".to_owned(), target: Target::Drop }
}

#[test]
fn ensure_last_twice_appends_once() {
    let h = Harness::new();
    h.firewall.kernel().create_chain("ROMANA-T2S3-FORWARD").unwrap();
    h.kernel.clear_commands();

    h.firewall.ensure_rule(&forward_drop(), Placement::Last).unwrap();
    h.firewall.ensure_rule(&forward_drop(), Placement::Last).unwrap();

    assert_eq!(h.kernel.issued("-A"), ["ROMANA-T2S3-FORWARD -j DROP"]);
    assert_eq!(h.kernel.issued("-C").len(), 2);
    assert_eq!(h.kernel.commands().len(), 3);
    assert_eq!(h.kernel.rules("ROMANA-T2S3-FORWARD"), ["ROMANA-T2S3-FORWARD -j DROP"]);
}

#[test]
fn ensure_absent_on_missing_rule_only_checks() {
    let h = Harness::new();

    h.firewall.ensure_rule(&forward_drop(), Placement::Absent).unwrap();

    let commands = h.kernel.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0][0], "-C");
    assert!(h.kernel.issued("-D").is_empty());
}

#[test]
fn divert_install_orders_ledger_and_kernel() {
    let h = Harness::new();
    let plan = h.firewall.plan(&tap123()).unwrap();

    h.firewall.divert_traffic(&plan, INPUT, DivertAction::Install).unwrap();

    assert_eq!(
        h.journal(),
        [
            "ledger add INPUT -i tap123 -j ROMANA-T2S3-INPUT",
            "kernel -C INPUT -i tap123 -j ROMANA-T2S3-INPUT",
            "kernel -A INPUT -i tap123 -j ROMANA-T2S3-INPUT",
            "ledger active INPUT -i tap123 -j ROMANA-T2S3-INPUT",
        ]
    );
    assert_eq!(h.ledger.state_of("INPUT -i tap123 -j ROMANA-T2S3-INPUT"), Some(RuleState::Active));
}

#[test]
fn ledger_failure_blocks_kernel() {
    let h = Harness::new();
    let plan = h.firewall.plan(&tap123()).unwrap();
    h.ledger.fail_add(true);

    let err = h.firewall.divert_traffic(&plan, INPUT, DivertAction::Install).unwrap_err();

    assert!(matches!(err, Error::Ledger(_)));
    assert_eq!(h.journal(), ["ledger add INPUT -i tap123 -j ROMANA-T2S3-INPUT"]);
    assert!(h.kernel.commands().is_empty());
}

#[test]
fn kernel_failure_leaves_inactive_record_and_retry_converges() {
    let h = Harness::new();
    let plan = h.firewall.plan(&tap123()).unwrap();
    h.kernel.fail_on("-A");

    let err = h.firewall.divert_traffic(&plan, INPUT, DivertAction::Install).unwrap_err();
    assert!(matches!(err, Error::Kernel(_)));
    assert_eq!(h.ledger.state_of("INPUT -i tap123 -j ROMANA-T2S3-INPUT"), Some(RuleState::Inactive));

    h.kernel.heal();
    h.firewall.divert_traffic(&plan, INPUT, DivertAction::Install).unwrap();

    assert_eq!(h.ledger.state_of("INPUT -i tap123 -j ROMANA-T2S3-INPUT"), Some(RuleState::Active));
    assert_eq!(h.ledger.len(), 1);
    assert_eq!(h.kernel.rules("INPUT"), ["INPUT -i tap123 -j ROMANA-T2S3-INPUT"]);
}

#[test]
fn divert_remove_converges_to_absent() {
    let h = Harness::new();
    let plan = h.firewall.plan(&tap123()).unwrap();
    h.firewall.divert_traffic(&plan, INPUT, DivertAction::Install).unwrap();
    h.clear_journal();

    h.firewall.divert_traffic(&plan, INPUT, DivertAction::Remove).unwrap();

    assert_eq!(
        h.journal(),
        [
            "ledger add INPUT -i tap123 -j ROMANA-T2S3-INPUT",
            "kernel -C INPUT -i tap123 -j ROMANA-T2S3-INPUT",
            "kernel -D INPUT -i tap123 -j ROMANA-T2S3-INPUT",
            "ledger active INPUT -i tap123 -j ROMANA-T2S3-INPUT",
        ]
    );
    assert!(h.kernel.rules("INPUT").is_empty());
    assert_eq!(h.ledger.state_of("INPUT -i tap123 -j ROMANA-T2S3-INPUT"), Some(RuleState::Active));

    // The stale record is dropped by repair.
    let report = h.firewall.repair().unwrap();
    assert_eq!(report.dropped, ["INPUT -i tap123 -j ROMANA-T2S3-INPUT"]);
    assert_eq!(h.ledger.len(), 0);
}

#[test]
fn default_drop_rule_scenario() {
    let h = Harness::new();
    let plan = h.firewall.plan(&tap123()).unwrap();
    h.firewall.create_chains(&plan, &[FORWARD_IN]).unwrap();
    h.clear_journal();

    let rule = h.firewall.create_default_rule(&plan, FORWARD_IN, Target::Drop).unwrap();

    assert_eq!(rule.body(), "ROMANA-T2S3-FORWARD -j DROP");
    assert!(rule.is_active());
    assert_eq!(
        h.journal(),
        [
            "ledger add ROMANA-T2S3-FORWARD -j DROP",
            "kernel -C ROMANA-T2S3-FORWARD -j DROP",
            "kernel -A ROMANA-T2S3-FORWARD -j DROP",
            "ledger active ROMANA-T2S3-FORWARD -j DROP",
        ]
    );

    // Already present: the record is reused and nothing is appended.
    h.clear_journal();
    h.firewall.create_default_drop_rule(&plan, FORWARD_IN).unwrap();
    assert_eq!(
        h.journal(),
        [
            "ledger add ROMANA-T2S3-FORWARD -j DROP",
            "kernel -C ROMANA-T2S3-FORWARD -j DROP",
            "ledger active ROMANA-T2S3-FORWARD -j DROP",
        ]
    );
}

#[test]
#[allow(deprecated)]
fn u32_expression_is_a_single_argument() {
    let h = Harness::new();
    let plan = h.firewall.plan(&tap123()).unwrap();
    h.firewall.create_chains(&plan, &[FORWARD_IN]).unwrap();

    let rule = h.firewall.create_u32_rule(&plan, FORWARD_IN).unwrap();

    let expression = "12&0xFF00FF00=0xA002300 && 16&0xFF00FF00=0xA002300";
    assert_eq!(rule.body(), format!("ROMANA-T2S3-FORWARD -m u32 --u32 {expression} -j ACCEPT"));

    let append = h.kernel.commands().into_iter().find(|c| c[0] == "-A").unwrap();
    assert_eq!(append, ["-A", "ROMANA-T2S3-FORWARD", "-m", "u32", "--u32", expression, "-j", "ACCEPT"]);
}
