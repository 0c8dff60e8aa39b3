use std::sync::Arc;

use romana_firewall::{
    planner::{FORWARD_IN, FORWARD_OUT, INPUT},
    Endpoint, Error, Firewall, FirewallConfig, Iptables, Kubernetes, OpenStack,
};
use romana_ledger::{MemoryLedger, RuleLedger};
use romana_net::NetworkSettings;

use crate::common::{tap123, tap999, FakeKernel, Harness, Journal};

#[test]
fn openstack_provisioning() {
    let h = Harness::new();

    let plan = h.firewall.provision_endpoint(&tap123()).unwrap();

    for chain in &plan.chains {
        assert!(h.kernel.has_chain(&chain.name), "missing chain {}", chain.name);
    }
    assert_eq!(h.kernel.rules("INPUT"), ["INPUT -i tap123 -j ROMANA-T2S3-INPUT"]);
    assert_eq!(h.kernel.rules("OUTPUT"), ["OUTPUT -o tap123 -j ROMANA-T2S3-OUTPUT"]);
    assert_eq!(
        h.kernel.rules("FORWARD"),
        ["FORWARD -i tap123 -j ROMANA-T2S3-FORWARD", "FORWARD -o tap123 -j ROMANA-T2"]
    );
    assert_eq!(h.kernel.rules("ROMANA-T2S3-FORWARD"), ["ROMANA-T2S3-FORWARD -j DROP"]);
    assert!(h.kernel.rules("ROMANA-T2").is_empty());

    let rules = h.firewall.list_rules().unwrap();
    assert_eq!(rules.len(), 5);
    assert!(rules.iter().all(|rule| rule.is_active()));
}

#[test]
fn reprovisioning_is_idempotent() {
    let h = Harness::new();
    h.firewall.provision_endpoint(&tap123()).unwrap();
    let resident = h.kernel.rule_count();
    h.kernel.clear_commands();

    h.firewall.provision_endpoint(&tap123()).unwrap();

    assert!(h.kernel.issued("-N").is_empty());
    assert!(h.kernel.issued("-A").is_empty());
    assert!(h.kernel.issued("-I").is_empty());
    assert_eq!(h.kernel.rule_count(), resident);
    assert_eq!(h.ledger.len(), 5);
}

#[test]
fn endpoints_of_one_segment_share_chains() {
    let h = Harness::new();
    h.firewall.provision_endpoint(&tap123()).unwrap();
    h.kernel.clear_commands();

    h.firewall.provision_endpoint(&tap999()).unwrap();

    assert!(h.kernel.issued("-N").is_empty());
    assert_eq!(h.kernel.rules("ROMANA-T2S3-FORWARD"), ["ROMANA-T2S3-FORWARD -j DROP"]);
    assert_eq!(h.kernel.rules("INPUT").len(), 2);
    // Four divert rules per endpoint plus the shared default rule.
    assert_eq!(h.ledger.len(), 9);
}

#[test]
fn kubernetes_provisioning() {
    let h = Harness::new().with_firewall(|fw| fw.with_environment(Box::new(Kubernetes)));

    h.firewall.provision_endpoint(&tap123()).unwrap();

    assert_eq!(h.kernel.rules("ROMANA-T2S3-INPUT"), ["ROMANA-T2S3-INPUT -j ACCEPT"]);
    assert_eq!(h.kernel.rules("ROMANA-T2S3-OUTPUT"), ["ROMANA-T2S3-OUTPUT -j ACCEPT"]);
    assert_eq!(h.kernel.rules("ROMANA-T2S3-FORWARD"), ["ROMANA-T2S3-FORWARD -j DROP"]);
    assert!(h.kernel.rules("ROMANA-T2").is_empty());
    assert_eq!(h.kernel.rules("FORWARD").len(), 2);
}

#[test]
fn openstack_legacy_u32_accepts_before_drop() {
    let h = Harness::new()
        .with_firewall(|fw| fw.with_environment(Box::new(OpenStack::new().with_legacy_u32(true))));

    h.firewall.provision_endpoint(&tap123()).unwrap();

    assert_eq!(
        h.kernel.rules("ROMANA-T2S3-FORWARD"),
        [
            "ROMANA-T2S3-FORWARD -m u32 --u32 12&0xFF00FF00=0xA002300 && 16&0xFF00FF00=0xA002300 -j ACCEPT",
            "ROMANA-T2S3-FORWARD -j DROP",
        ]
    );
}

#[test]
fn attached_rules_go_to_the_head_of_the_chain() {
    let h = Harness::new();
    let mut plan = h.firewall.plan(&tap123()).unwrap();
    plan.set_default_rules(INPUT, ["-m state --state RELATED,ESTABLISHED -j ACCEPT", "-p icmp -j ACCEPT"])
        .unwrap();
    plan.set_default_rules(FORWARD_OUT, ["-m state --state RELATED,ESTABLISHED -j ACCEPT"]).unwrap();

    h.firewall.provision(&plan).unwrap();

    assert_eq!(
        h.kernel.rules("ROMANA-T2S3-INPUT"),
        [
            "ROMANA-T2S3-INPUT -p icmp -j ACCEPT",
            "ROMANA-T2S3-INPUT -m state --state RELATED,ESTABLISHED -j ACCEPT",
        ]
    );
    assert_eq!(h.kernel.rules("ROMANA-T2"), ["ROMANA-T2 -m state --state RELATED,ESTABLISHED -j ACCEPT"]);
    assert_eq!(h.ledger.len(), 8);
}

#[test]
fn missing_chains_are_detected_and_created() {
    let h = Harness::new();
    let plan = h.firewall.plan(&tap123()).unwrap();
    h.firewall.kernel().create_chain("ROMANA-T2").unwrap();

    let missing = h.firewall.detect_missing_chains(&plan);
    assert_eq!(missing, [0, 1, 2]);

    h.firewall.create_chains(&plan, &missing).unwrap();
    assert!(h.firewall.detect_missing_chains(&plan).is_empty());
    assert!(h.firewall.chain_exists("ROMANA-T2S3-FORWARD"));
}

#[test]
fn chain_creation_failure_aborts_provisioning() {
    let h = Harness::new();
    h.kernel.fail_on("-N");

    let err = h.firewall.provision_endpoint(&tap123()).unwrap_err();

    assert!(matches!(err, Error::Kernel(_)));
    assert_eq!(h.kernel.issued("-N").len(), 1);
    assert_eq!(h.ledger.len(), 0);
}

#[test]
fn invalid_network_fails_planning() {
    let firewall = Firewall::new(
        Iptables::new(FakeKernel::new(Journal::default())),
        MemoryLedger::new(),
        NetworkSettings::new("10.0.0.0/255.0.255.0"),
    );

    let err = firewall.provision_endpoint(&tap123()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(firewall.ledger().list_all().unwrap().is_empty());
}

#[test]
fn firewall_from_config() {
    let config = FirewallConfig::from_toml_str(
        r#"
        tool = "/usr/sbin/iptables"
        environment = "kubernetes"

        [network]
        tenant_bits = 8
        segment_bits = 4
        endpoint_bits = 8
        pseudo_network = "10.0.0.0/8"
        "#,
    )
    .unwrap();
    let kernel = Arc::new(FakeKernel::new(Journal::default()));

    let firewall = Firewall::from_config(&config, Arc::clone(&kernel), MemoryLedger::new());
    assert_eq!(firewall.kernel().tool(), "/usr/sbin/iptables");
    assert_eq!(firewall.environment().name(), "kubernetes");
    assert_eq!(firewall.provider(), "iptables");

    // 10.4.37.7 with 8/4/8 bits: tenant 0x42, segment 5.
    let endpoint = Endpoint::new("veth0", "10.4.37.7".parse().unwrap());
    let plan = firewall.provision_endpoint(&endpoint).unwrap();

    assert_eq!(plan.chain(FORWARD_IN).unwrap().name, "ROMANA-T66S5-FORWARD");
    assert_eq!(kernel.rules("ROMANA-T66S5-INPUT"), ["ROMANA-T66S5-INPUT -j ACCEPT"]);
}
