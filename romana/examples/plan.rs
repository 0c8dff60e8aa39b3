use std::net::Ipv4Addr;

use romana::{planner::FORWARD_IN, ChainPlanner, Endpoint, NetworkSettings};

fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let addr: Ipv4Addr = std::env::args().nth(1).as_deref().unwrap_or("10.0.35.5").parse().unwrap();

    // 4 tenant bits, 4 segment bits, 8 endpoint bits in 10.0.0.0/8
    let planner = ChainPlanner::new(NetworkSettings::default());
    let plan = planner.plan(&Endpoint::new("tap0", addr)).unwrap();

    println!("tenant {} segment {}", plan.filter.tenant_id, plan.filter.segment_id);
    println!("u32 match: {}", plan.filter.expression);

    for chain in &plan.chains {
        for rule in chain.divert_rules(&plan.interface) {
            println!("{:<24} {}", chain.name, rule);
        }
    }

    println!("default: {} -j DROP", plan.chain(FORWARD_IN).unwrap().name);
}
