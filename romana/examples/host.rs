//! Provisions or cleans up one endpoint on this host. Needs root.
//!
//! ```sh
//! cargo run --example host -- romana.toml /var/lib/romana/rules.db tap123 10.0.35.5
//! cargo run --example host -- romana.toml /var/lib/romana/rules.db tap123 10.0.35.5 cleanup
//! ```

use romana::{Endpoint, Firewall, FirewallConfig, Runner, SqliteLedger};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [config, db, interface, addr, rest @ ..] = args.as_slice() else {
        eprintln!("usage: host <config.toml> <ledger.db> <interface> <address> [cleanup]");
        std::process::exit(2);
    };

    let config = FirewallConfig::load(config).unwrap();
    let ledger = SqliteLedger::open(db).unwrap();
    let firewall = Firewall::from_config(&config, Runner, ledger);
    let endpoint = Endpoint::new(interface.as_str(), addr.parse().unwrap());

    match rest.first().map(String::as_str) {
        Some("cleanup") => firewall.cleanup(&endpoint).unwrap(),
        Some("repair") => println!("{:?}", firewall.repair().unwrap()),
        _ => {
            let plan = firewall.provision_endpoint(&endpoint).unwrap();
            for chain in &plan.chains {
                println!("{}", chain.name);
            }
        }
    }
}
