use std::net::Ipv4Addr;

use parking_lot::Mutex;
use romana::{Endpoint, Execute, Firewall, Iptables, NetworkSettings, Output, SqliteLedger};
use rustc_hash::FxHashSet;
use tracing_subscriber::EnvFilter;

/// Prints iptables commands instead of running them, keeping track of what
/// would be installed so that existence checks answer consistently.
#[derive(Default)]
struct DryRun {
    installed: Mutex<FxHashSet<String>>,
}

impl Execute for DryRun {
    fn execute(&self, program: &str, args: &[String]) -> romana::ExecResult<Output> {
        let key = args[1..].join(" ");
        let mut installed = self.installed.lock();

        let ok = match args[0].as_str() {
            "-L" | "-C" => installed.contains(&key),
            "-D" => installed.remove(&key),
            _ => {
                println!("{program} {}", args.join(" "));
                installed.insert(key)
            }
        };

        if ok {
            Ok(Output::success(""))
        } else {
            Err(romana::ExecError::NonZero {
                program: program.to_owned(),
                output: Output::failure(1, ""),
            })
        }
    }
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let dir = tempfile::tempdir().unwrap();
    let ledger = SqliteLedger::open(dir.path().join("rules.db")).unwrap();
    let firewall =
        Firewall::new(Iptables::new(DryRun::default()), ledger, NetworkSettings::default());

    let endpoint = Endpoint::new("tap123", Ipv4Addr::new(10, 0, 35, 5));

    println!("# provision {}", endpoint.interface);
    firewall.provision_endpoint(&endpoint).unwrap();

    println!("# provision again");
    firewall.provision_endpoint(&endpoint).unwrap();

    for rule in firewall.list_rules().unwrap() {
        println!("ledger: {rule}");
    }

    println!("# cleanup {}", endpoint.interface);
    firewall.cleanup(&endpoint).unwrap();

    let report = firewall.repair().unwrap();
    println!("# repair: {} verified, clean: {}", report.verified, report.is_clean());
}
