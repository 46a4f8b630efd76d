// Thin daemon binary: reads a handful of environment variables, enables
// every configured interface, and runs the core's worker loop until killed.
// Anything more featureful (a config file, dynamic interface discovery)
// belongs in a wrapper around the library, not in this binary.

use std::env;
use std::net::Ipv4Addr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{error, info};

use montague_mdns::{MdnsConfig, Mdns};

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

fn main() {
    env_logger::init();

    let host_name = env_or("MDNSD_HOST_NAME", "mdnsd-host");
    let domain_name = env_or("MDNSD_DOMAIN_NAME", "local");
    let bind_addr = env_or("MDNSD_BIND_ADDR", "0.0.0.0");

    let ipv4: Ipv4Addr = match bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("MDNSD_BIND_ADDR `{}` is not a valid IPv4 address: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    let config = MdnsConfig::default()
        .with_host_name(host_name.clone())
        .with_domain_name(domain_name);

    let mdns = match Mdns::create(config) {
        Ok(mdns) => Arc::new(mdns),
        Err(e) => {
            error!("failed to initialise mdns core: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = mdns.enable(0, Some(ipv4), None) {
        error!("failed to enable interface 0: {}", e);
        std::process::exit(1);
    }
    info!("mdnsd running as {}.local on {}", host_name, ipv4);

    // No signal-handling crate in the dependency stack, so there's no
    // graceful SIGINT/SIGTERM path yet; the worker loop runs until killed.
    let shutdown = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&mdns).spawn_worker(shutdown);
    handle.join().expect("worker thread panicked");
    info!("mdnsd shutting down");
}
