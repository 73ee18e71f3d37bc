//! `tc` command construction.
//!
//! Plain form: one `qdisc add dev IF root netem TOKENS`.
//!
//! Filtered form (targets or ports given), so that only matching traffic is
//! affected:
//!
//! ```text
//! qdisc add dev IF root handle 1: prio                 # bands 1:1 1:2 1:3
//! qdisc add dev IF parent 1:1 handle 10: sfq
//! qdisc add dev IF parent 1:2 handle 20: sfq
//! qdisc add dev IF parent 1:3 handle 30: netem TOKENS
//! filter add dev IF protocol ip parent 1:0 prio 1 u32 match ip dst CIDR flowid 1:3
//! filter add ... match ip sport PORT 0xffff flowid 1:3
//! filter add ... match ip dport PORT 0xffff flowid 1:3
//! ```
//!
//! Unmatched traffic falls through to band 1:1. Band 1:2 is never targeted
//! by a filter but is always provisioned.
//!
//! Every command is returned as the argument list that follows `tc`.

use super::filter::TrafficFilter;

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn filter_rule(iface: &str, selector: &[&str]) -> Vec<String> {
    let mut rule = args(&[
        "filter", "add", "dev", iface, "protocol", "ip", "parent", "1:0", "prio", "1", "u32",
        "match", "ip",
    ]);
    rule.extend(args(selector));
    rule.extend(args(&["flowid", "1:3"]));
    rule
}

/// Commands that apply `tokens` on `iface`, restricted by `filter`.
pub fn apply_commands(iface: &str, tokens: &[String], filter: &TrafficFilter) -> Vec<Vec<String>> {
    if filter.is_empty() {
        let mut add = args(&["qdisc", "add", "dev", iface, "root", "netem"]);
        add.extend(tokens.iter().cloned());
        return vec![add];
    }

    let mut netem = args(&["qdisc", "add", "dev", iface, "parent", "1:3", "handle", "30:", "netem"]);
    netem.extend(tokens.iter().cloned());

    let mut commands = vec![
        args(&["qdisc", "add", "dev", iface, "root", "handle", "1:", "prio"]),
        args(&["qdisc", "add", "dev", iface, "parent", "1:1", "handle", "10:", "sfq"]),
        args(&["qdisc", "add", "dev", iface, "parent", "1:2", "handle", "20:", "sfq"]),
        netem,
    ];

    for target in &filter.targets {
        let cidr = target.to_string();
        commands.push(filter_rule(iface, &["dst", &cidr]));
    }
    for port in &filter.sports {
        let port = port.to_string();
        commands.push(filter_rule(iface, &["sport", &port, "0xffff"]));
    }
    for port in &filter.dports {
        let port = port.to_string();
        commands.push(filter_rule(iface, &["dport", &port, "0xffff"]));
    }

    commands
}

/// Commands that remove what [`apply_commands`] installed.
///
/// The filtered form deletes child qdiscs before the root.
pub fn revert_commands(iface: &str, filter: &TrafficFilter) -> Vec<Vec<String>> {
    if filter.is_empty() {
        return vec![args(&["qdisc", "del", "dev", iface, "root", "netem"])];
    }

    vec![
        args(&["qdisc", "del", "dev", iface, "parent", "1:1", "handle", "10:"]),
        args(&["qdisc", "del", "dev", iface, "parent", "1:2", "handle", "20:"]),
        args(&["qdisc", "del", "dev", iface, "parent", "1:3", "handle", "30:"]),
        args(&["qdisc", "del", "dev", iface, "root", "handle", "1:", "prio"]),
    ]
}

/// Full command line for logging.
pub fn command_line(argv: &[String]) -> String {
    format!("tc {}", argv.join(" "))
}
