use std::collections::HashSet;

use crate::classify::normalize_host;
use crate::normalize::ListStream;

/// Host named by an entry, with any `@@`/`||…^` wrapping removed but a
/// leading `*.` kept.
pub fn rule_host(entry: &str) -> &str {
    let entry = entry.strip_prefix("@@").unwrap_or(entry);
    let entry = entry.strip_prefix("||").unwrap_or(entry);
    entry.strip_suffix('^').unwrap_or(entry)
}

/// The "same host" key: `h`, `*.h`, `||h^`, `||*.h^` and `@@||h^` all
/// canonicalize to `h`.
fn canonical_host(entry: &str) -> &str {
    let host = rule_host(entry);
    host.strip_prefix("*.").unwrap_or(host)
}

/// Enforces the cross-stream invariant: exceptions left in the blocklist move
/// to the allowlist, and every blocklist entry naming an allowed host is
/// dropped. The allowlist wins unconditionally; there is no specificity
/// comparison.
pub fn separate(blocklist: &mut ListStream, allowlist: &mut ListStream) {
    let exceptions: Vec<String> = blocklist.exceptions.drain(..).collect();
    for exception in exceptions {
        if let Some(rule) = exception.strip_prefix("@@") {
            allowlist.rules.insert(rule.to_owned());
        }
    }

    let allowed_hosts: HashSet<String> = allowlist
        .domains
        .iter()
        .chain(allowlist.rules.iter())
        .map(|entry| canonical_host(entry).to_owned())
        .collect();
    blocklist
        .domains
        .retain(|entry| !allowed_hosts.contains(canonical_host(entry)));
    blocklist
        .rules
        .retain(|entry| !allowed_hosts.contains(canonical_host(entry)));

    // Anything that no longer parses as a host is dropped from both streams.
    blocklist
        .domains
        .retain(|entry| normalize_host(entry).is_some());
    blocklist
        .rules
        .retain(|entry| normalize_host(rule_host(entry)).is_some());
    allowlist
        .domains
        .retain(|entry| normalize_host(entry).is_some());
    allowlist
        .rules
        .retain(|entry| normalize_host(rule_host(entry)).is_some());
}
