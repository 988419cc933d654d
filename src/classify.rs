use std::net::IpAddr;

use nom::{
    bytes::complete::{tag, take_while1},
    combinator::{all_consuming, recognize, verify},
    multi::many0_count,
    sequence::pair,
    IResult,
};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Host;

/// What one raw input line normalizes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedLine {
    /// Blank line or comment.
    Skip,
    /// A punycoded, lowercased domain, possibly with a leading `*.` label.
    Domain(String),
    /// An ABP rule `||host^`; the payload is the host.
    AbpBlock(String),
    /// An ABP exception rule `@@||host^`; the payload is the host.
    AbpAllow(String),
    /// Recognized but deliberately dropped.
    Discard,
}

/// Longer separators first so `#@#` is not mistaken for `##` plus noise.
const ELEMENT_HIDING_SEPARATORS: [&str; 4] = ["#@?#", "#@#", "#?#", "##"];

/// First tokens that mark a hosts-file line.
const HOSTS_FILE_IPS: [&str; 5] = ["0.0.0.0", "127.0.0.1", "::", "::1", "fe80::1"];

/// Names every OS hosts file maps to loopback; never publishable.
const HOSTS_FILE_BOILERPLATE: [&str; 11] = [
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "ip6-localnet",
    "ip6-mcastprefix",
    "ip6-allnodes",
    "ip6-allrouters",
    "ip6-allhosts",
];

/// Characters that cannot appear in a domain, a hosts line, or an un-repaired
/// ABP rule; their presence means the line is regex-shaped.
const REGEX_METACHARACTERS: [char; 13] = [
    '^', '$', '(', ')', '[', ']', '{', '}', '+', '?', '\\', '|', '/',
];

const MAX_HOSTNAME_LEN: usize = 253;

/// The three canonical Pi-hole anchored patterns: `(^|\.)host$`, `^host$` and
/// `(\.|^)host$`, where the host is label characters and escaped dots only.
static PIHOLE_ANCHORED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\(\^\|\\\.\)|\(\\\.\|\^\)|\^)((?:[A-Za-z0-9-]|\\\.)+)\$$").unwrap()
});

/// Maps one raw line to its [`ClassifiedLine`]. Pure; dispatch order decides
/// ties, first match wins.
pub fn classify_line(raw: &str) -> ClassifiedLine {
    let mut line = raw.trim();
    if line.is_empty() || is_comment(line) || is_html_fragment(line) {
        return ClassifiedLine::Skip;
    }
    if let Some(idx) = inline_comment_start(line) {
        line = line[..idx].trim_end();
    }
    if line.is_empty() {
        return ClassifiedLine::Skip;
    }

    // Element-hiding rules are cosmetic filters, irrelevant to DNS.
    if ELEMENT_HIDING_SEPARATORS
        .iter()
        .any(|separator| line.contains(separator))
    {
        return ClassifiedLine::Discard;
    }

    if let Some(payload) = line.strip_prefix("@@") {
        return match repair_abp_rule(payload) {
            Some(host) => ClassifiedLine::AbpAllow(host),
            None => ClassifiedLine::Discard,
        };
    }

    if looks_like_abp_rule(line) {
        return match repair_abp_rule(line) {
            Some(host) => ClassifiedLine::AbpBlock(host),
            None => ClassifiedLine::Discard,
        };
    }

    if line.contains(&REGEX_METACHARACTERS[..]) {
        return match regex_to_abp(line) {
            Some(host) => ClassifiedLine::AbpBlock(host),
            None => ClassifiedLine::Discard,
        };
    }

    if let Some(candidate) = hosts_file_candidate(line) {
        let Some(token) = candidate else {
            return ClassifiedLine::Discard;
        };
        return match normalize_host(token) {
            Some(host) if !HOSTS_FILE_BOILERPLATE.contains(&host.as_str()) => {
                ClassifiedLine::Domain(host)
            }
            _ => ClassifiedLine::Discard,
        };
    }

    match normalize_host(line) {
        Some(host) => ClassifiedLine::Domain(host),
        None => ClassifiedLine::Discard,
    }
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with('!') || line.starts_with("//") || line.starts_with(';')
}

fn is_html_fragment(line: &str) -> bool {
    match (line.find('<'), line.rfind('>')) {
        (Some(open), Some(close)) => open < close,
        _ => false,
    }
}

/// Byte offset of the first inline comment marker (` #`, ` !`, ` //`, ` ;`),
/// if any. The marker must follow whitespace; a bare `#` inside a token is
/// left alone so element-hiding separators stay detectable.
fn inline_comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    (1..bytes.len()).find(|&idx| {
        bytes[idx - 1].is_ascii_whitespace()
            && (bytes[idx] == b'#'
                || bytes[idx] == b'!'
                || bytes[idx] == b';'
                || (bytes[idx] == b'/' && bytes.get(idx + 1) == Some(&b'/')))
    })
}

/// True when the line is already an ABP rule or can be repaired into one:
/// it carries a pipe anchor or ends in `^` once any `$option` list goes.
fn looks_like_abp_rule(line: &str) -> bool {
    let body = match line.find('$') {
        Some(idx) => &line[..idx],
        None => line,
    };
    line.starts_with('|') || body.ends_with('^') || body.ends_with("^|")
}

/// Repairs common malformed ABP shapes and returns the rule's host when a
/// syntactically valid `||host^` emerges. A single pass; residual noise after
/// repair fails host validation and the rule is dropped.
fn repair_abp_rule(line: &str) -> Option<String> {
    // Option suffixes carry no meaning for DNS blocking.
    let mut rule = match line.find('$') {
        Some(idx) => line[..idx].to_owned(),
        None => line.to_owned(),
    };
    // `host^|` single-pipe end anchor
    if rule.ends_with("^|") {
        rule.pop();
    }
    if !rule.starts_with("||") {
        if rule.starts_with('|') {
            // `|host^` single-pipe start anchor
            rule.insert(0, '|');
        } else if rule.ends_with('^') {
            // `host^` missing its `||` prefix entirely
            rule.insert_str(0, "||");
        }
    }
    let payload = rule.strip_prefix("||")?.strip_suffix('^')?;
    let payload = repair_wildcards(payload);
    normalize_host(&payload)
}

fn repair_wildcards(payload: &str) -> String {
    let mut repaired = payload.to_owned();
    // `*cdn.site` is a missing-dot wildcard
    if repaired.starts_with('*') && !repaired.starts_with("*.") {
        repaired.insert(1, '.');
    }
    // `app.*.adjust.com` collapses to the widest form `*.adjust.com`
    if let Some(idx) = repaired.find(".*.") {
        repaired.replace_range(..idx + 1, "");
    }
    // wildcard TLDs (`domain.google.*`) are not expressible in DNS
    if repaired.ends_with(".*") {
        repaired.truncate(repaired.len() - 2);
    }
    repaired
}

/// Converts a canonical Pi-hole anchored regex to its ABP host. Any other
/// regex form is rejected; general regex translation is out of scope.
fn regex_to_abp(line: &str) -> Option<String> {
    let pattern = match line.strip_prefix('/') {
        Some(rest) => {
            // delimited form `/pattern/flags`
            let end = rest.rfind('/')?;
            let flags = &rest[end + 1..];
            if !flags.chars().all(|c| c.is_ascii_alphabetic()) {
                return None;
            }
            &rest[..end]
        }
        None => line,
    };
    let captures = PIHOLE_ANCHORED_RE.captures(pattern)?;
    let host = captures.get(1)?.as_str().replace(r"\.", ".");
    normalize_host(&host)
}

/// `Some(candidate)` when the line is hosts-file shaped. The candidate is the
/// first token after the leading run of IP-parseable tokens; `None` inside
/// means the line held nothing but IPs.
fn hosts_file_candidate(line: &str) -> Option<Option<&str>> {
    let mut tokens = line.split_ascii_whitespace();
    let first = tokens.next()?;
    if !HOSTS_FILE_IPS.contains(&first) {
        return None;
    }
    Some(tokens.find(|token| token.parse::<IpAddr>().is_err()))
}

/// Lowercases and punycodes a host candidate, then validates it as a DNS
/// name: labels of `[a-z0-9-]` without edge hyphens, each at most 63 octets,
/// 253 octets overall. A leading `*.` label is preserved. IP addresses are
/// not domains and are rejected.
pub(crate) fn normalize_host(candidate: &str) -> Option<String> {
    let (wildcard, bare) = match candidate.strip_prefix("*.") {
        Some(bare) => (true, bare),
        None => (false, candidate),
    };
    if bare.is_empty() {
        return None;
    }
    let host = match Host::parse(bare) {
        Ok(Host::Domain(domain)) => domain,
        _ => return None,
    };
    if host.len() > MAX_HOSTNAME_LEN || all_consuming(hostname)(host.as_str()).is_err() {
        return None;
    }
    Some(if wildcard { format!("*.{host}") } else { host })
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

fn label(input: &str) -> IResult<&str, &str> {
    verify(take_while1(is_label_char), |label: &str| {
        label.len() <= 63 && !label.starts_with('-') && !label.ends_with('-')
    })(input)
}

fn hostname(input: &str) -> IResult<&str, &str> {
    recognize(pair(label, many0_count(pair(tag("."), label))))(input)
}
