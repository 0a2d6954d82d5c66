//! Property-based tests using proptest.
//!
//! These verify invariants of the source-list parser for arbitrary inputs.

use proptest::prelude::*;

use proxypool::domain::Protocol;
use proxypool::scraper::parse_proxy_list;

// ============================================================================
// Custom Strategies
// ============================================================================

/// A syntactically plausible IPv4 literal.
fn arb_ip() -> impl Strategy<Value = String> {
    (0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)
        .prop_map(|(a, b, c, d)| format!("{a}.{b}.{c}.{d}"))
}

/// A port the parser must accept.
fn arb_port() -> impl Strategy<Value = u16> {
    1u16..=65535
}

/// A line the parser must skip.
fn arb_junk_line() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("   ".to_string()),
        "#[ -~]{0,20}".prop_map(|s| s),
        // No colon at all.
        "[a-z0-9.]{1,20}".prop_map(|s| s),
        // Port out of range or not decimal.
        arb_ip().prop_map(|ip| format!("{ip}:0")),
        arb_ip().prop_map(|ip| format!("{ip}:65536")),
        arb_ip().prop_map(|ip| format!("{ip}:port")),
        arb_ip().prop_map(|ip| format!("{ip}:")),
    ]
}

/// Surrounding whitespace the parser must trim.
fn arb_padding() -> impl Strategy<Value = String> {
    "[ \t]{0,3}".prop_map(|s| s)
}

proptest! {
    /// Every well-formed line is parsed, in order, with its fields intact.
    #[test]
    fn well_formed_lines_all_parse(
        entries in prop::collection::vec((arb_ip(), arb_port(), arb_padding()), 0..20)
    ) {
        let payload: String = entries
            .iter()
            .map(|(ip, port, pad)| format!("{pad}{ip}:{port}{pad}\n"))
            .collect();

        let candidates = parse_proxy_list(&payload, Some(Protocol::Socks5));
        prop_assert_eq!(candidates.len(), entries.len());
        for (candidate, (ip, port, _)) in candidates.iter().zip(&entries) {
            prop_assert_eq!(&candidate.ip, ip);
            prop_assert_eq!(candidate.port, *port);
            prop_assert_eq!(candidate.protocol, Some(Protocol::Socks5));
        }
    }

    /// Junk lines never produce candidates, wherever they appear.
    #[test]
    fn junk_lines_are_skipped(
        entries in prop::collection::vec((arb_ip(), arb_port()), 0..10),
        junk in prop::collection::vec(arb_junk_line(), 0..10)
    ) {
        let mut lines: Vec<String> = entries
            .iter()
            .map(|(ip, port)| format!("{ip}:{port}"))
            .collect();
        lines.extend(junk);

        let candidates = parse_proxy_list(&lines.join("\n"), Some(Protocol::Http));
        prop_assert_eq!(candidates.len(), entries.len());
    }

    /// Parsed ports are always inside [1, 65535] whatever the payload.
    #[test]
    fn parsed_ports_are_always_in_range(payload in "[ -~\n]{0,200}") {
        for candidate in parse_proxy_list(&payload, None) {
            prop_assert!(candidate.port >= 1);
        }
    }

    /// Every candidate's address round-trips back to its source line, so
    /// nothing the parser emits can collide with a different line's
    /// natural key.
    #[test]
    fn candidate_addresses_match_their_lines(
        entries in prop::collection::vec((arb_ip(), arb_port()), 0..20)
    ) {
        let lines: Vec<String> = entries
            .iter()
            .map(|(ip, port)| format!("{ip}:{port}"))
            .collect();

        let candidates = parse_proxy_list(&lines.join("\n"), Some(Protocol::Http));
        let addresses: Vec<String> = candidates.iter().map(|c| c.address()).collect();
        prop_assert_eq!(addresses, lines);
    }
}
