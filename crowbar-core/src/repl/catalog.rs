//! Keyword candidate sets and unique-prefix matching.
//!
//! Every position in the command grammar draws its keywords from one of the
//! sets below. Tokens may be abbreviated to any prefix that is unique within
//! the set; exact matches always win (so a keyword that is a prefix of
//! another remains reachable). Ambiguous prefixes are rejected together with
//! the candidates they matched, which the grammar turns into the error
//! message.

/// Top-level verbs.
pub const VERBS: &[&str] = &[
    "SET", "GET", "TRIGGER", "ARM", "GLITCH", "STATUS", "RESET", "CLOCK", "API", "ERROR", "HELP",
    "VERSION", "PINS", "TARGET", "REBOOT",
];

/// `SET`/`GET` parameter names.
pub const PARAM_FIELDS: &[&str] = &["PAUSE", "WIDTH", "GAP", "COUNT"];

/// `TRIGGER` variants.
pub const TRIGGER_KINDS: &[&str] = &["NONE", "GPIO", "UART"];

/// `TRIGGER GPIO` edge selection.
pub const EDGES: &[&str] = &["RISING", "FALLING"];

/// Two-state switches (`ARM`, `API`, `CLOCK`).
pub const SWITCHES: &[&str] = &["ON", "OFF"];

/// `TARGET` sub-commands.
pub const TARGET_SUBCOMMANDS: &[&str] = &["SEND", "RESPONSE", "RESET", "POWER"];

/// `TARGET POWER` actions.
pub const POWER_ACTIONS: &[&str] = &["ON", "OFF", "CYCLE"];

/// `TARGET RESET` options.
pub const RESET_OPTIONS: &[&str] = &["PIN", "PERIOD", "HIGH"];

/// `REBOOT` modes.
pub const REBOOT_MODES: &[&str] = &["BL"];

/// Failed keyword lookups.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MatchError {
    /// The prefix matched more than one candidate.
    Ambiguous(&'static [&'static str]),
    /// The word matched nothing in the set.
    Unknown(&'static [&'static str]),
}

/// Resolves `word` against `candidates`, case-insensitively, accepting any
/// unique prefix.
pub fn match_keyword(
    word: &str,
    candidates: &'static [&'static str],
) -> Result<&'static str, MatchError> {
    let mut matched: Option<&'static str> = None;
    let mut count = 0usize;

    for candidate in candidates {
        if candidate.eq_ignore_ascii_case(word) {
            return Ok(candidate);
        }
        if candidate.len() >= word.len()
            && candidate[..word.len()].eq_ignore_ascii_case(word)
            && !word.is_empty()
        {
            matched = Some(candidate);
            count += 1;
        }
    }

    match count {
        1 => Ok(matched.unwrap_or_default()),
        0 => Err(MatchError::Unknown(candidates)),
        _ => Err(MatchError::Ambiguous(candidates)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_prefixes_resolve() {
        assert_eq!(match_keyword("STAT", VERBS), Ok("STATUS"));
        assert_eq!(match_keyword("gl", VERBS), Ok("GLITCH"));
        assert_eq!(match_keyword("p", VERBS), Ok("PINS"));
        assert_eq!(match_keyword("ri", EDGES), Ok("RISING"));
        assert_eq!(match_keyword("f", EDGES), Ok("FALLING"));
    }

    #[test]
    fn ambiguous_prefixes_report_candidates() {
        assert_eq!(match_keyword("G", VERBS), Err(MatchError::Ambiguous(VERBS)));
        assert_eq!(match_keyword("S", VERBS), Err(MatchError::Ambiguous(VERBS)));
        assert_eq!(match_keyword("RE", VERBS), Err(MatchError::Ambiguous(VERBS)));
        assert_eq!(
            match_keyword("O", SWITCHES),
            Err(MatchError::Ambiguous(SWITCHES))
        );
    }

    #[test]
    fn exact_match_beats_longer_candidates() {
        // ON is a full keyword even though OFF shares the O prefix.
        assert_eq!(match_keyword("ON", SWITCHES), Ok("ON"));
        assert_eq!(match_keyword("on", POWER_ACTIONS), Ok("ON"));
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert_eq!(
            match_keyword("FOO", VERBS),
            Err(MatchError::Unknown(VERBS))
        );
        assert_eq!(match_keyword("", VERBS), Err(MatchError::Unknown(VERBS)));
    }

    #[test]
    fn every_accepted_prefix_is_unambiguous() {
        // Property 9: walk every prefix of every candidate in every set; if
        // the matcher accepts it, exactly one candidate must start with it.
        let sets: &[&'static [&'static str]] = &[
            VERBS,
            PARAM_FIELDS,
            TRIGGER_KINDS,
            EDGES,
            SWITCHES,
            TARGET_SUBCOMMANDS,
            POWER_ACTIONS,
            RESET_OPTIONS,
            REBOOT_MODES,
        ];

        for set in sets {
            for candidate in *set {
                for len in 1..=candidate.len() {
                    let prefix = &candidate[..len];
                    if let Ok(resolved) = match_keyword(prefix, set) {
                        let holders = set
                            .iter()
                            .filter(|c| c.len() >= len && c[..len].eq_ignore_ascii_case(prefix))
                            .count();
                        assert!(
                            holders == 1 || resolved.eq_ignore_ascii_case(prefix),
                            "prefix {prefix:?} accepted but matches {holders} candidates"
                        );
                    }
                }
            }
        }
    }
}
