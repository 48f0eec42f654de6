//! Timing, name and status normalization shared by the source adapters.

use serde_json::Value;

use pitwall_core::config::NormalizeConfig;

/// Parse a duration value into seconds.
///
/// Numbers pass through unchanged. Strings accept `"ss.mmm"`,
/// `"m:ss.mmm"`, `"h:mm:ss.mmm"` and an optional `"N days "` prefix.
/// Anything unparseable is `None`, never zero.
pub fn parse_duration(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_duration_str(s),
        _ => None,
    }
}

fn parse_duration_str(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (days, clock) = match raw.split_once(" days ").or_else(|| raw.split_once(" day ")) {
        Some((d, rest)) => (d.trim().parse::<f64>().ok()?, rest.trim()),
        None => (0.0, raw),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    let mut seconds = 0.0;
    for part in &parts {
        seconds = seconds * 60.0 + part.trim().parse::<f64>().ok()?;
    }
    Some(days * 86_400.0 + seconds)
}

/// Title-case a name: uppercase after any non-alphabetic boundary,
/// lowercase elsewhere. `"max VERSTAPPEN"` → `"Max Verstappen"`,
/// `"jean-eric vergne"` → `"Jean-Eric Vergne"`.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut at_boundary = true;
    for ch in name.chars() {
        if ch.is_alphabetic() {
            if at_boundary {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_boundary = false;
        } else {
            out.push(ch);
            at_boundary = true;
        }
    }
    out
}

/// Derive the sponsor-free standard meeting name from the official one.
///
/// Uppercases, strips sponsor tokens and standalone year tokens, collapses
/// whitespace, then applies substring overrides (an override wins whatever
/// the stripped residue looks like). An empty residue falls back to the
/// uppercased official name.
pub fn standard_meeting_name(official_name: &str, config: &NormalizeConfig) -> String {
    let upper = official_name.to_uppercase();

    let mut stripped = upper.clone();
    for token in &config.sponsor_tokens {
        stripped = stripped.replace(token.as_str(), " ");
    }

    let cleaned: String = stripped
        .split_whitespace()
        .filter(|word| !(word.len() == 4 && word.chars().all(|c| c.is_ascii_digit())))
        .collect::<Vec<_>>()
        .join(" ");

    for (pattern, replacement) in &config.name_overrides {
        if cleaned.contains(pattern.as_str()) || upper.contains(pattern.as_str()) {
            return replacement.clone();
        }
    }

    if cleaned.is_empty() {
        upper
    } else {
        cleaned
    }
}

/// Classification flags derived from a free-text status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub dnf: bool,
    pub dns: bool,
    pub dsq: bool,
}

const DNF_TOKENS: &[&str] = &[
    "dnf",
    "retired",
    "did not finish",
    "accident",
    "collision",
    "engine",
    "gearbox",
    "hydraulics",
    "mechanical",
];
const DNS_TOKENS: &[&str] = &["dns", "did not start", "withdrew"];
const DSQ_TOKENS: &[&str] = &["dsq", "disqualified", "excluded"];

/// Match status text against known tokens, case-insensitively. The three
/// flags are independent.
pub fn status_flags(status: &str) -> StatusFlags {
    let lower = status.to_lowercase();
    let hit = |tokens: &[&str]| tokens.iter().any(|t| lower.contains(t));
    StatusFlags {
        dnf: hit(DNF_TOKENS),
        dns: hit(DNS_TOKENS),
        dsq: hit(DSQ_TOKENS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn durations_parse_from_clock_strings() {
        assert_eq!(parse_duration(&json!("1:23.456")), Some(83.456));
        assert_eq!(parse_duration(&json!("1:02:03.5")), Some(3723.5));
        assert_eq!(parse_duration(&json!("28.566")), Some(28.566));
        assert_eq!(
            parse_duration(&json!("0 days 00:01:23.456000")),
            Some(83.456)
        );
    }

    #[test]
    fn durations_pass_numbers_through() {
        assert_eq!(parse_duration(&json!(92.1)), Some(92.1));
        assert_eq!(parse_duration(&json!(0)), Some(0.0));
    }

    #[test]
    fn unparseable_durations_are_none_not_zero() {
        assert_eq!(parse_duration(&json!("")), None);
        assert_eq!(parse_duration(&json!("NaT")), None);
        assert_eq!(parse_duration(&json!(null)), None);
        assert_eq!(parse_duration(&json!("1:2:3:4")), None);
    }

    #[test]
    fn names_title_case_across_boundaries() {
        assert_eq!(title_case("max VERSTAPPEN"), "Max Verstappen");
        assert_eq!(title_case("jean-eric VERGNE"), "Jean-Eric Vergne");
        assert_eq!(title_case("NICO HULKENBERG"), "Nico Hulkenberg");
    }

    #[test]
    fn sponsor_tokens_and_year_are_stripped() {
        let config = NormalizeConfig::default();
        assert_eq!(
            standard_meeting_name("FORMULA 1 GULF AIR BAHRAIN GRAND PRIX 2024", &config),
            "BAHRAIN GRAND PRIX"
        );
        assert_eq!(
            standard_meeting_name("FORMULA 1 ROLEX AUSTRALIAN GRAND PRIX 2023", &config),
            "AUSTRALIAN GRAND PRIX"
        );
    }

    #[test]
    fn overrides_win_over_residue() {
        let config = NormalizeConfig::default();
        assert_eq!(
            standard_meeting_name(
                "FORMULA 1 GRAN PREMIO DE LA CIUDAD DE MÉXICO 2024",
                &config
            ),
            "MEXICAN GRAND PRIX"
        );
        assert_eq!(
            standard_meeting_name("FORMULA 1 LENOVO GRANDE PRÊMIO DE SÃO PAULO 2024", &config),
            "SAO PAULO GRAND PRIX"
        );
    }

    #[test]
    fn empty_residue_falls_back_to_official_name() {
        let config = NormalizeConfig::default();
        assert_eq!(
            standard_meeting_name("Formula 1 2024", &config),
            "FORMULA 1 2024"
        );
    }

    #[test]
    fn status_tokens_set_independent_flags() {
        assert_eq!(
            status_flags("Retired"),
            StatusFlags {
                dnf: true,
                dns: false,
                dsq: false
            }
        );
        assert_eq!(
            status_flags("Did not start"),
            StatusFlags {
                dnf: false,
                dns: true,
                dsq: false
            }
        );
        assert_eq!(
            status_flags("Disqualified"),
            StatusFlags {
                dnf: false,
                dns: false,
                dsq: true
            }
        );
        assert_eq!(status_flags("Finished"), StatusFlags::default());
        assert_eq!(status_flags("+1 Lap"), StatusFlags::default());
    }
}
