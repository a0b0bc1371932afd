//! Field-level normalisation shared by the entity cleaners.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Format every cleaned date/time column is written back in.
pub const CANONICAL_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

pub fn clean_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Format an 11-digit number as `+1 (AAA) BBB-CCCC`, dropping the leading
/// country digit. Any other digit count yields `None`.
pub fn clean_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != 11 {
        return None;
    }
    Some(format!(
        "+1 ({}) {}-{}",
        &digits[1..4],
        &digits[4..7],
        &digits[7..]
    ))
}

/// Title-case words the way Python's `str.title` does: a character that follows
/// a cased character is lower-cased, any other is mapped to titlecase. So
/// `o'neil` becomes `O'Neil`, `中a` becomes `中A` and `ßx` becomes `Ssx`.
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_cased = false;
    for ch in raw.chars() {
        if prev_cased {
            out.extend(ch.to_lowercase());
        } else {
            push_titlecase(&mut out, ch);
        }
        prev_cased = is_cased(ch);
    }
    out
}

fn is_titlecase_letter(ch: char) -> bool {
    matches!(
        ch,
        '\u{01C5}' | '\u{01C8}' | '\u{01CB}' | '\u{01F2}'
            | '\u{1F88}'..='\u{1F8F}'
            | '\u{1F98}'..='\u{1F9F}'
            | '\u{1FA8}'..='\u{1FAF}'
            | '\u{1FBC}' | '\u{1FCC}' | '\u{1FFC}'
    )
}

fn is_cased(ch: char) -> bool {
    ch.is_lowercase() || ch.is_uppercase() || is_titlecase_letter(ch)
}

fn push_titlecase(out: &mut String, ch: char) {
    let single = match ch {
        c if is_titlecase_letter(c) => Some(c),
        '\u{01C4}'..='\u{01C6}' => Some('\u{01C5}'),
        '\u{01C7}'..='\u{01C9}' => Some('\u{01C8}'),
        '\u{01CA}'..='\u{01CC}' => Some('\u{01CB}'),
        '\u{01F1}'..='\u{01F3}' => Some('\u{01F2}'),
        '\u{1F80}'..='\u{1F87}' | '\u{1F90}'..='\u{1F97}' | '\u{1FA0}'..='\u{1FA7}' => {
            char::from_u32(u32::from(ch) + 8)
        }
        '\u{1FB3}' => Some('\u{1FBC}'),
        '\u{1FC3}' => Some('\u{1FCC}'),
        '\u{1FF3}' => Some('\u{1FFC}'),
        _ => None,
    };
    if let Some(title) = single {
        out.push(title);
        return;
    }
    // Multi-character uppercase forms (`ß` -> `SS`, `ﬁ` -> `FI`) keep only the
    // first character upper.
    let mut upper = ch.to_uppercase();
    if let Some(first) = upper.next() {
        out.push(first);
    }
    for rest in upper {
        out.extend(rest.to_lowercase());
    }
}

pub fn trim_title(raw: &str) -> String {
    title_case(raw.trim())
}

/// Result of coercing a raw value to a date/time; unparseable input becomes
/// [`ParsedTime::Invalid`] rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTime {
    Valid(NaiveDateTime),
    Invalid,
}

impl ParsedTime {
    pub fn valid(self) -> Option<NaiveDateTime> {
        match self {
            ParsedTime::Valid(dt) => Some(dt),
            ParsedTime::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, ParsedTime::Valid(_))
    }
}

pub fn parse_datetime(raw: &str) -> ParsedTime {
    let s = raw.trim();
    if s.is_empty() {
        return ParsedTime::Invalid;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return ParsedTime::Valid(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return ParsedTime::Valid(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(ParsedTime::Invalid, ParsedTime::Valid)
}

/// Parse an optional raw column value; a missing value is invalid.
pub fn parse_optional_datetime(raw: Option<&str>) -> ParsedTime {
    raw.map_or(ParsedTime::Invalid, parse_datetime)
}

pub fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(CANONICAL_DATETIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_trimmed_and_lowercased() {
        assert_eq!(clean_email("  Ada.Lovelace@Example.COM \t"), "ada.lovelace@example.com");
        assert_eq!(clean_email("plain@x.io"), "plain@x.io");
    }

    #[test]
    fn eleven_digit_phone_is_formatted() {
        assert_eq!(clean_phone("1-555-123-4567").as_deref(), Some("+1 (555) 123-4567"));
        assert_eq!(clean_phone("+1 (555) 123-4567").as_deref(), Some("+1 (555) 123-4567"));
        assert_eq!(clean_phone("15551234567").as_deref(), Some("+1 (555) 123-4567"));
    }

    #[test]
    fn other_digit_counts_are_absent() {
        assert_eq!(clean_phone("12345"), None);
        assert_eq!(clean_phone("555-123-4567"), None);
        assert_eq!(clean_phone("call me"), None);
        assert_eq!(clean_phone(""), None);
    }

    #[test]
    fn title_case_follows_word_boundaries() {
        assert_eq!(title_case("vp of SALES"), "Vp Of Sales");
        assert_eq!(title_case("o'neil-smith"), "O'Neil-Smith");
        assert_eq!(title_case("3rd party"), "3Rd Party");
        assert_eq!(trim_title("  software  "), "Software");
    }

    #[test]
    fn title_case_uses_cased_boundaries_and_titlecase_forms() {
        assert_eq!(title_case("中a"), "中A");
        assert_eq!(title_case("ßx straße"), "Ssx Straße");
        assert_eq!(title_case("ǆemal"), "ǅemal");
        assert_eq!(title_case("ﬁnance"), "Finance");
    }

    #[test]
    fn title_case_is_stable_on_its_own_output() {
        for raw in ["ßx", "中a", "ǆemal ǉubljana", "ﬁnance lead", "ÉCOLE normale", "ᾳ test", "vp of SALES"] {
            let once = title_case(raw);
            assert_eq!(title_case(&once), once, "{raw}");
        }
    }

    #[test]
    fn dates_parse_from_common_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        for raw in ["2024-03-01", "2024/03/01", "03/01/2024", "2024-03-01 00:00:00", "2024-03-01T00:00:00Z"] {
            assert_eq!(parse_datetime(raw), ParsedTime::Valid(expected), "{raw}");
        }
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        let parsed = parse_datetime("2024-03-01T10:30:00+02:00").valid().unwrap();
        assert_eq!(format_datetime(parsed), "2024-03-01 08:30:00");
    }

    #[test]
    fn garbage_is_marked_invalid() {
        assert_eq!(parse_datetime("not a date"), ParsedTime::Invalid);
        assert_eq!(parse_datetime("2024-13-45"), ParsedTime::Invalid);
        assert_eq!(parse_datetime("   "), ParsedTime::Invalid);
        assert_eq!(parse_optional_datetime(None), ParsedTime::Invalid);
    }

    #[test]
    fn canonical_form_reparses_to_the_same_instant() {
        for raw in ["2024-03-01T10:30:00", "2024-03-01 10:30:00.250", "12/31/2023 23:59"] {
            let first = parse_datetime(raw).valid().unwrap();
            let canonical = format_datetime(first);
            assert_eq!(parse_datetime(&canonical), ParsedTime::Valid(first));
            assert_eq!(format_datetime(parse_datetime(&canonical).valid().unwrap()), canonical);
        }
    }
}
