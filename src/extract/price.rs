//! Price parsing
//!
//! Storefronts render prices either as one text run (`149,50 грн`,
//! `1 149.90 ₴`) or split across two markup nodes (`86.<span>90</span>`).
//! Both `,` and `.` are accepted as the fraction separator.

use regex::Regex;
use scraper::ElementRef;

/// Parses the first price-looking number of `text`
///
/// Thousands groups separated by (non-breaking) spaces are joined. Returns
/// `None` when no number is present or the value is not positive.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let start = chars.iter().position(|c| c.is_ascii_digit())?;

    let mut integer = String::new();
    let mut i = start;
    loop {
        while i < n && chars[i].is_ascii_digit() {
            integer.push(chars[i]);
            i += 1;
        }
        if i < n && is_group_separator(chars[i]) && is_thousands_group(&chars[i + 1..]) {
            i += 1;
            continue;
        }
        break;
    }

    let mut fraction = String::new();
    if i + 1 < n && (chars[i] == '.' || chars[i] == ',') && chars[i + 1].is_ascii_digit() {
        i += 1;
        while i < n && chars[i].is_ascii_digit() {
            fraction.push(chars[i]);
            i += 1;
        }
    }

    let literal = if fraction.is_empty() {
        integer
    } else {
        format!("{}.{}", integer, fraction)
    };
    literal
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

fn is_group_separator(c: char) -> bool {
    c == ' ' || c == '\u{a0}' || c == '\u{202f}' || c == '\''
}

/// True when `rest` starts with exactly three digits
fn is_thousands_group(rest: &[char]) -> bool {
    rest.len() >= 3
        && rest[..3].iter().all(|c| c.is_ascii_digit())
        && rest.get(3).map_or(true, |c| !c.is_ascii_digit())
}

/// Combines an integer fragment and a fraction fragment rendered in separate nodes
///
/// `["86.", "90"]` and `["86", "90"]` both yield 86.90, `["1 149", "90"]` yields
/// 1149.90. The fraction must be exactly two digits.
pub fn price_from_fragments(fragments: &[&str]) -> Option<f64> {
    let parts: Vec<&str> = fragments
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if parts.len() < 2 {
        return None;
    }

    let integer = grouped_integer(parts[0].trim_end_matches(&['.', ','][..]))?;
    let fraction = parts[1];
    if fraction.len() != 2 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    format!("{}.{}", integer, fraction)
        .parse::<f64>()
        .ok()
        .filter(|v| *v > 0.0)
}

/// Digits of an integer fragment, allowing thousands groups (`1 149`)
fn grouped_integer(fragment: &str) -> Option<String> {
    let groups: Vec<&str> = fragment.split(is_group_separator).collect();
    let (head, rest) = groups.split_first()?;
    let digits = |g: &str| !g.is_empty() && g.chars().all(|c| c.is_ascii_digit());
    let well_formed = digits(*head)
        && (rest.is_empty() || head.len() <= 3)
        && rest.iter().all(|g| g.len() == 3 && digits(*g));
    well_formed.then(|| groups.concat())
}

/// Reads a price out of one element, trying the split rendering first
pub fn price_from_element(element: ElementRef) -> Option<f64> {
    let fragments: Vec<&str> = element.text().collect();
    price_from_fragments(&fragments).or_else(|| parse_price_text(&fragments.concat()))
}

/// Applies a store price pattern to raw markup
///
/// With two capture groups the first is the integer part and the second the
/// fraction; with one group the group is parsed as a price text; with none
/// the whole match is.
pub fn price_from_pattern(pattern: &Regex, markup: &str) -> Option<f64> {
    let caps = pattern.captures(markup)?;
    match (caps.get(1), caps.get(2)) {
        (Some(integer), Some(fraction)) => {
            format!("{}.{}", integer.as_str(), fraction.as_str())
                .parse::<f64>()
                .ok()
                .filter(|v| *v > 0.0)
        }
        (Some(whole), None) => parse_price_text(whole.as_str()),
        _ => caps.get(0).and_then(|m| parse_price_text(m.as_str())),
    }
}
