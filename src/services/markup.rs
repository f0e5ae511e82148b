//! Turns reservation-site HTML fragments into typed values.
//!
//! Everything here is stateless and never fails: markup that does not match is
//! reported as "no value" so one malformed fragment cannot sink a cycle.

use crate::models::Plan;
use crate::utils::html::{attr_value, decode_entities, has_attr, to_text};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b[^>]*>").unwrap());
static PLAN_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^plan-(\d+)$").unwrap());
static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<label\b([^>]*)>(.*?)</label\s*>"#).unwrap()
});
static HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<([a-z][a-z0-9]*)\b[^>]*class\s*=\s*["'][^"']*\bcalendar-(?:header|head|title|month)\b[^"']*["'][^>]*>"#,
    )
    .unwrap()
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<(/?)([a-z][a-z0-9]*)\b[^>]*?(/?)>").unwrap());
static YEAR_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})\s*(?:年|/|-|\.)\s*(\d{1,2})").unwrap());
static CELL_START_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<td\b[^>]*>").unwrap());
static CELL_END_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(</td\s*>)|<td\b|</?tr\b|</?tbody\b|</table\b").unwrap());
static DATA_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)data-date\s*=\s*["']\s*(\d{4})\s*[/.\-]\s*(\d{1,2})\s*[/.\-]\s*(\d{1,2})\s*["']"#)
        .unwrap()
});
static DATE_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<[a-z][a-z0-9]*\b[^>]*class\s*=\s*["'][^"']*\b(?:date|day)-(?:label|num|number)\b[^"']*["'][^>]*>(.*?)</"#,
    )
    .unwrap()
});
static DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2})(?:\D|$)").unwrap());
static AVAILABLE_TEXT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bAvailable\b|受付中").unwrap());
static NOT_AVAILABLE_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bnot\s+available\b").unwrap());

const AVAILABLE_ICON_MARKERS: &[&str] = &["icon-available", "icon_available"];
const DISABLED_ICON_MARKERS: &[&str] = &[
    "icon-disabled",
    "icon_disabled",
    "icon-unavailable",
    "icon_unavailable",
];

fn inputs_named<'a>(html: &'a str, field_name: &str) -> Vec<&'a str> {
    INPUT_RE
        .find_iter(html)
        .map(|m| m.as_str())
        .filter(|tag| attr_value(tag, "name").as_deref() == Some(field_name))
        .collect()
}

fn input_value(tag: &str) -> String {
    attr_value(tag, "value")
        .map(|v| decode_entities(&v))
        .unwrap_or_default()
}

fn is_choice_input(tag: &str) -> bool {
    matches!(
        attr_value(tag, "type").map(|t| t.to_ascii_lowercase()).as_deref(),
        Some("radio") | Some("checkbox")
    )
}

/// `value` of the first `<input>` named exactly `field_name`, or `""`.
pub fn extract_input_value(html: &str, field_name: &str) -> String {
    inputs_named(html, field_name)
        .first()
        .map(|tag| input_value(tag))
        .unwrap_or_default()
}

/// Like [`extract_input_value`], but understands a same-name radio group: a plain
/// (non-radio, non-checkbox) input with a value wins, otherwise the `checked` option.
pub fn parse_selected_value(html: &str, field_name: &str) -> String {
    let inputs = inputs_named(html, field_name);

    let plain = inputs
        .iter()
        .filter(|tag| !is_choice_input(tag))
        .map(|tag| input_value(tag))
        .find(|value| !value.is_empty());
    if let Some(value) = plain {
        return value;
    }

    inputs
        .iter()
        .find(|tag| has_attr(tag, "checked"))
        .map(|tag| input_value(tag))
        .unwrap_or_default()
}

/// Plans offered by `<input id="plan-N">` + `<label for="plan-N">` pairs, in document
/// order, unique by `(id, label)`.
pub fn parse_plans(html: &str) -> Vec<Plan> {
    let input_ids: HashSet<u32> = INPUT_RE
        .find_iter(html)
        .filter_map(|m| attr_value(m.as_str(), "id"))
        .filter_map(|id| plan_id_from(&id))
        .collect();

    let mut seen = HashSet::new();
    let mut plans = Vec::new();
    for caps in LABEL_RE.captures_iter(html) {
        let Some(id) = attr_value(&format!("<label {}>", &caps[1]), "for")
            .and_then(|target| plan_id_from(&target))
        else {
            continue;
        };
        if !input_ids.contains(&id) {
            continue;
        }
        let mut label = to_text(&caps[2]);
        if label.is_empty() {
            label = Plan::synthetic(id).label;
        }
        if seen.insert((id, label.clone())) {
            plans.push(Plan::new(id, label));
        }
    }
    plans
}

fn plan_id_from(element_id: &str) -> Option<u32> {
    let caps = PLAN_ID_RE.captures(element_id.trim())?;
    caps[1].parse().ok().filter(|id| *id > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn day(&self, day: u32) -> Option<NaiveDate> {
        if !(1..=31).contains(&day) {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year, self.month, day)
    }
}

/// Content of the element whose start tag ends at `start`, up to its matching close tag.
/// Nested elements of the same name are balanced; an unclosed element runs to the end.
fn element_body<'a>(html: &'a str, start: usize, name: &str) -> &'a str {
    let rest = &html[start..];
    let mut depth = 0usize;
    for caps in TAG_RE.captures_iter(rest) {
        if !caps[2].eq_ignore_ascii_case(name) || !caps[3].is_empty() {
            continue;
        }
        if caps[1].is_empty() {
            depth += 1;
        } else if depth == 0 {
            let end = caps.get(0).map_or(rest.len(), |m| m.start());
            return &rest[..end];
        } else {
            depth -= 1;
        }
    }
    rest
}

/// Year/month shown in the calendar header, or the year/month of `fallback`.
pub fn parse_year_month(html: &str, fallback: NaiveDate) -> YearMonth {
    HEADER_RE
        .captures(html)
        .and_then(|header| {
            let open = header.get(0)?;
            let text = to_text(element_body(html, open.end(), &header[1]));
            let caps = YEAR_MONTH_RE.captures(&text)?;
            let year: i32 = caps[1].parse().ok()?;
            let month: u32 = caps[2].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, 1)?;
            Some(YearMonth { year, month })
        })
        .unwrap_or_else(|| YearMonth::of(fallback))
}

/// What a classifier concluded about one `<td>` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellVerdict {
    Available(Vec<NaiveDate>),
    Unavailable,
    NoOpinion,
}

/// One markup variant's rule for reading a calendar cell. Classifiers run in order and the
/// first verdict other than [`CellVerdict::NoOpinion`] decides the cell.
pub trait CellClassifier {
    fn name(&self) -> &'static str;
    fn classify(&self, cell: &str, month: YearMonth) -> CellVerdict;
}

/// Cells flagged with an available icon carry absolute `data-date` values.
pub struct AvailableIconClassifier;

impl CellClassifier for AvailableIconClassifier {
    fn name(&self) -> &'static str {
        "available-icon"
    }

    fn classify(&self, cell: &str, _month: YearMonth) -> CellVerdict {
        if !contains_marker(cell, AVAILABLE_ICON_MARKERS) {
            return CellVerdict::NoOpinion;
        }
        let dates = DATA_DATE_RE
            .captures_iter(cell)
            .filter_map(|caps| {
                let year = caps[1].parse().ok()?;
                let month = caps[2].parse().ok()?;
                let day: u32 = caps[3].parse().ok()?;
                YearMonth { year, month }.day(day)
            })
            .collect();
        CellVerdict::Available(dates)
    }
}

pub struct DisabledIconClassifier;

impl CellClassifier for DisabledIconClassifier {
    fn name(&self) -> &'static str {
        "disabled-icon"
    }

    fn classify(&self, cell: &str, _month: YearMonth) -> CellVerdict {
        if contains_marker(cell, DISABLED_ICON_MARKERS) {
            CellVerdict::Unavailable
        } else {
            CellVerdict::NoOpinion
        }
    }
}

/// Older markup: an "Available"/"受付中" label next to a bare day number.
pub struct AvailabilityTextClassifier;

impl CellClassifier for AvailabilityTextClassifier {
    fn name(&self) -> &'static str {
        "availability-text"
    }

    fn classify(&self, cell: &str, month: YearMonth) -> CellVerdict {
        let text = to_text(cell);
        if NOT_AVAILABLE_TEXT_RE.is_match(&text) || !AVAILABLE_TEXT_RE.is_match(&text) {
            return CellVerdict::NoOpinion;
        }
        let day = DATE_LABEL_RE
            .captures(cell)
            .and_then(|caps| {
                let label = to_text(&caps[1]);
                DAY_RE.captures(&label)?[1].parse::<u32>().ok()
            })
            .and_then(|day| month.day(day));
        match day {
            Some(date) => CellVerdict::Available(vec![date]),
            None => CellVerdict::Unavailable,
        }
    }
}

fn contains_marker(cell: &str, markers: &[&str]) -> bool {
    let lowered = cell.to_ascii_lowercase();
    markers.iter().any(|marker| lowered.contains(marker))
}

pub const DEFAULT_CLASSIFIERS: &[&dyn CellClassifier] = &[
    &AvailableIconClassifier,
    &DisabledIconClassifier,
    &AvailabilityTextClassifier,
];

/// First classifier with an opinion on `cell`, together with its verdict.
pub fn deciding_classifier(
    cell: &str,
    month: YearMonth,
    classifiers: &[&dyn CellClassifier],
) -> Option<(&'static str, CellVerdict)> {
    classifiers.iter().find_map(|classifier| {
        match classifier.classify(cell, month) {
            CellVerdict::NoOpinion => None,
            verdict => Some((classifier.name(), verdict)),
        }
    })
}

pub fn classify_cell(cell: &str, month: YearMonth, classifiers: &[&dyn CellClassifier]) -> CellVerdict {
    match deciding_classifier(cell, month, classifiers) {
        Some((classifier, verdict)) => {
            debug!(classifier, ?verdict, "calendar cell classified");
            verdict
        }
        None => CellVerdict::NoOpinion,
    }
}

/// `<td>` blocks of a calendar fragment. A cell ends at its `</td>`, or where the next cell,
/// row or table boundary begins when the close tag is omitted.
fn calendar_cells(html: &str) -> impl Iterator<Item = &str> {
    CELL_START_RE.find_iter(html).map(move |start| {
        let rest = &html[start.end()..];
        let end = match CELL_END_RE.captures(rest) {
            Some(caps) => match (caps.get(1), caps.get(0)) {
                (Some(close), _) => close.end(),
                (None, Some(boundary)) => boundary.start(),
                (None, None) => rest.len(),
            },
            None => rest.len(),
        };
        &html[start.start()..start.end() + end]
    })
}

/// Sorted, de-duplicated ISO dates of every available cell in a calendar fragment.
pub fn parse_available_dates(html: &str, fallback: NaiveDate) -> Vec<String> {
    parse_available_dates_with(html, fallback, DEFAULT_CLASSIFIERS)
}

pub fn parse_available_dates_with(
    html: &str,
    fallback: NaiveDate,
    classifiers: &[&dyn CellClassifier],
) -> Vec<String> {
    let month = parse_year_month(html, fallback);
    let mut dates = BTreeSet::new();
    for cell in calendar_cells(html) {
        if let CellVerdict::Available(found) = classify_cell(cell, month, classifiers) {
            dates.extend(found);
        }
    }
    dates
        .into_iter()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const TOKEN_FORM: &str = r#"
        <form method="post">
          <INPUT type="hidden" name="_csrfToken" value="abc&amp;123">
          <input type="hidden" name="_Token[fields]" value="f1%3Aevent">
          <input type="hidden" name="_Token[unlocked]" value="">
          <input type="radio" name="event" value="3">
          <input type="radio" name="event" value="5" checked>
        </form>"#;

    #[test]
    fn test_extract_input_value() {
        assert_eq!(extract_input_value(TOKEN_FORM, "_csrfToken"), "abc&123");
        assert_eq!(extract_input_value(TOKEN_FORM, "_Token[fields]"), "f1%3Aevent");
        assert_eq!(extract_input_value(TOKEN_FORM, "_Token[unlocked]"), "");
        assert_eq!(extract_input_value(TOKEN_FORM, "missing"), "");
    }

    #[test]
    fn test_extract_input_value_requires_exact_name() {
        let html = r#"<input name="_Token[fields]x" value="wrong"><input name="_Token[fields]" value="right">"#;
        assert_eq!(extract_input_value(html, "_Token[fields]"), "right");
    }

    #[test]
    fn test_parse_selected_value_uses_checked_radio() {
        assert_eq!(parse_selected_value(TOKEN_FORM, "event"), "5");
    }

    #[test]
    fn test_parse_selected_value_prefers_plain_input() {
        let html = r#"<input type="radio" name="event" value="3" checked><input type="hidden" name="event" value="9">"#;
        assert_eq!(parse_selected_value(html, "event"), "9");
    }

    #[test]
    fn test_parse_selected_value_none_checked() {
        let html = r#"<input type="radio" name="event" value="3"><input type="radio" name="event" value="4">"#;
        assert_eq!(parse_selected_value(html, "event"), "");
    }

    #[test]
    fn test_parse_plans_cleans_labels() {
        let html = r#"
            <input type="radio" name="plan" id="plan-20" value="20">
            <label for="plan-20"> <span class="name">Health&nbsp;check</span>
                <small>(60 min)</small></label>
            <input type="radio" name="plan" id="plan-34" value="34">
            <label for="plan-34">Tom &amp; Jerry</label>
            <label for="plan-99">No input for this one</label>"#;
        assert_eq!(
            parse_plans(html),
            vec![Plan::new(20, "Health check (60 min)"), Plan::new(34, "Tom & Jerry")]
        );
    }

    #[test]
    fn test_parse_plans_dedups_identical_pairs() {
        let html = r#"
            <input id="plan-20"><label for="plan-20">Consultation</label>
            <input id="plan-20"><label for="plan-20">Consultation</label>"#;
        assert_eq!(parse_plans(html), vec![Plan::new(20, "Consultation")]);
    }

    #[test]
    fn test_parse_plans_keeps_same_id_with_different_label() {
        let html = r#"
            <input id="plan-20"><label for="plan-20">Consultation</label>
            <input id="plan-20"><label for="plan-20">Consultation (online)</label>"#;
        assert_eq!(
            parse_plans(html),
            vec![Plan::new(20, "Consultation"), Plan::new(20, "Consultation (online)")]
        );
    }

    #[test]
    fn test_parse_plans_ignores_zero_and_non_numeric() {
        let html = r#"<input id="plan-0"><label for="plan-0">Zero</label>
            <input id="plan-x"><label for="plan-x">X</label>"#;
        assert!(parse_plans(html).is_empty());
    }

    #[test]
    fn test_parse_year_month_from_header() {
        let html = r#"<div class="calendar-header"><h2>2025年3月</h2></div>"#;
        assert_eq!(parse_year_month(html, date(2024, 1, 1)), YearMonth { year: 2025, month: 3 });

        let html = r#"<caption class="cal calendar-title">2026/11</caption>"#;
        assert_eq!(parse_year_month(html, date(2024, 1, 1)), YearMonth { year: 2026, month: 11 });
    }

    #[test]
    fn test_header_with_nested_elements_spans_whole_element() {
        let html = r#"
            <div class="calendar-header"><span>2025</span>年<span>4</span>月</div>
            <table><tr><td><span class="date-label">2</span>受付中</td></tr></table>"#;
        let fallback = date(2025, 3, 31);
        assert_eq!(parse_year_month(html, fallback), YearMonth { year: 2025, month: 4 });
        assert_eq!(parse_available_dates(html, fallback), vec!["2025-04-02"]);
    }

    #[test]
    fn test_header_balances_same_named_children() {
        let html = r#"<div class="calendar-month"><div class="y">2026</div>/<div>2</div></div><div>1999/9</div>"#;
        assert_eq!(parse_year_month(html, date(2024, 1, 1)), YearMonth { year: 2026, month: 2 });
    }

    #[test]
    fn test_parse_year_month_falls_back() {
        let fallback = date(2025, 7, 19);
        let expected = YearMonth { year: 2025, month: 7 };
        for html in [
            "",
            "<table></table>",
            r#"<div class="calendar-header">March</div>"#,
            r#"<div class="calendar-header">2025年13月</div>"#,
            r#"<p>2030年1月</p>"#,
        ] {
            assert_eq!(parse_year_month(html, fallback), expected, "{}", html);
        }
    }

    #[test]
    fn test_available_icon_cell_uses_data_dates() {
        let html = r#"
            <div class="calendar-header">2025年3月</div>
            <table><tr>
              <td><i class="icon-disabled"></i><span class="date-label">11</span></td>
              <td class="day"><img class="icon-available" src="ok.png">
                <a data-date="2025/03/12">AM</a><a data-date="2025/03/13">PM</a></td>
              <td>Available<span class="date-label">14</span></td>
            </tr></table>"#;
        let dates = parse_available_dates(html, date(2025, 3, 1));
        assert_eq!(dates, vec!["2025-03-12", "2025-03-13", "2025-03-14"]);
    }

    #[test]
    fn test_cells_without_close_tags() {
        let html = r#"
            <div class="calendar-header">2025年3月</div>
            <table><tr><td><i class="icon-available"></i><a data-date="2025/03/12"></a><td>Available<span class="date-label">14</span>
            <tr><td><i class="icon-disabled"></i><span class="date-label">15</span><td><span class="date-label">16</span>受付中</table>"#;
        assert_eq!(
            parse_available_dates(html, date(2025, 3, 1)),
            vec!["2025-03-12", "2025-03-14", "2025-03-16"]
        );
    }

    #[test]
    fn test_calendar_cells_stop_at_boundaries() {
        let html = "<tr><td>a</td> <td>b<td>c</tr><td>d";
        let cells: Vec<_> = calendar_cells(html).collect();
        assert_eq!(cells, vec!["<td>a</td>", "<td>b", "<td>c", "<td>d"]);
    }

    #[test]
    fn test_available_icon_without_dates_contributes_nothing() {
        let html = r#"<td><i class="icon-available"></i> Available <span class="date-label">5</span></td>"#;
        assert!(parse_available_dates(html, date(2025, 3, 1)).is_empty());
    }

    #[test]
    fn test_disabled_icon_beats_text() {
        let html = r#"<td><i class="icon-disabled"></i>受付中<span class="date-label">5</span></td>"#;
        assert!(parse_available_dates(html, date(2025, 3, 1)).is_empty());
    }

    #[test]
    fn test_text_detection_uses_fallback_month() {
        let html = r#"
            <td><span class="date-label">4</span><span>受付中</span></td>
            <td><span class="day-num">9日</span>Available</td>
            <td><span class="date-label">10</span>Unavailable</td>
            <td><span class="date-label">11</span>Not Available</td>"#;
        assert_eq!(
            parse_available_dates(html, date(2025, 4, 30)),
            vec!["2025-04-04", "2025-04-09"]
        );
    }

    #[test]
    fn test_malformed_days_are_suppressed() {
        let html = r#"
            <td><span class="date-label">32</span>Available</td>
            <td><span class="date-label">0</span>Available</td>
            <td><span class="date-label">x</span>Available</td>
            <td><span class="date-label">30</span>Available</td>
            <td class="icon-available" data-date="2025/02/30"></td>"#;
        assert!(parse_available_dates(html, date(2025, 2, 1)).is_empty());
    }

    #[test]
    fn test_results_sorted_and_unique() {
        let html = r#"
            <td><i class="icon-available"></i><b data-date="2025-03-20"></b></td>
            <td><i class="icon-available"></i><b data-date="2025/03/02"></b><b data-date="2025/03/20"></b></td>"#;
        assert_eq!(
            parse_available_dates(html, date(2025, 3, 1)),
            vec!["2025-03-02", "2025-03-20"]
        );
    }

    #[test]
    fn test_classifier_order_is_respected() {
        struct AlwaysUnavailable;
        impl CellClassifier for AlwaysUnavailable {
            fn name(&self) -> &'static str {
                "always-unavailable"
            }
            fn classify(&self, _cell: &str, _month: YearMonth) -> CellVerdict {
                CellVerdict::Unavailable
            }
        }

        let html = r#"<td><i class="icon-available"></i><b data-date="2025/03/20"></b></td>"#;
        let blocked: &[&dyn CellClassifier] = &[&AlwaysUnavailable, &AvailableIconClassifier];
        assert!(parse_available_dates_with(html, date(2025, 3, 1), blocked).is_empty());
        let allowed: &[&dyn CellClassifier] = &[&AvailableIconClassifier, &AlwaysUnavailable];
        assert_eq!(parse_available_dates_with(html, date(2025, 3, 1), allowed), vec!["2025-03-20"]);
    }

    #[test]
    fn test_deciding_classifier_is_reported() {
        let month = YearMonth { year: 2025, month: 3 };
        let cases = [
            (r#"<td><i class="icon-available"></i><a data-date="2025/03/12"></a></td>"#, Some("available-icon")),
            (r#"<td><i class="icon-disabled"></i>Available<span class="date-label">5</span></td>"#, Some("disabled-icon")),
            (r#"<td><span class="date-label">5</span>受付中</td>"#, Some("availability-text")),
            ("<td>-</td>", None),
        ];
        for (cell, expected) in cases {
            let decided = deciding_classifier(cell, month, DEFAULT_CLASSIFIERS).map(|(name, _)| name);
            assert_eq!(decided, expected, "{}", cell);
        }
        assert_eq!(
            deciding_classifier(cases[2].0, month, DEFAULT_CLASSIFIERS),
            Some(("availability-text", CellVerdict::Available(vec![date(2025, 3, 5)])))
        );
    }

    #[test]
    fn test_classifier_names() {
        let names: Vec<_> = DEFAULT_CLASSIFIERS.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["available-icon", "disabled-icon", "availability-text"]);
    }
}
