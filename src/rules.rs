//! C8: mailing-list / rules evaluator (spec §4.8).
//!
//! Grounded on `original_source/webcit/sieve.c`'s rule record shape,
//! reworked as a typed `Rule` + ordered evaluation instead of a
//! `|`-delimited in-place buffer.

use crate::message::{Field, Message};
use base64::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    From,
    ToCc,
    Subject,
    ReplyTo,
    Sender,
    ResentFrom,
    ResentTo,
    EnvFrom,
    EnvTo,
    XMailer,
    XSpamFlag,
    XSpamStatus,
    ListId,
    Size,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Contains,
    NotContains,
    Is,
    NotIs,
    Matches,
    NotMatches,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeOp {
    Larger,
    Smaller,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Keep,
    Discard,
    Reject,
    FileInto,
    Redirect,
    Vacation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub active: bool,
    pub header_field: HeaderField,
    pub compare_op: CompareOp,
    pub text: String,
    pub size_op: Option<SizeOp>,
    pub size_value: i64,
    pub action: Action,
    pub fileinto_room: Option<String>,
    pub redirect_addr: Option<String>,
    pub auto_message: Option<String>,
    /// Minimum interval, in days, between two `vacation` auto-replies to
    /// the same sender (spec §4.8: "at most once per unique sender per N
    /// days"). Ignored by every other action.
    pub vacation_days: i64,
    pub disposition: Disposition,
}

/// Per-sender vacation dedup state, kept alongside a user's rule set
/// across calls to [`evaluate`] (spec §4.8). A fresh `VacationLog` has no
/// memory of past sends, so the caller must hold on to one instance per
/// user rather than constructing a new one per message.
#[derive(Debug, Clone, Default)]
pub struct VacationLog {
    last_sent: std::collections::HashMap<String, i64>,
}

impl VacationLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn due(&self, sender: &str, now: i64, min_interval_days: i64) -> bool {
        match self.last_sent.get(sender) {
            Some(&last) => now.saturating_sub(last) >= min_interval_days.max(0) * 86_400,
            None => true,
        }
    }

    fn record(&mut self, sender: &str, now: i64) {
        self.last_sent.insert(sender.to_string(), now);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Keep,
    Discard,
    Reject { text: String },
    FileInto { room: String },
    Redirect { addr: String },
    Vacation { addr: String, auto_message: String },
}

/// Evaluate `rules` in order against `msg`, given the target user's known
/// Internet addresses (needed by the `vacation` action) and that user's
/// running [`VacationLog`] (needed to suppress repeat auto-replies).
/// Returns the ordered sequence of triggered actions (spec §8:
/// determinism).
pub fn evaluate(
    rules: &[Rule],
    msg: &Message,
    size_bytes: i64,
    known_addresses: &[String],
    vacation_log: &mut VacationLog,
    now: i64,
) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    let mut stopped = false;

    for rule in rules {
        if !rule.active {
            continue;
        }
        if !predicate_matches(rule, msg, size_bytes) {
            continue;
        }
        if let Some(outcome) = apply_action(rule, msg, known_addresses, vacation_log, now) {
            outcomes.push(outcome);
        }
        if rule.disposition == Disposition::Stop {
            stopped = true;
            break;
        }
    }

    if !stopped && outcomes.iter().all(|o| !matches!(o, Outcome::Discard)) {
        outcomes.push(Outcome::Keep);
    }

    outcomes
}

fn predicate_matches(rule: &Rule, msg: &Message, size_bytes: i64) -> bool {
    if rule.header_field == HeaderField::Size {
        let Some(op) = rule.size_op else { return false };
        return match op {
            SizeOp::Larger => size_bytes > rule.size_value,
            SizeOp::Smaller => size_bytes < rule.size_value,
        };
    }

    if rule.header_field == HeaderField::All {
        return compare(rule.compare_op, &msg.body_text(), &rule.text)
            || msg.get(Field::Subject).is_some_and(|s| compare(rule.compare_op, s, &rule.text));
    }

    let value = field_text(rule.header_field, msg).unwrap_or_default();
    compare(rule.compare_op, &value, &rule.text)
}

fn field_text(field: HeaderField, msg: &Message) -> Option<String> {
    match field {
        HeaderField::From | HeaderField::Sender => msg.get(Field::FromAddr).map(str::to_string),
        HeaderField::ToCc => {
            let to = msg.get(Field::Recipient).unwrap_or("");
            let cc = msg.get(Field::Cc).unwrap_or("");
            Some(format!("{to} {cc}").trim().to_string())
        }
        HeaderField::Subject => msg.get(Field::Subject).map(str::to_string),
        HeaderField::ReplyTo => msg.get(Field::ReplyTo).map(str::to_string),
        HeaderField::ResentFrom => msg.extra_fields.get("RF").cloned(),
        HeaderField::ResentTo => msg.extra_fields.get("RT").cloned(),
        HeaderField::EnvFrom => msg.get(Field::Path).map(str::to_string),
        HeaderField::EnvTo => msg.get(Field::EnvelopeTo).map(str::to_string),
        HeaderField::XMailer => msg.extra_fields.get("XM").cloned(),
        HeaderField::XSpamFlag => msg.extra_fields.get("XSF").cloned(),
        HeaderField::XSpamStatus => msg.extra_fields.get("XSS").cloned(),
        HeaderField::ListId => msg.get(Field::ListId).map(str::to_string),
        HeaderField::Size | HeaderField::All => None,
    }
}

fn compare(op: CompareOp, haystack: &str, needle: &str) -> bool {
    match op {
        CompareOp::Contains => haystack.to_lowercase().contains(&needle.to_lowercase()),
        CompareOp::NotContains => !haystack.to_lowercase().contains(&needle.to_lowercase()),
        CompareOp::Is => haystack.eq_ignore_ascii_case(needle),
        CompareOp::NotIs => !haystack.eq_ignore_ascii_case(needle),
        CompareOp::Matches => glob_match(needle, haystack),
        CompareOp::NotMatches => !glob_match(needle, haystack),
    }
}

/// Minimal glob matcher supporting `*` and `?`, per spec §4.8.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc.to_ascii_lowercase() == tc.to_ascii_lowercase() => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

fn apply_action(
    rule: &Rule,
    msg: &Message,
    known_addresses: &[String],
    vacation_log: &mut VacationLog,
    now: i64,
) -> Option<Outcome> {
    match rule.action {
        Action::Keep => Some(Outcome::Keep),
        Action::Discard => Some(Outcome::Discard),
        Action::Reject => Some(Outcome::Reject {
            text: rule.auto_message.clone().unwrap_or_default(),
        }),
        Action::FileInto => rule.fileinto_room.clone().map(|room| Outcome::FileInto { room }),
        Action::Redirect => rule.redirect_addr.clone().map(|addr| Outcome::Redirect { addr }),
        Action::Vacation => {
            let envelope_to = msg.get(Field::EnvelopeTo).or_else(|| msg.get(Field::Recipient));
            let addressed_to_us = envelope_to.is_some_and(|addr| known_addresses.iter().any(|a| a.eq_ignore_ascii_case(addr)));
            if !addressed_to_us {
                return None;
            }
            let sender = msg.get(Field::FromAddr).unwrap_or("").to_string();
            if !vacation_log.due(&sender, now, rule.vacation_days) {
                return None;
            }
            vacation_log.record(&sender, now);
            Some(Outcome::Vacation {
                addr: sender,
                auto_message: rule.auto_message.clone().unwrap_or_default(),
            })
        }
    }
}

/// Serialize one rule as the `|`-delimited base64 record persisted via
/// `PIBR` (spec §4.8).
pub fn encode_rule(rule: &Rule) -> String {
    let header = header_field_code(rule.header_field);
    let cmp = compare_op_code(rule.compare_op);
    let size_op = rule.size_op.map(size_op_code).unwrap_or("-");
    let action = action_code(&rule.action);
    let disposition = match rule.disposition {
        Disposition::Continue => "continue",
        Disposition::Stop => "stop",
    };
    let record = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        rule.active as u8,
        header,
        cmp,
        rule.text,
        size_op,
        rule.size_value,
        action,
        rule.fileinto_room.as_deref().unwrap_or(""),
        rule.redirect_addr.as_deref().unwrap_or(""),
        rule.auto_message.as_deref().unwrap_or(""),
        rule.vacation_days,
        disposition,
    );
    base64::engine::general_purpose::STANDARD.encode(record)
}

pub fn decode_rule(encoded: &str) -> Option<Rule> {
    let decoded = base64::engine::general_purpose::STANDARD.decode(encoded).ok()?;
    let record = String::from_utf8(decoded).ok()?;
    let parts: Vec<&str> = record.split('|').collect();
    if parts.len() != 12 {
        return None;
    }
    Some(Rule {
        active: parts[0] == "1",
        header_field: parse_header_field(parts[1])?,
        compare_op: parse_compare_op(parts[2])?,
        text: parts[3].to_string(),
        size_op: parse_size_op(parts[4]),
        size_value: parts[5].parse().unwrap_or(0),
        action: parse_action(parts[6])?,
        fileinto_room: non_empty(parts[7]),
        redirect_addr: non_empty(parts[8]),
        auto_message: non_empty(parts[9]),
        vacation_days: parts[10].parse().unwrap_or(7),
        disposition: if parts[11] == "stop" { Disposition::Stop } else { Disposition::Continue },
    })
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() { None } else { Some(s.to_string()) }
}

fn header_field_code(f: HeaderField) -> &'static str {
    match f {
        HeaderField::From => "from",
        HeaderField::ToCc => "tocc",
        HeaderField::Subject => "subject",
        HeaderField::ReplyTo => "replyto",
        HeaderField::Sender => "sender",
        HeaderField::ResentFrom => "resentfrom",
        HeaderField::ResentTo => "resentto",
        HeaderField::EnvFrom => "envfrom",
        HeaderField::EnvTo => "envto",
        HeaderField::XMailer => "xmailer",
        HeaderField::XSpamFlag => "xspamflag",
        HeaderField::XSpamStatus => "xspamstatus",
        HeaderField::ListId => "listid",
        HeaderField::Size => "size",
        HeaderField::All => "all",
    }
}

fn parse_header_field(s: &str) -> Option<HeaderField> {
    Some(match s {
        "from" => HeaderField::From,
        "tocc" => HeaderField::ToCc,
        "subject" => HeaderField::Subject,
        "replyto" => HeaderField::ReplyTo,
        "sender" => HeaderField::Sender,
        "resentfrom" => HeaderField::ResentFrom,
        "resentto" => HeaderField::ResentTo,
        "envfrom" => HeaderField::EnvFrom,
        "envto" => HeaderField::EnvTo,
        "xmailer" => HeaderField::XMailer,
        "xspamflag" => HeaderField::XSpamFlag,
        "xspamstatus" => HeaderField::XSpamStatus,
        "listid" => HeaderField::ListId,
        "size" => HeaderField::Size,
        "all" => HeaderField::All,
        _ => return None,
    })
}

fn compare_op_code(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Contains => "contains",
        CompareOp::NotContains => "!contains",
        CompareOp::Is => "is",
        CompareOp::NotIs => "!is",
        CompareOp::Matches => "matches",
        CompareOp::NotMatches => "!matches",
    }
}

fn parse_compare_op(s: &str) -> Option<CompareOp> {
    Some(match s {
        "contains" => CompareOp::Contains,
        "!contains" => CompareOp::NotContains,
        "is" => CompareOp::Is,
        "!is" => CompareOp::NotIs,
        "matches" => CompareOp::Matches,
        "!matches" => CompareOp::NotMatches,
        _ => return None,
    })
}

fn size_op_code(op: SizeOp) -> &'static str {
    match op {
        SizeOp::Larger => "larger",
        SizeOp::Smaller => "smaller",
    }
}

fn parse_size_op(s: &str) -> Option<SizeOp> {
    match s {
        "larger" => Some(SizeOp::Larger),
        "smaller" => Some(SizeOp::Smaller),
        _ => None,
    }
}

fn action_code(a: &Action) -> &'static str {
    match a {
        Action::Keep => "keep",
        Action::Discard => "discard",
        Action::Reject => "reject",
        Action::FileInto => "fileinto",
        Action::Redirect => "redirect",
        Action::Vacation => "vacation",
    }
}

fn parse_action(s: &str) -> Option<Action> {
    Some(match s {
        "keep" => Action::Keep,
        "discard" => Action::Discard,
        "reject" => Action::Reject,
        "fileinto" => Action::FileInto,
        "redirect" => Action::Redirect,
        "vacation" => Action::Vacation,
        _ => return None,
    })
}

/// Parse the `GIBR` response body: lines not matching the `rule|` prefix
/// are ignored for forward-compatibility (spec §4.8).
pub fn parse_gibr_lines(lines: &[String]) -> Vec<Rule> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("rule|"))
        .filter_map(|rest| {
            let mut parts = rest.splitn(2, '|');
            let _idx = parts.next()?;
            let encoded = parts.next()?.trim_end_matches('|');
            decode_rule(encoded)
        })
        .collect()
}

/// Render the `PIBR` request body for a rule set.
pub fn render_pibr_lines(rules: &[Rule]) -> Vec<String> {
    rules
        .iter()
        .enumerate()
        .map(|(i, r)| format!("rule|{}|{}|", i, encode_rule(r)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Body, Field, Message};

    fn sample_message(list_id: &str) -> Message {
        let mut m = Message::new(Body::Flat("hello".into()));
        m.set(Field::ListId, format!("<{list_id}>"));
        m
    }

    fn eval(rules: &[Rule], msg: &Message, size_bytes: i64, known_addresses: &[String]) -> Vec<Outcome> {
        evaluate(rules, msg, size_bytes, known_addresses, &mut VacationLog::new(), 0)
    }

    #[test]
    fn fileinto_stops_evaluation() {
        let rules = vec![Rule {
            active: true,
            header_field: HeaderField::ListId,
            compare_op: CompareOp::Contains,
            text: "citadel-announce".into(),
            size_op: None,
            size_value: 0,
            action: Action::FileInto,
            fileinto_room: Some("Announcements".into()),
            redirect_addr: None,
            auto_message: None,
            vacation_days: 7,
            disposition: Disposition::Stop,
        }];
        let msg = sample_message("citadel-announce.x");
        let outcomes = eval(&rules, &msg, 100, &[]);
        assert_eq!(outcomes, vec![Outcome::FileInto { room: "Announcements".into() }]);
    }

    #[test]
    fn no_matching_rule_keeps_by_default() {
        let msg = sample_message("unrelated-list");
        let outcomes = eval(&[], &msg, 100, &[]);
        assert_eq!(outcomes, vec![Outcome::Keep]);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let rules = vec![Rule {
            active: true,
            header_field: HeaderField::Subject,
            compare_op: CompareOp::Contains,
            text: "urgent".into(),
            size_op: None,
            size_value: 0,
            action: Action::Discard,
            fileinto_room: None,
            redirect_addr: None,
            auto_message: None,
            vacation_days: 7,
            disposition: Disposition::Stop,
        }];
        let mut msg = Message::new(Body::Flat("x".into()));
        msg.set(Field::Subject, "URGENT: read me");
        let first = eval(&rules, &msg, 10, &[]);
        let second = eval(&rules, &msg, 10, &[]);
        assert_eq!(first, second);
        assert_eq!(first, vec![Outcome::Discard]);
    }

    #[test]
    fn rule_encode_decode_roundtrip() {
        let rule = Rule {
            active: true,
            header_field: HeaderField::Size,
            compare_op: CompareOp::Is,
            text: String::new(),
            size_op: Some(SizeOp::Larger),
            size_value: 1_000_000,
            action: Action::Reject,
            fileinto_room: None,
            redirect_addr: None,
            auto_message: Some("too big".into()),
            vacation_days: 3,
            disposition: Disposition::Continue,
        };
        let encoded = encode_rule(&rule);
        let decoded = decode_rule(&encoded).unwrap();
        assert_eq!(decoded.size_value, 1_000_000);
        assert_eq!(decoded.auto_message.as_deref(), Some("too big"));
        assert_eq!(decoded.vacation_days, 3);
    }

    #[test]
    fn gibr_parse_ignores_unknown_prefixes() {
        let rules = vec![Rule {
            active: true,
            header_field: HeaderField::Subject,
            compare_op: CompareOp::Is,
            text: "x".into(),
            size_op: None,
            size_value: 0,
            action: Action::Keep,
            fileinto_room: None,
            redirect_addr: None,
            auto_message: None,
            vacation_days: 7,
            disposition: Disposition::Continue,
        }];
        let mut lines = render_pibr_lines(&rules);
        lines.push("future-feature|something-unknown".to_string());
        let parsed = parse_gibr_lines(&lines);
        assert_eq!(parsed.len(), 1);
    }

    fn vacation_rule(vacation_days: i64) -> Rule {
        Rule {
            active: true,
            header_field: HeaderField::All,
            compare_op: CompareOp::Contains,
            text: "".into(),
            size_op: None,
            size_value: 0,
            action: Action::Vacation,
            fileinto_room: None,
            redirect_addr: None,
            auto_message: Some("I am away".into()),
            vacation_days,
            disposition: Disposition::Continue,
        }
    }

    #[test]
    fn vacation_only_fires_when_addressed_to_known_address() {
        let rules = vec![vacation_rule(7)];
        let mut msg = Message::new(Body::Flat("hi".into()));
        msg.set(Field::FromAddr, "sender@example.com");
        msg.set(Field::EnvelopeTo, "unknown@example.com");
        let outcomes = eval(&rules, &msg, 10, &["me@example.com".to_string()]);
        assert!(!outcomes.iter().any(|o| matches!(o, Outcome::Vacation { .. })));

        msg.set(Field::EnvelopeTo, "me@example.com");
        let outcomes = eval(&rules, &msg, 10, &["me@example.com".to_string()]);
        assert!(outcomes.iter().any(|o| matches!(o, Outcome::Vacation { .. })));
    }

    #[test]
    fn vacation_suppressed_within_n_days_then_fires_again() {
        let rules = vec![vacation_rule(5)];
        let mut msg = Message::new(Body::Flat("hi".into()));
        msg.set(Field::FromAddr, "sender@example.com");
        msg.set(Field::EnvelopeTo, "me@example.com");
        let known = vec!["me@example.com".to_string()];
        let mut log = VacationLog::new();

        let day0 = evaluate(&rules, &msg, 10, &known, &mut log, 0);
        assert!(day0.iter().any(|o| matches!(o, Outcome::Vacation { .. })), "first message should fire");

        let day2 = evaluate(&rules, &msg, 10, &known, &mut log, 2 * 86_400);
        assert!(
            !day2.iter().any(|o| matches!(o, Outcome::Vacation { .. })),
            "second message from the same sender within 5 days must be suppressed"
        );

        let day6 = evaluate(&rules, &msg, 10, &known, &mut log, 6 * 86_400);
        assert!(
            day6.iter().any(|o| matches!(o, Outcome::Vacation { .. })),
            "a message arriving after the interval elapses should fire again"
        );
    }

    #[test]
    fn vacation_dedup_is_per_sender() {
        let rules = vec![vacation_rule(30)];
        let known = vec!["me@example.com".to_string()];
        let mut log = VacationLog::new();

        let mut from_alice = Message::new(Body::Flat("hi".into()));
        from_alice.set(Field::FromAddr, "alice@example.com");
        from_alice.set(Field::EnvelopeTo, "me@example.com");
        let outcomes = evaluate(&rules, &from_alice, 10, &known, &mut log, 0);
        assert!(outcomes.iter().any(|o| matches!(o, Outcome::Vacation { .. })));

        let mut from_bob = Message::new(Body::Flat("hi".into()));
        from_bob.set(Field::FromAddr, "bob@example.com");
        from_bob.set(Field::EnvelopeTo, "me@example.com");
        let outcomes = evaluate(&rules, &from_bob, 10, &known, &mut log, 1);
        assert!(
            outcomes.iter().any(|o| matches!(o, Outcome::Vacation { .. })),
            "a different sender is not subject to another sender's dedup window"
        );
    }
}
