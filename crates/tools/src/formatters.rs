//! Display formatting for final replies.
//!
//! Small models sometimes answer by pasting a raw tool payload into the
//! `respond` text. These helpers detect Gmail message payloads and Google
//! Calendar event lists and turn them into a readable summary. Anything
//! else passes through unchanged.

use serde_json::Value;

const MAX_EMAILS: usize = 5;
const MAX_EVENTS: usize = 5;
const RULE: &str = "--------------------------------------------------";

/// Reformat a final reply for display.
pub fn format_reply(text: &str) -> String {
    let Some(payload) = embedded_json(text) else {
        return text.to_string();
    };

    if text.contains("messageText") || text.contains("labelIds") {
        if let Some(formatted) = format_gmail(&payload) {
            return formatted;
        }
    }

    if let Some(formatted) = format_calendar(&payload) {
        return formatted;
    }

    text.to_string()
}

/// The outermost `{...}` span of the text, if it parses as JSON.
fn embedded_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn str_field<'a>(value: &'a Value, key: &str, fallback: &'a str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or(fallback)
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn email_preview(email: &Value, max: usize) -> String {
    match email.get("preview") {
        Some(Value::Object(preview)) => {
            truncate(preview.get("body").and_then(Value::as_str).unwrap_or(""), max)
        }
        Some(Value::String(preview)) => truncate(preview, max),
        _ => truncate(str_field(email, "messageText", ""), max),
    }
}

/// Summarise a single message or a message list.
pub fn format_gmail(payload: &Value) -> Option<String> {
    if payload.get("sender").is_some() && payload.get("subject").is_some() {
        return Some(format!(
            "Email found:\n\nFrom: {}\nSubject: {}\nTo: {}\nPreview: {}...\n",
            str_field(payload, "sender", "Unknown"),
            str_field(payload, "subject", "No subject"),
            str_field(payload, "to", "Unknown"),
            email_preview(payload, 150),
        ));
    }

    let emails = payload
        .pointer("/data/emails")
        .or_else(|| payload.pointer("/data/messages"))
        .or_else(|| payload.get("emails"))
        .or_else(|| payload.get("messages"))
        .and_then(Value::as_array)
        .filter(|e| !e.is_empty())?;

    let mut out = format!("Found {} emails:\n\n", emails.len());
    for email in emails.iter().take(MAX_EMAILS) {
        out.push_str(&format!(
            "From: {}\nSubject: {}\nPreview: {}...\n{RULE}\n",
            str_field(email, "sender", "Unknown"),
            str_field(email, "subject", "No subject"),
            email_preview(email, 100),
        ));
    }
    if emails.len() > MAX_EMAILS {
        out.push_str(&format!("\n... and {} more emails", emails.len() - MAX_EMAILS));
    }
    Some(out)
}

/// Summarise a calendar event list (`{"items": [...]}` with `start` times).
pub fn format_calendar(payload: &Value) -> Option<String> {
    let events = payload
        .get("items")
        .or_else(|| payload.pointer("/data/items"))
        .and_then(Value::as_array)?;

    if !events.iter().all(|e| e.get("start").is_some()) {
        return None;
    }

    let mut out = format!("Found {} calendar events:\n\n", events.len());
    for event in events.iter().take(MAX_EVENTS) {
        let start = event
            .pointer("/start/dateTime")
            .or_else(|| event.pointer("/start/date"))
            .and_then(Value::as_str)
            .unwrap_or("TBD");
        out.push_str(&format!(
            "Event: {}\nTime: {start}\n",
            str_field(event, "summary", "No title")
        ));
        if let Some(description) = event.get("description").and_then(Value::as_str) {
            out.push_str(&format!("Description: {}...\n", truncate(description, 80)));
        }
        out.push_str(RULE);
        out.push('\n');
    }
    if events.len() > MAX_EVENTS {
        out.push_str(&format!("\n... and {} more events", events.len() - MAX_EVENTS));
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_untouched() {
        assert_eq!(format_reply("You have 3 unread emails."), "You have 3 unread emails.");
        assert_eq!(format_reply("set {x} later"), "set {x} later");
    }

    #[test]
    fn single_email_summarised() {
        let raw = r#"Here it is: {"sender":"alice@example.com","subject":"Lunch","to":"me","messageText":"Are we still on?","labelIds":["INBOX"]}"#;
        let out = format_reply(raw);
        assert!(out.starts_with("Email found:"));
        assert!(out.contains("From: alice@example.com"));
        assert!(out.contains("Preview: Are we still on?"));
    }

    #[test]
    fn email_list_capped_at_five() {
        let emails: Vec<Value> = (0..7)
            .map(|i| {
                serde_json::json!({
                    "sender": format!("s{i}@example.com"),
                    "subject": format!("subject {i}"),
                    "preview": {"body": "hi"},
                    "labelIds": ["INBOX"]
                })
            })
            .collect();
        let raw = serde_json::json!({ "data": { "emails": emails } }).to_string();
        let out = format_reply(&raw);
        assert!(out.starts_with("Found 7 emails:"));
        assert!(out.contains("s4@example.com"));
        assert!(!out.contains("s5@example.com"));
        assert!(out.contains("... and 2 more emails"));
    }

    #[test]
    fn calendar_events_summarised() {
        let raw = r#"{"items":[{"summary":"Standup","start":{"dateTime":"2026-10-19T09:00:00Z"}},{"summary":"Holiday","start":{"date":"2026-10-20"}}]}"#;
        let out = format_reply(raw);
        assert!(out.starts_with("Found 2 calendar events:"));
        assert!(out.contains("Event: Standup\nTime: 2026-10-19T09:00:00Z"));
        assert!(out.contains("Time: 2026-10-20"));
    }
}
