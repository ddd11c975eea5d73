// Logging utilities
// Structured logging with JSON and human-readable formats, plus secret scrubbing

use log::Level;
use serde_json::json;

/// Mask sensitive data in logs
pub fn mask_sensitive(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }

    let visible = 4;
    let start: String = chars[..visible].iter().collect();
    let end: String = chars[chars.len() - visible..].iter().collect();

    format!("{}...{}", start, end)
}

/// Describe a database target for logs: `mysql://<masked user>@host:port[/database]`.
///
/// The password is never part of the description.
pub fn describe_db_target(
    engine: &str,
    host: &str,
    port: u16,
    user: &str,
    database: Option<&str>,
) -> String {
    let masked_user = if user.trim().is_empty() {
        String::new()
    } else {
        format!("{}@", mask_sensitive(user))
    };

    match database.filter(|d| !d.trim().is_empty()) {
        Some(db) => format!("{engine}://{masked_user}{host}:{port}/{db}"),
        None => format!("{engine}://{masked_user}{host}:{port}"),
    }
}

/// Replace every occurrence of each non-empty secret in `text` with `***`.
///
/// Longer secrets are replaced first so a secret that contains another one is
/// not left half-visible.
pub fn redact_secrets(text: &str, secrets: &[&str]) -> String {
    let mut ordered: Vec<&str> = secrets
        .iter()
        .copied()
        .filter(|s| !s.is_empty())
        .collect();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let mut out = text.to_string();
    for secret in ordered {
        if out.contains(secret) {
            out = out.replace(secret, "***");
        }
    }
    out
}

/// Parse phase and step from log message
/// Extracts [PHASE: ...] and [STEP: ...] patterns
pub fn parse_log_metadata(message: &str) -> (Option<String>, Option<String>, String) {
    let (phase, rest) = take_tag(message, "[PHASE:");
    let (step, cleaned) = take_tag(&rest, "[STEP:");
    (phase, step, cleaned)
}

fn take_tag(message: &str, open: &str) -> (Option<String>, String) {
    let Some(start) = message.find(open) else {
        return (None, message.to_string());
    };
    let Some(end) = message[start..].find(']') else {
        return (None, message.to_string());
    };

    let value = message[start + open.len()..start + end].trim().to_string();
    let cleaned = format!("{} {}", &message[..start], &message[start + end + 1..])
        .trim()
        .to_string();
    (Some(value), cleaned)
}

/// Format log entry as JSON for structured logging
pub fn format_json_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_entry = json!({
        "timestamp": timestamp,
        "level": level.as_str(),
        "target": target,
        "message": message,
    });

    if let Some(phase) = phase {
        log_entry["phase"] = json!(phase);
    }

    if let Some(step) = step {
        log_entry["step"] = json!(step);
    }

    serde_json::to_string(&log_entry).unwrap_or_else(|_| "{}".to_string())
}

/// Format log entry as human-readable text
pub fn format_human_readable_log(
    timestamp: &str,
    level: Level,
    target: &str,
    message: &str,
    phase: Option<&str>,
    step: Option<&str>,
) -> String {
    let mut log_line = format!("[{}] [{}]", timestamp, level.as_str());

    if let Some(phase) = phase {
        log_line.push_str(&format!(" [PHASE: {}]", phase));
    }

    if let Some(step) = step {
        log_line.push_str(&format!(" [STEP: {}]", step));
    }

    log_line.push_str(&format!(" [{}] {}", target, message));
    log_line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_sensitive_short_values_fully_masked() {
        assert_eq!(mask_sensitive("abc"), "***");
        assert_eq!(mask_sensitive("12345678"), "***");
    }

    #[test]
    fn mask_sensitive_long_values_partially_masked() {
        let masked = mask_sensitive("abcdefghijklmnop");
        assert_eq!(masked, "abcd...mnop");
    }

    #[test]
    fn mask_sensitive_handles_multibyte_input() {
        let masked = mask_sensitive("管理员管理员管理员管理员");
        assert!(masked.contains("..."), "got {}", masked);
    }

    #[test]
    fn describe_db_target_never_contains_password_and_masks_user() {
        let described = describe_db_target("mysql", "db.internal", 3306, "scheduler_owner", Some("app"));
        assert_eq!(described, "mysql://sche...wner@db.internal:3306/app");

        let short_user = describe_db_target("mysql", "localhost", 3306, "root", None);
        assert_eq!(short_user, "mysql://***@localhost:3306");
    }

    #[test]
    fn redact_secrets_replaces_every_occurrence() {
        let text = "auth failed for root using changeme1; retry with changeme1";
        let redacted = redact_secrets(text, &["changeme1"]);
        assert!(!redacted.contains("changeme1"), "leaked: {}", redacted);
        assert_eq!(redacted.matches("***").count(), 2);
    }

    #[test]
    fn redact_secrets_prefers_longer_secret() {
        let redacted = redact_secrets("token=secret-long", &["secret", "secret-long"]);
        assert_eq!(redacted, "token=***");
    }

    #[test]
    fn redact_secrets_ignores_empty_secret() {
        assert_eq!(redact_secrets("nothing to hide", &[""]), "nothing to hide");
    }

    #[test]
    fn parse_log_metadata_extracts_phase_and_step() {
        let (phase, step, msg) =
            parse_log_metadata("[PHASE: install] [STEP: schema] Applying baseline schema");
        assert_eq!(phase.as_deref(), Some("install"));
        assert_eq!(step.as_deref(), Some("schema"));
        assert_eq!(msg, "Applying baseline schema");
    }

    #[test]
    fn parse_log_metadata_without_tags_is_untouched() {
        let (phase, step, msg) = parse_log_metadata("plain message");
        assert!(phase.is_none());
        assert!(step.is_none());
        assert_eq!(msg, "plain message");
    }

    #[test]
    fn json_log_contains_phase_and_step_fields() {
        let line = format_json_log(
            "2026-01-01T00:00:00Z",
            Level::Info,
            "scheduler_installer",
            "done",
            Some("install"),
            Some("lock"),
        );
        let value: serde_json::Value = serde_json::from_str(&line).expect("valid json");
        assert_eq!(value["phase"], "install");
        assert_eq!(value["step"], "lock");
        assert_eq!(value["level"], "INFO");
    }
}
