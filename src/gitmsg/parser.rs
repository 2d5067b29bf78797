//! Parsing of GitMsg headers and reference sections.
//!
//! Failure discipline: a malformed header makes the whole message parse
//! as `None` with a warning; a malformed reference section is skipped
//! with a warning and the rest of the message proceeds. Parsing never
//! aborts ingestion.

use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;

use super::{GitMsgHeader, GitMsgReference, ParsedMessage};

const HEADER_PREFIX: &str = "--- GitMsg: ";
const REF_PREFIX: &str = "--- GitMsg-Ref: ";
const LINE_SUFFIX: &str = " ---";
const QUOTE_PREFIX: &str = "> ";

fn is_header_line(line: &str) -> bool {
    line.starts_with(HEADER_PREFIX) && line.ends_with(LINE_SUFFIX)
}

fn is_ref_line(line: &str) -> bool {
    line.starts_with(REF_PREFIX) && line.ends_with(LINE_SUFFIX)
}

/// Parse a commit message into content, header, and reference sections.
///
/// Returns `None` when the message carries no GitMsg header (the common
/// case for ordinary commits) or when the header line is malformed.
pub fn parse_message(message: &str) -> Option<ParsedMessage> {
    let lines: Vec<&str> = message.lines().collect();
    let header_idx = lines.iter().position(|line| is_header_line(line))?;

    let header_line = lines[header_idx];
    let inner = &header_line[HEADER_PREFIX.len()..header_line.len() - LINE_SUFFIX.len()];
    let header = match parse_header_fields(inner) {
        Ok(header) => header,
        Err(reason) => {
            log::warn!("ignoring message with malformed GitMsg header: {reason}");
            return None;
        }
    };

    let content = lines[..header_idx].join("\n").trim_end().to_string();
    let references = parse_reference_sections(&lines);

    Some(ParsedMessage {
        content,
        header,
        references,
    })
}

/// Remove embedded reference sections (header line plus quoted metadata
/// lines) from display content.
pub fn strip_reference_blocks(content: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut in_block = false;

    for line in content.lines() {
        if is_ref_line(line) {
            in_block = true;
            continue;
        }
        if in_block {
            if line.starts_with(QUOTE_PREFIX) || line == ">" {
                continue;
            }
            in_block = false;
        }
        out.push(line);
    }

    out.join("\n").trim_end().to_string()
}

/// Collect reference sections in order of appearance, from the whole
/// message: quote posts embed reference blocks in their body, above the
/// header line.
fn parse_reference_sections(lines: &[&str]) -> Vec<GitMsgReference> {
    let mut references = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        i += 1;

        if !is_ref_line(line) {
            continue;
        }

        let mut body_lines: Vec<&str> = Vec::new();
        while i < lines.len() {
            let next = lines[i];
            if is_ref_line(next) || is_header_line(next) {
                break;
            }
            if let Some(stripped) = next.strip_prefix(QUOTE_PREFIX) {
                body_lines.push(stripped);
                i += 1;
            } else if next == ">" {
                body_lines.push("");
                i += 1;
            } else if next.trim().is_empty() {
                i += 1;
            } else {
                break;
            }
        }

        let inner = &line[REF_PREFIX.len()..line.len() - LINE_SUFFIX.len()];
        match parse_reference_fields(inner, body_lines.join("\n")) {
            Ok(reference) => references.push(reference),
            Err(reason) => log::warn!("skipping malformed GitMsg reference: {reason}"),
        }
    }

    references
}

fn parse_header_fields(inner: &str) -> Result<GitMsgHeader, String> {
    let mut pairs = parse_fields(inner)?;

    if pairs.first().map(|(k, _)| k.as_str()) != Some("ext") {
        return Err("first field must be `ext`".to_string());
    }
    let ext = pairs.remove(0).1;

    let ext_version = take_tail(&mut pairs, "ext-v").ok_or("missing `ext-v` field")?;
    let version = take_tail(&mut pairs, "v").ok_or("missing `v` field")?;

    let fields: IndexMap<String, String> = pairs.into_iter().collect();
    Ok(GitMsgHeader {
        ext,
        fields,
        version,
        ext_version,
    })
}

fn parse_reference_fields(inner: &str, body: String) -> Result<GitMsgReference, String> {
    let mut pairs = parse_fields(inner)?;

    if pairs.first().map(|(k, _)| k.as_str()) != Some("ext") {
        return Err("first field must be `ext`".to_string());
    }
    let ext = pairs.remove(0).1;

    let ext_version = take_tail(&mut pairs, "ext-v").unwrap_or_default();
    let version = take_tail(&mut pairs, "v").unwrap_or_default();

    let author = take_key(&mut pairs, "author");
    let email = take_key(&mut pairs, "email");
    let time = take_key(&mut pairs, "time").and_then(|raw| {
        let parsed = parse_time(&raw);
        if parsed.is_none() {
            log::debug!("unparseable reference time `{raw}`");
        }
        parsed
    });

    let target = take_key(&mut pairs, "ref").ok_or("missing `ref` field")?;

    let fields: IndexMap<String, String> = pairs.into_iter().collect();
    Ok(GitMsgReference {
        ext,
        author,
        email,
        time,
        fields,
        target,
        version,
        ext_version,
        body,
    })
}

/// Pop the trailing field when it carries the given key.
fn take_tail(pairs: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    if pairs.last().map(|(k, _)| k.as_str()) == Some(key) {
        pairs.pop().map(|(_, v)| v)
    } else {
        None
    }
}

/// Remove the first field with the given key, wherever it sits.
fn take_key(pairs: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    let idx = pairs.iter().position(|(k, _)| k == key)?;
    Some(pairs.remove(idx).1)
}

/// Reference times are RFC 3339; bare epoch milliseconds are tolerated.
fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

/// Parse a `key="value"; key="value"` field list. Values may contain
/// `\"` and `\\` escapes. Malformed quoting or a missing `=` fails the
/// whole list.
fn parse_fields(input: &str) -> Result<Vec<(String, String)>, String> {
    let mut fields = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while let Some(&c) = chars.peek() {
            if c == ' ' || c == ';' {
                chars.next();
            } else {
                break;
            }
        }
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        for c in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err("empty field key".to_string());
        }

        if chars.next() != Some('"') {
            return Err(format!("field `{key}` is not quoted"));
        }

        let mut value = String::new();
        let mut closed = false;
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(escaped @ ('"' | '\\')) => value.push(escaped),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => return Err(format!("dangling escape in field `{key}`")),
                },
                '"' => {
                    closed = true;
                    break;
                }
                other => value.push(other),
            }
        }
        if !closed {
            return Err(format!("unclosed quote in field `{key}`"));
        }

        fields.push((key, value));
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = concat!(
        "Shipping the new parser today.\n",
        "\n",
        "--- GitMsg: ext=\"social\"; type=\"comment\"; reply-to=\"#commit:abc123def456\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
        "--- GitMsg-Ref: ext=\"social\"; author=\"Ada\"; email=\"ada@example.com\"; time=\"2024-01-15T10:00:00.000Z\"; type=\"post\"; ref=\"https://github.com/u/r#commit:abc123def456\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
        "> the original post body\n",
        "> second line\n",
    );

    #[test]
    fn test_parse_message_full() {
        let parsed = parse_message(MESSAGE).unwrap();
        assert_eq!(parsed.content, "Shipping the new parser today.");
        assert_eq!(parsed.header.ext, "social");
        assert_eq!(parsed.header.field("type"), Some("comment"));
        assert_eq!(parsed.header.field("reply-to"), Some("#commit:abc123def456"));
        assert_eq!(parsed.header.version, "1.0");
        assert_eq!(parsed.header.ext_version, "1.0");

        assert_eq!(parsed.references.len(), 1);
        let reference = &parsed.references[0];
        assert_eq!(reference.author.as_deref(), Some("Ada"));
        assert_eq!(reference.email.as_deref(), Some("ada@example.com"));
        assert_eq!(
            reference.target,
            "https://github.com/u/r#commit:abc123def456"
        );
        assert_eq!(reference.field("type"), Some("post"));
        assert_eq!(reference.body, "the original post body\nsecond line");
        assert!(reference.time.is_some());
    }

    #[test]
    fn test_parse_message_without_header() {
        assert!(parse_message("just a regular commit\n\nwith a body").is_none());
    }

    #[test]
    fn test_parse_message_malformed_header() {
        let message = "hi\n--- GitMsg: ext=\"social\"; v=\"1.0\" ---\n";
        // Missing ext-v tail.
        assert!(parse_message(message).is_none());

        let unquoted = "hi\n--- GitMsg: ext=social; v=\"1.0\"; ext-v=\"1.0\" ---\n";
        assert!(parse_message(unquoted).is_none());
    }

    #[test]
    fn test_malformed_reference_is_skipped() {
        let message = concat!(
            "content\n",
            "--- GitMsg: ext=\"social\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
            "--- GitMsg-Ref: ext=\"social\"; author=\"x\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
            "> orphaned body\n",
            "--- GitMsg-Ref: ext=\"social\"; ref=\"#commit:abc123def456\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
            "> kept\n",
        );
        let parsed = parse_message(message).unwrap();
        // The first reference lacks `ref` and is dropped.
        assert_eq!(parsed.references.len(), 1);
        assert_eq!(parsed.references[0].target, "#commit:abc123def456");
        assert_eq!(parsed.references[0].body, "kept");
    }

    #[test]
    fn test_reference_embedded_in_body() {
        let message = concat!(
            "Look at this:\n",
            "--- GitMsg-Ref: ext=\"social\"; author=\"Ada\"; email=\"a@x.com\"; time=\"2024-01-15T10:00:00Z\"; type=\"post\"; ref=\"#commit:abc123def456\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
            "> quoted post\n",
            "\n",
            "--- GitMsg: ext=\"social\"; type=\"quote\"; original=\"#commit:abc123def456\"; v=\"1.0\"; ext-v=\"1.0\" ---\n",
        );
        let parsed = parse_message(message).unwrap();
        assert_eq!(parsed.references.len(), 1);
        assert!(parsed.content.contains("GitMsg-Ref"));
        assert_eq!(strip_reference_blocks(&parsed.content), "Look at this:");
    }

    #[test]
    fn test_parse_fields_escapes() {
        let fields = parse_fields(r#"ext="social"; note="say \"hi\"; ok"; v="1""#).unwrap();
        assert_eq!(fields[1].1, r#"say "hi"; ok"#);
    }

    #[test]
    fn test_parse_time_formats() {
        assert!(parse_time("2024-01-15T10:00:00.000Z").is_some());
        assert!(parse_time("1705312800000").is_some());
        assert!(parse_time("yesterday").is_none());
    }

    #[test]
    fn test_strip_reference_blocks_no_blocks() {
        assert_eq!(strip_reference_blocks("plain content"), "plain content");
    }
}
