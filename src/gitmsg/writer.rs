//! Serialization of GitMsg headers and reference sections, the exact
//! inverse of the parser, including field order and the `v`/`ext-v` tail.

use chrono::SecondsFormat;

use super::{GitMsgHeader, GitMsgReference};

/// Render a complete commit message: content, header line, reference
/// sections with `> `-prefixed bodies.
pub fn write_message(
    content: &str,
    header: &GitMsgHeader,
    references: &[GitMsgReference],
) -> String {
    let mut out = String::new();
    let trimmed = content.trim_end();
    if !trimmed.is_empty() {
        out.push_str(trimmed);
        out.push_str("\n\n");
    }

    out.push_str(&header_line(header));
    out.push('\n');

    for reference in references {
        out.push_str(&reference_line(reference));
        out.push('\n');
        for line in reference.body.lines() {
            if line.is_empty() {
                out.push_str(">\n");
            } else {
                out.push_str("> ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    out
}

fn header_line(header: &GitMsgHeader) -> String {
    let mut fields: Vec<(&str, &str)> = vec![("ext", header.ext.as_str())];
    for (key, value) in &header.fields {
        fields.push((key, value));
    }
    fields.push(("v", header.version.as_str()));
    fields.push(("ext-v", header.ext_version.as_str()));
    format!("--- GitMsg: {} ---", join_fields(&fields))
}

fn reference_line(reference: &GitMsgReference) -> String {
    let time = reference
        .time
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));

    let mut fields: Vec<(&str, &str)> = vec![("ext", reference.ext.as_str())];
    if let Some(author) = &reference.author {
        fields.push(("author", author));
    }
    if let Some(email) = &reference.email {
        fields.push(("email", email));
    }
    if let Some(time) = &time {
        fields.push(("time", time));
    }
    for (key, value) in &reference.fields {
        fields.push((key, value));
    }
    fields.push(("ref", reference.target.as_str()));
    fields.push(("v", reference.version.as_str()));
    fields.push(("ext-v", reference.ext_version.as_str()));
    format!("--- GitMsg-Ref: {} ---", join_fields(&fields))
}

fn join_fields(fields: &[(&str, &str)]) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}=\"{}\"", escape(value)))
        .collect::<Vec<_>>()
        .join("; ")
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::super::parse_message;
    use super::*;
    use chrono::{TimeZone, Utc};
    use indexmap::IndexMap;

    fn sample_header() -> GitMsgHeader {
        let mut fields = IndexMap::new();
        fields.insert("type".to_string(), "comment".to_string());
        fields.insert("reply-to".to_string(), "#commit:abc123def456".to_string());
        GitMsgHeader {
            ext: "social".to_string(),
            fields,
            version: "1.0".to_string(),
            ext_version: "1.0".to_string(),
        }
    }

    fn sample_reference() -> GitMsgReference {
        let mut fields = IndexMap::new();
        fields.insert("type".to_string(), "post".to_string());
        GitMsgReference {
            ext: "social".to_string(),
            author: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            time: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()),
            fields,
            target: "https://github.com/u/r#commit:abc123def456".to_string(),
            version: "1.0".to_string(),
            ext_version: "1.0".to_string(),
            body: "the original post body".to_string(),
        }
    }

    #[test]
    fn test_write_then_parse_round_trip() {
        let header = sample_header();
        let reference = sample_reference();
        let message = write_message("hello world", &header, &[reference.clone()]);

        let parsed = parse_message(&message).unwrap();
        assert_eq!(parsed.content, "hello world");
        assert_eq!(parsed.header, header);
        assert_eq!(parsed.references, vec![reference]);
    }

    #[test]
    fn test_write_preserves_field_order() {
        let message = write_message("x", &sample_header(), &[]);
        let header_line = message.lines().last().unwrap();
        assert_eq!(
            header_line,
            "--- GitMsg: ext=\"social\"; type=\"comment\"; reply-to=\"#commit:abc123def456\"; v=\"1.0\"; ext-v=\"1.0\" ---"
        );
    }

    #[test]
    fn test_write_escapes_quotes() {
        let mut header = sample_header();
        header
            .fields
            .insert("note".to_string(), "say \"hi\"".to_string());
        let message = write_message("x", &header, &[]);
        let parsed = parse_message(&message).unwrap();
        assert_eq!(parsed.header.field("note"), Some("say \"hi\""));
    }

    #[test]
    fn test_write_empty_content() {
        let message = write_message("", &sample_header(), &[]);
        assert!(message.starts_with("--- GitMsg: "));
    }
}
