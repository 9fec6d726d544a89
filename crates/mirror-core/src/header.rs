use crate::domain::SourceMessage;

const UNKNOWN_AUTHOR: &str = "Unknown#0000";
const UNKNOWN_CHANNEL: &str = "unknown-channel";

/// Provenance line placed at the top of every forwarded message.
///
/// Works on partial messages: missing author or channel fall back to placeholders.
pub fn format_header(msg: &SourceMessage, edited: bool) -> String {
    let author = author_tag(msg);
    let channel = msg
        .channel_id
        .map(|c| c.to_string())
        .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string());

    let mut out = format!("**{author}** from <#{channel}>");
    if edited {
        out.push_str(" (edited)");
    }
    out
}

/// Header followed by one raw URL per line, used when no media could be fetched.
///
/// URLs that would push the content past `max_len` chars are left out.
pub fn format_text_fallback(header: &str, urls: &[&str], max_len: usize) -> String {
    let mut out = header.to_string();
    let mut len = out.chars().count();
    for url in urls {
        let add = url.chars().count() + 1;
        if len + add > max_len {
            break;
        }
        out.push('\n');
        out.push_str(url);
        len += add;
    }
    out
}

fn author_tag(msg: &SourceMessage) -> String {
    let Some(author) = &msg.author else {
        return UNKNOWN_AUTHOR.to_string();
    };
    if let Some(tag) = author.tag.as_deref().filter(|t| !t.is_empty()) {
        return tag.to_string();
    }
    if let Some(name) = author.username.as_deref().filter(|n| !n.is_empty()) {
        return format!("{name}#0000");
    }
    UNKNOWN_AUTHOR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Author, ChannelId, MessageId};

    fn msg(author: Option<Author>, channel: Option<u64>) -> SourceMessage {
        SourceMessage {
            id: MessageId(1),
            channel_id: channel.map(ChannelId),
            author,
            attachments: vec![],
            embeds: vec![],
        }
    }

    #[test]
    fn uses_tag_when_present() {
        let m = msg(
            Some(Author {
                tag: Some("alice#1234".to_string()),
                username: Some("alice".to_string()),
                bot: false,
            }),
            Some(55),
        );
        assert_eq!(format_header(&m, false), "**alice#1234** from <#55>");
        assert_eq!(format_header(&m, true), "**alice#1234** from <#55> (edited)");
    }

    #[test]
    fn falls_back_to_username_then_placeholder() {
        let m = msg(
            Some(Author {
                tag: None,
                username: Some("bob".to_string()),
                bot: false,
            }),
            Some(7),
        );
        assert_eq!(format_header(&m, false), "**bob#0000** from <#7>");

        let m = msg(Some(Author::default()), None);
        assert_eq!(
            format_header(&m, false),
            "**Unknown#0000** from <#unknown-channel>"
        );

        let m = msg(None, None);
        assert!(format_header(&m, true).starts_with("**Unknown#0000**"));
    }

    #[test]
    fn text_fallback_lists_urls() {
        let out = format_text_fallback("H", &["https://a/1.png", "https://b/2.png"], 2000);
        assert_eq!(out, "H\nhttps://a/1.png\nhttps://b/2.png");
    }

    #[test]
    fn text_fallback_respects_limit() {
        let out = format_text_fallback("H", &["aaaa", "bbbb", "cccc"], 11);
        assert_eq!(out, "H\naaaa\nbbbb");
    }
}
