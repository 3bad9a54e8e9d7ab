//! TwiML answer that points an inbound call at the media-stream socket.

/// Path of the WebSocket endpoint Twilio streams call audio to.
pub const MEDIA_STREAM_PATH: &str = "/media-stream";

/// `wss://` URL of the media-stream endpoint on `host`.
pub fn media_stream_url(host: &str) -> String {
    format!("wss://{}{}", host.trim_end_matches('/'), MEDIA_STREAM_PATH)
}

/// `<Response><Connect><Stream url=".."/></Connect></Response>`
pub fn connect_stream(stream_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}" /></Connect></Response>"#,
        escape_attribute(stream_url)
    )
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
