use chrono::Utc;
use colored::Colorize;

use crate::live::{Comment, LiveSession};
use crate::speaker::ANONYMOUS_NAME;

pub struct CommentView {
    stream_start: i64,
}

impl CommentView {
    pub fn new(stream_start: i64) -> Self {
        Self { stream_start }
    }

    pub fn header(session: &LiveSession) -> String {
        let stream = &session.status().stream;
        let remaining = stream.end_time - Utc::now().timestamp();

        format!(
            "{} {}  {}",
            format!("[{}]", session.live_id()).blue().bold(),
            stream.title.bold(),
            format!("remaining {}", clock(remaining)).dimmed()
        )
    }

    /// `<no> <mm:ss> <speaker> <body>`, with the body unescaped for display.
    pub fn render(&self, comment: &Comment) -> String {
        let elapsed = clock(comment.date - self.stream_start);
        let body = quick_xml::escape::unescape(&comment.body)
            .map(|b| b.into_owned())
            .unwrap_or_else(|_| comment.body.clone());

        let speaker = if comment.is_anonymous() {
            ANONYMOUS_NAME.yellow()
        } else {
            let name = comment
                .speaker
                .as_ref()
                .map(|s| s.name.as_str())
                .unwrap_or(comment.user_id.as_str());
            name.green()
        };

        format!("{} {} {} {}", comment.no.to_string().blue(), elapsed.yellow(), speaker, body)
    }
}

fn clock(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
