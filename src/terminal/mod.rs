pub mod commands;
pub mod view;

use std::sync::Arc;

use colored::Colorize;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::live::{Comment, LiveSession};
pub use commands::OperatorCommand;
pub use view::CommentView;

/// Prints comments as they arrive and forwards operator commands to the
/// session until the operator quits or the stream ends.
pub async fn run(session: Arc<LiveSession>, mut comments: mpsc::Receiver<Comment>) {
    let view = CommentView::new(session.status().stream.start_time);
    println!("{}", CommentView::header(&session));
    println!("{}", "i<text> post   :184 <text> post anonymously   :q quit".dimmed());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            comment = comments.recv() => match comment {
                Some(comment) => println!("{}", view.render(&comment)),
                None => {
                    println!("{}", "comment stream ended".red());
                    break;
                }
            },
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Failed to read operator input: {}", e);
                        break;
                    }
                };
                match OperatorCommand::parse(&line) {
                    None => {}
                    Some(OperatorCommand::Quit) => break,
                    Some(OperatorCommand::Post(text)) => post(&session, text, false),
                    Some(OperatorCommand::PostAnonymous(text)) => post(&session, text, true),
                    Some(OperatorCommand::Unknown(input)) => {
                        println!("{}", format!("unknown command: {}", input).red());
                    }
                }
            },
            _ = &mut ctrl_c => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    session.close().await;
}

fn post(session: &Arc<LiveSession>, text: String, anonymous: bool) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        if let Err(e) = session.send(&text, anonymous).await {
            warn!("Failed to post comment: {}", e);
            println!("{}", format!("send failed: {}", e).red());
        }
    });
}
