//! Interactive prompt.

use bytes::Bytes;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::connection::Connection;
use crate::format::print_reply;

/// Runs the read-eval-print loop until EOF or `quit`.
pub fn run(conn: &mut Connection, prompt: &str) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{} {e}", "failed to start line editor:".red());
            return;
        }
    };

    loop {
        match editor.readline(prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                    break;
                }
                let _ = editor.add_history_entry(line);

                let args: Vec<Bytes> = line
                    .split_whitespace()
                    .map(|token| Bytes::copy_from_slice(token.as_bytes()))
                    .collect();
                match conn.request(&args) {
                    Ok(reply) => print_reply(&reply),
                    Err(e) => {
                        eprintln!("{} {e}", "connection error:".red());
                        break;
                    }
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{} {e}", "input error:".red());
                break;
            }
        }
    }
}
