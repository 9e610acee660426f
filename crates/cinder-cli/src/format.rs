//! Reply rendering.

use cinder_protocol::Reply;
use colored::Colorize;

/// Pretty-prints a reply to stdout.
pub fn print_reply(reply: &Reply) {
    print_inner(reply, 0);
}

fn print_inner(reply: &Reply, indent: usize) {
    let pad = "  ".repeat(indent);
    match reply {
        Reply::Nil => println!("{pad}{}", "(nil)".dimmed()),
        Reply::Error { code, message } => {
            println!("{pad}{} {message}", format!("(error {code})").red())
        }
        Reply::String(data) => match std::str::from_utf8(data) {
            Ok(text) => println!("{pad}\"{text}\""),
            Err(_) => println!("{pad}{}", format!("{data:?}").dimmed()),
        },
        Reply::Integer(value) => println!("{pad}{}", value.to_string().yellow()),
        Reply::Double(value) => println!("{pad}{}", value.to_string().yellow()),
        Reply::Array(items) if items.is_empty() => {
            println!("{pad}{}", "(empty array)".dimmed())
        }
        Reply::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                print!("{pad}{} ", format!("{})", i + 1).dimmed());
                print_inner_flat(item, indent);
            }
        }
    }
}

/// Array elements print on the numbered line; nested arrays recurse.
fn print_inner_flat(reply: &Reply, indent: usize) {
    match reply {
        Reply::Array(_) => {
            println!();
            print_inner(reply, indent + 1);
        }
        other => print_inner(other, 0),
    }
}
