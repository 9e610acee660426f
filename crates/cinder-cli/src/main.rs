//! cinder-cli: command-line client.
//!
//! With trailing arguments, sends them as a single command and prints
//! the reply (`cinder-cli GET foo`). Without, drops into a REPL.

mod connection;
mod format;
mod repl;

use std::process::ExitCode;

use bytes::Bytes;
use clap::Parser;
use colored::Colorize;

use crate::connection::Connection;
use crate::format::print_reply;

/// Command-line client for cinder.
#[derive(Parser)]
#[command(name = "cinder-cli", version, about)]
struct Args {
    /// Server hostname.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port.
    #[arg(short, long, default_value_t = 1234)]
    port: u16,

    /// Command to run one-shot; interactive mode when omitted.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let mut conn = match Connection::connect(&args.host, args.port) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!(
                "{} {}:{}: {e}",
                "could not connect to".red(),
                args.host,
                args.port
            );
            return ExitCode::FAILURE;
        }
    };

    if args.command.is_empty() {
        let prompt = format!("{}:{}> ", args.host, args.port);
        repl::run(&mut conn, &prompt);
        return ExitCode::SUCCESS;
    }

    let command: Vec<Bytes> = args
        .command
        .iter()
        .map(|part| Bytes::copy_from_slice(part.as_bytes()))
        .collect();
    match conn.request(&command) {
        Ok(reply) => {
            print_reply(&reply);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {e}", "request failed:".red());
            ExitCode::FAILURE
        }
    }
}
