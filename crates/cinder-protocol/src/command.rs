//! Command parsing from request arguments.
//!
//! Converts a parsed argument list into a typed [`Command`], keeping
//! protocol-level validation — arity, numeric parsing, limits — out of
//! the engine. Verbs are matched case-insensitively. Numeric arguments
//! must consume their whole token; NaN scores are rejected.
//!
//! Failures carry the protocol error code and a short message, ready
//! to serialize as an error reply: ERR_ARG for bad arity or values,
//! ERR_UNKNOWN for an unrecognized verb.

use bytes::Bytes;

use crate::types::{ERR_ARG, ERR_UNKNOWN};

/// A parsed client command, ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// GET key — the string value, or nil.
    Get { key: Bytes },

    /// SET key value — upsert a string.
    Set { key: Bytes, value: Bytes },

    /// DEL key — remove a key of any kind; 1 if it existed.
    Del { key: Bytes },

    /// KEYS — all live keys.
    Keys,

    /// ZADD key score member — upsert a sorted set member; 1 if added.
    ZAdd { key: Bytes, score: f64, member: Bytes },

    /// ZREM key member — remove a member; 1 if it existed.
    ZRem { key: Bytes, member: Bytes },

    /// ZSCORE key member — the member's score, or nil.
    ZScore { key: Bytes, member: Bytes },

    /// ZQUERY key score name offset limit — ordered range scan
    /// starting at (score, name), skipping `offset` ranks (may be
    /// negative), returning up to `limit` (name, score) pairs.
    ZQuery {
        key: Bytes,
        min_score: f64,
        min_member: Bytes,
        offset: i64,
        limit: usize,
    },

    /// PEXPIRE key ms — arm (or with ms < 0, disarm) a TTL.
    PExpire { key: Bytes, ttl_ms: i64 },

    /// PTTL key — remaining TTL in ms; -1 without TTL, -2 without key.
    PTtl { key: Bytes },
}

/// A command that failed validation, carrying the typed error reply
/// contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    pub code: i32,
    pub message: String,
}

impl CommandError {
    fn arg(message: &str) -> Self {
        CommandError {
            code: ERR_ARG,
            message: message.into(),
        }
    }
}

impl Command {
    /// Parses an argument list into a command.
    pub fn from_args(args: &[Bytes]) -> Result<Command, CommandError> {
        let Some(verb) = args.first() else {
            return Err(CommandError::arg("Empty command"));
        };

        let verb = verb.to_ascii_lowercase();
        match verb.as_slice() {
            b"get" => {
                expect_arity(args, 2, "GET requires exactly one key")?;
                Ok(Command::Get {
                    key: args[1].clone(),
                })
            }
            b"set" => {
                expect_arity(args, 3, "SET requires key and value")?;
                Ok(Command::Set {
                    key: args[1].clone(),
                    value: args[2].clone(),
                })
            }
            b"del" => {
                expect_arity(args, 2, "DEL requires exactly one key")?;
                Ok(Command::Del {
                    key: args[1].clone(),
                })
            }
            b"keys" => {
                expect_arity(args, 1, "KEYS takes no arguments")?;
                Ok(Command::Keys)
            }
            b"zadd" => {
                expect_arity(args, 4, "ZADD requires key, score and member")?;
                let score = parse_score(&args[2])?;
                Ok(Command::ZAdd {
                    key: args[1].clone(),
                    score,
                    member: args[3].clone(),
                })
            }
            b"zrem" => {
                expect_arity(args, 3, "ZREM requires key and member")?;
                Ok(Command::ZRem {
                    key: args[1].clone(),
                    member: args[2].clone(),
                })
            }
            b"zscore" => {
                expect_arity(args, 3, "ZSCORE requires key and member")?;
                Ok(Command::ZScore {
                    key: args[1].clone(),
                    member: args[2].clone(),
                })
            }
            b"zquery" => {
                expect_arity(args, 6, "ZQUERY requires key, score, name, offset, limit")?;
                let min_score = parse_score(&args[2])?;
                let offset = parse_int(&args[4])
                    .ok_or_else(|| CommandError::arg("Invalid offset or limit"))?;
                let limit = parse_int(&args[5])
                    .filter(|&limit| limit > 0)
                    .ok_or_else(|| CommandError::arg("Invalid offset or limit"))?;
                Ok(Command::ZQuery {
                    key: args[1].clone(),
                    min_score,
                    min_member: args[3].clone(),
                    offset,
                    limit: limit as usize,
                })
            }
            b"pexpire" => {
                expect_arity(args, 3, "PEXPIRE requires key and milliseconds")?;
                let ttl_ms = parse_int(&args[2])
                    .ok_or_else(|| CommandError::arg("Invalid TTL value"))?;
                Ok(Command::PExpire {
                    key: args[1].clone(),
                    ttl_ms,
                })
            }
            b"pttl" => {
                expect_arity(args, 2, "PTTL requires key")?;
                Ok(Command::PTtl {
                    key: args[1].clone(),
                })
            }
            _ => Err(CommandError {
                code: ERR_UNKNOWN,
                message: "Unknown command".into(),
            }),
        }
    }
}

fn expect_arity(args: &[Bytes], arity: usize, message: &str) -> Result<(), CommandError> {
    if args.len() != arity {
        return Err(CommandError::arg(message));
    }
    Ok(())
}

/// Strict f64: the whole token must parse, and NaN is rejected.
fn parse_score(arg: &Bytes) -> Result<f64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|score| !score.is_nan())
        .ok_or_else(|| CommandError::arg("Invalid score value"))
}

/// Strict i64: the whole token must parse.
fn parse_int(arg: &Bytes) -> Option<i64> {
    std::str::from_utf8(arg).ok()?.parse::<i64>().ok()
}
