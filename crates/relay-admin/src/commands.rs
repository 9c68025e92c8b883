//! Plain-text command parsing
//!
//! The external shell forwards verb lines verbatim; each verb maps onto one
//! [`AdminApi`](crate::AdminApi) operation. Verbs are matched
//! case-insensitively; arguments are positional and whitespace-separated,
//! with the final free-text argument (names, patterns, watermark text)
//! taking the rest of the line.
//!
//! Payload-carrying operations (`blockImage` from an attachment) cannot
//! travel as text; the shell calls the typed API for those. The textual
//! `blockimage`/`unblockimage` verbs take a hex-encoded hash instead.

use relay_protocol::{ChatId, PairId, SenderId, UserId};

use crate::error::{AdminError, Result};

/// A parsed admin command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddPair {
        source: ChatId,
        destination: ChatId,
        name: String,
        sender: Option<SenderId>,
    },
    DeletePair(PairId),
    EditPair {
        id: PairId,
        field: String,
        value: String,
    },
    ListPairs,
    PairInfo(PairId),

    AddSender {
        name: String,
        credential: String,
    },
    ListSenders {
        include_disabled: bool,
    },
    ToggleSender(SenderId),
    DeleteSender(SenderId),

    BlockWord {
        word: String,
        pair: Option<PairId>,
    },
    UnblockWord {
        word: String,
        pair: Option<PairId>,
    },
    ListBlocked {
        pair: Option<PairId>,
    },
    BlockImageHash {
        phash: u64,
        pair: Option<PairId>,
    },
    UnblockImage {
        phash: u64,
        pair: Option<PairId>,
    },
    ListBlockedImages {
        pair: Option<PairId>,
    },
    SetMentions {
        pair: PairId,
        enabled: bool,
        placeholder: Option<String>,
    },
    SetHeaderPattern {
        pair: PairId,
        pattern: Option<String>,
    },
    SetFooterPattern {
        pair: PairId,
        pattern: Option<String>,
    },
    SetWatermark {
        pair: PairId,
        enabled: bool,
        text: Option<String>,
    },
    TestFilter {
        pair: PairId,
        text: String,
    },

    Pause,
    Resume,
    Status,
    Stats,
    Health,
    Queue,
    ClearQueue,
    Backup,
    Cleanup {
        older_than_days: Option<u32>,
    },

    AddSub {
        user: UserId,
        days: i64,
    },
    RenewSub {
        user: UserId,
        days: i64,
    },
    ListSubs,
    KickAll {
        user: UserId,
        duration_secs: Option<u64>,
    },
    UnbanAll(UserId),
}

impl Command {
    /// Parse one command line
    pub fn parse(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let verb = words
            .next()
            .ok_or(AdminError::Usage("empty command"))?
            .to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        // Remainder of the line after the first `n` arguments, for free-text
        // tails that may contain spaces.
        let tail = |n: usize| -> Option<String> {
            if args.len() <= n {
                return None;
            }
            Some(args[n..].join(" "))
        };

        match verb.as_str() {
            "addpair" => {
                const USAGE: &str = "addpair <source> <destination> <name> [sender]";
                let source = ChatId(parse_arg(&args, 0).ok_or(AdminError::Usage(USAGE))?);
                let destination = ChatId(parse_arg(&args, 1).ok_or(AdminError::Usage(USAGE))?);
                let name = args.get(2).ok_or(AdminError::Usage(USAGE))?.to_string();
                let sender = parse_arg(&args, 3).map(SenderId);
                Ok(Self::AddPair {
                    source,
                    destination,
                    name,
                    sender,
                })
            }
            "deletepair" => Ok(Self::DeletePair(PairId(required(&args, 0)?))),
            "editpair" => {
                let id = PairId(required(&args, 0)?);
                let field = args
                    .get(1)
                    .ok_or(AdminError::Usage("editpair <id> <field> <value>"))?
                    .to_string();
                let value = tail(2).ok_or(AdminError::Usage("editpair <id> <field> <value>"))?;
                Ok(Self::EditPair { id, field, value })
            }
            "listpairs" => Ok(Self::ListPairs),
            "pairinfo" => Ok(Self::PairInfo(PairId(required(&args, 0)?))),

            "addsender" => {
                const USAGE: &str = "addsender <name> <credential>";
                let name = args.first().ok_or(AdminError::Usage(USAGE))?.to_string();
                let credential = args.get(1).ok_or(AdminError::Usage(USAGE))?.to_string();
                Ok(Self::AddSender { name, credential })
            }
            "listsenders" => Ok(Self::ListSenders {
                include_disabled: args.first() == Some(&"all"),
            }),
            "togglesender" => Ok(Self::ToggleSender(SenderId(required(&args, 0)?))),
            "deletesender" => Ok(Self::DeleteSender(SenderId(required(&args, 0)?))),

            "blockword" => {
                let word = args
                    .first()
                    .ok_or(AdminError::Usage("blockword <word> [pair]"))?
                    .to_string();
                Ok(Self::BlockWord {
                    word,
                    pair: parse_arg(&args, 1).map(PairId),
                })
            }
            "unblockword" => {
                let word = args
                    .first()
                    .ok_or(AdminError::Usage("unblockword <word> [pair]"))?
                    .to_string();
                Ok(Self::UnblockWord {
                    word,
                    pair: parse_arg(&args, 1).map(PairId),
                })
            }
            "listblocked" => Ok(Self::ListBlocked {
                pair: parse_arg(&args, 0).map(PairId),
            }),
            "blockimage" => {
                let phash = parse_hash(&args, 0)?;
                Ok(Self::BlockImageHash {
                    phash,
                    pair: parse_arg(&args, 1).map(PairId),
                })
            }
            "unblockimage" => {
                let phash = parse_hash(&args, 0)?;
                Ok(Self::UnblockImage {
                    phash,
                    pair: parse_arg(&args, 1).map(PairId),
                })
            }
            "listblockedimages" => Ok(Self::ListBlockedImages {
                pair: parse_arg(&args, 0).map(PairId),
            }),

            "setmentions" => {
                let pair = PairId(required(&args, 0)?);
                let enabled = parse_switch(&args, 1)?;
                Ok(Self::SetMentions {
                    pair,
                    enabled,
                    placeholder: tail(2),
                })
            }
            "setheaderpattern" => {
                let pair = PairId(required(&args, 0)?);
                Ok(Self::SetHeaderPattern {
                    pair,
                    pattern: tail(1).filter(|p| p != "clear"),
                })
            }
            "setfooterpattern" => {
                let pair = PairId(required(&args, 0)?);
                Ok(Self::SetFooterPattern {
                    pair,
                    pattern: tail(1).filter(|p| p != "clear"),
                })
            }
            "setwatermark" => {
                let pair = PairId(required(&args, 0)?);
                let enabled = parse_switch(&args, 1)?;
                Ok(Self::SetWatermark {
                    pair,
                    enabled,
                    text: tail(2),
                })
            }
            "testfilter" => {
                let pair = PairId(required(&args, 0)?);
                let text = tail(1).ok_or(AdminError::Usage("testfilter <pair> <text>"))?;
                Ok(Self::TestFilter { pair, text })
            }

            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "status" => Ok(Self::Status),
            "stats" => Ok(Self::Stats),
            "health" => Ok(Self::Health),
            "queue" => Ok(Self::Queue),
            "clearqueue" => Ok(Self::ClearQueue),
            "backup" => Ok(Self::Backup),
            "cleanup" => Ok(Self::Cleanup {
                older_than_days: parse_arg(&args, 0),
            }),

            "addsub" => Ok(Self::AddSub {
                user: UserId(required(&args, 0)?),
                days: required(&args, 1)?,
            }),
            "renewsub" => Ok(Self::RenewSub {
                user: UserId(required(&args, 0)?),
                days: required(&args, 1)?,
            }),
            "listsubs" => Ok(Self::ListSubs),
            "kickall" => Ok(Self::KickAll {
                user: UserId(required(&args, 0)?),
                duration_secs: parse_arg(&args, 1),
            }),
            "unbanall" => Ok(Self::UnbanAll(UserId(required(&args, 0)?))),

            other => Err(AdminError::UnknownCommand(other.to_string())),
        }
    }
}

impl Command {
    /// Execute against the API, rendering a human-readable reply
    ///
    /// This is the whole contract the external shell needs: parse the line,
    /// run it, send back the string.
    pub fn run(self, api: &crate::AdminApi) -> Result<String> {
        match self {
            Self::AddPair {
                source,
                destination,
                name,
                sender,
            } => {
                let pair = api.add_pair(source, destination, &name, sender)?;
                Ok(format!(
                    "pair {} created: {} ({} -> {})",
                    pair.id, pair.name, pair.source_chat, pair.destination_chat
                ))
            }
            Self::DeletePair(id) => {
                api.delete_pair(id)?;
                Ok(format!("pair {id} deleted"))
            }
            Self::EditPair { id, field, value } => {
                api.edit_pair(id, &field, &value)?;
                Ok(format!("pair {id}: {field} updated"))
            }
            Self::ListPairs => {
                let pairs = api.list_pairs()?;
                if pairs.is_empty() {
                    return Ok("no pairs".into());
                }
                Ok(pairs
                    .iter()
                    .map(|p| {
                        format!(
                            "{}: {} {} -> {} [{}]",
                            p.id,
                            p.name,
                            p.source_chat,
                            p.destination_chat,
                            p.status.as_str()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Self::PairInfo(id) => {
                let pair = api.pair_info(id)?;
                Ok(format!(
                    "{}: {} {} -> {} [{}] copied={} filtered={} errors={}",
                    pair.id,
                    pair.name,
                    pair.source_chat,
                    pair.destination_chat,
                    pair.status.as_str(),
                    pair.stats.messages_copied,
                    pair.stats.messages_filtered,
                    pair.stats.errors
                ))
            }

            Self::AddSender { name, credential } => {
                let record = api.add_sender(&name, &credential)?;
                Ok(format!("sender {} added: {}", record.id, record.display_handle))
            }
            Self::ListSenders { include_disabled } => {
                let senders = api.list_senders(include_disabled)?;
                if senders.is_empty() {
                    return Ok("no senders".into());
                }
                Ok(senders
                    .iter()
                    .map(|s| {
                        format!(
                            "{}: {} [{}] used {}",
                            s.id,
                            s.display_handle,
                            if s.enabled { "enabled" } else { "disabled" },
                            s.usage_count
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Self::ToggleSender(id) => {
                let enabled = api.toggle_sender(id)?;
                Ok(format!(
                    "sender {id} {}",
                    if enabled { "enabled" } else { "disabled" }
                ))
            }
            Self::DeleteSender(id) => {
                api.delete_sender(id)?;
                Ok(format!("sender {id} deleted"))
            }

            Self::BlockWord { word, pair } => {
                api.block_word(&word, pair)?;
                Ok(format!("blocked {word:?}{}", scope_suffix(pair)))
            }
            Self::UnblockWord { word, pair } => Ok(if api.unblock_word(&word, pair)? {
                format!("unblocked {word:?}{}", scope_suffix(pair))
            } else {
                format!("{word:?} was not blocked{}", scope_suffix(pair))
            }),
            Self::ListBlocked { pair } => {
                let words = api.list_blocked(pair)?;
                if words.is_empty() {
                    return Ok("no blocked words".into());
                }
                Ok(words.join(", "))
            }
            Self::BlockImageHash { phash, pair } => {
                let entry = api.block_image_hash(phash, pair)?;
                Ok(format!("image {:016x} blocked{}", entry.phash, scope_suffix(pair)))
            }
            Self::UnblockImage { phash, pair } => Ok(if api.unblock_image(phash, pair)? {
                format!("image {phash:016x} unblocked")
            } else {
                format!("image {phash:016x} was not blocked")
            }),
            Self::ListBlockedImages { pair } => {
                let entries = api.list_blocked_images(pair)?;
                if entries.is_empty() {
                    return Ok("no blocked images".into());
                }
                Ok(entries
                    .iter()
                    .map(|e| {
                        format!(
                            "{:016x} [{}] threshold {} hits {}",
                            e.phash,
                            e.scope.as_str(),
                            e.threshold,
                            e.usage_count
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"))
            }

            Self::SetMentions {
                pair,
                enabled,
                placeholder,
            } => {
                api.set_mentions(pair, enabled, placeholder.as_deref())?;
                Ok(format!("pair {pair}: mention removal {}", on_off(enabled)))
            }
            Self::SetHeaderPattern { pair, pattern } => {
                let set = pattern.is_some();
                api.set_header_pattern(pair, pattern.as_deref())?;
                Ok(format!(
                    "pair {pair}: header pattern {}",
                    if set { "set" } else { "cleared" }
                ))
            }
            Self::SetFooterPattern { pair, pattern } => {
                let set = pattern.is_some();
                api.set_footer_pattern(pair, pattern.as_deref())?;
                Ok(format!(
                    "pair {pair}: footer pattern {}",
                    if set { "set" } else { "cleared" }
                ))
            }
            Self::SetWatermark {
                pair,
                enabled,
                text,
            } => {
                api.set_watermark(pair, enabled, text.as_deref())?;
                Ok(format!("pair {pair}: watermark {}", on_off(enabled)))
            }
            Self::TestFilter { pair, text } => {
                let result = api.test_filter(pair, &text)?;
                Ok(if result.kept {
                    format!("kept: {:?}", result.rewritten.unwrap_or_default())
                } else {
                    format!("dropped ({})", result.reason.unwrap_or_default())
                })
            }

            Self::Pause => {
                api.pause()?;
                Ok("paused".into())
            }
            Self::Resume => {
                api.resume()?;
                Ok("resumed".into())
            }
            Self::Status | Self::Stats => {
                let s = api.status()?;
                Ok(format!(
                    "{} | pairs {}/{} | mappings {} | queued {} | done {} failed {} | events 24h: {} msgs, {} errors",
                    if s.paused { "PAUSED" } else { "running" },
                    s.store.active_pairs,
                    s.store.total_pairs,
                    s.store.total_mappings,
                    s.dispatch.enqueued.saturating_sub(s.dispatch.terminal()),
                    s.dispatch.done,
                    s.dispatch.failed,
                    s.store.mappings_24h,
                    s.store.errors_24h
                ))
            }
            Self::Health => {
                let report = api.health();
                Ok(format!(
                    "{:?} | {:.1} msg/s | error ema {:.0}% | queue {}/{} | {} eligible senders",
                    report.status,
                    report.throughput,
                    report.error_rate_ema * 100.0,
                    report.queue_len,
                    report.queue_capacity,
                    report.eligible_senders
                ))
            }
            Self::Queue => {
                let q = api.queue();
                Ok(format!(
                    "queue {}/{} (urgent {} high {} normal {} low {}, delayed {}){}",
                    q.len,
                    q.capacity,
                    q.depths[0],
                    q.depths[1],
                    q.depths[2],
                    q.depths[3],
                    q.delayed,
                    if q.circuit_open { " [circuit open]" } else { "" }
                ))
            }
            Self::ClearQueue => Ok(format!("cleared {} tasks", api.clear_queue())),
            Self::Backup => {
                let path = api.backup()?;
                Ok(format!("backup written to {}", path.display()))
            }
            Self::Cleanup { older_than_days } => {
                let report = api.cleanup(older_than_days)?;
                Ok(format!(
                    "removed {} mappings, {} errors, {} image blocks",
                    report.mappings_removed, report.errors_removed, report.image_blocks_removed
                ))
            }

            Self::AddSub { user, days } => {
                let sub = api.add_sub(user, days, user)?;
                Ok(format!("subscription for {} until {}", user, sub.expires_at))
            }
            Self::RenewSub { user, days } => {
                let sub = api.renew_sub(user, days)?;
                Ok(format!("subscription for {} until {}", user, sub.expires_at))
            }
            Self::ListSubs => {
                let subs = api.list_subs()?;
                if subs.is_empty() {
                    return Ok("no subscriptions".into());
                }
                Ok(subs
                    .iter()
                    .map(|s| format!("{}: expires {}", s.user, s.expires_at))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            Self::KickAll {
                user,
                duration_secs,
            } => {
                let duration = duration_secs.map(std::time::Duration::from_secs);
                Ok(format!(
                    "kicking {} from {} chats{}",
                    user,
                    api.kick_all(user, duration)?,
                    match duration_secs {
                        Some(secs) => format!(", unban in {secs}s"),
                        None => String::new(),
                    }
                ))
            }
            Self::UnbanAll(user) => Ok(format!(
                "unbanning {} in {} chats",
                user,
                api.unban_all(user)?
            )),
        }
    }
}

fn scope_suffix(pair: Option<PairId>) -> String {
    match pair {
        Some(id) => format!(" for pair {id}"),
        None => " globally".to_string(),
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn usage_err() -> AdminError {
    AdminError::Usage("numeric argument expected")
}

fn parse_arg<T: std::str::FromStr>(args: &[&str], index: usize) -> Option<T> {
    args.get(index).and_then(|raw| raw.parse().ok())
}

fn required<T: std::str::FromStr>(args: &[&str], index: usize) -> Result<T> {
    parse_arg(args, index).ok_or_else(usage_err)
}

fn parse_switch(args: &[&str], index: usize) -> Result<bool> {
    match args.get(index).copied() {
        Some("on") | Some("true") => Ok(true),
        Some("off") | Some("false") => Ok(false),
        _ => Err(AdminError::Usage("expected on|off")),
    }
}

fn parse_hash(args: &[&str], index: usize) -> Result<u64> {
    let raw = args
        .get(index)
        .ok_or(AdminError::Usage("hex hash expected"))?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|_| AdminError::Usage("hex hash expected"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addpair_forms() {
        assert_eq!(
            Command::parse("addpair 100 200 signals").unwrap(),
            Command::AddPair {
                source: ChatId(100),
                destination: ChatId(200),
                name: "signals".into(),
                sender: None,
            }
        );
        assert_eq!(
            Command::parse("AddPair -1001 -1002 vip 3").unwrap(),
            Command::AddPair {
                source: ChatId(-1001),
                destination: ChatId(-1002),
                name: "vip".into(),
                sender: Some(SenderId(3)),
            }
        );
        assert!(Command::parse("addpair 100").is_err());
    }

    #[test]
    fn test_editpair_free_text_value() {
        assert_eq!(
            Command::parse("editpair 5 name My Renamed Pair").unwrap(),
            Command::EditPair {
                id: PairId(5),
                field: "name".into(),
                value: "My Renamed Pair".into(),
            }
        );
    }

    #[test]
    fn test_word_and_image_verbs() {
        assert_eq!(
            Command::parse("blockword spam 7").unwrap(),
            Command::BlockWord {
                word: "spam".into(),
                pair: Some(PairId(7)),
            }
        );
        assert_eq!(
            Command::parse("unblockimage 0xdeadbeefcafebabe").unwrap(),
            Command::UnblockImage {
                phash: 0xdead_beef_cafe_babe,
                pair: None,
            }
        );
        assert!(Command::parse("blockimage not-hex").is_err());
    }

    #[test]
    fn test_pattern_verbs() {
        assert_eq!(
            Command::parse(r"setheaderpattern 2 ^AD\b.*$").unwrap(),
            Command::SetHeaderPattern {
                pair: PairId(2),
                pattern: Some(r"^AD\b.*$".into()),
            }
        );
        assert_eq!(
            Command::parse("setheaderpattern 2 clear").unwrap(),
            Command::SetHeaderPattern {
                pair: PairId(2),
                pattern: None,
            }
        );
    }

    #[test]
    fn test_watermark_and_mentions() {
        assert_eq!(
            Command::parse("setwatermark 1 on PREMIUM FEED").unwrap(),
            Command::SetWatermark {
                pair: PairId(1),
                enabled: true,
                text: Some("PREMIUM FEED".into()),
            }
        );
        assert_eq!(
            Command::parse("setmentions 1 off").unwrap(),
            Command::SetMentions {
                pair: PairId(1),
                enabled: false,
                placeholder: None,
            }
        );
        assert!(Command::parse("setwatermark 1 maybe").is_err());
    }

    #[test]
    fn test_ops_verbs() {
        assert_eq!(Command::parse("pause").unwrap(), Command::Pause);
        assert_eq!(Command::parse("clearqueue").unwrap(), Command::ClearQueue);
        assert_eq!(
            Command::parse("cleanup 14").unwrap(),
            Command::Cleanup {
                older_than_days: Some(14)
            }
        );
        assert_eq!(
            Command::parse("cleanup").unwrap(),
            Command::Cleanup {
                older_than_days: None
            }
        );
    }

    #[test]
    fn test_access_verbs() {
        assert_eq!(
            Command::parse("addsub 5001 30").unwrap(),
            Command::AddSub {
                user: UserId(5001),
                days: 30,
            }
        );
        assert_eq!(
            Command::parse("kickall 5001").unwrap(),
            Command::KickAll {
                user: UserId(5001),
                duration_secs: None,
            }
        );
        assert_eq!(
            Command::parse("kickall 5001 3600").unwrap(),
            Command::KickAll {
                user: UserId(5001),
                duration_secs: Some(3600),
            }
        );
    }

    #[test]
    fn test_unknown_and_empty() {
        assert!(matches!(
            Command::parse("frobnicate 1"),
            Err(AdminError::UnknownCommand(_))
        ));
        assert!(Command::parse("   ").is_err());
    }

    #[test]
    fn test_testfilter_keeps_whole_text() {
        assert_eq!(
            Command::parse("testfilter 3 buy spam now").unwrap(),
            Command::TestFilter {
                pair: PairId(3),
                text: "buy spam now".into(),
            }
        );
    }
}
