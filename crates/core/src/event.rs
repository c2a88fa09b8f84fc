//! Platform events and the parsed command surface.
//!
//! The channel adapter turns raw platform traffic into [`PlatformEvent`]s
//! and hands them to the orchestrator one at a time. Slash commands arrive
//! already parsed into a [`Command`].

use serde::{Deserialize, Serialize};

use crate::channel::{MessageRef, PlatformMessage, UserId};
use crate::error::ValidationError;

/// Everything the orchestrator reacts to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PlatformEvent {
    /// A new message was posted
    MessageCreated(PlatformMessage),

    /// Someone reacted to a message
    ReactionAdded {
        message: MessageRef,
        user: UserId,
        emoji: String,
    },

    /// A message was deleted
    MessageDeleted(MessageRef),

    /// A slash command was invoked
    Command {
        invocation: Invocation,
        command: Command,
    },
}

/// How a command reached the bot; decides how success is signalled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// A message that mentions the bot
    Mention,
    /// A platform slash command
    Slash,
}

/// Who invoked a command, and where to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub user: UserId,
    pub anchor: MessageRef,
    pub kind: InvocationKind,
}

/// The closed set of objects admin commands operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdminObject {
    Blocked,
    Trusted,
    Permitting,
    Cache,
    Corpus,
    PermittingRequests,
    CorpusRequests,
    All,
}

impl AdminObject {
    /// Every concrete object, in the order `All` expands to.
    pub const CONCRETE: [AdminObject; 7] = [
        AdminObject::Blocked,
        AdminObject::Cache,
        AdminObject::Permitting,
        AdminObject::PermittingRequests,
        AdminObject::Trusted,
        AdminObject::Corpus,
        AdminObject::CorpusRequests,
    ];

    /// Display name used in replies and help.
    pub fn label(&self) -> &'static str {
        match self {
            AdminObject::Blocked => "Blocked Group",
            AdminObject::Trusted => "Trusted Group",
            AdminObject::Permitting => "Permitting Group",
            AdminObject::Cache => "Cache",
            AdminObject::Corpus => "Corpus",
            AdminObject::PermittingRequests => "Permitting Requests",
            AdminObject::CorpusRequests => "Corpus Requests",
            AdminObject::All => "All",
        }
    }

    /// Whether `contains <object> <user>` is meaningful.
    pub fn is_membership(&self) -> bool {
        matches!(
            self,
            AdminObject::Blocked
                | AdminObject::Trusted
                | AdminObject::Permitting
                | AdminObject::PermittingRequests
                | AdminObject::CorpusRequests
        )
    }

    /// Expand `All` into every concrete object.
    pub fn expand(&self) -> Vec<AdminObject> {
        match self {
            AdminObject::All => Self::CONCRETE.to_vec(),
            other => vec![*other],
        }
    }
}

impl std::fmt::Display for AdminObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for AdminObject {
    type Err = ValidationError;

    /// Case-insensitive; ignores spaces, dashes, underscores, and a trailing
    /// "group" (`"Trusted Group"`, `"trusted"`, `"corpus-requests"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_lowercase();
        let normalized = normalized.strip_suffix("group").unwrap_or(&normalized);
        match normalized {
            "blocked" => Ok(AdminObject::Blocked),
            "trusted" => Ok(AdminObject::Trusted),
            "permitting" => Ok(AdminObject::Permitting),
            "cache" => Ok(AdminObject::Cache),
            "corpus" | "vectorstore" => Ok(AdminObject::Corpus),
            "permittingrequests" => Ok(AdminObject::PermittingRequests),
            "corpusrequests" | "vectorstorerequests" => Ok(AdminObject::CorpusRequests),
            "all" => Ok(AdminObject::All),
            _ => Err(ValidationError::InvalidRecord(format!("unknown object '{s}'"))),
        }
    }
}

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    Ask { query: String },
    Help { command: Option<String> },
    Ping,
    Contains { object: AdminObject, user: Option<UserId> },
    GetSize { object: AdminObject },
    /// `input` is a list of user ids for groups, or a message link for the corpus
    Add { object: AdminObject, input: String },
    Remove { object: AdminObject, input: String },
    Clear { object: AdminObject },
    Save { object: AdminObject, path: Option<String> },
    Load { object: AdminObject, path: Option<String> },
    Revoke,
}

impl Command {
    /// Every command name, alphabetically.
    pub const NAMES: [&'static str; 11] = [
        "add", "ask", "clear", "contains", "getsize", "help", "load", "ping", "remove", "revoke",
        "save",
    ];

    /// The command's name as typed by users.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ask { .. } => "ask",
            Command::Help { .. } => "help",
            Command::Ping => "ping",
            Command::Contains { .. } => "contains",
            Command::GetSize { .. } => "getsize",
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
            Command::Clear { .. } => "clear",
            Command::Save { .. } => "save",
            Command::Load { .. } => "load",
            Command::Revoke => "revoke",
        }
    }

    /// Parse a textual command line such as `add trusted <@1> 2`.
    ///
    /// Used by adapters that receive commands as plain text.
    pub fn parse(line: &str) -> Result<Command, ValidationError> {
        let line = line.trim().trim_start_matches('/');
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        let (first, tail) = match rest.split_once(char::is_whitespace) {
            Some((first, tail)) => (first, tail.trim()),
            None => (rest, ""),
        };
        let optional = |s: &str| (!s.is_empty()).then(|| s.to_string());
        let object = || first.parse::<AdminObject>();

        match name.to_lowercase().as_str() {
            "ask" if !rest.is_empty() => Ok(Command::Ask {
                query: rest.to_string(),
            }),
            "ask" => Err(ValidationError::Empty("query".into())),
            "help" => Ok(Command::Help {
                command: optional(rest),
            }),
            "ping" => Ok(Command::Ping),
            "revoke" => Ok(Command::Revoke),
            "contains" => {
                let user = match optional(tail) {
                    Some(u) => Some(
                        u.parse::<UserId>()
                            .map_err(|_| ValidationError::InvalidId(u.clone()))?,
                    ),
                    None => None,
                };
                Ok(Command::Contains {
                    object: object()?,
                    user,
                })
            }
            "getsize" => Ok(Command::GetSize { object: object()? }),
            "clear" => Ok(Command::Clear { object: object()? }),
            "add" | "remove" if tail.is_empty() => Err(ValidationError::Empty("entry".into())),
            "add" => Ok(Command::Add {
                object: object()?,
                input: tail.to_string(),
            }),
            "remove" => Ok(Command::Remove {
                object: object()?,
                input: tail.to_string(),
            }),
            "save" => Ok(Command::Save {
                object: object()?,
                path: optional(tail),
            }),
            "load" => Ok(Command::Load {
                object: object()?,
                path: optional(tail),
            }),
            other => Err(ValidationError::InvalidRecord(format!("unknown command '{other}'"))),
        }
    }
}
