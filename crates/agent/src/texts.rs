//! User-facing reply texts.

use lorebot_core::corpus::CorpusHit;
use lorebot_core::event::AdminObject;

use crate::orchestrator::Tier;
use crate::requests::PendingRequest;

pub const AI_DISCLAIMER: &str = "My response was AI-generated and therefore may contain errors and \
     inaccuracies. Verify all information before using anything.";
pub const CACHED_RESPONSE: &str = "Cached response.";
pub const NO_CONTEXT: &str = "No sources could be found that relate to the provided query.";
pub const BLOCKED: &str = "You are blocked from interacting with this bot.";
pub const LOAD_ERROR: &str = "An error occurred while loading the object.";
pub const SAVE_ERROR: &str = "An error occurred while saving the object.";
pub const DANGEROUS_FILEPATH: &str =
    "That filepath is not allowed. Your trusted status has been revoked as a precaution.";
pub const CORPUS_REMOVAL_UNSUPPORTED: &str = "Removing entries from the corpus is not supported.";
pub const MESSAGE_NOT_FOUND: &str = "That message could not be found.";
pub const REQUEST_LIMIT: &str = "Too many requests are pending right now. Try again later.";
pub const BOT_MESSAGE: &str = "Messages written by bots cannot be added to the corpus.";
pub const DEFAULT_SOURCE: &str = "Unknown source";

/// Regional-indicator reactions spelling out the answer to `contains`.
pub const YES_EMOTES: [&str; 3] = ["🇾", "🇪", "🇸"];
pub const NO_EMOTES: [&str; 2] = ["🇳", "🇴"];

/// Consent reactions on a display message.
pub const APPROVE_EMOJI: &str = "✅";
pub const REJECT_EMOJI: &str = "❌";
/// Shown briefly on an approved display message before it is deleted.
pub const ACKNOWLEDGE_EMOJI: &str = "👍";

pub const CORPUS_REQUEST: &str = "Hi [recipientID]. [requesterIDs] would like to add the following \
messages of yours to this bot's corpus.
[desiredMessageLinks]
If you allow this, the information in those messages may be incorporated into future answers the \
bot provides, whenever it is asked relevant questions. This is entirely voluntary, but (for the \
moment at least) it cannot be undone, and it will influence answers in all servers the bot is \
present in, not just this server.

To agree to this, react to this message with ✅. To reject this, react with ❌.
-# If more of your messages are requested to be added before this message is answered, this \
message will be updated instead of a new message being generated.";

pub const PERMISSION_REQUEST: &str = "[recipientID], if you react to this message with ✅, this \
bot's trusted users will no longer need to request your permission to add your messages to the \
bot's corpus. This does not mean your messages WILL be added, but that they COULD be added if a \
trusted user thinks one of your messages would improve the bot.
This is entirely voluntary and can be revoked at any time by running `revoke`. However (for the \
moment at least), any messages of yours added prior to revocation will still remain in the bot's \
corpus, and will influence answers in all servers the bot is present in, not just this server.

To agree to this, react to this message with ✅. To reject this, react with ❌.";

const HELP: &str = "Hi! I'm a chatbot designed to answer questions about whatever corpus I was given.

I'm primarily interacted with via pinging me or slash commands. The commands I support are
[descriptions]

Trusted users can also request to add existing messages to my corpus by reacting with [emote], \
assuming the original author then gives their permission.";

/// Command documentation: name, tier, syntax, description.
pub const COMMANDS: [(&str, Tier, &str, &str); 12] = [
    ("ask", Tier::General, "ask [query]", "Looks up and generates an answer for the provided query."),
    ("help", Tier::General, "help [command (optional)]", "Shows this message, or the description of one command."),
    ("ping", Tier::General, "ping", "Returns my latency."),
    ("contains", Tier::General, "contains [group] [user (optional)]", "Returns whether a user is in a group or has a pending request."),
    ("getsize", Tier::General, "getsize [object]", "Returns the number of entries in an object."),
    ("permit", Tier::General, "permit", "Asks for your blanket consent to having your messages added to my corpus."),
    ("revoke", Tier::General, "revoke", "Withdraws your blanket consent."),
    ("add", Tier::Trusted, "add [Blocked|Trusted] [users] / add Corpus [message link]", "Adds users to a group, or requests adding a message to my corpus."),
    ("remove", Tier::Trusted, "remove [Blocked|Trusted] [users]", "Removes users from a group."),
    ("clear", Tier::Trusted, "clear [object|All]", "Empties an object."),
    ("save", Tier::Owner, "save [object|All] [filepath (optional)]", "Saves an object to the provided filepath, or its last-used filepath."),
    ("load", Tier::Owner, "load [object|All] [filepath (optional)]", "Loads an object from the provided filepath, or its last-used filepath."),
];

pub fn cooldown(remaining_secs: f64) -> String {
    format!(
        "I am currently on cooldown: too many queries are being made right now. \
         ({remaining_secs:.0} seconds remaining)"
    )
}

pub fn query_error(error: &dyn std::fmt::Display) -> String {
    format!("Error generating response: {error}")
}

pub fn not_owner(command: &str) -> String {
    format!("`{command}` is an owner-only command.")
}

pub fn not_trusted(command: &str) -> String {
    format!("`{command}` is a trusted-only command.")
}

pub fn ping(latency_secs: Option<f64>) -> String {
    match latency_secs {
        Some(secs) => format!("My latency is {secs:.2} seconds."),
        None => "My latency is unknown.".to_string(),
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

pub fn add_error(failed: usize) -> String {
    format!("{failed} object{} failed to be added.", plural(failed))
}

pub fn remove_error(failed: usize) -> String {
    format!("{failed} object{} failed to be removed.", plural(failed))
}

pub fn size(object: AdminObject, size: usize) -> String {
    format!("{object}: {size}.")
}

pub fn disabled(object: AdminObject) -> String {
    format!("{object} is disabled.")
}

pub fn unsupported(command: &str, object: AdminObject) -> String {
    format!("`{command}` does not work on {object}.")
}

/// Mark an answer as coming from the cache.
pub fn cached(answer: &str, ai_enabled: bool) -> String {
    if ai_enabled {
        format!("{answer}\n-# {CACHED_RESPONSE} {AI_DISCLAIMER}")
    } else {
        format!("{answer}\n-# {CACHED_RESPONSE}")
    }
}

pub fn with_disclaimer(answer: &str) -> String {
    format!("{answer}\n-# {AI_DISCLAIMER}")
}

/// Context handed to the language model: segment texts separated by blank
/// lines, each prefixed by its relevance.
pub fn model_context(hits: &[CorpusHit]) -> String {
    hits.iter()
        .map(|h| format!("{}\n{}", relevance(h.relevance), h.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The reply listing retrieved segments when no language model is used.
pub fn corpus_listing(hits: &[CorpusHit]) -> String {
    let messages = hits
        .iter()
        .map(|h| {
            let source = h
                .source
                .clone()
                .unwrap_or_else(|| format!("[{DEFAULT_SOURCE}]"));
            format!("{source} {}\n{}", relevance(h.relevance), h.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Here are the messages in my corpus most likely to be relevant to your question:\n{messages}")
}

fn relevance(score: f32) -> String {
    format!("_(relevance estimate **{:.2}%**)_", score * 100.0)
}

pub fn help(command: Option<&str>, emote: &str) -> String {
    if let Some(entry) = command.and_then(|c| {
        let c = c.trim().trim_start_matches('/').to_lowercase();
        COMMANDS.iter().find(|(name, ..)| *name == c)
    }) {
        let (_, tier, syntax, description) = entry;
        return format!("`{syntax}`{}: {description}", tier.suffix());
    }

    let descriptions = COMMANDS
        .iter()
        .map(|(_, tier, syntax, description)| format!("- `{syntax}`{}: {description}", tier.suffix()))
        .collect::<Vec<_>>()
        .join("\n");
    HELP.replace("[descriptions]", &descriptions)
        .replace("[emote]", emote)
}

/// Fill a request template from a ledger entry.
pub fn render_request(template: &str, request: &PendingRequest) -> String {
    let requesters = request
        .requesters
        .iter()
        .map(|id| id.mention())
        .collect::<Vec<_>>()
        .join(", ");
    let links = request
        .desired
        .iter()
        .map(|d| format!("- {}", d.link))
        .collect::<Vec<_>>()
        .join("\n");
    template
        .replace("[recipientID]", &request.recipient.mention())
        .replace("[requesterIDs]", &requesters)
        .replace("[desiredMessageLinks]", &links)
}
