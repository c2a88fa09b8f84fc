//! End-to-end tests for the lorebot orchestrator.
//!
//! These drive the orchestrator with platform events against the stub
//! Discord channel, a scripted provider, and in-process corpus and cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lorebot_agent::{
    AdminRegistry, AnswerCache, AskPipeline, LedgerKind, Orchestrator, OrchestratorOptions,
    PendingRequestLedger, RateLimiter, texts,
};
use lorebot_channels::DiscordChannel;
use lorebot_config::DiscordConfig;
use lorebot_core::channel::{MessageRef, PlatformMessage, UserId};
use lorebot_core::corpus::{CorpusDocument, CorpusIndex};
use lorebot_core::embedding::{Embedder, Embedding};
use lorebot_core::error::ProviderError;
use lorebot_core::event::{AdminObject, Command, Invocation, InvocationKind, PlatformEvent};
use lorebot_core::message::Message;
use lorebot_core::provider::{Provider, ProviderRequest, ProviderResponse};
use lorebot_memory::{VectorStore, VectorStoreOptions};
use lorebot_providers::{AnswerGenerator, GeneratorOptions, HashEmbedder};
use lorebot_security::{AuditLogger, MembershipSet, PathScope};
use tempfile::TempDir;
use tokio::time::advance;

const BOT: UserId = UserId(999);
const OWNER: UserId = UserId(1);
const AUTHOR: UserId = UserId(10);
const ALICE: UserId = UserId(20);
const BOB: UserId = UserId(30);
const STRANGER: UserId = UserId(40);
const CHANNEL: u64 = 500;

// ── Mock collaborators ───────────────────────────────────────────────────

/// A provider that always answers the same thing and counts its calls.
struct ScriptedProvider {
    answer: String,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(answer: &str) -> Self {
        Self {
            answer: answer.into(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProviderResponse {
            message: Message::assistant(self.answer.clone()),
            model: request.model,
            usage: None,
        })
    }
}

/// Two near-duplicate questions with cosine similarity 0.97; everything
/// else is orthogonal to both.
struct QuestionEmbedder;

#[async_trait]
impl Embedder for QuestionEmbedder {
    fn name(&self) -> &str {
        "questions"
    }

    fn dimensions(&self) -> usize {
        3
    }

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        Ok(match text {
            "What is X?" => vec![1.0, 0.0, 0.0],
            "what is x" => vec![0.97, (1.0f32 - 0.97 * 0.97).sqrt(), 0.0],
            _ => vec![0.0, 0.0, 1.0],
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    channel: Arc<DiscordChannel>,
    orchestrator: Orchestrator,
    corpus: Arc<VectorStore>,
    _dir: TempDir,
}

#[derive(Default)]
struct Setup {
    provider: Option<Arc<ScriptedProvider>>,
    cache: Option<Arc<AnswerCache>>,
    cooldown: Option<RateLimiter>,
    documents: Vec<&'static str>,
}

impl Setup {
    async fn build(self) -> Harness {
        let dir = TempDir::new().unwrap();
        let channel = Arc::new(DiscordChannel::new(&DiscordConfig::default(), 77, BOT));

        let corpus = Arc::new(
            VectorStore::new(
                Arc::new(HashEmbedder::new(128).unwrap()),
                VectorStoreOptions::default(),
            )
            .unwrap(),
        );
        corpus
            .add(self.documents.iter().map(|d| CorpusDocument::new(*d, None)).collect())
            .await
            .unwrap();

        let generator = self.provider.map(|p| {
            let options = GeneratorOptions {
                model: "mock".into(),
                temperature: 0.0,
                system_prompt: "Answer from the context.".into(),
                max_input_characters: None,
                max_output_characters: None,
            };
            AnswerGenerator::new(p, options).unwrap()
        });
        let ask = AskPipeline::new(corpus.clone(), 4, true)
            .with_cooldown(self.cooldown)
            .with_cache(self.cache.clone())
            .with_generator(generator);

        let admin = AdminRegistry {
            blocked: Arc::new(MembershipSet::new("blocked", None)),
            trusted: Arc::new(MembershipSet::new("trusted", None)),
            permitting: Arc::new(MembershipSet::new("permitting", None)),
            cache: self.cache,
            corpus: corpus.clone(),
            corpus_requests: Arc::new(PendingRequestLedger::new(LedgerKind::Corpus, 10, None)),
            permitting_requests: Arc::new(PendingRequestLedger::new(
                LedgerKind::Permitting,
                10,
                None,
            )),
            scope: PathScope::new(dir.path()),
        };
        let options = OrchestratorOptions {
            owner_ids: vec![OWNER],
            approval_delay: Duration::ZERO,
            ..OrchestratorOptions::default()
        };
        let orchestrator = Orchestrator::new(channel.clone(), ask, admin, AuditLogger::new(), options);

        Harness {
            channel,
            orchestrator,
            corpus,
            _dir: dir,
        }
    }
}

impl Harness {
    /// Post a message that mentions the bot and deliver it.
    async fn mention(&self, author: UserId, content: &str) -> MessageRef {
        let mut message = self.channel.post(CHANNEL, author, content);
        message.mentions_bot = true;
        let reference = message.reference;
        self.orchestrator
            .handle(PlatformEvent::MessageCreated(message))
            .await;
        reference
    }

    /// Run a slash command; returns the message standing in for the interaction.
    async fn slash(&self, user: UserId, command: Command) -> MessageRef {
        let anchor = self.channel.post(CHANNEL, user, "/command").reference;
        let invocation = Invocation {
            user,
            anchor,
            kind: InvocationKind::Slash,
        };
        self.orchestrator
            .handle(PlatformEvent::Command {
                invocation,
                command,
            })
            .await;
        anchor
    }

    async fn react(&self, message: MessageRef, user: UserId, emoji: &str) {
        self.orchestrator
            .handle(PlatformEvent::ReactionAdded {
                message,
                user,
                emoji: emoji.into(),
            })
            .await;
    }

    fn post(&self, author: UserId, content: &str) -> PlatformMessage {
        self.channel.post(CHANNEL, author, content)
    }

    /// Bot replies to `anchor`, oldest first.
    fn replies(&self, anchor: MessageRef) -> Vec<(MessageRef, String)> {
        self.channel
            .bot_messages()
            .into_iter()
            .filter(|m| m.reply_to == Some(anchor))
            .map(|m| (m.message.reference, m.message.content))
            .collect()
    }

    fn reply_text(&self, anchor: MessageRef) -> String {
        let replies = self.replies(anchor);
        assert_eq!(replies.len(), 1, "expected one reply, got {replies:?}");
        replies[0].1.clone()
    }
}

// ── Ask ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cooldown_refuses_a_burst_then_recovers() {
    let h = Setup {
        cooldown: Some(
            RateLimiter::new(Duration::from_secs(120), Duration::from_secs(20), 2).unwrap(),
        ),
        documents: vec!["the tower fell in the third age"],
        ..Setup::default()
    }
    .build()
    .await;

    let first = h.mention(STRANGER, "the tower fell in the third age").await; // t=0
    advance(Duration::from_secs(5)).await;
    let second = h.mention(STRANGER, "the tower fell in the third age").await; // t=5
    advance(Duration::from_secs(3)).await;
    let third = h.mention(STRANGER, "the tower fell in the third age").await; // t=8

    assert!(h.reply_text(first).starts_with("Here are the messages"));
    assert!(h.reply_text(second).starts_with("Here are the messages"));
    assert_eq!(
        h.reply_text(third),
        "I am currently on cooldown: too many queries are being made right now. \
         (120 seconds remaining)"
    );

    // the cooldown runs from the third query
    advance(Duration::from_secs(120)).await; // t=128
    let fourth = h.mention(STRANGER, "the tower fell in the third age").await;
    assert!(h.reply_text(fourth).starts_with("Here are the messages"));
}

#[tokio::test]
async fn semantic_cache_hit_skips_the_model() {
    let provider = Arc::new(ScriptedProvider::new("fresh answer"));
    let cache = Arc::new(AnswerCache::new(Arc::new(QuestionEmbedder), 10, None, 0.95).unwrap());
    cache.insert("What is X?", "X is Y", vec![1.0, 0.0, 0.0]).unwrap();

    let h = Setup {
        provider: Some(provider.clone()),
        cache: Some(cache),
        documents: vec!["X is a placeholder"],
        ..Setup::default()
    }
    .build()
    .await;

    let anchor = h
        .slash(
            STRANGER,
            Command::Ask {
                query: "what is x".into(),
            },
        )
        .await;
    let reply = h.reply_text(anchor);
    assert!(reply.starts_with("X is Y\n-# Cached response."));
    assert!(reply.ends_with(texts::AI_DISCLAIMER));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn fresh_answers_carry_the_disclaimer_and_get_cached() {
    let provider = Arc::new(ScriptedProvider::new("The tower fell."));
    let cache = Arc::new(AnswerCache::new(Arc::new(QuestionEmbedder), 10, None, 0.95).unwrap());
    let h = Setup {
        provider: Some(provider.clone()),
        cache: Some(cache.clone()),
        documents: vec!["the tower fell in the third age"],
        ..Setup::default()
    }
    .build()
    .await;

    let anchor = h.mention(STRANGER, "the tower fell in the third age").await;
    assert_eq!(
        h.reply_text(anchor),
        format!("The tower fell.\n-# {}", texts::AI_DISCLAIMER)
    );
    assert_eq!(cache.len(), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn empty_corpus_means_no_sources() {
    let h = Setup {
        provider: Some(Arc::new(ScriptedProvider::new("unused"))),
        ..Setup::default()
    }
    .build()
    .await;
    let anchor = h.mention(STRANGER, "anything at all").await;
    assert_eq!(h.reply_text(anchor), texts::NO_CONTEXT);
}

// ── Mentions and permissions ─────────────────────────────────────────────

#[tokio::test]
async fn noise_is_ignored_silently() {
    let h = Setup::default().build().await;

    let plain = h.post(STRANGER, "hello everyone");
    h.orchestrator
        .handle(PlatformEvent::MessageCreated(plain.clone()))
        .await;
    let prefixed = h.mention(STRANGER, "!play music").await;
    let mut from_bot = h.post(BOT, "I said something");
    from_bot.mentions_bot = true;
    h.orchestrator
        .handle(PlatformEvent::MessageCreated(from_bot.clone()))
        .await;

    assert!(h.replies(plain.reference).is_empty());
    assert!(h.replies(prefixed).is_empty());
    assert!(h.replies(from_bot.reference).is_empty());
}

#[tokio::test]
async fn empty_mention_shows_help() {
    let h = Setup::default().build().await;
    let anchor = h.mention(STRANGER, "   ").await;
    assert!(h.reply_text(anchor).contains("reacting with ↪️"));
}

#[tokio::test]
async fn blocked_users_are_told_so_but_may_revoke() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().blocked.add([STRANGER]);
    h.orchestrator.admin().permitting.add([STRANGER]);

    let anchor = h.mention(STRANGER, "what is x").await;
    assert_eq!(h.reply_text(anchor), texts::BLOCKED);

    let anchor = h.slash(STRANGER, Command::Ping).await;
    assert_eq!(h.reply_text(anchor), texts::BLOCKED);

    let anchor = h.slash(STRANGER, Command::Revoke).await;
    assert_eq!(h.reply_text(anchor), "✅");
    assert!(!h.orchestrator.admin().permitting.contains(STRANGER));
}

#[tokio::test]
async fn tiers_are_enforced() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().trusted.add([ALICE]);

    let clear = Command::Clear {
        object: AdminObject::Blocked,
    };
    let anchor = h.slash(STRANGER, clear.clone()).await;
    assert_eq!(h.reply_text(anchor), "`clear` is a trusted-only command.");

    let anchor = h.slash(ALICE, clear).await;
    assert_eq!(h.reply_text(anchor), "✅");

    let save = Command::Save {
        object: AdminObject::Blocked,
        path: None,
    };
    let anchor = h.slash(ALICE, save).await;
    assert_eq!(h.reply_text(anchor), "`save` is an owner-only command.");
    assert_eq!(h.orchestrator.audit().entries().len(), 3);
}

#[tokio::test]
async fn membership_commands_are_idempotent() {
    let h = Setup::default().build().await;
    let add = Command::Add {
        object: AdminObject::Trusted,
        input: "<@55>".into(),
    };

    let first = h.slash(OWNER, add.clone()).await;
    let second = h.slash(OWNER, add).await;
    assert_eq!(h.reply_text(first), "✅");
    assert_eq!(h.reply_text(second), "✅");
    assert_eq!(h.orchestrator.admin().trusted.len(), 1);

    let anchor = h
        .slash(
            STRANGER,
            Command::Contains {
                object: AdminObject::Trusted,
                user: Some(UserId(55)),
            },
        )
        .await;
    assert_eq!(h.reply_text(anchor), "Yes.");

    let anchor = h
        .slash(
            OWNER,
            Command::Add {
                object: AdminObject::Blocked,
                input: "1 two 3".into(),
            },
        )
        .await;
    assert_eq!(h.reply_text(anchor), "1 object failed to be added.");
    assert_eq!(h.orchestrator.admin().blocked.len(), 2);
}

#[tokio::test]
async fn corpus_removal_is_refused() {
    let h = Setup::default().build().await;
    let anchor = h
        .slash(
            OWNER,
            Command::Remove {
                object: AdminObject::Corpus,
                input: "anything".into(),
            },
        )
        .await;
    assert_eq!(h.reply_text(anchor), texts::CORPUS_REMOVAL_UNSUPPORTED);
}

#[tokio::test]
async fn dangerous_filepath_demotes_the_caller() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().trusted.add([OWNER]);

    let anchor = h
        .slash(
            OWNER,
            Command::Save {
                object: AdminObject::Blocked,
                path: Some("/etc/lorebot-blocked.txt".into()),
            },
        )
        .await;
    assert_eq!(h.reply_text(anchor), texts::DANGEROUS_FILEPATH);
    assert!(!h.orchestrator.admin().trusted.contains(OWNER));
}

// ── Consent ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn merged_request_is_approved_once() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().trusted.add([ALICE, BOB]);
    let lore = h.post(AUTHOR, "The tower fell in the third age.");

    h.react(lore.reference, ALICE, "↪️").await;
    h.react(lore.reference, BOB, "↪️").await;

    let displays = h.replies(lore.reference);
    assert_eq!(displays.len(), 1, "one display, edited in place");
    let (display, text) = &displays[0];
    assert!(text.contains("<@20>, <@30>"));
    assert_eq!(h.channel.get(display).unwrap().edits, 1);

    // only the recipient can answer
    h.react(*display, ALICE, "✅").await;
    assert!(h.corpus.is_empty().await);

    h.react(*display, AUTHOR, "✅").await;
    assert_eq!(h.corpus.len().await, 1);
    let hits = h.corpus.query("The tower fell in the third age.", 1).await.unwrap();
    assert_eq!(hits[0].source.as_deref(), Some(lore.link.as_str()));
    assert!(!h.channel.exists(display));
    assert!(h.orchestrator.admin().corpus_requests.is_empty());

    // a resolved request stays resolved
    h.react(*display, AUTHOR, "✅").await;
    h.react(*display, AUTHOR, "❌").await;
    assert_eq!(h.corpus.len().await, 1);
}

#[tokio::test]
async fn rejected_request_adds_nothing() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().trusted.add([ALICE]);
    let lore = h.post(AUTHOR, "Secret lore.");

    h.react(lore.reference, ALICE, "↪️").await;
    let (display, _) = h.replies(lore.reference)[0].clone();
    h.react(display, AUTHOR, "❌").await;

    assert!(h.corpus.is_empty().await);
    assert!(!h.channel.exists(&display));
    assert!(h.orchestrator.admin().corpus_requests.is_empty());
}

#[tokio::test]
async fn untrusted_reactions_request_nothing() {
    let h = Setup::default().build().await;
    let lore = h.post(AUTHOR, "Secret lore.");
    h.react(lore.reference, STRANGER, "↪️").await;
    assert!(h.replies(lore.reference).is_empty());
    assert!(h.orchestrator.admin().corpus_requests.is_empty());
}

#[tokio::test]
async fn blanket_permission_skips_the_request() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().trusted.add([ALICE]);

    let permit = h.mention(AUTHOR, "permit").await;
    let (display, text) = h.replies(permit)[0].clone();
    assert!(text.starts_with("<@10>, if you react to this message with ✅"));
    h.react(display, AUTHOR, "✅").await;
    assert!(h.orchestrator.admin().permitting.contains(AUTHOR));
    assert!(h.orchestrator.admin().permitting_requests.is_empty());

    let lore = h.post(AUTHOR, "The river runs north.");
    h.react(lore.reference, ALICE, "↪️").await;
    assert!(h.replies(lore.reference).is_empty());
    assert_eq!(h.corpus.len().await, 1);
}

#[tokio::test]
async fn own_messages_are_added_directly_by_link() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().trusted.add([ALICE]);
    let lore = h.post(ALICE, "Alice's own lore.");

    let anchor = h
        .slash(
            ALICE,
            Command::Add {
                object: AdminObject::Corpus,
                input: lore.link.clone(),
            },
        )
        .await;
    assert_eq!(h.reply_text(anchor), "✅");
    assert_eq!(h.corpus.len().await, 1);

    let anchor = h
        .slash(
            ALICE,
            Command::Add {
                object: AdminObject::Corpus,
                input: "https://discord.com/channels/77/500/123456".into(),
            },
        )
        .await;
    assert_eq!(h.reply_text(anchor), texts::MESSAGE_NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_display_drops_its_request() {
    let h = Setup::default().build().await;
    h.orchestrator.admin().trusted.add([ALICE]);
    let lore = h.post(AUTHOR, "Secret lore.");
    h.react(lore.reference, ALICE, "↪️").await;
    let (display, _) = h.replies(lore.reference)[0].clone();

    h.orchestrator
        .handle(PlatformEvent::MessageDeleted(display))
        .await;
    assert!(h.orchestrator.admin().corpus_requests.is_empty());

    // a fresh request starts over with a new display
    h.react(lore.reference, ALICE, "↪️").await;
    assert_eq!(h.orchestrator.admin().corpus_requests.len(), 1);
}
