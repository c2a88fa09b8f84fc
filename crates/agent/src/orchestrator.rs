//! The orchestrator: turns platform events into component calls and replies.
//!
//! Events are handled one at a time by [`Orchestrator::run`]. Permission
//! tiers are enforced here and nowhere else; components never see who is
//! calling them. Every refusal gets an explicit reply, except the silent
//! noise filters (bot authors, other bots' prefixes, messages without a
//! mention).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lorebot_channels::{indicate_failure, indicate_success, respond};
use lorebot_config::AppConfig;
use lorebot_core::channel::{Channel, MessageRef, PlatformMessage, UserId};
use lorebot_core::error::{ChannelError, Error, ValidationError};
use lorebot_core::event::{AdminObject, Command, Invocation, InvocationKind, PlatformEvent};
use lorebot_security::{AuditEvent, AuditLogger, AuditOutcome, PathIntent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::admin::{AdminRegistry, parse_user_ids};
use crate::ask::AskPipeline;
use crate::consent::{APPROVAL_DELAY, ConsentWorkflow, Upsert};
use crate::requests::DesiredItem;
use crate::texts;

/// Privilege levels, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    General,
    Trusted,
    Owner,
}

impl Tier {
    /// The tier a command requires.
    pub fn of(command: &Command) -> Tier {
        match command {
            Command::Ask { .. }
            | Command::Help { .. }
            | Command::Ping
            | Command::Contains { .. }
            | Command::GetSize { .. }
            | Command::Revoke => Tier::General,
            Command::Add { .. } | Command::Remove { .. } | Command::Clear { .. } => Tier::Trusted,
            Command::Save { .. } | Command::Load { .. } => Tier::Owner,
        }
    }

    /// Marker appended to a command's help entry.
    pub fn suffix(&self) -> &'static str {
        match self {
            Tier::General => "",
            Tier::Trusted => " (Trusted only)",
            Tier::Owner => " (Owner only)",
        }
    }
}

/// Orchestrator settings that are not component configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Owners in addition to those the platform reports
    pub owner_ids: Vec<UserId>,
    pub other_bot_prefixes: Vec<String>,
    pub request_emoji: String,
    pub approval_delay: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            owner_ids: Vec::new(),
            other_bot_prefixes: vec!["!".into(), "!!".into()],
            request_emoji: "↪️".into(),
            approval_delay: APPROVAL_DELAY,
        }
    }
}

impl From<&AppConfig> for OrchestratorOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            owner_ids: config.groups.owner_ids.iter().copied().map(UserId).collect(),
            other_bot_prefixes: config.discord.other_bot_prefixes.clone(),
            request_emoji: config.discord.request_addition_emoji.clone(),
            approval_delay: APPROVAL_DELAY,
        }
    }
}

pub struct Orchestrator {
    channel: Arc<dyn Channel>,
    ask: AskPipeline,
    admin: AdminRegistry,
    corpus_consent: ConsentWorkflow,
    permitting_consent: ConsentWorkflow,
    audit: AuditLogger,
    owners: HashSet<UserId>,
    other_bot_prefixes: Vec<String>,
    request_emoji: String,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("channel", &self.channel.name())
            .field("ask", &self.ask)
            .field("admin", &self.admin)
            .field("owners", &self.owners.len())
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        channel: Arc<dyn Channel>,
        ask: AskPipeline,
        admin: AdminRegistry,
        audit: AuditLogger,
        options: OrchestratorOptions,
    ) -> Self {
        let corpus_consent =
            ConsentWorkflow::corpus(admin.corpus_requests.clone(), admin.corpus.clone())
                .with_approval_delay(options.approval_delay);
        let permitting_consent =
            ConsentWorkflow::permitting(admin.permitting_requests.clone(), admin.permitting.clone())
                .with_approval_delay(options.approval_delay);
        Self {
            channel,
            ask,
            admin,
            corpus_consent,
            permitting_consent,
            audit,
            owners: options.owner_ids.into_iter().collect(),
            other_bot_prefixes: options.other_bot_prefixes,
            request_emoji: options.request_emoji,
        }
    }

    pub fn admin(&self) -> &AdminRegistry {
        &self.admin
    }

    pub fn ask_pipeline(&self) -> &AskPipeline {
        &self.ask
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Handle events until the sender side closes.
    pub async fn run(&self, mut events: mpsc::Receiver<PlatformEvent>) {
        info!(channel = self.channel.name(), "Orchestrator running");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Event stream closed, orchestrator stopping");
    }

    /// Handle one event. Failures are logged, never propagated.
    pub async fn handle(&self, event: PlatformEvent) {
        let result = match event {
            PlatformEvent::MessageCreated(message) => self.on_message(message).await,
            PlatformEvent::ReactionAdded {
                message,
                user,
                emoji,
            } => self.on_reaction(message, user, &emoji).await,
            PlatformEvent::MessageDeleted(message) => {
                self.on_deleted(&message).await;
                Ok(())
            }
            PlatformEvent::Command {
                invocation,
                command,
            } => self.on_command(invocation, command).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "Event handling failed");
        }
    }

    async fn is_owner(&self, user: UserId) -> bool {
        self.owners.contains(&user) || self.channel.is_owner(user).await
    }

    async fn tier(&self, user: UserId) -> Tier {
        if self.is_owner(user).await {
            Tier::Owner
        } else if self.admin.trusted.contains(user) {
            Tier::Trusted
        } else {
            Tier::General
        }
    }

    async fn on_message(&self, message: PlatformMessage) -> Result<(), ChannelError> {
        if message.author_is_bot || message.author == self.channel.bot_user_id() || !message.mentions_bot {
            return Ok(());
        }
        let input = message.content.trim();
        if self.other_bot_prefixes.iter().any(|p| input.starts_with(p.as_str())) {
            debug!(author = %message.author, "Message meant for another bot");
            return Ok(());
        }

        let invocation = Invocation {
            user: message.author,
            anchor: message.reference,
            kind: InvocationKind::Mention,
        };
        if self.refuse_blocked(&invocation).await? {
            return Ok(());
        }

        let (word, rest) = match input.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (input, ""),
        };
        match word.to_lowercase().as_str() {
            "" => self.help(&invocation, None).await,
            "help" => self.help(&invocation, Some(rest).filter(|r| !r.is_empty())).await,
            "permit" if rest.is_empty() => self.permit(&invocation).await,
            _ => self.answer(&invocation, input).await,
        }
    }

    /// Reply "blocked" to blocked non-owners. Returns whether it did.
    async fn refuse_blocked(&self, invocation: &Invocation) -> Result<bool, ChannelError> {
        if !self.admin.blocked.contains(invocation.user) || self.is_owner(invocation.user).await {
            return Ok(false);
        }
        debug!(user = %invocation.user, "Blocked user ignored");
        respond(self.channel.as_ref(), invocation, texts::BLOCKED).await?;
        Ok(true)
    }

    async fn on_command(&self, invocation: Invocation, command: Command) -> Result<(), ChannelError> {
        if command != Command::Revoke && self.refuse_blocked(&invocation).await? {
            return Ok(());
        }

        let required = Tier::of(&command);
        if self.tier(invocation.user).await < required {
            self.audit.log(
                AuditEvent::CommandDenied {
                    command: command.name().into(),
                },
                invocation.user,
                AuditOutcome::Denied,
                None,
            );
            let text = match required {
                Tier::Owner => texts::not_owner(command.name()),
                _ => texts::not_trusted(command.name()),
            };
            respond(self.channel.as_ref(), &invocation, &text).await?;
            return Ok(());
        }

        let name = command.name();
        let privileged = required > Tier::General;
        let result = match command {
            Command::Ask { query } => self.answer(&invocation, &query).await,
            Command::Help { command } => self.help(&invocation, command.as_deref()).await,
            Command::Ping => {
                let latency = self.channel.latency().map(|l| l.as_secs_f64());
                respond(self.channel.as_ref(), &invocation, &texts::ping(latency))
                    .await
                    .map(|_| ())
            }
            Command::Contains { object, user } => {
                self.contains(&invocation, object, user.unwrap_or(invocation.user)).await
            }
            Command::GetSize { object } => self.get_size(&invocation, object).await,
            Command::Add { object, input } => self.add(&invocation, object, &input).await,
            Command::Remove { object, input } => self.remove(&invocation, object, &input).await,
            Command::Clear { object } => {
                self.admin.clear(object).await;
                indicate_success(self.channel.as_ref(), &invocation, None).await
            }
            Command::Save { object, path } => {
                self.persist(&invocation, PathIntent::Save, object, path.as_deref()).await
            }
            Command::Load { object, path } => {
                self.persist(&invocation, PathIntent::Load, object, path.as_deref()).await
            }
            Command::Revoke => {
                self.admin.permitting.remove([invocation.user]);
                info!(user = %invocation.user, "Blanket consent revoked");
                indicate_success(self.channel.as_ref(), &invocation, None).await
            }
        };
        if privileged {
            let outcome = if result.is_ok() {
                AuditOutcome::Success
            } else {
                AuditOutcome::Failure
            };
            self.audit.log(
                AuditEvent::CommandExecuted {
                    command: name.into(),
                },
                invocation.user,
                outcome,
                None,
            );
        }
        result
    }

    async fn answer(&self, invocation: &Invocation, query: &str) -> Result<(), ChannelError> {
        info!(user = %invocation.user, query_len = query.len(), "Ask");
        let outcome = self.ask.ask(query).await;
        let reply = outcome.render(self.ask.ai_enabled());
        respond(self.channel.as_ref(), invocation, &reply).await.map(|_| ())
    }

    async fn help(&self, invocation: &Invocation, command: Option<&str>) -> Result<(), ChannelError> {
        let text = texts::help(command, &self.request_emoji);
        respond(self.channel.as_ref(), invocation, &text).await.map(|_| ())
    }

    async fn contains(&self, invocation: &Invocation, object: AdminObject, user: UserId) -> Result<(), ChannelError> {
        let answer = self.admin.target(object).and_then(|t| t.contains(user));
        let Some(answer) = answer else {
            let text = texts::unsupported("contains", object);
            return indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await;
        };
        match invocation.kind {
            InvocationKind::Mention => {
                let emotes: &[&str] = if answer { &texts::YES_EMOTES } else { &texts::NO_EMOTES };
                for emote in emotes {
                    self.channel.add_reaction(&invocation.anchor, emote).await?;
                }
                Ok(())
            }
            InvocationKind::Slash => {
                let text = if answer { "Yes." } else { "No." };
                respond(self.channel.as_ref(), invocation, text).await.map(|_| ())
            }
        }
    }

    async fn get_size(&self, invocation: &Invocation, object: AdminObject) -> Result<(), ChannelError> {
        let sizes = self.admin.sizes(object).await;
        if sizes.is_empty() {
            let text = texts::disabled(object);
            return indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await;
        }
        let text = sizes
            .into_iter()
            .map(|(o, n)| texts::size(o, n))
            .collect::<Vec<_>>()
            .join("\n");
        respond(self.channel.as_ref(), invocation, &text).await.map(|_| ())
    }

    async fn add(&self, invocation: &Invocation, object: AdminObject, input: &str) -> Result<(), ChannelError> {
        if object == AdminObject::Corpus {
            return self.add_by_link(invocation, input).await;
        }
        let Some(group) = self.admin.editable_group(object) else {
            let text = texts::unsupported("add", object);
            return indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await;
        };
        let (ids, failed) = parse_user_ids(input);
        let processed = group.add(ids);
        info!(group = group.name(), processed, failed, user = %invocation.user, "Members added");
        if failed > 0 {
            let text = texts::add_error(failed);
            return indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await;
        }
        indicate_success(self.channel.as_ref(), invocation, None).await
    }

    async fn remove(&self, invocation: &Invocation, object: AdminObject, input: &str) -> Result<(), ChannelError> {
        if object == AdminObject::Corpus {
            return indicate_failure(
                self.channel.as_ref(),
                invocation,
                Some(texts::CORPUS_REMOVAL_UNSUPPORTED),
            )
            .await;
        }
        let Some(group) = self.admin.editable_group(object) else {
            let text = texts::unsupported("remove", object);
            return indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await;
        };
        let (ids, failed) = parse_user_ids(input);
        let processed = group.remove(ids);
        info!(group = group.name(), processed, failed, user = %invocation.user, "Members removed");
        if failed > 0 {
            let text = texts::remove_error(failed);
            return indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await;
        }
        indicate_success(self.channel.as_ref(), invocation, None).await
    }

    async fn add_by_link(&self, invocation: &Invocation, link: &str) -> Result<(), ChannelError> {
        let message = match self.channel.fetch_by_link(link.trim()).await {
            Ok(Some(message)) => message,
            Ok(None) | Err(ChannelError::InvalidLink(_)) => {
                return indicate_failure(self.channel.as_ref(), invocation, Some(texts::MESSAGE_NOT_FOUND)).await;
            }
            Err(e) => return Err(e),
        };
        match self.request_addition(invocation.user, &message).await {
            Ok(()) => indicate_success(self.channel.as_ref(), invocation, None).await,
            Err(e) => {
                let text = request_failure_text(&e);
                indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await
            }
        }
    }

    /// Ask `message`'s author to let it into the corpus, or commit right away
    /// when the author is the requester or already consented.
    async fn request_addition(&self, requester: UserId, message: &PlatformMessage) -> Result<(), Error> {
        if message.author_is_bot {
            return Err(ValidationError::InvalidRecord(texts::BOT_MESSAGE.into()).into());
        }
        let item = DesiredItem {
            message: message.reference,
            link: message.link.clone(),
            content: message.content.clone(),
        };
        let author = message.author;
        if author == requester || self.admin.permitting.contains(author) {
            self.corpus_consent.commit_direct(author, requester, Some(item)).await?;
            return Ok(());
        }
        let outcome = self
            .corpus_consent
            .upsert(self.channel.as_ref(), &message.reference, author, requester, Some(item))
            .await?;
        debug!(?outcome, "Corpus request upserted");
        Ok(())
    }

    async fn permit(&self, invocation: &Invocation) -> Result<(), ChannelError> {
        let user = invocation.user;
        if self.admin.permitting.contains(user) {
            return indicate_success(self.channel.as_ref(), invocation, None).await;
        }
        match self
            .permitting_consent
            .upsert(self.channel.as_ref(), &invocation.anchor, user, user, None)
            .await
        {
            Ok(Upsert::Created(_)) => Ok(()),
            Ok(Upsert::Merged(display_ref) | Upsert::Unchanged(display_ref)) => {
                debug!(user = %user, message = %display_ref, "Permission request already open");
                Ok(())
            }
            Err(e) => {
                let text = request_failure_text(&e);
                indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await
            }
        }
    }

    async fn persist(
        &self,
        invocation: &Invocation,
        intent: PathIntent,
        object: AdminObject,
        path: Option<&str>,
    ) -> Result<(), ChannelError> {
        let failure_text = match intent {
            PathIntent::Save => texts::SAVE_ERROR,
            PathIntent::Load => texts::LOAD_ERROR,
        };
        match self.admin.persist(intent, object, path).await {
            Ok(report) if report.failed == 0 => indicate_success(self.channel.as_ref(), invocation, None).await,
            Ok(report) => {
                debug!(failed = report.failed, attempted = report.attempted, "Persistence incomplete");
                indicate_failure(self.channel.as_ref(), invocation, Some(failure_text)).await
            }
            Err(Error::Security(e)) => {
                warn!(user = %invocation.user, error = %e, "Dangerous filepath, revoking trust");
                self.audit.log(
                    AuditEvent::PathDenied {
                        path: path.unwrap_or_default().into(),
                    },
                    invocation.user,
                    AuditOutcome::Denied,
                    Some(e.to_string()),
                );
                if self.admin.trusted.contains(invocation.user) {
                    self.admin.trusted.remove([invocation.user]);
                    self.audit.log(AuditEvent::TrustRevoked, invocation.user, AuditOutcome::Success, None);
                }
                indicate_failure(self.channel.as_ref(), invocation, Some(texts::DANGEROUS_FILEPATH)).await
            }
            Err(e) => {
                warn!(object = %object, error = %e, "Persistence refused");
                let text = format!("{failure_text} ({e})");
                indicate_failure(self.channel.as_ref(), invocation, Some(&text)).await
            }
        }
    }

    async fn on_reaction(&self, message: MessageRef, user: UserId, emoji: &str) -> Result<(), ChannelError> {
        if user == self.channel.bot_user_id() {
            return Ok(());
        }

        if emoji == texts::APPROVE_EMOJI || emoji == texts::REJECT_EMOJI {
            for workflow in [&self.corpus_consent, &self.permitting_consent] {
                let Some(request) = workflow.ledger().get(&message) else {
                    continue;
                };
                if request.recipient != user {
                    debug!(user = %user, "Reaction from someone other than the recipient");
                    return Ok(());
                }
                let approved = emoji == texts::APPROVE_EMOJI;
                let outcome = match workflow.resolve(self.channel.as_ref(), &message, approved).await {
                    Ok(Some(_)) => AuditOutcome::Success,
                    Ok(None) => return Ok(()),
                    Err(e) => {
                        warn!(recipient = %user, error = %e, "Request resolved with failures");
                        AuditOutcome::Failure
                    }
                };
                self.audit.log(AuditEvent::RequestResolved { approved }, user, outcome, None);
                return Ok(());
            }
        }

        if emoji != self.request_emoji {
            return Ok(());
        }
        if self.tier(user).await < Tier::Trusted {
            debug!(user = %user, "Addition request from an untrusted user ignored");
            return Ok(());
        }
        if self.admin.blocked.contains(user) && !self.is_owner(user).await {
            return Ok(());
        }
        let Some(target) = self.channel.fetch(&message).await? else {
            return Ok(());
        };
        if let Err(e) = self.request_addition(user, &target).await {
            warn!(user = %user, message = %message, error = %e, "Addition request failed");
        }
        Ok(())
    }

    async fn on_deleted(&self, message: &MessageRef) {
        for workflow in [&self.corpus_consent, &self.permitting_consent] {
            if workflow.forget_message(self.channel.as_ref(), message).await {
                return;
            }
        }
    }
}

fn request_failure_text(error: &Error) -> String {
    match error {
        Error::Capacity(_) => texts::REQUEST_LIMIT.into(),
        Error::PartialFailure { failed, .. } => texts::add_error(*failed),
        Error::Validation(e) => e.to_string(),
        other => texts::query_error(other),
    }
}
