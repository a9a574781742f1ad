//! The conversation engine: per-user turn dispatch over the state
//! machine.
//!
//! One inbound message maps to one processor invocation under the
//! session's lock, so a user's turns are strictly serialized while
//! different users proceed in parallel. The engine owns the cross-turn
//! concerns the processors must not care about: expiry, history,
//! error recovery and session teardown.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, error, warn};

use super::context::{EngineDeps, TurnContext};
use super::model::{
    ConversationState, OutboundMessage, Session, TurnRole, SESSION_TTL_MINUTES,
};
use super::processors::{registry, StateProcessor};
use super::store::SessionStore;
use crate::catalog::NutritionCatalog;
use crate::error::{NutrilogError, Result};
use crate::ocr::OcrService;
use crate::parser::MealParser;
use crate::preference::PreferenceMemory;
use crate::validation::Validator;

const EXPIRY_NOTICE: &str = "That conversation timed out, so I'm starting fresh.";
const RECOVERY_REPLY: &str = "Something went wrong on my side. Let's pick up where we left off.";

/// The entry point hosts call with inbound messages.
pub struct ConversationEngine {
    store: Arc<dyn SessionStore>,
    deps: EngineDeps,
    processors: HashMap<ConversationState, Arc<dyn StateProcessor>>,
    session_ttl: Duration,
}

impl ConversationEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        parser: Arc<dyn MealParser>,
        catalog: Arc<dyn NutritionCatalog>,
    ) -> Self {
        let validator = Validator::new(catalog.clone());
        Self {
            store,
            deps: EngineDeps {
                parser,
                catalog,
                validator,
                preferences: None,
                ocr: None,
            },
            processors: registry(),
            session_ttl: Duration::minutes(SESSION_TTL_MINUTES),
        }
    }

    /// Enables per-user preference memory.
    pub fn with_preferences(mut self, preferences: Arc<PreferenceMemory>) -> Self {
        self.deps.preferences = Some(preferences);
        self
    }

    /// Enables photo-to-text extraction.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrService>) -> Self {
        self.deps.ocr = Some(ocr);
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Handles one inbound text message and returns the replies to
    /// deliver, in order.
    pub async fn handle_inbound_text(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<Vec<OutboundMessage>> {
        let handle = self.store.get_or_create(user_id).await;
        let mut session = handle.lock().await;

        let mut replies = Vec::new();
        self.reset_if_expired(&mut session, &mut replies);
        session.touch();

        let state = session.state;
        let processor = self
            .processors
            .get(&state)
            .cloned()
            .ok_or_else(|| NutrilogError::internal(format!("no processor for {state:?}")))?;
        debug!(user_id, ?state, "dispatching turn");

        let destroy = {
            let mut ctx = TurnContext::new(text, &mut session, &self.deps);
            if let Err(err) = processor.process(&mut ctx).await {
                error!(user_id, ?state, error = %err, "processor failed, rolling back");
                ctx.set_state(processor.recovery_state());
                ctx.reply(RECOVERY_REPLY);
            }
            if ctx.replies.is_empty() {
                // Contract backstop: a turn never ends silently.
                ctx.reply("Okay.");
            }
            replies.append(&mut ctx.replies);
            ctx.destroy_session
        };

        // Recorded after dispatch: parser replay must carry prior turns
        // only, never the message being handled.
        session.push_turn(TurnRole::User, text);
        for reply in &replies {
            session.push_turn(TurnRole::Assistant, reply.text.clone());
        }
        drop(session);

        if destroy {
            self.store.remove(user_id).await;
        }
        Ok(replies)
    }

    /// Handles one inbound photo. Extracted text is shown for
    /// correction before it enters the meal pipeline.
    pub async fn handle_inbound_image(
        &self,
        user_id: &str,
        image: &[u8],
    ) -> Result<Vec<OutboundMessage>> {
        let handle = self.store.get_or_create(user_id).await;
        let mut session = handle.lock().await;

        let mut replies = Vec::new();
        self.reset_if_expired(&mut session, &mut replies);
        session.touch();
        session.push_turn(TurnRole::User, "[image]");

        let Some(ocr) = &self.deps.ocr else {
            replies.push(OutboundMessage::plain(
                "I can't read photos on this setup. Type what you ate instead.",
            ));
            self.record_replies(&mut session, &replies);
            return Ok(replies);
        };

        match ocr.extract_text(image).await {
            Ok(Some(text)) if !text.trim().is_empty() => {
                replies.push(OutboundMessage::markdown(format!(
                    "I read this from your photo:\n{text}\nReply 'yes' to use it, or send a corrected version."
                )));
                session.scratch.ocr_text = Some(text);
                session.state = ConversationState::AwaitingOcrCorrection;
            }
            Ok(_) => {
                replies.push(OutboundMessage::plain(
                    "I couldn't find any text in that photo. Tell me what you ate.",
                ));
                session.state = ConversationState::AwaitingMealDescription;
            }
            Err(err) => {
                warn!(user_id, error = %err, "text extraction failed");
                replies.push(OutboundMessage::plain(
                    "I couldn't read that photo. Tell me what you ate instead.",
                ));
                session.state = ConversationState::AwaitingMealDescription;
            }
        }

        self.record_replies(&mut session, &replies);
        Ok(replies)
    }

    /// Drops every session whose inactivity timeout has elapsed.
    /// Returns how many were removed. Intended for a periodic task.
    pub async fn sweep_expired_sessions(&self) -> usize {
        let mut removed = 0;
        for user_id in self.store.user_ids().await {
            let Some(handle) = self.store.get(&user_id).await else {
                continue;
            };
            let expired = handle.lock().await.is_expired(self.session_ttl);
            if expired {
                self.store.remove(&user_id).await;
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired sessions");
        }
        removed
    }

    /// An expired mid-flow session is replaced with a fresh one and the
    /// user is told; an idle session just keeps going.
    fn reset_if_expired(&self, session: &mut Session, replies: &mut Vec<OutboundMessage>) {
        if session.state != ConversationState::Idle && session.is_expired(self.session_ttl) {
            debug!(user_id = %session.user_id, "session expired mid-flow, resetting");
            *session = Session::new(session.user_id.clone());
            replies.push(OutboundMessage::plain(EXPIRY_NOTICE));
        }
    }

    fn record_replies(&self, session: &mut Session, replies: &[OutboundMessage]) {
        for reply in replies {
            session.push_turn(TurnRole::Assistant, reply.text.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::catalog::{Food, FoodHit, FoodTier, LoggedServing, Measure};
    use crate::parser::{
        ClarificationItem, ClarificationKind, DraftItem, MealDraft, MealParser, ParseRequest,
    };
    use crate::preference::{
        Alias, ClarificationPreference, MeasurePreference, PreferenceRepository,
    };
    use crate::session::store::InMemorySessionStore;

    /// Parser scripted on keywords, enough to drive full flows.
    struct ScriptedParser;

    #[async_trait]
    impl MealParser for ScriptedParser {
        async fn parse(&self, request: &ParseRequest) -> crate::error::Result<MealDraft> {
            let text = &request.text;
            let mut draft = MealDraft::default();
            if text.contains("huevo") {
                let sized = text.contains("grande");
                draft.items.push(DraftItem {
                    name: if sized { "huevo grande" } else { "huevo" }.to_string(),
                    quantity: Some(2.0),
                    unit: Some("unidad".to_string()),
                });
                if !sized {
                    draft.needs_clarification = true;
                    draft.clarifications.push(ClarificationItem {
                        kind: ClarificationKind::MissingSize,
                        item_name: "huevo".to_string(),
                        original_term: Some("huevo".to_string()),
                        question: "What size are the eggs?".to_string(),
                    });
                }
            }
            if text.contains("arroz") {
                draft.items.push(DraftItem {
                    name: "arroz".to_string(),
                    quantity: Some(100.0),
                    unit: Some("g".to_string()),
                });
            }
            if text.contains("ambrosia") {
                draft.items.push(DraftItem {
                    name: "ambrosia".to_string(),
                    quantity: Some(1.0),
                    unit: None,
                });
            }
            Ok(draft)
        }
    }

    /// Records every request it sees, then always answers with rice.
    struct RecordingParser {
        requests: Mutex<Vec<ParseRequest>>,
    }

    #[async_trait]
    impl MealParser for RecordingParser {
        async fn parse(&self, request: &ParseRequest) -> crate::error::Result<MealDraft> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(MealDraft {
                items: vec![DraftItem {
                    name: "arroz".to_string(),
                    quantity: Some(100.0),
                    unit: Some("g".to_string()),
                }],
                ..MealDraft::default()
            })
        }
    }

    struct TestCatalog {
        logged: Mutex<Vec<LoggedServing>>,
        fail_log: AtomicBool,
    }

    impl TestCatalog {
        fn new() -> Self {
            Self {
                logged: Mutex::new(Vec::new()),
                fail_log: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl crate::catalog::NutritionCatalog for TestCatalog {
        async fn search(
            &self,
            _user_id: &str,
            query: &str,
            tier: FoodTier,
        ) -> crate::error::Result<Vec<FoodHit>> {
            if tier != FoodTier::Common {
                return Ok(Vec::new());
            }
            if query.contains("huevo") {
                return Ok(vec![FoodHit {
                    id: 10,
                    name: "Huevo grande".to_string(),
                    tier,
                    relevance: 0.9,
                }]);
            }
            if query.contains("arroz") {
                return Ok(vec![FoodHit {
                    id: 11,
                    name: "Arroz blanco".to_string(),
                    tier,
                    relevance: 0.9,
                }]);
            }
            if query.contains("tortilla") {
                return Ok((0..7)
                    .map(|i| FoodHit {
                        id: 20 + i,
                        name: format!("Tortilla {}", i + 1),
                        tier,
                        relevance: 0.9 - i as f64 * 0.05,
                    })
                    .collect());
            }
            Ok(Vec::new())
        }

        async fn get_foods(
            &self,
            _user_id: &str,
            ids: &[i64],
        ) -> crate::error::Result<Vec<Food>> {
            let known = [
                Food {
                    id: 10,
                    name: "Huevo grande".to_string(),
                    measures: vec![Measure {
                        id: 1,
                        name: "unidad".to_string(),
                        grams: 60.0,
                    }],
                },
                Food {
                    id: 11,
                    name: "Arroz blanco".to_string(),
                    measures: vec![Measure {
                        id: 2,
                        name: "g".to_string(),
                        grams: 1.0,
                    }],
                },
            ];
            Ok(known
                .into_iter()
                .filter(|f| ids.contains(&f.id))
                .collect())
        }

        async fn log_servings(
            &self,
            _user_id: &str,
            servings: &[LoggedServing],
        ) -> crate::error::Result<()> {
            if self.fail_log.load(Ordering::SeqCst) {
                return Err(crate::error::NutrilogError::remote_transient(
                    "food log unavailable",
                ));
            }
            self.logged.lock().unwrap().extend_from_slice(servings);
            Ok(())
        }
    }

    #[derive(Default)]
    struct InMemoryPreferences {
        aliases: Mutex<HashMap<(String, String), Alias>>,
        clarifications:
            Mutex<HashMap<(String, String, ClarificationKind), ClarificationPreference>>,
        measures: Mutex<HashMap<(String, String), MeasurePreference>>,
    }

    #[async_trait]
    impl PreferenceRepository for InMemoryPreferences {
        async fn find_alias(
            &self,
            user_id: &str,
            term: &str,
        ) -> crate::error::Result<Option<Alias>> {
            Ok(self
                .aliases
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), term.to_string()))
                .cloned())
        }

        async fn list_aliases(&self, user_id: &str) -> crate::error::Result<Vec<Alias>> {
            Ok(self
                .aliases
                .lock()
                .unwrap()
                .values()
                .filter(|a| a.user_id == user_id && a.active)
                .cloned()
                .collect())
        }

        async fn save_alias(&self, alias: &Alias) -> crate::error::Result<()> {
            self.aliases
                .lock()
                .unwrap()
                .insert((alias.user_id.clone(), alias.term.clone()), alias.clone());
            Ok(())
        }

        async fn deactivate_alias(&self, user_id: &str, term: &str) -> crate::error::Result<()> {
            if let Some(alias) = self
                .aliases
                .lock()
                .unwrap()
                .get_mut(&(user_id.to_string(), term.to_string()))
            {
                alias.active = false;
            }
            Ok(())
        }

        async fn find_clarification(
            &self,
            user_id: &str,
            term: &str,
            kind: ClarificationKind,
        ) -> crate::error::Result<Option<ClarificationPreference>> {
            Ok(self
                .clarifications
                .lock()
                .unwrap()
                .get(&(user_id.to_string(), term.to_string(), kind))
                .cloned())
        }

        async fn list_clarifications(
            &self,
            user_id: &str,
        ) -> crate::error::Result<Vec<ClarificationPreference>> {
            Ok(self
                .clarifications
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn save_clarification(
            &self,
            preference: &ClarificationPreference,
        ) -> crate::error::Result<()> {
            self.clarifications.lock().unwrap().insert(
                (
                    preference.user_id.clone(),
                    preference.term.clone(),
                    preference.kind,
                ),
                preference.clone(),
            );
            Ok(())
        }

        async fn list_measure_preferences(
            &self,
            user_id: &str,
        ) -> crate::error::Result<Vec<MeasurePreference>> {
            Ok(self
                .measures
                .lock()
                .unwrap()
                .values()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect())
        }

        async fn save_measure_preference(
            &self,
            preference: &MeasurePreference,
        ) -> crate::error::Result<()> {
            self.measures.lock().unwrap().insert(
                (preference.user_id.clone(), preference.food_pattern.clone()),
                preference.clone(),
            );
            Ok(())
        }
    }

    struct FixedOcr(Option<String>);

    #[async_trait]
    impl OcrService for FixedOcr {
        async fn extract_text(&self, _image: &[u8]) -> crate::error::Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    struct Fixture {
        engine: ConversationEngine,
        store: Arc<InMemorySessionStore>,
        catalog: Arc<TestCatalog>,
        repository: Arc<InMemoryPreferences>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemorySessionStore::new());
        let catalog = Arc::new(TestCatalog::new());
        let repository = Arc::new(InMemoryPreferences::default());
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(ScriptedParser),
            catalog.clone(),
        )
        .with_preferences(Arc::new(PreferenceMemory::new(repository.clone())));
        Fixture {
            engine,
            store,
            catalog,
            repository,
        }
    }

    async fn state_of(store: &InMemorySessionStore, user_id: &str) -> Option<ConversationState> {
        match store.get(user_id).await {
            Some(handle) => Some(handle.lock().await.state),
            None => None,
        }
    }

    #[tokio::test]
    async fn meal_flow_clarifies_validates_and_saves() {
        let f = fixture();

        let replies = f
            .engine
            .handle_inbound_text("u1", "2 huevos y 100 g de arroz")
            .await
            .unwrap();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].text.contains("What size are the eggs?"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingClarification)
        );

        let replies = f.engine.handle_inbound_text("u1", "grande").await.unwrap();
        assert!(replies[0].text.contains("Here's what I'll log"));
        assert!(replies[0].text.contains("Huevo grande"));
        assert!(replies[0].text.contains("Arroz blanco"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingConfirmation)
        );

        let replies = f.engine.handle_inbound_text("u1", "save").await.unwrap();
        assert!(replies[0].text.contains("Logged 2 item(s)"));
        // The size answer is offered as something to remember.
        assert!(replies[1].text.contains("Should I remember this"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingMemoryConfirmation)
        );

        let logged = f.catalog.logged.lock().unwrap().clone();
        assert_eq!(logged.len(), 2);
        assert_eq!(logged[0].grams, 120.0);
        assert_eq!(logged[1].grams, 100.0);

        let replies = f.engine.handle_inbound_text("u1", "yes").await.unwrap();
        assert!(replies[0].text.contains("Noted"));
        // Session is cleared after a completed flow.
        assert!(f.store.get("u1").await.is_none());

        let stored = f
            .repository
            .find_clarification("u1", "huevo", ClarificationKind::MissingSize)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.answer, "grande");
        assert_eq!(stored.occurrences, 1);
        assert!(!stored.confirmed);
    }

    #[tokio::test]
    async fn unresolved_item_asks_for_another_name() {
        let f = fixture();

        let replies = f.engine.handle_inbound_text("u1", "ambrosia").await.unwrap();
        assert!(replies[0].text.contains("I couldn't find: ambrosia"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingClarification)
        );

        let replies = f.engine.handle_inbound_text("u1", "arroz").await.unwrap();
        assert!(replies[0].text.contains("Arroz blanco"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingConfirmation)
        );

        // The rename is queued as an alias learning after saving.
        let replies = f.engine.handle_inbound_text("u1", "save").await.unwrap();
        assert!(replies[1].text.contains("\"ambrosia\" means Arroz blanco"));
    }

    #[tokio::test]
    async fn expired_session_resets_before_dispatch() {
        let f = fixture();

        f.engine
            .handle_inbound_text("u1", "2 huevos y 100 g de arroz")
            .await
            .unwrap();

        {
            let handle = f.store.get("u1").await.unwrap();
            let mut session = handle.lock().await;
            session.last_activity = Utc::now() - Duration::minutes(SESSION_TTL_MINUTES + 1);
        }

        let replies = f.engine.handle_inbound_text("u1", "grande").await.unwrap();
        assert!(replies[0].text.contains("timed out"));
        // "grande" alone parses to nothing; the fresh session asks again.
        assert!(replies[1].text.contains("What did you eat?"));
    }

    #[tokio::test]
    async fn write_failure_keeps_the_meal_savable() {
        let f = fixture();

        f.engine
            .handle_inbound_text("u1", "2 huevos grandes")
            .await
            .unwrap();
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingConfirmation)
        );

        f.catalog.fail_log.store(true, Ordering::SeqCst);
        let replies = f.engine.handle_inbound_text("u1", "save").await.unwrap();
        assert!(replies[0].text.contains("send 'save' to try again"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingConfirmation)
        );

        f.catalog.fail_log.store(false, Ordering::SeqCst);
        let replies = f.engine.handle_inbound_text("u1", "save").await.unwrap();
        assert!(replies[0].text.contains("Logged 1 item(s)"));
        assert_eq!(f.catalog.logged.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn aliases_rewrite_before_parsing() {
        let f = fixture();
        f.repository
            .save_alias(&Alias {
                user_id: "u1".to_string(),
                term: "ptes".to_string(),
                food_id: 11,
                food_name: "arroz blanco".to_string(),
                tier: FoodTier::Custom,
                usage_count: 1,
                active: true,
                manual: true,
            })
            .await
            .unwrap();

        // "ptes" is rewritten to "arroz blanco" before the parser sees it.
        let replies = f.engine.handle_inbound_text("u1", "100 g de ptes").await.unwrap();
        assert!(replies[0].text.contains("Arroz blanco"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingConfirmation)
        );
    }

    #[tokio::test]
    async fn image_without_ocr_degrades_to_text() {
        let f = fixture();
        let replies = f.engine.handle_inbound_image("u1", b"jpeg").await.unwrap();
        assert!(replies[0].text.contains("can't read photos"));
        assert_eq!(state_of(&f.store, "u1").await, Some(ConversationState::Idle));
    }

    #[tokio::test]
    async fn image_flow_offers_correction_then_parses() {
        let store = Arc::new(InMemorySessionStore::new());
        let catalog = Arc::new(TestCatalog::new());
        let engine = ConversationEngine::new(
            store.clone(),
            Arc::new(ScriptedParser),
            catalog.clone(),
        )
        .with_ocr(Arc::new(FixedOcr(Some("2 huevos grandes".to_string()))));

        let replies = engine.handle_inbound_image("u1", b"jpeg").await.unwrap();
        assert!(replies[0].text.contains("I read this from your photo"));
        assert_eq!(
            state_of(&store, "u1").await,
            Some(ConversationState::AwaitingOcrCorrection)
        );

        let replies = engine.handle_inbound_text("u1", "yes").await.unwrap();
        assert!(replies[0].text.contains("Huevo grande"));
        assert_eq!(
            state_of(&store, "u1").await,
            Some(ConversationState::AwaitingConfirmation)
        );
    }

    #[tokio::test]
    async fn parser_sees_rewritten_text_and_prior_turns_only() {
        let store = Arc::new(InMemorySessionStore::new());
        let catalog = Arc::new(TestCatalog::new());
        let repository = Arc::new(InMemoryPreferences::default());
        let parser = Arc::new(RecordingParser {
            requests: Mutex::new(Vec::new()),
        });
        let engine = ConversationEngine::new(store.clone(), parser.clone(), catalog)
            .with_preferences(Arc::new(PreferenceMemory::new(repository.clone())));
        repository
            .save_alias(&Alias {
                user_id: "u1".to_string(),
                term: "ptes".to_string(),
                food_id: 11,
                food_name: "arroz blanco".to_string(),
                tier: FoodTier::Custom,
                usage_count: 1,
                active: true,
                manual: true,
            })
            .await
            .unwrap();

        engine.handle_inbound_text("u1", "100 g de ptes").await.unwrap();
        {
            let requests = parser.requests.lock().unwrap();
            assert_eq!(requests[0].text, "100 g de arroz blanco");
            assert!(requests[0].history.is_empty());
        }

        // A correction from the confirmation summary replays the earlier
        // turns, never the message being handled and never the raw alias
        // form of the rewritten text.
        engine
            .handle_inbound_text("u1", "mejor 200 g de arroz")
            .await
            .unwrap();
        let requests = parser.requests.lock().unwrap();
        let history = &requests[1].history;
        assert!(history.iter().any(|(role, _)| role == "user"));
        assert!(history.iter().all(|(_, text)| !text.contains("mejor")));
    }

    #[tokio::test]
    async fn identical_turns_produce_identical_replies_and_state() {
        let a = fixture();
        let b = fixture();

        for text in ["2 huevos y 100 g de arroz", "grande", "save", "yes"] {
            let replies_a = a.engine.handle_inbound_text("u1", text).await.unwrap();
            let replies_b = b.engine.handle_inbound_text("u1", text).await.unwrap();
            assert_eq!(replies_a, replies_b, "diverged on {text:?}");
            assert_eq!(
                state_of(&a.store, "u1").await,
                state_of(&b.store, "u1").await,
                "state diverged on {text:?}"
            );
        }
        assert_eq!(
            *a.catalog.logged.lock().unwrap(),
            *b.catalog.logged.lock().unwrap()
        );
    }

    #[tokio::test]
    async fn preference_menu_lists_and_adds_aliases() {
        let f = fixture();
        f.repository
            .save_alias(&Alias {
                user_id: "u1".to_string(),
                term: "ptes".to_string(),
                food_id: 11,
                food_name: "Arroz blanco".to_string(),
                tier: FoodTier::Custom,
                usage_count: 2,
                active: true,
                manual: true,
            })
            .await
            .unwrap();

        let replies = f.engine.handle_inbound_text("u1", "/preferences").await.unwrap();
        assert!(replies[0].text.contains("\"ptes\" → Arroz blanco"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingPreferenceAction)
        );

        f.engine.handle_inbound_text("u1", "add").await.unwrap();
        let replies = f.engine.handle_inbound_text("u1", "bati = arroz").await.unwrap();
        assert!(replies[0].text.contains("Saved: \"bati\" → Arroz blanco"));

        f.engine.handle_inbound_text("u1", "done").await.unwrap();
        assert_eq!(state_of(&f.store, "u1").await, Some(ConversationState::Idle));
    }

    #[tokio::test]
    async fn search_pick_is_bounded_by_the_listed_window() {
        let f = fixture();
        f.engine.handle_inbound_text("u1", "/search").await.unwrap();
        let replies = f.engine.handle_inbound_text("u1", "tortilla").await.unwrap();
        assert!(replies[0].text.contains("5. Tortilla"));
        assert!(!replies[0].text.contains("6. Tortilla"));

        // Past the listed window there is nothing to pick; the input is
        // treated as a fresh query instead.
        let replies = f.engine.handle_inbound_text("u1", "7").await.unwrap();
        assert!(replies[0].text.contains("Nothing found"));
        assert_eq!(
            state_of(&f.store, "u1").await,
            Some(ConversationState::AwaitingFoodSearchSelection)
        );
    }

    #[tokio::test]
    async fn cancel_during_search_destroys_the_session() {
        let f = fixture();
        f.engine.handle_inbound_text("u1", "/search").await.unwrap();
        let replies = f.engine.handle_inbound_text("u1", "/cancel").await.unwrap();
        assert!(!replies.is_empty());
        assert!(f.store.get("u1").await.is_none());
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_sessions() {
        let f = fixture();
        f.engine.handle_inbound_text("u1", "2 huevos").await.unwrap();
        f.engine.handle_inbound_text("u2", "2 huevos").await.unwrap();

        {
            let handle = f.store.get("u1").await.unwrap();
            handle.lock().await.last_activity =
                Utc::now() - Duration::minutes(SESSION_TTL_MINUTES + 1);
        }

        assert_eq!(f.engine.sweep_expired_sessions().await, 1);
        assert!(f.store.get("u1").await.is_none());
        assert!(f.store.get("u2").await.is_some());
    }
}
