use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use compass_core::event_bus::{make_event, noop_sink, JourneyEventKind, JourneyEventSink};
use compass_query::{decode, find, MatchPolicy, Query};
use compass_reporter::{create, ReportError, ReporterConfig, StepReporter};
use compass_web_sdk::{ClickEvent, ClickListener, Document, ElementId, ListenerId, Location, Page};

use crate::state_machine::{TriggerLifecycle, TriggerState};
use crate::store::TriggerStore;
use crate::types::{StepId, Trigger, TriggerEvent, Triggers};
use crate::url_condition::UrlCondition;

#[derive(Error, Debug)]
pub enum JourneyError {
    #[error("failed to create the step reporting client: {0}")]
    Client(#[from] ReportError),

    #[error("the journey engine must be started inside a tokio runtime")]
    NoRuntime,

    #[error("invalid trigger transition from {from:?} to {to:?}")]
    InvalidTransition { from: TriggerState, to: TriggerState },
}

/// Called when the page matches none of a fully URL-scoped journey.
pub type DigressionCallback = Box<dyn FnOnce(&Arc<dyn StepReporter>) + Send>;

/// Tunables that are not part of the trigger table.
#[derive(Clone)]
pub struct EngineSettings {
    pub match_policy: MatchPolicy,
    pub event_sink: Arc<dyn JourneyEventSink>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            match_policy: MatchPolicy::default(),
            event_sink: noop_sink(),
        }
    }
}

/// Everything [`run`] needs from the host.
pub struct RunProps {
    pub config: ReporterConfig,
    pub triggers: Triggers,
    pub on_digression: Option<DigressionCallback>,
    pub settings: EngineSettings,
}

impl RunProps {
    pub fn new(config: ReporterConfig, triggers: Triggers) -> Self {
        Self {
            config,
            triggers,
            on_digression: None,
            settings: EngineSettings::default(),
        }
    }

    pub fn on_digression(mut self, callback: impl FnOnce(&Arc<dyn StepReporter>) + Send + 'static) -> Self {
        self.on_digression = Some(Box::new(callback));
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Debug, Clone)]
struct ClickStep {
    step_id: StepId,
    query: Query,
    once: bool,
    url_condition: Option<UrlCondition>,
}

#[derive(Default)]
struct EngineState {
    triggered: Vec<StepId>,
    lifecycles: HashMap<StepId, TriggerLifecycle>,
}

/// State shared by page-load dispatch, the click listener and the
/// [`RunOutput`] of one engine instance.
struct EngineCore {
    conversation_id: String,
    client: Arc<dyn StepReporter>,
    store: TriggerStore,
    document: Arc<Document>,
    location: Arc<Location>,
    policy: MatchPolicy,
    sink: Arc<dyn JourneyEventSink>,
    runtime: Handle,
    state: Mutex<EngineState>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl EngineCore {
    fn emit(&self, kind: JourneyEventKind, step_id: &str, detail: Option<String>) {
        self.sink.emit(make_event(
            kind,
            self.conversation_id.clone(),
            Some(step_id.to_string()),
            detail,
        ));
    }

    /// Dedup-and-send. The step is recorded and persisted before the report
    /// is attempted; a failed report never un-records it.
    fn dispatch(&self, step_id: &str, once: bool) {
        {
            let mut state = self.state.lock();
            let EngineState {
                triggered,
                lifecycles,
            } = &mut *state;
            let lifecycle = lifecycles
                .entry(step_id.to_string())
                .or_insert_with(|| TriggerLifecycle::new(once));

            if lifecycle.is_terminal() {
                debug!(step_id = %step_id, state = ?lifecycle.state, "Trigger already settled");
                self.emit(JourneyEventKind::StepSuppressed, step_id, None);
                return;
            }
            advance(lifecycle, TriggerState::Candidate, step_id);

            if triggered.iter().any(|s| s == step_id) {
                if once {
                    advance(lifecycle, TriggerState::Suppressed, step_id);
                    debug!(step_id = %step_id, "Step already triggered; suppressed");
                    self.emit(JourneyEventKind::StepSuppressed, step_id, None);
                    return;
                }
            } else {
                triggered.push(step_id.to_string());
                if let Err(e) = self.store.save(triggered) {
                    warn!(step_id = %step_id, error = %e, "Failed to persist triggered steps");
                    self.emit(JourneyEventKind::PersistFailed, step_id, Some(e.to_string()));
                }
            }
            advance(lifecycle, TriggerState::Reported, step_id);
        }

        self.report(step_id.to_string());
    }

    fn report(&self, step_id: StepId) {
        let client = self.client.clone();
        let sink = self.sink.clone();
        let conversation_id = self.conversation_id.clone();
        let handle = self.runtime.spawn(async move {
            match client.send_step(&step_id, None).await {
                Ok(()) => {
                    info!(step_id = %step_id, "Step reported");
                    sink.emit(make_event(
                        JourneyEventKind::StepReported,
                        conversation_id,
                        Some(step_id),
                        None,
                    ));
                }
                Err(e) => {
                    warn!(step_id = %step_id, error = %e, "Failed to report step");
                    sink.emit(make_event(
                        JourneyEventKind::ReportFailed,
                        conversation_id,
                        Some(step_id),
                        Some(e.to_string()),
                    ));
                }
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    async fn handle_click(&self, steps: &[ClickStep], target: ElementId) {
        let href = self.location.href();
        let candidates: Vec<&ClickStep> = steps
            .iter()
            .filter(|s| s.url_condition.as_ref().map_or(true, |c| c.matches(&href)))
            .collect();
        if candidates.is_empty() {
            return;
        }

        let resolved = join_all(
            candidates
                .iter()
                .map(|s| find(&self.document, &s.query, self.policy)),
        )
        .await;

        let hit = self.document.read(|tree| {
            candidates
                .iter()
                .zip(&resolved)
                .find(|(_, elements)| elements.iter().any(|el| tree.contains(*el, target)))
                .map(|(step, _)| *step)
        });

        match hit {
            Some(step) => {
                debug!(step_id = %step.step_id, "Click matched trigger");
                self.dispatch(&step.step_id, step.once);
            }
            None => debug!(candidates = candidates.len(), "Click matched no trigger"),
        }
    }
}

fn advance(lifecycle: &mut TriggerLifecycle, to: TriggerState, step_id: &str) {
    if let Err(e) = lifecycle.transition(to) {
        warn!(step_id = %step_id, error = %e, "Unexpected trigger transition");
    }
}

/// The single document-level listener of an engine instance.
struct ClickDispatcher {
    core: Arc<EngineCore>,
    steps: Arc<Vec<ClickStep>>,
}

impl ClickListener for ClickDispatcher {
    fn on_click(&self, event: ClickEvent) -> BoxFuture<'static, ()> {
        let core = self.core.clone();
        let steps = self.steps.clone();
        async move { core.handle_click(&steps, event.target).await }.boxed()
    }
}

/// A running engine instance.
pub struct RunOutput {
    /// The reporting client, as handed to the digression callback.
    pub client: Arc<dyn StepReporter>,
    core: Arc<EngineCore>,
    listener: Mutex<Option<ListenerId>>,
}

impl std::fmt::Debug for RunOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOutput")
            .field("conversation_id", &self.core.conversation_id)
            .field("triggered", &self.core.state.lock().triggered.len())
            .field("listening", &self.listener.lock().is_some())
            .finish()
    }
}

impl RunOutput {
    /// Detaches the click listener. Persisted state and steps already sent
    /// are unaffected; calling it again does nothing.
    pub fn teardown(&self) {
        if let Some(id) = self.listener.lock().take() {
            self.core.document.remove_click_listener(id);
            info!(conversation_id = %self.core.conversation_id, "Journey torn down");
        }
    }

    /// Waits for every report issued so far to finish.
    pub async fn settle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.core.pending.lock());
            if handles.is_empty() {
                return;
            }
            for result in join_all(handles).await {
                if let Err(e) = result {
                    warn!(error = %e, "Report task did not complete");
                }
            }
        }
    }

    /// Steps recorded as triggered for this conversation, in trigger order.
    pub fn triggered_steps(&self) -> Vec<StepId> {
        self.core.state.lock().triggered.clone()
    }

    /// Lifecycle state of a trigger; `None` until it first becomes a candidate.
    pub fn step_state(&self, step_id: &str) -> Option<TriggerState> {
        self.core.state.lock().lifecycles.get(step_id).map(|l| l.state)
    }
}

/// Starts the journey on `page`, reporting through a client built from
/// `props.config`. Only client construction can fail.
pub fn run(props: RunProps, page: &Page) -> Result<RunOutput, JourneyError> {
    let client: Arc<dyn StepReporter> = Arc::new(create(props.config.clone())?);
    run_with_client(props, page, client)
}

/// Starts the journey with a caller-supplied reporting client.
pub fn run_with_client(
    props: RunProps,
    page: &Page,
    client: Arc<dyn StepReporter>,
) -> Result<RunOutput, JourneyError> {
    let runtime = Handle::try_current().map_err(|_| JourneyError::NoRuntime)?;
    let RunProps {
        config,
        triggers,
        on_digression,
        settings,
    } = props;

    let store = TriggerStore::new(page.storage.clone(), config.conversation_id.clone());
    let triggered = store.load();
    info!(
        conversation_id = %config.conversation_id,
        triggers = triggers.len(),
        already_triggered = triggered.len(),
        "Starting journey"
    );

    let core = Arc::new(EngineCore {
        conversation_id: config.conversation_id.clone(),
        client: client.clone(),
        store,
        document: page.document.clone(),
        location: page.location.clone(),
        policy: settings.match_policy,
        sink: settings.event_sink.clone(),
        runtime,
        state: Mutex::new(EngineState {
            triggered,
            lifecycles: HashMap::new(),
        }),
        pending: Mutex::new(Vec::new()),
    });

    if let Some(on_digression) = on_digression {
        if triggers.all_url_scoped() {
            let href = page.location.href();
            let on_journey = triggers
                .iter()
                .any(|(_, t)| t.url_condition.as_ref().is_some_and(|c| c.matches(&href)));
            if !on_journey {
                info!(href = %href, "Page is outside the journey; digression");
                settings.event_sink.emit(make_event(
                    JourneyEventKind::DigressionDetected,
                    config.conversation_id.clone(),
                    None,
                    Some(href),
                ));
                on_digression(&client);
            }
        }
    }

    let mut load_triggers: Vec<(&StepId, &Trigger)> = Vec::new();
    let mut click_triggers: Vec<(&StepId, &Trigger)> = Vec::new();
    for (step_id, trigger) in triggers.iter() {
        match trigger.event {
            TriggerEvent::PageLoad => load_triggers.push((step_id, trigger)),
            TriggerEvent::Click => click_triggers.push((step_id, trigger)),
            TriggerEvent::Unknown => debug!(step_id = %step_id, "Trigger event not recognised; inert"),
        }
    }

    for (step_id, trigger) in load_triggers {
        let applies = trigger
            .url_condition
            .as_ref()
            .map_or(true, |c| c.matches(&page.location.href()));
        if applies {
            core.dispatch(step_id, trigger.once);
        }
    }

    let mut click_steps = Vec::with_capacity(click_triggers.len());
    for (step_id, trigger) in click_triggers {
        let Some(encoded) = &trigger.query else {
            warn!(step_id = %step_id, "Click trigger has no query; ignored");
            continue;
        };
        match decode(encoded) {
            Ok(query) => click_steps.push(ClickStep {
                step_id: step_id.clone(),
                query,
                once: trigger.once,
                url_condition: trigger.url_condition.clone(),
            }),
            Err(e) => {
                warn!(step_id = %step_id, error = %e, "Click trigger query rejected");
                core.emit(JourneyEventKind::TriggerRejected, step_id, Some(e.to_string()));
            }
        }
    }

    let listener = page.document.add_click_listener(Arc::new(ClickDispatcher {
        core: core.clone(),
        steps: Arc::new(click_steps),
    }));

    Ok(RunOutput {
        client,
        core,
        listener: Mutex::new(Some(listener)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use compass_core::event_bus::capture_sink;
    use compass_query::{EncodedQuery, Method};
    use compass_reporter::Context;
    use compass_web_sdk::{DomTree, ElementFixture, MemoryStorage, Storage, StorageError};
    use std::time::Duration;

    use crate::url_condition::UrlOperator;

    /// Records every report in a log shared with the test.
    struct RecordingReporter {
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl StepReporter for RecordingReporter {
        async fn send_step(&self, step_id: &str, _context: Option<Context>) -> Result<(), ReportError> {
            self.log.lock().push(format!("step:{step_id}"));
            if self.fail {
                Err(ReportError::Status { status: 500 })
            } else {
                Ok(())
            }
        }
    }

    struct ReadOnlyStorage;

    impl Storage for ReadOnlyStorage {
        fn get_item(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }
        fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("read-only".into()))
        }
        fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn config() -> ReporterConfig {
        ReporterConfig {
            api_key: "key".into(),
            workspace_id: "ws".into(),
            conversation_id: "conv-1".into(),
            journey_id: "journey".into(),
            language_code: "en-US".into(),
            debug: false,
            api_url: "https://mm.example.com".into(),
        }
    }

    fn page_with(url: &str, storage: Arc<dyn Storage>) -> Page {
        let dom = ElementFixture::new("body")
            .child(
                ElementFixture::new("div")
                    .attr("class", "card")
                    .child(
                        ElementFixture::new("button")
                            .attr("id", "buy")
                            .child(ElementFixture::new("span").text("Buy")),
                    ),
            )
            .child(ElementFixture::new("a").attr("id", "help").text("Help"));
        Page::new(
            Document::new(DomTree::from_fixture(&dom)),
            Location::new(url).unwrap(),
            storage,
        )
    }

    fn page() -> Page {
        page_with("https://shop.example.com/cart", Arc::new(MemoryStorage::new()))
    }

    fn selector(s: &str) -> EncodedQuery {
        EncodedQuery::new(Method::Select).arg("selector", s)
    }

    fn element(page: &Page, s: &str) -> ElementId {
        let selector = compass_web_sdk::Selector::parse(s).unwrap();
        page.document.read(|tree| selector.query_all(tree)[0])
    }

    fn reporter(fail: bool) -> (Arc<dyn StepReporter>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(RecordingReporter {
                log: log.clone(),
                fail,
            }),
            log,
        )
    }

    fn fast() -> EngineSettings {
        EngineSettings {
            match_policy: MatchPolicy::new(2, Duration::from_millis(5)),
            event_sink: noop_sink(),
        }
    }

    #[tokio::test]
    async fn test_single_listener_regardless_of_trigger_count() {
        for count in [0usize, 1, 7] {
            let page = page();
            let triggers: Triggers = (0..count)
                .map(|i| (format!("click-{i}"), Trigger::click(selector("button"))))
                .collect();
            let (client, _) = reporter(false);
            let output = run_with_client(RunProps::new(config(), triggers), &page, client).unwrap();
            assert_eq!(page.document.click_listener_count(), 1);

            output.teardown();
            output.teardown();
            assert_eq!(page.document.click_listener_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_digression_when_no_url_condition_matches() {
        let page = page();
        let (client, log) = reporter(false);
        let calls = log.clone();
        let triggers = Triggers::new()
            .insert(
                "checkout",
                Trigger::page_load().when(UrlCondition::new(UrlOperator::Contains, "/checkout")),
            )
            .insert(
                "pay",
                Trigger::click(selector("#buy"))
                    .when(UrlCondition::new(UrlOperator::Suffix, "/pay")),
            );
        let props = RunProps::new(config(), triggers)
            .on_digression(move |_client| calls.lock().push("digression".to_string()));

        let output = run_with_client(props, &page, client).unwrap();
        page.document.dispatch_click(element(&page, "#buy")).await;
        output.settle().await;

        assert_eq!(*log.lock(), vec!["digression".to_string()]);
    }

    #[tokio::test]
    async fn test_digression_callback_can_report_through_client() {
        let page = page();
        let (client, log) = reporter(false);
        let handed: Arc<Mutex<Option<Arc<dyn StepReporter>>>> = Arc::new(Mutex::new(None));
        let slot = handed.clone();
        let triggers = Triggers::new().insert(
            "elsewhere",
            Trigger::page_load().when(UrlCondition::new(UrlOperator::Eq, "https://other.example/")),
        );
        let props = RunProps::new(config(), triggers)
            .on_digression(move |client| *slot.lock() = Some(client.clone()));
        let output = run_with_client(props, &page, client).unwrap();
        output.settle().await;
        assert!(log.lock().is_empty());

        let client = handed.lock().take().expect("digression callback not called");
        client.send_step("off-journey", None).await.unwrap();
        assert_eq!(*log.lock(), vec!["step:off-journey".to_string()]);
        assert!(output.triggered_steps().is_empty());
    }

    #[tokio::test]
    async fn test_no_digression_when_journey_not_fully_url_scoped() {
        let page = page();
        let (client, log) = reporter(false);
        let calls = log.clone();
        let triggers = Triggers::new()
            .insert(
                "scoped",
                Trigger::page_load().when(UrlCondition::new(UrlOperator::Eq, "https://nowhere/")),
            )
            .insert("unscoped", Trigger::click(selector("#help")));
        let props = RunProps::new(config(), triggers)
            .on_digression(move |_client| calls.lock().push("digression".to_string()));
        let output = run_with_client(props, &page, client).unwrap();
        output.settle().await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_page_load_respects_url_condition() {
        let page = page();
        let (client, log) = reporter(false);
        let triggers = Triggers::new()
            .insert(
                "cart",
                Trigger::page_load().when(UrlCondition::new(UrlOperator::Suffix, "/cart")),
            )
            .insert(
                "home",
                Trigger::page_load().when(UrlCondition::new(UrlOperator::Eq, "https://shop.example.com/")),
            )
            .insert("always", Trigger::page_load());
        let output = run_with_client(RunProps::new(config(), triggers), &page, client).unwrap();
        output.settle().await;

        let mut sent = log.lock().clone();
        sent.sort();
        assert_eq!(sent, vec!["step:always", "step:cart"]);
        assert_eq!(output.triggered_steps(), vec!["cart", "always"]);
        assert_eq!(output.step_state("home"), None);
    }

    #[tokio::test]
    async fn test_dedup_once_step_reports_once() {
        let storage = Arc::new(MemoryStorage::new());
        let page = page_with("https://shop.example.com/cart", storage.clone());
        let (client, log) = reporter(false);
        let output =
            run_with_client(RunProps::new(config(), Triggers::new()), &page, client).unwrap();

        output.core.dispatch("s1", true);
        output.core.dispatch("s1", true);
        output.settle().await;

        assert_eq!(*log.lock(), vec!["step:s1".to_string()]);
        assert_eq!(output.triggered_steps(), vec!["s1".to_string()]);
        assert_eq!(
            storage.get_item("jb-triggered-steps-conv-1").unwrap().as_deref(),
            Some(r#"["s1"]"#)
        );
        assert_eq!(output.step_state("s1"), Some(TriggerState::Reported));
    }

    #[tokio::test]
    async fn test_repeatable_step_reports_every_time_without_reappending() {
        let page = page();
        let (client, log) = reporter(false);
        let triggers = Triggers::new().insert("buy", Trigger::click(selector("#buy")));
        let output = run_with_client(
            RunProps::new(config(), triggers).with_settings(fast()),
            &page,
            client,
        )
        .unwrap();

        let target = element(&page, "#buy span");
        page.document.dispatch_click(target).await;
        page.document.dispatch_click(target).await;
        output.settle().await;

        assert_eq!(log.lock().len(), 2);
        assert_eq!(output.triggered_steps(), vec!["buy".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_overlapping_clicks_report_once_step_once() {
        let storage = Arc::new(MemoryStorage::new());
        let page = page_with("https://shop.example.com/cart", storage.clone());
        let (client, log) = reporter(false);
        let triggers = Triggers::new().insert("buy", Trigger::click(selector("#buy")).once());
        let output = run_with_client(
            RunProps::new(config(), triggers).with_settings(fast()),
            &page,
            client,
        )
        .unwrap();

        let target = element(&page, "#buy span");
        let (first, second) = (page.document.clone(), page.document.clone());
        let (a, b) = futures::join!(
            tokio::spawn(async move { first.dispatch_click(target).await }),
            tokio::spawn(async move { second.dispatch_click(target).await }),
        );
        a.unwrap();
        b.unwrap();
        output.settle().await;

        assert_eq!(*log.lock(), vec!["step:buy".to_string()]);
        assert_eq!(output.triggered_steps(), vec!["buy".to_string()]);
        assert_eq!(
            storage.get_item("jb-triggered-steps-conv-1").unwrap().as_deref(),
            Some(r#"["buy"]"#)
        );
        assert_eq!(output.step_state("buy"), Some(TriggerState::Reported));
    }

    #[tokio::test]
    async fn test_first_trigger_in_table_order_wins() {
        let page = page();
        let (client, log) = reporter(false);
        let triggers = Triggers::new()
            .insert("card", Trigger::click(selector(".card")))
            .insert("button", Trigger::click(selector("#buy")));
        let output = run_with_client(
            RunProps::new(config(), triggers).with_settings(fast()),
            &page,
            client,
        )
        .unwrap();

        page.document.dispatch_click(element(&page, "#buy span")).await;
        output.settle().await;
        assert_eq!(*log.lock(), vec!["step:card".to_string()]);
        assert_eq!(output.step_state("button"), None);
    }

    #[tokio::test]
    async fn test_click_outside_matches_reports_nothing() {
        let page = page();
        let (client, log) = reporter(false);
        let triggers = Triggers::new().insert("buy", Trigger::click(selector("#buy")));
        let output = run_with_client(
            RunProps::new(config(), triggers).with_settings(fast()),
            &page,
            client,
        )
        .unwrap();

        page.document.dispatch_click(element(&page, "#help")).await;
        output.settle().await;
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_url_condition_reevaluated_after_navigation() {
        let page = page();
        let (client, log) = reporter(false);
        let triggers = Triggers::new().insert(
            "help",
            Trigger::click(selector("#help"))
                .when(UrlCondition::new(UrlOperator::Contains, "/account")),
        );
        let output = run_with_client(
            RunProps::new(config(), triggers).with_settings(fast()),
            &page,
            client,
        )
        .unwrap();

        let help = element(&page, "#help");
        page.document.dispatch_click(help).await;
        page.location.navigate("https://shop.example.com/account").unwrap();
        page.document.dispatch_click(help).await;
        output.settle().await;
        assert_eq!(*log.lock(), vec!["step:help".to_string()]);
    }

    #[tokio::test]
    async fn test_bad_query_only_drops_its_trigger() {
        let page = page();
        let (client, log) = reporter(false);
        let sink = capture_sink();
        let triggers = Triggers::new()
            .insert(
                "broken",
                Trigger::click(EncodedQuery::new(Method::Unknown("xpath".into())).arg("expr", "//a")),
            )
            .insert("help", Trigger::click(selector("#help")));
        let settings = EngineSettings {
            event_sink: sink.clone(),
            ..fast()
        };
        let output =
            run_with_client(RunProps::new(config(), triggers).with_settings(settings), &page, client)
                .unwrap();

        page.document.dispatch_click(element(&page, "#help")).await;
        output.settle().await;
        assert_eq!(*log.lock(), vec!["step:help".to_string()]);
        assert_eq!(sink.count_kind(JourneyEventKind::TriggerRejected), 1);
        assert_eq!(sink.count_kind(JourneyEventKind::StepReported), 1);
    }

    #[tokio::test]
    async fn test_failed_report_is_not_retried() {
        let page = page();
        let (client, log) = reporter(true);
        let sink = capture_sink();
        let triggers = Triggers::new().insert("s1", Trigger::page_load().once());
        let settings = EngineSettings {
            event_sink: sink.clone(),
            ..fast()
        };
        let output =
            run_with_client(RunProps::new(config(), triggers).with_settings(settings), &page, client)
                .unwrap();
        output.settle().await;
        output.core.dispatch("s1", true);
        output.settle().await;

        assert_eq!(log.lock().len(), 1);
        assert_eq!(output.triggered_steps(), vec!["s1".to_string()]);
        assert_eq!(sink.count_kind(JourneyEventKind::ReportFailed), 1);
        assert_eq!(sink.count_kind(JourneyEventKind::StepSuppressed), 1);
    }

    #[tokio::test]
    async fn test_persistence_failure_still_reports() {
        let page = page_with("https://shop.example.com/cart", Arc::new(ReadOnlyStorage));
        let (client, log) = reporter(false);
        let sink = capture_sink();
        let triggers = Triggers::new().insert("s1", Trigger::page_load().once());
        let settings = EngineSettings {
            event_sink: sink.clone(),
            ..fast()
        };
        let output =
            run_with_client(RunProps::new(config(), triggers).with_settings(settings), &page, client)
                .unwrap();
        output.settle().await;

        assert_eq!(*log.lock(), vec!["step:s1".to_string()]);
        assert_eq!(output.triggered_steps(), vec!["s1".to_string()]);
        assert_eq!(sink.count_kind(JourneyEventKind::PersistFailed), 1);
    }

    #[tokio::test]
    async fn test_click_target_rendered_after_start() {
        let page = page();
        let (client, log) = reporter(false);
        let triggers = Triggers::new().insert("promo", Trigger::click(selector("#promo")).once());
        let output = run_with_client(
            RunProps::new(config(), triggers).with_settings(fast()),
            &page,
            client,
        )
        .unwrap();

        let promo = page.document.mutate(|tree| {
            let root = tree.root();
            tree.append_fixture(root, &ElementFixture::new("aside").attr("id", "promo"))
        });
        page.document.dispatch_click(promo).await;
        output.settle().await;
        assert_eq!(*log.lock(), vec!["step:promo".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_event_is_inert() {
        let page = page();
        let (client, log) = reporter(false);
        let triggers = Triggers::from_json(r#"{ "s1": { "event": "hover" } }"#).unwrap();
        let output = run_with_client(RunProps::new(config(), triggers), &page, client).unwrap();
        page.document.dispatch_click(element(&page, "#buy")).await;
        output.settle().await;
        assert!(log.lock().is_empty());
        assert_eq!(output.step_state("s1"), None);
    }

    #[test]
    fn test_requires_runtime() {
        let page = page();
        let (client, _) = reporter(false);
        let err = run_with_client(RunProps::new(config(), Triggers::new()), &page, client).unwrap_err();
        assert!(matches!(err, JourneyError::NoRuntime));
        assert_eq!(page.document.click_listener_count(), 0);
    }

    #[tokio::test]
    async fn test_run_propagates_client_setup_failure() {
        let page = page();
        let mut bad = config();
        bad.api_url = "not a url".into();
        let err = run(RunProps::new(bad, Triggers::new()), &page).unwrap_err();
        assert!(matches!(err, JourneyError::Client(ReportError::InvalidApiUrl { .. })));
        assert_eq!(page.document.click_listener_count(), 0);
    }
}
