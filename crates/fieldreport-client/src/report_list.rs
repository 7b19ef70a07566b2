//! Live report list.
//!
//! Mounting a [`ReportListView`] spawns one task that resolves the viewer's
//! scope, opens the change feed, bulk-fetches the list and then applies change
//! notifications in arrival order. The feed is opened before the fetch so that
//! changes racing the fetch queue up instead of being lost; they are applied
//! only once the fetched list has been committed.
//!
//! Unmounting closes the view state first, so nothing that completes later
//! (the init task, an in-flight refresh) can write to it, then aborts the task,
//! which drops the subscription.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fieldreport_net::Subscription;
use fieldreport_shared::types::{Report, Scope};
use fieldreport_shared::ReportError;

use crate::backend::{ChangeFeed, ProfileStore, ReportStore, Services};
use crate::reconcile::{apply_event, normalize};
use crate::session::{resolve_user, SessionContext};
use crate::view::ViewState;

/// Which reports the list shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Reports submitted by the signed-in user.
    CurrentUser,
    /// Every report, regardless of owner.
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListStatus {
    Loading,
    Ready,
    /// No signed-in user could be resolved. The UI should offer sign-in.
    NotAuthenticated,
    /// Loading failed. The UI should offer a retry via refresh.
    Failed(ReportError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSnapshot {
    pub status: ListStatus,
    pub reports: Vec<Report>,
    pub refreshing: bool,
    /// Whether change notifications are being applied.
    pub live: bool,
}

impl Default for ListSnapshot {
    fn default() -> Self {
        Self {
            status: ListStatus::Loading,
            reports: Vec::new(),
            refreshing: false,
            live: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed { count: usize },
    /// Another refresh was already running, or the view is unmounted.
    Skipped,
}

struct ListShared {
    state: ViewState<ListSnapshot>,
    mode: ListMode,
    session: SessionContext,
    reports: Arc<dyn ReportStore>,
    profiles: Arc<dyn ProfileStore>,
    scope: Mutex<Option<Scope>>,
    refreshing: AtomicBool,
    loaded: AtomicBool,
    loaded_signal: Notify,
}

impl ListShared {
    fn scope(&self) -> Option<Scope> {
        self.scope.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn resolve_scope(&self) -> Result<Scope, ReportError> {
        if let Some(scope) = self.scope() {
            return Ok(scope);
        }
        let scope = match self.mode {
            ListMode::All => Scope::All,
            ListMode::CurrentUser => {
                Scope::User(resolve_user(&self.session, &*self.profiles).await?)
            }
        };
        *self.scope.lock().unwrap_or_else(|e| e.into_inner()) = Some(scope.clone());
        Ok(scope)
    }

    /// Fetch the scoped list and replace the view's contents wholesale.
    async fn load(&self, scope: &Scope) -> Result<usize, ReportError> {
        let list = normalize(self.reports.fetch_reports(scope).await?, scope);
        let count = list.len();
        self.state.commit(|s| {
            s.reports = list;
            s.status = ListStatus::Ready;
        });
        self.loaded.store(true, Ordering::Release);
        self.loaded_signal.notify_one();
        Ok(count)
    }

    /// Record a load failure unless a list is already showing.
    fn fail(&self, err: ReportError) {
        let status = match err {
            ReportError::NotAuthenticated => ListStatus::NotAuthenticated,
            other => ListStatus::Failed(other),
        };
        self.state.commit(|s| {
            if s.status != ListStatus::Ready {
                s.status = status;
            }
        });
    }

    async fn refresh(&self) -> Result<RefreshOutcome, ReportError> {
        if !self.state.is_mounted() {
            return Ok(RefreshOutcome::Skipped);
        }
        if self.refreshing.swap(true, Ordering::AcqRel) {
            debug!("refresh already in flight");
            return Ok(RefreshOutcome::Skipped);
        }
        let _guard = RefreshGuard(self);
        self.state.commit(|s| s.refreshing = true);

        let result = match self.resolve_scope().await {
            Ok(scope) => self.load(&scope).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(count) => {
                debug!(count, "report list refreshed");
                Ok(RefreshOutcome::Refreshed { count })
            }
            Err(e) => {
                warn!(error = %e, "refresh failed");
                self.fail(e.clone());
                Err(e)
            }
        }
    }
}

struct RefreshGuard<'a>(&'a ListShared);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.refreshing.store(false, Ordering::Release);
        self.0.state.commit(|s| s.refreshing = false);
    }
}

async fn open_feed(
    shared: &ListShared,
    feed: &dyn ChangeFeed,
    scope: &Scope,
) -> Option<Subscription> {
    let subscription = match feed.subscribe(scope).await {
        Ok(sub) => Some(sub),
        Err(e) => {
            warn!(error = %e, "live updates unavailable");
            None
        }
    };
    let live = subscription.is_some();
    shared.state.commit(|s| s.live = live);
    subscription
}

async fn run(shared: Arc<ListShared>, feed: Arc<dyn ChangeFeed>) {
    let mut resolved_late = false;
    let scope = match shared.resolve_scope().await {
        Ok(scope) => scope,
        Err(e) => {
            warn!(error = %e, "cannot resolve report scope");
            shared.fail(e);
            // A successful refresh resolves the scope and loads the list.
            shared.loaded_signal.notified().await;
            resolved_late = true;
            match shared.scope() {
                Some(scope) => scope,
                None => return,
            }
        }
    };

    let mut subscription = open_feed(&shared, &*feed, &scope).await;

    match shared.load(&scope).await {
        Ok(count) => info!(
            count,
            live = subscription.is_some(),
            late = resolved_late,
            "report list loaded"
        ),
        Err(e) => {
            warn!(error = %e, "initial report fetch failed");
            shared.fail(e);
            if !shared.loaded.load(Ordering::Acquire) {
                // Nothing drains the feed until a list is showing.
                drop(subscription.take());
                shared.state.commit(|s| s.live = false);
                shared.loaded_signal.notified().await;

                subscription = open_feed(&shared, &*feed, &scope).await;
                // Pick up changes made while the feed was closed.
                if let Err(e) = shared.load(&scope).await {
                    warn!(error = %e, "report reload after reconnect failed");
                }
            }
        }
    }

    let Some(sub) = subscription.as_mut() else {
        return;
    };
    while let Some(event) = sub.recv().await {
        debug!(kind = %event.kind(), id = %event.id(), "applying change");
        let applied = shared.state.commit(|s| {
            let list = std::mem::take(&mut s.reports);
            s.reports = apply_event(list, &scope, &event);
        });
        if !applied {
            break;
        }
    }

    shared.state.commit(|s| s.live = false);
    debug!("change feed ended");
}

/// A mounted report list. Dropping it unmounts.
pub struct ReportListView {
    shared: Arc<ListShared>,
    task: Option<JoinHandle<()>>,
}

impl ReportListView {
    /// Mount the list and start loading. Must be called inside a tokio runtime.
    pub fn mount(services: &Services, session: SessionContext, mode: ListMode) -> Self {
        let shared = Arc::new(ListShared {
            state: ViewState::new(ListSnapshot::default()),
            mode,
            session,
            reports: services.reports.clone(),
            profiles: services.profiles.clone(),
            scope: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            loaded: AtomicBool::new(false),
            loaded_signal: Notify::new(),
        });
        let task = tokio::spawn(run(shared.clone(), services.feed.clone()));
        debug!(?mode, "report list mounted");
        Self {
            shared,
            task: Some(task),
        }
    }

    pub fn snapshot(&self) -> ListSnapshot {
        self.shared.state.snapshot()
    }

    pub fn watch(&self) -> watch::Receiver<ListSnapshot> {
        self.shared.state.subscribe()
    }

    /// Number of state commits so far.
    pub fn revision(&self) -> u64 {
        self.shared.state.revision()
    }

    pub fn handle(&self) -> ListHandle {
        ListHandle {
            shared: self.shared.clone(),
        }
    }

    /// Re-fetch the list and replace it. Returns `Skipped` while another
    /// refresh is running.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ReportError> {
        self.shared.refresh().await
    }

    pub fn unmount(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        self.shared.state.close();
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("report list unmounted");
        }
    }
}

impl Drop for ReportListView {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Cloneable handle for refreshing a mounted list from another task.
#[derive(Clone)]
pub struct ListHandle {
    shared: Arc<ListShared>,
}

impl ListHandle {
    pub async fn refresh(&self) -> Result<RefreshOutcome, ReportError> {
        self.shared.refresh().await
    }

    pub fn snapshot(&self) -> ListSnapshot {
        self.shared.state.snapshot()
    }

    pub fn revision(&self) -> u64 {
        self.shared.state.revision()
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.state.is_mounted()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use fieldreport_shared::protocol::ChangeEvent;
    use fieldreport_shared::types::{ReportId, UserId};

    use super::*;
    use crate::testing::{day, report, FakeBackend};

    fn signed_in(uid: &str) -> SessionContext {
        SessionContext::new(None, Some(UserId::new(uid)))
    }

    fn ids(snapshot: &ListSnapshot) -> Vec<String> {
        snapshot.reports.iter().map(|r| r.id.to_string()).collect()
    }

    async fn settle(
        view: &ReportListView,
        pred: impl FnMut(&ListSnapshot) -> bool,
    ) -> ListSnapshot {
        let mut rx = view.watch();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
            .await
            .expect("view did not reach expected state")
            .expect("view state dropped");
        snapshot.clone()
    }

    #[tokio::test]
    async fn loads_scoped_list_newest_first() {
        let fake = FakeBackend::new();
        fake.set_rows(vec![
            report(1, "me", day(1)),
            report(2, "other", day(4)),
            report(3, "me", day(3)),
        ]);
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);

        let snap = settle(&view, |s| s.status == ListStatus::Ready).await;
        assert_eq!(ids(&snap), ["3", "1"]);
        assert!(snap.live);
        assert_eq!(fake.subscribes(), 1);
    }

    #[tokio::test]
    async fn unscoped_list_needs_no_session() {
        let fake = FakeBackend::new();
        fake.set_rows(vec![report(1, "me", day(1)), report(2, "other", day(2))]);
        let view =
            ReportListView::mount(&fake.services(), SessionContext::default(), ListMode::All);

        let snap = settle(&view, |s| s.status == ListStatus::Ready).await;
        assert_eq!(ids(&snap), ["2", "1"]);
        assert_eq!(fake.profile_lookups(), 0);
    }

    #[tokio::test]
    async fn changes_during_fetch_apply_after_commit() {
        let fake = FakeBackend::new();
        fake.set_rows(vec![report(1, "me", day(2)), report(2, "me", day(1))]);
        let gate = fake.block_fetches();
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);

        fake.fetch_started.notified().await;
        fake.emit(ChangeEvent::Insert(report(3, "me", day(3))));
        fake.emit(ChangeEvent::Delete { id: ReportId::from(2) });
        assert_eq!(view.snapshot().status, ListStatus::Loading);
        gate.notify_one();

        let snap = settle(&view, |s| {
            s.reports.len() == 2 && s.reports[0].id.as_str() == "3"
        })
        .await;
        assert_eq!(ids(&snap), ["3", "1"]);
    }

    #[tokio::test]
    async fn live_changes_reconcile_in_order() {
        let fake = FakeBackend::new();
        fake.set_rows(vec![
            report(1, "me", day(3)),
            report(2, "me", day(2)),
            report(3, "me", day(1)),
        ]);
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);
        settle(&view, |s| s.status == ListStatus::Ready && s.live).await;

        let mut moved = report(2, "me", day(5));
        moved.responded = true;
        fake.emit(ChangeEvent::Update(moved));
        fake.emit(ChangeEvent::Insert(report(9, "other", day(9))));

        let snap = settle(&view, |s| s.reports.first().map(|r| r.id.as_str()) == Some("2")).await;
        assert_eq!(ids(&snap), ["2", "1", "3"]);
        assert!(snap.reports[0].responded);
    }

    #[tokio::test]
    async fn missing_session_is_not_authenticated() {
        let fake = FakeBackend::new();
        let view = ReportListView::mount(
            &fake.services(),
            SessionContext::default(),
            ListMode::CurrentUser,
        );

        let snap = settle(&view, |s| s.status != ListStatus::Loading).await;
        assert_eq!(snap.status, ListStatus::NotAuthenticated);
        assert_eq!(fake.fetches(), 0);
        assert_eq!(
            view.refresh().await,
            Err(ReportError::NotAuthenticated)
        );
    }

    #[tokio::test]
    async fn fetch_failure_recovers_on_refresh() {
        let fake = FakeBackend::new();
        fake.fail_fetches(Some(ReportError::Fetch("boom".into())));
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);

        let snap = settle(&view, |s| s.status != ListStatus::Loading && !s.live).await;
        assert_eq!(snap.status, ListStatus::Failed(ReportError::Fetch("boom".into())));
        assert_eq!(fake.open_subscriptions(), 0);

        fake.fail_fetches(None);
        fake.set_rows(vec![report(1, "me", day(1))]);
        assert_eq!(
            view.refresh().await,
            Ok(RefreshOutcome::Refreshed { count: 1 })
        );
        let snap = settle(&view, |s| s.status == ListStatus::Ready && s.live).await;
        assert_eq!(ids(&snap), ["1"]);
        assert_eq!(fake.subscribes(), 2);

        // The reopened feed applies changes on top of the refreshed list.
        fake.emit(ChangeEvent::Insert(report(2, "me", day(2))));
        let snap = settle(&view, |s| s.reports.len() == 2).await;
        assert_eq!(ids(&snap), ["2", "1"]);
    }

    #[tokio::test]
    async fn failed_first_fetch_closes_feed() {
        let fake = FakeBackend::new();
        fake.fail_fetches(Some(ReportError::Fetch("boom".into())));
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);
        settle(&view, |s| matches!(s.status, ListStatus::Failed(_)) && !s.live).await;

        // Changes published while the list is failed have nowhere to queue.
        for d in 10..20 {
            fake.emit(ChangeEvent::Insert(report(i64::from(d), "me", day(d))));
        }
        assert_eq!(fake.open_subscriptions(), 0);
        assert_eq!(fake.subscribes(), 1);

        fake.fail_fetches(None);
        fake.set_rows(vec![report(1, "me", day(1)), report(12, "me", day(12))]);
        assert!(view.refresh().await.is_ok());
        let snap = settle(&view, |s| s.live && s.status == ListStatus::Ready).await;
        assert_eq!(ids(&snap), ["12", "1"]);
        assert_eq!(fake.open_subscriptions(), 1);
    }

    #[tokio::test]
    async fn refresh_replaces_list() {
        let fake = FakeBackend::new();
        fake.set_rows(vec![report(1, "me", day(1)), report(2, "me", day(2))]);
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);
        settle(&view, |s| s.status == ListStatus::Ready).await;

        fake.set_rows(vec![report(5, "me", day(5))]);
        assert_eq!(
            view.refresh().await,
            Ok(RefreshOutcome::Refreshed { count: 1 })
        );
        assert_eq!(ids(&view.snapshot()), ["5"]);
        assert!(!view.snapshot().refreshing);
    }

    #[tokio::test]
    async fn concurrent_refresh_is_skipped() {
        let fake = FakeBackend::new();
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);
        settle(&view, |s| s.status == ListStatus::Ready).await;

        let gate = fake.block_fetches();
        let handle = view.handle();
        let pending = tokio::spawn(async move { handle.refresh().await });
        settle(&view, |s| s.refreshing).await;

        assert_eq!(view.refresh().await, Ok(RefreshOutcome::Skipped));
        gate.notify_one();
        assert_eq!(
            pending.await.unwrap(),
            Ok(RefreshOutcome::Refreshed { count: 0 })
        );
        settle(&view, |s| !s.refreshing).await;
    }

    #[tokio::test]
    async fn failed_refresh_keeps_loaded_list() {
        let fake = FakeBackend::new();
        fake.set_rows(vec![report(1, "me", day(1))]);
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);
        settle(&view, |s| s.status == ListStatus::Ready).await;

        fake.fail_fetches(Some(ReportError::Fetch("offline".into())));
        assert!(view.refresh().await.is_err());
        let snap = view.snapshot();
        assert_eq!(snap.status, ListStatus::Ready);
        assert_eq!(ids(&snap), ["1"]);
    }

    #[tokio::test]
    async fn subscription_failure_still_shows_list() {
        let fake = FakeBackend::new();
        *fake.subscribe_error.lock().unwrap() = Some(ReportError::Fetch("socket".into()));
        fake.set_rows(vec![report(1, "me", day(1))]);
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);

        let snap = settle(&view, |s| s.status == ListStatus::Ready).await;
        assert!(!snap.live);
        assert_eq!(ids(&snap), ["1"]);
    }

    #[tokio::test]
    async fn unmount_during_fetch_drops_late_writes() {
        let fake = FakeBackend::new();
        fake.set_rows(vec![report(1, "me", day(1))]);
        let gate = fake.block_fetches();
        let view = ReportListView::mount(&fake.services(), signed_in("me"), ListMode::CurrentUser);

        fake.fetch_started.notified().await;
        let handle = view.handle();
        let revision = handle.revision();
        view.unmount();
        assert!(!handle.is_mounted());

        gate.notify_one();
        fake.emit(ChangeEvent::Insert(report(2, "me", day(2))));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.revision(), revision);
        assert_eq!(handle.snapshot().status, ListStatus::Loading);
        assert_eq!(fake.open_subscriptions(), 0);
        assert_eq!(handle.refresh().await, Ok(RefreshOutcome::Skipped));
    }
}
