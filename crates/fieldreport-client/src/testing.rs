//! In-memory stand-in for every remote collaborator, used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, Notify};

use fieldreport_net::{NetError, Subscription};
use fieldreport_shared::protocol::ChangeEvent;
use fieldreport_shared::types::{NewReport, Report, ReportId, Scope, UserId, UserProfile};
use fieldreport_shared::ReportError;

use crate::backend::{ChangeFeed, ObjectStore, ProfileStore, ReportStore, Services};
use crate::instructions::Completer;

pub(crate) fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
}

pub(crate) fn report(id: i64, owner: &str, created_at: DateTime<Utc>) -> Report {
    Report {
        id: ReportId::from(id),
        user_id: Some(UserId::new(owner)),
        category: "general".into(),
        description: format!("report {id}"),
        location: None,
        gps_location: None,
        image: None,
        responded: false,
        priority: None,
        created_at,
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap()
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    rows: Mutex<Vec<Report>>,
    profiles: Mutex<Vec<UserProfile>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,

    pub fetch_error: Mutex<Option<ReportError>>,
    pub insert_error: Mutex<Option<ReportError>>,
    pub upload_error: Mutex<Option<ReportError>>,
    pub subscribe_error: Mutex<Option<ReportError>>,
    pub completion: Mutex<Option<String>>,

    /// When set, every fetch waits for one `notify_one` on this gate.
    pub fetch_gate: Mutex<Option<Arc<Notify>>>,
    /// Signalled whenever a fetch starts.
    pub fetch_started: Notify,

    pub inserted: Mutex<Vec<NewReport>>,
    pub uploaded: Mutex<Vec<(String, usize, String)>>,

    fetches: AtomicUsize,
    lookups: AtomicUsize,
    subscribes: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        let fake = Self::default();
        fake.next_id.store(100, Ordering::SeqCst);
        Arc::new(fake)
    }

    pub fn services(self: &Arc<Self>) -> Services {
        Services {
            reports: self.clone(),
            profiles: self.clone(),
            objects: self.clone(),
            feed: self.clone(),
            completer: self.clone(),
        }
    }

    pub fn set_rows(&self, rows: Vec<Report>) {
        *lock(&self.rows) = rows;
    }

    pub fn add_profile(&self, id: &str, phone: &str) {
        lock(&self.profiles).push(UserProfile {
            id: UserId::new(id),
            phone: phone.to_string(),
            created_at: None,
        });
    }

    pub fn profiles(&self) -> Vec<UserProfile> {
        lock(&self.profiles).clone()
    }

    /// Push a change to every open subscription.
    pub fn emit(&self, event: ChangeEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn block_fetches(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.fetch_gate) = Some(gate.clone());
        gate
    }

    pub fn fail_fetches(&self, err: Option<ReportError>) {
        *lock(&self.fetch_error) = err;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn profile_lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn open_subscriptions(&self) -> usize {
        let mut subs = lock(&self.subscribers);
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }

    /// Number of calls that reached any remote collaborator.
    pub fn remote_calls(&self) -> usize {
        self.fetches()
            + self.profile_lookups()
            + self.subscribes()
            + lock(&self.inserted).len()
            + lock(&self.uploaded).len()
    }
}

#[async_trait]
impl ReportStore for FakeBackend {
    async fn fetch_reports(&self, scope: &Scope) -> Result<Vec<Report>, ReportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.fetch_started.notify_one();

        let gate = lock(&self.fetch_gate).clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(err) = lock(&self.fetch_error).clone() {
            return Err(err);
        }
        let mut rows: Vec<Report> = lock(&self.rows)
            .iter()
            .filter(|r| scope.contains(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn fetch_report(&self, id: &ReportId) -> Result<Option<Report>, ReportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.fetch_error).clone() {
            return Err(err);
        }
        Ok(lock(&self.rows).iter().find(|r| &r.id == id).cloned())
    }

    async fn insert_report(&self, new: &NewReport) -> Result<Report, ReportError> {
        lock(&self.inserted).push(new.clone());
        if let Some(err) = lock(&self.insert_error).clone() {
            return Err(err);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        let row = Report {
            id: ReportId::from(id),
            user_id: new.user_id.clone(),
            category: new.category.clone(),
            description: new.description.clone(),
            location: new.location.clone(),
            gps_location: new.gps_location.clone(),
            image: new.image.clone(),
            responded: new.responded,
            priority: None,
            created_at: Utc::now(),
        };
        lock(&self.rows).push(row.clone());
        Ok(row)
    }
}

#[async_trait]
impl ProfileStore for FakeBackend {
    async fn find_profile(&self, phone: &str) -> Result<Option<UserProfile>, ReportError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(lock(&self.profiles).iter().find(|p| p.phone == phone).cloned())
    }

    async fn find_or_create_profile(&self, phone: &str) -> Result<UserProfile, ReportError> {
        if let Some(found) = self.find_profile(phone).await? {
            return Ok(found);
        }
        let id = format!("user-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.add_profile(&id, phone);
        Ok(UserProfile {
            id: UserId::new(id),
            phone: phone.to_string(),
            created_at: None,
        })
    }
}

#[async_trait]
impl ObjectStore for FakeBackend {
    async fn upload(
        &self,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ReportError> {
        lock(&self.uploaded).push((name.to_string(), data.len(), content_type.to_string()));
        if let Some(err) = lock(&self.upload_error).clone() {
            return Err(err);
        }
        Ok(format!("https://cdn.test/storage/v1/object/public/reports/{name}"))
    }
}

#[async_trait]
impl ChangeFeed for FakeBackend {
    async fn subscribe(&self, _scope: &Scope) -> Result<Subscription, ReportError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.subscribe_error).clone() {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        Ok(Subscription::from_receiver(rx))
    }
}

#[async_trait]
impl Completer for FakeBackend {
    async fn complete(&self, _prompt: &str) -> Result<String, NetError> {
        lock(&self.completion)
            .clone()
            .ok_or_else(|| NetError::Decode("no completion configured".into()))
    }
}
