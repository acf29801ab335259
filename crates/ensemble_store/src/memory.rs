//! In-memory hierarchical store for testing.

use crate::client::{Completion, StoreClient};
use crate::error::{ErrorCode, StoreError, StoreResult};
use crate::op::{Op, OpResult, ANY_VERSION};
use crate::path::{self, node_name, validate_path, ROOT};
use crate::types::{Acl, CreateMode, Id, Perms, Stat};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Name given to every session's I/O thread.
pub const IO_THREAD_NAME: &str = "ensemble-memory-io";

/// When an injected fault fires relative to applying the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultTiming {
    /// The request never reaches the tree.
    BeforeApply,
    /// The request is applied, then the client sees the fault.
    AfterApply,
}

/// A fault injected into the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    /// Code reported to the client.
    pub code: ErrorCode,
    /// When the fault fires.
    pub timing: FaultTiming,
}

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    acl: Vec<Acl>,
    stat: Stat,
    mode: CreateMode,
    children: BTreeSet<String>,
    had_children: bool,
}

#[derive(Debug, Clone)]
struct SessionCtx {
    session_id: i64,
    ids: Vec<Id>,
}

impl SessionCtx {
    fn permits(&self, acl: &[Acl], perm: Perms) -> bool {
        acl.iter().any(|entry| {
            entry.perms.contains(perm)
                && (entry.id.is_anyone() || self.ids.iter().any(|id| *id == entry.id))
        })
    }
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: HashMap<String, Node>,
    zxid: i64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT.to_string(),
            Node {
                data: Vec::new(),
                acl: Acl::open_unsafe(),
                stat: Stat::default(),
                mode: CreateMode::Persistent,
                children: BTreeSet::new(),
                had_children: false,
            },
        );
        Self { nodes, zxid: 0 }
    }

    fn apply(&mut self, op: &Op, session: &SessionCtx, zxid: i64) -> Result<OpResult, ErrorCode> {
        validate_path(op.path()).map_err(|e| e.code())?;
        match op {
            Op::Create {
                path,
                data,
                acl,
                mode,
            } => self.create(path, data, acl, *mode, session, zxid),
            Op::CreateContainer { path, data, acl } => {
                self.create(path, data, acl, CreateMode::Container, session, zxid)
            }
            Op::Delete { path, version } => self.delete(path, *version, session, false),
            Op::DeleteContainer { path } => self.delete(path, ANY_VERSION, session, true),
            Op::SetData {
                path,
                data,
                version,
            } => self.set_data(path, data, *version, session, zxid),
            Op::Check { path, version } => {
                let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
                check_version(*version, node.stat.version)?;
                Ok(OpResult::Check)
            }
        }
    }

    fn create(
        &mut self,
        path: &str,
        data: &[u8],
        acl: &[Acl],
        mode: CreateMode,
        session: &SessionCtx,
        zxid: i64,
    ) -> Result<OpResult, ErrorCode> {
        let parent_path = path::parent(path).ok_or(ErrorCode::NodeExists)?;
        let parent = self.nodes.get(parent_path).ok_or(ErrorCode::NoNode)?;
        // The ACL check precedes the existence check, as on a real server.
        if !session.permits(&parent.acl, Perms::CREATE) {
            return Err(ErrorCode::NoAuth);
        }
        if acl.is_empty() {
            return Err(ErrorCode::InvalidAcl);
        }
        if parent.mode.is_ephemeral() {
            return Err(ErrorCode::NoChildrenForEphemerals);
        }

        let actual_path = if mode.is_sequential() {
            format!("{path}{:010}", parent.stat.cversion)
        } else {
            path.to_string()
        };
        if self.nodes.contains_key(&actual_path) {
            return Err(ErrorCode::NodeExists);
        }

        let stat = Stat {
            czxid: zxid,
            mzxid: zxid,
            version: 0,
            cversion: 0,
            aversion: 0,
            ephemeral_owner: if mode.is_ephemeral() {
                session.session_id
            } else {
                0
            },
            data_length: data.len() as i32,
            num_children: 0,
        };

        if let Some(parent) = self.nodes.get_mut(parent_path) {
            parent.children.insert(node_name(&actual_path).to_string());
            parent.stat.cversion += 1;
            parent.stat.num_children = parent.children.len() as i32;
            parent.had_children = true;
        }
        self.nodes.insert(
            actual_path.clone(),
            Node {
                data: data.to_vec(),
                acl: acl.to_vec(),
                stat,
                mode,
                children: BTreeSet::new(),
                had_children: false,
            },
        );

        Ok(OpResult::Create {
            path: actual_path,
            stat: Some(stat),
        })
    }

    fn delete(
        &mut self,
        path: &str,
        version: i32,
        session: &SessionCtx,
        container_only: bool,
    ) -> Result<OpResult, ErrorCode> {
        let parent_path = path::parent(path).ok_or(ErrorCode::BadArguments)?;
        let parent = self.nodes.get(parent_path).ok_or(ErrorCode::NoNode)?;
        if !container_only && !session.permits(&parent.acl, Perms::DELETE) {
            return Err(ErrorCode::NoAuth);
        }
        let node = self.nodes.get(path).ok_or(ErrorCode::NoNode)?;
        if container_only && !node.mode.is_container() {
            return Err(ErrorCode::BadArguments);
        }
        check_version(version, node.stat.version)?;
        if !node.children.is_empty() {
            return Err(ErrorCode::NotEmpty);
        }

        self.remove_node(path);
        Ok(OpResult::Delete)
    }

    fn set_data(
        &mut self,
        path: &str,
        data: &[u8],
        version: i32,
        session: &SessionCtx,
        zxid: i64,
    ) -> Result<OpResult, ErrorCode> {
        let node = self.nodes.get_mut(path).ok_or(ErrorCode::NoNode)?;
        if !session.permits(&node.acl, Perms::WRITE) {
            return Err(ErrorCode::NoAuth);
        }
        check_version(version, node.stat.version)?;

        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.mzxid = zxid;
        node.stat.data_length = data.len() as i32;
        Ok(OpResult::SetData { stat: node.stat })
    }

    fn remove_node(&mut self, path: &str) {
        self.nodes.remove(path);
        if let Some(parent) = path::parent(path).and_then(|p| self.nodes.get_mut(p)) {
            parent.children.remove(node_name(path));
            parent.stat.cversion += 1;
            parent.stat.num_children = parent.children.len() as i32;
        }
    }

    fn remove_ephemerals(&mut self, session_id: i64) -> usize {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.stat.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &owned {
            self.remove_node(path);
        }
        owned.len()
    }
}

fn check_version(expected: i32, actual: i32) -> Result<(), ErrorCode> {
    if expected != ANY_VERSION && expected != actual {
        return Err(ErrorCode::BadVersion);
    }
    Ok(())
}

#[derive(Debug)]
struct State {
    tree: Tree,
    faults: VecDeque<Fault>,
    expired: HashSet<i64>,
    requests: u64,
    mutations: u64,
    multi_commits: u64,
}

impl State {
    fn check_session(&self, session: &SessionCtx) -> StoreResult<()> {
        if self.expired.contains(&session.session_id) {
            return Err(StoreError::code_only(ErrorCode::SessionExpired));
        }
        Ok(())
    }

    fn execute_single(&mut self, op: &Op, session: &SessionCtx) -> StoreResult<OpResult> {
        self.requests += 1;
        self.check_session(session)?;
        let fault = self.faults.pop_front();
        if let Some(Fault {
            code,
            timing: FaultTiming::BeforeApply,
        }) = fault
        {
            return Err(StoreError::code_only(code));
        }

        let zxid = self.tree.zxid + 1;
        let result = self
            .tree
            .apply(op, session, zxid)
            .map_err(|code| StoreError::keeper(code, op.path()));
        if result.is_ok() && op.is_mutation() {
            self.tree.zxid = zxid;
            self.mutations += 1;
        }

        match fault {
            Some(fault) => Err(StoreError::code_only(fault.code)),
            None => result,
        }
    }

    fn execute_multi(&mut self, ops: &[Op], session: &SessionCtx) -> StoreResult<Vec<OpResult>> {
        self.requests += 1;
        self.check_session(session)?;
        let fault = self.faults.pop_front();
        if let Some(Fault {
            code,
            timing: FaultTiming::BeforeApply,
        }) = fault
        {
            return Err(StoreError::code_only(code));
        }

        let result = self.apply_multi(ops, session);
        match fault {
            Some(fault) => Err(StoreError::code_only(fault.code)),
            None => result,
        }
    }

    fn apply_multi(&mut self, ops: &[Op], session: &SessionCtx) -> StoreResult<Vec<OpResult>> {
        let zxid = self.tree.zxid + 1;
        let mut scratch = self.tree.clone();
        let mut results = Vec::with_capacity(ops.len());

        for (index, op) in ops.iter().enumerate() {
            match scratch.apply(op, session, zxid) {
                Ok(result) => results.push(result),
                Err(code) => {
                    let results = (0..ops.len())
                        .map(|i| OpResult::Error {
                            code: if i == index {
                                code
                            } else {
                                ErrorCode::RuntimeInconsistency
                            },
                        })
                        .collect();
                    return Err(StoreError::MultiAborted {
                        index,
                        code,
                        results,
                    });
                }
            }
        }

        scratch.zxid = zxid;
        self.tree = scratch;
        self.mutations += ops.iter().filter(|op| op.is_mutation()).count() as u64;
        self.multi_commits += 1;
        Ok(results)
    }
}

struct Shared {
    state: Mutex<State>,
    next_session: AtomicI64,
}

/// An in-memory hierarchical store.
///
/// This plays the role of the server ensemble: it owns the node tree and hands
/// out [`MemorySession`] clients. It is suitable for:
/// - Unit and integration tests of the coordination layer
/// - Fault injection (connection loss before or after a request is applied)
///
/// Cloning the handle shares the same tree.
///
/// # Example
///
/// ```rust
/// use ensemble_store::{Acl, CreateMode, InMemoryStore, Op, StoreClient};
///
/// let store = InMemoryStore::new();
/// let session = store.connect().unwrap();
/// session
///     .submit(&Op::Create {
///         path: "/app".into(),
///         data: b"v1".to_vec(),
///         acl: Acl::open_unsafe(),
///         mode: CreateMode::Persistent,
///     })
///     .unwrap();
/// assert!(store.exists("/app"));
/// ```
#[derive(Clone)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    /// Creates a store holding only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    tree: Tree::new(),
                    faults: VecDeque::new(),
                    expired: HashSet::new(),
                    requests: 0,
                    mutations: 0,
                    multi_commits: 0,
                }),
                next_session: AtomicI64::new(1),
            }),
        }
    }

    /// Opens an unauthenticated session.
    ///
    /// Fails only if the session's I/O thread cannot be spawned.
    pub fn connect(&self) -> io::Result<MemorySession> {
        self.connect_with_auth(Vec::new())
    }

    /// Opens a session authenticated as each of `ids`.
    pub fn connect_with_auth(&self, ids: Vec<Id>) -> io::Result<MemorySession> {
        let io = IoThread::spawn()?;
        let session_id = self.shared.next_session.fetch_add(1, Ordering::SeqCst);
        debug!(session_id, "opening in-memory session");
        Ok(MemorySession {
            store: self.clone(),
            ctx: SessionCtx { session_id, ids },
            closed: AtomicBool::new(false),
            io,
        })
    }

    /// Makes the next `times` requests fail with `code` before being applied.
    pub fn fail_next(&self, code: ErrorCode, times: usize) {
        self.push_faults(code, FaultTiming::BeforeApply, times);
    }

    /// Makes the next `times` requests report `code` after being applied.
    pub fn fail_next_after_apply(&self, code: ErrorCode, times: usize) {
        self.push_faults(code, FaultTiming::AfterApply, times);
    }

    fn push_faults(&self, code: ErrorCode, timing: FaultTiming, times: usize) {
        let mut state = self.shared.state.lock();
        for _ in 0..times {
            state.faults.push_back(Fault { code, timing });
        }
    }

    /// Returns the number of injected faults not yet consumed.
    pub fn pending_faults(&self) -> usize {
        self.shared.state.lock().faults.len()
    }

    /// Expires a session, removing its ephemeral nodes.
    pub fn expire_session(&self, session_id: i64) {
        let mut state = self.shared.state.lock();
        state.expired.insert(session_id);
        let removed = state.tree.remove_ephemerals(session_id);
        debug!(session_id, removed, "expired in-memory session");
    }

    /// Removes containers whose last child was removed, until none remain.
    ///
    /// Returns the number of containers removed.
    pub fn reap_containers(&self) -> usize {
        let mut state = self.shared.state.lock();
        let mut reaped = 0;
        loop {
            let candidates: Vec<String> = state
                .tree
                .nodes
                .iter()
                .filter(|(_, node)| {
                    node.mode.is_container() && node.had_children && node.children.is_empty()
                })
                .map(|(path, _)| path.clone())
                .collect();
            if candidates.is_empty() {
                return reaped;
            }
            for path in &candidates {
                state.tree.remove_node(path);
            }
            reaped += candidates.len();
        }
    }

    /// Returns true if `path` exists.
    pub fn exists(&self, path: &str) -> bool {
        self.shared.state.lock().tree.nodes.contains_key(path)
    }

    /// Returns the data stored at `path`.
    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.shared
            .state
            .lock()
            .tree
            .nodes
            .get(path)
            .map(|node| node.data.clone())
    }

    /// Returns the stat of `path`.
    pub fn stat(&self, path: &str) -> Option<Stat> {
        self.shared
            .state
            .lock()
            .tree
            .nodes
            .get(path)
            .map(|node| node.stat)
    }

    /// Returns the create mode of `path`.
    pub fn mode(&self, path: &str) -> Option<CreateMode> {
        self.shared
            .state
            .lock()
            .tree
            .nodes
            .get(path)
            .map(|node| node.mode)
    }

    /// Returns the number of nodes, root included.
    pub fn node_count(&self) -> usize {
        self.shared.state.lock().tree.nodes.len()
    }

    /// Returns the number of requests received from sessions.
    pub fn request_count(&self) -> u64 {
        self.shared.state.lock().requests
    }

    /// Returns the number of mutations applied to the tree.
    pub fn mutation_count(&self) -> u64 {
        self.shared.state.lock().mutations
    }

    /// Returns the number of multi-op batches committed.
    pub fn multi_commit_count(&self) -> u64 {
        self.shared.state.lock().multi_commits
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("nodes", &self.node_count())
            .finish()
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

/// The thread async completions are delivered on.
struct IoThread {
    sender: Mutex<Option<Sender<Task>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IoThread {
    fn spawn() -> io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Task>();
        let handle = thread::Builder::new()
            .name(IO_THREAD_NAME.to_string())
            .spawn(move || {
                while let Ok(task) = rx.recv() {
                    task();
                }
            })?;
        Ok(Self {
            sender: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    fn post(&self, task: Task) {
        let undelivered = match self.sender.lock().as_ref() {
            Some(tx) => tx.send(task).err().map(|e| e.0),
            None => Some(task),
        };
        // Completions fire exactly once, even after shutdown.
        if let Some(task) = undelivered {
            task();
        }
    }

    fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// A client session against an [`InMemoryStore`].
pub struct MemorySession {
    store: InMemoryStore,
    ctx: SessionCtx,
    closed: AtomicBool,
    io: IoThread,
}

impl MemorySession {
    /// Returns the store this session is connected to.
    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn read<T>(&self, path: &str, f: impl FnOnce(&Node) -> StoreResult<T>) -> StoreResult<T> {
        self.ensure_open()?;
        validate_path(path)?;
        let state = self.store.shared.state.lock();
        state.check_session(&self.ctx)?;
        let node = state
            .tree
            .nodes
            .get(path)
            .ok_or_else(|| StoreError::keeper(ErrorCode::NoNode, path))?;
        f(node)
    }
}

impl StoreClient for MemorySession {
    fn submit(&self, op: &Op) -> StoreResult<OpResult> {
        self.ensure_open()?;
        self.store.shared.state.lock().execute_single(op, &self.ctx)
    }

    fn submit_async(&self, op: Op, completion: Completion<OpResult>) {
        let result = self.submit(&op);
        self.io.post(Box::new(move || completion(result)));
    }

    fn multi(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>> {
        self.ensure_open()?;
        self.store.shared.state.lock().execute_multi(ops, &self.ctx)
    }

    fn multi_async(&self, ops: Vec<Op>, completion: Completion<Vec<OpResult>>) {
        let result = self.multi(&ops);
        self.io.post(Box::new(move || completion(result)));
    }

    fn exists(&self, path: &str) -> StoreResult<Option<Stat>> {
        self.ensure_open()?;
        validate_path(path)?;
        let state = self.store.shared.state.lock();
        state.check_session(&self.ctx)?;
        Ok(state.tree.nodes.get(path).map(|node| node.stat))
    }

    fn get_data(&self, path: &str) -> StoreResult<(Vec<u8>, Stat)> {
        self.read(path, |node| {
            if !self.ctx.permits(&node.acl, Perms::READ) {
                return Err(StoreError::keeper(ErrorCode::NoAuth, path));
            }
            Ok((node.data.clone(), node.stat))
        })
    }

    fn get_children(&self, path: &str) -> StoreResult<Vec<String>> {
        self.read(path, |node| {
            if !self.ctx.permits(&node.acl, Perms::READ) {
                return Err(StoreError::keeper(ErrorCode::NoAuth, path));
            }
            Ok(node.children.iter().cloned().collect())
        })
    }

    fn set_acl(&self, path: &str, acl: &[Acl], version: i32) -> StoreResult<Stat> {
        self.ensure_open()?;
        validate_path(path)?;
        if acl.is_empty() {
            return Err(StoreError::keeper(ErrorCode::InvalidAcl, path));
        }
        let mut state = self.store.shared.state.lock();
        state.check_session(&self.ctx)?;
        let zxid = state.tree.zxid + 1;
        let node = state
            .tree
            .nodes
            .get_mut(path)
            .ok_or_else(|| StoreError::keeper(ErrorCode::NoNode, path))?;
        if !self.ctx.permits(&node.acl, Perms::ADMIN) {
            return Err(StoreError::keeper(ErrorCode::NoAuth, path));
        }
        check_version(version, node.stat.aversion).map_err(|code| StoreError::keeper(code, path))?;
        node.acl = acl.to_vec();
        node.stat.aversion += 1;
        let stat = node.stat;
        state.tree.zxid = zxid;
        Ok(stat)
    }

    fn session_id(&self) -> i64 {
        self.ctx.session_id
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && !self
                .store
                .shared
                .state
                .lock()
                .expired
                .contains(&self.ctx.session_id)
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let removed = self
            .store
            .shared
            .state
            .lock()
            .tree
            .remove_ephemerals(self.ctx.session_id);
        debug!(session_id = self.ctx.session_id, removed, "closed in-memory session");
        Ok(())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let _ = self.close();
        self.io.shutdown();
    }
}
