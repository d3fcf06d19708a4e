use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use mural_sched::{Scheduler, TaskHandle};
use parking_lot::RwLock;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::deleted;
use crate::error::{RegistryError, Result};
use crate::fake_id::FakeIdAllocator;
use crate::ids::{CanvasId, MuralIndex, RegistryId};
use crate::mural::{DisplayHost, Mural, MuralLoader};
use crate::options::RegistryOptions;
use crate::render::{RenderFrame, RenderPass, RenderStage, StageChain, StageId};

/// Outcome of one bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkLoadReport {
	/// Dispatch batches created.
	pub batches: usize,
	/// Murals loaded and registered.
	pub loaded: usize,
	/// Directories whose load failed and was skipped.
	pub failed: usize,
}

/// Both views of registered murals plus the deleted-id set.
///
/// Everything lives behind one lock so a reader can never observe the
/// index view and the canvas view mid-divergence.
#[derive(Default)]
struct Store {
	murals: HashMap<MuralIndex, Arc<dyn Mural>>,
	by_canvas: HashMap<CanvasId, MuralIndex>,
	deleted: HashSet<CanvasId>,
}

/// The authoritative mapping from murals to canvas identities.
///
/// Mutating operations (`register`, `delete`, bulk-load clearing, deleted-set
/// persistence) are serialized through one async critical section per
/// instance; lookups read the backing store concurrently. All counters are
/// instance fields, so independent registries coexist without interference.
pub struct MuralRegistry {
	id: RegistryId,
	options: RegistryOptions,
	sched: Scheduler,
	host: Arc<dyn DisplayHost>,
	loader: Arc<dyn MuralLoader>,
	store: RwLock<Store>,
	op_lock: AsyncMutex<()>,
	index_counter: AtomicU32,
	fake_ids: FakeIdAllocator,
	ticks: Arc<AtomicU64>,
	tick_task: TaskHandle,
	stages: StageChain,
}

impl MuralRegistry {
	/// Creates a registry and starts its animation tick task.
	pub fn new(options: RegistryOptions, sched: Scheduler, host: Arc<dyn DisplayHost>, loader: Arc<dyn MuralLoader>) -> Arc<Self> {
		let ticks = Arc::new(AtomicU64::new(0));
		let counter = Arc::clone(&ticks);
		let tick_task = sched.run_on_worker_every(Duration::ZERO, options.tick_period, move || {
			counter.fetch_add(1, Ordering::AcqRel);
		});
		let id = RegistryId::new();
		tracing::debug!(registry = %id, dir = %options.data_dir.display(), "registry.open");
		Arc::new(Self {
			id,
			options,
			sched,
			host,
			loader,
			store: RwLock::new(Store::default()),
			op_lock: AsyncMutex::new(()),
			index_counter: AtomicU32::new(0),
			fake_ids: FakeIdAllocator::new(),
			ticks,
			tick_task,
			stages: StageChain::new(),
		})
	}

	/// Identity of this registry instance.
	pub fn id(&self) -> RegistryId {
		self.id
	}

	/// Scheduler this registry coordinates through.
	pub fn scheduler(&self) -> &Scheduler {
		&self.sched
	}

	/// Options this registry was opened with.
	pub fn options(&self) -> &RegistryOptions {
		&self.options
	}

	/// Current animation tick.
	pub fn animation_tick(&self) -> u64 {
		self.ticks.load(Ordering::Acquire)
	}

	/// Allocates the next synthetic canvas id.
	pub fn next_fake_id(&self) -> CanvasId {
		self.fake_ids.allocate()
	}

	/// Registers a mural, assigning an index when it carries none.
	///
	/// Fails before any mutation on ownership or name validation. When the
	/// mural's own persistence fails, the just-inserted entries are removed
	/// again and the failure is re-raised: the registry ends up exactly as
	/// before the call.
	pub async fn register(&self, mural: Arc<dyn Mural>) -> Result<()> {
		let _op = self.op_lock.lock().await;

		if mural.registry_id() != self.id {
			return Err(RegistryError::OwnershipMismatch);
		}
		if self.by_owner_and_name(mural.owner(), mural.name()).is_some() {
			return Err(RegistryError::DuplicateName {
				owner: mural.owner(),
				name: mural.name().to_owned(),
			});
		}

		let index = match mural.index() {
			None => {
				let index = MuralIndex(self.index_counter.fetch_add(1, Ordering::AcqRel));
				mural.bind_index(index);
				index
			}
			Some(index) => {
				// Restoring a persisted index: the counter stays strictly ahead.
				self.index_counter.fetch_max(index.0 + 1, Ordering::AcqRel);
				index
			}
		};

		let canvases = mural.canvases();
		{
			let mut store = self.store.write();
			store.murals.insert(index, Arc::clone(&mural));
			for canvas in &canvases {
				store.by_canvas.insert(*canvas, index);
			}
		}

		if let Err(err) = mural.save().await {
			let mut store = self.store.write();
			store.murals.remove(&index);
			for canvas in &canvases {
				store.by_canvas.remove(canvas);
			}
			return Err(RegistryError::Persist(err));
		}

		tracing::debug!(registry = %self.id, index = index.0, owner = %mural.owner(), name = mural.name(), "registry.register");
		Ok(())
	}

	/// Looks up a mural by its index.
	pub fn by_index(&self, index: MuralIndex) -> Option<Arc<dyn Mural>> {
		self.store.read().murals.get(&index).cloned()
	}

	/// Returns whether an index is registered.
	pub fn has_index(&self, index: MuralIndex) -> bool {
		self.store.read().murals.contains_key(&index)
	}

	/// Looks up the mural owning a canvas.
	pub fn by_canvas(&self, id: CanvasId) -> Option<Arc<dyn Mural>> {
		let store = self.store.read();
		store.by_canvas.get(&id).and_then(|index| store.murals.get(index)).cloned()
	}

	/// All murals created by `owner`.
	pub fn by_owner(&self, owner: Uuid) -> Vec<Arc<dyn Mural>> {
		self.store
			.read()
			.murals
			.values()
			.filter(|mural| mural.owner() == owner)
			.cloned()
			.collect()
	}

	/// The mural of `owner` named `name`, compared case-insensitively.
	pub fn by_owner_and_name(&self, owner: Uuid, name: &str) -> Option<Arc<dyn Mural>> {
		let wanted = name.to_lowercase();
		self.store
			.read()
			.murals
			.values()
			.find(|mural| mural.owner() == owner && mural.name().to_lowercase() == wanted)
			.cloned()
	}

	/// Every distinct owner with at least one registered mural.
	pub fn owners(&self) -> Vec<Uuid> {
		let store = self.store.read();
		let owners: HashSet<Uuid> = store.murals.values().map(|mural| mural.owner()).collect();
		owners.into_iter().collect()
	}

	/// Every registered mural.
	pub fn all(&self) -> Vec<Arc<dyn Mural>> {
		self.store.read().murals.values().cloned().collect()
	}

	/// Number of registered murals.
	pub fn len(&self) -> usize {
		self.store.read().murals.len()
	}

	/// Returns whether no murals are registered.
	pub fn is_empty(&self) -> bool {
		self.store.read().murals.is_empty()
	}

	/// Returns whether a canvas belongs to a deleted mural.
	pub fn is_deleted(&self, id: CanvasId) -> bool {
		self.store.read().deleted.contains(&id)
	}

	/// Returns whether a stale reference to `id` should be neutralized.
	pub fn should_neutralize(&self, id: CanvasId) -> bool {
		self.is_deleted(id) && !self.options.exempt_deleted.iter().any(|range| range.contains(&id.0))
	}

	/// Deletes the mural at `index`. Returns `false` when absent, with no
	/// state change.
	pub async fn delete(&self, index: MuralIndex) -> bool {
		let _op = self.op_lock.lock().await;

		let removed = {
			let mut store = self.store.write();
			match store.murals.remove(&index) {
				None => None,
				Some(mural) => {
					let canvases = mural.canvases();
					for canvas in &canvases {
						store.by_canvas.remove(canvas);
					}
					if mural.track_deleted_canvases() {
						store.deleted.extend(canvases.iter().copied());
					}
					Some((mural, canvases))
				}
			}
		};
		let Some((mural, canvases)) = removed else {
			return false;
		};

		mural.invalidate();
		mural.stop();

		let dir = self.options.data_dir.join(index.to_string());
		if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
			if err.kind() != ErrorKind::NotFound {
				tracing::error!(path = %dir.display(), %err, "registry.delete.remove_dir_failed");
			}
		}

		if mural.track_deleted_canvases() {
			self.save_deleted().await;
		}

		// Canvases still hanging in the world must not keep showing stale
		// content; give every renderer-less one the retired placeholder.
		let host = Arc::clone(&self.host);
		self.sched.run_on_main(move |token| {
			for canvas in canvases {
				if !host.canvas_has_renderer(token, canvas) {
					host.attach_retired_renderer(token, canvas);
				}
			}
		});

		tracing::debug!(registry = %self.id, index = index.0, "registry.delete");
		true
	}

	/// Reloads every mural from disk.
	///
	/// Clears all in-memory state, restores the deleted-id set (migrating the
	/// legacy format when present), then loads per-mural directories in
	/// deterministic order, dispatched in batches. Batches do not gate each
	/// other; the report only returns once every individual load has
	/// finished. A failing load is logged and skipped, never aborting its
	/// siblings.
	///
	/// Overlapping bulk loads on the same registry race on the clearing step;
	/// callers serialize.
	pub async fn bulk_load(self: &Arc<Self>) -> BulkLoadReport {
		{
			let _op = self.op_lock.lock().await;
			{
				let mut store = self.store.write();
				store.murals.clear();
				store.by_canvas.clear();
				store.deleted.clear();
			}
			let restored = deleted::load(&self.options.data_dir).await;
			self.store.write().deleted.extend(restored);
		}

		if let Err(err) = tokio::fs::create_dir_all(&self.options.data_dir).await {
			tracing::error!(dir = %self.options.data_dir.display(), %err, "registry.load.data_dir_failed");
			return BulkLoadReport::default();
		}

		let mut dirs = Vec::new();
		match tokio::fs::read_dir(&self.options.data_dir).await {
			Ok(mut entries) => loop {
				match entries.next_entry().await {
					Ok(Some(entry)) => {
						let is_dir = entry.file_type().await.map(|kind| kind.is_dir()).unwrap_or(false);
						if is_dir {
							dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
						}
					}
					Ok(None) => break,
					Err(err) => {
						tracing::error!(dir = %self.options.data_dir.display(), %err, "registry.load.enumerate_failed");
						break;
					}
				}
			},
			Err(err) => {
				tracing::error!(dir = %self.options.data_dir.display(), %err, "registry.load.enumerate_failed");
				return BulkLoadReport::default();
			}
		}
		dirs.sort_by(|a, b| compare_entry_names(&a.0, &b.0));

		let batch_size = self.options.load_batch_size.max(1);
		let mut batches = 0usize;
		let mut batch_joins = Vec::new();
		for chunk in dirs.chunks(batch_size) {
			batches += 1;
			let mut joins = Vec::with_capacity(chunk.len());
			for (_, path) in chunk {
				let registry = Arc::clone(self);
				let loader = Arc::clone(&self.loader);
				let path = path.clone();
				joins.push(self.sched.spawn(async move {
					match loader.load(Arc::clone(&registry), path.clone()).await {
						Ok(mural) => match registry.register(mural).await {
							Ok(()) => true,
							Err(err) => {
								tracing::warn!(path = %path.display(), %err, "registry.load.failed");
								false
							}
						},
						Err(err) => {
							tracing::warn!(path = %path.display(), %err, "registry.load.failed");
							false
						}
					}
				}));
			}
			tracing::debug!(registry = %self.id, batch = batches, size = chunk.len(), "registry.load.batch_dispatched");
			batch_joins.push(joins);
		}

		let mut loaded = 0usize;
		let mut failed = 0usize;
		for joins in batch_joins {
			for join in joins {
				match join.await {
					Ok(true) => loaded += 1,
					_ => failed += 1,
				}
			}
		}

		tracing::info!(registry = %self.id, loaded, failed, batches, "registry.load.complete");
		BulkLoadReport { batches, loaded, failed }
	}

	/// Checks candidate canvas ids off-thread and neutralizes live stale
	/// references to deleted, non-exempt canvases on the authoritative
	/// context.
	pub fn sweep_stale(self: &Arc<Self>, candidates: Vec<CanvasId>) {
		let registry = Arc::clone(self);
		self.sched.run_on_worker(move || {
			let stale: Vec<CanvasId> = candidates.into_iter().filter(|id| registry.should_neutralize(*id)).collect();
			if stale.is_empty() {
				return;
			}
			let host = Arc::clone(&registry.host);
			registry.sched.run_on_main(move |token| {
				for id in stale {
					host.neutralize_stale(token, id);
				}
			});
		});
	}

	/// Appends a render stage to the end of the chain.
	pub fn append_render_stage(&self, stage: Arc<dyn RenderStage>) -> StageId {
		self.stages.insert(false, stage)
	}

	/// Prepends a render stage to the front of the chain.
	pub fn prepend_render_stage(&self, stage: Arc<dyn RenderStage>) -> StageId {
		self.stages.insert(true, stage)
	}

	/// Removes a render stage. Returns whether it was present.
	pub fn remove_render_stage(&self, id: StageId) -> bool {
		self.stages.remove(id)
	}

	/// Folds `frame` through the render stage chain for one viewer.
	pub fn dispatch_render(&self, mural: &Arc<dyn Mural>, canvas: CanvasId, viewer: Uuid, frame: RenderFrame) -> RenderFrame {
		let pass = RenderPass {
			registry: self,
			mural,
			canvas,
			viewer,
		};
		self.stages.run(&pass, frame)
	}

	/// Flushes the deleted-id set and stops the tick task.
	///
	/// Does not await in-flight loads or saves; callers must not close a
	/// registry with a bulk load in progress.
	pub async fn close(&self) {
		let _op = self.op_lock.lock().await;
		self.save_deleted().await;
		self.tick_task.cancel();
		tracing::debug!(registry = %self.id, "registry.close");
	}

	async fn save_deleted(&self) {
		let snapshot = self.store.read().deleted.clone();
		if let Err(err) = deleted::save(&self.options.data_dir, &snapshot).await {
			tracing::error!(dir = %self.options.data_dir.display(), %err, "registry.deleted.save_failed");
		}
	}

	#[cfg(test)]
	fn assert_consistent(&self) {
		let store = self.store.read();
		for (canvas, index) in &store.by_canvas {
			let mural = store.murals.get(index).expect("canvas entry without a registered mural");
			assert!(mural.canvases().contains(canvas), "canvas view points at a mural that no longer owns it");
		}
		for (index, mural) in &store.murals {
			for canvas in mural.canvases() {
				assert_eq!(store.by_canvas.get(&canvas), Some(index), "mural canvas missing from the canvas view");
			}
		}
	}
}

impl Drop for MuralRegistry {
	fn drop(&mut self) {
		self.tick_task.cancel();
	}
}

/// Deterministic load order: numeric directory names sort numerically and
/// come first; anything else sorts lexicographically after them.
fn compare_entry_names(a: &str, b: &str) -> CmpOrdering {
	match (a.parse::<u64>(), b.parse::<u64>()) {
		(Ok(x), Ok(y)) => x.cmp(&y),
		(Ok(_), Err(_)) => CmpOrdering::Less,
		(Err(_), Ok(_)) => CmpOrdering::Greater,
		(Err(_), Err(_)) => a.cmp(b),
	}
}

#[cfg(test)]
mod tests {
	use std::path::PathBuf;
	use std::sync::atomic::AtomicBool;

	use async_trait::async_trait;
	use parking_lot::Mutex;
	use tempfile::TempDir;

	use super::*;
	use crate::render::{CursorMark, retired_frame};

	struct TestMural {
		registry_id: RegistryId,
		owner: Uuid,
		name: String,
		index: Mutex<Option<MuralIndex>>,
		canvases: Vec<CanvasId>,
		fail_save: bool,
		track: bool,
		invalidated: AtomicBool,
		stopped: AtomicBool,
	}

	impl TestMural {
		fn new(registry: &MuralRegistry, owner: Uuid, name: &str, canvases: Vec<i32>) -> Arc<Self> {
			Arc::new(Self {
				registry_id: registry.id(),
				owner,
				name: name.to_owned(),
				index: Mutex::new(None),
				canvases: canvases.into_iter().map(CanvasId).collect(),
				fail_save: false,
				track: true,
				invalidated: AtomicBool::new(false),
				stopped: AtomicBool::new(false),
			})
		}

		fn with_index(self: Arc<Self>, index: u32) -> Arc<Self> {
			*self.index.lock() = Some(MuralIndex(index));
			self
		}
	}

	#[async_trait]
	impl Mural for TestMural {
		fn registry_id(&self) -> RegistryId {
			self.registry_id
		}

		fn owner(&self) -> Uuid {
			self.owner
		}

		fn name(&self) -> &str {
			&self.name
		}

		fn index(&self) -> Option<MuralIndex> {
			*self.index.lock()
		}

		fn bind_index(&self, index: MuralIndex) {
			*self.index.lock() = Some(index);
		}

		fn canvases(&self) -> Vec<CanvasId> {
			self.canvases.clone()
		}

		fn track_deleted_canvases(&self) -> bool {
			self.track
		}

		async fn save(&self) -> anyhow::Result<()> {
			if self.fail_save {
				anyhow::bail!("disk full");
			}
			Ok(())
		}

		fn invalidate(&self) {
			self.invalidated.store(true, Ordering::SeqCst);
		}

		fn stop(&self) {
			self.stopped.store(true, Ordering::SeqCst);
		}
	}

	#[derive(Default)]
	struct TestHost {
		with_renderer: Mutex<HashSet<CanvasId>>,
		retired: Mutex<Vec<CanvasId>>,
		neutralized: Mutex<Vec<CanvasId>>,
	}

	impl DisplayHost for TestHost {
		fn canvas_has_renderer(&self, _token: &mural_sched::MainToken, id: CanvasId) -> bool {
			self.with_renderer.lock().contains(&id)
		}

		fn attach_retired_renderer(&self, _token: &mural_sched::MainToken, id: CanvasId) {
			self.retired.lock().push(id);
		}

		fn neutralize_stale(&self, _token: &mural_sched::MainToken, id: CanvasId) {
			self.neutralized.lock().push(id);
		}
	}

	/// Loads a `TestMural` whose index, name and canvas ids derive from the
	/// directory name; names in `fail` refuse to load.
	struct TestLoader {
		owner: Uuid,
		fail: HashSet<String>,
	}

	#[async_trait]
	impl MuralLoader for TestLoader {
		async fn load(&self, registry: Arc<MuralRegistry>, dir: PathBuf) -> anyhow::Result<Arc<dyn Mural>> {
			let name = dir.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();
			if self.fail.contains(&name) {
				anyhow::bail!("corrupt mural data");
			}
			let index: u32 = name.parse()?;
			let mural = TestMural::new(&registry, self.owner, &format!("m{index}"), vec![index as i32]).with_index(index);
			Ok(mural as Arc<dyn Mural>)
		}
	}

	struct Fixture {
		registry: Arc<MuralRegistry>,
		host: Arc<TestHost>,
		_dir: TempDir,
	}

	fn fixture() -> Fixture {
		fixture_with(HashSet::new(), |options| options)
	}

	fn fixture_with(fail: HashSet<String>, tune: impl FnOnce(RegistryOptions) -> RegistryOptions) -> Fixture {
		let dir = TempDir::new().expect("tempdir");
		let host = Arc::new(TestHost::default());
		let loader = Arc::new(TestLoader {
			owner: Uuid::new_v4(),
			fail,
		});
		let options = tune(RegistryOptions::new(dir.path()));
		let registry = MuralRegistry::new(options, Scheduler::new("registry-test"), Arc::clone(&host) as Arc<dyn DisplayHost>, loader);
		Fixture {
			registry,
			host,
			_dir: dir,
		}
	}

	#[tokio::test]
	async fn register_and_delete_keep_both_views_consistent() {
		let Fixture { registry, _dir, .. } = fixture();
		let owner = Uuid::new_v4();

		for step in 0..6u32 {
			let mural = TestMural::new(&registry, owner, &format!("piece-{step}"), vec![step as i32 * 3, step as i32 * 3 + 1]);
			registry.register(mural as Arc<dyn Mural>).await.expect("register failed");
			registry.assert_consistent();
		}
		assert_eq!(registry.len(), 6);

		for index in [1u32, 3, 5] {
			assert!(registry.delete(MuralIndex(index)).await);
			registry.assert_consistent();
		}
		assert_eq!(registry.len(), 3);
		assert!(registry.by_canvas(CanvasId(3)).is_none());
		assert!(registry.by_canvas(CanvasId(0)).is_some());
	}

	#[tokio::test]
	async fn register_assigns_monotone_indices_and_respects_restored_ones() {
		let Fixture { registry, _dir, .. } = fixture();
		let owner = Uuid::new_v4();

		let first = TestMural::new(&registry, owner, "first", vec![1]);
		registry.register(Arc::clone(&first) as Arc<dyn Mural>).await.expect("register failed");
		assert_eq!(first.index(), Some(MuralIndex(0)));

		let restored = TestMural::new(&registry, owner, "restored", vec![2]).with_index(7);
		registry.register(restored as Arc<dyn Mural>).await.expect("register failed");

		let next = TestMural::new(&registry, owner, "next", vec![3]);
		registry.register(Arc::clone(&next) as Arc<dyn Mural>).await.expect("register failed");
		assert_eq!(next.index(), Some(MuralIndex(8)), "counter must advance past a restored index");
	}

	#[tokio::test]
	async fn register_rejects_foreign_and_duplicate_murals() {
		let Fixture { registry, _dir, .. } = fixture();
		let other = fixture();
		let owner = Uuid::new_v4();

		let foreign = TestMural::new(&other.registry, owner, "foreign", vec![1]);
		assert!(matches!(
			registry.register(foreign as Arc<dyn Mural>).await,
			Err(RegistryError::OwnershipMismatch)
		));

		registry
			.register(TestMural::new(&registry, owner, "Sunset", vec![2]) as Arc<dyn Mural>)
			.await
			.expect("register failed");
		let duplicate = registry.register(TestMural::new(&registry, owner, "sUnSeT", vec![3]) as Arc<dyn Mural>).await;
		assert!(matches!(duplicate, Err(RegistryError::DuplicateName { .. })), "names collide case-insensitively");

		// Same name under another owner is fine.
		registry
			.register(TestMural::new(&registry, Uuid::new_v4(), "sunset", vec![4]) as Arc<dyn Mural>)
			.await
			.expect("register failed");
		assert_eq!(registry.len(), 2);
	}

	#[tokio::test]
	async fn failed_persistence_rolls_back_the_insertion() {
		let Fixture { registry, _dir, .. } = fixture();
		let owner = Uuid::new_v4();

		let mural = Arc::new(TestMural {
			registry_id: registry.id(),
			owner,
			name: "doomed".to_owned(),
			index: Mutex::new(None),
			canvases: vec![CanvasId(11), CanvasId(12)],
			fail_save: true,
			track: true,
			invalidated: AtomicBool::new(false),
			stopped: AtomicBool::new(false),
		});

		let outcome = registry.register(mural as Arc<dyn Mural>).await;
		assert!(matches!(outcome, Err(RegistryError::Persist(_))));
		assert_eq!(registry.len(), 0);
		assert!(registry.by_canvas(CanvasId(11)).is_none());
		registry.assert_consistent();

		// The failed index is not reissued.
		let next = TestMural::new(&registry, owner, "survivor", vec![13]);
		registry.register(Arc::clone(&next) as Arc<dyn Mural>).await.expect("register failed");
		assert_eq!(next.index(), Some(MuralIndex(1)));
	}

	#[tokio::test]
	async fn delete_of_missing_index_changes_nothing() {
		let Fixture { registry, _dir, .. } = fixture();
		registry
			.register(TestMural::new(&registry, Uuid::new_v4(), "only", vec![5]) as Arc<dyn Mural>)
			.await
			.expect("register failed");

		assert!(!registry.delete(MuralIndex(42)).await);
		assert_eq!(registry.len(), 1);
		registry.assert_consistent();
	}

	#[tokio::test]
	async fn delete_retires_canvases_and_attaches_placeholders() {
		let Fixture { registry, host, _dir, .. } = fixture();
		let owner = Uuid::new_v4();

		let mural = TestMural::new(&registry, owner, "mona", vec![21, 22]);
		registry.register(Arc::clone(&mural) as Arc<dyn Mural>).await.expect("register failed");
		host.with_renderer.lock().insert(CanvasId(22));

		let index = mural.index().expect("index assigned");
		let dir = registry.options().data_dir().join(index.to_string());
		tokio::fs::create_dir_all(&dir).await.expect("create mural dir");

		assert!(registry.delete(index).await);
		assert!(mural.invalidated.load(Ordering::SeqCst));
		assert!(mural.stopped.load(Ordering::SeqCst));
		assert!(registry.is_deleted(CanvasId(21)));
		assert!(registry.is_deleted(CanvasId(22)));
		assert!(!dir.exists(), "per-mural directory must be removed");

		// The deleted set is flushed as part of the delete.
		let restored = crate::deleted::load(registry.options().data_dir()).await;
		assert!(restored.contains(&CanvasId(21)));

		// Placeholder attachment happens on the authoritative context; only
		// the renderer-less canvas gets one.
		tokio::time::sleep(Duration::from_millis(80)).await;
		assert_eq!(*host.retired.lock(), vec![CanvasId(21)]);
	}

	#[tokio::test]
	async fn bulk_load_batches_isolate_failures() {
		let fail: HashSet<String> = [String::from("7")].into();
		let Fixture { registry, _dir, .. } = fixture_with(fail, |options| options);

		for index in 0..25u32 {
			let dir = registry.options().data_dir().join(index.to_string());
			tokio::fs::create_dir_all(&dir).await.expect("create mural dir");
		}

		let report = registry.bulk_load().await;
		assert_eq!(report.batches, 3, "25 directories at batch size 10 dispatch as 10/10/5");
		assert_eq!(report.loaded, 24);
		assert_eq!(report.failed, 1);
		assert_eq!(registry.len(), 24);
		assert!(!registry.has_index(MuralIndex(7)));
		registry.assert_consistent();
	}

	#[tokio::test]
	async fn bulk_load_clears_previous_state_and_restores_deleted_ids() {
		let Fixture { registry, _dir, .. } = fixture();
		let owner = Uuid::new_v4();

		registry
			.register(TestMural::new(&registry, owner, "stale", vec![500]) as Arc<dyn Mural>)
			.await
			.expect("register failed");
		let deleted: HashSet<CanvasId> = [CanvasId(77)].into();
		crate::deleted::save(registry.options().data_dir(), &deleted).await.expect("seed deleted file");

		let report = registry.bulk_load().await;
		assert_eq!(report, BulkLoadReport { batches: 0, loaded: 0, failed: 0 });
		assert_eq!(registry.len(), 0, "previous in-memory state must be cleared");
		assert!(registry.is_deleted(CanvasId(77)));
	}

	#[tokio::test]
	async fn close_flushes_deleted_ids_and_stops_the_tick() {
		let Fixture { registry, _dir, .. } = fixture_with(HashSet::new(), |options| options.tick_period(Duration::from_millis(10)));
		let owner = Uuid::new_v4();

		tokio::time::sleep(Duration::from_millis(100)).await;
		assert!(registry.animation_tick() >= 3, "tick task must advance the counter");

		let mural = TestMural::new(&registry, owner, "closing", vec![31]);
		registry.register(Arc::clone(&mural) as Arc<dyn Mural>).await.expect("register failed");
		registry.delete(mural.index().expect("index assigned")).await;

		registry.close().await;
		let after_close = registry.animation_tick();
		tokio::time::sleep(Duration::from_millis(60)).await;
		assert!(registry.animation_tick() <= after_close + 1, "tick task must stop after close");

		let restored = crate::deleted::load(registry.options().data_dir()).await;
		assert!(restored.contains(&CanvasId(31)));
	}

	#[tokio::test]
	async fn sweep_respects_exemptions_and_runs_on_main() {
		let Fixture { registry, host, _dir, .. } = fixture_with(HashSet::new(), |options| options.exempt_deleted(40..=49));
		let owner = Uuid::new_v4();

		let mural = TestMural::new(&registry, owner, "swept", vec![39, 41]);
		registry.register(Arc::clone(&mural) as Arc<dyn Mural>).await.expect("register failed");
		registry.delete(mural.index().expect("index assigned")).await;

		assert!(registry.should_neutralize(CanvasId(39)));
		assert!(!registry.should_neutralize(CanvasId(41)), "exempt range wins over deletion");
		assert!(!registry.should_neutralize(CanvasId(100)), "never-deleted ids are not stale");

		registry.sweep_stale(vec![CanvasId(39), CanvasId(41), CanvasId(100)]);
		tokio::time::sleep(Duration::from_millis(80)).await;
		assert_eq!(*host.neutralized.lock(), vec![CanvasId(39)]);
	}

	struct FillStage(u8);

	impl RenderStage for FillStage {
		fn apply(&self, _pass: &RenderPass<'_>, mut frame: RenderFrame) -> RenderFrame {
			frame.pixels = vec![self.0; 4];
			frame
		}
	}

	struct CursorStage;

	impl RenderStage for CursorStage {
		fn apply(&self, pass: &RenderPass<'_>, mut frame: RenderFrame) -> RenderFrame {
			// Later stages see earlier output: keep the fill, add a cursor.
			frame.cursors.push(CursorMark {
				x: pass.canvas.0 as i8,
				y: 0,
				direction: 0,
				kind: 1,
			});
			frame
		}
	}

	#[tokio::test]
	async fn render_stages_run_in_chain_order() {
		let Fixture { registry, _dir, .. } = fixture();
		let owner = Uuid::new_v4();
		let mural = TestMural::new(&registry, owner, "staged", vec![3]);
		registry.register(Arc::clone(&mural) as Arc<dyn Mural>).await.expect("register failed");
		let mural = mural as Arc<dyn Mural>;

		let late_fill = registry.append_render_stage(Arc::new(FillStage(9)));
		registry.append_render_stage(Arc::new(CursorStage));
		registry.prepend_render_stage(Arc::new(FillStage(1)));

		let frame = registry.dispatch_render(&mural, CanvasId(3), Uuid::new_v4(), RenderFrame::default());
		assert_eq!(frame.pixels, vec![9; 4], "append order: the later fill wins");
		assert_eq!(frame.cursors.len(), 1, "cursor stage sees and extends the filled frame");

		assert!(registry.remove_render_stage(late_fill));
		assert!(!registry.remove_render_stage(late_fill), "second removal reports absence");
		let frame = registry.dispatch_render(&mural, CanvasId(3), Uuid::new_v4(), RenderFrame::default());
		assert_eq!(frame.pixels, vec![1; 4], "prepended fill is all that remains");
	}

	#[tokio::test]
	async fn fake_ids_come_from_the_synthetic_range() {
		let Fixture { registry, _dir, .. } = fixture();
		let first = registry.next_fake_id();
		let second = registry.next_fake_id();
		assert!(first.is_fake() && second.is_fake());
		assert!(second.0 > first.0);

		// Independent registries allocate independently.
		let other = fixture();
		assert_eq!(other.registry.next_fake_id(), first);
	}

	#[test]
	fn load_order_is_numeric_then_lexicographic() {
		let mut names = vec!["10", "2", "legacy", "1", "alpha", "30"];
		names.sort_by(|a, b| compare_entry_names(a, b));
		assert_eq!(names, vec!["1", "2", "10", "30", "alpha", "legacy"]);
	}

	#[test]
	fn retired_placeholder_is_uniform() {
		let frame = retired_frame(7);
		assert!(frame.pixels.iter().all(|pixel| *pixel == 7));
	}
}
