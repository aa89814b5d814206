//! The render scheduler: worker threads, tile dispatch, sample folding and
//! the pause/resume/stop control surface.
//!
//! One supervisory thread (the `start` caller) plus a fixed pool of
//! workers. Workers share nothing mutable except the tile cursor and the
//! completed-tile queue; the sample grid is written only by the
//! supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ember_core::{Color, Scene};
use image::RgbaImage;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debug::DebugRaycaster;
use crate::sample::{SampleGrid, SampleSet};
use crate::tile::{generate_tiles, Tile};
use crate::tracer::{BounceRecord, PathTracer};

/// How often the supervisory loop folds results and reports status.
const UPDATE_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("a render pass is already running")]
    AlreadyRunning,
    #[error("the scene has no cameras")]
    NoCamera,
    #[error("the scene has no primitives")]
    EmptyScene,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Worker pool size, typically the host's logical processor count
    pub threads: usize,
    /// Initial exposure multiplier for the preview conversion
    pub exposure: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            threads: thread::available_parallelism().map_or(1, |n| n.get()),
            exposure: 1.0,
        }
    }
}

/// Status callback: (status text, progress fraction in [0,1], preview).
/// Invoked from the supervisory thread only.
pub type StatusCallback = Box<dyn Fn(&str, f64, &RgbaImage) + Send + Sync>;
/// Debug overlay callback, invoked from the supervisory thread on demand.
pub type DebugCallback = Box<dyn Fn(&RgbaImage) + Send + Sync>;

/// A fully rendered tile: one sample per pixel, `None` marking a miss.
struct TileBatch {
    tile: Tile,
    samples: Vec<Option<Color>>,
    elapsed: Duration,
}

struct TileQueue {
    tiles: Vec<Tile>,
    next: usize,
}

/// State shared between the supervisor, the workers and external callers.
struct Shared {
    running: AtomicBool,
    paused: AtomicBool,
    stopping: AtomicBool,
    debug_pending: AtomicBool,

    exposure: Mutex<f32>,

    /// The prepared scene, present only while a pass runs.
    active_scene: Mutex<Option<Arc<Scene>>>,

    grid: RwLock<SampleGrid>,

    /// Tile cursor; the condvar doubles as the pause gate for workers.
    queue: Mutex<TileQueue>,
    work_available: Condvar,

    /// Single-shot wake flag for the supervisory loop.
    wake: Mutex<bool>,
    wake_signal: Condvar,
}

impl Shared {
    /// Claim the next tile, blocking while paused. Returns `None` once the
    /// scheduler is stopping. Stop takes precedence over pause.
    fn next_tile(&self) -> Option<Tile> {
        let mut queue = self.queue.lock().expect("poisoned tile queue");
        loop {
            if self.stopping.load(Ordering::Acquire) {
                return None;
            }
            if !self.paused.load(Ordering::Acquire) {
                break;
            }
            queue = self
                .work_available
                .wait(queue)
                .expect("poisoned tile queue");
        }

        if queue.tiles.is_empty() {
            return None;
        }
        let tile = queue.tiles[queue.next];
        queue.next = (queue.next + 1) % queue.tiles.len();
        Some(tile)
    }

    fn wake_supervisor(&self) {
        let mut wake = self.wake.lock().expect("poisoned wake flag");
        *wake = true;
        self.wake_signal.notify_all();
    }
}

/// A render worker: pulls tiles, traces one sample per pixel, pushes the
/// finished batch back to the supervisor.
struct Worker {
    shared: Arc<Shared>,
    scene: Arc<Scene>,
    tracer: PathTracer,
    batches: Sender<TileBatch>,
}

impl Worker {
    fn run(mut self) {
        while let Some(tile) = self.shared.next_tile() {
            let started = Instant::now();
            let Some(samples) = self.render_tile(tile) else {
                break;
            };
            let batch = TileBatch {
                tile,
                samples,
                elapsed: started.elapsed(),
            };
            if self.batches.send(batch).is_err() {
                break;
            }
        }
    }

    /// Render one sample for every pixel of the tile. Returns `None` when a
    /// stop request arrives mid-tile; the partial batch is discarded so no
    /// partial-tile updates are ever emitted.
    fn render_tile(&mut self, tile: Tile) -> Option<Vec<Option<Color>>> {
        let mut samples = Vec::with_capacity(tile.pixel_count() as usize);
        for y in 0..tile.height {
            for x in 0..tile.width {
                // Cancellation is cooperative at pixel granularity
                if self.shared.stopping.load(Ordering::Acquire) {
                    return None;
                }
                samples.push(self.tracer.trace_pixel(&self.scene, tile.x + x, tile.y + y));
            }
        }
        Some(samples)
    }
}

/// The renderer: owns the scene, the worker pool and the sample grid.
///
/// `start` runs the supervisory loop on the calling thread until stopped;
/// every other method may be called from any thread.
pub struct Renderer {
    shared: Arc<Shared>,
    threads: usize,
    on_status: StatusCallback,
    on_debug: DebugCallback,
    debug: DebugRaycaster,
    /// The scene parks here between passes so it can be edited.
    idle_scene: Mutex<Option<Scene>>,
}

impl Renderer {
    pub fn new(
        scene: Scene,
        settings: RenderSettings,
        on_status: impl Fn(&str, f64, &RgbaImage) + Send + Sync + 'static,
        on_debug: impl Fn(&RgbaImage) + Send + Sync + 'static,
    ) -> Self {
        let grid = SampleGrid::new(scene.width, scene.height);
        Self {
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                debug_pending: AtomicBool::new(false),
                exposure: Mutex::new(settings.exposure),
                active_scene: Mutex::new(None),
                grid: RwLock::new(grid),
                queue: Mutex::new(TileQueue {
                    tiles: Vec::new(),
                    next: 0,
                }),
                work_available: Condvar::new(),
                wake: Mutex::new(false),
                wake_signal: Condvar::new(),
            }),
            threads: settings.threads.max(1),
            on_status: Box::new(on_status),
            on_debug: Box::new(on_debug),
            debug: DebugRaycaster::new(),
            idle_scene: Mutex::new(Some(scene)),
        }
    }

    /// Start rendering. Blocks the calling thread as the supervisory loop
    /// until the pass is stopped.
    pub fn start(&self) -> Result<(), RenderError> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Err(RenderError::AlreadyRunning);
        }
        self.shared.stopping.store(false, Ordering::Release);
        self.shared.paused.store(false, Ordering::Release);

        let mut scene = self
            .idle_scene
            .lock()
            .expect("poisoned idle scene")
            .take()
            .expect("idle scene present while not running");

        if let Err(error) = Self::validate(&scene) {
            *self.idle_scene.lock().expect("poisoned idle scene") = Some(scene);
            self.shared.running.store(false, Ordering::Release);
            return Err(error);
        }

        // Fresh sample grid for the new pass
        *self.shared.grid.write().expect("poisoned sample grid") =
            SampleGrid::new(scene.width, scene.height);

        (self.on_status)("preparing scene...", 0.0, &self.preview());
        scene.prepare();
        let scene = Arc::new(scene);
        *self
            .shared
            .active_scene
            .lock()
            .expect("poisoned active scene") = Some(Arc::clone(&scene));

        {
            let mut queue = self.shared.queue.lock().expect("poisoned tile queue");
            queue.tiles = generate_tiles(scene.width, scene.height, self.threads);
            queue.next = 0;
        }

        let (batch_sender, batch_receiver) = mpsc::channel();
        let mut workers = Vec::with_capacity(self.threads);
        for id in 0..self.threads {
            let worker = Worker {
                shared: Arc::clone(&self.shared),
                scene: Arc::clone(&scene),
                tracer: PathTracer::new(),
                batches: batch_sender.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("ember-worker-{id}"))
                .spawn(move || worker.run())
                .expect("failed to spawn worker thread");
            workers.push(handle);
        }
        drop(batch_sender);
        info!(
            "render started: {}x{} with {} workers",
            scene.width,
            scene.height,
            workers.len()
        );

        self.supervise(&scene, &batch_receiver, &mut workers);

        self.shared
            .active_scene
            .lock()
            .expect("poisoned active scene")
            .take();
        // Hand the scene back for between-pass editing; a straggling
        // reference (none expected after join) falls back to a clone
        let scene = Arc::try_unwrap(scene).unwrap_or_else(|shared| (*shared).clone());
        *self.idle_scene.lock().expect("poisoned idle scene") = Some(scene);
        self.shared.running.store(false, Ordering::Release);
        info!("render stopped");
        Ok(())
    }

    fn validate(scene: &Scene) -> Result<(), RenderError> {
        if scene.cameras().is_empty() {
            return Err(RenderError::NoCamera);
        }
        if scene.primitives().is_empty() {
            return Err(RenderError::EmptyScene);
        }
        Ok(())
    }

    /// The supervisory loop: fold batches, report status, honor
    /// pause/stop, sleep until the next tick.
    fn supervise(
        &self,
        scene: &Arc<Scene>,
        batches: &Receiver<TileBatch>,
        workers: &mut Vec<JoinHandle<()>>,
    ) {
        let threads = workers.len().max(1) as u32;
        let pixel_count = (scene.width as u64 * scene.height as u64).max(1) as f64;
        let mut total_time = Duration::ZERO;
        let mut total_tiles: u64 = 0;
        let mut total_samples: u64 = 0;

        loop {
            let tick_started = Instant::now();
            let stopping = self.shared.stopping.load(Ordering::Acquire);

            if stopping {
                // Stop beats pause: release the gate so workers can observe
                // the stop flag, then wait for every acknowledgment. The
                // lock serializes with workers between their flag check and
                // their wait, so the wakeup cannot be lost.
                {
                    let _queue = self.shared.queue.lock().expect("poisoned tile queue");
                    self.shared.work_available.notify_all();
                }
                for handle in workers.drain(..) {
                    let _ = handle.join();
                }
            }

            // Fold every completed tile into the sample grid
            while let Ok(batch) = batches.try_recv() {
                self.fold_batch(&batch);
                total_time += batch.elapsed;
                total_tiles += 1;
                total_samples += batch.tile.pixel_count() as u64;
            }

            let average_time = total_time / threads;
            let per_pixel = total_samples as f64 / pixel_count;
            let per_second = if average_time.is_zero() {
                0.0
            } else {
                per_pixel / average_time.as_secs_f64()
            };
            // 1000 samples per pixel reads as 50%; progress never hits 100%
            let progress = per_pixel / (per_pixel + 1000.0);

            (self.on_status)(
                &format!(
                    "tiles: {total_tiles} elapsed: {average_time:.2?} \
                     {per_pixel:.2}/px {per_second:.3}/px/s"
                ),
                progress,
                &self.preview(),
            );

            if self.shared.debug_pending.swap(false, Ordering::AcqRel) {
                (self.on_debug)(&self.debug.render(scene));
            }

            if stopping {
                break;
            }

            // Block while paused; queue_update pokes us awake for exactly
            // one refresh pass without resuming the workers
            if self.shared.paused.load(Ordering::Acquire) {
                let mut wake = self.shared.wake.lock().expect("poisoned wake flag");
                while self.shared.paused.load(Ordering::Acquire)
                    && !self.shared.stopping.load(Ordering::Acquire)
                    && !*wake
                {
                    wake = self
                        .shared
                        .wake_signal
                        .wait(wake)
                        .expect("poisoned wake flag");
                }
                *wake = false;
                continue;
            }

            // Interval sleep, interruptible by queue_update
            let elapsed = tick_started.elapsed();
            if elapsed < UPDATE_INTERVAL {
                let mut wake = self.shared.wake.lock().expect("poisoned wake flag");
                if !*wake {
                    let (guard, _) = self
                        .shared
                        .wake_signal
                        .wait_timeout(wake, UPDATE_INTERVAL - elapsed)
                        .expect("poisoned wake flag");
                    wake = guard;
                }
                *wake = false;
            }
        }
    }

    fn fold_batch(&self, batch: &TileBatch) {
        let mut grid = self.shared.grid.write().expect("poisoned sample grid");
        let mut index = 0;
        for y in 0..batch.tile.height {
            for x in 0..batch.tile.width {
                let set = grid.at_mut(batch.tile.x + x, batch.tile.y + y);
                match batch.samples[index] {
                    Some(color) => set.add_sample(color),
                    None => set.add_miss(),
                }
                index += 1;
            }
        }
    }

    // -- control surface -------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.stopping.load(Ordering::Acquire)
    }

    /// Pause the pass: workers block at their next tile claim, the
    /// supervisor parks after its next tick.
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
    }

    /// Resume a paused pass, releasing all blocked workers at once.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        // Notify under the queue lock so a worker between its flag check
        // and its wait cannot miss the wakeup
        {
            let _queue = self.shared.queue.lock().expect("poisoned tile queue");
            self.shared.work_available.notify_all();
        }
        self.shared.wake_supervisor();
    }

    /// Request a cooperative stop. Takes precedence over pause; workers
    /// finish their current pixel and exit, and `start` returns after all
    /// of them acknowledge.
    pub fn stop(&self) {
        self.shared.stopping.store(true, Ordering::Release);
        // Unpause so everyone can observe the stop flag
        self.resume();
    }

    /// Skip the rest of the current polling wait and refresh immediately.
    /// While paused this wakes the supervisor for a single recompute
    /// without resuming the workers.
    pub fn queue_update(&self) {
        self.shared.wake_supervisor();
    }

    /// Flag the debug overlay for re-render on the next tick.
    pub fn queue_debug_update(&self) {
        self.shared.debug_pending.store(true, Ordering::Release);
        self.queue_update();
    }

    /// The debug overlay renderer (mode changes apply on the next pass).
    pub fn debug_raycaster(&self) -> &DebugRaycaster {
        &self.debug
    }

    pub fn exposure(&self) -> f32 {
        *self.shared.exposure.lock().expect("poisoned exposure")
    }

    /// Change the preview exposure and refresh immediately.
    pub fn set_exposure(&self, exposure: f32) {
        *self.shared.exposure.lock().expect("poisoned exposure") = exposure;
        self.queue_update();
    }

    // -- queries ----------------------------------------------------------

    /// The sample statistics at pixel (x, y), clamped to the frame.
    pub fn sample_set(&self, x: u32, y: u32) -> SampleSet {
        self.shared
            .grid
            .read()
            .expect("poisoned sample grid")
            .at(x, y)
    }

    /// The current preview image.
    pub fn preview(&self) -> RgbaImage {
        let (background, background_alpha) = self
            .with_any_scene(|scene| (scene.background, scene.background_alpha))
            .unwrap_or((Color::ZERO, 0.0));
        self.shared
            .grid
            .read()
            .expect("poisoned sample grid")
            .to_image(background, background_alpha, self.exposure())
    }

    /// Full per-bounce traces for `samples` independent samples of one
    /// pixel, for the ray inspector.
    pub fn debug_traces(&self, x: u32, y: u32, samples: u32) -> Vec<Vec<BounceRecord>> {
        // Running pass: trace against the active scene. Otherwise prepare
        // the parked scene in place first.
        if let Some(scene) = self
            .shared
            .active_scene
            .lock()
            .expect("poisoned active scene")
            .clone()
        {
            return Self::collect_traces(&scene, x, y, samples);
        }

        let mut guard = self.idle_scene.lock().expect("poisoned idle scene");
        match guard.as_mut() {
            Some(scene) if !scene.cameras().is_empty() && !scene.primitives().is_empty() => {
                scene.prepare();
                Self::collect_traces(scene, x, y, samples)
            }
            _ => Vec::new(),
        }
    }

    fn collect_traces(scene: &Scene, x: u32, y: u32, samples: u32) -> Vec<Vec<BounceRecord>> {
        let mut tracer = PathTracer::new();
        (0..samples)
            .map(|_| tracer.debug_trace_pixel(scene, x, y))
            .collect()
    }

    /// Edit the scene between passes. Returns `None` while a pass runs.
    pub fn with_scene<R>(&self, edit: impl FnOnce(&mut Scene) -> R) -> Option<R> {
        let mut guard = self.idle_scene.lock().expect("poisoned idle scene");
        guard.as_mut().map(edit)
    }

    fn with_any_scene<R>(&self, read: impl FnOnce(&Scene) -> R) -> Option<R> {
        if let Some(scene) = self
            .shared
            .active_scene
            .lock()
            .expect("poisoned active scene")
            .as_ref()
        {
            return Some(read(scene));
        }
        self.idle_scene
            .lock()
            .expect("poisoned idle scene")
            .as_ref()
            .map(read)
    }
}
