//! # Run loop
//!
//! Drives the machine in real time. A run episode is a Tokio task that executes one
//! frame (312 × 63 cycles) per pacing tick and stops when its profile's condition
//! holds, when `stop()` is called, or at the end of a frame after
//! `stop_after_frame()`. Every episode hands back a [`RunHandle`] that resolves with
//! the [`StopReason`] once the episode is over.
//!
//! There is one episode at a time. Calling `run` while an episode is active cancels
//! it: its handle resolves with [`StopReason::Superseded`] and the new episode takes
//! over the machine where the old one left it.
//!
//! A whole frame executes under the machine lock, so host calls such as
//! [`Runloop::type_text`] or [`Runloop::serialize`] only ever see frame-aligned state.
//! Episode tasks are spawned with `tokio::spawn`; `run` must be called from within a
//! Tokio runtime.

use log::{debug, error, info, warn};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::error::{RunloopError, SubsystemError};
use crate::hooks::{Hooks, NoHooks};
use crate::keyboard::{self, KeyboardLayout};
use crate::machine::{FrameOutcome, Machine};
use crate::profile::RunProfile;
use crate::snapshot::Snapshot;
use crate::system_config::RunloopConfig;
use crate::types::{RunState, RunloopState, StopReason, TargetFps};
use crate::waypoint::Waypoint;

/// Shortest PRG image: load address plus one byte.
pub const MIN_PRG_LEN: usize = 3;

/// Resolves once its run episode has stopped.
#[derive(Debug)]
pub struct RunHandle {
    rx: oneshot::Receiver<StopReason>,
}

impl RunHandle {
    /// The stop reason if the episode has already ended, without waiting.
    pub fn try_finished(&mut self) -> Option<StopReason> {
        match self.rx.try_recv() {
            Ok(reason) => Some(reason),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(StopReason::Stopped),
        }
    }
}

impl Future for RunHandle {
    type Output = StopReason;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<StopReason> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(StopReason::Stopped))
    }
}

/// Stop requests for one episode.
#[derive(Default)]
struct EpisodeControl {
    stop: AtomicBool,
    stop_after_frame: AtomicBool,
    wake: Notify,
}

impl EpisodeControl {
    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.wake.notify_one();
    }
}

struct Episode {
    id: u64,
    control: Arc<EpisodeControl>,
    done: oneshot::Sender<StopReason>,
    task: Option<JoinHandle<()>>,
}

impl Episode {
    /// End the episode from outside its task.
    fn cancel(self, reason: StopReason) {
        self.control.request_stop();
        if let Some(task) = self.task {
            task.abort();
        }
        let _ = self.done.send(reason);
    }
}

struct Inner {
    machine: Mutex<Machine>,
    episode: Mutex<Option<Episode>>,
    next_episode: AtomicU64,
    speed: watch::Sender<f64>,
    frame_done: Notify,
    hooks: Arc<dyn Hooks>,
    config: RunloopConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        lock(&self.machine)
    }

    /// Called by an episode's own task when it stops. A no-op if the episode has
    /// already been cancelled or replaced.
    fn finish(&self, id: u64, reason: StopReason) {
        let episode = {
            let mut slot = lock(&self.episode);
            match slot.as_ref() {
                Some(episode) if episode.id == id => slot.take(),
                _ => None,
            }
        };

        if let Some(episode) = episode {
            debug!("Run episode {} stopped: {:?}", id, reason);
            self.hooks.did_stop();
            let _ = episode.done.send(reason);
        }
    }

    fn report(&self, error: RunloopError) -> RunloopError {
        self.hooks.report_error(&error);
        error
    }
}

/// Paces frames: a fixed interval, or a bare yield when running unbounded.
enum Pacer {
    Paced(Interval),
    Unpaced,
}

impl Pacer {
    fn new(fps: TargetFps, speed: f64) -> Self {
        match fps.frame_interval(speed) {
            Some(period) if !period.is_zero() => {
                let mut interval = time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Pacer::Paced(interval)
            }
            _ => Pacer::Unpaced,
        }
    }

    async fn tick(&mut self) {
        match self {
            Pacer::Paced(interval) => {
                interval.tick().await;
            }
            Pacer::Unpaced => tokio::task::yield_now().await,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "subsystem panicked".to_string()
    }
}

/// Body of one run episode.
async fn drive(inner: Arc<Inner>, id: u64, profile: RunProfile, control: Arc<EpisodeControl>) {
    let fps = profile.target_fps_or(inner.config.default_fps);
    let mut speed = inner.speed.subscribe();
    let mut pacer = Pacer::new(fps, *speed.borrow_and_update());
    let mut waypoint = Waypoint::new(inner.config.frames_per_waypoint, Instant::now());

    loop {
        tokio::select! {
            _ = pacer.tick() => {}
            _ = control.wake.notified() => {}
            changed = speed.changed() => {
                if changed.is_ok() {
                    let multiplier = *speed.borrow_and_update();
                    debug!("Episode {} re-paced at {} x{}", id, fps, multiplier);
                    pacer = Pacer::new(fps, multiplier);
                }
                continue;
            }
        }

        if control.stop.load(Ordering::Acquire) {
            inner.finish(id, StopReason::Stopped);
            return;
        }

        let outcome = {
            let mut machine = inner.machine();
            panic::catch_unwind(AssertUnwindSafe(|| machine.run_frame(&profile, &control.stop)))
                .unwrap_or_else(|payload| {
                    Err(SubsystemError::new("machine", panic_message(payload)))
                })
        };
        inner.frame_done.notify_waiters();

        match outcome {
            Ok(FrameOutcome::Completed) => {}
            Ok(FrameOutcome::Halted(reason)) => {
                inner.finish(id, reason);
                return;
            }
            Err(fault) => {
                error!("Caught fault in frame tick: {}", fault);
                inner.finish(id, StopReason::Fault(fault.to_string()));
                return;
            }
        }

        if let Some(realised) = waypoint.frame_completed(Instant::now()) {
            inner.hooks.update_fps(realised);
        }

        if control.stop_after_frame.load(Ordering::Acquire) {
            inner.finish(id, StopReason::FrameBoundary);
            return;
        }
    }
}

/// Handle to a machine and its scheduler. Cheap to clone; clones share the machine.
#[derive(Clone)]
pub struct Runloop {
    inner: Arc<Inner>,
}

impl Runloop {
    /// Default configuration and no hooks.
    pub fn new(machine: Machine) -> Self {
        Self::with_config(machine, RunloopConfig::default(), Arc::new(NoHooks))
    }

    /// Take ownership of `machine` and reset it to power-on state.
    pub fn with_config(machine: Machine, config: RunloopConfig, hooks: Arc<dyn Hooks>) -> Self {
        let (speed, _) = watch::channel(config.speed_multiplier);
        let runloop = Runloop {
            inner: Arc::new(Inner {
                machine: Mutex::new(machine),
                episode: Mutex::new(None),
                next_episode: AtomicU64::new(1),
                speed,
                frame_done: Notify::new(),
                hooks,
                config,
            }),
        };
        runloop.reset();
        runloop
    }

    pub fn config(&self) -> &RunloopConfig {
        &self.inner.config
    }

    /// Start a run episode, replacing any episode already running.
    pub fn run(&self, profile: RunProfile) -> Result<RunHandle, RunloopError> {
        let fps = profile.target_fps_or(self.inner.config.default_fps);
        if !fps.is_valid() {
            let requested = match fps {
                TargetFps::Limited(value) => value,
                TargetFps::Unbounded => f64::INFINITY,
            };
            return Err(self.inner.report(RunloopError::InvalidProfile(requested)));
        }

        let id = self.inner.next_episode.fetch_add(1, Ordering::Relaxed);
        let control = Arc::new(EpisodeControl::default());
        let (done, rx) = oneshot::channel();

        let previous = lock(&self.inner.episode).replace(Episode {
            id,
            control: Arc::clone(&control),
            done,
            task: None,
        });
        if let Some(previous) = previous {
            debug!("Run episode {} superseded by {}", previous.id, id);
            previous.cancel(StopReason::Superseded);
        }

        info!(
            "Starting run episode {} at {}, speed multiplier {}",
            id,
            fps,
            self.speed()
        );
        self.inner.hooks.did_start();

        let task = tokio::spawn(drive(Arc::clone(&self.inner), id, profile, control));
        if let Some(episode) = lock(&self.inner.episode).as_mut() {
            if episode.id == id {
                episode.task = Some(task);
            }
        }

        Ok(RunHandle { rx })
    }

    /// Run forever at the configured frame rate.
    pub fn run_default(&self) -> Result<RunHandle, RunloopError> {
        self.run(RunProfile::default())
    }

    /// Stop the current episode at the next cycle boundary.
    pub fn stop(&self) {
        if let Some(episode) = lock(&self.inner.episode).as_ref() {
            episode.control.request_stop();
        }
    }

    /// Stop the current episode once the frame in progress has completed.
    pub fn stop_after_frame(&self) {
        if let Some(episode) = lock(&self.inner.episode).as_ref() {
            episode.control.stop_after_frame.store(true, Ordering::Release);
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    pub fn state(&self) -> RunState {
        if lock(&self.inner.episode).is_some() {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    pub fn get_state(&self) -> RunloopState {
        self.inner.machine().runloop_state()
    }

    pub fn cycle(&self) -> u64 {
        self.inner.machine().cycle()
    }

    /// Run `f` against the machine between frames.
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut Machine) -> R) -> R {
        let mut machine = self.inner.machine();
        f(&mut *machine)
    }

    pub fn speed(&self) -> f64 {
        *self.inner.speed.borrow()
    }

    /// Change the speed multiplier. A running episode re-paces immediately and keeps
    /// its cycle state.
    pub fn set_speed(&self, multiplier: f64) -> Result<(), RunloopError> {
        if !(multiplier > 0.0 && multiplier.is_finite()) {
            warn!("Rejected speed multiplier {}", multiplier);
            return Err(self.inner.report(RunloopError::InvalidSpeed(multiplier)));
        }
        info!("Setting speed multiplier to: {}", multiplier);
        self.inner.speed.send_replace(multiplier);
        Ok(())
    }

    pub fn reset(&self) {
        self.inner.machine().reset();
        info!("Machine reset");
        self.inner.hooks.set_title("");
    }

    /// Type `text` into the keyboard buffer as-is. Fails without writing anything if
    /// the buffer cannot take the whole text.
    pub fn type_text(&self, text: &str) -> Result<(), RunloopError> {
        let layout = self.inner.config.keyboard;
        let typed = {
            let mut machine = self.inner.machine();
            keyboard::type_text(machine.wires_mut(), &layout, text)
        };
        typed.map_err(|e| self.inner.report(e))?;
        debug!("Typed {:?}", text);
        Ok(())
    }

    /// Type `text` converted to PETSCII, waiting for the KERNAL to drain the buffer
    /// whenever it is full.
    pub async fn type_pet(&self, text: &str) -> Result<(), RunloopError> {
        let codes = text
            .chars()
            .map(keyboard::to_petscii)
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|e| self.inner.report(e))?;
        let layout: KeyboardLayout = self.inner.config.keyboard;
        let backoff = self.inner.config.type_backoff();

        for code in codes {
            loop {
                let notified = self.inner.frame_done.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let pushed = {
                    let mut machine = self.inner.machine();
                    layout.push_key(machine.wires_mut(), code)
                };
                if pushed {
                    break;
                }

                tokio::select! {
                    _ = &mut notified => {}
                    _ = time::sleep(backoff) => {}
                }
            }
        }
        debug!("Typed {:?} as PETSCII", text);
        Ok(())
    }

    /// Run until the program counter reaches `pc`.
    ///
    /// If the CPU is already at `pc` it first runs until it has moved away, so
    /// calling this repeatedly re-runs to the next visit. Resolves to the handle of
    /// the second leg. There is no timeout: if `pc` is never reached the episode runs
    /// until stopped.
    pub async fn until_pc(&self, pc: Option<u16>, fast: bool) -> Result<RunHandle, RunloopError> {
        let Some(pc) = pc else {
            warn!("Missing argument: PC address");
            return Err(self.inner.report(RunloopError::MissingAddress));
        };

        let stepped = self.run(RunProfile::away_from_pc(pc))?.await;
        if stepped != StopReason::Predicate {
            return Err(RunloopError::Interrupted(stepped));
        }

        let mut profile = RunProfile::until_pc(pc);
        if fast {
            profile = profile.unbounded();
        }
        self.run(profile)
    }

    /// Copy a PRG image (little-endian load address, then data) into memory.
    /// Returns the load address.
    pub fn load_prg(&self, image: &[u8]) -> Result<u16, RunloopError> {
        self.check_prg(image)?;
        let load_addr = u16::from_le_bytes([image[0], image[1]]);

        let mut machine = self.inner.machine();
        let bus = machine.wires_mut();
        for (offset, &byte) in image[2..].iter().enumerate() {
            bus.cpu_write(load_addr.wrapping_add(offset as u16), byte);
        }
        info!("Loaded {} bytes at ${:04X}", image.len() - 2, load_addr);
        Ok(load_addr)
    }

    /// A PRG needs its two-byte load address and at least one byte of data.
    fn check_prg(&self, image: &[u8]) -> Result<(), RunloopError> {
        if image.len() < MIN_PRG_LEN {
            return Err(self.inner.report(RunloopError::InvalidProgram(image.len())));
        }
        Ok(())
    }

    /// Reset, boot to the keyboard prompt, load `image`, type `command` and keep running.
    /// A truncated image is rejected before the machine is touched.
    pub async fn ingest_prg(&self, image: &[u8], command: &str) -> Result<RunHandle, RunloopError> {
        self.check_prg(image)?;
        self.reset();
        let booted = self
            .until_pc(Some(self.inner.config.await_keyboard_pc), true)
            .await?
            .await;
        if booted != StopReason::Predicate {
            return Err(RunloopError::Interrupted(booted));
        }

        self.load_prg(image)?;
        self.type_text(command)?;
        self.run_default()
    }

    pub fn snapshot(&self) -> Result<Snapshot, RunloopError> {
        Ok(Snapshot::capture(&self.inner.machine())?)
    }

    pub fn serialize(&self) -> Result<String, RunloopError> {
        Ok(self.snapshot()?.to_json()?)
    }

    /// Restore a snapshot. Any running episode is stopped first and the scheduler is
    /// left stopped.
    pub fn restore(&self, snapshot: &Snapshot) -> Result<(), RunloopError> {
        self.halt();
        let restored = snapshot.restore(&mut self.inner.machine());
        restored.map_err(|e| self.inner.report(e.into()))
    }

    pub fn deserialize(&self, json: &str) -> Result<(), RunloopError> {
        let snapshot = Snapshot::from_json(json).map_err(|e| self.inner.report(e.into()))?;
        self.restore(&snapshot)
    }

    /// End the running episode immediately, if any.
    fn halt(&self) {
        let episode = lock(&self.inner.episode).take();
        if let Some(episode) = episode {
            debug!("Run episode {} halted", episode.id);
            self.inner.hooks.did_stop();
            episode.cancel(StopReason::Stopped);
        }
    }
}
