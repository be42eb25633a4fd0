//! Mock subsystems and hooks for driving the run loop in tests.
//!
//! Every mock shares its observable state through `Arc`s handed back in [`Probes`],
//! so a test can keep watching a machine after the run loop has taken ownership.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use rusty_c64::{Bus, Cpu, Hooks, Machine, Runloop, RunloopError, Subsystem, SubsystemError, SubsystemState, Subsystems};

pub type EventLog = Arc<Mutex<Vec<String>>>;
pub type WriteLog = Arc<Mutex<Vec<(u16, u8)>>>;
pub type PcScript = Arc<dyn Fn(u64) -> u16 + Send + Sync>;

/// How a mock chip misbehaves once it has been ticked this many times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Fault(u64),
    Panic(u64),
}

/// A chip that counts its ticks, optionally logs them, and can be made to fail.
pub struct MockChip {
    name: String,
    ticks: Arc<AtomicU64>,
    tick_log: Option<EventLog>,
    resets: EventLog,
    failure: Option<Failure>,
}

impl MockChip {
    pub fn new(name: &str, resets: EventLog) -> Self {
        MockChip {
            name: name.to_string(),
            ticks: Arc::new(AtomicU64::new(0)),
            tick_log: None,
            resets,
            failure: None,
        }
    }

    fn log_tick(&self) {
        if let Some(log) = &self.tick_log {
            log.lock().unwrap().push(self.name.clone());
        }
    }
}

fn count_state(ticks: u64) -> SubsystemState {
    format!("{{\"ticks\":{}}}", ticks)
}

fn parse_count(name: &str, state: &str) -> Result<u64, SubsystemError> {
    let value: serde_json::Value =
        serde_json::from_str(state).map_err(|e| SubsystemError::new(name, e.to_string()))?;
    value["ticks"]
        .as_u64()
        .ok_or_else(|| SubsystemError::new(name, "missing tick count"))
}

impl Subsystem for MockChip {
    fn name(&self) -> &str {
        &self.name
    }

    fn tick(&mut self) -> Result<(), SubsystemError> {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        self.log_tick();
        match self.failure {
            Some(Failure::Fault(at)) if ticks >= at => Err(SubsystemError::new(&self.name, "illegal register access")),
            Some(Failure::Panic(at)) if ticks == at => panic!("{} lost its raster", self.name),
            _ => Ok(()),
        }
    }

    fn reset(&mut self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.resets.lock().unwrap().push(self.name.clone());
    }

    fn serialize(&self) -> SubsystemState {
        count_state(self.ticks.load(Ordering::Relaxed))
    }

    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError> {
        let ticks = parse_count(&self.name, state)?;
        self.ticks.store(ticks, Ordering::Relaxed);
        Ok(())
    }
}

/// A CPU whose program counter is a function of how many cycles it has run.
pub struct ScriptedCpu {
    ticks: Arc<AtomicU64>,
    script: PcScript,
    tick_log: Option<EventLog>,
    resets: EventLog,
}

impl Subsystem for ScriptedCpu {
    fn name(&self) -> &str {
        "CPU"
    }

    fn tick(&mut self) -> Result<(), SubsystemError> {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if let Some(log) = &self.tick_log {
            log.lock().unwrap().push("CPU".to_string());
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.resets.lock().unwrap().push("CPU".to_string());
    }

    fn serialize(&self) -> SubsystemState {
        count_state(self.ticks.load(Ordering::Relaxed))
    }

    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError> {
        let ticks = parse_count("CPU", state)?;
        self.ticks.store(ticks, Ordering::Relaxed);
        Ok(())
    }
}

impl Cpu for ScriptedCpu {
    fn program_counter(&self) -> u16 {
        (self.script)(self.ticks.load(Ordering::Relaxed))
    }
}

/// Sparse 64 KiB memory that records every CPU write.
pub struct MockBus {
    memory: Arc<Mutex<Vec<u8>>>,
    writes: WriteLog,
    resets: EventLog,
}

impl Subsystem for MockBus {
    fn name(&self) -> &str {
        "WIRES"
    }

    fn tick(&mut self) -> Result<(), SubsystemError> {
        Ok(())
    }

    fn reset(&mut self) {
        self.memory.lock().unwrap().fill(0);
        self.resets.lock().unwrap().push("WIRES".to_string());
    }

    fn serialize(&self) -> SubsystemState {
        let memory = self.memory.lock().unwrap();
        let used: BTreeMap<u16, u8> = memory
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != 0)
            .map(|(address, &value)| (address as u16, value))
            .collect();
        serde_json::to_string(&used).unwrap()
    }

    fn deserialize(&mut self, state: &str) -> Result<(), SubsystemError> {
        let used: BTreeMap<u16, u8> =
            serde_json::from_str(state).map_err(|e| SubsystemError::new("WIRES", e.to_string()))?;
        let mut memory = self.memory.lock().unwrap();
        memory.fill(0);
        for (address, value) in used {
            memory[usize::from(address)] = value;
        }
        Ok(())
    }
}

impl Bus for MockBus {
    fn cpu_read(&mut self, address: u16) -> u8 {
        self.memory.lock().unwrap()[usize::from(address)]
    }

    fn cpu_write(&mut self, address: u16, value: u8) {
        self.writes.lock().unwrap().push((address, value));
        self.memory.lock().unwrap()[usize::from(address)] = value;
    }
}

/// Shared views into a mock machine.
#[derive(Clone)]
pub struct Probes {
    pub ticks: EventLog,
    pub resets: EventLog,
    pub writes: WriteLog,
    pub memory: Arc<Mutex<Vec<u8>>>,
    pub cpu_ticks: Arc<AtomicU64>,
    pub vic_ticks: Arc<AtomicU64>,
}

impl Probes {
    pub fn poke(&self, address: u16, value: u8) {
        self.memory.lock().unwrap()[usize::from(address)] = value;
    }

    pub fn peek(&self, address: u16) -> u8 {
        self.memory.lock().unwrap()[usize::from(address)]
    }

    pub fn writes(&self) -> Vec<(u16, u8)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    pub fn resets(&self) -> Vec<String> {
        self.resets.lock().unwrap().clone()
    }

    pub fn ticks(&self) -> Vec<String> {
        self.ticks.lock().unwrap().clone()
    }
}

pub struct MockMachine {
    script: PcScript,
    record_ticks: bool,
    vic_failure: Option<Failure>,
}

impl MockMachine {
    pub fn new() -> Self {
        MockMachine {
            script: Arc::new(|_| 0x0000),
            record_ticks: false,
            vic_failure: None,
        }
    }

    pub fn pc_script(mut self, script: impl Fn(u64) -> u16 + Send + Sync + 'static) -> Self {
        self.script = Arc::new(script);
        self
    }

    pub fn record_ticks(mut self) -> Self {
        self.record_ticks = true;
        self
    }

    pub fn vic_fails(mut self, failure: Failure) -> Self {
        self.vic_failure = Some(failure);
        self
    }

    pub fn build(self) -> (Machine, Probes) {
        let probes = Probes {
            ticks: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(Vec::new())),
            writes: Arc::new(Mutex::new(Vec::new())),
            memory: Arc::new(Mutex::new(vec![0; 0x10000])),
            cpu_ticks: Arc::new(AtomicU64::new(0)),
            vic_ticks: Arc::new(AtomicU64::new(0)),
        };
        let tick_log = self.record_ticks.then(|| probes.ticks.clone());

        let chip = |name: &str| {
            let mut chip = MockChip::new(name, probes.resets.clone());
            chip.tick_log = tick_log.clone();
            chip
        };
        let mut vic = chip("VIC");
        vic.ticks = probes.vic_ticks.clone();
        vic.failure = self.vic_failure;

        let machine = Machine::new(Subsystems {
            wires: Box::new(MockBus {
                memory: probes.memory.clone(),
                writes: probes.writes.clone(),
                resets: probes.resets.clone(),
            }),
            ram: Box::new(chip("RAM")),
            vic: Box::new(vic),
            sid: Box::new(chip("SID")),
            cpu: Box::new(ScriptedCpu {
                ticks: probes.cpu_ticks.clone(),
                script: self.script,
                tick_log: tick_log.clone(),
                resets: probes.resets.clone(),
            }),
            cias: Box::new(chip("CIAS")),
            tape: Box::new(chip("TAPE")),
        });
        (machine, probes)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    Started,
    Stopped,
    Fps(u32),
    Error(String),
    Title(String),
}

/// Hooks that remember every call.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &HookEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn fps_samples(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Fps(fps) => Some(fps),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: HookEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Hooks for RecordingHooks {
    fn did_start(&self) {
        self.push(HookEvent::Started);
    }

    fn did_stop(&self) {
        self.push(HookEvent::Stopped);
    }

    fn update_fps(&self, fps: u32) {
        self.push(HookEvent::Fps(fps));
    }

    fn report_error(&self, error: &RunloopError) {
        self.push(HookEvent::Error(error.to_string()));
    }

    fn set_title(&self, title: &str) {
        self.push(HookEvent::Title(title.to_string()));
    }
}

/// Hooks that read the machine back through the run loop whenever an error is reported.
#[derive(Default)]
pub struct CallbackHooks {
    runloop: OnceLock<Runloop>,
    seen: Mutex<Vec<(String, u64)>>,
}

impl CallbackHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self, runloop: &Runloop) {
        let _ = self.runloop.set(runloop.clone());
    }

    /// Each reported error with the cycle read back while handling it.
    pub fn seen(&self) -> Vec<(String, u64)> {
        self.seen.lock().unwrap().clone()
    }
}

impl Hooks for CallbackHooks {
    fn report_error(&self, error: &RunloopError) {
        if let Some(runloop) = self.runloop.get() {
            let cycle = runloop.get_state().cycle;
            runloop.serialize().unwrap();
            self.seen.lock().unwrap().push((error.to_string(), cycle));
        }
    }
}
