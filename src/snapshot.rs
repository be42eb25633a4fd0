//! # Snapshots
//!
//! A snapshot is the whole machine as one JSON document: a version header, the run
//! loop's own state (itself JSON-encoded into a string), and each subsystem's saved
//! state stored verbatim under its slot name.
//!
//! ```json
//! {
//!   "version": {"creator": "rusty_c64", "major": 0, "minor": 1},
//!   "runloop": "{\"cycle\":19656}",
//!   "wires": "...", "ram": "...", "vic": "...", "sid": "...",
//!   "cpu": "...", "cias": "...", "tape": "..."
//! }
//! ```
//!
//! Pacing, speed and pending run handles are session parameters and never appear here.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::machine::Machine;
use crate::subsystem::{SubsystemId, SubsystemState};
use crate::types::RunloopState;

pub const SNAPSHOT_CREATOR: &str = "rusty_c64";
pub const SNAPSHOT_MAJOR: u32 = 0;
pub const SNAPSHOT_MINOR: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersion {
    pub creator: String,
    pub major: u32,
    pub minor: u32,
}

impl Default for SnapshotVersion {
    fn default() -> Self {
        SnapshotVersion {
            creator: SNAPSHOT_CREATOR.to_string(),
            major: SNAPSHOT_MAJOR,
            minor: SNAPSHOT_MINOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: SnapshotVersion,
    pub runloop: String,
    pub wires: SubsystemState,
    pub ram: SubsystemState,
    pub vic: SubsystemState,
    pub sid: SubsystemState,
    pub cpu: SubsystemState,
    pub cias: SubsystemState,
    pub tape: SubsystemState,
}

impl Snapshot {
    pub fn capture(machine: &Machine) -> Result<Self, SnapshotError> {
        Ok(Snapshot {
            version: SnapshotVersion::default(),
            runloop: serde_json::to_string(&machine.runloop_state())?,
            wires: machine.serialize_subsystem(SubsystemId::Wires),
            ram: machine.serialize_subsystem(SubsystemId::Ram),
            vic: machine.serialize_subsystem(SubsystemId::Vic),
            sid: machine.serialize_subsystem(SubsystemId::Sid),
            cpu: machine.serialize_subsystem(SubsystemId::Cpu),
            cias: machine.serialize_subsystem(SubsystemId::Cias),
            tape: machine.serialize_subsystem(SubsystemId::Tape),
        })
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        if snapshot.version.major != SNAPSHOT_MAJOR {
            return Err(SnapshotError::UnsupportedVersion {
                major: snapshot.version.major,
                minor: snapshot.version.minor,
            });
        }
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn runloop_state(&self) -> Result<RunloopState, SnapshotError> {
        Ok(serde_json::from_str(&self.runloop)?)
    }

    pub fn subsystem(&self, id: SubsystemId) -> &str {
        match id {
            SubsystemId::Wires => &self.wires,
            SubsystemId::Ram => &self.ram,
            SubsystemId::Vic => &self.vic,
            SubsystemId::Sid => &self.sid,
            SubsystemId::Cpu => &self.cpu,
            SubsystemId::Cias => &self.cias,
            SubsystemId::Tape => &self.tape,
        }
    }

    /// Write this snapshot back into `machine`. If a subsystem rejects its state, the
    /// subsystems already written are put back and the machine is left as it was.
    pub fn restore(&self, machine: &mut Machine) -> Result<(), SnapshotError> {
        let state = self.runloop_state()?;
        let previous = Snapshot::capture(machine)?;

        if let Err(e) = self.write_subsystems(machine) {
            warn!("Rolling back partial restore: {}", e);
            if let Err(rollback) = previous.write_subsystems(machine) {
                error!("Rollback failed, machine state is inconsistent: {}", rollback);
            }
            return Err(e);
        }
        machine.restore_runloop_state(state);

        info!(
            "Restored snapshot from {} {}.{} at cycle {}",
            self.version.creator, self.version.major, self.version.minor, state.cycle
        );
        Ok(())
    }

    fn write_subsystems(&self, machine: &mut Machine) -> Result<(), SnapshotError> {
        for id in SubsystemId::ALL {
            machine
                .deserialize_subsystem(id, self.subsystem(id))
                .map_err(|source| SnapshotError::Subsystem {
                    name: id.name(),
                    source,
                })?;
        }
        Ok(())
    }
}
