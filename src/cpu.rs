use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::backend::backend::{Backend, CycleContext};
use crate::frontend::frontend::Frontend;
use crate::instructions::instructions::{Program, RegisterType, StationClass, WordType, GENERAL_ARG_REG_CNT, ZERO_REG};
use crate::memory_subsystem::memory_subsystem::MemorySubsystem;

#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PerfCounters {
    pub cycle_cnt: u64,
    pub issue_cnt: u64,
    pub retired_cnt: u64,
    pub flush_cnt: u64,
    // ROB entries discarded by flushes
    pub squashed_cnt: u64,
    pub branch_cnt: u64,
    // committed control transfers that left the fall-through path
    pub taken_cnt: u64,
    pub rob_full_stall_cnt: u64,
    pub rs_full_stall_cnt: u64,
    pub forwarded_load_cnt: u64,
}

impl PerfCounters {
    pub fn ipc(&self) -> f32 {
        if self.cycle_cnt == 0 {
            0.0
        } else {
            self.retired_cnt as f32 / self.cycle_cnt as f32
        }
    }
}

#[derive(Clone, Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct Trace {
    pub issue: bool,
    pub execute: bool,
    pub writeback: bool,
    pub commit: bool,
    pub flush: bool,
    pub cycle: bool,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq)]
pub(crate) struct StationConfig {
    // the number of reservation stations in the partition
    pub(crate) count: u16,
    // the number of cycles an instruction executes once its operands are available
    pub(crate) latency: u8,
}

#[derive(Clone, Deserialize, Debug, PartialEq, Eq)]
#[serde(default)]
pub(crate) struct StationConfigs {
    pub(crate) load: StationConfig,
    pub(crate) store: StationConfig,
    pub(crate) branch: StationConfig,
    // shared by CALL and RET
    pub(crate) call_return: StationConfig,
    // shared by ADD and SUB
    pub(crate) add_sub: StationConfig,
    pub(crate) nand: StationConfig,
    pub(crate) mul: StationConfig,
}

impl Default for StationConfigs {
    fn default() -> Self {
        Self {
            load: StationConfig { count: 2, latency: 2 },
            store: StationConfig { count: 1, latency: 2 },
            branch: StationConfig { count: 2, latency: 1 },
            call_return: StationConfig { count: 1, latency: 1 },
            add_sub: StationConfig { count: 4, latency: 2 },
            nand: StationConfig { count: 2, latency: 1 },
            mul: StationConfig { count: 1, latency: 12 },
        }
    }
}

impl StationConfigs {
    pub(crate) fn get(&self, class: StationClass) -> StationConfig {
        match class {
            StationClass::Load => self.load,
            StationClass::Store => self.store,
            StationClass::Branch => self.branch,
            StationClass::CallReturn => self.call_return,
            StationClass::AddSub => self.add_sub,
            StationClass::Nand => self.nand,
            StationClass::Mul => self.mul,
        }
    }
}

/// What happens when a BEQ commits.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub(crate) enum BranchFlushPolicy {
    // only a taken branch flushes; a not taken branch was speculated correctly.
    #[default]
    TakenOnly,
    // every branch flushes and re-steers the frontend.
    Always,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub(crate) struct CPUConfig {
    // the capacity of the reorder buffer
    pub(crate) rob_capacity: u16,
    // the extra cycles a load spends reading memory
    pub(crate) memory_read_latency: u8,
    // the cycles a committing store occupies the retire port
    pub(crate) memory_write_latency: u8,
    pub(crate) stations: StationConfigs,
    pub(crate) branch_flush: BranchFlushPolicy,
    // stop the simulation after this many cycles
    pub(crate) max_cycles: Option<u64>,
    // if processing of a single instruction should be traced (logged)
    pub(crate) trace: Trace,
}

impl Default for CPUConfig {
    fn default() -> Self {
        Self {
            rob_capacity: 8,
            memory_read_latency: 4,
            memory_write_latency: 4,
            stations: StationConfigs::default(),
            branch_flush: BranchFlushPolicy::default(),
            max_cycles: None,
            trace: Trace::default(),
        }
    }
}

impl CPUConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.rob_capacity == 0 {
            return Err(ConfigError::Invalid("rob_capacity must be at least 1".to_string()));
        }

        if self.memory_write_latency == 0 {
            return Err(ConfigError::Invalid("memory_write_latency must be at least 1".to_string()));
        }

        for class in StationClass::ALL {
            let station = self.stations.get(class);
            if station.count == 0 {
                return Err(ConfigError::Invalid(format!("{:?} stations: count must be at least 1", class)));
            }
            if station.latency == 0 {
                return Err(ConfigError::Invalid(format!("{:?} stations: latency must be at least 1", class)));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub(crate) enum ConfigError {
    #[error("Failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub(crate) fn load_cpu_config(file_path: &Path) -> Result<CPUConfig, ConfigError> {
    let yaml = fs::read_to_string(file_path)
        .map_err(|source| ConfigError::Io { path: file_path.to_path_buf(), source })?;
    parse_cpu_config(&yaml)
}

pub(crate) fn parse_cpu_config(yaml: &str) -> Result<CPUConfig, ConfigError> {
    let config: CPUConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

pub struct ArgRegFile {
    entries: Vec<WordType>,
}

impl ArgRegFile {
    fn new(reg_count: u16) -> ArgRegFile {
        ArgRegFile { entries: vec![0; reg_count as usize] }
    }

    pub fn get_value(&self, reg: RegisterType) -> WordType {
        self.entries[reg as usize]
    }

    pub fn set_value(&mut self, reg: RegisterType, value: WordType) {
        self.entries[reg as usize] = value;
    }

    pub fn reset_zero_reg(&mut self) {
        self.entries[ZERO_REG as usize] = 0;
    }

    pub fn values(&self) -> &[WordType] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    // the ROB drained and there is nothing left to issue.
    Completed,
    // max_cycles was reached first.
    CycleLimit,
}

/// The cycle driver. It owns all simulator state and runs the phases of the
/// backend in a fixed order every cycle.
pub(crate) struct CPU {
    pub(crate) backend: Backend,
    pub(crate) frontend: Frontend,
    pub(crate) memory_subsystem: MemorySubsystem,
    pub(crate) arch_reg_file: ArgRegFile,
    pub(crate) perf_counters: PerfCounters,
    trace: Trace,
    max_cycles: Option<u64>,
}

impl CPU {
    pub(crate) fn new(cpu_config: &CPUConfig) -> CPU {
        CPU {
            backend: Backend::new(cpu_config),
            frontend: Frontend::new(),
            memory_subsystem: MemorySubsystem::new(cpu_config.rob_capacity),
            arch_reg_file: ArgRegFile::new(GENERAL_ARG_REG_CNT),
            perf_counters: PerfCounters::default(),
            trace: cpu_config.trace.clone(),
            max_cycles: cpu_config.max_cycles,
        }
    }

    pub(crate) fn init(&mut self, program: &Rc<Program>) {
        self.frontend.init(program);
        self.memory_subsystem.init(program);
    }

    /// The simulation is over when nothing is in flight and nothing is left to issue.
    pub(crate) fn is_done(&self) -> bool {
        self.backend.is_empty() && self.frontend.is_done()
    }

    pub(crate) fn do_cycle(&mut self) {
        self.perf_counters.cycle_cnt += 1;

        let mut ctx = CycleContext {
            cycle: self.perf_counters.cycle_cnt,
            frontend: &mut self.frontend,
            arch_reg_file: &mut self.arch_reg_file,
            memory_subsystem: &mut self.memory_subsystem,
            perf_counters: &mut self.perf_counters,
        };
        self.backend.do_cycle(&mut ctx);

        if self.trace.cycle {
            let perf_counters = &self.perf_counters;
            info!("[Cycles:{}][Issued={}][Retired={}][Flushes={}][IPC={:.2}]",
                  perf_counters.cycle_cnt,
                  perf_counters.issue_cnt,
                  perf_counters.retired_cnt,
                  perf_counters.flush_cnt,
                  perf_counters.ipc());
        }
    }

    pub(crate) fn run(&mut self, program: &Rc<Program>) -> RunOutcome {
        self.init(program);

        while !self.is_done() {
            if let Some(max_cycles) = self.max_cycles {
                if self.perf_counters.cycle_cnt >= max_cycles {
                    let rob = &self.backend.rob;
                    let in_flight: Vec<String> = rob.iter_from_head()
                        .map(|index| {
                            let slot = rob.get(index);
                            format!("{}:pc={}", slot.index, slot.pc)
                        })
                        .collect();
                    warn!("Stopped after {} cycles with {} instructions in flight [{}]",
                          max_cycles, rob.size(), in_flight.join(", "));
                    return RunOutcome::CycleLimit;
                }
            }
            self.do_cycle();
        }

        info!("Program complete after {} cycles", self.perf_counters.cycle_cnt);
        RunOutcome::Completed
    }
}
