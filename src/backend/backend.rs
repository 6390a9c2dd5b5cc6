use log::info;

use crate::backend::register_alias_table::RAT;
use crate::backend::reorder_buffer::{Destination, ROBSlotState, ROB};
use crate::backend::reservation_station::{RSState, RSTable, RsIndex, SourceTag};
use crate::backend::timing::TimingTable;
use crate::cpu::{ArgRegFile, BranchFlushPolicy, CPUConfig, PerfCounters, StationConfigs, Trace};
use crate::frontend::frontend::Frontend;
use crate::instructions::instructions::{mnemonic, Opcode, RegisterType, WordType, LINK_REG, ZERO_REG};
use crate::memory_subsystem::memory_subsystem::MemorySubsystem;
use crate::memory_subsystem::store_buffer::LoadCheck;

/// The state outside of the backend that the phases of a single cycle read and
/// write. It is handed out by the cycle driver for the duration of one cycle.
pub(crate) struct CycleContext<'a> {
    pub(crate) cycle: u64,
    pub(crate) frontend: &'a mut Frontend,
    pub(crate) arch_reg_file: &'a mut ArgRegFile,
    pub(crate) memory_subsystem: &'a mut MemorySubsystem,
    pub(crate) perf_counters: &'a mut PerfCounters,
}

pub(crate) struct Backend {
    pub(crate) rs_table: RSTable,
    pub(crate) rat: RAT,
    pub(crate) rob: ROB,
    pub(crate) timing: TimingTable,
    stations: StationConfigs,
    memory_read_latency: u8,
    memory_write_latency: u8,
    branch_flush: BranchFlushPolicy,
    trace: Trace,
    // cycles left before the store at the head of the ROB has written memory.
    store_write_remaining: Option<u8>,
}

impl Backend {
    pub(crate) fn new(cpu_config: &CPUConfig) -> Backend {
        Backend {
            rs_table: RSTable::new(&cpu_config.stations),
            rat: RAT::new(),
            rob: ROB::new(cpu_config.rob_capacity),
            timing: TimingTable::default(),
            stations: cpu_config.stations.clone(),
            memory_read_latency: cpu_config.memory_read_latency,
            memory_write_latency: cpu_config.memory_write_latency,
            branch_flush: cpu_config.branch_flush,
            trace: cpu_config.trace.clone(),
            store_write_remaining: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rob.is_empty()
    }

    /// The phase order is fixed: a slot freed by the commit is visible to the
    /// writeback of the same cycle, and a result broadcast in this cycle is
    /// visible to the issue of this cycle.
    pub(crate) fn do_cycle(&mut self, ctx: &mut CycleContext<'_>) {
        self.cycle_commit(ctx);
        self.cycle_writeback(ctx);
        self.cycle_execute(ctx);
        self.cycle_issue(ctx);
    }

    // Retires at most one instruction from the head of the ROB.
    fn cycle_commit(&mut self, ctx: &mut CycleContext<'_>) {
        let Some(rob_index) = self.rob.head() else {
            return;
        };

        let rob_slot = self.rob.get(rob_index);
        if rob_slot.state != ROBSlotState::READY {
            return;
        }

        let opcode = rob_slot.opcode;
        let destination = rob_slot.destination;
        let value = rob_slot.value;
        let pc = rob_slot.pc;
        let rs_index = rob_slot.rs_index;
        let instr_id = rob_slot.instr_id;

        let mut redirect: Option<WordType> = None;
        match opcode {
            Opcode::STORE => {
                // The retire port is occupied until the memory write is done.
                let remaining = self.store_write_remaining.get_or_insert(self.memory_write_latency);
                *remaining -= 1;
                if *remaining > 0 {
                    return;
                }
                self.store_write_remaining = None;

                let Destination::Memory(addr) = destination else {
                    panic!("Backend: store {} retires without an address", rob_index);
                };
                ctx.memory_subsystem.write(addr, value);
                ctx.memory_subsystem.sb.release(rob_index);
                self.rs_table.deallocate(rs_index);
            }
            Opcode::LOAD |
            Opcode::ADD |
            Opcode::SUB |
            Opcode::NAND |
            Opcode::MUL => {
                let Destination::Register(reg) = destination else {
                    panic!("Backend: {} retires without a register", rob_index);
                };
                ctx.arch_reg_file.set_value(reg, value);
            }
            Opcode::BEQ => {
                let Destination::Target(target) = destination else {
                    panic!("Backend: branch {} retires without a target", rob_index);
                };
                ctx.perf_counters.branch_cnt += 1;
                if value != 0 {
                    ctx.perf_counters.taken_cnt += 1;
                    redirect = Some(target);
                } else if self.branch_flush == BranchFlushPolicy::Always {
                    // the loader keeps every pc below MAX_PROGRAM_LEN
                    redirect = Some((pc as WordType).wrapping_add(1));
                }
            }
            Opcode::CALL |
            Opcode::RET => {
                let Destination::Target(target) = destination else {
                    panic!("Backend: {} retires without a target", rob_index);
                };
                if opcode == Opcode::CALL {
                    ctx.arch_reg_file.set_value(LINK_REG, value);
                }
                ctx.perf_counters.taken_cnt += 1;
                redirect = Some(target);
            }
        }

        ctx.arch_reg_file.reset_zero_reg();
        self.rob.retire();
        self.timing.record_commit(instr_id, ctx.cycle);
        ctx.perf_counters.retired_cnt += 1;

        if self.trace.commit {
            info!("Retiring [{} pc={} value={}]", mnemonic(opcode), pc, value);
        }

        if let Some(target) = redirect {
            ctx.frontend.redirect(target);
            self.flush(ctx);
        }
    }

    // Broadcasts the result of at most one finished reservation station on the
    // common result bus. The oldest finished instruction wins.
    fn cycle_writeback(&mut self, ctx: &mut CycleContext<'_>) {
        let rob = &self.rob;
        let winner = self.rs_table.iter()
            .filter(|rs| rs.state == RSState::BUSY && rs.cycles_remaining == 0)
            .min_by_key(|rs| rob.order(rs.rob_slot_index))
            .map(|rs| rs.index);

        let Some(rs_index) = winner else {
            return;
        };

        let rs = self.rs_table.get(rs_index);
        debug_assert!(rs.operands_resolved(), "Backend: {} finished with unresolved operands", rs_index);

        let opcode = rs.opcode;
        let rob_index = rs.rob_slot_index;
        let instr_id = rs.instr_id;
        let (vj, vk) = (rs.vj, rs.vk);

        let value = match opcode {
            // the loaded value, or the value to store
            Opcode::LOAD | Opcode::STORE => vk,
            Opcode::BEQ => (vj == vk) as WordType,
            // the link address; vj holds the pc of the CALL
            Opcode::CALL => vj.wrapping_add(1),
            Opcode::RET => vj,
            Opcode::ADD => vj.wrapping_add(vk),
            Opcode::SUB => vj.wrapping_sub(vk),
            Opcode::NAND => !(vj & vk),
            Opcode::MUL => vj.wrapping_mul(vk),
        };

        let destination = match opcode {
            Opcode::STORE => Some(Destination::Memory(rs.effective_address())),
            Opcode::BEQ | Opcode::CALL => Some(Destination::Target(rs.address)),
            Opcode::RET => Some(Destination::Target(vj)),
            _ => None,
        };

        if self.trace.writeback {
            info!("Broadcast [{}] value={}", rs, value);
        }

        self.rat.clear_producer(rs_index);

        for other in self.rs_table.iter_mut() {
            if other.state != RSState::BUSY {
                continue;
            }

            if other.qj == SourceTag::Waiting(rs_index) {
                other.vj = value;
                other.qj = SourceTag::Ready;
            }

            // The second operand of a load tracks the memory access.
            if other.opcode != Opcode::LOAD && other.qk == SourceTag::Waiting(rs_index) {
                other.vk = value;
                other.qk = SourceTag::Ready;
            }
        }

        self.rob.mark_ready(rob_index, value);
        if let Some(destination) = destination {
            self.rob.change_destination(rob_index, destination);
        }

        match destination {
            Some(Destination::Memory(addr)) => {
                ctx.memory_subsystem.sb.resolve(rob_index, addr, value);
                let rs = self.rs_table.get_mut(rs_index);
                rs.state = RSState::WRITTEN;
                rs.cycles_remaining = self.memory_write_latency;
            }
            _ => self.rs_table.deallocate(rs_index),
        }

        self.timing.record_writeback(instr_id, ctx.cycle);
    }

    // Advances the execution timers and lets loads check for older stores.
    fn cycle_execute(&mut self, ctx: &mut CycleContext<'_>) {
        for i in 0..self.rs_table.capacity {
            let rs_index = RsIndex(i);
            let rs = self.rs_table.get_mut(rs_index);
            if rs.state != RSState::BUSY {
                continue;
            }

            debug_assert!(self.rob.get(rs.rob_slot_index).state != ROBSlotState::UNUSED,
                          "Backend: {} references a free {}", rs_index, rs.rob_slot_index);

            if rs.cycles_remaining > 0 && rs.operands_resolved() {
                if self.trace.execute && self.timing.get(rs.instr_id).is_some_and(|r| r.exec_start.is_none()) {
                    info!("Executing [{}]", rs);
                }
                self.timing.record_exec_start(rs.instr_id, ctx.cycle);
                rs.cycles_remaining -= 1;
            }

            if rs.opcode == Opcode::LOAD && rs.cycles_remaining == 0 && rs.qk != SourceTag::Forwarded {
                let addr = rs.effective_address();
                match ctx.memory_subsystem.sb.check_load(&self.rob, rs.rob_slot_index, addr) {
                    LoadCheck::Memory => {
                        rs.vk = ctx.memory_subsystem.read(addr);
                        rs.qk = SourceTag::Forwarded;
                        rs.cycles_remaining = self.memory_read_latency;
                    }
                    LoadCheck::Forward(value) => {
                        rs.vk = value;
                        rs.qk = SourceTag::Forwarded;
                        ctx.perf_counters.forwarded_load_cnt += 1;
                    }
                    LoadCheck::Stall => {
                        rs.cycles_remaining = 1;
                    }
                }
            }

            if rs.cycles_remaining == 0 {
                self.timing.record_exec_end(rs.instr_id, ctx.cycle);
            }
        }
    }

    // Issues the next instruction, or stalls when there is no room for it.
    fn cycle_issue(&mut self, ctx: &mut CycleContext<'_>) {
        let Some(instr) = ctx.frontend.peek().copied() else {
            return;
        };

        if !self.rob.has_space() {
            ctx.perf_counters.rob_full_stall_cnt += 1;
            return;
        }

        let class = instr.opcode.station_class();
        let Some(rs_index) = self.rs_table.allocate(class) else {
            ctx.perf_counters.rs_full_stall_cnt += 1;
            return;
        };

        let instr_id = self.timing.record_issue(instr.pc, ctx.cycle);
        let destination = match instr.dst {
            Some(reg) => Destination::Register(reg),
            None => Destination::None,
        };
        let rob_index = self.rob.allocate(instr.opcode, instr.pc, destination, rs_index, instr_id);
        ctx.memory_subsystem.sb.allocate(rob_index, instr.opcode == Opcode::STORE);

        let (vj, qj) = match instr.opcode {
            Opcode::CALL => (instr.pc as WordType, SourceTag::Ready),
            _ => self.read_operand(instr.src1, ctx.arch_reg_file),
        };
        let (vk, qk) = match instr.opcode {
            Opcode::LOAD | Opcode::CALL | Opcode::RET => (0, SourceTag::Ready),
            _ => self.read_operand(instr.src2, ctx.arch_reg_file),
        };

        let rs = self.rs_table.get_mut(rs_index);
        rs.opcode = instr.opcode;
        rs.vj = vj;
        rs.qj = qj;
        rs.vk = vk;
        rs.qk = qk;
        rs.rob_slot_index = rob_index;
        rs.cycles_remaining = self.stations.get(class).latency;
        rs.address = instr.static_target().unwrap_or(instr.imm);
        rs.instr_id = instr_id;

        if instr.opcode.claims_register() {
            if let Some(dst) = instr.dst {
                self.rat.set(dst, rs_index);
            }
        }
        self.rat.reset_zero_reg();

        if self.trace.issue {
            info!("Issued [{}] {}", instr, rs_index);
        }

        ctx.frontend.advance();
        ctx.perf_counters.issue_cnt += 1;
    }

    fn read_operand(&self, reg: Option<RegisterType>, arch_reg_file: &ArgRegFile) -> (WordType, SourceTag) {
        let Some(reg) = reg else {
            return (0, SourceTag::Ready);
        };

        if reg == ZERO_REG {
            return (0, SourceTag::Ready);
        }

        let value = self.rob.find_value(reg).unwrap_or_else(|| arch_reg_file.get_value(reg));
        match self.rat.get(reg) {
            Some(producer) => (value, SourceTag::Waiting(producer)),
            None => (value, SourceTag::Ready),
        }
    }

    // Everything in flight is younger than the retiring control instruction and
    // is on the wrong path.
    fn flush(&mut self, ctx: &mut CycleContext<'_>) {
        let busy_stations = self.rs_table.busy_count();
        let discarded = self.rob.flush();
        self.rs_table.flush();
        self.rat.flush();
        ctx.memory_subsystem.sb.flush();
        self.store_write_remaining = None;

        ctx.perf_counters.flush_cnt += 1;
        ctx.perf_counters.squashed_cnt += discarded.len() as u64;

        if self.trace.flush {
            info!("Pipeline flush: squashed {} instructions, freed {} stations, pc={}",
                  discarded.len(), busy_stations, ctx.frontend.pc);
        }
    }
}
