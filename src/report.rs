use std::fmt::Write;

use crate::backend::timing::TimingRecord;
use crate::cpu::{ArgRegFile, PerfCounters, CPU};
use crate::instructions::instructions::Program;
use crate::memory_subsystem::memory_subsystem::MemorySubsystem;

/// One row per dynamic instruction, in issue order. Phases an instruction
/// never reached are shown as '-'.
pub(crate) fn format_timing(records: &[TimingRecord], program: &Program) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>4} {:<24} {:>6} {:>6} {:>6} {:>6} {:>6}",
                     "pc", "instruction", "issue", "start", "end", "wb", "commit");

    for record in records {
        let instr = program.get_instr(record.pc)
            .map_or_else(String::new, |instr| {
                let mut instr = *instr;
                instr.line = None;
                instr.to_string()
            });
        // the stamps after the pc; the missing ones are padded
        let mut stamps: Vec<String> = record.fields().iter().skip(1).map(|cycle| cycle.to_string()).collect();
        stamps.resize(5, "-".to_string());
        let _ = writeln!(out, "{:>4} {:<24} {:>6} {:>6} {:>6} {:>6} {:>6}",
                         record.pc, instr, stamps[0], stamps[1], stamps[2], stamps[3], stamps[4]);
    }
    out
}

fn format_registers(arch_reg_file: &ArgRegFile) -> String {
    arch_reg_file.values()
        .iter()
        .enumerate()
        .map(|(reg, value)| format!("R{}={}", reg, value))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_memory(memory_subsystem: &MemorySubsystem) -> String {
    let mut out = String::new();
    for (addr, value) in memory_subsystem.non_zero() {
        let _ = writeln!(out, "  [{}] = {}", addr, value);
    }
    out
}

fn format_perf_counters(perf_counters: &PerfCounters) -> String {
    format!("cycles={} issued={} retired={} ipc={:.2} flushes={} squashed={} branches={} taken={} \
             rob_full_stalls={} rs_full_stalls={} forwarded_loads={}",
            perf_counters.cycle_cnt,
            perf_counters.issue_cnt,
            perf_counters.retired_cnt,
            perf_counters.ipc(),
            perf_counters.flush_cnt,
            perf_counters.squashed_cnt,
            perf_counters.branch_cnt,
            perf_counters.taken_cnt,
            perf_counters.rob_full_stall_cnt,
            perf_counters.rs_full_stall_cnt,
            perf_counters.forwarded_load_cnt)
}

pub(crate) fn format_report(cpu: &CPU, program: &Program) -> String {
    let mut out = String::new();
    out.push_str("Timing:\n");
    out.push_str(&format_timing(cpu.backend.timing.records(), program));
    let _ = writeln!(out, "\nRegisters:\n  {}", format_registers(&cpu.arch_reg_file));
    out.push_str("\nMemory (non-zero):\n");
    out.push_str(&format_memory(&cpu.memory_subsystem));
    let _ = writeln!(out, "\nPerformance:\n  {}", format_perf_counters(&cpu.perf_counters));
    out
}
