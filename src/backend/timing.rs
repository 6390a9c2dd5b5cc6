/// The cycle timestamps of a single dynamic instruction. The fields fill in
/// order; an instruction that is flushed or still in flight when the run ends
/// keeps a partial record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TimingRecord {
    pub(crate) pc: usize,
    pub(crate) issue: u64,
    pub(crate) exec_start: Option<u64>,
    pub(crate) exec_end: Option<u64>,
    pub(crate) writeback: Option<u64>,
    pub(crate) commit: Option<u64>,
}

impl TimingRecord {
    /// The timestamps that have been recorded so far, in phase order.
    pub(crate) fn fields(&self) -> Vec<u64> {
        let mut fields = vec![self.pc as u64, self.issue];
        for stamp in [self.exec_start, self.exec_end, self.writeback, self.commit] {
            match stamp {
                Some(cycle) => fields.push(cycle),
                None => break,
            }
        }
        fields
    }
}

/// Timing records of all dynamic instructions in issue order; the dynamic
/// instruction id is the position in this table.
#[derive(Default)]
pub(crate) struct TimingTable {
    records: Vec<TimingRecord>,
}

impl TimingTable {
    pub(crate) fn record_issue(&mut self, pc: usize, cycle: u64) -> usize {
        self.records.push(TimingRecord {
            pc,
            issue: cycle,
            exec_start: None,
            exec_end: None,
            writeback: None,
            commit: None,
        });
        self.records.len() - 1
    }

    // The execution stamps are only taken the first time: a load that stalls
    // on an older store keeps its original start.
    pub(crate) fn record_exec_start(&mut self, instr_id: usize, cycle: u64) {
        let record = &mut self.records[instr_id];
        if record.exec_start.is_none() {
            record.exec_start = Some(cycle);
        }
    }

    pub(crate) fn record_exec_end(&mut self, instr_id: usize, cycle: u64) {
        let record = &mut self.records[instr_id];
        if record.exec_end.is_none() {
            record.exec_end = Some(cycle);
        }
    }

    pub(crate) fn record_writeback(&mut self, instr_id: usize, cycle: u64) {
        let record = &mut self.records[instr_id];
        debug_assert!(record.writeback.is_none(), "instruction {} written back twice", instr_id);
        record.writeback = Some(cycle);
    }

    pub(crate) fn record_commit(&mut self, instr_id: usize, cycle: u64) {
        let record = &mut self.records[instr_id];
        debug_assert!(record.commit.is_none(), "instruction {} committed twice", instr_id);
        record.commit = Some(cycle);
    }

    pub(crate) fn get(&self, instr_id: usize) -> Option<&TimingRecord> {
        self.records.get(instr_id)
    }

    pub(crate) fn records(&self) -> &[TimingRecord] {
        &self.records
    }
}
