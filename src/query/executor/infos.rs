// Executor Register Layout
//
// The register part of every executor's configuration. Stage-specific
// parameters live next to each executor.

use std::collections::BTreeSet;

use crate::common::types::RegisterId;
use crate::query::executor::result::{QueryError, QueryResult};

/// Immutable register layout of one stage.
///
/// The set of registers copied from an input row into an output row is
/// computed once here instead of per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorInfos {
    nr_input_registers: RegisterId,
    nr_output_registers: RegisterId,
    output_registers: BTreeSet<RegisterId>,
    registers_to_clear: BTreeSet<RegisterId>,
    registers_to_keep: BTreeSet<RegisterId>,
    copied_registers: Vec<RegisterId>,
}

impl ExecutorInfos {
    pub fn new(
        nr_input_registers: RegisterId,
        nr_output_registers: RegisterId,
        output_registers: impl IntoIterator<Item = RegisterId>,
        registers_to_clear: impl IntoIterator<Item = RegisterId>,
        registers_to_keep: impl IntoIterator<Item = RegisterId>,
    ) -> QueryResult<Self> {
        let output_registers: BTreeSet<RegisterId> = output_registers.into_iter().collect();
        let registers_to_clear: BTreeSet<RegisterId> = registers_to_clear.into_iter().collect();
        let registers_to_keep: BTreeSet<RegisterId> = registers_to_keep.into_iter().collect();

        if nr_input_registers > nr_output_registers {
            return Err(QueryError::InvalidConfiguration(format!(
                "{} input registers do not fit into {} output registers",
                nr_input_registers, nr_output_registers
            )));
        }
        if let Some(reg) = output_registers.iter().find(|r| **r >= nr_output_registers) {
            return Err(QueryError::InvalidConfiguration(format!(
                "output register {} out of range ({} registers)",
                reg, nr_output_registers
            )));
        }
        if let Some(reg) = registers_to_keep.iter().find(|r| **r >= nr_input_registers) {
            return Err(QueryError::InvalidConfiguration(format!(
                "kept register {} is not an input register ({} registers)",
                reg, nr_input_registers
            )));
        }
        if let Some(reg) = output_registers.intersection(&registers_to_keep).next() {
            return Err(QueryError::InvalidConfiguration(format!(
                "register {} is both kept from input and written by the stage",
                reg
            )));
        }

        let copied_registers = registers_to_keep.difference(&registers_to_clear).copied().collect();

        Ok(ExecutorInfos {
            nr_input_registers,
            nr_output_registers,
            output_registers,
            registers_to_clear,
            registers_to_keep,
            copied_registers,
        })
    }

    /// Layout of a stage that writes nothing and keeps every input register
    pub fn pass_all(nr_registers: RegisterId) -> Self {
        let all: BTreeSet<RegisterId> = (0..nr_registers).collect();
        ExecutorInfos {
            nr_input_registers: nr_registers,
            nr_output_registers: nr_registers,
            output_registers: BTreeSet::new(),
            registers_to_clear: BTreeSet::new(),
            copied_registers: all.iter().copied().collect(),
            registers_to_keep: all,
        }
    }

    pub fn nr_input_registers(&self) -> RegisterId {
        self.nr_input_registers
    }

    pub fn nr_output_registers(&self) -> RegisterId {
        self.nr_output_registers
    }

    pub fn output_registers(&self) -> &BTreeSet<RegisterId> {
        &self.output_registers
    }

    pub fn registers_to_clear(&self) -> &BTreeSet<RegisterId> {
        &self.registers_to_clear
    }

    pub fn registers_to_keep(&self) -> &BTreeSet<RegisterId> {
        &self.registers_to_keep
    }

    /// Registers copied from the input row: kept minus cleared
    pub fn copied_registers(&self) -> &[RegisterId] {
        &self.copied_registers
    }
}
