//! Compute-budget instruction planning and ordering validation
//!
//! Instruction order for every transaction the builder emits:
//! 1. Compute budget instructions (CU limit, CU price), at most one of each
//! 2. Program instructions, in the order they were added

use crate::tx_builder::errors::TransactionBuilderError;
use solana_sdk::{compute_budget::ComputeBudgetInstruction, instruction::Instruction};

/// `SetComputeUnitLimit` discriminator
pub const SET_COMPUTE_UNIT_LIMIT_DISCRIMINATOR: u8 = 2;

/// `SetComputeUnitPrice` discriminator
pub const SET_COMPUTE_UNIT_PRICE_DISCRIMINATOR: u8 = 3;

/// Plan of instructions with ordering metadata
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    /// The ordered list of instructions for the transaction
    pub instructions: Vec<Instruction>,

    /// Number of leading compute budget instructions
    pub compute_budget_count: usize,
}

impl InstructionPlan {
    pub fn new(instructions: Vec<Instruction>, compute_budget_count: usize) -> Self {
        Self {
            instructions,
            compute_budget_count,
        }
    }

    pub fn has_compute_budget(&self) -> bool {
        self.compute_budget_count > 0
    }
}

/// Compute budget settings decoded from a transaction's instructions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComputeBudgetDirectives {
    pub unit_limit: Option<u32>,
    pub unit_price_micro_lamports: Option<u64>,
}

pub fn is_compute_budget_instruction(ix: &Instruction) -> bool {
    ix.program_id == solana_sdk::compute_budget::id()
}

/// Decode `SetComputeUnitLimit` / `SetComputeUnitPrice` values
///
/// Later instructions override earlier ones; malformed payloads are ignored.
pub fn compute_budget_directives(instructions: &[Instruction]) -> ComputeBudgetDirectives {
    let mut directives = ComputeBudgetDirectives::default();

    for ix in instructions.iter().filter(|ix| is_compute_budget_instruction(ix)) {
        match ix.data.split_first() {
            Some((&SET_COMPUTE_UNIT_LIMIT_DISCRIMINATOR, rest)) if rest.len() >= 4 => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(&rest[..4]);
                directives.unit_limit = Some(u32::from_le_bytes(buf));
            }
            Some((&SET_COMPUTE_UNIT_PRICE_DISCRIMINATOR, rest)) if rest.len() >= 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&rest[..8]);
                directives.unit_price_micro_lamports = Some(u64::from_le_bytes(buf));
            }
            _ => {}
        }
    }

    directives
}

/// Compute budget instructions for an optional limit and price
pub fn plan_compute_budget_instructions(
    unit_limit: Option<u32>,
    unit_price: Option<u64>,
) -> Vec<Instruction> {
    let mut instructions = Vec::with_capacity(2);
    if let Some(limit) = unit_limit {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(limit));
    }
    if let Some(price) = unit_price {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(price));
    }
    instructions
}

/// Prepend compute budget instructions to the program instructions
///
/// Fails if the program instructions already contain a compute budget
/// instruction while a limit or price is being synthesized, since that
/// would produce duplicate directives.
pub fn plan_instructions(
    unit_limit: Option<u32>,
    unit_price: Option<u64>,
    program_instructions: Vec<Instruction>,
) -> Result<InstructionPlan, TransactionBuilderError> {
    let budget = plan_compute_budget_instructions(unit_limit, unit_price);

    if !budget.is_empty() {
        if let Some(idx) = program_instructions
            .iter()
            .position(is_compute_budget_instruction)
        {
            return Err(TransactionBuilderError::invalid_order(format!(
                "compute budget set on builder but instruction {} is already a compute budget instruction",
                idx
            )));
        }
    }

    let compute_budget_count = budget.len();
    let mut instructions = Vec::with_capacity(compute_budget_count + program_instructions.len());
    instructions.extend(budget);
    instructions.extend(program_instructions);

    Ok(InstructionPlan::new(instructions, compute_budget_count))
}

/// Validate instruction ordering
///
/// Compute budget instructions must precede all program instructions and
/// each discriminator may appear at most once.
pub fn sanity_check_ix_order(instructions: &[Instruction]) -> Result<(), TransactionBuilderError> {
    if instructions.is_empty() {
        return Err(TransactionBuilderError::invalid_order(
            "Instruction list is empty",
        ));
    }

    let mut seen_program_ix = false;
    let mut seen_limit = false;
    let mut seen_price = false;

    for (idx, ix) in instructions.iter().enumerate() {
        if !is_compute_budget_instruction(ix) {
            seen_program_ix = true;
            continue;
        }

        if seen_program_ix {
            return Err(TransactionBuilderError::invalid_order(format!(
                "Compute budget instruction at position {} follows a program instruction",
                idx
            )));
        }

        let seen = match ix.data.first() {
            Some(&SET_COMPUTE_UNIT_LIMIT_DISCRIMINATOR) => &mut seen_limit,
            Some(&SET_COMPUTE_UNIT_PRICE_DISCRIMINATOR) => &mut seen_price,
            _ => continue,
        };
        if *seen {
            return Err(TransactionBuilderError::invalid_order(format!(
                "Duplicate compute budget directive at position {}",
                idx
            )));
        }
        *seen = true;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{instruction::AccountMeta, pubkey::Pubkey};

    fn program_ix() -> Instruction {
        Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3, 4],
            vec![AccountMeta::new(Pubkey::new_unique(), false)],
        )
    }

    #[test]
    fn test_plan_with_limit_and_price() {
        let ix = program_ix();
        let program_id = ix.program_id;

        let plan = plan_instructions(Some(200_000), Some(10_000), vec![ix])
            .expect("Should plan instructions");

        assert!(plan.has_compute_budget());
        assert_eq!(plan.instructions.len(), 3);
        assert_eq!(plan.instructions[0].program_id, solana_sdk::compute_budget::id());
        assert_eq!(plan.instructions[1].program_id, solana_sdk::compute_budget::id());
        assert_eq!(plan.instructions[2].program_id, program_id);
    }

    #[test]
    fn test_plan_without_compute_budget() {
        let plan = plan_instructions(None, None, vec![program_ix()]).expect("Should plan");
        assert!(!plan.has_compute_budget());
        assert_eq!(plan.instructions.len(), 1);
    }

    #[test]
    fn test_plan_rejects_duplicate_directive() {
        let result = plan_instructions(
            Some(100_000),
            None,
            vec![
                ComputeBudgetInstruction::set_compute_unit_limit(50_000),
                program_ix(),
            ],
        );
        assert!(matches!(
            result,
            Err(TransactionBuilderError::InvalidInstructionOrder(_))
        ));
    }

    #[test]
    fn test_directives_decoding() {
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(250_000),
            ComputeBudgetInstruction::set_compute_unit_price(42),
            program_ix(),
        ];
        let directives = compute_budget_directives(&instructions);
        assert_eq!(directives.unit_limit, Some(250_000));
        assert_eq!(directives.unit_price_micro_lamports, Some(42));

        assert_eq!(
            compute_budget_directives(&[program_ix()]),
            ComputeBudgetDirectives::default()
        );
    }

    #[test]
    fn test_sanity_check_valid() {
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            ComputeBudgetInstruction::set_compute_unit_price(10_000),
            program_ix(),
        ];
        assert!(sanity_check_ix_order(&instructions).is_ok());
    }

    #[test]
    fn test_sanity_check_empty_list() {
        assert!(sanity_check_ix_order(&[]).is_err());
    }

    #[test]
    fn test_sanity_check_budget_after_program() {
        let instructions = vec![
            program_ix(),
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
        ];
        match sanity_check_ix_order(&instructions) {
            Err(TransactionBuilderError::InvalidInstructionOrder(msg)) => {
                assert!(msg.contains("follows a program instruction"));
            }
            other => panic!("Expected InvalidInstructionOrder error, got {:?}", other),
        }
    }

    #[test]
    fn test_sanity_check_duplicate_limit() {
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(200_000),
            ComputeBudgetInstruction::set_compute_unit_limit(300_000),
            program_ix(),
        ];
        match sanity_check_ix_order(&instructions) {
            Err(TransactionBuilderError::InvalidInstructionOrder(msg)) => {
                assert!(msg.contains("Duplicate"));
            }
            other => panic!("Expected InvalidInstructionOrder error, got {:?}", other),
        }
    }
}
