//! Flat grammar: a line-oriented instruction list with no function
//! structure at all. Parses into a single `Main` function of arity zero
//! (§6's "one function named `Main` containing the file's instructions").

use std::path::Path;

use crate::error::ParseError;
use crate::ir::{Function, Program};

use super::{build_instruction, read_source, strip_comment};

pub fn parse_flat(path: impl AsRef<Path>) -> Result<Program, ParseError> {
    parse_flat_str(&read_source(path)?)
}

pub fn parse_flat_str(src: &str) -> Result<Program, ParseError> {
    let mut body = Vec::new();

    for (idx, raw_line) in src.lines().enumerate() {
        let line = idx + 1;
        let stripped = strip_comment(raw_line).trim();
        if stripped.is_empty() {
            continue;
        }

        let tokens: Vec<String> = stripped.split_whitespace().map(str::to_string).collect();
        let (keyword, operands) = tokens.split_first().expect("non-blank line has at least one token");
        body.push(build_instruction(keyword, operands, line, false)?);
    }

    Ok(Program::new().with_function(Function::new("Main", Vec::new(), body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instruction;

    #[test]
    fn parses_scenario_one() {
        let program = parse_flat_str("load 10\nload 5\nadd\nret\n").unwrap();
        let main = program.get_main_function().unwrap();
        assert_eq!(
            main.body,
            vec![Instruction::LoadImm(10), Instruction::LoadImm(5), Instruction::Add, Instruction::Return]
        );
    }

    #[test]
    fn ignores_blank_lines_and_comments() {
        let program = parse_flat_str("\n# a comment\nload 1\n// another\nreturn\n").unwrap();
        let main = program.get_main_function().unwrap();
        assert_eq!(main.body, vec![Instruction::LoadImm(1), Instruction::Return]);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let program = parse_flat_str("LOAD 1\nRETURN\n").unwrap();
        let main = program.get_main_function().unwrap();
        assert_eq!(main.body, vec![Instruction::LoadImm(1), Instruction::Return]);
    }

    #[test]
    fn load_rejects_wrong_operand_count() {
        let err = parse_flat_str("load 1 2\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::BadOperandCount {
                line: 1,
                instr: "load".to_string(),
                expected: 1,
                got: 2,
            }
        );
    }

    #[test]
    fn rejects_unknown_instruction() {
        let err = parse_flat_str("frobnicate\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownInstruction {
                line: 1,
                instr: "frobnicate".to_string(),
            }
        );
    }
}
