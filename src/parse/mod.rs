//! Parsers (C3): two surface grammars, both producing the same [`Program`]
//! value. Neither grammar is part of the validated core contract beyond
//! "produces a C2 value the core accepts" — but both still owe their
//! callers precise, line-numbered diagnostics, which is what most of this
//! module is actually about.
//!
//! Tokenizing keywords is plain `str::split_whitespace` (line-oriented
//! grammars don't need a combinator library to find the next word); the one
//! place a real grammar does the work is validating that an operand token
//! is a well-formed signed integer literal, via the same `chumsky` the
//! teacher's text-IR assembler used for its own tokenizing (`src/ir.rs`,
//! now replaced) and its C-like dialect (`src/avc.rs`).

use chumsky::prelude::*;
use std::path::Path;

use crate::error::ParseError;
use crate::ir::Instruction;

pub mod flat;
pub mod func;

pub use flat::{parse_flat, parse_flat_str};
pub use func::{parse_program, parse_program_str};

/// Strip a `#` or `//` comment to end-of-line, whichever starts first.
fn strip_comment(line: &str) -> &str {
    let hash = line.find('#');
    let slash = line.find("//");
    match (hash, slash) {
        (Some(h), Some(s)) => &line[..h.min(s)],
        (Some(h), None) => &line[..h],
        (None, Some(s)) => &line[..s],
        (None, None) => line,
    }
}

/// `-?[0-9]+`, matched against the whole token (no surrounding junk).
fn signed_integer_literal() -> impl Parser<char, (), Error = Simple<char>> {
    just('-').or_not().then(text::int(10)).ignored().then_ignore(end())
}

fn parse_i64_operand(token: &str, line: usize) -> Result<i64, ParseError> {
    signed_integer_literal()
        .parse(token)
        .map_err(|_| ParseError::NonIntegerOperand {
            line,
            text: token.to_string(),
        })?;
    token.parse::<i64>().map_err(|_| ParseError::NonIntegerOperand {
        line,
        text: token.to_string(),
    })
}

fn parse_u32_operand(token: &str, line: usize) -> Result<u32, ParseError> {
    text::int(10)
        .then_ignore(end())
        .parse(token)
        .map_err(|_| ParseError::NonIntegerOperand {
            line,
            text: token.to_string(),
        })?;
    token.parse::<u32>().map_err(|_| ParseError::NonIntegerOperand {
        line,
        text: token.to_string(),
    })
}

fn expect_operand_count(instr: &str, operands: &[String], expected: usize, line: usize) -> Result<(), ParseError> {
    if operands.len() != expected {
        return Err(ParseError::BadOperandCount {
            line,
            instr: instr.to_string(),
            expected,
            got: operands.len(),
        });
    }
    Ok(())
}

/// Parse one already comment-stripped, non-blank body/flat line into an
/// instruction. `extended` gates `call`/`loadarg`, which only the
/// function-block grammar's bodies accept (§6).
fn build_instruction(keyword: &str, operands: &[String], line: usize, extended: bool) -> Result<Instruction, ParseError> {
    match keyword.to_ascii_lowercase().as_str() {
        "load" => {
            expect_operand_count(keyword, operands, 1, line)?;
            Ok(Instruction::LoadImm(parse_i64_operand(&operands[0], line)?))
        }
        "add" => {
            expect_operand_count(keyword, operands, 0, line)?;
            Ok(Instruction::Add)
        }
        "sub" => {
            expect_operand_count(keyword, operands, 0, line)?;
            Ok(Instruction::Sub)
        }
        "mul" => {
            expect_operand_count(keyword, operands, 0, line)?;
            Ok(Instruction::Mul)
        }
        "div" => {
            expect_operand_count(keyword, operands, 0, line)?;
            Ok(Instruction::Div)
        }
        "print" => {
            expect_operand_count(keyword, operands, 0, line)?;
            Ok(Instruction::Print)
        }
        "ret" | "return" => {
            expect_operand_count(keyword, operands, 0, line)?;
            Ok(Instruction::Return)
        }
        "call" if extended => {
            expect_operand_count(keyword, operands, 1, line)?;
            Ok(Instruction::Call(operands[0].clone()))
        }
        "loadarg" if extended => {
            expect_operand_count(keyword, operands, 1, line)?;
            Ok(Instruction::LoadArg(parse_u32_operand(&operands[0], line)?))
        }
        _ => Err(ParseError::UnknownInstruction {
            line,
            instr: keyword.to_string(),
        }),
    }
}

fn read_source(path: impl AsRef<Path>) -> Result<String, ParseError> {
    std::fs::read_to_string(path.as_ref()).map_err(|e| ParseError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hash_and_slash_comments() {
        assert_eq!(strip_comment("add # plus"), "add ");
        assert_eq!(strip_comment("add // plus"), "add ");
        assert_eq!(strip_comment("add"), "add");
    }

    #[test]
    fn rejects_non_integer_operand() {
        let err = parse_i64_operand("abc", 3).unwrap_err();
        assert_eq!(err, ParseError::NonIntegerOperand { line: 3, text: "abc".into() });
    }

    #[test]
    fn accepts_negative_integer_operand() {
        assert_eq!(parse_i64_operand("-17", 1).unwrap(), -17);
    }
}
