//! Function-block grammar: zero or more `returnType name(params) { body }`
//! declarations, each parsed into a [`Function`] with the header's parameter
//! count as its arity. Body lines accept everything the flat grammar does,
//! plus `call` and `loadarg` (§6).

use chumsky::prelude::*;
use std::path::Path;

use crate::error::ParseError;
use crate::ir::{Function, Program};

use super::{build_instruction, read_source, strip_comment};

pub fn parse_program(path: impl AsRef<Path>) -> Result<Program, ParseError> {
    parse_program_str(&read_source(path)?)
}

/// `<ident> <ident> ( <ident>, <ident>, ... )`, whitespace-tolerant.
fn header_parser() -> impl Parser<char, (String, String, Vec<String>), Error = Simple<char>> {
    text::ident()
        .padded()
        .then(text::ident())
        .padded()
        .then(
            text::ident()
                .padded()
                .separated_by(just(','))
                .allow_trailing()
                .delimited_by(just('('), just(')')),
        )
        .then_ignore(end())
        .map(|((return_type, name), params)| (return_type, name, params))
}

pub fn parse_program_str(src: &str) -> Result<Program, ParseError> {
    let lines: Vec<&str> = src.lines().collect();
    let mut program = Program::new();
    let mut i = 0usize;

    while i < lines.len() {
        let stripped = strip_comment(lines[i]).trim();
        if stripped.is_empty() {
            i += 1;
            continue;
        }

        let header_line = i + 1;
        let (_return_type, name, params) = header_parser()
            .parse(stripped)
            .map_err(|_| ParseError::MalformedHeader {
                line: header_line,
                text: stripped.to_string(),
            })?;
        i += 1;

        while i < lines.len() && strip_comment(lines[i]).trim().is_empty() {
            i += 1;
        }
        let brace_line = i + 1;
        if i >= lines.len() || strip_comment(lines[i]).trim() != "{" {
            return Err(ParseError::MissingOpenBrace { line: brace_line });
        }
        i += 1;

        let mut body = Vec::new();
        let mut closed = false;
        while i < lines.len() {
            let body_line = i + 1;
            let body_stripped = strip_comment(lines[i]).trim();
            if body_stripped == "}" {
                i += 1;
                closed = true;
                break;
            }
            if body_stripped.is_empty() {
                i += 1;
                continue;
            }
            let tokens: Vec<String> = body_stripped.split_whitespace().map(str::to_string).collect();
            let (keyword, operands) = tokens.split_first().expect("non-blank line has at least one token");
            body.push(build_instruction(keyword, operands, body_line, true)?);
            i += 1;
        }

        if !closed {
            // The taxonomy has no distinct "unterminated body" kind; an
            // unclosed body is, definitionally, one that never found its
            // opening brace's matching close, so it is reported at the
            // brace that never got to be a pair.
            return Err(ParseError::MissingOpenBrace { line: brace_line });
        }

        program.push(Function::new(name, params, body));
    }

    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instruction;

    #[test]
    fn parses_scenario_five() {
        let src = "int Main()\n{\nload 10\nload 5\ncall Step1\nload 2\nmul\nprint\nreturn\n}\nint Step1(int, int)\n{\nloadarg 0\nloadarg 1\nadd\nreturn\n}\n";
        let program = parse_program_str(src).unwrap();
        let main = program.get_function("Main").unwrap();
        assert_eq!(
            main.body,
            vec![
                Instruction::LoadImm(10),
                Instruction::LoadImm(5),
                Instruction::Call("Step1".into()),
                Instruction::LoadImm(2),
                Instruction::Mul,
                Instruction::Print,
                Instruction::Return,
            ]
        );
        let step1 = program.get_function("Step1").unwrap();
        assert_eq!(step1.parameter_arity, 2);
        assert_eq!(
            step1.body,
            vec![Instruction::LoadArg(0), Instruction::LoadArg(1), Instruction::Add, Instruction::Return]
        );
    }

    #[test]
    fn zero_arity_header_parses() {
        let src = "int Main()\n{\nload 1\nreturn\n}\n";
        let program = parse_program_str(src).unwrap();
        assert_eq!(program.get_main_function().unwrap().parameter_arity, 0);
    }

    #[test]
    fn missing_open_brace_is_reported() {
        let src = "int Main()\nload 1\n";
        let err = parse_program_str(src).unwrap_err();
        assert_eq!(err, ParseError::MissingOpenBrace { line: 2 });
    }

    #[test]
    fn malformed_header_is_reported() {
        let src = "this is not a header\n";
        let err = parse_program_str(src).unwrap_err();
        assert!(matches!(err, ParseError::MalformedHeader { line: 1, .. }));
    }
}
