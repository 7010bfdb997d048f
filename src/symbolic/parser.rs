//! Parser for assembly source.
//!
//! The grammar is built from `nom` combinators. Bracketed expressions are tokenized with
//! [logos](super::token::Token) and parsed by precedence climbing.

use logos::Logos;
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_till, take_until, take_while, take_while1, take_while_m_n},
    character::complete::{char, multispace0, multispace1, space0, space1},
    combinator::{cut, map, map_res, not, opt, recognize, value},
    error::{context, ErrorKind, ParseError as _},
    multi::{many0, separated_list},
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
};

use crate::error::SyntaxErrorKind;
use crate::instruction::{descriptors_for, OperandFormat, Register};
use crate::parsing::offset_of;

use super::ast::{DataSize, Expression, Instruction, Member, Node, NodeKind, Operands};
use super::token::Token;

pub type ParseError = crate::error::ParseError<SyntaxErrorKind>;
type Result<'a, T> = IResult<&'a str, T, ParseError>;

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn comment(input: &str) -> Result<&str> {
    recognize(pair(char(';'), take_till(|c| c == '\n')))(input)
}

/// Whitespace, newlines and comments.
fn ws(input: &str) -> Result<()> {
    value((), many0(alt((multispace1, comment))))(input)
}

fn identifier(input: &str) -> Result<&str> {
    recognize(pair(
        take_while_m_n(1, 1, |c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(input)
}

/// Matches `word` case-insensitively, only if it is not the prefix of a longer name
/// or of a label.
fn keyword(word: &'static str) -> impl Fn(&str) -> Result<&str> {
    move |input| terminated(
        tag_no_case(word),
        not(take_while_m_n(1, 1, |c: char| is_ident_char(c) || c == ':')),
    )(input)
}

fn exported(input: &str) -> Result<bool> {
    map(opt(char('+')), |marker| marker.is_some())(input)
}

pub fn register(input: &str) -> Result<Register> {
    map_res(identifier, |name: &str| name.parse::<Register>())(input)
}

/// Hex digits that must not run into a name.
fn hex_number(input: &str) -> Result<u32> {
    let (rest, digits) = terminated(
        take_while1(|c: char| c.is_ascii_hexdigit()),
        not(take_while_m_n(1, 1, is_ident_char)),
    )(input)?;

    match u32::from_str_radix(digits, 16) {
        Ok(number) => Ok((rest, number)),
        Err(_) => Err(nom::Err::Failure(
            ParseError::from_kind(input, SyntaxErrorKind::LiteralOverflow),
        )),
    }
}

fn hex_literal(input: &str) -> Result<u32> {
    preceded(char('$'), hex_number)(input)
}

struct ExpressionParser<'a> {
    tokens: Vec<(Token<'a>, usize)>,
    position: usize,
    end: usize,
}

type ExpressionResult = std::result::Result<Expression, (usize, &'static str)>;

impl<'a> ExpressionParser<'a> {
    fn new(source: &'a str) -> ExpressionParser<'a> {
        let mut lexer = Token::lexer(source);
        let mut tokens = Vec::new();

        while let Some(token) = lexer.next() {
            tokens.push((token, lexer.span().start));
        }

        ExpressionParser {
            tokens,
            position: 0,
            end: source.len(),
        }
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.position)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.end)
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.position).map(|(token, _)| token)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek().cloned();
        self.position += 1;
        token
    }

    fn expect(&mut self, expected: Token<'a>, reason: &'static str) -> std::result::Result<(), (usize, &'static str)> {
        let offset = self.offset();

        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            _ => Err((offset, reason)),
        }
    }

    fn identifier(&mut self, reason: &'static str) -> std::result::Result<String, (usize, &'static str)> {
        let offset = self.offset();

        match self.next() {
            Some(Token::Identifier(name)) => Ok(name.to_string()),
            _ => Err((offset, reason)),
        }
    }

    fn parse(mut self) -> ExpressionResult {
        let expression = self.binary(0)?;

        match self.peek() {
            None => Ok(expression),
            Some(Token::Error) => Err((self.offset(), "unexpected character")),
            Some(_) => Err((self.offset(), "unexpected token")),
        }
    }

    fn binary(&mut self, min_precedence: u8) -> ExpressionResult {
        let mut lhs = self.primary()?;

        while let Some(operator) = self.peek().and_then(Token::operator) {
            let precedence = operator.precedence();

            if precedence < min_precedence {
                break;
            }

            self.position += 1;
            let rhs = self.binary(precedence + 1)?;

            lhs = Expression::Binary {
                operator,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn primary(&mut self) -> ExpressionResult {
        let offset = self.offset();

        match self.next() {
            Some(Token::HexLiteral(value)) => Ok(Expression::Literal(value)),
            Some(Token::Variable(name)) => Ok(Expression::Symbol(name.to_string())),
            Some(Token::GroupBegin) => {
                let inner = self.binary(0)?;
                self.expect(Token::GroupEnd, "expected ')'")?;
                Ok(inner)
            },
            Some(Token::InterpretBegin) => {
                let structure = self.identifier("expected a structure name")?;
                self.expect(Token::InterpretEnd, "expected '>'")?;
                let symbol = self.identifier("expected a symbol name")?;
                self.expect(Token::MemberAccess, "expected '.'")?;
                let member = self.identifier("expected a member name")?;

                Ok(Expression::InterpretAs { structure, symbol, member })
            },
            Some(Token::Error) => Err((offset, "unexpected character")),
            _ => Err((offset, "expected a value")),
        }
    }
}

/// Parses the source of a bracketed expression, without the brackets.
///
/// On error returns the byte offset of the problem and a description.
pub(crate) fn parse_expression(source: &str) -> ExpressionResult {
    ExpressionParser::new(source).parse()
}

fn bracketed(input: &str) -> Result<Expression> {
    let (inner, _) = char('[')(input)?;
    let (rest, source) = take_until("]")(inner)?;
    let (rest, _) = char(']')(rest)?;

    match parse_expression(source) {
        Ok(expression) => Ok((rest, expression)),
        Err((offset, reason)) => Err(nom::Err::Failure(ParseError::from_kind(
            &inner[offset..],
            SyntaxErrorKind::Expression { offset, reason },
        ))),
    }
}

/// `$hex` or `[expression]`
fn literal(input: &str) -> Result<Expression> {
    alt((map(hex_literal, Expression::Literal), bracketed))(input)
}

/// `&hex` or `&[expression]`. `&acc` is a register pointer, not an address.
fn address(input: &str) -> Result<Expression> {
    let (rest, _) = char('&')(input)?;

    if register(rest).is_ok() {
        return Err(nom::Err::Error(ParseError::from_error_kind(input, ErrorKind::Verify)));
    }

    alt((map(hex_number, Expression::Literal), bracketed))(rest)
}

fn register_pointer(input: &str) -> Result<Register> {
    preceded(char('&'), register)(input)
}

fn comma(input: &str) -> Result<char> {
    delimited(space0, char(','), space0)(input)
}

fn operands(format: OperandFormat, input: &str) -> Result<Operands> {
    match format {
        OperandFormat::LitReg => map(
            separated_pair(literal, comma, register),
            |(lit, reg)| Operands::LitReg(lit, reg),
        )(input),
        OperandFormat::RegLit => map(
            separated_pair(register, comma, literal),
            |(reg, lit)| Operands::RegLit(reg, lit),
        )(input),
        OperandFormat::RegLit8 => map(
            separated_pair(register, comma, literal),
            |(reg, lit)| Operands::RegLit8(reg, lit),
        )(input),
        OperandFormat::RegReg => map(
            separated_pair(register, comma, register),
            |(a, b)| Operands::RegReg(a, b),
        )(input),
        OperandFormat::RegMem => map(
            separated_pair(register, comma, address),
            |(reg, addr)| Operands::RegMem(reg, addr),
        )(input),
        OperandFormat::MemReg => map(
            separated_pair(address, comma, register),
            |(addr, reg)| Operands::MemReg(addr, reg),
        )(input),
        OperandFormat::LitMem => map(
            separated_pair(literal, comma, address),
            |(lit, addr)| Operands::LitMem(lit, addr),
        )(input),
        OperandFormat::RegPtrReg => map(
            separated_pair(register_pointer, comma, register),
            |(ptr, reg)| Operands::RegPtrReg(ptr, reg),
        )(input),
        OperandFormat::LitOffReg => map(
            tuple((literal, comma, register_pointer, comma, register)),
            |(lit, _, ptr, _, reg)| Operands::LitOffReg(lit, ptr, reg),
        )(input),
        OperandFormat::LitRegPtr => map(
            separated_pair(literal, comma, delimited(tag("&("), register, char(')'))),
            |(lit, ptr)| Operands::LitRegPtr(lit, ptr),
        )(input),
        OperandFormat::NoArgs => Ok((input, Operands::NoArgs)),
        OperandFormat::SingleReg => map(register, Operands::SingleReg)(input),
        OperandFormat::SingleLit => map(literal, Operands::SingleLit)(input),
        OperandFormat::SingleMem => map(address, Operands::SingleMem)(input),
    }
}

/// Tries the operand formats of the mnemonic in table order.
fn instruction(input: &str) -> Result<Instruction> {
    let (rest, name) = terminated(identifier, not(char(':')))(input)?;
    let descriptors = descriptors_for(name);

    let first = match descriptors.first() {
        Some(descriptor) => descriptor,
        None => return Err(nom::Err::Error(ParseError::from_error_kind(input, ErrorKind::Tag))),
    };

    for descriptor in descriptors {
        let attempt = match descriptor.format {
            OperandFormat::NoArgs => Ok((rest, Operands::NoArgs)),
            format => space1(rest).and_then(|(rest, _)| operands(format, rest)),
        };

        let attempt = attempt.and_then(|(rest, operands)| {
            let (rest, _) = not(preceded(space0, char(',')))(rest)?;
            Ok((rest, operands))
        });

        match attempt {
            Ok((rest, operands)) => return Ok((rest, Instruction {
                opcode: descriptor.opcode,
                operands,
            })),
            Err(nom::Err::Error(_)) => continue,
            Err(err) => return Err(err),
        }
    }

    Err(nom::Err::Failure(ParseError::from_kind(
        rest.trim_start_matches(|c| c == ' ' || c == '\t'),
        SyntaxErrorKind::Operands { mnemonic: first.mnemonic },
    )))
}

fn label(input: &str) -> Result<NodeKind> {
    map(
        terminated(identifier, char(':')),
        |name| NodeKind::Label(name.to_string()),
    )(input)
}

fn assignment(input: &str) -> Result<char> {
    delimited(multispace0, char('='), multispace0)(input)
}

fn constant(input: &str) -> Result<NodeKind> {
    let (input, exported) = exported(input)?;
    let (input, _) = keyword("constant")(input)?;

    let (input, (name, value)) = cut(context("constant", separated_pair(
        preceded(multispace1, identifier),
        assignment,
        hex_literal,
    )))(input)?;

    Ok((input, NodeKind::Constant {
        exported,
        name: name.to_string(),
        value,
    }))
}

fn data(input: &str) -> Result<NodeKind> {
    let (input, exported) = exported(input)?;
    let (input, size) = alt((
        value(DataSize::Bits8, keyword("data8")),
        value(DataSize::Bits16, keyword("data16")),
    ))(input)?;

    let (input, (name, values)) = cut(context("data declaration", separated_pair(
        preceded(multispace1, identifier),
        assignment,
        delimited(
            terminated(char('{'), ws),
            separated_list(delimited(ws, char(','), ws), hex_literal),
            preceded(ws, char('}')),
        ),
    )))(input)?;

    Ok((input, NodeKind::Data {
        exported,
        size,
        name: name.to_string(),
        values,
    }))
}

fn member(input: &str) -> Result<Member> {
    map(
        separated_pair(identifier, delimited(ws, char(':'), ws), hex_literal),
        |(name, size)| Member {
            name: name.to_string(),
            size,
        },
    )(input)
}

fn structure(input: &str) -> Result<NodeKind> {
    let (input, exported) = exported(input)?;
    let (input, _) = keyword("structure")(input)?;

    let (input, (name, members)) = cut(context("structure", pair(
        preceded(multispace1, identifier),
        delimited(
            preceded(ws, terminated(char('{'), ws)),
            separated_list(delimited(ws, char(','), ws), member),
            preceded(ws, char('}')),
        ),
    )))(input)?;

    Ok((input, NodeKind::Structure {
        exported,
        name: name.to_string(),
        members,
    }))
}

fn node(input: &str) -> Result<NodeKind> {
    alt((
        data,
        structure,
        constant,
        map(instruction, NodeKind::Instruction),
        label,
    ))(input)
}

/// Parses a whole source file into nodes, in source order.
pub(crate) fn parse_nodes(input: &str) -> std::result::Result<Vec<Node>, ParseError> {
    let mut nodes = Vec::new();
    let mut rest = input;

    loop {
        rest = match ws(rest) {
            Ok((rest, ())) => rest,
            Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => return Err(err),
            Err(nom::Err::Incomplete(_)) => return Err(ParseError::incomplete()),
        };

        if rest.is_empty() {
            return Ok(nodes);
        }

        let start = offset_of(input, rest);

        match node(rest) {
            Ok((next, kind)) => {
                nodes.push(Node {
                    kind,
                    span: start..offset_of(input, next),
                });

                rest = next;
            },
            Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => return Err(err),
            Err(nom::Err::Incomplete(_)) => return Err(ParseError::incomplete()),
        }
    }
}

#[cfg(test)]
fn parse_one(input: &str) -> NodeKind {
    let mut nodes = parse_nodes(input).unwrap();
    assert_eq!(nodes.len(), 1, "{:?}", nodes);
    nodes.remove(0).kind
}

#[test]
fn test_parse_instructions() {
    use crate::instruction::OpCode;

    let cases = vec![
        ("mov $1234, r1", OpCode::MovLitReg),
        ("MOV acc, R3", OpCode::MovRegReg),
        ("mov r1, &0050", OpCode::MovRegMem),
        ("mov &[!data + $2], r2", OpCode::MovMemReg),
        ("mov $1, &3000", OpCode::MovLitMem),
        ("mov &r1, r2", OpCode::MovRegPtrReg),
        ("mov $10, &r1, r2", OpCode::MovLitOffReg),
        ("mov $10, &acc, r2", OpCode::MovLitOffReg),
        ("mov $10, &(r1)", OpCode::MovLitRegPtr),
        ("sub $3, r1", OpCode::SubLitReg),
        ("sub r1, $3", OpCode::SubRegLit),
        ("lsf r1, $2", OpCode::LsfRegLit),
        ("jne $5, &[!loop]", OpCode::JmpNotEq),
        ("jeq r2, &0010", OpCode::JeqReg),
        ("psh r4", OpCode::PshReg),
        ("psh $ff", OpCode::PshLit),
        ("cal [!routine]", OpCode::CalLit),
        ("ret", OpCode::Ret),
        ("hlt ; done", OpCode::Hlt),
    ];

    for (source, opcode) in cases {
        match parse_one(source) {
            NodeKind::Instruction(ins) => {
                assert_eq!(ins.opcode, opcode, "{}", source);
                assert_eq!(ins.operands.format(), opcode.format(), "{}", source);
            },
            kind => panic!("{} parsed as {:?}", source, kind),
        }
    }
}

#[test]
fn test_parse_declarations() {
    let source = r#"
        +constant SCREEN = $3000
        data16 table = { $1, $ffff,
                         $20 }
        structure Point {
            x: $02,
            y: $02
        }
        ret:
        start: hlt
    "#;

    let nodes = parse_nodes(source).unwrap();
    let kinds: Vec<_> = nodes.iter().map(|node| node.kind.clone()).collect();

    assert_eq!(kinds[0], NodeKind::Constant {
        exported: true,
        name: "SCREEN".to_string(),
        value: 0x3000,
    });
    assert_eq!(kinds[1], NodeKind::Data {
        exported: false,
        size: DataSize::Bits16,
        name: "table".to_string(),
        values: vec![1, 0xFFFF, 0x20],
    });
    assert_eq!(kinds[2], NodeKind::Structure {
        exported: false,
        name: "Point".to_string(),
        members: vec![
            Member { name: "x".to_string(), size: 2 },
            Member { name: "y".to_string(), size: 2 },
        ],
    });
    assert_eq!(kinds[3], NodeKind::Label("ret".to_string()));
    assert_eq!(kinds[4], NodeKind::Label("start".to_string()));
    assert_eq!(kinds.len(), 6);

    assert_eq!(&source[nodes[0].span.clone()], "+constant SCREEN = $3000");
    assert_eq!(&source[nodes[5].span.clone()], "hlt");
}

#[test]
fn test_parse_expression_precedence() {
    use super::ast::Operator;

    let expression = parse_expression("$1 + $2 * $3 - !x").unwrap();

    assert_eq!(expression.to_string(), "(($1 + ($2 * $3)) - !x)");

    let expression = parse_expression("($1 + $2) * <Point> origin.y").unwrap();

    match expression {
        Expression::Binary { operator: Operator::Multiply, rhs, .. } => assert_eq!(
            *rhs,
            Expression::InterpretAs {
                structure: "Point".to_string(),
                symbol: "origin".to_string(),
                member: "y".to_string(),
            },
        ),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parse_expression_errors() {
    assert_eq!(parse_expression(""), Err((0, "expected a value")));
    assert_eq!(parse_expression("$1 +"), Err((4, "expected a value")));
    assert_eq!(parse_expression("($1"), Err((3, "expected ')'")));
    assert_eq!(parse_expression("$1 ? $2"), Err((3, "unexpected character")));
    assert_eq!(parse_expression("<Point origin.y"), Err((7, "expected '>'")));
}

#[test]
fn test_parse_errors() {
    let source = "start:\n  mov $1, r1\n  mov $1, $2\n";
    let err = parse_nodes(source).unwrap_err().verbose(source);
    assert_eq!((err.line, err.column), (3, 7));
    assert!(err.message.contains("'mov'"), "{}", err.message);

    let source = "mov [$1 + ], r1";
    let err = parse_nodes(source).unwrap_err().verbose(source);
    assert_eq!((err.line, err.column), (1, 11));

    let source = "data8 bytes = { $1, $2 ";
    assert!(parse_nodes(source).is_err());

    let source = "mov $123456789, r1";
    let err = parse_nodes(source).unwrap_err().verbose(source);
    assert_eq!(err.message, "literal too large");
}
