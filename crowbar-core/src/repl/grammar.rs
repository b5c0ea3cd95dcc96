//! Lexer and parser for the host command surface.
//!
//! Commands are whitespace-separated tokens, case-insensitive, with every
//! keyword abbreviable to a unique prefix within its candidate set (see
//! [`catalog`]). The parser composes `winnow` over a bounded token buffer to
//! build structured command values without allocation.

use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
#[allow(deprecated)]
use winnow::error::ErrorKind;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::stream::Stream;

use super::catalog::{self, MatchError};
use crate::params::{Edge, ParamField, TriggerSource};
use crate::target::{self, PayloadError, PowerAction, ResetRequest, MAX_SEND_BYTES};

/// Maximum tokens per command line; commands stay short and bounded.
pub const MAX_TOKENS: usize = 12;

/// A whitespace-delimited word with its byte span in the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer to avoid dynamic allocation.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Grammar errors surfaced to the command boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarError<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: &'a str,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    Keyword {
        word: &'a str,
        error: MatchError,
    },
    InvalidInteger {
        lexeme: &'a str,
    },
    InvalidHexByte {
        lexeme: &'a str,
    },
    Payload(PayloadError),
    TrailingInput {
        lexeme: &'a str,
    },
    TooManyTokens,
}

impl<'a> fmt::Display for GrammarError<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarError::UnexpectedToken { expected, found } => {
                write!(f, "expected {expected}, found '{found}'")
            }
            GrammarError::UnexpectedEnd { expected } => {
                write!(f, "missing {expected}")
            }
            GrammarError::Keyword {
                word,
                error: MatchError::Unknown(candidates),
            } => {
                write!(f, "unknown word '{word}' (expected one of")?;
                for candidate in *candidates {
                    write!(f, " {candidate}")?;
                }
                write!(f, ")")
            }
            GrammarError::Keyword {
                word,
                error: MatchError::Ambiguous(candidates),
            } => {
                write!(f, "ambiguous '{word}' (matches")?;
                for candidate in *candidates {
                    if candidate.len() >= word.len()
                        && candidate[..word.len()].eq_ignore_ascii_case(word)
                    {
                        write!(f, " {candidate}")?;
                    }
                }
                write!(f, ")")
            }
            GrammarError::InvalidInteger { lexeme } => {
                write!(f, "invalid number '{lexeme}'")
            }
            GrammarError::InvalidHexByte { lexeme } => {
                write!(f, "invalid hex byte '{lexeme}' (expected 00..FF)")
            }
            GrammarError::Payload(PayloadError::Empty) => write!(f, "missing payload"),
            GrammarError::Payload(PayloadError::OddHexLength) => {
                write!(f, "hex payload needs an even digit count")
            }
            GrammarError::Payload(PayloadError::InvalidHexDigit) => {
                write!(f, "payload contains a non-hex digit")
            }
            GrammarError::Payload(PayloadError::UnterminatedQuote) => {
                write!(f, "unterminated quote in payload")
            }
            GrammarError::Payload(PayloadError::TooLong) => {
                write!(f, "payload exceeds {} bytes", MAX_SEND_BYTES)
            }
            GrammarError::TrailingInput { lexeme } => {
                write!(f, "unexpected trailing input '{lexeme}'")
            }
            GrammarError::TooManyTokens => write!(f, "too many words"),
        }
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        match token {
            Some(token) => GrammarError::UnexpectedToken {
                expected,
                found: token.lexeme,
            },
            None => GrammarError::UnexpectedEnd { expected },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

#[allow(deprecated)]
impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    fn from_error_kind(input: &Input<'src, 'slice>, _kind: ErrorKind) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn append(
        self,
        _input: &Input<'src, 'slice>,
        _token_start: &<Input<'src, 'slice> as Stream>::Checkpoint,
        _kind: ErrorKind,
    ) -> Self {
        self
    }

    fn or(self, other: Self) -> Self {
        other
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Set { field: ParamField, value: u32 },
    Get { field: ParamField },
    Trigger(TriggerSource),
    Arm(bool),
    Glitch,
    Status,
    Reset,
    Clock {
        frequency_hz: Option<u32>,
        enable: Option<bool>,
    },
    Api(bool),
    LastError,
    Help,
    Version,
    Pins,
    Target(TargetCommand),
    Reboot { bootloader: bool },
}

/// `TARGET` sub-commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetCommand {
    Send(HeaplessVec<u8, MAX_SEND_BYTES>),
    Response,
    Reset(ResetRequest),
    Power(PowerAction),
}

/// Splits a line into word tokens with byte spans.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, GrammarError<'_>> {
    let mut buffer = TokenBuffer::new();
    let mut start: Option<usize> = None;

    for (index, byte) in line.bytes().enumerate() {
        if byte.is_ascii_whitespace() {
            if let Some(word_start) = start.take() {
                push_token(&mut buffer, line, word_start..index)?;
            }
        } else if start.is_none() {
            start = Some(index);
        }
    }
    if let Some(word_start) = start {
        push_token(&mut buffer, line, word_start..line.len())?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    line: &'a str,
    span: Range<usize>,
) -> Result<(), GrammarError<'a>> {
    let token = Token {
        lexeme: &line[span.clone()],
        span,
    };
    buffer.push(token).map_err(|_| GrammarError::TooManyTokens)
}

/// Parses one command line. The raw line is threaded through so payload
/// arguments (`TARGET SEND`) can capture their original spelling.
pub fn parse(line: &str) -> Result<Command, GrammarError<'_>> {
    let tokens = lex(line)?;
    let mut input: Input<'_, '_> = tokens.as_slice();

    let command = match command(line).parse_next(&mut input) {
        Ok(command) => command,
        Err(ErrMode::Backtrack(err)) | Err(ErrMode::Cut(err)) => return Err(err),
        Err(ErrMode::Incomplete(_)) => {
            return Err(GrammarError::unexpected("token", input.first()))
        }
    };

    if let Some(extra) = input.first() {
        return Err(GrammarError::TrailingInput {
            lexeme: extra.lexeme,
        });
    }

    Ok(command)
}

fn command<'src, 'slice>(
    line: &'src str,
) -> impl Parser<Input<'src, 'slice>, Command, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let verb = keyword("command", catalog::VERBS).parse_next(input)?;
        match verb {
            "SET" => {
                let field = param_field().parse_next(input)?;
                let value = integer("value").parse_next(input)?;
                Ok(Command::Set { field, value })
            }
            "GET" => {
                let field = param_field().parse_next(input)?;
                Ok(Command::Get { field })
            }
            "TRIGGER" => trigger_command(input),
            "ARM" => Ok(Command::Arm(switch().parse_next(input)?)),
            "GLITCH" => Ok(Command::Glitch),
            "STATUS" => Ok(Command::Status),
            "RESET" => Ok(Command::Reset),
            "CLOCK" => clock_command(input),
            "API" => Ok(Command::Api(switch().parse_next(input)?)),
            "ERROR" => Ok(Command::LastError),
            "HELP" => Ok(Command::Help),
            "VERSION" => Ok(Command::Version),
            "PINS" => Ok(Command::Pins),
            "TARGET" => target_command(line, input),
            "REBOOT" => reboot_command(input),
            _ => Err(ErrMode::Backtrack(GrammarError::unexpected(
                "command",
                None,
            ))),
        }
    }
}

fn trigger_command<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
) -> Result<Command, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let kind = keyword("trigger type", catalog::TRIGGER_KINDS).parse_next(input)?;
    let source = match kind {
        "NONE" => TriggerSource::None,
        "GPIO" => {
            let edge = keyword("edge (RISING or FALLING)", catalog::EDGES).parse_next(input)?;
            TriggerSource::GpioEdge(if edge == "RISING" {
                Edge::Rising
            } else {
                Edge::Falling
            })
        }
        "UART" => TriggerSource::UartByte(hex_byte().parse_next(input)?),
        _ => unreachable!("trigger kinds are exhaustive"),
    };
    Ok(Command::Trigger(source))
}

fn clock_command<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
) -> Result<Command, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let mut frequency_hz = None;
    if let Some(token) = input.first() {
        if token.lexeme.bytes().all(|b| b.is_ascii_digit()) {
            frequency_hz = Some(integer("frequency").parse_next(input)?);
        }
    }

    let mut enable = None;
    if input.first().is_some() {
        let state = keyword("ON or OFF", catalog::SWITCHES).parse_next(input)?;
        enable = Some(state == "ON");
    }

    Ok(Command::Clock {
        frequency_hz,
        enable,
    })
}

fn target_command<'src, 'slice>(
    line: &'src str,
    input: &mut Input<'src, 'slice>,
) -> Result<Command, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let sub = keyword("TARGET sub-command", catalog::TARGET_SUBCOMMANDS).parse_next(input)?;
    match sub {
        "SEND" => {
            let Some(first) = input.first() else {
                return Err(ErrMode::Cut(GrammarError::Payload(PayloadError::Empty)));
            };
            let payload = &line[first.span.start..];
            let bytes = target::parse_send_payload(payload)
                .map_err(|err| ErrMode::Cut(GrammarError::Payload(err)))?;
            *input = &[];
            Ok(Command::Target(TargetCommand::Send(bytes)))
        }
        "RESPONSE" => Ok(Command::Target(TargetCommand::Response)),
        "RESET" => {
            let mut request = ResetRequest::default();
            while !input.is_empty() {
                let option = keyword("reset option", catalog::RESET_OPTIONS).parse_next(input)?;
                match option {
                    "PIN" => request.pin = Some(integer("pin number").parse_next(input)? as u8),
                    "PERIOD" => {
                        request.period_ms = Some(integer("period (ms)").parse_next(input)?)
                    }
                    "HIGH" => request.active_high = true,
                    _ => unreachable!("reset options are exhaustive"),
                }
            }
            Ok(Command::Target(TargetCommand::Reset(request)))
        }
        "POWER" => {
            let action = keyword("power action", catalog::POWER_ACTIONS).parse_next(input)?;
            let action = match action {
                "ON" => PowerAction::On,
                "OFF" => PowerAction::Off,
                _ => PowerAction::Cycle,
            };
            Ok(Command::Target(TargetCommand::Power(action)))
        }
        _ => unreachable!("target sub-commands are exhaustive"),
    }
}

fn reboot_command<'src, 'slice>(
    input: &mut Input<'src, 'slice>,
) -> Result<Command, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    let bootloader = if input.first().is_some() {
        keyword("BL", catalog::REBOOT_MODES).parse_next(input)?;
        true
    } else {
        false
    };
    Ok(Command::Reboot { bootloader })
}

fn keyword<'src, 'slice>(
    expected: &'static str,
    candidates: &'static [&'static str],
) -> impl Parser<Input<'src, 'slice>, &'static str, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) => match catalog::match_keyword(token.lexeme, candidates) {
            Ok(resolved) => {
                *input = rest;
                Ok(resolved)
            }
            Err(error) => Err(ErrMode::Cut(GrammarError::Keyword {
                word: token.lexeme,
                error,
            })),
        },
        None => Err(ErrMode::Backtrack(GrammarError::UnexpectedEnd { expected })),
    }
}

fn param_field<'src, 'slice>(
) -> impl Parser<Input<'src, 'slice>, ParamField, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let name = keyword("parameter name", catalog::PARAM_FIELDS).parse_next(input)?;
        Ok(match name {
            "PAUSE" => ParamField::Pause,
            "WIDTH" => ParamField::Width,
            "GAP" => ParamField::Gap,
            _ => ParamField::Count,
        })
    }
}

fn switch<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, bool, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let state = keyword("ON or OFF", catalog::SWITCHES).parse_next(input)?;
        Ok(state == "ON")
    }
}

fn integer<'src, 'slice>(
    expected: &'static str,
) -> impl Parser<Input<'src, 'slice>, u32, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) => match token.lexeme.parse::<u32>() {
            Ok(value) => {
                *input = rest;
                Ok(value)
            }
            Err(_) => Err(ErrMode::Cut(GrammarError::InvalidInteger {
                lexeme: token.lexeme,
            })),
        },
        None => Err(ErrMode::Backtrack(GrammarError::UnexpectedEnd { expected })),
    }
}

fn hex_byte<'src, 'slice>() -> impl Parser<Input<'src, 'slice>, u8, GrammarError<'src>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) => {
            let digits = token
                .lexeme
                .strip_prefix("0x")
                .or_else(|| token.lexeme.strip_prefix("0X"))
                .unwrap_or(token.lexeme);
            let valid = !digits.is_empty()
                && digits.len() <= 2
                && digits.bytes().all(|b| b.is_ascii_hexdigit());
            match (valid, u8::from_str_radix(digits, 16)) {
                (true, Ok(value)) => {
                    *input = rest;
                    Ok(value)
                }
                _ => Err(ErrMode::Cut(GrammarError::InvalidHexByte {
                    lexeme: token.lexeme,
                })),
            }
        }
        None => Err(ErrMode::Backtrack(GrammarError::UnexpectedEnd {
            expected: "hex byte",
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    fn parse_ok(input: &str) -> Command {
        parse(input).expect("command should parse")
    }

    #[test]
    fn parses_set_and_get() {
        assert_eq!(
            parse_ok("SET PAUSE 1500"),
            Command::Set {
                field: ParamField::Pause,
                value: 1500
            }
        );
        assert_eq!(
            parse_ok("set w 150"),
            Command::Set {
                field: ParamField::Width,
                value: 150
            }
        );
        assert_eq!(
            parse_ok("GET GAP"),
            Command::Get {
                field: ParamField::Gap
            }
        );
    }

    #[test]
    fn parses_trigger_variants() {
        assert_eq!(parse_ok("TRIGGER NONE"), Command::Trigger(TriggerSource::None));
        assert_eq!(
            parse_ok("TRIG G R"),
            Command::Trigger(TriggerSource::GpioEdge(Edge::Rising))
        );
        assert_eq!(
            parse_ok("trigger gpio falling"),
            Command::Trigger(TriggerSource::GpioEdge(Edge::Falling))
        );
        assert_eq!(
            parse_ok("TRIGGER UART 0D"),
            Command::Trigger(TriggerSource::UartByte(0x0d))
        );
        assert_eq!(
            parse_ok("TRIGGER UART 0x7f"),
            Command::Trigger(TriggerSource::UartByte(0x7f))
        );
    }

    #[test]
    fn parses_arm_glitch_and_queries() {
        assert_eq!(parse_ok("ARM ON"), Command::Arm(true));
        assert_eq!(parse_ok("AR OFF"), Command::Arm(false));
        // A alone could be ARM or API.
        assert!(matches!(
            parse("A ON"),
            Err(GrammarError::Keyword {
                error: MatchError::Ambiguous(_),
                ..
            })
        ));
        assert_eq!(parse_ok("GL"), Command::Glitch);
        assert_eq!(parse_ok("STAT"), Command::Status);
        assert_eq!(parse_ok("V"), Command::Version);
        assert_eq!(parse_ok("E"), Command::LastError);
    }

    #[test]
    fn parses_clock_forms() {
        assert_eq!(
            parse_ok("CLOCK 12000000 ON"),
            Command::Clock {
                frequency_hz: Some(12_000_000),
                enable: Some(true)
            }
        );
        assert_eq!(
            parse_ok("CLOCK OFF"),
            Command::Clock {
                frequency_hz: None,
                enable: Some(false)
            }
        );
        assert_eq!(
            parse_ok("CLOCK 1000000"),
            Command::Clock {
                frequency_hz: Some(1_000_000),
                enable: None
            }
        );
        assert_eq!(
            parse_ok("CLOCK"),
            Command::Clock {
                frequency_hz: None,
                enable: None
            }
        );
    }

    #[test]
    fn parses_target_send_payloads() {
        match parse_ok("TARGET SEND 3F") {
            Command::Target(TargetCommand::Send(bytes)) => {
                assert_eq!(bytes.as_slice(), &[0x3f]);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        match parse_ok("TARG S \"R 0 4\"") {
            Command::Target(TargetCommand::Send(bytes)) => {
                assert_eq!(bytes.as_slice(), b"R 0 4\r");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_target_reset_options() {
        assert_eq!(
            parse_ok("TARGET RESET"),
            Command::Target(TargetCommand::Reset(ResetRequest {
                pin: None,
                period_ms: None,
                active_high: false,
            }))
        );
        assert_eq!(
            parse_ok("TARGET RESET PIN 7 PERIOD 100 HIGH"),
            Command::Target(TargetCommand::Reset(ResetRequest {
                pin: Some(7),
                period_ms: Some(100),
                active_high: true,
            }))
        );
    }

    #[test]
    fn parses_target_power_and_reboot() {
        assert_eq!(
            parse_ok("TARGET POWER CYCLE"),
            Command::Target(TargetCommand::Power(PowerAction::Cycle))
        );
        assert_eq!(parse_ok("REBOOT"), Command::Reboot { bootloader: false });
        assert_eq!(parse_ok("REBOOT BL"), Command::Reboot { bootloader: true });
    }

    #[test]
    fn ambiguous_abbreviations_list_candidates() {
        let err = parse("G").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("ambiguous"), "got: {rendered}");
        assert!(rendered.contains("GET") && rendered.contains("GLITCH"));
    }

    #[test]
    fn unknown_verbs_are_rejected() {
        let err = parse("FROB 1").unwrap_err();
        assert!(matches!(
            err,
            GrammarError::Keyword {
                word: "FROB",
                error: MatchError::Unknown(_)
            }
        ));
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert_eq!(
            parse("STATUS NOW"),
            Err(GrammarError::TrailingInput { lexeme: "NOW" })
        );
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            parse("SET PAUSE abc"),
            Err(GrammarError::InvalidInteger { lexeme: "abc" })
        ));
        assert!(matches!(
            parse("TRIGGER UART 1FF"),
            Err(GrammarError::InvalidHexByte { lexeme: "1FF" })
        ));
        assert!(matches!(
            parse("SET WIDTH"),
            Err(GrammarError::UnexpectedEnd { .. })
        ));
    }
}
