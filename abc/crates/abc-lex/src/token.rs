//! Token definitions and the keyword table.

use std::sync::OnceLock;

use abc_util::Span;
use rustc_hash::FxHashMap;

/// Longest keyword probe the lexer will attempt, in bytes.
///
/// The longest real keyword is `RANDOMIZE` (9); the probe window is
/// deliberately wider so the bound never has to change when a keyword
/// is added.
pub const MAX_KEYWORD_PROBE: usize = 16;

/// The closed set of token tags.
///
/// One variant per reserved keyword, plus punctuation, literals, and
/// the structural tokens `Eol` / `Eof`. Literal payloads (identifier
/// text, string bytes, numeric value) live on [`Token`], not here, so
/// the tag stays `Copy` and cheap to match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // =========================================================================
    // LITERALS AND STRUCTURE
    // =========================================================================
    /// Numeric constant; the value is on the token.
    Number,
    /// String literal; the text is on the token.
    String,
    /// Variable identifier; a trailing `$` marks string type.
    Ident,
    /// Physical end of line.
    Eol,
    /// End of input.
    Eof,

    // =========================================================================
    // PUNCTUATION AND OPERATORS
    // =========================================================================
    Comma,
    /// `:` - statement separator.
    Colon,
    Semicolon,
    /// `#` - I/O channel prefix.
    Hash,
    Dollar,
    /// `?` - PRINT shorthand.
    Question,
    LParen,
    RParen,
    LessEq,
    NotEq,
    GreaterEq,
    Less,
    Greater,
    Eq,
    /// `^` - exponentiation.
    Caret,
    Star,
    Plus,
    Minus,
    Slash,

    // =========================================================================
    // STATEMENT KEYWORDS
    // =========================================================================
    Rem,
    Data,
    Input,
    Color,
    List,
    Enter,
    Let,
    If,
    For,
    Next,
    Goto,
    Gosub,
    Trap,
    Bye,
    Cont,
    Com,
    Close,
    Clr,
    Deg,
    Dim,
    End,
    New,
    Open,
    Load,
    Save,
    Status,
    Note,
    Point,
    Xio,
    On,
    Poke,
    Print,
    Rad,
    Read,
    Restore,
    Return,
    Run,
    Stop,
    Pop,
    Get,
    Put,
    Graphics,
    Plot,
    Position,
    Dos,
    Drawto,
    Setcolor,
    Locate,
    Sound,
    Lprint,
    Csave,
    Cload,
    Randomize,
    Clear,
    Defint,
    Deflng,
    Defsng,
    Defdbl,
    Defstr,
    Cls,

    // =========================================================================
    // CLAUSE KEYWORDS
    // =========================================================================
    To,
    Step,
    Then,
    Else,

    // =========================================================================
    // WORD OPERATORS
    // =========================================================================
    Not,
    Or,
    And,

    // =========================================================================
    // FUNCTION KEYWORDS
    // =========================================================================
    /// `STR$`
    StrFn,
    /// `CHR$`
    ChrFn,
    Usr,
    Asc,
    Val,
    Len,
    Adr,
    Atn,
    Cos,
    Peek,
    Sin,
    Rnd,
    Fre,
    /// `EXP` (the function, not the `^` operator).
    ExpFn,
    Log,
    Clog,
    Sqr,
    Sgn,
    Abs,
    Int,
    Paddle,
    Stick,
    Ptrig,
    Strig,
    /// `LEFT$`
    LeftFn,
    /// `RIGHT$`
    RightFn,
    /// `MID$`
    MidFn,
    Tab,
}

/// A lexical unit with its source position.
#[derive(Clone, Debug)]
pub struct Token {
    pub kind: TokenKind,
    /// Identifier / string / comment text, where applicable.
    pub text: Option<String>,
    /// Numeric value for `Number` tokens.
    pub value: f64,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self {
            kind,
            text: None,
            value: 0.0,
            span,
        }
    }

    pub fn with_text(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: Some(text.into()),
            value: 0.0,
            span,
        }
    }

    pub fn with_value(kind: TokenKind, value: f64, span: Span) -> Self {
        Self {
            kind,
            text: None,
            value,
            span,
        }
    }

    /// Token text, or `""` for tokens that carry none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// Keyword spellings. `GO` aliases `GOTO` and `CINT` aliases `INT`,
/// matching the Microsoft-compatible surface.
const KEYWORDS: &[(&str, TokenKind)] = &[
    // Statements
    ("REM", TokenKind::Rem),
    ("DATA", TokenKind::Data),
    ("INPUT", TokenKind::Input),
    ("COLOR", TokenKind::Color),
    ("LIST", TokenKind::List),
    ("ENTER", TokenKind::Enter),
    ("LET", TokenKind::Let),
    ("IF", TokenKind::If),
    ("FOR", TokenKind::For),
    ("NEXT", TokenKind::Next),
    ("GOTO", TokenKind::Goto),
    ("GO", TokenKind::Goto),
    ("GOSUB", TokenKind::Gosub),
    ("TRAP", TokenKind::Trap),
    ("BYE", TokenKind::Bye),
    ("CONT", TokenKind::Cont),
    ("COM", TokenKind::Com),
    ("CLOSE", TokenKind::Close),
    ("CLR", TokenKind::Clr),
    ("DEG", TokenKind::Deg),
    ("DIM", TokenKind::Dim),
    ("END", TokenKind::End),
    ("NEW", TokenKind::New),
    ("OPEN", TokenKind::Open),
    ("LOAD", TokenKind::Load),
    ("SAVE", TokenKind::Save),
    ("STATUS", TokenKind::Status),
    ("NOTE", TokenKind::Note),
    ("POINT", TokenKind::Point),
    ("XIO", TokenKind::Xio),
    ("ON", TokenKind::On),
    ("POKE", TokenKind::Poke),
    ("PRINT", TokenKind::Print),
    ("RAD", TokenKind::Rad),
    ("READ", TokenKind::Read),
    ("RESTORE", TokenKind::Restore),
    ("RETURN", TokenKind::Return),
    ("RUN", TokenKind::Run),
    ("STOP", TokenKind::Stop),
    ("POP", TokenKind::Pop),
    ("GET", TokenKind::Get),
    ("PUT", TokenKind::Put),
    ("GRAPHICS", TokenKind::Graphics),
    ("PLOT", TokenKind::Plot),
    ("POSITION", TokenKind::Position),
    ("DOS", TokenKind::Dos),
    ("DRAWTO", TokenKind::Drawto),
    ("SETCOLOR", TokenKind::Setcolor),
    ("LOCATE", TokenKind::Locate),
    ("SOUND", TokenKind::Sound),
    ("LPRINT", TokenKind::Lprint),
    ("CSAVE", TokenKind::Csave),
    ("CLOAD", TokenKind::Cload),
    ("RANDOMIZE", TokenKind::Randomize),
    ("CLEAR", TokenKind::Clear),
    ("DEFINT", TokenKind::Defint),
    ("DEFLNG", TokenKind::Deflng),
    ("DEFSNG", TokenKind::Defsng),
    ("DEFDBL", TokenKind::Defdbl),
    ("DEFSTR", TokenKind::Defstr),
    ("CLS", TokenKind::Cls),
    // Clause keywords
    ("TO", TokenKind::To),
    ("STEP", TokenKind::Step),
    ("THEN", TokenKind::Then),
    ("ELSE", TokenKind::Else),
    // Word operators
    ("NOT", TokenKind::Not),
    ("OR", TokenKind::Or),
    ("AND", TokenKind::And),
    // Functions
    ("STR$", TokenKind::StrFn),
    ("CHR$", TokenKind::ChrFn),
    ("USR", TokenKind::Usr),
    ("ASC", TokenKind::Asc),
    ("VAL", TokenKind::Val),
    ("LEN", TokenKind::Len),
    ("ADR", TokenKind::Adr),
    ("ATN", TokenKind::Atn),
    ("COS", TokenKind::Cos),
    ("PEEK", TokenKind::Peek),
    ("SIN", TokenKind::Sin),
    ("RND", TokenKind::Rnd),
    ("FRE", TokenKind::Fre),
    ("EXP", TokenKind::ExpFn),
    ("LOG", TokenKind::Log),
    ("CLOG", TokenKind::Clog),
    ("SQR", TokenKind::Sqr),
    ("SGN", TokenKind::Sgn),
    ("ABS", TokenKind::Abs),
    ("CINT", TokenKind::Int),
    ("INT", TokenKind::Int),
    ("PADDLE", TokenKind::Paddle),
    ("STICK", TokenKind::Stick),
    ("PTRIG", TokenKind::Ptrig),
    ("STRIG", TokenKind::Strig),
    ("LEFT$", TokenKind::LeftFn),
    ("RIGHT$", TokenKind::RightFn),
    ("MID$", TokenKind::MidFn),
    ("TAB", TokenKind::Tab),
];

fn keyword_map() -> &'static FxHashMap<&'static str, TokenKind> {
    static MAP: OnceLock<FxHashMap<&'static str, TokenKind>> = OnceLock::new();
    MAP.get_or_init(|| KEYWORDS.iter().copied().collect())
}

/// Case-insensitive keyword lookup over a raw byte slice.
///
/// Returns `None` for anything that is not exactly a keyword spelling.
pub fn keyword_token(text: &[u8]) -> Option<TokenKind> {
    if text.is_empty() || text.len() > MAX_KEYWORD_PROBE {
        return None;
    }
    let mut upper = [0u8; MAX_KEYWORD_PROBE];
    for (dst, &b) in upper.iter_mut().zip(text) {
        *dst = b.to_ascii_uppercase();
    }
    let key = std::str::from_utf8(&upper[..text.len()]).ok()?;
    keyword_map().get(key).copied()
}

/// Printable name of a token kind, for diagnostics.
pub fn token_name(kind: TokenKind) -> &'static str {
    use TokenKind::*;
    match kind {
        Number => "NUMBER",
        String => "STRING",
        Ident => "IDENTIFIER",
        Eol => "CR",
        Eof => "EOF",
        Comma => ",",
        Colon => ":",
        Semicolon => ";",
        Hash => "#",
        Dollar => "$",
        Question => "?",
        LParen => "(",
        RParen => ")",
        LessEq => "<=",
        NotEq => "<>",
        GreaterEq => ">=",
        Less => "<",
        Greater => ">",
        Eq => "=",
        Caret => "^",
        Star => "*",
        Plus => "+",
        Minus => "-",
        Slash => "/",
        Rem => "REM",
        Data => "DATA",
        Input => "INPUT",
        Color => "COLOR",
        List => "LIST",
        Enter => "ENTER",
        Let => "LET",
        If => "IF",
        For => "FOR",
        Next => "NEXT",
        Goto => "GOTO",
        Gosub => "GOSUB",
        Trap => "TRAP",
        Bye => "BYE",
        Cont => "CONT",
        Com => "COM",
        Close => "CLOSE",
        Clr => "CLR",
        Deg => "DEG",
        Dim => "DIM",
        End => "END",
        New => "NEW",
        Open => "OPEN",
        Load => "LOAD",
        Save => "SAVE",
        Status => "STATUS",
        Note => "NOTE",
        Point => "POINT",
        Xio => "XIO",
        On => "ON",
        Poke => "POKE",
        Print => "PRINT",
        Rad => "RAD",
        Read => "READ",
        Restore => "RESTORE",
        Return => "RETURN",
        Run => "RUN",
        Stop => "STOP",
        Pop => "POP",
        Get => "GET",
        Put => "PUT",
        Graphics => "GRAPHICS",
        Plot => "PLOT",
        Position => "POSITION",
        Dos => "DOS",
        Drawto => "DRAWTO",
        Setcolor => "SETCOLOR",
        Locate => "LOCATE",
        Sound => "SOUND",
        Lprint => "LPRINT",
        Csave => "CSAVE",
        Cload => "CLOAD",
        Randomize => "RANDOMIZE",
        Clear => "CLEAR",
        Defint => "DEFINT",
        Deflng => "DEFLNG",
        Defsng => "DEFSNG",
        Defdbl => "DEFDBL",
        Defstr => "DEFSTR",
        Cls => "CLS",
        To => "TO",
        Step => "STEP",
        Then => "THEN",
        Else => "ELSE",
        Not => "NOT",
        Or => "OR",
        And => "AND",
        StrFn => "STR$",
        ChrFn => "CHR$",
        Usr => "USR",
        Asc => "ASC",
        Val => "VAL",
        Len => "LEN",
        Adr => "ADR",
        Atn => "ATN",
        Cos => "COS",
        Peek => "PEEK",
        Sin => "SIN",
        Rnd => "RND",
        Fre => "FRE",
        ExpFn => "EXP",
        Log => "LOG",
        Clog => "CLOG",
        Sqr => "SQR",
        Sgn => "SGN",
        Abs => "ABS",
        Int => "INT",
        Paddle => "PADDLE",
        Stick => "STICK",
        Ptrig => "PTRIG",
        Strig => "STRIG",
        LeftFn => "LEFT$",
        RightFn => "RIGHT$",
        MidFn => "MID$",
        Tab => "TAB",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup_case_insensitive() {
        assert_eq!(keyword_token(b"print"), Some(TokenKind::Print));
        assert_eq!(keyword_token(b"Print"), Some(TokenKind::Print));
        assert_eq!(keyword_token(b"PRINT"), Some(TokenKind::Print));
    }

    #[test]
    fn test_keyword_lookup_aliases() {
        assert_eq!(keyword_token(b"GO"), Some(TokenKind::Goto));
        assert_eq!(keyword_token(b"CINT"), Some(TokenKind::Int));
        assert_eq!(keyword_token(b"INT"), Some(TokenKind::Int));
    }

    #[test]
    fn test_keyword_lookup_dollar_suffix() {
        assert_eq!(keyword_token(b"MID$"), Some(TokenKind::MidFn));
        assert_eq!(keyword_token(b"MID"), None);
    }

    #[test]
    fn test_keyword_lookup_rejects_non_keywords() {
        assert_eq!(keyword_token(b""), None);
        assert_eq!(keyword_token(b"FROB"), None);
        assert_eq!(keyword_token(b"PRINTX"), None);
    }

    #[test]
    fn test_token_name_samples() {
        assert_eq!(token_name(TokenKind::LessEq), "<=");
        assert_eq!(token_name(TokenKind::Number), "NUMBER");
        assert_eq!(token_name(TokenKind::Randomize), "RANDOMIZE");
    }
}
