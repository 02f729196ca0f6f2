//! Grammar tables: BNF-style rules, statement dispatch, operator
//! binding powers, and function arities.
//!
//! Each non-terminal compiles to a flat sequence of [`Step`]s.
//! [`Step::Alt`] separates alternatives and [`Step::Eps`] accepts the
//! empty production, so a rule like
//!
//! ```text
//! <NMAT> ::= '(' <EXP> <NMAT2> ')' | ε
//! ```
//!
//! is written `[Alt, T((), Expr, N(Nmat2), T()), Alt, Eps]`. The rule
//! engine in the parser interprets these tables with single-point
//! backtracking; expressions themselves are handed to the Pratt
//! sub-parser via [`Step::Expr`].
//!
//! Parse actions are closed enums dispatched by `match`, which keeps
//! every table purely declarative data.

use abc_lex::TokenKind;

/// Non-terminals of the grammar.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Nt {
    // Expression fragments
    Exp,
    Unary,
    Nv,
    Nop,
    Op,
    Nvar,
    Nmat,
    Nmat2,
    Nfun,
    Nfusr,
    Nfp,
    Sfp,
    Nfnp,
    Nfsp,
    Sfnp,
    Sf2p,
    Sfmid,
    Sf3p,
    Stcomp,
    Str,
    Sfun,
    Svar,
    Smat,
    Smat2,
    Sop,
    Tnvar,
    Tsvar,
    Ncon,
    Scon,
    Tncon,
    Eos,
    Ps,
    // Statements
    /// Parse a full statement (handled by the parser, not a table).
    Statement,
    LetStmt,
    GotoStmt,
    GosubStmt,
    /// Keyword followed by end of statement (END, STOP, RETURN, ...).
    EmptyStmt,
    /// Keyword followed by one expression (GRAPHICS).
    ExprStmt,
    /// Keyword followed by two expressions (POKE, PLOT, ...).
    TwoExprStmt,
    /// Keyword followed by three expressions (SETCOLOR).
    ThreeExprStmt,
    /// Keyword followed by four expressions (SOUND).
    FourExprStmt,
    /// Keyword with an optional expression (TRAP, RESTORE, DEF*, ...).
    OptExprStmt,
    ForStmt,
    Fstep,
    NextStmt,
    Nextvl,
    IfStmt,
    /// IF consequent: a bare line number or statements up to ELSE
    /// (handled by the parser).
    IfBody,
    Ifa,
    Ifelse,
    InputStmt,
    Prompt,
    ReadStmt,
    Nsvar,
    Nsvrl,
    Nsv2,
    Opd,
    D1,
    DataStmt,
    DataList,
    DataTail,
    DataVal,
    DimStmt,
    Nsmat,
    Nsml,
    Nsml2,
    OnStmt,
    On1,
    Expl,
    Expl1,
    ClearStmt,
    Clrp1,
    Clrp2,
    GetStmt,
    PutStmt,
    OpenStmt,
    CloseStmt,
    XioStmt,
    StatusStmt,
    NoteStmt,
    PointStmt,
}

/// One step of a byte-coded grammar rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Match and consume a terminal token.
    T(TokenKind),
    /// Descend into a non-terminal.
    N(Nt),
    /// Parse an `<EXP>` with the Pratt sub-parser.
    Expr,
    /// Alternative separator (BNF `|`).
    Alt,
    /// Accept the empty production.
    Eps,
}

use Step::{Alt, Eps, Expr, N, T};
use TokenKind as K;

// =============================================================================
// EXPRESSION FRAGMENT RULES
// =============================================================================

/// `<TNVAR> ::= ident`
static TNVAR: &[Step] = &[T(K::Ident)];

/// `<TSVAR> ::= ident`
static TSVAR: &[Step] = &[T(K::Ident)];

/// `<NCON> ::= number`
static NCON: &[Step] = &[T(K::Number)];

/// `<SCON> ::= string`
static SCON: &[Step] = &[T(K::String)];

/// `<TNCON> ::= number`
static TNCON: &[Step] = &[T(K::Number)];

/// End of statement; the program loop consumes the actual separator.
static EOS: &[Step] = &[Eps];

/// `<PS> ::= ',' | ';'`
static PS: &[Step] = &[Alt, T(K::Comma), Alt, T(K::Semicolon)];

/// `<EXP> ::= '(' <EXP> ')' <NOP> | <UNARY> <EXP> | <NV> <NOP>`
static EXP: &[Step] = &[
    Alt,
    T(K::LParen),
    Expr,
    T(K::RParen),
    N(Nt::Nop),
    Alt,
    N(Nt::Unary),
    Expr,
    Alt,
    N(Nt::Nv),
    N(Nt::Nop),
];

/// `<UNARY> ::= '+' | '-' | NOT`
static UNARY: &[Step] = &[Alt, T(K::Plus), Alt, T(K::Minus), Alt, T(K::Not)];

/// `<NV> ::= <NFUN> | <NVAR> | <NCON> | <STCOMP>`
static NV: &[Step] = &[
    Alt,
    N(Nt::Nfun),
    Alt,
    N(Nt::Nvar),
    Alt,
    N(Nt::Ncon),
    Alt,
    N(Nt::Stcomp),
];

/// `<NOP> ::= <OP> <EXP> | ε`
static NOP: &[Step] = &[Alt, N(Nt::Op), Expr, Alt, Eps];

/// `<OP> ::= '^' | '*' | '/' | '<=' | '>=' | '<>' | '<' | '>' | '=' | AND | OR`
static OP: &[Step] = &[
    Alt,
    T(K::Caret),
    Alt,
    T(K::Star),
    Alt,
    T(K::Slash),
    Alt,
    T(K::LessEq),
    Alt,
    T(K::GreaterEq),
    Alt,
    T(K::NotEq),
    Alt,
    T(K::Less),
    Alt,
    T(K::Greater),
    Alt,
    T(K::Eq),
    Alt,
    T(K::And),
    Alt,
    T(K::Or),
];

/// `<NVAR> ::= <TNVAR> <NMAT>`
static NVAR: &[Step] = &[N(Nt::Tnvar), N(Nt::Nmat)];

/// `<NMAT> ::= '(' <EXP> <NMAT2> ')' | ε`
static NMAT: &[Step] = &[
    Alt,
    T(K::LParen),
    Expr,
    N(Nt::Nmat2),
    T(K::RParen),
    Alt,
    Eps,
];

/// `<NMAT2> ::= ',' <EXP> | ε`
static NMAT2: &[Step] = &[Alt, T(K::Comma), Expr, Alt, Eps];

/// `<NFUN> ::= <NFNP> <NFP> | <NFSP> <SFP> | USR`
static NFUN: &[Step] = &[
    Alt,
    N(Nt::Nfnp),
    N(Nt::Nfp),
    Alt,
    N(Nt::Nfsp),
    N(Nt::Sfp),
    Alt,
    N(Nt::Nfusr),
];

/// Numeric functions taking a numeric parameter.
static NFNP: &[Step] = &[
    Alt,
    T(K::Sin),
    Alt,
    T(K::Cos),
    Alt,
    T(K::Atn),
    Alt,
    T(K::Log),
    Alt,
    T(K::Clog),
    Alt,
    T(K::Sqr),
    Alt,
    T(K::Sgn),
    Alt,
    T(K::Abs),
    Alt,
    T(K::Int),
    Alt,
    T(K::ExpFn),
    Alt,
    T(K::Tab),
    Alt,
    T(K::Rnd),
    Alt,
    T(K::Fre),
    Alt,
    T(K::Peek),
    Alt,
    T(K::Paddle),
    Alt,
    T(K::Stick),
    Alt,
    T(K::Ptrig),
    Alt,
    T(K::Strig),
];

/// `<NFP> ::= '(' <EXP> ')'`
static NFP: &[Step] = &[T(K::LParen), Expr, T(K::RParen)];

/// Numeric functions taking a string parameter.
static NFSP: &[Step] = &[Alt, T(K::Asc), Alt, T(K::Val), Alt, T(K::Len), Alt, T(K::Adr)];

/// `<SFP> ::= '(' <STR> ')'`
static SFP: &[Step] = &[T(K::LParen), N(Nt::Str), T(K::RParen)];

/// `<NFUSR> ::= USR`
static NFUSR: &[Step] = &[T(K::Usr)];

/// `<SFUN> ::= (STR$|CHR$) <NFP> | (LEFT$|RIGHT$) <SF2P> | MID$ <SF3P>`
static SFUN: &[Step] = &[
    Alt,
    T(K::StrFn),
    N(Nt::Nfp),
    Alt,
    T(K::ChrFn),
    N(Nt::Nfp),
    Alt,
    N(Nt::Sfnp),
    N(Nt::Sf2p),
    Alt,
    N(Nt::Sfmid),
    N(Nt::Sf3p),
];

/// `<SFNP> ::= LEFT$ | RIGHT$`
static SFNP: &[Step] = &[Alt, T(K::LeftFn), Alt, T(K::RightFn)];

/// `<SF2P> ::= '(' <STR> ',' <EXP> ')'`
static SF2P: &[Step] = &[
    T(K::LParen),
    N(Nt::Str),
    T(K::Comma),
    Expr,
    T(K::RParen),
];

/// `<SFMID> ::= MID$`
static SFMID: &[Step] = &[T(K::MidFn)];

/// `<SF3P> ::= '(' <STR> ',' <EXP> ',' <EXP> ')'`
static SF3P: &[Step] = &[
    T(K::LParen),
    N(Nt::Str),
    T(K::Comma),
    Expr,
    T(K::Comma),
    Expr,
    T(K::RParen),
];

/// `<STCOMP> ::= <STR> <SOP> <STR>`
static STCOMP: &[Step] = &[N(Nt::Str), N(Nt::Sop), N(Nt::Str)];

/// `<STR> ::= <SFUN> | <SVAR> | <SCON>`
static STR: &[Step] = &[Alt, N(Nt::Sfun), Alt, N(Nt::Svar), Alt, N(Nt::Scon)];

/// `<SVAR> ::= <TSVAR> <SMAT>`
static SVAR: &[Step] = &[N(Nt::Tsvar), N(Nt::Smat)];

/// `<SMAT> ::= '(' <EXP> <SMAT2> ')' | ε`
static SMAT: &[Step] = &[
    Alt,
    T(K::LParen),
    Expr,
    N(Nt::Smat2),
    T(K::RParen),
    Alt,
    Eps,
];

/// `<SMAT2> ::= ',' <EXP> | ε`
static SMAT2: &[Step] = &[Alt, T(K::Comma), Expr, Alt, Eps];

/// `<SOP> ::= '=' | '<>' | '<' | '>' | '<=' | '>='`
static SOP: &[Step] = &[
    Alt,
    T(K::Eq),
    Alt,
    T(K::NotEq),
    Alt,
    T(K::Less),
    Alt,
    T(K::Greater),
    Alt,
    T(K::LessEq),
    Alt,
    T(K::GreaterEq),
];

// =============================================================================
// STATEMENT RULES
// =============================================================================

/// `<LET> ::= <NVAR> '=' <EXP> | <SVAR> '=' <STR>`
static LET_STMT: &[Step] = &[
    Alt,
    N(Nt::Nvar),
    T(K::Eq),
    Expr,
    N(Nt::Eos),
    Alt,
    N(Nt::Svar),
    T(K::Eq),
    N(Nt::Str),
    N(Nt::Eos),
];

/// `<GOTO> ::= <EXP>`
static GOTO_STMT: &[Step] = &[Expr, N(Nt::Eos)];

/// `<GOSUB> ::= <EXP>`
static GOSUB_STMT: &[Step] = &[Expr, N(Nt::Eos)];

/// Bare keyword statements (END, STOP, RETURN, CLR, DEG, RAD, ...).
static EMPTY_STMT: &[Step] = &[N(Nt::Eos)];

/// Single-expression statements (GRAPHICS).
static EXPR_STMT: &[Step] = &[Expr, N(Nt::Eos)];

/// Two-expression statements (POKE, PLOT, POSITION, DRAWTO).
static TWO_EXPR_STMT: &[Step] = &[Expr, T(K::Comma), Expr, N(Nt::Eos)];

/// Three-expression statements (SETCOLOR).
static THREE_EXPR_STMT: &[Step] = &[
    Expr,
    T(K::Comma),
    Expr,
    T(K::Comma),
    Expr,
    N(Nt::Eos),
];

/// Four-expression statements (SOUND).
static FOUR_EXPR_STMT: &[Step] = &[
    Expr,
    T(K::Comma),
    Expr,
    T(K::Comma),
    Expr,
    T(K::Comma),
    Expr,
    N(Nt::Eos),
];

/// Optional-expression statements (TRAP, RESTORE, RANDOMIZE, DEF*).
static OPT_EXPR_STMT: &[Step] = &[Alt, Expr, N(Nt::Eos), Alt, N(Nt::Eos)];

/// `<FOR> ::= <TNVAR> '=' <EXP> TO <EXP> <FSTEP>`
static FOR_STMT: &[Step] = &[
    N(Nt::Tnvar),
    T(K::Eq),
    Expr,
    T(K::To),
    Expr,
    N(Nt::Fstep),
    N(Nt::Eos),
];

/// `<FSTEP> ::= STEP <EXP> | ε`
static FSTEP: &[Step] = &[Alt, T(K::Step), Expr, Alt, Eps];

/// `<NEXT> ::= <NEXTVL> | ε`
static NEXT_STMT: &[Step] = &[Alt, N(Nt::Nextvl), N(Nt::Eos), Alt, N(Nt::Eos)];

/// `<NEXTVL> ::= <TNVAR> ',' <NEXTVL> | <TNVAR>`
static NEXTVL: &[Step] = &[
    Alt,
    N(Nt::Tnvar),
    T(K::Comma),
    N(Nt::Nextvl),
    Alt,
    N(Nt::Tnvar),
];

/// `<IF> ::= <EXP> THEN <IFBODY> <IFELSE> | <EXP> <IFBODY> <IFELSE>`
static IF_STMT: &[Step] = &[
    Alt,
    Expr,
    T(K::Then),
    N(Nt::IfBody),
    N(Nt::Ifelse),
    N(Nt::Eos),
    Alt,
    Expr,
    N(Nt::IfBody),
    N(Nt::Ifelse),
    N(Nt::Eos),
];

/// `<IFA> ::= <TNCON> | <STATEMENT>`
static IFA: &[Step] = &[Alt, N(Nt::Tncon), Alt, N(Nt::Statement)];

/// `<IFELSE> ::= ELSE <IFA> | ε`
static IFELSE: &[Step] = &[Alt, T(K::Else), N(Nt::Ifa), Alt, Eps];

/// `<INPUT> ::= <OPD> <PROMPT> <READ>`
static INPUT_STMT: &[Step] = &[N(Nt::Opd), N(Nt::Prompt), N(Nt::ReadStmt)];

/// `<PROMPT> ::= <STR> <PS> | ε`
static PROMPT: &[Step] = &[Alt, N(Nt::Str), N(Nt::Ps), Alt, Eps];

/// `<READ> ::= <NSVRL>`
static READ_STMT: &[Step] = &[N(Nt::Nsvrl), N(Nt::Eos)];

/// `<NSVAR> ::= <NVAR> | <SVAR>`
static NSVAR: &[Step] = &[Alt, N(Nt::Nvar), Alt, N(Nt::Svar)];

/// `<NSVRL> ::= <NSVAR> <NSV2>`
static NSVRL: &[Step] = &[N(Nt::Nsvar), N(Nt::Nsv2)];

/// `<NSV2> ::= ',' <NSVRL> | ε`
static NSV2: &[Step] = &[Alt, T(K::Comma), N(Nt::Nsvrl), Alt, Eps];

/// `<OPD> ::= '#' <D1> ',' | ε`
static OPD: &[Step] = &[Alt, T(K::Hash), N(Nt::D1), T(K::Comma), Alt, Eps];

/// `<D1> ::= <EXP>`
static D1: &[Step] = &[Expr];

/// `<DATA> ::= <DATA_LIST>`
static DATA_STMT: &[Step] = &[N(Nt::DataList), N(Nt::Eos)];

/// `<DATA_LIST> ::= <DATA_VAL> <DATA_TAIL>`
static DATA_LIST: &[Step] = &[N(Nt::DataVal), N(Nt::DataTail)];

/// `<DATA_TAIL> ::= ',' <DATA_VAL> <DATA_TAIL> | ε`
static DATA_TAIL: &[Step] = &[
    Alt,
    T(K::Comma),
    N(Nt::DataVal),
    N(Nt::DataTail),
    Alt,
    Eps,
];

/// `<DATA_VAL> ::= number | string | ident | '-' number | '+' number | ε`
///
/// The empty production is the null-value form of `DATA 1,,3`.
static DATA_VAL: &[Step] = &[
    Alt,
    T(K::Number),
    Alt,
    T(K::String),
    Alt,
    T(K::Ident),
    Alt,
    T(K::Minus),
    T(K::Number),
    Alt,
    T(K::Plus),
    T(K::Number),
    Alt,
    Eps,
];

/// `<DIM> ::= <NSML>`
static DIM_STMT: &[Step] = &[N(Nt::Nsml), N(Nt::Eos)];

/// `<NSMAT> ::= <TNVAR> '(' <EXP> <NMAT2> ')'`
static NSMAT: &[Step] = &[
    N(Nt::Tnvar),
    T(K::LParen),
    Expr,
    N(Nt::Nmat2),
    T(K::RParen),
];

/// `<NSML> ::= <NSMAT> <NSML2>`
static NSML: &[Step] = &[N(Nt::Nsmat), N(Nt::Nsml2)];

/// `<NSML2> ::= ',' <NSML> | ε`
static NSML2: &[Step] = &[Alt, T(K::Comma), N(Nt::Nsml), Alt, Eps];

/// `<ON> ::= <EXP> <ON1> <EXPL>`
static ON_STMT: &[Step] = &[Expr, N(Nt::On1), N(Nt::Expl), N(Nt::Eos)];

/// `<ON1> ::= GOTO | GOSUB`
static ON1: &[Step] = &[Alt, T(K::Goto), Alt, T(K::Gosub)];

/// `<EXPL> ::= <EXP> <EXPL1>`
static EXPL: &[Step] = &[Expr, N(Nt::Expl1)];

/// `<EXPL1> ::= ',' <EXPL> | ε`
static EXPL1: &[Step] = &[Alt, T(K::Comma), N(Nt::Expl), Alt, Eps];

/// `<CLEAR> ::= <EXP> | ',' <CLRP1> | ε`
static CLEAR_STMT: &[Step] = &[
    Alt,
    Expr,
    N(Nt::Eos),
    Alt,
    T(K::Comma),
    N(Nt::Clrp1),
    N(Nt::Eos),
    Alt,
    N(Nt::Eos),
];

/// `<CLRP1> ::= <EXP> <CLRP2> | <CLRP2> | ε`
static CLRP1: &[Step] = &[
    Alt,
    Expr,
    N(Nt::Clrp2),
    Alt,
    N(Nt::Clrp2),
    Alt,
    Eps,
];

/// `<CLRP2> ::= ',' <EXP> | ',' | ε`
static CLRP2: &[Step] = &[Alt, T(K::Comma), Expr, Alt, T(K::Comma), Alt, Eps];

/// `<GET> ::= '#' <D1> ',' <TNVAR>`
static GET_STMT: &[Step] = &[
    T(K::Hash),
    N(Nt::D1),
    T(K::Comma),
    N(Nt::Tnvar),
    N(Nt::Eos),
];

/// `<PUT> ::= '#' <D1> ',' <EXP>`
static PUT_STMT: &[Step] = &[T(K::Hash), N(Nt::D1), T(K::Comma), Expr, N(Nt::Eos)];

/// `<OPEN> ::= '#' <D1> ',' <EXP> ',' <EXP> ',' <STR>`
static OPEN_STMT: &[Step] = &[
    T(K::Hash),
    N(Nt::D1),
    T(K::Comma),
    Expr,
    T(K::Comma),
    Expr,
    T(K::Comma),
    N(Nt::Str),
    N(Nt::Eos),
];

/// `<CLOSE> ::= '#' <D1> | ε`
static CLOSE_STMT: &[Step] = &[Alt, T(K::Hash), N(Nt::D1), N(Nt::Eos), Alt, N(Nt::Eos)];

/// `<XIO> ::= <EXP> ',' '#' <D1> ',' <EXP> ',' <EXP> ',' <STR>`
static XIO_STMT: &[Step] = &[
    Expr,
    T(K::Comma),
    T(K::Hash),
    N(Nt::D1),
    T(K::Comma),
    Expr,
    T(K::Comma),
    Expr,
    T(K::Comma),
    N(Nt::Str),
    N(Nt::Eos),
];

/// `<STATUS> ::= '#' <D1> ',' <TNVAR>`
static STATUS_STMT: &[Step] = &[
    T(K::Hash),
    N(Nt::D1),
    T(K::Comma),
    N(Nt::Tnvar),
    N(Nt::Eos),
];

/// `<NOTE> ::= '#' <D1> ',' <TNVAR> ',' <TNVAR>`
static NOTE_STMT: &[Step] = &[
    T(K::Hash),
    N(Nt::D1),
    T(K::Comma),
    N(Nt::Tnvar),
    T(K::Comma),
    N(Nt::Tnvar),
    N(Nt::Eos),
];

/// `<POINT> ::= '#' <D1> ',' <EXP> ',' <EXP>`
static POINT_STMT: &[Step] = &[
    T(K::Hash),
    N(Nt::D1),
    T(K::Comma),
    Expr,
    T(K::Comma),
    Expr,
    N(Nt::Eos),
];

/// Rule table lookup.
///
/// `Statement` and `IfBody` are interpreted directly by the parser and
/// have no table entry; asking for them returns an empty rule.
pub fn rule(nt: Nt) -> &'static [Step] {
    match nt {
        Nt::Exp => EXP,
        Nt::Unary => UNARY,
        Nt::Nv => NV,
        Nt::Nop => NOP,
        Nt::Op => OP,
        Nt::Nvar => NVAR,
        Nt::Nmat => NMAT,
        Nt::Nmat2 => NMAT2,
        Nt::Nfun => NFUN,
        Nt::Nfusr => NFUSR,
        Nt::Nfp => NFP,
        Nt::Sfp => SFP,
        Nt::Nfnp => NFNP,
        Nt::Nfsp => NFSP,
        Nt::Sfnp => SFNP,
        Nt::Sf2p => SF2P,
        Nt::Sfmid => SFMID,
        Nt::Sf3p => SF3P,
        Nt::Stcomp => STCOMP,
        Nt::Str => STR,
        Nt::Sfun => SFUN,
        Nt::Svar => SVAR,
        Nt::Smat => SMAT,
        Nt::Smat2 => SMAT2,
        Nt::Sop => SOP,
        Nt::Tnvar => TNVAR,
        Nt::Tsvar => TSVAR,
        Nt::Ncon => NCON,
        Nt::Scon => SCON,
        Nt::Tncon => TNCON,
        Nt::Eos => EOS,
        Nt::Ps => PS,
        Nt::Statement | Nt::IfBody => &[],
        Nt::LetStmt => LET_STMT,
        Nt::GotoStmt => GOTO_STMT,
        Nt::GosubStmt => GOSUB_STMT,
        Nt::EmptyStmt => EMPTY_STMT,
        Nt::ExprStmt => EXPR_STMT,
        Nt::TwoExprStmt => TWO_EXPR_STMT,
        Nt::ThreeExprStmt => THREE_EXPR_STMT,
        Nt::FourExprStmt => FOUR_EXPR_STMT,
        Nt::OptExprStmt => OPT_EXPR_STMT,
        Nt::ForStmt => FOR_STMT,
        Nt::Fstep => FSTEP,
        Nt::NextStmt => NEXT_STMT,
        Nt::Nextvl => NEXTVL,
        Nt::IfStmt => IF_STMT,
        Nt::Ifa => IFA,
        Nt::Ifelse => IFELSE,
        Nt::InputStmt => INPUT_STMT,
        Nt::Prompt => PROMPT,
        Nt::ReadStmt => READ_STMT,
        Nt::Nsvar => NSVAR,
        Nt::Nsvrl => NSVRL,
        Nt::Nsv2 => NSV2,
        Nt::Opd => OPD,
        Nt::D1 => D1,
        Nt::DataStmt => DATA_STMT,
        Nt::DataList => DATA_LIST,
        Nt::DataTail => DATA_TAIL,
        Nt::DataVal => DATA_VAL,
        Nt::DimStmt => DIM_STMT,
        Nt::Nsmat => NSMAT,
        Nt::Nsml => NSML,
        Nt::Nsml2 => NSML2,
        Nt::OnStmt => ON_STMT,
        Nt::On1 => ON1,
        Nt::Expl => EXPL,
        Nt::Expl1 => EXPL1,
        Nt::ClearStmt => CLEAR_STMT,
        Nt::Clrp1 => CLRP1,
        Nt::Clrp2 => CLRP2,
        Nt::GetStmt => GET_STMT,
        Nt::PutStmt => PUT_STMT,
        Nt::OpenStmt => OPEN_STMT,
        Nt::CloseStmt => CLOSE_STMT,
        Nt::XioStmt => XIO_STMT,
        Nt::StatusStmt => STATUS_STMT,
        Nt::NoteStmt => NOTE_STMT,
        Nt::PointStmt => POINT_STMT,
    }
}

/// Statement dispatch: first token of a statement to its rule.
///
/// PRINT (and its `?` alias) and REM are parsed directly by the parser
/// and never reach this table. Statement keywords with no entry here
/// (BYE at mid-line, COM, COLOR, ...) report as unknown statements.
pub fn statement_rule(kind: TokenKind) -> Option<Nt> {
    use TokenKind as K;
    let nt = match kind {
        K::Let | K::Ident => Nt::LetStmt,
        K::Goto => Nt::GotoStmt,
        K::Gosub => Nt::GosubStmt,
        K::End
        | K::Stop
        | K::Return
        | K::Clr
        | K::Deg
        | K::Rad
        | K::Pop
        | K::Cont
        | K::Bye
        | K::Run
        | K::List
        | K::Save
        | K::Cls => Nt::EmptyStmt,
        K::For => Nt::ForStmt,
        K::Next => Nt::NextStmt,
        K::If => Nt::IfStmt,
        K::Input => Nt::InputStmt,
        K::Read => Nt::ReadStmt,
        K::Data => Nt::DataStmt,
        K::Restore | K::Randomize | K::Trap => Nt::OptExprStmt,
        K::Defint | K::Deflng | K::Defsng | K::Defdbl | K::Defstr => Nt::OptExprStmt,
        K::Clear => Nt::ClearStmt,
        K::Dim => Nt::DimStmt,
        K::On => Nt::OnStmt,
        K::Graphics => Nt::ExprStmt,
        K::Poke | K::Plot | K::Position | K::Drawto => Nt::TwoExprStmt,
        K::Setcolor => Nt::ThreeExprStmt,
        K::Sound => Nt::FourExprStmt,
        K::Get => Nt::GetStmt,
        K::Put => Nt::PutStmt,
        K::Open => Nt::OpenStmt,
        K::Close => Nt::CloseStmt,
        K::Xio => Nt::XioStmt,
        K::Status => Nt::StatusStmt,
        K::Note => Nt::NoteStmt,
        K::Point => Nt::PointStmt,
        _ => return None,
    };
    Some(nt)
}

// =============================================================================
// OPERATOR AND FUNCTION TABLES
// =============================================================================

/// Unary operators bind at this power.
pub const UNARY_BP: u8 = 7;

/// Null-denotation parse actions (prefix position).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NudAction {
    None,
    NumberLiteral,
    StringLiteral,
    Variable,
    Parenthesized,
    UnaryPlus,
    UnaryMinus,
    UnaryNot,
    FunctionCall,
}

/// Left-denotation parse actions (infix position).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedAction {
    None,
    BinaryOp,
}

/// Operator table row: binding powers and parse actions.
#[derive(Clone, Copy, Debug)]
pub struct OpEntry {
    /// Left binding power ("go on stack").
    pub lbp: u8,
    /// Right binding power ("come off stack").
    pub rbp: u8,
    pub nud: NudAction,
    pub led: LedAction,
}

impl OpEntry {
    const fn atom(nud: NudAction) -> Self {
        Self {
            lbp: 0,
            rbp: 0,
            nud,
            led: LedAction::None,
        }
    }

    const fn binary(lbp: u8, rbp: u8) -> Self {
        Self {
            lbp,
            rbp,
            nud: NudAction::None,
            led: LedAction::BinaryOp,
        }
    }
}

/// Operator table lookup, keyed by token tag.
pub fn operator_entry(kind: TokenKind) -> Option<OpEntry> {
    use TokenKind as K;
    let entry = match kind {
        K::Number => OpEntry::atom(NudAction::NumberLiteral),
        K::String => OpEntry::atom(NudAction::StringLiteral),
        K::Ident => OpEntry::atom(NudAction::Variable),
        K::LParen => OpEntry::atom(NudAction::Parenthesized),
        // ^ is right-associative: it comes off the stack below where
        // it goes on.
        K::Caret => OpEntry::binary(8, 1),
        K::Star | K::Slash => OpEntry::binary(5, 5),
        K::Eq | K::Less | K::Greater | K::LessEq | K::GreaterEq | K::NotEq => {
            OpEntry::binary(2, 2)
        }
        K::And | K::Or => OpEntry::binary(1, 1),
        K::Plus => OpEntry {
            lbp: 4,
            rbp: 4,
            nud: NudAction::UnaryPlus,
            led: LedAction::BinaryOp,
        },
        K::Minus => OpEntry {
            lbp: 4,
            rbp: 4,
            nud: NudAction::UnaryMinus,
            led: LedAction::BinaryOp,
        },
        K::Not => OpEntry {
            lbp: UNARY_BP,
            rbp: UNARY_BP,
            nud: NudAction::UnaryNot,
            led: LedAction::None,
        },
        k if function_info(k).is_some() => OpEntry::atom(NudAction::FunctionCall),
        _ => return None,
    };
    Some(entry)
}

/// Function metadata for arity validation and diagnostics.
#[derive(Clone, Copy, Debug)]
pub struct FunctionInfo {
    pub name: &'static str,
    pub min_args: u8,
    pub max_args: u8,
}

/// Function table lookup, keyed by token tag.
pub fn function_info(kind: TokenKind) -> Option<FunctionInfo> {
    use TokenKind as K;
    let (name, min_args, max_args) = match kind {
        K::Sin => ("SIN", 1, 1),
        K::Cos => ("COS", 1, 1),
        K::Atn => ("ATN", 1, 1),
        K::ExpFn => ("EXP", 1, 1),
        K::Log => ("LOG", 1, 1),
        K::Clog => ("CLOG", 1, 1),
        K::Sqr => ("SQR", 1, 1),
        K::Abs => ("ABS", 1, 1),
        K::Int => ("INT", 1, 1),
        K::Sgn => ("SGN", 1, 1),
        K::Rnd => ("RND", 1, 1),
        K::Fre => ("FRE", 1, 1),
        K::Peek => ("PEEK", 1, 1),
        K::Paddle => ("PADDLE", 1, 1),
        K::Stick => ("STICK", 1, 1),
        K::Ptrig => ("PTRIG", 1, 1),
        K::Strig => ("STRIG", 1, 1),
        K::Asc => ("ASC", 1, 1),
        K::Val => ("VAL", 1, 1),
        K::Len => ("LEN", 1, 1),
        K::Adr => ("ADR", 1, 1),
        K::StrFn => ("STR$", 1, 1),
        K::ChrFn => ("CHR$", 1, 1),
        K::LeftFn => ("LEFT$", 2, 2),
        K::RightFn => ("RIGHT$", 2, 2),
        K::MidFn => ("MID$", 2, 3),
        K::Tab => ("TAB", 1, 1),
        _ => return None,
    };
    Some(FunctionInfo {
        name,
        min_args,
        max_args,
    })
}

/// True for functions whose result is a string.
pub fn is_string_function(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::StrFn
            | TokenKind::ChrFn
            | TokenKind::LeftFn
            | TokenKind::RightFn
            | TokenKind::MidFn
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_dispatch() {
        assert_eq!(statement_rule(K::For), Some(Nt::ForStmt));
        assert_eq!(statement_rule(K::Ident), Some(Nt::LetStmt));
        assert_eq!(statement_rule(K::Com), None);
    }

    #[test]
    fn test_caret_is_right_associative() {
        let entry = operator_entry(K::Caret).unwrap();
        assert!(entry.rbp < entry.lbp);
    }

    #[test]
    fn test_plus_is_both_prefix_and_infix() {
        let entry = operator_entry(K::Plus).unwrap();
        assert_eq!(entry.nud, NudAction::UnaryPlus);
        assert_eq!(entry.led, LedAction::BinaryOp);
    }

    #[test]
    fn test_function_arities() {
        assert_eq!(function_info(K::MidFn).unwrap().max_args, 3);
        assert_eq!(function_info(K::LeftFn).unwrap().min_args, 2);
        assert_eq!(function_info(K::Sin).unwrap().min_args, 1);
        assert!(function_info(K::Print).is_none());
    }

    #[test]
    fn test_string_functions() {
        assert!(is_string_function(K::MidFn));
        assert!(!is_string_function(K::Len));
    }

    #[test]
    fn test_every_rule_resolves() {
        // Rules referenced from other rules must exist with content.
        for nt in [Nt::Exp, Nt::LetStmt, Nt::DataVal, Nt::OpenStmt, Nt::Nextvl] {
            assert!(!rule(nt).is_empty());
        }
    }
}
