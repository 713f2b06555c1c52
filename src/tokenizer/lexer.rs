/*!
# Path Chain Lexer

Low-level token stream over one raw path chain, built with logos. The
[`ChainParser`](super::chain) assembles these tokens into notated segments.
*/

use logos::Logos;
use once_cell::sync::Lazy;
use regex::Regex;

/// Raw lexical tokens of a path chain
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t]+")]
pub enum ChainToken {
    #[token(".")]
    Dot,

    #[token("[")]
    OpenBracket,

    #[token("]")]
    CloseBracket,

    /// Map key slot marker, always written with its angle pair
    #[token("<K>")]
    KeySlot,

    /// Map value slot marker
    #[token("<V>")]
    ValueSlot,

    /// Alignment anchor, only legal inside a bracket group
    #[token("~")]
    Anchor,

    #[regex(r"[0-9]+")]
    Number,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,
}

/// Sanitized token names must be plain identifiers; this is re-checked after
/// notation stripping so Path-Tree keys stay collision-free.
pub static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// One lexed token with its slice of the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexed {
    pub token: ChainToken,
    pub text: String,
}

/// Tokenizes a raw chain; an unrecognized character yields `Err` with the
/// offending slice.
pub fn lex_chain(input: &str) -> Result<Vec<Lexed>, String> {
    let mut lexer = ChainToken::lexer(input);
    let mut out = Vec::new();
    while let Some(item) = lexer.next() {
        match item {
            Ok(token) => out.push(Lexed {
                token,
                text: lexer.slice().to_string(),
            }),
            Err(()) => {
                return Err(format!(
                    "unrecognized character '{}' in chain",
                    lexer.slice()
                ))
            }
        }
    }
    Ok(out)
}
