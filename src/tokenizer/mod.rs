/*!
# Path Tokenizer

Splits raw path chains on `.` outside bracket/angle groups, strips and
records collection, map and alignment-anchor notation, and validates
per-script overrides against the sanitized token paths.

```text
rows[~].cells[].value   ->  rows . cells . value   (anchor at level 0)
labels<K>               ->  labels                 (map key slot)
```
*/

pub mod chain;
pub mod lexer;

pub use chain::{
    attach_overrides, AnchorKind, AttachedOverrides, ChainSegment, CollectionNotation, MapSlot,
    NodeOverride, TokenizedChain,
};
pub use lexer::{lex_chain, ChainToken};
