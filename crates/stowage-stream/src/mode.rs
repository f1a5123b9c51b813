use std::fmt;
use std::str::FromStr;

use crate::error::StreamError;

/// How a [`BlockCursor`](crate::BlockCursor) was opened.
///
/// Parsed from the familiar `fopen` strings: one of `r`, `w`, `a`,
/// optionally followed by `+` (read and write) and `b` in either order.
/// Cursors are always binary, so `b` is accepted and ignored while `t` is
/// rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenMode {
    base: Base,
    update: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Base {
    Read,
    Write,
    Append,
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode {
        base: Base::Read,
        update: false,
    };
    pub const WRITE: OpenMode = OpenMode {
        base: Base::Write,
        update: false,
    };
    pub const APPEND: OpenMode = OpenMode {
        base: Base::Append,
        update: false,
    };

    /// The same mode with `+` added.
    pub fn with_update(self) -> Self {
        Self {
            update: true,
            ..self
        }
    }

    pub fn readable(&self) -> bool {
        self.base == Base::Read || self.update
    }

    pub fn writable(&self) -> bool {
        self.base != Base::Read || self.update
    }

    /// Opening discards every existing block.
    pub fn truncates(&self) -> bool {
        self.base == Base::Write
    }

    /// The cursor starts at the end of the stream.
    pub fn appends(&self) -> bool {
        self.base == Base::Append
    }
}

impl FromStr for OpenMode {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || StreamError::InvalidMode(s.to_string());
        let mut chars = s.chars();
        let base = match chars.next() {
            Some('r') => Base::Read,
            Some('w') => Base::Write,
            Some('a') => Base::Append,
            _ => return Err(invalid()),
        };
        let (mut update, mut binary) = (false, false);
        for c in chars {
            match c {
                '+' if !update => update = true,
                'b' if !binary => binary = true,
                _ => return Err(invalid()),
            }
        }
        Ok(Self { base, update })
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.base {
            Base::Read => "r",
            Base::Write => "w",
            Base::Append => "a",
        };
        write!(f, "{base}{}b", if self.update { "+" } else { "" })
    }
}
