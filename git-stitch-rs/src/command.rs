/// A single record of a fast-export stream.
///
/// Operand fields keep the raw bytes from the stream: paths may carry their
/// C-style quoting, parent references may be marks (`:N`) or hex object ids,
/// and none of it is decoded as text. Verbs outside the recognized set are
/// preserved verbatim in `Other` so they pass through unmolested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Blob,
    Mark(u32),
    OriginalOid(Vec<u8>),
    /// A `data <len>` header together with the `len` payload bytes that
    /// follow it. `trailing_lf` records whether the optional LF after the
    /// payload was present in the input, so serialization is byte-exact.
    Data { payload: Vec<u8>, trailing_lf: bool },
    Commit(Vec<u8>),
    Author(Vec<u8>),
    Committer(Vec<u8>),
    From(Vec<u8>),
    Merge(Vec<u8>),
    Tag(Vec<u8>),
    Reset(Vec<u8>),
    FileModify {
        mode: Vec<u8>,
        dataref: Vec<u8>,
        path: Vec<u8>,
    },
    FileDelete {
        path: Vec<u8>,
    },
    /// `C <src> <dst>`. Both operands, unsplit; quoting is resolved lazily
    /// by the path rewriter.
    FileCopy {
        ops: Vec<u8>,
    },
    /// `R <src> <dst>`, stored like `FileCopy`.
    FileRename {
        ops: Vec<u8>,
    },
    Note {
        dataref: Vec<u8>,
        commitref: Vec<u8>,
    },
    DeleteAll,
    Other(Vec<u8>),
}

impl Command {
    /// Append this record, including its terminating newline, to `out`.
    pub fn append_to(&self, out: &mut Vec<u8>) {
        match self {
            Command::Blob => out.extend_from_slice(b"blob"),
            Command::Mark(n) => {
                out.extend_from_slice(b"mark :");
                out.extend_from_slice(n.to_string().as_bytes());
            }
            Command::OriginalOid(rest) => {
                out.extend_from_slice(b"original-oid ");
                out.extend_from_slice(rest);
            }
            Command::Data {
                payload,
                trailing_lf,
            } => {
                out.extend_from_slice(b"data ");
                out.extend_from_slice(payload.len().to_string().as_bytes());
                out.push(b'\n');
                out.extend_from_slice(payload);
                if *trailing_lf {
                    out.push(b'\n');
                }
                return;
            }
            Command::Commit(r) => {
                out.extend_from_slice(b"commit ");
                out.extend_from_slice(r);
            }
            Command::Author(rest) => {
                out.extend_from_slice(b"author ");
                out.extend_from_slice(rest);
            }
            Command::Committer(rest) => {
                out.extend_from_slice(b"committer ");
                out.extend_from_slice(rest);
            }
            Command::From(target) => {
                out.extend_from_slice(b"from ");
                out.extend_from_slice(target);
            }
            Command::Merge(target) => {
                out.extend_from_slice(b"merge ");
                out.extend_from_slice(target);
            }
            Command::Tag(name) => {
                out.extend_from_slice(b"tag ");
                out.extend_from_slice(name);
            }
            Command::Reset(r) => {
                out.extend_from_slice(b"reset ");
                out.extend_from_slice(r);
            }
            Command::FileModify {
                mode,
                dataref,
                path,
            } => {
                out.extend_from_slice(b"M ");
                out.extend_from_slice(mode);
                out.push(b' ');
                out.extend_from_slice(dataref);
                out.push(b' ');
                out.extend_from_slice(path);
            }
            Command::FileDelete { path } => {
                out.extend_from_slice(b"D ");
                out.extend_from_slice(path);
            }
            Command::FileCopy { ops } => {
                out.extend_from_slice(b"C ");
                out.extend_from_slice(ops);
            }
            Command::FileRename { ops } => {
                out.extend_from_slice(b"R ");
                out.extend_from_slice(ops);
            }
            Command::Note { dataref, commitref } => {
                out.extend_from_slice(b"N ");
                out.extend_from_slice(dataref);
                out.push(b' ');
                out.extend_from_slice(commitref);
            }
            Command::DeleteAll => out.extend_from_slice(b"deleteall"),
            Command::Other(raw) => out.extend_from_slice(raw),
        }
        out.push(b'\n');
    }

    /// Whether this command may appear inside a commit entry, after the
    /// `commit <ref>` header. The first command outside this set starts the
    /// next top-level entry.
    pub fn is_commit_tail(&self) -> bool {
        matches!(
            self,
            Command::Mark(_)
                | Command::OriginalOid(_)
                | Command::Author(_)
                | Command::Committer(_)
                | Command::Data { .. }
                | Command::From(_)
                | Command::Merge(_)
                | Command::FileModify { .. }
                | Command::FileDelete { .. }
                | Command::FileCopy { .. }
                | Command::FileRename { .. }
                | Command::DeleteAll
                | Command::Note { .. }
        )
    }
}

/// Parse a `:N` mark reference. Returns None for hex object ids, `inline`,
/// and anything else that is not a pure `:digits` operand.
pub fn parse_markref(bytes: &[u8]) -> Option<u32> {
    let digits = bytes.strip_prefix(b":")?;
    if digits.is_empty() {
        return None;
    }
    let mut num: u32 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        num = num.checked_mul(10)?.checked_add((b - b'0') as u32)?;
    }
    Some(num)
}

/// Render a mark number back to its `:N` reference form.
pub fn markref_bytes(mark: u32) -> Vec<u8> {
    format!(":{}", mark).into_bytes()
}
