use std::collections::HashMap;

use memchr::memchr;

use crate::command::{parse_markref, Command};
use crate::error::{Error, Result};

/// Parse a raw fast-export byte stream into its command sequence.
///
/// The parser is line-oriented except across `data <len>` headers, where
/// exactly `len` raw payload bytes are consumed without interpretation.
pub fn parse(input: &[u8]) -> Result<Vec<Command>> {
    let mut cmds = Vec::new();
    let mut pos = 0usize;
    while pos < input.len() {
        let (line, after_line) = match memchr(b'\n', &input[pos..]) {
            Some(off) => (&input[pos..pos + off], pos + off + 1),
            None => (&input[pos..], input.len()),
        };
        pos = after_line;

        if let Some(rest) = operand(line, b"data") {
            let len = parse_data_len(rest)?;
            if input.len() - pos < len {
                return Err(Error::MalformedStream(format!(
                    "data length {} exceeds the {} bytes left in the stream",
                    len,
                    input.len() - pos
                )));
            }
            let payload = input[pos..pos + len].to_vec();
            pos += len;
            let trailing_lf = input.get(pos) == Some(&b'\n');
            if trailing_lf {
                pos += 1;
            }
            cmds.push(Command::Data {
                payload,
                trailing_lf,
            });
            continue;
        }

        cmds.push(parse_line(line)?);
    }
    Ok(cmds)
}

/// Serialize a command sequence back to stream bytes. For any well-formed
/// export stream `s`, `serialize(&parse(s)?) == s`.
pub fn serialize(cmds: &[Command]) -> Vec<u8> {
    let mut out = Vec::with_capacity(cmds.len() * 32);
    for cmd in cmds {
        cmd.append_to(&mut out);
    }
    out
}

/// Index every blob entry by its mark, mapping to the position of the blob's
/// `data` command. Skips the optional `original-oid` between `mark` and
/// `data` that `--show-original-ids` inserts.
pub fn index_blobs(cmds: &[Command]) -> Result<HashMap<u32, usize>> {
    let mut map = HashMap::new();
    let mut i = 0usize;
    while i < cmds.len() {
        if !matches!(cmds[i], Command::Blob) {
            i += 1;
            continue;
        }
        let mark = match cmds.get(i + 1) {
            Some(Command::Mark(m)) => *m,
            _ => {
                return Err(Error::MalformedStream(
                    "blob entry without a mark".to_string(),
                ))
            }
        };
        let mut j = i + 2;
        while matches!(cmds.get(j), Some(Command::OriginalOid(_))) {
            j += 1;
        }
        if !matches!(cmds.get(j), Some(Command::Data { .. })) {
            return Err(Error::MalformedStream(format!(
                "blob :{} without a data command",
                mark
            )));
        }
        if map.insert(mark, j).is_some() {
            return Err(Error::DuplicateBlobMark(mark));
        }
        i = j + 1;
    }
    Ok(map)
}

fn parse_line(line: &[u8]) -> Result<Command> {
    if line == b"blob" {
        return Ok(Command::Blob);
    }
    if line == b"deleteall" {
        return Ok(Command::DeleteAll);
    }
    if let Some(rest) = operand(line, b"mark") {
        let mark = parse_markref(rest).ok_or_else(|| malformed("bad mark declaration", line))?;
        return Ok(Command::Mark(mark));
    }
    if let Some(rest) = operand(line, b"original-oid") {
        return Ok(Command::OriginalOid(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"commit") {
        return Ok(Command::Commit(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"author") {
        return Ok(Command::Author(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"committer") {
        return Ok(Command::Committer(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"from") {
        return Ok(Command::From(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"merge") {
        return Ok(Command::Merge(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"tag") {
        return Ok(Command::Tag(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"reset") {
        return Ok(Command::Reset(rest.to_vec()));
    }
    if let Some(rest) = operand(line, b"M") {
        let sp1 = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("filemodify missing dataref", line))?;
        let mode = rest[..sp1].to_vec();
        let rest = &rest[sp1 + 1..];
        let sp2 = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("filemodify missing path", line))?;
        return Ok(Command::FileModify {
            mode,
            dataref: rest[..sp2].to_vec(),
            path: rest[sp2 + 1..].to_vec(),
        });
    }
    if let Some(rest) = operand(line, b"D") {
        return Ok(Command::FileDelete {
            path: rest.to_vec(),
        });
    }
    if let Some(rest) = operand(line, b"C") {
        return Ok(Command::FileCopy { ops: rest.to_vec() });
    }
    if let Some(rest) = operand(line, b"R") {
        return Ok(Command::FileRename { ops: rest.to_vec() });
    }
    if let Some(rest) = operand(line, b"N") {
        let sp = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| malformed("note missing commit reference", line))?;
        return Ok(Command::Note {
            dataref: rest[..sp].to_vec(),
            commitref: rest[sp + 1..].to_vec(),
        });
    }
    Ok(Command::Other(line.to_vec()))
}

fn operand<'a>(line: &'a [u8], verb: &[u8]) -> Option<&'a [u8]> {
    let rest = line.strip_prefix(verb)?;
    rest.strip_prefix(b" ")
}

fn parse_data_len(rest: &[u8]) -> Result<usize> {
    let text = std::str::from_utf8(rest).ok();
    text.and_then(|s| s.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            Error::MalformedStream(format!(
                "bad data header length: {}",
                String::from_utf8_lossy(rest)
            ))
        })
}

fn malformed(what: &str, line: &[u8]) -> Error {
    Error::MalformedStream(format!("{}: {}", what, String::from_utf8_lossy(line)))
}
